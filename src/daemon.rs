//! Daemonization for `-d` mode.
//!
//! Classic fork/setsid detach: the parent exits, the child becomes a
//! session leader with stdio pointed at /dev/null. Must run after the
//! listening socket is bound (so bind failures report in the foreground)
//! and before the async runtime starts (runtime threads do not survive a
//! fork).

use std::io;

/// Detach the process from the controlling terminal.
///
/// On return the caller is the daemon child: a new session leader with `/`
/// as its working directory and stdin/stdout/stderr redirected to
/// /dev/null. The parent process exits with status 0.
pub fn daemonize() -> io::Result<()> {
    // Still single-threaded here; the runtime is built after the fork.
    unsafe {
        match libc::fork() {
            -1 => return Err(io::Error::last_os_error()),
            0 => {}
            _ => libc::_exit(0),
        }

        if libc::setsid() == -1 {
            return Err(io::Error::last_os_error());
        }

        if libc::chdir(c"/".as_ptr()) == -1 {
            return Err(io::Error::last_os_error());
        }

        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_RDWR);
        if devnull == -1 {
            return Err(io::Error::last_os_error());
        }

        for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(devnull, fd) == -1 {
                return Err(io::Error::last_os_error());
            }
        }

        if devnull > libc::STDERR_FILENO {
            libc::close(devnull);
        }
    }

    Ok(())
}
