//! echolog: a concurrent TCP logging echo server.
//!
//! Accepts any number of client connections on a fixed port, appends
//! everything received to a single shared append-only log file, and echoes
//! the full accumulated log back to a client each time one of its chunks
//! completes a newline-terminated message.
//!
//! Features:
//! - One handler task per connection, all writing through one shared log
//! - Periodic timestamp records appended by a background task
//! - Coordinated shutdown on SIGINT/SIGTERM that drains every handler
//!   before the log file is removed
//! - Optional daemon mode for running detached from the terminal

pub mod config;
pub mod connection;
pub mod daemon;
pub mod log;
pub mod ringbuf;
pub mod server;
