//! Daemon wiring for mcmgrd.

mod mcmgrd;

pub use mcmgrd::{DaemonError, McMgrDaemon};
