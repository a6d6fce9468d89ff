//! Control plane output - the run report on stdout.
//!
//! stdout carries machine-readable JSON lines only; every log line goes to
//! stderr through `tracing`.

mod stdio;

pub use stdio::{write_json_line, write_stdout_json, write_stdout_line};
