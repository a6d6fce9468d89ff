//! Stdout writers.
//!
//! # Important
//!
//! - **stdout**: one JSON document per line
//! - **stderr**: logs (not parsed by callers)
//! - **Never use `println!`**: It may add `\r\n` on Windows
//!
//! # Example
//!
//! ```ignore
//! use ringwire::control::write_stdout_json;
//!
//! let report = ringwire::RingBuilder::new(3).run().await?;
//! write_stdout_json(&report)?;
//! ```

use std::io::Write;

/// Write a line to stdout.
///
/// Writes the string followed by a single `\n` and flushes.
///
/// # Errors
///
/// Returns IO error if write or flush fails.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()?;
    Ok(())
}

/// Serialize `value` as one JSON line into `writer`.
pub fn write_json_line<W, T>(writer: &mut W, value: &T) -> crate::error::Result<()>
where
    W: Write,
    T: serde::Serialize,
{
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write a JSON value to stdout as a single line.
///
/// # Errors
///
/// Returns error if serialization or write fails.
pub fn write_stdout_json<T: serde::Serialize>(value: &T) -> crate::error::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_json_line(&mut handle, value)
}
