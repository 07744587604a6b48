use std::io::Write;

use serde_json::Value;

use crate::error::CliError;

/// Writes one JSON document to stdout.
pub fn render(data: &Value, pretty: bool) -> Result<(), CliError> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_json(&mut handle, data, pretty)
}

fn write_json(out: &mut impl Write, data: &Value, pretty: bool) -> Result<(), CliError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, data)?;
    } else {
        serde_json::to_writer(&mut *out, data)?;
    }
    writeln!(out)?;
    Ok(())
}
