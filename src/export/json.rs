use anyhow::Result;
use serde::Serialize;
use std::io::Write;

/// Export a run report as pretty-printed JSON
pub fn export_json<T: Serialize, W: Write>(report: &T, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    Ok(())
}
