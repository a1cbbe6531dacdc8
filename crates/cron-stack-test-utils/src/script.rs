//! Scripts for tests that need an asset on disk

use std::io::Write;

use tempfile::NamedTempFile;

/// Write a small Python script to a temporary `.py` file.
///
/// The file is deleted when the returned handle is dropped.
pub fn test_script(body: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("cron-stack-")
        .suffix(".py")
        .tempfile()?;
    file.write_all(body.as_bytes())?;
    file.flush()?;
    Ok(file)
}
