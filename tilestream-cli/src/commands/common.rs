//! Common types and utilities shared across CLI commands.

use std::path::Path;

use tilestream::coord::{CrsId, TileAddress};

use crate::error::CliError;

/// Parses `level/row/col` into an address in `crs`.
pub fn parse_address(text: &str, crs: CrsId) -> Result<TileAddress, CliError> {
    let parts: Vec<&str> = text.trim().split('/').collect();
    let [level, row, col] = parts.as_slice() else {
        return Err(CliError::InvalidAddress(format!(
            "'{}' (expected level/row/col)",
            text
        )));
    };

    let number = |name: &str, value: &str| {
        value.parse::<u32>().map_err(|_| {
            CliError::InvalidAddress(format!("{} '{}' is not a non-negative integer", name, value))
        })
    };

    TileAddress::new(
        number("level", *level)?,
        number("row", *row)?,
        number("col", *col)?,
        crs,
    )
    .map_err(|e| CliError::InvalidAddress(e.to_string()))
}

/// `file://` URL of a local file, for resolving relative content URIs.
pub fn file_url(path: &Path) -> Result<String, CliError> {
    let absolute = std::fs::canonicalize(path).map_err(|error| CliError::FileRead {
        path: path.to_path_buf(),
        error,
    })?;
    Ok(format!("file://{}", absolute.display()))
}

/// Human-readable byte count.
pub fn format_bytes(bytes: usize) -> String {
    match bytes {
        b if b >= 1_048_576 => format!("{:.2} MB", b as f64 / 1_048_576.0),
        b if b >= 1024 => format!("{:.1} KB", b as f64 / 1024.0),
        b => format!("{} B", b),
    }
}
