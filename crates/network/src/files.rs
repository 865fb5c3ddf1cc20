// crates/network/src/files.rs
//! File helpers shared by uploads, downloads and logging

use std::path::Path;

/// Size of a regular file in bytes, `None` if it does not exist
pub fn file_size(path: impl AsRef<Path>) -> Option<u64> {
    std::fs::metadata(path.as_ref())
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

/// Formats a byte count for humans, e.g. `500 KB`, `1.2 MB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if bytes < 1000 {
        // Smallest unit is KB, like a file browser shows it
        return if bytes == 0 {
            "Zero KB".to_string()
        } else {
            format!("{:.0} KB", (bytes as f64 / 1000.0).ceil())
        };
    }

    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{:.0} {}", value, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Removes a file if it exists
///
/// Returns false only when the file exists and could not be removed.
pub fn delete_file(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    if !path.exists() {
        return true;
    }
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Failed to delete {}: {}", path.display(), e);
            false
        }
    }
}
