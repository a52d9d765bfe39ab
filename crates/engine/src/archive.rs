// Inbound zip enumeration

use std::io::{Cursor, Read};

use zip::ZipArchive;

/// One structured-document entry pulled from the inbound archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry name as stored in the zip (may carry a directory prefix).
    pub name: String,
    /// Raw bytes of the entry.
    pub bytes: Vec<u8>,
}

/// Failure affecting the inbound archive as a whole.
#[derive(Debug)]
pub enum ArchiveError {
    /// The input bytes are not a readable zip archive.
    InvalidArchive(String),
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::InvalidArchive(msg) => write!(f, "not a valid zip archive: {}", msg),
        }
    }
}

impl std::error::Error for ArchiveError {}

/// Enumerate the XML document entries of an in-memory zip.
///
/// Keeps entries whose name ends case-insensitively in `.xml`. Directory
/// entries and every other extension are skipped silently. An entry that is
/// listed but cannot be read comes back with whatever bytes were recovered
/// (usually none), so that the classifier rejects that one document instead
/// of the whole batch.
pub fn read_document_entries(data: &[u8]) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let name = match archive.name_for_index(index) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if name.ends_with('/') || !name.to_ascii_lowercase().ends_with(".xml") {
            continue;
        }

        let mut bytes = Vec::new();
        match archive.by_index(index) {
            Ok(mut file) => {
                if file.is_dir() {
                    continue;
                }
                if let Err(e) = file.read_to_end(&mut bytes) {
                    log::warn!("Failed to read zip entry '{}': {}", name, e);
                }
            }
            Err(e) => {
                log::warn!("Failed to open zip entry '{}': {}", name, e);
            }
        }
        entries.push(ArchiveEntry { name, bytes });
    }

    Ok(entries)
}
