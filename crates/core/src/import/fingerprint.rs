use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::errors::{ImportError, Result};

/// SHA-256 hex digest of a source file, streamed in fixed-size blocks.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let unreadable = |e: std::io::Error| ImportError::SourceUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let file = File::open(path).map_err(unreadable)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader.read(&mut buffer).map_err(unreadable)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn fingerprint_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
