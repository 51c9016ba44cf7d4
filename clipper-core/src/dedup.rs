//! Content hashing and duplicate detection for vault writes

use sha2::{Digest, Sha256};
use std::path::Path;

/// Outcome of comparing new note content with what is already on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupResult {
    /// Nothing exists at the path yet
    New,
    /// The file exists with identical content
    Duplicate,
    /// A different file already occupies the path
    Conflict,
}

/// Compute SHA-256 hash of content
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First 12 hex chars of the SHA-256 hash, for file name suffixes and keys
pub fn short_hash(content: &str) -> String {
    let mut hash = compute_hash(content);
    hash.truncate(12);
    hash
}

/// Compare `content_hash` with the file at `path`
pub fn check_existing(path: &Path, content_hash: &str) -> std::io::Result<DedupResult> {
    match std::fs::read_to_string(path) {
        Ok(existing) => {
            if compute_hash(&existing) == content_hash {
                Ok(DedupResult::Duplicate)
            } else {
                Ok(DedupResult::Conflict)
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DedupResult::New),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_computation() {
        let hash1 = compute_hash("hello world");
        let hash2 = compute_hash("hello world");
        let hash3 = compute_hash("hello world!");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
    }

    #[test]
    fn test_short_hash() {
        let hash = short_hash("hello world");
        assert_eq!(hash.len(), 12);
        assert!(compute_hash("hello world").starts_with(&hash));
    }

    #[test]
    fn test_check_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        let hash = compute_hash("# Note");

        assert_eq!(check_existing(&path, &hash).unwrap(), DedupResult::New);

        std::fs::write(&path, "# Note").unwrap();
        assert_eq!(check_existing(&path, &hash).unwrap(), DedupResult::Duplicate);

        std::fs::write(&path, "# Other").unwrap();
        assert_eq!(check_existing(&path, &hash).unwrap(), DedupResult::Conflict);
    }
}
