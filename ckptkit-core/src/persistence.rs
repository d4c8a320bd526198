//! Persistence helpers — atomic file writes, JSON documents, JSON-lines logs.
//!
//! Every writer here goes through [`atomic_write`]: data lands in a hidden
//! temporary sibling first and is renamed over the target, so a reader never
//! sees a half-written file.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Temporary sibling used while `path` is being written.
///
/// `model_epoch000003.ckpt` becomes `.model_epoch000003.ckpt.tmp` in the same
/// directory, keeping the rename on a single filesystem.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Atomically write raw bytes to a file.
///
/// Creates parent directories if they don't exist. On failure the temporary
/// file is removed and the previous contents of `path` (if any) are intact.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_sibling(path);
    let result = write_synced(&tmp, data).and_then(|()| std::fs::rename(&tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Atomically write pretty-printed JSON to a file.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, &json)
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist and `InvalidData` if it does
/// but cannot be parsed.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let value =
        serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Append one compact JSON record as a line to `path`, creating the file.
pub fn append_json_line<T: Serialize + ?Sized>(path: &Path, record: &T) -> io::Result<()> {
    let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
    line.push(b'\n');
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(&line)?;
    file.flush()
}

/// Read every record of a JSON-lines file, skipping blank lines.
///
/// A missing file yields an empty list. A line that fails to parse is
/// reported as `InvalidData` with its 1-based line number.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: line {}: {e}", path.display(), idx + 1),
            )
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Hex-encoded SHA-256 digest of a file's contents.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(sha256_hex(&bytes))
}

/// Hex-encoded SHA-256 digest of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        epoch: u64,
        loss: f64,
    }

    #[test]
    fn test_atomic_write_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");

        let data = vec![Entry { epoch: 1, loss: 0.5 }, Entry { epoch: 2, loss: 0.25 }];
        atomic_write_json(&path, &data).unwrap();

        let loaded: Option<Vec<Entry>> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(data));
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs").join("a").join("state.bin");

        atomic_write(&path, b"weights").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"weights");
    }

    #[test]
    fn test_atomic_write_overwrites_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("best.ckpt");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn test_temp_sibling_is_hidden_in_same_dir() {
        let tmp = temp_sibling(Path::new("/ckpt/model_epoch000001.ckpt"));
        assert_eq!(tmp, PathBuf::from("/ckpt/.model_epoch000001.ckpt.tmp"));
    }

    #[test]
    fn test_load_json_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Entry> = load_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_json_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_json::<Entry>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_json_lines_append_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");

        append_json_line(&path, &Entry { epoch: 1, loss: 0.9 }).unwrap();
        append_json_line(&path, &Entry { epoch: 2, loss: 0.7 }).unwrap();

        let lines: Vec<Entry> = read_json_lines(&path).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].epoch, 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_read_json_lines_reports_line_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "{\"epoch\":1,\"loss\":0.5}\n\ngarbage\n").unwrap();

        let err = read_json_lines::<Entry>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_read_json_lines_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let lines: Vec<Entry> = read_json_lines(&dir.path().join("none.jsonl")).unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), sha256_hex(b"abc"));
    }
}
