//! Input shard discovery and raw line reading.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{is_hidden, StorageError};

/// List the input shards under `input`.
///
/// A file is a single shard. In a directory every regular file is a shard
/// except `_`/`.`-prefixed ones; shards are sorted by path so shard indices
/// are stable between runs.
pub fn discover_shards(input: &Path) -> Result<Vec<PathBuf>, StorageError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(StorageError::PathNotFound(input.to_path_buf()));
    }

    let dir = input
        .to_str()
        .ok_or_else(|| StorageError::InvalidPath(input.display().to_string()))?;
    let pattern = format!("{}/*", glob::Pattern::escape(dir));

    let mut shards = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        if path.is_file() && !is_hidden(&path) {
            shards.push(path);
        }
    }
    shards.sort();

    debug!("Discovered {} input shards in {:?}", shards.len(), input);
    Ok(shards)
}

/// Reads one shard as raw, non-blank lines with 1-based line numbers.
///
/// Lines are handed out as bytes: invalid UTF-8 is a data problem for the
/// validator, not an IO failure.
pub struct ShardLines {
    reader: BufReader<File>,
    line: u64,
    buf: Vec<u8>,
}

impl ShardLines {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if !path.exists() {
            return Err(StorageError::PathNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            line: 0,
            buf: Vec::new(),
        })
    }
}

impl Iterator for ShardLines {
    type Item = Result<(u64, Vec<u8>), StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    self.line += 1;
                    if self.buf.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Some(Ok((self.line, self.buf.clone())));
                }
                Err(e) => return Some(Err(StorageError::Io(e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("games.jsonl");
        fs::write(&path, "{}\n").unwrap();

        let shards = discover_shards(&path).unwrap();
        assert_eq!(shards, vec![path]);
    }

    #[test]
    fn test_discover_directory_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.jsonl"), "").unwrap();
        fs::write(temp_dir.path().join("a.jsonl"), "").unwrap();
        fs::write(temp_dir.path().join("_SUCCESS"), "").unwrap();
        fs::write(temp_dir.path().join(".a.jsonl.crc"), "").unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();

        let shards = discover_shards(temp_dir.path()).unwrap();
        let names: Vec<String> = shards
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
    }

    #[test]
    fn test_discover_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let result = discover_shards(&temp_dir.path().join("nope"));
        assert!(matches!(result, Err(StorageError::PathNotFound(_))));
    }

    #[test]
    fn test_shard_lines_numbers_and_blanks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lines.jsonl");
        fs::write(&path, "first\n\n   \nfourth\r\nfifth").unwrap();

        let lines: Vec<(u64, Vec<u8>)> = ShardLines::open(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let numbers: Vec<u64> = lines.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 4, 5]);
        assert_eq!(lines[2].1, b"fifth".to_vec());
    }

    #[test]
    fn test_shard_lines_invalid_utf8_is_not_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bin.jsonl");
        fs::write(&path, [0xff, 0xfe, b'\n', b'{', b'}']).unwrap();

        let lines: Vec<_> = ShardLines::open(&path).unwrap().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.is_ok()));
    }
}
