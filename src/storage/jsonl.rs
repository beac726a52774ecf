//! JSONL (JSON Lines) storage.
//!
//! Used for both the intermediate store between the two phases and the final
//! output shards. Each line is one JSON object.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::StorageError;

/// JSONL file writer.
pub struct JsonlWriter<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize> JsonlWriter<T> {
    /// Create a new JSONL writer for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Ensure the parent directory exists.
    fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append multiple entities to the file. An empty batch creates nothing.
    pub fn append_batch(&self, entities: &[T]) -> Result<usize, StorageError> {
        if entities.is_empty() {
            return Ok(0);
        }

        self.ensure_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = BufWriter::new(file);
        let mut count = 0;
        for entity in entities {
            write_line(&mut writer, entity)?;
            count += 1;
        }
        writer.flush()?;
        debug!("Appended {} entities to {:?}", count, self.path);

        Ok(count)
    }

    /// Open the file for streaming writes, replacing any previous content.
    pub fn create(self) -> Result<JsonlSink<T>, StorageError> {
        self.ensure_dir()?;
        let file = File::create(&self.path)?;
        Ok(JsonlSink {
            writer: BufWriter::new(file),
            path: self.path,
            count: 0,
            _marker: PhantomData,
        })
    }
}

/// Streaming JSONL writer; entities are written as they are produced.
pub struct JsonlSink<T> {
    writer: BufWriter<File>,
    path: PathBuf,
    count: usize,
    _marker: PhantomData<T>,
}

impl<T: Serialize> JsonlSink<T> {
    pub fn write(&mut self, entity: &T) -> Result<(), StorageError> {
        write_line(&mut self.writer, entity)?;
        self.count += 1;
        Ok(())
    }

    /// Flush and return the number of entities written.
    pub fn finish(mut self) -> Result<usize, StorageError> {
        self.writer.flush()?;
        debug!("Wrote {} entities to {:?}", self.count, self.path);
        Ok(self.count)
    }
}

fn write_line<T: Serialize, W: Write>(writer: &mut W, entity: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string(entity)?;
    writeln!(writer, "{}", json)?;
    Ok(())
}

/// JSONL file reader.
pub struct JsonlReader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    /// Create a new JSONL reader for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    /// Check if the file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create a strict iterator over the file; a bad line is an error.
    pub fn iter(&self) -> Result<JsonlIterator<T>, StorageError> {
        if !self.path.exists() {
            return Err(StorageError::PathNotFound(self.path.clone()));
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        Ok(JsonlIterator {
            reader,
            _marker: PhantomData,
        })
    }
}

/// Iterator over JSONL file entries.
pub struct JsonlIterator<T> {
    reader: BufReader<File>,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> Iterator for JsonlIterator<T> {
    type Item = Result<T, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();

        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(&line).map_err(StorageError::Json));
                }
                Err(e) => return Some(Err(StorageError::Io(e))),
            }
        }
    }
}
