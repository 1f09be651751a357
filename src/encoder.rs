//! Encoding of a string column into the base components of an attribute.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use log::info;

use crate::attribute::component::ComponentKind;
use crate::config::MAX_WIRE_VALUE;
use crate::error::{PosattrError, Result};
use crate::storage::int_file::IntFileWriter;

/// Summary of a finished encoding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct EncodeSummary {
    pub tokens: u64,
    pub lexicon_size: u32,
    pub lexicon_bytes: u64,
}

/// Builds the lexicon, lexicon index and token stream of one attribute.
///
/// Ids are assigned in first-seen order.
#[derive(Debug)]
pub struct AttributeEncoder {
    name: String,
    ids: AHashMap<String, u32>,
    lexicon: BufWriter<File>,
    lexicon_path: PathBuf,
    lexicon_bytes: u64,
    index: IntFileWriter,
    stream: IntFileWriter,
}

impl AttributeEncoder {
    /// Start encoding attribute `name` below `dir`. None of the base files
    /// may exist yet.
    pub fn create<P: AsRef<Path>>(dir: P, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let path_of = |kind: ComponentKind| dir.join(format!("{name}{}", kind.suffix()));

        let lexicon_path = path_of(ComponentKind::Lexicon);
        let lexicon = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lexicon_path)
            .map_err(|e| PosattrError::io_at(&lexicon_path, "create", e))?;

        Ok(AttributeEncoder {
            name: name.to_string(),
            ids: AHashMap::new(),
            lexicon: BufWriter::new(lexicon),
            lexicon_path,
            lexicon_bytes: 0,
            index: IntFileWriter::create(path_of(ComponentKind::LexiconIndex))?,
            stream: IntFileWriter::create(path_of(ComponentKind::TokenStream))?,
        })
    }

    /// Append one token, returning its id.
    pub fn push(&mut self, token: &str) -> Result<u32> {
        if let Some(&id) = self.ids.get(token) {
            self.stream.push(id)?;
            return Ok(id);
        }
        if token.as_bytes().contains(&0) {
            return Err(PosattrError::invalid_argument(format!(
                "token {:?} contains a NUL byte",
                token
            )));
        }
        if self.lexicon_bytes > MAX_WIRE_VALUE {
            return Err(PosattrError::limit(format!(
                "lexicon of attribute {} exceeds {MAX_WIRE_VALUE} bytes",
                self.name
            )));
        }

        let id = self.ids.len() as u32;
        self.index.push(self.lexicon_bytes as u32)?;
        self.lexicon
            .write_all(token.as_bytes())
            .and_then(|_| self.lexicon.write_all(&[0]))
            .map_err(|e| PosattrError::io_at(&self.lexicon_path, "write", e))?;
        self.lexicon_bytes += token.len() as u64 + 1;
        self.ids.insert(token.to_string(), id);
        self.stream.push(id)?;
        Ok(id)
    }

    /// Number of tokens pushed so far.
    pub fn token_count(&self) -> u64 {
        self.stream.count()
    }

    /// Flush all three files.
    pub fn finish(mut self) -> Result<EncodeSummary> {
        if self.stream.count() > MAX_WIRE_VALUE {
            return Err(PosattrError::limit(format!(
                "attribute {} has {} tokens, more than {MAX_WIRE_VALUE}",
                self.name,
                self.stream.count()
            )));
        }
        self.lexicon
            .flush()
            .map_err(|e| PosattrError::io_at(&self.lexicon_path, "flush", e))?;
        let lexicon_size = self.index.finish()? as u32;
        let tokens = self.stream.finish()?;
        info!(
            "encoded attribute {}: {tokens} tokens, {lexicon_size} types",
            self.name
        );
        Ok(EncodeSummary {
            tokens,
            lexicon_size,
            lexicon_bytes: self.lexicon_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::int_file::read_int_file;
    use tempfile::TempDir;

    #[test]
    fn test_first_seen_ids() {
        let temp_dir = TempDir::new().unwrap();
        let mut encoder = AttributeEncoder::create(temp_dir.path(), "word").unwrap();
        for token in ["a", "b", "a", "c"] {
            encoder.push(token).unwrap();
        }
        let summary = encoder.finish().unwrap();

        assert_eq!(summary.tokens, 4);
        assert_eq!(summary.lexicon_size, 3);
        assert_eq!(
            std::fs::read(temp_dir.path().join("word.lexicon")).unwrap(),
            b"a\0b\0c\0"
        );
        assert_eq!(
            read_int_file(temp_dir.path().join("word.lexicon.idx")).unwrap(),
            vec![0, 2, 4]
        );
        assert_eq!(
            read_int_file(temp_dir.path().join("word.corpus")).unwrap(),
            vec![0, 1, 0, 2]
        );
    }

    #[test]
    fn test_rejects_nul_and_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut encoder = AttributeEncoder::create(temp_dir.path(), "word").unwrap();
        assert!(encoder.push("bad\0token").is_err());
        encoder.finish().unwrap();

        assert!(AttributeEncoder::create(temp_dir.path(), "word").is_err());
    }
}
