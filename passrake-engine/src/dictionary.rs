use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::Error;

/// Stable key identifying a specific dictionary file's content.
///
/// Progress is recorded against the path *and* a SHA-256 digest of the raw
/// file bytes, so attempts made against one wordlist are never mistaken for
/// attempts against a different version of "the same" file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryIdentity {
    path: PathBuf,
    fingerprint: String,
}

impl DictionaryIdentity {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercase hex rendering of the content digest.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// An in-memory candidate wordlist, loaded once and shared read-only.
///
/// The whole file is read at open time and every per-record scan takes an
/// independent cursor over the same immutable content. This replaces
/// re-reading a live file handle per record: no redundant I/O, and no
/// shared-offset hazard between concurrent scans.
#[derive(Debug)]
pub struct Dictionary {
    identity: DictionaryIdentity,
    words: Vec<String>,
}

impl Dictionary {
    /// Reads the wordlist at `path`: one candidate per line, file order
    /// preserved, empty lines skipped. The content fingerprint is computed
    /// here, once.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::DictionaryNotFound { path: path.to_path_buf() }
            } else {
                Error::Io(e)
            }
        })?;

        let fingerprint = hex::encode(Sha256::digest(&bytes));

        let words: Vec<String> = String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Self {
            identity: DictionaryIdentity { path: path.to_path_buf(), fingerprint },
            words,
        })
    }

    pub fn identity(&self) -> &DictionaryIdentity {
        &self.identity
    }

    /// Candidate words in file order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    /// Indexed access, used to share single words with blocking comparison
    /// tasks without cloning the word.
    pub fn word(&self, idx: usize) -> &str {
        &self.words[idx]
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
