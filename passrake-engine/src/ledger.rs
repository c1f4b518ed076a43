use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};

use crate::dictionary::DictionaryIdentity;
use crate::error::Error;

/// Persisted record of which (hash, dictionary) pairs were already scanned
/// to exhaustion without a match.
///
/// On-disk format is an append-only text file, one entry per line:
///
/// ```text
/// <hash> <dictionary-path> <fingerprint-hex> <timestamp-rfc3339>
/// ```
///
/// The whole file is parsed once at open into an in-memory set, so
/// membership checks are O(1) instead of a per-check linear rescan of the
/// file. Appends are serialized behind a mutex and flushed to the OS before
/// `mark_attempted` returns: a process crash right after the call loses
/// nothing, an OS crash may lose the most recent entries.
///
/// Losing the ledger only costs redundant work on the next run, so write
/// failures degrade to "no resume capability" instead of aborting the run.
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    index: HashSet<(String, String, String)>,
    // None once appending has failed; the run continues without resume.
    file: Option<File>,
}

impl ProgressLedger {
    /// Opens (or creates) the ledger at `path` and rebuilds the in-memory
    /// index from any existing entries. An absent file means "nothing
    /// attempted yet" and is not an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        let mut index = HashSet::new();
        match File::open(&path) {
            Ok(f) => {
                for line in BufReader::new(f).lines() {
                    let line = line.map_err(|source| Error::Ledger {
                        path: path.clone(),
                        source,
                    })?;
                    match parse_entry(&line) {
                        Some(key) => {
                            index.insert(key);
                        }
                        None => debug!(%line, "skipping malformed ledger line"),
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(Error::Ledger { path, source }),
        }

        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "progress ledger not writable, resume disabled for this run");
                None
            }
        };

        Ok(Self { path, inner: Mutex::new(Inner { index, file }) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if `hash` was already scanned to exhaustion against exactly this
    /// dictionary content.
    pub fn has_attempted(&self, hash: &str, dict: &DictionaryIdentity) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.index.contains(&key_of(hash, dict))
    }

    /// Records that `hash` was scanned to exhaustion against `dict`.
    ///
    /// Duplicate marks are harmless and skipped. A failed append is logged
    /// and disables further appends rather than failing the caller.
    pub fn mark_attempted(&self, hash: &str, dict: &DictionaryIdentity) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.index.insert(key_of(hash, dict)) {
            return;
        }

        let Some(file) = inner.file.as_mut() else { return };
        let entry = format!(
            "{} {} {} {}\n",
            hash,
            dict.path().display(),
            dict.fingerprint(),
            Utc::now().to_rfc3339(),
        );
        if let Err(e) = file.write_all(entry.as_bytes()).and_then(|()| file.flush()) {
            warn!(path = %self.path.display(), error = %e, "progress ledger append failed, resume disabled for this run");
            inner.file = None;
        }
    }

    /// Number of distinct attempted triples currently indexed.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key_of(hash: &str, dict: &DictionaryIdentity) -> (String, String, String) {
    (
        hash.to_owned(),
        dict.path().display().to_string(),
        dict.fingerprint().to_owned(),
    )
}

// First three whitespace-separated fields; the trailing timestamp is kept
// only for humans reading the file.
fn parse_entry(line: &str) -> Option<(String, String, String)> {
    let mut fields = line.split_whitespace();
    let hash = fields.next()?;
    let path = fields.next()?;
    let fingerprint = fields.next()?;
    Some((hash.to_owned(), path.to_owned(), fingerprint.to_owned()))
}
