//! Concurrent credential-recovery engine for bcrypt password hashes.
//!
//! Given exported user records (username, email, stored bcrypt hash) and a
//! newline-delimited wordlist, the engine tests every candidate word
//! against every hash and reports which hashes correspond to which words.
//!
//! # Architecture
//!
//! Work fans out at two nested, fixed-size levels:
//!
//! - An outer pool of `workers` tasks, one in-flight record each
//!   ([`engine::Engine`]).
//! - An inner admission limiter of `inner_workers` permits bounding the
//!   concurrent bcrypt comparisons within one record's scan
//!   ([`cracker`]). bcrypt is CPU-expensive by design; comparisons run on
//!   the blocking pool and must never launch unbounded per word.
//!
//! The dictionary is read into memory once and shared read-only across all
//! scans ([`dictionary::Dictionary`]). Records whose full scan found no
//! match are appended to a persisted ledger keyed by (hash, dictionary
//! path, content fingerprint), so a later run against the same wordlist
//! skips them ([`ledger::ProgressLedger`]). Matches are deliberately not
//! persisted and are re-attempted on every run.
//!
//! A single [`CancellationToken`](tokio_util::sync::CancellationToken) is
//! observed at every blocking point: once signalled, no new records are
//! pulled, no new comparisons are admitted, in-flight comparisons drain,
//! and cancelled scans leave no ledger entry so they are retried next run.

pub mod cracker;
pub mod dictionary;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod record;
pub mod verify;

pub use cracker::Verdict;
pub use dictionary::{Dictionary, DictionaryIdentity};
pub use engine::{Engine, EngineConfig, Outcome, RecordOutcome};
pub use error::Error;
pub use ledger::ProgressLedger;
pub use record::UserRecord;
pub use verify::{StoredHash, Verification, verify};
