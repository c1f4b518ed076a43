//! The top-level recovery orchestrator.
//!
//! Owns the outer worker pool: a fixed number of tasks each driving one
//! record's dictionary scan at a time, a ledger filter in front of
//! dispatch, and a single cooperative cancellation signal shared by every
//! blocking point. Outcomes are delivered in completion order, not input
//! order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cracker::{self, Verdict};
use crate::dictionary::Dictionary;
use crate::ledger::ProgressLedger;
use crate::record::UserRecord;

/// Tuning for one recovery run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Outer pool size: records in flight simultaneously.
    pub workers: usize,
    /// Inner admission limit: concurrent bcrypt comparisons per record.
    pub inner_workers: usize,
    /// Optional wall-clock budget; the run cancels itself when it elapses.
    pub deadline: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { workers: 20, inner_workers: 100, deadline: None }
    }
}

/// Result reported for one dispatched record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The recovered plaintext. Matches are deliberately not persisted to
    /// the ledger, so a matched record is re-attempted on the next run.
    Matched { plaintext: String },
    /// Full dictionary tried, no match; one ledger entry was appended.
    Exhausted,
    /// The stored hash is unusable; reported once, never retried per word.
    MalformedHash,
    /// Skipped before dispatch: the ledger already holds this (hash,
    /// dictionary) pair.
    AlreadyAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub record: UserRecord,
    pub outcome: Outcome,
}

/// Concurrent credential-recovery engine over one dictionary and one
/// progress ledger.
pub struct Engine {
    dict: Arc<Dictionary>,
    ledger: Arc<ProgressLedger>,
    config: EngineConfig,
    // High-water mark of records in flight, across runs of this engine.
    peak_in_flight: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(dict: Dictionary, ledger: ProgressLedger, config: EngineConfig) -> Self {
        Self {
            dict: Arc::new(dict),
            ledger: Arc::new(ledger),
            config,
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    /// Dispatches `records` across the worker pool and returns the outcome
    /// channel. The channel closes once every worker has returned, which
    /// after cancellation happens within a bounded drain (no new records
    /// are pulled, no new comparisons admitted).
    pub fn run(
        &self,
        records: Vec<UserRecord>,
        cancel: &CancellationToken,
    ) -> mpsc::Receiver<RecordOutcome> {
        let cancel = cancel.child_token();

        if let Some(deadline) = self.config.deadline {
            let timer = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(deadline) => {
                        info!(?deadline, "run deadline reached, cancelling");
                        timer.cancel();
                    }
                    () = timer.cancelled() => {}
                }
            });
        }

        let (tx, rx) = mpsc::channel(self.config.workers.max(1));

        // Ledger filter runs before dispatch: already-attempted records are
        // reported without ever consuming a worker slot.
        let mut queue = VecDeque::new();
        let mut skipped = Vec::new();
        for record in records {
            if self.ledger.has_attempted(&record.hash, self.dict.identity()) {
                skipped.push(record);
            } else {
                queue.push_back(record);
            }
        }

        if !skipped.is_empty() {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                for record in skipped {
                    debug!(username = %record.username, "skip already checked");
                    let outcome = RecordOutcome { record, outcome: Outcome::AlreadyAttempted };
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return,
                        sent = tx.send(outcome) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }

        let queue = Arc::new(Mutex::new(queue));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let mut workers: JoinSet<()> = JoinSet::new();
        for _ in 0..self.config.workers.max(1) {
            let queue = Arc::clone(&queue);
            let dict = Arc::clone(&self.dict);
            let ledger = Arc::clone(&self.ledger);
            let cancel = cancel.clone();
            let tx = tx.clone();
            let inner_workers = self.config.inner_workers;
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&self.peak_in_flight);
            workers.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let Some(record) = queue.lock().await.pop_front() else {
                        return;
                    };
                    debug!(username = %record.username, email = %record.email, "checking record");

                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    let verdict =
                        cracker::attempt(&record.hash, &dict, inner_workers, &cancel).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);

                    let outcome = match verdict {
                        Verdict::Matched(plaintext) => {
                            info!(username = %record.username, "recovered credential");
                            Outcome::Matched { plaintext }
                        }
                        Verdict::Exhausted => {
                            // Causal order: the entry lands only after the
                            // scan truly exhausted, before the emit. The
                            // append is file I/O, so it stays off the
                            // runtime threads.
                            let ledger = Arc::clone(&ledger);
                            let dict = Arc::clone(&dict);
                            let hash = record.hash.clone();
                            let append = tokio::task::spawn_blocking(move || {
                                ledger.mark_attempted(&hash, dict.identity());
                            });
                            if append.await.is_err() {
                                warn!("ledger append task failed");
                            }
                            Outcome::Exhausted
                        }
                        Verdict::MalformedHash => {
                            warn!(username = %record.username, "stored hash is not bcrypt, record unrecoverable");
                            Outcome::MalformedHash
                        }
                        // A cancelled scan is not exhausted: nothing is
                        // recorded and nothing emitted, so the record is
                        // retried on the next run.
                        Verdict::Cancelled => return,
                    };

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return,
                        sent = tx.send(RecordOutcome { record, outcome }) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }

        let peak = Arc::clone(&self.peak_in_flight);
        tokio::spawn(async move {
            while workers.join_next().await.is_some() {}
            debug!(peak_records = peak.load(Ordering::Relaxed), "worker pool drained");
        });

        // The channel closes once the skip task and all workers drop their
        // senders.
        drop(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const TEST_COST: u32 = 4;

    struct Fixture {
        _dir: tempfile::TempDir,
        dict_path: PathBuf,
        ledger_path: PathBuf,
    }

    fn setup(words: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let dict_path = dir.path().join("words.txt");
        std::fs::write(&dict_path, words).unwrap();
        let ledger_path = dir.path().join(".progress.txt");
        Fixture { _dir: dir, dict_path, ledger_path }
    }

    fn engine(fx: &Fixture) -> Engine {
        Engine::new(
            Dictionary::open(&fx.dict_path).unwrap(),
            ProgressLedger::open(&fx.ledger_path).unwrap(),
            EngineConfig { workers: 2, inner_workers: 4, deadline: None },
        )
    }

    async fn collect(mut rx: mpsc::Receiver<RecordOutcome>) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    fn outcome_for<'a>(outcomes: &'a [RecordOutcome], username: &str) -> &'a Outcome {
        &outcomes
            .iter()
            .find(|o| o.record.username == username)
            .expect("missing outcome")
            .outcome
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn match_exhaust_and_resume_scenario() {
        let fx = setup("alpha\nsecret\nzeta\n");
        let r1 = UserRecord::new("alice", "alice@example.com", bcrypt::hash("secret", TEST_COST).unwrap());
        let r2 = UserRecord::new("bob", "bob@example.com", bcrypt::hash("unknown-word", TEST_COST).unwrap());

        let outcomes = collect(
            engine(&fx).run(vec![r1.clone(), r2.clone()], &CancellationToken::new()),
        )
        .await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcome_for(&outcomes, "alice"),
            &Outcome::Matched { plaintext: "secret".to_owned() }
        );
        assert_eq!(outcome_for(&outcomes, "bob"), &Outcome::Exhausted);

        // Exactly one ledger entry, for the exhausted record.
        let ledger_content = std::fs::read_to_string(&fx.ledger_path).unwrap();
        assert_eq!(ledger_content.lines().count(), 1);
        assert!(ledger_content.contains(&r2.hash));

        // Second run: bob is skipped before dispatch, alice (matches are not
        // persisted) is re-attempted and matches again.
        let outcomes =
            collect(engine(&fx).run(vec![r1, r2], &CancellationToken::new())).await;
        assert_eq!(outcome_for(&outcomes, "bob"), &Outcome::AlreadyAttempted);
        assert_eq!(
            outcome_for(&outcomes, "alice"),
            &Outcome::Matched { plaintext: "secret".to_owned() }
        );
        let ledger_content = std::fs::read_to_string(&fx.ledger_path).unwrap();
        assert_eq!(ledger_content.lines().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_hash_reported_inline_without_ledger_entry() {
        let fx = setup("alpha\nsecret\n");
        let record = UserRecord::new("carol", "carol@example.com", "md5:not-bcrypt");

        let outcomes =
            collect(engine(&fx).run(vec![record], &CancellationToken::new())).await;
        assert_eq!(outcome_for(&outcomes, "carol"), &Outcome::MalformedHash);

        let ledger_content = std::fs::read_to_string(&fx.ledger_path).unwrap();
        assert_eq!(ledger_content.lines().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tagged_hash_is_stripped_before_comparison() {
        let fx = setup("alpha\nsecret\n");
        let tagged = format!("{{bcrypt}}{}", bcrypt::hash("secret", TEST_COST).unwrap());
        let record = UserRecord::new("dave", "dave@example.com", tagged);

        let outcomes =
            collect(engine(&fx).run(vec![record], &CancellationToken::new())).await;
        assert_eq!(
            outcome_for(&outcomes, "dave"),
            &Outcome::Matched { plaintext: "secret".to_owned() }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_run_drains_without_outcomes_or_ledger_writes() {
        let fx = setup("alpha\nsecret\nzeta\n");
        let record =
            UserRecord::new("erin", "erin@example.com", bcrypt::hash("unknown-word", TEST_COST).unwrap());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcomes = collect(engine(&fx).run(vec![record], &cancel)).await;
        assert!(outcomes.is_empty());

        let ledger_content = std::fs::read_to_string(&fx.ledger_path).unwrap();
        assert_eq!(ledger_content.lines().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deadline_cancels_a_long_run_without_ledger_writes() {
        // 2500 cost-4 comparisons through 4 permits far outlast the
        // deadline, so the record is guaranteed to be mid-scan at cancel.
        let words: String = (0..2500).map(|i| format!("candidate-{i}\n")).collect();
        let fx = setup(&words);
        let mut engine = engine(&fx);
        engine.config.deadline = Some(Duration::from_millis(50));

        let record =
            UserRecord::new("frank", "frank@example.com", bcrypt::hash("unknown-word", TEST_COST).unwrap());
        let run = engine.run(vec![record], &CancellationToken::new());

        // The channel must close within a bounded drain once the deadline
        // fires, with the mid-scan record neither emitted nor recorded.
        let outcomes = tokio::time::timeout(Duration::from_secs(30), collect(run))
            .await
            .expect("run did not drain after deadline");
        assert!(outcomes.is_empty());

        let ledger_content = std::fs::read_to_string(&fx.ledger_path).unwrap();
        assert_eq!(ledger_content.lines().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_pool_never_exceeds_configured_size() {
        let fx = setup("alpha\nbeta\ngamma\n");
        let engine = engine(&fx); // workers: 2
        let records: Vec<UserRecord> = (0..6)
            .map(|i| {
                UserRecord::new(
                    format!("user{i}"),
                    format!("user{i}@example.com"),
                    bcrypt::hash("unknown-word", TEST_COST).unwrap(),
                )
            })
            .collect();

        let outcomes = collect(engine.run(records, &CancellationToken::new())).await;
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| o.outcome == Outcome::Exhausted));

        let peak = engine.peak_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 2, "saw {peak} records in flight, pool size is 2");
        assert!(peak >= 1);
    }
}
