//! Per-record dictionary scan with bounded inner concurrency.
//!
//! Word iteration is cheap; the bcrypt comparison is not. Each candidate
//! comparison runs on the blocking pool holding a permit from an admission
//! limiter, so one record never has more than `inner_workers` comparisons
//! in flight no matter how large the dictionary is.

use std::sync::{Arc, OnceLock};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::dictionary::Dictionary;
use crate::verify::{self, StoredHash, Verification};

/// Terminal state of one record's scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A candidate word verified against the stored hash. When several
    /// candidates verify (possible only under hash collision), the first
    /// comparison to *complete* wins, not the first in dictionary order.
    Matched(String),
    /// Every dictionary word was tried without a match.
    Exhausted,
    /// The stored hash is not usable bcrypt; never retried per word.
    MalformedHash,
    /// The shared cancel signal fired mid-scan. Not "exhausted": the record
    /// must be retried on the next run, so no progress is recorded.
    Cancelled,
}

// One-shot resolution cell; the first successful set also fires `found`.
enum Resolution {
    Matched(usize),
    Malformed,
}

/// Scans the dictionary from the start for this record, stopping at the
/// first completed match, on a malformed hash, or on cancellation.
pub async fn attempt(
    raw_hash: &str,
    dict: &Arc<Dictionary>,
    inner_workers: usize,
    cancel: &CancellationToken,
) -> Verdict {
    let stored = match StoredHash::parse(raw_hash) {
        Ok(hash) => hash,
        Err(_) => return Verdict::MalformedHash,
    };

    let compare = move |candidate: &str| verify::verify(&stored, candidate);
    attempt_with(dict, inner_workers, cancel, compare).await
}

// The comparison is injected so the admission limiter can be instrumented
// without going through real bcrypt work.
async fn attempt_with<F>(
    dict: &Arc<Dictionary>,
    inner_workers: usize,
    cancel: &CancellationToken,
    compare: F,
) -> Verdict
where
    F: Fn(&str) -> Verification + Send + Sync + 'static,
{
    let compare = Arc::new(compare);
    let found = CancellationToken::new();
    let resolution: Arc<OnceLock<Resolution>> = Arc::new(OnceLock::new());
    let limiter = Arc::new(Semaphore::new(inner_workers.max(1)));
    let mut comparisons: JoinSet<()> = JoinSet::new();

    for idx in 0..dict.len() {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = found.cancelled() => break,
            permit = Arc::clone(&limiter).acquire_owned() => {
                permit.expect("admission limiter closed")
            }
        };

        let dict = Arc::clone(dict);
        let compare = Arc::clone(&compare);
        let found = found.clone();
        let resolution = Arc::clone(&resolution);
        comparisons.spawn_blocking(move || {
            let _permit = permit;
            // A sibling already resolved this record; skip the expensive
            // comparison and emit nothing.
            if found.is_cancelled() {
                return;
            }
            let resolved = match compare(dict.word(idx)) {
                Verification::Match => resolution.set(Resolution::Matched(idx)).is_ok(),
                Verification::MalformedHash => resolution.set(Resolution::Malformed).is_ok(),
                Verification::NoMatch => false,
            };
            if resolved {
                found.cancel();
            }
        });
    }

    // Bounded drain: nothing new is submitted past this point and in-flight
    // comparisons finish or abandon on their own.
    while comparisons.join_next().await.is_some() {}

    match resolution.get() {
        Some(Resolution::Matched(idx)) => Verdict::Matched(dict.word(*idx).to_owned()),
        Some(Resolution::Malformed) => Verdict::MalformedHash,
        None if cancel.is_cancelled() => Verdict::Cancelled,
        None => Verdict::Exhausted,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    const TEST_COST: u32 = 4;

    fn dict_of(words: &[&str]) -> Arc<Dictionary> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        std::fs::write(&path, words.join("\n")).unwrap();
        Arc::new(Dictionary::open(&path).unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn finds_the_matching_word() {
        let dict = dict_of(&["alpha", "secret", "zeta"]);
        let hash = bcrypt::hash("secret", TEST_COST).unwrap();

        let verdict = attempt(&hash, &dict, 4, &CancellationToken::new()).await;
        assert_eq!(verdict, Verdict::Matched("secret".to_owned()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serialized_admission_still_reaches_the_last_word() {
        let dict = dict_of(&["alpha", "beta", "gamma", "secret"]);
        let hash = bcrypt::hash("secret", TEST_COST).unwrap();

        let verdict = attempt(&hash, &dict, 1, &CancellationToken::new()).await;
        assert_eq!(verdict, Verdict::Matched("secret".to_owned()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn admission_limiter_bounds_in_flight_comparisons() {
        let words: Vec<String> = (0..12).map(|i| format!("candidate-{i}")).collect();
        let refs: Vec<&str> = words.iter().map(String::as_str).collect();
        let dict = dict_of(&refs);

        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));
        let current = Arc::clone(&in_flight);
        let peak = Arc::clone(&high_water);

        // Slow comparisons force overlap; the high-water mark records the
        // most that ever ran at once.
        let verdict = attempt_with(&dict, 2, &CancellationToken::new(), move |_| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            current.fetch_sub(1, Ordering::SeqCst);
            Verification::NoMatch
        })
        .await;

        assert_eq!(verdict, Verdict::Exhausted);
        let peak = high_water.load(Ordering::SeqCst);
        assert!(peak <= 2, "saw {peak} concurrent comparisons, cap is 2");
        assert!(peak >= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_match_exhausts() {
        let dict = dict_of(&["alpha", "secret", "zeta"]);
        let hash = bcrypt::hash("unknown-word", TEST_COST).unwrap();

        let verdict = attempt(&hash, &dict, 4, &CancellationToken::new()).await;
        assert_eq!(verdict, Verdict::Exhausted);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_hash_resolves_without_scanning() {
        let dict = dict_of(&["alpha", "secret", "zeta"]);

        let verdict = attempt("not-a-bcrypt-hash", &dict, 4, &CancellationToken::new()).await;
        assert_eq!(verdict, Verdict::MalformedHash);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_scan_is_not_exhausted() {
        let dict = dict_of(&["alpha", "secret", "zeta"]);
        let hash = bcrypt::hash("unknown-word", TEST_COST).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let verdict = attempt(&hash, &dict, 4, &cancel).await;
        assert_eq!(verdict, Verdict::Cancelled);
    }
}
