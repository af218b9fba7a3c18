//! Parallel key mining.
//!
//! Valid keys are rare (roughly one in tens of millions), so [`mine`] runs
//! several workers that each generate keypairs until one satisfies the
//! acceptance test. The first success flips a shared stop flag; the other
//! workers see it on their next iteration, report how many keys they tried
//! and exit. Nothing is preempted and there is no deadline: callers that need
//! one cancel the [`CancelToken`] themselves.

use crate::error::{Result, SpringError};
use crate::identity::{Creator, Publisher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Cooperative cancellation flag shared between a caller and the miners.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The winning creator and the number of keys tried across all workers.
#[derive(Debug)]
pub struct MineResult {
    pub creator: Creator,
    pub attempts: u64,
}

/// What a single worker hands back when it stops.
struct WorkerReport {
    attempts: u64,
    outcome: Result<Option<Creator>>,
}

/// Mines a creator whose key is valid right now.
pub fn mine(parallelism: usize, cancel: &CancelToken) -> Result<MineResult> {
    mine_with(parallelism, cancel, |publisher| publisher.is_valid_now())
}

/// Mines a creator whose key satisfies `accept`.
///
/// Spawns `parallelism` workers (at least one) and blocks until one of them
/// finds a key, a key generation error occurs, or `cancel` fires. All workers
/// have exited by the time this returns.
pub fn mine_with<F>(parallelism: usize, cancel: &CancelToken, accept: F) -> Result<MineResult>
where
    F: Fn(&Publisher) -> bool + Sync,
{
    let workers = parallelism.max(1);
    let stop = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<WorkerReport>();

    thread::scope(|scope| {
        for id in 0..workers {
            let tx = tx.clone();
            let stop = &stop;
            let accept = &accept;
            scope.spawn(move || {
                let report = run_worker(stop, cancel, accept);
                debug!(worker = id, attempts = report.attempts, "miner finished");
                // the receiver outlives the scope, so this cannot fail
                let _ = tx.send(report);
            });
        }
        drop(tx);

        let mut attempts = 0u64;
        let mut winner: Option<Creator> = None;
        let mut failure: Option<SpringError> = None;

        for report in rx.iter() {
            attempts += report.attempts;
            match report.outcome {
                Ok(Some(creator)) if winner.is_none() && failure.is_none() => {
                    winner = Some(creator);
                    stop.store(true, Ordering::Relaxed);
                }
                Ok(_) => {}
                Err(e) => {
                    if failure.is_none() && winner.is_none() {
                        failure = Some(e);
                    }
                    stop.store(true, Ordering::Relaxed);
                }
            }
        }

        match (winner, failure) {
            (Some(creator), _) => Ok(MineResult { creator, attempts }),
            (None, Some(e)) => Err(e),
            (None, None) => Err(SpringError::Canceled),
        }
    })
}

fn run_worker<F>(stop: &AtomicBool, cancel: &CancelToken, accept: &F) -> WorkerReport
where
    F: Fn(&Publisher) -> bool,
{
    let mut attempts = 0u64;
    loop {
        if stop.load(Ordering::Relaxed) || cancel.is_canceled() {
            return WorkerReport {
                attempts,
                outcome: Ok(None),
            };
        }

        let creator = match Creator::generate() {
            Ok(creator) => creator,
            Err(e) => {
                stop.store(true, Ordering::Relaxed);
                return WorkerReport {
                    attempts,
                    outcome: Err(e),
                };
            }
        };
        attempts += 1;

        if accept(creator.publisher()) {
            stop.store(true, Ordering::Relaxed);
            return WorkerReport {
                attempts,
                outcome: Ok(Some(creator)),
            };
        }
    }
}
