//! Worker pool executing trials on a dedicated rayon pool.
//!
//! Every spec is dispatched up front. Outcomes travel back over a tokio
//! channel and are exposed in completion order by [`CompletionStream`].

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{Level, debug, info, span, warn};

use super::error::{SweepError, TrialFailure};
use super::runner::{TrialEngine, TrialRunner};
use super::types::{ParameterPoint, TrialOutcome, TrialSpec};

/// Configuration for the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Maximum number of worker threads (0 = one per available core).
    pub max_threads: usize,
}

/// Bounded pool of worker threads.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl WorkerPool {
    /// Build the pool.
    ///
    /// # Errors
    ///
    /// Returns error if the thread pool cannot be created.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, SweepError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_threads)
            .thread_name(|i| format!("sweep-worker-{i}"))
            .build()
            .map_err(|e| SweepError::ThreadPool {
                message: e.to_string(),
            })?;

        Ok(Self { config, pool })
    }

    /// Number of worker threads actually running.
    #[must_use]
    pub fn effective_thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Dispatch every spec and return the stream of their outcomes.
    ///
    /// Each spec runs exactly once. A panic inside a trial is caught and
    /// reported as a retrieval failure for that point.
    pub fn dispatch<E>(&self, runner: Arc<TrialRunner<E>>, specs: Vec<TrialSpec>) -> CompletionStream
    where
        E: TrialEngine + 'static,
    {
        let (sender, receiver) = unbounded_channel();
        let pending: BTreeMap<usize, ParameterPoint> = specs
            .iter()
            .map(|spec| (spec.point.index(), spec.point.clone()))
            .collect();

        info!(
            trials = specs.len(),
            threads = self.effective_thread_count(),
            "Dispatching trials"
        );

        for spec in specs {
            let runner = Arc::clone(&runner);
            let sender: UnboundedSender<TrialOutcome> = sender.clone();
            self.pool.spawn(move || {
                let outcome = execute(&runner, &spec);
                if sender.send(outcome).is_err() {
                    debug!(index = spec.point.index(), "Completion stream dropped; discarding outcome");
                }
            });
        }

        CompletionStream::new(receiver, pending)
    }
}

fn execute<E: TrialEngine>(runner: &TrialRunner<E>, spec: &TrialSpec) -> TrialOutcome {
    let _span = span!(Level::DEBUG, "trial", index = spec.point.index()).entered();
    let start = Instant::now();

    let outcome = catch_unwind(AssertUnwindSafe(|| runner.run(spec))).unwrap_or_else(|payload| {
        TrialOutcome::Failure {
            point: spec.point.clone(),
            failure: TrialFailure::retrieval(format!(
                "worker panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    });

    debug!(
        elapsed_ms = start.elapsed().as_millis(),
        success = outcome.is_success(),
        "Trial finished"
    );
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Outcomes of dispatched trials in completion order.
///
/// Yields exactly one outcome per dispatched spec. Specs whose outcome never
/// arrives are surfaced as retrieval failures once the channel closes.
#[derive(Debug)]
pub struct CompletionStream {
    receiver: UnboundedReceiver<TrialOutcome>,
    pending: BTreeMap<usize, ParameterPoint>,
}

impl CompletionStream {
    pub(crate) const fn new(
        receiver: UnboundedReceiver<TrialOutcome>,
        pending: BTreeMap<usize, ParameterPoint>,
    ) -> Self {
        Self { receiver, pending }
    }

    /// Number of outcomes not yet yielded.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Wait for the next outcome. Returns `None` once every spec is accounted for.
    pub async fn next(&mut self) -> Option<TrialOutcome> {
        while !self.pending.is_empty() {
            let Some(outcome) = self.receiver.recv().await else {
                break;
            };
            if self.pending.remove(&outcome.point().index()).is_some() {
                return Some(outcome);
            }
            warn!(index = outcome.point().index(), "Discarding unexpected outcome");
        }

        let (index, point) = self.pending.pop_first()?;
        warn!(index, parameters = %point, "Trial outcome lost");
        Some(TrialOutcome::Failure {
            point,
            failure: TrialFailure::retrieval("completion channel closed before the trial reported"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;

    use super::*;
    use crate::sweep::error::{FailureKind, TrialError};
    use crate::sweep::runner::{TrialRequest, TrialResponse};
    use crate::sweep::types::{AssetId, StrategyConditions};

    struct FixedEngine;

    impl TrialEngine for FixedEngine {
        fn run_trial(&self, request: &TrialRequest) -> Result<TrialResponse, TrialError> {
            if request.name.contains("a: 3") {
                panic!("engine blew up");
            }
            if request.name.contains("a: 2") {
                return Err(TrialError::Engine {
                    message: "bad data".to_string(),
                });
            }
            Ok(TrialResponse::new(BTreeMap::from([
                ("percent_profitable".to_string(), 0.6),
                ("total_positions".to_string(), 150.0),
                ("percent_liquidated".to_string(), 0.1),
                ("percent_unprofitable".to_string(), 0.3),
            ])))
        }
    }

    fn specs(n: usize) -> Vec<TrialSpec> {
        (0..n)
            .map(|i| TrialSpec {
                point: ParameterPoint::new(i, vec![("a".to_string(), i as i64)]),
                strategy: StrategyConditions {
                    open_price: 0.0,
                    period_days: 14,
                    profit_below_price_factor: 0.1,
                    profit_above_price_factor: 0.1,
                    liquidate_below_price_factor: 0.2,
                    liquidate_above_price_factor: 0.2,
                },
                asset: AssetId::new("btc"),
                start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            })
            .collect()
    }

    fn runner() -> Arc<TrialRunner<FixedEngine>> {
        Arc::new(TrialRunner::new(FixedEngine, BTreeMap::new()))
    }

    #[test]
    fn test_worker_pool_config_default() {
        assert_eq!(WorkerPoolConfig::default().max_threads, 0);
    }

    #[test]
    fn test_explicit_thread_count() {
        let pool = WorkerPool::new(WorkerPoolConfig { max_threads: 3 }).unwrap();
        assert_eq!(pool.effective_thread_count(), 3);
    }

    #[tokio::test]
    async fn every_spec_yields_exactly_one_outcome() {
        let pool = WorkerPool::new(WorkerPoolConfig { max_threads: 4 }).unwrap();
        let mut stream = pool.dispatch(runner(), specs(20));

        let mut seen = BTreeSet::new();
        while let Some(outcome) = stream.next().await {
            assert!(seen.insert(outcome.point().index()));
        }

        assert_eq!(seen.len(), 20);
        assert_eq!(stream.pending(), 0);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let pool = WorkerPool::new(WorkerPoolConfig { max_threads: 2 }).unwrap();
        let mut stream = pool.dispatch(runner(), specs(5));

        let mut outcomes = Vec::new();
        while let Some(outcome) = stream.next().await {
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|o| o.point().index());

        let kinds: Vec<Option<FailureKind>> = outcomes
            .iter()
            .map(|o| match o {
                TrialOutcome::Success { .. } => None,
                TrialOutcome::Failure { failure, .. } => Some(failure.kind),
            })
            .collect();

        assert_eq!(
            kinds,
            vec![
                None,
                None,
                Some(FailureKind::TrialExecution),
                Some(FailureKind::ResultRetrieval),
                None,
            ]
        );
    }

    #[tokio::test]
    async fn panic_message_is_kept() {
        let pool = WorkerPool::new(WorkerPoolConfig { max_threads: 1 }).unwrap();
        let mut stream = pool.dispatch(runner(), specs(4).split_off(3));

        let Some(TrialOutcome::Failure { failure, .. }) = stream.next().await else {
            panic!("expected a failure");
        };
        assert!(failure.message.contains("engine blew up"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn closed_channel_surfaces_pending_points() {
        let (sender, receiver) = unbounded_channel();
        let pending: BTreeMap<usize, ParameterPoint> = (0..3)
            .map(|i| (i, ParameterPoint::new(i, vec![("a".to_string(), i as i64)])))
            .collect();
        let mut stream = CompletionStream::new(receiver, pending);

        sender
            .send(TrialOutcome::Failure {
                point: ParameterPoint::new(1, vec![("a".to_string(), 1)]),
                failure: TrialFailure::retrieval("x"),
            })
            .unwrap();
        drop(sender);

        let mut indices = Vec::new();
        while let Some(outcome) = stream.next().await {
            assert!(!outcome.is_success());
            indices.push(outcome.point().index());
        }

        assert_eq!(indices, vec![1, 0, 2]);
    }

    #[tokio::test]
    async fn empty_dispatch_ends_immediately() {
        let pool = WorkerPool::new(WorkerPoolConfig::default()).unwrap();
        let mut stream = pool.dispatch(runner(), Vec::new());

        assert!(stream.next().await.is_none());
    }
}
