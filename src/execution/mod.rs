//! Execution engine for running cleaning and estimation with optional parallelism.
//!
//! This module sits "above" [`crate::cleaning`] and [`crate::analysis`] and provides:
//!
//! - Chunked execution of independent per-row / per-cell work (KNN searches, outlier and rule
//!   evaluation), sequential by default or on a rayon pool
//! - Resource limits / throttling (in-flight chunks)
//! - Real-time metrics + observer hooks for monitoring
//!
//! Stages always run one after another; only the work inside a stage is chunked. Results are
//! collected in row order, so a parallel engine produces exactly the same output as the
//! sequential one.

mod observer;
mod semaphore;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;

use crate::error::{EngineError, EngineResult};

pub use observer::{
    CompositeObserver, ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot,
    ExecutionObserver, Stage, StdErrExecutionObserver,
};

use semaphore::Semaphore;

/// Configuration for a parallel [`ExecutionEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Number of worker threads used by the engine.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Number of rows (or missing cells) per chunk.
    pub chunk_size: usize,
    /// Upper bound on concurrently executing chunks.
    ///
    /// This is an additional throttle on top of `num_threads`.
    pub max_in_flight_chunks: usize,
}

fn available_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

impl Default for ExecutionOptions {
    /// One worker and one in-flight chunk per available core.
    fn default() -> Self {
        let n = available_threads();
        Self {
            num_threads: Some(n),
            chunk_size: 1_024,
            max_in_flight_chunks: n.max(1),
        }
    }
}

impl ExecutionOptions {
    fn validate(&self) -> EngineResult<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::invalid_config("chunk_size must be > 0"));
        }
        if self.max_in_flight_chunks == 0 {
            return Err(EngineError::invalid_config("max_in_flight_chunks must be > 0"));
        }
        if self.num_threads == Some(0) {
            return Err(EngineError::invalid_config("num_threads must be > 0 when set"));
        }
        Ok(())
    }
}

/// Runs pipeline stages, chunking their independent work and reporting progress.
///
/// The default engine is sequential and has no observer.
pub struct ExecutionEngine {
    pool: Option<ThreadPool>,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::sequential()
    }
}

impl ExecutionEngine {
    /// A single-threaded engine. Chunks run in order on the calling thread.
    pub fn sequential() -> Self {
        Self {
            pool: None,
            opts: ExecutionOptions {
                num_threads: Some(1),
                chunk_size: 4_096,
                max_in_flight_chunks: 1,
            },
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        }
    }

    /// Create a parallel engine backed by a dedicated rayon pool.
    pub fn new(opts: ExecutionOptions) -> EngineResult<Self> {
        opts.validate()?;

        let threads = opts.num_threads.unwrap_or_else(available_threads);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("survey-worker-{i}"))
            .build()?;

        Ok(Self {
            pool: Some(pool),
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    /// Attach an observer for execution events (metrics/logging).
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.opts
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Wrap one top-level invocation with run metrics and start/finish events.
    pub(crate) fn run<T>(&self, body: impl FnOnce(&Self) -> EngineResult<T>) -> EngineResult<T> {
        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(ExecutionEvent::RunStarted);

        let out = body(self);

        self.metrics.end_run(start.elapsed());
        self.emit(ExecutionEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });
        out
    }

    /// Evaluate `task` for every index in `0..len`, returning results in index order.
    pub(crate) fn map_indices<T, F>(&self, len: usize, task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync,
    {
        let sem = Semaphore::new(self.opts.max_in_flight_chunks);
        let ranges = chunk_ranges(len, self.opts.chunk_size);

        let run_chunk = |range: std::ops::Range<usize>| -> Vec<T> {
            let permit = sem.acquire();
            if permit.waited > Duration::ZERO {
                self.metrics.throttled(permit.waited);
                self.emit(ExecutionEvent::ThrottleWaited {
                    duration: permit.waited,
                });
            }

            self.metrics.chunk_started();
            self.emit(ExecutionEvent::ChunkStarted {
                start_row: range.start,
                row_count: range.end - range.start,
            });

            let mut out = Vec::with_capacity(range.end - range.start);
            for i in range {
                self.metrics.record_item();
                out.push(task(i));
            }

            self.emit(ExecutionEvent::ChunkFinished {
                output_rows: out.len(),
            });
            self.metrics.chunk_finished();
            drop(permit);
            out
        };

        let per_chunk: Vec<Vec<T>> = match &self.pool {
            Some(pool) => pool.install(|| ranges.into_par_iter().map(&run_chunk).collect()),
            None => ranges.into_iter().map(&run_chunk).collect(),
        };

        per_chunk.into_iter().flatten().collect()
    }

    /// Fold stage-level events into the metrics, then notify the observer.
    pub(crate) fn emit(&self, event: ExecutionEvent) {
        match &event {
            ExecutionEvent::StageFinished { report } => self.metrics.stage_finished(report),
            ExecutionEvent::RuleFlagged { .. } => self.metrics.flag_raised(),
            _ => {}
        }
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

fn chunk_ranges(row_count: usize, chunk_size: usize) -> Vec<std::ops::Range<usize>> {
    if row_count == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(row_count.div_ceil(chunk_size));
    let mut start = 0usize;
    while start < row_count {
        let end = (start + chunk_size).min(row_count);
        out.push(start..end);
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{chunk_ranges, ExecutionEngine, ExecutionOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::error::EngineError;
    use crate::execution::{ExecutionEvent, ExecutionObserver};

    #[test]
    fn chunk_ranges_cover_all_rows() {
        assert!(chunk_ranges(0, 4).is_empty());
        assert_eq!(chunk_ranges(10, 4), vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let err = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(2),
            chunk_size: 0,
            max_in_flight_chunks: 1,
        })
        .err()
        .unwrap();
        assert!(matches!(err, EngineError::InvalidConfig { .. }));

        let err = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(0),
            chunk_size: 1,
            max_in_flight_chunks: 1,
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("num_threads"));
    }

    #[test]
    fn parallel_map_preserves_index_order() {
        let engine = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(4),
            chunk_size: 3,
            max_in_flight_chunks: 4,
        })
        .unwrap();
        assert!(engine.is_parallel());

        let out = engine.map_indices(100, |i| i * 2);
        assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
        assert_eq!(
            out,
            ExecutionEngine::sequential().map_indices(100, |i| i * 2)
        );
    }

    #[derive(Default)]
    struct ChunkCounter {
        started: AtomicUsize,
        throttled: AtomicUsize,
    }

    impl ExecutionObserver for ChunkCounter {
        fn on_event(&self, event: &ExecutionEvent) {
            match event {
                ExecutionEvent::ChunkStarted { .. } => {
                    self.started.fetch_add(1, Ordering::SeqCst);
                }
                ExecutionEvent::ThrottleWaited { .. } => {
                    self.throttled.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn single_permit_serializes_chunks() {
        let counter = Arc::new(ChunkCounter::default());
        let engine = ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(4),
            chunk_size: 1,
            max_in_flight_chunks: 1,
        })
        .unwrap()
        .with_observer(counter.clone());

        let out = engine
            .run(|e| {
                Ok(e.map_indices(40, |i| {
                    // Long enough for chunks to overlap without the throttle.
                    std::thread::sleep(Duration::from_millis(2));
                    i % 3
                }))
            })
            .unwrap();
        assert_eq!(out.len(), 40);
        assert_eq!(counter.started.load(Ordering::SeqCst), 40);

        let snap = engine.metrics().snapshot();
        assert_eq!(snap.run_id, 1);
        assert_eq!(snap.items_processed, 40);
        assert_eq!((snap.chunks_started, snap.chunks_finished), (40, 40));
        assert_eq!(snap.peak_in_flight, 1);
        assert!(snap.throttle_wait > Duration::ZERO);
        assert!(counter.throttled.load(Ordering::SeqCst) > 0);
        assert!(snap.elapsed.is_some());
    }

    #[test]
    fn sequential_engine_runs_one_chunk_per_block() {
        let engine = ExecutionEngine::sequential();
        assert!(!engine.is_parallel());
        let out = engine.map_indices(10_000, |i| i);
        assert_eq!(out.len(), 10_000);

        let snap = engine.metrics().snapshot();
        assert_eq!(snap.chunks_started, 3);
        assert_eq!(snap.peak_in_flight, 1);
        assert_eq!(snap.throttle_wait, Duration::ZERO);
    }
}
