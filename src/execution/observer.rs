use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cleaning::{RuleFlag, StageReport};

/// Pipeline stage identifiers, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Imputation,
    Outliers,
    Validation,
    Estimation,
    Descriptive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Imputation => "imputation",
            Self::Outliers => "outliers",
            Self::Validation => "validation",
            Self::Estimation => "estimation",
            Self::Descriptive => "descriptive",
        };
        f.write_str(name)
    }
}

/// Execution events emitted by the engine.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted,
    StageStarted { stage: Stage },
    ThrottleWaited { duration: Duration },
    ChunkStarted { start_row: usize, row_count: usize },
    ChunkFinished { output_rows: usize },
    StageFinished { report: StageReport },
    RuleFlagged { flag: RuleFlag },
    /// An estimation target had no parseable observations and was left out of the results.
    EstimateSkipped { column: String },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// A simple stderr logger for execution events.
///
/// Chunk-level events are skipped; everything else is printed one line per event.
#[derive(Debug, Default)]
pub struct StdErrExecutionObserver;

impl ExecutionObserver for StdErrExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::ChunkStarted { .. } | ExecutionEvent::ChunkFinished { .. } => {}
            ExecutionEvent::StageFinished { report } => eprintln!(
                "[survey][{}] rows {} -> {} cells_modified={}",
                report.stage, report.rows_in, report.rows_out, report.cells_modified
            ),
            ExecutionEvent::RuleFlagged { flag } => eprintln!(
                "[survey][flag] row={} rule={} column={}",
                flag.row, flag.rule, flag.column
            ),
            ExecutionEvent::RunFinished { metrics, .. } => eprintln!("[survey][done] {metrics}"),
            other => eprintln!("[survey] {other:?}"),
        }
    }
}

/// An observer that fans out events to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn ExecutionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ExecutionObserver for CompositeObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}

/// Live counters for the current run.
///
/// Chunk counters are updated from worker threads while a stage executes; stage counters are
/// updated as stage and flag events are emitted. [`ExecutionMetrics::snapshot`] may be taken from
/// any thread, including from inside an observer.
#[derive(Default)]
pub struct ExecutionMetrics {
    runs: AtomicU64,
    elapsed_ns: AtomicU64,
    work: WorkCounters,
    stages: StageCounters,
}

/// Chunked per-row / per-cell work.
#[derive(Default)]
struct WorkCounters {
    items: AtomicU64,
    chunks_started: AtomicU64,
    chunks_finished: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    throttle_wait_ns: AtomicU64,
}

/// Outcome of finished stages.
#[derive(Default)]
struct StageCounters {
    completed: AtomicU64,
    cells_modified: AtomicU64,
    rows_dropped: AtomicU64,
    flags_raised: AtomicU64,
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every counter and bump the run id.
    pub fn begin_run(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);

        let w = &self.work;
        for c in [&w.items, &w.chunks_started, &w.chunks_finished, &w.throttle_wait_ns] {
            c.store(0, Ordering::Relaxed);
        }
        w.in_flight.store(0, Ordering::Relaxed);
        w.peak_in_flight.store(0, Ordering::Relaxed);

        let s = &self.stages;
        for c in [&s.completed, &s.cells_modified, &s.rows_dropped, &s.flags_raised] {
            c.store(0, Ordering::Relaxed);
        }
    }

    /// Record the run's wall time. Never stored as zero, so a finished run always reports one.
    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns.store(nanos(elapsed).max(1), Ordering::SeqCst);
    }

    pub fn record_item(&self) {
        self.work.items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_started(&self) {
        self.work.chunks_started.fetch_add(1, Ordering::Relaxed);
        let now = self.work.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.work.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    pub fn chunk_finished(&self) {
        self.work.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.work.chunks_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn throttled(&self, waited: Duration) {
        self.work.throttle_wait_ns.fetch_add(nanos(waited), Ordering::Relaxed);
    }

    pub fn stage_finished(&self, report: &StageReport) {
        let s = &self.stages;
        s.completed.fetch_add(1, Ordering::Relaxed);
        s.cells_modified.fetch_add(report.cells_modified as u64, Ordering::Relaxed);
        s.rows_dropped
            .fetch_add(report.rows_in.saturating_sub(report.rows_out) as u64, Ordering::Relaxed);
    }

    pub fn flag_raised(&self) {
        self.stages.flags_raised.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let (w, s) = (&self.work, &self.stages);
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        ExecutionMetricsSnapshot {
            run_id: self.runs.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            items_processed: w.items.load(Ordering::Relaxed),
            chunks_started: w.chunks_started.load(Ordering::Relaxed),
            chunks_finished: w.chunks_finished.load(Ordering::Relaxed),
            peak_in_flight: w.peak_in_flight.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(w.throttle_wait_ns.load(Ordering::Relaxed)),
            stages_completed: s.completed.load(Ordering::Relaxed),
            cells_modified: s.cells_modified.load(Ordering::Relaxed),
            rows_dropped: s.rows_dropped.load(Ordering::Relaxed),
            flags_raised: s.flags_raised.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ExecutionMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    /// Number of runs started on this engine; the current run's id.
    pub run_id: u64,
    /// `None` while the run is in progress.
    pub elapsed: Option<Duration>,
    /// Rows or missing cells handed to chunked stage work.
    pub items_processed: u64,
    pub chunks_started: u64,
    pub chunks_finished: u64,
    /// Most chunks observed executing at the same time.
    pub peak_in_flight: usize,
    pub throttle_wait: Duration,
    pub stages_completed: u64,
    pub cells_modified: u64,
    pub rows_dropped: u64,
    pub flags_raised: u64,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run={} stages={} cells_modified={} rows_dropped={} flags={} items={} chunks={}/{} \
             peak_in_flight={} throttled={:?}",
            self.run_id,
            self.stages_completed,
            self.cells_modified,
            self.rows_dropped,
            self.flags_raised,
            self.items_processed,
            self.chunks_finished,
            self.chunks_started,
            self.peak_in_flight,
            self.throttle_wait,
        )?;
        if let Some(elapsed) = self.elapsed {
            write!(f, " elapsed={elapsed:?}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ExecutionMetrics, Stage};
    use crate::cleaning::StageReport;

    #[test]
    fn stage_reports_accumulate_until_next_run() {
        let m = ExecutionMetrics::new();
        m.begin_run();
        m.stage_finished(&StageReport {
            stage: Stage::Imputation,
            rows_in: 10,
            rows_out: 8,
            cells_modified: 0,
        });
        m.stage_finished(&StageReport {
            stage: Stage::Outliers,
            rows_in: 8,
            rows_out: 8,
            cells_modified: 3,
        });
        m.flag_raised();

        let snap = m.snapshot();
        assert_eq!(snap.stages_completed, 2);
        assert_eq!(snap.rows_dropped, 2);
        assert_eq!(snap.cells_modified, 3);
        assert_eq!(snap.flags_raised, 1);
        assert_eq!(snap.elapsed, None);

        m.end_run(Duration::ZERO);
        assert_eq!(m.snapshot().elapsed, Some(Duration::from_nanos(1)));

        m.begin_run();
        let snap = m.snapshot();
        assert_eq!(snap.run_id, 2);
        assert_eq!(snap.stages_completed, 0);
        assert_eq!(snap.elapsed, None);
    }

    #[test]
    fn peak_in_flight_tracks_overlap() {
        let m = ExecutionMetrics::new();
        m.chunk_started();
        m.chunk_started();
        m.chunk_finished();
        m.chunk_started();
        m.chunk_finished();
        m.chunk_finished();
        let snap = m.snapshot();
        assert_eq!(snap.peak_in_flight, 2);
        assert_eq!((snap.chunks_started, snap.chunks_finished), (3, 3));
    }

    #[test]
    fn display_is_a_single_line() {
        let line = ExecutionMetrics::new().snapshot().to_string();
        assert!(line.starts_with("run=0 stages=0"));
        assert!(!line.contains('\n'));
        assert!(!line.contains("elapsed"));
    }
}
