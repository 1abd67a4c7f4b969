use std::sync::{Arc, Mutex};

use survey_engine::analysis::run_analysis_on;
use survey_engine::cleaning::CleaningPipeline;
use survey_engine::config::{AnalysisConfig, CleaningConfig, WeightConfig};
use survey_engine::execution::{
    CompositeObserver, ExecutionEngine, ExecutionEvent, ExecutionObserver, ExecutionOptions, Stage,
    StdErrExecutionObserver,
};
use survey_engine::types::{TabularDataset, Value};

#[derive(Default)]
struct RecordingObserver {
    stages: Mutex<Vec<Stage>>,
    skipped: Mutex<Vec<String>>,
    chunks: Mutex<usize>,
    finished_runs: Mutex<usize>,
}

impl ExecutionObserver for RecordingObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StageFinished { report } => {
                self.stages.lock().unwrap().push(report.stage)
            }
            ExecutionEvent::EstimateSkipped { column } => {
                self.skipped.lock().unwrap().push(column.clone())
            }
            ExecutionEvent::ChunkFinished { .. } => *self.chunks.lock().unwrap() += 1,
            ExecutionEvent::RunFinished { .. } => *self.finished_runs.lock().unwrap() += 1,
            _ => {}
        }
    }
}

fn survey(n: usize) -> TabularDataset {
    let rows = (0..n)
        .map(|i| {
            let score = if i % 5 == 0 { Value::Missing } else { Value::Number((i % 13) as f64) };
            vec![Value::Number((i % 7) as f64), score, Value::text("free text")]
        })
        .collect();
    TabularDataset::new(vec!["f".into(), "score".into(), "comment".into()], rows).unwrap()
}

fn cleaning() -> CleaningConfig {
    CleaningConfig::from_json_str(
        r#"{
            "imputation": {"method": "knn", "columns": ["score"]},
            "outliers": {"method": "iqr", "threshold": 1.5, "action": "cap", "columns": ["score"]},
            "rules": [{"column": "score", "condition": "range", "value": {"min": 0, "max": 10}, "action": "flag"}]
        }"#,
    )
    .unwrap()
}

#[test]
fn observer_sees_every_stage_in_order() {
    let obs = Arc::new(RecordingObserver::default());
    let engine = ExecutionEngine::sequential().with_observer(obs.clone());

    let report = run_analysis_on(
        &engine,
        &survey(50),
        &cleaning(),
        &WeightConfig::default(),
        &AnalysisConfig::for_targets(["score", "comment"]),
    )
    .unwrap();

    assert_eq!(
        *obs.stages.lock().unwrap(),
        vec![
            Stage::Imputation,
            Stage::Outliers,
            Stage::Validation,
            Stage::Estimation,
            Stage::Descriptive,
        ]
    );
    assert_eq!(*obs.skipped.lock().unwrap(), vec!["comment".to_string()]);
    assert_eq!(report.estimates.len(), 1);
    assert_eq!(*obs.finished_runs.lock().unwrap(), 1);
}

#[test]
fn parallel_engine_chunks_work_and_reports_metrics() {
    let obs = Arc::new(RecordingObserver::default());
    let engine = ExecutionEngine::new(ExecutionOptions {
        num_threads: Some(3),
        chunk_size: 25,
        max_in_flight_chunks: 2,
    })
    .unwrap()
    .with_observer(Arc::new(CompositeObserver::new(vec![
        obs.clone() as Arc<dyn ExecutionObserver>,
        Arc::new(StdErrExecutionObserver),
    ])));

    let ds = survey(200);
    let parallel = CleaningPipeline::new(cleaning()).run_on(&engine, &ds).unwrap();
    let sequential = CleaningPipeline::new(cleaning()).run(&ds).unwrap();
    assert_eq!(parallel, sequential);

    // 40 missing scores in 2 chunks, then 200 rows in 8 chunks for outliers and again for rules.
    assert_eq!(*obs.chunks.lock().unwrap(), 2 + 8 + 8);

    let snapshot = engine.metrics().snapshot();
    assert_eq!(snapshot.run_id, 1);
    assert_eq!(snapshot.items_processed, 40 + 200 + 200);
    assert_eq!(snapshot.stages_completed, 3);
    assert_eq!(snapshot.flags_raised as usize, parallel.flags.len());
    assert_eq!(snapshot.chunks_started, snapshot.chunks_finished);
    assert!(snapshot.peak_in_flight <= 2);
    assert!(snapshot.elapsed.is_some());
}

#[test]
fn failed_runs_still_report_completion() {
    let obs = Arc::new(RecordingObserver::default());
    let engine = ExecutionEngine::sequential().with_observer(obs.clone());

    let err = run_analysis_on(
        &engine,
        &survey(10),
        &CleaningConfig::default(),
        &WeightConfig::weighted_by("w"),
        &AnalysisConfig::for_targets(["score"]),
    )
    .unwrap_err();

    assert_eq!(err.to_string(), "unknown column 'w'");
    assert_eq!(*obs.finished_runs.lock().unwrap(), 1);
    assert!(obs.stages.lock().unwrap().is_empty());
}
