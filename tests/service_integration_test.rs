/// Integration tests for the async risk service and report export
mod common;

use arbo_risk::{
    reporting::{ExportFormat, ReportExporter},
    RiskService,
};
use common::{synthetic_examples, synthetic_observations, test_config};
use std::sync::Arc;

#[tokio::test]
async fn test_train_score_export() {
    let service = RiskService::new(test_config());
    let examples = synthetic_examples(&["Recife", "Natal"], 150, 21);
    let observations: Vec<_> = examples.iter().map(|e| e.observation.clone()).collect();

    service.train(examples).await.unwrap();
    let outcome = service.score(observations).await.unwrap();
    let forecast = service.forecast_points().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let exporter = ReportExporter::new(dir.path());
    exporter
        .export_reports(&outcome.reports, ExportFormat::Both)
        .await
        .unwrap();
    exporter.export_summaries(&outcome.summaries).await.unwrap();
    exporter
        .export_forecast(&forecast, ExportFormat::Csv)
        .await
        .unwrap();

    for file in ["reports.json", "reports.csv", "summaries.json", "forecast.csv"] {
        assert!(dir.path().join(file).exists(), "{} missing", file);
    }

    let csv = std::fs::read_to_string(dir.path().join("reports.csv")).unwrap();
    assert_eq!(csv.lines().count(), 301);

    let forecast_csv = std::fs::read_to_string(dir.path().join("forecast.csv")).unwrap();
    assert_eq!(forecast_csv.lines().count(), 1 + 2 * (150 + 14));
}

#[tokio::test]
async fn test_concurrent_scoring() {
    let service = Arc::new(RiskService::new(test_config()));
    service
        .train(synthetic_examples(&["Salvador"], 120, 22))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for seed in 0..4 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let observations = synthetic_observations(&["Salvador"], 30, 100 + seed);
            service.score(observations).await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.reports.len(), 30);
    }
}

#[tokio::test]
async fn test_retraining_replaces_pipeline() {
    let service = RiskService::new(test_config());

    let first = service
        .train(synthetic_examples(&["Recife"], 100, 23))
        .await
        .unwrap();
    let second = service
        .train(synthetic_examples(&["Recife", "Natal"], 100, 24))
        .await
        .unwrap();

    assert_ne!(first.run_id, second.run_id);

    let stats = service.stats().await;
    assert_eq!(stats.training_runs, 2);
    assert_eq!(stats.n_training_rows, 200);
    assert!(stats.training_accuracy.is_some());
}

#[tokio::test]
async fn test_evaluate_through_service() {
    let service = RiskService::new(test_config());
    let report = service
        .evaluate(synthetic_examples(&["Maceio"], 150, 25))
        .await
        .unwrap();

    assert_eq!(report.n_train + report.n_test, 150);
    assert!(report.forecast.is_some());
}
