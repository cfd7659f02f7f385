//! Report export formats and utilities

use crate::error::{AppError, Result};
use crate::models::{CitySummary, ForecastHorizon, ForecastPoint, RiskCategory, RiskReport};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use tokio::fs;
use tracing::info;

/// Export format for reports
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Both,
}

impl ExportFormat {
    pub fn includes_json(&self) -> bool {
        matches!(self, ExportFormat::Json | ExportFormat::Both)
    }

    pub fn includes_csv(&self) -> bool {
        matches!(self, ExportFormat::Csv | ExportFormat::Both)
    }
}

/// One CSV line per report
#[derive(Debug, Serialize)]
struct ReportRecord<'a> {
    city: &'a str,
    date: NaiveDate,
    category: RiskCategory,
    classifier_category: RiskCategory,
    confidence: f64,
    p_low: f64,
    p_medium: f64,
    p_high: f64,
    risk_score: f64,
    forecast_category: Option<RiskCategory>,
    yhat: Option<f64>,
    yhat_lower: Option<f64>,
    yhat_upper: Option<f64>,
    top_features: String,
}

impl<'a> From<&'a RiskReport> for ReportRecord<'a> {
    fn from(report: &'a RiskReport) -> Self {
        let p = |c: RiskCategory| report.classifier.probability(&c.to_string());
        Self {
            city: &report.city,
            date: report.date,
            category: report.category,
            classifier_category: report.classifier.value,
            confidence: report.classifier.confidence,
            p_low: p(RiskCategory::Low),
            p_medium: p(RiskCategory::Medium),
            p_high: p(RiskCategory::High),
            risk_score: report.risk_score,
            forecast_category: report.forecast_category,
            yhat: report.forecast.as_ref().map(|f| f.likelihood),
            yhat_lower: report.forecast.as_ref().map(|f| f.interval.lower),
            yhat_upper: report.forecast.as_ref().map(|f| f.interval.upper),
            top_features: report
                .feature_importances
                .iter()
                .map(|f| format!("{}:{:.4}", f.feature, f.importance))
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

/// One CSV line per forecast point
#[derive(Debug, Serialize)]
struct ForecastRecord<'a> {
    city: &'a str,
    date: NaiveDate,
    yhat: f64,
    yhat_lower: f64,
    yhat_upper: f64,
    horizon: ForecastHorizon,
}

impl<'a> From<&'a ForecastPoint> for ForecastRecord<'a> {
    fn from(point: &'a ForecastPoint) -> Self {
        Self {
            city: &point.city,
            date: point.date,
            yhat: point.likelihood,
            yhat_lower: point.interval.lower,
            yhat_upper: point.interval.upper,
            horizon: point.horizon,
        }
    }
}

/// Writes reports, summaries and forecasts into an output directory
pub struct ReportExporter {
    output_dir: PathBuf,
}

impl ReportExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `reports.json` and/or `reports.csv`
    pub async fn export_reports(
        &self,
        reports: &[RiskReport],
        format: ExportFormat,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        if format.includes_json() {
            written.push(self.write_json("reports.json", reports).await?);
        }
        if format.includes_csv() {
            let records = reports.iter().map(ReportRecord::from);
            written.push(self.write_csv("reports.csv", records).await?);
        }
        Ok(written)
    }

    /// `summaries.json`
    pub async fn export_summaries(&self, summaries: &[CitySummary]) -> Result<PathBuf> {
        self.write_json("summaries.json", summaries).await
    }

    /// `forecast.json` and/or `forecast.csv`
    pub async fn export_forecast(
        &self,
        points: &[ForecastPoint],
        format: ExportFormat,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        if format.includes_json() {
            written.push(self.write_json("forecast.json", points).await?);
        }
        if format.includes_csv() {
            let records = points.iter().map(ForecastRecord::from);
            written.push(self.write_csv("forecast.csv", records).await?);
        }
        Ok(written)
    }

    /// Write any serializable value as pretty JSON
    pub async fn write_json<T: Serialize + ?Sized>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(value)?;
        self.write_bytes(file_name, json.into_bytes()).await
    }

    async fn write_csv<R, I>(&self, file_name: &str, records: I) -> Result<PathBuf>
    where
        R: Serialize,
        I: IntoIterator<Item = R>,
    {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in records {
            writer.serialize(record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Csv(format!("Failed to flush CSV: {}", e)))?;
        self.write_bytes(file_name, bytes).await
    }

    async fn write_bytes(&self, file_name: &str, bytes: Vec<u8>) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(file_name);
        fs::write(&path, &bytes).await?;
        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}
