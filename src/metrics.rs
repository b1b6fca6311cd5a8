use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use std::sync::Mutex;

use crate::domain::AlertDomain;
use crate::entities::{alerts, Alerts};
use crate::rules::Rule;
use crate::scheduler::RunReport;

/// Receives the aggregate of every trigger run.
pub trait MetricsSink: Send + Sync {
    fn record_run(&self, report: &RunReport);
}

/// Publishes run reports through the `metrics` facade (scraped via Prometheus).
pub struct PrometheusSink;

impl MetricsSink for PrometheusSink {
    fn record_run(&self, report: &RunReport) {
        let rule = report.rule.as_str();
        metrics::histogram!("herd_alerts_run_duration_seconds", "rule" => rule)
            .record(report.elapsed.as_secs_f64());
        metrics::counter!("herd_alerts_run_alerts_total", "rule" => rule)
            .increment(report.total_alerts as u64);
        metrics::counter!("herd_alerts_run_property_failures_total", "rule" => rule)
            .increment(report.failed_properties() as u64);
        metrics::gauge!("herd_alerts_run_properties", "rule" => rule)
            .set(report.properties.len() as f64);

        for outcome in &report.properties {
            if let Ok(count) = outcome.result {
                metrics::counter!(
                    "herd_alerts_property_alerts_total",
                    "rule" => rule,
                    "property_id" => outcome.property_id.to_string()
                )
                .increment(count as u64);
            }
        }
    }
}

/// Keeps every report in memory; used by the one-shot run and in tests.
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<RunReport>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<RunReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl MetricsSink for RecordingSink {
    fn record_run(&self, report: &RunReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }
}

/// Seeds the open-alert gauges at startup.
pub async fn init_metrics(db: &DatabaseConnection) {
    use sea_orm::Iterable;

    let mut total = 0;
    for domain in AlertDomain::iter() {
        let open = Alerts::find()
            .filter(alerts::Column::Domain.eq(domain))
            .filter(alerts::Column::Acknowledged.eq(false))
            .count(db)
            .await
            .unwrap_or(0);
        total += open;
        metrics::gauge!("herd_alerts_open", "domain" => domain.as_str()).set(open as f64);
    }

    tracing::info!("Initialized metrics: open alerts={}", total);
}

pub fn increment_alerts_created(domain: AlertDomain) {
    metrics::counter!("herd_alerts_created_total", "domain" => domain.as_str()).increment(1);
    increment_open_alerts(domain);
}

/// An alert became unacknowledged (created or reopened).
pub fn increment_open_alerts(domain: AlertDomain) {
    metrics::gauge!("herd_alerts_open", "domain" => domain.as_str()).increment(1.0);
}

/// An open alert was acknowledged or deleted.
pub fn decrement_open_alerts(domain: AlertDomain) {
    metrics::gauge!("herd_alerts_open", "domain" => domain.as_str()).decrement(1.0);
}

pub fn increment_classifier_fallbacks() {
    metrics::counter!("herd_alerts_classifier_fallbacks_total").increment(1);
}

pub fn increment_candidate_failures(rule: Rule) {
    metrics::counter!("herd_alerts_candidate_failures_total", "rule" => rule.as_str()).increment(1);
}
