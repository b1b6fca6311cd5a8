//! Daily triggers that run each rule over every active property.
//!
//! A trigger run is stateless: load properties, evaluate each one under its
//! own timeout, report. A failing or slow property never affects its
//! siblings. Repeated or overlapping runs are safe because the store
//! deduplicates.

use chrono::{Duration as DateDuration, NaiveDateTime, NaiveTime};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::EvaluationError;
use crate::gateway::{PropertyGateway, PropertyRef};
use crate::metrics::MetricsSink;
use crate::rules::{Rule, RuleEvaluator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub rule: Rule,
    /// Wall-clock time in the farms' offset.
    pub at: NaiveTime,
}

/// One trigger per rule at its default time.
pub fn default_schedule() -> Vec<Trigger> {
    Rule::ALL
        .into_iter()
        .map(|rule| Trigger {
            rule,
            at: rule.default_fire_time(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Upper bound for one property's evaluation.
    pub evaluation_timeout: Duration,
    /// Properties evaluated at once within a trigger.
    pub property_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            evaluation_timeout: Duration::from_secs(300),
            property_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyOutcome {
    pub property_id: Uuid,
    pub property_name: String,
    /// Alerts created, or the error that stopped this property.
    pub result: Result<usize, String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub rule: Rule,
    pub started_at: NaiveDateTime,
    pub elapsed: Duration,
    pub total_alerts: usize,
    pub properties: Vec<PropertyOutcome>,
}

impl RunReport {
    pub fn failed_properties(&self) -> usize {
        self.properties.iter().filter(|p| p.result.is_err()).count()
    }
}

/// Time from `now` until the next `at`, strictly in the future.
pub fn duration_until_next(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let mut next = now.date().and_time(at);
    if next <= now {
        next += DateDuration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

pub struct Scheduler {
    properties: Arc<dyn PropertyGateway>,
    evaluators: HashMap<Rule, Arc<dyn RuleEvaluator>>,
    triggers: Vec<Trigger>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
}

impl Scheduler {
    pub fn new(
        properties: Arc<dyn PropertyGateway>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            properties,
            evaluators: HashMap::new(),
            triggers: default_schedule(),
            config,
            clock,
            metrics,
        }
    }

    /// Routes every rule of `evaluator` to it.
    pub fn register(mut self, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        for rule in evaluator.rules() {
            self.evaluators.insert(*rule, evaluator.clone());
        }
        self
    }

    pub fn with_triggers(mut self, triggers: Vec<Trigger>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Runs `rule` once over every active property.
    pub async fn run_trigger(&self, rule: Rule) -> RunReport {
        let span = tracing::info_span!("run_trigger", "otel.name" = "run_trigger", rule = %rule);
        async move {
            let started_at = self.clock.now();
            let start = Instant::now();

            let properties = match self.evaluators.get(&rule) {
                Some(evaluator) => self.evaluate_properties(rule, evaluator.clone()).await,
                None => {
                    error!("No evaluator registered for rule {}", rule);
                    Vec::new()
                }
            };

            let report = RunReport {
                rule,
                started_at,
                elapsed: start.elapsed(),
                total_alerts: properties.iter().filter_map(|p| p.result.as_ref().ok()).sum(),
                properties,
            };
            info!(
                total_alerts = report.total_alerts,
                properties = report.properties.len(),
                failed = report.failed_properties(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Trigger run finished"
            );
            self.metrics.record_run(&report);
            report
        }
        .instrument(span)
        .await
    }

    /// Every trigger once, in schedule order.
    pub async fn run_all_once(&self) -> Vec<RunReport> {
        let mut reports = Vec::with_capacity(self.triggers.len());
        for trigger in &self.triggers {
            reports.push(self.run_trigger(trigger.rule).await);
        }
        reports
    }

    /// Fires each trigger daily until `token` is cancelled.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let handles: Vec<_> = self
            .triggers
            .iter()
            .map(|trigger| {
                let scheduler = self.clone();
                let token = token.clone();
                let trigger = *trigger;
                tokio::spawn(async move { scheduler.trigger_loop(trigger, token).await })
            })
            .collect();

        info!("Scheduler started with {} triggers", handles.len());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Trigger task failed: {}", e);
            }
        }
        info!("Scheduler stopped");
    }

    async fn trigger_loop(&self, trigger: Trigger, token: CancellationToken) {
        loop {
            let wait = duration_until_next(self.clock.now(), trigger.at);
            info!(rule = %trigger.rule, "Next run in {}s", wait.as_secs());
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            tokio::select! {
                _ = token.cancelled() => {
                    warn!(rule = %trigger.rule, "Shutdown during trigger run");
                    return;
                }
                _ = self.run_trigger(trigger.rule) => {}
            }
        }
    }

    async fn evaluate_properties(
        &self,
        rule: Rule,
        evaluator: Arc<dyn RuleEvaluator>,
    ) -> Vec<PropertyOutcome> {
        let properties = match self.properties.active_properties().await {
            Ok(properties) => properties,
            Err(e) => {
                error!("Failed to load active properties: {}", e);
                return Vec::new();
            }
        };

        let timeout = self.config.evaluation_timeout;
        let mut outcomes: Vec<PropertyOutcome> = stream::iter(properties)
            .map(|property| evaluate_property(rule, evaluator.clone(), property, timeout))
            .buffer_unordered(self.config.property_concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.property_name.cmp(&b.property_name));
        outcomes
    }
}

/// Evaluates one property on its own task so that a panic or timeout stays
/// local to it. Dropping the returned future aborts the task.
async fn evaluate_property(
    rule: Rule,
    evaluator: Arc<dyn RuleEvaluator>,
    property: PropertyRef,
    timeout: Duration,
) -> PropertyOutcome {
    let start = Instant::now();
    let span = tracing::info_span!("evaluate_property", property_id = %property.id);
    let property_id = property.id;
    let task = AbortOnDropHandle::new(tokio::spawn(
        async move {
            match tokio::time::timeout(timeout, evaluator.evaluate_rule(rule, property_id)).await {
                Ok(result) => result,
                Err(_) => Err(EvaluationError::Timeout(timeout)),
            }
        }
        .instrument(span),
    ));

    let result = match task.await {
        Ok(Ok(count)) => Ok(count),
        Ok(Err(e)) => {
            warn!(
                rule = %rule,
                property_id = %property.id,
                "Skipping property {}: {}", property.name, e
            );
            Err(e.to_string())
        }
        Err(e) => {
            error!(rule = %rule, property_id = %property.id, "Evaluation task failed: {}", e);
            Err(format!("evaluation task failed: {}", e))
        }
    };

    PropertyOutcome {
        property_id: property.id,
        property_name: property.name,
        result,
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use crate::gateway::TreatmentReturn;
    use crate::metrics::RecordingSink;
    use crate::rules::SanitaryEvaluator;
    use crate::store::{AlertFilter, Pagination};
    use crate::testing::{date, fixed_clock, store_on, FakeHerd, StubClassifier};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn next_fire_time_rolls_over_midnight() {
        let now = date(2026, 3, 10).and_hms_opt(0, 3, 0).unwrap();
        assert_eq!(duration_until_next(now, time(0, 5)), Duration::from_secs(120));
        assert_eq!(
            duration_until_next(now, time(0, 0)),
            Duration::from_secs(24 * 3600 - 180)
        );
        // Exactly at the fire time means the next day.
        let at = date(2026, 3, 10).and_time(time(6, 0));
        assert_eq!(duration_until_next(at, time(6, 0)), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn default_schedule_covers_every_rule() {
        let schedule = default_schedule();
        assert_eq!(schedule.len(), 8);
        assert_eq!(schedule[0].at, time(0, 0));
        assert_eq!(schedule[7].rule, Rule::EarlyClinicalSigns);
        assert_eq!(schedule[7].at, time(6, 0));
    }

    struct Farm {
        herd: FakeHerd,
        healthy: Uuid,
        broken: Uuid,
    }

    fn two_farms() -> Farm {
        let today = date(2026, 3, 10);
        let mut herd = FakeHerd::default();
        let healthy = herd.property("A farm");
        let broken = herd.property("B farm");
        for property in [healthy, broken] {
            let cow = herd.animal(property, "BR-1");
            herd.treatment_returns.push(TreatmentReturn {
                treatment_id: Uuid::new_v4(),
                animal: cow,
                description: "Lameness".into(),
                return_date: today + DateDuration::days(3),
            });
        }
        Farm {
            herd,
            healthy,
            broken,
        }
    }

    async fn scheduler_for(
        herd: FakeHerd,
        config: SchedulerConfig,
    ) -> (Scheduler, Arc<RecordingSink>, Arc<crate::store::AlertStore>) {
        let today = date(2026, 3, 10);
        let herd = Arc::new(herd);
        let store = store_on(today, StubClassifier::answering(Severity::Medium)).await;
        let sink = Arc::new(RecordingSink::default());
        let evaluator = Arc::new(SanitaryEvaluator::new(
            herd.clone(),
            store.clone(),
            fixed_clock(today),
        ));
        let scheduler =
            Scheduler::new(herd, fixed_clock(today), sink.clone(), config).register(evaluator);
        (scheduler, sink, store)
    }

    #[tokio::test]
    async fn a_failing_property_does_not_stop_the_others() {
        let Farm {
            mut herd,
            healthy,
            broken,
        } = two_farms();
        herd.failing_properties.insert(broken);
        let (scheduler, sink, store) = scheduler_for(herd, SchedulerConfig::default()).await;

        let report = scheduler.run_trigger(Rule::TreatmentReturn).await;

        assert_eq!(report.total_alerts, 1);
        assert_eq!(report.failed_properties(), 1);
        assert_eq!(report.properties[0].property_id, healthy);
        assert_eq!(report.properties[0].result, Ok(1));
        assert!(report.properties[1].result.is_err());

        let stored = store
            .find(&AlertFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(stored.total_items, 1);
        assert_eq!(stored.items[0].property_id, healthy);
        assert_eq!(sink.reports().len(), 1);
    }

    #[tokio::test]
    async fn the_sink_receives_the_full_report() {
        let Farm {
            mut herd,
            healthy,
            broken,
        } = two_farms();
        herd.failing_properties.insert(broken);
        let (scheduler, sink, _) = scheduler_for(herd, SchedulerConfig::default()).await;

        let returned = scheduler.run_trigger(Rule::TreatmentReturn).await;

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.rule, Rule::TreatmentReturn);
        assert_eq!(report.started_at, date(2026, 3, 10).and_time(NaiveTime::MIN));
        assert_eq!(report.total_alerts, 1);
        assert_eq!(report.total_alerts, returned.total_alerts);
        assert_eq!(report.failed_properties(), 1);

        let names: Vec<&str> = report
            .properties
            .iter()
            .map(|p| p.property_name.as_str())
            .collect();
        assert_eq!(names, ["A farm", "B farm"]);
        assert_eq!(report.properties[0].property_id, healthy);
        assert_eq!(report.properties[0].result, Ok(1));
        assert_eq!(report.properties[1].property_id, broken);
        assert!(report.properties[1]
            .result
            .as_ref()
            .unwrap_err()
            .contains("unavailable"));
        assert!(report.properties.iter().all(|p| p.elapsed <= report.elapsed));
    }

    #[tokio::test]
    async fn a_slow_property_times_out_alone() {
        let Farm {
            mut herd,
            healthy,
            broken,
        } = two_farms();
        herd.hanging_properties.insert(broken);
        let config = SchedulerConfig {
            evaluation_timeout: Duration::from_millis(200),
            property_concurrency: 2,
        };
        let (scheduler, _, _) = scheduler_for(herd, config).await;

        let report = scheduler.run_trigger(Rule::TreatmentReturn).await;

        let healthy = report
            .properties
            .iter()
            .find(|p| p.property_id == healthy)
            .unwrap();
        assert_eq!(healthy.result, Ok(1));
        let slow = report
            .properties
            .iter()
            .find(|p| p.property_id == broken)
            .unwrap();
        assert!(slow.result.as_ref().unwrap_err().contains("timed out"));
    }

    #[tokio::test]
    async fn repeated_runs_are_idempotent() {
        let Farm { herd, .. } = two_farms();
        let (scheduler, sink, _) = scheduler_for(herd, SchedulerConfig::default()).await;

        assert_eq!(scheduler.run_trigger(Rule::TreatmentReturn).await.total_alerts, 2);
        assert_eq!(scheduler.run_trigger(Rule::TreatmentReturn).await.total_alerts, 0);
        assert_eq!(sink.reports().len(), 2);
    }

    #[tokio::test]
    async fn rules_without_an_evaluator_report_nothing() {
        let Farm { herd, .. } = two_farms();
        let (scheduler, sink, _) = scheduler_for(herd, SchedulerConfig::default()).await;

        let report = scheduler.run_trigger(Rule::MilkDrop).await;
        assert!(report.properties.is_empty());
        assert_eq!(report.total_alerts, 0);
        assert_eq!(sink.reports()[0].rule, Rule::MilkDrop);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let Farm { herd, .. } = two_farms();
        let (scheduler, _, _) = scheduler_for(herd, SchedulerConfig::default()).await;
        let scheduler = Arc::new(scheduler);
        let token = CancellationToken::new();

        let running = tokio::spawn(scheduler.clone().run(token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Never finishes; flags when its future is dropped.
    struct Stalled {
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RuleEvaluator for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        fn rules(&self) -> &'static [Rule] {
            &[Rule::TreatmentReturn]
        }

        async fn evaluate_rule(&self, _: Rule, _: Uuid) -> Result<usize, EvaluationError> {
            let _guard = SetOnDrop(self.dropped.clone());
            std::future::pending::<()>().await;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn dropping_a_trigger_run_aborts_its_property_tasks() {
        let Farm { herd, .. } = two_farms();
        let dropped = Arc::new(AtomicBool::new(false));
        let scheduler = Scheduler::new(
            Arc::new(herd),
            fixed_clock(date(2026, 3, 10)),
            Arc::new(RecordingSink::default()),
            SchedulerConfig::default(),
        )
        .register(Arc::new(Stalled {
            dropped: dropped.clone(),
        }));

        let run = tokio::time::timeout(
            Duration::from_millis(50),
            scheduler.run_trigger(Rule::TreatmentReturn),
        )
        .await;
        assert!(run.is_err());

        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped.load(Ordering::SeqCst));
    }
}
