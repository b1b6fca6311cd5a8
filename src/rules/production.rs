use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::constants::{
    HISTORICAL_YIELD_DAYS, MILK_DROP_CRITICAL_PERCENT, MILK_DROP_PERCENT, MIN_HISTORICAL_SAMPLES,
    MIN_RECENT_SAMPLES, RECENT_YIELD_DAYS,
};
use super::{request_for, submit, unsupported, Rule, RuleEvaluator};
use crate::clock::Clock;
use crate::domain::Severity;
use crate::error::EvaluationError;
use crate::gateway::{AnimalRef, ProductionGateway};
use crate::store::AlertStore;

/// Total liters of one animal on one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyYield {
    pub date: NaiveDate,
    pub liters: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YieldAssessment {
    pub recent_mean: f64,
    pub historical_mean: f64,
    pub recent_samples: usize,
    pub historical_samples: usize,
    pub drop_percent: f64,
}

/// Relative slack for liter values that have no exact binary form (7.2, 0.1).
const ROUNDING_SLACK: f64 = 1e-9;

impl YieldAssessment {
    /// `None` when the drop is below the alert threshold.
    pub fn severity(&self) -> Option<Severity> {
        if self.drops_by_at_least(MILK_DROP_CRITICAL_PERCENT) {
            Some(Severity::High)
        } else if self.drops_by_at_least(MILK_DROP_PERCENT) {
            Some(Severity::Medium)
        } else {
            None
        }
    }

    /// Threshold check on the means themselves; `drop_percent` is for display
    /// and loses the boundary to rounding.
    fn drops_by_at_least(&self, percent: f64) -> bool {
        self.recent_mean * 100.0
            <= self.historical_mean * (100.0 - percent) * (1.0 + ROUNDING_SLACK)
    }
}

/// Compares the mean daily yield of the trailing week (today included) with
/// the 30 days before it. `None` when either window is too thin to judge or
/// the historical mean is not positive.
pub fn assess_yield(daily: &[DailyYield], today: NaiveDate) -> Option<YieldAssessment> {
    let recent_from = today - Duration::days(RECENT_YIELD_DAYS - 1);
    let historical_from = recent_from - Duration::days(HISTORICAL_YIELD_DAYS);

    let recent: Vec<f64> = daily
        .iter()
        .filter(|d| d.date >= recent_from && d.date <= today)
        .map(|d| d.liters)
        .collect();
    let historical: Vec<f64> = daily
        .iter()
        .filter(|d| d.date >= historical_from && d.date < recent_from)
        .map(|d| d.liters)
        .collect();

    if recent.len() < MIN_RECENT_SAMPLES || historical.len() < MIN_HISTORICAL_SAMPLES {
        return None;
    }

    let recent_mean = mean(&recent);
    let historical_mean = mean(&historical);
    if historical_mean <= 0.0 {
        return None;
    }

    Some(YieldAssessment {
        recent_mean,
        historical_mean,
        recent_samples: recent.len(),
        historical_samples: historical.len(),
        drop_percent: (historical_mean - recent_mean) / historical_mean * 100.0,
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Per-animal milk yield drops.
pub struct ProductionEvaluator {
    gateway: Arc<dyn ProductionGateway>,
    store: Arc<AlertStore>,
    clock: Arc<dyn Clock>,
}

impl ProductionEvaluator {
    pub fn new(
        gateway: Arc<dyn ProductionGateway>,
        store: Arc<AlertStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            store,
            clock,
        }
    }

    async fn milk_drops(&self, property_id: Uuid) -> Result<usize, EvaluationError> {
        let today = self.clock.today();
        let samples = self
            .gateway
            .recent_yields(
                property_id,
                RECENT_YIELD_DAYS - 1 + HISTORICAL_YIELD_DAYS,
                today,
            )
            .await?;

        let mut per_animal: BTreeMap<Uuid, (AnimalRef, BTreeMap<NaiveDate, f64>)> = BTreeMap::new();
        for sample in samples {
            let (_, days) = per_animal
                .entry(sample.animal.id)
                .or_insert_with(|| (sample.animal.clone(), BTreeMap::new()));
            *days.entry(sample.date).or_insert(0.0) += sample.liters;
        }

        let mut created = 0;
        for (animal, days) in per_animal.into_values() {
            let daily: Vec<DailyYield> = days
                .into_iter()
                .map(|(date, liters)| DailyYield { date, liters })
                .collect();
            let Some(assessment) = assess_yield(&daily, today) else {
                debug!(animal_id = %animal.id, "Not enough milkings to assess yield");
                continue;
            };
            let Some(severity) = assessment.severity() else {
                continue;
            };

            let request = request_for(
                Rule::MilkDrop,
                &animal,
                animal.id,
                today,
                format!(
                    "Milk yield of {} dropped {:.0}% ({:.1} L/day vs {:.1} L/day)",
                    animal.tag,
                    assessment.drop_percent,
                    assessment.recent_mean,
                    assessment.historical_mean
                ),
            )
            .map(|r| r.with_severity(severity));
            created += submit(&self.store, Rule::MilkDrop, request).await;
        }
        Ok(created)
    }
}

#[async_trait]
impl RuleEvaluator for ProductionEvaluator {
    fn name(&self) -> &'static str {
        "production"
    }

    fn rules(&self) -> &'static [Rule] {
        &[Rule::MilkDrop]
    }

    async fn evaluate_rule(&self, rule: Rule, property_id: Uuid) -> Result<usize, EvaluationError> {
        if rule != Rule::MilkDrop {
            return Err(unsupported(rule, self.name()));
        }
        let created = self.milk_drops(property_id).await?;
        info!(rule = %rule, property_id = %property_id, created, "Production rule evaluated");
        Ok(created)
    }
}
