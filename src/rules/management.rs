use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::constants::{DRY_OFF_CRITICAL_DAYS, DRY_OFF_MILKING_LOOKBACK_DAYS, DRY_OFF_WINDOW_DAYS};
use super::reproduction::predicted_birth;
use super::{request_for, submit, unsupported, Rule, RuleEvaluator};
use crate::clock::Clock;
use crate::domain::Severity;
use crate::error::EvaluationError;
use crate::gateway::{ProductionGateway, ReproductionGateway};
use crate::store::AlertStore;

/// Pregnant females still in the milking line close to calving.
pub struct ManagementEvaluator {
    pregnancies: Arc<dyn ReproductionGateway>,
    milkings: Arc<dyn ProductionGateway>,
    store: Arc<AlertStore>,
    clock: Arc<dyn Clock>,
}

impl ManagementEvaluator {
    pub fn new(
        pregnancies: Arc<dyn ReproductionGateway>,
        milkings: Arc<dyn ProductionGateway>,
        store: Arc<AlertStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pregnancies,
            milkings,
            store,
            clock,
        }
    }

    async fn pending_dry_offs(&self, property_id: Uuid) -> Result<usize, EvaluationError> {
        let today = self.clock.today();
        let pregnancies = self.pregnancies.confirmed_pregnancies(property_id).await?;

        let mut created = 0;
        for pregnancy in pregnancies {
            let birth = predicted_birth(pregnancy.breeding_date);
            let days_to_birth = (birth - today).num_days();
            if !(1..=DRY_OFF_WINDOW_DAYS).contains(&days_to_birth) {
                continue;
            }
            let milkings = self
                .milkings
                .recent_milking_records(pregnancy.animal.id, DRY_OFF_MILKING_LOOKBACK_DAYS, today)
                .await?;
            if milkings.is_empty() {
                continue;
            }

            let severity = if days_to_birth <= DRY_OFF_CRITICAL_DAYS {
                Severity::High
            } else {
                Severity::Medium
            };
            let request = request_for(
                Rule::PendingDryOff,
                &pregnancy.animal,
                pregnancy.breeding_id,
                today,
                format!(
                    "{} still being milked {} days before predicted birth on {}",
                    pregnancy.animal.tag, days_to_birth, birth
                ),
            )
            .map(|r| r.with_severity(severity));
            created += submit(&self.store, Rule::PendingDryOff, request).await;
        }
        Ok(created)
    }
}

#[async_trait]
impl RuleEvaluator for ManagementEvaluator {
    fn name(&self) -> &'static str {
        "management"
    }

    fn rules(&self) -> &'static [Rule] {
        &[Rule::PendingDryOff]
    }

    async fn evaluate_rule(&self, rule: Rule, property_id: Uuid) -> Result<usize, EvaluationError> {
        if rule != Rule::PendingDryOff {
            return Err(unsupported(rule, self.name()));
        }
        let created = self.pending_dry_offs(property_id).await?;
        info!(rule = %rule, property_id = %property_id, created, "Management rule evaluated");
        Ok(created)
    }
}
