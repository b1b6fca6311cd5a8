use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::constants::{TREATMENT_RETURN_LOOKAHEAD_DAYS, VACCINATION_LOOKAHEAD_DAYS};
use super::{request_for, submit, unsupported, Rule, RuleEvaluator};
use crate::clock::Clock;
use crate::error::EvaluationError;
use crate::gateway::SanitaryGateway;
use crate::store::AlertStore;

/// Treatment returns and vaccinations coming due.
pub struct SanitaryEvaluator {
    gateway: Arc<dyn SanitaryGateway>,
    store: Arc<AlertStore>,
    clock: Arc<dyn Clock>,
}

impl SanitaryEvaluator {
    pub fn new(
        gateway: Arc<dyn SanitaryGateway>,
        store: Arc<AlertStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            store,
            clock,
        }
    }

    async fn treatment_returns(&self, property_id: Uuid) -> Result<usize, EvaluationError> {
        let today = self.clock.today();
        let until = today + Duration::days(TREATMENT_RETURN_LOOKAHEAD_DAYS);
        let due = self
            .gateway
            .treatments_with_return_due(property_id, today, until)
            .await?;

        let mut created = 0;
        for treatment in due {
            let request = request_for(
                Rule::TreatmentReturn,
                &treatment.animal,
                treatment.treatment_id,
                treatment.return_date,
                format!(
                    "Treatment return due for {} on {}",
                    treatment.animal.tag, treatment.return_date
                ),
            )
            .map(|r| r.with_note(treatment.description.clone()));
            created += submit(&self.store, Rule::TreatmentReturn, request).await;
        }
        Ok(created)
    }

    async fn vaccinations(&self, property_id: Uuid) -> Result<usize, EvaluationError> {
        let today = self.clock.today();
        let until = today + Duration::days(VACCINATION_LOOKAHEAD_DAYS);
        let due = self.gateway.vaccinations_due(property_id, today, until).await?;

        let mut created = 0;
        for vaccination in due {
            let request = request_for(
                Rule::Vaccination,
                &vaccination.animal,
                vaccination.vaccination_id,
                vaccination.scheduled_date,
                format!(
                    "Vaccination scheduled for {} on {}",
                    vaccination.animal.tag, vaccination.scheduled_date
                ),
            )
            .map(|r| r.with_note(vaccination.vaccine.clone()));
            created += submit(&self.store, Rule::Vaccination, request).await;
        }
        Ok(created)
    }
}

#[async_trait]
impl RuleEvaluator for SanitaryEvaluator {
    fn name(&self) -> &'static str {
        "sanitary"
    }

    fn rules(&self) -> &'static [Rule] {
        &[Rule::TreatmentReturn, Rule::Vaccination]
    }

    async fn evaluate_rule(&self, rule: Rule, property_id: Uuid) -> Result<usize, EvaluationError> {
        let created = match rule {
            Rule::TreatmentReturn => self.treatment_returns(property_id).await?,
            Rule::Vaccination => self.vaccinations(property_id).await?,
            other => return Err(unsupported(other, self.name())),
        };
        info!(rule = %rule, property_id = %property_id, created, "Sanitary rule evaluated");
        Ok(created)
    }
}
