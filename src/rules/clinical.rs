use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::constants::{CLINICAL_MIN_GAIN_KG, CLINICAL_TREATMENT_THRESHOLD, CLINICAL_WINDOW_DAYS};
use super::{request_for, submit, unsupported, Rule, RuleEvaluator};
use crate::clock::Clock;
use crate::error::EvaluationError;
use crate::gateway::{ClinicalGateway, Weighing};
use crate::store::AlertStore;

/// Repeated treatments or stalled weight gain.
pub struct ClinicalEvaluator {
    gateway: Arc<dyn ClinicalGateway>,
    store: Arc<AlertStore>,
    clock: Arc<dyn Clock>,
}

/// Matched signs, worded for the alert narrative. Empty when healthy.
fn clinical_signs(treatments: u64, weighings: &[Weighing]) -> Vec<String> {
    let mut signs = Vec::new();
    if treatments >= CLINICAL_TREATMENT_THRESHOLD {
        signs.push(format!(
            "{} treatments in the last {} days",
            treatments, CLINICAL_WINDOW_DAYS
        ));
    }
    if let (Some(first), Some(last)) = (weighings.first(), weighings.last()) {
        let gain = last.weight_kg - first.weight_kg;
        if weighings.len() >= 2 && gain < CLINICAL_MIN_GAIN_KG {
            signs.push(format!(
                "weight gain of {:.1} kg across {} weighings in the last {} days",
                gain,
                weighings.len(),
                CLINICAL_WINDOW_DAYS
            ));
        }
    }
    signs
}

impl ClinicalEvaluator {
    pub fn new(
        gateway: Arc<dyn ClinicalGateway>,
        store: Arc<AlertStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            store,
            clock,
        }
    }

    async fn early_signs(&self, property_id: Uuid) -> Result<usize, EvaluationError> {
        let today = self.clock.today();
        let animals = self.gateway.active_animals(property_id).await?;

        let mut created = 0;
        for animal in animals {
            let treatments = self
                .gateway
                .recent_treatment_count(animal.id, CLINICAL_WINDOW_DAYS, today)
                .await?;
            let weighings = self
                .gateway
                .recent_weighings(animal.id, CLINICAL_WINDOW_DAYS, today)
                .await?;

            let signs = clinical_signs(treatments, &weighings);
            if signs.is_empty() {
                continue;
            }
            let request = request_for(
                Rule::EarlyClinicalSigns,
                &animal,
                animal.id,
                today,
                format!("Early clinical signs in {}", animal.tag),
            )
            .map(|r| r.with_narrative(format!("{}: {}.", animal.tag, signs.join("; "))));
            created += submit(&self.store, Rule::EarlyClinicalSigns, request).await;
        }
        Ok(created)
    }
}

#[async_trait]
impl RuleEvaluator for ClinicalEvaluator {
    fn name(&self) -> &'static str {
        "clinical"
    }

    fn rules(&self) -> &'static [Rule] {
        &[Rule::EarlyClinicalSigns]
    }

    async fn evaluate_rule(&self, rule: Rule, property_id: Uuid) -> Result<usize, EvaluationError> {
        if rule != Rule::EarlyClinicalSigns {
            return Err(unsupported(rule, self.name()));
        }
        let created = self.early_signs(property_id).await?;
        info!(rule = %rule, property_id = %property_id, created, "Clinical rule evaluated");
        Ok(created)
    }
}
