use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::constants::{
    BIRTH_LOOKAHEAD_DAYS, BREEDING_MIN_AGE_MONTHS, DIAGNOSIS_OVERDUE_DAYS, EMPTY_FEMALE_DAYS,
    GESTATION_DAYS,
};
use super::{request_for, submit, unsupported, Rule, RuleEvaluator};
use crate::clock::Clock;
use crate::entities::breeding::BreedingStatus;
use crate::error::EvaluationError;
use crate::gateway::{BreedingSummary, ReproductionGateway};
use crate::store::AlertStore;

/// Where a female stands, derived from her most recent breeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReproductiveStatus {
    NeverBred,
    AwaitingDiagnosis,
    Pregnant,
    /// Last breeding failed or concluded this many days ago.
    OpenSince(i64),
}

impl ReproductiveStatus {
    pub fn from_last_breeding(last: Option<&BreedingSummary>, today: NaiveDate) -> Self {
        match last {
            None => ReproductiveStatus::NeverBred,
            Some(b) => match b.status {
                BreedingStatus::InProgress => ReproductiveStatus::AwaitingDiagnosis,
                BreedingStatus::Confirmed => ReproductiveStatus::Pregnant,
                BreedingStatus::Failed | BreedingStatus::Concluded => {
                    ReproductiveStatus::OpenSince((today - b.breeding_date).num_days())
                }
            },
        }
    }

    /// Never bred, or open for at least [`EMPTY_FEMALE_DAYS`].
    pub fn is_empty(&self) -> bool {
        match self {
            ReproductiveStatus::NeverBred => true,
            ReproductiveStatus::OpenSince(days) => *days >= EMPTY_FEMALE_DAYS,
            ReproductiveStatus::AwaitingDiagnosis | ReproductiveStatus::Pregnant => false,
        }
    }
}

pub fn predicted_birth(breeding_date: NaiveDate) -> NaiveDate {
    breeding_date + Duration::days(GESTATION_DAYS)
}

/// Predicted births, overdue pregnancy diagnoses and empty females.
pub struct ReproductionEvaluator {
    gateway: Arc<dyn ReproductionGateway>,
    store: Arc<AlertStore>,
    clock: Arc<dyn Clock>,
}

impl ReproductionEvaluator {
    pub fn new(
        gateway: Arc<dyn ReproductionGateway>,
        store: Arc<AlertStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            store,
            clock,
        }
    }

    async fn predicted_births(&self, property_id: Uuid) -> Result<usize, EvaluationError> {
        let today = self.clock.today();
        let until = today + Duration::days(BIRTH_LOOKAHEAD_DAYS);
        let pregnancies = self.gateway.confirmed_pregnancies(property_id).await?;

        let mut created = 0;
        for pregnancy in pregnancies {
            let birth = predicted_birth(pregnancy.breeding_date);
            if birth < today || birth > until {
                continue;
            }
            let request = request_for(
                Rule::PredictedBirth,
                &pregnancy.animal,
                pregnancy.breeding_id,
                birth,
                format!("Predicted birth for {} on {}", pregnancy.animal.tag, birth),
            );
            created += submit(&self.store, Rule::PredictedBirth, request).await;
        }
        Ok(created)
    }

    async fn breedings_without_diagnosis(
        &self,
        property_id: Uuid,
    ) -> Result<usize, EvaluationError> {
        let today = self.clock.today();
        let pending = self
            .gateway
            .breedings_without_diagnosis(property_id, DIAGNOSIS_OVERDUE_DAYS, today)
            .await?;

        let mut created = 0;
        for breeding in pending {
            let elapsed = (today - breeding.breeding_date).num_days();
            let request = request_for(
                Rule::BreedingWithoutDiagnosis,
                &breeding.animal,
                breeding.breeding_id,
                today,
                format!(
                    "No pregnancy diagnosis for {} {} days after breeding",
                    breeding.animal.tag, elapsed
                ),
            );
            created += submit(&self.store, Rule::BreedingWithoutDiagnosis, request).await;
        }
        Ok(created)
    }

    async fn empty_females(&self, property_id: Uuid) -> Result<usize, EvaluationError> {
        let today = self.clock.today();
        let females = self
            .gateway
            .eligible_females(property_id, BREEDING_MIN_AGE_MONTHS, today)
            .await?;

        let mut created = 0;
        for female in females {
            let last = self.gateway.last_breeding(female.animal.id).await?;
            let status = ReproductiveStatus::from_last_breeding(last.as_ref(), today);
            if !status.is_empty() {
                debug!(animal_id = %female.animal.id, ?status, "Female not empty");
                continue;
            }
            let reason = match status {
                ReproductiveStatus::OpenSince(days) => format!(
                    "Female {} empty for {} days since last breeding",
                    female.animal.tag, days
                ),
                _ => format!("Female {} of breeding age was never bred", female.animal.tag),
            };
            let request = request_for(
                Rule::EmptyFemale,
                &female.animal,
                female.animal.id,
                today,
                reason,
            );
            created += submit(&self.store, Rule::EmptyFemale, request).await;
        }
        Ok(created)
    }
}

#[async_trait]
impl RuleEvaluator for ReproductionEvaluator {
    fn name(&self) -> &'static str {
        "reproduction"
    }

    fn rules(&self) -> &'static [Rule] {
        &[
            Rule::PredictedBirth,
            Rule::BreedingWithoutDiagnosis,
            Rule::EmptyFemale,
        ]
    }

    async fn evaluate_rule(&self, rule: Rule, property_id: Uuid) -> Result<usize, EvaluationError> {
        let created = match rule {
            Rule::PredictedBirth => self.predicted_births(property_id).await?,
            Rule::BreedingWithoutDiagnosis => self.breedings_without_diagnosis(property_id).await?,
            Rule::EmptyFemale => self.empty_females(property_id).await?,
            other => return Err(unsupported(other, self.name())),
        };
        info!(rule = %rule, property_id = %property_id, created, "Reproduction rule evaluated");
        Ok(created)
    }
}
