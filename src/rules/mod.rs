//! Daily alert rules and the evaluators that run them.
//!
//! An evaluator owns the rules of one domain. For each rule it reads an
//! already-filtered candidate set from its gateway, applies the date or
//! numeric check per candidate and hands matches to
//! [`AlertStore::raise`]. Re-running a rule on the same day is safe: the
//! store suppresses duplicates.

pub mod constants;

mod clinical;
mod management;
mod production;
mod reproduction;
mod sanitary;

pub use clinical::ClinicalEvaluator;
pub use management::ManagementEvaluator;
pub use production::{assess_yield, DailyYield, ProductionEvaluator, YieldAssessment};
pub use reproduction::{ReproductionEvaluator, ReproductiveStatus};
pub use sanitary::SanitaryEvaluator;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{AlertDomain, AlertRequest, OriginEventType};
use crate::error::{AlertError, EvaluationError};
use crate::gateway::AnimalRef;
use crate::store::{AlertStore, Raised};

/// One scheduled alert rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    PredictedBirth,
    BreedingWithoutDiagnosis,
    EmptyFemale,
    TreatmentReturn,
    Vaccination,
    MilkDrop,
    PendingDryOff,
    EarlyClinicalSigns,
}

impl Rule {
    /// In daily firing order.
    pub const ALL: [Rule; 8] = [
        Rule::PredictedBirth,
        Rule::BreedingWithoutDiagnosis,
        Rule::EmptyFemale,
        Rule::TreatmentReturn,
        Rule::Vaccination,
        Rule::MilkDrop,
        Rule::PendingDryOff,
        Rule::EarlyClinicalSigns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::PredictedBirth => "PREDICTED_BIRTH",
            Rule::BreedingWithoutDiagnosis => "BREEDING_WITHOUT_DIAGNOSIS",
            Rule::EmptyFemale => "EMPTY_FEMALE",
            Rule::TreatmentReturn => "TREATMENT_RETURN",
            Rule::Vaccination => "VACCINATION",
            Rule::MilkDrop => "MILK_DROP",
            Rule::PendingDryOff => "PENDING_DRY_OFF",
            Rule::EarlyClinicalSigns => "EARLY_CLINICAL_SIGNS",
        }
    }

    pub fn domain(&self) -> AlertDomain {
        match self {
            Rule::PredictedBirth | Rule::BreedingWithoutDiagnosis | Rule::EmptyFemale => {
                AlertDomain::Reproduction
            }
            Rule::TreatmentReturn | Rule::Vaccination => AlertDomain::Sanitary,
            Rule::MilkDrop => AlertDomain::Production,
            Rule::PendingDryOff => AlertDomain::Management,
            Rule::EarlyClinicalSigns => AlertDomain::Clinical,
        }
    }

    pub fn origin_event_type(&self) -> OriginEventType {
        match self {
            Rule::PredictedBirth => OriginEventType::PredictedBirth,
            Rule::BreedingWithoutDiagnosis => OriginEventType::BreedingNoDiagnosis,
            Rule::EmptyFemale => OriginEventType::FemaleEmpty,
            Rule::TreatmentReturn => OriginEventType::TreatmentReturn,
            Rule::Vaccination => OriginEventType::Vaccination,
            Rule::MilkDrop => OriginEventType::MilkDrop,
            Rule::PendingDryOff => OriginEventType::PendingDryOff,
            Rule::EarlyClinicalSigns => OriginEventType::EarlyClinicalSigns,
        }
    }

    /// Staggered so that no two rules load the database at once.
    pub fn default_fire_time(&self) -> NaiveTime {
        let (h, m) = match self {
            Rule::PredictedBirth => (0, 0),
            Rule::BreedingWithoutDiagnosis => (0, 5),
            Rule::EmptyFemale => (1, 0),
            Rule::TreatmentReturn => (2, 0),
            Rule::Vaccination => (3, 0),
            Rule::MilkDrop => (4, 0),
            Rule::PendingDryOff => (5, 0),
            Rule::EarlyClinicalSigns => (6, 0),
        };
        NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Rule::ALL
            .into_iter()
            .find(|rule| rule.as_str() == wanted)
            .ok_or_else(|| format!("unknown rule: {}", s))
    }
}

/// Runs the rules of one domain against one property.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    fn rules(&self) -> &'static [Rule];

    /// Number of alerts newly created by `rule` for the property.
    async fn evaluate_rule(&self, rule: Rule, property_id: Uuid) -> Result<usize, EvaluationError>;

    /// Every rule of this evaluator. Fails only when all of them failed.
    async fn evaluate(&self, property_id: Uuid) -> Result<usize, EvaluationError> {
        let mut total = 0;
        let mut succeeded = false;
        let mut last_error = None;
        for rule in self.rules() {
            match self.evaluate_rule(*rule, property_id).await {
                Ok(count) => {
                    total += count;
                    succeeded = true;
                }
                Err(e) => {
                    warn!(rule = %rule, property_id = %property_id, "Rule evaluation failed: {}", e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if !succeeded => Err(e),
            _ => Ok(total),
        }
    }
}

fn unsupported(rule: Rule, evaluator: &'static str) -> EvaluationError {
    EvaluationError::UnsupportedRule {
        rule: rule.as_str(),
        evaluator,
    }
}

/// Alert request for `rule` about `animal`, with the animal's labels and the
/// rule's domain and origin type.
fn request_for(
    rule: Rule,
    animal: &AnimalRef,
    event_id: Uuid,
    alert_date: NaiveDate,
    reason: String,
) -> Result<AlertRequest, AlertError> {
    Ok(AlertRequest::new(
        rule.domain(),
        animal.id,
        animal.property_id,
        alert_date,
        reason,
    )?
    .with_origin(rule.origin_event_type(), event_id)
    .with_labels(animal.group_label.clone(), animal.property_name.clone()))
}

/// Raises one candidate. A failing candidate is logged and counted, never
/// propagated, so the rest of the batch still runs. Returns 1 only when a
/// new row was stored.
async fn submit(
    store: &AlertStore,
    rule: Rule,
    request: Result<AlertRequest, AlertError>,
) -> usize {
    let outcome = match request {
        Ok(request) => store.raise(request).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(Raised::Created(_)) => 1,
        Ok(Raised::Existing(_)) => 0,
        Err(e) => {
            warn!(rule = %rule, "Skipping alert candidate: {}", e);
            crate::metrics::increment_candidate_failures(rule);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_rule_has_its_own_fire_time() {
        let times: HashSet<_> = Rule::ALL.iter().map(Rule::default_fire_time).collect();
        assert_eq!(times.len(), Rule::ALL.len());
        assert_eq!(
            Rule::BreedingWithoutDiagnosis.default_fire_time(),
            NaiveTime::from_hms_opt(0, 5, 0).unwrap()
        );
        let mut sorted = Rule::ALL;
        sorted.sort_by_key(Rule::default_fire_time);
        assert_eq!(sorted, Rule::ALL);
    }

    #[test]
    fn rule_names_round_trip_through_from_str() {
        assert_eq!("milk-drop".parse::<Rule>().unwrap(), Rule::MilkDrop);
        assert_eq!(" EMPTY_FEMALE ".parse::<Rule>().unwrap(), Rule::EmptyFemale);
        assert!("unknown".parse::<Rule>().is_err());
    }

    #[test]
    fn recurring_rules_map_to_recurring_origin_types() {
        let recurring: Vec<_> = Rule::ALL
            .into_iter()
            .filter(|r| r.origin_event_type().is_recurring())
            .collect();
        assert_eq!(
            recurring,
            vec![Rule::BreedingWithoutDiagnosis, Rule::EmptyFemale]
        );
    }
}
