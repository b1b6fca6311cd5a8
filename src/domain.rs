use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AlertError;

/// Category of an alert ("nicho").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertDomain {
    #[sea_orm(string_value = "CLINICAL")]
    Clinical,
    #[sea_orm(string_value = "SANITARY")]
    Sanitary,
    #[sea_orm(string_value = "REPRODUCTION")]
    Reproduction,
    #[sea_orm(string_value = "MANAGEMENT")]
    Management,
    #[sea_orm(string_value = "PRODUCTION")]
    Production,
}

impl AlertDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertDomain::Clinical => "CLINICAL",
            AlertDomain::Sanitary => "SANITARY",
            AlertDomain::Reproduction => "REPRODUCTION",
            AlertDomain::Management => "MANAGEMENT",
            AlertDomain::Production => "PRODUCTION",
        }
    }
}

impl fmt::Display for AlertDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored as a small integer so that `ORDER BY severity DESC` yields HIGH first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "i16", db_type = "SmallInteger")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[sea_orm(num_value = 1)]
    Low,
    #[sea_orm(num_value = 2)]
    Medium,
    #[sea_orm(num_value = 3)]
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }

    /// Lenient parse used for classifier output ("high", "Alta", " MEDIUM\n").
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "LOW" | "BAIXA" => Some(Severity::Low),
            "MEDIUM" | "MEDIA" | "MÉDIA" => Some(Severity::Medium),
            "HIGH" | "ALTA" => Some(Severity::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream fact type that caused an evaluator to raise an alert.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OriginEventType {
    #[sea_orm(string_value = "FEMALE_EMPTY")]
    FemaleEmpty,
    #[sea_orm(string_value = "BREEDING_NO_DIAGNOSIS")]
    BreedingNoDiagnosis,
    #[sea_orm(string_value = "PREDICTED_BIRTH")]
    PredictedBirth,
    #[sea_orm(string_value = "TREATMENT_RETURN")]
    TreatmentReturn,
    #[sea_orm(string_value = "VACCINATION")]
    Vaccination,
    #[sea_orm(string_value = "MILK_DROP")]
    MilkDrop,
    #[sea_orm(string_value = "PENDING_DRY_OFF")]
    PendingDryOff,
    #[sea_orm(string_value = "EARLY_CLINICAL_SIGNS")]
    EarlyClinicalSigns,
}

impl OriginEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginEventType::FemaleEmpty => "FEMALE_EMPTY",
            OriginEventType::BreedingNoDiagnosis => "BREEDING_NO_DIAGNOSIS",
            OriginEventType::PredictedBirth => "PREDICTED_BIRTH",
            OriginEventType::TreatmentReturn => "TREATMENT_RETURN",
            OriginEventType::Vaccination => "VACCINATION",
            OriginEventType::MilkDrop => "MILK_DROP",
            OriginEventType::PendingDryOff => "PENDING_DRY_OFF",
            OriginEventType::EarlyClinicalSigns => "EARLY_CLINICAL_SIGNS",
        }
    }

    /// Conditions that persist day over day. An acknowledged alert of a
    /// recurring type is re-raised once per `alert_date`, not once per lineage.
    pub fn is_recurring(&self) -> bool {
        matches!(
            self,
            OriginEventType::FemaleEmpty | OriginEventType::BreedingNoDiagnosis
        )
    }
}

impl fmt::Display for OriginEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The upstream record an alert was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub event_type: OriginEventType,
    pub event_id: Uuid,
}

/// Input to [`crate::store::AlertStore::create`] and
/// [`crate::store::AlertStore::create_if_not_exists`].
///
/// Built through [`AlertRequest::new`] and the `with_*` methods; the required
/// fields are checked once, at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub domain: AlertDomain,
    pub animal_id: Uuid,
    pub property_id: Uuid,
    pub alert_date: NaiveDate,
    pub reason: String,
    pub note: Option<String>,
    pub clinical_narrative: Option<String>,
    pub severity: Option<Severity>,
    pub group_label: Option<String>,
    pub location_label: Option<String>,
    pub origin: Option<Origin>,
}

impl AlertRequest {
    pub fn new(
        domain: AlertDomain,
        animal_id: Uuid,
        property_id: Uuid,
        alert_date: NaiveDate,
        reason: impl Into<String>,
    ) -> Result<Self, AlertError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(AlertError::InvalidRequest("reason must not be blank".into()));
        }
        if animal_id.is_nil() || property_id.is_nil() {
            return Err(AlertError::InvalidRequest(
                "animal and property ids must be set".into(),
            ));
        }
        Ok(Self {
            domain,
            animal_id,
            property_id,
            alert_date,
            reason,
            note: None,
            clinical_narrative: None,
            severity: None,
            group_label: None,
            location_label: None,
            origin: None,
        })
    }

    pub fn with_origin(mut self, event_type: OriginEventType, event_id: Uuid) -> Self {
        self.origin = Some(Origin {
            event_type,
            event_id,
        });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_narrative(mut self, narrative: impl Into<String>) -> Self {
        self.clinical_narrative = Some(narrative.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_labels(mut self, group: Option<String>, location: Option<String>) -> Self {
        self.group_label = group;
        self.location_label = location;
        self
    }

    /// Text handed to the priority classifier when no severity is set.
    pub fn classification_text(&self) -> String {
        match &self.clinical_narrative {
            Some(narrative) if !narrative.trim().is_empty() => narrative.clone(),
            _ => match &self.note {
                Some(note) => format!("{} {}", self.reason, note),
                None => self.reason.clone(),
            },
        }
    }

    /// Lineage key while the alert is open; see [`lineage_slot`].
    pub fn open_slot(&self) -> Option<String> {
        let origin = self.origin?;
        Some(lineage_slot(
            origin.event_type,
            origin.event_id,
            self.animal_id,
            self.domain,
            self.alert_date,
        ))
    }
}

/// Key held by the single open alert of a lineage. Recurring types are scoped
/// to the alert date so a persisting condition can reopen on a later day.
pub fn lineage_slot(
    event_type: OriginEventType,
    event_id: Uuid,
    animal_id: Uuid,
    domain: AlertDomain,
    alert_date: NaiveDate,
) -> String {
    let mut slot = format!("{}:{}:{}:{}", event_type, event_id, animal_id, domain);
    if event_type.is_recurring() {
        slot.push(':');
        slot.push_str(&alert_date.format("%Y-%m-%d").to_string());
    }
    slot
}
