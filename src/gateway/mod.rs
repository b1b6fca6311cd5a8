//! Read-only, already-filtered queries over herd records.
//!
//! One trait per domain so evaluators only see what they read. Absence of
//! data is an empty result, never an error. Every windowed query takes the
//! caller's `today` so that evaluators stay the single source of "now".

mod database;

pub use database::DatabaseGateway;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::breeding::BreedingStatus;
use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRef {
    pub id: Uuid,
    pub name: String,
}

/// An animal with the labels denormalized onto its alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimalRef {
    pub id: Uuid,
    pub property_id: Uuid,
    pub tag: String,
    pub group_label: Option<String>,
    pub property_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentReturn {
    pub treatment_id: Uuid,
    pub animal: AnimalRef,
    pub description: String,
    pub return_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaccinationDue {
    pub vaccination_id: Uuid,
    pub animal: AnimalRef,
    pub vaccine: String,
    pub scheduled_date: NaiveDate,
}

/// A breeding event together with the bred female.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedingEvent {
    pub breeding_id: Uuid,
    pub animal: AnimalRef,
    pub breeding_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedingSummary {
    pub breeding_id: Uuid,
    pub breeding_date: NaiveDate,
    pub status: BreedingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Female {
    pub animal: AnimalRef,
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldSample {
    pub animal: AnimalRef,
    pub date: NaiveDate,
    pub liters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilkingRecord {
    pub animal_id: Uuid,
    pub date: NaiveDate,
    pub liters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weighing {
    pub animal_id: Uuid,
    pub date: NaiveDate,
    pub weight_kg: f64,
}

#[async_trait]
pub trait PropertyGateway: Send + Sync {
    /// Properties that are not soft-deleted.
    async fn active_properties(&self) -> Result<Vec<PropertyRef>, GatewayError>;
}

#[async_trait]
pub trait SanitaryGateway: Send + Sync {
    /// Treatments whose scheduled return falls in `[from, to]`.
    async fn treatments_with_return_due(
        &self,
        property_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TreatmentReturn>, GatewayError>;

    /// Vaccinations not yet applied, scheduled in `[from, to]`.
    async fn vaccinations_due(
        &self,
        property_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<VaccinationDue>, GatewayError>;
}

#[async_trait]
pub trait ReproductionGateway: Send + Sync {
    async fn confirmed_pregnancies(
        &self,
        property_id: Uuid,
    ) -> Result<Vec<BreedingEvent>, GatewayError>;

    /// In-progress breedings at least `min_days_elapsed` old on `today`.
    async fn breedings_without_diagnosis(
        &self,
        property_id: Uuid,
        min_days_elapsed: i64,
        today: NaiveDate,
    ) -> Result<Vec<BreedingEvent>, GatewayError>;

    /// Females at least `min_age_months` old on `today`.
    async fn eligible_females(
        &self,
        property_id: Uuid,
        min_age_months: u32,
        today: NaiveDate,
    ) -> Result<Vec<Female>, GatewayError>;

    async fn last_breeding(&self, animal_id: Uuid) -> Result<Option<BreedingSummary>, GatewayError>;
}

#[async_trait]
pub trait ProductionGateway: Send + Sync {
    /// Milkings of the property in `[today - days_back, today]`.
    async fn recent_yields(
        &self,
        property_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<Vec<YieldSample>, GatewayError>;

    async fn recent_milking_records(
        &self,
        animal_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<Vec<MilkingRecord>, GatewayError>;
}

#[async_trait]
pub trait ClinicalGateway: Send + Sync {
    async fn active_animals(&self, property_id: Uuid) -> Result<Vec<AnimalRef>, GatewayError>;

    /// Treatments started in `[today - days_back, today]`.
    async fn recent_treatment_count(
        &self,
        animal_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<u64, GatewayError>;

    /// Weighings in `[today - days_back, today]`, oldest first.
    async fn recent_weighings(
        &self,
        animal_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<Vec<Weighing>, GatewayError>;
}

/// Every gateway at once, for wiring a single backend into all evaluators.
pub trait HerdGateway:
    PropertyGateway + SanitaryGateway + ReproductionGateway + ProductionGateway + ClinicalGateway
{
}

impl<T> HerdGateway for T where
    T: PropertyGateway + SanitaryGateway + ReproductionGateway + ProductionGateway + ClinicalGateway
{
}
