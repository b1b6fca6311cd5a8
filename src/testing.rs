//! Test doubles shared by the unit tests of every module.

use async_trait::async_trait;
use chrono::{Duration as DateDuration, NaiveDate};
use metrics::{
    Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::classifier::PriorityClassifier;
use crate::clock::{Clock, FixedClock};
use crate::domain::Severity;
use crate::error::{ClassifierError, GatewayError};
use crate::gateway::{
    AnimalRef, BreedingEvent, BreedingSummary, ClinicalGateway, Female, MilkingRecord,
    ProductionGateway, PropertyGateway, PropertyRef, ReproductionGateway, SanitaryGateway,
    TreatmentReturn, VaccinationDue, Weighing, YieldSample,
};
use crate::migrator::Migrator;
use crate::store::AlertStore;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Fresh SQLite database with the real schema. One connection, otherwise
/// every pooled connection would see its own empty in-memory database.
pub async fn memory_db() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

/// Store over a fresh database, pinned to `today`, with the given classifier.
pub async fn store_on(today: NaiveDate, classifier: StubClassifier) -> Arc<AlertStore> {
    Arc::new(AlertStore::new(
        memory_db().await,
        Arc::new(classifier),
        Duration::from_millis(100),
        fixed_clock(today),
    ))
}

pub fn fixed_clock(today: NaiveDate) -> Arc<dyn Clock> {
    Arc::new(FixedClock::on(today))
}

enum Answer {
    Severity(Severity),
    Fail,
    Hang,
}

pub struct StubClassifier {
    answer: Answer,
    prompts: Mutex<Vec<String>>,
}

impl StubClassifier {
    pub fn answering(severity: Severity) -> Self {
        Self::with(Answer::Severity(severity))
    }

    pub fn failing() -> Self {
        Self::with(Answer::Fail)
    }

    pub fn hanging() -> Self {
        Self::with(Answer::Hang)
    }

    fn with(answer: Answer) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriorityClassifier for StubClassifier {
    async fn classify(&self, text: &str) -> Result<Severity, ClassifierError> {
        self.prompts.lock().unwrap().push(text.to_string());
        match self.answer {
            Answer::Severity(severity) => Ok(severity),
            Answer::Fail => Err(ClassifierError::Api {
                status: 503,
                message: "unavailable".into(),
            }),
            Answer::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ClassifierError::InvalidResponse("unreachable".into()))
            }
        }
    }
}

#[derive(Default)]
struct Level(Mutex<f64>);

impl GaugeFn for Level {
    fn increment(&self, value: f64) {
        *self.0.lock().unwrap() += value;
    }

    fn decrement(&self, value: f64) {
        *self.0.lock().unwrap() -= value;
    }

    fn set(&self, value: f64) {
        *self.0.lock().unwrap() = value;
    }
}

/// Keeps gauge levels by metric name and `domain` label. Counters and
/// histograms are discarded. Install with `metrics::with_local_recorder`.
#[derive(Default)]
pub struct GaugeRecorder {
    levels: Mutex<HashMap<(String, String), Arc<Level>>>,
}

impl GaugeRecorder {
    pub fn level(&self, name: &str, domain: &str) -> f64 {
        self.levels
            .lock()
            .unwrap()
            .get(&(name.to_string(), domain.to_string()))
            .map(|level| *level.0.lock().unwrap())
            .unwrap_or(0.0)
    }
}

impl Recorder for GaugeRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        let domain = key
            .labels()
            .find(|label| label.key() == "domain")
            .map(|label| label.value().to_string())
            .unwrap_or_default();
        let level = self
            .levels
            .lock()
            .unwrap()
            .entry((key.name().to_string(), domain))
            .or_default()
            .clone();
        Gauge::from_arc(level)
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

/// In-memory herd. Queries filter by date the same way the SQL gateway does.
#[derive(Default)]
pub struct FakeHerd {
    pub properties: Vec<PropertyRef>,
    pub treatment_returns: Vec<TreatmentReturn>,
    pub vaccinations: Vec<VaccinationDue>,
    pub pregnancies: Vec<BreedingEvent>,
    pub pending_breedings: Vec<BreedingEvent>,
    pub females: Vec<Female>,
    pub last_breedings: HashMap<Uuid, BreedingSummary>,
    pub yields: Vec<YieldSample>,
    pub milkings: Vec<MilkingRecord>,
    pub animals: Vec<AnimalRef>,
    /// Start dates of treatments per animal.
    pub treatments_started: HashMap<Uuid, Vec<NaiveDate>>,
    pub weighings: Vec<Weighing>,
    /// Properties whose every query fails.
    pub failing_properties: HashSet<Uuid>,
    /// Properties whose queries never return.
    pub hanging_properties: HashSet<Uuid>,
}

impl FakeHerd {
    pub fn property(&mut self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.properties.push(PropertyRef {
            id,
            name: name.to_string(),
        });
        id
    }

    pub fn animal(&mut self, property_id: Uuid, tag: &str) -> AnimalRef {
        let animal = AnimalRef {
            id: Uuid::new_v4(),
            property_id,
            tag: tag.to_string(),
            group_label: Some("Lot A".into()),
            property_name: self
                .properties
                .iter()
                .find(|p| p.id == property_id)
                .map(|p| p.name.clone()),
        };
        self.animals.push(animal.clone());
        animal
    }

    async fn guard(&self, property_id: Uuid) -> Result<(), GatewayError> {
        if self.hanging_properties.contains(&property_id) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing_properties.contains(&property_id) {
            return Err(GatewayError::Inconsistent(format!(
                "property {} unavailable",
                property_id
            )));
        }
        Ok(())
    }
}

fn since(today: NaiveDate, days_back: i64) -> NaiveDate {
    today - DateDuration::days(days_back)
}

#[async_trait]
impl PropertyGateway for FakeHerd {
    async fn active_properties(&self) -> Result<Vec<PropertyRef>, GatewayError> {
        Ok(self.properties.clone())
    }
}

#[async_trait]
impl SanitaryGateway for FakeHerd {
    async fn treatments_with_return_due(
        &self,
        property_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TreatmentReturn>, GatewayError> {
        self.guard(property_id).await?;
        Ok(self
            .treatment_returns
            .iter()
            .filter(|t| t.animal.property_id == property_id)
            .filter(|t| t.return_date >= from && t.return_date <= to)
            .cloned()
            .collect())
    }

    async fn vaccinations_due(
        &self,
        property_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<VaccinationDue>, GatewayError> {
        self.guard(property_id).await?;
        Ok(self
            .vaccinations
            .iter()
            .filter(|v| v.animal.property_id == property_id)
            .filter(|v| v.scheduled_date >= from && v.scheduled_date <= to)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReproductionGateway for FakeHerd {
    async fn confirmed_pregnancies(
        &self,
        property_id: Uuid,
    ) -> Result<Vec<BreedingEvent>, GatewayError> {
        self.guard(property_id).await?;
        Ok(self
            .pregnancies
            .iter()
            .filter(|b| b.animal.property_id == property_id)
            .cloned()
            .collect())
    }

    async fn breedings_without_diagnosis(
        &self,
        property_id: Uuid,
        min_days_elapsed: i64,
        today: NaiveDate,
    ) -> Result<Vec<BreedingEvent>, GatewayError> {
        self.guard(property_id).await?;
        let cutoff = since(today, min_days_elapsed);
        Ok(self
            .pending_breedings
            .iter()
            .filter(|b| b.animal.property_id == property_id && b.breeding_date <= cutoff)
            .cloned()
            .collect())
    }

    async fn eligible_females(
        &self,
        property_id: Uuid,
        min_age_months: u32,
        today: NaiveDate,
    ) -> Result<Vec<Female>, GatewayError> {
        self.guard(property_id).await?;
        let born_by = today
            .checked_sub_months(chrono::Months::new(min_age_months))
            .unwrap();
        Ok(self
            .females
            .iter()
            .filter(|f| f.animal.property_id == property_id)
            .filter(|f| f.birth_date.map_or(false, |b| b <= born_by))
            .cloned()
            .collect())
    }

    async fn last_breeding(
        &self,
        animal_id: Uuid,
    ) -> Result<Option<BreedingSummary>, GatewayError> {
        Ok(self.last_breedings.get(&animal_id).cloned())
    }
}

#[async_trait]
impl ProductionGateway for FakeHerd {
    async fn recent_yields(
        &self,
        property_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<Vec<YieldSample>, GatewayError> {
        self.guard(property_id).await?;
        let from = since(today, days_back);
        Ok(self
            .yields
            .iter()
            .filter(|y| y.animal.property_id == property_id)
            .filter(|y| y.date >= from && y.date <= today)
            .cloned()
            .collect())
    }

    async fn recent_milking_records(
        &self,
        animal_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<Vec<MilkingRecord>, GatewayError> {
        let from = since(today, days_back);
        Ok(self
            .milkings
            .iter()
            .filter(|m| m.animal_id == animal_id && m.date >= from && m.date <= today)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ClinicalGateway for FakeHerd {
    async fn active_animals(&self, property_id: Uuid) -> Result<Vec<AnimalRef>, GatewayError> {
        self.guard(property_id).await?;
        Ok(self
            .animals
            .iter()
            .filter(|a| a.property_id == property_id)
            .cloned()
            .collect())
    }

    async fn recent_treatment_count(
        &self,
        animal_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<u64, GatewayError> {
        let from = since(today, days_back);
        Ok(self
            .treatments_started
            .get(&animal_id)
            .map(|days| days.iter().filter(|d| **d >= from && **d <= today).count() as u64)
            .unwrap_or(0))
    }

    async fn recent_weighings(
        &self,
        animal_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<Vec<Weighing>, GatewayError> {
        let from = since(today, days_back);
        let mut weighings: Vec<_> = self
            .weighings
            .iter()
            .filter(|w| w.animal_id == animal_id && w.date >= from && w.date <= today)
            .cloned()
            .collect();
        weighings.sort_by_key(|w| w.date);
        Ok(weighings)
    }
}
