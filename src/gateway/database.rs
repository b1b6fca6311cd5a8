use async_trait::async_trait;
use chrono::{Duration, Months, NaiveDate};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use uuid::Uuid;

use super::{
    AnimalRef, BreedingEvent, BreedingSummary, ClinicalGateway, Female, MilkingRecord,
    ProductionGateway, PropertyGateway, PropertyRef, ReproductionGateway, SanitaryGateway,
    TreatmentReturn, VaccinationDue, Weighing, YieldSample,
};
use crate::entities::animal::Sex;
use crate::entities::breeding::BreedingStatus;
use crate::entities::{
    animal, breeding, milking, property, treatment, vaccination, weighing, Animal, Breeding,
    Milking, Property, Treatment, Vaccination, Weighing as Weighings,
};
use crate::error::GatewayError;

/// Gateway over the herd tables of the main database.
#[derive(Clone)]
pub struct DatabaseGateway {
    db: DatabaseConnection,
}

impl DatabaseGateway {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn property_name(&self, property_id: Uuid) -> Result<Option<String>, GatewayError> {
        Ok(Property::find_by_id(property_id)
            .one(&self.db)
            .await?
            .map(|p| p.name))
    }

    /// Breedings of live animals of the property with the given status.
    async fn breedings_with_status(
        &self,
        property_id: Uuid,
        status: BreedingStatus,
        bred_on_or_before: Option<NaiveDate>,
    ) -> Result<Vec<BreedingEvent>, GatewayError> {
        let mut query = Breeding::find()
            .find_also_related(Animal)
            .filter(breeding::Column::Status.eq(status))
            .filter(animal::Column::PropertyId.eq(property_id))
            .filter(animal::Column::DeletedAt.is_null());
        if let Some(cutoff) = bred_on_or_before {
            query = query.filter(breeding::Column::BreedingDate.lte(cutoff));
        }
        let rows = query
            .order_by_asc(breeding::Column::BreedingDate)
            .all(&self.db)
            .await?;

        let location = self.property_name(property_id).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(b, a)| {
                a.map(|a| BreedingEvent {
                    breeding_id: b.id,
                    animal: animal_ref(a, location.clone()),
                    breeding_date: b.breeding_date,
                })
            })
            .collect())
    }
}

fn animal_ref(model: animal::Model, property_name: Option<String>) -> AnimalRef {
    AnimalRef {
        id: model.id,
        property_id: model.property_id,
        tag: model.tag,
        group_label: model.group_label,
        property_name,
    }
}

fn window_start(today: NaiveDate, days_back: i64) -> NaiveDate {
    today - Duration::days(days_back)
}

#[async_trait]
impl PropertyGateway for DatabaseGateway {
    async fn active_properties(&self) -> Result<Vec<PropertyRef>, GatewayError> {
        let rows = Property::find()
            .filter(property::Column::DeletedAt.is_null())
            .order_by_asc(property::Column::Name)
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|p| PropertyRef {
                id: p.id,
                name: p.name,
            })
            .collect())
    }
}

#[async_trait]
impl SanitaryGateway for DatabaseGateway {
    async fn treatments_with_return_due(
        &self,
        property_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TreatmentReturn>, GatewayError> {
        let rows = Treatment::find()
            .find_also_related(Animal)
            .filter(animal::Column::PropertyId.eq(property_id))
            .filter(animal::Column::DeletedAt.is_null())
            .filter(treatment::Column::ReturnDate.between(from, to))
            .order_by_asc(treatment::Column::ReturnDate)
            .all(&self.db)
            .await?;

        let location = self.property_name(property_id).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(t, a)| {
                Some(TreatmentReturn {
                    treatment_id: t.id,
                    return_date: t.return_date?,
                    description: t.description,
                    animal: animal_ref(a?, location.clone()),
                })
            })
            .collect())
    }

    async fn vaccinations_due(
        &self,
        property_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<VaccinationDue>, GatewayError> {
        let rows = Vaccination::find()
            .find_also_related(Animal)
            .filter(animal::Column::PropertyId.eq(property_id))
            .filter(animal::Column::DeletedAt.is_null())
            .filter(vaccination::Column::AppliedOn.is_null())
            .filter(vaccination::Column::ScheduledDate.between(from, to))
            .order_by_asc(vaccination::Column::ScheduledDate)
            .all(&self.db)
            .await?;

        let location = self.property_name(property_id).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(v, a)| {
                Some(VaccinationDue {
                    vaccination_id: v.id,
                    animal: animal_ref(a?, location.clone()),
                    vaccine: v.vaccine,
                    scheduled_date: v.scheduled_date,
                })
            })
            .collect())
    }
}

#[async_trait]
impl ReproductionGateway for DatabaseGateway {
    async fn confirmed_pregnancies(
        &self,
        property_id: Uuid,
    ) -> Result<Vec<BreedingEvent>, GatewayError> {
        self.breedings_with_status(property_id, BreedingStatus::Confirmed, None)
            .await
    }

    async fn breedings_without_diagnosis(
        &self,
        property_id: Uuid,
        min_days_elapsed: i64,
        today: NaiveDate,
    ) -> Result<Vec<BreedingEvent>, GatewayError> {
        let cutoff = window_start(today, min_days_elapsed);
        self.breedings_with_status(property_id, BreedingStatus::InProgress, Some(cutoff))
            .await
    }

    async fn eligible_females(
        &self,
        property_id: Uuid,
        min_age_months: u32,
        today: NaiveDate,
    ) -> Result<Vec<Female>, GatewayError> {
        let born_on_or_before = today
            .checked_sub_months(Months::new(min_age_months))
            .ok_or_else(|| {
                GatewayError::Inconsistent(format!("{} months before {}", min_age_months, today))
            })?;

        let rows = Animal::find()
            .filter(animal::Column::PropertyId.eq(property_id))
            .filter(animal::Column::DeletedAt.is_null())
            .filter(animal::Column::Sex.eq(Sex::Female))
            .filter(animal::Column::BirthDate.lte(born_on_or_before))
            .order_by_asc(animal::Column::Tag)
            .all(&self.db)
            .await?;

        let location = self.property_name(property_id).await?;
        Ok(rows
            .into_iter()
            .map(|a| Female {
                birth_date: a.birth_date,
                animal: animal_ref(a, location.clone()),
            })
            .collect())
    }

    async fn last_breeding(&self, animal_id: Uuid) -> Result<Option<BreedingSummary>, GatewayError> {
        Ok(Breeding::find()
            .filter(breeding::Column::AnimalId.eq(animal_id))
            .order_by_desc(breeding::Column::BreedingDate)
            .one(&self.db)
            .await?
            .map(|b| BreedingSummary {
                breeding_id: b.id,
                breeding_date: b.breeding_date,
                status: b.status,
            }))
    }
}

#[async_trait]
impl ProductionGateway for DatabaseGateway {
    async fn recent_yields(
        &self,
        property_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<Vec<YieldSample>, GatewayError> {
        let rows = Milking::find()
            .find_also_related(Animal)
            .filter(animal::Column::PropertyId.eq(property_id))
            .filter(animal::Column::DeletedAt.is_null())
            .filter(milking::Column::MilkedOn.between(window_start(today, days_back), today))
            .order_by_asc(milking::Column::MilkedOn)
            .all(&self.db)
            .await?;

        let location = self.property_name(property_id).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(m, a)| {
                Some(YieldSample {
                    animal: animal_ref(a?, location.clone()),
                    date: m.milked_on,
                    liters: m.liters,
                })
            })
            .collect())
    }

    async fn recent_milking_records(
        &self,
        animal_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<Vec<MilkingRecord>, GatewayError> {
        let rows = Milking::find()
            .filter(milking::Column::AnimalId.eq(animal_id))
            .filter(milking::Column::MilkedOn.between(window_start(today, days_back), today))
            .order_by_asc(milking::Column::MilkedOn)
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| MilkingRecord {
                animal_id: m.animal_id,
                date: m.milked_on,
                liters: m.liters,
            })
            .collect())
    }
}

#[async_trait]
impl ClinicalGateway for DatabaseGateway {
    async fn active_animals(&self, property_id: Uuid) -> Result<Vec<AnimalRef>, GatewayError> {
        let rows = Animal::find()
            .filter(animal::Column::PropertyId.eq(property_id))
            .filter(animal::Column::DeletedAt.is_null())
            .order_by_asc(animal::Column::Tag)
            .all(&self.db)
            .await?;
        let location = self.property_name(property_id).await?;
        Ok(rows
            .into_iter()
            .map(|a| animal_ref(a, location.clone()))
            .collect())
    }

    async fn recent_treatment_count(
        &self,
        animal_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<u64, GatewayError> {
        Ok(Treatment::find()
            .filter(treatment::Column::AnimalId.eq(animal_id))
            .filter(treatment::Column::StartedOn.between(window_start(today, days_back), today))
            .count(&self.db)
            .await?)
    }

    async fn recent_weighings(
        &self,
        animal_id: Uuid,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<Vec<Weighing>, GatewayError> {
        let rows = Weighings::find()
            .filter(weighing::Column::AnimalId.eq(animal_id))
            .filter(weighing::Column::WeighedOn.between(window_start(today, days_back), today))
            .order_by_asc(weighing::Column::WeighedOn)
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|w| Weighing {
                animal_id: w.animal_id,
                date: w.weighed_on,
                weight_kg: w.weight_kg,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, memory_db};
    use chrono::NaiveDateTime;
    use sea_orm::{ActiveModelTrait, Set};

    const TODAY: (i32, u32, u32) = (2026, 3, 10);

    fn today() -> NaiveDate {
        date(TODAY.0, TODAY.1, TODAY.2)
    }

    fn stamp() -> NaiveDateTime {
        today().and_hms_opt(8, 0, 0).unwrap()
    }

    struct Seed {
        db: DatabaseConnection,
        farm: Uuid,
    }

    impl Seed {
        async fn new() -> Self {
            let db = memory_db().await;
            let farm = Uuid::new_v4();
            property::ActiveModel {
                id: Set(farm),
                name: Set("Fazenda Boa Vista".into()),
                deleted_at: Set(None),
                created_at: Set(stamp()),
            }
            .insert(&db)
            .await
            .unwrap();
            property::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set("Sold farm".into()),
                deleted_at: Set(Some(stamp())),
                created_at: Set(stamp()),
            }
            .insert(&db)
            .await
            .unwrap();
            Self { db, farm }
        }

        async fn animal(&self, tag: &str, sex: Sex, birth: Option<NaiveDate>) -> Uuid {
            let id = Uuid::new_v4();
            animal::ActiveModel {
                id: Set(id),
                property_id: Set(self.farm),
                tag: Set(tag.into()),
                group_label: Set(Some("Lactation 1".into())),
                sex: Set(sex),
                birth_date: Set(birth),
                deleted_at: Set(None),
            }
            .insert(&self.db)
            .await
            .unwrap();
            id
        }

        async fn treatment(&self, animal_id: Uuid, started: NaiveDate, ret: Option<NaiveDate>) {
            treatment::ActiveModel {
                id: Set(Uuid::new_v4()),
                animal_id: Set(animal_id),
                description: Set("Mastitis, intramammary antibiotic".into()),
                started_on: Set(started),
                return_date: Set(ret),
            }
            .insert(&self.db)
            .await
            .unwrap();
        }

        async fn breeding(&self, animal_id: Uuid, bred: NaiveDate, status: BreedingStatus) -> Uuid {
            let id = Uuid::new_v4();
            breeding::ActiveModel {
                id: Set(id),
                animal_id: Set(animal_id),
                breeding_date: Set(bred),
                status: Set(status),
                diagnosed_on: Set(None),
            }
            .insert(&self.db)
            .await
            .unwrap();
            id
        }

        fn gateway(&self) -> DatabaseGateway {
            DatabaseGateway::new(self.db.clone())
        }
    }

    #[tokio::test]
    async fn soft_deleted_properties_are_not_active() {
        let seed = Seed::new().await;
        let properties = seed.gateway().active_properties().await.unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].id, seed.farm);
    }

    #[tokio::test]
    async fn treatment_returns_respect_the_window_and_carry_labels() {
        let seed = Seed::new().await;
        let cow = seed.animal("BR-101", Sex::Female, None).await;
        seed.treatment(cow, date(2026, 3, 1), Some(date(2026, 3, 14))).await;
        seed.treatment(cow, date(2026, 3, 1), Some(date(2026, 4, 30))).await;
        seed.treatment(cow, date(2026, 3, 1), None).await;

        let due = seed
            .gateway()
            .treatments_with_return_due(seed.farm, today(), today() + Duration::days(15))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].return_date, date(2026, 3, 14));
        assert_eq!(due[0].animal.tag, "BR-101");
        assert_eq!(due[0].animal.group_label.as_deref(), Some("Lactation 1"));
        assert_eq!(due[0].animal.property_name.as_deref(), Some("Fazenda Boa Vista"));
    }

    #[tokio::test]
    async fn eligible_females_filters_sex_and_age() {
        let seed = Seed::new().await;
        seed.animal("old-cow", Sex::Female, Some(date(2023, 1, 5))).await;
        seed.animal("heifer", Sex::Female, Some(date(2025, 6, 1))).await;
        seed.animal("bull", Sex::Male, Some(date(2022, 1, 1))).await;

        let females = seed
            .gateway()
            .eligible_females(seed.farm, 18, today())
            .await
            .unwrap();
        let tags: Vec<_> = females.iter().map(|f| f.animal.tag.as_str()).collect();
        assert_eq!(tags, vec!["old-cow"]);
    }

    #[tokio::test]
    async fn breedings_are_selected_by_status_and_age() {
        let seed = Seed::new().await;
        let cow = seed.animal("BR-7", Sex::Female, Some(date(2022, 2, 2))).await;
        let old = seed.breeding(cow, date(2025, 11, 1), BreedingStatus::InProgress).await;
        seed.breeding(cow, date(2026, 2, 1), BreedingStatus::InProgress).await;
        let confirmed = seed.breeding(cow, date(2025, 6, 1), BreedingStatus::Confirmed).await;

        let gateway = seed.gateway();
        let pending = gateway
            .breedings_without_diagnosis(seed.farm, 90, today())
            .await
            .unwrap();
        assert_eq!(pending.iter().map(|b| b.breeding_id).collect::<Vec<_>>(), vec![old]);

        let pregnancies = gateway.confirmed_pregnancies(seed.farm).await.unwrap();
        assert_eq!(pregnancies.len(), 1);
        assert_eq!(pregnancies[0].breeding_id, confirmed);

        let last = gateway.last_breeding(cow).await.unwrap().unwrap();
        assert_eq!(last.breeding_date, date(2026, 2, 1));
        assert!(gateway.last_breeding(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clinical_queries_count_only_the_window() {
        let seed = Seed::new().await;
        let cow = seed.animal("BR-9", Sex::Female, None).await;
        seed.treatment(cow, date(2026, 3, 1), None).await;
        seed.treatment(cow, date(2026, 2, 1), None).await;
        seed.treatment(cow, date(2025, 12, 1), None).await;
        for (day, kg) in [(date(2026, 2, 1), 410.0), (date(2026, 3, 1), 412.5)] {
            weighing::ActiveModel {
                id: Set(Uuid::new_v4()),
                animal_id: Set(cow),
                weighed_on: Set(day),
                weight_kg: Set(kg),
            }
            .insert(&seed.db)
            .await
            .unwrap();
        }

        let gateway = seed.gateway();
        assert_eq!(gateway.recent_treatment_count(cow, 60, today()).await.unwrap(), 2);
        let weighings = gateway.recent_weighings(cow, 60, today()).await.unwrap();
        assert_eq!(weighings.len(), 2);
        assert!(weighings[0].date < weighings[1].date);
    }

    #[tokio::test]
    async fn milkings_are_windowed_per_property_and_animal() {
        let seed = Seed::new().await;
        let cow = seed.animal("BR-12", Sex::Female, None).await;
        for (day, liters) in [(date(2026, 3, 9), 21.0), (date(2026, 1, 1), 30.0)] {
            milking::ActiveModel {
                id: Set(Uuid::new_v4()),
                animal_id: Set(cow),
                milked_on: Set(day),
                liters: Set(liters),
            }
            .insert(&seed.db)
            .await
            .unwrap();
        }

        let gateway = seed.gateway();
        let yields = gateway.recent_yields(seed.farm, 36, today()).await.unwrap();
        assert_eq!(yields.len(), 1);
        assert_eq!(yields[0].liters, 21.0);
        assert_eq!(gateway.recent_milking_records(cow, 7, today()).await.unwrap().len(), 1);
    }
}
