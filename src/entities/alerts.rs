use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{AlertDomain, OriginEventType, Severity};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub domain: AlertDomain,
    pub severity: Severity,
    pub animal_id: Uuid,
    pub property_id: Uuid,
    pub group_label: Option<String>,
    pub location_label: Option<String>,
    pub reason: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub clinical_narrative: Option<String>,
    pub alert_date: Date,
    pub acknowledged: bool,
    pub origin_event_type: Option<OriginEventType>,
    pub origin_event_id: Option<Uuid>,
    /// Lineage key while unacknowledged, NULL once acknowledged. Unique.
    #[serde(skip)]
    #[sea_orm(unique, nullable)]
    pub open_slot: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
