//! Alert persistence and the idempotent creation protocol.
//!
//! Every evaluator goes through [`AlertStore::raise`] (or its thin wrapper
//! [`AlertStore::create_if_not_exists`]). The read of the lineage history
//! decides *whether* a new alert is warranted; the unique `open_slot` index
//! makes the final insert atomic, so overlapping runs for the same lineage
//! end up sharing one open row instead of racing two inserts in.

use chrono::{Days, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::PriorityClassifier;
use crate::clock::Clock;
use crate::domain::{lineage_slot, AlertDomain, AlertRequest, Origin, Severity};
use crate::entities::{alerts, Alerts};
use crate::error::{AlertError, ClassifierError};

pub type Alert = alerts::Model;

/// Attempts of the read-decide-insert cycle before giving up with a conflict.
/// A retry only happens when the slot holder was acknowledged between our
/// insert attempt and the re-read.
const MAX_RAISE_ATTEMPTS: usize = 3;

pub const DEFAULT_PAGE_SIZE: u64 = 50;
pub const MAX_PAGE_SIZE: u64 = 500;

/// Outcome of [`AlertStore::raise`].
#[derive(Debug, Clone, PartialEq)]
pub enum Raised {
    Created(Alert),
    /// An open alert already covers this lineage.
    Existing(Alert),
}

impl Raised {
    pub fn is_created(&self) -> bool {
        matches!(self, Raised::Created(_))
    }

    pub fn alert(&self) -> &Alert {
        match self {
            Raised::Created(a) | Raised::Existing(a) => a,
        }
    }

    pub fn into_alert(self) -> Alert {
        match self {
            Raised::Created(a) | Raised::Existing(a) => a,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFilter {
    pub domain: Option<AlertDomain>,
    pub severity: Option<Severity>,
    pub acknowledged: Option<bool>,
    /// `alert_date` within `[today, today + N]`.
    pub due_within_days: Option<u32>,
    pub property_id: Option<Uuid>,
}

/// Zero-based page request. Deserialization goes through [`Pagination::new`],
/// so the page size is always within `1..=MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PageRequest")]
pub struct Pagination {
    page: u64,
    page_size: u64,
}

#[derive(Deserialize)]
struct PageRequest {
    #[serde(default)]
    page: u64,
    #[serde(default = "default_page_size")]
    page_size: u64,
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

impl From<PageRequest> for Pagination {
    fn from(request: PageRequest) -> Self {
        Self::new(request.page, request.page_size)
    }
}

impl Pagination {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

enum Decision {
    Reuse(Alert),
    Insert,
}

#[derive(Clone)]
pub struct AlertStore {
    db: DatabaseConnection,
    classifier: Arc<dyn PriorityClassifier>,
    classifier_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl AlertStore {
    pub fn new(
        db: DatabaseConnection,
        classifier: Arc<dyn PriorityClassifier>,
        classifier_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            classifier,
            classifier_timeout,
            clock,
        }
    }

    /// Inserts unconditionally. A request with an origin still claims the
    /// lineage slot, so inserting next to an open alert of the same lineage
    /// fails with [`AlertError::Conflict`].
    pub async fn create(&self, request: AlertRequest) -> Result<Alert, AlertError> {
        let slot = request.open_slot();
        let active = self.build_row(Uuid::new_v4(), &request).await;
        let alert = active.insert(&self.db).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                AlertError::Conflict(slot.clone().unwrap_or_default())
            }
            _ => AlertError::Persistence(e),
        })?;

        crate::metrics::increment_alerts_created(alert.domain);
        info!(
            alert_id = %alert.id,
            domain = %alert.domain,
            severity = %alert.severity,
            animal_id = %alert.animal_id,
            "Alert created"
        );
        Ok(alert)
    }

    /// Idempotent entry point used by every evaluator.
    pub async fn create_if_not_exists(&self, request: AlertRequest) -> Result<Alert, AlertError> {
        self.raise(request).await.map(Raised::into_alert)
    }

    /// Like [`Self::create_if_not_exists`], but tells the caller whether a
    /// row was actually inserted.
    pub async fn raise(&self, request: AlertRequest) -> Result<Raised, AlertError> {
        let Some(origin) = request.origin else {
            return self.create(request).await.map(Raised::Created);
        };
        let slot = lineage_slot(
            origin.event_type,
            origin.event_id,
            request.animal_id,
            request.domain,
            request.alert_date,
        );

        for attempt in 1..=MAX_RAISE_ATTEMPTS {
            let history = self.lineage_history(&request, origin).await?;
            match decide(&history, &request, origin) {
                Decision::Reuse(existing) => {
                    debug!(
                        alert_id = %existing.id,
                        origin_event_type = %origin.event_type,
                        "Open alert already covers this lineage"
                    );
                    return Ok(Raised::Existing(existing));
                }
                Decision::Insert => {}
            }

            let id = Uuid::new_v4();
            let active = self.build_row(id, &request).await;
            let inserted = Alerts::insert(active)
                .on_conflict(
                    OnConflict::column(alerts::Column::OpenSlot)
                        .do_nothing()
                        .to_owned(),
                )
                .exec(&self.db)
                .await;

            match inserted {
                Ok(_) => {
                    let alert = Alerts::find_by_id(id)
                        .one(&self.db)
                        .await?
                        .ok_or(AlertError::NotFound(id))?;
                    crate::metrics::increment_alerts_created(alert.domain);
                    info!(
                        alert_id = %alert.id,
                        domain = %alert.domain,
                        severity = %alert.severity,
                        origin_event_type = %origin.event_type,
                        alert_date = %alert.alert_date,
                        "Alert created"
                    );
                    return Ok(Raised::Created(alert));
                }
                Err(DbErr::RecordNotInserted) => {
                    // Lost the race: someone else opened the slot after our read.
                    if let Some(holder) = Alerts::find()
                        .filter(alerts::Column::OpenSlot.eq(slot.as_str()))
                        .one(&self.db)
                        .await?
                    {
                        debug!(alert_id = %holder.id, "Concurrent insert won the lineage slot");
                        return Ok(Raised::Existing(holder));
                    }
                    warn!(slot = %slot, attempt, "Lineage slot released while raising, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AlertError::Conflict(slot))
    }

    pub async fn get(&self, id: Uuid) -> Result<Alert, AlertError> {
        Alerts::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AlertError::NotFound(id))
    }

    /// Sorted by `alert_date` ascending, then severity HIGH > MEDIUM > LOW.
    pub async fn find(
        &self,
        filter: &AlertFilter,
        pagination: Pagination,
    ) -> Result<PagedResult<Alert>, AlertError> {
        let mut query = Alerts::find();
        if let Some(domain) = filter.domain {
            query = query.filter(alerts::Column::Domain.eq(domain));
        }
        if let Some(severity) = filter.severity {
            query = query.filter(alerts::Column::Severity.eq(severity));
        }
        if let Some(acknowledged) = filter.acknowledged {
            query = query.filter(alerts::Column::Acknowledged.eq(acknowledged));
        }
        if let Some(property_id) = filter.property_id {
            query = query.filter(alerts::Column::PropertyId.eq(property_id));
        }
        if let Some(days) = filter.due_within_days {
            let today = self.clock.today();
            // Past the last representable date every future alert is due.
            query = match today.checked_add_days(Days::new(days.into())) {
                Some(until) => query.filter(alerts::Column::AlertDate.between(today, until)),
                None => query.filter(alerts::Column::AlertDate.gte(today)),
            };
        }
        if pagination.page.checked_mul(pagination.page_size).is_none() {
            return Err(AlertError::InvalidRequest(format!(
                "page {} is out of range",
                pagination.page
            )));
        }

        let paginator = query
            .order_by_asc(alerts::Column::AlertDate)
            .order_by_desc(alerts::Column::Severity)
            .order_by_asc(alerts::Column::CreatedAt)
            .paginate(&self.db, pagination.page_size);

        let totals = paginator.num_items_and_pages().await?;
        let items = paginator.fetch_page(pagination.page).await?;

        Ok(PagedResult {
            items,
            page: pagination.page,
            page_size: pagination.page_size,
            total_items: totals.number_of_items,
            total_pages: totals.number_of_pages,
        })
    }

    /// Acknowledging releases the lineage slot; un-acknowledging claims it
    /// back and fails with [`AlertError::Conflict`] if a newer alert holds it.
    pub async fn acknowledge(&self, id: Uuid, flag: bool) -> Result<Alert, AlertError> {
        let alert = self.get(id).await?;
        if alert.acknowledged == flag {
            return Ok(alert);
        }

        let slot = match (flag, alert.origin_event_type, alert.origin_event_id) {
            (false, Some(event_type), Some(event_id)) => Some(lineage_slot(
                event_type,
                event_id,
                alert.animal_id,
                alert.domain,
                alert.alert_date,
            )),
            _ => None,
        };

        let mut active: alerts::ActiveModel = alert.into();
        active.acknowledged = Set(flag);
        active.open_slot = Set(slot.clone());
        active.updated_at = Set(Utc::now().naive_utc());

        let updated = active.update(&self.db).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                AlertError::Conflict(slot.unwrap_or_default())
            }
            _ => AlertError::Persistence(e),
        })?;
        if flag {
            crate::metrics::decrement_open_alerts(updated.domain);
        } else {
            crate::metrics::increment_open_alerts(updated.domain);
        }
        info!(alert_id = %id, acknowledged = flag, "Alert acknowledgment changed");
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AlertError> {
        let alert = self.get(id).await?;
        let res = Alerts::delete_by_id(id).exec(&self.db).await?;
        if res.rows_affected == 0 {
            return Err(AlertError::NotFound(id));
        }
        if !alert.acknowledged {
            crate::metrics::decrement_open_alerts(alert.domain);
        }
        info!(alert_id = %id, "Alert deleted");
        Ok(())
    }

    async fn lineage_history(
        &self,
        request: &AlertRequest,
        origin: Origin,
    ) -> Result<Vec<Alert>, AlertError> {
        Ok(Alerts::find()
            .filter(alerts::Column::OriginEventType.eq(origin.event_type))
            .filter(alerts::Column::OriginEventId.eq(origin.event_id))
            .filter(alerts::Column::AnimalId.eq(request.animal_id))
            .filter(alerts::Column::Domain.eq(request.domain))
            .order_by_desc(alerts::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    async fn build_row(&self, id: Uuid, request: &AlertRequest) -> alerts::ActiveModel {
        let severity = self.resolve_severity(request).await;
        let now = Utc::now().naive_utc();
        alerts::ActiveModel {
            id: Set(id),
            domain: Set(request.domain),
            severity: Set(severity),
            animal_id: Set(request.animal_id),
            property_id: Set(request.property_id),
            group_label: Set(request.group_label.clone()),
            location_label: Set(request.location_label.clone()),
            reason: Set(request.reason.clone()),
            note: Set(request.note.clone()),
            clinical_narrative: Set(request.clinical_narrative.clone()),
            alert_date: Set(request.alert_date),
            acknowledged: Set(false),
            origin_event_type: Set(request.origin.map(|o| o.event_type)),
            origin_event_id: Set(request.origin.map(|o| o.event_id)),
            open_slot: Set(request.open_slot()),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }

    /// Explicit severity wins; otherwise ask the classifier, bounded by its
    /// own timeout, and fall back to MEDIUM on any failure.
    async fn resolve_severity(&self, request: &AlertRequest) -> Severity {
        if let Some(severity) = request.severity {
            return severity;
        }

        let text = request.classification_text();
        let outcome =
            match tokio::time::timeout(self.classifier_timeout, self.classifier.classify(&text))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ClassifierError::Timeout(self.classifier_timeout)),
            };

        match outcome {
            Ok(severity) => severity,
            Err(ClassifierError::Disabled) => Severity::Medium,
            Err(e) => {
                warn!(domain = %request.domain, "Priority classification unavailable, using MEDIUM: {}", e);
                crate::metrics::increment_classifier_fallbacks();
                Severity::Medium
            }
        }
    }
}

/// Lineage decision over `history` (newest first).
fn decide(history: &[Alert], request: &AlertRequest, origin: Origin) -> Decision {
    let Some(newest) = history.first() else {
        return Decision::Insert;
    };
    if !newest.acknowledged {
        return Decision::Reuse(newest.clone());
    }
    if origin.event_type.is_recurring() {
        if let Some(same_day) = history
            .iter()
            .find(|a| !a.acknowledged && a.alert_date == request.alert_date)
        {
            return Decision::Reuse(same_day.clone());
        }
    }
    Decision::Insert
}
