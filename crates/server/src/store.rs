//! Persistence for targets, check outcomes, incidents and alert settings.
//!
//! [`Store`] is the only component that talks to the database. The check
//! pipeline uses the narrow set of operations it needs (create an outcome,
//! find the previous one, open/resolve incidents, read alert settings); the
//! HTTP layer additionally uses the CRUD and history queries.

use crate::entity::incident::IncidentKind;
use crate::entity::{TargetId, alert_configuration, check_outcome, incident, monitored_target};
use crate::error::StoreError;
use crate::monitoring::probe::ProbeOutcome;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use std::sync::Arc;
use time::OffsetDateTime;

/// Fields required to register a target.
#[derive(Clone, Debug)]
pub struct NewTarget {
    pub name: String,
    pub address: String,
    pub interval_secs: i32,
    pub active: bool,
}

/// Partial update of a target; `None` leaves the column untouched.
#[derive(Clone, Debug, Default)]
pub struct TargetChanges {
    pub name: Option<String>,
    pub address: Option<String>,
    pub interval_secs: Option<i32>,
    pub active: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct NewAlertConfiguration {
    pub target_id: TargetId,
    pub email_recipient: Option<String>,
    pub webhook_url: Option<String>,
    pub notify_on_down: bool,
    pub notify_on_up: bool,
}

/// Partial update of an alert configuration. The outer `Option` selects
/// whether a nullable column is touched at all.
#[derive(Clone, Debug, Default)]
pub struct AlertConfigurationChanges {
    pub email_recipient: Option<Option<String>>,
    pub webhook_url: Option<Option<String>>,
    pub notify_on_down: Option<bool>,
    pub notify_on_up: Option<bool>,
}

/// Time range and pagination for check history.
#[derive(Clone, Debug)]
pub struct HistoryQuery {
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
    pub take: u64,
    pub skip: u64,
}

#[derive(Clone, Debug)]
pub struct Store {
    db: Arc<DatabaseConnection>,
}

impl Store {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Opens a transaction for the writes of a single check. Nothing is
    /// durable until [`CheckTransaction::commit`]; dropping it rolls back.
    pub async fn begin_check(&self) -> Result<CheckTransaction, StoreError> {
        Ok(CheckTransaction {
            txn: self.connection().begin().await?,
        })
    }

    // ---------------------------------------------------------------------
    // Targets
    // ---------------------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn create_target(
        &self,
        new: NewTarget,
    ) -> Result<monitored_target::Model, StoreError> {
        let now = OffsetDateTime::now_utc();
        let model = monitored_target::ActiveModel {
            name: Set(new.name),
            address: Set(new.address),
            interval_secs: Set(new.interval_secs),
            active: Set(new.active),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(self.connection()).await?)
    }

    pub async fn get_target(
        &self,
        id: TargetId,
    ) -> Result<Option<monitored_target::Model>, StoreError> {
        Ok(monitored_target::Entity::find_by_id(id)
            .one(self.connection())
            .await?)
    }

    pub async fn list_targets(&self) -> Result<Vec<monitored_target::Model>, StoreError> {
        Ok(monitored_target::Entity::find()
            .order_by_asc(monitored_target::Column::Id)
            .all(self.connection())
            .await?)
    }

    pub async fn list_active_targets(&self) -> Result<Vec<monitored_target::Model>, StoreError> {
        Ok(monitored_target::Entity::find()
            .filter(monitored_target::Column::Active.eq(true))
            .order_by_asc(monitored_target::Column::Id)
            .all(self.connection())
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_target(
        &self,
        id: TargetId,
        changes: TargetChanges,
    ) -> Result<monitored_target::Model, StoreError> {
        let existing = self
            .get_target(id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Target".into()))?;

        let mut model: monitored_target::ActiveModel = existing.into();
        if let Some(name) = changes.name {
            model.name = Set(name);
        }
        if let Some(address) = changes.address {
            model.address = Set(address);
        }
        if let Some(interval_secs) = changes.interval_secs {
            model.interval_secs = Set(interval_secs);
        }
        if let Some(active) = changes.active {
            model.active = Set(active);
        }
        model.updated_at = Set(OffsetDateTime::now_utc());
        Ok(model.update(self.connection()).await?)
    }

    /// Deletes a target together with its alert configuration. Check history
    /// and incidents are kept.
    #[tracing::instrument(skip(self))]
    pub async fn delete_target(
        &self,
        id: TargetId,
    ) -> Result<monitored_target::Model, StoreError> {
        let existing = self
            .get_target(id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Target".into()))?;

        alert_configuration::Entity::delete_many()
            .filter(alert_configuration::Column::TargetId.eq(id))
            .exec(self.connection())
            .await?;
        monitored_target::Entity::delete_by_id(id)
            .exec(self.connection())
            .await?;
        Ok(existing)
    }

    // ---------------------------------------------------------------------
    // Check outcomes
    // ---------------------------------------------------------------------

    #[tracing::instrument(skip(self, outcome))]
    pub async fn create_check_outcome(
        &self,
        target_id: TargetId,
        outcome: &ProbeOutcome,
    ) -> Result<check_outcome::Model, StoreError> {
        insert_check_outcome(self.connection(), target_id, outcome).await
    }

    /// The outcome immediately preceding `exclude_id` for the same target.
    pub async fn previous_outcome(
        &self,
        target_id: TargetId,
        exclude_id: i32,
    ) -> Result<Option<check_outcome::Model>, StoreError> {
        find_previous_outcome(self.connection(), target_id, exclude_id).await
    }

    pub async fn latest_outcome(
        &self,
        target_id: TargetId,
    ) -> Result<Option<check_outcome::Model>, StoreError> {
        Ok(check_outcome::Entity::find()
            .filter(check_outcome::Column::TargetId.eq(target_id))
            .order_by_desc(check_outcome::Column::CheckedAt)
            .order_by_desc(check_outcome::Column::Id)
            .one(self.connection())
            .await?)
    }

    /// Latest outcome for every target, in target id order.
    pub async fn latest_outcomes(
        &self,
    ) -> Result<Vec<(monitored_target::Model, Option<check_outcome::Model>)>, StoreError> {
        let targets = self.list_targets().await?;
        let mut latest = Vec::with_capacity(targets.len());
        for target in targets {
            let outcome = self.latest_outcome(target.id).await?;
            latest.push((target, outcome));
        }
        Ok(latest)
    }

    /// Newest-first check history.
    pub async fn check_history(
        &self,
        target_id: TargetId,
        query: &HistoryQuery,
    ) -> Result<Vec<check_outcome::Model>, StoreError> {
        let mut select =
            check_outcome::Entity::find().filter(check_outcome::Column::TargetId.eq(target_id));
        if let Some(start) = query.start {
            select = select.filter(check_outcome::Column::CheckedAt.gte(start));
        }
        if let Some(end) = query.end {
            select = select.filter(check_outcome::Column::CheckedAt.lte(end));
        }
        Ok(select
            .order_by_desc(check_outcome::Column::CheckedAt)
            .order_by_desc(check_outcome::Column::Id)
            .offset(query.skip)
            .limit(query.take)
            .all(self.connection())
            .await?)
    }

    /// Oldest-first outcomes inside `[start, end]`, used for uptime buckets.
    pub async fn outcomes_between(
        &self,
        target_id: TargetId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<check_outcome::Model>, StoreError> {
        Ok(check_outcome::Entity::find()
            .filter(check_outcome::Column::TargetId.eq(target_id))
            .filter(check_outcome::Column::CheckedAt.gte(start))
            .filter(check_outcome::Column::CheckedAt.lte(end))
            .order_by_asc(check_outcome::Column::CheckedAt)
            .order_by_asc(check_outcome::Column::Id)
            .all(self.connection())
            .await?)
    }

    // ---------------------------------------------------------------------
    // Incidents
    // ---------------------------------------------------------------------

    pub async fn open_incident(
        &self,
        target_id: TargetId,
    ) -> Result<Option<incident::Model>, StoreError> {
        find_open_incident(self.connection(), target_id).await
    }

    #[tracing::instrument(skip(self, description))]
    pub async fn create_incident(
        &self,
        target_id: TargetId,
        kind: IncidentKind,
        description: String,
        opened_at: OffsetDateTime,
    ) -> Result<incident::Model, StoreError> {
        insert_incident(self.connection(), target_id, kind, description, opened_at).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn resolve_incident(
        &self,
        id: i32,
        resolved_at: OffsetDateTime,
    ) -> Result<incident::Model, StoreError> {
        mark_incident_resolved(self.connection(), id, resolved_at).await
    }

    pub async fn incidents_for_target(
        &self,
        target_id: TargetId,
    ) -> Result<Vec<incident::Model>, StoreError> {
        Ok(incident::Entity::find()
            .filter(incident::Column::TargetId.eq(target_id))
            .order_by_desc(incident::Column::OpenedAt)
            .order_by_desc(incident::Column::Id)
            .all(self.connection())
            .await?)
    }

    // ---------------------------------------------------------------------
    // Alert configuration
    // ---------------------------------------------------------------------

    pub async fn alert_configuration(
        &self,
        target_id: TargetId,
    ) -> Result<Option<alert_configuration::Model>, StoreError> {
        Ok(alert_configuration::Entity::find()
            .filter(alert_configuration::Column::TargetId.eq(target_id))
            .one(self.connection())
            .await?)
    }

    pub async fn get_alert_configuration(
        &self,
        id: i32,
    ) -> Result<Option<alert_configuration::Model>, StoreError> {
        Ok(alert_configuration::Entity::find_by_id(id)
            .one(self.connection())
            .await?)
    }

    pub async fn list_alert_configurations(
        &self,
    ) -> Result<Vec<alert_configuration::Model>, StoreError> {
        Ok(alert_configuration::Entity::find()
            .order_by_asc(alert_configuration::Column::Id)
            .all(self.connection())
            .await?)
    }

    #[tracing::instrument(skip(self, new), fields(target_id = new.target_id))]
    pub async fn create_alert_configuration(
        &self,
        new: NewAlertConfiguration,
    ) -> Result<alert_configuration::Model, StoreError> {
        if self.get_target(new.target_id).await?.is_none() {
            return Err(StoreError::NotFound("Target".into()));
        }
        if self.alert_configuration(new.target_id).await?.is_some() {
            return Err(StoreError::Conflict(
                "Alert configuration already exists for this target".into(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let model = alert_configuration::ActiveModel {
            target_id: Set(new.target_id),
            email_recipient: Set(new.email_recipient),
            webhook_url: Set(new.webhook_url),
            notify_on_down: Set(new.notify_on_down),
            notify_on_up: Set(new.notify_on_up),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(self.connection()).await?)
    }

    #[tracing::instrument(skip(self, changes))]
    pub async fn update_alert_configuration(
        &self,
        id: i32,
        changes: AlertConfigurationChanges,
    ) -> Result<alert_configuration::Model, StoreError> {
        let existing = self
            .get_alert_configuration(id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Alert configuration".into()))?;

        let mut model: alert_configuration::ActiveModel = existing.into();
        if let Some(email_recipient) = changes.email_recipient {
            model.email_recipient = Set(email_recipient);
        }
        if let Some(webhook_url) = changes.webhook_url {
            model.webhook_url = Set(webhook_url);
        }
        if let Some(notify_on_down) = changes.notify_on_down {
            model.notify_on_down = Set(notify_on_down);
        }
        if let Some(notify_on_up) = changes.notify_on_up {
            model.notify_on_up = Set(notify_on_up);
        }
        model.updated_at = Set(OffsetDateTime::now_utc());
        Ok(model.update(self.connection()).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_alert_configuration(&self, id: i32) -> Result<(), StoreError> {
        let result = alert_configuration::Entity::delete_by_id(id)
            .exec(self.connection())
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound("Alert configuration".into()));
        }
        Ok(())
    }
}

/// Outcome and incident writes of one check, committed together.
pub struct CheckTransaction {
    txn: DatabaseTransaction,
}

impl CheckTransaction {
    pub async fn create_check_outcome(
        &self,
        target_id: TargetId,
        outcome: &ProbeOutcome,
    ) -> Result<check_outcome::Model, StoreError> {
        insert_check_outcome(&self.txn, target_id, outcome).await
    }

    pub async fn previous_outcome(
        &self,
        target_id: TargetId,
        exclude_id: i32,
    ) -> Result<Option<check_outcome::Model>, StoreError> {
        find_previous_outcome(&self.txn, target_id, exclude_id).await
    }

    pub async fn open_incident(
        &self,
        target_id: TargetId,
    ) -> Result<Option<incident::Model>, StoreError> {
        find_open_incident(&self.txn, target_id).await
    }

    pub async fn create_incident(
        &self,
        target_id: TargetId,
        kind: IncidentKind,
        description: String,
        opened_at: OffsetDateTime,
    ) -> Result<incident::Model, StoreError> {
        insert_incident(&self.txn, target_id, kind, description, opened_at).await
    }

    pub async fn resolve_incident(
        &self,
        id: i32,
        resolved_at: OffsetDateTime,
    ) -> Result<incident::Model, StoreError> {
        mark_incident_resolved(&self.txn, id, resolved_at).await
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        Ok(self.txn.commit().await?)
    }
}

async fn insert_check_outcome<C: ConnectionTrait>(
    db: &C,
    target_id: TargetId,
    outcome: &ProbeOutcome,
) -> Result<check_outcome::Model, StoreError> {
    let model = check_outcome::ActiveModel {
        target_id: Set(target_id),
        status_code: Set(outcome.status_code.map(i32::from)),
        latency_ms: Set(outcome.latency_ms),
        reachable: Set(outcome.reachable),
        error: Set(outcome.error.as_ref().map(ToString::to_string)),
        checked_at: Set(outcome.checked_at),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

async fn find_previous_outcome<C: ConnectionTrait>(
    db: &C,
    target_id: TargetId,
    exclude_id: i32,
) -> Result<Option<check_outcome::Model>, StoreError> {
    Ok(check_outcome::Entity::find()
        .filter(check_outcome::Column::TargetId.eq(target_id))
        .filter(check_outcome::Column::Id.ne(exclude_id))
        .order_by_desc(check_outcome::Column::CheckedAt)
        .order_by_desc(check_outcome::Column::Id)
        .one(db)
        .await?)
}

async fn find_open_incident<C: ConnectionTrait>(
    db: &C,
    target_id: TargetId,
) -> Result<Option<incident::Model>, StoreError> {
    Ok(incident::Entity::find()
        .filter(incident::Column::TargetId.eq(target_id))
        .filter(incident::Column::ResolvedAt.is_null())
        .order_by_desc(incident::Column::OpenedAt)
        .one(db)
        .await?)
}

async fn insert_incident<C: ConnectionTrait>(
    db: &C,
    target_id: TargetId,
    kind: IncidentKind,
    description: String,
    opened_at: OffsetDateTime,
) -> Result<incident::Model, StoreError> {
    let model = incident::ActiveModel {
        target_id: Set(target_id),
        kind: Set(kind),
        description: Set(description),
        opened_at: Set(opened_at),
        resolved_at: Set(None),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

async fn mark_incident_resolved<C: ConnectionTrait>(
    db: &C,
    id: i32,
    resolved_at: OffsetDateTime,
) -> Result<incident::Model, StoreError> {
    let existing = incident::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| StoreError::NotFound("Incident".into()))?;
    let mut model: incident::ActiveModel = existing.into();
    model.resolved_at = Set(Some(resolved_at));
    Ok(model.update(db).await?)
}
