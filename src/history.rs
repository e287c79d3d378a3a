use crate::entities;
use crate::errors::ConsentError;
use crate::settings::History as HistoryCfg;
use crate::storage::{AuthorizationResource, ConsentMappingResource, DetailedConsentResource};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

// Stable table identity codes. These are persisted in history rows; changing
// them breaks reconstruction for existing data.
pub const TABLE_CONSENT: &str = "01";
pub const TABLE_AUTHORIZATION: &str = "02";
pub const TABLE_MAPPING: &str = "03";
pub const TABLE_ATTRIBUTE: &str = "04";
pub const TABLE_FILE: &str = "05";

/// A reconstructed prior version of a consent aggregate: the state the
/// aggregate held immediately before the amendment with this `history_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentHistoryResource {
    pub history_id: i64,
    pub effective_timestamp: i64,
    pub reason: String,
    pub consent: DetailedConsentResource,
}

/// Consent-file change carried alongside an amendment, when the mutation
/// touched the file table.
#[derive(Debug, Clone, Copy)]
pub struct FileChange<'a> {
    pub previous: Option<&'a str>,
    pub current: &'a str,
}

/// Captures pre-mutation state as table-scoped diffs under a per-consent
/// monotonic history id. A disabled encoder is a no-op: mutations proceed
/// without a history trail and callers must not assume history rows exist.
#[derive(Debug, Clone)]
pub struct AmendmentHistoryEncoder {
    enabled: bool,
}

impl AmendmentHistoryEncoder {
    pub fn new(cfg: &HistoryCfg) -> Self {
        Self { enabled: cfg.enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Persist the diffs between the pre-mutation snapshot and the mutated
    /// aggregate, one row per changed table, all under one freshly allocated
    /// history id. Must run inside the same transaction as the mutation.
    /// Returns the allocated history id, or None when disabled or nothing
    /// changed.
    pub async fn capture<C: ConnectionTrait>(
        &self,
        db: &C,
        previous: &DetailedConsentResource,
        current: &DetailedConsentResource,
        file_change: Option<FileChange<'_>>,
        reason: &str,
        effective_timestamp: i64,
    ) -> Result<Option<i64>, ConsentError> {
        if !self.enabled {
            debug!("Amendment history is disabled, skipping capture");
            return Ok(None);
        }

        if reason.is_empty() || effective_timestamp == 0 {
            return Err(ConsentError::Validation(
                "amendment reason and timestamp are mandatory for history capture".to_string(),
            ));
        }

        let consent_id = &current.consent_id;
        let mut rows: Vec<(String, String, Value)> = Vec::new();

        let consent_diff = changed_consent_data(current, previous);
        if !consent_diff.is_empty() {
            rows.push((
                TABLE_CONSENT.to_string(),
                consent_id.clone(),
                Value::Object(consent_diff),
            ));
        }

        let attribute_diff = changed_attributes(&current.attributes, &previous.attributes);
        if !attribute_diff.is_empty() {
            rows.push((
                TABLE_ATTRIBUTE.to_string(),
                consent_id.clone(),
                Value::Object(attribute_diff),
            ));
        }

        for (mapping_id, diff) in changed_mappings(&current.mappings, &previous.mappings) {
            rows.push((TABLE_MAPPING.to_string(), mapping_id, diff));
        }

        for (authorization_id, diff) in
            changed_authorizations(&current.authorizations, &previous.authorizations)
        {
            rows.push((TABLE_AUTHORIZATION.to_string(), authorization_id, diff));
        }

        if let Some(change) = file_change {
            if let Some(diff) = changed_file(change) {
                rows.push((TABLE_FILE.to_string(), consent_id.clone(), diff));
            }
        }

        if rows.is_empty() {
            return Ok(None);
        }

        let history_id = next_history_id(db, consent_id).await?;

        let models: Vec<entities::history::ActiveModel> = rows
            .into_iter()
            .map(|(table_id, record_id, changed_values)| entities::history::ActiveModel {
                consent_id: Set(consent_id.clone()),
                history_id: Set(history_id),
                table_id: Set(table_id),
                record_id: Set(record_id),
                changed_values: Set(changed_values.to_string()),
                reason: Set(reason.to_string()),
                effective_timestamp: Set(effective_timestamp),
            })
            .collect();

        entities::history::Entity::insert_many(models).exec(db).await?;

        debug!(
            consent_id = %consent_id,
            history_id,
            "Stored amendment history rows"
        );
        Ok(Some(history_id))
    }
}

/// Next history id for a consent: a per-consent monotonic counter, never
/// global and never reused. Allocated inside the mutation's transaction.
pub async fn next_history_id<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
) -> Result<i64, ConsentError> {
    use entities::history::{Column, Entity};

    let max: Option<i64> = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .select_only()
        .column_as(Column::HistoryId.max(), "max_history_id")
        .into_tuple()
        .one(db)
        .await?
        .flatten();

    Ok(max.unwrap_or(0) + 1)
}

/// Reconstruct every prior version of a consent by replaying its history
/// rows in descending history-id order, applying each diff backward onto the
/// current aggregate. The entry for history id H is the aggregate as it was
/// immediately before amendment H.
pub async fn amendment_history<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
    current: &DetailedConsentResource,
) -> Result<Vec<ConsentHistoryResource>, ConsentError> {
    use entities::history::{Column, Entity};

    let rows = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .order_by_desc(Column::HistoryId)
        .all(db)
        .await?;

    let mut grouped: BTreeMap<i64, Vec<entities::history::Model>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.history_id).or_default().push(row);
    }

    let mut result = Vec::with_capacity(grouped.len());
    let mut working = current.clone();

    for (history_id, group) in grouped.into_iter().rev() {
        let effective_timestamp = group
            .first()
            .map(|r| r.effective_timestamp)
            .unwrap_or_default();
        let reason = group
            .first()
            .map(|r| r.reason.clone())
            .unwrap_or_default();

        for row in &group {
            apply_backward(&mut working, row)?;
        }

        result.push(ConsentHistoryResource {
            history_id,
            effective_timestamp,
            reason,
            consent: working.clone(),
        });
    }

    Ok(result)
}

fn apply_backward(
    consent: &mut DetailedConsentResource,
    row: &entities::history::Model,
) -> Result<(), ConsentError> {
    let changed: Value = serde_json::from_str(&row.changed_values)?;

    match row.table_id.as_str() {
        TABLE_CONSENT => {
            if let Value::Object(fields) = changed {
                if let Some(Value::String(receipt)) = fields.get("receipt") {
                    consent.receipt = receipt.clone();
                }
                if let Some(value) = fields.get("validity_period").and_then(Value::as_i64) {
                    consent.validity_period = value;
                }
                if let Some(value) = fields.get("updated_time").and_then(Value::as_i64) {
                    consent.updated_time = value;
                }
                if let Some(Value::String(status)) = fields.get("current_status") {
                    consent.current_status = status.clone();
                }
            }
        }
        TABLE_ATTRIBUTE => {
            if let Value::Object(fields) = changed {
                for (key, value) in fields {
                    match value {
                        // Null marks an attribute that did not exist before
                        Value::Null => {
                            consent.attributes.remove(&key);
                        }
                        Value::String(old) => {
                            consent.attributes.insert(key, old);
                        }
                        other => {
                            return Err(ConsentError::Other(format!(
                                "unexpected attribute history value: {}",
                                other
                            )));
                        }
                    }
                }
            }
        }
        TABLE_MAPPING => match changed {
            Value::Null => {
                consent.mappings.retain(|m| m.mapping_id != row.record_id);
            }
            Value::Object(fields) => {
                if let Some(mapping) = consent
                    .mappings
                    .iter_mut()
                    .find(|m| m.mapping_id == row.record_id)
                {
                    if let Some(Value::String(status)) = fields.get("mapping_status") {
                        mapping.mapping_status = status.clone();
                    }
                }
            }
            other => {
                return Err(ConsentError::Other(format!(
                    "unexpected mapping history value: {}",
                    other
                )));
            }
        },
        TABLE_AUTHORIZATION => match changed {
            Value::Null => {
                consent
                    .authorizations
                    .retain(|a| a.authorization_id != row.record_id);
            }
            Value::Object(fields) => {
                if let Some(authorization) = consent
                    .authorizations
                    .iter_mut()
                    .find(|a| a.authorization_id == row.record_id)
                {
                    if let Some(Value::String(status)) = fields.get("authorization_status") {
                        authorization.authorization_status = status.clone();
                    }
                    if let Some(user_id) = fields.get("user_id") {
                        authorization.user_id =
                            user_id.as_str().map(str::to_string);
                    }
                    if let Some(value) = fields.get("updated_time").and_then(Value::as_i64) {
                        authorization.updated_time = value;
                    }
                }
            }
            other => {
                return Err(ConsentError::Other(format!(
                    "unexpected authorization history value: {}",
                    other
                )));
            }
        },
        // File rows are an audit trail only; the detailed view carries no file
        TABLE_FILE => {}
        other => {
            return Err(ConsentError::Other(format!(
                "unknown history table id: {}",
                other
            )));
        }
    }

    Ok(())
}

// Diff builders. Each records the PREVIOUS value of every field that differs
// between the pre-mutation snapshot and the current aggregate; a JSON null
// marks a record present now that did not exist before.

fn changed_consent_data(
    current: &DetailedConsentResource,
    previous: &DetailedConsentResource,
) -> Map<String, Value> {
    let mut changed = Map::new();
    if current.receipt != previous.receipt {
        changed.insert("receipt".to_string(), Value::from(previous.receipt.clone()));
    }
    if current.validity_period != previous.validity_period {
        changed.insert(
            "validity_period".to_string(),
            Value::from(previous.validity_period),
        );
    }
    if current.updated_time != previous.updated_time {
        changed.insert(
            "updated_time".to_string(),
            Value::from(previous.updated_time),
        );
    }
    if current.current_status != previous.current_status {
        changed.insert(
            "current_status".to_string(),
            Value::from(previous.current_status.clone()),
        );
    }
    changed
}

fn changed_attributes(
    current: &HashMap<String, String>,
    previous: &HashMap<String, String>,
) -> Map<String, Value> {
    let mut changed = Map::new();
    for (key, old_value) in previous {
        if current.get(key) != Some(old_value) {
            changed.insert(key.clone(), Value::from(old_value.clone()));
        }
    }
    for key in current.keys() {
        if !previous.contains_key(key) {
            changed.insert(key.clone(), Value::Null);
        }
    }
    changed
}

fn changed_mappings(
    current: &[ConsentMappingResource],
    previous: &[ConsentMappingResource],
) -> Vec<(String, Value)> {
    let mut changed = Vec::new();
    for mapping in current {
        match previous.iter().find(|m| m.mapping_id == mapping.mapping_id) {
            Some(old) => {
                if old.mapping_status != mapping.mapping_status {
                    let mut fields = Map::new();
                    fields.insert(
                        "mapping_status".to_string(),
                        Value::from(old.mapping_status.clone()),
                    );
                    changed.push((mapping.mapping_id.clone(), Value::Object(fields)));
                }
            }
            None => changed.push((mapping.mapping_id.clone(), Value::Null)),
        }
    }
    changed
}

fn changed_authorizations(
    current: &[AuthorizationResource],
    previous: &[AuthorizationResource],
) -> Vec<(String, Value)> {
    let mut changed = Vec::new();
    for authorization in current {
        match previous
            .iter()
            .find(|a| a.authorization_id == authorization.authorization_id)
        {
            Some(old) => {
                let mut fields = Map::new();
                if old.authorization_status != authorization.authorization_status {
                    fields.insert(
                        "authorization_status".to_string(),
                        Value::from(old.authorization_status.clone()),
                    );
                }
                if old.user_id != authorization.user_id {
                    fields.insert(
                        "user_id".to_string(),
                        old.user_id.clone().map(Value::from).unwrap_or(Value::Null),
                    );
                }
                if old.updated_time != authorization.updated_time {
                    fields.insert(
                        "updated_time".to_string(),
                        Value::from(old.updated_time),
                    );
                }
                if !fields.is_empty() {
                    changed.push((
                        authorization.authorization_id.clone(),
                        Value::Object(fields),
                    ));
                }
            }
            None => changed.push((authorization.authorization_id.clone(), Value::Null)),
        }
    }
    changed
}

fn changed_file(change: FileChange<'_>) -> Option<Value> {
    match change.previous {
        None => Some(Value::Null),
        Some(old) if old != change.current => {
            let mut fields = Map::new();
            fields.insert("consent_file".to_string(), Value::from(old));
            Some(Value::Object(fields))
        }
        Some(_) => None,
    }
}
