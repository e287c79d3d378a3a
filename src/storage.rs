use crate::entities;
use crate::errors::ConsentError;
use crate::settings::Database as DbCfg;
use base64ct::Encoding;
use chrono::Utc;
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute key holding the UTC epoch-second expiry of a consent.
pub const EXPIRATION_TIME_ATTRIBUTE: &str = "ExpirationDateTime";

/// Mapping status written when account mappings are deactivated on revocation.
pub const INACTIVE_MAPPING_STATUS: &str = "inactive";
pub const ACTIVE_MAPPING_STATUS: &str = "active";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentResource {
    pub consent_id: String,
    pub client_id: String,
    pub receipt: String,
    pub consent_type: String,
    pub consent_frequency: i64,
    pub validity_period: i64,
    pub recurring_indicator: i64,
    pub current_status: String,
    pub created_time: i64,
    pub updated_time: i64,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConsent {
    pub client_id: String,
    pub receipt: String,
    pub consent_type: String,
    pub consent_frequency: i64,
    pub validity_period: i64,
    pub recurring_indicator: i64,
    pub current_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResource {
    pub authorization_id: String,
    pub consent_id: String,
    pub authorization_type: String,
    pub user_id: Option<String>,
    pub authorization_status: String,
    pub updated_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuthorization {
    pub consent_id: String,
    pub authorization_type: String,
    pub user_id: Option<String>,
    pub authorization_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentMappingResource {
    pub mapping_id: String,
    pub authorization_id: String,
    pub account_id: String,
    pub permission: String,
    pub mapping_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMapping {
    pub authorization_id: String,
    pub account_id: String,
    pub permission: String,
    pub mapping_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentStatusAuditRecord {
    pub status_audit_id: String,
    pub consent_id: String,
    pub current_status: String,
    pub action_time: i64,
    pub reason: Option<String>,
    pub action_by: Option<String>,
    pub previous_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentFile {
    pub consent_id: String,
    pub consent_file: String,
}

/// Read-only composite view over a consent and its nested rows. This is the
/// unit handed to the history encoder and the event publisher; it is never
/// itself a store of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedConsentResource {
    pub consent_id: String,
    pub client_id: String,
    pub receipt: String,
    pub consent_type: String,
    pub consent_frequency: i64,
    pub validity_period: i64,
    pub recurring_indicator: i64,
    pub current_status: String,
    pub created_time: i64,
    pub updated_time: i64,
    pub attributes: HashMap<String, String>,
    pub authorizations: Vec<AuthorizationResource>,
    pub mappings: Vec<ConsentMappingResource>,
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, ConsentError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

pub(crate) fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

fn consent_from_model(model: entities::consent::Model) -> ConsentResource {
    ConsentResource {
        consent_id: model.consent_id,
        client_id: model.client_id,
        receipt: model.receipt,
        consent_type: model.consent_type,
        consent_frequency: model.consent_frequency,
        validity_period: model.validity_period,
        recurring_indicator: model.recurring_indicator,
        current_status: model.current_status,
        created_time: model.created_time,
        updated_time: model.updated_time,
        attributes: HashMap::new(),
    }
}

fn authorization_from_model(model: entities::authorization::Model) -> AuthorizationResource {
    AuthorizationResource {
        authorization_id: model.authorization_id,
        consent_id: model.consent_id,
        authorization_type: model.authorization_type,
        user_id: model.user_id,
        authorization_status: model.authorization_status,
        updated_time: model.updated_time,
    }
}

fn mapping_from_model(model: entities::mapping::Model) -> ConsentMappingResource {
    ConsentMappingResource {
        mapping_id: model.mapping_id,
        authorization_id: model.authorization_id,
        account_id: model.account_id,
        permission: model.permission,
        mapping_status: model.mapping_status,
    }
}

fn audit_from_model(model: entities::status_audit::Model) -> ConsentStatusAuditRecord {
    ConsentStatusAuditRecord {
        status_audit_id: model.status_audit_id,
        consent_id: model.consent_id,
        current_status: model.current_status,
        action_time: model.action_time,
        reason: model.reason,
        action_by: model.action_by,
        previous_status: model.previous_status,
    }
}

// Consent functions

pub async fn create_consent<C: ConnectionTrait>(
    db: &C,
    input: NewConsent,
) -> Result<ConsentResource, ConsentError> {
    if input.client_id.is_empty()
        || input.receipt.is_empty()
        || input.consent_type.is_empty()
        || input.current_status.is_empty()
    {
        return Err(ConsentError::Validation(
            "client_id, receipt, consent_type and current_status are mandatory".to_string(),
        ));
    }

    let consent_id = random_id();
    let now = Utc::now().timestamp();

    let consent = entities::consent::ActiveModel {
        consent_id: Set(consent_id.clone()),
        client_id: Set(input.client_id.clone()),
        receipt: Set(input.receipt.clone()),
        consent_type: Set(input.consent_type.clone()),
        consent_frequency: Set(input.consent_frequency),
        validity_period: Set(input.validity_period),
        recurring_indicator: Set(input.recurring_indicator),
        current_status: Set(input.current_status.clone()),
        created_time: Set(now),
        updated_time: Set(now),
    };

    consent.insert(db).await?;

    Ok(ConsentResource {
        consent_id,
        client_id: input.client_id,
        receipt: input.receipt,
        consent_type: input.consent_type,
        consent_frequency: input.consent_frequency,
        validity_period: input.validity_period,
        recurring_indicator: input.recurring_indicator,
        current_status: input.current_status,
        created_time: now,
        updated_time: now,
        attributes: HashMap::new(),
    })
}

pub async fn get_consent<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
    with_attributes: bool,
) -> Result<ConsentResource, ConsentError> {
    use entities::consent::{Column, Entity};

    let model = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .one(db)
        .await?
        .ok_or_else(|| ConsentError::NotFound(format!("consent {}", consent_id)))?;

    let mut consent = consent_from_model(model);
    if with_attributes {
        consent.attributes = get_attributes(db, consent_id).await?;
    }
    Ok(consent)
}

pub async fn update_consent_status<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
    new_status: &str,
) -> Result<ConsentResource, ConsentError> {
    use entities::consent::{Column, Entity};

    let model = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .one(db)
        .await?
        .ok_or_else(|| ConsentError::NotFound(format!("consent {}", consent_id)))?;

    let mut active: entities::consent::ActiveModel = model.into();
    active.current_status = Set(new_status.to_string());
    active.updated_time = Set(Utc::now().timestamp());
    let updated = active.update(db).await?;

    Ok(consent_from_model(updated))
}

pub async fn update_consent_receipt<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
    receipt: &str,
) -> Result<ConsentResource, ConsentError> {
    use entities::consent::{Column, Entity};

    let model = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .one(db)
        .await?
        .ok_or_else(|| ConsentError::NotFound(format!("consent {}", consent_id)))?;

    let mut active: entities::consent::ActiveModel = model.into();
    active.receipt = Set(receipt.to_string());
    active.updated_time = Set(Utc::now().timestamp());
    let updated = active.update(db).await?;

    Ok(consent_from_model(updated))
}

pub async fn update_consent_validity_period<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
    validity_period: i64,
) -> Result<ConsentResource, ConsentError> {
    use entities::consent::{Column, Entity};

    let model = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .one(db)
        .await?
        .ok_or_else(|| ConsentError::NotFound(format!("consent {}", consent_id)))?;

    let mut active: entities::consent::ActiveModel = model.into();
    active.validity_period = Set(validity_period);
    active.updated_time = Set(Utc::now().timestamp());
    let updated = active.update(db).await?;

    Ok(consent_from_model(updated))
}

// Authorization resource functions

pub async fn store_authorization<C: ConnectionTrait>(
    db: &C,
    input: NewAuthorization,
) -> Result<AuthorizationResource, ConsentError> {
    if input.consent_id.is_empty()
        || input.authorization_type.is_empty()
        || input.authorization_status.is_empty()
    {
        return Err(ConsentError::Validation(
            "consent_id, authorization_type and authorization_status are mandatory".to_string(),
        ));
    }

    let authorization_id = random_id();
    let now = Utc::now().timestamp();

    let authorization = entities::authorization::ActiveModel {
        authorization_id: Set(authorization_id.clone()),
        consent_id: Set(input.consent_id.clone()),
        authorization_type: Set(input.authorization_type.clone()),
        user_id: Set(input.user_id.clone()),
        authorization_status: Set(input.authorization_status.clone()),
        updated_time: Set(now),
    };

    authorization.insert(db).await?;

    Ok(AuthorizationResource {
        authorization_id,
        consent_id: input.consent_id,
        authorization_type: input.authorization_type,
        user_id: input.user_id,
        authorization_status: input.authorization_status,
        updated_time: now,
    })
}

pub async fn get_authorization<C: ConnectionTrait>(
    db: &C,
    authorization_id: &str,
) -> Result<AuthorizationResource, ConsentError> {
    use entities::authorization::{Column, Entity};

    let model = Entity::find()
        .filter(Column::AuthorizationId.eq(authorization_id))
        .one(db)
        .await?
        .ok_or_else(|| ConsentError::NotFound(format!("authorization {}", authorization_id)))?;

    Ok(authorization_from_model(model))
}

pub async fn get_authorizations_for_consent<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
) -> Result<Vec<AuthorizationResource>, ConsentError> {
    use entities::authorization::{Column, Entity};

    let models = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .order_by_asc(Column::UpdatedTime)
        .all(db)
        .await?;

    Ok(models.into_iter().map(authorization_from_model).collect())
}

pub async fn get_authorizations_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
) -> Result<Vec<AuthorizationResource>, ConsentError> {
    use entities::authorization::{Column, Entity};

    let models = Entity::find()
        .filter(Column::UserId.eq(user_id))
        .all(db)
        .await?;

    Ok(models.into_iter().map(authorization_from_model).collect())
}

pub async fn update_authorization_status<C: ConnectionTrait>(
    db: &C,
    authorization_id: &str,
    new_status: &str,
) -> Result<AuthorizationResource, ConsentError> {
    use entities::authorization::{Column, Entity};

    let model = Entity::find()
        .filter(Column::AuthorizationId.eq(authorization_id))
        .one(db)
        .await?
        .ok_or_else(|| ConsentError::NotFound(format!("authorization {}", authorization_id)))?;

    let mut active: entities::authorization::ActiveModel = model.into();
    active.authorization_status = Set(new_status.to_string());
    active.updated_time = Set(Utc::now().timestamp());
    let updated = active.update(db).await?;

    Ok(authorization_from_model(updated))
}

pub async fn update_authorization_user<C: ConnectionTrait>(
    db: &C,
    authorization_id: &str,
    user_id: &str,
) -> Result<AuthorizationResource, ConsentError> {
    use entities::authorization::{Column, Entity};

    let model = Entity::find()
        .filter(Column::AuthorizationId.eq(authorization_id))
        .one(db)
        .await?
        .ok_or_else(|| ConsentError::NotFound(format!("authorization {}", authorization_id)))?;

    let mut active: entities::authorization::ActiveModel = model.into();
    active.user_id = Set(Some(user_id.to_string()));
    active.updated_time = Set(Utc::now().timestamp());
    let updated = active.update(db).await?;

    Ok(authorization_from_model(updated))
}

// Account permission mapping functions

pub async fn store_mapping<C: ConnectionTrait>(
    db: &C,
    input: NewMapping,
) -> Result<ConsentMappingResource, ConsentError> {
    if input.authorization_id.is_empty() || input.account_id.is_empty() {
        return Err(ConsentError::Validation(
            "authorization_id and account_id are mandatory".to_string(),
        ));
    }

    let mapping_id = random_id();

    let mapping = entities::mapping::ActiveModel {
        mapping_id: Set(mapping_id.clone()),
        authorization_id: Set(input.authorization_id.clone()),
        account_id: Set(input.account_id.clone()),
        permission: Set(input.permission.clone()),
        mapping_status: Set(input.mapping_status.clone()),
    };

    mapping.insert(db).await?;

    Ok(ConsentMappingResource {
        mapping_id,
        authorization_id: input.authorization_id,
        account_id: input.account_id,
        permission: input.permission,
        mapping_status: input.mapping_status,
    })
}

pub async fn get_mappings_for_authorizations<C: ConnectionTrait>(
    db: &C,
    authorization_ids: &[String],
) -> Result<Vec<ConsentMappingResource>, ConsentError> {
    use entities::mapping::{Column, Entity};

    if authorization_ids.is_empty() {
        return Ok(Vec::new());
    }

    let models = Entity::find()
        .filter(Column::AuthorizationId.is_in(authorization_ids.iter().cloned()))
        .order_by_asc(Column::MappingId)
        .all(db)
        .await?;

    Ok(models.into_iter().map(mapping_from_model).collect())
}

pub async fn update_mapping_status<C: ConnectionTrait>(
    db: &C,
    mapping_ids: &[String],
    new_status: &str,
) -> Result<u64, ConsentError> {
    use entities::mapping::{Column, Entity};
    use sea_orm::sea_query::Expr;

    if mapping_ids.is_empty() {
        return Ok(0);
    }

    let result = Entity::update_many()
        .col_expr(Column::MappingStatus, Expr::value(new_status))
        .filter(Column::MappingId.is_in(mapping_ids.iter().cloned()))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

// Consent attribute functions

pub async fn store_attributes<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
    attributes: &HashMap<String, String>,
) -> Result<(), ConsentError> {
    use entities::attribute::{Column, Entity};
    use sea_orm::sea_query::OnConflict;

    if attributes.is_empty() {
        return Ok(());
    }

    let rows: Vec<entities::attribute::ActiveModel> = attributes
        .iter()
        .map(|(key, value)| entities::attribute::ActiveModel {
            consent_id: Set(consent_id.to_string()),
            att_key: Set(key.clone()),
            att_value: Set(value.clone()),
        })
        .collect();

    Entity::insert_many(rows)
        .on_conflict(
            OnConflict::columns([Column::ConsentId, Column::AttKey])
                .update_column(Column::AttValue)
                .to_owned(),
        )
        .exec(db)
        .await?;

    Ok(())
}

pub async fn get_attributes<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
) -> Result<HashMap<String, String>, ConsentError> {
    use entities::attribute::{Column, Entity};

    let models = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .all(db)
        .await?;

    Ok(models
        .into_iter()
        .map(|model| (model.att_key, model.att_value))
        .collect())
}

/// Map of consent_id -> attribute value, for every consent carrying the key.
pub async fn get_attributes_by_name<C: ConnectionTrait>(
    db: &C,
    att_key: &str,
) -> Result<HashMap<String, String>, ConsentError> {
    use entities::attribute::{Column, Entity};

    let models = Entity::find()
        .filter(Column::AttKey.eq(att_key))
        .all(db)
        .await?;

    Ok(models
        .into_iter()
        .map(|model| (model.consent_id, model.att_value))
        .collect())
}

pub async fn get_consent_ids_by_attribute<C: ConnectionTrait>(
    db: &C,
    att_key: &str,
    att_value: &str,
) -> Result<Vec<String>, ConsentError> {
    use entities::attribute::{Column, Entity};

    let models = Entity::find()
        .filter(Column::AttKey.eq(att_key))
        .filter(Column::AttValue.eq(att_value))
        .all(db)
        .await?;

    Ok(models.into_iter().map(|model| model.consent_id).collect())
}

pub async fn delete_attributes<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
    keys: &[String],
) -> Result<u64, ConsentError> {
    use entities::attribute::{Column, Entity};

    if keys.is_empty() {
        return Ok(0);
    }

    let result = Entity::delete_many()
        .filter(Column::ConsentId.eq(consent_id))
        .filter(Column::AttKey.is_in(keys.iter().cloned()))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

// Consent file functions

pub async fn store_consent_file<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
    content: &str,
) -> Result<(), ConsentError> {
    if content.is_empty() {
        return Err(ConsentError::Validation(
            "consent file content is mandatory".to_string(),
        ));
    }

    let file = entities::consent_file::ActiveModel {
        consent_id: Set(consent_id.to_string()),
        consent_file: Set(content.to_string()),
    };

    file.insert(db).await?;

    Ok(())
}

pub async fn get_consent_file<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
) -> Result<ConsentFile, ConsentError> {
    use entities::consent_file::{Column, Entity};

    let model = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .one(db)
        .await?
        .ok_or_else(|| ConsentError::NotFound(format!("consent file for {}", consent_id)))?;

    Ok(ConsentFile {
        consent_id: model.consent_id,
        consent_file: model.consent_file,
    })
}

// Status audit functions

pub async fn store_audit_record<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
    current_status: &str,
    previous_status: Option<&str>,
    action_by: Option<&str>,
    reason: Option<&str>,
) -> Result<ConsentStatusAuditRecord, ConsentError> {
    let status_audit_id = random_id();
    let now = Utc::now().timestamp();

    let record = entities::status_audit::ActiveModel {
        status_audit_id: Set(status_audit_id.clone()),
        consent_id: Set(consent_id.to_string()),
        current_status: Set(current_status.to_string()),
        action_time: Set(now),
        reason: Set(reason.map(str::to_string)),
        action_by: Set(action_by.map(str::to_string)),
        previous_status: Set(previous_status.map(str::to_string)),
    };

    record.insert(db).await?;

    Ok(ConsentStatusAuditRecord {
        status_audit_id,
        consent_id: consent_id.to_string(),
        current_status: current_status.to_string(),
        action_time: now,
        reason: reason.map(str::to_string),
        action_by: action_by.map(str::to_string),
        previous_status: previous_status.map(str::to_string),
    })
}

#[derive(Debug, Clone, Default)]
pub struct AuditRecordFilter {
    pub status: Option<String>,
    pub action_by: Option<String>,
    pub from_time: Option<i64>,
    pub to_time: Option<i64>,
    pub status_audit_id: Option<String>,
}

pub async fn get_audit_records<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
    filter: &AuditRecordFilter,
) -> Result<Vec<ConsentStatusAuditRecord>, ConsentError> {
    use entities::status_audit::{Column, Entity};

    let mut query = Entity::find().filter(Column::ConsentId.eq(consent_id));
    if let Some(status) = &filter.status {
        query = query.filter(Column::CurrentStatus.eq(status));
    }
    if let Some(action_by) = &filter.action_by {
        query = query.filter(Column::ActionBy.eq(action_by));
    }
    if let Some(from_time) = filter.from_time {
        query = query.filter(Column::ActionTime.gte(from_time));
    }
    if let Some(to_time) = filter.to_time {
        query = query.filter(Column::ActionTime.lte(to_time));
    }
    if let Some(status_audit_id) = &filter.status_audit_id {
        query = query.filter(Column::StatusAuditId.eq(status_audit_id));
    }

    let models = query.order_by_asc(Column::ActionTime).all(db).await?;

    Ok(models.into_iter().map(audit_from_model).collect())
}

// Composite reads

pub async fn get_detailed_consent<C: ConnectionTrait>(
    db: &C,
    consent_id: &str,
) -> Result<DetailedConsentResource, ConsentError> {
    use entities::consent::{Column, Entity};

    let model = Entity::find()
        .filter(Column::ConsentId.eq(consent_id))
        .one(db)
        .await?
        .ok_or_else(|| ConsentError::NotFound(format!("consent {}", consent_id)))?;

    let mut detailed = load_detailed(db, vec![model]).await?;
    Ok(detailed.remove(0))
}

/// Assemble detailed views for a batch of consent rows with three grouped
/// queries rather than one round-trip per consent.
pub async fn load_detailed<C: ConnectionTrait>(
    db: &C,
    consents: Vec<entities::consent::Model>,
) -> Result<Vec<DetailedConsentResource>, ConsentError> {
    if consents.is_empty() {
        return Ok(Vec::new());
    }

    let consent_ids: Vec<String> = consents.iter().map(|c| c.consent_id.clone()).collect();

    let authorization_models = entities::authorization::Entity::find()
        .filter(entities::authorization::Column::ConsentId.is_in(consent_ids.iter().cloned()))
        .order_by_asc(entities::authorization::Column::UpdatedTime)
        .all(db)
        .await?;

    let authorization_ids: Vec<String> = authorization_models
        .iter()
        .map(|a| a.authorization_id.clone())
        .collect();

    let mapping_models = if authorization_ids.is_empty() {
        Vec::new()
    } else {
        entities::mapping::Entity::find()
            .filter(entities::mapping::Column::AuthorizationId.is_in(authorization_ids))
            .order_by_asc(entities::mapping::Column::MappingId)
            .all(db)
            .await?
    };

    let attribute_models = entities::attribute::Entity::find()
        .filter(entities::attribute::Column::ConsentId.is_in(consent_ids))
        .all(db)
        .await?;

    // Group mappings under their authorization's consent
    let mut consent_by_authorization: HashMap<String, String> = HashMap::new();
    for authorization in &authorization_models {
        consent_by_authorization.insert(
            authorization.authorization_id.clone(),
            authorization.consent_id.clone(),
        );
    }

    let mut authorizations_by_consent: HashMap<String, Vec<AuthorizationResource>> = HashMap::new();
    for model in authorization_models {
        authorizations_by_consent
            .entry(model.consent_id.clone())
            .or_default()
            .push(authorization_from_model(model));
    }

    let mut mappings_by_consent: HashMap<String, Vec<ConsentMappingResource>> = HashMap::new();
    for model in mapping_models {
        if let Some(consent_id) = consent_by_authorization.get(&model.authorization_id) {
            mappings_by_consent
                .entry(consent_id.clone())
                .or_default()
                .push(mapping_from_model(model));
        }
    }

    let mut attributes_by_consent: HashMap<String, HashMap<String, String>> = HashMap::new();
    for model in attribute_models {
        attributes_by_consent
            .entry(model.consent_id)
            .or_default()
            .insert(model.att_key, model.att_value);
    }

    Ok(consents
        .into_iter()
        .map(|model| {
            let consent_id = model.consent_id.clone();
            DetailedConsentResource {
                consent_id: model.consent_id,
                client_id: model.client_id,
                receipt: model.receipt,
                consent_type: model.consent_type,
                consent_frequency: model.consent_frequency,
                validity_period: model.validity_period,
                recurring_indicator: model.recurring_indicator,
                current_status: model.current_status,
                created_time: model.created_time,
                updated_time: model.updated_time,
                attributes: attributes_by_consent.remove(&consent_id).unwrap_or_default(),
                authorizations: authorizations_by_consent
                    .remove(&consent_id)
                    .unwrap_or_default(),
                mappings: mappings_by_consent.remove(&consent_id).unwrap_or_default(),
            }
        })
        .collect())
}

/// Consents carrying an expiry-time attribute whose status is in the
/// expiry-eligible set. Candidate scan for the expiry enforcement job.
pub async fn expiring_consents<C: ConnectionTrait>(
    db: &C,
    eligible_statuses: &[String],
) -> Result<Vec<DetailedConsentResource>, ConsentError> {
    use entities::consent::{Column, Entity};

    let with_expiry = get_attributes_by_name(db, EXPIRATION_TIME_ATTRIBUTE).await?;
    if with_expiry.is_empty() {
        return Ok(Vec::new());
    }

    let consent_ids: Vec<String> = with_expiry.into_keys().collect();
    let models = Entity::find()
        .filter(Column::ConsentId.is_in(consent_ids))
        .filter(Column::CurrentStatus.is_in(eligible_statuses.iter().cloned()))
        .all(db)
        .await?;

    load_detailed(db, models).await
}
