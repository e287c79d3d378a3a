use crate::errors::ConsentError;
use crate::history::{self, AmendmentHistoryEncoder, ConsentHistoryResource, FileChange};
use crate::publisher::{EventSink, LifecycleEventPublisher};
use crate::search::{self, ConsentSearchFilter};
use crate::settings::Settings;
use crate::state_machine::StatusStateMachine;
use crate::storage::{
    self, AuditRecordFilter, AuthorizationResource, ConsentFile, ConsentMappingResource,
    ConsentResource, ConsentStatusAuditRecord, DetailedConsentResource, NewAuthorization,
    NewConsent, NewMapping,
};
use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const REASON_CONSENT_CREATION: &str = "consent creation";
const REASON_CONSENT_AMENDMENT: &str = "consent amendment";
const REASON_ATTRIBUTE_UPDATE: &str = "attribute update";
const REASON_AUTHORIZATION_UPDATE: &str = "authorization update";
const REASON_MAPPING_UPDATE: &str = "account mapping update";
const REASON_FILE_UPLOAD: &str = "consent file upload";

/// The outcome of a committed status transition.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub consent_id: String,
    pub previous_status: String,
    pub new_status: String,
    pub audit_record: ConsentStatusAuditRecord,
    pub history_id: Option<i64>,
    pub consent_details: DetailedConsentResource,
}

/// The consent core: aggregate store operations wrapped with status
/// validation, pre-image history capture and lifecycle event publication.
/// Owns its collaborators outright; hosts construct one and pass it around.
///
/// Every mutating operation runs inside a single transaction spanning all
/// tables it touches. The pre-mutation aggregate is read inside that
/// transaction before any row changes, and the history rows are written
/// before the commit, so a failure anywhere aborts the whole operation.
pub struct ConsentService {
    db: DatabaseConnection,
    state_machine: StatusStateMachine,
    encoder: AmendmentHistoryEncoder,
    publisher: LifecycleEventPublisher,
    settings: Settings,
}

impl ConsentService {
    pub fn new(db: DatabaseConnection, settings: Settings, sink: Arc<dyn EventSink>) -> Self {
        Self {
            state_machine: StatusStateMachine::new(&settings.statuses),
            encoder: AmendmentHistoryEncoder::new(&settings.history),
            publisher: LifecycleEventPublisher::new(&settings.publisher, sink),
            db,
            settings,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // Creation

    /// Create a consent with its initial attributes and an initial audit
    /// record carrying no previous status.
    pub async fn create_consent(
        &self,
        input: NewConsent,
        attributes: HashMap<String, String>,
        action_by: Option<&str>,
    ) -> Result<DetailedConsentResource, ConsentError> {
        let txn = self.db.begin().await?;

        let consent = storage::create_consent(&txn, input).await?;
        storage::store_attributes(&txn, &consent.consent_id, &attributes).await?;
        storage::store_audit_record(
            &txn,
            &consent.consent_id,
            &consent.current_status,
            None,
            action_by,
            Some(REASON_CONSENT_CREATION),
        )
        .await?;

        let detailed = storage::get_detailed_consent(&txn, &consent.consent_id).await?;
        txn.commit().await?;

        info!(consent_id = %detailed.consent_id, "Created consent");
        Ok(detailed)
    }

    /// Create a consent together with an initial authorization resource, the
    /// common shape for request flows where the authorising principal is
    /// known up front.
    pub async fn create_authorizable_consent(
        &self,
        input: NewConsent,
        attributes: HashMap<String, String>,
        authorization_type: &str,
        authorization_status: &str,
        user_id: Option<&str>,
    ) -> Result<DetailedConsentResource, ConsentError> {
        let txn = self.db.begin().await?;

        let consent = storage::create_consent(&txn, input).await?;
        storage::store_attributes(&txn, &consent.consent_id, &attributes).await?;
        storage::store_authorization(
            &txn,
            NewAuthorization {
                consent_id: consent.consent_id.clone(),
                authorization_type: authorization_type.to_string(),
                user_id: user_id.map(str::to_string),
                authorization_status: authorization_status.to_string(),
            },
        )
        .await?;
        storage::store_audit_record(
            &txn,
            &consent.consent_id,
            &consent.current_status,
            None,
            user_id,
            Some(REASON_CONSENT_CREATION),
        )
        .await?;

        let detailed = storage::get_detailed_consent(&txn, &consent.consent_id).await?;
        txn.commit().await?;

        info!(consent_id = %detailed.consent_id, "Created authorizable consent");
        Ok(detailed)
    }

    // Reads

    pub async fn get_consent(
        &self,
        consent_id: &str,
        with_attributes: bool,
    ) -> Result<ConsentResource, ConsentError> {
        storage::get_consent(&self.db, consent_id, with_attributes).await
    }

    pub async fn get_detailed_consent(
        &self,
        consent_id: &str,
    ) -> Result<DetailedConsentResource, ConsentError> {
        storage::get_detailed_consent(&self.db, consent_id).await
    }

    pub async fn get_consent_file(&self, consent_id: &str) -> Result<ConsentFile, ConsentError> {
        storage::get_consent_file(&self.db, consent_id).await
    }

    pub async fn get_attributes(
        &self,
        consent_id: &str,
    ) -> Result<HashMap<String, String>, ConsentError> {
        storage::get_attributes(&self.db, consent_id).await
    }

    pub async fn get_authorization(
        &self,
        authorization_id: &str,
    ) -> Result<AuthorizationResource, ConsentError> {
        storage::get_authorization(&self.db, authorization_id).await
    }

    pub async fn audit_records(
        &self,
        consent_id: &str,
        filter: &AuditRecordFilter,
    ) -> Result<Vec<ConsentStatusAuditRecord>, ConsentError> {
        storage::get_audit_records(&self.db, consent_id, filter).await
    }

    pub async fn search(
        &self,
        filter: &ConsentSearchFilter,
    ) -> Result<Vec<DetailedConsentResource>, ConsentError> {
        search::search_consents(&self.db, filter).await
    }

    // Status transitions

    /// Drive a status transition: validate against the state machine, update
    /// the status row, write exactly one audit record and the pre-image
    /// history rows, all in one transaction; then notify the publisher.
    /// A publish failure never affects the committed transition.
    pub async fn update_consent_status(
        &self,
        consent_id: &str,
        new_status: &str,
        action_by: Option<&str>,
        reason: &str,
    ) -> Result<StatusTransition, ConsentError> {
        let txn = self.db.begin().await?;

        let previous = storage::get_detailed_consent(&txn, consent_id).await?;
        self.state_machine
            .validate(consent_id, &previous.current_status, new_status)?;

        let updated = storage::update_consent_status(&txn, consent_id, new_status).await?;
        let audit_record = storage::store_audit_record(
            &txn,
            consent_id,
            new_status,
            Some(&previous.current_status),
            action_by,
            Some(reason),
        )
        .await?;

        let mut current = previous.clone();
        current.current_status = updated.current_status.clone();
        current.updated_time = updated.updated_time;

        let history_id = self
            .encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                reason,
                Utc::now().timestamp(),
            )
            .await?;

        txn.commit().await?;

        info!(
            consent_id = %consent_id,
            previous_status = %previous.current_status,
            new_status = %new_status,
            "Consent status updated"
        );
        self.publisher.notify(&current, &previous.current_status);

        Ok(StatusTransition {
            consent_id: consent_id.to_string(),
            previous_status: previous.current_status.clone(),
            new_status: new_status.to_string(),
            audit_record,
            history_id,
            consent_details: current,
        })
    }

    /// Revoke a consent: transition to the revoked status and deactivate all
    /// of its account mappings in the same transaction.
    pub async fn revoke_consent(
        &self,
        consent_id: &str,
        revoked_status: &str,
        action_by: Option<&str>,
        reason: &str,
    ) -> Result<StatusTransition, ConsentError> {
        let txn = self.db.begin().await?;

        let previous = storage::get_detailed_consent(&txn, consent_id).await?;
        self.state_machine
            .validate(consent_id, &previous.current_status, revoked_status)?;

        storage::update_consent_status(&txn, consent_id, revoked_status).await?;

        let mapping_ids: Vec<String> = previous
            .mappings
            .iter()
            .map(|m| m.mapping_id.clone())
            .collect();
        storage::update_mapping_status(&txn, &mapping_ids, storage::INACTIVE_MAPPING_STATUS)
            .await?;

        let audit_record = storage::store_audit_record(
            &txn,
            consent_id,
            revoked_status,
            Some(&previous.current_status),
            action_by,
            Some(reason),
        )
        .await?;

        let current = storage::get_detailed_consent(&txn, consent_id).await?;
        let history_id = self
            .encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                reason,
                Utc::now().timestamp(),
            )
            .await?;

        txn.commit().await?;

        info!(
            consent_id = %consent_id,
            previous_status = %previous.current_status,
            "Consent revoked"
        );
        self.publisher.notify(&current, &previous.current_status);

        Ok(StatusTransition {
            consent_id: consent_id.to_string(),
            previous_status: previous.current_status.clone(),
            new_status: revoked_status.to_string(),
            audit_record,
            history_id,
            consent_details: current,
        })
    }

    // Amendments

    /// Amend the consent's receipt and/or validity period and upsert
    /// attributes, without a status change. All changes share one history id.
    pub async fn amend_consent(
        &self,
        consent_id: &str,
        receipt: Option<&str>,
        validity_period: Option<i64>,
        attributes: &HashMap<String, String>,
    ) -> Result<DetailedConsentResource, ConsentError> {
        if receipt.is_none() && validity_period.is_none() && attributes.is_empty() {
            return Err(ConsentError::Validation(
                "amendment requires a receipt, validity period or attribute change".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let previous = storage::get_detailed_consent(&txn, consent_id).await?;

        if let Some(receipt) = receipt {
            storage::update_consent_receipt(&txn, consent_id, receipt).await?;
        }
        if let Some(validity_period) = validity_period {
            storage::update_consent_validity_period(&txn, consent_id, validity_period).await?;
        }
        storage::store_attributes(&txn, consent_id, attributes).await?;

        let current = storage::get_detailed_consent(&txn, consent_id).await?;
        self.encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                REASON_CONSENT_AMENDMENT,
                Utc::now().timestamp(),
            )
            .await?;

        txn.commit().await?;

        info!(consent_id = %consent_id, "Consent amended");
        Ok(current)
    }

    /// Amendment combined with a status transition and account-mapping
    /// status updates, the full re-authorisation shape. One transaction, one
    /// history id, one audit record, one lifecycle event.
    #[allow(clippy::too_many_arguments)]
    pub async fn amend_detailed_consent(
        &self,
        consent_id: &str,
        receipt: Option<&str>,
        validity_period: Option<i64>,
        new_status: &str,
        attributes: &HashMap<String, String>,
        mapping_statuses: &HashMap<String, String>,
        action_by: Option<&str>,
        reason: &str,
    ) -> Result<StatusTransition, ConsentError> {
        let txn = self.db.begin().await?;

        let previous = storage::get_detailed_consent(&txn, consent_id).await?;
        self.state_machine
            .validate(consent_id, &previous.current_status, new_status)?;

        if let Some(receipt) = receipt {
            storage::update_consent_receipt(&txn, consent_id, receipt).await?;
        }
        if let Some(validity_period) = validity_period {
            storage::update_consent_validity_period(&txn, consent_id, validity_period).await?;
        }
        storage::store_attributes(&txn, consent_id, attributes).await?;
        for (mapping_id, status) in mapping_statuses {
            storage::update_mapping_status(&txn, std::slice::from_ref(mapping_id), status).await?;
        }

        storage::update_consent_status(&txn, consent_id, new_status).await?;
        let audit_record = storage::store_audit_record(
            &txn,
            consent_id,
            new_status,
            Some(&previous.current_status),
            action_by,
            Some(reason),
        )
        .await?;

        let current = storage::get_detailed_consent(&txn, consent_id).await?;
        let history_id = self
            .encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                reason,
                Utc::now().timestamp(),
            )
            .await?;

        txn.commit().await?;

        info!(consent_id = %consent_id, new_status = %new_status, "Consent amended with status change");
        self.publisher.notify(&current, &previous.current_status);

        Ok(StatusTransition {
            consent_id: consent_id.to_string(),
            previous_status: previous.current_status.clone(),
            new_status: new_status.to_string(),
            audit_record,
            history_id,
            consent_details: current,
        })
    }

    // Nested resource mutations. Each captures the pre-image in the same
    // transaction as the change.

    pub async fn store_attributes(
        &self,
        consent_id: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<(), ConsentError> {
        if attributes.is_empty() {
            return Err(ConsentError::Validation(
                "at least one attribute is required".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let previous = storage::get_detailed_consent(&txn, consent_id).await?;
        storage::store_attributes(&txn, consent_id, attributes).await?;
        let current = storage::get_detailed_consent(&txn, consent_id).await?;
        self.encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                REASON_ATTRIBUTE_UPDATE,
                Utc::now().timestamp(),
            )
            .await?;
        txn.commit().await?;
        Ok(())
    }

    pub async fn delete_attributes(
        &self,
        consent_id: &str,
        keys: &[String],
    ) -> Result<u64, ConsentError> {
        let txn = self.db.begin().await?;
        let previous = storage::get_detailed_consent(&txn, consent_id).await?;
        let deleted = storage::delete_attributes(&txn, consent_id, keys).await?;
        let current = storage::get_detailed_consent(&txn, consent_id).await?;
        self.encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                REASON_ATTRIBUTE_UPDATE,
                Utc::now().timestamp(),
            )
            .await?;
        txn.commit().await?;
        Ok(deleted)
    }

    pub async fn store_authorization(
        &self,
        input: NewAuthorization,
    ) -> Result<AuthorizationResource, ConsentError> {
        let txn = self.db.begin().await?;
        let previous = storage::get_detailed_consent(&txn, &input.consent_id).await?;
        let authorization = storage::store_authorization(&txn, input).await?;
        let current = storage::get_detailed_consent(&txn, &previous.consent_id).await?;
        self.encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                REASON_AUTHORIZATION_UPDATE,
                Utc::now().timestamp(),
            )
            .await?;
        txn.commit().await?;
        Ok(authorization)
    }

    pub async fn update_authorization_status(
        &self,
        authorization_id: &str,
        new_status: &str,
    ) -> Result<AuthorizationResource, ConsentError> {
        let txn = self.db.begin().await?;
        let existing = storage::get_authorization(&txn, authorization_id).await?;
        let previous = storage::get_detailed_consent(&txn, &existing.consent_id).await?;
        let authorization =
            storage::update_authorization_status(&txn, authorization_id, new_status).await?;
        let current = storage::get_detailed_consent(&txn, &existing.consent_id).await?;
        self.encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                REASON_AUTHORIZATION_UPDATE,
                Utc::now().timestamp(),
            )
            .await?;
        txn.commit().await?;
        Ok(authorization)
    }

    pub async fn update_authorization_user(
        &self,
        authorization_id: &str,
        user_id: &str,
    ) -> Result<AuthorizationResource, ConsentError> {
        let txn = self.db.begin().await?;
        let existing = storage::get_authorization(&txn, authorization_id).await?;
        let previous = storage::get_detailed_consent(&txn, &existing.consent_id).await?;
        let authorization =
            storage::update_authorization_user(&txn, authorization_id, user_id).await?;
        let current = storage::get_detailed_consent(&txn, &existing.consent_id).await?;
        self.encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                REASON_AUTHORIZATION_UPDATE,
                Utc::now().timestamp(),
            )
            .await?;
        txn.commit().await?;
        Ok(authorization)
    }

    pub async fn store_mapping(
        &self,
        input: NewMapping,
    ) -> Result<ConsentMappingResource, ConsentError> {
        let txn = self.db.begin().await?;
        let existing = storage::get_authorization(&txn, &input.authorization_id).await?;
        let previous = storage::get_detailed_consent(&txn, &existing.consent_id).await?;
        let mapping = storage::store_mapping(&txn, input).await?;
        let current = storage::get_detailed_consent(&txn, &existing.consent_id).await?;
        self.encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                REASON_MAPPING_UPDATE,
                Utc::now().timestamp(),
            )
            .await?;
        txn.commit().await?;
        Ok(mapping)
    }

    pub async fn update_mapping_status(
        &self,
        consent_id: &str,
        mapping_ids: &[String],
        new_status: &str,
    ) -> Result<u64, ConsentError> {
        let txn = self.db.begin().await?;
        let previous = storage::get_detailed_consent(&txn, consent_id).await?;
        let updated = storage::update_mapping_status(&txn, mapping_ids, new_status).await?;
        let current = storage::get_detailed_consent(&txn, consent_id).await?;
        self.encoder
            .capture(
                &txn,
                &previous,
                &current,
                None,
                REASON_MAPPING_UPDATE,
                Utc::now().timestamp(),
            )
            .await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Store the consent file and transition the consent to the given
    /// status, the shape used by file-based authorisation flows.
    pub async fn store_consent_file(
        &self,
        consent_id: &str,
        content: &str,
        new_status: &str,
        action_by: Option<&str>,
    ) -> Result<StatusTransition, ConsentError> {
        let txn = self.db.begin().await?;

        let previous = storage::get_detailed_consent(&txn, consent_id).await?;
        self.state_machine
            .validate(consent_id, &previous.current_status, new_status)?;

        storage::store_consent_file(&txn, consent_id, content).await?;
        let updated = storage::update_consent_status(&txn, consent_id, new_status).await?;
        let audit_record = storage::store_audit_record(
            &txn,
            consent_id,
            new_status,
            Some(&previous.current_status),
            action_by,
            Some(REASON_FILE_UPLOAD),
        )
        .await?;

        let mut current = previous.clone();
        current.current_status = updated.current_status.clone();
        current.updated_time = updated.updated_time;

        let history_id = self
            .encoder
            .capture(
                &txn,
                &previous,
                &current,
                Some(FileChange {
                    previous: None,
                    current: content,
                }),
                REASON_FILE_UPLOAD,
                Utc::now().timestamp(),
            )
            .await?;

        txn.commit().await?;

        info!(consent_id = %consent_id, "Consent file stored");
        self.publisher.notify(&current, &previous.current_status);

        Ok(StatusTransition {
            consent_id: consent_id.to_string(),
            previous_status: previous.current_status.clone(),
            new_status: new_status.to_string(),
            audit_record,
            history_id,
            consent_details: current,
        })
    }

    // History and expiry support

    /// All reconstructed prior versions of a consent, newest first.
    pub async fn amendment_history(
        &self,
        consent_id: &str,
    ) -> Result<Vec<ConsentHistoryResource>, ConsentError> {
        let current = storage::get_detailed_consent(&self.db, consent_id).await?;
        history::amendment_history(&self.db, consent_id, &current).await
    }

    /// Store an externally captured pre-mutation snapshot against the current
    /// aggregate, for collaborators that mutate state through their own flows
    /// and hand the pre-image in afterwards.
    pub async fn store_amendment_history(
        &self,
        consent_id: &str,
        snapshot: &DetailedConsentResource,
        reason: &str,
        effective_timestamp: i64,
    ) -> Result<Option<i64>, ConsentError> {
        let txn = self.db.begin().await?;
        let current = storage::get_detailed_consent(&txn, consent_id).await?;
        let history_id = self
            .encoder
            .capture(&txn, snapshot, &current, None, reason, effective_timestamp)
            .await?;
        txn.commit().await?;
        Ok(history_id)
    }

    /// Candidate scan for the expiry job: consents in an expiry-eligible
    /// status that carry an expiry-time attribute.
    pub async fn consents_eligible_for_expiration(
        &self,
    ) -> Result<Vec<DetailedConsentResource>, ConsentError> {
        debug!("Retrieving consents eligible for expiration");
        storage::expiring_consents(&self.db, &self.settings.expiry.eligible_statuses).await
    }
}
