use covenant::storage::{
    self, AuthorizationResource, ConsentMappingResource, DetailedConsentResource, NewAuthorization,
    NewConsent, NewMapping,
};
use sea_orm::DatabaseConnection;
use std::collections::HashMap;

/// Builder for seeding test consents with nested resources
pub struct ConsentBuilder {
    consent: NewConsent,
    attributes: HashMap<String, String>,
    authorizations: Vec<(String, Option<String>, String)>,
    accounts: Vec<String>,
}

impl ConsentBuilder {
    pub fn new(client_id: &str) -> Self {
        Self {
            consent: NewConsent {
                client_id: client_id.to_string(),
                receipt: r#"{"permissions":["ReadAccountsBasic","ReadBalances"]}"#.to_string(),
                consent_type: "accounts".to_string(),
                consent_frequency: 0,
                validity_period: 86400,
                recurring_indicator: 1,
                current_status: "CREATED".to_string(),
            },
            attributes: HashMap::new(),
            authorizations: Vec::new(),
            accounts: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.consent.current_status = status.to_string();
        self
    }

    pub fn with_receipt(mut self, receipt: &str) -> Self {
        self.consent.receipt = receipt.to_string();
        self
    }

    pub fn with_consent_type(mut self, consent_type: &str) -> Self {
        self.consent.consent_type = consent_type.to_string();
        self
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_expiry(self, expiry_epoch_secs: i64) -> Self {
        self.with_attribute(
            storage::EXPIRATION_TIME_ATTRIBUTE,
            &expiry_epoch_secs.to_string(),
        )
    }

    /// Add an authorization resource of the given type for a user
    pub fn with_authorization(mut self, authorization_type: &str, user_id: Option<&str>) -> Self {
        self.authorizations.push((
            authorization_type.to_string(),
            user_id.map(str::to_string),
            "created".to_string(),
        ));
        self
    }

    /// Grant an active account mapping under the first authorization
    pub fn with_account(mut self, account_id: &str) -> Self {
        self.accounts.push(account_id.to_string());
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> DetailedConsentResource {
        let consent = storage::create_consent(db, self.consent)
            .await
            .expect("Failed to create test consent");

        storage::store_attributes(db, &consent.consent_id, &self.attributes)
            .await
            .expect("Failed to store test attributes");

        let mut first_authorization: Option<AuthorizationResource> = None;
        for (authorization_type, user_id, authorization_status) in self.authorizations {
            let authorization = storage::store_authorization(
                db,
                NewAuthorization {
                    consent_id: consent.consent_id.clone(),
                    authorization_type,
                    user_id,
                    authorization_status,
                },
            )
            .await
            .expect("Failed to store test authorization");
            first_authorization.get_or_insert(authorization);
        }

        if !self.accounts.is_empty() {
            let authorization = first_authorization
                .as_ref()
                .expect("Account mappings require an authorization");
            for account_id in self.accounts {
                let _: ConsentMappingResource = storage::store_mapping(
                    db,
                    NewMapping {
                        authorization_id: authorization.authorization_id.clone(),
                        account_id,
                        permission: "ReadAccountsBasic".to_string(),
                        mapping_status: storage::ACTIVE_MAPPING_STATUS.to_string(),
                    },
                )
                .await
                .expect("Failed to store test mapping");
            }
        }

        storage::get_detailed_consent(db, &consent.consent_id)
            .await
            .expect("Failed to load seeded consent")
    }
}
