// Integration tests for the consent lifecycle: creation, status transitions,
// the audit trail, revocation and lifecycle event publication.

mod helpers;

use covenant::errors::ConsentError;
use covenant::publisher::{PRIMARY_MEMBER_AUTHORIZATION_TYPE, REQUEST_URI_KEY};
use covenant::search::ConsentSearchFilter;
use covenant::settings::Settings;
use covenant::storage::{self, AuditRecordFilter, NewConsent};
use helpers::{publishing_settings, test_service, ConsentBuilder, TestDb};
use std::collections::HashMap;

#[tokio::test]
async fn test_create_consent_writes_initial_audit_record() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = service
        .create_authorizable_consent(
            NewConsent {
                client_id: "client-1".to_string(),
                receipt: r#"{"permissions":["ReadAccountsBasic"]}"#.to_string(),
                consent_type: "accounts".to_string(),
                consent_frequency: 0,
                validity_period: 86400,
                recurring_indicator: 1,
                current_status: "CREATED".to_string(),
            },
            HashMap::from([("sharing_duration".to_string(), "86400".to_string())]),
            PRIMARY_MEMBER_AUTHORIZATION_TYPE,
            "created",
            Some("U1"),
        )
        .await
        .expect("Failed to create consent");

    assert_eq!(consent.client_id, "client-1");
    assert_eq!(consent.current_status, "CREATED");
    assert_eq!(consent.attributes["sharing_duration"], "86400");
    assert_eq!(consent.authorizations.len(), 1);
    assert_eq!(consent.authorizations[0].user_id.as_deref(), Some("U1"));

    let audits = service
        .audit_records(&consent.consent_id, &AuditRecordFilter::default())
        .await
        .expect("Failed to load audit records");
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].current_status, "CREATED");
    assert_eq!(audits[0].previous_status, None);
}

#[tokio::test]
async fn test_status_transition_appends_exactly_one_audit_record() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1")
        .with_authorization(PRIMARY_MEMBER_AUTHORIZATION_TYPE, Some("U1"))
        .create(test_db.connection())
        .await;

    let transition = service
        .update_consent_status(&consent.consent_id, "AUTHORISED", Some("U1"), "user approval")
        .await
        .expect("Failed to transition consent");

    assert_eq!(transition.previous_status, "CREATED");
    assert_eq!(transition.new_status, "AUTHORISED");

    // The status row reflects the most recent audit record
    let updated = service
        .get_consent(&consent.consent_id, false)
        .await
        .expect("Failed to reload consent");
    assert_eq!(updated.current_status, "AUTHORISED");

    let audits = service
        .audit_records(&consent.consent_id, &AuditRecordFilter::default())
        .await
        .expect("Failed to load audit records");
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].previous_status.as_deref(), Some("CREATED"));
    assert_eq!(audits[0].current_status, "AUTHORISED");
    assert_eq!(audits[0].action_by.as_deref(), Some("U1"));
}

#[tokio::test]
async fn test_terminal_transition_rejected_without_side_effects() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1")
        .with_status("AUTHORISED")
        .create(test_db.connection())
        .await;

    service
        .revoke_consent(&consent.consent_id, "REVOKED", Some("U1"), "user request")
        .await
        .expect("Failed to revoke consent");

    let audits_before = service
        .audit_records(&consent.consent_id, &AuditRecordFilter::default())
        .await
        .expect("Failed to load audit records");
    let history_before = service
        .amendment_history(&consent.consent_id)
        .await
        .expect("Failed to load history");

    // A consent may not be re-revoked or re-expired
    let err = service
        .update_consent_status(&consent.consent_id, "EXPIRED", None, "expiry attempt")
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::AlreadyTerminal(_, _)));

    let audits_after = service
        .audit_records(&consent.consent_id, &AuditRecordFilter::default())
        .await
        .expect("Failed to load audit records");
    let history_after = service
        .amendment_history(&consent.consent_id)
        .await
        .expect("Failed to load history");

    assert_eq!(audits_before.len(), audits_after.len());
    assert_eq!(history_before.len(), history_after.len());
}

#[tokio::test]
async fn test_revoke_deactivates_account_mappings() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1")
        .with_status("AUTHORISED")
        .with_authorization(PRIMARY_MEMBER_AUTHORIZATION_TYPE, Some("U1"))
        .with_account("acc-1")
        .with_account("acc-2")
        .create(test_db.connection())
        .await;

    let transition = service
        .revoke_consent(&consent.consent_id, "REVOKED", Some("U1"), "user request")
        .await
        .expect("Failed to revoke consent");

    assert_eq!(transition.consent_details.current_status, "REVOKED");
    assert_eq!(transition.consent_details.mappings.len(), 2);
    for mapping in &transition.consent_details.mappings {
        assert_eq!(mapping.mapping_status, storage::INACTIVE_MAPPING_STATUS);
    }
}

#[tokio::test]
async fn test_search_by_status_after_authorisation() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1")
        .with_authorization(PRIMARY_MEMBER_AUTHORIZATION_TYPE, Some("U1"))
        .create(test_db.connection())
        .await;

    service
        .update_consent_status(&consent.consent_id, "AUTHORISED", Some("U1"), "user approval")
        .await
        .expect("Failed to transition consent");

    let authorised = service
        .search(&ConsentSearchFilter {
            statuses: vec!["AUTHORISED".to_string()],
            ..Default::default()
        })
        .await
        .expect("Search failed");
    assert_eq!(authorised.len(), 1);
    assert_eq!(authorised[0].consent_id, consent.consent_id);

    let revoked = service
        .search(&ConsentSearchFilter {
            statuses: vec!["REVOKED".to_string()],
            ..Default::default()
        })
        .await
        .expect("Search failed");
    assert!(revoked.is_empty());
}

#[tokio::test]
async fn test_unknown_consent_is_not_found() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let err = service.get_consent("missing", false).await.unwrap_err();
    assert!(matches!(err, ConsentError::NotFound(_)));

    let err = service
        .update_consent_status("missing", "AUTHORISED", None, "approval")
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::NotFound(_)));
}

#[tokio::test]
async fn test_create_consent_validates_mandatory_fields() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let err = service
        .create_consent(
            NewConsent {
                client_id: String::new(),
                receipt: "{}".to_string(),
                consent_type: "accounts".to_string(),
                consent_frequency: 0,
                validity_period: 0,
                recurring_indicator: 0,
                current_status: "CREATED".to_string(),
            },
            HashMap::new(),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::Validation(_)));
}

#[tokio::test]
async fn test_store_and_delete_attributes() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1").create(test_db.connection()).await;

    service
        .store_attributes(
            &consent.consent_id,
            &HashMap::from([
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ]),
        )
        .await
        .expect("Failed to store attributes");

    let attributes = service
        .get_attributes(&consent.consent_id)
        .await
        .expect("Failed to load attributes");
    assert_eq!(attributes.len(), 2);
    assert_eq!(attributes["a"], "1");

    let deleted = service
        .delete_attributes(&consent.consent_id, &["a".to_string()])
        .await
        .expect("Failed to delete attributes");
    assert_eq!(deleted, 1);

    let attributes = service
        .get_attributes(&consent.consent_id)
        .await
        .expect("Failed to load attributes");
    assert_eq!(attributes.len(), 1);
    assert!(attributes.contains_key("b"));
}

#[tokio::test]
async fn test_consent_file_upload_transitions_status() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1")
        .with_status("awaitingUpload")
        .create(test_db.connection())
        .await;

    let transition = service
        .store_consent_file(&consent.consent_id, "<bulk-payment-file/>", "AUTHORISED", Some("U1"))
        .await
        .expect("Failed to store consent file");

    assert_eq!(transition.previous_status, "awaitingUpload");
    assert_eq!(transition.new_status, "AUTHORISED");

    let file = service
        .get_consent_file(&consent.consent_id)
        .await
        .expect("Failed to load consent file");
    assert_eq!(file.consent_file, "<bulk-payment-file/>");

    let audits = service
        .audit_records(&consent.consent_id, &AuditRecordFilter::default())
        .await
        .expect("Failed to load audit records");
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].current_status, "AUTHORISED");
}

#[tokio::test]
async fn test_lifecycle_events_deduplicated_per_correlation_key() {
    let test_db = TestDb::new().await;
    let (service, sink) = test_service(&test_db, publishing_settings()).await;

    let consent = ConsentBuilder::new("client-1")
        .with_attribute(REQUEST_URI_KEY, "uri-abc")
        .with_authorization(PRIMARY_MEMBER_AUTHORIZATION_TYPE, Some("U1"))
        .create(test_db.connection())
        .await;

    service
        .update_consent_status(&consent.consent_id, "AUTHORISED", Some("U1"), "user approval")
        .await
        .expect("Failed to transition consent");
    assert_eq!(sink.published().len(), 1);
    assert_eq!(sink.published()[0].current_status, "AUTHORISED");
    assert_eq!(sink.published()[0].previous_status, "CREATED");

    // A second transition landing on the same status produces the same
    // event identifier and is suppressed within the dedup window
    service
        .amend_detailed_consent(
            &consent.consent_id,
            Some(r#"{"permissions":["ReadAccountsDetail"]}"#),
            None,
            "AUTHORISED",
            &HashMap::new(),
            &HashMap::new(),
            Some("U1"),
            "consent amendment",
        )
        .await
        .expect("Failed to amend consent");
    assert_eq!(sink.published().len(), 1);

    // A different target status is a different logical event
    service
        .revoke_consent(&consent.consent_id, "REVOKED", Some("U1"), "user request")
        .await
        .expect("Failed to revoke consent");

    let events = sink.published();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].current_status, "REVOKED");
    assert_eq!(events[1].previous_status, "AUTHORISED");
}

#[tokio::test]
async fn test_publishing_disabled_emits_nothing() {
    let test_db = TestDb::new().await;
    let (service, sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1")
        .with_attribute(REQUEST_URI_KEY, "uri-abc")
        .with_authorization(PRIMARY_MEMBER_AUTHORIZATION_TYPE, Some("U1"))
        .create(test_db.connection())
        .await;

    service
        .update_consent_status(&consent.consent_id, "AUTHORISED", Some("U1"), "user approval")
        .await
        .expect("Failed to transition consent");

    assert!(sink.published().is_empty());
}
