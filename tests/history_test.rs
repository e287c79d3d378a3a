// Integration tests for amendment history capture and point-in-time
// reconstruction of consent aggregates.

mod helpers;

use covenant::entities;
use covenant::history::{TABLE_ATTRIBUTE, TABLE_CONSENT};
use covenant::publisher::PRIMARY_MEMBER_AUTHORIZATION_TYPE;
use covenant::settings::Settings;
use helpers::{test_service, ConsentBuilder, TestDb};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::collections::HashMap;

#[tokio::test]
async fn test_amendment_history_reconstructs_prior_versions() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1")
        .with_status("AUTHORISED")
        .with_attribute("sharing_duration", "3600")
        .with_authorization(PRIMARY_MEMBER_AUTHORIZATION_TYPE, Some("U1"))
        .with_account("acc-1")
        .create(test_db.connection())
        .await;

    // Snapshot immediately before the first amendment
    let before_amendment = service
        .get_detailed_consent(&consent.consent_id)
        .await
        .expect("Failed to load consent");

    service
        .amend_consent(
            &consent.consent_id,
            Some(r#"{"permissions":["ReadAccountsDetail"]}"#),
            Some(7200),
            &HashMap::from([("amended_by_flow".to_string(), "reauth".to_string())]),
        )
        .await
        .expect("Failed to amend consent");

    // Snapshot immediately before the second amendment
    let before_revocation = service
        .get_detailed_consent(&consent.consent_id)
        .await
        .expect("Failed to load consent");

    service
        .revoke_consent(&consent.consent_id, "REVOKED", Some("U1"), "user request")
        .await
        .expect("Failed to revoke consent");

    let versions = service
        .amendment_history(&consent.consent_id)
        .await
        .expect("Failed to load amendment history");

    assert_eq!(versions.len(), 2);

    // Newest first: the entry for each amendment is the aggregate exactly as
    // captured immediately before that amendment
    assert_eq!(versions[0].history_id, 2);
    assert_eq!(versions[0].reason, "user request");
    assert_eq!(versions[0].consent, before_revocation);

    assert_eq!(versions[1].history_id, 1);
    assert_eq!(versions[1].reason, "consent amendment");
    assert_eq!(versions[1].consent, before_amendment);
}

#[tokio::test]
async fn test_history_ids_are_strictly_increasing_per_consent() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1").create(test_db.connection()).await;
    let other = ConsentBuilder::new("client-2").create(test_db.connection()).await;

    let first = service
        .update_consent_status(&consent.consent_id, "AUTHORISED", None, "user approval")
        .await
        .expect("Failed to transition consent");
    service
        .store_attributes(
            &consent.consent_id,
            &HashMap::from([("k".to_string(), "v".to_string())]),
        )
        .await
        .expect("Failed to store attributes");
    let third = service
        .update_consent_status(&consent.consent_id, "REVOKED", None, "user request")
        .await
        .expect("Failed to revoke consent");

    assert_eq!(first.history_id, Some(1));
    assert_eq!(third.history_id, Some(3));

    // The counter is per consent, not global
    let other_first = service
        .update_consent_status(&other.consent_id, "AUTHORISED", None, "user approval")
        .await
        .expect("Failed to transition other consent");
    assert_eq!(other_first.history_id, Some(1));
}

#[tokio::test]
async fn test_history_disabled_leaves_no_trail() {
    let test_db = TestDb::new().await;
    let mut settings = Settings::default();
    settings.history.enabled = false;
    let (service, _sink) = test_service(&test_db, settings).await;

    let consent = ConsentBuilder::new("client-1").create(test_db.connection()).await;

    let transition = service
        .update_consent_status(&consent.consent_id, "AUTHORISED", None, "user approval")
        .await
        .expect("Failed to transition consent");
    assert_eq!(transition.history_id, None);

    let versions = service
        .amendment_history(&consent.consent_id)
        .await
        .expect("Failed to load amendment history");
    assert!(versions.is_empty());
}

#[tokio::test]
async fn test_history_rows_cover_exactly_the_changed_tables() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1")
        .with_attribute("sharing_duration", "3600")
        .create(test_db.connection())
        .await;

    // A status-only transition touches the consent table alone
    let transition = service
        .update_consent_status(&consent.consent_id, "AUTHORISED", None, "user approval")
        .await
        .expect("Failed to transition consent");

    let rows = entities::history::Entity::find()
        .filter(entities::history::Column::ConsentId.eq(consent.consent_id.clone()))
        .filter(entities::history::Column::HistoryId.eq(transition.history_id.unwrap()))
        .all(test_db.connection())
        .await
        .expect("Failed to load history rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].table_id, TABLE_CONSENT);

    // An attribute-only change touches the attribute table alone
    service
        .store_attributes(
            &consent.consent_id,
            &HashMap::from([("sharing_duration".to_string(), "7200".to_string())]),
        )
        .await
        .expect("Failed to store attributes");

    let rows = entities::history::Entity::find()
        .filter(entities::history::Column::ConsentId.eq(consent.consent_id.clone()))
        .filter(entities::history::Column::HistoryId.eq(2))
        .all(test_db.connection())
        .await
        .expect("Failed to load history rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].table_id, TABLE_ATTRIBUTE);
}

#[tokio::test]
async fn test_unchanged_mutation_allocates_no_history_id() {
    let test_db = TestDb::new().await;
    let (service, _sink) = test_service(&test_db, Settings::default()).await;

    let consent = ConsentBuilder::new("client-1")
        .with_attribute("sharing_duration", "3600")
        .create(test_db.connection())
        .await;

    // Re-storing an identical attribute value changes nothing
    service
        .store_attributes(
            &consent.consent_id,
            &HashMap::from([("sharing_duration".to_string(), "3600".to_string())]),
        )
        .await
        .expect("Failed to store attributes");

    let versions = service
        .amendment_history(&consent.consent_id)
        .await
        .expect("Failed to load amendment history");
    assert!(versions.is_empty());
}
