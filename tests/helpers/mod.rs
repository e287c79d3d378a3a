#![allow(dead_code)]

pub mod builders;
pub mod db;
pub mod sink;

pub use builders::ConsentBuilder;
pub use db::TestDb;
pub use sink::RecordingSink;

use covenant::service::ConsentService;
use covenant::settings::Settings;
use std::sync::Arc;

/// Consent service over a test database, with a recording sink behind the
/// publisher for event assertions.
pub async fn test_service(
    test_db: &TestDb,
    settings: Settings,
) -> (Arc<ConsentService>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let service = Arc::new(ConsentService::new(
        test_db.connection().clone(),
        settings,
        sink.clone(),
    ));
    (service, sink)
}

/// Settings with lifecycle event publishing switched on.
pub fn publishing_settings() -> Settings {
    let mut settings = Settings::default();
    settings.publisher.enabled = true;
    settings
}
