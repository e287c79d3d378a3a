use crate::entities;
use crate::errors::ConsentError;
use crate::service::ConsentService;
use crate::storage::{self, DetailedConsentResource};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

pub const EXPIRY_JOB_NAME: &str = "expired_consent_status_update";

/// Audit/history reason written when the expiry job retires a consent.
pub const REASON_CONSENT_EXPIRATION: &str = "consent expiration";

/// Initialize and start the job scheduler with the expiry enforcement job.
///
/// The job is non-concurrent: a trigger that fires while the previous run is
/// still executing is skipped, enforced by a lock held for the whole run.
pub async fn init_scheduler(service: Arc<ConsentService>) -> Result<JobScheduler, ConsentError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| ConsentError::Other(format!("Failed to create job scheduler: {}", e)))?;

    let schedule = service.settings().expiry.schedule.clone();
    let run_lock = Arc::new(Mutex::new(()));

    let expiry_job = Job::new_async(schedule.as_str(), move |_uuid, _l| {
        let service = service.clone();
        let run_lock = run_lock.clone();
        Box::pin(async move {
            let Ok(_guard) = run_lock.try_lock() else {
                warn!("Previous expiry run still executing, skipping this trigger");
                return;
            };

            debug!("Expired consent status update job is executing");
            let execution_id = start_job_execution(service.db(), EXPIRY_JOB_NAME).await.ok();

            match run_expiry_sweep(&service).await {
                Ok(count) => {
                    info!("Expiry sweep updated {} consents", count);
                    if let Some(id) = execution_id {
                        let _ = complete_job_execution(
                            service.db(),
                            id,
                            true,
                            None,
                            Some(count as i64),
                        )
                        .await;
                    }
                }
                Err(e) => {
                    error!("Expiry sweep failed: {}", e);
                    if let Some(id) = execution_id {
                        let _ = complete_job_execution(
                            service.db(),
                            id,
                            false,
                            Some(e.to_string()),
                            None,
                        )
                        .await;
                    }
                }
            }
        })
    })
    .map_err(|e| ConsentError::Other(format!("Failed to create expiry job: {}", e)))?;

    sched
        .add(expiry_job)
        .await
        .map_err(|e| ConsentError::Other(format!("Failed to add expiry job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| ConsentError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!("Job scheduler started with {} jobs", 1);

    Ok(sched)
}

/// One expiry pass: scan eligible consents, retire the ones whose expiry
/// attribute is due. Best-effort over the candidate set; per-consent failures
/// are logged and do not abort the batch, the next run re-evaluates them.
pub async fn run_expiry_sweep(service: &ConsentService) -> Result<u64, ConsentError> {
    let candidates = service.consents_eligible_for_expiration().await?;
    let expired_status = service.settings().expiry.expired_status.clone();
    let now = Utc::now().timestamp();

    let mut expired = 0u64;
    for consent in candidates {
        if !is_due(&consent, now) {
            continue;
        }
        match service
            .update_consent_status(
                &consent.consent_id,
                &expired_status,
                None,
                REASON_CONSENT_EXPIRATION,
            )
            .await
        {
            Ok(_) => {
                debug!(consent_id = %consent.consent_id, "Expired status updated");
                expired += 1;
            }
            Err(e) => {
                error!(
                    consent_id = %consent.consent_id,
                    "Failed to update expired status: {}",
                    e
                );
            }
        }
    }

    Ok(expired)
}

/// A consent is due when its expiry attribute holds a UTC epoch second at or
/// before now. A missing attribute means the consent is not a candidate.
fn is_due(consent: &DetailedConsentResource, now: i64) -> bool {
    let Some(raw) = consent.attributes.get(storage::EXPIRATION_TIME_ATTRIBUTE) else {
        return false;
    };
    match raw.parse::<i64>() {
        Ok(expiry) => {
            if now >= expiry {
                info!(
                    consent_id = %consent.consent_id,
                    expiry,
                    "Consent identified as expired"
                );
                true
            } else {
                false
            }
        }
        Err(_) => {
            warn!(
                consent_id = %consent.consent_id,
                "Unparsable expiry attribute value: {}",
                raw
            );
            false
        }
    }
}

/// Record the start of a job execution
pub async fn start_job_execution(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<i64, ConsentError> {
    use entities::job_execution;

    let now = Utc::now().timestamp();

    let execution = job_execution::ActiveModel {
        id: Set(0), // Will be auto-generated
        job_name: Set(job_name.to_string()),
        started_at: Set(now),
        completed_at: Set(None),
        success: Set(None),
        error_message: Set(None),
        consents_processed: Set(None),
    };

    let result = execution.insert(db).await?;
    Ok(result.id)
}

/// Record the completion of a job execution
pub async fn complete_job_execution(
    db: &DatabaseConnection,
    execution_id: i64,
    success: bool,
    error_message: Option<String>,
    consents_processed: Option<i64>,
) -> Result<(), ConsentError> {
    use entities::job_execution::{Column, Entity};

    let now = Utc::now().timestamp();

    if let Some(execution) = Entity::find()
        .filter(Column::Id.eq(execution_id))
        .one(db)
        .await?
    {
        let mut active: entities::job_execution::ActiveModel = execution.into_active_model();
        active.completed_at = Set(Some(now));
        active.success = Set(Some(if success { 1 } else { 0 }));
        active.error_message = Set(error_message);
        active.consents_processed = Set(consents_processed);
        active.update(db).await?;
    }

    Ok(())
}

/// Manually trigger a job by name (useful for admin surfaces)
pub async fn trigger_job_manually(
    service: &ConsentService,
    job_name: &str,
) -> Result<(), ConsentError> {
    info!("Manually triggering job: {}", job_name);
    let execution_id = start_job_execution(service.db(), job_name).await?;

    let result = match job_name {
        EXPIRY_JOB_NAME => run_expiry_sweep(service).await,
        _ => {
            return Err(ConsentError::Other(format!("Unknown job name: {}", job_name)));
        }
    };

    match result {
        Ok(count) => {
            info!(
                "Manually triggered job {} completed: {} records",
                job_name, count
            );
            complete_job_execution(service.db(), execution_id, true, None, Some(count as i64))
                .await?;
        }
        Err(e) => {
            error!("Manually triggered job {} failed: {}", job_name, e);
            complete_job_execution(service.db(), execution_id, false, Some(e.to_string()), None)
                .await?;
        }
    }

    Ok(())
}
