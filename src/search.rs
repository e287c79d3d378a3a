use crate::entities;
use crate::errors::ConsentError;
use crate::storage::{self, DetailedConsentResource};
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

/// Multi-criteria consent filter. Multiple values within one criterion are
/// OR-combined; different criteria are AND-combined; empty criteria impose
/// no restriction.
#[derive(Debug, Clone, Default)]
pub struct ConsentSearchFilter {
    pub consent_ids: Vec<String>,
    pub client_ids: Vec<String>,
    pub consent_types: Vec<String>,
    pub statuses: Vec<String>,
    pub user_ids: Vec<String>,
    /// Inclusive bounds on created_time (epoch seconds).
    pub from_time: Option<i64>,
    pub to_time: Option<i64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ConsentSearchFilter {
    fn validate(&self) -> Result<(), ConsentError> {
        if let (Some(from), Some(to)) = (self.from_time, self.to_time) {
            if from > to {
                return Err(ConsentError::Search(format!(
                    "from_time {} is after to_time {}",
                    from, to
                )));
            }
        }
        Ok(())
    }
}

/// Run a dynamic consent search and assemble detailed views for the matching
/// page, ordered by updated_time descending. An empty result set is not an
/// error.
pub async fn search_consents<C: ConnectionTrait>(
    db: &C,
    filter: &ConsentSearchFilter,
) -> Result<Vec<DetailedConsentResource>, ConsentError> {
    use entities::consent::{Column, Entity};

    filter.validate()?;

    let mut condition = Condition::all();
    if !filter.consent_ids.is_empty() {
        condition = condition.add(Column::ConsentId.is_in(filter.consent_ids.iter().cloned()));
    }
    if !filter.client_ids.is_empty() {
        condition = condition.add(Column::ClientId.is_in(filter.client_ids.iter().cloned()));
    }
    if !filter.consent_types.is_empty() {
        condition = condition.add(Column::ConsentType.is_in(filter.consent_types.iter().cloned()));
    }
    if !filter.statuses.is_empty() {
        condition = condition.add(Column::CurrentStatus.is_in(filter.statuses.iter().cloned()));
    }
    if let Some(from_time) = filter.from_time {
        condition = condition.add(Column::CreatedTime.gte(from_time));
    }
    if let Some(to_time) = filter.to_time {
        condition = condition.add(Column::CreatedTime.lte(to_time));
    }

    // The user criterion lives on authorization rows: resolve it to a
    // consent-id restriction first
    if !filter.user_ids.is_empty() {
        let authorization_models = entities::authorization::Entity::find()
            .filter(
                entities::authorization::Column::UserId.is_in(filter.user_ids.iter().cloned()),
            )
            .all(db)
            .await?;
        if authorization_models.is_empty() {
            return Ok(Vec::new());
        }
        let consent_ids: Vec<String> = authorization_models
            .into_iter()
            .map(|a| a.consent_id)
            .collect();
        condition = condition.add(Column::ConsentId.is_in(consent_ids));
    }

    let mut query = Entity::find()
        .filter(condition)
        .order_by_desc(Column::UpdatedTime);
    if let Some(limit) = filter.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = filter.offset {
        query = query.offset(offset);
    }

    let models = query.all(db).await?;
    storage::load_detailed(db, models).await
}
