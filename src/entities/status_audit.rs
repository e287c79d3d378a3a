use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "consent_status_audits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub status_audit_id: String,
    pub consent_id: String,
    pub current_status: String,
    pub action_time: i64,
    pub reason: Option<String>,
    pub action_by: Option<String>,
    pub previous_status: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
