use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "consent_authorizations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub authorization_id: String,
    pub consent_id: String,
    pub authorization_type: String,
    pub user_id: Option<String>,
    pub authorization_status: String,
    pub updated_time: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
