use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "consent_mappings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub mapping_id: String,
    pub authorization_id: String,
    pub account_id: String,
    pub permission: String,
    pub mapping_status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
