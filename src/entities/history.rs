use sea_orm::entity::prelude::*;

// One row per mutated table per amendment. `changed_values` holds the
// pre-mutation values of the fields that changed, as JSON; a JSON null
// marks a record that did not exist before the amendment.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "consent_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub consent_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub history_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub table_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub record_id: String,
    pub changed_values: String,
    pub reason: String,
    pub effective_timestamp: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
