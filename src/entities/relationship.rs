use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A directed edge `(from_type:from_key) --kind--> (to_type:to_key)`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "relationships")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub from_type: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub from_key: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub kind: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub to_type: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub to_key: String,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
