use sea_orm::entity::prelude::*;

/// Append-only log of raw deliveries, written before the engine runs.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_calls")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(indexed, nullable)]
    pub match_id: Option<String>,
    pub event: String,
    #[sea_orm(column_type = "Json")]
    pub payload: Json,
    #[sea_orm(indexed)]
    pub created_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
