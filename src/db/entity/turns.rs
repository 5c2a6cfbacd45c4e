use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "turns")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub external_id: String,
    #[sea_orm(indexed)]
    pub match_id: i64,
    #[sea_orm(indexed)]
    pub leg_id: i64,
    pub player_id: i64,
    pub round_number: i32,
    /// Signed: failed bull-out attempts score below zero.
    pub points: i32,
    pub score: i32,
    pub busted: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::legs::Entity",
        from = "Column::LegId",
        to = "super::legs::Column::Id",
        on_delete = "Cascade"
    )]
    Leg,
    #[sea_orm(
        belongs_to = "super::players::Entity",
        from = "Column::PlayerId",
        to = "super::players::Column::Id"
    )]
    Player,
    #[sea_orm(has_many = "super::dart_throws::Entity")]
    Throws,
}

impl Related<super::legs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Leg.def()
    }
}

impl Related<super::players::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Player.def()
    }
}

impl Related<super::dart_throws::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Throws.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
