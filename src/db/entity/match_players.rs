use sea_orm::entity::prelude::*;

/// Match participant in snapshot order, carrying match-level aggregates.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "match_players")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(indexed)]
    pub match_id: i64,
    #[sea_orm(indexed)]
    pub player_id: i64,
    pub player_index: i32,
    pub handle: Option<String>,
    pub legs_won: i32,
    pub sets_won: i32,
    pub average: Option<f64>,
    pub average_until_170: Option<f64>,
    pub first_9_average: Option<f64>,
    pub checkout_attempts: i32,
    pub checkout_hits: i32,
    pub checkout_rate: Option<f64>,
    pub best_checkout: Option<i32>,
    pub darts_thrown: i32,
    pub count_180: i32,
    pub busts: i32,
    pub mpr: Option<f64>,
    pub first_9_mpr: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::matches::Entity",
        from = "Column::MatchId",
        to = "super::matches::Column::Id",
        on_delete = "Cascade"
    )]
    Match,
    #[sea_orm(
        belongs_to = "super::players::Entity",
        from = "Column::PlayerId",
        to = "super::players::Column::Id"
    )]
    Player,
}

impl Related<super::matches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Match.def()
    }
}

impl Related<super::players::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Player.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
