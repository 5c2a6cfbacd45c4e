use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "legs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(indexed)]
    pub match_id: i64,
    pub set_number: i32,
    pub leg_number: i32,
    pub winner_player_id: Option<i64>,
    pub started_at: Option<DateTimeUtc>,
    pub finished_at: Option<DateTimeUtc>,
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
    #[sea_orm(has_many = "super::turns::Entity")]
    Turns,
    #[sea_orm(has_many = "super::leg_players::Entity")]
    LegPlayers,
}

impl Related<super::matches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Match.def()
    }
}

impl Related<super::turns::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Turns.def()
    }
}

impl Related<super::leg_players::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LegPlayers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
