use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "matches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub external_id: String,
    pub variant: String,
    pub match_type: Option<String>,
    pub base_score: Option<i32>,
    pub in_mode: Option<String>,
    pub out_mode: Option<String>,
    pub bull_mode: Option<String>,
    pub max_rounds: Option<i32>,
    pub match_mode_type: Option<String>,
    pub match_mode_legs: Option<i32>,
    pub match_mode_sets: Option<i32>,
    #[sea_orm(column_type = "Json")]
    pub settings_extra: Json,
    #[sea_orm(nullable)]
    pub winner_player_id: Option<i64>,
    pub current_set: i32,
    pub current_leg: i32,
    pub current_round: i32,
    pub started_at: Option<DateTimeUtc>,
    pub finished_at: Option<DateTimeUtc>,
    pub incomplete: bool,
    pub updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::players::Entity",
        from = "Column::WinnerPlayerId",
        to = "super::players::Column::Id"
    )]
    Winner,
    #[sea_orm(has_many = "super::legs::Entity")]
    Legs,
    #[sea_orm(has_many = "super::match_players::Entity")]
    MatchPlayers,
}

impl Related<super::legs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Legs.def()
    }
}

impl Related<super::match_players::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MatchPlayers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
