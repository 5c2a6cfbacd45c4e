use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "players")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique, nullable)]
    pub user_id: Option<String>,
    #[sea_orm(indexed)]
    pub name: String,
    pub avatar_url: Option<String>,
    pub country: Option<String>,
    pub account_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::match_players::Entity")]
    MatchPlayers,
    #[sea_orm(has_many = "super::turns::Entity")]
    Turns,
}

impl Related<super::match_players::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MatchPlayers.def()
    }
}

impl Related<super::turns::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Turns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
