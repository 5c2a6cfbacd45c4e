use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dart_throws")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(indexed)]
    pub external_id: String,
    #[sea_orm(indexed)]
    pub turn_id: i64,
    pub dart_number: i32,
    pub segment_number: i32,
    pub multiplier: i32,
    pub points: i32,
    pub segment_name: Option<String>,
    pub bed: Option<String>,
    pub coord_x: Option<f64>,
    pub coord_y: Option<f64>,
    pub thrown_at: Option<DateTimeUtc>,
    pub is_corrected: bool,
    pub corrected_at: Option<DateTimeUtc>,
    pub corrected_by: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::turns::Entity",
        from = "Column::TurnId",
        to = "super::turns::Column::Id",
        on_delete = "Cascade"
    )]
    Turn,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::CorrectedBy",
        to = "Column::Id"
    )]
    CorrectedBy,
}

impl Related<super::turns::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Turn.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
