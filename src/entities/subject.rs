use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "subjects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String, // sha256 of template
    #[sea_orm(unique)]
    pub template: String,
    #[sea_orm(unique)]
    pub compiled: String,
    pub has_regex: bool,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::policy_subject_rel::Entity")]
    PolicyRels,
}

impl Related<super::policy::Entity> for Entity {
    fn to() -> RelationDef {
        super::policy_subject_rel::Relation::Policy.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::policy_subject_rel::Relation::Subject.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
