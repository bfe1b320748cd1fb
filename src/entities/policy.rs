use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "policies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub effect: String, // "allow" | "deny"
    #[sea_orm(column_type = "Text")]
    pub conditions: String, // JSON-encoded object
    pub meta: Vec<u8>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::policy_subject_rel::Entity")]
    SubjectRels,
    #[sea_orm(has_many = "super::policy_action_rel::Entity")]
    ActionRels,
    #[sea_orm(has_many = "super::policy_resource_rel::Entity")]
    ResourceRels,
}

impl Related<super::subject::Entity> for Entity {
    fn to() -> RelationDef {
        super::policy_subject_rel::Relation::Subject.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::policy_subject_rel::Relation::Policy.def().rev())
    }
}

impl Related<super::action::Entity> for Entity {
    fn to() -> RelationDef {
        super::policy_action_rel::Relation::Action.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::policy_action_rel::Relation::Policy.def().rev())
    }
}

impl Related<super::resource::Entity> for Entity {
    fn to() -> RelationDef {
        super::policy_resource_rel::Relation::Resource.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::policy_resource_rel::Relation::Policy.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
