use serde::{Deserialize, Serialize};

/// The three pattern namespaces. A "read" action and a "read" resource are
/// different rows because each kind has its own tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Subject,
    Action,
    Resource,
}

/// Storage names for one kind.
#[derive(Debug)]
pub struct KindTables {
    pub label: &'static str,
    pub entity_table: &'static str,
    pub relation_table: &'static str,
}

const SUBJECT: KindTables = KindTables {
    label: "subject",
    entity_table: "subjects",
    relation_table: "policy_subject_rels",
};

const ACTION: KindTables = KindTables {
    label: "action",
    entity_table: "actions",
    relation_table: "policy_action_rels",
};

const RESOURCE: KindTables = KindTables {
    label: "resource",
    entity_table: "resources",
    relation_table: "policy_resource_rels",
};

impl EntityKind {
    /// Processing order for writes; fixed so concurrent writers lock rows in
    /// the same sequence.
    pub const ALL: [EntityKind; 3] = [EntityKind::Subject, EntityKind::Action, EntityKind::Resource];

    pub fn tables(self) -> &'static KindTables {
        match self {
            EntityKind::Subject => &SUBJECT,
            EntityKind::Action => &ACTION,
            EntityKind::Resource => &RESOURCE,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.tables().label
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities;
    use sea_orm::EntityName;

    #[test]
    fn test_tables_agree_with_entities() {
        assert_eq!(
            EntityKind::Subject.tables().entity_table,
            entities::Subject.table_name()
        );
        assert_eq!(
            EntityKind::Action.tables().entity_table,
            entities::Action.table_name()
        );
        assert_eq!(
            EntityKind::Resource.tables().entity_table,
            entities::Resource.table_name()
        );
        assert_eq!(
            EntityKind::Subject.tables().relation_table,
            entities::PolicySubjectRel.table_name()
        );
        assert_eq!(
            EntityKind::Action.tables().relation_table,
            entities::PolicyActionRel.table_name()
        );
        assert_eq!(
            EntityKind::Resource.tables().relation_table,
            entities::PolicyResourceRel.table_name()
        );
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(EntityKind::Action.to_string(), "action");
        assert_eq!(
            serde_json::to_string(&EntityKind::Resource).unwrap(),
            "\"resource\""
        );
    }
}
