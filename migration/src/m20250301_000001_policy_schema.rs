use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

const PATTERN_TABLES: [(PatternTable, RelationTable); 3] = [
    (PatternTable::Subjects, RelationTable::PolicySubjectRels),
    (PatternTable::Actions, RelationTable::PolicyActionRels),
    (PatternTable::Resources, RelationTable::PolicyResourceRels),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create policies table
        manager
            .create_table(
                Table::create()
                    .table(Policies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Policies::Id)
                            .string_len(255)
                            .not_null()
                            .primary_key(),
                    )
                    .col(text(Policies::Description))
                    .col(
                        ColumnDef::new(Policies::Effect)
                            .string_len(16)
                            .not_null()
                            .check(Expr::col(Policies::Effect).is_in(["allow", "deny"])),
                    )
                    .col(text(Policies::Conditions))
                    .col(ColumnDef::new(Policies::Meta).blob().not_null())
                    .col(big_integer(Policies::CreatedAt))
                    .col(big_integer(Policies::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        for (pattern_table, relation_table) in PATTERN_TABLES {
            // Subjects, actions and resources share one shape
            manager
                .create_table(
                    Table::create()
                        .table(pattern_table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Pattern::Id)
                                .string_len(64)
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Pattern::Template)
                                .string_len(511)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Pattern::Compiled)
                                .string_len(511)
                                .not_null()
                                .unique_key(),
                        )
                        .col(boolean(Pattern::HasRegex))
                        .col(big_integer(Pattern::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(relation_table)
                        .if_not_exists()
                        .col(ColumnDef::new(Relation::PolicyId).string_len(255).not_null())
                        .col(ColumnDef::new(Relation::EntityId).string_len(64).not_null())
                        .col(big_integer(Relation::CreatedAt))
                        .primary_key(
                            Index::create()
                                .col(Relation::PolicyId)
                                .col(Relation::EntityId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name(format!("fk_{}_policy", relation_table.to_string()))
                                .from(relation_table, Relation::PolicyId)
                                .to(Policies::Table, Policies::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name(format!("fk_{}_entity", relation_table.to_string()))
                                .from(relation_table, Relation::EntityId)
                                .to(pattern_table, Pattern::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // Candidate queries join from the entity side
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(format!("idx_{}_entity", relation_table.to_string()))
                        .table(relation_table)
                        .col(Relation::EntityId)
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (pattern_table, relation_table) in PATTERN_TABLES {
            manager
                .drop_table(Table::drop().table(relation_table).if_exists().to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(pattern_table).if_exists().to_owned())
                .await?;
        }
        manager
            .drop_table(Table::drop().table(Policies::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Policies {
    Table,
    Id,
    Description,
    Effect,
    Conditions,
    Meta,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden, Clone, Copy)]
enum PatternTable {
    Subjects,
    Actions,
    Resources,
}

#[derive(DeriveIden, Clone, Copy)]
enum RelationTable {
    PolicySubjectRels,
    PolicyActionRels,
    PolicyResourceRels,
}

#[derive(DeriveIden)]
enum Pattern {
    Id,
    Template,
    Compiled,
    HasRegex,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Relation {
    PolicyId,
    EntityId,
    CreatedAt,
}
