use std::collections::HashMap;
use std::str::FromStr;

use sea_orm::sea_query::{
    Alias, Condition, Expr, InsertStatement, JoinType, OnConflict, Query, SelectStatement,
};
use sea_orm::{
    ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, DeriveIden,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Related, RuntimeErr,
    Set, SqlErr, SqlxSqliteConnector, StatementBuilder,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::entities::{self, policy};
use crate::errors::StoreError;
use crate::policy::dialect::MatchDialect;
use crate::policy::identity::PatternEntity;
use crate::policy::kind::EntityKind;
use crate::policy::Policy;
use crate::settings::{Database as DbCfg, Settings};

/// Column names shared by `subjects`, `actions` and `resources`.
#[derive(DeriveIden)]
enum PatternColumn {
    Id,
    Template,
    Compiled,
    HasRegex,
    CreatedAt,
}

/// Column names shared by the three `policy_*_rels` tables.
#[derive(DeriveIden)]
enum RelationColumn {
    PolicyId,
    EntityId,
    CreatedAt,
}

pub async fn connect(settings: &Settings) -> Result<DatabaseConnection, StoreError> {
    let cfg = &settings.database;
    if cfg.url.starts_with("sqlite:") {
        return connect_sqlite(cfg).await;
    }

    let mut options = ConnectOptions::new(cfg.url.clone());
    options
        .max_connections(cfg.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .sqlx_slow_statements_logging_settings(
            tracing::log::LevelFilter::Warn,
            settings.store.slow_operation_threshold(),
        );
    let db = Database::connect(options).await?;
    tracing::info!(backend = ?db.get_database_backend(), "Connected to policy database");
    Ok(db)
}

/// SQLite has no built-in REGEXP implementation; register one on every
/// pooled connection so candidate queries can match patterns in the engine.
async fn connect_sqlite(cfg: &DbCfg) -> Result<DatabaseConnection, StoreError> {
    let options = SqliteConnectOptions::from_str(&cfg.url)
        .map_err(sqlx_error)?
        .foreign_keys(true)
        .with_regexp();

    // Every connection to an in-memory database would see its own empty copy
    let in_memory = cfg.url.contains(":memory:") || cfg.url.contains("mode=memory");
    let max_connections = if in_memory { 1 } else { cfg.max_connections };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(sqlx_error)?;

    tracing::info!(max_connections, "Connected to SQLite policy database");
    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

fn sqlx_error(err: sqlx::Error) -> StoreError {
    StoreError::Storage(DbErr::Conn(RuntimeErr::SqlxError(err)))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn exec<C, S>(conn: &C, stmt: &S) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let backend = conn.get_database_backend();
    let result = conn.execute(backend.build(stmt)).await?;
    Ok(result.rows_affected())
}

// Write path

pub async fn insert_policy<C>(conn: &C, policy: &Policy) -> Result<(), StoreError>
where
    C: ConnectionTrait,
{
    let now = now();
    let model = policy::ActiveModel {
        id: Set(policy.id.clone()),
        description: Set(policy.description.clone()),
        effect: Set(policy.effect.as_str().to_string()),
        conditions: Set(policy.conditions_json()?),
        meta: Set(policy.meta.clone()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    match entities::Policy::insert(model).exec_without_returning(conn).await {
        Ok(_) => Ok(()),
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(StoreError::AlreadyExists(policy.id.clone()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Deletes the policy row; relation rows go with it through `ON DELETE CASCADE`.
pub async fn delete_policy<C>(conn: &C, id: &str) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    let result = entities::Policy::delete_by_id(id.to_string())
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Get-or-create by content id. Losing a race against another writer is a
/// no-op: the row it inserted is identical.
pub async fn upsert_pattern<C>(
    conn: &C,
    kind: EntityKind,
    entity: &PatternEntity,
) -> Result<(), StoreError>
where
    C: ConnectionTrait,
{
    match exec(conn, &pattern_insert(kind, entity, now())).await {
        Ok(_) => Ok(()),
        // The id is derived from the template, so only `compiled` can clash
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(StoreError::PatternConflict {
                kind,
                template: entity.template.clone(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// `ON CONFLICT (id) DO NOTHING`; MySQL gets the `id = id` update form.
fn pattern_insert(kind: EntityKind, entity: &PatternEntity, created_at: i64) -> InsertStatement {
    Query::insert()
        .into_table(Alias::new(kind.tables().entity_table))
        .columns([
            PatternColumn::Id,
            PatternColumn::Template,
            PatternColumn::Compiled,
            PatternColumn::HasRegex,
            PatternColumn::CreatedAt,
        ])
        .values_panic([
            entity.id.clone().into(),
            entity.template.clone().into(),
            entity.compiled.clone().into(),
            entity.has_regex.into(),
            created_at.into(),
        ])
        .on_conflict(
            OnConflict::column(PatternColumn::Id)
                .do_nothing_on([PatternColumn::Id])
                .to_owned(),
        )
        .to_owned()
}

pub async fn link_pattern<C>(
    conn: &C,
    kind: EntityKind,
    policy_id: &str,
    entity_id: &str,
) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    exec(conn, &relation_insert(kind, policy_id, entity_id, now())).await?;
    Ok(())
}

fn relation_insert(
    kind: EntityKind,
    policy_id: &str,
    entity_id: &str,
    created_at: i64,
) -> InsertStatement {
    Query::insert()
        .into_table(Alias::new(kind.tables().relation_table))
        .columns([
            RelationColumn::PolicyId,
            RelationColumn::EntityId,
            RelationColumn::CreatedAt,
        ])
        .values_panic([policy_id.into(), entity_id.into(), created_at.into()])
        .on_conflict(
            OnConflict::columns([RelationColumn::PolicyId, RelationColumn::EntityId])
                .do_nothing_on([RelationColumn::PolicyId])
                .to_owned(),
        )
        .to_owned()
}

// Read path

pub async fn policy_exists<C>(conn: &C, id: &str) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let count = entities::Policy::find_by_id(id.to_string())
        .count(conn)
        .await?;
    Ok(count > 0)
}

pub async fn page_policy_ids<C>(conn: &C, limit: u64, offset: u64) -> Result<Vec<String>, DbErr>
where
    C: ConnectionTrait,
{
    entities::Policy::find()
        .select_only()
        .column(policy::Column::Id)
        .order_by_asc(policy::Column::Id)
        .limit(limit)
        .offset(offset)
        .into_tuple::<String>()
        .all(conn)
        .await
}

/// Ids of policies that have, for every `(kind, value)` pair, at least one
/// entity of that kind matching `value`: literals by equality, patterns by
/// full-string regex in the engine.
pub async fn matching_policy_ids<C>(
    conn: &C,
    dialect: MatchDialect,
    fields: &[(EntityKind, &str)],
) -> Result<Vec<String>, DbErr>
where
    C: ConnectionTrait,
{
    let mut select = entities::Policy::find()
        .select_only()
        .column(policy::Column::Id);
    for (kind, value) in fields {
        select = select.filter(policy::Column::Id.in_subquery(matching_relations(*kind, value, dialect)));
    }

    select
        .order_by_asc(policy::Column::Id)
        .into_tuple::<String>()
        .all(conn)
        .await
}

fn matching_relations(kind: EntityKind, value: &str, dialect: MatchDialect) -> SelectStatement {
    let tables = kind.tables();
    let rel = Alias::new("r");
    let ent = Alias::new("e");

    let literal = Condition::all()
        .add(Expr::col((ent.clone(), PatternColumn::HasRegex)).eq(false))
        .add(Expr::col((ent.clone(), PatternColumn::Template)).eq(value));
    let pattern = Condition::all()
        .add(Expr::col((ent.clone(), PatternColumn::HasRegex)).eq(true))
        .add(dialect.full_match(value, "e.compiled"));

    Query::select()
        .column((rel.clone(), RelationColumn::PolicyId))
        .from_as(Alias::new(tables.relation_table), rel.clone())
        .join_as(
            JoinType::InnerJoin,
            Alias::new(tables.entity_table),
            ent.clone(),
            Expr::col((ent, PatternColumn::Id)).equals((rel, RelationColumn::EntityId)),
        )
        .cond_where(Condition::any().add(literal).add(pattern))
        .to_owned()
}

/// Loads full policies for `ids`, `batch_size` ids per round trip. The result
/// is ordered by id; ids without a row are skipped.
pub async fn load_policies<C>(
    conn: &C,
    ids: &[String],
    batch_size: usize,
) -> Result<Vec<Policy>, StoreError>
where
    C: ConnectionTrait,
{
    let mut policies = Vec::with_capacity(ids.len());

    for chunk in ids.chunks(batch_size.max(1)) {
        let subjects =
            related_templates::<_, entities::Subject>(conn, chunk, |m| m.template).await?;
        let mut actions: HashMap<String, Vec<String>> =
            related_templates::<_, entities::Action>(conn, chunk, |m| m.template)
                .await?
                .into_iter()
                .map(|(model, templates)| (model.id, templates))
                .collect();
        let mut resources: HashMap<String, Vec<String>> =
            related_templates::<_, entities::Resource>(conn, chunk, |m| m.template)
                .await?
                .into_iter()
                .map(|(model, templates)| (model.id, templates))
                .collect();

        for (model, subjects) in subjects {
            let actions = actions.remove(&model.id).unwrap_or_default();
            let resources = resources.remove(&model.id).unwrap_or_default();
            policies.push(policy_from_model(model, subjects, actions, resources)?);
        }
    }

    policies.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(policies)
}

/// Policy rows for `ids` paired with the sorted templates of related kind `R`.
async fn related_templates<C, R>(
    conn: &C,
    ids: &[String],
    template: impl Fn(R::Model) -> String,
) -> Result<Vec<(policy::Model, Vec<String>)>, DbErr>
where
    C: ConnectionTrait,
    R: EntityTrait,
    entities::Policy: Related<R>,
{
    let rows = entities::Policy::find()
        .filter(policy::Column::Id.is_in(ids.iter().cloned()))
        .order_by_asc(policy::Column::Id)
        .find_with_related(R::default())
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(model, related)| {
            let mut templates: Vec<String> = related.into_iter().map(&template).collect();
            templates.sort();
            templates.dedup();
            (model, templates)
        })
        .collect())
}

fn policy_from_model(
    model: policy::Model,
    subjects: Vec<String>,
    actions: Vec<String>,
    resources: Vec<String>,
) -> Result<Policy, StoreError> {
    Ok(Policy {
        effect: model.effect.parse()?,
        conditions: serde_json::from_str(&model.conditions)?,
        id: model.id,
        description: model.description,
        subjects,
        actions,
        resources,
        meta: model.meta,
    })
}

// Diagnostics

pub async fn entity_count<C>(conn: &C, kind: EntityKind) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    match kind {
        EntityKind::Subject => entities::Subject::find().count(conn).await,
        EntityKind::Action => entities::Action::find().count(conn).await,
        EntityKind::Resource => entities::Resource::find().count(conn).await,
    }
}

pub async fn relation_count<C>(conn: &C, kind: EntityKind) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    match kind {
        EntityKind::Subject => entities::PolicySubjectRel::find().count(conn).await,
        EntityKind::Action => entities::PolicyActionRel::find().count(conn).await,
        EntityKind::Resource => entities::PolicyResourceRel::find().count(conn).await,
    }
}
