use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};

use crate::errors::StoreError;
use crate::policy::dialect::MatchDialect;
use crate::policy::identity::PatternEntity;
use crate::policy::kind::EntityKind;
use crate::policy::template::Delimiters;
use crate::policy::{Policy, Request};
use crate::settings::{InvalidPatterns, Settings};
use crate::storage;

/// Storage provider contract consumed by the authorization decision engine.
///
/// Writes are atomic. Candidate queries may return policies that the engine
/// later rejects, but never omit one whose subject, action and resource
/// patterns all match the request.
#[async_trait]
pub trait PolicyManager: Send + Sync {
    /// Ensures the schema exists.
    async fn initialize(&self) -> Result<(), StoreError>;

    async fn create(&self, policy: &Policy) -> Result<(), StoreError>;

    /// Replaces the stored policy with the same id, or creates it.
    async fn update(&self, policy: &Policy) -> Result<(), StoreError>;

    /// Removes a policy and its relations. Deleting an unknown id succeeds.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Policy, StoreError>;

    /// One page of policies ordered by id.
    async fn get_all(&self, limit: u64, offset: u64) -> Result<Vec<Policy>, StoreError>;

    /// Policies whose subjects, actions and resources each match the request.
    async fn find_request_candidates(&self, request: &Request) -> Result<Vec<Policy>, StoreError>;

    async fn find_policies_for_subject(&self, subject: &str) -> Result<Vec<Policy>, StoreError>;

    async fn find_policies_for_action(&self, action: &str) -> Result<Vec<Policy>, StoreError>;

    async fn find_policies_for_resource(&self, resource: &str)
        -> Result<Vec<Policy>, StoreError>;
}

/// [`PolicyManager`] over a SeaORM connection to PostgreSQL, MySQL or SQLite.
#[derive(Clone)]
pub struct SqlPolicyManager {
    db: DatabaseConnection,
    dialect: MatchDialect,
    delimiters: Delimiters,
    invalid_patterns: InvalidPatterns,
    batch_size: usize,
    slow_threshold: Duration,
    timeout: Option<Duration>,
}

impl SqlPolicyManager {
    pub fn new(db: DatabaseConnection, settings: &Settings) -> Result<Self, StoreError> {
        settings.validate()?;
        let dialect = MatchDialect::from_engine(&settings.database.engine)?;

        let backend = db.get_database_backend();
        if dialect.backend() != backend {
            return Err(StoreError::UnsupportedEngine(format!(
                "engine `{}` does not match the {:?} connection",
                settings.database.engine, backend
            )));
        }

        Ok(Self {
            db,
            dialect,
            delimiters: settings.store.delimiters()?,
            invalid_patterns: settings.store.invalid_patterns,
            batch_size: settings.store.batch_size,
            slow_threshold: settings.store.slow_operation_threshold(),
            timeout: settings.store.operation_timeout(),
        })
    }

    /// Overrides the regex operator used by candidate queries.
    pub fn with_dialect(mut self, dialect: MatchDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Number of distinct stored patterns of `kind`.
    pub async fn entity_count(&self, kind: EntityKind) -> Result<u64, StoreError> {
        self.bounded("entity_count", async {
            Ok::<_, StoreError>(storage::entity_count(&self.db, kind).await?)
        })
        .await
    }

    /// Number of policy links to patterns of `kind`.
    pub async fn relation_count(&self, kind: EntityKind) -> Result<u64, StoreError> {
        self.bounded("relation_count", async {
            Ok::<_, StoreError>(storage::relation_count(&self.db, kind).await?)
        })
        .await
    }

    /// Runs `fut` under the configured deadline and reports it when slow.
    /// A future cut off by the deadline is dropped, which rolls back any
    /// transaction it still holds.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let started = Instant::now();
        let result = match self.timeout {
            Some(after) => match tokio::time::timeout(after, fut).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout { operation, after }),
            },
            None => fut.await,
        };

        let elapsed = started.elapsed();
        if elapsed > self.slow_threshold {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow policy store operation"
            );
        }
        result
    }

    /// Compiles the templates of one kind, keyed and ordered by entity id so
    /// every writer upserts rows in the same sequence.
    fn compile_templates(
        &self,
        kind: EntityKind,
        templates: &[String],
    ) -> Result<Vec<PatternEntity>, StoreError> {
        let mut entities = BTreeMap::new();

        for template in templates {
            if template.trim().is_empty() {
                continue;
            }
            match PatternEntity::from_template(template, self.delimiters) {
                Ok(entity) => {
                    entities.insert(entity.id.clone(), entity);
                }
                Err(source) => match self.invalid_patterns {
                    InvalidPatterns::Reject => {
                        return Err(StoreError::PatternCompilation {
                            kind,
                            template: template.clone(),
                            source,
                        });
                    }
                    InvalidPatterns::Skip => {
                        tracing::warn!(
                            kind = %kind,
                            template = %template,
                            error = %source,
                            "Skipping template that does not compile"
                        );
                    }
                },
            }
        }

        Ok(entities.into_values().collect())
    }

    /// Inserts the policy row followed by its pattern entities and relations.
    async fn write_policy<C>(&self, conn: &C, policy: &Policy) -> Result<(), StoreError>
    where
        C: ConnectionTrait,
    {
        let mut compiled = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            compiled.push((kind, self.compile_templates(kind, policy.templates(kind))?));
        }

        storage::insert_policy(conn, policy).await?;

        for (kind, entities) in &compiled {
            for entity in entities {
                storage::upsert_pattern(conn, *kind, entity).await?;
                storage::link_pattern(conn, *kind, &policy.id, &entity.id).await?;
            }
        }

        tracing::debug!(
            policy_id = %policy.id,
            subjects = compiled[0].1.len(),
            actions = compiled[1].1.len(),
            resources = compiled[2].1.len(),
            "Stored policy"
        );
        Ok(())
    }

    async fn find_by_fields(
        &self,
        operation: &'static str,
        fields: &[(EntityKind, &str)],
    ) -> Result<Vec<Policy>, StoreError> {
        self.bounded(operation, async {
            let ids = storage::matching_policy_ids(&self.db, self.dialect, fields).await?;
            tracing::debug!(candidates = ids.len(), "Matched candidate policies");
            storage::load_policies(&self.db, &ids, self.batch_size).await
        })
        .await
    }
}

#[async_trait]
impl PolicyManager for SqlPolicyManager {
    async fn initialize(&self) -> Result<(), StoreError> {
        self.bounded("initialize", async {
            Migrator::up(&self.db, None).await?;
            tracing::info!(dialect = %self.dialect, "Policy schema is up to date");
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn create(&self, policy: &Policy) -> Result<(), StoreError> {
        policy.validate()?;
        self.bounded("create", async {
            let txn = self.db.begin().await?;
            self.write_policy(&txn, policy).await?;
            txn.commit().await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn update(&self, policy: &Policy) -> Result<(), StoreError> {
        policy.validate()?;
        self.bounded("update", async {
            let txn = self.db.begin().await?;
            let replaced = storage::delete_policy(&txn, &policy.id).await?;
            self.write_policy(&txn, policy).await?;
            txn.commit().await?;
            tracing::debug!(policy_id = %policy.id, replaced = replaced > 0, "Updated policy");
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.bounded("delete", async {
            let txn = self.db.begin().await?;
            let deleted = storage::delete_policy(&txn, id).await?;
            txn.commit().await?;
            tracing::debug!(policy_id = %id, deleted = deleted > 0, "Deleted policy");
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Policy, StoreError> {
        self.bounded("get", async {
            storage::load_policies(&self.db, &[id.to_string()], self.batch_size)
                .await?
                .pop()
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
        .await
    }

    async fn get_all(&self, limit: u64, offset: u64) -> Result<Vec<Policy>, StoreError> {
        self.bounded("get_all", async {
            let ids = storage::page_policy_ids(&self.db, limit, offset).await?;
            storage::load_policies(&self.db, &ids, self.batch_size).await
        })
        .await
    }

    async fn find_request_candidates(&self, request: &Request) -> Result<Vec<Policy>, StoreError> {
        let fields: Vec<(EntityKind, &str)> = EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, request.field(kind)))
            .collect();
        self.find_by_fields("find_request_candidates", &fields).await
    }

    async fn find_policies_for_subject(&self, subject: &str) -> Result<Vec<Policy>, StoreError> {
        self.find_by_fields("find_policies_for_subject", &[(EntityKind::Subject, subject)])
            .await
    }

    async fn find_policies_for_action(&self, action: &str) -> Result<Vec<Policy>, StoreError> {
        self.find_by_fields("find_policies_for_action", &[(EntityKind::Action, action)])
            .await
    }

    async fn find_policies_for_resource(
        &self,
        resource: &str,
    ) -> Result<Vec<Policy>, StoreError> {
        self.find_by_fields("find_policies_for_resource", &[(EntityKind::Resource, resource)])
            .await
    }
}
