//! PostgreSQL-backed rule store for shared deployments.
//!
//! Rows live in the `sys_rules` table (see `migrations/`). Wildcard matching is
//! expressed with `starts_with`/`left` on bound parameters, so identifiers are
//! never spliced into `LIKE` patterns. Each batch runs in one transaction at the
//! default read-committed isolation.
//!
//! A write deadline covers `BEGIN` and every statement of the batch, both on the
//! client and through `SET LOCAL statement_timeout`. `COMMIT` itself is never
//! cancelled, so a timed-out write has always been rolled back.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::{Row, Transaction};

use crate::access::Access;
use crate::config::PostgresConfig;
use crate::error::{RulesError, RulesResult};
use crate::resources::Resource;
use crate::rule::{RoleId, Rule, RuleChange, RuleKey};
use crate::store::{ResourceFilter, RuleStore};

const SELECT_RULES: &str = "SELECT rel_role, resource, operation, value FROM sys_rules";

/// PostgreSQL rule store with connection pooling.
///
/// # Example
///
/// ```rust,no_run
/// use platform_rules::{PostgresConfig, PostgresRuleStore};
///
/// async fn example() -> Result<(), platform_rules::RulesError> {
///     let config = PostgresConfig::new("postgresql://localhost/rules");
///     let store = PostgresRuleStore::new(&config).await?;
///     store.run_migrations().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PostgresRuleStore {
    pool: PgPool,
}

impl PostgresRuleStore {
    /// Connect a new pool.
    pub async fn new(config: &PostgresConfig) -> RulesResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| RulesError::Storage(format!("Failed to connect to database: {}", e)))?;

        tracing::debug!(max_connections = config.max_connections, "Rule store pool connected");

        Ok(Self { pool })
    }

    /// Connect using [`PostgresConfig::from_env`].
    pub async fn from_env() -> RulesResult<Self> {
        let config = PostgresConfig::from_env()?;
        Self::new(&config).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `sys_rules` table if needed.
    pub async fn run_migrations(&self) -> RulesResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RulesError::Storage(format!("Migration failed: {}", e)))?;
        Ok(())
    }

    /// Get database pool for advanced queries.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin_within(
        &self,
        deadline: Duration,
    ) -> RulesResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        // 0 disables the server-side timeout
        let millis = deadline.as_millis().max(1);
        sqlx::query(&format!("SET LOCAL statement_timeout = {}", millis))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

fn role_param(role: RoleId) -> RulesResult<i64> {
    i64::try_from(role.get()).map_err(|_| {
        RulesError::Validation(format!("role id {} does not fit a BIGINT column", role))
    })
}

fn decode_rule(row: &PgRow) -> RulesResult<Rule> {
    let role: i64 = row.try_get("rel_role")?;
    let resource: String = row.try_get("resource")?;
    let operation: String = row.try_get("operation")?;
    let value: i16 = row.try_get("value")?;

    let role = u64::try_from(role)
        .map_err(|_| RulesError::Storage(format!("negative role id {} in sys_rules", role)))?;
    let resource = Resource::parse(resource)
        .map_err(|e| RulesError::Storage(format!("corrupt resource in sys_rules: {}", e)))?;

    Ok(Rule {
        role: RoleId(role),
        resource,
        operation,
        access: Access::from_stored(value)?,
    })
}

#[async_trait]
impl RuleStore for PostgresRuleStore {
    async fn rules_for(
        &self,
        roles: &[RoleId],
        resource: &Resource,
        operation: &str,
    ) -> RulesResult<Vec<Rule>> {
        let role_ids = roles
            .iter()
            .map(|role| role_param(*role))
            .collect::<RulesResult<Vec<i64>>>()?;

        // A stored pattern covers the query when the query starts with the pattern's prefix.
        let resource_clause = if resource.is_wildcard() {
            "(starts_with(resource, $3) \
              OR (right(resource, 1) = '*' AND starts_with($3, left(resource, -1))))"
        } else {
            "(resource = $3 \
              OR (right(resource, 1) = '*' AND starts_with($3, left(resource, -1))))"
        };
        let sql = format!(
            "{} WHERE rel_role = ANY($1) AND operation = $2 AND {}",
            SELECT_RULES, resource_clause
        );

        let rows = sqlx::query(&sql)
            .bind(role_ids)
            .bind(operation)
            .bind(resource.prefix())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_rule).collect()
    }

    async fn list(&self, role: RoleId, filter: Option<&ResourceFilter>) -> RulesResult<Vec<Rule>> {
        let role_id = role_param(role)?;

        let rows = match filter {
            None => {
                let sql = format!(
                    "{} WHERE rel_role = $1 ORDER BY resource, operation",
                    SELECT_RULES
                );
                sqlx::query(&sql).bind(role_id).fetch_all(&self.pool).await?
            }
            Some(ResourceFilter::Exact(resource)) => {
                let sql = format!(
                    "{} WHERE rel_role = $1 AND resource = $2 ORDER BY operation",
                    SELECT_RULES
                );
                sqlx::query(&sql)
                    .bind(role_id)
                    .bind(resource.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            Some(ResourceFilter::Pattern(pattern)) => {
                let sql = format!(
                    "{} WHERE rel_role = $1 AND starts_with(resource, $2) \
                     ORDER BY resource, operation",
                    SELECT_RULES
                );
                sqlx::query(&sql)
                    .bind(role_id)
                    .bind(pattern.prefix())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(decode_rule).collect()
    }

    async fn apply(&self, changes: &[RuleChange], deadline: Duration) -> RulesResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        // Encode everything before BEGIN so bad input never opens a transaction.
        let statements = changes
            .iter()
            .map(|change| -> RulesResult<(i64, RuleKey, Option<i16>)> {
                match change {
                    RuleChange::Upsert(rule) => {
                        let value = rule.access.to_stored().ok_or_else(|| {
                            RulesError::Constraint(format!(
                                "inherit is never stored (rule {})",
                                rule
                            ))
                        })?;
                        Ok((role_param(rule.role)?, rule.key(), Some(value)))
                    }
                    RuleChange::Remove(key) => Ok((role_param(key.role)?, key.clone(), None)),
                }
            })
            .collect::<RulesResult<Vec<_>>>()?;

        // Dropping `tx` on an early return or on expiry rolls the batch back.
        let staged = async {
            let mut tx = self.begin_within(deadline).await?;
            for (role_id, key, value) in &statements {
                match value {
                    Some(value) => {
                        sqlx::query(
                            r#"
                            INSERT INTO sys_rules (rel_role, resource, operation, value)
                            VALUES ($1, $2, $3, $4)
                            ON CONFLICT (rel_role, resource, operation)
                            DO UPDATE SET value = EXCLUDED.value
                            "#,
                        )
                        .bind(*role_id)
                        .bind(key.resource.as_str())
                        .bind(key.operation.as_str())
                        .bind(*value)
                        .execute(&mut *tx)
                        .await?;
                    }
                    None => {
                        sqlx::query(
                            "DELETE FROM sys_rules \
                             WHERE rel_role = $1 AND resource = $2 AND operation = $3",
                        )
                        .bind(*role_id)
                        .bind(key.resource.as_str())
                        .bind(key.operation.as_str())
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }
            Ok::<_, RulesError>(tx)
        };

        let tx = tokio::time::timeout(deadline, staged)
            .await
            .map_err(|_| RulesError::Timeout(deadline))??;
        tx.commit().await?;

        Ok(())
    }

    async fn delete_role(&self, role: RoleId, deadline: Duration) -> RulesResult<u64> {
        let role_id = role_param(role)?;

        let staged = async {
            let mut tx = self.begin_within(deadline).await?;
            let result = sqlx::query("DELETE FROM sys_rules WHERE rel_role = $1")
                .bind(role_id)
                .execute(&mut *tx)
                .await?;
            Ok::<_, RulesError>((tx, result.rows_affected()))
        };

        let (tx, removed) = tokio::time::timeout(deadline, staged)
            .await
            .map_err(|_| RulesError::Timeout(deadline))??;
        tx.commit().await?;

        Ok(removed)
    }
}
