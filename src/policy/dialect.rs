use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::DatabaseBackend;

use crate::errors::StoreError;

/// How a given engine evaluates "request value fully matches stored
/// expression". Stored expressions are anchored (`^…$`), so a plain regex
/// search is a full-string match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDialect {
    /// `value ~ compiled`
    Postgres,
    /// `REGEXP_LIKE(value, compiled, 'c')`, forced case-sensitive
    MySql,
    /// `value REGEXP BINARY compiled`; MariaDB has no `REGEXP_LIKE` and only
    /// matches case-sensitively against a binary pattern
    MariaDb,
    /// `value REGEXP compiled`, backed by the function `storage::connect`
    /// registers on every connection
    Sqlite,
}

impl MatchDialect {
    pub fn from_engine(engine: &str) -> Result<Self, StoreError> {
        match engine.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" | "pgx" => Ok(MatchDialect::Postgres),
            "mysql" => Ok(MatchDialect::MySql),
            "mariadb" => Ok(MatchDialect::MariaDb),
            "sqlite" | "sqlite3" => Ok(MatchDialect::Sqlite),
            "" => Err(StoreError::UnsupportedEngine(
                "no database engine configured".to_string(),
            )),
            other => Err(StoreError::UnsupportedEngine(format!(
                "`{other}` (expected postgres, mysql, mariadb or sqlite)"
            ))),
        }
    }

    pub fn backend(self) -> DatabaseBackend {
        match self {
            MatchDialect::Postgres => DatabaseBackend::Postgres,
            MatchDialect::MySql | MatchDialect::MariaDb => DatabaseBackend::MySql,
            MatchDialect::Sqlite => DatabaseBackend::Sqlite,
        }
    }

    /// Condition that is true when `value` fully matches the expression in
    /// the `compiled_column` SQL reference (e.g. `e.compiled`).
    pub fn full_match(self, value: &str, compiled_column: &str) -> SimpleExpr {
        let sql = match self {
            MatchDialect::Postgres => format!("$1 ~ {compiled_column}"),
            MatchDialect::MySql => format!("REGEXP_LIKE(?, {compiled_column}, 'c')"),
            MatchDialect::MariaDb => format!("? REGEXP BINARY {compiled_column}"),
            MatchDialect::Sqlite => format!("? REGEXP {compiled_column}"),
        };
        Expr::cust_with_values(sql, [value.to_string()])
    }
}

impl std::fmt::Display for MatchDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatchDialect::Postgres => "postgres",
            MatchDialect::MySql => "mysql",
            MatchDialect::MariaDb => "mariadb",
            MatchDialect::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::{
        Alias, MysqlQueryBuilder, PostgresQueryBuilder, Query, QueryStatementWriter,
        SqliteQueryBuilder,
    };

    #[test]
    fn test_engine_names() {
        assert_eq!(MatchDialect::from_engine("pgx").unwrap(), MatchDialect::Postgres);
        assert_eq!(MatchDialect::from_engine("PostgreSQL").unwrap(), MatchDialect::Postgres);
        assert_eq!(MatchDialect::from_engine("mysql").unwrap(), MatchDialect::MySql);
        assert_eq!(MatchDialect::from_engine("MariaDB").unwrap(), MatchDialect::MariaDb);
        assert_eq!(MatchDialect::MariaDb.backend(), DatabaseBackend::MySql);
        assert_eq!(MatchDialect::from_engine(" sqlite ").unwrap(), MatchDialect::Sqlite);
    }

    #[test]
    fn test_missing_or_unknown_engine() {
        assert!(matches!(
            MatchDialect::from_engine(""),
            Err(StoreError::UnsupportedEngine(_))
        ));
        assert!(matches!(
            MatchDialect::from_engine("oracle"),
            Err(StoreError::UnsupportedEngine(_))
        ));
    }

    #[test]
    fn test_operator_per_engine() {
        let select = |dialect: MatchDialect| {
            Query::select()
                .column(Alias::new("id"))
                .from(Alias::new("subjects"))
                .and_where(dialect.full_match("alice", "compiled"))
                .to_owned()
        };

        assert_eq!(
            select(MatchDialect::Postgres).to_string(PostgresQueryBuilder),
            r#"SELECT "id" FROM "subjects" WHERE 'alice' ~ compiled"#
        );
        assert_eq!(
            select(MatchDialect::MySql).to_string(MysqlQueryBuilder),
            "SELECT `id` FROM `subjects` WHERE REGEXP_LIKE('alice', compiled, 'c')"
        );
        assert_eq!(
            select(MatchDialect::MariaDb).to_string(MysqlQueryBuilder),
            "SELECT `id` FROM `subjects` WHERE 'alice' REGEXP BINARY compiled"
        );
        assert_eq!(
            select(MatchDialect::Sqlite).to_string(SqliteQueryBuilder),
            r#"SELECT "id" FROM "subjects" WHERE 'alice' REGEXP compiled"#
        );
    }
}
