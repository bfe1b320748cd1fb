use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::policy::kind::EntityKind;
use crate::policy::template::TemplateError;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(policy_store::validation),
        help("Policies need a non-empty id of at most 255 bytes, an effect of `allow` or `deny`, and conditions that form a JSON object")
    )]
    Validation(String),

    #[error("Invalid {kind} template `{template}`")]
    #[diagnostic(
        code(policy_store::pattern),
        help("Regular expressions go between the configured delimiters, e.g. `file:<.*>`; every start delimiter needs a matching end delimiter")
    )]
    PatternCompilation {
        kind: EntityKind,
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error("{kind} template `{template}` compiles to an expression stored for another template")]
    #[diagnostic(
        code(policy_store::pattern_conflict),
        help("Two different templates produced the same regular expression; rewrite one of them")
    )]
    PatternConflict { kind: EntityKind, template: String },

    #[error("Policy `{0}` not found")]
    #[diagnostic(code(policy_store::not_found))]
    NotFound(String),

    #[error("Policy `{0}` already exists")]
    #[diagnostic(
        code(policy_store::already_exists),
        help("Use update to replace an existing policy")
    )]
    AlreadyExists(String),

    #[error("Unsupported database engine: {0}")]
    #[diagnostic(
        code(policy_store::unsupported_engine),
        help("Set database.engine to one of: postgres, mysql, mariadb, sqlite")
    )]
    UnsupportedEngine(String),

    #[error("Operation `{operation}` timed out after {after:?}")]
    #[diagnostic(code(policy_store::timeout))]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Database error: {0}")]
    #[diagnostic(code(policy_store::db))]
    Storage(#[from] sea_orm::DbErr),

    #[error("Config error: {0}")]
    #[diagnostic(code(policy_store::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(policy_store::serde))]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    #[diagnostic(code(policy_store::io))]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the caller may retry the failed operation as-is. Writes are
    /// transactional, so a failed storage round trip leaves nothing behind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Storage(_) | StoreError::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Storage(sea_orm::DbErr::Custom("boom".into())).is_retryable());
        assert!(StoreError::Timeout {
            operation: "create",
            after: Duration::from_millis(10),
        }
        .is_retryable());

        assert!(!StoreError::Validation("bad".into()).is_retryable());
        assert!(!StoreError::NotFound("p1".into()).is_retryable());
        assert!(!StoreError::UnsupportedEngine("oracle".into()).is_retryable());
        assert!(!StoreError::PatternConflict {
            kind: EntityKind::Subject,
            template: "<a>".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_pattern_error_message_names_kind() {
        let err = StoreError::PatternCompilation {
            kind: EntityKind::Resource,
            template: "file:<.*".into(),
            source: TemplateError::UnbalancedDelimiters {
                template: "file:<.*".into(),
                start: '<',
                end: '>',
            },
        };
        assert_eq!(err.to_string(), "Invalid resource template `file:<.*`");
    }
}
