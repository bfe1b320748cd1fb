use sha2::{Digest, Sha256};

use crate::policy::template::{self, Delimiters, TemplateError};

/// Content-addressed identifier for a sanitized template: lowercase hex
/// SHA-256 of its UTF-8 bytes. Equal templates always share one row.
pub fn identify(sanitized: &str) -> String {
    format!("{:x}", Sha256::digest(sanitized.as_bytes()))
}

/// A subject, action or resource row as it is written to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternEntity {
    pub id: String,
    pub template: String,
    pub compiled: String,
    pub has_regex: bool,
}

impl PatternEntity {
    /// Sanitize, compile and identify a raw template.
    pub fn from_template(raw: &str, delimiters: Delimiters) -> Result<Self, TemplateError> {
        let compiled = template::compile(raw, delimiters)?;
        Ok(Self {
            id: identify(&compiled.template),
            template: compiled.template,
            compiled: compiled.compiled,
            has_regex: compiled.is_pattern,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_known_digest() {
        assert_eq!(
            identify("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(identify("abc").len(), 64);
    }

    #[test]
    fn test_identify_is_stable() {
        assert_eq!(identify("file:user:<.*>"), identify("file:user:<.*>"));
        assert_ne!(identify("read"), identify("Read"));
    }

    #[test]
    fn test_entity_id_ignores_surrounding_whitespace() {
        let a = PatternEntity::from_template("user", Delimiters::default()).unwrap();
        let b = PatternEntity::from_template("  user\n", Delimiters::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id, identify("user"));
        assert!(!a.has_regex);
    }

    #[test]
    fn test_entity_from_pattern() {
        let entity = PatternEntity::from_template("file:user:<.*>", Delimiters::default()).unwrap();
        assert!(entity.has_regex);
        assert_eq!(entity.template, "file:user:<.*>");
        assert_eq!(entity.compiled, "^file:user:(.*)$");
        assert_eq!(entity.id, identify("file:user:<.*>"));
    }

    #[test]
    fn test_entity_propagates_compile_errors() {
        let err = PatternEntity::from_template(" ", Delimiters::default()).unwrap_err();
        assert_eq!(err, TemplateError::EmptyTemplate);
    }
}
