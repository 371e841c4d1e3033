//! Name validation
//!
//! DAG, node and edge names become function names in generated artifacts,
//! so they must be plain identifiers: `[A-Za-z_][A-Za-z0-9_]*`.

use crate::error::TyphoonError;

/// Check whether `s` is a plain identifier
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a DAG/node/edge name
pub fn validate_name(kind: &str, name: &str) -> Result<(), TyphoonError> {
    if name.is_empty() {
        return Err(TyphoonError::InvalidName {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: "name cannot be empty".to_string(),
        });
    }
    if !is_identifier(name) {
        return Err(TyphoonError::InvalidName {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: "only letters, digits and '_' are allowed, not starting with a digit"
                .to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("list_files"));
        assert!(is_identifier("_private"));
        assert!(is_identifier("e2"));
        assert!(!is_identifier("2e"));
        assert!(!is_identifier("with-dash"));
        assert!(!is_identifier("with.dot"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn validate_name_reports_kind() {
        let err = validate_name("node", "bad name").unwrap_err();
        assert!(err.to_string().contains("node"));
        assert!(err.to_string().contains("TYPHOON-013"));
        assert!(validate_name("edge", "").is_err());
        assert!(validate_name("edge", "ok_name").is_ok());
    }
}
