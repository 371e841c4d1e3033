//! Centralized constants for Typhoon
//!
//! Namespaces, file names and defaults in one place for easy tuning.

// ═══════════════════════════════════════════════════════════════
// Namespaces
// ═══════════════════════════════════════════════════════════════

/// Root of the system's own function namespace (`typhoon.flow.emit`, ...)
pub const RESERVED_NAMESPACE: &str = "typhoon";

/// Key of the mapping a failed transformation step is recorded as
pub const ERROR_KEY: &str = "__error__";

// ═══════════════════════════════════════════════════════════════
// Files
// ═══════════════════════════════════════════════════════════════

/// Config file inside the typhoon home directory
pub const CONFIG_FILE_NAME: &str = "typhoonconfig.toml";

/// Extensions recognised as DAG definitions
pub const DAG_FILE_EXTENSIONS: &[&str] = &["yml", "yaml"];

/// Extension of generated pipeline artifacts
pub const ARTIFACT_EXTENSION: &str = "py";

// ═══════════════════════════════════════════════════════════════
// Defaults
// ═══════════════════════════════════════════════════════════════

/// Default serverless invocation timeout (seconds)
pub const DEFAULT_LAMBDA_TIMEOUT: u64 = 50;

/// Execution date format accepted by the interactive tester and the CLI
pub const EXECUTION_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert!(DEFAULT_LAMBDA_TIMEOUT > 0);
        assert!(!RESERVED_NAMESPACE.contains('.'));
        assert!(DAG_FILE_EXTENSIONS.contains(&"yml"));
    }
}
