//! Path resolution for the session export and the audit log.

use std::path::{Path, PathBuf};

/// Environment variable naming the session cookie export.
pub const SESSION_ENV: &str = "GRAPH_HARVEST_SESSION";

/// Environment variable naming the JSONL audit log.
pub const AUDIT_ENV: &str = "GRAPH_HARVEST_AUDIT_LOG";

/// Per-project and per-user data directory name.
pub const DATA_DIR: &str = ".graph-harvest";

const SESSION_FILE: &str = "session.json";
const AUDIT_FILE: &str = "audit.jsonl";

/// Resolve the session file path.
pub fn resolve_session_path(explicit: Option<&Path>) -> PathBuf {
    resolve(explicit, SESSION_ENV, SESSION_FILE)
}

/// Resolve the audit log path.
pub fn resolve_audit_path(explicit: Option<&Path>) -> PathBuf {
    resolve(explicit, AUDIT_ENV, AUDIT_FILE)
}

/// The per-user data directory, `$HOME/.graph-harvest`.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR)
}

fn resolve(explicit: Option<&Path>, env: &str, file: &str) -> PathBuf {
    resolve_from(
        explicit,
        std::env::var(env).ok(),
        &Path::new(DATA_DIR).join(file),
        &default_data_dir().join(file),
    )
}

/// Flag, then environment, then `./.graph-harvest/<file>` if present,
/// then the per-user default.
fn resolve_from(
    explicit: Option<&Path>,
    env_value: Option<String>,
    local: &Path,
    fallback: &Path,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Some(env_path) = env_value.filter(|v| !v.trim().is_empty()) {
        return PathBuf::from(env_path);
    }

    if local.exists() {
        return local.to_path_buf();
    }

    fallback.to_path_buf()
}
