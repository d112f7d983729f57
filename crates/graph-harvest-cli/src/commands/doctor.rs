//! Environment readiness check.

use std::path::Path;

use anyhow::{bail, Result};

use graph_harvest::renderer::chromium::find_chromium;
use graph_harvest::SessionCarrier;

/// Check for a Chromium binary, a usable session, and a writable audit log.
///
/// Returns whether at least one strategy can run.
pub fn run(session_path: &Path, audit_path: &Path) -> Result<bool> {
    println!("Graph Harvest Doctor");
    println!("====================");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome or set GRAPH_HARVEST_CHROMIUM_PATH."
        ),
    }

    let mut endpoint_ready = false;
    let mut session_ready = false;
    match SessionCarrier::from_json_file(session_path) {
        Ok(session) if session.is_empty() => {
            println!("[!!] Session {} holds no cookies", session_path.display());
        }
        Ok(session) => {
            session_ready = true;
            println!(
                "[OK] Session {}: {} cookies",
                session_path.display(),
                session.cookies.len()
            );
            if session.csrf_token().is_some() {
                endpoint_ready = true;
                println!("[OK] csrftoken present, structured endpoints enabled");
            } else {
                println!("[??] No csrftoken cookie, only the browser path will be used");
            }
        }
        Err(e) => println!("[!!] Session unusable: {e:#}"),
    }

    let audit_dir = audit_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if audit_path.exists() {
        println!("[OK] Audit log: {}", audit_path.display());
    } else if audit_dir.exists() {
        println!("[OK] Audit log will be created at {}", audit_path.display());
    } else {
        println!(
            "[??] Audit directory {} will be created on first write",
            audit_dir.display()
        );
    }

    println!();
    let ready = session_ready && (endpoint_ready || chromium.is_some());
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        if !session_ready {
            println!("  Export a logged-in cookie set to {}.", session_path.display());
        } else {
            println!("  Install Chromium or add the csrftoken cookie to the session.");
        }
    }

    Ok(ready)
}

/// Run the check and fail when no strategy can run, so the exit code reflects it.
pub fn require_ready(session_path: &Path, audit_path: &Path) -> Result<()> {
    if !run(session_path, audit_path)? {
        bail!("environment is not ready; see the checks above");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_session_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("session.json");
        let audit = dir.path().join("audit.jsonl");
        assert!(!run(&session, &audit).unwrap());
        let err = require_ready(&session, &audit).unwrap_err();
        assert!(err.to_string().contains("not ready"));
    }

    #[test]
    fn test_csrf_session_is_ready_without_browser() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("session.json");
        std::fs::write(
            &session,
            r#"[{"name": "sessionid", "value": "s"}, {"name": "csrftoken", "value": "t"}]"#,
        )
        .unwrap();
        assert!(run(&session, &dir.path().join("audit.jsonl")).unwrap());
        assert!(require_ready(&session, &dir.path().join("audit.jsonl")).is_ok());
    }
}
