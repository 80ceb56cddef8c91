// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence: load/save/remove a JSON file with atomic writes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::session::Identity;

/// On-disk form of a session. All three items are written and removed together.
#[derive(Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub identity: Identity,
}

/// Load a persisted session from a JSON file.
///
/// Returns `Ok(None)` when the file does not exist, is empty, or holds no
/// access token.
pub fn load(path: &Path) -> anyhow::Result<Option<PersistedSession>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }
    let persisted: PersistedSession = serde_json::from_str(&contents)?;
    if persisted.access_token.is_empty() {
        return Ok(None);
    }
    Ok(Some(persisted))
}

/// Write the session to `path` via a sibling temp file and a rename.
///
/// A refresh grant and a login can both land in the same process, and two
/// CLI invocations can share one session file. Each write gets its own temp
/// name (PID + counter), so a reader only ever sees a complete file.
pub fn save(path: &Path, session: &PersistedSession) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let json = serde_json::to_string_pretty(session)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Remove the persisted session. A missing file is not an error.
///
/// If the file cannot be unlinked (read-only directory), it is truncated
/// instead, which [`load`] reads as no session.
pub fn remove(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(unlink) => std::fs::write(path, b"").map_err(|truncate| {
            anyhow::anyhow!("unlink failed ({unlink}) and truncate failed ({truncate})")
        }),
    }
}
