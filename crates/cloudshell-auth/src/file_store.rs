//! JSON-file token store
//!
//! Persists `{ "<key>": {"value": "...", "expires": <epoch-millis>} }`. The
//! whole map lives in memory behind a tokio Mutex; every write rewrites the
//! file atomically (temp file + rename) while holding the lock, so
//! concurrent callbacks for the same key end last-write-wins with exactly one
//! row on disk. A failed write leaves the in-memory map untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::{CachedToken, StoreFuture, TokenStore};

/// File-backed token store.
pub struct FileTokenStore {
    path: PathBuf,
    rows: Mutex<HashMap<String, CachedToken>>,
}

impl FileTokenStore {
    /// Load the store from `path`.
    ///
    /// A missing file is a cold start: it is created as `{}`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::Io(format!("checking token file: {e}")))?;
        let rows = if exists {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token file: {e}")))?;
            let rows: HashMap<String, CachedToken> = serde_json::from_str(&contents)
                .map_err(|e| Error::StoreParse(format!("parsing token file: {e}")))?;
            info!(path = %path.display(), rows = rows.len(), "loaded token store");
            rows
        } else {
            info!(path = %path.display(), "token file not found, starting with empty store");
            let rows = HashMap::new();
            write_atomic(&path, &rows).await?;
            rows
        };

        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    /// Number of rows, live or expired.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl TokenStore for FileTokenStore {
    fn id(&self) -> &str {
        "file"
    }

    fn lookup<'a>(&'a self, key: &'a str, now: u64) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let rows = self.rows.lock().await;
            Ok(rows
                .get(key)
                .filter(|row| row.is_live(now))
                .map(|row| row.value.clone()))
        })
    }

    fn store<'a>(
        &'a self,
        key: &'a str,
        token: &'a str,
        ttl_secs: u64,
        now: u64,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut rows = self.rows.lock().await;
            let mut next = rows.clone();
            next.insert(key.to_owned(), CachedToken::new(token.to_owned(), ttl_secs, now));
            // Memory only changes once the file holds the new row
            write_atomic(&self.path, &next).await?;
            *rows = next;
            Ok(())
        })
    }
}

/// Write the token map to a file atomically with 0600 permissions.
async fn write_atomic(path: &Path, rows: &HashMap<String, CachedToken>) -> Result<()> {
    let json = serde_json::to_string_pretty(rows)
        .map_err(|e| Error::StoreParse(format!("serializing tokens: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), rows = rows.len(), "persisted token store");
    Ok(())
}
