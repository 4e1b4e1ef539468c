//! Persistence backends for the caches
//!
//! A cache document is a flat JSON object of `key -> entry`. Documents are
//! loaded once when a cache is constructed and overwritten wholesale on save.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{
    CacheBackend, CacheConfig, db_path, metadata_cache_path, publish_times_cache_path,
};
use crate::version::error::CacheError;

/// SQLite namespace of the metadata cache
pub const METADATA_NAMESPACE: &str = "metadata";

/// SQLite namespace of the publish-time cache
pub const PUBLISH_TIMES_NAMESPACE: &str = "publish_times";

/// Cache document: entry key -> serialized entry
pub type CacheDocument = Map<String, Value>;

/// Storage for one cache document
pub trait CacheStore: Send + Sync {
    /// Load the stored document; a missing or unreadable document loads as empty
    fn load(&self) -> Result<CacheDocument, CacheError>;

    /// Replace the stored document
    fn save(&self, document: &CacheDocument) -> Result<(), CacheError>;

    /// Human readable location for logs
    fn location(&self) -> String;
}

/// A single JSON file
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self) -> Result<CacheDocument, CacheError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache file at {:?}, starting empty", self.path);
                return Ok(CacheDocument::new());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!("Ignoring unreadable cache file {:?}: {}", self.path, e);
                Ok(CacheDocument::new())
            }
        }
    }

    fn save(&self, document: &CacheDocument) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        // Atomic replace: write a sibling temp file, then rename it over the target
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec(document)?)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// One namespace of a shared SQLite database
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    namespace: String,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database and return a store for `namespace`
    pub fn open(db_path: &Path, namespace: &str) -> Result<Self, CacheError> {
        let conn = Self::open_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            namespace: namespace.to_string(),
            db_path: db_path.to_path_buf(),
        })
    }

    /// Store for another namespace sharing this store's connection
    pub fn with_namespace(&self, namespace: &str) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            namespace: namespace.to_string(),
            db_path: self.db_path.clone(),
        }
    }

    fn open_connection(db_path: &Path) -> Result<Connection, CacheError> {
        info!("Initializing cache database at {:?}", db_path);

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            )
            "#,
            [],
        )?;

        debug!("Database schema created successfully");
        Ok(conn)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }
}

impl CacheStore for SqliteStore {
    fn load(&self) -> Result<CacheDocument, CacheError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM cache_entries WHERE namespace = ?1")?;

        let rows = stmt
            .query_map([&self.namespace], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut document = CacheDocument::new();
        for (key, value) in rows {
            match serde_json::from_str(&value) {
                Ok(value) => {
                    document.insert(key, value);
                }
                Err(e) => warn!("Ignoring unreadable cache row {}/{}: {}", self.namespace, key, e),
            }
        }
        Ok(document)
    }

    fn save(&self, document: &CacheDocument) -> Result<(), CacheError> {
        let now = chrono::Utc::now().timestamp_millis();

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1",
            [&self.namespace],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO cache_entries (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (key, value) in document {
                stmt.execute((&self.namespace, key, value.to_string(), now))?;
            }
        }

        tx.commit()?;
        debug!(
            "Saved {} entries to {}/{}",
            document.len(),
            self.db_path.display(),
            self.namespace
        );
        Ok(())
    }

    fn location(&self) -> String {
        format!("{}#{}", self.db_path.display(), self.namespace)
    }
}

/// Stores for the metadata and publish-time caches, in that order
pub fn open_stores(
    config: &CacheConfig,
) -> Result<(Box<dyn CacheStore>, Box<dyn CacheStore>), CacheError> {
    let dir = config.dir();
    match config.backend {
        CacheBackend::Json => Ok((
            Box::new(JsonFileStore::new(metadata_cache_path(&dir))),
            Box::new(JsonFileStore::new(publish_times_cache_path(&dir))),
        )),
        CacheBackend::Sqlite => {
            let metadata = SqliteStore::open(&db_path(&dir), METADATA_NAMESPACE)?;
            let publish_times = metadata.with_namespace(PUBLISH_TIMES_NAMESPACE);
            Ok((Box::new(metadata), Box::new(publish_times)))
        }
    }
}
