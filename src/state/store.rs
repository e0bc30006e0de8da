//! Key/value access to the `kv_state` table.

use tracing::{debug, instrument};

use super::{StateError, StateKey};
use crate::db::Database;
use crate::descriptor::ContentId;

/// Typed access to persisted state.
#[derive(Debug, Clone)]
pub struct StateStore {
    db: Database,
}

impl StateStore {
    /// Wraps a database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Reads a raw value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Query`] if the query fails.
    pub async fn get_raw(&self, key: StateKey) -> Result<Option<String>, StateError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv_state WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(self.db.pool())
            .await?;
        Ok(value)
    }

    /// Writes a raw value after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidValue`] for a malformed value or
    /// [`StateError::Query`] if the write fails.
    #[instrument(skip(self, value), fields(key = %key))]
    pub async fn set_raw(&self, key: StateKey, value: &str) -> Result<(), StateError> {
        key.validate(value)?;
        sqlx::query(
            "INSERT INTO kv_state (key, value, updated_at) VALUES (?, ?, datetime('now')) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key.as_str())
        .bind(value)
        .execute(self.db.pool())
        .await?;
        debug!(value, "state updated");
        Ok(())
    }

    /// Reads a `1`/`0` flag.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the query fails or the stored value is not a flag.
    pub async fn get_flag(&self, key: StateKey, default: bool) -> Result<bool, StateError> {
        match self.get_raw(key).await?.as_deref() {
            None => Ok(default),
            Some("1") => Ok(true),
            Some("0") => Ok(false),
            Some(other) => Err(StateError::invalid(key, other, "expected 1 or 0")),
        }
    }

    /// Writes a `1`/`0` flag.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Query`] if the write fails.
    pub async fn set_flag(&self, key: StateKey, value: bool) -> Result<(), StateError> {
        self.set_raw(key, if value { "1" } else { "0" }).await
    }

    /// Reads an integer.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the query fails or the stored value is not an integer.
    pub async fn get_u64(&self, key: StateKey, default: u64) -> Result<u64, StateError> {
        match self.get_raw(key).await? {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| StateError::invalid(key, raw, "expected a non-negative integer")),
        }
    }

    /// Reads a JSON id list. Empty strings are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the query fails or the stored value is not a JSON string array.
    pub async fn get_id_list(&self, key: StateKey) -> Result<Vec<ContentId>, StateError> {
        let Some(raw) = self.get_raw(key).await? else {
            return Ok(Vec::new());
        };
        let ids: Vec<String> = serde_json::from_str(&raw).map_err(|_| {
            StateError::invalid(key, raw.clone(), "expected a JSON array of strings")
        })?;
        Ok(ids
            .into_iter()
            .filter(|id| !id.is_empty())
            .map(ContentId::new)
            .collect())
    }

    /// Writes a JSON id list.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Query`] if the write fails.
    pub async fn set_id_list(&self, key: StateKey, ids: &[ContentId]) -> Result<(), StateError> {
        let raw = serde_json::to_string(ids)
            .map_err(|e| StateError::invalid(key, "<list>", e.to_string()))?;
        self.set_raw(key, &raw).await
    }

    /// Returns every key with its stored value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Query`] if a read fails.
    pub async fn snapshot(&self) -> Result<Vec<(StateKey, Option<String>)>, StateError> {
        let mut out = Vec::with_capacity(StateKey::ALL.len());
        for key in StateKey::ALL {
            out.push((key, self.get_raw(key).await?));
        }
        Ok(out)
    }
}
