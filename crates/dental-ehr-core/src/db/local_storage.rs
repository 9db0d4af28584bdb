//! Device-local key/value storage.
//!
//! Backs drafts, backups and the error ring buffer. Values are opaque JSON
//! strings; the caller owns the key naming.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};

impl Database {
    /// Get a stored value.
    pub fn local_get(&self, key: &str) -> DbResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Store a value, replacing any previous one.
    pub fn local_set(&self, key: &str, value: &str) -> DbResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO local_storage (key, value, updated_at) VALUES (?, ?, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a value. Returns whether it existed.
    pub fn local_remove(&self, key: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM local_storage WHERE key = ?", [key])?;
        Ok(rows_affected > 0)
    }

    /// All keys starting with `prefix`, sorted.
    pub fn local_keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT key FROM local_storage WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map([prefix], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_replace() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.local_get("historial_7").unwrap(), None);

        db.local_set("historial_7", r#"{"a":1}"#).unwrap();
        db.local_set("historial_7", r#"{"a":2}"#).unwrap();
        assert_eq!(
            db.local_get("historial_7").unwrap(),
            Some(r#"{"a":2}"#.to_string())
        );
    }

    #[test]
    fn test_remove() {
        let db = Database::open_in_memory().unwrap();
        db.local_set("k", "v").unwrap();
        assert!(db.local_remove("k").unwrap());
        assert!(!db.local_remove("k").unwrap());
        assert_eq!(db.local_get("k").unwrap(), None);
    }

    #[test]
    fn test_prefix_is_literal() {
        let db = Database::open_in_memory().unwrap();
        db.local_set("historial_respaldo_7_1", "a").unwrap();
        db.local_set("historial_respaldo_7_2", "b").unwrap();
        db.local_set("historial_respaldo_70_1", "c").unwrap();
        db.local_set("historial_7", "d").unwrap();
        // '_' must not act as a LIKE wildcard
        db.local_set("historialXrespaldo_7_9", "e").unwrap();

        let keys = db.local_keys_with_prefix("historial_respaldo_7_").unwrap();
        assert_eq!(
            keys,
            vec!["historial_respaldo_7_1", "historial_respaldo_7_2"]
        );
    }
}
