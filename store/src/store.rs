use std::marker::PhantomData;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::filter::Filter;
use crate::record::Record;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store connection poisoned")]
    Poisoned,
}

/// A single-collection SQLite-backed store for records of type `T`.
///
/// Each record is persisted twice: once as an opaque JSON blob in the
/// collection's main table (the source of truth), and once per indexed
/// field in a sibling `<collection>_index` table, so `list` can filter in
/// SQL instead of deserializing every row.
pub struct Store<T: Record> {
    conn: Mutex<Connection>,
    _marker: PhantomData<T>,
}

impl<T: Record> Store<T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let collection = T::collection_name();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {collection} (
                id TEXT PRIMARY KEY,
                updated_at INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {collection}_index (
                id TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                num_value INTEGER,
                PRIMARY KEY (id, field)
            );
            CREATE INDEX IF NOT EXISTS idx_{collection}_index_field
                ON {collection}_index (field, value);"
        ))?;
        debug!(collection, "store bootstrapped");
        Ok(Self {
            conn: Mutex::new(conn),
            _marker: PhantomData,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert or replace a record and its index rows, as a single transaction.
    pub fn put(&self, record: &T) -> Result<(), StoreError> {
        let collection = T::collection_name();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let data = serde_json::to_string(record)?;
        tx.execute(
            &format!(
                "INSERT INTO {collection} (id, updated_at, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at, data = excluded.data"
            ),
            params![record.id(), record.updated_at(), data],
        )?;
        tx.execute(
            &format!("DELETE FROM {collection}_index WHERE id = ?1"),
            params![record.id()],
        )?;
        for (field, value) in record.indexed_fields() {
            tx.execute(
                &format!("INSERT INTO {collection}_index (id, field, value, num_value) VALUES (?1, ?2, ?3, ?4)"),
                params![record.id(), field, value.to_sql_text(), value.to_sql_num()],
            )?;
        }
        tx.commit()?;
        debug!(collection, id = record.id(), "record written");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        let collection = T::collection_name();
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                &format!("SELECT data FROM {collection} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn require(&self, id: &str) -> Result<T, StoreError> {
        self.get(id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let collection = T::collection_name();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {collection} WHERE id = ?1"), params![id])?;
        tx.execute(
            &format!("DELETE FROM {collection}_index WHERE id = ?1"),
            params![id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_all(&self) -> Result<Vec<T>, StoreError> {
        self.list(&[])
    }

    /// List records matching every filter (AND semantics).
    ///
    /// Each filter narrows the id set via the index table; the final id set
    /// is then hydrated from the main table. Filtering on a field a record
    /// never indexed simply yields no matches for that filter.
    pub fn list(&self, filters: &[Filter]) -> Result<Vec<T>, StoreError> {
        let collection = T::collection_name();
        let conn = self.lock()?;

        let mut clauses = Vec::new();
        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        for (i, filter) in filters.iter().enumerate() {
            let alias = format!("f{i}");
            let column = if filter.value.to_sql_num().is_some() { "num_value" } else { "value" };
            clauses.push(format!(
                "INNER JOIN {collection}_index {alias} ON {alias}.id = base.id
                 AND {alias}.field = ?{} AND {alias}.{column} {} ?{}",
                bind.len() + 1,
                filter.op.to_sql(),
                bind.len() + 2,
            ));
            bind.push(Box::new(filter.field.clone()));
            match filter.value.to_sql_num() {
                Some(n) => bind.push(Box::new(n)),
                None => bind.push(Box::new(filter.value.to_sql_text())),
            }
        }

        let sql = format!(
            "SELECT base.data FROM {collection} base {} ORDER BY base.updated_at ASC",
            clauses.join(" ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params.as_slice(), |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn count(&self, filters: &[Filter]) -> Result<usize, StoreError> {
        Ok(self.list(filters)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::IndexValue;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Widget {
        id: String,
        updated_at: i64,
        status: String,
        count: i64,
    }

    impl Record for Widget {
        fn id(&self) -> &str {
            &self.id
        }
        fn updated_at(&self) -> i64 {
            self.updated_at
        }
        fn collection_name() -> &'static str {
            "widgets"
        }
        fn indexed_fields(&self) -> HashMap<String, IndexValue> {
            let mut m = HashMap::new();
            m.insert("status".to_string(), IndexValue::String(self.status.clone()));
            m.insert("count".to_string(), IndexValue::Int(self.count));
            m
        }
    }

    fn widget(id: &str, status: &str, count: i64) -> Widget {
        Widget {
            id: id.to_string(),
            updated_at: 1,
            status: status.to_string(),
            count,
        }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let store: Store<Widget> = Store::open_in_memory().unwrap();
        let w = widget("a", "pending", 1);
        store.put(&w).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(w));
    }

    #[test]
    fn get_missing_is_none() {
        let store: Store<Widget> = Store::open_in_memory().unwrap();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn require_missing_errors() {
        let store: Store<Widget> = Store::open_in_memory().unwrap();
        assert!(matches!(store.require("missing"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn put_is_upsert() {
        let store: Store<Widget> = Store::open_in_memory().unwrap();
        store.put(&widget("a", "pending", 1)).unwrap();
        store.put(&widget("a", "done", 2)).unwrap();
        let got = store.get("a").unwrap().unwrap();
        assert_eq!(got.status, "done");
        assert_eq!(got.count, 2);
    }

    #[test]
    fn list_filters_by_equality() {
        let store: Store<Widget> = Store::open_in_memory().unwrap();
        store.put(&widget("a", "pending", 1)).unwrap();
        store.put(&widget("b", "done", 2)).unwrap();
        store.put(&widget("c", "pending", 3)).unwrap();
        let pending = store.list(&[Filter::eq("status", "pending")]).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|w| w.status == "pending"));
    }

    #[test]
    fn list_filters_conjunctively() {
        let store: Store<Widget> = Store::open_in_memory().unwrap();
        store.put(&widget("a", "pending", 1)).unwrap();
        store.put(&widget("b", "pending", 2)).unwrap();
        let matches = store
            .list(&[Filter::eq("status", "pending"), Filter::new("count", crate::FilterOp::Ge, 2)])
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "b");
    }

    #[test]
    fn numeric_filters_compare_by_value_not_lexically() {
        let store: Store<Widget> = Store::open_in_memory().unwrap();
        store.put(&widget("a", "x", 2)).unwrap();
        store.put(&widget("b", "x", 10)).unwrap();
        let matches = store.list(&[Filter::new("count", crate::FilterOp::Gt, 9)]).unwrap();
        assert_eq!(matches.iter().map(|w| w.id.clone()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn delete_removes_record_and_index_rows() {
        let store: Store<Widget> = Store::open_in_memory().unwrap();
        store.put(&widget("a", "pending", 1)).unwrap();
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.list(&[Filter::eq("status", "pending")]).unwrap().len(), 0);
    }

    #[test]
    fn list_all_orders_by_updated_at() {
        let store: Store<Widget> = Store::open_in_memory().unwrap();
        store
            .put(&Widget {
                id: "a".into(),
                updated_at: 5,
                status: "x".into(),
                count: 1,
            })
            .unwrap();
        store
            .put(&Widget {
                id: "b".into(),
                updated_at: 1,
                status: "x".into(),
                count: 1,
            })
            .unwrap();
        let all = store.list_all().unwrap();
        assert_eq!(all.iter().map(|w| w.id.clone()).collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn count_matches_list_len() {
        let store: Store<Widget> = Store::open_in_memory().unwrap();
        store.put(&widget("a", "pending", 1)).unwrap();
        store.put(&widget("b", "done", 2)).unwrap();
        assert_eq!(store.count(&[Filter::eq("status", "pending")]).unwrap(), 1);
    }
}
