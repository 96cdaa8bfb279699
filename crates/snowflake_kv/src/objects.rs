//! Object operations: put, get, update, delete and their bulk forms.

use crate::error::{KvError, Result};
use crate::types::{Encoded, KeyRecord, OnConflict, TypeTag};
use crate::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use tracing::debug;

/// SQLite caps bound parameters per statement; stay well below it.
const MAX_KEYS_PER_QUERY: usize = 500;

const UPSERT_SQL: &str = r#"
    INSERT INTO kv_records (key, type_tag, payload, updated_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET
        type_tag = excluded.type_tag,
        payload = excluded.payload,
        updated_at = excluded.updated_at
"#;

const INSERT_IGNORE_SQL: &str = r#"
    INSERT INTO kv_records (key, type_tag, payload, updated_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(key) DO NOTHING
"#;

const UPDATE_SQL: &str =
    "UPDATE kv_records SET type_tag = ?, payload = ?, updated_at = ? WHERE key = ?";

#[derive(sqlx::FromRow)]
struct KeyRow {
    key: String,
    type_tag: String,
    payload: String,
    updated_at: i64,
}

impl TryFrom<KeyRow> for KeyRecord {
    type Error = KvError;

    fn try_from(row: KeyRow) -> Result<Self> {
        let type_tag = TypeTag::parse(&row.type_tag).ok_or_else(|| KvError::InvalidRecord {
            key: row.key.clone(),
            reason: format!("unknown type tag '{}'", row.type_tag),
        })?;
        Ok(KeyRecord {
            key: row.key,
            type_tag,
            payload: row.payload,
            updated_at: row.updated_at,
        })
    }
}

impl KeyValueStore {
    // ========================================================================
    // Writes
    // ========================================================================

    /// Store `value` under `key`, replacing any existing entry.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.put_with(key, value, OnConflict::Replace).await?;
        Ok(())
    }

    /// Store `value` under `key` with an explicit conflict policy.
    ///
    /// Returns `false` when [`OnConflict::Ignore`] kept an existing entry.
    pub async fn put_with<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        on_conflict: OnConflict,
    ) -> Result<bool> {
        let encoded = Encoded::new(key, value)?;
        let mut conn = self.pool.acquire().await?;
        let written = insert_encoded(&mut conn, &encoded, on_conflict, Self::now_millis()).await? > 0;
        debug!(key, ?on_conflict, written, "put");
        Ok(written)
    }

    /// Store many entries atomically, replacing existing ones.
    pub async fn put_many<K, V, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        self.put_many_with(entries, OnConflict::Replace).await
    }

    /// Store many entries in one transaction.
    ///
    /// The conflict policy is applied per key. Either every non-conflicting
    /// entry is written or none is. Returns the number of entries written.
    pub async fn put_many_with<K, V, I>(&self, entries: I, on_conflict: OnConflict) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        let encoded = encode_all(entries)?;
        if encoded.is_empty() {
            return Ok(0);
        }

        let now = Self::now_millis();
        let mut tx = self.pool.begin().await?;
        let mut written = 0usize;
        for entry in &encoded {
            written += insert_encoded(&mut tx, entry, on_conflict, now).await? as usize;
        }
        tx.commit().await?;

        debug!(count = encoded.len(), written, ?on_conflict, "put_many");
        Ok(written)
    }

    /// Overwrite `key` only if it already exists.
    ///
    /// Returns `false` (and writes nothing) when the key is absent.
    pub async fn update<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<bool> {
        let encoded = Encoded::new(key, value)?;
        let mut conn = self.pool.acquire().await?;
        let updated = update_encoded(&mut conn, &encoded, Self::now_millis()).await? > 0;
        debug!(key, updated, "update");
        Ok(updated)
    }

    /// Overwrite every existing key among `entries` in one transaction.
    ///
    /// Absent keys are skipped. Returns the number of entries updated.
    pub async fn update_many<K, V, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        let encoded = encode_all(entries)?;
        if encoded.is_empty() {
            return Ok(0);
        }

        let now = Self::now_millis();
        let mut tx = self.pool.begin().await?;
        let mut updated = 0usize;
        for entry in &encoded {
            updated += update_encoded(&mut tx, entry, now).await? as usize;
        }
        tx.commit().await?;

        debug!(count = encoded.len(), updated, "update_many");
        Ok(updated)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Raw record for `key`, if present.
    pub async fn get_record(&self, key: &str) -> Result<Option<KeyRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, key).await
    }

    /// Read `key` as `T`. `None` when the key is absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_record(key).await? {
            Some(record) => record.decode().map(Some),
            None => Ok(None),
        }
    }

    /// Read every present key among `keys` as `T`.
    ///
    /// Results follow the order of `keys`; absent keys are left out.
    pub async fn get_many<T, K>(&self, keys: &[K]) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        let records = self.get_records(keys).await?;
        decode_in_order(keys, &records)
    }

    /// Raw records for every present key among `keys`.
    pub async fn get_records<K: AsRef<str>>(&self, keys: &[K]) -> Result<HashMap<String, KeyRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_records(&mut conn, keys).await
    }

    /// Whether `key` is present.
    pub async fn contains(&self, key: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        key_exists(&mut conn, key).await
    }

    /// All keys starting with `prefix`, sorted.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        select_keys(&mut conn, prefix).await
    }

    // ========================================================================
    // Deletes
    // ========================================================================

    /// Remove `key`. Removing an absent key is a no-op.
    pub async fn delete(&self, key: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let removed = delete_keys(&mut conn, &[key]).await?;
        debug!(key, removed, "delete");
        Ok(removed)
    }

    /// Remove every key in `keys` in one transaction. Absent keys are skipped.
    pub async fn delete_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let removed = delete_keys(&mut tx, keys).await?;
        tx.commit().await?;

        debug!(count = keys.len(), removed, "delete_many");
        Ok(removed)
    }
}

// ============================================================================
// Statements shared by pool calls and transactions
// ============================================================================

pub(crate) async fn insert_encoded(
    conn: &mut SqliteConnection,
    entry: &Encoded,
    on_conflict: OnConflict,
    now: i64,
) -> Result<u64> {
    let result = sqlx::query(insert_sql(on_conflict))
        .bind(&entry.key)
        .bind(entry.type_tag.as_str())
        .bind(&entry.payload)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn update_encoded(conn: &mut SqliteConnection, entry: &Encoded, now: i64) -> Result<u64> {
    let result = sqlx::query(UPDATE_SQL)
        .bind(entry.type_tag.as_str())
        .bind(&entry.payload)
        .bind(now)
        .bind(&entry.key)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn fetch_record(conn: &mut SqliteConnection, key: &str) -> Result<Option<KeyRecord>> {
    let row: Option<KeyRow> =
        sqlx::query_as("SELECT key, type_tag, payload, updated_at FROM kv_records WHERE key = ?")
            .bind(key)
            .fetch_optional(conn)
            .await?;

    row.map(KeyRecord::try_from).transpose()
}

pub(crate) async fn fetch_records<K: AsRef<str>>(
    conn: &mut SqliteConnection,
    keys: &[K],
) -> Result<HashMap<String, KeyRecord>> {
    let mut records = HashMap::with_capacity(keys.len());
    for chunk in keys.chunks(MAX_KEYS_PER_QUERY) {
        let sql = format!(
            "SELECT key, type_tag, payload, updated_at FROM kv_records WHERE key IN ({})",
            placeholders(chunk.len())
        );
        let mut query = sqlx::query_as::<_, KeyRow>(&sql);
        for key in chunk {
            query = query.bind(key.as_ref());
        }
        for row in query.fetch_all(&mut *conn).await? {
            let record = KeyRecord::try_from(row)?;
            records.insert(record.key.clone(), record);
        }
    }
    Ok(records)
}

pub(crate) fn decode_in_order<T, K>(keys: &[K], records: &HashMap<String, KeyRecord>) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    K: AsRef<str>,
{
    let mut values = Vec::with_capacity(records.len());
    for key in keys {
        if let Some(record) = records.get(key.as_ref()) {
            values.push(record.decode()?);
        }
    }
    Ok(values)
}

pub(crate) async fn key_exists(conn: &mut SqliteConnection, key: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_records WHERE key = ?")
        .bind(key)
        .fetch_one(conn)
        .await?;
    Ok(count > 0)
}

pub(crate) async fn select_keys(conn: &mut SqliteConnection, prefix: &str) -> Result<Vec<String>> {
    let keys: Vec<String> =
        sqlx::query_scalar("SELECT key FROM kv_records WHERE substr(key, 1, ?) = ? ORDER BY key")
            .bind(prefix.chars().count() as i64)
            .bind(prefix)
            .fetch_all(conn)
            .await?;
    Ok(keys)
}

pub(crate) async fn delete_keys<K: AsRef<str>>(conn: &mut SqliteConnection, keys: &[K]) -> Result<u64> {
    let mut removed = 0u64;
    for chunk in keys.chunks(MAX_KEYS_PER_QUERY) {
        let sql = format!("DELETE FROM kv_records WHERE key IN ({})", placeholders(chunk.len()));
        let mut query = sqlx::query(&sql);
        for key in chunk {
            query = query.bind(key.as_ref());
        }
        removed += query.execute(&mut *conn).await?.rows_affected();
    }
    Ok(removed)
}

fn insert_sql(on_conflict: OnConflict) -> &'static str {
    match on_conflict {
        OnConflict::Replace => UPSERT_SQL,
        OnConflict::Ignore => INSERT_IGNORE_SQL,
    }
}

pub(crate) fn encode_all<K, V, I>(entries: I) -> Result<Vec<Encoded>>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Serialize,
{
    entries
        .into_iter()
        .map(|(key, value)| Encoded::new(key, &value))
        .collect()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
