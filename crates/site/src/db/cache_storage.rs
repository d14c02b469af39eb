//! Named response caches backed by sqlite.
//!
//! Mirrors the browser's cache storage model: a set of named caches, each a
//! map from request URL to a stored response. Entries are never evicted
//! automatically; only deleting a cache (or all caches) removes them.

use axum::body::Bytes;
use axum::http::StatusCode;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use atelier_core::CacheStatus;

use super::RepositoryError;
use crate::offline::response::{StoredResponse, content_length};

#[derive(sqlx::FromRow)]
struct EntryRow {
    status: i64,
    headers: String,
    body: Vec<u8>,
}

impl TryFrom<EntryRow> for StoredResponse {
    type Error = RepositoryError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let status = u16::try_from(row.status)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!("invalid stored status {}", row.status))
            })?;
        let pairs: Vec<(String, String)> = serde_json::from_str(&row.headers)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid stored headers: {e}")))?;

        Ok(Self {
            status,
            headers: Self::headers_from_pairs(&pairs),
            body: Bytes::from(row.body),
        })
    }
}

/// Durable named caches shared by the cache worker, the interceptor and the controller.
///
/// Cheap to clone; all clones share the same pool.
#[derive(Clone)]
pub struct CacheStorage {
    pool: SqlitePool,
}

impl CacheStorage {
    /// Create storage over a migrated pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the named cache if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn open(&self, name: &str) -> Result<(), RepositoryError> {
        sqlx::query("INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Names of every existing cache, sorted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn names(&self) -> Result<Vec<String>, RepositoryError> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM caches ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    /// Store a response under `url` in the named cache, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the headers cannot be encoded or the write fails.
    #[instrument(skip(self, response), fields(bytes = response.body.len()))]
    pub async fn put(
        &self,
        name: &str,
        url: &str,
        response: &StoredResponse,
    ) -> Result<(), RepositoryError> {
        let headers = serde_json::to_string(&response.header_pairs())
            .map_err(|e| RepositoryError::DataCorruption(format!("unencodable headers: {e}")))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO cache_entries (cache_name, url, status, headers, body, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(name)
        .bind(url)
        .bind(i64::from(response.status.as_u16()))
        .bind(headers)
        .bind(response.body.as_ref())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Stored cache entry");
        Ok(())
    }

    /// Look up `url` in one named cache.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or the entry is corrupt.
    pub async fn match_in(
        &self,
        name: &str,
        url: &str,
    ) -> Result<Option<StoredResponse>, RepositoryError> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT status, headers, body FROM cache_entries WHERE cache_name = ?1 AND url = ?2",
        )
        .bind(name)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredResponse::try_from).transpose()
    }

    /// Look up `url` in every cache, in cache-name order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or the entry is corrupt.
    pub async fn match_any(&self, url: &str) -> Result<Option<StoredResponse>, RepositoryError> {
        let row = sqlx::query_as::<_, EntryRow>(
            r"
            SELECT status, headers, body FROM cache_entries
            WHERE url = ?1
            ORDER BY cache_name
            LIMIT 1
            ",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredResponse::try_from).transpose()
    }

    /// URLs stored in the named cache.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn keys(&self, name: &str) -> Result<Vec<String>, RepositoryError> {
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT url FROM cache_entries WHERE cache_name = ?1 ORDER BY url",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    /// Delete a named cache and its entries. Returns whether the cache existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cache_entries WHERE cache_name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM caches WHERE name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed > 0)
    }

    /// Delete every named cache. Returns the number of caches removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a deletion fails.
    pub async fn delete_all(&self) -> Result<usize, RepositoryError> {
        let mut removed = 0;
        for name in self.names().await? {
            if self.delete(&name).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Entry count and total `content-length` across every cache.
    ///
    /// Entries without a `content-length` header add nothing to the size.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or stored headers are corrupt.
    pub async fn status(&self) -> Result<CacheStatus, RepositoryError> {
        let headers = sqlx::query_scalar::<_, String>("SELECT headers FROM cache_entries")
            .fetch_all(&self.pool)
            .await?;

        let mut total_size = 0u64;
        for raw in &headers {
            let pairs: Vec<(String, String)> = serde_json::from_str(raw).map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid stored headers: {e}"))
            })?;
            total_size += content_length(&StoredResponse::headers_from_pairs(&pairs)).unwrap_or(0);
        }

        Ok(CacheStatus::new(headers.len() as u64, total_size))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{HeaderValue, header};

    use super::*;
    use crate::db::create_memory_pool;

    fn response(body: &'static str, length: Option<&'static str>) -> StoredResponse {
        let mut response = StoredResponse::new(StatusCode::OK, "image/jpeg", body);
        if let Some(length) = length {
            response
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from_static(length));
        }
        response
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let storage = CacheStorage::new(create_memory_pool().await.unwrap());

        storage
            .put("media-v1", "http://site.test/a.jpg", &response("jpeg", None))
            .await
            .unwrap();

        let hit = storage
            .match_in("media-v1", "http://site.test/a.jpg")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body.as_ref(), b"jpeg");
        assert_eq!(hit.content_type(), Some("image/jpeg"));

        assert!(storage.match_in("pages-v1", "http://site.test/a.jpg").await.unwrap().is_none());
        assert!(storage.match_any("http://site.test/a.jpg").await.unwrap().is_some());
        assert_eq!(storage.names().await.unwrap(), vec!["media-v1"]);
    }

    #[tokio::test]
    async fn test_status_sums_content_length() {
        let storage = CacheStorage::new(create_memory_pool().await.unwrap());

        storage.put("pages-v1", "/a", &response("aaaa", Some("4"))).await.unwrap();
        storage.put("media-v1", "/b", &response("bbbbbb", Some("6"))).await.unwrap();
        storage.put("media-v1", "/c", &response("no length", None)).await.unwrap();

        let status = storage.status().await.unwrap();
        assert_eq!(status.file_count, 3);
        assert_eq!(status.total_size, 10);
        assert_eq!(status.formatted_size, "10 B");
    }

    #[tokio::test]
    async fn test_delete_all_empties_storage() {
        let storage = CacheStorage::new(create_memory_pool().await.unwrap());

        storage.open("pages-v1").await.unwrap();
        storage.put("media-v1", "/b", &response("b", None)).await.unwrap();

        assert_eq!(storage.delete_all().await.unwrap(), 2);
        assert!(storage.names().await.unwrap().is_empty());
        assert_eq!(storage.status().await.unwrap().file_count, 0);
        assert!(!storage.delete("media-v1").await.unwrap());
    }
}
