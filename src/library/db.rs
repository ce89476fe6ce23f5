//! Album store traits and the SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::error::StoreError;
use super::schema;
use super::types::{validate_rating, AlbumPatch, AlbumRecord, LibraryStats, NewAlbum, UNRATED};
use crate::types::AlbumFilter;

/// Album persistence consumed by the sync subsystem.
///
/// Object-safe so it can be shared as `Arc<dyn AlbumStore>` between the
/// sync task and the HTTP handlers.
#[async_trait]
pub trait AlbumStore: Send + Sync {
    /// Look an album up by its Bandcamp id.
    async fn find_by_bandcamp_id(&self, bandcamp_id: &str)
        -> Result<Option<AlbumRecord>, StoreError>;

    /// Insert a freshly scraped album, unrated, with the given purchased flag.
    async fn insert(&self, album: &NewAlbum, purchased: bool) -> Result<AlbumRecord, StoreError>;

    /// Apply a partial update and bump `updated_at`.
    async fn update(&self, id: i64, patch: &AlbumPatch) -> Result<AlbumRecord, StoreError>;

    /// Number of (purchased, wishlist) albums.
    async fn count_by_purchased(&self) -> Result<(u64, u64), StoreError>;

    /// List albums ordered by artist, optionally filtered and searched
    /// (case-insensitive substring over artist and title).
    async fn list(
        &self,
        filter: AlbumFilter,
        search: Option<&str>,
    ) -> Result<Vec<AlbumRecord>, StoreError>;

    /// Aggregate library numbers.
    async fn stats(&self) -> Result<LibraryStats, StoreError>;
}

/// Singleton sync bookkeeping row.
#[async_trait]
pub trait SyncConfigStore: Send + Sync {
    /// Epoch seconds of the last successful sync, 0 if none.
    async fn last_refresh(&self) -> Result<i64, StoreError>;

    async fn set_last_refresh(&self, timestamp: i64) -> Result<(), StoreError>;
}

const ALBUM_COLUMNS: &str = "id, bandcamp_id, bandcamp_band_id, album, artist, url, thumbnail_url, artwork_url, purchased, rating, comment, created_at, updated_at";

/// SQLite-backed library.
pub struct SqliteLibrary {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync. Guards are
    /// never held across an await point.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteLibrary {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Query(format!(
                            "cannot create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }

            let conn = Connection::open(&path_clone).map_err(|e| StoreError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StoreError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StoreError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}

fn get_by_id(conn: &Connection, id: i64) -> Result<Option<AlbumRecord>, StoreError> {
    conn.query_row(
        &format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?1"),
        [id],
        row_to_album,
    )
    .optional()
    .map_err(StoreError::query)
}

fn count(conn: &Connection, sql: &str) -> Result<u64, StoreError> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|n| n as u64)
        .map_err(StoreError::query)
}

#[async_trait]
impl AlbumStore for SqliteLibrary {
    async fn find_by_bandcamp_id(
        &self,
        bandcamp_id: &str,
    ) -> Result<Option<AlbumRecord>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE bandcamp_id = ?1"),
            [bandcamp_id],
            row_to_album,
        )
        .optional()
        .map_err(StoreError::query)
    }

    async fn insert(&self, album: &NewAlbum, purchased: bool) -> Result<AlbumRecord, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO albums (bandcamp_id, bandcamp_band_id, album, artist, url, thumbnail_url, artwork_url, purchased, rating, comment, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                &album.bandcamp_id,
                &album.bandcamp_band_id,
                &album.title,
                &album.artist,
                &album.url,
                &album.thumbnail_url,
                &album.artwork_url,
                purchased,
                UNRATED,
                &album.comment,
                album.created_at,
                album.updated_at,
            ],
        )
        .map_err(StoreError::query)?;

        Ok(AlbumRecord {
            id: conn.last_insert_rowid(),
            bandcamp_id: album.bandcamp_id.clone(),
            bandcamp_band_id: album.bandcamp_band_id.clone(),
            title: album.title.clone(),
            artist: album.artist.clone(),
            url: album.url.clone(),
            thumbnail_url: album.thumbnail_url.clone(),
            artwork_url: album.artwork_url.clone(),
            purchased,
            rating: UNRATED,
            comment: album.comment.clone(),
            created_at: album.created_at,
            updated_at: album.updated_at,
        })
    }

    async fn update(&self, id: i64, patch: &AlbumPatch) -> Result<AlbumRecord, StoreError> {
        if let Some(rating) = patch.rating {
            validate_rating(rating)?;
        }

        let conn = self.lock()?;
        let rows = conn
            .execute(
                r#"
                UPDATE albums SET
                    purchased = COALESCE(?1, purchased),
                    rating = COALESCE(?2, rating),
                    comment = COALESCE(?3, comment),
                    updated_at = ?4
                WHERE id = ?5
                "#,
                params![
                    patch.purchased,
                    patch.rating,
                    &patch.comment,
                    Utc::now().timestamp(),
                    id
                ],
            )
            .map_err(StoreError::query)?;

        if rows == 0 {
            return Err(StoreError::NotFound(id));
        }
        get_by_id(&conn, id)?.ok_or(StoreError::NotFound(id))
    }

    async fn count_by_purchased(&self) -> Result<(u64, u64), StoreError> {
        let conn = self.lock()?;
        let purchased = count(&conn, "SELECT COUNT(*) FROM albums WHERE purchased = 1")?;
        let wishlist = count(&conn, "SELECT COUNT(*) FROM albums WHERE purchased = 0")?;
        Ok((purchased, wishlist))
    }

    async fn list(
        &self,
        filter: AlbumFilter,
        search: Option<&str>,
    ) -> Result<Vec<AlbumRecord>, StoreError> {
        let purchased_clause = match filter {
            AlbumFilter::All => "",
            AlbumFilter::Purchased => " AND purchased = 1",
            AlbumFilter::Wishlist => " AND purchased = 0",
        };
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));

        let sql = format!(
            "SELECT {ALBUM_COLUMNS} FROM albums WHERE (?1 IS NULL OR artist LIKE ?1 OR album LIKE ?1){purchased_clause} ORDER BY artist COLLATE NOCASE ASC, album COLLATE NOCASE ASC"
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(StoreError::query)?;
        let albums = stmt
            .query_map([pattern], row_to_album)
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;
        Ok(albums)
    }

    async fn stats(&self) -> Result<LibraryStats, StoreError> {
        let conn = self.lock()?;
        let total = count(&conn, "SELECT COUNT(*) FROM albums")?;
        let purchased = count(&conn, "SELECT COUNT(*) FROM albums WHERE purchased = 1")?;
        let rated = count(&conn, "SELECT COUNT(*) FROM albums WHERE rating >= 0")?;
        let average_rating: Option<f64> = conn
            .query_row(
                "SELECT AVG(rating) FROM albums WHERE rating >= 0",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::query)?;

        Ok(LibraryStats {
            total,
            purchased,
            wishlist: total - purchased,
            rated,
            average_rating,
        })
    }
}

#[async_trait]
impl SyncConfigStore for SqliteLibrary {
    async fn last_refresh(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let last: Option<i64> = conn
            .query_row("SELECT last_refresh FROM config WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::query)?;
        Ok(last.unwrap_or(0))
    }

    async fn set_last_refresh(&self, timestamp: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO config (id, last_refresh) VALUES (1, ?1)
            ON CONFLICT(id) DO UPDATE SET last_refresh = excluded.last_refresh
            "#,
            [timestamp],
        )
        .map_err(StoreError::query)?;
        Ok(())
    }
}

fn row_to_album(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlbumRecord> {
    Ok(AlbumRecord {
        id: row.get(0)?,
        bandcamp_id: row.get(1)?,
        bandcamp_band_id: row.get(2)?,
        title: row.get(3)?,
        artist: row.get(4)?,
        url: row.get(5)?,
        thumbnail_url: row.get(6)?,
        artwork_url: row.get(7)?,
        purchased: row.get(8)?,
        rating: row.get(9)?,
        comment: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}
