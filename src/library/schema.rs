//! Database schema definitions and migrations.

use rusqlite::Connection;

use super::error::StoreError;

/// Current schema version. Increment when making schema changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Schema DDL for version 1.
///
/// The album columns keep the names used by earlier versions of the app
/// (`album` for the title) so an existing database file can be reused.
const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bandcamp_id TEXT NOT NULL,
    bandcamp_band_id TEXT NOT NULL,
    album TEXT NOT NULL,
    artist TEXT NOT NULL,
    url TEXT NOT NULL,
    thumbnail_url TEXT,
    artwork_url TEXT,
    purchased INTEGER NOT NULL DEFAULT 0,
    rating INTEGER NOT NULL DEFAULT -1 CHECK (rating BETWEEN -1 AND 10),
    comment TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS bandcamp_id_idx ON albums(bandcamp_id);
CREATE INDEX IF NOT EXISTS idx_albums_purchased ON albums(purchased);

CREATE TABLE IF NOT EXISTS config (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_refresh INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO config (id, last_refresh) VALUES (1, 0);
"#;

/// Schema version stored in `PRAGMA user_version`.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the library schema up to [`SCHEMA_VERSION`]. A no-op on an
/// up-to-date file; refuses files written by a newer build.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let found = get_schema_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            found,
            expected: SCHEMA_VERSION,
        });
    }
    for version in (found + 1)..=SCHEMA_VERSION {
        migrate_to_version(conn, version)?;
    }
    Ok(())
}

fn migrate_to_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    match version {
        1 => conn.execute_batch(SCHEMA_V1)?,
        other => {
            tracing::warn!(version = other, "No migration registered for schema version");
        }
    }
    conn.pragma_update(None, "user_version", version)?;
    tracing::debug!(version, "Album library schema migrated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_migrate_sets_version_and_is_repeatable() {
        let conn = migrated();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_file_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        assert!(matches!(
            migrate(&conn),
            Err(StoreError::UnsupportedSchemaVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn test_config_singleton_seeded() {
        let conn = migrated();
        let (rows, last): (i64, i64) = conn
            .query_row("SELECT COUNT(*), MAX(last_refresh) FROM config", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(last, 0);
    }

    #[test]
    fn test_bandcamp_id_unique() {
        let conn = migrated();
        let insert = "INSERT INTO albums (bandcamp_id, bandcamp_band_id, album, artist, url, created_at, updated_at) VALUES ('1', '2', 'a', 'b', 'c', 0, 0)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }

    #[test]
    fn test_rating_check_constraint() {
        let conn = migrated();
        let result = conn.execute(
            "INSERT INTO albums (bandcamp_id, bandcamp_band_id, album, artist, url, rating, created_at, updated_at) VALUES ('1', '2', 'a', 'b', 'c', 11, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
