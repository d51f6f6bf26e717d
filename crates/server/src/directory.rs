//! Directory store: authoritative device records
//!
//! One row per identity key. The public key is the only trust anchor;
//! name, endpoint and source address may all change on re-registration
//! (roaming). `last_seen` never moves backwards for a record, which is
//! what makes a replayed older proof unable to revert anything.

use meshdir_common::{now_epoch_secs, Database, DeviceRecord, Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

/// Mutable fields of a registration, as accepted by `upsert`.
#[derive(Debug, Clone)]
pub struct RecordCandidate {
    pub name: String,
    pub public_key: String,
    pub endpoint: String,
    pub source_address: String,
    /// Proof timestamp of the registration; becomes the record's
    /// `last_seen` and is what the rollback check compares.
    pub last_seen: i64,
}

/// SQLite-backed directory of registered devices.
///
/// All reads and writes serialize through the shared connection mutex, so
/// request handlers and the liveness sweeper never race on a record.
#[derive(Clone)]
pub struct DirectoryStore {
    db: Database,
}

impl DirectoryStore {
    /// Wrap a database handle and ensure the schema exists.
    pub fn new(db: Database) -> Result<Self> {
        let store = Self { db };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                public_key TEXT NOT NULL UNIQUE,
                endpoint TEXT NOT NULL,
                source_address TEXT NOT NULL,
                last_seen INTEGER NOT NULL,
                connected INTEGER NOT NULL DEFAULT 1,
                registered_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_devices_address ON devices(source_address);
            CREATE INDEX IF NOT EXISTS idx_devices_last_seen ON devices(last_seen);
            "#,
        )?;

        info!("Directory schema initialized");
        Ok(())
    }

    /// Insert or update the record for the candidate's identity key.
    ///
    /// A new key inserts as connected. An existing key updates mutable
    /// fields only, and is rejected with `RollbackRejected` unless the
    /// candidate's timestamp is strictly newer than the stored `last_seen`.
    pub fn upsert(&self, candidate: &RecordCandidate) -> Result<DeviceRecord> {
        let conn = self.db.connection();
        let conn = conn.lock();

        let existing: Option<(String, i64)> = conn
            .query_row(
                "SELECT id, last_seen FROM devices WHERE public_key = ?1",
                params![candidate.public_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((id, stored)) => {
                if candidate.last_seen <= stored {
                    return Err(Error::RollbackRejected {
                        stored,
                        candidate: candidate.last_seen,
                    });
                }
                conn.execute(
                    "UPDATE devices SET name = ?1, endpoint = ?2, source_address = ?3, last_seen = ?4, connected = 1 WHERE id = ?5",
                    params![
                        candidate.name,
                        candidate.endpoint,
                        candidate.source_address,
                        candidate.last_seen,
                        id
                    ],
                )?;
                debug!(key = %candidate.public_key, "directory record updated");
            }
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO devices (id, name, public_key, endpoint, source_address, last_seen, connected, registered_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
                    params![
                        id,
                        candidate.name,
                        candidate.public_key,
                        candidate.endpoint,
                        candidate.source_address,
                        candidate.last_seen,
                        now_epoch_secs()
                    ],
                )?;
                debug!(key = %candidate.public_key, "directory record created");
            }
        }

        find_by_key_locked(&conn, &candidate.public_key)?.ok_or(Error::UnknownIdentity)
    }

    pub fn find_by_key(&self, public_key: &str) -> Result<Option<DeviceRecord>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        find_by_key_locked(&conn, public_key)
    }

    /// Most recently seen record registered from `address`.
    pub fn find_by_address(&self, address: &str) -> Result<Option<DeviceRecord>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.query_row(
            "SELECT id, name, public_key, endpoint, source_address, last_seen, connected, registered_at \
             FROM devices WHERE source_address = ?1 ORDER BY last_seen DESC LIMIT 1",
            params![address],
            row_to_record,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Full current membership. Order is stable within one call only.
    pub fn list_all(&self) -> Result<Vec<DeviceRecord>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, public_key, endpoint, source_address, last_seen, connected, registered_at \
             FROM devices ORDER BY registered_at, public_key",
        )?;

        let rows = stmt.query_map([], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Refresh `last_seen` for an authenticated interaction and re-mark the
    /// record connected. Guarded by `MAX` so a skewed clock can never move
    /// the value backwards.
    pub fn touch(&self, public_key: &str, now: i64) -> Result<DeviceRecord> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let updated = conn.execute(
            "UPDATE devices SET last_seen = MAX(last_seen, ?1), connected = 1 WHERE public_key = ?2",
            params![now, public_key],
        )?;
        if updated == 0 {
            return Err(Error::UnknownIdentity);
        }
        find_by_key_locked(&conn, public_key)?.ok_or(Error::UnknownIdentity)
    }

    /// Flip records with no authenticated interaction inside `timeout_secs`
    /// from connected to disconnected. Idempotent; never evicts.
    pub fn mark_stale_disconnected(&self, now: i64, timeout_secs: i64) -> Result<usize> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let flipped = conn.execute(
            "UPDATE devices SET connected = 0 WHERE connected = 1 AND ?1 - last_seen > ?2",
            params![now, timeout_secs],
        )?;
        Ok(flipped)
    }
}

fn find_by_key_locked(conn: &Connection, public_key: &str) -> Result<Option<DeviceRecord>> {
    conn.query_row(
        "SELECT id, name, public_key, endpoint, source_address, last_seen, connected, registered_at \
         FROM devices WHERE public_key = ?1",
        params![public_key],
        row_to_record,
    )
    .optional()
    .map_err(Error::from)
}

fn row_to_record(row: &Row) -> rusqlite::Result<DeviceRecord> {
    Ok(DeviceRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        public_key: row.get(2)?,
        endpoint: row.get(3)?,
        source_address: row.get(4)?,
        last_seen: row.get(5)?,
        connected: row.get(6)?,
        registered_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> DirectoryStore {
        DirectoryStore::new(Database::open_memory().unwrap()).unwrap()
    }

    fn candidate(key: &str, last_seen: i64) -> RecordCandidate {
        RecordCandidate {
            name: "dev".to_string(),
            public_key: key.to_string(),
            endpoint: "10.0.0.1:7946".to_string(),
            source_address: "203.0.113.5:50000".to_string(),
            last_seen,
        }
    }

    #[test]
    fn upsert_inserts_connected() {
        let store = test_store();
        let record = store.upsert(&candidate("key-a", 100)).unwrap();
        assert!(record.connected);
        assert_eq!(record.last_seen, 100);
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn one_record_per_key() {
        let store = test_store();
        store.upsert(&candidate("key-a", 100)).unwrap();
        store.upsert(&candidate("key-a", 200)).unwrap();
        store.upsert(&candidate("key-b", 150)).unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 2);
        let mut keys: Vec<_> = all.iter().map(|r| r.public_key.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["key-a", "key-b"]);
    }

    #[test]
    fn replayed_older_timestamp_rejected() {
        let store = test_store();
        store.upsert(&candidate("key-a", 200)).unwrap();

        let err = store.upsert(&candidate("key-a", 100)).unwrap_err();
        assert!(matches!(
            err,
            Error::RollbackRejected {
                stored: 200,
                candidate: 100
            }
        ));
        // Equal timestamps are a rollback too: not strictly newer.
        let err = store.upsert(&candidate("key-a", 200)).unwrap_err();
        assert!(matches!(err, Error::RollbackRejected { .. }));

        // Stored record untouched.
        let record = store.find_by_key("key-a").unwrap().unwrap();
        assert_eq!(record.last_seen, 200);
    }

    #[test]
    fn roaming_updates_mutable_fields_only() {
        let store = test_store();
        let first = store.upsert(&candidate("key-a", 100)).unwrap();

        let mut roamed = candidate("key-a", 200);
        roamed.name = "dev-renamed".to_string();
        roamed.endpoint = "10.9.9.9:7000".to_string();
        roamed.source_address = "198.51.100.7:40000".to_string();
        let updated = store.upsert(&roamed).unwrap();

        assert_eq!(updated.id, first.id);
        assert_eq!(updated.registered_at, first.registered_at);
        assert_eq!(updated.endpoint, "10.9.9.9:7000");
        assert_eq!(updated.name, "dev-renamed");
        assert_eq!(updated.last_seen, 200);
    }

    #[test]
    fn last_seen_is_monotonic_across_upserts_and_touches() {
        let store = test_store();
        let mut high_water = 0;
        for ts in [100, 300, 150, 300, 400] {
            if let Ok(record) = store.upsert(&candidate("key-a", ts)) {
                assert!(record.last_seen > high_water);
                high_water = record.last_seen;
            }
        }
        // touch with an older clock never regresses
        let record = store.touch("key-a", 50).unwrap();
        assert_eq!(record.last_seen, high_water);
    }

    #[test]
    fn touch_unknown_key_fails() {
        let store = test_store();
        let err = store.touch("missing", 100).unwrap_err();
        assert!(matches!(err, Error::UnknownIdentity));
    }

    #[test]
    fn find_by_address_returns_most_recent() {
        let store = test_store();
        store.upsert(&candidate("key-a", 100)).unwrap();
        store.upsert(&candidate("key-b", 200)).unwrap();

        let record = store
            .find_by_address("203.0.113.5:50000")
            .unwrap()
            .unwrap();
        assert_eq!(record.public_key, "key-b");
        assert!(store.find_by_address("unseen:1").unwrap().is_none());
    }

    #[test]
    fn sweep_flips_stale_and_is_idempotent() {
        let store = test_store();
        store.upsert(&candidate("key-a", 100)).unwrap();
        store.upsert(&candidate("key-b", 125)).unwrap();

        // key-a is 31s stale, key-b only 6s.
        let flipped = store.mark_stale_disconnected(131, 30).unwrap();
        assert_eq!(flipped, 1);
        assert!(!store.find_by_key("key-a").unwrap().unwrap().connected);
        assert!(store.find_by_key("key-b").unwrap().unwrap().connected);

        // No new activity: a second sweep changes nothing.
        let flipped = store.mark_stale_disconnected(131, 30).unwrap();
        assert_eq!(flipped, 0);
    }

    #[test]
    fn authenticated_interaction_reconnects_swept_record() {
        let store = test_store();
        store.upsert(&candidate("key-a", 0)).unwrap();

        store.mark_stale_disconnected(31, 30).unwrap();
        let record = store.find_by_key("key-a").unwrap().unwrap();
        assert!(!record.connected);
        assert!(!record.is_live(31, 30));

        let record = store.touch("key-a", 32).unwrap();
        assert!(record.connected);
        assert_eq!(record.last_seen, 32);
        assert!(record.is_live(32, 30));
    }
}
