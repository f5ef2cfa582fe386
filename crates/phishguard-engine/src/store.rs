//! SQLite-backed local state: the TTL result cache and the domain denylist.
//!
//! Both tables live in the same database file but each store owns its own
//! connection. Upserts and denylist refreshes run inside transactions so
//! concurrent readers never observe a half-written row or a partially
//! cleared set.

use parking_lot::Mutex;
use phishguard_core::{CacheEntry, Error, Result, CACHE_TTL_MS};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// How long a writer waits on a lock held by the other connection before
/// giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn store_err(e: rusqlite::Error) -> Error {
    Error::store(e.to_string())
}

/// Both stores open their own connection on the same database file. WAL
/// plus a busy timeout lets a write on one connection wait out a
/// transaction held on the other instead of failing with SQLITE_BUSY.
fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT).map_err(store_err)?;
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
        .map_err(store_err)?;
    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// TTL-based result cache keyed by URL.
///
/// `get` treats entries older than the TTL as absent but does not delete
/// them; deletion is [`Self::evict_expired`]'s job, intended for a periodic
/// sweep rather than every lookup.
pub struct ResultCache {
    conn: Mutex<Connection>,
}

impl ResultCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS url_cache (
                url          TEXT PRIMARY KEY,
                is_phishing  INTEGER NOT NULL,
                score        REAL NOT NULL,
                last_checked INTEGER NOT NULL
            );",
        )
        .map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Return the cached entry for `url` if it is still within the TTL.
    pub fn get(&self, url: &str) -> Result<Option<CacheEntry>> {
        self.get_at(url, now_ms())
    }

    /// TTL check against an explicit clock, for sweeps and tests.
    pub fn get_at(&self, url: &str, now_ms: i64) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                "SELECT url, is_phishing, score, last_checked FROM url_cache WHERE url = ?1",
                params![url],
                |row| {
                    Ok(CacheEntry {
                        url: row.get(0)?,
                        is_phishing: row.get(1)?,
                        score: row.get(2)?,
                        last_checked_ms: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(store_err)?;
        Ok(entry.filter(|e| e.is_fresh_at(now_ms)))
    }

    /// Upsert by URL, overwriting any prior value and timestamp.
    pub fn put(&self, url: &str, is_phishing: bool, score: f32) -> Result<()> {
        self.put_at(url, is_phishing, score, now_ms())
    }

    pub fn put_at(&self, url: &str, is_phishing: bool, score: f32, now_ms: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO url_cache (url, is_phishing, score, last_checked)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url) DO UPDATE SET
                 is_phishing = excluded.is_phishing,
                 score = excluded.score,
                 last_checked = excluded.last_checked",
            params![url, is_phishing, score, now_ms],
        )
        .map_err(store_err)?;
        debug!("cached result for {} (phishing={})", url, is_phishing);
        Ok(())
    }

    /// Bulk-delete entries past the TTL. Returns the number removed.
    pub fn evict_expired(&self) -> Result<usize> {
        self.evict_expired_at(now_ms())
    }

    pub fn evict_expired_at(&self, now_ms: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM url_cache WHERE last_checked < ?1",
                params![now_ms - CACHE_TTL_MS],
            )
            .map_err(store_err)?;
        if removed > 0 {
            info!("evicted {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Total rows, including expired-but-unswept ones.
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM url_cache", [], |row| row.get(0))
            .map(|n: i64| n as usize)
            .map_err(store_err)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Local set of known-phishing domains.
///
/// `refresh` is a full replace: clear then bulk insert, inside one
/// transaction so readers never see a partially cleared set.
pub struct DomainDenylist {
    conn: Mutex<Connection>,
}

impl DomainDenylist {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS denylist (
                domain     TEXT PRIMARY KEY,
                updated_at INTEGER NOT NULL
            );",
        )
        .map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Replace the entire set with `domains`. Duplicates in the input are
    /// ignored, not merged. Returns the number of rows inserted.
    pub fn refresh<I, S>(&self, domains: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(store_err)?;
        tx.execute("DELETE FROM denylist", []).map_err(store_err)?;

        let now = now_ms();
        let mut inserted = 0usize;
        {
            let mut stmt = tx
                .prepare("INSERT OR IGNORE INTO denylist (domain, updated_at) VALUES (?1, ?2)")
                .map_err(store_err)?;
            for domain in domains {
                inserted += stmt
                    .execute(params![domain.as_ref(), now])
                    .map_err(store_err)?;
            }
        }
        tx.commit().map_err(store_err)?;

        info!("denylist refreshed with {} domains", inserted);
        Ok(inserted)
    }

    /// Exact-match lookup on a host string.
    pub fn is_denied(&self, domain: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM denylist WHERE domain = ?1)",
            params![domain],
            |row| row.get(0),
        )
        .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_put_get_round_trip() {
        let cache = ResultCache::open_in_memory().unwrap();
        cache.put("http://a.example/", true, 0.87).unwrap();

        let entry = cache.get("http://a.example/").unwrap().unwrap();
        assert!(entry.is_phishing);
        assert_eq!(entry.score, 0.87);
    }

    #[test]
    fn test_cache_upsert_overwrites() {
        let cache = ResultCache::open_in_memory().unwrap();
        cache.put_at("http://a.example/", true, 0.9, 1_000).unwrap();
        cache.put_at("http://a.example/", false, 0.2, 2_000).unwrap();

        assert_eq!(cache.len().unwrap(), 1);
        let entry = cache.get_at("http://a.example/", 2_000).unwrap().unwrap();
        assert!(!entry.is_phishing);
        assert_eq!(entry.last_checked_ms, 2_000);
    }

    #[test]
    fn test_cache_ttl_boundary() {
        let cache = ResultCache::open_in_memory().unwrap();
        cache.put_at("http://a.example/", false, 0.1, 0).unwrap();

        assert!(cache
            .get_at("http://a.example/", CACHE_TTL_MS - 1)
            .unwrap()
            .is_some());
        assert!(cache
            .get_at("http://a.example/", CACHE_TTL_MS + 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_expired_entry_survives_until_sweep() {
        let cache = ResultCache::open_in_memory().unwrap();
        cache.put_at("http://a.example/", false, 0.1, 0).unwrap();
        let later = CACHE_TTL_MS + 10;

        // Invisible to readers, but the row is still there until the sweep.
        assert!(cache.get_at("http://a.example/", later).unwrap().is_none());
        assert_eq!(cache.len().unwrap(), 1);

        assert_eq!(cache.evict_expired_at(later).unwrap(), 1);
        assert_eq!(cache.len().unwrap(), 0);
    }

    #[test]
    fn test_evict_keeps_fresh_entries() {
        let cache = ResultCache::open_in_memory().unwrap();
        cache.put_at("http://old.example/", false, 0.1, 0).unwrap();
        cache
            .put_at("http://new.example/", true, 0.8, CACHE_TTL_MS)
            .unwrap();

        assert_eq!(cache.evict_expired_at(CACHE_TTL_MS + 10).unwrap(), 1);
        assert!(cache
            .get_at("http://new.example/", CACHE_TTL_MS + 10)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_cache_write_waits_out_concurrent_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let cache = ResultCache::open(&path).unwrap();

        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            blocker.execute_batch("COMMIT").unwrap();
        });

        // Must wait for the lock to clear, not fail with SQLITE_BUSY.
        cache.put("http://a.example/", true, 0.9).unwrap();
        handle.join().unwrap();
        assert!(cache.get("http://a.example/").unwrap().is_some());
    }

    #[test]
    fn test_denylist_full_replace() {
        let denylist = DomainDenylist::open_in_memory().unwrap();

        denylist.refresh(["evil.com"]).unwrap();
        assert!(denylist.is_denied("evil.com").unwrap());
        assert!(!denylist.is_denied("good.com").unwrap());

        denylist.refresh(["other.com"]).unwrap();
        assert!(!denylist.is_denied("evil.com").unwrap());
        assert!(denylist.is_denied("other.com").unwrap());
    }

    #[test]
    fn test_denylist_ignores_input_duplicates() {
        let denylist = DomainDenylist::open_in_memory().unwrap();
        let inserted = denylist
            .refresh(["dup.example", "dup.example", "solo.example"])
            .unwrap();
        assert_eq!(inserted, 2);
    }
}
