use crate::clock::{Clock, SystemClock};
use crate::record::{parse_records, render_records, Record};
use crate::{CacheError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3_600);

const TMP_SUFFIX: &str = ".tmp";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Decoded collection plus the number of lines that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<R> {
    pub records: Vec<R>,
    pub malformed: usize,
}

/// Directory of cache entries, one file per key.
///
/// Freshness is the entry's modification time compared against the injected
/// clock. Missing and zero-byte entries read as "no data".
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(dir: impl AsRef<Path>, ttl: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ttl,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }

    /// Modification time of a non-empty entry.
    pub async fn last_write(&self, key: &str) -> Option<SystemTime> {
        let path = self.path_for(key).ok()?;
        let meta = fs::metadata(&path).await.ok()?;
        if !meta.is_file() || meta.len() == 0 {
            return None;
        }
        meta.modified().ok()
    }

    pub async fn age(&self, key: &str) -> Option<Duration> {
        let written = self.last_write(key).await?;
        // An mtime ahead of the clock counts as just written.
        Some(
            self.clock
                .now()
                .duration_since(written)
                .unwrap_or(Duration::ZERO),
        )
    }

    /// True while `now - last_write <= ttl`.
    pub async fn is_fresh(&self, key: &str) -> bool {
        match self.age(key).await {
            Some(age) => age <= self.ttl,
            None => false,
        }
    }

    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the entry through a sibling temp file and a rename.
    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).await?;

        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{key}.{}.{seq}{TMP_SUFFIX}", std::process::id()));
        fs::write(&tmp, bytes).await?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        log::debug!("Cache write {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub async fn read_records<R: Record>(&self, key: &str) -> Result<Option<Snapshot<R>>> {
        let Some(bytes) = self.read(key).await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        let (records, malformed) = parse_records::<R>(&text);
        if malformed > 0 {
            log::warn!("Cache entry {key}: skipped {malformed} malformed records");
        }
        Ok(Some(Snapshot { records, malformed }))
    }

    pub async fn write_records<R: Record>(&self, key: &str, records: &[R]) -> Result<()> {
        self.write(key, render_records(records).as_bytes()).await
    }

    /// Reads a JSON entry. Unparsable content is logged and reported as absent.
    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.read(key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                log::warn!("Cache entry {key} corrupted: {err}");
                Ok(None)
            }
        }
    }

    pub async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.write(key, &bytes).await
    }

    /// Deletes the named entries; returns how many existed.
    pub async fn invalidate<I, S>(&self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = 0usize;
        for key in keys {
            let path = self.path_for(key.as_ref())?;
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        if removed > 0 {
            log::debug!("Invalidated {removed} cache entries in {}", self.dir.display());
        }
        Ok(removed)
    }

    /// Removes every entry and any temp file left by an interrupted write.
    /// Files whose names could not be cache keys are left alone.
    pub async fn clear(&self) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let owned = entry
                .file_name()
                .to_str()
                .is_some_and(|name| validate_key(name).is_ok() || is_temp_file(name));
            if !owned {
                continue;
            }
            fs::remove_file(entry.path()).await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Keys of committed entries starting with `prefix`, sorted.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || name.ends_with(TMP_SUFFIX) {
                continue;
            }
            if name.starts_with(prefix) {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Temp files are named `.<key>.<pid>.<seq>.tmp`.
fn is_temp_file(name: &str) -> bool {
    name.strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(TMP_SUFFIX))
        .and_then(|rest| rest.rsplitn(3, '.').nth(2))
        .is_some_and(|key| validate_key(key).is_ok())
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && !key.ends_with(TMP_SUFFIX)
        && key
            .chars()
            .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use tempfile::TempDir;

    fn store_with_clock(dir: &TempDir, ttl: Duration) -> (CacheStore, ManualClock) {
        let clock = ManualClock::new(SystemTime::now());
        let store = CacheStore::new(dir.path(), ttl).with_clock(Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn keys_are_restricted_to_file_safe_names() {
        assert!(validate_key("fabrics_us-ashburn-1_abc123").is_ok());
        assert!(validate_key("announcement_ocid1.announcement.oc1..x.json").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("half.tmp").is_err());
    }

    #[tokio::test]
    async fn freshness_boundary_is_inclusive_at_ttl() {
        let dir = TempDir::new().expect("tempdir");
        let ttl = Duration::from_secs(3_600);
        let (store, clock) = store_with_clock(&dir, ttl);

        store.write("fabrics_x", b"payload").await.expect("write");
        let written = store.last_write("fabrics_x").await.expect("mtime");

        clock.set(written);
        assert!(store.is_fresh("fabrics_x").await);

        clock.set(written + ttl - Duration::from_millis(1));
        assert!(store.is_fresh("fabrics_x").await);

        clock.set(written + ttl);
        assert!(store.is_fresh("fabrics_x").await);

        clock.set(written + ttl + Duration::from_millis(1));
        assert!(!store.is_fresh("fabrics_x").await);
    }

    #[tokio::test]
    async fn missing_and_empty_entries_are_not_data() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _clock) = store_with_clock(&dir, DEFAULT_TTL);

        assert_eq!(store.read("nodes_x").await.expect("read"), None);
        assert!(!store.is_fresh("nodes_x").await);

        tokio::fs::write(dir.path().join("nodes_x"), b"")
            .await
            .expect("touch");
        assert_eq!(store.read("nodes_x").await.expect("read"), None);
        assert!(!store.is_fresh("nodes_x").await);
    }

    #[tokio::test]
    async fn write_leaves_no_temp_files_behind() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _clock) = store_with_clock(&dir, DEFAULT_TTL);

        store.write("a", b"one").await.expect("write");
        store.write("a", b"two").await.expect("overwrite");

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.expect("read_dir");
        while let Some(entry) = entries.next_entry().await.expect("entry") {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["a".to_string()]);
        assert_eq!(
            store.read("a").await.expect("read"),
            Some(b"two".to_vec())
        );
    }

    #[tokio::test]
    async fn corrupt_json_reads_as_absent() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _clock) = store_with_clock(&dir, DEFAULT_TTL);

        store.write("detail.json", b"{\"id\": ").await.expect("write");
        let value: Option<serde_json::Value> = store.read_json("detail.json").await.expect("read");
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn invalidate_and_prefix_listing() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _clock) = store_with_clock(&dir, DEFAULT_TTL);

        for key in ["announcement_a.json", "announcement_b.json", "fabrics_x"] {
            store.write(key, b"{}").await.expect("write");
        }
        tokio::fs::write(dir.path().join(".announcement_c.json.1.0.tmp"), b"{")
            .await
            .expect("stray tmp");

        let keys = store.keys_with_prefix("announcement_").await.expect("keys");
        assert_eq!(keys, vec!["announcement_a.json", "announcement_b.json"]);

        let removed = store
            .invalidate(["announcement_a.json", "never_written"])
            .await
            .expect("invalidate");
        assert_eq!(removed, 1);
        assert!(store.read("announcement_a.json").await.expect("read").is_none());

        let cleared = store.clear().await.expect("clear");
        assert_eq!(cleared, 3);
        assert!(store.keys_with_prefix("").await.expect("keys").is_empty());
    }

    #[tokio::test]
    async fn clear_leaves_foreign_files_alone() {
        let dir = TempDir::new().expect("tempdir");
        let (store, _clock) = store_with_clock(&dir, DEFAULT_TTL);

        store.write("fabrics_x", b"# id\n").await.expect("write");
        tokio::fs::write(dir.path().join(".fabrics_x.7.0.tmp"), b"partial")
            .await
            .expect("stray tmp");
        for foreign in [".profile", "notes with spaces.txt", ".hidden.tmp"] {
            tokio::fs::write(dir.path().join(foreign), b"keep")
                .await
                .expect("foreign file");
        }
        tokio::fs::create_dir(dir.path().join("projects"))
            .await
            .expect("subdir");

        assert_eq!(store.clear().await.expect("clear"), 2);
        for kept in [".profile", "notes with spaces.txt", ".hidden.tmp", "projects"] {
            assert!(dir.path().join(kept).exists(), "{kept} was removed");
        }
    }

    #[test]
    fn temp_file_names_carry_a_valid_key() {
        assert!(is_temp_file(".announcement_c.json.1.0.tmp"));
        assert!(!is_temp_file(".hidden.tmp"));
        assert!(!is_temp_file("fabrics_x.1.0.tmp"));
    }
}
