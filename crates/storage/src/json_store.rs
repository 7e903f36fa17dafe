//! JSON file store implementation.
//!
//! Stores definitions and snapshots as JSON files under a root directory and
//! keeps a small meta marker (version + updated_at) per definition. List
//! names are percent-encoded into file names, so any name round-trips.

use std::path::{Path, PathBuf};

use super::{Result, ScheduleStore, StorageError};
use evman_calc::ListDefinition;
use evman_core::Snapshot;
use evman_deps::HierarchyEntry;
use tokio::fs;
use tracing::debug;

const LISTS: &str = "lists";
const SNAPSHOTS: &str = "snapshots";
const META: &str = "meta";
const HIERARCHY_FILE: &str = "hierarchy.json";

/// File-based JSON store.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Open a store at `root`, creating the directories it needs.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(LISTS)).await?;
        fs::create_dir_all(root.join(SNAPSHOTS)).await?;
        fs::create_dir_all(root.join(META).join(LISTS)).await?;
        debug!(root = %root.display(), "json store opened");
        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn definition_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(LISTS).join(format!("{}.json", encode_name(name)?)))
    }

    fn snapshot_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(SNAPSHOTS).join(format!("{}.json", encode_name(name)?)))
    }

    fn meta_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(META).join(LISTS).join(format!("{}.meta.json", encode_name(name)?)))
    }

    /// Read and increment the version of `name`, return the new version.
    async fn bump_version(&self, name: &str) -> Result<u64> {
        let path = self.meta_path(name)?;
        let version = read_version(&path).await + 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        fs::write(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }
}

#[async_trait::async_trait]
impl ScheduleStore for JsonStore {
    async fn save_definition(&mut self, name: &str, definition: &ListDefinition) -> Result<()> {
        let path = self.definition_path(name)?;
        let json = serde_json::to_string_pretty(definition)?;
        fs::write(&path, json.as_bytes()).await?;
        let version = self.bump_version(name).await?;
        debug!(task_list = name, version, "definition saved");
        Ok(())
    }

    async fn load_definition(&self, name: &str) -> Result<Option<ListDefinition>> {
        read_json(&self.definition_path(name)?).await
    }

    async fn list_definitions(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut rd = fs::read_dir(self.root.join(LISTS)).await?;
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()).and_then(decode_name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_definition(&mut self, name: &str) -> Result<()> {
        for path in [self.definition_path(name)?, self.meta_path(name)?] {
            fs::remove_file(path).await.or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
            })?;
        }
        Ok(())
    }

    async fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        let path = self.snapshot_path(&snapshot.name)?;
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json.as_bytes()).await?;
        debug!(snapshot = %snapshot.name, id = %snapshot.id, "snapshot saved");
        Ok(())
    }

    async fn load_snapshot(&self, name: &str) -> Result<Option<Snapshot>> {
        read_json(&self.snapshot_path(name)?).await
    }

    async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = list_dir(&self.root.join(SNAPSHOTS)).await?;
        snapshots.sort_by(|a: &Snapshot, b| a.taken_at.cmp(&b.taken_at).then_with(|| a.name.cmp(&b.name)));
        Ok(snapshots)
    }

    async fn save_hierarchy(&mut self, entries: &[HierarchyEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(self.root.join(HIERARCHY_FILE), json.as_bytes()).await?;
        Ok(())
    }

    async fn load_hierarchy(&self) -> Result<Vec<HierarchyEntry>> {
        Ok(read_json(&self.root.join(HIERARCHY_FILE)).await?.unwrap_or_default())
    }

    async fn definition_version(&self, name: &str) -> Result<u64> {
        Ok(read_version(&self.meta_path(name)?).await)
    }
}

/// Percent-encode everything but ASCII letters, digits, `-` and `_`.
fn encode_name(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    Ok(out)
}

fn decode_name(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

async fn read_version(path: &Path) -> u64 {
    let Ok(s) = fs::read_to_string(path).await else {
        return 0;
    };
    serde_json::from_str::<serde_json::Value>(&s)
        .ok()
        .and_then(|json| json.get("version").and_then(|v| v.as_u64()))
        .unwrap_or(0)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Ok(Some(item)) = read_json(&entry.path()).await {
            items.push(item);
        }
    }
    Ok(items)
}
