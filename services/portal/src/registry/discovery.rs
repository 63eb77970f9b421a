//! 本地清单发现：启动时扫描 `<packages>/*/tool.yaml`，以 `source=local` 写入注册表。

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use toolbox_protocol::ToolManifest;
use tracing::{info, warn};

use super::store::ToolStore;

/// 单个工具目录下的清单文件名。
pub const MANIFEST_FILE_NAME: &str = "tool.yaml";

/// 扫描结果统计。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub registered: usize,
    pub skipped: usize,
}

/// 执行一次发现；目录本身不可读时返回错误，单个清单失败只记日志并跳过。
pub fn discover_once(
    store: &dyn ToolStore,
    packages_dir: &Path,
    now: DateTime<Utc>,
) -> Result<DiscoveryReport> {
    let mut report = DiscoveryReport::default();
    for manifest_path in manifest_paths(packages_dir)? {
        let manifest = match load_manifest(&manifest_path) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!("skip manifest {}: {err:#}", manifest_path.display());
                report.skipped += 1;
                continue;
            }
        };
        if !manifest.is_complete() {
            warn!(
                "skip manifest {}: name and url are required",
                manifest_path.display()
            );
            report.skipped += 1;
            continue;
        }
        match store.upsert_local(&manifest, now) {
            Ok(record) => {
                info!(tool = %record.name, url = %record.url, "registered local tool");
                report.registered += 1;
            }
            Err(err) => {
                warn!("store local tool {} failed: {err}", manifest.name);
                report.skipped += 1;
            }
        }
    }
    Ok(report)
}

/// 列出每个直接子目录下存在的清单文件，按路径排序保证扫描顺序稳定。
fn manifest_paths(packages_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(packages_dir)
        .with_context(|| format!("read packages dir: {}", packages_dir.display()))?;
    let mut paths = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        if manifest_path.is_file() {
            paths.push(manifest_path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn load_manifest(path: &Path) -> Result<ToolManifest> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let manifest: ToolManifest =
        serde_yaml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(manifest.with_defaults())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::Utc;
    use toolbox_protocol::{ToolSource, ToolStatus};

    use super::{DiscoveryReport, discover_once};
    use crate::registry::store::{SqliteToolStore, ToolStore};

    fn write_manifest(root: &std::path::Path, dir: &str, body: &str) {
        let tool_dir = root.join(dir);
        fs::create_dir_all(&tool_dir).unwrap();
        fs::write(tool_dir.join("tool.yaml"), body).unwrap();
    }

    #[test]
    fn discovers_valid_manifests_and_skips_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "bookmarks",
            "name: bookmarks\ndisplayName: Bookmarks\nurl: http://localhost:3002\npm2Name: bookmarks\ncategory: productivity\n",
        );
        write_manifest(dir.path(), "no-url", "name: orphan\n");
        write_manifest(dir.path(), "broken", "name: [unterminated\n");
        fs::create_dir_all(dir.path().join("no-manifest")).unwrap();

        let store = SqliteToolStore::open_in_memory().unwrap();
        let report = discover_once(&store, dir.path(), Utc::now()).unwrap();

        assert_eq!(
            report,
            DiscoveryReport {
                registered: 1,
                skipped: 2
            }
        );
        let row = store.get("bookmarks").unwrap().unwrap();
        assert_eq!(row.display_name, "Bookmarks");
        assert_eq!(row.source, ToolSource::Local);
        assert_eq!(row.status, ToolStatus::Running);
        assert_eq!(row.process_manager_name.as_deref(), Some("bookmarks"));
        assert_eq!(row.version, "0.0.0");
        assert!(store.get("orphan").unwrap().is_none());
    }

    #[test]
    fn missing_packages_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteToolStore::open_in_memory().unwrap();
        assert!(discover_once(&store, &dir.path().join("absent"), Utc::now()).is_err());
    }
}
