//! 工具注册表存储：SQLite `tools` 表 + 按写入方拆分的更新函数。
//!
//! 字段归属：
//! - 描述字段 + `source=local`：清单发现（`upsert_local`）。
//! - 描述字段 + `status/lastHeartbeat/source=remote`：推送注册与心跳（`upsert_remote`、`record_heartbeat`）。
//! - `status=unreachable`：心跳超时扫描（`mark_unreachable_before`）。
//! - `healthStatus`：主动健康探测（`set_health_status`）。

use std::{path::Path, sync::Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use thiserror::Error;
use toolbox_protocol::{
    HealthStatus, ToolManifest, ToolRecord, ToolSource, ToolStatus, format_timestamp,
};

pub const TOOLS_SCHEMA_VERSION: i64 = 1;

const SELECT_COLUMNS: &str = "name, displayName, description, version, url, health, icon, \
     category, pm2Name, status, source, lastHeartbeat, healthStatus, createdAt, updatedAt";

const UPSERT_LOCAL_SQL: &str = "
    INSERT INTO tools (
        name, displayName, description, version, url, health, icon, category, pm2Name,
        status, source, lastHeartbeat, createdAt, updatedAt
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'running', 'local', ?10, ?10, ?10)
    ON CONFLICT(name) DO UPDATE SET
        displayName = excluded.displayName,
        description = excluded.description,
        version = excluded.version,
        url = excluded.url,
        health = excluded.health,
        icon = excluded.icon,
        category = excluded.category,
        pm2Name = excluded.pm2Name,
        source = 'local',
        updatedAt = excluded.updatedAt
";

const UPSERT_REMOTE_SQL: &str = "
    INSERT INTO tools (
        name, displayName, description, version, url, health, icon, category, pm2Name,
        status, source, lastHeartbeat, createdAt, updatedAt
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'running', 'remote', ?10, ?10, ?10)
    ON CONFLICT(name) DO UPDATE SET
        displayName = excluded.displayName,
        description = excluded.description,
        version = excluded.version,
        url = excluded.url,
        health = excluded.health,
        icon = excluded.icon,
        category = excluded.category,
        pm2Name = excluded.pm2Name,
        status = 'running',
        source = 'remote',
        lastHeartbeat = excluded.lastHeartbeat,
        updatedAt = excluded.updatedAt
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("tool store lock poisoned")]
    Poisoned,
    #[error("tool manifest requires name and url")]
    IncompleteManifest,
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// 推送注册结果：`created` 决定返回 201 还是 200。
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterOutcome {
    pub created: bool,
    pub record: ToolRecord,
}

/// 注册表存储接口；每个后台循环只调用属于自己的写函数。
pub trait ToolStore: Send + Sync {
    /// 清单发现写入：插入为 `running/local`；冲突时只改描述字段与来源。
    fn upsert_local(&self, manifest: &ToolManifest, now: DateTime<Utc>)
    -> Result<ToolRecord, StoreError>;

    /// 推送注册写入：无条件复活为 `running/remote` 并刷新心跳时间。
    fn upsert_remote(
        &self,
        manifest: &ToolManifest,
        now: DateTime<Utc>,
    ) -> Result<RegisterOutcome, StoreError>;

    /// 心跳：工具不存在时返回 `false` 且不建行。
    fn record_heartbeat(&self, name: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// 心跳超时扫描：仅处理 `remote + running` 且心跳早于 `cutoff` 的行。
    fn mark_unreachable_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// 健康探测结果写入，不触碰 `status`。
    fn set_health_status(
        &self,
        name: &str,
        health: HealthStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// 全部工具，按创建时间升序。
    fn list(&self) -> Result<Vec<ToolRecord>, StoreError>;

    fn get(&self, name: &str) -> Result<Option<ToolRecord>, StoreError>;

    /// 显式管理删除。
    fn delete(&self, name: &str) -> Result<bool, StoreError>;
}

/// SQLite 实现；单连接 + 互斥锁，一次只执行一条写路径。
pub struct SqliteToolStore {
    conn: Mutex<Connection>,
}

impl SqliteToolStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current > TOOLS_SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            found: current,
            supported: TOOLS_SCHEMA_VERSION,
        });
    }
    if current < 1 {
        conn.execute_batch(include_str!("../../migrations/0001_tools.sql"))?;
        conn.execute("PRAGMA user_version = 1", [])?;
    }
    Ok(())
}

impl ToolStore for SqliteToolStore {
    fn upsert_local(
        &self,
        manifest: &ToolManifest,
        now: DateTime<Utc>,
    ) -> Result<ToolRecord, StoreError> {
        let manifest = normalized(manifest)?;
        let conn = self.lock()?;
        upsert(&conn, UPSERT_LOCAL_SQL, &manifest, now)?;
        select_one(&conn, &manifest.name)?
            .ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    fn upsert_remote(
        &self,
        manifest: &ToolManifest,
        now: DateTime<Utc>,
    ) -> Result<RegisterOutcome, StoreError> {
        let manifest = normalized(manifest)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existed = tx
            .query_row(
                "SELECT 1 FROM tools WHERE name = ?1",
                params![manifest.name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        upsert(&tx, UPSERT_REMOTE_SQL, &manifest, now)?;
        let record = select_one(&tx, &manifest.name)?
            .ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;
        tx.commit()?;
        Ok(RegisterOutcome {
            created: !existed,
            record,
        })
    }

    fn record_heartbeat(&self, name: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE tools SET lastHeartbeat = ?2, status = 'running', updatedAt = ?2 WHERE name = ?1",
            params![name, format_timestamp(now)],
        )?;
        Ok(changed > 0)
    }

    fn mark_unreachable_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE tools SET status = 'unreachable', updatedAt = ?2
             WHERE source = 'remote'
               AND status = 'running'
               AND lastHeartbeat IS NOT NULL
               AND lastHeartbeat < ?1",
            params![format_timestamp(cutoff), format_timestamp(now)],
        )?;
        Ok(changed)
    }

    fn set_health_status(
        &self,
        name: &str,
        health: HealthStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE tools SET healthStatus = ?2, updatedAt = ?3 WHERE name = ?1",
            params![name, health.as_str(), format_timestamp(now)],
        )?;
        Ok(changed > 0)
    }

    fn list(&self) -> Result<Vec<ToolRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM tools ORDER BY createdAt ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get(&self, name: &str) -> Result<Option<ToolRecord>, StoreError> {
        let conn = self.lock()?;
        select_one(&conn, name)
    }

    fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM tools WHERE name = ?1", params![name])?;
        Ok(changed > 0)
    }
}

fn normalized(manifest: &ToolManifest) -> Result<ToolManifest, StoreError> {
    let manifest = manifest.clone().with_defaults();
    if !manifest.is_complete() {
        return Err(StoreError::IncompleteManifest);
    }
    Ok(manifest)
}

fn upsert(
    conn: &Connection,
    sql: &str,
    manifest: &ToolManifest,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        sql,
        params![
            manifest.name,
            manifest.display_name,
            manifest.description,
            manifest.version,
            manifest.url,
            manifest.health,
            manifest.icon,
            manifest.category,
            manifest.process_manager_name,
            format_timestamp(now),
        ],
    )?;
    Ok(())
}

fn select_one(conn: &Connection, name: &str) -> Result<Option<ToolRecord>, StoreError> {
    let record = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM tools WHERE name = ?1"),
            params![name],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ToolRecord> {
    let status: String = row.get("status")?;
    let source: String = row.get("source")?;
    let health_status: Option<String> = row.get("healthStatus")?;
    Ok(ToolRecord {
        name: row.get("name")?,
        display_name: row.get("displayName")?,
        description: row.get("description")?,
        version: row.get("version")?,
        url: row.get("url")?,
        health: row.get("health")?,
        icon: row.get("icon")?,
        category: row.get("category")?,
        process_manager_name: row.get("pm2Name")?,
        status: ToolStatus::parse(&status).ok_or_else(|| invalid_text(9, "status", &status))?,
        source: ToolSource::parse(&source).ok_or_else(|| invalid_text(10, "source", &source))?,
        last_heartbeat: row.get("lastHeartbeat")?,
        health_status: health_status.as_deref().and_then(HealthStatus::parse),
        created_at: row.get("createdAt")?,
        updated_at: row.get("updatedAt")?,
        pm2_status: None,
    })
}

fn invalid_text(index: usize, column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        Type::Text,
        format!("unknown {column} value: {value}").into(),
    )
}
