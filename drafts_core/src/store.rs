// src/store.rs
// Read-only access to the Drafts local SQLite store (Core Data schema).
// The URL scheme can create and modify drafts but cannot enumerate them;
// bulk listing and full-text search read the app's database directly.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OpenFlags, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DraftsError;

/// Core Data stores timestamps as seconds since 2001-01-01 UTC.
const CORE_DATA_EPOCH_OFFSET: i64 = 978_307_200;

const GROUP_CONTAINER_DB: &str =
    "Library/Group Containers/GTFQ98J4YG.com.agiletortoise.Drafts/DraftStore.sqlite";

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
    Inbox,
    Archive,
    Trash,
}

impl Folder {
    pub fn from_name(name: &str) -> Result<Self, DraftsError> {
        match name.to_ascii_lowercase().as_str() {
            "inbox" => Ok(Folder::Inbox),
            "archive" => Ok(Folder::Archive),
            "trash" => Ok(Folder::Trash),
            other => Err(DraftsError::InvalidParams(format!(
                "unknown folder '{}', expected inbox, archive, or trash",
                other
            ))),
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            Folder::Inbox => 0,
            Folder::Archive => 1,
            Folder::Trash => 2,
        }
    }

    fn from_i64(v: i64) -> &'static str {
        match v {
            0 => "inbox",
            1 => "archive",
            2 => "trash",
            _ => "unknown",
        }
    }
}

/// A draft row as stored in the app's database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDraft {
    pub uuid: String,
    /// First line of the content.
    pub title: String,
    pub content: String,
    pub folder: String,
    pub flagged: bool,
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
}

/// Read-only store over the Drafts database. Opens a fresh read-only
/// connection per query on a blocking thread; connections are never shared
/// across the async boundary.
pub struct DraftsStore {
    path: PathBuf,
}

impl DraftsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the store from `DRAFTS_DB_PATH` or the app's group container.
    pub fn open_default() -> Result<Self, DraftsError> {
        if let Ok(path) = std::env::var("DRAFTS_DB_PATH") {
            return Ok(Self::new(path));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            DraftsError::InternalError("cannot determine home directory".to_string())
        })?;
        Ok(Self::new(home.join(GROUP_CONTAINER_DB)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List drafts, optionally filtered by folder and flagged state, newest
    /// modifications first.
    pub async fn list(
        &self,
        folder: Option<Folder>,
        flagged: Option<bool>,
        limit: usize,
    ) -> Result<Vec<StoredDraft>, DraftsError> {
        let path = self.path.clone();
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        run_query(move || {
            let conn = open_read_only(&path)?;
            let mut sql = String::from(
                "SELECT ZUUID, ZCONTENT, ZFLAGGED, ZFOLDER, ZCREATED_AT, ZMODIFIED_AT \
                 FROM ZMANAGEDDRAFT",
            );
            let mut clauses: Vec<&str> = Vec::new();
            let mut params: Vec<SqlValue> = Vec::new();
            if let Some(f) = folder {
                clauses.push("ZFOLDER = ?");
                params.push(SqlValue::Integer(f.as_i64()));
            }
            if let Some(f) = flagged {
                clauses.push("ZFLAGGED = ?");
                params.push(SqlValue::Integer(i64::from(f)));
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY ZMODIFIED_AT DESC LIMIT ?");
            params.push(SqlValue::Integer(limit as i64));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params), row_to_draft)?;
            let drafts = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            debug!(count = drafts.len(), "listed drafts from store");
            Ok(drafts)
        })
        .await
    }

    /// Case-insensitive substring search over draft content (the title is
    /// the first line of the content, so it is covered too).
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoredDraft>, DraftsError> {
        let path = self.path.clone();
        let pattern = format!("%{}%", escape_like(query));
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        run_query(move || {
            let conn = open_read_only(&path)?;
            let mut stmt = conn.prepare(
                "SELECT ZUUID, ZCONTENT, ZFLAGGED, ZFOLDER, ZCREATED_AT, ZMODIFIED_AT \
                 FROM ZMANAGEDDRAFT \
                 WHERE ZCONTENT LIKE ? ESCAPE '\\' \
                 ORDER BY ZMODIFIED_AT DESC LIMIT ?",
            )?;
            let params: Vec<SqlValue> = vec![
                SqlValue::Text(pattern),
                SqlValue::Integer(limit as i64),
            ];
            let rows = stmt.query_map(params_from_iter(params), row_to_draft)?;
            let drafts = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            debug!(count = drafts.len(), "searched drafts in store");
            Ok(drafts)
        })
        .await
    }
}

async fn run_query<F>(f: F) -> Result<Vec<StoredDraft>, DraftsError>
where
    F: FnOnce() -> Result<Vec<StoredDraft>, DraftsError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DraftsError::InternalError(format!("store query panicked: {}", e)))?
}

fn open_read_only(path: &Path) -> Result<Connection, DraftsError> {
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn row_to_draft(row: &Row<'_>) -> rusqlite::Result<StoredDraft> {
    let uuid: Option<String> = row.get(0)?;
    let content: Option<String> = row.get(1)?;
    let flagged: Option<i64> = row.get(2)?;
    let folder: Option<i64> = row.get(3)?;
    let created_at: Option<f64> = row.get(4)?;
    let modified_at: Option<f64> = row.get(5)?;

    let content = content.unwrap_or_default();
    Ok(StoredDraft {
        uuid: uuid.unwrap_or_default(),
        title: content.lines().next().unwrap_or_default().to_string(),
        content,
        folder: Folder::from_i64(folder.unwrap_or(0)).to_string(),
        flagged: flagged.unwrap_or(0) != 0,
        created_at: created_at.and_then(core_data_to_rfc3339),
        modified_at: modified_at.and_then(core_data_to_rfc3339),
    })
}

fn core_data_to_rfc3339(seconds: f64) -> Option<String> {
    let unix = CORE_DATA_EPOCH_OFFSET + seconds as i64;
    DateTime::<Utc>::from_timestamp(unix, 0).map(|dt| dt.to_rfc3339())
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn fixture_db(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("DraftStore.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE ZMANAGEDDRAFT (
                Z_PK INTEGER PRIMARY KEY,
                ZUUID TEXT,
                ZCONTENT TEXT,
                ZFLAGGED INTEGER,
                ZFOLDER INTEGER,
                ZCREATED_AT REAL,
                ZMODIFIED_AT REAL
            );",
        )
        .unwrap();
        let rows: Vec<(&str, &str, i64, i64, f64)> = vec![
            ("u-1", "Groceries\nmilk, eggs", 0, 0, 700000000.0),
            ("u-2", "Meeting notes\nagenda", 1, 0, 700000100.0),
            ("u-3", "Archived idea", 0, 1, 700000200.0),
            ("u-4", "Old junk", 0, 2, 700000300.0),
        ];
        for (uuid, content, flagged, folder, ts) in rows {
            conn.execute(
                "INSERT INTO ZMANAGEDDRAFT (ZUUID, ZCONTENT, ZFLAGGED, ZFOLDER, ZCREATED_AT, ZMODIFIED_AT) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![uuid, content, flagged, folder, ts],
            )
            .unwrap();
        }
        path
    }

    #[tokio::test]
    async fn lists_inbox_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = DraftsStore::new(fixture_db(&dir));

        let drafts = store.list(Some(Folder::Inbox), None, 10).await.unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].uuid, "u-2");
        assert_eq!(drafts[0].title, "Meeting notes");
        assert!(drafts[0].flagged);
        assert_eq!(drafts[1].uuid, "u-1");
    }

    #[tokio::test]
    async fn filters_by_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let store = DraftsStore::new(fixture_db(&dir));

        let drafts = store.list(None, Some(true), 10).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].uuid, "u-2");

        let drafts = store.list(Some(Folder::Archive), Some(false), 10).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].folder, "archive");
    }

    #[tokio::test]
    async fn searches_content_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let store = DraftsStore::new(fixture_db(&dir));

        let hits = store.search("groceries", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uuid, "u-1");

        let none = store.search("100% done", 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn converts_core_data_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = DraftsStore::new(fixture_db(&dir));

        let drafts = store.list(Some(Folder::Trash), None, 10).await.unwrap();
        let created = drafts[0].created_at.as_deref().unwrap();
        // 978307200 + 700000300 = 1678307500 -> 2023-03-08T20:31:40Z
        assert!(created.starts_with("2023-03-08T"));
    }

    #[test]
    fn folder_names_round_trip() {
        assert_eq!(Folder::from_name("Inbox").unwrap(), Folder::Inbox);
        assert!(Folder::from_name("sent").is_err());
        assert_eq!(Folder::from_i64(1), "archive");
    }
}
