//! # Relwatch Store
//! SQLite-backed state: tracked projects, tags, per-project release markers,
//! and the release history shown on the dashboard.
//!
//! The marker is the dedup source of truth; the `releases` table is display
//! history only.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use relwatch_core::error::{RelwatchError, Result};
use relwatch_core::types::{ChannelKind, ChannelToggles, Release, RepoId, Tag, TrackedProject};

/// Persistent state store over a single SQLite connection.
pub struct StateStore {
    conn: Mutex<Connection>,
}

/// A release row joined with its project, for the dashboard feed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredRelease {
    pub id: i64,
    pub repo: RepoId,
    pub tag: String,
    pub title: String,
    pub body: String,
    pub html_url: String,
    pub published_at: DateTime<Utc>,
}

impl StateStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;

        // WAL for concurrent reads; foreign keys for cascade semantics.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .ok();

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                color TEXT NOT NULL DEFAULT '#8b5cf6',
                telegram_enabled INTEGER NOT NULL DEFAULT 1,
                discord_enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                marker TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (owner, name)
            );

            CREATE TABLE IF NOT EXISTS project_tags (
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (project_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS releases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                tag TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                html_url TEXT NOT NULL DEFAULT '',
                published_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (project_id, tag)
            );
            ",
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RelwatchError::Store(format!("connection lock poisoned: {e}")))
    }

    // ─── Projects ──────────────────────────────────────

    /// Start tracking a repository. Returns None if it is already tracked.
    pub fn add_project(&self, repo: &RepoId) -> Result<Option<i64>> {
        let conn = self.lock()?;
        match conn.execute(
            "INSERT INTO projects (owner, name, created_at) VALUES (?1, ?2, ?3)",
            params![repo.owner, repo.name, Utc::now().to_rfc3339()],
        ) {
            Ok(_) => Ok(Some(conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(store_err(e)),
        }
    }

    /// Stop tracking a repository. Tag assignments and release history
    /// cascade away; tags themselves survive.
    pub fn remove_project(&self, repo: &RepoId) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "DELETE FROM projects WHERE owner = ?1 AND name = ?2",
                params![repo.owner, repo.name],
            )
            .map_err(store_err)?;
        Ok(affected > 0)
    }

    pub fn get_project(&self, repo: &RepoId) -> Result<Option<TrackedProject>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, owner, name, marker, created_at FROM projects
                 WHERE owner = ?1 AND name = ?2",
                params![repo.owner, repo.name],
                project_from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(store_err(other)),
            })?;
        match row {
            Some(mut project) => {
                project.tags = tags_for_project(&conn, project.id)?;
                Ok(Some(project))
            }
            None => Ok(None),
        }
    }

    /// All tracked projects with their tags, in stable creation order so
    /// cycles are deterministic.
    pub fn list_projects(&self) -> Result<Vec<TrackedProject>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, owner, name, marker, created_at FROM projects ORDER BY id",
            )
            .map_err(store_err)?;
        let mut projects: Vec<TrackedProject> = stmt
            .query_map([], project_from_row)
            .map_err(store_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(store_err)?;
        drop(stmt);
        for project in &mut projects {
            project.tags = tags_for_project(&conn, project.id)?;
        }
        Ok(projects)
    }

    // ─── Markers ──────────────────────────────────────

    /// Read the dedup watermark for a project.
    pub fn marker(&self, project_id: i64) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT marker FROM projects WHERE id = ?1",
            params![project_id],
            |row| row.get(0),
        )
        .map_err(store_err)
    }

    /// Advance the dedup watermark. A single UPDATE, atomic per project.
    pub fn set_marker(&self, project_id: i64, marker: &str) -> Result<()> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "UPDATE projects SET marker = ?1 WHERE id = ?2",
                params![marker, project_id],
            )
            .map_err(store_err)?;
        if affected == 0 {
            return Err(RelwatchError::Store(format!(
                "no such project id {project_id}"
            )));
        }
        Ok(())
    }

    // ─── Tags ──────────────────────────────────────

    /// Create a tag. Returns None if the name is taken.
    pub fn create_tag(&self, name: &str, color: &str) -> Result<Option<i64>> {
        let conn = self.lock()?;
        match conn.execute(
            "INSERT INTO tags (name, color, created_at) VALUES (?1, ?2, ?3)",
            params![name.trim(), color, Utc::now().to_rfc3339()],
        ) {
            Ok(_) => Ok(Some(conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(store_err(e)),
        }
    }

    pub fn get_tag(&self, tag_id: i64) -> Result<Option<Tag>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, color, telegram_enabled, discord_enabled, created_at
             FROM tags WHERE id = ?1",
            params![tag_id],
            tag_from_row,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(store_err(other)),
        })
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, color, telegram_enabled, discord_enabled, created_at
                 FROM tags ORDER BY name",
            )
            .map_err(store_err)?;
        let tags = stmt
            .query_map([], tag_from_row)
            .map_err(store_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(store_err)?;
        Ok(tags)
    }

    /// Flip one channel toggle on a tag.
    pub fn set_tag_channel(&self, tag_id: i64, kind: ChannelKind, enabled: bool) -> Result<bool> {
        let column = match kind {
            ChannelKind::Telegram => "telegram_enabled",
            ChannelKind::Discord => "discord_enabled",
        };
        let conn = self.lock()?;
        let affected = conn
            .execute(
                &format!("UPDATE tags SET {column} = ?1 WHERE id = ?2"),
                params![enabled as i32, tag_id],
            )
            .map_err(store_err)?;
        Ok(affected > 0)
    }

    pub fn update_tag(&self, tag_id: i64, name: Option<&str>, color: Option<&str>) -> Result<bool> {
        let conn = self.lock()?;
        let mut affected = 0;
        if let Some(name) = name {
            affected += conn
                .execute(
                    "UPDATE tags SET name = ?1 WHERE id = ?2",
                    params![name.trim(), tag_id],
                )
                .map_err(store_err)?;
        }
        if let Some(color) = color {
            affected += conn
                .execute(
                    "UPDATE tags SET color = ?1 WHERE id = ?2",
                    params![color, tag_id],
                )
                .map_err(store_err)?;
        }
        Ok(affected > 0)
    }

    /// Delete a tag; it is unassigned from all projects, which survive.
    pub fn delete_tag(&self, tag_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn
            .execute("DELETE FROM tags WHERE id = ?1", params![tag_id])
            .map_err(store_err)?;
        Ok(affected > 0)
    }

    pub fn assign_tag(&self, project_id: i64, tag_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO project_tags (project_id, tag_id) VALUES (?1, ?2)",
            params![project_id, tag_id],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn unassign_tag(&self, project_id: i64, tag_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "DELETE FROM project_tags WHERE project_id = ?1 AND tag_id = ?2",
                params![project_id, tag_id],
            )
            .map_err(store_err)?;
        Ok(affected > 0)
    }

    // ─── Release history ──────────────────────────────────────

    /// Append a detected release to the history. Returns false when the
    /// release was already recorded.
    pub fn record_release(&self, project_id: i64, release: &Release) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "INSERT OR IGNORE INTO releases
                 (project_id, tag, title, body, html_url, published_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    project_id,
                    release.tag,
                    release.title,
                    release.body,
                    release.html_url,
                    release.published_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(store_err)?;
        Ok(affected > 0)
    }

    /// Most recent releases across all projects, newest-first.
    pub fn recent_releases(&self, limit: usize) -> Result<Vec<StoredRelease>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT r.id, p.owner, p.name, r.tag, r.title, r.body, r.html_url, r.published_at
                 FROM releases r
                 JOIN projects p ON p.id = r.project_id
                 ORDER BY r.published_at DESC
                 LIMIT ?1",
            )
            .map_err(store_err)?;
        let releases = stmt
            .query_map(params![limit as i64], |row| {
                Ok(StoredRelease {
                    id: row.get(0)?,
                    repo: RepoId::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
                    tag: row.get(3)?,
                    title: row.get(4)?,
                    body: row.get(5)?,
                    html_url: row.get(6)?,
                    published_at: parse_ts(&row.get::<_, String>(7)?),
                })
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(store_err)?;
        Ok(releases)
    }
}

fn store_err(e: rusqlite::Error) -> RelwatchError {
    RelwatchError::Store(e.to_string())
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedProject> {
    Ok(TrackedProject {
        id: row.get(0)?,
        repo: RepoId::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
        tags: Vec::new(),
        marker: row.get(3)?,
        created_at: parse_ts(&row.get::<_, String>(4)?),
    })
}

fn tag_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        channels: ChannelToggles {
            telegram: row.get::<_, i32>(3)? != 0,
            discord: row.get::<_, i32>(4)? != 0,
        },
        created_at: parse_ts(&row.get::<_, String>(5)?),
    })
}

fn tags_for_project(conn: &Connection, project_id: i64) -> Result<Vec<Tag>> {
    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.name, t.color, t.telegram_enabled, t.discord_enabled, t.created_at
             FROM tags t
             JOIN project_tags pt ON pt.tag_id = t.id
             WHERE pt.project_id = ?1
             ORDER BY t.name",
        )
        .map_err(store_err)?;
    let tags = stmt
        .query_map(params![project_id], tag_from_row)
        .map_err(store_err)?
        .collect::<rusqlite::Result<_>>()
        .map_err(store_err)?;
    Ok(tags)
}
