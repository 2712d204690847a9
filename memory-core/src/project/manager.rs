//! Central registry and lifecycle for named projects.
//!
//! Every project owns a directory under the base data dir:
//!
//! ```text
//! <data_dir>/<project_id>/
//!   project.json       # manifest mirroring the registry row
//!   memory.db          # symbolic store
//!   episodic.db        # episodic store
//!   semantic_index/    # semantic store
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::validation::validate_project_name;
use crate::types::{Project, ProjectStatus};

const CREATE_PROJECTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    project_id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    short_uuid TEXT NOT NULL,
    chroma_path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    metadata_json TEXT NOT NULL DEFAULT '{}'
)
"#;

/// Generate the 8-hex-char short form of a random UUID.
fn generate_short_uuid() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Owns the base data directory and the process-wide project registry.
///
/// Registry writes serialize through a single async mutex; reads run
/// concurrently.
pub struct ProjectManager {
    base_dir: PathBuf,
    db: Database,
    write_lock: Mutex<()>,
}

impl ProjectManager {
    /// Open (or create) the registry under `base_dir`.
    pub async fn open(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir)?;
        let registry_path = base_dir.join("registry.db");
        let db = Builder::new_local(&registry_path)
            .build()
            .await
            .map_err(|e| Error::Storage(format!("Failed to open project registry: {e}")))?;

        let manager = Self {
            base_dir: base_dir.to_path_buf(),
            db,
            write_lock: Mutex::new(()),
        };

        let conn = manager.connection()?;
        conn.query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to enable WAL: {e}")))?;
        conn.execute(CREATE_PROJECTS_TABLE, ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to create registry schema: {e}")))?;

        info!(path = %registry_path.display(), "project registry ready");
        Ok(manager)
    }

    fn connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| Error::Storage(format!("Failed to get registry connection: {e}")))
    }

    /// Base data directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a new isolated project.
    pub async fn create_project(
        &self,
        name: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Project> {
        validate_project_name(name)?;

        let _guard = self.write_lock.lock().await;

        let short_uuid = generate_short_uuid();
        let project_id = format!("{name}-{short_uuid}");
        if self.get_project(&project_id).await?.is_some() {
            return Err(Error::Conflict(format!(
                "Project already exists: {project_id}"
            )));
        }

        let project_dir = self.base_dir.join(&project_id);
        let semantic_dir = project_dir.join("semantic_index");
        std::fs::create_dir_all(&semantic_dir)?;

        let now = Utc::now();
        let project = Project {
            project_id: project_id.clone(),
            name: name.to_string(),
            short_uuid,
            chroma_path: semantic_dir.to_string_lossy().into_owned(),
            created_at: now,
            updated_at: now,
            status: ProjectStatus::Active,
            metadata: metadata.unwrap_or_else(|| serde_json::json!({})),
        };

        // Manifest mirrors the registry row for offline inspection.
        let manifest_path = project_dir.join("project.json");
        std::fs::write(&manifest_path, serde_json::to_vec_pretty(&project)?)
            .map_err(|e| Error::storage_at(&manifest_path, e))?;

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO projects
             (project_id, name, short_uuid, chroma_path, created_at, updated_at, status, metadata_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                project.project_id.clone(),
                project.name.clone(),
                project.short_uuid.clone(),
                project.chroma_path.clone(),
                rfc3339(project.created_at),
                rfc3339(project.updated_at),
                project.status.to_string(),
                serde_json::to_string(&project.metadata)?,
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to register project: {e}")))?;

        info!(project_id = %project.project_id, "created project");
        Ok(project)
    }

    /// Delete a project and all its data. Idempotent: deleting an unknown
    /// id returns false.
    pub async fn delete_project(&self, project_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        if self.get_project(project_id).await?.is_none() {
            warn!(project_id, "delete requested for unknown project");
            return Ok(false);
        }

        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM projects WHERE project_id = ?",
            libsql::params![project_id],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to unregister project: {e}")))?;

        let project_dir = self.base_dir.join(project_id);
        if project_dir.exists() {
            std::fs::remove_dir_all(&project_dir)
                .map_err(|e| Error::storage_at(&project_dir, e))?;
        }

        info!(project_id, "deleted project");
        Ok(true)
    }

    /// Fetch a project by id.
    pub async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT project_id, name, short_uuid, chroma_path, created_at, updated_at, status, metadata_json
                 FROM projects WHERE project_id = ?",
                libsql::params![project_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query project: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch project row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_project(&row)?)),
            None => Ok(None),
        }
    }

    /// List projects, optionally filtered by status.
    pub async fn list_projects(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>> {
        let conn = self.connection()?;

        let mut rows = if let Some(status) = status {
            conn.query(
                "SELECT project_id, name, short_uuid, chroma_path, created_at, updated_at, status, metadata_json
                 FROM projects WHERE status = ? ORDER BY created_at",
                libsql::params![status.to_string()],
            )
            .await
        } else {
            conn.query(
                "SELECT project_id, name, short_uuid, chroma_path, created_at, updated_at, status, metadata_json
                 FROM projects ORDER BY created_at",
                (),
            )
            .await
        }
        .map_err(|e| Error::Storage(format!("Failed to list projects: {e}")))?;

        let mut projects = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch project row: {e}")))?
        {
            projects.push(row_to_project(&row)?);
        }
        debug!(count = projects.len(), "listed projects");
        Ok(projects)
    }

    /// Whether the id names a registered project.
    pub async fn validate_project_id(&self, project_id: &str) -> Result<bool> {
        Ok(self.get_project(project_id).await?.is_some())
    }

    /// Directory owned by a project.
    pub async fn get_project_dir(&self, project_id: &str) -> Result<PathBuf> {
        if !self.validate_project_id(project_id).await? {
            return Err(Error::project_not_found(project_id));
        }
        Ok(self.base_dir.join(project_id))
    }

    /// Resolve a name to an existing project (matching either `project_id`
    /// or `name`), creating one when nothing matches.
    pub async fn resolve_or_create(&self, name: &str) -> Result<Project> {
        if let Some(project) = self.get_project(name).await? {
            return Ok(project);
        }

        for project in self.list_projects(None).await? {
            if project.name == name {
                return Ok(project);
            }
        }

        debug!(name, "no matching project, creating one");
        self.create_project(name, None).await
    }
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_project(row: &libsql::Row) -> Result<Project> {
    let project_id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
    let name: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
    let short_uuid: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
    let chroma_path: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
    let created_at: String = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
    let updated_at: String = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
    let status: String = row.get(6).map_err(|e| Error::Storage(e.to_string()))?;
    let metadata_json: String = row.get(7).map_err(|e| Error::Storage(e.to_string()))?;

    Ok(Project {
        project_id,
        name,
        short_uuid,
        chroma_path,
        created_at: parse_rfc3339(&created_at)?,
        updated_at: parse_rfc3339(&updated_at)?,
        status: ProjectStatus::from_str(&status)?,
        metadata: serde_json::from_str(&metadata_json)?,
    })
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Invalid timestamp {s:?}: {e}")))
}
