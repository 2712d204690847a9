//! Episode store over a per-project libsql database.

use std::path::Path;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database};
use tracing::{debug, info};

use super::schema;
use crate::error::{Error, Result};
use crate::types::validation::{validate_confidence, validate_project_id};
use crate::types::{Episode, EpisodeStats};

/// Filters for [`EpisodicStore::query_episodes`]. Text matching is
/// case-insensitive substring.
#[derive(Debug, Clone)]
pub struct EpisodeQuery {
    pub project_id: String,
    pub lesson: Option<String>,
    pub situation_contains: Option<String>,
    pub min_confidence: f64,
    pub limit: usize,
}

impl EpisodeQuery {
    #[must_use]
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            lesson: None,
            situation_contains: None,
            min_confidence: 0.0,
            limit: 10,
        }
    }
}

/// Transactional store of advisory episodes.
pub struct EpisodicStore {
    db: Database,
}

impl EpisodicStore {
    /// Open (or create) the store at `db_path` and initialize its schema.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let db = Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| Error::Storage(format!("Failed to open episodic store: {e}")))?;

        let store = Self { db };
        store.init_schema().await?;
        debug!(path = %db_path.display(), "episodic store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to enable WAL: {e}")))?;
        for sql in [schema::CREATE_EPISODES_TABLE, schema::CREATE_EPISODES_RECENCY_INDEX] {
            conn.execute(sql, ())
                .await
                .map_err(|e| Error::Storage(format!("Failed to create schema: {e}")))?;
        }
        Ok(())
    }

    fn connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| Error::Storage(format!("Failed to get connection: {e}")))
    }

    /// Store an episode.
    ///
    /// Rejects episodes whose lesson merely restates the situation (the
    /// abstraction guard), empty text fields, and out-of-range confidence.
    pub async fn store_episode(&self, episode: Episode) -> Result<Episode> {
        validate_project_id(&episode.project_id)?;
        validate_confidence(episode.confidence)?;

        for (field, value) in [
            ("situation", &episode.situation),
            ("action", &episode.action),
            ("outcome", &episode.outcome),
            ("lesson", &episode.lesson),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "Episode field {field:?} must be non-empty"
                )));
            }
        }

        if episode.lesson.trim() == episode.situation.trim() {
            return Err(Error::Conflict(
                "Episode lesson must abstract the situation, not restate it".to_string(),
            ));
        }

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO episodes
             (id, project_id, situation, action, outcome, lesson, confidence, created_at, created_at_ts)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                episode.id.clone(),
                episode.project_id.clone(),
                episode.situation.clone(),
                episode.action.clone(),
                episode.outcome.clone(),
                episode.lesson.clone(),
                episode.confidence,
                rfc3339(episode.created_at),
                episode.created_at.timestamp_micros(),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to insert episode: {e}")))?;

        info!(id = %episode.id, project_id = %episode.project_id, "stored episode");
        Ok(episode)
    }

    /// Query episodes ordered by `confidence DESC, created_at DESC`.
    pub async fn query_episodes(&self, query: &EpisodeQuery) -> Result<Vec<Episode>> {
        let conn = self.connection()?;

        let mut sql = String::from(
            "SELECT id, project_id, situation, action, outcome, lesson, confidence, created_at
             FROM episodes WHERE project_id = ? AND confidence >= ?",
        );
        let mut params: Vec<libsql::Value> =
            vec![query.project_id.clone().into(), query.min_confidence.into()];

        if let Some(lesson) = &query.lesson {
            sql.push_str(" AND lower(lesson) LIKE '%' || lower(?) || '%'");
            params.push(lesson.clone().into());
        }
        if let Some(situation) = &query.situation_contains {
            sql.push_str(" AND lower(situation) LIKE '%' || lower(?) || '%'");
            params.push(situation.clone().into());
        }
        sql.push_str(" ORDER BY confidence DESC, created_at_ts DESC");
        if query.limit != usize::MAX {
            sql.push_str(&format!(" LIMIT {}", query.limit));
        }

        self.fetch_episodes(&conn, &sql, params).await
    }

    /// Episodes created within the last `days`, ordered by recency.
    ///
    /// The cutoff instant is computed here with chrono and compared against
    /// the stored epoch column; the SQL dialect's date-string math is never
    /// involved.
    pub async fn list_recent_episodes(
        &self,
        project_id: &str,
        days: i64,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<Episode>> {
        let cutoff = Utc::now() - Duration::days(days);
        let conn = self.connection()?;

        let sql = format!(
            "SELECT id, project_id, situation, action, outcome, lesson, confidence, created_at
             FROM episodes
             WHERE project_id = ? AND confidence >= ? AND created_at_ts >= ?
             ORDER BY created_at_ts DESC LIMIT {limit}"
        );
        let params: Vec<libsql::Value> = vec![
            project_id.to_string().into(),
            min_confidence.into(),
            cutoff.timestamp_micros().into(),
        ];

        self.fetch_episodes(&conn, &sql, params).await
    }

    /// Delete an episode by id. Returns false when the id is unknown.
    pub async fn delete_episode(&self, id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let affected = conn
            .execute("DELETE FROM episodes WHERE id = ?", libsql::params![id])
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete episode: {e}")))?;
        Ok(affected > 0)
    }

    /// Aggregate statistics for a project.
    pub async fn get_episode_stats(&self, project_id: &str) -> Result<EpisodeStats> {
        let episodes = self
            .query_episodes(&EpisodeQuery {
                limit: usize::MAX,
                ..EpisodeQuery::for_project(project_id)
            })
            .await?;

        let mut stats = EpisodeStats {
            total_episodes: episodes.len(),
            ..EpisodeStats::default()
        };
        if episodes.is_empty() {
            return Ok(stats);
        }

        stats.avg_confidence =
            episodes.iter().map(|e| e.confidence).sum::<f64>() / episodes.len() as f64;
        stats.newest = episodes.iter().map(|e| e.created_at).max();
        stats.oldest = episodes.iter().map(|e| e.created_at).min();
        Ok(stats)
    }

    async fn fetch_episodes(
        &self,
        conn: &Connection,
        sql: &str,
        params: Vec<libsql::Value>,
    ) -> Result<Vec<Episode>> {
        let mut rows = conn
            .query(sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| Error::Storage(format!("Failed to query episodes: {e}")))?;

        let mut episodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch episode row: {e}")))?
        {
            episodes.push(row_to_episode(&row)?);
        }
        debug!(count = episodes.len(), "episode query");
        Ok(episodes)
    }
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_episode(row: &libsql::Row) -> Result<Episode> {
    let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
    let project_id: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
    let situation: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
    let action: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
    let outcome: String = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
    let lesson: String = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
    let confidence: f64 = row.get(6).map_err(|e| Error::Storage(e.to_string()))?;
    let created_at: String = row.get(7).map_err(|e| Error::Storage(e.to_string()))?;

    Ok(Episode {
        id,
        project_id,
        situation,
        action,
        outcome,
        lesson,
        confidence,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Storage(format!("Invalid timestamp {created_at:?}: {e}")))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> EpisodicStore {
        EpisodicStore::open(&dir.path().join("episodic.db")).await.unwrap()
    }

    fn episode(lesson: &str, confidence: f64) -> Episode {
        Episode::new(
            "demo",
            "Large repo search was slow",
            "Searched filenames before contents",
            "success",
            lesson,
            confidence,
        )
    }

    #[tokio::test]
    async fn store_and_query_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store
            .store_episode(episode("Search filenames first in large repos", 0.85))
            .await
            .unwrap();

        let hits = store
            .query_episodes(&EpisodeQuery {
                lesson: Some("filenames".to_string()),
                ..EpisodeQuery::for_project("demo")
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].outcome, "success");
    }

    #[tokio::test]
    async fn abstraction_guard_rejects_restated_situations() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let mut bad = episode("x", 0.8);
        bad.lesson = bad.situation.clone();
        let err = store.store_episode(bad).await.unwrap_err();
        assert_eq!(err.kind(), "Conflict");
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let mut bad = episode("lesson text", 0.8);
        bad.action = "  ".to_string();
        let err = store.store_episode(bad).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[tokio::test]
    async fn case_insensitive_situation_search() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.store_episode(episode("Prefer narrow globs", 0.7)).await.unwrap();

        let hits = store
            .query_episodes(&EpisodeQuery {
                situation_contains: Some("LARGE REPO".to_string()),
                ..EpisodeQuery::for_project("demo")
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn recent_window_excludes_old_episodes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let mut old = episode("Old lesson applies broadly", 0.9);
        old.created_at = Utc::now() - Duration::days(45);
        store.store_episode(old).await.unwrap();
        store.store_episode(episode("Fresh lesson applies now", 0.8)).await.unwrap();

        let recent = store.list_recent_episodes("demo", 30, 0.0, 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].lesson, "Fresh lesson applies now");
    }

    #[tokio::test]
    async fn ordering_is_confidence_then_recency() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.store_episode(episode("low confidence lesson", 0.6)).await.unwrap();
        store.store_episode(episode("high confidence lesson", 0.95)).await.unwrap();

        let hits = store.query_episodes(&EpisodeQuery::for_project("demo")).await.unwrap();
        assert_eq!(hits[0].lesson, "high confidence lesson");
    }

    #[tokio::test]
    async fn delete_returns_presence() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let stored = store.store_episode(episode("deletable lesson", 0.7)).await.unwrap();

        assert!(store.delete_episode(&stored.id).await.unwrap());
        assert!(!store.delete_episode(&stored.id).await.unwrap());
    }
}
