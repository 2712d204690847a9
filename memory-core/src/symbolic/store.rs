//! Symbolic fact store over a per-project libsql database.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database};
use tracing::{debug, info};

use super::schema;
use crate::error::{Error, Result};
use crate::types::validation::{validate_confidence, validate_fact_key, validate_project_id};
use crate::types::{AuditEntry, AuditOperation, FactCategory, FactSource, FactStats, MemoryFact};

/// Filters for [`SymbolicStore::query_memory`].
#[derive(Debug, Clone, Default)]
pub struct FactQuery {
    /// Scope filter (the project id)
    pub project_id: Option<String>,
    pub category: Option<FactCategory>,
    /// Key filter; `%`/`_` LIKE wildcards are supported
    pub key: Option<String>,
    pub min_confidence: f64,
    pub limit: Option<usize>,
}

/// Transactional store of authoritative facts.
///
/// Upholds the uniqueness invariant: at most one live fact per
/// `(project_id, key)`. Writers serialize through single transactions;
/// readers run concurrently against the WAL.
pub struct SymbolicStore {
    db: Database,
}

impl SymbolicStore {
    /// Open (or create) the store at `db_path` and initialize its schema.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let db = Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| Error::Storage(format!("Failed to open symbolic store: {e}")))?;

        let store = Self { db };
        store.init_schema().await?;
        debug!(path = %db_path.display(), "symbolic store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to enable WAL: {e}")))?;
        conn.execute("PRAGMA foreign_keys=ON", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to enable foreign keys: {e}")))?;
        for sql in [
            schema::CREATE_FACTS_TABLE,
            schema::CREATE_AUDIT_TABLE,
            schema::CREATE_FACTS_PROJECT_INDEX,
            schema::CREATE_AUDIT_TIME_INDEX,
        ] {
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

    /// Upsert a fact by `(project_id, key)`.
    ///
    /// On update the before/after states are audited and `updated_at` is
    /// strictly greater than the previous value. Writing an identical value
    /// returns the existing row unchanged.
    pub async fn store_memory(&self, fact: MemoryFact) -> Result<MemoryFact> {
        validate_project_id(&fact.project_id)?;
        validate_fact_key(&fact.key)?;
        validate_confidence(fact.confidence)?;

        let conn = self.connection()?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {e}")))?;

        let mut rows = tx
            .query(
                "SELECT id, project_id, category, key, value_json, confidence, source, created_at, updated_at
                 FROM memory_facts WHERE project_id = ? AND key = ?",
                libsql::params![fact.project_id.clone(), fact.key.clone()],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query fact: {e}")))?;

        let existing = match rows
            .next()
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch fact row: {e}")))?
        {
            Some(row) => Some(row_to_fact(&row)?),
            None => None,
        };

        let stored = if let Some(existing) = existing {
            if existing.value == fact.value {
                debug!(key = %fact.key, "fact unchanged, returning existing row");
                return Ok(existing);
            }

            let mut updated = existing.clone();
            updated.value = fact.value;
            updated.category = fact.category;
            updated.confidence = fact.confidence;
            updated.source = fact.source;
            updated.updated_at = next_update_instant(existing.updated_at);

            tx.execute(
                "UPDATE memory_facts
                 SET category = ?, value_json = ?, confidence = ?, source = ?, updated_at = ?, updated_at_ts = ?
                 WHERE id = ?",
                libsql::params![
                    updated.category.to_string(),
                    serde_json::to_string(&updated.value)?,
                    updated.confidence,
                    updated.source.to_string(),
                    rfc3339(updated.updated_at),
                    updated.updated_at.timestamp_micros(),
                    updated.id.clone(),
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to update fact: {e}")))?;

            write_audit(&tx, &updated.id, AuditOperation::Update, Some(&existing), Some(&updated))
                .await?;
            updated
        } else {
            tx.execute(
                "INSERT INTO memory_facts
                 (id, project_id, category, key, value_json, confidence, source, created_at, updated_at, updated_at_ts)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    fact.id.clone(),
                    fact.project_id.clone(),
                    fact.category.to_string(),
                    fact.key.clone(),
                    serde_json::to_string(&fact.value)?,
                    fact.confidence,
                    fact.source.to_string(),
                    rfc3339(fact.created_at),
                    rfc3339(fact.updated_at),
                    fact.updated_at.timestamp_micros(),
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to insert fact: {e}")))?;

            write_audit(&tx, &fact.id, AuditOperation::Create, None, Some(&fact)).await?;
            fact
        };

        tx.commit()
            .await
            .map_err(|e| Error::Storage(format!("Failed to commit fact: {e}")))?;

        info!(key = %stored.key, project_id = %stored.project_id, "stored fact");
        Ok(stored)
    }

    /// Query facts ordered by `confidence DESC, updated_at DESC`.
    pub async fn query_memory(&self, query: &FactQuery) -> Result<Vec<MemoryFact>> {
        let conn = self.connection()?;

        let mut sql = String::from(
            "SELECT id, project_id, category, key, value_json, confidence, source, created_at, updated_at
             FROM memory_facts WHERE confidence >= ?",
        );
        let mut params: Vec<libsql::Value> = vec![query.min_confidence.into()];

        if let Some(project_id) = &query.project_id {
            sql.push_str(" AND project_id = ?");
            params.push(project_id.clone().into());
        }
        if let Some(category) = query.category {
            sql.push_str(" AND category = ?");
            params.push(category.to_string().into());
        }
        if let Some(key) = &query.key {
            sql.push_str(" AND key LIKE ?");
            params.push(key.clone().into());
        }
        sql.push_str(" ORDER BY confidence DESC, updated_at_ts DESC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut rows = conn
            .query(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| Error::Storage(format!("Failed to query facts: {e}")))?;

        let mut facts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch fact row: {e}")))?
        {
            facts.push(row_to_fact(&row)?);
        }
        debug!(count = facts.len(), "fact query");
        Ok(facts)
    }

    /// Fetch a single fact by id.
    pub async fn get_fact_by_id(&self, id: &str) -> Result<Option<MemoryFact>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, project_id, category, key, value_json, confidence, source, created_at, updated_at
                 FROM memory_facts WHERE id = ?",
                libsql::params![id],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query fact: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch fact row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_fact(&row)?)),
            None => Ok(None),
        }
    }

    /// All facts for a project.
    pub async fn list_memory(&self, project_id: &str) -> Result<Vec<MemoryFact>> {
        self.query_memory(&FactQuery {
            project_id: Some(project_id.to_string()),
            ..FactQuery::default()
        })
        .await
    }

    /// Delete a fact by id. Returns false when the id is unknown.
    pub async fn delete_fact(&self, id: &str) -> Result<bool> {
        let Some(existing) = self.get_fact_by_id(id).await? else {
            return Ok(false);
        };

        let conn = self.connection()?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {e}")))?;

        tx.execute("DELETE FROM memory_facts WHERE id = ?", libsql::params![id])
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete fact: {e}")))?;
        write_audit(&tx, id, AuditOperation::Delete, Some(&existing), None).await?;

        tx.commit()
            .await
            .map_err(|e| Error::Storage(format!("Failed to commit delete: {e}")))?;
        info!(id, "deleted fact");
        Ok(true)
    }

    /// Most recent audit entries, newest first.
    pub async fn get_audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT id, fact_id, operation, before_json, after_json, changed_by, changed_at
                     FROM audit_log ORDER BY id DESC LIMIT {limit}"
                ),
                (),
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to query audit log: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch audit row: {e}")))?
        {
            entries.push(row_to_audit(&row)?);
        }
        Ok(entries)
    }

    /// Aggregate statistics, optionally scoped to a project.
    pub async fn get_stats(&self, project_id: Option<&str>) -> Result<FactStats> {
        let facts = match project_id {
            Some(id) => self.list_memory(id).await?,
            None => self.query_memory(&FactQuery::default()).await?,
        };

        let mut stats = FactStats {
            total_facts: facts.len(),
            ..FactStats::default()
        };
        let mut confidence_sum = 0.0;
        for fact in &facts {
            *stats.by_category.entry(fact.category.to_string()).or_insert(0) += 1;
            *stats.by_source.entry(fact.source.to_string()).or_insert(0) += 1;
            confidence_sum += fact.confidence;
        }
        if !facts.is_empty() {
            stats.avg_confidence = confidence_sum / facts.len() as f64;
        }
        Ok(stats)
    }
}

/// Group facts that share a key but disagree on value.
#[must_use]
pub fn detect_conflicts(facts: &[MemoryFact]) -> BTreeMap<String, Vec<MemoryFact>> {
    let mut by_key: BTreeMap<&str, Vec<&MemoryFact>> = BTreeMap::new();
    for fact in facts {
        by_key.entry(&fact.key).or_default().push(fact);
    }

    by_key
        .into_iter()
        .filter(|(_, group)| {
            group.len() > 1 && group.iter().any(|f| f.value != group[0].value)
        })
        .map(|(key, group)| (key.to_string(), group.into_iter().cloned().collect()))
        .collect()
}

async fn write_audit(
    tx: &libsql::Transaction,
    fact_id: &str,
    operation: AuditOperation,
    before: Option<&MemoryFact>,
    after: Option<&MemoryFact>,
) -> Result<()> {
    let before_json = before.map(serde_json::to_string).transpose()?;
    let after_json = after.map(serde_json::to_string).transpose()?;
    let changed_by = after.or(before).map_or("system".to_string(), |f| f.source.to_string());

    tx.execute(
        "INSERT INTO audit_log (fact_id, operation, before_json, after_json, changed_by, changed_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        libsql::params![
            fact_id,
            operation.to_string(),
            before_json,
            after_json,
            changed_by,
            rfc3339(Utc::now()),
        ],
    )
    .await
    .map_err(|e| Error::Storage(format!("Failed to write audit entry: {e}")))?;
    Ok(())
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Later writes must carry a strictly greater `updated_at` even under
/// coarse clocks.
fn next_update_instant(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

fn row_to_fact(row: &libsql::Row) -> Result<MemoryFact> {
    let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
    let project_id: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
    let category: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
    let key: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
    let value_json: String = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
    let confidence: f64 = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
    let source: String = row.get(6).map_err(|e| Error::Storage(e.to_string()))?;
    let created_at: String = row.get(7).map_err(|e| Error::Storage(e.to_string()))?;
    let updated_at: String = row.get(8).map_err(|e| Error::Storage(e.to_string()))?;

    Ok(MemoryFact {
        id,
        project_id,
        category: FactCategory::from_str(&category)?,
        key,
        value: serde_json::from_str(&value_json)?,
        confidence,
        source: FactSource::from_str(&source)?,
        created_at: parse_rfc3339(&created_at)?,
        updated_at: parse_rfc3339(&updated_at)?,
    })
}

fn row_to_audit(row: &libsql::Row) -> Result<AuditEntry> {
    let id: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
    let fact_id: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
    let operation: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
    let before_json: Option<String> = row.get(3).ok();
    let after_json: Option<String> = row.get(4).ok();
    let changed_by: String = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
    let changed_at: String = row.get(6).map_err(|e| Error::Storage(e.to_string()))?;

    let operation = match operation.as_str() {
        "create" => AuditOperation::Create,
        "update" => AuditOperation::Update,
        "delete" => AuditOperation::Delete,
        other => {
            return Err(Error::Storage(format!("Unknown audit operation: {other}")));
        }
    };

    Ok(AuditEntry {
        id,
        fact_id,
        operation,
        before: before_json.as_deref().map(serde_json::from_str).transpose()?,
        after: after_json.as_deref().map(serde_json::from_str).transpose()?,
        changed_by,
        changed_at: parse_rfc3339(&changed_at)?,
    })
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Invalid timestamp {s:?}: {e}")))
}
