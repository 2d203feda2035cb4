// Copyright (c), Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Append-only SQLite log of analyses.

use super::types::{AnalysisCore, Condition, QueryHistory, StoredQuery};
use crate::CheckerError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS symptom_queries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symptoms TEXT NOT NULL,
    response TEXT NOT NULL,
    conditions TEXT,
    recommendations TEXT,
    created_at TEXT NOT NULL,
    session_id TEXT
);
CREATE INDEX IF NOT EXISTS idx_symptom_queries_session_id ON symptom_queries(session_id);
";

const SYMPTOMS_PREVIEW_CHARS: usize = 100;
const SUMMARY_CONDITIONS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to encode stored response: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl From<StoreError> for CheckerError {
    fn from(err: StoreError) -> Self {
        CheckerError::Persistence(err.to_string())
    }
}

/// SQLite-backed query log. One connection, serialized behind a mutex.
pub struct QueryStore {
    conn: Mutex<Connection>,
}

impl QueryStore {
    /// Open the store named by a `DATABASE_URL` value and create the schema if needed.
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        let location = database_path(database_url);
        let conn = if location == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(location))?
        };
        info!("Opened query store at {}", location);
        Self::with_connection(conn)
    }

    /// In-memory store, for tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Append one analysis and return its id.
    pub fn insert(
        &self,
        symptoms: &str,
        core: &AnalysisCore,
        session_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let response = serde_json::to_string(core)?;
        let conditions = serde_json::to_string(&core.probable_conditions)?;
        let recommendations = serde_json::to_string(&core.recommendations)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO symptom_queries
                (symptoms, response, conditions, recommendations, created_at, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                symptoms,
                response,
                conditions,
                recommendations,
                created_at,
                session_id
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent first, optionally restricted to one session.
    pub fn history(
        &self,
        limit: usize,
        session_id: Option<&str>,
    ) -> Result<Vec<QueryHistory>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, symptoms, conditions, created_at
             FROM symptom_queries
             WHERE (?1 IS NULL OR session_id = ?1)
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, DateTime<Utc>>(3)?,
            ))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (id, symptoms, conditions, created_at) = row?;
            let conditions: Vec<Condition> = conditions
                .and_then(|c| serde_json::from_str(&c).ok())
                .unwrap_or_default();
            history.push(QueryHistory {
                id,
                symptoms: truncate_symptoms(&symptoms),
                created_at,
                conditions_summary: conditions_summary(&conditions),
            });
        }
        Ok(history)
    }

    pub fn get(&self, id: i64) -> Result<Option<StoredQuery>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, symptoms, response, conditions, recommendations, session_id, created_at
                 FROM symptom_queries WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, DateTime<Utc>>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, symptoms, response, conditions, recommendations, session_id, created_at)) =
            row
        else {
            return Ok(None);
        };

        let full_response: AnalysisCore = serde_json::from_str(&response)?;
        let conditions = match conditions {
            Some(c) => serde_json::from_str(&c)?,
            None => full_response.probable_conditions.clone(),
        };
        let recommendations = match recommendations {
            Some(r) => serde_json::from_str(&r)?,
            None => full_response.recommendations.clone(),
        };

        Ok(Some(StoredQuery {
            id,
            symptoms,
            full_response,
            conditions,
            recommendations,
            session_id,
            created_at,
        }))
    }
}

/// Run one store operation on the blocking pool. Store failures surface as
/// `CheckerError::Persistence`.
pub async fn run_blocking<T, F>(store: Arc<QueryStore>, op: F) -> Result<T, CheckerError>
where
    F: FnOnce(&QueryStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let value = tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| CheckerError::Internal(format!("store task failed: {e}")))??;
    Ok(value)
}

/// Filesystem location named by a `DATABASE_URL` value.
///
/// `sqlite://` and `sqlite+aiosqlite://` are stripped and the rest is the path, so
/// `sqlite:///var/lib/x.db` is absolute. The four-slash form `sqlite:////abs.db` is absolute
/// too, and `sqlite:///./x.db` is relative. `sqlite:path`, a bare path and `:memory:` pass
/// through.
pub fn database_path(database_url: &str) -> &str {
    let url = database_url.trim();
    let Some(rest) = ["sqlite+aiosqlite://", "sqlite://"]
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix))
    else {
        return url.strip_prefix("sqlite:").unwrap_or(url);
    };
    if rest.starts_with("//") || rest.starts_with("/./") || rest.starts_with("/../") {
        &rest[1..]
    } else {
        rest
    }
}

pub fn truncate_symptoms(symptoms: &str) -> String {
    if symptoms.chars().count() > SYMPTOMS_PREVIEW_CHARS {
        let head: String = symptoms.chars().take(SYMPTOMS_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        symptoms.to_string()
    }
}

pub fn conditions_summary(conditions: &[Condition]) -> String {
    if conditions.is_empty() {
        return "No conditions identified".to_string();
    }
    let mut summary = conditions
        .iter()
        .take(SUMMARY_CONDITIONS)
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    if conditions.len() > SUMMARY_CONDITIONS {
        summary.push_str(&format!(
            " and {} more",
            conditions.len() - SUMMARY_CONDITIONS
        ));
    }
    summary
}
