//! Session persistence.
//!
//! One document per session id: the conversation state and the patient
//! record as JSON, plus the last access time used by idle eviction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::SessionError;
use crate::models::{Language, PatientRecord, SessionState};

/// Everything stored for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDocument {
    pub state: SessionState,
    pub record: PatientRecord,
    pub last_access: DateTime<Utc>,
}

impl SessionDocument {
    pub fn new(language: Language) -> Self {
        Self {
            state: SessionState::new(language),
            record: PatientRecord::new(),
            last_access: Utc::now(),
        }
    }

    /// Back to a fresh session, keeping the language.
    pub fn reset(&mut self) {
        self.state = SessionState::new(self.state.language);
        self.record = PatientRecord::new();
    }
}

/// Key-value document store for sessions.
///
/// Callers hold the per-session lock from `SessionStore` around every
/// load/save of a given id.
pub trait SessionRepository: Send + Sync {
    fn load(&self, session_id: &str) -> Result<Option<SessionDocument>, SessionError>;
    fn save(&self, session_id: &str, document: &SessionDocument) -> Result<(), SessionError>;
    fn delete(&self, session_id: &str) -> Result<(), SessionError>;
    /// Remove sessions last accessed before `cutoff`; returns how many.
    fn delete_idle(&self, cutoff: DateTime<Utc>) -> Result<usize, SessionError>;
}

// ═══════════════════════════════════════════════════════════
// In-memory
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
pub struct InMemoryRepository {
    documents: Mutex<HashMap<String, SessionDocument>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn documents(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SessionDocument>>, SessionError> {
        self.documents
            .lock()
            .map_err(|_| SessionError::Storage("In-memory repository lock poisoned".into()))
    }
}

impl SessionRepository for InMemoryRepository {
    fn load(&self, session_id: &str) -> Result<Option<SessionDocument>, SessionError> {
        Ok(self.documents()?.get(session_id).cloned())
    }

    fn save(&self, session_id: &str, document: &SessionDocument) -> Result<(), SessionError> {
        self.documents()?
            .insert(session_id.to_string(), document.clone());
        Ok(())
    }

    fn delete(&self, session_id: &str) -> Result<(), SessionError> {
        self.documents()?.remove(session_id);
        Ok(())
    }

    fn delete_idle(&self, cutoff: DateTime<Utc>) -> Result<usize, SessionError> {
        let mut docs = self.documents()?;
        let before = docs.len();
        docs.retain(|_, d| d.last_access >= cutoff);
        Ok(before - docs.len())
    }
}

// ═══════════════════════════════════════════════════════════
// SQLite
// ═══════════════════════════════════════════════════════════

const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
     CREATE TABLE IF NOT EXISTS sessions (
         session_id  TEXT PRIMARY KEY,
         state_json  TEXT NOT NULL,
         record_json TEXT NOT NULL,
         last_access TEXT NOT NULL
     );
     CREATE INDEX IF NOT EXISTS idx_sessions_last_access ON sessions(last_access);
     INSERT INTO schema_version (version) VALUES (1);",
)];

/// SQLite-backed repository, one row per session.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) the session database and run migrations.
    pub fn open(path: &Path) -> Result<Self, SessionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SessionError::Storage(e.to_string()))?;
        }
        Self::init(Connection::open(path)?)
    }

    /// In-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, SessionError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SessionError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SessionError> {
        self.conn
            .lock()
            .map_err(|_| SessionError::Storage("SQLite connection lock poisoned".into()))
    }
}

fn run_migrations(conn: &Connection) -> Result<(), SessionError> {
    let current_version = get_current_version(conn);

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            tracing::info!("Running session migration v{version}");
            conn.execute_batch(sql).map_err(|e| SessionError::MigrationFailed {
                version: *version,
                reason: e.to_string(),
            })?;
        }
    }
    Ok(())
}

/// Current schema version (0 if no schema exists yet).
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}

impl SessionRepository for SqliteRepository {
    fn load(&self, session_id: &str) -> Result<Option<SessionDocument>, SessionError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT state_json, record_json, last_access FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((state_json, record_json, last_access)) = row else {
            return Ok(None);
        };

        let state: SessionState = serde_json::from_str(&state_json)
            .map_err(|e| SessionError::Serialization(format!("state of {session_id}: {e}")))?;
        let record: PatientRecord = serde_json::from_str(&record_json)
            .map_err(|e| SessionError::Serialization(format!("record of {session_id}: {e}")))?;
        let last_access = DateTime::parse_from_rfc3339(&last_access)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| SessionError::Serialization(format!("last_access of {session_id}: {e}")))?;

        Ok(Some(SessionDocument {
            state,
            record,
            last_access,
        }))
    }

    fn save(&self, session_id: &str, document: &SessionDocument) -> Result<(), SessionError> {
        let state_json = serde_json::to_string(&document.state)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        let record_json = serde_json::to_string(&document.record)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;

        self.conn()?.execute(
            "INSERT INTO sessions (session_id, state_json, record_json, last_access)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                 state_json = excluded.state_json,
                 record_json = excluded.record_json,
                 last_access = excluded.last_access",
            params![session_id, state_json, record_json, document.last_access.to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, session_id: &str) -> Result<(), SessionError> {
        self.conn()?
            .execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])?;
        Ok(())
    }

    fn delete_idle(&self, cutoff: DateTime<Utc>) -> Result<usize, SessionError> {
        let removed = self.conn()?.execute(
            "DELETE FROM sessions WHERE last_access < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActiveAgent, ChatMessage};

    fn sample() -> SessionDocument {
        let mut doc = SessionDocument::new(Language::It);
        doc.state.chat_history.push(ChatMessage::user("mal di pancia"));
        doc.state.current_agent = ActiveAgent::Specialist("gastroenterologo".into());
        doc.state.asked_questions.push("Da quanto tempo?".into());
        doc.record.symptoms.push("Dolore addominale da ieri".into());
        doc.record
            .vital_signs
            .insert("temperature".into(), serde_json::json!(37.8));
        doc
    }

    fn exercise(repo: &dyn SessionRepository) {
        assert_eq!(repo.load("s1").unwrap(), None);

        let doc = sample();
        repo.save("s1", &doc).unwrap();
        let loaded = repo.load("s1").unwrap().unwrap();
        assert_eq!(loaded.state, doc.state);
        assert_eq!(loaded.record, doc.record);

        let mut updated = loaded.clone();
        updated.record.allergies.push("Lattosio".into());
        repo.save("s1", &updated).unwrap();
        assert_eq!(repo.load("s1").unwrap().unwrap().record.allergies, vec!["Lattosio"]);

        repo.delete("s1").unwrap();
        assert_eq!(repo.load("s1").unwrap(), None);
    }

    fn exercise_idle(repo: &dyn SessionRepository) {
        let now = Utc::now();
        let mut old = SessionDocument::new(Language::En);
        old.last_access = now - chrono::Duration::hours(2);
        let mut fresh = SessionDocument::new(Language::En);
        fresh.last_access = now;
        repo.save("old", &old).unwrap();
        repo.save("fresh", &fresh).unwrap();

        assert_eq!(repo.delete_idle(now - chrono::Duration::hours(1)).unwrap(), 1);
        assert!(repo.load("old").unwrap().is_none());
        assert!(repo.load("fresh").unwrap().is_some());
    }

    #[test]
    fn in_memory_round_trip() {
        let repo = InMemoryRepository::new();
        exercise(&repo);
        exercise_idle(&repo);
    }

    #[test]
    fn sqlite_round_trip() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        exercise(&repo);
        exercise_idle(&repo);
    }

    #[test]
    fn sqlite_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("sessions.db");
        {
            let repo = SqliteRepository::open(&path).unwrap();
            repo.save("s1", &sample()).unwrap();
        }
        let repo = SqliteRepository::open(&path).unwrap();
        let loaded = repo.load("s1").unwrap().unwrap();
        assert_eq!(loaded.state.current_agent.tag(), "gastroenterologo");
        assert_eq!(loaded.state.language, Language::It);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_current_version(&conn), 1);
    }

    #[test]
    fn reset_keeps_language() {
        let mut doc = sample();
        doc.reset();
        assert_eq!(doc.state, SessionState::new(Language::It));
        assert!(doc.record.is_empty());
    }
}
