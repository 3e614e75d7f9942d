use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use super::repository::{SessionDocument, SessionRepository};
use super::SessionError;
use crate::models::Language;

#[derive(Default)]
struct SessionSlot {
    /// Set by eviction while holding the lock; waiters must re-resolve.
    evicted: bool,
    document: Option<SessionDocument>,
    last_access: Option<DateTime<Utc>>,
}

/// Per-session exclusive locking over a document repository.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<SessionSlot>>>,
    repository: Arc<dyn SessionRepository>,
    lock_timeout: Duration,
    idle_timeout: Duration,
}

/// Exclusive access to one session until dropped.
///
/// Document methods hit the repository synchronously; call them off the
/// async executor.
pub struct SessionHandle {
    session_id: String,
    slot: OwnedMutexGuard<SessionSlot>,
    repository: Arc<dyn SessionRepository>,
}

impl SessionStore {
    pub fn new(repository: Arc<dyn SessionRepository>, lock_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            repository,
            lock_timeout,
            idle_timeout,
        }
    }

    /// Sessions currently tracked in memory.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Lock `session_id`, waiting at most `lock_timeout`.
    pub async fn acquire(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        let started = tokio::time::Instant::now();
        let deadline = started + self.lock_timeout;

        loop {
            let slot = self
                .sessions
                .entry(session_id.to_string())
                .or_default()
                .clone();

            let mut guard = match tokio::time::timeout_at(deadline, slot.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    let waited_ms = started.elapsed().as_millis();
                    tracing::warn!(session = %session_id, waited_ms, "Session lock wait timed out");
                    return Err(SessionError::LockTimeout {
                        session_id: session_id.to_string(),
                        waited_ms,
                    });
                }
            };

            if guard.evicted {
                continue;
            }

            guard.last_access = Some(Utc::now());
            return Ok(SessionHandle {
                session_id: session_id.to_string(),
                slot: guard,
                repository: self.repository.clone(),
            });
        }
    }

    /// Drop sessions idle since before `now - idle_timeout`.
    ///
    /// Busy sessions are skipped. Returns the number of in-memory slots
    /// evicted; persisted documents past the cutoff are deleted as well.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        let idle = chrono::Duration::from_std(self.idle_timeout)
            .map_err(|e| SessionError::Storage(format!("Idle timeout out of range: {e}")))?;
        let cutoff = now - idle;

        let candidates: Vec<(String, Arc<Mutex<SessionSlot>>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut evicted = 0;
        for (id, slot) in candidates {
            let Ok(mut guard) = slot.try_lock() else {
                continue;
            };
            let stale = guard.last_access.map_or(true, |t| t < cutoff);
            if stale {
                guard.evicted = true;
                self.sessions.remove(&id);
                self.repository.delete(&id)?;
                evicted += 1;
            }
        }

        let persisted = self.repository.delete_idle(cutoff)?;
        if evicted > 0 || persisted > 0 {
            tracing::info!(evicted, persisted, "Evicted idle sessions");
        }
        Ok(evicted)
    }

    /// Run `evict_idle` every `interval` until the runtime shuts down.
    pub fn spawn_eviction(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let store = self.clone();
                let result = tokio::task::spawn_blocking(move || store.evict_idle(Utc::now())).await;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Session eviction failed"),
                    Err(e) => tracing::error!(error = %e, "Session eviction task panicked"),
                }
            }
        })
    }
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The session document, loaded on first use or created empty.
    pub fn document(&mut self, language: Language) -> Result<&mut SessionDocument, SessionError> {
        let doc = match self.slot.document.take() {
            Some(doc) => doc,
            None => match self.repository.load(&self.session_id)? {
                Some(doc) => doc,
                None => {
                    tracing::debug!(session = %self.session_id, "Creating new session");
                    SessionDocument::new(language)
                }
            },
        };
        Ok(self.slot.document.insert(doc))
    }

    /// Persist the document with a fresh access time.
    pub fn commit(&mut self) -> Result<(), SessionError> {
        if let Some(doc) = self.slot.document.as_mut() {
            doc.last_access = Utc::now();
            self.repository.save(&self.session_id, doc)?;
        }
        Ok(())
    }

    /// Clear state and record, keeping the session's language.
    pub fn reset(&mut self, language: Language) -> Result<(), SessionError> {
        self.document(language)?.reset();
        self.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;
    use crate::session::InMemoryRepository;

    fn store(lock_timeout: Duration) -> (Arc<SessionStore>, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let store = SessionStore::new(repo.clone(), lock_timeout, Duration::from_secs(3600));
        (Arc::new(store), repo)
    }

    #[tokio::test]
    async fn document_persists_between_handles() {
        let (store, repo) = store(Duration::from_secs(1));
        {
            let mut handle = store.acquire("s1").await.unwrap();
            let doc = handle.document(Language::It).unwrap();
            doc.state.chat_history.push(ChatMessage::user("ciao"));
            handle.commit().unwrap();
        }
        assert_eq!(repo.load("s1").unwrap().unwrap().state.chat_history.len(), 1);

        let mut handle = store.acquire("s1").await.unwrap();
        let doc = handle.document(Language::En).unwrap();
        assert_eq!(doc.state.language, Language::It);
        assert_eq!(doc.state.chat_history[0].content, "ciao");
    }

    #[tokio::test]
    async fn second_waiter_times_out() {
        let (store, _) = store(Duration::from_millis(50));
        let _held = store.acquire("s1").await.unwrap();
        match store.acquire("s1").await {
            Err(SessionError::LockTimeout { session_id, .. }) => assert_eq!(session_id, "s1"),
            other => panic!("expected LockTimeout, got {:?}", other.map(|h| h.session_id().to_string())),
        }
        // Other sessions are unaffected.
        assert!(store.acquire("s2").await.is_ok());
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        let (store, _) = store(Duration::from_secs(2));
        let held = store.acquire("s1").await.unwrap();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.acquire("s1").await.map(|h| h.session_id().to_string()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), "s1");
    }

    #[tokio::test]
    async fn reset_clears_but_keeps_language() {
        let (store, repo) = store(Duration::from_secs(1));
        let mut handle = store.acquire("s1").await.unwrap();
        let doc = handle.document(Language::It).unwrap();
        doc.record.symptoms.push("Tosse".into());
        handle.commit().unwrap();
        handle.reset(Language::En).unwrap();

        let saved = repo.load("s1").unwrap().unwrap();
        assert!(saved.record.is_empty());
        assert_eq!(saved.state.language, Language::It);
    }

    #[tokio::test]
    async fn eviction_removes_idle_and_skips_busy() {
        let (store, repo) = store(Duration::from_secs(1));
        for id in ["idle", "busy"] {
            let mut h = store.acquire(id).await.unwrap();
            h.document(Language::En).unwrap();
            h.commit().unwrap();
        }
        let _busy = store.acquire("busy").await.unwrap();

        let later = Utc::now() + chrono::Duration::hours(2);
        assert_eq!(store.evict_idle(later).unwrap(), 1);
        assert_eq!(store.active_count(), 1);
        assert!(repo.load("idle").unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_sessions_survive_eviction() {
        let (store, _) = store(Duration::from_secs(1));
        drop(store.acquire("fresh").await.unwrap());
        assert_eq!(store.evict_idle(Utc::now()).unwrap(), 0);
        assert_eq!(store.active_count(), 1);
    }

    #[tokio::test]
    async fn evicted_slot_is_recreated_on_next_acquire() {
        let (store, _) = store(Duration::from_secs(1));
        drop(store.acquire("s1").await.unwrap());
        store.evict_idle(Utc::now() + chrono::Duration::hours(2)).unwrap();
        assert_eq!(store.active_count(), 0);

        let mut handle = store.acquire("s1").await.unwrap();
        assert!(handle.document(Language::En).unwrap().state.chat_history.is_empty());
        assert_eq!(store.active_count(), 1);
    }
}
