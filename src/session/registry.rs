// src/session/registry.rs — Concurrency-safe session registry
//
// The outer map lock only guards lookup/insert/remove of entries. All state
// of one session (command, username, job tables) lives behind that
// session's own mutex, so work on unrelated sessions never contends.
// No operation holds the map lock and a session lock at the same time.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::{BackendKind, JobId, SessionKey};
use crate::dispatch::command::Command;
use crate::infra::errors::{GenBotError, Result};

type JobTable = HashMap<JobId, CancellationToken>;

struct SessionState {
    command: Command,
    username: String,
    jobs: [JobTable; 4],
    /// Set once the session is torn down. A closed entry may still be
    /// referenced by a worker that looked it up earlier; it must refuse
    /// new jobs so nothing outlives the teardown.
    closed: bool,
}

impl SessionState {
    fn new(username: &str) -> Self {
        Self {
            command: Command::Start,
            username: username.to_string(),
            jobs: Default::default(),
            closed: false,
        }
    }

    fn table(&self, kind: BackendKind) -> &JobTable {
        &self.jobs[kind.index()]
    }

    fn table_mut(&mut self, kind: BackendKind) -> &mut JobTable {
        &mut self.jobs[kind.index()]
    }

    fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for table in self.jobs.iter_mut() {
            for (_, token) in table.drain() {
                token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }
}

type SessionEntry = Arc<Mutex<SessionState>>;

/// Registry of live chat sessions and their outstanding jobs.
///
/// The registry is the sole owner of every job's cancellation token once
/// the job is registered.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn contains(&self, key: SessionKey) -> bool {
        self.sessions.read().contains_key(&key)
    }

    /// Look up a session entry without holding the map lock afterwards.
    fn entry(&self, key: SessionKey) -> Result<SessionEntry> {
        self.sessions
            .read()
            .get(&key)
            .cloned()
            .ok_or(GenBotError::SessionNotFound(key))
    }

    /// Run `f` under the session's lock. Closed sessions count as missing.
    fn with_session<T>(
        &self,
        key: SessionKey,
        f: impl FnOnce(&mut SessionState) -> Result<T>,
    ) -> Result<T> {
        let entry = self.entry(key)?;
        let mut state = entry.lock();
        if state.closed {
            return Err(GenBotError::SessionNotFound(key));
        }
        f(&mut state)
    }

    pub fn add_session(&self, key: SessionKey, username: &str) -> Result<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&key) {
            return Err(GenBotError::AlreadyExists(key));
        }
        sessions.insert(key, Arc::new(Mutex::new(SessionState::new(username))));
        Ok(())
    }

    /// Remove a session without touching its jobs. Callers that need the
    /// jobs stopped use [`SessionRegistry::stop_session`] instead.
    pub fn delete_session(&self, key: SessionKey) -> Result<()> {
        self.close(key, false).map(|_| ())
    }

    /// Cancel every job of the session, then remove it. Returns the number
    /// of jobs cancelled.
    pub fn stop_session(&self, key: SessionKey) -> Result<usize> {
        self.close(key, true)
    }

    fn close(&self, key: SessionKey, cancel_jobs: bool) -> Result<usize> {
        let entry = self.entry(key)?;
        let cancelled = {
            let mut state = entry.lock();
            if state.closed {
                return Err(GenBotError::SessionNotFound(key));
            }
            let cancelled = if cancel_jobs { state.cancel_all() } else { 0 };
            state.closed = true;
            cancelled
        };

        let mut sessions = self.sessions.write();
        if sessions
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &entry))
        {
            sessions.remove(&key);
        }
        Ok(cancelled)
    }

    pub fn set_command(&self, key: SessionKey, command: Command) -> Result<()> {
        self.with_session(key, |state| {
            state.command = command;
            Ok(())
        })
    }

    pub fn command(&self, key: SessionKey) -> Result<Command> {
        self.with_session(key, |state| Ok(state.command))
    }

    pub fn username(&self, key: SessionKey) -> Result<String> {
        self.with_session(key, |state| Ok(state.username.clone()))
    }

    pub fn set_username(&self, key: SessionKey, username: &str) -> Result<()> {
        self.with_session(key, |state| {
            if state.username != username {
                state.username = username.to_string();
            }
            Ok(())
        })
    }

    /// Install a job's cancellation token. Duplicate ids are refused and the
    /// existing registration is left untouched.
    pub fn add_job(
        &self,
        key: SessionKey,
        kind: BackendKind,
        id: JobId,
        token: CancellationToken,
    ) -> Result<()> {
        self.with_session(key, |state| {
            let table = state.table_mut(kind);
            if table.contains_key(&id) {
                return Err(GenBotError::AlreadyUsed {
                    session: key,
                    kind,
                    id,
                });
            }
            table.insert(id, token);
            Ok(())
        })
    }

    /// Cancel a job and free its slot. Also used to unregister a job that
    /// finished on its own; cancelling a finished token is a no-op.
    pub fn cancel_job(&self, key: SessionKey, kind: BackendKind, id: JobId) -> Result<()> {
        self.with_session(key, |state| match state.table_mut(kind).remove(&id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(GenBotError::JobNotFound {
                session: key,
                kind,
                id,
            }),
        })
    }

    /// Cancel a job by number alone, searching kinds in [`BackendKind::ALL`]
    /// order. Returns the kind that held the job.
    pub fn cancel_job_any(&self, key: SessionKey, id: JobId) -> Result<BackendKind> {
        self.with_session(key, |state| {
            for kind in BackendKind::ALL {
                if let Some(token) = state.table_mut(kind).remove(&id) {
                    token.cancel();
                    return Ok(kind);
                }
            }
            Err(GenBotError::JobNotFound {
                session: key,
                kind: BackendKind::ChatGpt,
                id,
            })
        })
    }

    pub fn cancel_all_jobs(&self, key: SessionKey) -> Result<usize> {
        self.with_session(key, |state| Ok(state.cancel_all()))
    }

    pub fn count_jobs(&self, key: SessionKey, kind: BackendKind) -> Result<usize> {
        self.with_session(key, |state| Ok(state.table(kind).len()))
    }

    /// Job ids of one kind, ascending.
    pub fn list_job_ids(&self, key: SessionKey, kind: BackendKind) -> Result<Vec<JobId>> {
        self.with_session(key, |state| {
            let mut ids: Vec<JobId> = state.table(kind).keys().copied().collect();
            ids.sort();
            Ok(ids)
        })
    }

    /// Tear down every session, cancelling all outstanding jobs.
    pub fn shutdown(&self) -> usize {
        let entries: Vec<SessionEntry> = self.sessions.write().drain().map(|(_, e)| e).collect();
        let mut cancelled = 0;
        for entry in entries {
            let mut state = entry.lock();
            cancelled += state.cancel_all();
            state.closed = true;
        }
        cancelled
    }
}
