use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::gateway::ChatGateway;
use crate::pipeline::{Pipeline, PipelineState};
use crate::prompts::PromptTemplates;
use crate::providers::OpenAI;
use crate::settings::Settings;

pub(crate) struct Session {
    pub(crate) pipeline: Pipeline<ChatGateway<OpenAI>>,
    pub(crate) state: PipelineState,
}

pub(crate) type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

struct SessionEntry {
    handle: SessionHandle,
    touched: Instant,
}

pub struct ServerState {
    pub(crate) settings: Settings,
    pub(crate) provider: OpenAI,
    pub(crate) templates: Arc<PromptTemplates>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl ServerState {
    pub fn new(settings: Settings, provider: OpenAI, templates: PromptTemplates) -> Self {
        Self {
            settings,
            provider,
            templates: Arc::new(templates),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn build_pipeline(&self, chunk_size: usize) -> Pipeline<ChatGateway<OpenAI>> {
        let gateway = ChatGateway::new(
            self.provider.clone(),
            self.templates.clone(),
            self.settings.system_prompt.clone(),
        );
        Pipeline::new(gateway).with_chunk_size(chunk_size)
    }

    /// Stores a session under a fresh random id, evicting expired sessions
    /// and then the least recently used one if the store is full.
    pub(crate) fn insert(&self, session: Session) -> (String, SessionHandle) {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let handle = Arc::new(tokio::sync::Mutex::new(session));
        let now = Instant::now();
        let mut sessions = self.lock_sessions();
        let ttl = self.settings.session_ttl;
        sessions.retain(|key, entry| {
            let keep = now.duration_since(entry.touched) < ttl;
            if !keep {
                debug!("session {} expired", key);
            }
            keep
        });
        while sessions.len() >= self.settings.max_sessions.max(1) {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(oldest) => {
                    debug!("session {} evicted; store is full", oldest);
                    sessions.remove(&oldest);
                }
                None => break,
            }
        }
        sessions.insert(
            id.clone(),
            SessionEntry {
                handle: handle.clone(),
                touched: now,
            },
        );
        (id, handle)
    }

    pub(crate) fn get(&self, id: &str) -> Option<SessionHandle> {
        let now = Instant::now();
        let mut sessions = self.lock_sessions();
        let expired = match sessions.get_mut(id) {
            Some(entry) if now.duration_since(entry.touched) < self.settings.session_ttl => {
                entry.touched = now;
                return Some(entry.handle.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!("session {} expired", id);
            sessions.remove(id);
        }
        None
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        self.lock_sessions().remove(id).is_some()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock_sessions().len()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionEntry>> {
        // A poisoned map is still structurally valid.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
