//! Session context and session manager

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use companion_core::{Error, Intent, Utterance};
use companion_guard::SessionView;

const UTTERANCE_RING: usize = 10;
/// Stress readings halve in weight every minute
const EMOTION_HALF_LIFE_SECS: f32 = 60.0;

/// A high-risk action held for an explicit second utterance.
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub intent: Intent,
    pub prompt: String,
    pub expires_at: Instant,
}

/// Rolling per-user conversation state. Single writer (the orchestrator);
/// everyone else reads snapshots.
#[derive(Debug)]
pub struct SessionContext {
    utterances: VecDeque<Utterance>,
    last_emotion: Option<(f32, Instant)>,
    last_zone: Option<String>,
    pub active_incident: Option<Uuid>,
    pub consent_flags: Vec<String>,
    pending_confirm: Option<PendingConfirmation>,
    attention_until: Option<Instant>,
    last_utterance_id: Option<u64>,
}

impl SessionContext {
    fn new() -> Self {
        Self {
            utterances: VecDeque::with_capacity(UTTERANCE_RING),
            last_emotion: None,
            last_zone: None,
            active_incident: None,
            consent_flags: Vec::new(),
            pending_confirm: None,
            attention_until: None,
            last_utterance_id: None,
        }
    }

    /// Append to the ring, evicting the oldest past capacity.
    ///
    /// Ids are unique per session; a replayed id is rejected. An id lower
    /// than the high-water mark is still recorded: an emergency can finish
    /// ahead of an earlier in-flight utterance, and both belong in the ring
    /// with their arrival timestamps.
    pub fn push_utterance(&mut self, utterance: Utterance) -> Result<(), Error> {
        if self.utterances.iter().any(|u| u.id == utterance.id) {
            return Err(Error::Session(format!(
                "duplicate utterance id {}",
                utterance.id
            )));
        }
        self.last_utterance_id = Some(
            self.last_utterance_id
                .map_or(utterance.id, |last| last.max(utterance.id)),
        );

        if self.utterances.len() == UTTERANCE_RING {
            self.utterances.pop_front();
        }
        self.utterances.push_back(utterance);
        Ok(())
    }

    pub fn set_emotion(&mut self, stress: f32) {
        self.last_emotion = Some((stress.clamp(0.0, 1.0), Instant::now()));
    }

    pub fn set_zone(&mut self, zone: impl Into<String>) {
        self.last_zone = Some(zone.into());
    }

    pub fn open_attention(&mut self, window: Duration) {
        self.attention_until = Some(Instant::now() + window);
    }

    pub fn set_pending(&mut self, pending: PendingConfirmation) {
        self.pending_confirm = Some(pending);
    }

    pub fn take_pending(&mut self) -> Option<PendingConfirmation> {
        self.pending_confirm.take()
    }

    pub fn pending(&self) -> Option<&PendingConfirmation> {
        self.pending_confirm.as_ref()
    }

    /// Stress with exponential decay applied.
    pub fn current_stress(&self) -> Option<f32> {
        self.last_emotion.map(|(stress, t)| {
            let elapsed = t.elapsed().as_secs_f32();
            stress * 0.5f32.powf(elapsed / EMOTION_HALF_LIFE_SECS)
        })
    }

    /// Cheap read snapshot for the guards.
    pub fn view(&self) -> SessionView {
        SessionView {
            last_zone: self.last_zone.clone(),
            stress: self.current_stress(),
            attention_open: self
                .attention_until
                .map(|until| Instant::now() < until)
                .unwrap_or(false),
            has_active_incident: self.active_incident.is_some(),
        }
    }

    /// Fingerprint of the recent conversation, sent with LLM requests so
    /// replays are reproducible.
    pub fn summary_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for utterance in &self.utterances {
            hasher.update(utterance.text.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        format!("{:x}", digest)[..16].to_string()
    }

    pub fn recent_utterances(&self) -> impl Iterator<Item = &Utterance> {
        self.utterances.iter()
    }
}

/// One user session.
pub struct Session {
    pub id: String,
    pub context: RwLock<SessionContext>,
    /// Serializes the non-emergency pipeline per session so context writes
    /// happen in arrival order
    pub turn_lock: tokio::sync::Mutex<()>,
    last_activity: RwLock<Instant>,
}

impl Session {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context: RwLock::new(SessionContext::new()),
            turn_lock: tokio::sync::Mutex::new(()),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }
}

/// Session registry with capacity bound and idle expiry.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    session_timeout: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize, session_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            session_timeout,
        }
    }

    /// Fetch or create the session. Errors only when the registry is full of
    /// live sessions.
    pub fn get_or_create(&self, id: &str) -> Result<Arc<Session>, Error> {
        if let Some(session) = self.sessions.read().get(id) {
            session.touch();
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get(id) {
            session.touch();
            return Ok(session.clone());
        }

        if sessions.len() >= self.max_sessions {
            self.cleanup_expired_internal(&mut sessions);
            if sessions.len() >= self.max_sessions {
                return Err(Error::Session("max sessions reached".to_string()));
            }
        }

        let session = Arc::new(Session::new(id));
        sessions.insert(id.to_string(), session.clone());
        tracing::info!(session_id = id, "Created session");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn cleanup_expired(&self) {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_internal(&mut sessions);
    }

    fn cleanup_expired_internal(&self, sessions: &mut HashMap<String, Arc<Session>>) {
        let timeout = self.session_timeout;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            sessions.remove(&id);
            tracing::info!(session_id = %id, "Expired session");
        }
    }

    /// Background cleanup task. Returns a shutdown sender.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.cleanup_expired();
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
