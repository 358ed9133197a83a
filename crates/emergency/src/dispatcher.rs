//! Emergency dispatcher: accept path, fan-out and escalation ladder

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, Duration, Instant};
use uuid::Uuid;

use companion_adapters::{
    apply_scene, AckStatus, AdapterJob, AdapterSet, CallAck, Dispatcher, JobOutcome, JobPayload,
    NotifyChannel, PlaceOutcome,
};
use companion_audit::{AuditEvent, AuditSink};
use companion_core::EmergencyCategory;
use companion_policy::{ContactRung, PolicySnapshot};

use crate::incident::{Incident, IncidentState};

/// Request to open an incident.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub session_id: String,
    pub severity: u8,
    pub category: EmergencyCategory,
    /// Utterance that triggered the emergency, for the audit trail
    pub utterance_id: Option<u64>,
}

/// Result of the accept path.
#[derive(Debug, Clone)]
pub struct OpenOutcome {
    pub incident_id: Uuid,
    /// True when an already-active or recently-quenched incident absorbed
    /// this trigger instead of opening a new one
    pub joined_existing: bool,
    pub accept_elapsed: Duration,
}

/// Incident lifecycle event (the `incident.event` topic).
#[derive(Debug, Clone, Serialize)]
pub struct IncidentEvent {
    pub incident_id: Uuid,
    pub session_id: String,
    pub state: String,
    pub rung: Option<usize>,
    pub contact_id: Option<String>,
}

struct ActiveIncident {
    incident: Arc<Mutex<Incident>>,
    ack_tx: mpsc::UnboundedSender<CallAck>,
}

struct Inner {
    adapters: AdapterSet,
    jobs: Arc<Dispatcher>,
    audit: AuditSink,
    accept_budget: Duration,
    /// Latest incident per session, terminal ones kept for the quench window
    registry: Mutex<HashMap<String, ActiveIncident>>,
    events: broadcast::Sender<IncidentEvent>,
}

/// Runs the bypass path: opens incidents, fans out side effects, drives the
/// contact ladder to a terminal state.
#[derive(Clone)]
pub struct EmergencyDispatcher {
    inner: Arc<Inner>,
}

impl EmergencyDispatcher {
    pub fn new(
        adapters: AdapterSet,
        jobs: Arc<Dispatcher>,
        audit: AuditSink,
        accept_budget: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                adapters,
                jobs,
                audit,
                accept_budget,
                registry: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IncidentEvent> {
        self.inner.events.subscribe()
    }

    /// Active (non-terminal) incident id for a session, if any.
    pub fn active_incident(&self, session_id: &str) -> Option<Uuid> {
        let registry = self.inner.registry.lock();
        registry.get(session_id).and_then(|active| {
            let incident = active.incident.lock();
            (!incident.state.is_terminal()).then_some(incident.id)
        })
    }

    /// Read-only copy of a session's latest incident.
    pub fn incident_snapshot(&self, session_id: &str) -> Option<Incident> {
        let registry = self.inner.registry.lock();
        registry.get(session_id).map(|a| a.incident.lock().clone())
    }

    /// Accept an emergency. Returns after the fan-out is underway; the
    /// caller can speak its acknowledgement immediately.
    pub fn open(&self, request: OpenRequest, snapshot: Arc<PolicySnapshot>) -> OpenOutcome {
        let started = Instant::now();
        let inner = &self.inner;

        {
            let registry = inner.registry.lock();
            if let Some(active) = registry.get(&request.session_id) {
                let incident = active.incident.lock();
                if !incident.state.is_terminal() {
                    // At most one active incident per session: new triggers join it
                    return OpenOutcome {
                        incident_id: incident.id,
                        joined_existing: true,
                        accept_elapsed: started.elapsed(),
                    };
                }
                // Quench: a same-cause trigger shortly after a terminal
                // incident does not re-open
                if incident.category == request.category {
                    if let Some(closed_at) = incident.closed_at {
                        let quench =
                            chrono::Duration::seconds(snapshot.timers.quench_window_seconds as i64);
                        if Utc::now() - closed_at < quench {
                            return OpenOutcome {
                                incident_id: incident.id,
                                joined_existing: true,
                                accept_elapsed: started.elapsed(),
                            };
                        }
                    }
                }
            }
        }

        let incident = Incident::open(&request.session_id, request.severity, request.category);
        let incident_id = incident.id;
        let shared = Arc::new(Mutex::new(incident));
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();

        inner.registry.lock().insert(
            request.session_id.clone(),
            ActiveIncident {
                incident: shared.clone(),
                ack_tx,
            },
        );

        inner.audit.emit(
            AuditEvent::new(&request.session_id, "incident", "opened")
                .incident(incident_id)
                .payload(serde_json::json!({
                    "category": request.category.as_str(),
                    "severity": request.severity,
                    "utterance_id": request.utterance_id,
                })),
        );
        self.publish(incident_id, &request.session_id, "open", None, None);

        // Fan-out runs independently of the audio path from here on
        tokio::spawn(run_fanout(
            self.clone(),
            shared,
            snapshot,
            request.session_id.clone(),
            ack_rx,
        ));

        let accept_elapsed = started.elapsed();
        metrics::histogram!("companion_accept_latency_seconds")
            .record(accept_elapsed.as_secs_f64());

        if accept_elapsed > inner.accept_budget {
            // Quality defect, not a reason to abort: escalation continues
            metrics::counter!("companion_emergency_accept_late_total").increment(1);
            inner.audit.emit(
                AuditEvent::new(&request.session_id, "incident", "emergency_accept_late")
                    .incident(incident_id)
                    .payload(serde_json::json!({
                        "elapsed_ms": accept_elapsed.as_millis() as u64,
                        "budget_ms": inner.accept_budget.as_millis() as u64,
                    })),
            );
            tracing::warn!(
                incident_id = %incident_id,
                elapsed_ms = accept_elapsed.as_millis() as u64,
                "Emergency accept budget missed"
            );
        }

        OpenOutcome {
            incident_id,
            joined_existing: false,
            accept_elapsed,
        }
    }

    /// Deliver a callee acknowledgement to the owning ladder task.
    pub fn ack(&self, ack: CallAck) -> bool {
        let registry = self.inner.registry.lock();
        for active in registry.values() {
            if active.incident.lock().id == ack.incident_id {
                return active.ack_tx.send(ack).is_ok();
            }
        }
        false
    }

    fn publish(
        &self,
        incident_id: Uuid,
        session_id: &str,
        state: &str,
        rung: Option<usize>,
        contact_id: Option<String>,
    ) {
        let _ = self.inner.events.send(IncidentEvent {
            incident_id,
            session_id: session_id.to_string(),
            state: state.to_string(),
            rung,
            contact_id,
        });
    }

    fn transition(
        &self,
        incident: &Arc<Mutex<Incident>>,
        session_id: &str,
        next: IncidentState,
        contact_id: Option<String>,
    ) {
        let (id, label, rung) = {
            let mut guard = incident.lock();
            if let Err(error) = guard.transition(next) {
                tracing::error!(incident_id = %guard.id, %error, "Rejected incident transition");
                return;
            }
            (guard.id, next.label(), next.rung())
        };

        self.inner.audit.emit(
            AuditEvent::new(session_id, "incident", label)
                .incident(id)
                .payload(serde_json::json!({
                    "rung": rung,
                    "contact": contact_id,
                })),
        );
        self.publish(id, session_id, label, rung, contact_id);
    }
}

/// The four side-effect streams run in parallel; only the ladder is
/// sequential within itself.
async fn run_fanout(
    dispatcher: EmergencyDispatcher,
    incident: Arc<Mutex<Incident>>,
    snapshot: Arc<PolicySnapshot>,
    session_id: String,
    ack_rx: mpsc::UnboundedReceiver<CallAck>,
) {
    let inner = dispatcher.inner.clone();
    let incident_id = incident.lock().id;
    // Generous deadline: emergency side effects are not bound by the
    // utterance budget
    let deadline = Instant::now() + Duration::from_secs(600);

    // Video uplink
    let video_job = AdapterJob::emergency(
        JobPayload::Video {
            session_id: session_id.clone(),
            activate: true,
            stream_id: incident_id.to_string(),
            cameras: vec!["all".to_string()],
            access_token: incident_id.to_string(),
        },
        deadline,
    );
    if let Ok(handle) = inner.jobs.submit(video_job) {
        let audit = inner.audit.clone();
        let session = session_id.clone();
        tokio::spawn(async move {
            let outcome = match handle.outcome().await {
                Ok(_) => "video_active".to_string(),
                Err(error) => format!("video_failed:{}", error),
            };
            audit.emit(AuditEvent::new(&session, "adapter", outcome).incident(incident_id));
        });
    }

    // Emergency scene
    {
        let adapters = inner.adapters.clone();
        let audit = inner.audit.clone();
        let scene = snapshot.emergency_scene.clone();
        let session = session_id.clone();
        let step_base = incident.lock().reserve_steps(scene.commands.len() as u64);
        tokio::spawn(async move {
            let outcome =
                apply_scene(adapters.smart_home.as_ref(), &scene, incident_id, step_base, deadline)
                    .await;
            audit.emit(
                AuditEvent::new(&session, "adapter", if outcome.success { "scene_applied" } else { "scene_failed" })
                    .incident(incident_id)
                    .payload(serde_json::json!({
                        "succeeded": outcome.succeeded,
                        "failed": outcome.failed,
                    })),
            );
        });
    }

    // Notifications to every ladder contact; they retry independently and
    // never block the call ladder
    for contact in &snapshot.contact_ladder {
        if contact.sms_enabled {
            submit_notification(&inner, &session_id, incident_id, contact, NotifyChannel::Sms, deadline);
        }
        if contact.email.is_some() {
            submit_notification(&inner, &session_id, incident_id, contact, NotifyChannel::Email, deadline);
        }
    }

    // Escalation ladder
    run_ladder(dispatcher, incident, snapshot, session_id, ack_rx).await;
}

fn submit_notification(
    inner: &Arc<Inner>,
    session_id: &str,
    incident_id: Uuid,
    contact: &ContactRung,
    channel: NotifyChannel,
    deadline: Instant,
) {
    let recipient = match channel {
        NotifyChannel::Sms => contact.phone.clone(),
        NotifyChannel::Email => contact.email.clone().unwrap_or_default(),
    };
    let job = AdapterJob::emergency(
        JobPayload::Notify {
            channel,
            recipient,
            template_id: "emergency_alert".to_string(),
            fields: serde_json::json!({
                "incident_id": incident_id.to_string(),
                "contact": contact.contact_id,
            }),
        },
        deadline,
    );
    if let Ok(handle) = inner.jobs.submit(job) {
        let audit = inner.audit.clone();
        let session = session_id.to_string();
        let contact_id = contact.contact_id.clone();
        tokio::spawn(async move {
            let outcome = match handle.outcome().await {
                Ok(_) => "notified".to_string(),
                Err(error) => format!("notify_failed:{}", error),
            };
            audit.emit(
                AuditEvent::new(&session, "adapter", outcome)
                    .incident(incident_id)
                    .payload(serde_json::json!({"contact": contact_id})),
            );
        });
    }
}

async fn run_ladder(
    dispatcher: EmergencyDispatcher,
    incident: Arc<Mutex<Incident>>,
    snapshot: Arc<PolicySnapshot>,
    session_id: String,
    mut ack_rx: mpsc::UnboundedReceiver<CallAck>,
) {
    let inner = dispatcher.inner.clone();
    let incident_id = incident.lock().id;
    let retry = snapshot.retry;

    for (rung, contact) in snapshot.contact_ladder.iter().enumerate() {
        dispatcher.transition(
            &incident,
            &session_id,
            IncidentState::Calling { rung },
            Some(contact.contact_id.clone()),
        );
        incident.lock().contacts_attempted.push(contact.contact_id.clone());

        let placed = place_with_retries(&inner, &incident, contact, retry).await;

        if !placed {
            dispatcher.transition(
                &incident,
                &session_id,
                IncidentState::Failed { rung },
                Some(contact.contact_id.clone()),
            );
            dispatcher.transition(&incident, &session_id, IncidentState::Escalating { rung }, None);
            continue;
        }

        dispatcher.transition(
            &incident,
            &session_id,
            IncidentState::Waiting { rung },
            Some(contact.contact_id.clone()),
        );

        let rung_timeout = Duration::from_secs(contact.timeout_seconds);
        let wait_deadline = Instant::now() + rung_timeout;
        let reached = loop {
            match tokio::time::timeout_at(wait_deadline, ack_rx.recv()).await {
                Ok(Some(ack)) if ack.status == AckStatus::Reached => break Some(ack.contact_id),
                Ok(Some(ack)) if ack.contact_id == contact.contact_id => break None,
                // A late NotReached from an earlier rung changes nothing
                Ok(Some(_)) => continue,
                Ok(None) => return,
                Err(_) => break None,
            }
        };

        match reached {
            Some(contact_id) => {
                incident.lock().contacts_reached.push(contact_id.clone());
                dispatcher.transition(
                    &incident,
                    &session_id,
                    IncidentState::Reached { rung },
                    Some(contact_id),
                );
                dispatcher.transition(&incident, &session_id, IncidentState::Resolved, None);
                metrics::counter!("companion_incidents_total", "outcome" => "resolved").increment(1);

                // The emergency is in human hands; stop the uplink
                let job = AdapterJob::emergency(
                    JobPayload::Video {
                        session_id: session_id.clone(),
                        activate: false,
                        stream_id: incident_id.to_string(),
                        cameras: Vec::new(),
                        access_token: String::new(),
                    },
                    Instant::now() + Duration::from_secs(60),
                );
                let _ = inner.jobs.submit(job);
                return;
            }
            None => {
                dispatcher.transition(
                    &incident,
                    &session_id,
                    IncidentState::Failed { rung },
                    Some(contact.contact_id.clone()),
                );
                dispatcher.transition(&incident, &session_id, IncidentState::Escalating { rung }, None);
            }
        }
    }

    // Every contact attempted; notifications and video stay active
    dispatcher.transition(&incident, &session_id, IncidentState::Exhausted, None);
    metrics::counter!("companion_incidents_total", "outcome" => "exhausted").increment(1);
}

/// Place a call through the dispatcher's calling queue, retrying transient
/// placement failures with the fixed ladder backoff. The emergency lane
/// disables the dispatcher's own retries, so this loop is the only retry
/// policy in play.
async fn place_with_retries(
    inner: &Arc<Inner>,
    incident: &Arc<Mutex<Incident>>,
    contact: &ContactRung,
    retry: companion_policy::RetryPolicy,
) -> bool {
    let incident_id = incident.lock().id;

    for attempt in 0..=retry.call_place_retries {
        let step_seq = incident.lock().next_step();
        let job = AdapterJob::emergency(
            JobPayload::Calling {
                contact: contact.clone(),
                incident_id,
                step_seq,
            },
            Instant::now() + Duration::from_secs(30),
        );

        let outcome = match inner.jobs.submit(job) {
            Ok(handle) => handle.outcome().await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(JobOutcome::CallPlaced(PlaceOutcome::Accepted)) => return true,
            Ok(JobOutcome::CallPlaced(_)) => return false,
            Ok(JobOutcome::Completed) => {
                tracing::error!(incident_id = %incident_id, "Calling job returned non-call outcome");
                return false;
            }
            Err(error) if error.is_transient() && attempt < retry.call_place_retries => {
                tracing::warn!(
                    incident_id = %incident_id,
                    contact = %contact.contact_id,
                    attempt,
                    %error,
                    "Call placement failed, retrying"
                );
                sleep(Duration::from_millis(retry.call_place_backoff_ms)).await;
            }
            Err(error) => {
                tracing::error!(
                    incident_id = %incident_id,
                    contact = %contact.contact_id,
                    %error,
                    "Call placement failed"
                );
                return false;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_adapters::{
        AdapterError, DispatchCaps, SimNotification, SimSmartHome, SimTts, SimVideo, SimVoiceCall,
    };
    use companion_policy::{default_document, PolicySnapshot};

    struct Fixture {
        dispatcher: EmergencyDispatcher,
        calls: Arc<SimVoiceCall>,
        smart_home: Arc<SimSmartHome>,
        notify: Arc<SimNotification>,
        video: Arc<SimVideo>,
        snapshot: Arc<PolicySnapshot>,
        _audit_dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let calls = Arc::new(SimVoiceCall::new());
        let smart_home = Arc::new(SimSmartHome::new());
        let notify = Arc::new(SimNotification::new());
        let video = Arc::new(SimVideo::new());

        let adapters = AdapterSet {
            smart_home: smart_home.clone(),
            call: calls.clone(),
            notify: notify.clone(),
            video: video.clone(),
            tts: Arc::new(SimTts::new()),
        };

        let mut doc = default_document();
        // Short rungs so paused-clock tests converge fast
        for rung in &mut doc.contact_ladder {
            rung.timeout_seconds = 1;
        }
        doc.retry.call_place_backoff_ms = 1;
        let snapshot = Arc::new(PolicySnapshot::compile(&doc).unwrap());

        let audit_dir = tempfile::tempdir().unwrap();
        let audit = AuditSink::open(audit_dir.path(), 1024 * 1024).unwrap();

        let jobs = Arc::new(Dispatcher::new(
            adapters.clone(),
            snapshot.retry,
            DispatchCaps::default(),
        ));

        Fixture {
            dispatcher: EmergencyDispatcher::new(adapters, jobs, audit, Duration::from_millis(100)),
            calls,
            smart_home,
            notify,
            video,
            snapshot,
            _audit_dir: audit_dir,
        }
    }

    fn medical_request() -> OpenRequest {
        OpenRequest {
            session_id: "s1".to_string(),
            severity: 4,
            category: EmergencyCategory::Medical,
            utterance_id: Some(1),
        }
    }

    async fn wait_for_state(
        rx: &mut broadcast::Receiver<IncidentEvent>,
        state: &str,
    ) -> IncidentEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(30), rx.recv())
                .await
                .expect("timed out waiting for incident event")
                .expect("event channel closed");
            if event.state == state {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_accept_within_budget() {
        let f = fixture();
        let outcome = f.dispatcher.open(medical_request(), f.snapshot.clone());

        assert!(!outcome.joined_existing);
        assert!(outcome.accept_elapsed < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_second_trigger_joins_active_incident() {
        let f = fixture();
        let first = f.dispatcher.open(medical_request(), f.snapshot.clone());
        let second = f.dispatcher.open(medical_request(), f.snapshot.clone());

        assert!(second.joined_existing);
        assert_eq!(first.incident_id, second.incident_id);
    }

    #[tokio::test]
    async fn test_ack_resolves_incident() {
        let f = fixture();
        let mut events = f.dispatcher.subscribe();
        let outcome = f.dispatcher.open(medical_request(), f.snapshot.clone());

        wait_for_state(&mut events, "waiting").await;
        assert!(f.dispatcher.ack(CallAck {
            incident_id: outcome.incident_id,
            contact_id: "family".to_string(),
            status: AckStatus::Reached,
        }));

        wait_for_state(&mut events, "resolved").await;

        let incident = f.dispatcher.incident_snapshot("s1").unwrap();
        assert_eq!(incident.state, IncidentState::Resolved);
        assert_eq!(incident.contacts_reached, vec!["family".to_string()]);
        assert!(f.dispatcher.active_incident("s1").is_none());
    }

    #[tokio::test]
    async fn test_ladder_order_and_exhaustion() {
        let f = fixture();
        let mut events = f.dispatcher.subscribe();
        f.dispatcher.open(medical_request(), f.snapshot.clone());

        // No acks ever arrive: every rung times out
        wait_for_state(&mut events, "exhausted").await;

        let order: Vec<String> = f.calls.placed().into_iter().map(|(c, _, _)| c).collect();
        assert_eq!(order, vec!["family", "caregiver", "doctor", "emergency_services"]);

        let incident = f.dispatcher.incident_snapshot("s1").unwrap();
        assert_eq!(incident.state, IncidentState::Exhausted);
        assert_eq!(incident.contacts_attempted.len(), 4);

        // Video stays active after exhaustion
        assert!(f.video.is_active(&incident.id.to_string()));
    }

    #[tokio::test]
    async fn test_placement_failure_retries_then_advances() {
        let f = fixture();
        f.calls.script(
            "family",
            vec![
                Err(AdapterError::Transient("sip 503".to_string())),
                Err(AdapterError::Transient("sip 503".to_string())),
                Err(AdapterError::Transient("sip 503".to_string())),
            ],
        );

        let mut events = f.dispatcher.subscribe();
        let outcome = f.dispatcher.open(medical_request(), f.snapshot.clone());

        // Family fails three times (1 + 2 retries), caregiver is next
        wait_for_state(&mut events, "waiting").await;
        let family_attempts = f
            .calls
            .placed()
            .iter()
            .filter(|(c, _, _)| c == "family")
            .count();
        assert_eq!(family_attempts, 3);

        f.dispatcher.ack(CallAck {
            incident_id: outcome.incident_id,
            contact_id: "caregiver".to_string(),
            status: AckStatus::Reached,
        });
        wait_for_state(&mut events, "resolved").await;

        let incident = f.dispatcher.incident_snapshot("s1").unwrap();
        assert_eq!(incident.contacts_reached, vec!["caregiver".to_string()]);
    }

    #[tokio::test]
    async fn test_fanout_reaches_scene_and_notifications() {
        let f = fixture();
        let mut events = f.dispatcher.subscribe();
        let outcome = f.dispatcher.open(medical_request(), f.snapshot.clone());

        wait_for_state(&mut events, "waiting").await;
        f.dispatcher.ack(CallAck {
            incident_id: outcome.incident_id,
            contact_id: "family".to_string(),
            status: AckStatus::Reached,
        });
        wait_for_state(&mut events, "resolved").await;

        // Scene commands and notifications went out in parallel with the call
        for _ in 0..50 {
            if !f.smart_home.applied().is_empty() && !f.notify.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!f.smart_home.applied().is_empty());
        assert!(!f.notify.sent().is_empty());
    }

    #[tokio::test]
    async fn test_quench_window_suppresses_reopen() {
        let f = fixture();
        let mut events = f.dispatcher.subscribe();
        let first = f.dispatcher.open(medical_request(), f.snapshot.clone());

        wait_for_state(&mut events, "waiting").await;
        f.dispatcher.ack(CallAck {
            incident_id: first.incident_id,
            contact_id: "family".to_string(),
            status: AckStatus::Reached,
        });
        wait_for_state(&mut events, "resolved").await;

        // Same cause right after resolution: no new incident
        let second = f.dispatcher.open(medical_request(), f.snapshot.clone());
        assert!(second.joined_existing);
        assert_eq!(second.incident_id, first.incident_id);

        // A different category is a new emergency
        let fall = f.dispatcher.open(
            OpenRequest {
                category: EmergencyCategory::Fall,
                severity: 3,
                ..medical_request()
            },
            f.snapshot.clone(),
        );
        assert!(!fall.joined_existing);
    }
}
