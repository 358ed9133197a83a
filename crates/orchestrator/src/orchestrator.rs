//! Per-utterance pipeline

use std::sync::Arc;

use tokio::time::{Duration, Instant};

use companion_adapters::{
    AdapterError, AdapterJob, Dispatcher, JobOutcome, JobPayload, Lane, PlaceOutcome,
};
use companion_audit::{AuditEvent, AuditSink};
use companion_config::DeadlineSettings;
use companion_core::{
    AudioInEvent, Classification, GuardDecision, Intent, Outcome, RejectReason, ResponseEnvelope,
    Urgency, Utterance,
};
use companion_emergency::{EmergencyDispatcher, OpenRequest};
use companion_guard::{PostGuard, PreGuard, RulesEngine};
use companion_intent::IntentParser;
use companion_policy::{PolicySnapshot, PolicyStore};

use crate::bus::{AdapterResultEvent, Bus, GuardVerdictEvent, IntentResolvedEvent};
use crate::deadline::Deadline;
use crate::responses;
use crate::session::{PendingConfirmation, Session, SessionManager};

const AFFIRMATIVES: &[&str] = &["确认", "好的", "是的", "係", "confirm", "yes", "okay", "ok"];
const NEGATIVES: &[&str] = &["取消", "不要", "不用", "算了", "cancel", "no"];

/// Reserve kept back from the LLM slice so the adapter stage still has room.
const ADAPTER_RESERVE: Duration = Duration::from_millis(300);

/// Composes the pipeline: rules, optional LLM, post-guard, adapter dispatch,
/// response envelope.
pub struct Orchestrator {
    policy: Arc<PolicyStore>,
    post_guard: PostGuard,
    intent: Arc<dyn IntentParser>,
    jobs: Arc<Dispatcher>,
    emergency: EmergencyDispatcher,
    sessions: Arc<SessionManager>,
    audit: AuditSink,
    bus: Arc<Bus>,
    deadlines: DeadlineSettings,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        policy: Arc<PolicyStore>,
        intent: Arc<dyn IntentParser>,
        jobs: Arc<Dispatcher>,
        emergency: EmergencyDispatcher,
        sessions: Arc<SessionManager>,
        audit: AuditSink,
        deadlines: DeadlineSettings,
    ) -> Arc<Self> {
        let bus = Arc::new(Bus::new());

        let orchestrator = Arc::new(Self {
            policy,
            post_guard: PostGuard::new(),
            intent,
            jobs,
            emergency,
            sessions,
            audit,
            bus,
            deadlines,
        });

        orchestrator.spawn_forwarders();
        orchestrator
    }

    /// Pipe incident and audit streams onto the bus, and clear the session's
    /// incident handle once its incident goes terminal.
    fn spawn_forwarders(self: &Arc<Self>) {
        let bus = self.bus.clone();
        let sessions = self.sessions.clone();
        let mut incidents = self.emergency.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = incidents.recv().await {
                if matches!(event.state.as_str(), "resolved" | "exhausted") {
                    if let Some(session) = sessions.get(&event.session_id) {
                        session.context.write().active_incident = None;
                    }
                }
                bus.publish_incident(event);
            }
        });

        let bus = self.bus.clone();
        let mut records = self.audit.subscribe();
        tokio::spawn(async move {
            while let Ok(record) = records.recv().await {
                bus.publish_audit(record);
            }
        });
    }

    pub fn bus(&self) -> Arc<Bus> {
        self.bus.clone()
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        self.sessions.clone()
    }

    pub fn emergency(&self) -> &EmergencyDispatcher {
        &self.emergency
    }

    pub fn policy(&self) -> Arc<PolicyStore> {
        self.policy.clone()
    }

    /// Process one audio-in event through to a response envelope.
    pub async fn handle_event(&self, event: AudioInEvent, session_id: &str) -> ResponseEnvelope {
        let started = Instant::now();
        let language = event.language;

        let session = match self.sessions.get_or_create(session_id) {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!(%error, "Session unavailable");
                return ResponseEnvelope::new(
                    responses::busy(language),
                    language,
                    Urgency::Normal,
                    Outcome::Busy,
                );
            }
        };

        let snapshot = self.policy.snapshot();
        let deadline = Deadline::from_now(Duration::from_millis(self.deadlines.utterance_ms));
        let utterance = Arc::new(Utterance::from_event(event, session_id));

        self.bus.publish_utterance(utterance.clone());
        metrics::counter!("companion_utterances_total").increment(1);

        let envelope = self
            .run_pipeline(&session, &snapshot, &utterance, deadline)
            .await;

        metrics::histogram!("companion_pipeline_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        self.audit.emit(
            AuditEvent::new(session_id, "response", envelope.urgency.as_str())
                .utterance(utterance.id)
                .payload(serde_json::json!({
                    "text": envelope.response_text,
                    "elapsed_ms": started.elapsed().as_millis() as u64,
                })),
        );

        envelope
    }

    async fn run_pipeline(
        &self,
        session: &Arc<Session>,
        snapshot: &Arc<PolicySnapshot>,
        utterance: &Arc<Utterance>,
        deadline: Deadline,
    ) -> ResponseEnvelope {
        let language = utterance.language;

        // 1. Pre-guard on raw text
        let pre = PreGuard::check(&utterance.text, snapshot);
        self.bus.publish_verdict(GuardVerdictEvent {
            session_id: session.id.clone(),
            utterance_id: utterance.id,
            stage: "pre",
            verdict: pre.clone(),
        });
        if pre.is_deny() {
            self.audit_verdict(session, utterance.id, "pre_guard", &pre);
            self.remember(session, utterance);
            return self.speak(
                session,
                ResponseEnvelope::new(
                    responses::reject_policy(language),
                    language,
                    Urgency::Normal,
                    Outcome::Rejected {
                        reason: "policy".to_string(),
                    },
                ),
                &deadline,
            );
        }

        // 2. Rules engine
        let rules_started = Instant::now();
        let view = session.context.read().view();
        let outcome = RulesEngine::classify(utterance, snapshot, &view);
        metrics::histogram!("companion_rules_duration_seconds")
            .record(rules_started.elapsed().as_secs_f64());
        metrics::counter!("companion_classifications_total", "kind" => outcome.classification.label())
            .increment(1);
        self.audit.emit(
            AuditEvent::new(&session.id, "rules", outcome.classification.label())
                .utterance(utterance.id)
                .payload(serde_json::json!({
                    "matched_rules": outcome.matched_rules,
                })),
        );

        // 3. Emergency bypass: no lock, no LLM, no post-guard
        if let Classification::Emergency { severity, category, .. } = &outcome.classification {
            return self.handle_emergency(session, utterance, *severity, *category, snapshot);
        }

        // Non-emergency work serializes per session so context writes land
        // in arrival order
        let _turn = session.turn_lock.lock().await;

        if let Some(word) = &outcome.wakeword {
            tracing::debug!(session_id = %session.id, wakeword = %word, "Attention window refreshed");
            session.context.write().open_attention(Duration::from_secs(
                snapshot.timers.attention_window_seconds,
            ));
        }

        // 4. Pending confirmation window
        if let Some(envelope) = self
            .resolve_pending(session, snapshot, utterance, &deadline)
            .await
        {
            self.remember(session, utterance);
            return envelope;
        }

        // 5. Typed intent: direct from the rules, or through the LLM
        let intent = match outcome.classification {
            Classification::DirectIntent { intent, .. } => intent,
            Classification::RouteToLlm => {
                match self.call_llm(session, snapshot, utterance, &deadline).await {
                    Ok(intent) => intent,
                    Err(envelope) => {
                        self.remember(session, utterance);
                        return envelope;
                    }
                }
            }
            Classification::Reject { reason } => {
                self.remember(session, utterance);
                let text = match reason {
                    RejectReason::LowConfidence => responses::reject_low_confidence(language),
                    RejectReason::Policy => responses::reject_policy(language),
                };
                return self.speak(
                    session,
                    ResponseEnvelope::new(
                        text,
                        language,
                        Urgency::Normal,
                        Outcome::Rejected {
                            reason: reason.as_str().to_string(),
                        },
                    ),
                    &deadline,
                );
            }
            Classification::Emergency { .. } => unreachable!("handled above"),
        };

        self.bus.publish_intent(IntentResolvedEvent {
            session_id: session.id.clone(),
            utterance_id: utterance.id,
            intent: intent.clone(),
        });

        // 6. Post-guard
        let view = session.context.read().view();
        let verdict = self
            .post_guard
            .check(&session.id, language, &intent, &view, snapshot);
        self.bus.publish_verdict(GuardVerdictEvent {
            session_id: session.id.clone(),
            utterance_id: utterance.id,
            stage: "post",
            verdict: verdict.clone(),
        });
        self.audit_verdict(session, utterance.id, "post_guard", &verdict);
        metrics::counter!("companion_guard_decisions_total", "decision" => verdict.decision.as_str())
            .increment(1);

        let envelope = match verdict.decision {
            GuardDecision::Deny => {
                let reason = verdict
                    .reasons
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "policy".to_string());
                ResponseEnvelope::new(
                    responses::deny(language, &reason),
                    language,
                    Urgency::Normal,
                    Outcome::Denied { reason },
                )
            }
            GuardDecision::Elevate => {
                let opened = self.emergency.open(
                    OpenRequest {
                        session_id: session.id.clone(),
                        severity: 2,
                        category: companion_core::EmergencyCategory::Elevation,
                        utterance_id: Some(utterance.id),
                    },
                    snapshot.clone(),
                );
                session.context.write().active_incident = Some(opened.incident_id);
                ResponseEnvelope::new(
                    responses::elevated(language),
                    language,
                    Urgency::Calming,
                    Outcome::EmergencyAccepted {
                        incident_id: opened.incident_id,
                    },
                )
            }
            GuardDecision::AllowWithConfirm => {
                let prompt = verdict
                    .confirm_prompt
                    .clone()
                    .unwrap_or_else(|| responses::reject_policy(language).to_string());
                session.context.write().set_pending(PendingConfirmation {
                    intent,
                    prompt: prompt.clone(),
                    expires_at: Instant::now()
                        + Duration::from_secs(snapshot.timers.confirm_window_seconds),
                });
                ResponseEnvelope::new(prompt, language, Urgency::Normal, Outcome::NeedsConfirmation)
            }
            GuardDecision::Allow => {
                self.dispatch_intent(session, snapshot, utterance, intent, &deadline)
                    .await
            }
        };

        self.remember(session, utterance);
        self.speak(session, envelope, &deadline)
    }

    /// Emergency branch: accept, acknowledge, return. Fan-out continues on
    /// its own.
    fn handle_emergency(
        &self,
        session: &Arc<Session>,
        utterance: &Arc<Utterance>,
        severity: u8,
        category: companion_core::EmergencyCategory,
        snapshot: &Arc<PolicySnapshot>,
    ) -> ResponseEnvelope {
        let language = utterance.language;
        let opened = self.emergency.open(
            OpenRequest {
                session_id: session.id.clone(),
                severity,
                category,
                utterance_id: Some(utterance.id),
            },
            snapshot.clone(),
        );

        {
            let mut context = session.context.write();
            if let Err(error) = context.push_utterance((**utterance).clone()) {
                tracing::warn!(%error, "Out-of-order utterance on emergency path");
            }
            context.active_incident = Some(opened.incident_id);
        }

        let envelope = ResponseEnvelope::new(
            responses::emergency_ack(language),
            language,
            Urgency::Urgent,
            Outcome::EmergencyAccepted {
                incident_id: opened.incident_id,
            },
        );

        // The calm acknowledgement goes out whatever the fan-out does
        let job = AdapterJob::emergency(
            JobPayload::Tts {
                session_id: session.id.clone(),
                envelope: envelope.clone(),
            },
            Instant::now() + Duration::from_secs(10),
        );
        let _ = self.jobs.submit(job);

        envelope
    }

    /// Confirmation window handling. Returns the final envelope when this
    /// utterance was consumed by the window.
    async fn resolve_pending(
        &self,
        session: &Arc<Session>,
        snapshot: &Arc<PolicySnapshot>,
        utterance: &Arc<Utterance>,
        deadline: &Deadline,
    ) -> Option<ResponseEnvelope> {
        let language = utterance.language;
        let pending = session.context.read().pending().cloned()?;

        if Instant::now() >= pending.expires_at {
            // Silent from the user's perspective; the log still knows
            session.context.write().take_pending();
            self.audit.emit(
                AuditEvent::new(&session.id, "confirm", "confirm_timeout")
                    .utterance(utterance.id)
                    .payload(serde_json::json!({"intent": pending.intent.kind()})),
            );
            return None;
        }

        let text = utterance.text.to_lowercase();
        if NEGATIVES.iter().any(|n| text.contains(n)) {
            session.context.write().take_pending();
            self.audit.emit(
                AuditEvent::new(&session.id, "confirm", "confirm_cancelled")
                    .utterance(utterance.id),
            );
            return Some(self.speak(
                session,
                ResponseEnvelope::new(
                    responses::cancelled(language),
                    language,
                    Urgency::Normal,
                    Outcome::Chat,
                ),
                deadline,
            ));
        }

        if AFFIRMATIVES.iter().any(|a| text.contains(a)) {
            let pending = session.context.write().take_pending()?;
            self.audit.emit(
                AuditEvent::new(&session.id, "confirm", "confirmed")
                    .utterance(utterance.id)
                    .payload(serde_json::json!({"intent": pending.intent.kind()})),
            );
            let envelope = self
                .dispatch_intent(session, snapshot, utterance, pending.intent, deadline)
                .await;
            return Some(self.speak(session, envelope, deadline));
        }

        // A different command supersedes the held one
        session.context.write().take_pending();
        self.audit.emit(
            AuditEvent::new(&session.id, "confirm", "confirm_superseded").utterance(utterance.id),
        );
        None
    }

    async fn call_llm(
        &self,
        session: &Arc<Session>,
        snapshot: &Arc<PolicySnapshot>,
        utterance: &Arc<Utterance>,
        deadline: &Deadline,
    ) -> Result<Intent, ResponseEnvelope> {
        let language = utterance.language;
        let summary = session.context.read().summary_fingerprint();
        let remaining = deadline.remaining_less(ADAPTER_RESERVE);
        let started = Instant::now();

        match self
            .intent
            .parse(utterance, &summary, snapshot, remaining)
            .await
        {
            Ok(intent) => {
                metrics::histogram!("companion_llm_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                self.audit.emit(
                    AuditEvent::new(&session.id, "intent", intent.kind())
                        .utterance(utterance.id)
                        .payload(serde_json::json!({
                            "elapsed_ms": started.elapsed().as_millis() as u64,
                            "session_summary": summary,
                        })),
                );
                Ok(intent)
            }
            Err(failure) => {
                metrics::counter!("companion_intent_failures_total", "code" => failure.code())
                    .increment(1);
                self.audit.emit(
                    AuditEvent::new(&session.id, "intent", failure.code())
                        .utterance(utterance.id)
                        .payload(serde_json::json!({
                            "elapsed_ms": started.elapsed().as_millis() as u64,
                        })),
                );
                // Conservative fallback; never a fabricated intent
                Err(self.speak(
                    session,
                    ResponseEnvelope::new(
                        responses::chat_fallback(language),
                        language,
                        Urgency::Normal,
                        Outcome::Chat,
                    ),
                    deadline,
                ))
            }
        }
    }

    /// Map an allowed intent onto adapter work and wait for the terminal
    /// outcome within the remaining budget.
    async fn dispatch_intent(
        &self,
        session: &Arc<Session>,
        snapshot: &Arc<PolicySnapshot>,
        utterance: &Arc<Utterance>,
        intent: Intent,
        deadline: &Deadline,
    ) -> ResponseEnvelope {
        let language = utterance.language;

        match intent {
            Intent::SmartHome { device, action, room, .. } => {
                let safety_critical = snapshot
                    .device(&device)
                    .map(|f| f.safety_critical)
                    .unwrap_or(false);

                let job = AdapterJob::new(
                    JobPayload::SmartHome {
                        device: device.clone(),
                        action: action.clone(),
                        params: serde_json::json!({ "room": room }),
                    },
                    deadline.instant(),
                );

                let handle = match self.jobs.submit(job) {
                    Ok(handle) => handle,
                    Err(AdapterError::Busy) => {
                        self.audit_adapter(session, utterance.id, "smart_home", "busy");
                        return ResponseEnvelope::new(
                            responses::busy(language),
                            language,
                            Urgency::Normal,
                            Outcome::Busy,
                        );
                    }
                    Err(error) => {
                        self.audit_adapter(session, utterance.id, "smart_home", "failed");
                        return ResponseEnvelope::new(
                            responses::adapter_failed(language),
                            language,
                            Urgency::Calming,
                            Outcome::Failed {
                                reason: error.to_string(),
                            },
                        );
                    }
                };

                let job_id = handle.id();
                match tokio::time::timeout(deadline.remaining(), handle.outcome()).await {
                    Ok(Ok(_)) => {
                        self.publish_adapter_result(session, utterance.id, job_id, "smart_home", "ok");
                        ResponseEnvelope::new(
                            responses::completed(language),
                            language,
                            Urgency::Normal,
                            Outcome::Completed,
                        )
                    }
                    Ok(Err(AdapterError::Busy)) => {
                        self.publish_adapter_result(session, utterance.id, job_id, "smart_home", "busy");
                        ResponseEnvelope::new(
                            responses::busy(language),
                            language,
                            Urgency::Normal,
                            Outcome::Busy,
                        )
                    }
                    Ok(Err(error)) => {
                        self.publish_adapter_result(
                            session,
                            utterance.id,
                            job_id,
                            "smart_home",
                            "failed",
                        );
                        if safety_critical {
                            self.notify_caregiver_of_failure(session, snapshot, &device);
                        }
                        ResponseEnvelope::new(
                            responses::adapter_failed(language),
                            language,
                            Urgency::Calming,
                            Outcome::Failed {
                                reason: error.to_string(),
                            },
                        )
                    }
                    Err(_) => {
                        // Deadline missed: best-effort response, side effect
                        // may still land
                        self.audit_adapter(session, utterance.id, "smart_home", "deadline_missed");
                        ResponseEnvelope::new(
                            responses::adapter_failed(language),
                            language,
                            Urgency::Calming,
                            Outcome::Failed {
                                reason: "deadline_missed".to_string(),
                            },
                        )
                    }
                }
            }

            Intent::AssistMove { target, .. } => {
                // The motion stack consumes the validated intent from the bus
                self.audit_adapter(session, utterance.id, "assist_move", "published");
                ResponseEnvelope::new(
                    responses::moving(language, &target),
                    language,
                    Urgency::Normal,
                    Outcome::Completed,
                )
            }

            Intent::CallEmergency { callee, .. } => {
                let Some(contact) = snapshot.contact(&callee).cloned() else {
                    return ResponseEnvelope::new(
                        responses::deny(language, "callee_not_in_ladder"),
                        language,
                        Urgency::Normal,
                        Outcome::Denied {
                            reason: "callee_not_in_ladder".to_string(),
                        },
                    );
                };

                // Through the calling queue: same concurrency cap, retry
                // classification and backpressure as every other adapter
                let job = AdapterJob::new(
                    JobPayload::Calling {
                        contact,
                        incident_id: uuid::Uuid::new_v4(),
                        step_seq: 1,
                    },
                    deadline.instant(),
                );

                let handle = match self.jobs.submit(job) {
                    Ok(handle) => handle,
                    Err(AdapterError::Busy) => {
                        self.audit_adapter(session, utterance.id, "call", "busy");
                        return ResponseEnvelope::new(
                            responses::busy(language),
                            language,
                            Urgency::Normal,
                            Outcome::Busy,
                        );
                    }
                    Err(error) => {
                        self.audit_adapter(session, utterance.id, "call", "failed");
                        return ResponseEnvelope::new(
                            responses::adapter_failed(language),
                            language,
                            Urgency::Calming,
                            Outcome::Failed {
                                reason: error.to_string(),
                            },
                        );
                    }
                };

                let job_id = handle.id();
                match tokio::time::timeout(deadline.remaining(), handle.outcome()).await {
                    Ok(Ok(JobOutcome::CallPlaced(PlaceOutcome::Accepted))) => {
                        self.publish_adapter_result(session, utterance.id, job_id, "call", "placed");
                        ResponseEnvelope::new(
                            responses::calling(language, &callee),
                            language,
                            Urgency::Normal,
                            Outcome::Completed,
                        )
                    }
                    Ok(Err(AdapterError::Busy)) => {
                        self.publish_adapter_result(session, utterance.id, job_id, "call", "busy");
                        ResponseEnvelope::new(
                            responses::busy(language),
                            language,
                            Urgency::Normal,
                            Outcome::Busy,
                        )
                    }
                    Ok(_) => {
                        self.publish_adapter_result(session, utterance.id, job_id, "call", "failed");
                        ResponseEnvelope::new(
                            responses::adapter_failed(language),
                            language,
                            Urgency::Calming,
                            Outcome::Failed {
                                reason: "call_failed".to_string(),
                            },
                        )
                    }
                    Err(_) => {
                        self.audit_adapter(session, utterance.id, "call", "deadline_missed");
                        ResponseEnvelope::new(
                            responses::adapter_failed(language),
                            language,
                            Urgency::Calming,
                            Outcome::Failed {
                                reason: "deadline_missed".to_string(),
                            },
                        )
                    }
                }
            }

            Intent::Chat { style } => {
                let text = match style.as_deref() {
                    Some("greeting") => responses::greeting(language),
                    _ => responses::chat_reply(language),
                };
                ResponseEnvelope::new(text, language, Urgency::Normal, Outcome::Chat)
            }
        }
    }

    fn notify_caregiver_of_failure(
        &self,
        session: &Arc<Session>,
        snapshot: &Arc<PolicySnapshot>,
        device: &str,
    ) {
        let Some(contact) = snapshot.contact("caregiver").or_else(|| snapshot.contact_ladder.first())
        else {
            return;
        };
        let job = AdapterJob::new(
            JobPayload::Notify {
                channel: companion_adapters::NotifyChannel::Sms,
                recipient: contact.phone.clone(),
                template_id: "device_failure".to_string(),
                fields: serde_json::json!({
                    "session_id": session.id,
                    "device": device,
                }),
            },
            Instant::now() + Duration::from_secs(60),
        );
        let _ = self.jobs.submit(job);
    }

    /// Append the utterance to the session ring.
    fn remember(&self, session: &Arc<Session>, utterance: &Arc<Utterance>) {
        let mut context = session.context.write();
        if let Err(error) = context.push_utterance((**utterance).clone()) {
            tracing::warn!(session_id = %session.id, %error, "Utterance not recorded");
        }
    }

    /// Hand the envelope to the TTS adapter and pass it through.
    fn speak(
        &self,
        session: &Arc<Session>,
        envelope: ResponseEnvelope,
        deadline: &Deadline,
    ) -> ResponseEnvelope {
        // A blown deadline truncates later work: no TTS for a reply the bus
        // has already worked around
        if !deadline.expired() {
            let job = AdapterJob {
                id: uuid::Uuid::new_v4(),
                payload: JobPayload::Tts {
                    session_id: session.id.clone(),
                    envelope: envelope.clone(),
                },
                attempts: 0,
                deadline: deadline.instant(),
                lane: Lane::Normal,
            };
            let _ = self.jobs.submit(job);
        }
        envelope
    }

    fn audit_verdict(
        &self,
        session: &Arc<Session>,
        utterance_id: u64,
        stage: &'static str,
        verdict: &companion_core::GuardVerdict,
    ) {
        self.audit.emit(
            AuditEvent::new(&session.id, stage, verdict.decision.as_str())
                .utterance(utterance_id)
                .payload(serde_json::json!({
                    "reasons": verdict.reasons,
                    "constraints_violated": verdict.constraints_violated,
                })),
        );
    }

    fn audit_adapter(
        &self,
        session: &Arc<Session>,
        utterance_id: u64,
        kind: &'static str,
        outcome: &'static str,
    ) {
        self.audit.emit(
            AuditEvent::new(&session.id, "adapter", outcome)
                .utterance(utterance_id)
                .payload(serde_json::json!({"kind": kind})),
        );
    }

    fn publish_adapter_result(
        &self,
        session: &Arc<Session>,
        utterance_id: u64,
        job_id: uuid::Uuid,
        kind: &'static str,
        outcome: &'static str,
    ) {
        self.audit_adapter(session, utterance_id, kind, outcome);
        self.bus.publish_adapter_result(AdapterResultEvent {
            session_id: session.id.clone(),
            utterance_id: Some(utterance_id),
            job_id,
            kind,
            outcome: outcome.to_string(),
        });
    }
}
