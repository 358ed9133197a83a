//! Bounded-concurrency job executor

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::{sleep, Duration, Instant};

use companion_core::AdapterError;
use companion_policy::RetryPolicy;

use crate::job::{AdapterJob, AdapterKind, JobOutcome, Lane};
use crate::traits::{NotificationAdapter, SmartHomeAdapter, TtsAdapter, VideoAdapter, VoiceCallAdapter};
use crate::JobPayload;

/// The adapter implementations behind the dispatcher.
#[derive(Clone)]
pub struct AdapterSet {
    pub smart_home: Arc<dyn SmartHomeAdapter>,
    pub call: Arc<dyn VoiceCallAdapter>,
    pub notify: Arc<dyn NotificationAdapter>,
    pub video: Arc<dyn VideoAdapter>,
    pub tts: Arc<dyn TtsAdapter>,
}

/// Per-kind concurrency caps. Calling is additionally serialized per
/// incident through its serial key; this cap bounds the gateway across
/// simultaneously-active incidents.
#[derive(Debug, Clone, Copy)]
pub struct DispatchCaps {
    pub smart_home: usize,
    pub calling: usize,
    pub notify: usize,
    pub tts: usize,
    pub video: usize,
    pub queue_bound: usize,
}

impl Default for DispatchCaps {
    fn default() -> Self {
        Self {
            smart_home: 8,
            calling: 2,
            notify: 16,
            tts: 4,
            video: 2,
            queue_bound: 64,
        }
    }
}

type Reply = oneshot::Sender<Result<JobOutcome, AdapterError>>;

struct KindQueue {
    normal: mpsc::Sender<(AdapterJob, Reply)>,
    // Unbounded: emergency jobs are never dropped on backpressure
    emergency: mpsc::UnboundedSender<(AdapterJob, Reply)>,
}

/// Handle to one submitted job.
pub struct JobHandle {
    id: uuid::Uuid,
    rx: oneshot::Receiver<Result<JobOutcome, AdapterError>>,
}

impl JobHandle {
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> Result<JobOutcome, AdapterError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(AdapterError::Transient("dispatcher shut down".to_string())))
    }
}

/// Per-adapter-kind queues with bounded workers.
///
/// Jobs sharing a serial key (same device, same incident for calling, same
/// session for TTS/video) run one at a time; everything else runs up to the
/// kind's concurrency cap.
pub struct Dispatcher {
    queues: HashMap<AdapterKind, KindQueue>,
}

impl Dispatcher {
    pub fn new(adapters: AdapterSet, retry: RetryPolicy, caps: DispatchCaps) -> Self {
        let serial_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let mut queues = HashMap::new();
        for (kind, cap) in [
            (AdapterKind::SmartHome, caps.smart_home),
            (AdapterKind::Calling, caps.calling),
            (AdapterKind::Notify, caps.notify),
            (AdapterKind::Tts, caps.tts),
            (AdapterKind::Video, caps.video),
        ] {
            let (normal_tx, normal_rx) = mpsc::channel(caps.queue_bound);
            let (emergency_tx, emergency_rx) = mpsc::unbounded_channel();

            tokio::spawn(worker_loop(
                kind,
                cap,
                normal_rx,
                emergency_rx,
                adapters.clone(),
                retry,
                serial_locks.clone(),
            ));

            queues.insert(
                kind,
                KindQueue {
                    normal: normal_tx,
                    emergency: emergency_tx,
                },
            );
        }

        Self { queues }
    }

    /// Enqueue a job. Normal-lane overflow surfaces as `Busy`; emergency
    /// jobs always enqueue.
    pub fn submit(&self, job: AdapterJob) -> Result<JobHandle, AdapterError> {
        let queue = self
            .queues
            .get(&job.kind())
            .ok_or_else(|| AdapterError::Permanent("unknown adapter kind".to_string()))?;

        let id = job.id;
        let (tx, rx) = oneshot::channel();

        match job.lane {
            Lane::Emergency => {
                queue
                    .emergency
                    .send((job, tx))
                    .map_err(|_| AdapterError::Permanent("dispatcher stopped".to_string()))?;
            }
            Lane::Normal => {
                queue.normal.try_send((job, tx)).map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => AdapterError::Busy,
                    mpsc::error::TrySendError::Closed(_) => {
                        AdapterError::Permanent("dispatcher stopped".to_string())
                    }
                })?;
            }
        }

        Ok(JobHandle { id, rx })
    }
}

async fn worker_loop(
    kind: AdapterKind,
    cap: usize,
    mut normal_rx: mpsc::Receiver<(AdapterJob, Reply)>,
    mut emergency_rx: mpsc::UnboundedReceiver<(AdapterJob, Reply)>,
    adapters: AdapterSet,
    retry: RetryPolicy,
    serial_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
) {
    let semaphore = Arc::new(Semaphore::new(cap));
    let mut normal_open = true;
    let mut emergency_open = true;

    while normal_open || emergency_open {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        // Priority lane first: emergency jobs preempt queue position
        let next = tokio::select! {
            biased;
            job = emergency_rx.recv(), if emergency_open => {
                if job.is_none() {
                    emergency_open = false;
                }
                job
            }
            job = normal_rx.recv(), if normal_open => {
                if job.is_none() {
                    normal_open = false;
                }
                job
            }
            else => break,
        };

        let Some((job, reply)) = next else {
            drop(permit);
            continue;
        };

        let adapters = adapters.clone();
        let serial_locks = serial_locks.clone();
        tokio::spawn(async move {
            let _permit = permit;

            let key = job.payload.serial_key();
            let lock = serial_locks
                .lock()
                .entry(key)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone();
            let _serial = lock.lock().await;

            let result = execute(kind, job, &adapters, retry).await;
            let _ = reply.send(result);
        });
    }
}

async fn execute(
    kind: AdapterKind,
    mut job: AdapterJob,
    adapters: &AdapterSet,
    retry: RetryPolicy,
) -> Result<JobOutcome, AdapterError> {
    let max_retries = match kind {
        AdapterKind::Notify => retry.notification_retries,
        // The escalation ladder owns its own fixed-backoff placement
        // retries; dispatcher retries here would compound them
        AdapterKind::Calling if job.lane == Lane::Emergency => 0,
        _ => retry.adapter_max_retries,
    };

    loop {
        // Emergency jobs keep going; the accept budget already passed and
        // nothing upstream is waiting on an utterance deadline
        if job.lane == Lane::Normal && Instant::now() >= job.deadline {
            tracing::warn!(job_id = %job.id, kind = kind.as_str(), "Job deadline exceeded");
            return Err(AdapterError::DeadlineExceeded);
        }

        match run_once(&job.payload, adapters, job.deadline).await {
            Ok(outcome) => {
                tracing::debug!(
                    job_id = %job.id,
                    kind = kind.as_str(),
                    attempts = job.attempts,
                    "Job completed"
                );
                return Ok(outcome);
            }
            Err(error) if error.is_transient() && job.attempts < max_retries => {
                job.attempts += 1;
                let backoff = jittered_backoff(&retry, job.attempts);
                tracing::debug!(
                    job_id = %job.id,
                    kind = kind.as_str(),
                    attempt = job.attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "Transient failure, retrying"
                );
                sleep(backoff).await;
            }
            Err(error) => {
                tracing::warn!(
                    job_id = %job.id,
                    kind = kind.as_str(),
                    attempts = job.attempts,
                    %error,
                    "Job failed"
                );
                return Err(error);
            }
        }
    }
}

async fn run_once(
    payload: &JobPayload,
    adapters: &AdapterSet,
    deadline: Instant,
) -> Result<JobOutcome, AdapterError> {
    match payload {
        JobPayload::SmartHome { device, action, params } => {
            adapters.smart_home.apply(device, action, params, deadline).await?;
        }
        JobPayload::Calling { contact, incident_id, step_seq } => {
            let placed = adapters
                .call
                .place(contact, *incident_id, *step_seq, deadline)
                .await?;
            return Ok(JobOutcome::CallPlaced(placed));
        }
        JobPayload::Notify { channel, recipient, template_id, fields } => {
            adapters
                .notify
                .send(*channel, recipient, template_id, fields, deadline)
                .await?;
        }
        JobPayload::Tts { envelope, .. } => adapters.tts.speak(envelope).await?,
        JobPayload::Video { activate, stream_id, cameras, access_token, .. } => {
            if *activate {
                adapters.video.activate(stream_id, cameras, access_token).await?;
            } else {
                adapters.video.deactivate(stream_id).await?;
            }
        }
    }
    Ok(JobOutcome::Completed)
}

/// Exponential backoff with jitter in [0.5, 1.0] of the nominal delay.
fn jittered_backoff(retry: &RetryPolicy, attempt: u32) -> Duration {
    let nominal = retry
        .base_backoff_ms
        .saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16))
        .min(retry.max_backoff_ms);
    let factor = rand::thread_rng().gen_range(0.5..=1.0);
    Duration::from_millis((nominal as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimNotification, SimSmartHome, SimTts, SimVideo, SimVoiceCall};
    use crate::{AdapterJob, NotifyChannel};

    fn sim_set() -> (AdapterSet, Arc<SimSmartHome>, Arc<SimNotification>) {
        let smart_home = Arc::new(SimSmartHome::new());
        let notify = Arc::new(SimNotification::new());
        let set = AdapterSet {
            smart_home: smart_home.clone(),
            call: Arc::new(SimVoiceCall::new()),
            notify: notify.clone(),
            video: Arc::new(SimVideo::new()),
            tts: Arc::new(SimTts::new()),
        };
        (set, smart_home, notify)
    }

    fn retry() -> RetryPolicy {
        RetryPolicy {
            adapter_max_retries: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
            call_place_retries: 2,
            call_place_backoff_ms: 1,
            notification_retries: 3,
        }
    }

    fn call_contact(id: &str) -> companion_policy::ContactRung {
        companion_policy::ContactRung {
            contact_id: id.to_string(),
            name: id.to_string(),
            phone: "+10000000000".to_string(),
            email: None,
            timeout_seconds: 60,
            sms_enabled: true,
        }
    }

    fn smart_home_job(device: &str, deadline: Instant) -> AdapterJob {
        AdapterJob::new(
            JobPayload::SmartHome {
                device: device.to_string(),
                action: "on".to_string(),
                params: serde_json::Value::Null,
            },
            deadline,
        )
    }

    #[tokio::test]
    async fn test_job_executes() {
        let (set, smart_home, _) = sim_set();
        let dispatcher = Dispatcher::new(set, retry(), DispatchCaps::default());

        let handle = dispatcher
            .submit(smart_home_job("living_room_light", Instant::now() + Duration::from_secs(1)))
            .unwrap();
        handle.outcome().await.unwrap();

        assert_eq!(smart_home.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let (set, smart_home, _) = sim_set();
        smart_home.fail_device(
            "living_room_light",
            2,
            AdapterError::Transient("mqtt reconnect".to_string()),
        );
        let dispatcher = Dispatcher::new(set, retry(), DispatchCaps::default());

        let handle = dispatcher
            .submit(smart_home_job("living_room_light", Instant::now() + Duration::from_secs(1)))
            .unwrap();
        handle.outcome().await.unwrap();

        assert_eq!(smart_home.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let (set, smart_home, _) = sim_set();
        smart_home.fail_device(
            "front_door_lock",
            1,
            AdapterError::Permanent("auth rejected".to_string()),
        );
        let dispatcher = Dispatcher::new(set, retry(), DispatchCaps::default());

        let handle = dispatcher
            .submit(smart_home_job("front_door_lock", Instant::now() + Duration::from_secs(1)))
            .unwrap();
        let result = handle.outcome().await;

        assert!(matches!(result, Err(AdapterError::Permanent(_))));
        assert!(smart_home.applied().is_empty());
    }

    #[tokio::test]
    async fn test_overflow_surfaces_busy() {
        let (set, smart_home, _) = sim_set();
        // Jam the single worker slot with a serial-key conflict
        smart_home.fail_device(
            "living_room_light",
            50,
            AdapterError::Transient("slow".to_string()),
        );
        let caps = DispatchCaps {
            smart_home: 1,
            queue_bound: 1,
            ..DispatchCaps::default()
        };
        let dispatcher = Dispatcher::new(set, retry(), caps);
        let deadline = Instant::now() + Duration::from_secs(5);

        // One running, one queued, the third overflows
        let _a = dispatcher.submit(smart_home_job("living_room_light", deadline)).unwrap();
        let mut busy = false;
        for _ in 0..8 {
            match dispatcher.submit(smart_home_job("living_room_light", deadline)) {
                Err(AdapterError::Busy) => {
                    busy = true;
                    break;
                }
                Ok(_) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert!(busy);
    }

    #[tokio::test]
    async fn test_emergency_lane_never_busy() {
        let (set, _, notify) = sim_set();
        let caps = DispatchCaps {
            notify: 1,
            queue_bound: 1,
            ..DispatchCaps::default()
        };
        let dispatcher = Dispatcher::new(set, retry(), caps);
        let deadline = Instant::now() + Duration::from_secs(5);

        let mut handles = Vec::new();
        for i in 0..32 {
            let job = AdapterJob::emergency(
                JobPayload::Notify {
                    channel: NotifyChannel::Sms,
                    recipient: format!("+1000000{:04}", i),
                    template_id: "emergency_alert".to_string(),
                    fields: serde_json::Value::Null,
                },
                deadline,
            );
            handles.push(dispatcher.submit(job).unwrap());
        }

        for handle in handles {
            handle.outcome().await.unwrap();
        }
        assert_eq!(notify.sent().len(), 32);
    }

    #[tokio::test]
    async fn test_normal_lane_call_retries_transient() {
        let calls = Arc::new(SimVoiceCall::new());
        calls.script(
            "family",
            vec![
                Err(AdapterError::Transient("sip 503".to_string())),
                Ok(crate::PlaceOutcome::Accepted),
            ],
        );
        let (mut set, _, _) = sim_set();
        set.call = calls.clone();
        let dispatcher = Dispatcher::new(set, retry(), DispatchCaps::default());

        let job = AdapterJob::new(
            JobPayload::Calling {
                contact: call_contact("family"),
                incident_id: uuid::Uuid::new_v4(),
                step_seq: 1,
            },
            Instant::now() + Duration::from_secs(1),
        );
        let outcome = dispatcher.submit(job).unwrap().outcome().await.unwrap();

        assert_eq!(outcome, JobOutcome::CallPlaced(crate::PlaceOutcome::Accepted));
        assert_eq!(calls.placed().len(), 2);
    }

    #[tokio::test]
    async fn test_emergency_lane_call_leaves_retry_to_ladder() {
        let calls = Arc::new(SimVoiceCall::new());
        calls.script(
            "family",
            vec![Err(AdapterError::Transient("sip 503".to_string()))],
        );
        let (mut set, _, _) = sim_set();
        set.call = calls.clone();
        let dispatcher = Dispatcher::new(set, retry(), DispatchCaps::default());

        let job = AdapterJob::emergency(
            JobPayload::Calling {
                contact: call_contact("family"),
                incident_id: uuid::Uuid::new_v4(),
                step_seq: 1,
            },
            Instant::now() + Duration::from_secs(1),
        );
        let result = dispatcher.submit(job).unwrap().outcome().await;

        // One attempt only; the ladder applies its fixed-backoff policy
        assert!(matches!(result, Err(AdapterError::Transient(_))));
        assert_eq!(calls.placed().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_rejected() {
        let (set, smart_home, _) = sim_set();
        let dispatcher = Dispatcher::new(set, retry(), DispatchCaps::default());

        let handle = dispatcher
            .submit(smart_home_job("living_room_light", Instant::now() - Duration::from_millis(1)))
            .unwrap();
        let result = handle.outcome().await;

        assert!(matches!(result, Err(AdapterError::DeadlineExceeded)));
        assert!(smart_home.applied().is_empty());
    }
}
