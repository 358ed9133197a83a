//! Adapter dispatch layer
//!
//! Executes side effects with bounded concurrency, ordered outcomes and
//! deadline propagation. One logical queue per adapter kind; emergency jobs
//! ride a priority lane that is drained first and never dropped. Transient
//! failures retry with jittered exponential backoff; permanent failures
//! surface immediately.

mod dispatch;
mod http;
mod job;
mod scene;
mod sim;
mod traits;

pub use dispatch::{AdapterSet, DispatchCaps, Dispatcher, JobHandle};
pub use http::{HttpNotification, HttpSmartHome, HttpVoiceCall};
pub use job::{AdapterJob, AdapterKind, JobOutcome, JobPayload, Lane};
pub use scene::{apply_scene, SceneOutcome};
pub use sim::{SimNotification, SimSmartHome, SimTts, SimVideo, SimVoiceCall};
pub use traits::{
    AckStatus, CallAck, NotificationAdapter, NotifyChannel, PlaceOutcome, SmartHomeAdapter,
    TtsAdapter, VideoAdapter, VoiceCallAdapter,
};

pub use companion_core::AdapterError;
