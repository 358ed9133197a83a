//! Policy store for the companion router
//!
//! The policy is a versioned on-disk document (device fences, geofence
//! polygons, contact ladder, SOS keyword sets, wakewords, rule patterns,
//! retry/rate configuration). At load time the document is validated and
//! compiled into an immutable [`PolicySnapshot`]; malformed rules fail the
//! load, so downstream classification never sees a bad pattern.
//!
//! Snapshots are swapped atomically: readers take an `Arc` once per utterance
//! and keep it for the whole pipeline, so a reload mid-utterance never tears
//! an in-flight decision.

mod defaults;
mod document;
mod geometry;
mod snapshot;
mod store;

pub use defaults::default_document;
pub use document::{
    ContactRung, DeviceFenceDoc, GeoFenceDoc, PolicyDocument, PreGuardDoc, RateLimitDoc,
    RetryDoc, SceneEntry, SmartHomeRuleDoc, SosSetDoc, TimerDoc,
};
pub use geometry::{point_in_polygon, zone_for_point};
pub use snapshot::{
    AssistMoveRules, CallRule, DeviceFence, EmergencyScene, GeoFence, PolicySnapshot,
    PreGuardRules, RateLimit, RetryPolicy, SmartHomeRule, SosSet, Timers,
};
pub use store::PolicyStore;

pub use companion_core::PolicyError;

/// Zone id reported when the tracked position is inside no fence.
pub const OUTSIDE_SAFE_ZONES: &str = "outside_safe_zones";
