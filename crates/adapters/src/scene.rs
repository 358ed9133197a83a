//! Emergency scene application

use futures::future::join_all;
use tokio::time::Instant;
use uuid::Uuid;

use companion_policy::EmergencyScene;

use crate::traits::SmartHomeAdapter;

/// Outcome of one scene batch.
#[derive(Debug, Clone)]
pub struct SceneOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// True iff the success ratio met the policy minimum
    pub success: bool,
}

/// Apply the emergency scene as a best-effort batch.
///
/// Individual device failures are logged and counted; the scene as a whole
/// succeeds iff at least `min_success_ratio` of the commands landed. Every
/// command carries `(incident_id, step_seq)` so replays are no-ops.
pub async fn apply_scene(
    adapter: &dyn SmartHomeAdapter,
    scene: &EmergencyScene,
    incident_id: Uuid,
    step_seq_base: u64,
    deadline: Instant,
) -> SceneOutcome {
    let attempts = scene.commands.iter().enumerate().map(|(i, (device, action))| {
        let params = serde_json::json!({
            "incident_id": incident_id.to_string(),
            "step_seq": step_seq_base + i as u64,
            "scene": "emergency",
        });
        async move {
            let result = adapter.apply(device, action, &params, deadline).await;
            (device.clone(), result)
        }
    });

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (device, result) in join_all(attempts).await {
        match result {
            Ok(()) => succeeded.push(device),
            Err(error) => {
                tracing::warn!(device = %device, %error, "Scene command failed");
                failed.push(device);
            }
        }
    }

    let total = succeeded.len() + failed.len();
    let success = if total == 0 {
        true
    } else {
        succeeded.len() as f32 / total as f32 >= scene.min_success_ratio
    };

    SceneOutcome {
        succeeded,
        failed,
        success,
    }
}
