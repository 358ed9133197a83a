//! Post-guard: policy checks on typed intents
//!
//! Runs after the rules engine or the LLM produced a typed intent and before
//! anything reaches an adapter. Enforcement is independent of the LLM's good
//! behavior: whatever the model emitted, only whitelisted devices, actions,
//! zones and rates pass.

use companion_core::{GuardVerdict, Intent, Language};
use companion_policy::{PolicySnapshot, OUTSIDE_SAFE_ZONES};

use crate::rate_limit::RateLimiterRegistry;
use crate::SessionView;

/// Policy enforcement on typed intents.
pub struct PostGuard {
    limiter: RateLimiterRegistry,
}

impl PostGuard {
    pub fn new() -> Self {
        Self {
            limiter: RateLimiterRegistry::new(),
        }
    }

    pub fn limiter(&self) -> &RateLimiterRegistry {
        &self.limiter
    }

    /// Check a typed intent against policy and session state.
    pub fn check(
        &self,
        session_id: &str,
        language: Language,
        intent: &Intent,
        view: &SessionView,
        snapshot: &PolicySnapshot,
    ) -> GuardVerdict {
        match intent {
            Intent::SmartHome { device, action, .. } => {
                self.check_smart_home(session_id, language, device, action, view, snapshot)
            }
            Intent::AssistMove { target, speed, .. } => {
                self.check_assist_move(session_id, language, target, speed.as_deref(), view, snapshot)
            }
            Intent::CallEmergency { callee, .. } => {
                self.check_call(session_id, language, callee, snapshot)
            }
            Intent::Chat { .. } => GuardVerdict::allow(),
        }
    }

    fn check_smart_home(
        &self,
        session_id: &str,
        language: Language,
        device: &str,
        action: &str,
        view: &SessionView,
        snapshot: &PolicySnapshot,
    ) -> GuardVerdict {
        let Some(fence) = snapshot.device(device) else {
            return GuardVerdict::deny_constraint("device_not_allowed", device.to_string());
        };

        if !fence.allowed_actions.contains(action) {
            return GuardVerdict::deny_constraint(
                "action_not_allowed",
                format!("{}:{}", device, action),
            );
        }

        let high_risk = fence.risk_level >= snapshot.timers.high_risk_threshold
            || fence.require_confirm_actions.contains(action);

        // Geofence constraint applies to high-risk actions only: a lamp can
        // be switched from anywhere, a lock cannot.
        if high_risk {
            match view.last_zone.as_deref() {
                Some(OUTSIDE_SAFE_ZONES) => {
                    return GuardVerdict::deny_constraint(
                        "geofence_violation",
                        format!("zone={}", OUTSIDE_SAFE_ZONES),
                    );
                }
                Some(zone) => {
                    if let Some(fence_zone) = snapshot.zone(zone) {
                        if !fence_zone.allowed_devices.contains(device) {
                            return GuardVerdict::deny_constraint(
                                "geofence_violation",
                                format!("zone={} device={}", zone, device),
                            );
                        }
                    }
                }
                None => {}
            }
        }

        if let Some(limit) = snapshot.rate_limits.get("smart.home") {
            if !self.limiter.check(session_id, "smart.home", action, limit) {
                return GuardVerdict::deny("rate_limited");
            }
        }

        if high_risk {
            return GuardVerdict::with_confirm(
                "high_risk_device",
                confirm_prompt(language, device, action),
            );
        }

        GuardVerdict::allow()
    }

    fn check_assist_move(
        &self,
        session_id: &str,
        language: Language,
        target: &str,
        speed: Option<&str>,
        view: &SessionView,
        snapshot: &PolicySnapshot,
    ) -> GuardVerdict {
        if !snapshot.assist_move.canonical_targets.contains(target) {
            return GuardVerdict::deny_constraint("target_not_allowed", target.to_string());
        }

        if let Some(speed) = speed {
            if speed_rank(speed) > speed_rank(&snapshot.assist_move.max_speed) {
                return GuardVerdict::deny_constraint("speed_policy", speed.to_string());
            }
        }

        if let Some(limit) = snapshot.rate_limits.get("assist.move") {
            if !self.limiter.check(session_id, "assist.move", target, limit) {
                return GuardVerdict::deny("rate_limited");
            }
        }

        // New motion while the person is already stressed gets a caregiver
        // in the loop instead of a silent confirmation prompt.
        if let Some(stress) = view.stress {
            if stress > snapshot.timers.stress_threshold && target != "return_base" {
                return GuardVerdict::elevate("emotional_elevation");
            }
        }

        GuardVerdict::with_confirm("assist_move_confirm", move_prompt(language, target))
    }

    fn check_call(
        &self,
        session_id: &str,
        language: Language,
        callee: &str,
        snapshot: &PolicySnapshot,
    ) -> GuardVerdict {
        if snapshot.contact(callee).is_none() {
            return GuardVerdict::deny_constraint("callee_not_in_ladder", callee.to_string());
        }

        if let Some(limit) = snapshot.rate_limits.get("call.emergency") {
            if !self.limiter.check(session_id, "call.emergency", callee, limit) {
                return GuardVerdict::deny("rate_limited");
            }
        }

        GuardVerdict::with_confirm("call_confirm", call_prompt(language, callee))
    }
}

impl Default for PostGuard {
    fn default() -> Self {
        Self::new()
    }
}

fn speed_rank(speed: &str) -> u8 {
    match speed {
        "slow" => 0,
        "normal" => 1,
        "fast" => 2,
        _ => 3,
    }
}

fn confirm_prompt(language: Language, device: &str, action: &str) -> String {
    match language {
        Language::Zh => format!("确认要对{}执行{}吗？请说\"确认\"或\"取消\"。", device, action),
        Language::Yue => format!("确认要对{}执行{}吗？请讲\"确认\"或者\"取消\"。", device, action),
        Language::En => format!("Please confirm: {} {}? Say \"confirm\" or \"cancel\".", action, device),
    }
}

fn move_prompt(language: Language, target: &str) -> String {
    match language {
        Language::Zh => format!("需要我带您去{}吗？请说\"确认\"或\"取消\"。", target),
        Language::Yue => format!("需要我带您去{}吗？请讲\"确认\"或者\"取消\"。", target),
        Language::En => format!("Shall I walk you to {}? Say \"confirm\" or \"cancel\".", target),
    }
}

fn call_prompt(language: Language, callee: &str) -> String {
    match language {
        Language::Zh => format!("现在帮您拨打{}吗？请说\"确认\"或\"取消\"。", callee),
        Language::Yue => format!("而家帮您打畀{}吗？请讲\"确认\"或者\"取消\"。", callee),
        Language::En => format!("Place a call to {}? Say \"confirm\" or \"cancel\".", callee),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::GuardDecision;
    use companion_policy::{default_document, PolicySnapshot};

    fn snapshot() -> PolicySnapshot {
        PolicySnapshot::compile(&default_document()).unwrap()
    }

    fn smart_home(device: &str, action: &str) -> Intent {
        Intent::SmartHome {
            device: device.to_string(),
            action: action.to_string(),
            room: None,
            confirm: false,
        }
    }

    #[test]
    fn test_low_risk_device_allowed() {
        let guard = PostGuard::new();
        let verdict = guard.check(
            "s1",
            Language::Zh,
            &smart_home("living_room_light", "brighten"),
            &SessionView::default(),
            &snapshot(),
        );
        assert_eq!(verdict.decision, GuardDecision::Allow);
    }

    #[test]
    fn test_unknown_device_denied() {
        let guard = PostGuard::new();
        let verdict = guard.check(
            "s1",
            Language::Zh,
            &smart_home("garage_door", "open"),
            &SessionView::default(),
            &snapshot(),
        );
        assert!(verdict.is_deny());
        assert_eq!(verdict.reasons, vec!["device_not_allowed"]);
    }

    #[test]
    fn test_unlisted_action_denied() {
        let guard = PostGuard::new();
        let verdict = guard.check(
            "s1",
            Language::Zh,
            &smart_home("living_room_light", "explode"),
            &SessionView::default(),
            &snapshot(),
        );
        assert!(verdict.is_deny());
        assert_eq!(verdict.reasons, vec!["action_not_allowed"]);
    }

    #[test]
    fn test_unlock_outside_safe_zones_denied() {
        let guard = PostGuard::new();
        let view = SessionView {
            last_zone: Some(OUTSIDE_SAFE_ZONES.to_string()),
            ..Default::default()
        };
        let verdict = guard.check(
            "s1",
            Language::Zh,
            &smart_home("front_door_lock", "unlock"),
            &view,
            &snapshot(),
        );
        assert!(verdict.is_deny());
        assert_eq!(verdict.reasons, vec!["geofence_violation"]);
    }

    #[test]
    fn test_unlock_at_entrance_needs_confirm() {
        let guard = PostGuard::new();
        let view = SessionView {
            last_zone: Some("entrance".to_string()),
            ..Default::default()
        };
        let verdict = guard.check(
            "s1",
            Language::En,
            &smart_home("front_door_lock", "unlock"),
            &view,
            &snapshot(),
        );
        assert_eq!(verdict.decision, GuardDecision::AllowWithConfirm);
        assert!(verdict.confirm_prompt.is_some());
    }

    #[test]
    fn test_unlock_from_wrong_zone_denied() {
        let guard = PostGuard::new();
        let view = SessionView {
            last_zone: Some("bedroom".to_string()),
            ..Default::default()
        };
        let verdict = guard.check(
            "s1",
            Language::Zh,
            &smart_home("front_door_lock", "unlock"),
            &view,
            &snapshot(),
        );
        assert!(verdict.is_deny());
    }

    #[test]
    fn test_rate_limit_denies_excess() {
        let guard = PostGuard::new();
        let snap = snapshot();
        let view = SessionView::default();
        let intent = smart_home("living_room_light", "on");

        // Burst allowance is 30 * 1.5 = 45
        let mut denied = false;
        for _ in 0..60 {
            let verdict = guard.check("s1", Language::Zh, &intent, &view, &snap);
            if verdict.is_deny() {
                assert_eq!(verdict.reasons, vec!["rate_limited"]);
                denied = true;
                break;
            }
        }
        assert!(denied);
    }

    #[test]
    fn test_fast_assist_move_denied() {
        let guard = PostGuard::new();
        let intent = Intent::AssistMove {
            target: "kitchen".to_string(),
            speed: Some("fast".to_string()),
            confirm: true,
        };
        let verdict = guard.check("s1", Language::Zh, &intent, &SessionView::default(), &snapshot());
        assert!(verdict.is_deny());
        assert_eq!(verdict.reasons, vec!["speed_policy"]);
    }

    #[test]
    fn test_stressed_motion_elevates() {
        let guard = PostGuard::new();
        let view = SessionView {
            stress: Some(0.9),
            ..Default::default()
        };
        let intent = Intent::AssistMove {
            target: "kitchen".to_string(),
            speed: None,
            confirm: true,
        };
        let verdict = guard.check("s1", Language::Zh, &intent, &view, &snapshot());
        assert_eq!(verdict.decision, GuardDecision::Elevate);
    }

    #[test]
    fn test_unknown_callee_denied() {
        let guard = PostGuard::new();
        let intent = Intent::CallEmergency {
            callee: "stranger".to_string(),
            reason: "user_request".to_string(),
            confirm: true,
        };
        let verdict = guard.check("s1", Language::Zh, &intent, &SessionView::default(), &snapshot());
        assert!(verdict.is_deny());
    }

    #[test]
    fn test_same_intent_same_verdict() {
        let guard = PostGuard::new();
        let snap = snapshot();
        let view = SessionView::default();
        let intent = smart_home("bedroom_light", "off");

        let a = guard.check("s1", Language::Zh, &intent, &view, &snap);
        let b = guard.check("s1", Language::Zh, &intent, &view, &snap);
        assert_eq!(a.decision, b.decision);
    }
}
