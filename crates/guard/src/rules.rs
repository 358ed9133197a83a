//! Rules engine: deterministic pre-LLM classifier
//!
//! A pure function over (utterance, policy snapshot, session view). Tiers are
//! evaluated in order and the first tier that produces a result wins:
//! emergency, wakeword, smart-home direct, assist-move direct, call-family
//! direct, fallback. Malformed patterns cannot reach this code; they are
//! rejected when the policy compiles.

use companion_core::{Classification, Intent, RejectReason, Utterance};
use companion_policy::PolicySnapshot;

use crate::SessionView;

/// Result of classifying one utterance.
#[derive(Debug, Clone)]
pub struct RulesOutcome {
    pub classification: Classification,
    /// Wakeword that matched, if any; refreshes the attention window
    pub wakeword: Option<String>,
    /// Rule ids consulted for the decision, most significant first
    pub matched_rules: Vec<String>,
}

/// Deterministic classifier. Stateless; same inputs give the same output.
pub struct RulesEngine;

impl RulesEngine {
    /// Classify an utterance. Emergency always wins; within a non-emergency
    /// tier a longer match wins, equal lengths fall back to rule specificity.
    pub fn classify(
        utterance: &Utterance,
        snapshot: &PolicySnapshot,
        _view: &SessionView,
    ) -> RulesOutcome {
        let text = utterance.text.to_lowercase();

        // Tier 1: emergency. Any hit short-circuits everything else.
        if let Some((set, keyword)) = match_sos(&text, snapshot) {
            return RulesOutcome {
                classification: Classification::Emergency {
                    severity: set.severity,
                    category: set.category,
                    keyword,
                },
                wakeword: None,
                matched_rules: vec![format!("sos:{}", set.category.as_str())],
            };
        }

        // Tier 2: wakeword. Recorded, then later tiers still run so a
        // combined "wakeword + command" utterance resolves in one pass.
        let wakeword = snapshot
            .wakewords
            .iter()
            .find(|w| text.contains(w.as_str()))
            .cloned();

        // Tier 3: smart-home direct
        if let Some(outcome) = match_smart_home(&text, snapshot, &wakeword) {
            return outcome;
        }

        // Tier 4: assist-move direct
        if let Some(outcome) = match_assist_move(&text, snapshot, &wakeword) {
            return outcome;
        }

        // Tier 5: call-family direct
        if let Some(outcome) = match_call(&text, snapshot, &wakeword) {
            return outcome;
        }

        // A bare wakeword is a session opener, not something for the LLM.
        if let Some(word) = &wakeword {
            if is_bare_wakeword(&text, word) {
                return RulesOutcome {
                    classification: Classification::DirectIntent {
                        intent: Intent::Chat {
                            style: Some("greeting".to_string()),
                        },
                        rule_id: "wakeword".to_string(),
                    },
                    wakeword,
                    matched_rules: vec!["wakeword".to_string()],
                };
            }
        }

        // Tier 6: fallback
        if utterance.asr_conf < snapshot.timers.reject_confidence {
            return RulesOutcome {
                classification: Classification::Reject {
                    reason: RejectReason::LowConfidence,
                },
                wakeword,
                matched_rules: vec!["low_confidence".to_string()],
            };
        }

        RulesOutcome {
            classification: Classification::RouteToLlm,
            wakeword,
            matched_rules: Vec::new(),
        }
    }
}

/// First SOS category with a keyword hit, in category-priority order.
fn match_sos<'a>(
    text: &str,
    snapshot: &'a PolicySnapshot,
) -> Option<(&'a companion_policy::SosSet, String)> {
    for set in &snapshot.sos_sets {
        for keywords in set.keywords.values() {
            if let Some(keyword) = keywords.iter().find(|k| text.contains(k.as_str())) {
                return Some((set, keyword.clone()));
            }
        }
    }
    None
}

fn match_smart_home(
    text: &str,
    snapshot: &PolicySnapshot,
    wakeword: &Option<String>,
) -> Option<RulesOutcome> {
    // (rule index, match length)
    let mut hits: Vec<(usize, usize)> = Vec::new();
    for (i, rule) in snapshot.smart_home_rules.iter().enumerate() {
        if let Some(m) = rule.pattern.find(text) {
            hits.push((i, m.end() - m.start()));
        }
    }

    if hits.is_empty() {
        return None;
    }

    // Multiple distinct devices means the utterance is ambiguous; the LLM
    // gets to pick with full context instead of us guessing.
    let mut devices: Vec<&str> = hits
        .iter()
        .map(|(i, _)| snapshot.smart_home_rules[*i].device.as_str())
        .collect();
    devices.sort_unstable();
    devices.dedup();
    if devices.len() > 1 {
        return Some(RulesOutcome {
            classification: Classification::RouteToLlm,
            wakeword: wakeword.clone(),
            matched_rules: hits
                .iter()
                .map(|(i, _)| snapshot.smart_home_rules[*i].rule_id.clone())
                .collect(),
        });
    }

    // Longest match wins; equal length falls back to specificity.
    hits.sort_by(|a, b| {
        b.1.cmp(&a.1).then_with(|| {
            snapshot.smart_home_rules[b.0]
                .specificity
                .cmp(&snapshot.smart_home_rules[a.0].specificity)
        })
    });

    let rule = &snapshot.smart_home_rules[hits[0].0];
    let fence = snapshot.device(&rule.device)?;
    let confirm = fence.require_confirm_actions.contains(&rule.action);

    Some(RulesOutcome {
        classification: Classification::DirectIntent {
            intent: Intent::SmartHome {
                device: rule.device.clone(),
                action: rule.action.clone(),
                room: rule.room.clone(),
                confirm,
            },
            rule_id: rule.rule_id.clone(),
        },
        wakeword: wakeword.clone(),
        matched_rules: vec![rule.rule_id.clone()],
    })
}

fn match_assist_move(
    text: &str,
    snapshot: &PolicySnapshot,
    wakeword: &Option<String>,
) -> Option<RulesOutcome> {
    let rules = &snapshot.assist_move;

    if !rules.verbs.iter().any(|v| text.contains(v.as_str())) {
        return None;
    }

    // Longest matching target phrase wins
    let (phrase, target) = rules
        .target_phrases
        .iter()
        .filter(|(phrase, _)| text.contains(phrase.as_str()))
        .max_by_key(|(phrase, _)| phrase.chars().count())?;

    Some(RulesOutcome {
        classification: Classification::DirectIntent {
            intent: Intent::AssistMove {
                target: target.clone(),
                speed: None,
                confirm: true,
            },
            rule_id: format!("assist_move:{}", phrase),
        },
        wakeword: wakeword.clone(),
        matched_rules: vec![format!("assist_move:{}", phrase)],
    })
}

fn match_call(
    text: &str,
    snapshot: &PolicySnapshot,
    wakeword: &Option<String>,
) -> Option<RulesOutcome> {
    let rule = snapshot
        .call_rules
        .iter()
        .filter(|r| text.contains(r.phrase.as_str()))
        .max_by_key(|r| r.phrase.chars().count())?;

    Some(RulesOutcome {
        classification: Classification::DirectIntent {
            intent: Intent::CallEmergency {
                callee: rule.contact_id.clone(),
                reason: "user_request".to_string(),
                confirm: true,
            },
            rule_id: format!("call:{}", rule.phrase),
        },
        wakeword: wakeword.clone(),
        matched_rules: vec![format!("call:{}", rule.phrase)],
    })
}

fn is_bare_wakeword(text: &str, wakeword: &str) -> bool {
    let stripped: String = text
        .replace(wakeword, "")
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation() && *c != '，' && *c != '。')
        .collect();
    stripped.chars().count() <= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use companion_core::{EmergencyCategory, Language};
    use companion_policy::{default_document, PolicySnapshot};

    fn snapshot() -> PolicySnapshot {
        PolicySnapshot::compile(&default_document()).unwrap()
    }

    fn utterance(text: &str, conf: f32, language: Language) -> Utterance {
        Utterance {
            id: 1,
            session_id: "s1".to_string(),
            text: text.to_string(),
            language,
            asr_conf: conf,
            t_arrival: Utc::now(),
            speaker_profile_id: None,
        }
    }

    #[test]
    fn test_medical_emergency_wins_over_sos() {
        // "救命" is in the sos set, "不舒服" in medical; medical has priority
        let outcome = RulesEngine::classify(
            &utterance("救命 我不舒服", 0.92, Language::Zh),
            &snapshot(),
            &SessionView::default(),
        );

        match outcome.classification {
            Classification::Emergency { severity, category, .. } => {
                assert_eq!(severity, 4);
                assert_eq!(category, EmergencyCategory::Medical);
            }
            other => panic!("expected emergency, got {:?}", other),
        }
    }

    #[test]
    fn test_emergency_keyword_in_long_sentence() {
        let outcome = RulesEngine::classify(
            &utterance(
                "今天天气不错我本来想出去散步但是突然觉得胸痛很厉害",
                0.9,
                Language::Zh,
            ),
            &snapshot(),
            &SessionView::default(),
        );
        assert!(outcome.classification.is_emergency());
    }

    #[test]
    fn test_smart_home_direct_brighten() {
        let outcome = RulesEngine::classify(
            &utterance("把客厅的灯调亮一点", 0.95, Language::Zh),
            &snapshot(),
            &SessionView::default(),
        );

        match outcome.classification {
            Classification::DirectIntent { intent, .. } => {
                assert_eq!(
                    intent,
                    Intent::SmartHome {
                        device: "living_room_light".to_string(),
                        action: "brighten".to_string(),
                        room: Some("living_room".to_string()),
                        confirm: false,
                    }
                );
            }
            other => panic!("expected direct intent, got {:?}", other),
        }
    }

    #[test]
    fn test_door_unlock_direct_carries_confirm() {
        let outcome = RulesEngine::classify(
            &utterance("打开大门", 0.9, Language::Zh),
            &snapshot(),
            &SessionView::default(),
        );

        match outcome.classification {
            Classification::DirectIntent { intent, .. } => {
                assert_eq!(intent.device(), Some("front_door_lock"));
                assert_eq!(intent.action(), Some("unlock"));
                assert!(intent.wants_confirm());
            }
            other => panic!("expected direct intent, got {:?}", other),
        }
    }

    #[test]
    fn test_ambiguous_devices_demote_to_llm() {
        let outcome = RulesEngine::classify(
            &utterance("打开客厅的灯和卧室的灯", 0.9, Language::Zh),
            &snapshot(),
            &SessionView::default(),
        );
        assert_eq!(outcome.classification, Classification::RouteToLlm);
        assert!(outcome.matched_rules.len() >= 2);
    }

    #[test]
    fn test_mixed_language_utterance() {
        let outcome = RulesEngine::classify(
            &utterance("please turn on 客厅的 light", 0.9, Language::En),
            &snapshot(),
            &SessionView::default(),
        );
        match outcome.classification {
            Classification::DirectIntent { intent, .. } => {
                assert_eq!(intent.device(), Some("living_room_light"));
            }
            other => panic!("expected direct intent, got {:?}", other),
        }
    }

    #[test]
    fn test_assist_move_direct() {
        let outcome = RulesEngine::classify(
            &utterance("带我去厨房", 0.9, Language::Zh),
            &snapshot(),
            &SessionView::default(),
        );
        match outcome.classification {
            Classification::DirectIntent { intent, .. } => {
                assert_eq!(
                    intent,
                    Intent::AssistMove {
                        target: "kitchen".to_string(),
                        speed: None,
                        confirm: true,
                    }
                );
            }
            other => panic!("expected direct intent, got {:?}", other),
        }
    }

    #[test]
    fn test_call_family_direct() {
        let outcome = RulesEngine::classify(
            &utterance("给家人打电话", 0.9, Language::Zh),
            &snapshot(),
            &SessionView::default(),
        );
        match outcome.classification {
            Classification::DirectIntent { intent, .. } => {
                assert_eq!(intent.kind(), "call.emergency");
            }
            other => panic!("expected direct intent, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_wakeword_is_greeting() {
        let outcome = RulesEngine::classify(
            &utterance("小伴", 0.9, Language::Zh),
            &snapshot(),
            &SessionView::default(),
        );
        assert_eq!(outcome.wakeword.as_deref(), Some("小伴"));
        assert!(matches!(
            outcome.classification,
            Classification::DirectIntent { .. }
        ));
    }

    #[test]
    fn test_low_confidence_reject() {
        let outcome = RulesEngine::classify(
            &utterance("嗯嗯那个什么", 0.1, Language::Zh),
            &snapshot(),
            &SessionView::default(),
        );
        assert_eq!(
            outcome.classification,
            Classification::Reject {
                reason: RejectReason::LowConfidence
            }
        );
    }

    #[test]
    fn test_fallback_routes_to_llm() {
        let outcome = RulesEngine::classify(
            &utterance("今天讲个笑话", 0.9, Language::Zh),
            &snapshot(),
            &SessionView::default(),
        );
        assert_eq!(outcome.classification, Classification::RouteToLlm);
    }

    #[test]
    fn test_determinism() {
        let snap = snapshot();
        let view = SessionView::default();
        let u = utterance("把客厅的灯调亮一点", 0.95, Language::Zh);

        let a = RulesEngine::classify(&u, &snap, &view);
        let b = RulesEngine::classify(&u, &snap, &view);
        assert_eq!(a.classification, b.classification);
        assert_eq!(a.matched_rules, b.matched_rules);
    }
}
