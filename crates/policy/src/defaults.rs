//! Built-in default policy
//!
//! Used when no policy file is configured, and as the seed for
//! `dump-snapshot`. Mirrors the demo home: three lights, an HVAC unit and a
//! front-door lock, four zones, a four-rung contact ladder.

use std::collections::BTreeMap;

use companion_core::{EmergencyCategory, Language};

use crate::document::{
    ContactRung, DeviceFenceDoc, GeoFenceDoc, PolicyDocument, PreGuardDoc, RateLimitDoc,
    RetryDoc, SceneEntry, SmartHomeRuleDoc, SosSetDoc, TimerDoc,
};

/// Default policy document.
pub fn default_document() -> PolicyDocument {
    PolicyDocument {
        version: "1.0.0".to_string(),
        device_fences: device_fences(),
        geo_fences: geo_fences(),
        contact_ladder: contact_ladder(),
        sos_sets: sos_sets(),
        wakewords: vec![
            "小伴".to_string(),
            "小安".to_string(),
            "companion".to_string(),
            "hey buddy".to_string(),
        ],
        pre_guard: pre_guard(),
        smart_home_rules: smart_home_rules(),
        assist_move_verbs: vec![
            "带我去".to_string(),
            "帮我去".to_string(),
            "陪我去".to_string(),
            "take me".to_string(),
            "walk me".to_string(),
            "follow me".to_string(),
            "跟着我".to_string(),
        ],
        assist_move_targets: [
            ("厨房", "kitchen"),
            ("卧室", "bedroom"),
            ("卫生间", "bathroom"),
            ("客厅", "living_room"),
            ("kitchen", "kitchen"),
            ("bedroom", "bedroom"),
            ("bathroom", "bathroom"),
            ("living room", "living_room"),
            ("跟着我", "follow_user"),
            ("follow me", "follow_user"),
            ("回去充电", "return_base"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
        max_assist_speed: "normal".to_string(),
        call_phrases: [
            ("给家人打电话", "family"),
            ("打电话给家人", "family"),
            ("call family", "family"),
            ("call my family", "family"),
            ("联系医生", "doctor"),
            ("打电话给医生", "doctor"),
            ("call doctor", "doctor"),
            ("call the doctor", "doctor"),
            ("叫护工", "caregiver"),
            ("call caregiver", "caregiver"),
            ("叫救护车", "emergency_services"),
            ("call ambulance", "emergency_services"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
        rate_limits: [
            ("smart.home", RateLimitDoc { max_per_minute: 30, burst_multiplier: 1.5 }),
            ("assist.move", RateLimitDoc { max_per_minute: 10, burst_multiplier: 1.5 }),
            ("call.emergency", RateLimitDoc { max_per_minute: 2, burst_multiplier: 2.0 }),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect(),
        retry: RetryDoc::default(),
        emergency_scene: vec![
            SceneEntry { device: "living_room_light".to_string(), action: "on".to_string() },
            SceneEntry { device: "bedroom_light".to_string(), action: "on".to_string() },
            SceneEntry { device: "kitchen_light".to_string(), action: "on".to_string() },
            SceneEntry { device: "front_door_lock".to_string(), action: "unlock".to_string() },
        ],
        scene_min_success_ratio: 0.5,
        timers: TimerDoc::default(),
    }
}

fn device_fences() -> BTreeMap<String, DeviceFenceDoc> {
    let mut fences = BTreeMap::new();

    for (id, room) in [
        ("living_room_light", "living_room"),
        ("bedroom_light", "bedroom"),
        ("kitchen_light", "kitchen"),
    ] {
        fences.insert(
            id.to_string(),
            DeviceFenceDoc {
                device_type: "light".to_string(),
                room: room.to_string(),
                risk_level: 1,
                allowed_actions: ["on", "off", "dim", "brighten"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                require_confirm_actions: Vec::new(),
                safety_critical: false,
            },
        );
    }

    fences.insert(
        "hvac_system".to_string(),
        DeviceFenceDoc {
            device_type: "hvac".to_string(),
            room: "living_room".to_string(),
            risk_level: 2,
            allowed_actions: ["on", "off", "increase", "decrease"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            require_confirm_actions: Vec::new(),
            safety_critical: false,
        },
    );

    fences.insert(
        "front_door_lock".to_string(),
        DeviceFenceDoc {
            device_type: "lock".to_string(),
            room: "entrance".to_string(),
            risk_level: 4,
            allowed_actions: ["status", "lock", "unlock"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            require_confirm_actions: ["lock", "unlock"].iter().map(|s| s.to_string()).collect(),
            safety_critical: true,
        },
    );

    fences
}

fn geo_fences() -> Vec<GeoFenceDoc> {
    vec![
        GeoFenceDoc {
            zone_id: "bedroom".to_string(),
            polygon: vec![(1.5, 2.0), (3.5, 2.0), (3.5, 4.0), (1.5, 4.0)],
            risk_level: 1,
            allowed_devices: vec!["bedroom_light".to_string()],
        },
        GeoFenceDoc {
            zone_id: "living_room".to_string(),
            polygon: vec![(-1.0, -1.0), (2.0, -1.0), (2.0, 2.0), (-1.0, 2.0)],
            risk_level: 1,
            allowed_devices: vec!["living_room_light".to_string(), "hvac_system".to_string()],
        },
        GeoFenceDoc {
            // Higher risk: fall potential
            zone_id: "bathroom".to_string(),
            polygon: vec![(-2.5, 1.0), (-0.5, 1.0), (-0.5, 3.0), (-2.5, 3.0)],
            risk_level: 3,
            allowed_devices: Vec::new(),
        },
        GeoFenceDoc {
            zone_id: "entrance".to_string(),
            polygon: vec![(-1.0, -2.0), (1.0, -2.0), (1.0, -1.0), (-1.0, -1.0)],
            risk_level: 4,
            allowed_devices: vec!["front_door_lock".to_string()],
        },
    ]
}

fn contact_ladder() -> Vec<ContactRung> {
    vec![
        ContactRung {
            contact_id: "family".to_string(),
            name: "Primary family contact".to_string(),
            phone: "+10000000001".to_string(),
            email: Some("family@example.com".to_string()),
            timeout_seconds: 60,
            sms_enabled: true,
        },
        ContactRung {
            contact_id: "caregiver".to_string(),
            name: "Primary caregiver".to_string(),
            phone: "+10000000002".to_string(),
            email: Some("caregiver@example.com".to_string()),
            timeout_seconds: 60,
            sms_enabled: true,
        },
        ContactRung {
            contact_id: "doctor".to_string(),
            name: "Family doctor".to_string(),
            phone: "+10000000003".to_string(),
            email: None,
            timeout_seconds: 90,
            sms_enabled: true,
        },
        ContactRung {
            contact_id: "emergency_services".to_string(),
            name: "Emergency services".to_string(),
            phone: "120".to_string(),
            email: None,
            timeout_seconds: 90,
            sms_enabled: false,
        },
    ]
}

fn sos_sets() -> Vec<SosSetDoc> {
    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    vec![
        SosSetDoc {
            category: EmergencyCategory::Medical,
            severity: 4,
            keywords: BTreeMap::from([
                (
                    Language::Zh,
                    words(&["心脏病", "中风", "呼吸困难", "胸痛", "意识不清", "不舒服"]),
                ),
                (
                    Language::En,
                    words(&["heart attack", "stroke", "cant breathe", "chest pain", "unconscious"]),
                ),
                (Language::Yue, words(&["心口痛", "唞唔到气"])),
            ]),
        },
        SosSetDoc {
            category: EmergencyCategory::Fall,
            severity: 3,
            keywords: BTreeMap::from([
                (Language::Zh, words(&["摔倒", "跌倒", "起不来", "腿断了"])),
                (
                    Language::En,
                    words(&["fallen", "fell down", "cant get up", "broken leg"]),
                ),
                (Language::Yue, words(&["跌亲"])),
            ]),
        },
        SosSetDoc {
            category: EmergencyCategory::Sos,
            severity: 4,
            keywords: BTreeMap::from([
                (Language::Zh, words(&["救命", "求救", "报警"])),
                (Language::En, words(&["sos", "emergency", "call police"])),
                (Language::Yue, words(&["救命呀"])),
            ]),
        },
        SosSetDoc {
            category: EmergencyCategory::Security,
            severity: 3,
            keywords: BTreeMap::from([
                (Language::Zh, words(&["有人闯进来", "小偷", "陌生人在门口"])),
                (Language::En, words(&["intruder", "break in", "burglar"])),
                (Language::Yue, words(&["有贼"])),
            ]),
        },
        SosSetDoc {
            category: EmergencyCategory::Distress,
            severity: 2,
            keywords: BTreeMap::from([
                (Language::Zh, words(&["害怕", "孤独", "绝望", "迷路", "不知道在哪"])),
                (
                    Language::En,
                    words(&["scared", "lonely", "desperate", "lost", "where am i"]),
                ),
                (Language::Yue, words(&["好惊"])),
            ]),
        },
    ]
}

fn pre_guard() -> PreGuardDoc {
    PreGuardDoc {
        banned_phrases: vec![
            "关闭安全系统".to_string(),
            "关闭警报".to_string(),
            "disable safety".to_string(),
            "disable the alarm".to_string(),
        ],
        injection_patterns: vec![
            r"(?i)ignore (all )?(previous|prior) instructions".to_string(),
            r"(?i)you are now".to_string(),
            r"(?i)system prompt".to_string(),
            r"忽略(之前|以上)的?(指令|设定)".to_string(),
            r"你现在是".to_string(),
        ],
        max_text_chars: 400,
    }
}

fn smart_home_rules() -> Vec<SmartHomeRuleDoc> {
    fn rule(id: &str, pattern: &str, device: &str, action: &str, room: Option<&str>, spec: u8) -> SmartHomeRuleDoc {
        SmartHomeRuleDoc {
            rule_id: id.to_string(),
            pattern: pattern.to_string(),
            device: device.to_string(),
            action: action.to_string(),
            room: room.map(|r| r.to_string()),
            specificity: spec,
        }
    }

    vec![
        rule(
            "living_room_light_on",
            r"(打开|开|turn on).*(客厅|living room).*(灯|light)",
            "living_room_light",
            "on",
            Some("living_room"),
            2,
        ),
        rule(
            "living_room_light_off",
            r"(关掉|关|turn off).*(客厅|living room).*(灯|light)",
            "living_room_light",
            "off",
            Some("living_room"),
            2,
        ),
        rule(
            "living_room_light_brighten",
            r"(客厅|living room).*(灯|light).*(调亮|亮一点|brighten|brighter)",
            "living_room_light",
            "brighten",
            Some("living_room"),
            2,
        ),
        rule(
            "living_room_light_dim",
            r"(客厅|living room).*(灯|light).*(调暗|暗一点|dim)",
            "living_room_light",
            "dim",
            Some("living_room"),
            2,
        ),
        rule(
            "bedroom_light_on",
            r"(打开|开|turn on).*(卧室|bedroom).*(灯|light)",
            "bedroom_light",
            "on",
            Some("bedroom"),
            2,
        ),
        rule(
            "bedroom_light_off",
            r"(关掉|关|turn off).*(卧室|bedroom).*(灯|light)",
            "bedroom_light",
            "off",
            Some("bedroom"),
            2,
        ),
        rule(
            "kitchen_light_on",
            r"(打开|开|turn on).*(厨房|kitchen).*(灯|light)",
            "kitchen_light",
            "on",
            Some("kitchen"),
            2,
        ),
        rule(
            "hvac_on",
            r"(打开|开|turn on).*(空调|air con|ac\b)",
            "hvac_system",
            "on",
            None,
            1,
        ),
        rule(
            "hvac_off",
            r"(关掉|关|turn off).*(空调|air con|ac\b)",
            "hvac_system",
            "off",
            None,
            1,
        ),
        rule(
            "front_door_unlock",
            r"(打开|开|unlock).*(大门|门锁|front door|the door)",
            "front_door_lock",
            "unlock",
            Some("entrance"),
            2,
        ),
        rule(
            "front_door_lock",
            r"(锁上|锁好|lock).*(大门|门|door)",
            "front_door_lock",
            "lock",
            Some("entrance"),
            2,
        ),
    ]
}
