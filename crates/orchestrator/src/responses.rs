//! User-facing response phrases
//!
//! Single-sentence texts per language. Denials explain themselves in one
//! sentence; emergencies always get a calm acknowledgement regardless of how
//! the fan-out goes.

use companion_core::Language;

pub fn emergency_ack(language: Language) -> &'static str {
    match language {
        Language::Zh => "已为您联系家人，请保持冷静，我在您身边。",
        Language::Yue => "已经帮您联系家人，请保持冷静，我喺您身边。",
        Language::En => "I am contacting your family now. Please stay calm, I am right here with you.",
    }
}

pub fn deny(language: Language, reason: &str) -> String {
    match (language, reason) {
        (Language::Zh, "geofence_violation") => "为了安全，现在不能执行这个操作。".to_string(),
        (Language::Yue, "geofence_violation") => "为咗安全，而家唔可以做呢个操作。".to_string(),
        (Language::En, "geofence_violation") => {
            "For your safety, I can't do that right now.".to_string()
        }
        (Language::Zh, "rate_limited") => "操作太频繁了，请稍后再试。".to_string(),
        (Language::Yue, "rate_limited") => "操作太密啦，请迟啲再试。".to_string(),
        (Language::En, "rate_limited") => "That was requested too often, please try again shortly.".to_string(),
        (Language::Zh, _) => "抱歉，这个操作不被允许。".to_string(),
        (Language::Yue, _) => "唔好意思，呢个操作唔允许。".to_string(),
        (Language::En, _) => "Sorry, that action isn't allowed.".to_string(),
    }
}

pub fn reject_policy(language: Language) -> &'static str {
    match language {
        Language::Zh => "抱歉，我不能处理这个请求。",
        Language::Yue => "唔好意思，我唔可以处理呢个请求。",
        Language::En => "Sorry, I can't handle that request.",
    }
}

pub fn reject_low_confidence(language: Language) -> &'static str {
    match language {
        Language::Zh => "我没有听清楚，请再说一遍。",
        Language::Yue => "我听唔清楚，麻烦再讲一次。",
        Language::En => "I didn't catch that, could you say it again?",
    }
}

pub fn busy(language: Language) -> &'static str {
    match language {
        Language::Zh => "系统正忙，请稍后再试一次。",
        Language::Yue => "系统而家好忙，请迟啲再试。",
        Language::En => "I'm a little busy right now, please try again in a moment.",
    }
}

pub fn adapter_failed(language: Language) -> &'static str {
    match language {
        Language::Zh => "这个设备暂时没有响应，我已经通知家人帮忙查看。",
        Language::Yue => "呢个设备暂时冇反应，我已经通知家人帮手睇下。",
        Language::En => "That device isn't responding; I've let your family know so they can check on it.",
    }
}

pub fn completed(language: Language) -> &'static str {
    match language {
        Language::Zh => "好的，已经帮您完成了。",
        Language::Yue => "好，已经帮您搞掂。",
        Language::En => "Done, all taken care of.",
    }
}

pub fn moving(language: Language, target: &str) -> String {
    match language {
        Language::Zh => format!("好的，我们一起去{}。", target),
        Language::Yue => format!("好，我哋一齐去{}。", target),
        Language::En => format!("Alright, let's head to the {} together.", target),
    }
}

pub fn calling(language: Language, callee: &str) -> String {
    match language {
        Language::Zh => format!("正在为您拨打{}。", callee),
        Language::Yue => format!("而家帮您打畀{}。", callee),
        Language::En => format!("Calling {} for you now.", callee),
    }
}

pub fn chat_fallback(language: Language) -> &'static str {
    match language {
        Language::Zh => "我刚才走神了，能再陪我说一会儿吗？",
        Language::Yue => "我头先恍咗神，可唔可以再同我倾多阵？",
        Language::En => "I lost my train of thought, shall we keep chatting?",
    }
}

pub fn greeting(language: Language) -> &'static str {
    match language {
        Language::Zh => "我在呢，您请说。",
        Language::Yue => "我喺度，您讲。",
        Language::En => "I'm here, go ahead.",
    }
}

pub fn chat_reply(language: Language) -> &'static str {
    match language {
        Language::Zh => "好的，我陪您聊聊。",
        Language::Yue => "好呀，我陪您倾计。",
        Language::En => "Of course, I'm happy to chat.",
    }
}

pub fn elevated(language: Language) -> &'static str {
    match language {
        Language::Zh => "我觉得您现在情绪有些紧张，已经请护理人员来看看您。",
        Language::Yue => "我觉得您而家有啲紧张，已经请护理人员嚟睇下您。",
        Language::En => "You seem a little stressed; I've asked your caregiver to check in on you.",
    }
}

pub fn cancelled(language: Language) -> &'static str {
    match language {
        Language::Zh => "好的，已经取消。",
        Language::Yue => "好，已经取消。",
        Language::En => "Okay, cancelled.",
    }
}
