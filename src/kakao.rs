//! Kakao i skill wire types and the pure response formatters.
//!
//! The platform dictates every shape here; nothing in this module performs
//! I/O or depends on configuration.

use serde::{Deserialize, Serialize};

const SKILL_VERSION: &str = "2.0";

/// Fixed texts rendered verbatim by the platform.
pub const WAIT_TEXT: &str =
    "네, 질문을 확인했어요. AI가 답변을 열심히 준비하고 있으니 잠시만 기다려주세요! 🤖";
pub const FALLBACK_TEXT: &str =
    "죄송해요, 답변을 생성하는 중 문제가 발생했어요. 잠시 후 다시 시도해주세요. 😥";
pub const RESTART_LABEL: &str = "다시 시작하기";
pub const UNSUPPORTED_TEXT: &str = "오류: 현재 사용 중인 버전에서는 이 기능을 지원하지 않아요.";
pub const INVALID_REQUEST_TEXT: &str = "오류: 요청에서 사용자 발화를 찾을 수 없어요.";

/// Inbound skill webhook body. Only the fields this backend consumes.
#[derive(Debug, Deserialize)]
pub struct SkillPayload {
    #[serde(rename = "userRequest")]
    pub user_request: Option<UserRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    #[serde(default)]
    pub utterance: Option<String>,

    /// One-time address for asynchronous completion. Only present when the
    /// skill is registered with the callback capability.
    #[serde(rename = "callbackUrl", default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillResponse {
    pub version: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<SkillTemplate>,

    #[serde(rename = "useCallback", skip_serializing_if = "Option::is_none")]
    pub use_callback: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<CallbackWaitData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillTemplate {
    pub outputs: Vec<TemplateOutput>,

    #[serde(rename = "quickReplies", skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<QuickReply>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateOutput {
    #[serde(rename = "simpleText")]
    pub simple_text: SimpleText,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimpleText {
    pub text: String,
}

/// Clicking a quick reply re-sends its text as a new utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickReply {
    pub action: &'static str,
    pub label: String,

    #[serde(rename = "messageText")]
    pub message_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackWaitData {
    pub text: &'static str,
}

/// Wraps an answer text and its follow-up suggestions into the platform
/// template. Suggestion order is preserved.
pub fn format_answer(text: impl Into<String>, suggestions: Vec<String>) -> SkillResponse {
    SkillResponse {
        version: SKILL_VERSION,
        template: Some(SkillTemplate {
            outputs: vec![TemplateOutput {
                simple_text: SimpleText { text: text.into() },
            }],
            quick_replies: suggestions
                .into_iter()
                .map(|suggestion| QuickReply {
                    action: "message",
                    label: suggestion.clone(),
                    message_text: suggestion,
                })
                .collect(),
        }),
        use_callback: None,
        data: None,
    }
}

/// Immediate "answer is coming via callback" acknowledgment.
pub fn wait_acknowledgment() -> SkillResponse {
    SkillResponse {
        version: SKILL_VERSION,
        template: None,
        use_callback: Some(true),
        data: Some(CallbackWaitData { text: WAIT_TEXT }),
    }
}

/// User-facing replacement for any generation failure. Offers a single
/// restart quick reply instead of surfacing the technical error.
pub fn fallback_answer() -> SkillResponse {
    format_answer(FALLBACK_TEXT, vec![RESTART_LABEL.to_string()])
}

pub fn unsupported_version() -> SkillResponse {
    format_answer(UNSUPPORTED_TEXT, Vec::new())
}

pub fn invalid_request() -> SkillResponse {
    format_answer(INVALID_REQUEST_TEXT, Vec::new())
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn test_format_answer_preserves_suggestions() {
        let suggestions = vec![
            "아기가 열이 나요".to_string(),
            "신생아 예방접종 알려줘".to_string(),
            "이유식 시작 시기".to_string(),
        ];
        let response = format_answer("안녕하세요!", suggestions.clone());

        let template = response.template.unwrap();
        assert_eq!(template.outputs.len(), 1);
        assert_eq!(template.outputs[0].simple_text.text, "안녕하세요!");

        assert_eq!(template.quick_replies.len(), suggestions.len());
        for (reply, suggestion) in template.quick_replies.iter().zip(&suggestions) {
            assert_eq!(reply.action, "message");
            assert_eq!(&reply.label, suggestion);
            assert_eq!(&reply.message_text, suggestion);
        }
    }

    #[test]
    fn test_format_answer_empty_suggestions() {
        let response = format_answer("답변", Vec::new());

        let template = response.template.as_ref().unwrap();
        assert_eq!(template.outputs.len(), 1);
        assert_eq!(template.outputs[0].simple_text.text, "답변");
        assert!(template.quick_replies.is_empty());

        // No quickReplies key at all when there are no suggestions.
        let value = serde_json::to_value(&response).unwrap();
        assert!(value["template"].get("quickReplies").is_none());
    }

    #[test]
    fn test_wait_acknowledgment_is_constant() {
        let first = wait_acknowledgment();
        let second = wait_acknowledgment();
        assert_eq!(first, second);

        let value = serde_json::to_value(&first).unwrap();
        assert_eq!(value["version"], "2.0");
        assert_eq!(value["useCallback"], true);
        assert_eq!(value["data"]["text"], WAIT_TEXT);
        assert!(value.get("template").is_none());
    }

    #[test]
    fn test_fallback_answer_shape() {
        let expected = format_answer(FALLBACK_TEXT, vec![RESTART_LABEL.to_string()]);
        assert_eq!(fallback_answer(), expected);

        let template = fallback_answer().template.unwrap();
        assert_eq!(template.quick_replies.len(), 1);
        assert_eq!(template.quick_replies[0].label, RESTART_LABEL);
        assert_eq!(template.quick_replies[0].message_text, RESTART_LABEL);
    }

    #[test]
    fn test_serialized_template_keys() {
        let value =
            serde_json::to_value(format_answer("A", vec!["B".to_string()])).unwrap();

        assert_eq!(value["version"], "2.0");
        assert_eq!(value["template"]["outputs"][0]["simpleText"]["text"], "A");
        assert_eq!(value["template"]["quickReplies"][0]["action"], "message");
        assert_eq!(value["template"]["quickReplies"][0]["label"], "B");
        assert_eq!(value["template"]["quickReplies"][0]["messageText"], "B");
        assert!(value.get("useCallback").is_none());
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_skill_payload_deserialization() {
        let payload: SkillPayload = serde_json::from_str(
            r#"{
                "userRequest": {
                    "utterance": "아기가 열이 나요",
                    "callbackUrl": "https://kakao.example/callback/abc"
                }
            }"#,
        )
        .unwrap();

        let user_request = payload.user_request.unwrap();
        assert_eq!(user_request.utterance.as_deref(), Some("아기가 열이 나요"));
        assert_eq!(
            user_request.callback_url.as_deref(),
            Some("https://kakao.example/callback/abc")
        );

        // Old platform versions omit the callback address entirely.
        let payload: SkillPayload =
            serde_json::from_str(r#"{"userRequest": {"utterance": "hi"}}"#).unwrap();
        assert!(payload.user_request.unwrap().callback_url.is_none());

        let payload: SkillPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.user_request.is_none());
    }
}
