mod prompt;

use crate::config::AiConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::log::{debug, error};

#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("Missing required GEMINI_API_KEY environment variable!")]
    MissingCredential,
    #[error("Generation API error: {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("Generation request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed generation answer: {0}")]
    MalformedAnswer(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Structured answer parsed out of the model's JSON text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedAnswer {
    pub response_text: String,

    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,

    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}

/// Client for the generation API. Cheap to clone, shares its connection pool.
#[derive(Clone)]
pub struct Generator {
    client: reqwest::Client,
    config: AiConfig,
}
impl Generator {
    pub fn new(config: AiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build generation Reqwest client!");

        Self { client, config }
    }

    /// Sends the fixed conversation context plus the user's text to the
    /// generation API and parses the model's JSON answer.
    ///
    /// Every failure mode, including the deadline, surfaces as a
    /// [`GenerateError`]; callers decide whether to mask it.
    pub async fn generate(&self, utterance: &str) -> Result<GeneratedAnswer, GenerateError> {
        // The credential check must happen before any network I/O.
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GenerateError::MissingCredential)?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model,
            api_key
        );
        let body = build_request(&self.config, utterance);

        debug!("Requesting generation for utterance of {} bytes", utterance.len());
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Generation API error: {status} - {body}");
            return Err(GenerateError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.as_str())
            .ok_or_else(|| {
                GenerateError::MalformedAnswer("No candidates in response".to_string())
            })?;

        parse_answer(text)
    }

    fn map_transport_error(&self, error: reqwest::Error) -> GenerateError {
        if error.is_timeout() {
            GenerateError::Timeout(Duration::from_secs(self.config.timeout_secs))
        } else {
            GenerateError::Network(error)
        }
    }
}

fn build_request<'a>(config: &AiConfig, utterance: &'a str) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![
            Content {
                role: "user",
                parts: vec![Part {
                    text: prompt::SYSTEM_PROMPT,
                }],
            },
            Content {
                role: "model",
                parts: vec![Part {
                    text: prompt::FEW_SHOT_ANSWER,
                }],
            },
            Content {
                role: "user",
                parts: vec![Part { text: utterance }],
            },
        ],
        generation_config: GenerationConfig {
            temperature: config.temperature,
            response_mime_type: "application/json",
        },
    }
}

/// The model's text field must itself be a JSON document with the answer
/// shape (JSON-in-JSON).
fn parse_answer(text: &str) -> Result<GeneratedAnswer, GenerateError> {
    serde_json::from_str(text).map_err(|e| GenerateError::MalformedAnswer(e.to_string()))
}

#[cfg(test)]
mod generator_tests {
    use super::*;
    use crate::config::AiConfig;

    #[test]
    fn test_parse_answer() {
        let answer = parse_answer(
            "{\"response_text\": \"A\", \"follow_up_questions\": [\"B\", \"C\"]}",
        )
        .unwrap();
        assert_eq!(answer.response_text, "A");
        assert_eq!(answer.follow_up_questions, vec!["B", "C"]);

        // Missing suggestions default to an empty list.
        let answer = parse_answer("{\"response_text\": \"A\"}").unwrap();
        assert_eq!(answer.response_text, "A");
        assert!(answer.follow_up_questions.is_empty());

        // The few-shot example itself must parse.
        let answer = parse_answer(prompt::FEW_SHOT_ANSWER).unwrap();
        assert_eq!(answer.follow_up_questions.len(), 2);

        // Anything else is a generation failure.
        assert!(matches!(
            parse_answer("not json at all"),
            Err(GenerateError::MalformedAnswer(_))
        ));
        assert!(matches!(
            parse_answer("{\"follow_up_questions\": []}"),
            Err(GenerateError::MalformedAnswer(_))
        ));
        assert!(matches!(
            parse_answer("{\"response_text\": 42}"),
            Err(GenerateError::MalformedAnswer(_))
        ));
    }

    #[test]
    fn test_build_request_turn_order() {
        let config = AiConfig::default();
        let request = build_request(&config, "아기가 기침을 해요");

        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[0].role, "user");
        assert_eq!(request.contents[0].parts[0].text, prompt::SYSTEM_PROMPT);
        assert_eq!(request.contents[1].role, "model");
        assert_eq!(request.contents[1].parts[0].text, prompt::FEW_SHOT_ANSWER);
        assert_eq!(request.contents[2].role, "user");
        assert_eq!(request.contents[2].parts[0].text, "아기가 기침을 해요");

        let value = serde_json::to_value(&request).unwrap();
        let temperature = value["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.7).abs() < 1e-6);
        assert_eq!(
            value["generationConfig"]["response_mime_type"],
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        // Unroutable endpoint: any network attempt would not return
        // MissingCredential, so the error kind proves the check order.
        let config = AiConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            api_key: None,
            ..AiConfig::default()
        };

        let generator = Generator::new(config);
        let err = generator.generate("hello").await.unwrap_err();
        assert!(matches!(err, GenerateError::MissingCredential));
    }
}
