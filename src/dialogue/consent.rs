//! `ConsentDetector`: classifies the contact's reply to the intro/consent
//! prompt as POSITIVE/NEGATIVE/UNCLEAR. Algorithm grounded verbatim in
//! `examples/original_source/test/test_consent_detector.py`: try to parse
//! the LLM's reply as `{"intent": ..., "confidence": ...}` JSON; on parse
//! failure, fall back to a per-language keyword match against the
//! contact's own utterance; default UNCLEAR.

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{ChatMessage, LlmClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentIntent {
    Positive,
    Negative,
    Unclear,
}

#[derive(Debug, Clone, Copy)]
pub struct ConsentResult {
    pub intent: ConsentIntent,
    pub confidence: f32,
}

#[derive(Deserialize)]
struct RawConsentJson {
    intent: String,
    #[serde(default)]
    confidence: Option<f64>,
}

const POSITIVE_KEYWORDS_EN: &[&str] = &["yes", "sure", "ok", "okay", "agree", "fine", "alright"];
const NEGATIVE_KEYWORDS_EN: &[&str] =
    &["no", "not interested", "stop", "don't call", "no thanks"];
const POSITIVE_KEYWORDS_IT: &[&str] = &["si", "sì", "certo", "va bene", "d'accordo"];
const NEGATIVE_KEYWORDS_IT: &[&str] = &["no", "non mi interessa", "basta"];

pub struct ConsentDetector {
    llm: Arc<dyn LlmClient>,
}

impl ConsentDetector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn detect(&self, user_utterance: &str, language: &str) -> ConsentResult {
        let prompt = format!(
            "The caller was just asked for consent to take a short survey. \
             Their reply was: \"{user_utterance}\". \
             Classify their intent strictly as JSON: {{\"intent\": \"POSITIVE\"|\"NEGATIVE\"|\"UNCLEAR\", \"confidence\": 0.0-1.0}}. \
             Respond with the language of the reply in mind (language code: {language}). No other text."
        );

        let reply = self
            .llm
            .send_message(None, &[ChatMessage::user(prompt)], 200, Some(0.0))
            .await;

        if let Ok(response) = reply {
            if let Some(result) = Self::parse_json(&response.text) {
                return result;
            }
        }

        Self::keyword_fallback(user_utterance, language)
    }

    fn parse_json(text: &str) -> Option<ConsentResult> {
        let raw: RawConsentJson = serde_json::from_str(text.trim()).ok()?;
        let intent = match raw.intent.to_uppercase().as_str() {
            "POSITIVE" => ConsentIntent::Positive,
            "NEGATIVE" => ConsentIntent::Negative,
            _ => ConsentIntent::Unclear,
        };
        let confidence = raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0) as f32;
        Some(ConsentResult { intent, confidence })
    }

    fn keyword_fallback(user_utterance: &str, language: &str) -> ConsentResult {
        let lowered = user_utterance.to_lowercase();
        let (positive, negative) = if language.starts_with("it") {
            (POSITIVE_KEYWORDS_IT, NEGATIVE_KEYWORDS_IT)
        } else {
            (POSITIVE_KEYWORDS_EN, NEGATIVE_KEYWORDS_EN)
        };

        // Negative keywords are checked first so phrases like "no thanks"
        // aren't mistaken for a positive "thanks"-adjacent match.
        if negative.iter().any(|kw| lowered.contains(kw)) {
            return ConsentResult { intent: ConsentIntent::Negative, confidence: 0.6 };
        }
        if positive.iter().any(|kw| lowered.contains(kw)) {
            return ConsentResult { intent: ConsentIntent::Positive, confidence: 0.6 };
        }
        ConsentResult { intent: ConsentIntent::Unclear, confidence: 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_fallback_english_positive() {
        let result = ConsentDetector::keyword_fallback("yes I agree", "en");
        assert_eq!(result.intent, ConsentIntent::Positive);
    }

    #[test]
    fn keyword_fallback_english_negative() {
        let result = ConsentDetector::keyword_fallback("no thanks", "en");
        assert_eq!(result.intent, ConsentIntent::Negative);
    }

    #[test]
    fn keyword_fallback_italian_positive() {
        let result = ConsentDetector::keyword_fallback("sì certo", "it");
        assert_eq!(result.intent, ConsentIntent::Positive);
    }

    #[test]
    fn keyword_fallback_italian_negative() {
        let result = ConsentDetector::keyword_fallback("no grazie, non mi interessa", "it");
        assert_eq!(result.intent, ConsentIntent::Negative);
    }

    #[test]
    fn keyword_fallback_unclear_when_nothing_matches() {
        let result = ConsentDetector::keyword_fallback("maybe later", "en");
        assert_eq!(result.intent, ConsentIntent::Unclear);
    }

    #[test]
    fn json_reply_is_parsed_directly() {
        let result = ConsentDetector::parse_json(r#"{"intent":"POSITIVE","confidence":0.95}"#).unwrap();
        assert_eq!(result.intent, ConsentIntent::Positive);
        assert!(result.confidence >= 0.9);
    }

    #[test]
    fn garbled_reply_falls_back_to_unclear() {
        assert!(ConsentDetector::parse_json("not json at all").is_none());
    }
}
