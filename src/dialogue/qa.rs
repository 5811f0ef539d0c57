//! `QAOrchestrator`: parses the LLM's reply to a delivered survey question
//! using the fixed `INTENT/ANSWER/CONFIDENCE/REASONING` format mandated by
//! spec.md §4.3. Defensive by construction (spec.md §9 "confidence/LLM
//! parsing"): unknown intent becomes UNCLEAR, unparseable confidence
//! becomes 0.5, and nothing here ever raises into the dialogue loop.

use std::sync::Arc;

use crate::llm::{ChatMessage, LlmClient};
use crate::models::QuestionAnswerType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QaIntent {
    Answer,
    RepeatRequest,
    Unclear,
}

#[derive(Debug, Clone)]
pub struct QaResult {
    pub intent: QaIntent,
    pub answer_text: Option<String>,
    pub confidence: f32,
    #[allow(dead_code)]
    pub reasoning: Option<String>,
}

pub struct QAOrchestrator {
    llm: Arc<dyn LlmClient>,
}

impl QAOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn extraction_prompt(
        question_text: &str,
        answer_type: QuestionAnswerType,
        language: &str,
        user_utterance: &str,
    ) -> String {
        let type_name = match answer_type {
            QuestionAnswerType::FreeText => "free_text",
            QuestionAnswerType::Numeric => "numeric",
            QuestionAnswerType::Scale => "scale",
        };
        format!(
            "Question asked (type={type_name}, language={language}): \"{question_text}\"\n\
             Caller's reply: \"{user_utterance}\"\n\
             Respond on a single line in exactly this format, nothing else:\n\
             INTENT/ANSWER/CONFIDENCE/REASONING\n\
             INTENT is one of ANSWER, REPEAT_REQUEST, UNCLEAR. \
             ANSWER may be the literal text NONE if the caller did not actually answer. \
             CONFIDENCE is a number between 0 and 1. \
             Match the caller's language and the question's answer type when judging ANSWER."
        )
    }

    pub async fn parse_answer(
        &self,
        question_text: &str,
        answer_type: QuestionAnswerType,
        language: &str,
        user_utterance: &str,
    ) -> QaResult {
        let prompt = Self::extraction_prompt(question_text, answer_type, language, user_utterance);
        let reply = self
            .llm
            .send_message(None, &[ChatMessage::user(prompt)], 150, Some(0.0))
            .await;

        match reply {
            Ok(response) => Self::parse_fixed_format(&response.text),
            Err(_) => QaResult {
                intent: QaIntent::Unclear,
                answer_text: None,
                confidence: 0.5,
                reasoning: None,
            },
        }
    }

    /// Parses `INTENT/ANSWER/CONFIDENCE/REASONING`. Any malformed or
    /// missing field degrades gracefully rather than erroring.
    fn parse_fixed_format(text: &str) -> QaResult {
        let line = text.trim().lines().next().unwrap_or("");
        let mut parts = line.splitn(4, '/');
        let intent_raw = parts.next().unwrap_or("").trim().to_uppercase();
        let answer_raw = parts.next().unwrap_or("").trim();
        let confidence_raw = parts.next().unwrap_or("").trim();
        let reasoning_raw = parts.next().unwrap_or("").trim();

        let intent = match intent_raw.as_str() {
            "ANSWER" => QaIntent::Answer,
            "REPEAT_REQUEST" => QaIntent::RepeatRequest,
            _ => QaIntent::Unclear,
        };

        let confidence = clamp_confidence(confidence_raw);

        let answer_text = if intent == QaIntent::Answer && !answer_raw.is_empty() && answer_raw != "NONE"
        {
            Some(answer_raw.to_string())
        } else {
            None
        };

        // ANSWER/NONE means the model heard an intent to answer but
        // captured nothing usable; treat it as UNCLEAR so the orchestrator
        // reprompts instead of recording an empty answer.
        let intent = if intent == QaIntent::Answer && answer_text.is_none() {
            QaIntent::Unclear
        } else {
            intent
        };

        QaResult {
            intent,
            answer_text,
            confidence,
            reasoning: if reasoning_raw.is_empty() { None } else { Some(reasoning_raw.to_string()) },
        }
    }
}

/// B3: `2.5` clamps to `1.0`, `-3` clamps to `0.0`, unparseable text
/// defaults to `0.5`.
pub fn clamp_confidence(raw: &str) -> f32 {
    match raw.parse::<f32>() {
        Ok(value) => value.clamp(0.0, 1.0),
        Err(_) => 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_clamps_above_one() {
        assert_eq!(clamp_confidence("2.5"), 1.0);
    }

    #[test]
    fn confidence_clamps_below_zero() {
        assert_eq!(clamp_confidence("-3"), 0.0);
    }

    #[test]
    fn confidence_defaults_on_parse_error() {
        assert_eq!(clamp_confidence("abc"), 0.5);
    }

    #[test]
    fn parses_answer_line() {
        let result = QAOrchestrator::parse_fixed_format("ANSWER/8/0.9/caller said eight");
        assert_eq!(result.intent, QaIntent::Answer);
        assert_eq!(result.answer_text.as_deref(), Some("8"));
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn answer_none_degrades_to_unclear() {
        let result = QAOrchestrator::parse_fixed_format("ANSWER/NONE/0.2/no usable answer");
        assert_eq!(result.intent, QaIntent::Unclear);
        assert!(result.answer_text.is_none());
    }

    #[test]
    fn unknown_intent_falls_back_to_unclear() {
        let result = QAOrchestrator::parse_fixed_format("MAYBE/something/0.5/?");
        assert_eq!(result.intent, QaIntent::Unclear);
    }

    #[test]
    fn repeat_request_is_recognized() {
        let result = QAOrchestrator::parse_fixed_format("REPEAT_REQUEST//0.4/caller asked to repeat");
        assert_eq!(result.intent, QaIntent::RepeatRequest);
    }
}
