//! Multiple-choice question from a piece of learning content

use serde::{Deserialize, Serialize};

use crate::errors::{RagError, Result};

/// Answer options per question
pub const QUIZ_OPTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Index into `options`
    #[serde(rename = "correctAnswer")]
    pub correct_answer: usize,
    pub explanation: String,
}

impl QuizQuestion {
    pub fn correct_option(&self) -> &str {
        &self.options[self.correct_answer]
    }
}

/// Prompt asking for one question about `content` as bare JSON
pub fn quiz_prompt(content: &str) -> String {
    format!(
        "Based on this content:\n\"{content}\"\n\n\
         Generate a multiple choice question with exactly 3 answer options to test understanding of this content.\n\n\
         Respond ONLY with valid JSON in this exact format (no additional text):\n\
         {{\n    \
             \"question\": \"Your question here?\",\n    \
             \"options\": [\"Option A\", \"Option B\", \"Option C\"],\n    \
             \"correctAnswer\": 0,\n    \
             \"explanation\": \"Brief explanation of the correct answer\"\n\
         }}\n\n\
         The correctAnswer should be the index (0, 1, or 2) of the correct option in the options array.\n\
         Make the question specific to the content provided and ensure only one answer is clearly correct.",
        content = content.trim(),
    )
}

/// Outermost `{...}` span of a reply, or the whole reply when there is none
pub fn extract_json(reply: &str) -> &str {
    match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply,
    }
}

/// Decode and validate the question in a model reply
pub fn parse_quiz(reply: &str) -> Result<QuizQuestion> {
    let quiz: QuizQuestion = serde_json::from_str(extract_json(reply))
        .map_err(|e| RagError::DecodeError(format!("Failed to parse quiz: {}", e)))?;

    if quiz.options.len() != QUIZ_OPTIONS || quiz.correct_answer >= QUIZ_OPTIONS {
        return Err(RagError::DecodeError(format!(
            "Invalid quiz structure: {} options, answer index {}",
            quiz.options.len(),
            quiz.correct_answer
        )));
    }
    Ok(quiz)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"Sure! Here is your question:
{
  "question": "What does SEER measure?",
  "options": ["Airflow", "Cooling efficiency", "Duct size"],
  "correctAnswer": 1,
  "explanation": "SEER is the seasonal energy efficiency ratio."
}
Let me know if you want another."#;

    #[test]
    fn test_parse_reply_with_surrounding_text() {
        let quiz = parse_quiz(REPLY).unwrap();
        assert_eq!(quiz.question, "What does SEER measure?");
        assert_eq!(quiz.correct_option(), "Cooling efficiency");
    }

    #[test]
    fn test_extract_json_without_braces_keeps_reply() {
        assert_eq!(extract_json("no json here"), "no json here");
        assert_eq!(extract_json("} backwards {"), "} backwards {");
    }

    #[test]
    fn test_wrong_option_count_rejected() {
        let reply = r#"{"question":"q","options":["a","b"],"correctAnswer":0,"explanation":"e"}"#;
        assert!(matches!(parse_quiz(reply), Err(RagError::DecodeError(_))));
    }

    #[test]
    fn test_answer_out_of_range_rejected() {
        let reply = r#"{"question":"q","options":["a","b","c"],"correctAnswer":3,"explanation":"e"}"#;
        match parse_quiz(reply) {
            Err(RagError::DecodeError(message)) => assert!(message.contains("answer index 3")),
            other => panic!("expected DecodeError, got {:?}", other),
        }
    }

    #[test]
    fn test_prompt_embeds_content() {
        let prompt = quiz_prompt("  Wash hands for 20 seconds. ");
        assert!(prompt.starts_with("Based on this content:\n\"Wash hands for 20 seconds.\"\n\n"));
        assert!(prompt.contains("\"correctAnswer\": 0,"));
    }
}
