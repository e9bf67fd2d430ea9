//! Question bank loading and validation.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: u32,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Bank {
    #[serde(default)]
    questions: Vec<QuizQuestion>,
}

fn builtin_bank_text() -> &'static str {
    include_str!("../questions/ai_quiz.toml")
}

/// The embedded AI-concepts bank shipped with the binary.
pub fn builtin_bank() -> Result<Vec<QuizQuestion>> {
    parse_bank(builtin_bank_text())
}

fn parse_bank(text: &str) -> Result<Vec<QuizQuestion>> {
    let bank: Bank = toml::from_str(text).map_err(|e| anyhow!("failed to parse question bank: {e}"))?;
    if bank.questions.is_empty() {
        return Err(anyhow!("question bank is empty"));
    }
    for q in &bank.questions {
        if q.question.trim().is_empty() {
            return Err(anyhow!("question {} has empty text", q.id));
        }
        if q.options.len() < 2 {
            return Err(anyhow!("question {} needs at least two options", q.id));
        }
        if q.correct_answer_index >= q.options.len() {
            return Err(anyhow!(
                "question {}: correct_answer_index {} out of range ({} options)",
                q.id,
                q.correct_answer_index,
                q.options.len()
            ));
        }
    }
    Ok(bank.questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_bank_parses_and_validates() {
        let bank = builtin_bank().unwrap();
        assert_eq!(bank.len(), 20);
        assert!(bank.iter().all(|q| q.options.len() == 4));
        assert!(bank.iter().all(|q| q.correct_answer_index < 4));
    }

    #[test]
    fn rejects_out_of_range_answer_index() {
        let text = r#"
            [[questions]]
            id = 1
            question = "pick one"
            options = ["a", "b"]
            correct_answer_index = 2
        "#;
        assert!(parse_bank(text).is_err());
    }

    #[test]
    fn rejects_empty_bank() {
        assert!(parse_bank("").is_err());
    }
}
