//! LLM-judged feedback functions.
//!
//! Each function asks the judge model for a 0-10 rating and normalizes it
//! to 0.0-1.0. Multi-part feedbacks average their parts.

use super::{EvaluationError, Result};
use crate::provider::{ChatRequest, Message, Provider};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const JUDGE_SYSTEM_PROMPT: &str = "You are a strict evaluator. Reply with a single integer \
                                   rating from 0 to 10 and nothing else.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feedback {
    /// Is the answer supported by the retrieved sources?
    Groundedness,
    /// Is the answer relevant to the question?
    AnswerRelevance,
    /// Are the retrieved sources relevant to the question?
    ContextRelevance,
}

impl Feedback {
    pub const ALL: [Feedback; 3] = [
        Feedback::Groundedness,
        Feedback::AnswerRelevance,
        Feedback::ContextRelevance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feedback::Groundedness => "groundedness",
            Feedback::AnswerRelevance => "answer_relevance",
            Feedback::ContextRelevance => "context_relevance",
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A chat model used to grade answers.
#[derive(Clone)]
pub struct Judge {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Judge {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Asks for a rating and returns it normalized to 0.0-1.0.
    pub async fn rate(&self, prompt: String) -> Result<f64> {
        let request = ChatRequest::new(
            self.model.clone(),
            vec![Message::system(JUDGE_SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_temperature(0.0);

        let reply = self.provider.chat(request).await?;
        parse_score(&reply).ok_or(EvaluationError::UnparsableScore(reply))
    }

    /// Runs one feedback function over a question/answer/sources triple.
    pub async fn evaluate(&self, feedback: Feedback, question: &str, answer: &str, sources: &[String]) -> Result<f64> {
        let score = match feedback {
            Feedback::Groundedness => self.groundedness(sources, answer).await?,
            Feedback::AnswerRelevance => self.answer_relevance(question, answer).await?,
            Feedback::ContextRelevance => self.context_relevance(question, sources).await?,
        };
        debug!("{} = {:.2}", feedback, score);
        Ok(score)
    }

    /// Mean support of each answer statement by the sources taken together.
    pub async fn groundedness(&self, sources: &[String], answer: &str) -> Result<f64> {
        let context = sources.join("\n\n");
        let mut scores = Vec::new();
        for statement in split_statements(answer) {
            let prompt = format!(
                "SOURCE:\n{}\n\nSTATEMENT:\n{}\n\n\
                 How well is the STATEMENT supported by the SOURCE? \
                 0 means not supported at all, 10 means fully supported.",
                context, statement
            );
            scores.push(self.rate(prompt).await?);
        }
        Ok(mean(&scores))
    }

    pub async fn answer_relevance(&self, question: &str, answer: &str) -> Result<f64> {
        let prompt = format!(
            "QUESTION:\n{}\n\nANSWER:\n{}\n\n\
             How relevant is the ANSWER to the QUESTION? \
             0 means irrelevant, 10 means fully relevant.",
            question, answer
        );
        self.rate(prompt).await
    }

    /// Mean relevance of each source to the question.
    pub async fn context_relevance(&self, question: &str, sources: &[String]) -> Result<f64> {
        let mut scores = Vec::with_capacity(sources.len());
        for source in sources {
            let prompt = format!(
                "QUESTION:\n{}\n\nCONTEXT:\n{}\n\n\
                 How relevant is the CONTEXT to the QUESTION? \
                 0 means irrelevant, 10 means fully relevant.",
                question, source
            );
            scores.push(self.rate(prompt).await?);
        }
        Ok(mean(&scores))
    }
}

/// Extracts the first number in `reply` between 0 and 10 as a 0.0-1.0 score.
pub fn parse_score(reply: &str) -> Option<f64> {
    reply
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map(|token| token.trim_matches('.'))
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
        .find(|value| (0.0..=10.0).contains(value))
        .map(|value| value / 10.0)
}

/// Splits an answer into sentence-like statements.
fn split_statements(answer: &str) -> Vec<&str> {
    let statements: Vec<&str> = answer
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if statements.is_empty() {
        vec![answer.trim()]
    } else {
        statements
    }
}

fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("8"), Some(0.8));
        assert_eq!(parse_score("Rating: 10."), Some(1.0));
        assert_eq!(parse_score("Score 7.5/10"), Some(0.75));
        assert_eq!(parse_score("42, no wait, 3"), Some(0.3));
        assert_eq!(parse_score("no idea"), None);
    }

    #[test]
    fn test_split_statements() {
        assert_eq!(
            split_statements("Letters are rectangular. They must be 5 inches long!\nDone"),
            vec!["Letters are rectangular", "They must be 5 inches long", "Done"]
        );
        assert_eq!(split_statements(""), vec![""]);
    }

    #[tokio::test]
    async fn test_groundedness_rates_every_statement() {
        let provider = std::sync::Arc::new(MockProvider::new().with_reply("6"));
        let judge = Judge::new(provider.clone(), "judge");

        let score = judge
            .groundedness(&["source text".to_string()], "First claim. Second claim.")
            .await
            .unwrap();

        assert!((score - 0.6).abs() < 1e-9);
        assert_eq!(provider.requests().len(), 2);
        assert_eq!(provider.requests()[0].temperature, 0.0);
    }

    #[tokio::test]
    async fn test_context_relevance_without_sources_is_zero() {
        let provider = std::sync::Arc::new(MockProvider::new().with_reply("9"));
        let judge = Judge::new(provider.clone(), "judge");

        assert_eq!(judge.context_relevance("q", &[]).await.unwrap(), 0.0);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unparsable_reply() {
        let judge = Judge::new(std::sync::Arc::new(MockProvider::new().with_reply("great answer")), "judge");
        let result = judge.answer_relevance("q", "a").await;
        assert!(matches!(result, Err(EvaluationError::UnparsableScore(_))));
    }
}
