//! Hand-written intent rules answered without running the model.

use rand::seq::SliceRandom;
use rand::Rng;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};

const GREETING_PATTERNS: &[&str] = &[
    r"\b안녕\b",
    r"\b안녕하세요\b",
    r"\b반가워\b",
    r"\b하이\b",
    r"\b잘 지내\b",
];

const GREETING_RESPONSES: &[&str] = &[
    "안녕하세요! 😊",
    "반갑습니다!",
    "안녕! 좋은 하루 보내!",
    "하이~ 뭐 도와줄까?",
];

const IDENTITY_PATTERNS: &[&str] = &[
    r"\b이름이 뭐야\b",
    r"\b너 누구야\b",
    r"\b너의 이름은\b",
    r"\b너 뭐야\b",
];

const IDENTITY_RESPONSES: &[&str] = &[
    "내 이름은 마음이야!",
    "난 챗봇 마음이야, 반가워!",
    "마음이라고 불러줘! 😊",
];

/// Intents the rule layer answers itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    IdentityQuestion,
}

/// One intent's patterns and canned replies.
#[derive(Debug, Clone)]
pub struct Rule {
    intent: Intent,
    patterns: RegexSet,
    responses: Vec<String>,
}

impl Rule {
    /// Compile `patterns` case-insensitively.
    pub fn new<P, R>(intent: Intent, patterns: P, responses: R) -> ChatResult<Self>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        let patterns = RegexSet::new(
            patterns
                .into_iter()
                .map(|p| format!("(?i){}", p.as_ref())),
        )
        .map_err(|e| ChatError::Config(format!("invalid {intent:?} pattern: {e}")))?;
        let responses: Vec<String> = responses.into_iter().map(Into::into).collect();
        if responses.is_empty() {
            return Err(ChatError::Config(format!("{intent:?} has no responses")));
        }
        Ok(Self {
            intent,
            patterns,
            responses,
        })
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn responses(&self) -> &[String] {
        &self.responses
    }

    fn matches(&self, text: &str) -> bool {
        self.patterns.is_match(text)
    }
}

/// Ordered list of rules; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    rules: Vec<Rule>,
}

impl Default for RuleMatcher {
    fn default() -> Self {
        let rules = vec![
            Rule::new(Intent::Greeting, GREETING_PATTERNS, GREETING_RESPONSES.iter().copied())
                .expect("greeting patterns must compile"),
            Rule::new(
                Intent::IdentityQuestion,
                IDENTITY_PATTERNS,
                IDENTITY_RESPONSES.iter().copied(),
            )
            .expect("identity patterns must compile"),
        ];
        Self { rules }
    }
}

impl RuleMatcher {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Intent of `text`, or `None` when the model has to answer.
    pub fn classify(&self, text: &str) -> Option<Intent> {
        self.rules
            .iter()
            .find(|rule| rule.matches(text))
            .map(Rule::intent)
    }

    /// Classify `text` and pick one of the matching rule's replies.
    pub fn respond<R: Rng + ?Sized>(&self, text: &str, rng: &mut R) -> Option<(Intent, &str)> {
        let rule = self.rules.iter().find(|rule| rule.matches(text))?;
        let reply = rule.responses.choose(rng)?;
        Some((rule.intent, reply.as_str()))
    }

    /// Canned replies for `intent`.
    pub fn responses(&self, intent: Intent) -> &[String] {
        self.rules
            .iter()
            .find(|rule| rule.intent == intent)
            .map(Rule::responses)
            .unwrap_or(&[])
    }
}
