use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

static NON_LETTERS: OnceLock<Regex> = OnceLock::new();

/// Response body for `GET /getword`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomWordResponse {
    pub word: String,
}

/// Request body for `POST /checkword`
///
/// Built from a JSON object only; arrays and scalars are rejected.
#[derive(Debug, PartialEq)]
pub struct CheckWordRequest {
    pub word: Option<String>,
}

/// Response body for `POST /checkword`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckWordResponse {
    pub message: bool,
}

impl TryFrom<Value> for CheckWordRequest {
    type Error = String;

    fn try_from(body: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut fields) = body else {
            return Err("Request body must be a JSON object".to_string());
        };

        match fields.remove("word") {
            None | Some(Value::Null) => Ok(Self { word: None }),
            Some(Value::String(word)) => Ok(Self { word: Some(word) }),
            Some(_) => Err("Field 'word' must be a string".to_string()),
        }
    }
}

impl CheckWordRequest {
    /// Validate the check word request
    pub fn validate(&self) -> Result<&str, String> {
        match self.word.as_deref() {
            None => Err("Field 'word' is required".to_string()),
            Some(word) if word.trim().is_empty() => {
                Err("Field 'word' cannot be empty".to_string())
            }
            Some(word) => Ok(word),
        }
    }
}

/// Canonical dictionary form of a guess: letters only, lowercased.
///
/// Letters are General Category L; digits, punctuation, letter numbers and
/// combining marks are dropped. Lowercasing runs on the whole string so
/// context-sensitive mappings such as Greek final sigma apply.
pub fn normalize_word(raw: &str) -> String {
    let non_letters = NON_LETTERS
        .get_or_init(|| Regex::new(r"[^\p{L}]+").expect("letter class pattern is valid"));

    non_letters.replace_all(raw, "").to_lowercase()
}
