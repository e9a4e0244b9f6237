//! Model-backed field completion.

use crate::error::{IngestError, IngestResult};
use crate::prompts::PromptLibrary;
use corpus_llm::LanguageModel;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap();
    static ref BARE_OBJECT: Regex = Regex::new(r"(?s)(\{.*\})").unwrap();
}

/// Drop `// ...` comments that sit outside JSON strings.
fn strip_line_comments(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Pull a JSON object out of a model response: a ```json fenced block if
/// there is one, else everything between the first `{` and the last `}`.
pub fn extract_json(response: &str) -> Option<Map<String, Value>> {
    let raw = FENCED_JSON
        .captures(response)
        .or_else(|| BARE_OBJECT.captures(response))
        .and_then(|caps| caps.get(1))?
        .as_str();

    match serde_json::from_str(&strip_line_comments(raw)) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Asks the model for a set of fields of a document.
#[derive(Clone)]
pub struct FieldFiller {
    model: Arc<dyn LanguageModel>,
    prompts: Arc<PromptLibrary>,
    max_chars: usize,
}

impl FieldFiller {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: Arc<PromptLibrary>) -> Self {
        Self {
            model,
            prompts,
            max_chars: 20_000,
        }
    }

    /// Cap on the serialized document embedded in the prompt.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Fill `fields` of `data` with the `template` prompt.
    ///
    /// Only requested keys the model actually returned are kept. An
    /// unparseable answer yields an empty mapping; a failed model call is
    /// an error.
    pub async fn fill_fields(
        &self,
        data: &Value,
        fields: &[&str],
        template: &str,
    ) -> IngestResult<Map<String, Value>> {
        let serialized = serde_json::to_string_pretty(data)?;
        let prompt = self
            .prompts
            .render(template, truncate_chars(&serialized, self.max_chars))?;

        debug!("Filling {:?} with {} ({})", fields, template, self.model.name());
        let response = self
            .model
            .complete(&prompt)
            .await
            .map_err(|e| IngestError::FieldFill {
                template: template.to_string(),
                message: e.to_string(),
            })?;

        let Some(mut values) = extract_json(&response) else {
            warn!("Unparseable answer for {}: {}", template, response);
            return Ok(Map::new());
        };

        Ok(fields
            .iter()
            .filter_map(|f| values.remove(*f).map(|v| (f.to_string(), v)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_llm::ScriptedModel;
    use serde_json::json;

    fn filler(model: ScriptedModel) -> FieldFiller {
        FieldFiller::new(Arc::new(model), Arc::new(PromptLibrary::builtin()))
    }

    #[test]
    fn test_extract_fenced() {
        let response = "Here is the answer:\n```json\n{\"tags\": [\"a\",\"b\"]}\n```";
        assert_eq!(
            Value::Object(extract_json(response).unwrap()),
            json!({"tags": ["a", "b"]})
        );
    }

    #[test]
    fn test_extract_bare_with_comments() {
        let response = "Voilà {\n  \"title\": \"Plan\", // guessed\n  \"url\": \"http://x.fr\"\n} fin";
        let map = extract_json(response).unwrap();
        assert_eq!(map["title"], "Plan");
        assert_eq!(map["url"], "http://x.fr");
    }

    #[test]
    fn test_extract_rejects_non_objects() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("{broken").is_none());
        assert!(extract_json("```json\n{\"a\": }\n```").is_none());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_fill_keeps_requested_fields_only() {
        let model = ScriptedModel::new().with_default(
            "Here is the answer:\n```json\n{\"tags\": [\"a\",\"b\"], \"extra\": 1}\n```",
        );
        let filled = filler(model)
            .fill_fields(&json!({"content": "x"}), &["tags", "missing"], "globals/tags.txt")
            .await
            .unwrap();
        assert_eq!(Value::Object(filled), json!({"tags": ["a", "b"]}));
    }

    #[tokio::test]
    async fn test_fill_unparseable_is_empty() {
        let model = ScriptedModel::new().with_default("je ne sais pas");
        let filled = filler(model)
            .fill_fields(&json!({}), &["tags"], "globals/tags.txt")
            .await
            .unwrap();
        assert!(filled.is_empty());
    }

    #[tokio::test]
    async fn test_fill_model_failure_is_error() {
        let model = ScriptedModel::new().fail_when("mots-clés", "connection refused");
        let err = filler(model)
            .fill_fields(&json!({}), &["tags"], "globals/tags.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::FieldFill { .. }));
    }

    #[tokio::test]
    async fn test_prompt_is_truncated() {
        let model = Arc::new(ScriptedModel::new().with_default("{}"));
        let filler = FieldFiller::new(model.clone(), Arc::new(PromptLibrary::builtin()))
            .with_max_chars(10);
        filler
            .fill_fields(&json!({"content": "x".repeat(100)}), &["tags"], "globals/tags.txt")
            .await
            .unwrap();

        let prompt = &model.prompts()[0];
        assert!(!prompt.contains(&"x".repeat(20)));
    }
}
