//! Model-backed document type detection over a closed set of categories.

use crate::error::{IngestError, IngestResult};
use crate::filler::{extract_json, truncate_chars};
use crate::prompts::{PromptLibrary, CATEGORIES_PLACEHOLDER, DATA_PLACEHOLDER, DETECT_TYPE_PROMPT};
use corpus_core::DocumentType;
use corpus_llm::LanguageModel;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Assigns one of [`DocumentType::CLASSIFIABLE`] to free text.
#[derive(Clone)]
pub struct TypeClassifier {
    model: Arc<dyn LanguageModel>,
    prompts: Arc<PromptLibrary>,
    prefix_chars: usize,
}

impl TypeClassifier {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: Arc<PromptLibrary>) -> Self {
        Self {
            model,
            prompts,
            prefix_chars: 2_000,
        }
    }

    /// How much of the content goes into the prompt.
    pub fn with_prefix_chars(mut self, prefix_chars: usize) -> Self {
        self.prefix_chars = prefix_chars;
        self
    }

    fn categories() -> String {
        DocumentType::CLASSIFIABLE
            .iter()
            .map(|t| format!("- {}", t.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Never returns a type outside the closed set: anything else is a
    /// [`IngestError::Classification`].
    pub async fn classify(&self, content: &str) -> IngestResult<DocumentType> {
        let prompt = self
            .prompts
            .get(DETECT_TYPE_PROMPT)?
            .replace(CATEGORIES_PLACEHOLDER, &Self::categories())
            .replace(DATA_PLACEHOLDER, truncate_chars(content, self.prefix_chars));

        let response = self.model.complete(&prompt).await?;

        let answer = extract_json(&response)
            .and_then(|map| map.get("document_type").and_then(Value::as_str).map(str::to_string));
        let Some(answer) = answer else {
            warn!("Unparseable classification: {}", response);
            return Err(IngestError::Classification(format!(
                "no document_type in answer: {}",
                truncate_chars(&response, 200)
            )));
        };

        match answer.parse::<DocumentType>() {
            Ok(doc_type) if doc_type.is_classifiable() => {
                debug!("Classified as {}", doc_type);
                Ok(doc_type)
            }
            _ => Err(IngestError::Classification(format!(
                "'{}' is not an allowed document type",
                answer
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_llm::ScriptedModel;

    fn classifier(response: &str) -> (Arc<ScriptedModel>, TypeClassifier) {
        let model = Arc::new(ScriptedModel::new().with_default(response));
        let classifier = TypeClassifier::new(model.clone(), Arc::new(PromptLibrary::builtin()));
        (model, classifier)
    }

    #[tokio::test]
    async fn test_allowed_type() {
        let (_, c) = classifier("```json\n{\"document_type\": \" Projet \"}\n```");
        assert_eq!(c.classify("x").await.unwrap(), DocumentType::Projet);
    }

    #[tokio::test]
    async fn test_out_of_set_types_fail() {
        for answer in [
            r#"{"document_type": "page_web"}"#,
            r#"{"document_type": "recette"}"#,
            r#"{"type": "cours"}"#,
            "cours",
        ] {
            let (_, c) = classifier(answer);
            assert!(
                matches!(c.classify("x").await, Err(IngestError::Classification(_))),
                "{}",
                answer
            );
        }
    }

    #[tokio::test]
    async fn test_prompt_holds_prefix_and_categories() {
        let (model, c) = classifier(r#"{"document_type": "cours"}"#);
        let c = c.with_prefix_chars(5);
        c.classify("abcdefghij").await.unwrap();

        let prompt = &model.prompts()[0];
        assert!(prompt.contains("abcde"));
        assert!(!prompt.contains("abcdef"));
        assert!(prompt.contains("- vie_etudiante"));
    }
}
