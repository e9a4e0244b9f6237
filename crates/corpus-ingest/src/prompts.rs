//! Prompt templates addressed by id, e.g. `globals/metadata.txt`.

use crate::error::{IngestError, IngestResult};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Placeholder replaced by the serialized document.
pub const DATA_PLACEHOLDER: &str = "{{data}}";
/// Placeholder replaced by the allowed document types.
pub const CATEGORIES_PLACEHOLDER: &str = "{{categories}}";

pub const METADATA_PROMPT: &str = "globals/metadata.txt";
pub const TAGS_PROMPT: &str = "globals/tags.txt";
pub const DETECT_TYPE_PROMPT: &str = "globals/detect_type.txt";

/// Templates compiled into the binary, used when the prompts directory does
/// not override them.
pub const BUILTIN_PROMPTS: [(&str, &str); 9] = [
    (METADATA_PROMPT, include_str!("../prompts/globals/metadata.txt")),
    (TAGS_PROMPT, include_str!("../prompts/globals/tags.txt")),
    (DETECT_TYPE_PROMPT, include_str!("../prompts/globals/detect_type.txt")),
    ("cours/cours_fields.txt", include_str!("../prompts/cours/cours_fields.txt")),
    (
        "administratif/administratif_fields.txt",
        include_str!("../prompts/administratif/administratif_fields.txt"),
    ),
    (
        "specialite/specialite_fields.txt",
        include_str!("../prompts/specialite/specialite_fields.txt"),
    ),
    ("projet/projet.txt", include_str!("../prompts/projet/projet.txt")),
    (
        "infrastructure/infrastructure_fields.txt",
        include_str!("../prompts/infrastructure/infrastructure_fields.txt"),
    ),
    (
        "vie_etudiante/vie_etudiante_fields.txt",
        include_str!("../prompts/vie_etudiante/vie_etudiante_fields.txt"),
    ),
];

/// Looks templates up on disk first, then among the built-in ones.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    dir: Option<PathBuf>,
}

impl PromptLibrary {
    /// Library reading overrides from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Library with the built-in templates only.
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Template text for `id`.
    pub fn get(&self, id: &str) -> IngestResult<Cow<'static, str>> {
        if let Some(dir) = &self.dir {
            let path = dir.join(id);
            if path.is_file() {
                debug!("Using prompt override {:?}", path);
                return Ok(Cow::Owned(std::fs::read_to_string(&path)?));
            }
        }

        BUILTIN_PROMPTS
            .iter()
            .find(|(name, _)| *name == id)
            .map(|(_, text)| Cow::Borrowed(*text))
            .ok_or_else(|| IngestError::PromptNotFound(id.to_string()))
    }

    /// Template `id` with `{{data}}` replaced.
    pub fn render(&self, id: &str, data: &str) -> IngestResult<String> {
        Ok(self.get(id)?.replace(DATA_PLACEHOLDER, data))
    }

    /// Write every built-in template under `dir`, keeping existing files.
    /// Returns how many were written.
    pub fn install_builtin(dir: &Path) -> IngestResult<usize> {
        let mut written = 0;
        for (id, text) in BUILTIN_PROMPTS {
            let path = dir.join(id);
            if path.exists() {
                continue;
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, text)?;
            written += 1;
        }
        Ok(written)
    }
}
