use serde::Serialize;

use crate::{Error, Result};

/// One system prompt variant the backend knows how to build.
///
/// Only the id travels with a request; the prompt text lives server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromptVariant {
    /// Identifier sent as `promptId`.
    pub id: &'static str,
    /// Short display name.
    pub label: &'static str,
    /// One-line description.
    pub description: &'static str,
}

const VARIANTS: &[PromptVariant] = &[
    PromptVariant {
        id: "default",
        label: "Default Prompt",
        description: "The battle tested default system prompt",
    },
    PromptVariant {
        id: "enhanced",
        label: "Fine Tuned Prompt",
        description: "A fine tuned prompt for better results",
    },
    PromptVariant {
        id: "optimized",
        label: "Optimized Prompt (experimental)",
        description: "An experimental prompt for lower token usage",
    },
];

/// Catalog of prompt variants.
pub struct PromptLibrary;

impl PromptLibrary {
    /// Every known variant, default first.
    pub fn list() -> &'static [PromptVariant] {
        VARIANTS
    }

    /// Look up a variant by id.
    ///
    /// An unknown id is a configuration defect, not a runtime condition.
    pub fn get(id: &str) -> Result<&'static PromptVariant> {
        VARIANTS
            .iter()
            .find(|variant| variant.id == id)
            .ok_or_else(|| Error::configuration(format!("unknown prompt id '{id}'")))
    }
}
