//! The starter-template resolver.
//!
//! On a conversation's first message the resolver asks the classifier which
//! starter template fits the request. A non-blank answer seeds the
//! conversation with three synthetic messages; anything else, including every
//! failure, falls back to the blank path.

use std::sync::Arc;

use crate::backend::TemplateBackend;
use crate::conversation::{frame_user_text, framed_user_message, now_millis};
use crate::observability::{TEMPLATE_FALLBACKS, TEMPLATE_SEEDS};
use crate::render::Renderer;
use crate::types::{
    BLANK_TEMPLATE, HIDDEN_ANNOTATION, Message, TemplateRequest, TemplateSelection,
};
use crate::Error;

/// A template the classifier may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarterTemplate {
    /// Identifier sent back in `<templateName>`.
    pub name: &'static str,
    /// What the template sets up.
    pub description: &'static str,
    /// Keywords that help classification.
    pub tags: &'static [&'static str],
}

/// The catalog offered to the classifier.
pub const STARTER_TEMPLATES: &[StarterTemplate] = &[
    StarterTemplate {
        name: "bolt-astro-basic",
        description: "Lightweight Astro starter for content-focused sites",
        tags: &["astro", "blog", "performance"],
    },
    StarterTemplate {
        name: "bolt-nextjs-shadcn",
        description: "Next.js starter with shadcn/ui components",
        tags: &["nextjs", "react", "typescript", "shadcn", "tailwind"],
    },
    StarterTemplate {
        name: "bolt-remix-ts",
        description: "Remix starter with TypeScript for full-stack web apps",
        tags: &["remix", "typescript", "fullstack", "react"],
    },
    StarterTemplate {
        name: "bolt-sveltekit",
        description: "SvelteKit starter for fast web applications",
        tags: &["svelte", "sveltekit", "typescript"],
    },
    StarterTemplate {
        name: "vanilla-vite",
        description: "Minimal Vite starter for vanilla JavaScript projects",
        tags: &["vite", "vanilla-js", "minimal"],
    },
    StarterTemplate {
        name: "bolt-vite-react",
        description: "React starter with Vite and TypeScript",
        tags: &["react", "vite", "frontend", "website", "app"],
    },
    StarterTemplate {
        name: "bolt-vite-ts",
        description: "Vite starter with TypeScript",
        tags: &["vite", "typescript", "minimal"],
    },
    StarterTemplate {
        name: "bolt-vue",
        description: "Vue.js starter with the composition API",
        tags: &["vue", "typescript", "frontend"],
    },
    StarterTemplate {
        name: "bolt-angular",
        description: "Angular starter for enterprise applications",
        tags: &["angular", "typescript", "frontend", "spa"],
    },
];

/// System prompt for the classification call.
pub fn selection_prompt() -> String {
    let mut prompt = String::from(
        "You pick the best starter template for a project description.\n\n\
         Available templates:\n\
         <template>\n  <name>blank</name>\n  \
         <description>Empty starter for simple scripts and trivial tasks</description>\n  \
         <tags>basic, script</tags>\n</template>\n",
    );
    for template in STARTER_TEMPLATES {
        prompt.push_str(&format!(
            "<template>\n  <name>{}</name>\n  <description>{}</description>\n  <tags>{}</tags>\n</template>\n",
            template.name,
            template.description,
            template.tags.join(", "),
        ));
    }
    prompt.push_str(
        "\nRespond with exactly:\n\
         <selection>\n  <templateName>{template name}</templateName>\n  \
         <title>{a short project title}</title>\n</selection>\n\n\
         Use blank for anything that is not a web project or is too small to need a template.",
    );
    prompt
}

fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let len = text[start..].find(close)?;
    Some(text[start..start + len].trim())
}

/// Parse the classifier's `<selection>` reply.
///
/// A missing or empty `<templateName>` yields a blank selection.
pub fn parse_selection_response(text: &str) -> TemplateSelection {
    let Some(selection) = between(text, "<selection>", "</selection>") else {
        return TemplateSelection::blank();
    };
    match between(selection, "<templateName>", "</templateName>") {
        Some(template) if !template.is_empty() => TemplateSelection {
            template: template.to_string(),
            title: between(selection, "<title>", "</title>")
                .unwrap_or_default()
                .to_string(),
        },
        _ => TemplateSelection::blank(),
    }
}

/// Resolves a first message into seeded messages or the blank path.
#[derive(Clone)]
pub struct TemplateResolver {
    backend: Arc<dyn TemplateBackend>,
    renderer: Arc<dyn Renderer>,
}

impl TemplateResolver {
    /// Create a resolver that reports fallbacks through `renderer`.
    pub fn new(backend: Arc<dyn TemplateBackend>, renderer: Arc<dyn Renderer>) -> Self {
        Self { backend, renderer }
    }

    /// Returns the seeded user/assistant/hidden-user triple, or `None` for the
    /// blank path.
    ///
    /// Never fails; errors become a warning notification.
    pub async fn resolve(&self, request: &TemplateRequest, images: &[String]) -> Option<Vec<Message>> {
        let seeded = match self.try_resolve(request, images).await {
            Ok(seeded) => seeded,
            Err(err) => {
                TEMPLATE_FALLBACKS.click();
                tracing::warn!(
                    component = "template",
                    action = "select",
                    model = %request.model,
                    provider = %request.provider,
                    error = %err,
                    "falling back to blank template"
                );
                self.renderer.print_warning(fallback_message(&err));
                return None;
            }
        };
        if seeded.is_some() {
            TEMPLATE_SEEDS.click();
        }
        seeded
    }

    async fn try_resolve(
        &self,
        request: &TemplateRequest,
        images: &[String],
    ) -> crate::Result<Option<Vec<Message>>> {
        let selection = self.backend.select_template(request).await?;
        if selection.is_blank() {
            tracing::debug!(component = "template", action = "select", template = BLANK_TEMPLATE);
            return Ok(None);
        }
        tracing::debug!(
            component = "template",
            action = "select",
            template = %selection.template,
            title = %selection.title
        );
        let seed = self
            .backend
            .fetch_template(&selection.template, &selection.title)
            .await?;

        let ms = now_millis();
        Ok(Some(vec![
            framed_user_message(
                format!("1-{ms}"),
                &request.model,
                &request.provider,
                &request.message,
                images,
            ),
            Message::assistant(format!("2-{ms}"), seed.assistant_message),
            Message::user(
                format!("3-{ms}"),
                frame_user_text(&request.model, &request.provider, &seed.user_message),
            )
            .with_annotation(HIDDEN_ANNOTATION),
        ]))
    }
}

fn fallback_message(err: &Error) -> &'static str {
    if err.is_rate_limit() {
        "Rate limit exceeded. Skipping starter template\n Continuing with blank template"
    } else {
        "Failed to import starter template\n Continuing with blank template"
    }
}
