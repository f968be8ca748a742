//! System instruction templates and story prompt assembly.

use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::{Display, EnumIter, EnumString};
use tracing::info;

use crate::error::{ServiceError, ServiceResult};

/// System instructions for the three text calls, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub guardrails: String,
    pub storyteller: String,
    pub image_summarizer: String,
}

impl PromptSet {
    pub const GUARDRAILS_FILE: &'static str = "guardrails.txt";
    pub const STORYTELLER_FILE: &'static str = "storyteller.txt";
    pub const IMAGE_SUMMARIZER_FILE: &'static str = "image_summarizer.txt";

    /// Read the templates from `dir`. A missing or empty file is a configuration error.
    pub fn load(dir: &Path) -> ServiceResult<Self> {
        let prompts = Self {
            guardrails: read_template(dir, Self::GUARDRAILS_FILE)?,
            storyteller: read_template(dir, Self::STORYTELLER_FILE)?,
            image_summarizer: read_template(dir, Self::IMAGE_SUMMARIZER_FILE)?,
        };
        info!(dir = %dir.display(), "Prompt templates loaded");
        Ok(prompts)
    }
}

fn read_template(dir: &Path, name: &str) -> ServiceResult<String> {
    let path = dir.join(name);
    let text = std::fs::read_to_string(&path).map_err(|e| ServiceError::Config {
        message: format!("Failed to read prompt template {}: {}", path.display(), e),
    })?;

    let text = text.trim();
    if text.is_empty() {
        return Err(ServiceError::Config {
            message: format!("Prompt template {} is empty", path.display()),
        });
    }
    Ok(text.to_string())
}

/// Story tone
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Random,
    Adventure,
    Funny,
    Calm,
    Mysterious,
}

impl Tone {
    /// Lenient parse for form input; unknown values fall back to the default.
    pub fn resolve(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }

    /// Fluent key of the tone's label
    pub fn label_key(self) -> &'static str {
        match self {
            Tone::Random => "tone-random",
            Tone::Adventure => "tone-adventure",
            Tone::Funny => "tone-funny",
            Tone::Calm => "tone-calm",
            Tone::Mysterious => "tone-mysterious",
        }
    }

    /// Tone line of the story prompt
    fn instruction(self) -> &'static str {
        match self {
            Tone::Random => {
                "escolha você mesmo um destes tons: aventura, engraçada, calma ou misteriosa"
            }
            Tone::Adventure => "aventura",
            Tone::Funny => "engraçada",
            Tone::Calm => "calma",
            Tone::Mysterious => "misteriosa",
        }
    }
}

/// Target story length
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum StoryDuration {
    Short,
    #[default]
    Medium,
    Long,
}

impl StoryDuration {
    /// Lenient parse for form input; unknown values fall back to the default.
    pub fn resolve(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }

    /// Approximate word count asked of the model
    pub fn word_target(self) -> u32 {
        match self {
            StoryDuration::Short => 320,
            StoryDuration::Medium => 460,
            StoryDuration::Long => 700,
        }
    }

    pub fn label_key(self) -> &'static str {
        match self {
            StoryDuration::Short => "duration-short",
            StoryDuration::Medium => "duration-medium",
            StoryDuration::Long => "duration-long",
        }
    }
}

const IDEA_NOT_SPECIFIED: &str = "(não especificada; crie uma história original e positiva)";

/// Build the user prompt for the story call.
pub fn build_user_prompt(idea: &str, tone: Tone, duration: StoryDuration) -> String {
    let idea = idea.trim();
    let idea = if idea.is_empty() { IDEA_NOT_SPECIFIED } else { idea };

    [
        format!("Ideia principal do usuário: {idea}"),
        format!("Tom: {}.", tone.instruction()),
        format!(
            "Duração alvo: cerca de {} palavras.",
            duration.word_target()
        ),
        "Formato: título na primeira linha, parágrafos curtos, moral destacada ao final em uma linha começando com \"Moral:\".".to_string(),
        "Escreva apenas texto simples, sem markdown, listas, links ou qualquer outra marcação.".to_string(),
    ]
    .join("\n")
}
