//! Configuration management for notescan.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{ModelConfig, ProviderKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub notes: NotesConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

/// Which model serves which job, by model id (or name).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Vision,
    Edit,
}

impl ModelRole {
    pub fn label(&self) -> &'static str {
        match self {
            ModelRole::Vision => "vision",
            ModelRole::Edit => "edit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Output token cap; generous so long Markdown is not truncated.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_probe_max_tokens")]
    pub probe_max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_generation_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_probe_max_tokens() -> u32 {
    10
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            generation_timeout_secs: default_generation_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            probe_max_tokens: default_probe_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_vision_prompt")]
    pub vision: String,
    #[serde(default = "default_edit_prompt")]
    pub edit: String,
}

fn default_vision_prompt() -> String {
    "You transcribe photos of handwritten problems and notes. Reply with Markdown only. \
     Use LaTeX between $...$ for inline math and $$...$$ for display math. \
     Keep the original structure and numbering, and do not solve the problems."
        .to_string()
}

fn default_edit_prompt() -> String {
    "You are an editor for Markdown study notes. Apply the user's instruction to the \
     original text and reply with the complete revised Markdown only, no commentary."
        .to_string()
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            vision: default_vision_prompt(),
            edit: default_edit_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesConfig {
    /// Defaults to `~/.notescan/notes` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default = "default_workspace")]
    pub default_workspace: String,
}

fn default_workspace() -> String {
    "default".to_string()
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            root: None,
            default_workspace: default_workspace(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let gemini = ModelConfig::new("Gemini Flash", ProviderKind::Gemini, "gemini-2.0-flash")
            .with_api_key_env("GEMINI_API_KEY");
        let openai = ModelConfig::new("GPT-4o mini", ProviderKind::OpenaiCompatible, "gpt-4o-mini")
            .with_api_key_env("OPENAI_API_KEY");

        Self {
            roles: RolesConfig {
                vision: Some(gemini.id().to_string()),
                edit: Some(gemini.id().to_string()),
            },
            request: RequestConfig::default(),
            prompts: PromptsConfig::default(),
            notes: NotesConfig::default(),
            models: vec![gemini, openai],
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".notescan"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load from the default path, falling back to defaults, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("NOTESCAN_VISION_MODEL") {
            self.roles.vision = Some(model);
        }
        if let Ok(model) = std::env::var("NOTESCAN_EDIT_MODEL") {
            self.roles.edit = Some(model);
        }
        if let Ok(dir) = std::env::var("NOTESCAN_NOTES_DIR") {
            self.notes.root = Some(PathBuf::from(dir));
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn save_default() -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        Self::default().save_to(&config_path)?;
        Ok(config_path)
    }

    /// Find a model by id, falling back to a case-insensitive name match.
    pub fn find_model(&self, key: &str) -> Option<&ModelConfig> {
        self.models
            .iter()
            .find(|m| m.id() == key)
            .or_else(|| self.models.iter().find(|m| m.name.eq_ignore_ascii_case(key)))
    }

    /// The model assigned to `role`, with its credential resolved.
    ///
    /// An empty `api_key` is filled from `api_key_env` when that variable is
    /// set; otherwise it stays empty and the call itself fails fast.
    pub fn model_for(&self, role: ModelRole) -> Result<ModelConfig> {
        let key = match role {
            ModelRole::Vision => self.roles.vision.as_deref(),
            ModelRole::Edit => self.roles.edit.as_deref(),
        };
        let model = match key {
            Some(key) => self
                .find_model(key)
                .with_context(|| format!("No model '{}' configured for the {} role", key, role.label()))?,
            None => self
                .models
                .first()
                .with_context(|| format!("No models configured (needed for the {} role)", role.label()))?,
        };
        Ok(resolve_credential(model.clone()))
    }

    /// Record a probe result. Returns false if the id is unknown.
    pub fn set_latency(&mut self, id: &str, latency_ms: i64) -> bool {
        match self.models.iter_mut().find(|m| m.id() == id) {
            Some(model) => {
                model.latency_ms = latency_ms;
                true
            }
            None => false,
        }
    }

    /// Store latencies in the config file at `path`. Only the file contents
    /// are rewritten; environment overrides are not applied.
    pub fn record_latencies(path: &Path, latencies: &[(String, i64)]) -> Result<()> {
        let mut on_disk = Self::load_from(path)?;
        for (id, latency_ms) in latencies {
            on_disk.set_latency(id, *latency_ms);
        }
        on_disk.save_to(path)
    }

    pub fn notes_root(&self) -> Result<PathBuf> {
        match &self.notes.root {
            Some(root) => Ok(root.clone()),
            None => Ok(Self::config_dir()?.join("notes")),
        }
    }
}

/// Fill an empty credential from the model's environment variable.
pub fn resolve_credential(mut model: ModelConfig) -> ModelConfig {
    if !model.has_credential() {
        if let Some(var) = &model.api_key_env {
            if let Ok(key) = std::env::var(var) {
                model.api_key = key;
            }
        }
    }
    model
}
