//! 供应商注册表 — 启动时加载的只读供应商与模型描述
//!
//! Provider descriptor registry. Holds the known providers, their ordered model
//! lists and per-model rates. Built once (from the built-in table or a YAML file)
//! and then shared read-only across every in-flight stream behind an `Arc`.
//!
//! ```yaml
//! providers:
//!   - id: openai
//!     api_style: openai
//!     base_url: https://api.openai.com/v1
//!     api_key_env: OPENAI_API_KEY
//!     models:
//!       - id: gpt-4o-mini
//!         input_cost_per_1k: 0.00015
//!         output_cost_per_1k: 0.0006
//!         context_window: 128000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::tokens::ModelPricing;
use crate::{Error, ErrorContext, Result};

/// Wire dialect a provider speaks. Selects the driver (normalizer + parser pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    /// OpenAI chat completions and compatible services (DeepSeek, Moonshot, ...).
    #[serde(alias = "openai_compatible")]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
    /// Google Gemini `streamGenerateContent` (SSE mode).
    Gemini,
    /// Ollama `/api/chat` (NDJSON).
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default)]
    pub input_cost_per_1k: f64,
    #[serde(default)]
    pub output_cost_per_1k: f64,
    /// Prompt + output token budget; history is truncated to fit when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
}

impl ModelDescriptor {
    pub fn new(id: &str, input_cost_per_1k: f64, output_cost_per_1k: f64) -> Self {
        Self {
            id: id.to_string(),
            input_cost_per_1k,
            output_cost_per_1k,
            context_window: None,
        }
    }

    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = Some(tokens);
        self
    }

    pub fn pricing(&self) -> ModelPricing {
        ModelPricing::new(&self.id, self.input_cost_per_1k, self.output_cost_per_1k)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub api_style: ApiStyle,
    pub base_url: String,
    /// Environment variable holding the API key; `None` for keyless local servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub models: Vec<ModelDescriptor>,
}

impl ProviderDescriptor {
    pub fn model(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == model_id)
    }

    pub fn supports(&self, model_id: &str) -> bool {
        self.model(model_id).is_some()
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.id.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    providers: Vec<ProviderDescriptor>,
}

/// Immutable table of provider descriptors.
#[derive(Debug, Clone)]
pub struct Registry {
    providers: Vec<ProviderDescriptor>,
}

impl Registry {
    /// Build a registry from explicit descriptors (rejects duplicates and bad URLs).
    pub fn new(providers: Vec<ProviderDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for p in &providers {
            if !seen.insert(p.id.as_str()) {
                return Err(load_error(
                    format!("duplicate provider id: {}", p.id),
                    format!("providers.{}", p.id),
                ));
            }
            url::Url::parse(&p.base_url).map_err(|e| {
                load_error(
                    format!("invalid base_url for {}: {}", p.id, e),
                    format!("providers.{}.base_url", p.id),
                )
            })?;
            let mut model_ids = HashSet::new();
            for m in &p.models {
                if !model_ids.insert(m.id.as_str()) {
                    return Err(load_error(
                        format!("duplicate model id {} for {}", m.id, p.id),
                        format!("providers.{}.models", p.id),
                    ));
                }
            }
        }
        Ok(Self { providers })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        Self::new(file.providers)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Providers and list prices shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            providers: vec![
                ProviderDescriptor {
                    id: "openai".into(),
                    api_style: ApiStyle::OpenAi,
                    base_url: "https://api.openai.com/v1".into(),
                    api_key_env: Some("OPENAI_API_KEY".into()),
                    models: vec![
                        ModelDescriptor::new("gpt-4o", 0.005, 0.015).with_context_window(128_000),
                        ModelDescriptor::new("gpt-4o-mini", 0.00015, 0.0006)
                            .with_context_window(128_000),
                        ModelDescriptor::new("gpt-3.5-turbo", 0.0015, 0.002)
                            .with_context_window(16_385),
                    ],
                },
                ProviderDescriptor {
                    id: "anthropic".into(),
                    api_style: ApiStyle::Anthropic,
                    base_url: "https://api.anthropic.com".into(),
                    api_key_env: Some("ANTHROPIC_API_KEY".into()),
                    models: vec![
                        ModelDescriptor::new("claude-3-5-sonnet-latest", 0.003, 0.015)
                            .with_context_window(200_000),
                        ModelDescriptor::new("claude-3-haiku-20240307", 0.00025, 0.00125)
                            .with_context_window(200_000),
                    ],
                },
                ProviderDescriptor {
                    id: "gemini".into(),
                    api_style: ApiStyle::Gemini,
                    base_url: "https://generativelanguage.googleapis.com".into(),
                    api_key_env: Some("GEMINI_API_KEY".into()),
                    models: vec![
                        ModelDescriptor::new("gemini-1.5-flash", 0.000075, 0.0003)
                            .with_context_window(1_000_000),
                        ModelDescriptor::new("gemini-1.5-pro", 0.00125, 0.005)
                            .with_context_window(2_000_000),
                    ],
                },
                ProviderDescriptor {
                    id: "ollama".into(),
                    api_style: ApiStyle::Ollama,
                    base_url: "http://localhost:11434".into(),
                    api_key_env: None,
                    models: vec![
                        ModelDescriptor::new("llama3.1", 0.0, 0.0).with_context_window(8_192),
                        ModelDescriptor::new("mistral", 0.0, 0.0).with_context_window(8_192),
                    ],
                },
            ],
        }
    }

    pub fn lookup(&self, provider_id: &str) -> Result<&ProviderDescriptor> {
        self.providers
            .iter()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| {
                Error::configuration_with_context(
                    format!("unknown provider: {}", provider_id),
                    ErrorContext::new()
                        .with_field_path("settings.provider")
                        .with_details(format!("known providers: {}", self.ids().join(", ")))
                        .with_source("registry"),
                )
            })
    }

    pub fn validate_model(&self, provider_id: &str, model_id: &str) -> bool {
        self.lookup(provider_id)
            .map(|p| p.supports(model_id))
            .unwrap_or(false)
    }

    /// Rates for a provider/model pair; `None` when either is unknown.
    pub fn rates(&self, provider_id: &str, model_id: &str) -> Option<ModelPricing> {
        self.lookup(provider_id)
            .ok()?
            .model(model_id)
            .map(ModelDescriptor::pricing)
    }

    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id.as_str()).collect()
    }
}

fn load_error(msg: String, field: String) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("registry_loader"),
    )
}
