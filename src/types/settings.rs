//! Per-call provider selection and sampling parameters.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};

pub const MAX_TEMPERATURE: f64 = 2.0;
pub const MAX_OUTPUT_TOKENS: u32 = 400_000;

/// Settings for one `stream()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// When false the gateway still streams upstream but delivers the content as one delta.
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_temperature() -> f64 {
    1.0
}

fn default_stream() -> bool {
    true
}

impl Settings {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stream: true,
        }
    }

    /// Set temperature.
    pub fn temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    /// Set max output tokens.
    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn frequency_penalty(mut self, p: f64) -> Self {
        self.frequency_penalty = Some(p);
        self
    }

    pub fn presence_penalty(mut self, p: f64) -> Self {
        self.presence_penalty = Some(p);
        self
    }

    /// Deliver content as a single delta instead of incrementally.
    pub fn buffered(mut self) -> Self {
        self.stream = false;
        self
    }

    /// Range checks that need no registry. Model membership is checked by the dispatcher.
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(invalid("settings.provider", "provider must be non-empty"));
        }
        if self.model.trim().is_empty() {
            return Err(invalid("settings.model", "model must be non-empty"));
        }
        check_range("settings.temperature", self.temperature, 0.0, MAX_TEMPERATURE)?;
        if let Some(mt) = self.max_tokens {
            if mt == 0 || mt > MAX_OUTPUT_TOKENS {
                return Err(Error::configuration_with_context(
                    format!("max_tokens must be within 1..={}", MAX_OUTPUT_TOKENS),
                    ErrorContext::new()
                        .with_field_path("settings.max_tokens")
                        .with_details(format!("got {}", mt))
                        .with_source("settings_validator"),
                ));
            }
        }
        if let Some(p) = self.top_p {
            check_range("settings.top_p", p, 0.0, 1.0)?;
        }
        if let Some(p) = self.frequency_penalty {
            check_range("settings.frequency_penalty", p, -2.0, 2.0)?;
        }
        if let Some(p) = self.presence_penalty {
            check_range("settings.presence_penalty", p, -2.0, 2.0)?;
        }
        Ok(())
    }
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    // NaN fails both comparisons, so it is rejected here too
    if value >= min && value <= max {
        return Ok(());
    }
    Err(Error::configuration_with_context(
        format!("{} must be within {}..={}", field, min, max),
        ErrorContext::new()
            .with_field_path(field)
            .with_details(format!("got {}", value))
            .with_source("settings_validator"),
    ))
}

fn invalid(field: &str, msg: &str) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("settings_validator"),
    )
}
