use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::compile::toolchain::{DEFAULT_COMPILER, DEFAULT_REPAIR_TOOL};
use crate::compile::DEFAULT_TIMEOUT;
use crate::llm_client::{BackendKind, Endpoints};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Application configuration loaded from environment variables.
/// Every variable is optional; see `.env.example` for the defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub provider: BackendKind,
    /// Empty means unconfigured. Never logged.
    pub api_key: String,
    pub model: String,
    pub endpoints: Endpoints,
    pub system_prompt: Option<String>,
    pub system_prompt_fix: Option<String>,
    pub template_dir: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub compiler: String,
    pub repair_tool: Option<String>,
    pub compile_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Endpoints::default();

        Ok(Config {
            port: var("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: var("RUST_LOG", "info"),
            provider: BackendKind::from_setting(&var("LLM_PROVIDER", "openai")),
            api_key: var("LLM_API_KEY", ""),
            model: var("LLM_MODEL", DEFAULT_MODEL),
            endpoints: Endpoints {
                openai: var("OPENAI_API_BASE", &defaults.openai),
                gemini: var("GEMINI_API_BASE", &defaults.gemini),
                ollama: var("OLLAMA_API_BASE", &defaults.ollama),
            },
            system_prompt: optional("SYSTEM_PROMPT"),
            system_prompt_fix: optional("SYSTEM_PROMPT_FIX"),
            template_dir: PathBuf::from(var("TEMPLATE_DIR", "templates")),
            work_dir: PathBuf::from(var("WORK_DIR", "work_output")),
            output_dir: optional("OUTPUT_DIR").map(PathBuf::from),
            compiler: var("LATEX_COMPILER", DEFAULT_COMPILER),
            // Set but empty disables the repair step.
            repair_tool: Some(var("LATEX_REPAIR_TOOL", DEFAULT_REPAIR_TOOL))
                .filter(|v| !v.trim().is_empty()),
            compile_timeout: Duration::from_secs(
                var("COMPILE_TIMEOUT_SECS", &DEFAULT_TIMEOUT.as_secs().to_string())
                    .parse::<u64>()
                    .context("COMPILE_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.provider, BackendKind::OpenAi);
        assert!(config.api_key.is_empty());
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.work_dir, PathBuf::from("work_output"));
        assert!(config.output_dir.is_none());
        assert_eq!(config.compiler, "pdflatex");
        assert_eq!(config.repair_tool.as_deref(), Some("initexmf"));
        assert_eq!(config.compile_timeout, Duration::from_secs(30));
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("LLM_PROVIDER", "gemini"),
            ("LLM_API_KEY", "secret"),
            ("OUTPUT_DIR", "/tmp/out"),
            ("LATEX_REPAIR_TOOL", ""),
            ("COMPILE_TIMEOUT_SECS", "5"),
            ("SYSTEM_PROMPT_FIX", "Fix it."),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.provider, BackendKind::Gemini);
        assert_eq!(config.output_dir, Some(PathBuf::from("/tmp/out")));
        assert!(config.repair_tool.is_none());
        assert_eq!(config.compile_timeout, Duration::from_secs(5));
        assert_eq!(config.system_prompt_fix.as_deref(), Some("Fix it."));
    }

    #[test]
    fn test_unknown_provider_falls_back_to_openai() {
        let config = config_from(&[("LLM_PROVIDER", "mystery")]).unwrap();
        assert_eq!(config.provider, BackendKind::OpenAi);
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("COMPILE_TIMEOUT_SECS", "-1")]).is_err());
    }
}
