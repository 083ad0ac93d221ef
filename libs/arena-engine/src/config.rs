// Language configuration management for the sandbox dispatcher
use anyhow::{bail, Context, Result};
use arena_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageConfig {
    pub name: Language,
    pub version: String,
    /// Language id understood by the sandbox service
    pub sandbox_language_id: u32,
    pub cpu_time_limit_secs: f64,
    pub memory_limit_kb: u64,
    pub file_extension: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Language configuration manager
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: BTreeMap<Language, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::from_json(&content)
    }

    /// Load with default path (config/languages.json)
    pub fn load_default() -> Result<Self> {
        Self::load(Path::new("config/languages.json"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson =
            serde_json::from_str(content).context("Failed to parse languages.json")?;

        let mut configs = BTreeMap::new();
        for lang in languages_json.languages {
            if lang.cpu_time_limit_secs <= 0.0 || lang.memory_limit_kb == 0 {
                bail!("Language {} has non-positive resource limits", lang.name);
            }
            if configs.insert(lang.name, lang.clone()).is_some() {
                bail!("Language {} is configured twice", lang.name);
            }
        }

        Ok(Self { configs })
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: Language) -> Option<&LanguageConfig> {
        self.configs.get(&language)
    }

    /// List all configured languages, in a stable order
    pub fn list_languages(&self) -> Vec<Language> {
        self.configs.keys().copied().collect()
    }

    pub fn configs(&self) -> impl Iterator<Item = &LanguageConfig> {
        self.configs.values()
    }
}
