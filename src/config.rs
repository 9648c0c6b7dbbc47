//! Configuration management
//!
//! Manages engine configuration: generator endpoint, model roles, grading
//! threshold, quiz shape, and storage location. Loaded from a TOML file with
//! serde defaults so a missing or partial file always yields a working
//! configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Generation API settings
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Model assignments for the generation roles
    #[serde(default)]
    pub models: ModelsConfig,
    /// Grading policy
    #[serde(default)]
    pub grading: GradingConfig,
    /// Quiz shape per unit kind
    #[serde(default)]
    pub quiz: QuizConfig,
    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Settings for the OpenAI-compatible generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Base URL of the chat-completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-request timeout in seconds; a timed-out call counts as a
    /// generation failure and falls back to placeholder content
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Model assignments for the generation roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model for lesson/study-guide text
    #[serde(default = "default_study_model")]
    pub study: String,
    /// Model for quiz generation
    #[serde(default = "default_quiz_model")]
    pub quiz: String,
    /// Model for planning tasks (topic choice, outlines, splits, links)
    #[serde(default = "default_planner_model")]
    pub planner: String,
}

fn default_study_model() -> String {
    "gpt-4o".to_string()
}

fn default_quiz_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_planner_model() -> String {
    "gpt-5-nano".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            study: default_study_model(),
            quiz: default_quiz_model(),
            planner: default_planner_model(),
        }
    }
}

impl ModelsConfig {
    /// Get model for a role name
    pub fn get(&self, role: &str) -> Option<&str> {
        match role.to_lowercase().as_str() {
            "study" => Some(&self.study),
            "quiz" => Some(&self.quiz),
            "planner" => Some(&self.planner),
            _ => None,
        }
    }

    /// Set model for a role name
    pub fn set(&mut self, role: &str, model: String) -> bool {
        match role.to_lowercase().as_str() {
            "study" => {
                self.study = model;
                true
            }
            "quiz" => {
                self.quiz = model;
                true
            }
            "planner" => {
                self.planner = model;
                true
            }
            _ => false,
        }
    }

    /// List all available roles
    pub fn roles() -> &'static [&'static str] {
        &["study", "quiz", "planner"]
    }
}

/// Grading policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Minimum score percentage that counts as a pass
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: u32,
}

fn default_pass_threshold() -> u32 {
    60
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
        }
    }
}

/// Quiz shape per unit kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    /// Question count for a top-level unit
    #[serde(default = "default_unit_questions")]
    pub unit_questions: usize,
    /// Question count for a remediation child unit
    #[serde(default = "default_remediation_questions")]
    pub remediation_questions: usize,
}

fn default_unit_questions() -> usize {
    10
}

fn default_remediation_questions() -> usize {
    5
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            unit_questions: default_unit_questions(),
            remediation_questions: default_remediation_questions(),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    data_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("curriculum.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            models: ModelsConfig::default(),
            grading: GradingConfig::default(),
            quiz: QuizConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "smart-curriculum", "smart-curriculum")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "smart-curriculum", "smart-curriculum")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}
