// Configuration management module
// Handles TOML configuration, environment overrides and credential lookup

mod show;
pub mod settings;

pub use settings::{
    Config, ConfigError, DatabaseConfig, EmbeddingConfig, FailurePolicy, GenerationConfig,
    IngestConfig, SearchConfig, validate_collection_name,
};
pub use show::show_config;
