use console::style;

use super::Config;

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.embedding.base_url).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    match config.api_key() {
        Ok(_) => eprintln!(
            "  API Key: {} (from {})",
            style("set").green(),
            config.embedding.api_key_env
        ),
        Err(_) => eprintln!(
            "  API Key: {} (export {})",
            style("missing").red(),
            config.embedding.api_key_env
        ),
    }

    eprintln!();
    eprintln!("{}", style("Generation Settings:").bold().yellow());
    eprintln!("  Model: {}", style(&config.generation.model).cyan());

    eprintln!();
    eprintln!("{}", style("Vector Database:").bold().yellow());
    eprintln!("  URI: {}", style(config.vector_database_uri()).cyan());
    eprintln!(
        "  Collection: {}",
        style(&config.database.collection).cyan()
    );
    eprintln!("  Search Limit: {}", style(config.search.limit).cyan());
    eprintln!("  On Error: {:?}", config.ingest.on_error);

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}
