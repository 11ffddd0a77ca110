
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use itertools::Itertools;

use super::{Config, ConfigError, StoreConfig, UploadConfig};
use crate::metadata::Profile;
use crate::store::{StoreClient, WeaviateClient};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Catalog KB Configuration Setup").bold().cyan());
    eprintln!();

    let config_dir = Config::config_dir().context("Failed to locate configuration directory")?;
    let mut config = load_existing_config(&config_dir);

    eprintln!("{}", style("Vector Store").bold().yellow());
    eprintln!("Configure the Weaviate instance that holds the catalog.");
    eprintln!();
    configure_store(&mut config.store)?;

    eprintln!();
    eprintln!("{}", style("Vectorizer").bold().yellow());
    eprintln!("Embedding module and model the store uses for semantic search.");
    eprintln!();
    configure_vectorizer(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Uploads").bold().yellow());
    configure_upload(&mut config.upload)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_store_connection(&config) {
        eprintln!("{}", style("✓ Vector store is ready!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the vector store").yellow()
        );
        eprintln!("You can continue, but make sure Weaviate is running before uploading.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::resolve().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    for line in describe(&config) {
        eprintln!("{line}");
    }

    eprintln!();
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());

    Ok(())
}

/// Human-readable summary of the effective settings. Secrets are shown only
/// as set or not set.
fn describe(config: &Config) -> Vec<String> {
    let set_or_not = |present: bool| {
        if present {
            style("set").green().to_string()
        } else {
            style("not set").dim().to_string()
        }
    };

    let url = match config.store_url() {
        Ok(url) => style(url.to_string()).cyan().to_string(),
        Err(e) => format!("{} ({})", style("Invalid").red(), e),
    };

    let retry_on = if config.upload.retry_on.is_empty() {
        "nothing".to_string()
    } else {
        config.upload.retry_on.iter().join(", ")
    };

    vec![
        style("Vector Store:").bold().yellow().to_string(),
        format!("  URL: {url}"),
        format!("  API key: {}", set_or_not(config.store.api_key.is_some())),
        format!("  Timeout: {}s", style(config.store.timeout_secs).cyan()),
        String::new(),
        style("Vectorizer:").bold().yellow().to_string(),
        format!("  Module: {}", style(&config.vectorizer.module).cyan()),
        format!("  Model: {}", style(&config.vectorizer.model).cyan()),
        format!("  Region: {}", style(&config.vectorizer.region).cyan()),
        format!("  AWS credentials: {}", set_or_not(config.credentials.is_some())),
        String::new(),
        style("Uploads:").bold().yellow().to_string(),
        format!("  Attempts per record: {}", style(config.upload.max_attempts).cyan()),
        format!("  Retry backoff: {}s", style(config.upload.backoff_secs).cyan()),
        format!("  Retry on: {}", style(retry_on).cyan()),
        format!("  Pause between records: {}ms", style(config.upload.pause_ms).cyan()),
        format!("  Profile: {}", style(config.upload.profile.as_str()).cyan()),
        String::new(),
        style("Collections:").bold().yellow().to_string(),
        format!("  Datasets: {}", style(&config.collections.datasets).cyan()),
        format!("  Relationships: {}", style(&config.collections.relationships).cyan()),
        format!("  Domain tags: {}", style(&config.collections.domain_tags).cyan()),
    ]
}

fn load_existing_config(config_dir: &std::path::Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Config::with_base_dir(config_dir)
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_store(store: &mut StoreConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == store.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Weaviate protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Weaviate host")
        .default(store.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = StoreConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..StoreConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Weaviate port")
        .default(store.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let timeout_secs: u64 = Input::new()
        .with_prompt("Request timeout (seconds)")
        .default(store.timeout_secs)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=600).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 600 seconds")
            }
        })
        .interact_text()?;

    store.set_protocol(protocol)?;
    store.set_host(host)?;
    store.set_port(port)?;
    store.set_timeout_secs(timeout_secs)?;

    Ok(())
}

fn configure_vectorizer(config: &mut Config) -> Result<()> {
    let not_empty = |input: &String| -> Result<(), &'static str> {
        if input.trim().is_empty() {
            Err("Value cannot be empty")
        } else {
            Ok(())
        }
    };

    let module: String = Input::new()
        .with_prompt("Vectorizer module")
        .default(config.vectorizer.module.clone())
        .validate_with(not_empty)
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(config.vectorizer.model.clone())
        .validate_with(not_empty)
        .interact_text()?;

    let region: String = Input::new()
        .with_prompt("AWS region")
        .default(config.vectorizer.region.clone())
        .validate_with(not_empty)
        .interact_text()?;

    config.set_vectorizer(module, model, region)?;
    Ok(())
}

fn configure_upload(upload: &mut UploadConfig) -> Result<()> {
    let max_attempts: u32 = Input::new()
        .with_prompt("Attempts per record")
        .default(upload.max_attempts)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (1..=10).contains(input) {
                Ok(())
            } else {
                Err("Attempts must be between 1 and 10")
            }
        })
        .interact_text()?;

    let backoff_secs: u64 = Input::new()
        .with_prompt("Seconds to wait before retrying")
        .default(upload.backoff_secs)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if *input > 300 {
                Err("Backoff must be 300 seconds or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let pause_ms: u64 = Input::new()
        .with_prompt("Pause between records (ms)")
        .default(upload.pause_ms)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if *input > 60_000 {
                Err("Pause must be 60000 ms or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let profiles = &["full", "compact"];
    let profile_index = Select::new()
        .with_prompt("Dataset profile")
        .default(usize::from(upload.profile == Profile::Compact))
        .items(profiles)
        .interact()?;

    upload.set_max_attempts(max_attempts)?;
    upload.set_backoff_secs(backoff_secs)?;
    upload.set_pause_ms(pause_ms)?;
    upload.profile = if profile_index == 1 {
        Profile::Compact
    } else {
        Profile::Full
    };

    Ok(())
}

fn test_store_connection(config: &Config) -> bool {
    WeaviateClient::from_config(config)
        .map(|client| client.with_timeout(std::time::Duration::from_secs(5)))
        .is_ok_and(|client| client.ready().is_ok())
}
