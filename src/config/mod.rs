// Configuration management: the TOML settings file, environment overrides
// and the interactive setup.

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    AwsCredentials, CollectionNames, Config, ConfigError, StoreConfig, UploadConfig,
    validate_collection_name,
};
