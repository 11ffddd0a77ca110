use clap::{Args, Parser, Subcommand};
use catalog_kb::Result;
use catalog_kb::commands::{
    CatalogPaths, UploadOptions, check_schema, create_schema, inspect, search, upload,
    upload_all, validate_descriptors, verify,
};
use catalog_kb::config::{run_interactive_config, show_config};
use catalog_kb::metadata::RecordKind;
use catalog_kb::query::DEFAULT_SEARCH_LIMIT;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "catalog-kb")]
#[command(about = "Load dataset catalog metadata into a Weaviate vector store and search it")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the vector store connection and upload settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Create or check the catalog collections
    #[command(subcommand)]
    Schema(SchemaCommand),
    /// Upload catalog records from descriptor files
    #[command(subcommand)]
    Upload(UploadCommand),
    /// Validate dataset descriptors without uploading them
    Validate {
        /// Descriptor file or directory
        path: PathBuf,
    },
    /// Count and sample every catalog collection
    Verify,
    /// Semantic search over datasets
    Query {
        /// What you are looking for
        text: String,
        /// Maximum number of datasets to return
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        /// List every column instead of the relevant ones
        #[arg(long)]
        all_columns: bool,
    },
    /// Show the column information stored for datasets
    Inspect {
        /// Maximum number of datasets to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum SchemaCommand {
    /// Create missing collections
    Create {
        /// Drop and recreate collections that already exist
        #[arg(long)]
        recreate: bool,
        /// Do not ask before dropping collections
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Report which collections exist
    Check {
        /// Store and search for a test record to check the vectorizer
        #[arg(long)]
        probe: bool,
    },
}

#[derive(Subcommand)]
enum UploadCommand {
    /// Upload dataset descriptors from a file or directory
    Datasets {
        path: PathBuf,
        #[command(flatten)]
        options: DatasetOptions,
    },
    /// Upload relationships from a descriptor file
    Relationships { file: PathBuf },
    /// Upload domain tags from a descriptor file
    Tags { file: PathBuf },
    /// Upload datasets, then relationships and tags, in one run
    All {
        /// Dataset descriptor file or directory
        datasets: PathBuf,
        /// Relationship descriptor file
        #[arg(long)]
        relationships: Option<PathBuf>,
        /// Domain tag descriptor file
        #[arg(long)]
        tags: Option<PathBuf>,
        #[command(flatten)]
        options: DatasetOptions,
    },
}

#[derive(Args)]
struct DatasetOptions {
    /// Truncate embedded text and use compact question and hint documents
    #[arg(long)]
    compact: bool,
    /// Upload into an in-memory store instead of the configured one
    #[arg(long)]
    dry_run: bool,
}

impl From<DatasetOptions> for UploadOptions {
    fn from(options: DatasetOptions) -> Self {
        Self {
            compact: options.compact,
            dry_run: options.dry_run,
        }
    }
}

fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Schema(SchemaCommand::Create { recreate, yes }) => {
            create_schema(recreate, yes)?;
        }
        Commands::Schema(SchemaCommand::Check { probe }) => {
            check_schema(probe)?;
        }
        Commands::Upload(UploadCommand::Datasets { path, options }) => {
            upload(&path, RecordKind::Dataset, options.into())?;
        }
        Commands::Upload(UploadCommand::Relationships { file }) => {
            upload(&file, RecordKind::Relationship, UploadOptions::default())?;
        }
        Commands::Upload(UploadCommand::Tags { file }) => {
            upload(&file, RecordKind::DomainTag, UploadOptions::default())?;
        }
        Commands::Upload(UploadCommand::All {
            datasets,
            relationships,
            tags,
            options,
        }) => {
            upload_all(
                CatalogPaths {
                    datasets: &datasets,
                    relationships: relationships.as_deref(),
                    tags: tags.as_deref(),
                },
                options.into(),
            )?;
        }
        Commands::Validate { path } => {
            validate_descriptors(&path)?;
        }
        Commands::Verify => {
            verify()?;
        }
        Commands::Query {
            text,
            limit,
            all_columns,
        } => {
            search(&text, limit, all_columns)?;
        }
        Commands::Inspect { limit } => {
            inspect(limit)?;
        }
    }

    Ok(())
}
