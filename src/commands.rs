use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::metadata::{self, Normalizer, Profile, RawMetadata, RecordKind};
use crate::query::{self, COLUMN_QUERIES, DetailedColumns};
use crate::schema::{self, CollectionDef, Existing};
use crate::sources;
use crate::store::{MemoryStore, StoreClient, WeaviateClient};
use crate::upload::{FailureDetail, Reporter, UploadEvent, UploadReport, Uploader};

/// Wait between writing the probe record and searching for it, so the
/// vectorizer has time to embed it.
const PROBE_SETTLE: Duration = Duration::from_secs(2);
const MAX_LISTED_COLUMNS: usize = 10;
const MAX_DETAILED_COLUMNS: usize = 3;

/// Renders upload progress on stderr: a progress bar when attended, plain
/// log lines otherwise.
#[derive(Debug)]
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl Default for ConsoleReporter {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReporter {
    #[inline]
    pub fn new() -> Self {
        let bar = if console::user_attended_stderr() {
            ProgressBar::new(0).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }
}

impl Reporter for ConsoleReporter {
    #[inline]
    fn event(&mut self, event: &UploadEvent<'_>) {
        match *event {
            UploadEvent::Started {
                kind,
                collection,
                total,
            } => {
                // Clears the finished state left by an earlier batch.
                self.bar.reset();
                self.bar.set_length(total as u64);
                self.bar
                    .set_message(format!("Uploading {kind} records to {collection}"));
            }
            UploadEvent::Invalid { key, errors, .. } => {
                self.bar.inc(1);
                self.bar.println(format!(
                    "{} {}: {}",
                    style("✗").red(),
                    key,
                    errors.join("; ")
                ));
            }
            UploadEvent::Retrying {
                key,
                attempt,
                max_attempts,
                error,
                backoff,
            } => {
                self.bar.println(format!(
                    "{} {}: attempt {}/{} failed ({}), retrying in {}s",
                    style("↻").yellow(),
                    key,
                    attempt,
                    max_attempts,
                    error,
                    backoff.as_secs()
                ));
            }
            UploadEvent::Stored { key, attempts, .. } => {
                self.bar.inc(1);
                self.bar.set_message(key.to_string());
                if attempts > 1 {
                    self.bar.println(format!(
                        "{} {} (after {} attempts)",
                        style("✓").green(),
                        key,
                        attempts
                    ));
                }
            }
            UploadEvent::Failed { key, error, .. } => {
                self.bar.inc(1);
                self.bar
                    .println(format!("{} {}: {}", style("✗").red(), key, error));
            }
            UploadEvent::Finished { .. } => self.bar.finish_and_clear(),
        }
    }
}

fn connect(config: &Config) -> Result<WeaviateClient> {
    let client = WeaviateClient::from_config(config).context("Failed to create store client")?;
    client.ready().with_context(|| {
        format!(
            "Cannot reach the vector store at {}",
            client.base_url().as_str()
        )
    })?;
    info!("Connected to vector store at {}", client.base_url());
    Ok(client)
}

fn catalog_definitions(config: &Config) -> Vec<CollectionDef> {
    [RecordKind::Dataset, RecordKind::Relationship, RecordKind::DomainTag]
        .into_iter()
        .map(|kind| {
            schema::collection_for(kind, config.collections.for_kind(kind), &config.vectorizer)
        })
        .collect()
}

/// Create the catalog collections, optionally dropping existing ones first.
#[inline]
pub fn create_schema(recreate: bool, assume_yes: bool) -> Result<()> {
    let config = Config::resolve()?;
    let client = connect(&config)?;
    let definitions = catalog_definitions(&config);

    let report = schema::ensure_collections(&client, &definitions, |definition| {
        if !recreate {
            return Existing::Keep;
        }
        if assume_yes {
            return Existing::Recreate;
        }
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Collection {} exists. Delete it and all of its objects?",
                definition.name
            ))
            .default(false)
            .interact()
            .unwrap_or(false);
        if confirmed {
            Existing::Recreate
        } else {
            Existing::Keep
        }
    })
    .context("Failed to create collections")?;

    for name in &report.created {
        println!("{} Created {}", style("✓").green(), name);
    }
    for name in &report.recreated {
        println!("{} Recreated {}", style("✓").green(), name);
    }
    for name in &report.kept {
        println!("{} {} already exists, kept", style("•").dim(), name);
    }

    println!();
    println!(
        "Vectorizer: {} ({}, {})",
        config.vectorizer.module, config.vectorizer.model, config.vectorizer.region
    );
    for definition in &definitions {
        println!(
            "  {}: {} properties, vectorized: {}",
            definition.name,
            definition.properties.len(),
            if definition.vectorizer.is_some() {
                definition.vectorized_properties().join(", ")
            } else {
                "none".to_string()
            }
        );
    }

    Ok(())
}

/// Report which catalog collections exist and, with `probe`, whether the
/// vectorizer makes stored text searchable.
#[inline]
pub fn check_schema(probe: bool) -> Result<()> {
    let config = Config::resolve()?;
    let client = connect(&config)?;

    let expected = config.collections.all();
    let missing = schema::missing_collections(&client, &expected)
        .context("Failed to list collections")?;

    for name in expected {
        if missing.iter().any(|m| m == name) {
            println!("{} {} is missing", style("✗").red(), name);
        } else {
            match client.count_all(name) {
                Ok(count) => println!("{} {} ({} objects)", style("✓").green(), name, count),
                Err(e) => println!("{} {} (count failed: {})", style("⚠").yellow(), name, e),
            }
        }
    }

    if !missing.is_empty() {
        println!();
        println!("Run `catalog-kb schema create` to create the missing collections.");
    }

    if probe {
        if missing.contains(&config.collections.datasets) {
            anyhow::bail!(
                "Cannot probe: collection '{}' does not exist",
                config.collections.datasets
            );
        }

        println!();
        println!("{}", style("Probing semantic search...").bold());
        let report = schema::probe(&client, &config.collections.datasets, PROBE_SETTLE)
            .context("Probe failed")?;
        for (query, found) in &report.queries {
            if *found {
                println!("{} '{}' found the probe record", style("✓").green(), query);
            } else {
                println!("{} '{}' did not find the probe record", style("✗").red(), query);
            }
        }
        if !report.all_found() {
            warn!("Semantic search probe incomplete");
            println!("Check the vectorizer module and the AWS credentials passed to the store.");
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Use the size-bounded dataset profile regardless of configuration.
    pub compact: bool,
    /// Run against an in-memory store instead of the configured one.
    pub dry_run: bool,
}

/// Upload every record of `kind` found at `path`.
#[inline]
pub fn upload(path: &Path, kind: RecordKind, options: UploadOptions) -> Result<UploadReport> {
    let mut config = Config::resolve()?;
    if options.compact {
        config.upload.profile = Profile::Compact;
    }

    let records = sources::load(path, kind)
        .with_context(|| format!("Failed to load descriptors from {}", path.display()))?;
    if records.is_empty() {
        println!("No {} records found in {}", kind, path.display());
    }

    let report = if options.dry_run {
        println!("{}", style("Dry run: nothing is written to the vector store").yellow());
        let store = MemoryStore::with_collections(&catalog_definitions(&config));
        run_upload(store, &config, &records, kind)?
    } else {
        let client = WeaviateClient::from_config(&config).context("Failed to create store client")?;
        run_upload(client, &config, &records, kind)?
    };

    print_upload_report(&report);

    if report.succeeded.is_empty() && !report.failed.is_empty() {
        anyhow::bail!("No {} records were uploaded", kind);
    }

    Ok(report)
}

fn run_upload<S: StoreClient>(
    store: S,
    config: &Config,
    records: &[RawMetadata],
    kind: RecordKind,
) -> Result<UploadReport> {
    let mut uploader = Uploader::from_config(store, config);
    let mut reporter = ConsoleReporter::new();
    let report = uploader.upsert(records, kind, &mut reporter).map_err(|e| {
        error!("Upload aborted: {}", e);
        anyhow::Error::from(e)
    })?;
    Ok(report)
}

fn print_upload_report(report: &UploadReport) {
    println!();
    println!(
        "{} {} record(s) to {}: {} stored, {} failed",
        style("Uploaded").bold(),
        report.kind,
        report.collection,
        style(report.succeeded_count()).green(),
        style(report.failed_count()).red()
    );
    if report.payload_bytes() > 0 {
        println!("  Payload: {} bytes", report.payload_bytes());
    }

    for failure in &report.failed {
        let stage = match failure.detail {
            FailureDetail::Validation { .. } => "invalid",
            FailureDetail::Submission { .. } => "not stored",
        };
        println!(
            "  {} {} ({}): {}",
            style("✗").red(),
            failure.key,
            stage,
            failure.detail.summary()
        );
    }

    if !report.unresolved_tables.is_empty() {
        println!(
            "  {} Relationships reference tables without a dataset in this run: {}",
            style("⚠").yellow(),
            report.unresolved_tables.join(", ")
        );
    }
}

/// Descriptor locations for a combined upload.
#[derive(Debug, Clone, Copy)]
pub struct CatalogPaths<'a> {
    pub datasets: &'a Path,
    pub relationships: Option<&'a Path>,
    pub tags: Option<&'a Path>,
}

/// Load every batch named in `paths`, datasets first.
#[inline]
pub fn load_catalog(paths: CatalogPaths<'_>) -> Result<Vec<(RecordKind, Vec<RawMetadata>)>> {
    let named = [
        (RecordKind::Dataset, Some(paths.datasets)),
        (RecordKind::Relationship, paths.relationships),
        (RecordKind::DomainTag, paths.tags),
    ];

    let mut batches = Vec::new();
    for (kind, path) in named {
        let Some(path) = path else { continue };
        let records = sources::load(path, kind)
            .with_context(|| format!("Failed to load descriptors from {}", path.display()))?;
        if records.is_empty() {
            println!("No {} records found in {}", kind, path.display());
        }
        batches.push((kind, records));
    }
    Ok(batches)
}

/// Upload `batches` through one uploader, so relationships are checked
/// against the datasets stored earlier in the same run.
#[inline]
pub fn upload_catalog<S: StoreClient>(
    store: S,
    config: &Config,
    batches: &[(RecordKind, Vec<RawMetadata>)],
    reporter: &mut dyn Reporter,
) -> Result<Vec<UploadReport>> {
    let batches: Vec<(RecordKind, &[RawMetadata])> = batches
        .iter()
        .map(|(kind, records)| (*kind, records.as_slice()))
        .collect();
    let mut uploader = Uploader::from_config(store, config);
    uploader.upsert_all(&batches, reporter).map_err(|e| {
        error!("Upload aborted: {}", e);
        anyhow::Error::from(e)
    })
}

/// Upload datasets, and optionally relationships and domain tags, in one run.
#[inline]
pub fn upload_all(paths: CatalogPaths<'_>, options: UploadOptions) -> Result<Vec<UploadReport>> {
    let mut config = Config::resolve()?;
    if options.compact {
        config.upload.profile = Profile::Compact;
    }

    let batches = load_catalog(paths)?;
    let mut reporter = ConsoleReporter::new();
    let reports = if options.dry_run {
        println!("{}", style("Dry run: nothing is written to the vector store").yellow());
        let store = MemoryStore::with_collections(&catalog_definitions(&config));
        upload_catalog(store, &config, &batches, &mut reporter)?
    } else {
        let client = WeaviateClient::from_config(&config).context("Failed to create store client")?;
        upload_catalog(client, &config, &batches, &mut reporter)?
    };

    for report in &reports {
        print_upload_report(report);
    }

    let stored: usize = reports.iter().map(UploadReport::succeeded_count).sum();
    let failed: usize = reports.iter().map(UploadReport::failed_count).sum();
    if stored == 0 && failed > 0 {
        anyhow::bail!("No catalog records were uploaded");
    }

    Ok(reports)
}

/// Validate dataset descriptors without contacting the store.
#[inline]
pub fn validate_descriptors(path: &Path) -> Result<()> {
    let normalizer = Normalizer::default();
    let mut valid = 0_usize;
    let mut invalid = 0_usize;

    for file in sources::descriptor_files(path)? {
        let records = match sources::load_file(&file, RecordKind::Dataset) {
            Ok(records) => records,
            Err(e) => {
                println!("{} {}", style("✗").red(), e);
                invalid += 1;
                continue;
            }
        };

        println!("{}", style(file.display()).bold());
        for raw in &records {
            let validation = metadata::validate(raw, RecordKind::Dataset);
            if validation.is_ok() {
                let key = normalizer.dataset(raw).natural_key();
                println!(
                    "  {} {} -> {}",
                    style("✓").green(),
                    key,
                    style(key.identifier()).dim()
                );
                valid += 1;
            } else {
                println!(
                    "  {} {}",
                    style("✗").red(),
                    raw.display_key(RecordKind::Dataset)
                );
                for message in &validation.errors {
                    println!("      {message}");
                }
                invalid += 1;
            }
        }
    }

    println!();
    println!("{valid} valid, {invalid} invalid");

    if invalid > 0 {
        anyhow::bail!("{} descriptor(s) failed validation", invalid);
    }
    Ok(())
}

/// Count and sample each catalog collection.
#[inline]
pub fn verify() -> Result<()> {
    let config = Config::resolve()?;
    let client = connect(&config)?;

    println!("{}", style("🔍 Verifying collections").bold());
    let statuses = query::verify(&client, &config.collections);
    for status in &statuses {
        match &status.outcome {
            Ok(sample) => {
                println!(
                    "  {} {}: {} objects",
                    style("✓").green(),
                    status.collection,
                    sample.count
                );
                if let Some(label) = &sample.sample {
                    println!("      Sample: {label}");
                }
            }
            Err(e) => println!("  {} {}: {}", style("✗").red(), status.collection, e),
        }
    }

    if statuses.iter().any(|s| !s.is_ok()) {
        anyhow::bail!("Verification failed for some collections");
    }
    Ok(())
}

/// Semantic search over datasets, listing the columns that look relevant.
#[inline]
pub fn search(text: &str, limit: usize, all_columns: bool) -> Result<()> {
    let config = Config::resolve()?;
    let client = connect(&config)?;

    println!("{} '{}'", style("🔍 Query:").bold(), text);
    let hits = query::search(&client, &config.collections.datasets, text, limit)
        .context("Search failed")?;

    if hits.is_empty() {
        println!("No datasets found");
        return Ok(());
    }

    println!("Found {} relevant dataset(s):", hits.len());
    for (index, hit) in hits.iter().enumerate() {
        println!();
        println!("[{}] {} ({})", index + 1, style(&hit.table_name).bold().cyan(), hit.zone);
        if let Some(distance) = hit.distance {
            println!("    Distance: {distance:.3}");
        }
        if !hit.description.is_empty() {
            println!("    Description: {}", metadata::truncate_text(&hit.description, 100));
        }
        println!("    Records: {}", hit.record_count);
        println!("    Total columns: {}", hit.columns.len());

        if all_columns {
            println!("    All columns:");
            for (number, column) in hit.columns.iter().enumerate() {
                println!("      {:2}. {}", number + 1, column);
            }
        } else if hit.relevant_columns.is_empty() {
            println!("    Sample columns:");
            for column in hit.columns_to_show() {
                println!("      • {column}");
            }
            let hidden = hit.columns.len().saturating_sub(hit.columns_to_show().len());
            if hidden > 0 {
                println!("      ... and {hidden} more");
            }
        } else {
            println!("    Relevant columns:");
            for column in &hit.relevant_columns {
                println!("      • {column}");
            }
        }
    }

    Ok(())
}

/// Show the column information stored for datasets and check that column
/// oriented queries find them.
#[inline]
pub fn inspect(limit: usize) -> Result<()> {
    let config = Config::resolve()?;
    let client = connect(&config)?;
    let collection = &config.collections.datasets;

    let inspections =
        query::inspect(&client, collection, limit).context("Failed to fetch datasets")?;
    println!("Found {} dataset object(s)", inspections.len());

    for (index, dataset) in inspections.iter().enumerate() {
        println!();
        println!("[{}] {}", index + 1, style(&dataset.table_name).bold().cyan());
        println!("    UUID: {}", dataset.id);
        println!("    Column count: {}", dataset.column_count());

        for (number, column) in dataset.columns.iter().take(MAX_LISTED_COLUMNS).enumerate() {
            println!("      {:2}. {}", number + 1, column);
        }
        if dataset.column_count() > MAX_LISTED_COLUMNS {
            println!("      ... and {} more", dataset.column_count() - MAX_LISTED_COLUMNS);
        }

        match &dataset.detailed {
            DetailedColumns::Parsed(columns) => {
                println!("    Detailed column info: {} columns", columns.len());
                for column in columns.iter().take(MAX_DETAILED_COLUMNS) {
                    println!(
                        "      • {} ({}): {}",
                        column.name,
                        column.data_type,
                        metadata::truncate_text(&column.description, 50)
                    );
                }
            }
            DetailedColumns::Unstructured => {
                println!("    Detailed column info: present, not a column list");
            }
            DetailedColumns::Missing => {
                println!("    {} No detailed column info", style("✗").red());
            }
        }

        if dataset.semantics_length == 0 {
            println!("    {} No column semantics for search", style("✗").red());
        } else {
            println!("    Column semantics: {} characters", dataset.semantics_length);
            println!("      {}", dataset.semantics_preview);
        }
    }

    println!();
    println!("{}", style("Column-oriented searches:").bold());
    for text in COLUMN_QUERIES {
        match query::search(&client, collection, text, 2) {
            Ok(hits) if hits.is_empty() => println!("  {} '{}': no results", style("✗").red(), text),
            Ok(hits) => {
                println!("  {} '{}':", style("✓").green(), text);
                for hit in &hits {
                    let relevant = hit.relevant_columns.iter().take(5).cloned().collect::<Vec<_>>();
                    if relevant.is_empty() {
                        println!("      {}: {} columns", hit.table_name, hit.columns.len());
                    } else {
                        println!(
                            "      {}: {} columns, relevant: {}",
                            hit.table_name,
                            hit.columns.len(),
                            relevant.join(", ")
                        );
                    }
                }
            }
            Err(e) => println!("  {} '{}': {}", style("✗").red(), text, e),
        }
    }

    Ok(())
}
