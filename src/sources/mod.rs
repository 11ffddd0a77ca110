// Descriptor files: YAML (or JSON) documents holding raw catalog metadata.
//
// A dataset file holds one descriptor mapping, a `datasets:` list or a
// top-level list. Relationship and domain-tag files hold a `relationships:` or
// `domain_tags:` list, or a top-level list.
//
// A dataset descriptor may leave its column list, row count and column
// details out. They are then read from the CSV named by `originalFileName`,
// looked up next to the descriptor or in a `raw/` directory beside it or one
// level up.


use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::metadata::{RawMetadata, RecordKind, fields};

const DESCRIPTOR_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Directory holding the CSV files that descriptors describe.
const TABLE_DIR: &str = "raw";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Descriptor path not found: {0}")]
    NotFound(PathBuf),
    #[error("No descriptor files (.yaml, .yml, .json) in {0}")]
    Empty(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Unexpected layout in {path}: {message}")]
    Layout { path: PathBuf, message: String },
    #[error("Failed to read table {path}: {source}")]
    Table { path: PathBuf, source: csv::Error },
}

/// Top-level key of the list of records of `kind`.
#[inline]
pub const fn section_key(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Dataset => "datasets",
        RecordKind::Relationship => "relationships",
        RecordKind::DomainTag => "domain_tags",
    }
}

/// Descriptor files at `path`: the file itself, or the descriptor files of a
/// directory (not recursive) in name order.
#[inline]
pub fn descriptor_files(path: &Path) -> Result<Vec<PathBuf>, SourceError> {
    if !path.exists() {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = fs::read_dir(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| SourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file = entry.path();
        if file.is_file() && is_descriptor(&file) {
            files.push(file);
        }
    }

    if files.is_empty() {
        return Err(SourceError::Empty(path.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

fn is_descriptor(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            DESCRIPTOR_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Parse descriptor text into a JSON value. YAML is a superset for our
/// purposes, but `.json` files go through the JSON parser for exact numbers.
#[inline]
pub fn parse_document(path: &Path, text: &str) -> Result<Value, SourceError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    let parsed = if is_json(path) {
        serde_json::from_str::<Value>(text).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str::<Value>(text).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| SourceError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Records of `kind` in an already parsed document.
#[inline]
pub fn records_from_document(
    path: &Path,
    document: Value,
    kind: RecordKind,
) -> Result<Vec<RawMetadata>, SourceError> {
    let section = section_key(kind);
    let layout = |message: String| SourceError::Layout {
        path: path.to_path_buf(),
        message,
    };

    let items = match document {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(section) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => Vec::new(),
            Some(_) => return Err(layout(format!("'{section}' must be a list"))),
            None if kind == RecordKind::Dataset => vec![Value::Object(map)],
            None => return Err(layout(format!("expected a '{section}' list"))),
        },
        _ => return Err(layout("expected a mapping or a list".to_string())),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            RawMetadata::from_value(item)
                .ok_or_else(|| layout(format!("{section} entry {} is not a mapping", index + 1)))
        })
        .collect()
}

/// Records of `kind` in a single descriptor file.
#[inline]
pub fn load_file(path: &Path, kind: RecordKind) -> Result<Vec<RawMetadata>, SourceError> {
    let text = fs::read_to_string(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut records = records_from_document(path, parse_document(path, &text)?, kind)?;
    if kind == RecordKind::Dataset {
        for record in &mut records {
            fill_from_table(record, path)?;
        }
    }
    debug!("Loaded {} {} record(s) from {}", records.len(), kind, path.display());
    Ok(records)
}

/// Records of `kind` from a file or a directory of descriptor files.
#[inline]
pub fn load(path: &Path, kind: RecordKind) -> Result<Vec<RawMetadata>, SourceError> {
    let mut records = Vec::new();
    for file in descriptor_files(path)? {
        records.extend(load_file(&file, kind)?);
    }
    Ok(records)
}

/// Shape of a CSV file: its header, row count and a per-column type guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableProfile {
    pub columns: Vec<String>,
    pub row_count: u64,
    pub column_types: Vec<&'static str>,
}

impl TableProfile {
    /// `detailedColumnInfo` document listing every column with its guessed type.
    #[inline]
    pub fn column_info(&self) -> Value {
        let columns: Vec<Value> = self
            .columns
            .iter()
            .zip(&self.column_types)
            .map(|(name, kind)| json!({"name": name, "type": kind, "description": ""}))
            .collect();
        json!({ "columns": columns })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Empty,
    Int,
    Float,
    Text,
}

impl ColumnType {
    fn widen(self, value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            return self;
        }
        let seen = if value.parse::<i64>().is_ok() {
            Self::Int
        } else if value.parse::<f64>().is_ok() {
            Self::Float
        } else {
            Self::Text
        };
        match (self, seen) {
            (Self::Text, _) | (_, Self::Text) => Self::Text,
            (Self::Float, _) | (_, Self::Float) => Self::Float,
            _ => Self::Int,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Empty | Self::Text => "string",
        }
    }
}

/// Read the header and count the rows of a CSV file.
#[inline]
pub fn profile_table(path: &Path) -> Result<TableProfile, SourceError> {
    let table_error = |source: csv::Error| SourceError::Table {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(table_error)?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(table_error)?
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    let mut types = vec![ColumnType::Empty; columns.len()];
    let mut row_count = 0_u64;
    for row in reader.records() {
        let row = row.map_err(table_error)?;
        for (kind, value) in types.iter_mut().zip(row.iter()) {
            *kind = kind.widen(value);
        }
        row_count += 1;
    }

    Ok(TableProfile {
        columns,
        row_count,
        column_types: types.into_iter().map(ColumnType::name).collect(),
    })
}

/// CSV file a dataset descriptor at `descriptor` refers to, if one exists.
#[inline]
pub fn table_file(descriptor: &Path, file_name: &str) -> Option<PathBuf> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return None;
    }
    let dir = descriptor.parent().unwrap_or_else(|| Path::new(""));
    let mut candidates = vec![dir.join(file_name), dir.join(TABLE_DIR).join(file_name)];
    if let Some(up) = dir.parent() {
        candidates.push(up.join(TABLE_DIR).join(file_name));
    }
    candidates.into_iter().find(|candidate| candidate.is_file())
}

/// Fill `columnsArray`, `recordCount` and `detailedColumnInfo` from the
/// record's CSV file where the descriptor leaves them out. Fields that are
/// present are never replaced. Returns whether a table was read.
#[inline]
pub fn fill_from_table(record: &mut RawMetadata, descriptor: &Path) -> Result<bool, SourceError> {
    let missing: Vec<&str> = [
        fields::COLUMNS_ARRAY,
        fields::RECORD_COUNT,
        fields::DETAILED_COLUMN_INFO,
    ]
    .into_iter()
    .filter(|field| record.present(field).is_none())
    .collect();
    if missing.is_empty() {
        return Ok(false);
    }

    let Some(file_name) = record
        .present(fields::ORIGINAL_FILE_NAME)
        .and_then(Value::as_str)
    else {
        return Ok(false);
    };
    let Some(table) = table_file(descriptor, file_name) else {
        debug!(
            "No table file {} for {}, leaving {} unset",
            file_name,
            descriptor.display(),
            missing.join(", ")
        );
        return Ok(false);
    };

    let profile = profile_table(&table)?;
    for field in missing {
        let value = match field {
            fields::COLUMNS_ARRAY => Value::from(profile.columns.clone()),
            fields::RECORD_COUNT => Value::from(profile.row_count),
            _ => profile.column_info(),
        };
        record.insert(field, value);
    }
    debug!(
        "Read {} column(s) and {} row(s) from {}",
        profile.columns.len(),
        profile.row_count,
        table.display()
    );
    Ok(true)
}
