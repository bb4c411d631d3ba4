//! JSONL discovery and loading for consultation and inventory exports.
//!
//! Source-level problems (missing path, unreadable file, a line that is not
//! a JSON object) abort the load with a [`LoadError`]. Row-level schema
//! problems are recorded as [`RowIssue`]s and the row is skipped.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use pharmacy_core::data_processors::FieldExtractor;
use pharmacy_core::error::{LoadError, ValidationError};
use pharmacy_core::models::{ConsultationRecord, InventoryRecord, Outcome, Severity};
use pharmacy_core::time_utils::{local_date, DateRange};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

// ── Field aliases ─────────────────────────────────────────────────────────────

const ID_KEYS: &[&str] = &["id", "consultation_id", "consultationId"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "date"];
const SEVERITY_KEYS: &[&str] = &["severity"];
const RESPONSE_KEYS: &[&str] = &["response_time", "response_time_mins", "responseTime"];
const PHARMACIST_KEYS: &[&str] = &["pharmacist_id", "pharmacistId", "pharmacist"];
const REVENUE_KEYS: &[&str] = &["revenue_captured", "revenueCaptured", "revenue"];
const OUTCOME_KEYS: &[&str] = &["outcome", "status"];
/// Statuses of consultations that have not been closed yet.
const OPEN_STATUSES: &[&str] = &["new", "pending", "open", "in_progress"];

const ITEM_ID_KEYS: &[&str] = &["item_id", "itemId", "medication"];
const ITEM_NAME_KEYS: &[&str] = &["name", "item_name", "itemName"];
const STOCK_KEYS: &[&str] = &["stock_level", "stockLevel", "current_stock"];
const THRESHOLD_KEYS: &[&str] = &["reorder_threshold", "reorderThreshold", "reorder_point"];
const RESTOCK_KEYS: &[&str] = &["last_restock_timestamp", "lastRestock", "last_restock"];
const DEMAND_KEYS: &[&str] = &["monthly_demand", "monthlyDemand", "avg_monthly_demand"];
const PRICE_KEYS: &[&str] = &["unit_price", "unitPrice", "price"];

// ── Public types ──────────────────────────────────────────────────────────────

/// How raw rows are interpreted and filtered.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Zone for naive timestamps and for the date filter.
    pub timezone: Tz,
    /// Consultations outside this local-date range are dropped.
    pub date_range: DateRange,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            date_range: DateRange::default(),
        }
    }
}

/// A row that was skipped because it failed schema checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    pub path: PathBuf,
    /// 1-based line number.
    pub line: usize,
    #[serde(rename = "reason", serialize_with = "serialize_display")]
    pub error: ValidationError,
}

/// Records materialised from a source plus load accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport<T> {
    pub records: Vec<T>,
    pub files_read: usize,
    /// Rows rejected with a [`ValidationError`].
    pub skipped: usize,
    /// Consultations dropped because their `id` was already seen.
    pub duplicates: usize,
    /// Valid rows outside the requested date range.
    pub filtered: usize,
    pub issues: Vec<RowIssue>,
}

impl<T> LoadReport<T> {
    fn new(files_read: usize) -> Self {
        Self {
            records: Vec::new(),
            files_read,
            skipped: 0,
            duplicates: 0,
            filtered: 0,
            issues: Vec::new(),
        }
    }

    fn skip(&mut self, path: &Path, line: usize, error: ValidationError) {
        warn!(
            path = %path.display(),
            line,
            error = %error,
            "skipping invalid row"
        );
        self.skipped += 1;
        self.issues.push(RowIssue {
            path: path.to_path_buf(),
            line,
            error,
        });
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Find all `.jsonl` files recursively under `data_path`, sorted by path.
pub fn find_jsonl_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        warn!("Data path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "jsonl")
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Resolve `source` to the list of files to read.
///
/// A file is read as-is whatever its extension; a directory must contain at
/// least one `.jsonl` file.
fn source_files(source: &Path) -> Result<Vec<PathBuf>, LoadError> {
    if !source.exists() {
        return Err(LoadError::SourceNotFound(source.to_path_buf()));
    }
    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }
    let files = find_jsonl_files(source);
    if files.is_empty() {
        return Err(LoadError::NoDataFiles(source.to_path_buf()));
    }
    Ok(files)
}

/// Read one file into `(line_number, object)` pairs, skipping blank lines.
fn read_rows(path: &Path) -> Result<Vec<(usize, Value)>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rows = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let value: Value = serde_json::from_str(trimmed).map_err(|e| LoadError::Malformed {
            path: path.to_path_buf(),
            line: line_no,
            reason: e.to_string(),
        })?;
        if !value.is_object() {
            return Err(LoadError::Malformed {
                path: path.to_path_buf(),
                line: line_no,
                reason: "expected a JSON object".to_string(),
            });
        }
        rows.push((line_no, value));
    }
    Ok(rows)
}

// ── Row mapping ───────────────────────────────────────────────────────────────

/// Map a raw JSON object to a [`ConsultationRecord`].
pub fn parse_consultation(row: &Value, tz: Tz) -> Result<ConsultationRecord, ValidationError> {
    let timestamp = FieldExtractor::required_timestamp(row, "timestamp", TIMESTAMP_KEYS, tz)?;
    let severity: Severity =
        FieldExtractor::required_str(row, "severity", SEVERITY_KEYS)?.parse()?;
    let response_time_minutes =
        FieldExtractor::required_f64(row, "response_time", RESPONSE_KEYS)?;
    let pharmacist_id = FieldExtractor::required_str(row, "pharmacist_id", PHARMACIST_KEYS)?;
    let revenue_captured = FieldExtractor::required_f64(row, "revenue_captured", REVENUE_KEYS)?;
    let outcome = FieldExtractor::optional_str(row, "outcome", OUTCOME_KEYS)?
        .and_then(|s| parse_outcome(&s));

    Ok(ConsultationRecord {
        id: FieldExtractor::optional_str(row, "id", ID_KEYS)?,
        timestamp,
        severity,
        response_time_minutes,
        pharmacist_id,
        revenue_captured,
        outcome,
    })
}

/// Closed outcome for a status value; open or unrecognised statuses leave the
/// consultation without an outcome instead of rejecting the row.
fn parse_outcome(status: &str) -> Option<Outcome> {
    if OPEN_STATUSES.contains(&status.trim().to_lowercase().as_str()) {
        return None;
    }
    match status.parse::<Outcome>() {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(status, error = %e, "unrecognised consultation outcome; ignoring");
            None
        }
    }
}

/// Map a raw JSON object to an [`InventoryRecord`].
pub fn parse_inventory(row: &Value, tz: Tz) -> Result<InventoryRecord, ValidationError> {
    Ok(InventoryRecord {
        item_id: FieldExtractor::required_str(row, "item_id", ITEM_ID_KEYS)?,
        name: FieldExtractor::optional_str(row, "name", ITEM_NAME_KEYS)?,
        stock_level: FieldExtractor::required_u64(row, "stock_level", STOCK_KEYS)?,
        reorder_threshold: FieldExtractor::required_u64(
            row,
            "reorder_threshold",
            THRESHOLD_KEYS,
        )?,
        last_restock: FieldExtractor::required_timestamp(
            row,
            "last_restock_timestamp",
            RESTOCK_KEYS,
            tz,
        )?,
        monthly_demand: FieldExtractor::optional_u64(row, "monthly_demand", DEMAND_KEYS)?,
        unit_price: FieldExtractor::optional_f64(row, "unit_price", PRICE_KEYS)?,
    })
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load consultations from a JSONL file or directory.
///
/// Output is sorted by timestamp; rows with equal timestamps keep file order.
pub fn load_consultations(
    source: &Path,
    options: &LoadOptions,
) -> Result<LoadReport<ConsultationRecord>, LoadError> {
    let files = source_files(source)?;
    let mut report = LoadReport::new(files.len());
    let mut seen_ids: HashSet<String> = HashSet::new();

    for path in &files {
        let rows = read_rows(path)?;
        let mut kept = 0usize;
        for (line, row) in &rows {
            let record = match parse_consultation(row, options.timezone) {
                Ok(r) => r,
                Err(e) => {
                    report.skip(path, *line, e);
                    continue;
                }
            };
            if !options
                .date_range
                .contains(local_date(record.timestamp, options.timezone))
            {
                report.filtered += 1;
                continue;
            }
            if let Some(id) = &record.id {
                if !seen_ids.insert(id.clone()) {
                    report.duplicates += 1;
                    continue;
                }
            }
            kept += 1;
            report.records.push(record);
        }
        debug!(
            "File {}: {} rows, {} consultations kept",
            path.display(),
            rows.len(),
            kept
        );
    }

    report.records.sort_by_key(|r| r.timestamp);

    debug!(
        "Loaded {} consultations from {} files ({} skipped, {} duplicates, {} filtered)",
        report.records.len(),
        report.files_read,
        report.skipped,
        report.duplicates,
        report.filtered,
    );
    Ok(report)
}

/// Load inventory from a JSONL file or directory.
///
/// Several rows for one item collapse to the most recently restocked one;
/// on equal restock times the later row wins. Output is sorted by item id.
pub fn load_inventory(
    source: &Path,
    options: &LoadOptions,
) -> Result<LoadReport<InventoryRecord>, LoadError> {
    let files = source_files(source)?;
    let mut report = LoadReport::new(files.len());
    let mut latest: BTreeMap<String, InventoryRecord> = BTreeMap::new();

    for path in &files {
        let rows = read_rows(path)?;
        for (line, row) in &rows {
            let record = match parse_inventory(row, options.timezone) {
                Ok(r) => r,
                Err(e) => {
                    report.skip(path, *line, e);
                    continue;
                }
            };
            match latest.get(&record.item_id) {
                Some(existing) if existing.last_restock > record.last_restock => {}
                _ => {
                    latest.insert(record.item_id.clone(), record);
                }
            }
        }
        debug!("File {}: {} inventory rows", path.display(), rows.len());
    }

    report.records = latest.into_values().collect();
    debug!(
        "Loaded {} inventory items from {} files ({} skipped)",
        report.records.len(),
        report.files_read,
        report.skipped,
    );
    Ok(report)
}

fn serialize_display<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: std::fmt::Display,
{
    serializer.collect_str(value)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
