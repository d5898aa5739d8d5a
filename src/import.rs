use chrono::Utc;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::database::{Database, QuestionFilter, WriteOp, MAX_OPS_PER_BATCH};
use crate::dedup::SeenKeys;
use crate::errors::{classify_store_error, CorpusError};
use crate::log_import;
use crate::models::{ImportBatchResult, ImportRow, QuestionRecord};
use crate::normalize::{lookup_level, lookup_theme, normalize_theme, strip_variant_markers};

pub const DEFAULT_EXAM_TYPE: &str = "naturalisation";

/// How many skipped-duplicate texts the result keeps for display.
const SKIPPED_DISPLAY_CAP: usize = 20;

/// Progress log cadence, in rows.
const PROGRESS_EVERY: usize = 50;

// Accepted header aliases per logical field, in priority order. Matching is
// accent/case-insensitive; the first present column wins.
const QUESTION_ALIASES: &[&str] = &["question", "texte", "intitule", "enonce", "sujet"];
const THEME_ALIASES: &[&str] = &["theme", "sujet", "category", "categorie"];
const LEVEL_ALIASES: &[&str] = &["niveau", "level", "difficulte"];
const CORRECT_ALIASES: &[&str] = &[
    "bonne reponse",
    "reponse correcte",
    "correct",
    "reponse",
    "correction",
    "valid",
];
const CHOICE_ALIASES: [&[&str]; 4] = [
    &["reponse a", "a", "choice a", "choix a"],
    &["reponse b", "b", "choice b", "choix b"],
    &["reponse c", "c", "choice c", "choix c"],
    &["reponse d", "d", "choice d", "choix d"],
];
const EXPLANATION_ALIASES: &[&str] = &["explication", "explanation", "commentaire"];
const SOURCE_ALIASES: &[&str] = &["source"];
const REFERENCE_ALIASES: &[&str] = &["reference", "ref", "article"];
const ORIGINAL_ID_ALIASES: &[&str] = &["id", "original id", "identifiant"];
const EXAM_TYPE_ALIASES: &[&str] = &["exam type", "type d examen", "examen", "track"];

/// Bulk question importer. Rows are processed strictly in input order; the
/// dedup set is updated synchronously before the next row is looked at, so
/// duplicates inside one run are caught alongside collisions with the live
/// corpus.
#[derive(Clone)]
pub struct ImportService {
    db: Database,
    batch_limit: usize,
}

impl ImportService {
    pub fn new(db: Database) -> Self {
        Self::with_batch_limit(db, MAX_OPS_PER_BATCH)
    }

    pub fn with_batch_limit(db: Database, batch_limit: usize) -> Self {
        Self {
            db,
            batch_limit: batch_limit.clamp(1, MAX_OPS_PER_BATCH),
        }
    }

    /// Parses CSV text (header row required) and feeds it through
    /// `import_rows`. The reader is flexible about ragged rows; those fall
    /// out as empty/invalid rather than aborting the run.
    pub async fn import_csv(&self, data: &str) -> Result<ImportBatchResult, CorpusError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| CorpusError::Validation(format!("failed to read CSV headers: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| CorpusError::Validation(format!("failed to parse CSV row: {}", e)))?;
            let mut row = ImportRow::new();
            for (header, value) in headers.iter().zip(record.iter()) {
                row.insert(header.clone(), value.to_string());
            }
            rows.push(row);
        }

        self.import_rows(rows).await
    }

    /// Imports loosely-typed rows into the corpus. Validation failures are
    /// counted per row and never fatal; a batch-commit failure aborts the
    /// whole run with no retry. Partial imports are safe to re-run because
    /// already-written rows are rejected by the dedup check next time.
    pub async fn import_rows(&self, rows: Vec<ImportRow>) -> Result<ImportBatchResult, CorpusError> {
        log_import!(start, total_rows = rows.len());

        // One full scan up front seeds the seen set; per-row remote lookups
        // would be O(n^2) against the store.
        let existing = self
            .db
            .query_questions(&QuestionFilter::default())
            .await
            .map_err(|e| classify_store_error(&e))?;
        let mut seen = SeenKeys::from_questions(existing.iter().map(|q| q.question.as_str()));

        let mut result = ImportBatchResult {
            total_rows: rows.len(),
            ..Default::default()
        };
        let mut pending: Vec<WriteOp> = Vec::new();

        for (idx, row) in rows.iter().enumerate() {
            let row_num = idx + 1;

            match self.parse_row(row, row_num, &mut seen, &mut result) {
                Some(record) => {
                    pending.push(WriteOp::Set(Box::new(record)));
                    result.imported += 1;
                }
                None => {} // counted inside parse_row
            }

            if pending.len() >= self.batch_limit {
                let batch = std::mem::take(&mut pending);
                let ops = batch.len();
                if let Err(e) = self.db.batch_write(batch).await {
                    log_import!(error, row = row_num, error = e);
                    return Err(classify_store_error(&e));
                }
                log_import!(batch_committed, ops = ops);
            }

            if row_num % PROGRESS_EVERY == 0 {
                log_import!(
                    progress,
                    row = row_num,
                    imported = result.imported,
                    duplicates = result.duplicates
                );
            }
        }

        if !pending.is_empty() {
            let ops = pending.len();
            if let Err(e) = self.db.batch_write(pending).await {
                log_import!(error, row = result.total_rows, error = e);
                return Err(classify_store_error(&e));
            }
            log_import!(batch_committed, ops = ops);
        }

        log_import!(
            done,
            imported = result.imported,
            duplicates = result.duplicates,
            empty = result.empty,
            bad_data = result.bad_data
        );
        Ok(result)
    }

    /// Parses one row into a record, or updates the relevant skip counter
    /// and returns None.
    fn parse_row(
        &self,
        row: &ImportRow,
        row_num: usize,
        seen: &mut SeenKeys,
        result: &mut ImportBatchResult,
    ) -> Option<QuestionRecord> {
        let fields = normalize_headers(row);

        let question_raw = resolve_field(&fields, QUESTION_ALIASES)
            .map(str::trim)
            .unwrap_or("");
        if question_raw.is_empty() {
            result.empty += 1;
            log_import!(row_skipped, row = row_num, reason = "empty");
            return None;
        }

        let cleaned = strip_variant_markers(question_raw).trim().to_string();

        // Both the raw and the cleaned text are checked so rows where
        // cleaning changes the outcome still collide.
        if seen.contains(question_raw) || seen.contains(&cleaned) {
            result.duplicates += 1;
            if result.skipped_duplicates.len() < SKIPPED_DISPLAY_CAP {
                result.skipped_duplicates.push(question_raw.to_string());
            }
            log_import!(row_skipped, row = row_num, reason = "duplicate");
            return None;
        }

        let (choices, kept_slots) = collect_choices(&fields);
        if choices.len() < 2 {
            result.bad_data += 1;
            log_import!(row_skipped, row = row_num, reason = "bad_data");
            return None;
        }

        // Two choice columns carrying the same text make the question
        // unanswerable; the row is mislabeled data, not a lenient variant.
        let mut distinct = HashSet::new();
        if !choices.iter().all(|c| distinct.insert(c.as_str())) {
            result.bad_data += 1;
            log_import!(row_skipped, row = row_num, reason = "bad_data");
            return None;
        }

        let correct_raw = resolve_field(&fields, CORRECT_ALIASES);
        let correct_index = match correct_raw.and_then(parse_correct_slot) {
            Some(slot) => match kept_slots.iter().position(|&s| s == slot) {
                Some(position) => position,
                None => {
                    // Recognized answer letter points at an empty choice
                    // column; the row is mislabeled, not merely lenient.
                    result.bad_data += 1;
                    log_import!(row_skipped, row = row_num, reason = "bad_data");
                    return None;
                }
            },
            None => {
                // Preserved source behavior: absent or unrecognized answer
                // columns default to the first choice. Logged so operators
                // can audit potentially mislabeled rows.
                tracing::warn!(
                    component = "import",
                    row = row_num,
                    raw = ?correct_raw,
                    "Correct-answer column absent or unrecognized, defaulting to choice 0"
                );
                0
            }
        };

        // The seen set grows before the next row is evaluated so in-batch
        // duplicates are caught too.
        seen.insert(question_raw);
        seen.insert(&cleaned);

        let now = Utc::now();
        Some(QuestionRecord {
            id: Uuid::new_v4(),
            theme: lookup_theme(resolve_field(&fields, THEME_ALIASES).unwrap_or("")),
            level: lookup_level(resolve_field(&fields, LEVEL_ALIASES).unwrap_or("")),
            exam_type: resolve_field(&fields, EXAM_TYPE_ALIASES)
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_EXAM_TYPE.to_string()),
            question: question_raw.to_string(),
            choices,
            correct_index,
            explanation: optional_field(&fields, EXPLANATION_ALIASES),
            tags: Vec::new(),
            is_active: true,
            source: optional_field(&fields, SOURCE_ALIASES),
            reference: optional_field(&fields, REFERENCE_ALIASES),
            // Spreadsheet ids are provenance only, never the primary key.
            original_id: optional_field(&fields, ORIGINAL_ID_ALIASES),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Folds a row's headers to normalized form so alias matching is
/// accent/case-insensitive.
fn normalize_headers(row: &ImportRow) -> HashMap<String, String> {
    row.iter()
        .map(|(header, value)| (normalize_theme(header), value.clone()))
        .collect()
}

/// First present column among the aliases wins.
fn resolve_field<'a>(fields: &'a HashMap<String, String>, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .find_map(|alias| fields.get(*alias).map(String::as_str))
}

fn optional_field(fields: &HashMap<String, String>, aliases: &[&str]) -> Option<String> {
    resolve_field(fields, aliases)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Collects the non-empty choice columns in letter order, remembering which
/// original slots survive so the correct-answer letter can be remapped.
fn collect_choices(fields: &HashMap<String, String>) -> (Vec<String>, Vec<usize>) {
    let mut choices = Vec::new();
    let mut kept_slots = Vec::new();
    for (slot, aliases) in CHOICE_ALIASES.iter().enumerate() {
        if let Some(value) = resolve_field(fields, aliases) {
            let value = value.trim();
            if !value.is_empty() {
                choices.push(value.to_string());
                kept_slots.push(slot);
            }
        }
    }
    (choices, kept_slots)
}

/// Maps a correct-answer cell (letter A-D or numeral 1-4) onto the 0-based
/// choice slot. Unrecognized values yield None.
fn parse_correct_slot(raw: &str) -> Option<usize> {
    match normalize_theme(raw).as_str() {
        "a" | "1" => Some(0),
        "b" | "2" => Some(1),
        "c" | "3" => Some(2),
        "d" | "4" => Some(3),
        _ => None,
    }
}
