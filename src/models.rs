use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One question in the corpus. The primary key is always a freshly minted
/// UUID; ids coming from spreadsheets or external sources are kept only as
/// `original_id` provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: Uuid,
    pub theme: String,
    pub level: String,
    pub exam_type: String,
    pub question: String,
    pub choices: Vec<String>,
    pub correct_index: usize,
    pub explanation: Option<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub source: Option<String>,
    pub reference: Option<String>,
    pub original_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuestionRecord {
    /// Checks the structural invariants: 2-6 distinct non-empty choices
    /// after trimming, and a correct index inside the choice list.
    pub fn check_invariants(&self) -> Result<(), String> {
        let trimmed: Vec<&str> = self
            .choices
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if trimmed.len() < 2 {
            return Err("question needs at least 2 non-empty choices".to_string());
        }
        if self.choices.len() > 6 {
            return Err(format!("too many choices: {}", self.choices.len()));
        }
        let mut seen = std::collections::HashSet::new();
        if !trimmed.iter().all(|c| seen.insert(*c)) {
            return Err("choices must be distinct".to_string());
        }
        if self.correct_index >= self.choices.len() {
            return Err(format!(
                "correct_index {} out of range for {} choices",
                self.correct_index,
                self.choices.len()
            ));
        }
        Ok(())
    }
}

/// Per-question outcome inside a finalized attempt. `choice_index` is None
/// for questions the user never answered (timer cutoffs leave those).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: Uuid,
    pub choice_index: Option<usize>,
    pub correct: bool,
}

/// One finished, scored quiz session. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub user_id: String,
    pub exam_type: String,
    pub theme: Option<String>,
    pub score: u32,
    pub total_questions: u32,
    pub time_spent: u32,
    pub answers: Vec<AnswerRecord>,
    pub created_at: DateTime<Utc>,
}

impl Attempt {
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.total_questions == 0 {
            return Err("attempt must contain at least one question".to_string());
        }
        if self.answers.len() != self.total_questions as usize {
            return Err(format!(
                "answers length {} does not match total_questions {}",
                self.answers.len(),
                self.total_questions
            ));
        }
        let correct = self.answers.iter().filter(|a| a.correct).count() as u32;
        if correct != self.score {
            return Err(format!(
                "score {} does not match correct answer count {}",
                self.score, correct
            ));
        }
        Ok(())
    }
}

/// What kind of session produced (or will produce) an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Training,
    Exam,
    Review,
    Ai,
}

impl SessionMode {
    /// Review passes over an exam-track (mixed, theme-less) question pool are
    /// pure re-practice and leave history untouched; theme-training review
    /// does persist for progress tracking. All other modes persist.
    pub fn persists_attempt(&self, theme: Option<&str>) -> bool {
        match self {
            SessionMode::Review => theme.is_some(),
            _ => true,
        }
    }
}

/// Tally returned by one import run. The four counters always sum to the
/// number of input rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportBatchResult {
    pub imported: usize,
    pub duplicates: usize,
    pub empty: usize,
    pub bad_data: usize,
    pub total_rows: usize,
    /// First few duplicate question texts, for operator display.
    pub skipped_duplicates: Vec<String>,
}

/// A loosely-typed spreadsheet row: header name to cell value. Header names
/// are matched against alias lists, not a fixed schema.
pub type ImportRow = HashMap<String, String>;

// API request/response DTOs

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRowsRequest {
    pub rows: Vec<ImportRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleParams {
    pub theme: String,
    pub level: Option<String>,
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExamParams {
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAttemptRequest {
    pub user_id: String,
    pub exam_type: String,
    pub theme: Option<String>,
    pub score: u32,
    pub total_questions: u32,
    pub time_spent: u32,
    pub answers: Vec<AnswerRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiGenerateRequest {
    pub theme: String,
    pub level: Option<String>,
    pub count: Option<usize>,
}

/// Summary of a bulk corpus clean: which groups were found and how many
/// redundant records were removed.
#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    pub groups: usize,
    pub removed: usize,
    pub kept: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(choices: Vec<&str>, correct_index: usize) -> QuestionRecord {
        QuestionRecord {
            id: Uuid::new_v4(),
            theme: "institutions".to_string(),
            level: "moyen".to_string(),
            exam_type: "naturalisation".to_string(),
            question: "Qui vote les lois ?".to_string(),
            choices: choices.into_iter().map(String::from).collect(),
            correct_index,
            explanation: None,
            tags: vec![],
            is_active: true,
            source: None,
            reference: None,
            original_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_question_invariants() {
        assert!(record(vec!["a", "b"], 1).check_invariants().is_ok());
        assert!(record(vec!["a"], 0).check_invariants().is_err());
        assert!(record(vec!["a", " "], 0).check_invariants().is_err());
        assert!(record(vec!["a", "a"], 0).check_invariants().is_err());
        assert!(record(vec!["a", "b"], 2).check_invariants().is_err());
    }

    #[test]
    fn test_attempt_score_invariant() {
        let q = Uuid::new_v4();
        let attempt = Attempt {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            exam_type: "naturalisation".to_string(),
            theme: None,
            score: 1,
            total_questions: 2,
            time_spent: 30,
            answers: vec![
                AnswerRecord {
                    question_id: q,
                    choice_index: Some(1),
                    correct: true,
                },
                AnswerRecord {
                    question_id: Uuid::new_v4(),
                    choice_index: None,
                    correct: false,
                },
            ],
            created_at: Utc::now(),
        };
        assert!(attempt.check_invariants().is_ok());

        let mut bad = attempt.clone();
        bad.score = 2;
        assert!(bad.check_invariants().is_err());

        let mut short = attempt;
        short.total_questions = 3;
        assert!(short.check_invariants().is_err());
    }

    #[test]
    fn test_review_persistence_split() {
        assert!(SessionMode::Review.persists_attempt(Some("histoire")));
        assert!(!SessionMode::Review.persists_attempt(None));
        assert!(SessionMode::Exam.persists_attempt(None));
        assert!(SessionMode::Training.persists_attempt(Some("histoire")));
    }
}
