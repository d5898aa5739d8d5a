use chrono::Utc;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::database::Database;
use crate::errors::{classify_store_error, CorpusError};
use crate::log_session;
use crate::models::{AnswerRecord, Attempt, QuestionRecord, SessionMode};

/// Where a session currently is. There is no resurrection: `Finished` is
/// terminal, and a retry or review pass constructs a new machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Correct,
    Incorrect,
}

/// One quiz attempt in flight. The question snapshots are fixed for the
/// session lifetime; answers live in a sparse index map until finalization.
/// Exactly one machine is live per user interaction context - state lives
/// with the caller and is written out once at the end.
#[derive(Debug)]
pub struct SessionStateMachine {
    mode: SessionMode,
    user_id: String,
    exam_type: String,
    theme: Option<String>,
    questions: Vec<QuestionRecord>,
    answers: HashMap<usize, usize>,
    locked: HashSet<usize>,
    current_index: usize,
    nominal_duration: u32,
    time_remaining: u32,
    streak: u32,
    max_streak: u32,
    phase: SessionPhase,
}

impl SessionStateMachine {
    /// Starts a session over a fetched question set. An empty fetch is a
    /// terminal "no content" outcome, distinct from a finished session.
    pub fn new(
        mode: SessionMode,
        user_id: &str,
        exam_type: &str,
        theme: Option<String>,
        questions: Vec<QuestionRecord>,
        duration_secs: u32,
    ) -> Result<Self, CorpusError> {
        if questions.is_empty() {
            return Err(CorpusError::EmptyResult(
                "no questions available for this selection".to_string(),
            ));
        }

        log_session!("started", mode = mode, question_count = questions.len());
        Ok(Self {
            mode,
            user_id: user_id.to_string(),
            exam_type: exam_type.to_string(),
            theme,
            questions,
            answers: HashMap::new(),
            locked: HashSet::new(),
            current_index: 0,
            nominal_duration: duration_secs,
            time_remaining: duration_secs,
            streak: 0,
            max_streak: 0,
            phase: SessionPhase::Active,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> &QuestionRecord {
        &self.questions[self.current_index]
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn max_streak(&self) -> u32 {
        self.max_streak
    }

    /// Running score over validated/captured answers.
    pub fn score(&self) -> u32 {
        self.answers
            .iter()
            .filter(|(i, choice)| self.questions[**i].correct_index == **choice)
            .count() as u32
    }

    /// Records or overwrites the answer for the current question. Outside
    /// exam mode a validated question is locked; in exam mode answers stay
    /// editable until the final submit.
    pub fn select_answer(&mut self, choice_index: usize) -> Result<(), CorpusError> {
        self.ensure_active()?;
        let question = &self.questions[self.current_index];
        if choice_index >= question.choices.len() {
            return Err(CorpusError::Validation(format!(
                "choice index {} out of range for {} choices",
                choice_index,
                question.choices.len()
            )));
        }
        if self.mode != SessionMode::Exam && self.locked.contains(&self.current_index) {
            return Err(CorpusError::Validation(
                "answer is already locked for this question".to_string(),
            ));
        }
        self.answers.insert(self.current_index, choice_index);
        Ok(())
    }

    /// Locks the current answer and scores it. Training and review only:
    /// exam mode has no per-question lock.
    pub fn validate(&mut self) -> Result<ValidationOutcome, CorpusError> {
        self.ensure_active()?;
        if self.mode == SessionMode::Exam {
            return Err(CorpusError::Validation(
                "exam sessions are scored once at final submit".to_string(),
            ));
        }
        if self.locked.contains(&self.current_index) {
            return Err(CorpusError::Validation(
                "this question was already validated".to_string(),
            ));
        }
        let choice = *self.answers.get(&self.current_index).ok_or_else(|| {
            CorpusError::Validation("select an answer before validating".to_string())
        })?;

        self.locked.insert(self.current_index);
        let correct = self.questions[self.current_index].correct_index == choice;
        if correct {
            self.streak += 1;
            self.max_streak = self.max_streak.max(self.streak);
            Ok(ValidationOutcome::Correct)
        } else {
            self.streak = 0;
            Ok(ValidationOutcome::Incorrect)
        }
    }

    /// Moves to the next question, or finishes the session when already on
    /// the last one.
    pub fn advance(&mut self) -> Result<SessionPhase, CorpusError> {
        self.ensure_active()?;
        if self.current_index + 1 < self.questions.len() {
            self.current_index += 1;
        } else {
            self.finish();
        }
        Ok(self.phase)
    }

    /// Exam-mode free navigation to any question.
    pub fn goto(&mut self, index: usize) -> Result<(), CorpusError> {
        self.ensure_active()?;
        if self.mode != SessionMode::Exam {
            return Err(CorpusError::Validation(
                "free navigation is only available in exam mode".to_string(),
            ));
        }
        if index >= self.questions.len() {
            return Err(CorpusError::Validation(format!(
                "question index {} out of range",
                index
            )));
        }
        self.current_index = index;
        Ok(())
    }

    /// One second of countdown. Hitting zero is a hard cutoff: the session
    /// finishes immediately with whatever answers were captured, validated
    /// or not.
    pub fn tick(&mut self) -> SessionPhase {
        if self.phase == SessionPhase::Finished {
            return self.phase;
        }
        self.time_remaining = self.time_remaining.saturating_sub(1);
        if self.time_remaining == 0 {
            log_session!("timer_expired");
            self.finish();
        }
        self.phase
    }

    /// Final submit (exam mode) or early manual finish.
    pub fn submit(&mut self) -> Result<SessionPhase, CorpusError> {
        self.ensure_active()?;
        self.finish();
        Ok(self.phase)
    }

    fn finish(&mut self) {
        self.phase = SessionPhase::Finished;
        log_session!(
            "finished",
            mode = self.mode,
            score = self.score(),
            total = self.questions.len()
        );
    }

    /// Builds the finalized attempt. Unanswered slots carry no choice and
    /// contribute zero to the score. Only available once finished.
    pub fn attempt(&self) -> Option<Attempt> {
        if self.phase != SessionPhase::Finished {
            return None;
        }
        let answers: Vec<AnswerRecord> = self
            .questions
            .iter()
            .enumerate()
            .map(|(i, question)| {
                let choice_index = self.answers.get(&i).copied();
                AnswerRecord {
                    question_id: question.id,
                    choice_index,
                    correct: choice_index == Some(question.correct_index),
                }
            })
            .collect();
        let score = answers.iter().filter(|a| a.correct).count() as u32;

        Some(Attempt {
            id: Uuid::new_v4(),
            user_id: self.user_id.clone(),
            exam_type: self.exam_type.clone(),
            theme: self.theme.clone(),
            score,
            total_questions: self.questions.len() as u32,
            time_spent: self.nominal_duration - self.time_remaining,
            answers,
            created_at: Utc::now(),
        })
    }

    /// Writes the attempt out, honoring the per-mode persistence split:
    /// exam-track review passes are re-practice and leave history alone.
    pub async fn persist(&self, db: &Database) -> Result<Option<Attempt>, CorpusError> {
        let Some(attempt) = self.attempt() else {
            return Err(CorpusError::Validation(
                "session is still active, nothing to persist".to_string(),
            ));
        };
        if !self.mode.persists_attempt(self.theme.as_deref()) {
            return Ok(None);
        }
        db.insert_attempt(&attempt)
            .await
            .map_err(|e| classify_store_error(&e))?;
        Ok(Some(attempt))
    }

    fn ensure_active(&self) -> Result<(), CorpusError> {
        match self.phase {
            SessionPhase::Active => Ok(()),
            SessionPhase::Finished => Err(CorpusError::Validation(
                "session is already finished".to_string(),
            )),
        }
    }
}
