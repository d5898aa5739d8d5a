use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::database::Database;
use crate::errors::{classify_store_error, CorpusError};
use crate::models::{Attempt, QuestionRecord};
use crate::sampling::SamplingEngine;

/// Computes a user's review pool: the questions whose latest recorded
/// answer was incorrect. A question missed once but answered correctly
/// later drops out - review reflects current weakness, not historical
/// error count.
#[derive(Clone)]
pub struct ReviewSelector {
    db: Database,
    engine: SamplingEngine,
}

impl ReviewSelector {
    pub fn new(db: Database) -> Self {
        let engine = SamplingEngine::new(db.clone());
        Self { db, engine }
    }

    /// Replays the user's attempt history chronologically and returns every
    /// question id whose final recorded answer is incorrect.
    pub async fn incorrect_question_ids(
        &self,
        user_id: &str,
    ) -> Result<HashSet<Uuid>, CorpusError> {
        let mut attempts = self
            .db
            .attempts_for_user(user_id)
            .await
            .map_err(|e| classify_store_error(&e))?;
        attempts.sort_by_key(|a| a.created_at);
        Ok(latest_incorrect(&attempts))
    }

    /// Resolves the review pool into question records, dropping anything
    /// since deactivated or purged.
    pub async fn review_questions(
        &self,
        user_id: &str,
    ) -> Result<Vec<QuestionRecord>, CorpusError> {
        let ids: Vec<Uuid> = self.incorrect_question_ids(user_id).await?.into_iter().collect();
        self.engine.fetch_by_ids(&ids).await
    }
}

/// Latest-answer-wins fold over time-ordered attempts. Kept as an explicit
/// replay: a running miss counter would lose the "latest, not count"
/// semantics.
pub fn latest_incorrect(attempts: &[Attempt]) -> HashSet<Uuid> {
    let mut latest: HashMap<Uuid, bool> = HashMap::new();
    for attempt in attempts {
        for answer in &attempt.answers {
            latest.insert(answer.question_id, answer.correct);
        }
    }
    latest
        .into_iter()
        .filter_map(|(id, correct)| (!correct).then_some(id))
        .collect()
}
