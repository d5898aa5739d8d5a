use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use uuid::Uuid;

use crate::database::{Database, QuestionFilter};
use crate::dedup::dedup_by_text;
use crate::errors::{classify_store_error, CorpusError};
use crate::log_sampling;
use crate::models::QuestionRecord;
use crate::normalize::CANONICAL_THEMES;

/// Over-fetch factor applied before client-side level filtering.
const LEVEL_OVERFETCH: usize = 5;

/// Below this many post-filter questions the level filter is abandoned in
/// favor of the unfiltered theme sample.
const MIN_VIABLE: usize = 5;

/// Random question sampler over the keyed corpus store.
///
/// The draw picks a random point in the primary-key space, reads forward
/// from it, and wraps around from the partition minimum when the point
/// lands near the end. This costs O(count) reads instead of scanning the
/// partition, at the price of a mild bias toward records whose keys sit
/// just after commonly-hit random points. Known approximation, not a
/// uniformity guarantee.
#[derive(Clone)]
pub struct SamplingEngine {
    db: Database,
}

impl SamplingEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Draws up to `count` active questions for a theme, approximately
    /// uniformly, with no two records sharing normalized question text.
    /// Returns fewer than `count` only when the partition itself runs dry.
    pub async fn sample<R: Rng + ?Sized>(
        &self,
        theme: &str,
        level: Option<&str>,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<QuestionRecord>, CorpusError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let fetch = if level.is_some() {
            count * LEVEL_OVERFETCH
        } else {
            count
        };

        let random_key = Uuid::from_u128(rng.gen());
        let mut filter = QuestionFilter::theme(theme);
        filter.min_id = Some(random_key);
        filter.limit = Some(fetch);

        let mut drawn = self
            .db
            .query_questions(&filter)
            .await
            .map_err(|e| classify_store_error(&e))?;

        if drawn.len() < fetch {
            // The random point landed near the partition end; wrap around
            // from its minimum key for the shortfall.
            let shortfall = fetch - drawn.len();
            log_sampling!(wraparound, theme = theme, shortfall = shortfall);

            let mut wrap_filter = QuestionFilter::theme(theme);
            wrap_filter.limit = Some(shortfall);
            let wrapped = self
                .db
                .query_questions(&wrap_filter)
                .await
                .map_err(|e| classify_store_error(&e))?;

            let have: HashSet<Uuid> = drawn.iter().map(|q| q.id).collect();
            drawn.extend(wrapped.into_iter().filter(|q| !have.contains(&q.id)));
        }

        if let Some(level) = level {
            let filtered: Vec<QuestionRecord> = drawn
                .iter()
                .filter(|q| q.level == level)
                .cloned()
                .collect();
            // Giving the user some valid session outranks strict level
            // adherence.
            if filtered.len() >= MIN_VIABLE.min(count) {
                drawn = filtered;
            } else {
                log_sampling!(
                    level_filter_abandoned,
                    theme = theme,
                    level = level,
                    remaining = filtered.len()
                );
            }
        }

        let mut sample = dedup_by_text(drawn);
        sample.shuffle(rng);
        sample.truncate(count);

        log_sampling!(draw, theme = theme, requested = count, returned = sample.len());
        Ok(sample)
    }

    /// Fetches a fixed set of questions by id, dropping missing or inactive
    /// records. Review sessions source their pool through this.
    pub async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<QuestionRecord>, CorpusError> {
        let mut questions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(question) = self
                .db
                .get_question(*id)
                .await
                .map_err(|e| classify_store_error(&e))?
            {
                if question.is_active {
                    questions.push(question);
                }
            }
        }
        Ok(questions)
    }
}

/// Builds theme-balanced question sets for timed exams.
#[derive(Clone)]
pub struct ExamComposer {
    engine: SamplingEngine,
    themes: Vec<String>,
}

impl ExamComposer {
    pub fn new(engine: SamplingEngine) -> Self {
        Self {
            engine,
            themes: CANONICAL_THEMES.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[cfg(test)]
    pub fn with_themes(engine: SamplingEngine, themes: Vec<String>) -> Self {
        Self { engine, themes }
    }

    /// Splits `total` evenly across the canonical themes, samples each
    /// share concurrently, then shuffles the merged set and truncates to
    /// `total`. A thin partition's shortfall is absorbed by the truncation
    /// rather than redistributed, so a near-empty corpus can produce a
    /// slightly undersized exam.
    pub async fn compose_exam<R: Rng + ?Sized>(
        &self,
        total: usize,
        rng: &mut R,
    ) -> Result<Vec<QuestionRecord>, CorpusError> {
        if total == 0 {
            return Ok(Vec::new());
        }

        let per_theme = total.div_ceil(self.themes.len());
        log_sampling!(exam, total = total, per_theme = per_theme);

        // Per-theme draws are independent; each gets its own rng seeded
        // from the caller's so the calls can run concurrently.
        let seeds: Vec<u64> = self.themes.iter().map(|_| rng.gen()).collect();
        let draws = self.themes.iter().zip(seeds).map(|(theme, seed)| {
            let engine = self.engine.clone();
            let theme = theme.clone();
            async move {
                let mut theme_rng = StdRng::seed_from_u64(seed);
                engine.sample(&theme, None, per_theme, &mut theme_rng).await
            }
        });

        let mut exam = Vec::with_capacity(total);
        for drawn in join_all(draws).await {
            exam.extend(drawn?);
        }

        exam.shuffle(rng);
        exam.truncate(total);
        Ok(exam)
    }
}
