use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Attempt, QuestionRecord};

/// Store-side ceiling on operations per atomic write batch.
pub const MAX_OPS_PER_BATCH: usize = 500;

/// One operation inside an atomic write batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Set(Box<QuestionRecord>),
    Delete(Uuid),
}

/// Equality/range filter for question queries. Results always come back
/// ordered by primary key ascending, which is what the sampling engine's
/// range-plus-wraparound draw relies on.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub theme: Option<String>,
    pub active_only: bool,
    /// Range lower bound on the primary key (inclusive).
    pub min_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl QuestionFilter {
    pub fn theme(theme: &str) -> Self {
        QuestionFilter {
            theme: Some(theme.to_string()),
            active_only: true,
            ..Default::default()
        }
    }
}

/// Corpus store over SQLite. The question side exposes only the four
/// operation shapes the engine assumes of its backing store: filtered
/// range queries ordered by key, batched atomic writes, get-by-key and
/// server-side counts.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id TEXT PRIMARY KEY,
                theme TEXT NOT NULL,
                level TEXT NOT NULL,
                exam_type TEXT NOT NULL,
                question TEXT NOT NULL,
                choices TEXT NOT NULL,
                correct_index INTEGER NOT NULL,
                explanation TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                is_active INTEGER NOT NULL DEFAULT 1,
                source TEXT,
                reference TEXT,
                original_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_questions_theme_id ON questions(theme, id);",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS attempts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                exam_type TEXT NOT NULL,
                theme TEXT,
                score INTEGER NOT NULL,
                total_questions INTEGER NOT NULL,
                time_spent INTEGER NOT NULL,
                answers TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_attempts_user ON attempts(user_id, created_at);",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Question operations

    /// Filtered query ordered by primary key ascending.
    pub async fn query_questions(&self, filter: &QuestionFilter) -> Result<Vec<QuestionRecord>> {
        let mut sql = String::from("SELECT * FROM questions WHERE 1=1");
        if filter.theme.is_some() {
            sql.push_str(" AND theme = ?");
        }
        if filter.active_only {
            sql.push_str(" AND is_active = 1");
        }
        if filter.min_id.is_some() {
            sql.push_str(" AND id >= ?");
        }
        sql.push_str(" ORDER BY id ASC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(theme) = &filter.theme {
            query = query.bind(theme);
        }
        if let Some(min_id) = &filter.min_id {
            query = query.bind(min_id.to_string());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows_to_questions(rows)
    }

    pub async fn get_question(&self, id: Uuid) -> Result<Option<QuestionRecord>> {
        let row = sqlx::query("SELECT * FROM questions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_question(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn count_questions(&self, theme: Option<&str>) -> Result<i64> {
        let count: i64 = match theme {
            Some(theme) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM questions WHERE theme = ?1 AND is_active = 1",
                )
                .bind(theme)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE is_active = 1")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Commits one atomic write batch. Rejects batches over the store's
    /// per-request ceiling; callers chunk before committing.
    pub async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.len() > MAX_OPS_PER_BATCH {
            return Err(anyhow!(
                "write batch of {} ops exceeds the {}-op ceiling",
                ops.len(),
                MAX_OPS_PER_BATCH
            ));
        }
        let op_count = ops.len();

        let mut tx = self.pool.begin().await?;
        for op in ops {
            match op {
                WriteOp::Set(record) => {
                    sqlx::query(
                        r#"
                        INSERT OR REPLACE INTO questions
                            (id, theme, level, exam_type, question, choices, correct_index,
                             explanation, tags, is_active, source, reference, original_id,
                             created_at, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                        "#,
                    )
                    .bind(record.id.to_string())
                    .bind(&record.theme)
                    .bind(&record.level)
                    .bind(&record.exam_type)
                    .bind(&record.question)
                    .bind(serde_json::to_string(&record.choices)?)
                    .bind(record.correct_index as i64)
                    .bind(&record.explanation)
                    .bind(serde_json::to_string(&record.tags)?)
                    .bind(record.is_active)
                    .bind(&record.source)
                    .bind(&record.reference)
                    .bind(&record.original_id)
                    .bind(record.created_at.to_rfc3339())
                    .bind(record.updated_at.to_rfc3339())
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Delete(id) => {
                    sqlx::query("DELETE FROM questions WHERE id = ?1")
                        .bind(id.to_string())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;

        crate::log_db_operation!(debug, "batch_write", count = op_count);
        Ok(())
    }

    /// Soft-delete toggle. Physical deletion only happens through an
    /// explicit admin purge batch.
    pub async fn set_question_active(&self, id: Uuid, is_active: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE questions SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(is_active)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Attempt operations

    pub async fn insert_attempt(&self, attempt: &Attempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attempts
                (id, user_id, exam_type, theme, score, total_questions, time_spent,
                 answers, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(attempt.id.to_string())
        .bind(&attempt.user_id)
        .bind(&attempt.exam_type)
        .bind(&attempt.theme)
        .bind(attempt.score as i64)
        .bind(attempt.total_questions as i64)
        .bind(attempt.time_spent as i64)
        .bind(serde_json::to_string(&attempt.answers)?)
        .bind(attempt.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All of a user's attempts, oldest first. The review selector's replay
    /// depends on this ordering.
    pub async fn attempts_for_user(&self, user_id: &str) -> Result<Vec<Attempt>> {
        let rows = sqlx::query(
            "SELECT * FROM attempts WHERE user_id = ?1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in rows {
            attempts.push(Attempt {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                user_id: row.get("user_id"),
                exam_type: row.get("exam_type"),
                theme: row.get("theme"),
                score: row.get::<i64, _>("score") as u32,
                total_questions: row.get::<i64, _>("total_questions") as u32,
                time_spent: row.get::<i64, _>("time_spent") as u32,
                answers: serde_json::from_str(&row.get::<String, _>("answers"))?,
                created_at: chrono::DateTime::parse_from_rfc3339(
                    &row.get::<String, _>("created_at"),
                )?
                .with_timezone(&Utc),
            });
        }
        Ok(attempts)
    }
}

fn row_to_question(row: &sqlx::sqlite::SqliteRow) -> Result<QuestionRecord> {
    Ok(QuestionRecord {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        theme: row.get("theme"),
        level: row.get("level"),
        exam_type: row.get("exam_type"),
        question: row.get("question"),
        choices: serde_json::from_str(&row.get::<String, _>("choices"))?,
        correct_index: row.get::<i64, _>("correct_index") as usize,
        explanation: row.get("explanation"),
        tags: serde_json::from_str(&row.get::<String, _>("tags"))?,
        is_active: row.get("is_active"),
        source: row.get("source"),
        reference: row.get("reference"),
        original_id: row.get("original_id"),
        created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))?
            .with_timezone(&Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("updated_at"))?
            .with_timezone(&Utc),
    })
}

fn rows_to_questions(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<QuestionRecord>> {
    let mut questions = Vec::with_capacity(rows.len());
    for row in rows {
        questions.push(row_to_question(&row)?);
    }
    Ok(questions)
}
