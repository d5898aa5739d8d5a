use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::ai_source::AiQuestionSource;
use crate::config::SessionConfig;
use crate::database::{Database, QuestionFilter, WriteOp, MAX_OPS_PER_BATCH};
use crate::dedup::{find_duplicate_groups, SeenKeys};
use crate::errors::{classify_store_error, CorpusError, ErrorContext};
use crate::import::ImportService;
use crate::models::{
    AiGenerateRequest, Attempt, CreateAttemptRequest, DedupReport, ExamParams, ImportBatchResult,
    ImportRowsRequest, QuestionRecord, SampleParams,
};
use crate::review::ReviewSelector;
use crate::sampling::{ExamComposer, SamplingEngine};

/// Uniform response envelope for all API endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub import: ImportService,
    pub sampler: SamplingEngine,
    pub composer: ExamComposer,
    pub review: ReviewSelector,
    pub ai: AiQuestionSource,
    pub session: SessionConfig,
}

impl AppState {
    pub fn new(db: Database, ai: AiQuestionSource, session: SessionConfig) -> Self {
        let sampler = SamplingEngine::new(db.clone());
        Self {
            import: ImportService::with_batch_limit(db.clone(), session.write_batch_limit),
            composer: ExamComposer::new(sampler.clone()),
            review: ReviewSelector::new(db.clone()),
            sampler,
            ai,
            session,
            db,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/import/csv", post(import_csv))
        .route("/api/import/rows", post(import_rows))
        .route("/api/questions/sample", get(sample_questions))
        .route("/api/questions/:id/toggle-active", post(toggle_question))
        .route("/api/questions/:id", delete(delete_question))
        .route("/api/exam", get(compose_exam))
        .route("/api/review/:user_id", get(review_questions))
        .route("/api/attempts", post(create_attempt))
        .route("/api/attempts/:user_id", get(get_attempts))
        .route("/api/corpus/dedup", post(dedup_corpus))
        .route("/api/ai/generate", post(generate_questions))
        .with_state(state)
}

async fn health_check() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "status": "healthy",
        "service": "quiz-corpus"
    })))
}

/// Imports a raw CSV body. Row-level problems become counters in the
/// result; only a failed commit aborts the run.
async fn import_csv(State(state): State<AppState>, body: String) -> ApiResult<ImportBatchResult> {
    match state.import.import_csv(&body).await {
        Ok(result) => Ok(Json(ApiResponse::success(result))),
        Err(e) => Err(e.to_response_with_context(ErrorContext::new("import_csv", "question"))),
    }
}

async fn import_rows(
    State(state): State<AppState>,
    Json(request): Json<ImportRowsRequest>,
) -> ApiResult<ImportBatchResult> {
    match state.import.import_rows(request.rows).await {
        Ok(result) => Ok(Json(ApiResponse::success(result))),
        Err(e) => Err(e.to_response_with_context(ErrorContext::new("import_rows", "question"))),
    }
}

/// Draws a random question set for one theme, optionally biased to a level.
async fn sample_questions(
    State(state): State<AppState>,
    Query(params): Query<SampleParams>,
) -> ApiResult<Vec<QuestionRecord>> {
    let count = params.count.unwrap_or(state.session.default_sample_count);
    let mut rng = StdRng::from_entropy();

    let result = state
        .sampler
        .sample(&params.theme, params.level.as_deref(), count, &mut rng)
        .await
        .and_then(|questions| {
            if questions.is_empty() {
                Err(CorpusError::EmptyResult(format!(
                    "no active questions for theme '{}'",
                    params.theme
                )))
            } else {
                Ok(questions)
            }
        });

    match result {
        Ok(questions) => Ok(Json(ApiResponse::success(questions))),
        Err(e) => Err(e.to_response_with_context(
            ErrorContext::new("sample_questions", "question").with_id(&params.theme),
        )),
    }
}

/// Composes a theme-balanced exam set.
async fn compose_exam(
    State(state): State<AppState>,
    Query(params): Query<ExamParams>,
) -> ApiResult<Vec<QuestionRecord>> {
    let total = params.count.unwrap_or(state.session.exam_question_count);
    let mut rng = StdRng::from_entropy();

    let result = state
        .composer
        .compose_exam(total, &mut rng)
        .await
        .and_then(|questions| {
            if questions.is_empty() {
                Err(CorpusError::EmptyResult(
                    "the corpus has no active questions".to_string(),
                ))
            } else {
                Ok(questions)
            }
        });

    match result {
        Ok(questions) => Ok(Json(ApiResponse::success(questions))),
        Err(e) => Err(e.to_response_with_context(ErrorContext::new("compose_exam", "exam"))),
    }
}

async fn review_questions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<QuestionRecord>> {
    match state.review.review_questions(&user_id).await {
        Ok(questions) => Ok(Json(ApiResponse::success(questions))),
        Err(e) => Err(e.to_response_with_context(
            ErrorContext::new("review_questions", "attempt").with_id(&user_id),
        )),
    }
}

/// Records a finished attempt. The caller-computed score is re-checked
/// against the answer list before anything is written.
async fn create_attempt(
    State(state): State<AppState>,
    Json(request): Json<CreateAttemptRequest>,
) -> ApiResult<Attempt> {
    let attempt = Attempt {
        id: Uuid::new_v4(),
        user_id: request.user_id,
        exam_type: request.exam_type,
        theme: request.theme,
        score: request.score,
        total_questions: request.total_questions,
        time_spent: request.time_spent,
        answers: request.answers,
        created_at: chrono::Utc::now(),
    };

    if let Err(reason) = attempt.check_invariants() {
        return Err(CorpusError::Validation(reason).to_response_with_context(
            ErrorContext::new("create_attempt", "attempt").with_id(&attempt.user_id),
        ));
    }

    match state.db.insert_attempt(&attempt).await {
        Ok(()) => Ok(Json(ApiResponse::success(attempt))),
        Err(e) => Err(classify_store_error(&e).to_response_with_context(
            ErrorContext::new("create_attempt", "attempt").with_id(&attempt.user_id),
        )),
    }
}

async fn get_attempts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<Attempt>> {
    match state.db.attempts_for_user(&user_id).await {
        Ok(attempts) => Ok(Json(ApiResponse::success(attempts))),
        Err(e) => Err(classify_store_error(&e).to_response_with_context(
            ErrorContext::new("get_attempts", "attempt").with_id(&user_id),
        )),
    }
}

/// Bulk corpus clean: groups records by normalized question text and
/// deletes every record but the first-seen keeper of each group.
async fn dedup_corpus(State(state): State<AppState>) -> ApiResult<DedupReport> {
    match run_dedup(&state).await {
        Ok(report) => Ok(Json(ApiResponse::success(report))),
        Err(e) => Err(e.to_response_with_context(ErrorContext::new("dedup_corpus", "question"))),
    }
}

async fn run_dedup(state: &AppState) -> Result<DedupReport, CorpusError> {
    let all = state
        .db
        .query_questions(&QuestionFilter::default())
        .await
        .map_err(|e| classify_store_error(&e))?;

    let groups = find_duplicate_groups(&all);
    let mut deletes: Vec<WriteOp> = Vec::new();
    let mut kept = Vec::with_capacity(groups.len());
    for group in &groups {
        kept.push(group.keeper().id);
        deletes.extend(group.redundant().iter().map(|q| WriteOp::Delete(q.id)));
    }
    let removed = deletes.len();

    // One group can exceed the write ceiling on a badly polluted corpus;
    // deletes are independent, so chunking keeps each batch atomic enough.
    for chunk in deletes.chunks(MAX_OPS_PER_BATCH) {
        state
            .db
            .batch_write(chunk.to_vec())
            .await
            .map_err(|e| classify_store_error(&e))?;
    }

    info!(
        groups = groups.len(),
        removed = removed,
        "Corpus deduplication finished"
    );
    Ok(DedupReport {
        groups: groups.len(),
        removed,
        kept,
    })
}

/// Flips a question's active flag. Deactivated questions stay stored but
/// drop out of sampling, exams and review.
async fn toggle_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let context = || ErrorContext::new("toggle_question", "question").with_id(&id.to_string());

    let question = match state.db.get_question(id).await {
        Ok(Some(q)) => q,
        Ok(None) => {
            return Err(CorpusError::NotFound(id.to_string()).to_response_with_context(context()))
        }
        Err(e) => return Err(classify_store_error(&e).to_response_with_context(context())),
    };

    let next = !question.is_active;
    match state.db.set_question_active(id, next).await {
        Ok(_) => Ok(Json(ApiResponse::success(json!({
            "id": id,
            "is_active": next
        })))),
        Err(e) => Err(classify_store_error(&e).to_response_with_context(context())),
    }
}

async fn delete_question(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Value> {
    let context = || ErrorContext::new("delete_question", "question").with_id(&id.to_string());

    match state.db.get_question(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err(CorpusError::NotFound(id.to_string()).to_response_with_context(context()))
        }
        Err(e) => return Err(classify_store_error(&e).to_response_with_context(context())),
    }

    match state.db.batch_write(vec![WriteOp::Delete(id)]).await {
        Ok(()) => Ok(Json(ApiResponse::success(json!({ "deleted": id })))),
        Err(e) => Err(classify_store_error(&e).to_response_with_context(context())),
    }
}

/// Requests AI-generated questions for a theme and folds the valid,
/// non-duplicate ones into the corpus.
async fn generate_questions(
    State(state): State<AppState>,
    Json(request): Json<AiGenerateRequest>,
) -> ApiResult<Vec<QuestionRecord>> {
    let context = || ErrorContext::new("generate_questions", "question").with_id(&request.theme);
    let level = request.level.as_deref().unwrap_or("moyen");
    let count = request.count.unwrap_or(state.session.default_sample_count);

    let generated = match state.ai.generate(&request.theme, level, count).await {
        Ok(records) => records,
        Err(e) => return Err(e.to_response_with_context(context())),
    };

    // Generated text goes through the same duplicate gate as imports so a
    // repetitive model cannot pollute the theme partition.
    match persist_generated(state.clone(), generated).await {
        Ok(fresh) => Ok(Json(ApiResponse::success(fresh))),
        Err(e) => Err(e.to_response_with_context(context())),
    }
}

async fn persist_generated(
    state: AppState,
    generated: Vec<QuestionRecord>,
) -> Result<Vec<QuestionRecord>, CorpusError> {
    let existing = state
        .db
        .query_questions(&QuestionFilter::default())
        .await
        .map_err(|e| classify_store_error(&e))?;
    let mut seen = SeenKeys::from_questions(existing.iter().map(|q| q.question.as_str()));

    let mut fresh = Vec::with_capacity(generated.len());
    for record in generated {
        if seen.contains(&record.question) {
            continue;
        }
        seen.insert(&record.question);
        fresh.push(record);
    }

    if !fresh.is_empty() {
        let ops: Vec<WriteOp> = fresh
            .iter()
            .map(|q| WriteOp::Set(Box::new(q.clone())))
            .collect();
        for chunk in ops.chunks(MAX_OPS_PER_BATCH) {
            state
                .db
                .batch_write(chunk.to_vec())
                .await
                .map_err(|e| classify_store_error(&e))?;
        }
    }

    info!(
        stored = fresh.len(),
        "Stored AI-generated questions after duplicate gate"
    );
    Ok(fresh)
}
