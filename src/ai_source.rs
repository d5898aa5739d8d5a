use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::AiConfig;
use crate::errors::CorpusError;
use crate::models::QuestionRecord;
use crate::normalize::{lookup_level, lookup_theme};
use chrono::Utc;
use uuid::Uuid;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Fixed reply schema the external endpoint is expected to honor.
#[derive(Debug, Clone, Deserialize)]
pub struct AiQuizPayload {
    pub metadata: AiQuizMetadata,
    pub questions: Vec<AiQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiQuizMetadata {
    pub niveau: String,
    pub theme: String,
    pub module: Option<String>,
    pub nb_questions: usize,
    pub seuil_reussite: Option<f64>,
    pub duree_recommandee: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correcte: usize,
    pub explication: Option<String>,
    pub competence: Option<String>,
    #[serde(alias = "difficulté")]
    pub difficulte: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

/// Client for the external AI question endpoint. Replies are validated
/// against the fixed schema before any record is built; a violation
/// discards the whole batch.
#[derive(Clone)]
pub struct AiQuestionSource {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AiQuestionSource {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    /// Requests a generated quiz and maps it into question records. The
    /// records flow through the normal paths afterwards; nothing else in
    /// the engine special-cases their origin.
    pub async fn generate(
        &self,
        theme: &str,
        level: &str,
        count: usize,
    ) -> Result<Vec<QuestionRecord>, CorpusError> {
        let prompt = format!(
            r#"Génère un quiz de {count} questions à choix multiples sur le thème "{theme}" (niveau {level}) pour la préparation à l'examen civique français.

Réponds uniquement avec un objet JSON de ce format exact:
{{
    "metadata": {{"niveau": "{level}", "theme": "{theme}", "module": "civique", "nb_questions": {count}, "seuil_reussite": 0.8, "duree_recommandee": 600}},
    "questions": [
        {{"question": "…", "options": ["…", "…", "…", "…"], "correcte": 0, "explication": "…", "competence": "…", "difficulté": "{level}"}}
    ]
}}

"correcte" est l'index 0-based de la bonne réponse dans "options"."#
        );

        info!(
            model = %self.model,
            theme = %theme,
            level = %level,
            count = count,
            "Requesting AI-generated quiz"
        );

        let request_body = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| CorpusError::MalformedSourceData(format!("AI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "AI endpoint request failed");
            return Err(CorpusError::MalformedSourceData(format!(
                "AI endpoint returned {}: {}",
                status, error_text
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            CorpusError::MalformedSourceData(format!("unreadable AI reply envelope: {}", e))
        })?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| {
                CorpusError::MalformedSourceData("AI reply contained no choices".to_string())
            })?;

        debug!(response_length = content.len(), "Raw AI quiz reply");
        parse_generated_quiz(&content, theme, count)
    }
}

/// Extracts JSON from replies that may be wrapped in markdown fences or
/// surrounding prose.
fn extract_json(content: &str) -> &str {
    if let Some(start) = content.find("```json") {
        if let Some(end) = content[start + 7..].find("```") {
            return content[start + 7..start + 7 + end].trim();
        }
    }
    if let Some(start) = content.find('{') {
        if let Some(end) = content.rfind('}') {
            if end > start {
                return &content[start..=end];
            }
        }
    }
    content.trim()
}

/// Validates an AI reply body against the fixed schema and maps it into
/// question records. Any violation rejects the entire batch; partial
/// acceptance would let one bad entry poison a session.
pub fn parse_generated_quiz(
    body: &str,
    requested_theme: &str,
    requested_count: usize,
) -> Result<Vec<QuestionRecord>, CorpusError> {
    let payload: AiQuizPayload = serde_json::from_str(extract_json(body))
        .map_err(|e| CorpusError::MalformedSourceData(format!("schema violation: {}", e)))?;

    if payload.questions.is_empty() {
        return Err(CorpusError::MalformedSourceData(
            "AI reply contained no questions".to_string(),
        ));
    }
    if payload.questions.len() < requested_count {
        return Err(CorpusError::MalformedSourceData(format!(
            "AI reply contained {} questions, {} requested",
            payload.questions.len(),
            requested_count
        )));
    }

    let theme = lookup_theme(if payload.metadata.theme.is_empty() {
        requested_theme
    } else {
        &payload.metadata.theme
    });
    let level = lookup_level(&payload.metadata.niveau);
    let now = Utc::now();

    let mut records = Vec::with_capacity(payload.questions.len());
    for (i, q) in payload.questions.into_iter().enumerate() {
        if q.question.trim().is_empty() {
            return Err(CorpusError::MalformedSourceData(format!(
                "question {} has empty text",
                i
            )));
        }
        let usable: Vec<&str> = q
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .collect();
        if usable.len() < 2 || q.options.len() > 6 {
            return Err(CorpusError::MalformedSourceData(format!(
                "question {} has {} usable options",
                i,
                usable.len()
            )));
        }
        let mut distinct = std::collections::HashSet::new();
        if !usable.iter().all(|o| distinct.insert(*o)) {
            return Err(CorpusError::MalformedSourceData(format!(
                "question {} repeats an option",
                i
            )));
        }
        if q.correcte >= q.options.len() {
            return Err(CorpusError::MalformedSourceData(format!(
                "question {} has correct index {} out of range for {} options",
                i,
                q.correcte,
                q.options.len()
            )));
        }

        records.push(QuestionRecord {
            id: Uuid::new_v4(),
            theme: theme.clone(),
            level: q
                .difficulte
                .as_deref()
                .map(lookup_level)
                .unwrap_or_else(|| level.clone()),
            exam_type: crate::import::DEFAULT_EXAM_TYPE.to_string(),
            question: q.question,
            choices: q.options,
            correct_index: q.correcte,
            explanation: q.explication,
            tags: q.competence.into_iter().collect(),
            is_active: true,
            source: Some("ai".to_string()),
            reference: payload.metadata.module.clone(),
            original_id: None,
            created_at: now,
            updated_at: now,
        });
    }

    Ok(records)
}
