use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rb_core::{
    ChatMessage, Error, Paper, PaperSource, PaperWithAnalysis, SearchRequest, SearchSession, SearchStatus,
    SessionFilter,
};
use rb_report::{render_pdf, report_filename, ReportInput};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::{jobs, AppState};

pub const USER_HEADER: &str = "x-user-id";
const ANONYMOUS: &str = "anonymous";
const NO_PAPERS: &str = "No papers found for the given query";

fn user_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    Ok(payload?.0)
}

fn default_sources() -> Vec<PaperSource> {
    PaperSource::defaults()
}

/// Search on behalf of an analyze or report endpoint; finding nothing is a 404.
async fn find_papers(
    state: &AppState,
    user: &str,
    query: &str,
    sources: Vec<PaperSource>,
    max_papers: usize,
) -> ApiResult<Vec<Paper>> {
    let request = SearchRequest::new(query, sources, max_papers);
    request.validate()?;
    state.aggregator.check_quotas(&request.sources, user)?;
    let result = state.aggregator.search(&request, user).await;
    if result.papers.is_empty() {
        return Err(Error::NotFound(NO_PAPERS.to_string()).into());
    }
    Ok(result.papers)
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "ResearchBuddy API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}

#[derive(Serialize)]
pub struct SourceInfo {
    id: PaperSource,
    name: &'static str,
    description: &'static str,
    available: bool,
}

pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<Vec<SourceInfo>> {
    let available = state.aggregator.available_sources();
    Json(
        PaperSource::ALL
            .iter()
            .map(|source| SourceInfo {
                id: *source,
                name: source.display_name(),
                description: source.description(),
                available: available.contains(source),
            })
            .collect(),
    )
}

fn five() -> usize {
    5
}

fn ten() -> usize {
    10
}

fn eight() -> usize {
    8
}

fn twelve() -> u32 {
    12
}

#[derive(Deserialize)]
pub struct AnalyzePapersBody {
    query: String,
    #[serde(default = "five")]
    max_papers: usize,
    #[serde(default = "default_sources")]
    sources: Vec<PaperSource>,
}

pub async fn analyze_papers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AnalyzePapersBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let req = body(payload)?;
    let user = user_id(&headers);
    let papers = find_papers(&state, &user, &req.query, req.sources, req.max_papers).await?;
    let papers_found = papers.len();
    let results = state.analysis.analyze_batch(papers).await;
    let generated = results.iter().filter(|r| r.analysis.is_some()).count();

    Ok(Json(json!({
        "query": req.query,
        "papers_found": papers_found,
        "analyses_generated": generated,
        "results": results,
    })))
}

#[derive(Deserialize)]
pub struct ResearchGapsBody {
    query: String,
    research_domain: String,
    #[serde(default = "ten")]
    max_papers: usize,
    #[serde(default = "default_sources")]
    sources: Vec<PaperSource>,
}

pub async fn research_gaps(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ResearchGapsBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let req = body(payload)?;
    let user = user_id(&headers);
    let papers = find_papers(&state, &user, &req.query, req.sources, req.max_papers).await?;
    let gaps = state.analysis.research_gaps(&papers, &req.research_domain).await?;

    Ok(Json(json!({
        "query": req.query,
        "research_domain": req.research_domain,
        "papers_analyzed": papers.len(),
        "research_gaps": gaps,
    })))
}

#[derive(Deserialize)]
pub struct ResearchScopeBody {
    query: String,
    research_question: String,
    #[serde(default = "twelve")]
    timeline_months: u32,
    #[serde(default = "ten")]
    max_papers: usize,
    #[serde(default = "default_sources")]
    sources: Vec<PaperSource>,
}

pub async fn research_scope(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ResearchScopeBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let req = body(payload)?;
    if req.timeline_months == 0 {
        return Err(ApiError::BadRequest("timeline_months must be at least 1".to_string()));
    }
    let user = user_id(&headers);
    let papers = find_papers(&state, &user, &req.query, req.sources, req.max_papers).await?;
    let scope = state
        .analysis
        .research_scope(&papers, &req.research_question, req.timeline_months)
        .await?;

    Ok(Json(json!({
        "query": req.query,
        "research_question": req.research_question,
        "timeline_months": req.timeline_months,
        "papers_analyzed": papers.len(),
        "research_scope": scope,
    })))
}

fn yes() -> bool {
    true
}

#[derive(Deserialize)]
pub struct ReportBody {
    query: String,
    report_title: String,
    #[serde(default)]
    research_question: Option<String>,
    #[serde(default)]
    research_domain: Option<String>,
    #[serde(default = "eight")]
    max_papers: usize,
    #[serde(default = "twelve")]
    timeline_months: u32,
    #[serde(default = "yes")]
    include_analysis: bool,
    #[serde(default = "yes")]
    include_gaps: bool,
    #[serde(default = "yes")]
    include_scope: bool,
    #[serde(default = "default_sources")]
    sources: Vec<PaperSource>,
}

pub async fn comprehensive_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ReportBody>, JsonRejection>,
) -> ApiResult<Response> {
    let req = body(payload)?;
    let user = user_id(&headers);
    let papers = find_papers(&state, &user, &req.query, req.sources, req.max_papers).await?;

    let gaps = if req.include_gaps {
        let domain = req.research_domain.as_deref().unwrap_or(&req.query);
        match state.analysis.research_gaps(&papers, domain).await {
            Ok(gaps) => Some(gaps),
            Err(e) => {
                tracing::warn!("Leaving research gaps out of the report: {}", e);
                None
            }
        }
    } else {
        None
    };
    let scope = if req.include_scope {
        let question = req.research_question.as_deref().unwrap_or(&req.query);
        match state.analysis.research_scope(&papers, question, req.timeline_months.max(1)).await {
            Ok(scope) => Some(scope),
            Err(e) => {
                tracing::warn!("Leaving research scope out of the report: {}", e);
                None
            }
        }
    } else {
        None
    };
    let papers = if req.include_analysis {
        state.analysis.analyze_batch(papers).await
    } else {
        papers.into_iter().map(PaperWithAnalysis::bare).collect()
    };

    let input = ReportInput {
        title: req.report_title,
        query: req.query.clone(),
        papers,
        gaps,
        scope,
    };
    let pdf = tokio::task::spawn_blocking(move || render_pdf(&input))
        .await
        .map_err(|e| Error::Report(e.to_string()))??;

    let disposition = format!("attachment; filename=\"{}\"", report_filename(&req.query));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}

pub async fn start_search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = body(payload)?;
    request.validate()?;
    let user = user_id(&headers);
    state.aggregator.check_quotas(&request.sources, &user)?;

    let session = SearchSession::new(user, &request);
    state.store.create_session(&session).await?;
    let session_id = session.session_id.clone();
    tracing::info!("Session {} queued for '{}'", session_id, session.query);
    tokio::spawn(jobs::run_search(state.clone(), session));

    Ok(Json(json!({
        "session_id": session_id,
        "status": SearchStatus::Pending,
        "message": "Search started",
    })))
}

async fn load_session(state: &AppState, user: &str, session_id: &str) -> ApiResult<SearchSession> {
    state
        .store
        .get_session(user, session_id)
        .await?
        .ok_or_else(|| Error::NotFound("Session not found".to_string()).into())
}

pub async fn search_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = load_session(&state, &user_id(&headers), &session_id).await?;
    Ok(Json(json!(session.status_view())))
}

pub async fn search_results(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = load_session(&state, &user_id(&headers), &session_id).await?;
    Ok(Json(json!({
        "session": session.status_view(),
        "papers": session.papers,
    })))
}

#[derive(Deserialize)]
pub struct SessionsQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    status: Option<String>,
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<SessionsQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let filter = SessionFilter {
        limit: query.limit.unwrap_or(SessionFilter::default().limit).clamp(1, 100),
        status: query.status.as_deref().map(str::parse).transpose()?,
    };
    let sessions = state.store.list_sessions(&user_id(&headers), filter).await?;
    let views: Vec<_> = sessions.iter().map(SearchSession::status_view).collect();
    Ok(Json(json!(views)))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.store.delete_session(&user_id(&headers), &session_id).await? {
        return Err(Error::NotFound("Session not found".to_string()).into());
    }
    Ok(Json(json!({ "message": "Session deleted successfully" })))
}

#[derive(Deserialize)]
pub struct ChatBody {
    message: String,
    #[serde(default)]
    paper: Option<Paper>,
}

#[derive(Serialize)]
pub struct ChatReply {
    message_id: String,
    response: String,
    paper_id: String,
    timestamp: chrono::DateTime<Utc>,
}

pub async fn chat_with_paper(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(paper_id): Path<String>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> ApiResult<Json<ChatReply>> {
    let req = body(payload)?;
    let message = rb_inference::chat::validate_message(&req.message)?.to_string();
    let user = user_id(&headers);

    let paper = match req.paper {
        Some(paper) => paper,
        None => state
            .store
            .find_paper(&user, &paper_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Paper {} not found", paper_id)))?,
    };

    let history = state.store.chat_history(&user, &paper_id).await?;
    let response = state.chat.reply(&paper, &history, &message).await?;

    let question = ChatMessage::user(message);
    let answer = ChatMessage::assistant(response);
    state
        .store
        .append_chat(
            &user,
            &paper_id,
            &[question, answer.clone()],
            state.config.chat_history_limit,
        )
        .await?;

    Ok(Json(ChatReply {
        message_id: answer.message_id,
        response: answer.content,
        paper_id,
        timestamp: answer.timestamp,
    }))
}

pub async fn chat_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(paper_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let messages = state.store.chat_history(&user_id(&headers), &paper_id).await?;
    Ok(Json(json!({
        "paper_id": paper_id,
        "total_messages": messages.len(),
        "messages": messages,
    })))
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not Found" })))
}
