use std::{convert::Infallible, sync::Arc};

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, get_service, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::services::ServeDir;

use crate::{
    config::AppConfig,
    dispatch::{self, BatchRequest, DispatchEvent},
    error::BatchError,
    export, gate,
    llm::{CompletionApi, OpenAiClient},
    models::{Model, ResultRecord},
    session::Session,
};

/**
 * \brief Shared handler state.
 * \details The service holds a single `Session` that every client shares: one accepted key, one
 *          result table. Meant for a local, single-user tool; there is no per-browser session.
 */
#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<Session>>,
    api: Arc<dyn CompletionApi>,
}

impl AppState {
    pub fn new(api: Arc<dyn CompletionApi>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            api,
        }
    }
}

/**
 * \brief Start the local HTTP service.
 * \param addr listen address, e.g. "127.0.0.1:5173"
 */
pub async fn run(addr: &str, config: &AppConfig) -> Result<()> {
    let api = OpenAiClient::from_config(config)?;
    let state = AppState::new(Arc::new(api));

    let static_service = get_service(
        ServeDir::new(&config.ui_dir).append_index_html_on_directories(true),
    );
    let app = router(state).fallback_service(static_service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/key", post(submit_key))
        .route("/api/disconnect", post(disconnect))
        .route("/api/session", get(session_status))
        .route("/api/models", get(list_models))
        .route("/api/batch", post(start_batch))
        .route("/api/results", get(full_results))
        .route("/api/results/preview", get(preview_results))
        .route("/api/results/export", get(export_results))
        .route("/api/results/reset", post(reset_results))
        .with_state(state)
}

#[derive(Deserialize)]
struct KeyInput {
    api_key: String,
}

#[derive(Deserialize, Debug)]
struct BatchInput {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
    count: u32,
}

#[derive(Serialize, Debug)]
struct SessionStatus {
    unlocked: bool,
    key_held: bool,
    results: usize,
}

#[derive(Serialize, Debug)]
struct ResultsResponse {
    count: usize,
    results: Vec<ResultRecord>,
}

type ApiError = (StatusCode, String);

fn bad_request<E: std::fmt::Display>(e: E) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn internal_err<E: std::fmt::Display>(e: E) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/**
 * \brief Credential gate: POST /api/key {api_key}
 */
async fn submit_key(
    State(state): State<AppState>,
    Json(input): Json<KeyInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut session = state.session.lock().await;
    gate::validate(state.api.as_ref(), &mut session, &input.api_key)
        .await
        .map_err(bad_request)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

async fn disconnect(State(state): State<AppState>) -> Json<SessionStatus> {
    let mut session = state.session.lock().await;
    session.disconnect();
    Json(status_of(&session))
}

async fn session_status(State(state): State<AppState>) -> Json<SessionStatus> {
    let session = state.session.lock().await;
    Json(status_of(&session))
}

fn status_of(session: &Session) -> SessionStatus {
    SessionStatus {
        unlocked: session.is_unlocked(),
        key_held: session.has_credential(),
        results: session.results().len(),
    }
}

async fn list_models() -> Json<serde_json::Value> {
    let models: Vec<&str> = Model::ALL.iter().map(|m| m.as_str()).collect();
    Json(serde_json::json!({"models": models, "default": Model::default().as_str()}))
}

/**
 * \brief Run a batch and stream its progress as SSE: POST /api/batch {prompt, model, count}
 * \details A refused batch (bad input, locked session, no key held) is answered with 400 before any
 *          stream starts. Otherwise every attempt yields a `progress` event (`ok` false on failure),
 *          failures add a `notice` event, pauses a `wait` event, and the stream ends with `done`.
 *          The session lock is taken before the response starts and held until the batch ends,
 *          so reset and append never interleave.
 */
async fn start_batch(
    State(state): State<AppState>,
    Json(input): Json<BatchInput>,
) -> Result<
    Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>,
    ApiError,
> {
    let model = match input.model.as_deref() {
        Some(m) => m.parse::<Model>().map_err(bad_request)?,
        None => Model::default(),
    };
    let request = BatchRequest::new(input.prompt, model, input.count).map_err(bad_request)?;

    let mut session = state.session.clone().lock_owned().await;
    if !session.is_unlocked() {
        return Err(bad_request(BatchError::Locked));
    }
    if !session.has_credential() {
        return Err(bad_request(BatchError::CredentialExpired));
    }

    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, Infallible>>();
    let api = state.api.clone();

    tokio::spawn(async move {
        let events = tx.clone();
        let outcome = dispatch::run_batch(&mut session, api.as_ref(), &request, move |event| {
            for sse in sse_events(&event) {
                let _ = events.send(Ok(sse));
            }
        })
        .await;

        let last = match outcome {
            Ok(summary) => Event::default()
                .event("done")
                .data(serde_json::to_string(&summary).unwrap_or_default()),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        let _ = tx.send(Ok(last));
    });

    let stream = UnboundedReceiverStream::new(rx);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}

fn sse_events(event: &DispatchEvent) -> Vec<Event> {
    match event {
        DispatchEvent::Progress {
            completed,
            count,
            notice,
        } => {
            let mut out = vec![Event::default().event("progress").data(
                serde_json::json!({
                    "index": completed,
                    "count": count,
                    "fraction": event.fraction(),
                    "ok": notice.is_none(),
                })
                .to_string(),
            )];
            if let Some(notice) = notice {
                out.push(Event::default().event("notice").data(
                    serde_json::json!({
                        "index": completed,
                        "message": format!("Error on request {}: {}", completed, notice),
                    })
                    .to_string(),
                ));
            }
            out
        }
        DispatchEvent::Pausing { delay } => vec![Event::default()
            .event("wait")
            .data(serde_json::json!({"seconds": delay.as_secs_f64()}).to_string())],
    }
}

async fn full_results(State(state): State<AppState>) -> Json<ResultsResponse> {
    let session = state.session.lock().await;
    let results = session.results().records().to_vec();
    Json(ResultsResponse {
        count: results.len(),
        results,
    })
}

async fn preview_results(State(state): State<AppState>) -> Json<ResultsResponse> {
    let session = state.session.lock().await;
    let results = export::preview(session.results().records());
    Json(ResultsResponse {
        count: results.len(),
        results,
    })
}

/**
 * \brief CSV download of the current results.
 */
async fn export_results(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let session = state.session.lock().await;
    let bytes = export::to_csv(session.results().records()).map_err(internal_err)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export::EXPORT_FILE_NAME),
            ),
        ],
        bytes,
    ))
}

async fn reset_results(State(state): State<AppState>) -> Json<SessionStatus> {
    let mut session = state.session.lock().await;
    session.reset_results();
    Json(status_of(&session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::DispatchError, llm::testing::ScriptedApi};

    const KEY: &str = "sk-abcdefghijklmnopqrstuvwxyz012345";

    async fn spawn_app(api: ScriptedApi) -> String {
        let app = router(AppState::new(Arc::new(api)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_batch_requires_unlocked_session() {
        let base = spawn_app(ScriptedApi::new(vec![Ok("a".to_string())])).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/batch", base))
            .json(&serde_json::json!({"prompt": "p", "count": 1}))
            .send()
            .await
            .expect("send");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_key_format_rejected() {
        let base = spawn_app(ScriptedApi::new(Vec::new())).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/key", base))
            .json(&serde_json::json!({"api_key": "sk-123"}))
            .send()
            .await
            .expect("send");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        assert!(resp.text().await.unwrap().contains("invalid API key format"));
    }

    #[tokio::test]
    async fn test_batch_stream_then_export_and_reset() {
        let base = spawn_app(ScriptedApi::new(vec![Err(DispatchError::Transport(
            "timeout".to_string(),
        ))]))
        .await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/key", base))
            .json(&serde_json::json!({"api_key": KEY}))
            .send()
            .await
            .expect("send key");
        assert!(resp.status().is_success());

        let body = client
            .post(format!("{}/api/batch", base))
            .json(&serde_json::json!({"prompt": "X", "model": "gpt-4", "count": 1}))
            .send()
            .await
            .expect("send batch")
            .text()
            .await
            .expect("stream body");
        assert!(body.contains("event: progress"));
        assert!(body.contains("\"ok\":false"));
        assert!(body.contains("event: notice"));
        assert!(body.contains("event: done"));
        assert!(!body.contains("event: wait"));

        let status: serde_json::Value = client
            .get(format!("{}/api/session", base))
            .send()
            .await
            .expect("status")
            .json()
            .await
            .expect("status json");
        assert_eq!(status["unlocked"], true);
        assert_eq!(status["key_held"], false);
        assert_eq!(status["results"], 1);

        let export = client
            .get(format!("{}/api/results/export", base))
            .send()
            .await
            .expect("export");
        let disposition = export
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(disposition.contains("resultats_openai.csv"));
        assert_eq!(
            export.text().await.unwrap(),
            "requête,modèle,réponse\nX,gpt-4,Error: timeout\n"
        );

        let after: serde_json::Value = client
            .post(format!("{}/api/results/reset", base))
            .send()
            .await
            .expect("reset")
            .json()
            .await
            .expect("reset json");
        assert_eq!(after["results"], 0);
    }

    #[tokio::test]
    async fn test_every_attempt_reports_progress() {
        let base = spawn_app(ScriptedApi::new(vec![
            Err(DispatchError::Transport("timeout".to_string())),
            Ok("ok".to_string()),
        ]))
        .await;
        let client = reqwest::Client::new();
        client
            .post(format!("{}/api/key", base))
            .json(&serde_json::json!({"api_key": KEY}))
            .send()
            .await
            .expect("send key");

        let body = client
            .post(format!("{}/api/batch", base))
            .json(&serde_json::json!({"prompt": "X", "count": 2}))
            .send()
            .await
            .expect("send batch")
            .text()
            .await
            .expect("stream body");

        assert_eq!(body.matches("event: progress").count(), 2);
        assert_eq!(body.matches("event: notice").count(), 1);
        assert_eq!(body.matches("event: wait").count(), 1);
        assert_eq!(body.matches("\"ok\":false").count(), 1);
        assert_eq!(body.matches("\"ok\":true").count(), 1);
        let progress_at = body.find("event: progress").unwrap();
        let notice_at = body.find("event: notice").unwrap();
        assert!(progress_at < notice_at);
        assert!(body.contains("\"failures\":1"));
    }

    #[tokio::test]
    async fn test_unknown_model_rejected() {
        let base = spawn_app(ScriptedApi::new(Vec::new())).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/batch", base))
            .json(&serde_json::json!({"prompt": "p", "model": "davinci", "count": 1}))
            .send()
            .await
            .expect("send");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        assert!(resp.text().await.unwrap().contains("unknown model"));
    }
}
