//! Statement Extractor - financial-statement transaction extraction server.

mod config;
mod decode;
mod error;
mod modality;
mod normalize;
mod ocr;
mod pdf;
mod pipeline;
mod refine;
mod schema;
mod validate;
mod vision;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Json,
    routing::{get, post},
    Router,
};
use config::Settings;
use error::ExtractError;
use ocr::SidecarClient;
use pipeline::Pipeline;
use refine::LlmRefiner;
use schema::PipelineResult;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vision::VisionClient;

/// Application state shared across handlers. Read-only after startup.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    settings: Arc<Settings>,
    http: reqwest::Client,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "statement_extractor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Arc::new(Settings::from_env());
    if settings.gemini_api_key.is_none() {
        info!("GEMINI_API_KEY not set; vision endpoint will answer 503");
    }

    let http = reqwest::Client::new();
    let sidecar = SidecarClient::new(http.clone(), settings.ocr_sidecar_url.clone());
    let vision = VisionClient::new(http.clone(), &settings);

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(sidecar.clone()),
        Arc::new(sidecar),
        Arc::new(LlmRefiner::new(vision.clone())),
        vision,
    ));

    let state = AppState {
        pipeline,
        settings: settings.clone(),
        http,
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/process-document", post(process_document_upload))
        .route("/process-document/url", post(process_document_url))
        .route("/extract-transactions", post(extract_transactions))
        // Slack above the payload limit covers multipart framing; the
        // explicit size guard produces the structured 413.
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes + 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "service": "statement-extractor"}))
}

#[derive(serde::Deserialize)]
struct UrlRequest {
    file_url: String,
    #[serde(default)]
    bank_name: Option<String>,
}

/// Extract transactions from a multipart upload (or a `file_url` form field).
async fn process_document_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PipelineResult>, ExtractError> {
    let upload = read_upload(multipart).await?;
    let (data, source_name) = resolve_input(&state, upload).await?;

    info!("Processing '{}' ({} bytes)", source_name, data.len());
    let result = state.pipeline.process(&data).await?;
    Ok(Json(result))
}

/// Extract transactions from a URL-hosted document (JSON body).
async fn process_document_url(
    State(state): State<AppState>,
    Json(body): Json<UrlRequest>,
) -> Result<Json<PipelineResult>, ExtractError> {
    if let Some(bank) = &body.bank_name {
        info!("Bank hint provided: {}", bank);
    }
    let data = fetch_file_from_url(&state, &body.file_url).await?;
    guard_size(&state, data.len())?;

    info!("Processing '{}' ({} bytes)", body.file_url, data.len());
    let result = state.pipeline.process(&data).await?;
    Ok(Json(result))
}

/// Vision path: one statement image through the multimodal model.
async fn extract_transactions(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PipelineResult>, ExtractError> {
    let upload = read_upload(multipart).await?;
    let (data, source_name) = resolve_input(&state, upload).await?;

    info!("Vision extraction for '{}' ({} bytes)", source_name, data.len());
    let result = state.pipeline.process_vision(&data).await?;
    Ok(Json(result))
}

// ============================================================================
// Input resolution
// ============================================================================

struct Upload {
    file: Option<(Vec<u8>, String)>,
    file_url: Option<String>,
    bank_name: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ExtractError> {
    let mut upload = Upload {
        file: None,
        file_url: None,
        bank_name: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ExtractError::BadRequest(format!("multipart error: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ExtractError::BadRequest(format!("failed to read file: {}", e)))?
                    .to_vec();
                upload.file = Some((data, filename));
            }
            Some("file_url") => {
                upload.file_url = field.text().await.ok().filter(|s| !s.is_empty());
            }
            Some("bank_name") => {
                upload.bank_name = field.text().await.ok().filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    Ok(upload)
}

/// Resolve either an uploaded file or a URL to raw bytes, with the size
/// guard applied before any parsing begins.
async fn resolve_input(
    state: &AppState,
    upload: Upload,
) -> Result<(Vec<u8>, String), ExtractError> {
    if let Some(bank) = &upload.bank_name {
        info!("Bank hint provided: {}", bank);
    }

    if let Some((data, filename)) = upload.file {
        guard_size(state, data.len())?;
        return Ok((data, filename));
    }

    if let Some(url) = upload.file_url {
        let data = fetch_file_from_url(state, &url).await?;
        guard_size(state, data.len())?;
        return Ok((data, url));
    }

    Err(ExtractError::MissingInput)
}

fn guard_size(state: &AppState, size: usize) -> Result<(), ExtractError> {
    let limit = state.settings.max_upload_bytes;
    if size > limit {
        return Err(ExtractError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

/// Fetch a remote document with the 30 second budget. Timeout, transport
/// failure, and non-success status each surface distinctly.
async fn fetch_file_from_url(state: &AppState, url: &str) -> Result<Vec<u8>, ExtractError> {
    let fetch = async {
        let response = state
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ExtractError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Fetch(format!("HTTP {} from {}", status, url)));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ExtractError::Fetch(e.to_string()))
    };

    match tokio::time::timeout(state.settings.fetch_timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(ExtractError::FetchTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_state(fetch_timeout: Duration) -> AppState {
        let settings = Arc::new(Settings {
            fetch_timeout,
            ..Settings::default()
        });
        let http = reqwest::Client::new();
        let sidecar = SidecarClient::new(http.clone(), settings.ocr_sidecar_url.clone());
        let vision = VisionClient::new(http.clone(), &settings);
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(sidecar.clone()),
            Arc::new(sidecar),
            Arc::new(LlmRefiner::new(vision.clone())),
            vision,
        ));
        AppState {
            pipeline,
            settings,
            http,
        }
    }

    /// Local server that accepts and never answers.
    async fn silent_server() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let _socket = socket;
                    tokio::time::sleep(Duration::from_secs(600)).await;
                });
            }
        });
        addr
    }

    /// Local server that serves a small fixed document body.
    async fn document_server(body: &'static [u8]) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/octet-stream\r\ncontent-length: {}\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.write_all(body).await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_url_fetch_timeout_yields_signal_not_hang() {
        let addr = silent_server().await;
        let state = test_state(Duration::from_millis(200));
        let err = fetch_file_from_url(&state, &format!("http://{}/statement.pdf", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FetchTimeout));
    }

    #[tokio::test]
    async fn test_resolve_input_honors_file_url() {
        let addr = document_server(b"%PDF-1.4 stub").await;
        let state = test_state(Duration::from_secs(5));
        let upload = Upload {
            file: None,
            file_url: Some(format!("http://{}/statement.pdf", addr)),
            bank_name: None,
        };
        let (data, source_name) = resolve_input(&state, upload).await.unwrap();
        assert_eq!(data, b"%PDF-1.4 stub");
        assert!(source_name.contains("statement.pdf"));
    }

    #[tokio::test]
    async fn test_resolve_input_without_file_or_url_is_client_error() {
        let state = test_state(Duration::from_secs(5));
        let upload = Upload {
            file: None,
            file_url: None,
            bank_name: None,
        };
        let err = resolve_input(&state, upload).await.unwrap_err();
        assert!(matches!(err, ExtractError::MissingInput));
    }
}
