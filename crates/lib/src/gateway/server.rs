//! HTTP surface: the LINE webhook callback and a health probe.

use super::dispatch::{Gateway, GatewayError};
use super::signature::SignatureVerifier;
use crate::channels::{LineClient, Messenger};
use crate::config::{self, Config};
use crate::handlers::{build_registry, messages, HandlerContext};
use crate::llm::{ChatModel, GeminiClient, VisionModel};
use crate::media::FfmpegFrameExtractor;
use crate::session::SessionStore;
use crate::storage::{PostgresSink, RecordSink, Recorder, SheetsSink};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Header carrying the base64 HMAC-SHA256 of the body. Header names are case-insensitive.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Fixed callback body, independent of handler outcomes.
pub const ACK_BODY: &str = "OK";

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub gateway: Arc<Gateway>,
    /// Port reported by the health probe.
    pub port: u16,
}

/// Routes: `POST /callback` and `GET /`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/callback", post(callback))
        .with_state(state)
}

/// POST /callback: verify, parse and dispatch one delivery.
async fn callback(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    match state.gateway.receive(&body, signature).await {
        Ok(ack) => {
            if ack.failed > 0 {
                log::info!(
                    "callback: {} of {} handler(s) failed",
                    ack.failed,
                    ack.dispatched
                );
            }
            (StatusCode::OK, ACK_BODY)
        }
        Err(GatewayError::Authentication) => {
            log::warn!("callback: rejected delivery with missing or invalid signature");
            (StatusCode::BAD_REQUEST, "invalid signature")
        }
        Err(e @ GatewayError::MalformedPayload(_)) => {
            log::error!("callback: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "malformed payload")
        }
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
    }))
}

/// Enabled persistence sinks. A sink whose setup fails is skipped with a warning.
async fn build_sinks(config: &Config) -> Vec<Arc<dyn RecordSink>> {
    let mut sinks: Vec<Arc<dyn RecordSink>> = Vec::new();
    if let Some(url) = config::resolve_database_url(config) {
        match PostgresSink::connect(&url).await {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => log::warn!("postgres sink disabled: {}", e),
        }
    }
    if let Some((id, path)) = config::resolve_sheets(config) {
        match SheetsSink::from_key_file(id, config.storage.sheets.range.clone(), &path).await {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => log::warn!("sheets sink disabled: {}", e),
        }
    }
    sinks
}

/// Run the webhook server until shutdown (Ctrl+C or SIGTERM).
/// `port_override` wins over PORT env and the configured port.
pub async fn run_gateway(config: Config, port_override: Option<u16>) -> Result<()> {
    let secret = config::resolve_channel_secret(&config)
        .context("channel secret missing (set CHANNEL_SECRET or line.channelSecret)")?;
    let access_token = config::resolve_access_token(&config).context(
        "channel access token missing (set CHANNEL_ACCESS_TOKEN or line.channelAccessToken)",
    )?;
    let verifier = SignatureVerifier::new(&secret)
        .map_err(|e| anyhow::anyhow!("invalid channel secret: {}", e))?;

    let messenger: Arc<dyn Messenger> = Arc::new(LineClient::new(
        access_token,
        config.line.api_base.clone(),
        config.line.data_api_base.clone(),
    ));

    let mut vision: Option<Arc<dyn VisionModel>> = None;
    let mut chat: Option<Arc<dyn ChatModel>> = None;
    match config::resolve_gemini_api_key(&config) {
        Some(key) => {
            let model = config::resolve_gemini_model(&config);
            let base = config.gemini.base_url.clone();
            let timeout = config.gemini.timeout();
            let instruction = config
                .chat
                .system_instruction
                .clone()
                .unwrap_or_else(|| messages::SYSTEM_INSTRUCTION.to_string());
            log::info!("gemini model: {} (timeout {:?})", model, timeout);
            vision = Some(Arc::new(GeminiClient::new(
                key.clone(),
                model.clone(),
                base.clone(),
                timeout,
            )));
            chat = Some(Arc::new(
                GeminiClient::new(key, model, base, timeout).with_system_instruction(instruction),
            ));
        }
        None => {
            log::warn!("GEMINI_API_KEY not set; image, video and chat replies will apologise");
        }
    }

    let recorder = Recorder::new(build_sinks(&config).await);
    if recorder.is_empty() {
        log::info!("no storage configured; plate readings will not be persisted");
    }

    let ctx = Arc::new(HandlerContext {
        messenger,
        vision,
        chat,
        sessions: Arc::new(SessionStore::new(config.chat.max_history)),
        recorder: Arc::new(recorder),
        frames: Arc::new(FfmpegFrameExtractor::new(&config.video.ffmpeg_path)),
        video: config.video.clone(),
        report_limit: config.report.limit,
    });

    let port = port_override.unwrap_or_else(|| config::resolve_port(&config));
    let state = GatewayState {
        gateway: Arc::new(Gateway::new(verifier, build_registry(ctx))),
        port,
    };
    let app = router(state);

    let bind_addr = format!("{}:{}", config.server.bind.trim(), port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}
