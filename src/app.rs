use crate::config::Config;
use crate::debounce::{Debouncer, Enqueued};
use crate::discord::{DiscordClient, WebhookApi};
use crate::dispatch::Dispatcher;
use crate::event;
use crate::imgur::{ImageHostApi, ImgurClient};
use crate::plex::{MediaServerApi, PlexClient};
use crate::poster::PosterManager;
use crate::relay::Relay;
use anyhow::Result;
use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

const MAX_BODY_BYTES: usize = 1024 * 1024; // 1MB safety cap
const PAYLOAD_FIELD: &str = "payload";

#[derive(Clone)]
pub struct AppState {
    pub debouncer: Debouncer,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = config.http_client()?;
        let media: Arc<dyn MediaServerApi> = Arc::new(PlexClient::new(
            client.clone(),
            &config.plex_url,
            &config.plex_token,
        ));
        let images: Arc<dyn ImageHostApi> =
            Arc::new(ImgurClient::new(client.clone(), &config.imgur_client_id));
        let webhook: Arc<dyn WebhookApi> =
            Arc::new(DiscordClient::new(client, &config.discord_webhook));

        let relay = Relay::new(
            PosterManager::new(media, images),
            Dispatcher::new(webhook, config.webhook_calls, config.webhook_period),
        );
        let debouncer = Debouncer::new(
            Arc::new(relay),
            config.debounce_delay,
            config.burst_capacity,
        );
        Ok(Self { debouncer })
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    info!(
        "Debouncing for {:?} (up to {} events per key), webhook quota {} per {:?}",
        config.debounce_delay, config.burst_capacity, config.webhook_calls, config.webhook_period
    );
    let debouncer = state.debouncer.clone();
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let discarded = debouncer.shutdown().await;
    if discarded > 0 {
        warn!("Discarded {} buffered rating events on shutdown", discarded);
    }
    let in_flight = debouncer.in_flight();
    if in_flight > 0 {
        warn!(
            "Abandoning {} notification(s) still being delivered on shutdown",
            in_flight
        );
    }
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/plex", post(handle_webhook).fallback(reject_method))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn reject_method() -> StatusCode {
    StatusCode::BAD_REQUEST
}

async fn handle_webhook(State(state): State<AppState>, request: Request) -> Response {
    let Some(raw) = read_payload(request).await else {
        warn!("No payload found in webhook form data");
        return (StatusCode::BAD_REQUEST, "No payload found").into_response();
    };

    let webhook = match event::parse_payload(&raw) {
        Ok(w) => w,
        Err(e) => {
            warn!("Rejecting webhook: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid payload format").into_response();
        }
    };
    info!(
        "Got webhook for {}",
        webhook.event.as_deref().unwrap_or("unknown")
    );

    match event::normalize(webhook, Utc::now()) {
        Ok(Some(rating)) => {
            let key = rating.debounce_key();
            match state.debouncer.enqueue(rating).await {
                Enqueued::Scheduled => info!("Queued rating for {}", key),
                Enqueued::Buffered(n) => debug!("Rating for {} buffered ({} pending)", key, n),
                Enqueued::Dropped => debug!("Rating for {} dropped, burst is full", key),
            }
        }
        Ok(None) => debug!("Ignoring non-rating webhook"),
        Err(e) => warn!("Dropping rating webhook: {}", e),
    }

    (StatusCode::OK, "Success!").into_response()
}

/// Pulls the `payload` field out of a multipart or urlencoded form.
async fn read_payload(request: Request) -> Option<String> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if is_multipart {
        let mut multipart = Multipart::from_request(request, &()).await.ok()?;
        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some(PAYLOAD_FIELD) {
                return field.text().await.ok();
            }
        }
        return None;
    }

    let Form(mut fields) = Form::<HashMap<String, String>>::from_request(request, &())
        .await
        .ok()?;
    fields.remove(PAYLOAD_FIELD)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
