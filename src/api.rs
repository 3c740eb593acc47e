use std::sync::Arc;

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    clients::health::HealthChecker,
    dispatch::DispatchService,
    error::DispatchError,
    models::{
        health::HealthStatus,
        notification::NotificationRequest,
        response::{ApiResponse, DispatchAccepted},
        validation::CreateNotificationRequest,
    },
};

pub struct AppState {
    dispatcher: Arc<DispatchService>,
    health_checker: HealthChecker,
}

impl AppState {
    pub fn new(dispatcher: Arc<DispatchService>, health_checker: HealthChecker) -> Self {
        Self {
            dispatcher,
            health_checker,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/notifications", post(create_notification))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `shutdown` flips to true.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    info!(address = %listener.local_addr()?, "Ingestion server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    Ok(())
}

async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateNotificationRequest>,
) -> Response {
    let request = match NotificationRequest::try_from(body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::error(
                    e.to_string(),
                    "Invalid notification request".to_string(),
                )),
            )
                .into_response();
        }
    };

    match state
        .dispatcher
        .store()
        .lookup_preferences(&request.user_id)
        .await
    {
        Ok(Some(preferences)) if !preferences.allows(request.notification_type) => {
            info!(
                user_id = %request.user_id,
                channel = %request.notification_type,
                "Channel disabled by user preferences"
            );
            return (
                StatusCode::CONFLICT,
                Json(ApiResponse::<()>::error(
                    format!("{} notifications are disabled for this user", request.notification_type),
                    "Notification not sent".to_string(),
                )),
            )
                .into_response();
        }
        Ok(_) => {}
        Err(e) => {
            warn!(user_id = %request.user_id, error = %e, "Preference lookup failed, dispatching anyway");
        }
    }

    match state.dispatcher.submit(request).await {
        Ok(receipt) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(
                DispatchAccepted {
                    notification_id: receipt.notification_id.to_string(),
                    queue: receipt.queue.to_string(),
                },
                "Notification queued".to_string(),
            )),
        )
            .into_response(),
        Err(DispatchError::Validation(e)) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                e.to_string(),
                "Invalid notification request".to_string(),
            )),
        )
            .into_response(),
        Err(e @ DispatchError::Storage(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<()>::error(
                e.to_string(),
                "Notification not accepted".to_string(),
            )),
        )
            .into_response(),
        Err(DispatchError::Publish {
            notification_id,
            reason,
        }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error_with_data(
                json!({ "notificationId": notification_id.to_string() }),
                reason,
                "Notification stored but not queued".to_string(),
            )),
        )
            .into_response(),
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}
