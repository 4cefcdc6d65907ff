//! Create and publish handlers.
//!
//! `POST /notifications` writes through the notification service and
//! answers with the stored record. `POST /notifications/publish` validates
//! the same body and hands it to the queue publisher instead. Bodies are
//! decoded as JSON whatever their content type says.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use super::error::{ApiError, StatusBody};
use crate::model::{Notification, NotificationPayload};
use crate::notify::ServiceError;
use crate::server::ServerState;

pub const CODE_QUEUED: &str = "queued";

fn decode(body: &[u8]) -> Result<NotificationPayload, ApiError> {
    Ok(serde_json::from_slice(body)?)
}

/// Handle POST /notifications.
#[tracing::instrument(skip_all)]
pub async fn create_notification(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    let mut payload = decode(&body)?;
    // Creation time is assigned server side on this path.
    payload.created_at = None;

    match state.service.create(payload).await {
        Ok(created) => Ok((StatusCode::CREATED, Json(created))),
        Err(ServiceError::Validation(e)) => Err(e.into()),
        Err(ServiceError::Store(_)) => Err(ApiError::internal("failed to create notification")),
    }
}

/// Handle POST /notifications/publish.
#[tracing::instrument(skip_all)]
pub async fn publish_notification(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<StatusBody>), ApiError> {
    let mut payload = decode(&body)?;
    payload.created_at = None;
    let request = payload.validate()?;

    state
        .publisher
        .publish(&request)
        .await
        .map_err(|_| ApiError::internal("failed to publish notification"))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StatusBody {
            code: CODE_QUEUED.to_string(),
            message: "queued".to_string(),
        }),
    ))
}
