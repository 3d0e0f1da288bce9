//! The two transport bindings over the OTP core: issue and verify.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::api::AppState;
use crate::otp::{IssueError, VerifyOutcome};

use super::types::{MessageResponse, SendOtpRequest, VerifyOtpRequest};

fn reply(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Issue a passcode for the given email and dispatch it.
#[utoipa::path(
    post,
    path = "/v1/otp/send",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Verification code sent", body = MessageResponse),
        (status = 400, description = "Invalid email address", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse),
        (status = 500, description = "Storage or delivery failure", body = MessageResponse)
    ),
    tag = "otp"
)]
pub async fn send(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<SendOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return reply(StatusCode::BAD_REQUEST, "Missing payload");
    };

    match state.service().issue(&request.email).await {
        Ok(()) => reply(StatusCode::OK, "Verification code sent"),
        Err(IssueError::InvalidEmail) => {
            reply(StatusCode::BAD_REQUEST, "Please enter a valid email address")
        }
        Err(IssueError::RateLimited) => reply(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please try again later",
        ),
        Err(IssueError::Delivery(err)) => {
            error!("Failed to deliver verification code: {err:#}");
            // Distinct from storage failures: a pending code exists and a
            // re-issue is the right recovery.
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send verification code",
            )
        }
        Err(err) => {
            error!("Issuance failed: {err:#}");
            reply(StatusCode::INTERNAL_SERVER_ERROR, "An error occurred")
        }
    }
}

/// Verify a submitted passcode.
#[utoipa::path(
    post,
    path = "/v1/otp/verify",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Code verified", body = MessageResponse),
        (status = 400, description = "Expired, exhausted, or mismatched code", body = MessageResponse),
        (status = 500, description = "Storage failure", body = MessageResponse)
    ),
    tag = "otp"
)]
pub async fn verify(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return reply(StatusCode::BAD_REQUEST, "Missing payload");
    };

    match state.service().verify(&request.email, &request.code).await {
        Ok(VerifyOutcome::Verified) => reply(StatusCode::OK, "Code verified successfully"),
        Ok(VerifyOutcome::Expired) => reply(
            StatusCode::BAD_REQUEST,
            "Code has expired. Please request a new one",
        ),
        Ok(VerifyOutcome::TooManyAttempts) => reply(
            StatusCode::BAD_REQUEST,
            "Too many failed attempts. Please request a new code",
        ),
        Ok(VerifyOutcome::Invalid { attempts_remaining }) => reply(
            StatusCode::BAD_REQUEST,
            &format!("Invalid code. {attempts_remaining} attempts remaining"),
        ),
        Err(err) => {
            error!("Verification failed: {err:#}");
            reply(StatusCode::INTERNAL_SERVER_ERROR, "An error occurred")
        }
    }
}
