//! `OpenAPI` document for the served routes.

use utoipa::OpenApi;

use super::handlers::{health, otp, types};

#[derive(OpenApi)]
#[openapi(
    paths(otp::send, otp::verify, health::health),
    components(schemas(
        types::SendOtpRequest,
        types::VerifyOtpRequest,
        types::MessageResponse,
        health::Health
    )),
    tags(
        (name = "otp", description = "One-time passcode issuance and verification"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
