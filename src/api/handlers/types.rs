//! Request/response types for the OTP endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    /// Submitted as a string so leading zeros and stray input survive transport.
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}
