use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{Error, HttpResponse};
use serde::Serialize;
use std::fmt::Display;

/// Error body shared by every endpoint: `{message, error?}`.
#[derive(Debug, Serialize, Default, Clone, PartialEq)]
pub struct JsonResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JsonResponse {
    pub fn build() -> JsonResponseBuilder {
        JsonResponseBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct JsonResponseBuilder {
    error: Option<String>,
}

impl JsonResponseBuilder {
    pub fn set_error(mut self, error: impl Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn to_response(self, status: StatusCode, message: impl Into<String>) -> HttpResponse {
        HttpResponse::build(status).json(JsonResponse {
            message: message.into(),
            error: self.error,
        })
    }

    fn into_error(self, status: StatusCode, message: impl Into<String>) -> Error {
        let message = message.into();
        let response = self.to_response(status, message.clone());
        InternalError::from_response(message, response).into()
    }

    pub fn bad_request(self, message: impl Into<String>) -> Error {
        self.into_error(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(self, message: impl Into<String>) -> Error {
        self.into_error(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(self, message: impl Into<String>) -> Error {
        self.into_error(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_server_error(self, message: impl Into<String>) -> Error {
        self.into_error(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}
