//! HTTP mapping for [`subhandle::Error`].
//!
//! Every variant becomes a status code plus a small JSON body
//! `{ "error": <code>, "message": <text> }`. Datastore failures are logged and
//! reported with a generic message so SQL details never reach the client.
//! Request bodies that fail to parse are reported as `invalid_request` too.

use axum::Json;
use axum::extract::FromRequest;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use subhandle::Error;

#[derive(Debug)]
pub struct ApiError(pub Error);

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Denied { .. } => StatusCode::FORBIDDEN,
            Error::Taken { .. } => StatusCode::CONFLICT,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Resolver { .. } => StatusCode::BAD_GATEWAY,
            Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            Error::InvalidRequest { .. } => "invalid_request",
            Error::Denied { .. } => "denied",
            Error::Taken { .. } => "taken",
            Error::NotFound => "not_found",
            Error::Resolver { .. } => "resolver_unavailable",
            Error::Database(_) => "internal",
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::InvalidRequest {
            reason: rejection.body_text(),
        })
    }
}

/// JSON request body whose rejections render as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            Error::Database(e) => {
                tracing::error!(error = %e, "datastore failure");
                "Something went wrong, please try again".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_map_to_distinct_statuses() {
        let cases = [
            (
                Error::InvalidRequest {
                    reason: "x".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::Denied {
                    handle: "admin.warga.cloud".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                Error::Taken {
                    handle: "alice.warga.cloud".into(),
                },
                StatusCode::CONFLICT,
            ),
            (Error::NotFound, StatusCode::NOT_FOUND),
            (
                Error::Resolver {
                    context: "timeout".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                Error::Database(sqlx::Error::PoolClosed),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
