use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use cirrus_core::CoreError;
use cirrus_types::api::ApiResponse;

/// Boundary wrapper: dispatches the core error taxonomy to HTTP once. The
/// body carries the error's own Display text, which is already safe to show
/// (fatal variants render an opaque message, never backend detail).
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Throttled => StatusCode::TOO_MANY_REQUESTS,
            CoreError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            CoreError::Unverified => StatusCode::FORBIDDEN,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Storage(_) | CoreError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if self.0.is_fatal() {
            error!("Request failed ({}): {:?}", self.0.code(), self.0);
        }

        (status, Json(ApiResponse::<()>::error(self.0.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        let cases = [
            (CoreError::Throttled, StatusCode::TOO_MANY_REQUESTS),
            (CoreError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (CoreError::Unverified, StatusCode::FORBIDDEN),
            (CoreError::Unauthorized, StatusCode::UNAUTHORIZED),
            (CoreError::NotFound("File"), StatusCode::NOT_FOUND),
            (CoreError::Conflict("taken"), StatusCode::CONFLICT),
            (
                CoreError::validation("bad input"),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::Storage(anyhow::anyhow!("bucket down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[test]
    fn fatal_errors_render_opaque_messages() {
        let err = CoreError::Storage(anyhow::anyhow!("secret backend detail"));
        assert_eq!(err.to_string(), "Storage operation failed");
    }
}
