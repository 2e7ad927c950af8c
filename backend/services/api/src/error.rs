use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rollup_common::error::RollupError;

pub struct ApiError(pub RollupError);

impl From<RollupError> for ApiError {
    fn from(err: RollupError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            RollupError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": msg }),
            ),
            RollupError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": msg }),
            ),
            // Both carry the token of the stored document, if any.
            RollupError::AlreadyExists { current, .. }
            | RollupError::VersionConflict { current, .. } => (
                StatusCode::CONFLICT,
                serde_json::json!({
                    "error": self.0.to_string(),
                    "_seq_no": current.map(|t| t.seq_no),
                    "_primary_term": current.map(|t| t.primary_term),
                }),
            ),
            RollupError::InvalidTransition { .. } => (
                StatusCode::CONFLICT,
                serde_json::json!({ "error": self.0.to_string() }),
            ),
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": other.to_string() }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_common::types::VersionToken;

    async fn render(err: RollupError) -> (StatusCode, serde_json::Value) {
        let resp = ApiError(err).into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn conflict_carries_current_token() {
        let (status, body) = render(RollupError::version_conflict(
            "j1",
            Some(VersionToken::new(7, 2)),
        ))
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["_seq_no"], 7);
        assert_eq!(body["_primary_term"], 2);
    }

    #[tokio::test]
    async fn conflict_on_missing_document_has_null_token() {
        let (status, body) = render(RollupError::version_conflict("j1", None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["_seq_no"].is_null());
    }

    #[tokio::test]
    async fn create_collision_carries_current_token() {
        let (status, body) = render(RollupError::AlreadyExists {
            id: "j1".into(),
            current: Some(VersionToken::new(4, 1)),
        })
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already exists: j1");
        assert_eq!(body["_seq_no"], 4);
        assert_eq!(body["_primary_term"], 1);
    }

    #[tokio::test]
    async fn statuses_follow_error_kind() {
        assert_eq!(
            render(RollupError::NotFound("x".into())).await.0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            render(RollupError::Validation("x".into())).await.0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            render(RollupError::Database("x".into())).await.0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
