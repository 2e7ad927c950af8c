use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rollup_common::error::RollupError;
use rollup_common::types::VersionToken;
use serde::Deserialize;

use crate::error::ApiError;

/// Optional `if_seq_no` / `if_primary_term` query pair. Both or neither.
pub struct IfToken(pub Option<VersionToken>);

#[derive(Debug)]
pub struct IfTokenRejection(String);

impl IntoResponse for IfTokenRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.0 });
        (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct TokenParams {
    if_seq_no: Option<i64>,
    if_primary_term: Option<i64>,
}

impl IfToken {
    pub fn required(self) -> Result<VersionToken, ApiError> {
        self.0.ok_or_else(|| {
            ApiError(RollupError::Validation(
                "if_seq_no and if_primary_term are required".to_string(),
            ))
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for IfToken {
    type Rejection = IfTokenRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<TokenParams>::try_from_uri(&parts.uri)
            .map_err(|e| IfTokenRejection(format!("invalid token parameters: {e}")))?;

        match (params.if_seq_no, params.if_primary_term) {
            (Some(seq_no), Some(primary_term)) => {
                Ok(IfToken(Some(VersionToken::new(seq_no, primary_term))))
            }
            (None, None) => Ok(IfToken(None)),
            _ => Err(IfTokenRejection(
                "if_seq_no and if_primary_term must be given together".to_string(),
            )),
        }
    }
}
