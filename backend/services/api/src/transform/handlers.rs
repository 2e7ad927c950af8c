use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rollup_db::transform::models::JobStatus;

use crate::error::ApiError;
use crate::extractors::IfToken;
use crate::transform::requests::PutTransformRequest;
use crate::transform::responses::{
    DeleteTransformResponse, ListTransformsResponse, TransformResponse,
};
use crate::AppState;

pub async fn put_transform(
    State(state): State<AppState>,
    Path(id): Path<String>,
    IfToken(token): IfToken,
    Json(req): Json<PutTransformRequest>,
) -> Result<Response, ApiError> {
    let outcome = state
        .control
        .create_or_replace(&id, req.transform, token)
        .await?;
    let body = Json(TransformResponse::from(outcome.job));

    if outcome.created {
        let location = format!("/_transform/{id}");
        Ok((StatusCode::CREATED, [(header::LOCATION, location)], body).into_response())
    } else {
        Ok((StatusCode::OK, body).into_response())
    }
}

pub async fn get_transform(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TransformResponse>, ApiError> {
    let job = state.control.read(&id).await?;
    Ok(Json(job.into()))
}

pub async fn list_transforms(
    State(state): State<AppState>,
) -> Result<Json<ListTransformsResponse>, ApiError> {
    let transforms: Vec<TransformResponse> = state
        .control
        .list()
        .await?
        .into_iter()
        .map(TransformResponse::from)
        .collect();
    let total_transforms = transforms.len();
    Ok(Json(ListTransformsResponse {
        transforms,
        total_transforms,
    }))
}

pub async fn delete_transform(
    State(state): State<AppState>,
    Path(id): Path<String>,
    token: IfToken,
) -> Result<Json<DeleteTransformResponse>, ApiError> {
    let token = token.required()?;
    state.control.delete(&id, token).await?;
    Ok(Json(DeleteTransformResponse {
        id,
        result: "deleted",
    }))
}

/// Start, resume or retry, whichever the current status allows.
pub async fn start_transform(
    State(state): State<AppState>,
    Path(id): Path<String>,
    token: IfToken,
) -> Result<Json<TransformResponse>, ApiError> {
    let token = token.required()?;
    let job = state
        .control
        .set_status(&id, token, JobStatus::Started)
        .await?;
    Ok(Json(job.into()))
}

pub async fn stop_transform(
    State(state): State<AppState>,
    Path(id): Path<String>,
    token: IfToken,
) -> Result<Json<TransformResponse>, ApiError> {
    let token = token.required()?;
    let job = state
        .control
        .set_status(&id, token, JobStatus::Stopped)
        .await?;
    Ok(Json(job.into()))
}
