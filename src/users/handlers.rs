use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    error::ApiError,
    state::AppState,
    users::dto::{BackfillResponse, LoginRequest, PublicUser, RegisterRequest},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/update-ages", get(update_ages))
        .route("/users/:id", get(get_user))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Json<Vec<PublicUser>> {
    Json(state.accounts().list_all().await)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let user = state.accounts().register(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state.accounts().login(payload).await?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn update_ages(
    State(state): State<AppState>,
) -> Result<Json<BackfillResponse>, ApiError> {
    let (updated, total) = state.accounts().backfill_ages().await?;
    Ok(Json(BackfillResponse {
        message: format!("Updated ages for {updated} users"),
        users_count: total,
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublicUser>, ApiError> {
    // non-numeric ids fall through to the not-found response rather than a
    // decode rejection
    let id: i64 = id.parse().map_err(|_| ApiError::NotFound)?;
    let user = state.accounts().get_by_id(id).await?;
    Ok(Json(user))
}
