use crate::error::Result;
use crate::model::StatsResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;

pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.shortener().statistics().await?;
    Ok(Json(StatsResponse {
        urls: stats.urls,
        users: stats.users,
    }))
}
