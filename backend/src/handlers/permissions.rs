//! Handlers exposing the caller's resolved permissions

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::permission::PermissionsInfo;
use crate::AppState;

/// What the current user may see and do
pub async fn get_my_permissions(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<PermissionsInfo>> {
    let service = state.permission_service();
    let permissions = service.resolve(&current_user.0);
    Ok(Json(service.info(&permissions).await?))
}
