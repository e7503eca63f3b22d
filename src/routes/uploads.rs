use axum::{
    Json, Router,
    extract::{Multipart, State},
    routing::post,
};

use crate::{
    dto::uploads::{ImageUploadForm, UploadedImage},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    services::upload_service::{IncomingFile, store_image},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(upload_image))
}

#[utoipa::path(
    post,
    path = "/api/uploads",
    request_body(content = ImageUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored", body = ApiResponse<UploadedImage>),
        (status = 400, description = "Missing or non-image file"),
        (status = 403, description = "Forbidden")
    ),
    security(("cookie_auth" = []), ("bearer_auth" = [])),
    tag = "Uploads"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<UploadedImage>>> {
    ensure_admin(&user)?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?.to_vec();
        let image = store_image(
            &state.config.upload_dir,
            IncomingFile {
                field: "image".to_string(),
                file_name,
                content_type,
                bytes,
            },
        )
        .await?;

        tracing::info!(user_id = %user.user_id, image = %image, "image uploaded");
        return Ok(Json(ApiResponse::success(
            "Image uploaded successfully",
            UploadedImage { image },
            Some(Meta::empty()),
        )));
    }

    Err(AppError::BadRequest("No image file provided".into()))
}
