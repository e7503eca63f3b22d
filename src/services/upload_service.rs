use std::path::Path;

use chrono::Utc;
use tokio::fs;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const PUBLIC_PREFIX: &str = "/uploads";
const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// A file received from a multipart field.
#[derive(Debug)]
pub struct IncomingFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Lowercased extension when both the file name and declared type look like an image.
pub fn image_extension(file: &IncomingFile) -> AppResult<String> {
    let ext = Path::new(&file.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| AppError::BadRequest("Images only (jpg, jpeg, png, webp)".into()))?;

    match file.content_type.as_deref() {
        Some(content_type) if content_type.starts_with("image/") => Ok(ext),
        _ => Err(AppError::BadRequest("Images only (jpg, jpeg, png, webp)".into())),
    }
}

/// Validates an upload without touching the disk.
pub fn check_image(file: &IncomingFile) -> AppResult<String> {
    if file.bytes.is_empty() {
        return Err(AppError::BadRequest("No image file provided".into()));
    }
    image_extension(file)
}

pub fn stored_name(field: &str, ext: &str) -> String {
    let field: String = field
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    let field = if field.is_empty() { "image".to_string() } else { field };
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{field}-{}-{}.{ext}",
        Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}

/// Write an image under `dir` and return its public path.
pub async fn store_image(dir: &str, file: IncomingFile) -> AppResult<String> {
    let ext = check_image(&file)?;
    let name = stored_name(&file.field, &ext);

    fs::create_dir_all(dir).await?;
    fs::write(Path::new(dir).join(&name), &file.bytes).await?;
    tracing::debug!(file = %name, size = file.bytes.len(), "image stored");

    Ok(format!("{PUBLIC_PREFIX}/{name}"))
}

/// Store every file or none of them.
pub async fn store_images(dir: &str, files: Vec<IncomingFile>) -> AppResult<Vec<String>> {
    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        match store_image(dir, file).await {
            Ok(path) => stored.push(path),
            Err(err) => {
                remove_images(dir, &stored).await;
                return Err(err);
            }
        }
    }
    Ok(stored)
}

/// Delete previously stored images by public path; failures are logged only.
pub async fn remove_images(dir: &str, paths: &[String]) {
    for path in paths {
        let Some(name) = path.strip_prefix(&format!("{PUBLIC_PREFIX}/")) else {
            continue;
        };
        if let Err(err) = fs::remove_file(Path::new(dir).join(name)).await {
            tracing::warn!(error = %err, file = %name, "failed to remove image");
        }
    }
}
