use crate::error::AppError;
use actix_multipart::Multipart;
use futures_util::StreamExt;

pub struct GenerateUploadData {
    pub image_data: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
    pub hints: Option<String>,
}

/// Reads the `image` file field and optional `hints` text field from the
/// generation upload form. Unknown fields are ignored.
pub async fn process_generate_multipart(
    mut payload: Multipart,
) -> Result<GenerateUploadData, AppError> {
    let mut image_data = Vec::new();
    let mut mime_type = String::new();
    let mut filename = String::from("upload");
    let mut hints: Option<String> = None;

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let content_disposition = field.content_disposition().ok_or_else(|| {
            AppError::InvalidArgument("Content-Disposition header missing".to_string())
        })?;

        let field_name = content_disposition
            .get_name()
            .ok_or_else(|| AppError::InvalidArgument("Field name missing".to_string()))?
            .to_string();
        let field_filename = content_disposition
            .get_filename()
            .map(|name| name.to_string());

        match field_name.as_str() {
            "image" => {
                if let Some(name) = field_filename {
                    filename = name;
                }
                if let Some(content_type) = field.content_type() {
                    mime_type = content_type.to_string();
                }
                while let Some(chunk) = field.next().await {
                    image_data.extend_from_slice(&chunk?);
                }
            }
            "hints" => {
                let mut hints_data = Vec::new();
                while let Some(chunk) = field.next().await {
                    hints_data.extend_from_slice(&chunk?);
                }
                let text = String::from_utf8(hints_data).map_err(|_| {
                    AppError::InvalidArgument("Invalid hints encoding".to_string())
                })?;
                if !text.trim().is_empty() {
                    hints = Some(text);
                }
            }
            _ => {}
        }
    }

    if image_data.is_empty() {
        return Err(AppError::InvalidArgument("No image provided".to_string()));
    }

    Ok(GenerateUploadData {
        image_data,
        mime_type,
        filename,
        hints,
    })
}
