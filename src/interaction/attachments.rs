//! Attachment ingestion: stage each chat attachment on disk, upload it to the
//! assistant service, and remove the local copy.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::{
    base::types::{ChatAttachment, Res},
    service::{assistant::AssistantClient, chat::ChatClient},
};

/// The longest sanitized filename kept in a staged file's name.
const MAX_FILENAME_LENGTH: usize = 64;

/// The largest file the assistant service accepts.
pub const MAX_UPLOAD_BYTES: u64 = 512 * 1024 * 1024;

/// Upload every attachment in order, and return the resulting file IDs in the same order.
///
/// Each attachment is staged under a unique name inside `temp_dir` (created if needed), and the
/// staged copy is removed whether or not the upload succeeds. The first failure aborts ingestion, and
/// an attachment over [`MAX_UPLOAD_BYTES`] aborts it before anything is downloaded.
#[instrument(skip_all, fields(count = attachments.len()))]
pub async fn ingest_attachments(attachments: &[ChatAttachment], temp_dir: &Path, chat: &ChatClient, assistant: &AssistantClient) -> Res<Vec<String>> {
    if attachments.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(attachment) = attachments.iter().find(|a| a.size > MAX_UPLOAD_BYTES) {
        return Err(anyhow::anyhow!("Attachment `{}` is {} bytes, over the {MAX_UPLOAD_BYTES} byte upload limit.", attachment.filename, attachment.size));
    }

    tokio::fs::create_dir_all(temp_dir).await?;

    let mut file_ids = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        let staged = tempfile::Builder::new()
            .prefix("attachment-")
            .suffix(&format!("-{}", sanitize_filename(&attachment.filename)))
            .tempfile_in(temp_dir)?
            .into_temp_path();

        let uploaded: Res<String> = async {
            chat.save_attachment(attachment, &staged).await?;
            assistant.upload_file(&staged).await
        }
        .await;

        // The staged copy goes away on every path.
        let removed = staged.close();
        if let Err(err) = &removed {
            warn!("Failed to remove staged attachment `{}`: {}", attachment.filename, err);
        }

        let file_id = uploaded?;
        removed?;

        info!("Uploaded attachment `{}` ({} bytes) as {}.", attachment.filename, attachment.size, file_id);

        file_ids.push(file_id);
    }

    Ok(file_ids)
}

/// Reduce a user-supplied filename to a short, path-safe form.
fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename).file_name().and_then(|n| n.to_str()).unwrap_or_default();

    let sanitized = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect::<String>();

    // Only ASCII remains, so byte offsets are character offsets; keep the tail for the extension.
    let sanitized = sanitized.trim_start_matches('.');
    let sanitized = &sanitized[sanitized.len().saturating_sub(MAX_FILENAME_LENGTH)..];

    if sanitized.is_empty() { "file".to_string() } else { sanitized.to_string() }
}

// Tests.
