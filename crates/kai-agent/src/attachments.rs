// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning inbound attachments into content blocks.

use base64::Engine;
use kai_core::types::{Attachment, AttachmentKind, ContentBlock, ConversationTurn, Role, TurnContent};
use kai_core::{ChatTransport, ProviderAdapter};
use tracing::{debug, warn};

/// Extensions the provider file stores accept, keyed by MIME type.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("text/plain", "txt"),
    ("text/markdown", "md"),
    ("text/csv", "csv"),
    ("text/html", "html"),
    ("application/json", "json"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pptx",
    ),
    ("application/vnd.ms-excel", "xls"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
    ),
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// The file extension for a MIME type, if it is a supported one.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let mime = mime.split(';').next().unwrap_or(mime).trim();
    MIME_EXTENSIONS
        .iter()
        .find(|(m, _)| m.eq_ignore_ascii_case(mime))
        .map(|(_, ext)| *ext)
}

fn is_supported_extension(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    MIME_EXTENSIONS.iter().any(|(_, e)| *e == ext) || ext == "jpeg"
}

/// A filename with a supported extension, inferred from the MIME type when
/// the original name lacks one.
pub fn infer_filename(name: Option<&str>, mime: &str) -> String {
    let stem = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or("attachment");
    if let Some((_, ext)) = stem.rsplit_once('.')
        && is_supported_extension(ext)
    {
        return stem.to_string();
    }
    match extension_for_mime(mime) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

fn acknowledgment(filename: &str) -> ContentBlock {
    ContentBlock::Text {
        text: format!("[The user attached {filename}, but it could not be read.]"),
    }
}

/// Builds the user turn for a message and its attachments.
///
/// Images become vision blocks and documents are uploaded to the provider's
/// file store. Any attachment that cannot be fetched or uploaded degrades to
/// a text acknowledgment; this never fails the message.
pub async fn build_user_turn(
    text: &str,
    attachments: &[Attachment],
    transport: &dyn ChatTransport,
    provider: &dyn ProviderAdapter,
) -> ConversationTurn {
    if attachments.is_empty() {
        return ConversationTurn::user(text);
    }

    let mut blocks = vec![ContentBlock::Text {
        text: text.to_string(),
    }];
    for attachment in attachments {
        let mime = attachment
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let filename = infer_filename(attachment.name.as_deref(), &mime);

        let bytes = match transport.fetch_attachment(&attachment.url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %attachment.url, error = %e, "attachment download failed");
                blocks.push(acknowledgment(&filename));
                continue;
            }
        };

        let block = match attachment.kind {
            AttachmentKind::Image => ContentBlock::Image {
                media_type: mime,
                data: base64::engine::general_purpose::STANDARD.encode(&bytes),
            },
            AttachmentKind::File => match provider.upload_file(&filename, &mime, bytes).await {
                Ok(Some(file_id)) => {
                    debug!(file_id = %file_id, filename = %filename, "document uploaded");
                    ContentBlock::File { file_id, filename }
                }
                Ok(None) => {
                    debug!(provider = provider.name(), "provider has no file store");
                    acknowledgment(&filename)
                }
                Err(e) => {
                    warn!(filename = %filename, error = %e, "document upload failed");
                    acknowledgment(&filename)
                }
            },
        };
        blocks.push(block);
    }

    ConversationTurn {
        role: Role::User,
        content: TurnContent::Blocks(blocks),
    }
}
