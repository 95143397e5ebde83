//! File attachments of tasks and projects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata of an uploaded file. The bytes live in file storage under
/// `filename`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Generated storage name, unique per upload.
    pub filename: String,
    /// Name the client sent.
    pub original_name: String,
    /// Location in file storage.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    pub mime_type: String,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

/// Removes the attachment named `filename` and returns it.
pub fn take_attachment(attachments: &mut Vec<Attachment>, filename: &str) -> Option<Attachment> {
    let index = attachments.iter().position(|a| a.filename == filename)?;
    Some(attachments.remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(filename: &str) -> Attachment {
        Attachment {
            filename: filename.to_string(),
            original_name: "plan.pdf".to_string(),
            path: format!("uploads/{filename}"),
            size: 42,
            mime_type: "application/pdf".to_string(),
            uploaded_by: Uuid::new_v4(),
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_take_attachment() {
        let mut attachments = vec![attachment("files-1.pdf"), attachment("files-2.pdf")];

        let taken = take_attachment(&mut attachments, "files-1.pdf").unwrap();
        assert_eq!(taken.filename, "files-1.pdf");
        assert_eq!(attachments.len(), 1);
        assert!(take_attachment(&mut attachments, "files-1.pdf").is_none());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(attachment("files-1.pdf")).unwrap();
        assert_eq!(json["originalName"], "plan.pdf");
        assert_eq!(json["mimeType"], "application/pdf");
        assert!(json.get("uploadedBy").is_some());
    }
}
