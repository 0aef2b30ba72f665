//! Merging list-level and detail-level attributes.

use crate::error::MergeError;
use crate::models::{CommentDetail, CommentSummary, MergedRecord};

/// Combine a summary and its detail into one record.
///
/// The summary wins for title, agency and posted date. Everything else comes
/// from the detail. Mismatched ids are rejected rather than merged.
pub fn merge(summary: &CommentSummary, detail: &CommentDetail) -> Result<MergedRecord, MergeError> {
    if summary.id != detail.id {
        return Err(MergeError::IdMismatch {
            summary_id: summary.id.clone(),
            detail_id: detail.id.clone(),
        });
    }

    Ok(MergedRecord {
        id: summary.id.clone(),
        title: summary.title.clone(),
        detail_url: summary.detail_url.clone(),
        agency: summary.agency.clone(),
        posted_date: summary.posted_date.clone(),
        tracking_number: detail.tracking_number.clone(),
        document_subtype: detail.document_subtype.clone(),
        received_date: detail.received_date.clone(),
        submitter: detail.submitter.clone(),
        content: detail.content.clone(),
        attachments: detail.attachments.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attachment, Submitter};

    fn summary(id: &str) -> CommentSummary {
        CommentSummary {
            id: id.to_string(),
            title: "Comment from Jane Doe".to_string(),
            detail_url: format!("/comment/{id}"),
            agency: "PHMSA".to_string(),
            posted_date: "May 3, 2011".to_string(),
        }
    }

    fn detail(id: &str) -> CommentDetail {
        CommentDetail {
            tracking_number: Some("kxy-1".to_string()),
            content: Some("See attached.".to_string()),
            submitter: Submitter {
                name: Some("Jane Doe".to_string()),
                ..Default::default()
            },
            attachments: vec![Attachment {
                title: "Attachment 1".to_string(),
                download_url: None,
            }],
            ..CommentDetail::empty(id)
        }
    }

    #[test]
    fn test_merge_field_precedence() {
        let record = merge(&summary("A"), &detail("A")).unwrap();
        assert_eq!(record.id, "A");
        assert_eq!(record.title, "Comment from Jane Doe");
        assert_eq!(record.agency, "PHMSA");
        assert_eq!(record.detail_url, "/comment/A");
        assert_eq!(record.tracking_number.as_deref(), Some("kxy-1"));
        assert_eq!(record.submitter.name.as_deref(), Some("Jane Doe"));
        assert_eq!(record.attachments.len(), 1);
    }

    #[test]
    fn test_merge_is_pure() {
        let (s, d) = (summary("A"), detail("A"));
        assert_eq!(merge(&s, &d), merge(&s, &d));
    }

    #[test]
    fn test_merge_rejects_id_mismatch() {
        let err = merge(&summary("A"), &detail("B")).unwrap_err();
        assert_eq!(
            err,
            MergeError::IdMismatch {
                summary_id: "A".to_string(),
                detail_id: "B".to_string(),
            }
        );
    }

    #[test]
    fn test_merge_with_absent_address() {
        let record = merge(&summary("A"), &CommentDetail::empty("A")).unwrap();
        assert!(record.submitter.address.is_empty());
        assert_eq!(record.content, None);
    }
}
