//! Record types produced by the harvester.
//!
//! Field names serialize in camelCase and optional fields serialize as `null`
//! rather than being omitted, so every record in the output file has the same
//! shape.

use serde::{Deserialize, Serialize};

/// Listing-page view of a single comment, captured before its detail page is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSummary {
    pub id: String,
    pub title: String,
    /// Path (usually relative) to the comment's detail page.
    pub detail_url: String,
    pub agency: String,
    pub posted_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

impl Address {
    /// True when no address markup was found at all.
    pub fn is_empty(&self) -> bool {
        self.line1.is_none()
            && self.line2.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.zip.is_none()
            && self.country.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitter {
    pub name: Option<String>,
    pub organization: Option<String>,
    pub representative: Option<String>,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub title: String,
    /// Absent when the attachment block carries no download link.
    pub download_url: Option<String>,
}

/// Full view of a comment extracted from its detail page.
///
/// Every field other than `id` may be absent; a missing markup region is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDetail {
    /// Derived from the detail URL, never from page content.
    pub id: String,
    pub tracking_number: Option<String>,
    pub document_subtype: Option<String>,
    pub received_date: Option<String>,
    pub submitter: Submitter,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl CommentDetail {
    /// A detail record with only its id set.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracking_number: None,
            document_subtype: None,
            received_date: None,
            submitter: Submitter::default(),
            content: None,
            attachments: Vec::new(),
        }
    }
}

/// One output row: summary and detail joined on `id`.
///
/// Append-only once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedRecord {
    pub id: String,
    pub title: String,
    pub detail_url: String,
    pub agency: String,
    pub posted_date: String,
    pub tracking_number: Option<String>,
    pub document_subtype: Option<String>,
    pub received_date: Option<String>,
    pub submitter: Submitter,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_serialize_as_null() {
        let record = MergedRecord {
            id: "PHMSA-2011-0023-0407".to_string(),
            title: "Comment from Jane Doe".to_string(),
            detail_url: "/comment/PHMSA-2011-0023-0407".to_string(),
            agency: "PHMSA".to_string(),
            posted_date: "Jun 1, 2011".to_string(),
            tracking_number: None,
            document_subtype: None,
            received_date: None,
            submitter: Submitter::default(),
            content: None,
            attachments: Vec::new(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert!(json["trackingNumber"].is_null());
        assert!(json["content"].is_null());
        assert!(json["submitter"]["address"]["line2"].is_null());
        assert_eq!(json["postedDate"], "Jun 1, 2011");
        assert_eq!(json["attachments"], serde_json::json!([]));
    }

    #[test]
    fn test_address_is_empty() {
        assert!(Address::default().is_empty());
        let addr = Address {
            city: Some("Denver".to_string()),
            ..Default::default()
        };
        assert!(!addr.is_empty());
    }
}
