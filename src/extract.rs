//! Field extraction from rendered markup.
//!
//! All lookups return `None` (or an empty list) on a miss. Registry markup is
//! only loosely structured, so a missing region is the normal case for many
//! comments rather than a fault.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How label/value pairs are laid out in the markup.
///
/// The registry renders metadata as `<li><h4>Label</h4><p class="mb-0">Value</p></li>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelLayout {
    /// Element that holds both the label and its value.
    #[serde(default = "default_label_item")]
    pub item: String,
    /// Value node inside the item.
    #[serde(default = "default_label_value")]
    pub value: String,
}

fn default_label_item() -> String {
    "li".to_string()
}

fn default_label_value() -> String {
    "p.mb-0".to_string()
}

impl Default for LabelLayout {
    fn default() -> Self {
        Self {
            item: default_label_item(),
            value: default_label_value(),
        }
    }
}

/// Parse a CSS selector, logging and returning `None` when it is invalid.
pub fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!("Invalid selector {:?}: {}", selector, e);
            None
        }
    }
}

/// Concatenated text content of an element, trimmed.
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Collapse runs of whitespace to single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// First element matching `selector` within `scope`.
pub fn select_first<'a>(scope: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let sel = parse_selector(selector)?;
    scope.select(&sel).next()
}

/// All elements matching `selector` within `scope`, in document order.
pub fn select_all<'a>(scope: ElementRef<'a>, selector: &str) -> Vec<ElementRef<'a>> {
    match parse_selector(selector) {
        Some(sel) => scope.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// First element of a whole document matching `selector`.
pub fn select_region<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    select_first(document.root_element(), selector)
}

/// First element matching `selector` whose text contains `needle`.
pub fn find_containing<'a>(
    scope: ElementRef<'a>,
    selector: &str,
    needle: &str,
) -> Option<ElementRef<'a>> {
    select_all(scope, selector)
        .into_iter()
        .find(|el| el.text().collect::<String>().contains(needle))
}

/// Trimmed text of the first element matching `selector`.
pub fn extract_text(scope: ElementRef<'_>, selector: &str) -> Option<String> {
    let found = select_first(scope, selector);
    if found.is_none() {
        debug!("No match for selector {:?}", selector);
    }
    found.map(text_of).and_then(non_empty)
}

/// Value paired with the label `label`.
///
/// The label text of an item is its full text with the value text removed.
/// An exact label match wins. Otherwise a label that only adds punctuation,
/// such as "City:", is accepted. "Mailing Address" never resolves to the
/// value of "Mailing Address 2".
pub fn extract_by_label(scope: ElementRef<'_>, label: &str, layout: &LabelLayout) -> Option<String> {
    let item_sel = parse_selector(&layout.item)?;
    let value_sel = parse_selector(&layout.value)?;
    let wanted = normalize_whitespace(label);

    let mut partial = None;
    for item in scope.select(&item_sel) {
        let Some(value) = item.select(&value_sel).next() else {
            continue;
        };
        let value_text = normalize_whitespace(&value.text().collect::<String>());
        let full_text = normalize_whitespace(&item.text().collect::<String>());
        let label_text = match full_text.strip_suffix(value_text.as_str()) {
            Some(head) => normalize_whitespace(head),
            None => normalize_whitespace(&full_text.replacen(&value_text, "", 1)),
        };

        if label_text == wanted {
            return non_empty(value_text);
        }
        if partial.is_none() && is_decorated_label(&label_text, &wanted) {
            partial = non_empty(value_text);
        }
    }

    if partial.is_none() {
        debug!("No value found for label {:?}", label);
    }
    partial
}

/// `label_text` is `wanted` plus only punctuation or symbols, as in "City:".
fn is_decorated_label(label_text: &str, wanted: &str) -> bool {
    label_text.contains(wanted)
        && !label_text
            .replacen(wanted, "", 1)
            .chars()
            .any(char::is_alphanumeric)
}

/// Text of the element matching `selector` that carries `label`, with the
/// label removed. Used for listing cards, where label and value share one node.
///
/// An element whose text starts with the label wins over one that merely contains it.
pub fn extract_labeled_text(scope: ElementRef<'_>, selector: &str, label: &str) -> Option<String> {
    let candidates: Vec<String> = select_all(scope, selector)
        .into_iter()
        .map(|el| normalize_whitespace(&text_of(el)))
        .filter(|text| text.contains(label))
        .collect();
    let text = candidates
        .iter()
        .find(|text| text.starts_with(label))
        .or_else(|| candidates.first())?;
    non_empty(normalize_whitespace(&text.replacen(label, "", 1)))
}

/// `href`s of download anchors inside `fragment`, in document order.
///
/// An anchor qualifies if it has the `download` class or contains a child
/// element whose text is exactly "Download".
pub fn extract_download_links(fragment: ElementRef<'_>) -> Vec<String> {
    let Some(anchor_sel) = parse_selector("a[href]") else {
        return Vec::new();
    };

    fragment
        .select(&anchor_sel)
        .filter(|link| {
            link.value().classes().any(|c| c == "download")
                || link
                    .descendants()
                    .skip(1)
                    .filter_map(ElementRef::wrap)
                    .any(|child| text_of(child) == "Download")
        })
        .filter_map(|link| link.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBMITTER_HTML: &str = r#"
        <div id="tab-submitter-info">
          <ul>
            <li><h4>Submitter Name</h4><p class="mb-0"> Jane   Doe </p></li>
            <li><h4>Mailing Address 2</h4><p class="mb-0">Suite 4</p></li>
            <li><h4>Mailing Address</h4><p class="mb-0">12 Main St</p></li>
            <li><h4>City</h4><p class="mb-0">Denver</p></li>
            <li><h4>Country</h4><p class="mb-0"></p></li>
          </ul>
        </div>
    "#;

    #[test]
    fn test_extract_by_label_prefers_exact_match() {
        let doc = Html::parse_document(SUBMITTER_HTML);
        let layout = LabelLayout::default();
        let root = doc.root_element();

        assert_eq!(
            extract_by_label(root, "Mailing Address", &layout),
            Some("12 Main St".to_string())
        );
        assert_eq!(
            extract_by_label(root, "Mailing Address 2", &layout),
            Some("Suite 4".to_string())
        );
        assert_eq!(
            extract_by_label(root, "Submitter Name", &layout),
            Some("Jane Doe".to_string())
        );
    }

    #[test]
    fn test_extract_by_label_missing_is_none() {
        let doc = Html::parse_document(SUBMITTER_HTML);
        let layout = LabelLayout::default();
        assert_eq!(extract_by_label(doc.root_element(), "ZIP/Postal Code", &layout), None);
        // Present label with empty value is also absent
        assert_eq!(extract_by_label(doc.root_element(), "Country", &layout), None);
    }

    #[test]
    fn test_extract_by_label_ignores_longer_label() {
        let doc = Html::parse_document(
            r#"<ul>
                <li><h4>Mailing Address 2</h4><p class="mb-0">Suite 4</p></li>
                <li><h4>City</h4><p class="mb-0">Denver</p></li>
            </ul>"#,
        );
        let root = doc.root_element();
        let layout = LabelLayout::default();
        assert_eq!(extract_by_label(root, "Mailing Address", &layout), None);
        assert_eq!(
            extract_by_label(root, "Mailing Address 2", &layout),
            Some("Suite 4".to_string())
        );
    }

    #[test]
    fn test_extract_by_label_substring_fallback() {
        let doc = Html::parse_document(
            r#"<ul><li><h4>State or Province:</h4><p class="mb-0">CO</p></li></ul>"#,
        );
        assert_eq!(
            extract_by_label(doc.root_element(), "State or Province", &LabelLayout::default()),
            Some("CO".to_string())
        );
    }

    #[test]
    fn test_extract_text() {
        let doc = Html::parse_document(r#"<div class="px-2">  Please reconsider.  </div>"#);
        assert_eq!(
            extract_text(doc.root_element(), "div.px-2"),
            Some("Please reconsider.".to_string())
        );
        assert_eq!(extract_text(doc.root_element(), "div.missing"), None);
        // Invalid selectors are a miss, not a panic
        assert_eq!(extract_text(doc.root_element(), "div[[["), None);
    }

    #[test]
    fn test_extract_labeled_text() {
        let doc = Html::parse_document(
            r#"<ul><li>Agency <span>PHMSA</span></li><li>ID PHMSA-2011-0023-0407</li></ul>"#,
        );
        let root = doc.root_element();
        assert_eq!(
            extract_labeled_text(root, "li", "Agency"),
            Some("PHMSA".to_string())
        );
        assert_eq!(
            extract_labeled_text(root, "li", "ID"),
            Some("PHMSA-2011-0023-0407".to_string())
        );
        assert_eq!(extract_labeled_text(root, "li", "Posted"), None);
    }

    #[test]
    fn test_extract_labeled_text_prefers_leading_label() {
        let doc = Html::parse_document(
            r#"<ul><li>Agency Office of IDs</li><li>ID  EPA-HQ-0001 </li></ul>"#,
        );
        assert_eq!(
            extract_labeled_text(doc.root_element(), "li", "ID"),
            Some("EPA-HQ-0001".to_string())
        );
    }

    #[test]
    fn test_extract_download_links() {
        let doc = Html::parse_document(
            r#"
            <div class="card-block">
              <a href="/view/1">View</a>
              <a class="btn download" href="/files/1.pdf">PDF</a>
              <a href="/files/1.docx"><span>Download</span></a>
              <a class="download">no href</a>
            </div>
            "#,
        );
        assert_eq!(
            extract_download_links(doc.root_element()),
            vec!["/files/1.pdf".to_string(), "/files/1.docx".to_string()]
        );
    }

    #[test]
    fn test_extract_download_links_empty() {
        let doc = Html::parse_document(r#"<div><a href="/x">x</a></div>"#);
        assert!(extract_download_links(doc.root_element()).is_empty());
    }
}
