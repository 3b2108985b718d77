//! HTTP API handlers for slb-web

pub mod attachments;
pub mod catalog;
pub mod enroll;
pub mod health;
pub mod sse;
pub mod ui;

pub use attachments::{add_note, attachments_json, download_file, sample_page, upload_file};
pub use catalog::{archived_samples, data, scan_records, scan_status};
pub use enroll::{archive_json, archive_redirect, enroll_json};
pub use health::health_routes;
pub use sse::event_stream;
pub use ui::{add_form, serve_index, submit_add_form};

use crate::error::{ApiError, ApiResult};
use slb_common::TagId;

/// Parse a tag identifier taken from a URL or form
pub(crate) fn parse_uid(raw: &str) -> ApiResult<TagId> {
    TagId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Minimal HTML escaping for server-rendered pages
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"S&P\"</b>"), "&lt;b&gt;&quot;S&amp;P&quot;&lt;/b&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_parse_uid() {
        assert_eq!(parse_uid("04a1b2c3").unwrap().as_str(), "04A1B2C3");
        assert!(matches!(parse_uid("../x"), Err(ApiError::BadRequest(_))));
    }
}
