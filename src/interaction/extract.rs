//! Classifies the URLs in a message into backend ticket references.

use crate::{
    base::types::{BackendReference, UrlSpan},
    service::tracker::TrackerClient,
};

/// Extracts one reference per URL span that some backend recognizes.
///
/// Spans are visited in order and the first matching backend wins. Duplicate
/// links yield duplicate references. Spans that do not fit the text, and URLs
/// no backend recognizes, are skipped.
pub fn extract_references(text: &str, spans: &[UrlSpan], trackers: &[TrackerClient]) -> Vec<BackendReference> {
    spans
        .iter()
        .filter_map(|span| span.slice(text))
        .filter_map(|url| trackers.iter().find_map(|tracker| tracker.match_reference(url)))
        .collect()
}

// Tests.
