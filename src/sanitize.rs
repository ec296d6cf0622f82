// src/sanitize.rs
//
// Output sanitization for strings that originate from the scanned site.
// Generator contents, final URLs and version strings are attacker-controlled.

use crate::core::DetectionReport;
use html_escape::encode_text;

/// Sanitizes a detection report before it is printed
///
/// Remote-sourced fields (final URL, signals, version) are stripped of control
/// characters and HTML-escaped so the output is safe to paste into a page or
/// a terminal. Catalog-defined fields pass through unchanged.
///
/// # Arguments
/// * `report` - The report to sanitize
///
/// # Returns
/// * `DetectionReport` - A sanitized copy of the input report
pub fn sanitize_report(report: &DetectionReport) -> DetectionReport {
    DetectionReport {
        domain: report.domain.clone(),
        url_checked: sanitize_string(&report.url_checked),
        cms: report.cms.clone(),
        confidence: report.confidence,
        signals: report.signals.iter().map(|s| sanitize_string(s)).collect(),
        version: report.version.as_ref().map(|v| sanitize_string(v)),
        elapsed_ms: report.elapsed_ms,
    }
}

/// Removes control characters and encodes HTML entities
///
/// # Arguments
/// * `value` - String to sanitize
///
/// # Returns
/// * `String` - Sanitized string
pub fn sanitize_string(value: &str) -> String {
    let filtered = value
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>();

    encode_text(&filtered).to_string()
}
