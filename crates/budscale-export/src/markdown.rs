//! Markdown export serializer.
//!
//! A report renders as two GitHub-style tables: a calibration summary
//! for the standard, then one row per region in collection order.
//!
//! ## Precision
//!
//! Real-world values (cm, cm², pixels per cm) are formatted to two
//! decimal places. Standard pixel sizes are formatted with no decimals.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use std::fmt::Write;

use budscale_core::Report;

/// Default file name for a downloaded report.
pub const REPORT_FILE_NAME: &str = "bud_dimension_analysis_report.md";

/// Optional lines emitted under the document heading.
#[derive(Debug, Clone, Default)]
pub struct ReportMetadata<'a> {
    /// Source image name, emitted as `_Source: <name>_`.
    pub source: Option<&'a str>,

    /// Export timestamp, emitted as `_Exported: <timestamp>_`.
    pub timestamp: Option<&'a str>,
}

/// Render a dimension report as Markdown.
///
/// # Examples
///
/// ```
/// use budscale_core::Session;
/// use budscale_export::report_to_markdown;
///
/// let mut session = Session::new("user");
/// let id = session.add_region(0.0, 0.0, 100.0, 50.0).unwrap().id().clone();
/// session.set_standard(&id).unwrap();
/// session.set_calibration(2.0, 1.0).unwrap();
/// let md = report_to_markdown(&session.compute_report().unwrap());
/// assert!(md.contains("| Calculated PPC (W) | 50.00 Pixels/cm |"));
/// ```
#[must_use]
pub fn report_to_markdown(report: &Report) -> String {
    let s = &report.standard;
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        "### \u{2696}\u{fe0f} Dimension Comparison Report (Standard: {})",
        s.label
    );
    out.push_str("| Key Metric | Value |\n");
    out.push_str("|:---|:---|\n");
    let _ = writeln!(
        out,
        "| Standard Bud Pixel (W x H) | {:.0}px x {:.0}px |",
        s.pixel_width, s.pixel_height
    );
    let _ = writeln!(
        out,
        "| **Standard Bud Real (W x H)** | **{:.2}cm x {:.2}cm** |",
        s.width_cm, s.height_cm
    );
    let _ = writeln!(out, "| Calculated PPC (W) | {:.2} Pixels/cm |", s.ppc_width);
    let _ = writeln!(out, "| Calculated PPC (H) | {:.2} Pixels/cm |", s.ppc_height);
    out.push('\n');

    out.push_str("### Bud Dimensions\n");
    out.push_str("| Bud | Width (cm) | Height (cm) | Area (cm\u{b2}) |\n");
    out.push_str("|:---:|:----------:|:-----------:|:----------:|\n");
    for row in &report.rows {
        let _ = writeln!(
            out,
            "| {} | {:.2} | {:.2} | **{:.2}** |",
            row.label, row.width_cm, row.height_cm, row.area_cm2
        );
    }

    out
}

/// Wrap free-form analysis text as a Markdown section.
#[must_use]
pub fn analysis_to_markdown(text: &str) -> String {
    let mut out = String::from("### \u{1f52c} AI Descriptive Analysis\n\n");
    out.push_str(text.trim_end());
    out.push('\n');
    out
}

/// Build a complete downloadable document from whichever parts exist.
///
/// Returns `None` when there is neither a report nor an analysis, so
/// callers never write an empty file.
#[must_use]
pub fn to_markdown(
    report: Option<&Report>,
    analysis: Option<&str>,
    metadata: &ReportMetadata<'_>,
) -> Option<String> {
    if report.is_none() && analysis.is_none() {
        return None;
    }

    let mut out = String::from("# Bud Dimension Analysis\n\n");
    if let Some(source) = metadata.source {
        let _ = writeln!(out, "_Source: {source}_  ");
    }
    if let Some(timestamp) = metadata.timestamp {
        let _ = writeln!(out, "_Exported: {timestamp}_  ");
    }
    if metadata.source.is_some() || metadata.timestamp.is_some() {
        out.push('\n');
    }

    if let Some(report) = report {
        out.push_str(&report_to_markdown(report));
    }
    if let Some(text) = analysis {
        if report.is_some() {
            out.push('\n');
        }
        out.push_str(&analysis_to_markdown(text));
    }
    Some(out)
}
