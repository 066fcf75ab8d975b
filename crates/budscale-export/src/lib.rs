//! budscale-export: Pure report serializers (sans-IO)
//!
//! Renders dimension reports and analysis text as Markdown. All rounding
//! for presentation happens here; the core keeps full precision.

pub mod markdown;

pub use markdown::{
    REPORT_FILE_NAME, ReportMetadata, analysis_to_markdown, report_to_markdown, to_markdown,
};
