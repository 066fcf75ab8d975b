//! budscale-core: bud annotation and calibration engine (sans-IO).
//!
//! Users draw rectangular regions ("buds") over a photo, pick one as the
//! size standard, declare its real-world size, and get every region's
//! width, height, and area in centimetres:
//!
//! annotation store -> standard selection -> calibration -> report.
//!
//! This crate has **no I/O dependencies**: it holds the session state and
//! computes reports and prompts in memory. Persistence, the analysis
//! service client, and raster handling live in `budscale-io`.

pub mod calibration;
pub mod document;
pub mod gesture;
pub mod label;
pub mod prompt;
pub mod session;
pub mod store;
pub mod types;

pub use calibration::{
    CalibrationError, CalibrationSettings, Report, ReportRow, StandardSummary, compute_report,
};
pub use document::{DocumentKey, SessionDocument};
pub use gesture::DrawGesture;
pub use prompt::{MAX_PROMPT_CHARS, PromptError, build_prompt};
pub use session::{ReportState, Session, SessionError, SnapshotOutcome};
pub use store::{AnnotationStore, RegionRejected, RemoveOutcome, StandardError};
pub use types::{Dimensions, EmptyRegionId, MIN_REGION_SIZE, Rect, Region, RegionId};
