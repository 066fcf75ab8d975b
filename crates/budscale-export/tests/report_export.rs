//! Integration test: load a stored session document, compute its report, and export to Markdown.

#![allow(clippy::unwrap_used)]

use budscale_core::{Session, SessionDocument, SnapshotOutcome};
use budscale_export::{ReportMetadata, to_markdown};

const DOCUMENT: &str = r#"{
    "userId": "grower",
    "annotations": [
        {"id": "6f1c3c1e-8d44-4a63-a2a8-0b1b6cfa0001", "x": 12, "y": 20, "w": 100, "h": 50},
        {"id": "6f1c3c1e-8d44-4a63-a2a8-0b1b6cfa0002", "x": 300, "y": 40, "w": 200, "h": 100},
        {"id": "6f1c3c1e-8d44-4a63-a2a8-0b1b6cfa0003", "x": 80, "y": 220, "w": 50, "h": 25}
    ],
    "standardBudId": "6f1c3c1e-8d44-4a63-a2a8-0b1b6cfa0001",
    "standardWidthCm": 2,
    "standardHeightCm": 1,
    "lastUpdateMs": 1760000000000
}"#;

#[test]
fn stored_session_to_markdown() {
    let doc: SessionDocument = serde_json::from_str(DOCUMENT).unwrap();
    let mut session = Session::new(doc.user_id.clone());
    assert_eq!(session.apply_snapshot(doc), SnapshotOutcome::Applied);

    let report = session.compute_report().unwrap();
    let md = to_markdown(
        Some(&report),
        None,
        &ReportMetadata {
            source: Some("buds.jpg"),
            timestamp: Some("2026-10-18 09:30:00 +00:00"),
        },
    )
    .unwrap();

    assert!(md.contains("(Standard: Bud A)"));
    assert!(md.contains("| Bud A | 2.00 | 1.00 | **2.00** |"));
    assert!(md.contains("| Bud B | 4.00 | 2.00 | **8.00** |"));
    assert!(md.contains("| Bud C | 1.00 | 0.50 | **0.50** |"));
    assert!(md.contains("_Exported: 2026-10-18 09:30:00 +00:00_"));
}
