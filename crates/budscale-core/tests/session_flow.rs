//! End-to-end session behaviour: drawing, calibrating, and syncing.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

use budscale_core::{
    CalibrationError, Dimensions, Rect, Region, RegionId, ReportState, Session, SessionDocument,
    SnapshotOutcome,
};

fn draw(session: &mut Session, from: (f64, f64), to: (f64, f64)) -> Option<Region> {
    session.begin_gesture(from.0, from.1).unwrap();
    session.update_gesture(f64::midpoint(from.0, to.0), f64::midpoint(from.1, to.1));
    session.end_gesture(to.0, to.1)
}

fn labels(session: &Session) -> Vec<String> {
    session
        .regions()
        .iter()
        .map(|r| r.label().to_owned())
        .collect()
}

#[test]
fn draw_calibrate_and_report() {
    let mut session = Session::new("grower");
    session.load_image(Dimensions::new(800, 600));

    let standard = draw(&mut session, (10.0, 10.0), (110.0, 60.0)).unwrap();
    let other = draw(&mut session, (400.0, 300.0), (200.0, 200.0)).unwrap();
    assert!(draw(&mut session, (0.0, 0.0), (3.0, 3.0)).is_none());
    assert_eq!(labels(&session), ["Bud A", "Bud B"]);

    assert_eq!(
        session.compute_report(),
        Err(CalibrationError::NoStandardSelected)
    );

    session.set_standard(standard.id()).unwrap();
    session.set_calibration(2.0, 1.0).unwrap();
    let report = session.compute_report().unwrap();

    assert_eq!(report.standard.pixel_width, 100.0);
    assert_eq!(report.standard.pixel_height, 50.0);
    assert_eq!(report.standard.ppc_width, 50.0);
    assert_eq!(report.standard.ppc_height, 50.0);

    let row = report.rows.iter().find(|r| &r.id == other.id()).unwrap();
    assert_eq!(row.width_cm, 4.0);
    assert_eq!(row.height_cm, 2.0);
    assert_eq!(row.area_cm2, 8.0);
    assert_eq!(session.report_state(), ReportState::Fresh);
}

#[test]
fn zero_width_calibration_is_rejected_by_engine() {
    let mut session = Session::new("grower");
    session.load_image(Dimensions::new(100, 100));
    let id = session.add_region(0.0, 0.0, 50.0, 50.0).unwrap().id().clone();
    session.set_standard(&id).unwrap();

    assert!(matches!(
        budscale_core::compute_report(session.regions(), Some(&id), 0.0, 1.0),
        Err(CalibrationError::InvalidCalibrationInput { .. })
    ));
}

#[test]
fn relabeling_keeps_standard_identity() {
    let mut session = Session::new("grower");
    session.load_image(Dimensions::new(500, 500));
    let ids: Vec<RegionId> = (0..4_u32)
        .map(|i| {
            let offset = f64::from(i) * 100.0;
            session.add_region(offset, offset, 50.0, 50.0).unwrap().id().clone()
        })
        .collect();

    session.set_standard(&ids[3]).unwrap();
    let _ = session.delete_region(&ids[0]);
    let _ = session.delete_region(&ids[2]);

    assert_eq!(labels(&session), ["Bud A", "Bud B"]);
    assert_eq!(session.standard_id(), Some(&ids[3]));
    assert_eq!(session.store().standard().unwrap().label(), "Bud B");
}

#[test]
fn snapshot_pushed_mid_gesture_does_not_affect_commit() {
    let mut local = Session::new("grower");
    local.load_image(Dimensions::new(300, 300));

    let mut remote = Session::new("grower");
    remote.load_image(Dimensions::new(300, 300));
    remote.add_region(200.0, 200.0, 40.0, 40.0).unwrap();
    let pushed: SessionDocument = remote.snapshot();

    local.begin_gesture(20.0, 30.0).unwrap();
    local.update_gesture(50.0, 50.0);
    assert_eq!(
        local.apply_snapshot(pushed.clone()),
        SnapshotOutcome::IgnoredDuringGesture
    );
    local.update_gesture(70.0, 90.0);
    let committed = local.end_gesture(70.0, 90.0).unwrap();

    assert_eq!(*committed.rect(), Rect::new(20.0, 30.0, 50.0, 60.0));
    assert_eq!(committed.label(), "Bud A");
    assert_eq!(local.regions().len(), 1);
}

#[test]
fn snapshot_json_round_trip_through_document() {
    let mut session = Session::new("grower");
    session.load_image(Dimensions::new(300, 300));
    session.add_region(0.0, 0.0, 40.0, 40.0).unwrap();
    let b = session.add_region(50.0, 50.0, 40.0, 20.0).unwrap().id().clone();
    session.set_standard(&b).unwrap();
    session.set_calibration(1.5, 0.75).unwrap();

    let json = serde_json::to_string(&session.snapshot()).unwrap();
    let doc: SessionDocument = serde_json::from_str(&json).unwrap();

    let mut restored = Session::new("grower");
    assert_eq!(restored.apply_snapshot(doc), SnapshotOutcome::Applied);
    assert_eq!(restored.regions(), session.regions());
    assert_eq!(restored.standard_id(), Some(&b));
    assert_eq!(restored.calibration(), session.calibration());
}

#[test]
fn hand_written_document_is_sanitized() {
    let json = r#"{
        "userId": "grower",
        "annotations": [
            {"id": "00000000-0000-0000-0000-000000000001", "x": 0, "y": 0, "w": 30, "h": 30, "label": "Bud Q"},
            {"id": "00000000-0000-0000-0000-000000000002", "x": 5, "y": 5, "w": 0, "h": 30},
            {"id": "00000000-0000-0000-0000-000000000003", "x": 40, "y": 40, "w": 30, "h": 20}
        ],
        "standardBudId": "00000000-0000-0000-0000-000000000002",
        "standardWidthCm": -3,
        "standardHeightCm": 2
    }"#;
    let doc: SessionDocument = serde_json::from_str(json).unwrap();

    let mut session = Session::new("grower");
    assert_eq!(session.apply_snapshot(doc), SnapshotOutcome::Applied);

    assert_eq!(labels(&session), ["Bud A", "Bud B"]);
    assert_eq!(session.standard_id(), None);
    assert_eq!(session.calibration().width_cm, 1.0);
    assert_eq!(session.calibration().height_cm, 2.0);
}

#[test]
fn document_from_earlier_writer_loads_and_reports() {
    // Short base-36 ids, text-encoded annotations, and a server timestamp
    // object the loader does not know about.
    let json = r#"{
        "userId": "grower",
        "annotations": "[{\"id\":\"lq9f3k2ab1x9\",\"x\":10,\"y\":10,\"w\":100,\"h\":50,\"label\":\"Bud A\"},{\"id\":\"lq9f3m7cd2y0\",\"x\":200,\"y\":200,\"w\":200,\"h\":100,\"label\":\"Bud B\"}]",
        "standardBudId": "lq9f3k2ab1x9",
        "standardWidthCm": 2,
        "standardHeightCm": 1,
        "lastUpdate": {"seconds": 1700000000, "nanoseconds": 0}
    }"#;
    let doc: SessionDocument = serde_json::from_str(json).unwrap();

    let mut session = Session::new("grower");
    assert_eq!(session.apply_snapshot(doc), SnapshotOutcome::Applied);
    assert_eq!(labels(&session), ["Bud A", "Bud B"]);
    assert_eq!(session.standard_id().map(RegionId::as_str), Some("lq9f3k2ab1x9"));

    let report = session.compute_report().unwrap();
    assert_eq!(report.standard.id.as_str(), "lq9f3k2ab1x9");
    assert_eq!(report.rows[1].id.as_str(), "lq9f3m7cd2y0");
    assert_eq!(report.rows[1].width_cm, 4.0);
    assert_eq!(report.rows[1].height_cm, 2.0);

    // Ids survive a write back unchanged.
    let written = serde_json::to_value(session.snapshot()).unwrap();
    assert_eq!(written["standardBudId"], "lq9f3k2ab1x9");
    assert_eq!(written["annotations"][1]["id"], "lq9f3m7cd2y0");
}

#[test]
fn regions_with_negative_origin_are_dropped_on_load() {
    let json = r#"{
        "userId": "grower",
        "annotations": [
            {"id": "a", "x": -50, "y": -20, "w": 30, "h": 30},
            {"id": "b", "x": 5, "y": 5, "w": 30, "h": 30}
        ],
        "standardBudId": "a"
    }"#;
    let doc: SessionDocument = serde_json::from_str(json).unwrap();

    let mut session = Session::new("grower");
    assert_eq!(session.apply_snapshot(doc), SnapshotOutcome::Applied);
    assert_eq!(session.regions().len(), 1);
    assert_eq!(session.regions()[0].id().as_str(), "b");
    assert_eq!(session.standard_id(), None);
}
