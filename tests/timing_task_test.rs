//! End-to-end checks of the timing task's filling rules through the store.

use calo_monitor::config::Settings;
use calo_monitor::event::{
    CollectionTag, DccHeader, Event, RecoFlag, RunHeader, RunType, UncalibRecHit,
};
use calo_monitor::geometry::{ChannelId, Geometry};
use calo_monitor::store::{ElementData, MonitorStore};
use calo_monitor::tasks::timing::TimingTask;
use calo_monitor::tasks::{MonitorTask, TaskContext};
use std::sync::Arc;

const FOLDER: &str = "Calorimeter/Timing";

fn make_task(store: &Arc<MonitorStore>, merge_runs: bool) -> TimingTask {
    let toml = format!(
        r#"
        [tasks.timing]
        type = "timing"
        merge_runs = {merge_runs}
        "#
    );
    let settings = Settings::from_toml(&toml).unwrap();
    TimingTask::new(TaskContext {
        name: "timing".to_string(),
        store: Some(Arc::clone(store)),
        settings: settings.tasks["timing"].clone(),
    })
}

fn geometry() -> Geometry {
    let mut g = Geometry::new();
    g.init_run(1);
    g
}

/// An event whose partition 3 (DCC 12) runs cosmics-global.
fn data_event(hits: Vec<UncalibRecHit>) -> Event {
    let mut event = Event::new(1);
    event.put_headers(
        CollectionTag::new("dcc-headers"),
        vec![DccHeader {
            dcc_id: 12,
            run_type: RunType::CosmicsGlobal,
        }],
    );
    event.put_hits(CollectionTag::new("uncalib-rechits"), hits);
    event
}

/// A hit on channel (10, 45), which sits in supermodule 3, local row 10,
/// column 5.
fn partition3_hit(amplitude: f64, jitter: f64, flag: RecoFlag) -> UncalibRecHit {
    UncalibRecHit {
        id: ChannelId::new(10, 45).unwrap(),
        amplitude,
        pedestal: 200.0,
        jitter,
        chi2: 1.0,
        flag,
    }
}

fn hist1d_content_at(store: &MonitorStore, name: &str, x: f64) -> f64 {
    let element = store.element(FOLDER, name).unwrap().snapshot();
    match element.data() {
        ElementData::Hist1D(h) => h.content_at(x),
        other => panic!("{name} is not 1D: {other:?}"),
    }
}

#[test]
fn high_amplitude_good_hit_lands_everywhere() {
    let store = Arc::new(MonitorStore::new());
    let mut task = make_task(&store, false);
    let geometry = geometry();

    task.begin_job().unwrap();
    let event = data_event(vec![partition3_hit(15.0, 2.0, RecoFlag::Good)]);
    task.analyze(&event, &geometry).unwrap();

    // Raw jitter 2.0 is deposited as 2.0 + 5.0 = 7.0.
    assert_eq!(hist1d_content_at(&store, "timing 1D SM+03", 7.0), 1.0);
    assert_eq!(hist1d_content_at(&store, "timing 1D summary", 7.0), 1.0);

    // The local profile map sees the (row, column) cell center.
    let map = store.element(FOLDER, "timing SM+03").unwrap().snapshot();
    match map.data() {
        ElementData::Profile2D(p) => {
            assert_eq!(p.entries_at(9.5, 4.5), 1.0);
            assert!((p.mean_at(9.5, 4.5) - 7.0).abs() < 1e-12);
        }
        other => panic!("unexpected shape: {other:?}"),
    }

    // Both angular projections use the channel's native coordinates:
    // eta 10 - 0.5 * (+1) = 9.5, phi 45 - 0.5 = 44.5.
    let proj_eta = store
        .element(FOLDER, "timing projection eta")
        .unwrap()
        .snapshot();
    match proj_eta.data() {
        ElementData::Profile1D(p) => {
            assert_eq!(p.entries_at(9.5), 1.0);
            assert!((p.mean_at(9.5) - 7.0).abs() < 1e-12);
        }
        other => panic!("unexpected shape: {other:?}"),
    }
    let proj_phi = store
        .element(FOLDER, "timing projection phi")
        .unwrap()
        .snapshot();
    match proj_phi.data() {
        ElementData::Profile1D(p) => {
            assert_eq!(p.entries_at(44.5), 1.0);
            assert!((p.mean_at(44.5) - 7.0).abs() < 1e-12);
        }
        other => panic!("unexpected shape: {other:?}"),
    }
    let map = store.element(FOLDER, "timing map").unwrap().snapshot();
    match map.data() {
        ElementData::Profile2D(p) => {
            assert!((p.mean_at(44.5, 9.5) - 7.0).abs() < 1e-12);
        }
        other => panic!("unexpected shape: {other:?}"),
    }

    // The amplitude-vs-jitter maps are filled as well.
    let amp = store
        .element(FOLDER, "timing vs amplitude SM+03")
        .unwrap();
    assert_eq!(amp.entries(), 1);
    let amp_summary = store
        .element(FOLDER, "timing vs amplitude summary")
        .unwrap();
    assert_eq!(amp_summary.entries(), 1);
}

#[test]
fn below_threshold_hit_fills_only_amplitude_maps() {
    let store = Arc::new(MonitorStore::new());
    let mut task = make_task(&store, false);
    let geometry = geometry();

    task.begin_job().unwrap();
    let event = data_event(vec![partition3_hit(5.0, 2.0, RecoFlag::Good)]);
    task.analyze(&event, &geometry).unwrap();

    let amp = store
        .element(FOLDER, "timing vs amplitude SM+03")
        .unwrap();
    assert_eq!(amp.entries(), 1);
    let amp_summary = store
        .element(FOLDER, "timing vs amplitude summary")
        .unwrap();
    assert_eq!(amp_summary.entries(), 1);

    assert_eq!(
        store.element(FOLDER, "timing 1D SM+03").unwrap().entries(),
        0
    );
    assert_eq!(
        store.element(FOLDER, "timing 1D summary").unwrap().entries(),
        0
    );
    assert_eq!(
        store
            .element(FOLDER, "timing projection eta")
            .unwrap()
            .entries(),
        0
    );
}

#[test]
fn bad_quality_hit_fills_nothing() {
    let store = Arc::new(MonitorStore::new());
    let mut task = make_task(&store, false);
    let geometry = geometry();

    task.begin_job().unwrap();
    let event = data_event(vec![partition3_hit(15.0, 2.0, RecoFlag::Poor)]);
    task.analyze(&event, &geometry).unwrap();

    assert_eq!(
        store
            .element(FOLDER, "timing vs amplitude SM+03")
            .unwrap()
            .entries(),
        0
    );
    assert_eq!(
        store.element(FOLDER, "timing 1D SM+03").unwrap().entries(),
        0
    );
}

#[test]
fn negative_amplitude_is_clamped_to_zero() {
    let store = Arc::new(MonitorStore::new());
    let mut task = make_task(&store, false);
    let geometry = geometry();

    task.begin_job().unwrap();
    // Raw jitter -7.0 shifts to -2.0 and clamps to 0 as well.
    let event = data_event(vec![partition3_hit(-3.0, -7.0, RecoFlag::Good)]);
    task.analyze(&event, &geometry).unwrap();

    let amp = store
        .element(FOLDER, "timing vs amplitude SM+03")
        .unwrap()
        .snapshot();
    match amp.data() {
        ElementData::Hist2D(h) => {
            // The deposit sits exactly at (0, 0), never below.
            assert_eq!(h.content_at(0.0, 0.0), 1.0);
            assert_eq!(h.out_of_range(), 0.0);
        }
        other => panic!("unexpected shape: {other:?}"),
    }
}

#[test]
fn data_events_filter_unqualified_partitions_per_hit() {
    let store = Arc::new(MonitorStore::new());
    let mut task = make_task(&store, false);
    let geometry = geometry();

    task.begin_job().unwrap();

    // Partition 3 qualifies; partition 1 reports a laser run. The event is
    // enabled but hits in partition 1 must be dropped by the per-hit check.
    let mut event = Event::new(1);
    event.put_headers(
        CollectionTag::new("dcc-headers"),
        vec![
            DccHeader {
                dcc_id: 12,
                run_type: RunType::CosmicsGlobal,
            },
            DccHeader {
                dcc_id: 10,
                run_type: RunType::Laser,
            },
        ],
    );
    let partition1_hit = UncalibRecHit {
        id: ChannelId::new(10, 5).unwrap(),
        amplitude: 15.0,
        pedestal: 200.0,
        jitter: 2.0,
        chi2: 1.0,
        flag: RecoFlag::Good,
    };
    event.put_hits(
        CollectionTag::new("uncalib-rechits"),
        vec![partition3_hit(15.0, 2.0, RecoFlag::Good), partition1_hit],
    );
    task.analyze(&event, &geometry).unwrap();

    assert_eq!(
        store.element(FOLDER, "timing 1D SM+03").unwrap().entries(),
        1
    );
    assert_eq!(
        store.element(FOLDER, "timing 1D SM+01").unwrap().entries(),
        0
    );
    // The summary only sees the qualified hit.
    assert_eq!(
        store.element(FOLDER, "timing 1D summary").unwrap().entries(),
        1
    );
}

#[test]
fn simulation_events_skip_partition_filtering() {
    let store = Arc::new(MonitorStore::new());
    let mut task = make_task(&store, false);
    let geometry = geometry();

    task.begin_job().unwrap();

    // No header collection at all: the event is treated as simulation and
    // every hit is processed, regardless of partition run types.
    let mut event = Event::new(1);
    event.put_hits(
        CollectionTag::new("uncalib-rechits"),
        vec![partition3_hit(15.0, 2.0, RecoFlag::Good)],
    );
    task.analyze(&event, &geometry).unwrap();

    assert_eq!(
        store.element(FOLDER, "timing 1D SM+03").unwrap().entries(),
        1
    );
}

#[test]
fn run_boundary_resets_unless_merging() {
    let store = Arc::new(MonitorStore::new());
    let geometry = geometry();

    for (merge_runs, expected_after_boundary) in [(false, 0u64), (true, 1u64)] {
        let mut task = make_task(&store, merge_runs);
        task.begin_job().unwrap();

        let event = data_event(vec![partition3_hit(15.0, 2.0, RecoFlag::Good)]);
        task.analyze(&event, &geometry).unwrap();
        assert_eq!(
            store.element(FOLDER, "timing 1D SM+03").unwrap().entries(),
            1
        );

        task.begin_run(&RunHeader { number: 2 }, &geometry).unwrap();
        assert_eq!(
            store.element(FOLDER, "timing 1D SM+03").unwrap().entries(),
            expected_after_boundary,
            "merge_runs = {merge_runs}"
        );
    }
}

#[test]
fn cleanup_then_rebooking_restores_identical_shapes() {
    let store = Arc::new(MonitorStore::new());
    let mut task = make_task(&store, false);
    let geometry = geometry();

    task.begin_job().unwrap();
    let event = data_event(vec![partition3_hit(15.0, 2.0, RecoFlag::Good)]);
    task.analyze(&event, &geometry).unwrap();

    let before = store.element(FOLDER, "timing 1D SM+03").unwrap().snapshot();

    task.cleanup();
    assert_eq!(store.element_count(), 0);

    task.analyze(&event, &geometry).unwrap();
    let after = store.element(FOLDER, "timing 1D SM+03").unwrap().snapshot();

    assert_eq!(before.name(), after.name());
    match (before.data(), after.data()) {
        (ElementData::Hist1D(a), ElementData::Hist1D(b)) => {
            assert_eq!(a.axis.nbins, b.axis.nbins);
            assert_eq!(a.axis.low, b.axis.low);
            assert_eq!(a.axis.high, b.axis.high);
        }
        other => panic!("unexpected shapes: {other:?}"),
    }
}
