//! Timing monitoring task.
//!
//! Watches the jitter of uncalibrated reconstructed hits, per supermodule and
//! detector-wide. Every event is first classified from its DCC headers: only
//! run types that produce physics-like signals (cosmic, physics and the
//! legacy combined test run, in their global and local variants) enable
//! monitoring. Booking is lazy — elements are created on the first enabled
//! event — and the merge-runs switch decides whether accumulated statistics
//! survive a run boundary.

use crate::config::TaskSettings;
use crate::error::MonitorResult;
use crate::event::{Event, RunHeader, RunType};
use crate::geometry::{Geometry, SubDetector, CRYSTALS_PER_ROW, SUPERMODULES};
use crate::store::{ElementHandle, ErrorMode, MonitorStore};
use crate::tasks::{MonitorTask, TaskContext};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Jitter axis: 50 bins over [0, 10] clocks.
const JITTER_BINS: usize = 50;
const JITTER_LOW: f64 = 0.0;
const JITTER_HIGH: f64 = 10.0;

/// Amplitude axis: 100 bins over [0, 200] ADC counts.
const AMPLITUDE_BINS: usize = 100;
const AMPLITUDE_LOW: f64 = 0.0;
const AMPLITUDE_HIGH: f64 = 200.0;

/// Shift applied to raw jitter so the distribution sits in the positive
/// display range.
const JITTER_SHIFT: f64 = 5.0;

/// Hits below this amplitude only enter the amplitude-vs-jitter maps.
const AMPLITUDE_THRESHOLD: f64 = 12.0;

/// Local map axes: 85 rows by 20 columns per supermodule.
const LOCAL_ROWS: usize = 85;
const LOCAL_COLS: usize = 20;

/// Detector-wide map axes over global (phi, eta).
const SUMMARY_PHI_BINS: usize = 72;
const SUMMARY_ETA_BINS: usize = 34;

/// Run types that qualify an event (or a partition) for timing monitoring.
fn accepts(run_type: RunType) -> bool {
    matches!(
        run_type,
        RunType::Cosmic
            | RunType::Mtcc
            | RunType::CosmicsGlobal
            | RunType::PhysicsGlobal
            | RunType::CosmicsLocal
            | RunType::PhysicsLocal
    )
}

/// Outcome of classifying one event from its DCC headers.
#[derive(Debug)]
pub struct EventClassification {
    /// False when the header collection was absent (simulation input).
    pub is_data: bool,
    /// True when at least one partition qualifies, or the event is not data.
    pub enable: bool,
    /// Run type reported per supermodule, recomputed every event.
    pub run_types: [Option<RunType>; SUPERMODULES],
}

/// The timing monitoring task.
pub struct TimingTask {
    name: String,
    store: Option<Arc<MonitorStore>>,
    settings: TaskSettings,
    booked: bool,
    events: u64,
    me_jitter: [Option<ElementHandle>; SUPERMODULES],
    me_jitter_map: [Option<ElementHandle>; SUPERMODULES],
    me_amp_jitter: [Option<ElementHandle>; SUPERMODULES],
    me_amp_jitter_summary: Option<ElementHandle>,
    me_jitter_summary: Option<ElementHandle>,
    me_summary_map: Option<ElementHandle>,
    me_summary_proj_eta: Option<ElementHandle>,
    me_summary_proj_phi: Option<ElementHandle>,
}

impl TimingTask {
    /// Builds the task from its context. No booking happens here.
    pub fn new(ctx: TaskContext) -> Self {
        Self {
            name: ctx.name,
            store: ctx.store,
            settings: ctx.settings,
            booked: false,
            events: 0,
            me_jitter: std::array::from_fn(|_| None),
            me_jitter_map: std::array::from_fn(|_| None),
            me_amp_jitter: std::array::from_fn(|_| None),
            me_amp_jitter_summary: None,
            me_jitter_summary: None,
            me_summary_map: None,
            me_summary_proj_eta: None,
            me_summary_proj_phi: None,
        }
    }

    fn folder(&self) -> String {
        format!("{}/Timing", self.settings.prefix)
    }

    /// Whether the element set is currently booked.
    pub fn is_booked(&self) -> bool {
        self.booked
    }

    /// Events analyzed since begin-of-job.
    pub fn events_analyzed(&self) -> u64 {
        self.events
    }

    /// Classifies an event from its DCC headers.
    ///
    /// An absent header collection marks the event as non-data and forces
    /// `enable` so simulation-only inputs are not dropped.
    pub fn classify(
        &self,
        event: &Event,
        geometry: &Geometry,
    ) -> MonitorResult<EventClassification> {
        let mut class = EventClassification {
            is_data: true,
            enable: false,
            run_types: [None; SUPERMODULES],
        };

        let Some(headers) = event.headers(&self.settings.dcc_header_collection) else {
            class.is_data = false;
            class.enable = true;
            warn!(
                task = %self.name,
                collection = %self.settings.dcc_header_collection,
                "collection not available"
            );
            return Ok(class);
        };

        for header in headers {
            if Geometry::sub_detector(header.dcc_id) != Some(SubDetector::Barrel) {
                continue;
            }
            let Some(sm) = geometry.supermodule_for_dcc(header.dcc_id)? else {
                continue;
            };
            class.run_types[sm as usize - 1] = Some(header.run_type);
            if accepts(header.run_type) {
                class.enable = true;
            }
        }

        Ok(class)
    }

    fn book(&mut self) {
        self.booked = true;

        let Some(store) = &self.store else { return };
        store.set_current_folder(&self.folder());

        for i in 0..SUPERMODULES {
            let sm = (i + 1) as u32;
            let label = Geometry::sm_label(sm);

            let name = format!("timing 1D {label}");
            let me = store.book_1d(&name, &name, JITTER_BINS, JITTER_LOW, JITTER_HIGH);
            me.set_axis_title("jitter (clocks)", 1);
            store.tag(&me, sm);
            self.me_jitter[i] = Some(me);

            let name = format!("timing {label}");
            let me = store.book_profile_2d(
                &name,
                &name,
                LOCAL_ROWS,
                0.0,
                LOCAL_ROWS as f64,
                LOCAL_COLS,
                0.0,
                LOCAL_COLS as f64,
                JITTER_LOW,
                JITTER_HIGH,
                ErrorMode::Spread,
            );
            me.set_axis_title("ieta", 1);
            me.set_axis_title("iphi", 2);
            me.set_axis_title("jitter (clocks)", 3);
            store.tag(&me, sm);
            self.me_jitter_map[i] = Some(me);

            let name = format!("timing vs amplitude {label}");
            let me = store.book_2d(
                &name,
                &name,
                AMPLITUDE_BINS,
                AMPLITUDE_LOW,
                AMPLITUDE_HIGH,
                JITTER_BINS,
                JITTER_LOW,
                JITTER_HIGH,
            );
            me.set_axis_title("amplitude", 1);
            me.set_axis_title("jitter (clocks)", 2);
            store.tag(&me, sm);
            self.me_amp_jitter[i] = Some(me);
        }

        let name = "timing vs amplitude summary";
        let me = store.book_2d(
            name,
            name,
            AMPLITUDE_BINS,
            AMPLITUDE_LOW,
            AMPLITUDE_HIGH,
            JITTER_BINS,
            JITTER_LOW,
            JITTER_HIGH,
        );
        me.set_axis_title("amplitude", 1);
        me.set_axis_title("jitter (clocks)", 2);
        self.me_amp_jitter_summary = Some(me);

        let name = "timing 1D summary";
        let me = store.book_1d(name, name, JITTER_BINS, JITTER_LOW, JITTER_HIGH);
        me.set_axis_title("jitter (clocks)", 1);
        self.me_jitter_summary = Some(me);

        let name = "timing map";
        let me = store.book_profile_2d(
            name,
            name,
            SUMMARY_PHI_BINS,
            0.0,
            360.0,
            SUMMARY_ETA_BINS,
            -85.0,
            85.0,
            JITTER_LOW,
            JITTER_HIGH,
            ErrorMode::Spread,
        );
        me.set_axis_title("jphi", 1);
        me.set_axis_title("jeta", 2);
        me.set_axis_title("jitter (clocks)", 3);
        self.me_summary_map = Some(me);

        let name = "timing projection eta";
        let me = store.book_profile(
            name,
            name,
            SUMMARY_ETA_BINS,
            -85.0,
            85.0,
            JITTER_LOW,
            JITTER_HIGH,
            ErrorMode::Spread,
        );
        me.set_axis_title("jeta", 1);
        me.set_axis_title("jitter (clocks)", 2);
        self.me_summary_proj_eta = Some(me);

        let name = "timing projection phi";
        let me = store.book_profile(
            name,
            name,
            SUMMARY_PHI_BINS,
            0.0,
            360.0,
            JITTER_LOW,
            JITTER_HIGH,
            ErrorMode::Spread,
        );
        me.set_axis_title("jphi", 1);
        me.set_axis_title("jitter (clocks)", 2);
        self.me_summary_proj_phi = Some(me);
    }

    fn reset(&mut self) {
        for me in self.me_jitter.iter().flatten() {
            me.reset();
        }
        for me in self.me_jitter_map.iter().flatten() {
            me.reset();
        }
        for me in self.me_amp_jitter.iter().flatten() {
            me.reset();
        }
        if let Some(me) = &self.me_amp_jitter_summary {
            me.reset();
        }
        if let Some(me) = &self.me_jitter_summary {
            me.reset();
        }
        if let Some(me) = &self.me_summary_map {
            me.reset();
        }
        if let Some(me) = &self.me_summary_proj_eta {
            me.reset();
        }
        if let Some(me) = &self.me_summary_proj_phi {
            me.reset();
        }
    }

    /// Removes every booked element from the store and forgets the handles.
    ///
    /// Invoked unconditionally at end-of-job when cleanup is enabled, or at
    /// any earlier point on operator request. A later enabled event books a
    /// fresh element set with identical shapes.
    pub fn cleanup(&mut self) {
        if !self.booked {
            return;
        }

        if let Some(store) = &self.store {
            store.set_current_folder(&self.folder());

            for me in self.me_jitter.iter_mut() {
                if let Some(me) = me.take() {
                    store.remove_element(&me.name());
                }
            }
            for me in self.me_jitter_map.iter_mut() {
                if let Some(me) = me.take() {
                    store.remove_element(&me.name());
                }
            }
            for me in self.me_amp_jitter.iter_mut() {
                if let Some(me) = me.take() {
                    store.remove_element(&me.name());
                }
            }
            if let Some(me) = self.me_amp_jitter_summary.take() {
                store.remove_element(&me.name());
            }
            if let Some(me) = self.me_jitter_summary.take() {
                store.remove_element(&me.name());
            }
            if let Some(me) = self.me_summary_map.take() {
                store.remove_element(&me.name());
            }
            if let Some(me) = self.me_summary_proj_eta.take() {
                store.remove_element(&me.name());
            }
            if let Some(me) = self.me_summary_proj_phi.take() {
                store.remove_element(&me.name());
            }
        }

        self.booked = false;
    }
}

impl MonitorTask for TimingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin_job(&mut self) -> Result<()> {
        self.events = 0;

        if !self.booked {
            if let Some(store) = &self.store {
                store.set_current_folder(&self.folder());
                store.rmdir(&self.folder());
            }
        }

        Ok(())
    }

    fn begin_run(&mut self, _run: &RunHeader, _geometry: &Geometry) -> Result<()> {
        if !self.settings.merge_runs {
            self.reset();
        }
        Ok(())
    }

    fn analyze(&mut self, event: &Event, geometry: &Geometry) -> Result<()> {
        let class = self.classify(event, geometry)?;

        if !class.enable {
            return Ok(());
        }

        if !self.booked {
            self.book();
        }

        self.events += 1;

        let Some(hits) = event.uncalib_hits(&self.settings.rechit_collection) else {
            warn!(
                task = %self.name,
                collection = %self.settings.rechit_collection,
                "collection not available"
            );
            return Ok(());
        };

        debug!(task = %self.name, event = event.id, hits = hits.len(), "hit collection size");

        for hit in hits {
            let sm = geometry.supermodule(hit.id)? as usize;

            let crystal = hit.id.crystal();
            let row = (crystal - 1) / CRYSTALS_PER_ROW + 1;
            let col = (crystal - 1) % CRYSTALS_PER_ROW + 1;
            let x_row = f64::from(row) - 0.5;
            let x_col = f64::from(col) - 0.5;

            // On real data the per-partition run type is checked again; the
            // event-level gate alone does not qualify a hit.
            if class.is_data {
                match class.run_types[sm - 1] {
                    Some(run_type) if accepts(run_type) => {}
                    _ => continue,
                }
            }

            let amplitude = hit.amplitude.max(0.0);
            let timing = (hit.jitter + JITTER_SHIFT).max(0.0);
            let pedestal = hit.pedestal.max(0.0);

            debug!(
                task = %self.name,
                channel = %hit.id,
                amplitude,
                timing,
                pedestal,
                "hit quantities"
            );

            if hit.is_good() {
                if let Some(me) = &self.me_amp_jitter[sm - 1] {
                    me.fill2(amplitude, timing);
                }
                if let Some(me) = &self.me_amp_jitter_summary {
                    me.fill2(amplitude, timing);
                }
            }

            if amplitude > AMPLITUDE_THRESHOLD && hit.is_good() {
                if let Some(me) = &self.me_jitter[sm - 1] {
                    me.fill(timing);
                }
                if let Some(me) = &self.me_jitter_map[sm - 1] {
                    me.fill3(x_row, x_col, timing);
                }
                if let Some(me) = &self.me_jitter_summary {
                    me.fill(timing);
                }

                let x_eta = f64::from(hit.id.ieta()) - 0.5 * f64::from(hit.id.zside());
                let x_phi = f64::from(hit.id.iphi()) - 0.5;
                if let Some(me) = &self.me_summary_map {
                    me.fill3(x_phi, x_eta, timing);
                }
                if let Some(me) = &self.me_summary_proj_eta {
                    me.fill2(x_eta, timing);
                }
                if let Some(me) = &self.me_summary_proj_phi {
                    me.fill2(x_phi, timing);
                }
            }
        }

        Ok(())
    }

    fn end_job(&mut self) -> Result<()> {
        info!(task = %self.name, events = self.events, "analyzed events");

        if self.settings.enable_cleanup {
            self.cleanup();
        }

        Ok(())
    }
}
