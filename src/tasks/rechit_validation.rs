//! Uncalibrated rec-hit validation task.
//!
//! Cross-checks the output of the amplitude reconstruction against the raw
//! digitized frames: detector-wide distributions of amplitude, pedestal,
//! jitter and chi2, occupancy and profile maps over global coordinates, and
//! the max-sample ratio of the matched digi. Hits above a high-amplitude
//! threshold fill a second set of histograms so signal-like channels can be
//! inspected separately. Unlike the timing task there is no run-type gate:
//! validation observes every event.

use crate::config::TaskSettings;
use crate::event::{Digi, Event, RunHeader};
use crate::geometry::{ChannelId, Geometry};
use crate::store::{ElementHandle, ErrorMode, MonitorStore};
use crate::tasks::{MonitorTask, TaskContext};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hits above this amplitude also fill the high-amplitude set.
const HIGH_AMPLITUDE: f64 = 60.0;

/// Shift applied to raw jitter, shared display convention with the timing
/// task.
const JITTER_SHIFT: f64 = 5.0;

/// Value bounds for the profile maps, wide enough for a 12-bit ADC.
const ADC_RANGE: f64 = 4096.0;

struct ElementSet {
    occupancy: ElementHandle,
    amplitude: ElementHandle,
    pedestal: ElementHandle,
    jitter: ElementHandle,
    chi2: ElementHandle,
    max_sample_ratio: ElementHandle,
}

/// The rec-hit validation task.
pub struct RecHitValidationTask {
    name: String,
    store: Option<Arc<MonitorStore>>,
    settings: TaskSettings,
    booked: bool,
    events: u64,
    all: Option<ElementSet>,
    high: Option<ElementSet>,
    me_amplitude_map: Option<ElementHandle>,
    me_pedestal_map: Option<ElementHandle>,
}

impl RecHitValidationTask {
    /// Builds the task from its context. Booking happens at begin-of-job.
    pub fn new(ctx: TaskContext) -> Self {
        Self {
            name: ctx.name,
            store: ctx.store,
            settings: ctx.settings,
            booked: false,
            events: 0,
            all: None,
            high: None,
            me_amplitude_map: None,
            me_pedestal_map: None,
        }
    }

    fn folder(&self) -> String {
        format!("{}/RecHitValidation", self.settings.prefix)
    }

    /// Whether the element set is currently booked.
    pub fn is_booked(&self) -> bool {
        self.booked
    }

    /// Events analyzed since begin-of-job.
    pub fn events_analyzed(&self) -> u64 {
        self.events
    }

    fn book_set(store: &MonitorStore, suffix: &str) -> ElementSet {
        let name = format!("occupancy{suffix}");
        let occupancy = store.book_2d(&name, &name, 360, 0.0, 360.0, 170, -85.0, 85.0);
        occupancy.set_axis_title("jphi", 1);
        occupancy.set_axis_title("jeta", 2);

        let name = format!("amplitude{suffix}");
        let amplitude = store.book_1d(&name, &name, 100, 0.0, 200.0);
        amplitude.set_axis_title("amplitude (ADC)", 1);

        let name = format!("pedestal{suffix}");
        let pedestal = store.book_1d(&name, &name, 50, 150.0, 250.0);
        pedestal.set_axis_title("pedestal (ADC)", 1);

        let name = format!("jitter{suffix}");
        let jitter = store.book_1d(&name, &name, 50, 0.0, 10.0);
        jitter.set_axis_title("jitter (clocks)", 1);

        let name = format!("chi2{suffix}");
        let chi2 = store.book_1d(&name, &name, 100, 0.0, 100.0);
        chi2.set_axis_title("chi2", 1);

        let name = format!("max sample ratio{suffix}");
        let max_sample_ratio = store.book_1d(&name, &name, 120, 0.0, 12.0);
        max_sample_ratio.set_axis_title("max sample / presample", 1);

        ElementSet {
            occupancy,
            amplitude,
            pedestal,
            jitter,
            chi2,
            max_sample_ratio,
        }
    }

    fn book(&mut self) {
        self.booked = true;

        let Some(store) = &self.store else { return };
        store.set_current_folder(&self.folder());

        self.all = Some(Self::book_set(store, ""));
        self.high = Some(Self::book_set(store, " gt 60 adc"));

        let name = "amplitude full map";
        let me = store.book_profile_2d(
            name,
            name,
            72,
            0.0,
            360.0,
            34,
            -85.0,
            85.0,
            0.0,
            ADC_RANGE,
            ErrorMode::Mean,
        );
        me.set_axis_title("jphi", 1);
        me.set_axis_title("jeta", 2);
        me.set_axis_title("amplitude (ADC)", 3);
        self.me_amplitude_map = Some(me);

        let name = "pedestal full map";
        let me = store.book_profile_2d(
            name,
            name,
            72,
            0.0,
            360.0,
            34,
            -85.0,
            85.0,
            0.0,
            ADC_RANGE,
            ErrorMode::Mean,
        );
        me.set_axis_title("jphi", 1);
        me.set_axis_title("jeta", 2);
        me.set_axis_title("pedestal (ADC)", 3);
        self.me_pedestal_map = Some(me);
    }

    fn reset(&mut self) {
        for set in [&self.all, &self.high].into_iter().flatten() {
            set.occupancy.reset();
            set.amplitude.reset();
            set.pedestal.reset();
            set.jitter.reset();
            set.chi2.reset();
            set.max_sample_ratio.reset();
        }
        if let Some(me) = &self.me_amplitude_map {
            me.reset();
        }
        if let Some(me) = &self.me_pedestal_map {
            me.reset();
        }
    }

    /// Removes every booked element from the store and forgets the handles.
    pub fn cleanup(&mut self) {
        if !self.booked {
            return;
        }

        if let Some(store) = &self.store {
            store.set_current_folder(&self.folder());

            for set in [self.all.take(), self.high.take()].into_iter().flatten() {
                store.remove_element(&set.occupancy.name());
                store.remove_element(&set.amplitude.name());
                store.remove_element(&set.pedestal.name());
                store.remove_element(&set.jitter.name());
                store.remove_element(&set.chi2.name());
                store.remove_element(&set.max_sample_ratio.name());
            }
            if let Some(me) = self.me_amplitude_map.take() {
                store.remove_element(&me.name());
            }
            if let Some(me) = self.me_pedestal_map.take() {
                store.remove_element(&me.name());
            }
        }

        self.booked = false;
    }

    fn fill_set(set: &ElementSet, hit_quantities: &HitQuantities) {
        set.occupancy.fill2(hit_quantities.x_phi, hit_quantities.x_eta);
        set.amplitude.fill(hit_quantities.amplitude);
        set.pedestal.fill(hit_quantities.pedestal);
        set.jitter.fill(hit_quantities.jitter);
        set.chi2.fill(hit_quantities.chi2);
        if let Some(ratio) = hit_quantities.max_sample_ratio {
            set.max_sample_ratio.fill(ratio);
        }
    }
}

struct HitQuantities {
    x_phi: f64,
    x_eta: f64,
    amplitude: f64,
    pedestal: f64,
    jitter: f64,
    chi2: f64,
    max_sample_ratio: Option<f64>,
}

impl MonitorTask for RecHitValidationTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin_job(&mut self) -> Result<()> {
        self.events = 0;

        if self.booked {
            return Ok(());
        }

        if let Some(store) = &self.store {
            store.set_current_folder(&self.folder());
            store.rmdir(&self.folder());
        }
        self.book();

        Ok(())
    }

    fn begin_run(&mut self, _run: &RunHeader, _geometry: &Geometry) -> Result<()> {
        if !self.settings.merge_runs {
            self.reset();
        }
        Ok(())
    }

    fn analyze(&mut self, event: &Event, _geometry: &Geometry) -> Result<()> {
        self.events += 1;

        let Some(hits) = event.uncalib_hits(&self.settings.rechit_collection) else {
            warn!(
                task = %self.name,
                collection = %self.settings.rechit_collection,
                "collection not available"
            );
            return Ok(());
        };

        let digis: Option<HashMap<ChannelId, Digi>> = match event.digis(&self.settings.digi_collection)
        {
            Some(digis) => Some(digis.iter().map(|digi| (digi.id, *digi)).collect()),
            None => {
                warn!(
                    task = %self.name,
                    collection = %self.settings.digi_collection,
                    "collection not available"
                );
                None
            }
        };

        debug!(task = %self.name, event = event.id, hits = hits.len(), "hit collection size");

        for hit in hits {
            let quantities = HitQuantities {
                x_phi: f64::from(hit.id.iphi()) - 0.5,
                x_eta: f64::from(hit.id.ieta()) - 0.5 * f64::from(hit.id.zside()),
                amplitude: hit.amplitude,
                pedestal: hit.pedestal,
                jitter: (hit.jitter + JITTER_SHIFT).max(0.0),
                chi2: hit.chi2,
                max_sample_ratio: digis
                    .as_ref()
                    .and_then(|map| map.get(&hit.id))
                    .map(Digi::max_sample_ratio),
            };

            if let Some(set) = &self.all {
                Self::fill_set(set, &quantities);
            }
            if hit.amplitude > HIGH_AMPLITUDE {
                if let Some(set) = &self.high {
                    Self::fill_set(set, &quantities);
                }
            }

            if let Some(me) = &self.me_amplitude_map {
                me.fill3(quantities.x_phi, quantities.x_eta, hit.amplitude.max(0.0));
            }
            if let Some(me) = &self.me_pedestal_map {
                me.fill3(quantities.x_phi, quantities.x_eta, hit.pedestal.max(0.0));
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
