//! Synthetic event source.
//!
//! Generates runs of plausible-looking barrel data for the demo binary and
//! integration tests: every barrel DCC reports a cosmics-global run type,
//! hits land on random channels with a mix of noise-level and signal-level
//! amplitudes, and each hit comes with a matching digitized frame. Seeded so
//! output is reproducible.

use crate::config::SourceSettings;
use crate::event::{
    CollectionTag, DccHeader, Digi, Event, RecoFlag, RunHeader, RunType, UncalibRecHit,
    SAMPLES_PER_FRAME,
};
use crate::geometry::{ChannelId, MAX_IETA, MAX_IPHI};
use crate::harness::RunData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Barrel DCC id range used for the generated headers.
const BARREL_DCCS: std::ops::RangeInclusive<u16> = 10..=45;

/// Generator of synthetic runs.
pub struct SyntheticSource {
    rng: StdRng,
    settings: SourceSettings,
    next_event: u64,
}

impl SyntheticSource {
    /// Creates a source seeded from the settings.
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
            next_event: 1,
        }
    }

    /// Generates all configured runs.
    pub fn generate(&mut self) -> Vec<RunData> {
        (1..=self.settings.runs)
            .map(|number| {
                let events = (0..self.settings.events_per_run)
                    .map(|_| self.make_event())
                    .collect();
                RunData {
                    header: RunHeader { number },
                    events,
                }
            })
            .collect()
    }

    fn make_event(&mut self) -> Event {
        let mut event = Event::new(self.next_event);
        self.next_event += 1;

        let headers = BARREL_DCCS
            .map(|dcc_id| DccHeader {
                dcc_id,
                run_type: RunType::CosmicsGlobal,
            })
            .collect();
        event.put_headers(CollectionTag::new("dcc-headers"), headers);

        let mut hits = Vec::with_capacity(self.settings.hits_per_event as usize);
        let mut digis = Vec::with_capacity(self.settings.hits_per_event as usize);
        for _ in 0..self.settings.hits_per_event {
            let Some(hit) = self.make_hit() else { continue };
            digis.push(self.make_digi(&hit));
            hits.push(hit);
        }
        event.put_hits(CollectionTag::new("uncalib-rechits"), hits);
        event.put_digis(CollectionTag::new("digis"), digis);

        event
    }

    fn make_hit(&mut self) -> Option<UncalibRecHit> {
        let mut ieta = self.rng.gen_range(-MAX_IETA..MAX_IETA);
        if ieta >= 0 {
            ieta += 1;
        }
        let iphi = self.rng.gen_range(1..=MAX_IPHI);
        let id = ChannelId::new(ieta, iphi).ok()?;

        // Roughly one hit in five carries a signal-level amplitude.
        let amplitude = if self.rng.gen_bool(0.2) {
            self.rng.gen_range(15.0..180.0)
        } else {
            self.rng.gen_range(0.0..12.0)
        };

        let flag = if self.rng.gen_bool(0.9) {
            RecoFlag::Good
        } else if self.rng.gen_bool(0.5) {
            RecoFlag::Poor
        } else {
            RecoFlag::OutOfTime
        };

        Some(UncalibRecHit {
            id,
            amplitude,
            pedestal: self.rng.gen_range(195.0..205.0),
            jitter: self.rng.gen_range(-2.5..2.5),
            chi2: self.rng.gen_range(0.0..50.0),
            flag,
        })
    }

    fn make_digi(&mut self, hit: &UncalibRecHit) -> Digi {
        let base: u16 = self.rng.gen_range(45..55);
        let peak = base + hit.amplitude.max(0.0) as u16;

        // Flat presamples, a rising pulse peaking around sample 5, then decay.
        let mut samples = [base; SAMPLES_PER_FRAME];
        samples[3] = base + (peak - base) / 4;
        samples[4] = base + 3 * (peak - base) / 4;
        samples[5] = peak;
        samples[6] = base + 2 * (peak - base) / 3;
        samples[7] = base + (peak - base) / 3;
        samples[8] = base + (peak - base) / 6;

        Digi {
            id: hit.id,
            samples,
        }
    }
}
