//! Event data model: the collections a monitoring task reads.
//!
//! An [`Event`] carries its input collections keyed by a logical
//! [`CollectionTag`], the same way the host pipeline hands data to its
//! consumers by configurable label. A collection missing from an event is a
//! recoverable condition: accessors return `None` and the caller decides how
//! loudly to complain.

use crate::geometry::ChannelId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Number of ADC samples in one digitized frame.
pub const SAMPLES_PER_FRAME: usize = 10;

/// Logical name of an input collection, configurable per task.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionTag(String);

impl CollectionTag {
    /// Creates a tag from any string-like value.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Operational-mode tag a DCC attaches to its partition for the current run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunType {
    /// Standalone cosmic-ray data taking.
    Cosmic,
    /// Legacy combined test run.
    Mtcc,
    /// Cosmic-ray data taking in a global run.
    CosmicsGlobal,
    /// Collision data taking in a global run.
    PhysicsGlobal,
    /// Cosmic-ray data taking in a local run.
    CosmicsLocal,
    /// Collision-mode data taking in a local run.
    PhysicsLocal,
    /// Beam-halo trigger in a global run.
    HaloGlobal,
    /// Beam-halo trigger in a local run.
    HaloLocal,
    /// Laser calibration sequence.
    Laser,
    /// Pedestal calibration sequence.
    Pedestal,
    /// Test-pulse calibration sequence.
    TestPulse,
    /// LED calibration sequence.
    Led,
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunType::Cosmic => "cosmic",
            RunType::Mtcc => "mtcc",
            RunType::CosmicsGlobal => "cosmics-global",
            RunType::PhysicsGlobal => "physics-global",
            RunType::CosmicsLocal => "cosmics-local",
            RunType::PhysicsLocal => "physics-local",
            RunType::HaloGlobal => "halo-global",
            RunType::HaloLocal => "halo-local",
            RunType::Laser => "laser",
            RunType::Pedestal => "pedestal",
            RunType::TestPulse => "test-pulse",
            RunType::Led => "led",
        };
        f.write_str(name)
    }
}

/// Per-partition raw-data header for one event.
#[derive(Clone, Copy, Debug)]
pub struct DccHeader {
    /// Identifier of the DCC that produced this header.
    pub dcc_id: u16,
    /// Run type the DCC reports for its partition.
    pub run_type: RunType,
}

/// Reconstruction quality flag attached to an uncalibrated hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoFlag {
    /// Reconstruction succeeded without anomalies.
    Good,
    /// Amplitude reconstruction is unreliable.
    Poor,
    /// Hit is out of time with the trigger.
    OutOfTime,
    /// One or more samples saturated the ADC.
    Saturated,
}

/// One uncalibrated reconstructed hit.
#[derive(Clone, Copy, Debug)]
pub struct UncalibRecHit {
    /// Channel the hit was reconstructed on.
    pub id: ChannelId,
    /// Fitted amplitude, in ADC counts.
    pub amplitude: f64,
    /// Fitted pedestal, in ADC counts.
    pub pedestal: f64,
    /// Timing offset with respect to the expected sample, in clock units.
    pub jitter: f64,
    /// Fit chi2.
    pub chi2: f64,
    /// Reconstruction quality flag.
    pub flag: RecoFlag,
}

impl UncalibRecHit {
    /// True when reconstruction succeeded without flagged anomalies.
    pub fn is_good(&self) -> bool {
        self.flag == RecoFlag::Good
    }
}

/// One digitized frame: the raw ADC samples for a channel.
#[derive(Clone, Copy, Debug)]
pub struct Digi {
    /// Channel the frame was read out from.
    pub id: ChannelId,
    /// ADC samples in readout order.
    pub samples: [u16; SAMPLES_PER_FRAME],
}

impl Digi {
    /// Largest sample in the frame.
    pub fn max_sample(&self) -> u16 {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// Ratio of the largest sample to the first (pre-sample), 0 when the
    /// first sample is empty.
    pub fn max_sample_ratio(&self) -> f64 {
        let first = self.samples[0];
        if first == 0 {
            return 0.0;
        }
        f64::from(self.max_sample()) / f64::from(first)
    }
}

/// Header of one run: the unit of data taking between lifecycle boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunHeader {
    /// Run number assigned by the source.
    pub number: u32,
}

/// One event's worth of input collections, keyed by logical tag.
#[derive(Clone, Debug, Default)]
pub struct Event {
    /// Monotonic event number assigned by the source.
    pub id: u64,
    /// Wall-clock time the event was produced.
    pub timestamp: Option<DateTime<Utc>>,
    headers: HashMap<CollectionTag, Vec<DccHeader>>,
    hits: HashMap<CollectionTag, Vec<UncalibRecHit>>,
    digis: HashMap<CollectionTag, Vec<Digi>>,
}

impl Event {
    /// Creates an empty event stamped with the current time.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            timestamp: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Stores a DCC header collection under `tag`.
    pub fn put_headers(&mut self, tag: CollectionTag, headers: Vec<DccHeader>) {
        self.headers.insert(tag, headers);
    }

    /// Stores an uncalibrated rec-hit collection under `tag`.
    pub fn put_hits(&mut self, tag: CollectionTag, hits: Vec<UncalibRecHit>) {
        self.hits.insert(tag, hits);
    }

    /// Stores a digi collection under `tag`.
    pub fn put_digis(&mut self, tag: CollectionTag, digis: Vec<Digi>) {
        self.digis.insert(tag, digis);
    }

    /// The DCC header collection labeled `tag`, if present in this event.
    pub fn headers(&self, tag: &CollectionTag) -> Option<&[DccHeader]> {
        self.headers.get(tag).map(Vec::as_slice)
    }

    /// The uncalibrated rec-hit collection labeled `tag`, if present.
    pub fn uncalib_hits(&self, tag: &CollectionTag) -> Option<&[UncalibRecHit]> {
        self.hits.get(tag).map(Vec::as_slice)
    }

    /// The digi collection labeled `tag`, if present.
    pub fn digis(&self, tag: &CollectionTag) -> Option<&[Digi]> {
        self.digis.get(tag).map(Vec::as_slice)
    }
}
