//! Geometry and numbering service for the barrel calorimeter.
//!
//! Two layers live here. [`ChannelId`] is a validated data format: barrel
//! coordinates `(ieta, iphi)` that are checked once at construction, after
//! which the supermodule and crystal decompositions are plain arithmetic.
//! [`Geometry`] is the per-run service on top: it maps raw-data (DCC)
//! identifiers to sub-detector and supermodule, produces human-readable
//! partition labels, and must be initialized once per run before any lookup.

use crate::error::{MonitorError, MonitorResult};
use std::fmt;

/// Number of supermodules in the barrel.
pub const SUPERMODULES: usize = 36;

/// Crystals per supermodule.
pub const CRYSTALS_PER_SM: u32 = 1700;

/// Crystals per supermodule row (the phi width of a supermodule).
pub const CRYSTALS_PER_ROW: u32 = 20;

/// Largest |ieta| index in the barrel.
pub const MAX_IETA: i32 = 85;

/// Largest iphi index in the barrel.
pub const MAX_IPHI: u32 = 360;

/// First DCC id assigned to the barrel readout.
const BARREL_DCC_FIRST: u16 = 10;

/// Last DCC id assigned to the barrel readout.
const BARREL_DCC_LAST: u16 = 45;

/// Last DCC id in the detector readout.
const DCC_LAST: u16 = 54;

/// Sub-detector a DCC belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubDetector {
    /// Barrel calorimeter.
    Barrel,
    /// Endcap calorimeter (either side).
    Endcap,
}

/// Validated barrel channel coordinates.
///
/// `ieta` runs over ±1..=85 (zero excluded), `iphi` over 1..=360. Invalid
/// coordinates are unrepresentable once construction succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId {
    ieta: i32,
    iphi: u32,
}

impl ChannelId {
    /// Builds a channel id, rejecting coordinates outside the acceptance.
    pub fn new(ieta: i32, iphi: u32) -> MonitorResult<Self> {
        if ieta == 0 || ieta.abs() > MAX_IETA || iphi == 0 || iphi > MAX_IPHI {
            return Err(MonitorError::InvalidChannel { ieta, iphi });
        }
        Ok(Self { ieta, iphi })
    }

    /// Signed pseudorapidity index, ±1..=85.
    pub fn ieta(&self) -> i32 {
        self.ieta
    }

    /// Azimuthal index, 1..=360.
    pub fn iphi(&self) -> u32 {
        self.iphi
    }

    /// Detector side: +1 or -1.
    pub fn zside(&self) -> i32 {
        if self.ieta > 0 {
            1
        } else {
            -1
        }
    }

    /// Supermodule this channel belongs to, 1..=36.
    ///
    /// The positive side holds supermodules 1..=18, the negative side
    /// 19..=36, each spanning 20 crystals in phi.
    pub fn supermodule(&self) -> u32 {
        let sector = (self.iphi - 1) / CRYSTALS_PER_ROW + 1;
        if self.zside() > 0 {
            sector
        } else {
            sector + SUPERMODULES as u32 / 2
        }
    }

    /// Crystal index within the supermodule, 1..=1700.
    ///
    /// Crystals are numbered row-major: 85 eta rows of 20 phi columns each.
    pub fn crystal(&self) -> u32 {
        let row = self.ieta.unsigned_abs();
        let col = (self.iphi - 1) % CRYSTALS_PER_ROW + 1;
        (row - 1) * CRYSTALS_PER_ROW + col
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.ieta, self.iphi)
    }
}

/// Per-run numbering service.
///
/// Must be initialized with [`Geometry::init_run`] before any gated lookup;
/// the harness does this at every begin-of-run boundary.
#[derive(Debug, Default)]
pub struct Geometry {
    current_run: Option<u32>,
}

impl Geometry {
    /// Creates an uninitialized service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aligns the service with the given run. Lookups are valid afterwards.
    pub fn init_run(&mut self, run: u32) {
        self.current_run = Some(run);
    }

    /// Run the service is currently aligned with.
    pub fn current_run(&self) -> Option<u32> {
        self.current_run
    }

    fn ready(&self) -> MonitorResult<()> {
        if self.current_run.is_none() {
            return Err(MonitorError::Geometry(
                "lookup before init_run".to_string(),
            ));
        }
        Ok(())
    }

    /// Sub-detector the DCC reads out, `None` for ids outside the readout.
    pub fn sub_detector(dcc_id: u16) -> Option<SubDetector> {
        match dcc_id {
            id if (BARREL_DCC_FIRST..=BARREL_DCC_LAST).contains(&id) => Some(SubDetector::Barrel),
            id if (1..=DCC_LAST).contains(&id) => Some(SubDetector::Endcap),
            _ => None,
        }
    }

    /// Supermodule fed by a barrel DCC, `None` for non-barrel DCCs.
    pub fn supermodule_for_dcc(&self, dcc_id: u16) -> MonitorResult<Option<u32>> {
        self.ready()?;
        if Self::sub_detector(dcc_id) != Some(SubDetector::Barrel) {
            return Ok(None);
        }
        Ok(Some(u32::from(dcc_id - BARREL_DCC_FIRST) + 1))
    }

    /// Supermodule a channel belongs to.
    pub fn supermodule(&self, id: ChannelId) -> MonitorResult<u32> {
        self.ready()?;
        Ok(id.supermodule())
    }

    /// Human-readable supermodule label, e.g. "SM+07" or "SM-12".
    pub fn sm_label(sm: u32) -> String {
        let half = SUPERMODULES as u32 / 2;
        if sm <= half {
            format!("SM+{sm:02}")
        } else {
            format!("SM-{:02}", sm - half)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_acceptance_coordinates() {
        assert!(ChannelId::new(0, 10).is_err());
        assert!(ChannelId::new(86, 10).is_err());
        assert!(ChannelId::new(-86, 10).is_err());
        assert!(ChannelId::new(5, 0).is_err());
        assert!(ChannelId::new(5, 361).is_err());
        assert!(ChannelId::new(-85, 360).is_ok());
    }

    #[test]
    fn supermodule_covers_both_sides() {
        // First phi sector, positive side.
        assert_eq!(ChannelId::new(1, 1).unwrap().supermodule(), 1);
        assert_eq!(ChannelId::new(85, 20).unwrap().supermodule(), 1);
        // Last phi sector, positive side.
        assert_eq!(ChannelId::new(3, 360).unwrap().supermodule(), 18);
        // Negative side is offset by 18.
        assert_eq!(ChannelId::new(-1, 1).unwrap().supermodule(), 19);
        assert_eq!(ChannelId::new(-85, 360).unwrap().supermodule(), 36);
    }

    #[test]
    fn crystal_numbering_is_row_major() {
        // First crystal of a supermodule.
        assert_eq!(ChannelId::new(1, 1).unwrap().crystal(), 1);
        // Last column of the first row.
        assert_eq!(ChannelId::new(1, 20).unwrap().crystal(), 20);
        // Second row starts at 21; phi wraps every 20 crystals.
        assert_eq!(ChannelId::new(2, 21).unwrap().crystal(), 21);
        // Last crystal of any supermodule.
        assert_eq!(ChannelId::new(85, 40).unwrap().crystal(), CRYSTALS_PER_SM);
        // Side does not enter the intra-supermodule index.
        assert_eq!(
            ChannelId::new(-3, 7).unwrap().crystal(),
            ChannelId::new(3, 7).unwrap().crystal()
        );
    }

    #[test]
    fn crystal_decomposition_matches_row_size() {
        let id = ChannelId::new(42, 135).unwrap();
        let crystal = id.crystal();
        let row = (crystal - 1) / CRYSTALS_PER_ROW + 1;
        let col = (crystal - 1) % CRYSTALS_PER_ROW + 1;
        assert_eq!(row, 42);
        assert_eq!(col, (135 - 1) % 20 + 1);
    }

    #[test]
    fn dcc_mapping_distinguishes_barrel_from_endcap() {
        assert_eq!(Geometry::sub_detector(10), Some(SubDetector::Barrel));
        assert_eq!(Geometry::sub_detector(45), Some(SubDetector::Barrel));
        assert_eq!(Geometry::sub_detector(1), Some(SubDetector::Endcap));
        assert_eq!(Geometry::sub_detector(54), Some(SubDetector::Endcap));
        assert_eq!(Geometry::sub_detector(0), None);
        assert_eq!(Geometry::sub_detector(55), None);
    }

    #[test]
    fn lookups_require_run_initialization() {
        let mut geometry = Geometry::new();
        assert!(geometry.supermodule_for_dcc(10).is_err());

        geometry.init_run(1);
        assert_eq!(geometry.supermodule_for_dcc(10).unwrap(), Some(1));
        assert_eq!(geometry.supermodule_for_dcc(45).unwrap(), Some(36));
        assert_eq!(geometry.supermodule_for_dcc(1).unwrap(), None);
    }

    #[test]
    fn labels_carry_side_and_number() {
        assert_eq!(Geometry::sm_label(1), "SM+01");
        assert_eq!(Geometry::sm_label(18), "SM+18");
        assert_eq!(Geometry::sm_label(19), "SM-01");
        assert_eq!(Geometry::sm_label(36), "SM-18");
    }
}
