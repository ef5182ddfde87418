//! Histogram-like accumulators behind a monitoring element.
//!
//! Four shapes cover everything the tasks book: 1-D and 2-D frequency
//! histograms and 1-D and 2-D profiles (per-bin mean of a sampled value).
//! Out-of-range entries are never silently folded into edge bins; they
//! accumulate in dedicated under/overflow slots so bin contents stay exact.

use serde::Serialize;
use tracing::error;

/// How a profile reports its per-bin error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorMode {
    /// Error of the mean: spread / sqrt(entries).
    Mean,
    /// Plain spread (RMS) of the sampled values.
    Spread,
}

/// Binning of one axis: `nbins` equal-width bins over `[low, high)`.
#[derive(Clone, Debug, Serialize)]
pub struct Axis {
    /// Number of bins.
    pub nbins: usize,
    /// Lower edge of the first bin.
    pub low: f64,
    /// Upper edge of the last bin.
    pub high: f64,
    /// Axis title, set at booking time.
    pub title: Option<String>,
}

enum BinLocation {
    Under,
    Inside(usize),
    Over,
}

impl Axis {
    fn new(nbins: usize, low: f64, high: f64) -> Self {
        Self {
            nbins,
            low,
            high,
            title: None,
        }
    }

    fn locate(&self, x: f64) -> BinLocation {
        if x.is_nan() || x < self.low {
            return BinLocation::Under;
        }
        if x >= self.high {
            return BinLocation::Over;
        }
        let frac = (x - self.low) / (self.high - self.low);
        let bin = ((frac * self.nbins as f64) as usize).min(self.nbins - 1);
        BinLocation::Inside(bin)
    }
}

/// 1-D frequency histogram.
#[derive(Clone, Debug, Serialize)]
pub struct Hist1D {
    /// X axis binning.
    pub axis: Axis,
    bins: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
    sum_w: f64,
    sum_wx: f64,
    sum_wx2: f64,
}

impl Hist1D {
    fn new(nbins: usize, low: f64, high: f64) -> Self {
        Self {
            axis: Axis::new(nbins, low, high),
            bins: vec![0.0; nbins],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
            sum_w: 0.0,
            sum_wx: 0.0,
            sum_wx2: 0.0,
        }
    }

    fn fill(&mut self, x: f64) {
        self.entries += 1;
        match self.axis.locate(x) {
            BinLocation::Under => self.underflow += 1.0,
            BinLocation::Over => self.overflow += 1.0,
            BinLocation::Inside(bin) => self.bins[bin] += 1.0,
        }
        self.sum_w += 1.0;
        self.sum_wx += x;
        self.sum_wx2 += x * x;
    }

    fn reset(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = 0.0);
        self.underflow = 0.0;
        self.overflow = 0.0;
        self.entries = 0;
        self.sum_w = 0.0;
        self.sum_wx = 0.0;
        self.sum_wx2 = 0.0;
    }

    /// Content of bin `bin` (0-based), 0 outside the binning.
    pub fn bin_content(&self, bin: usize) -> f64 {
        self.bins.get(bin).copied().unwrap_or(0.0)
    }

    /// Content of the bin that `x` falls into.
    pub fn content_at(&self, x: f64) -> f64 {
        match self.axis.locate(x) {
            BinLocation::Inside(bin) => self.bins[bin],
            BinLocation::Under => self.underflow,
            BinLocation::Over => self.overflow,
        }
    }

    /// Sum of all in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.bins.iter().sum()
    }

    /// Underflow slot content.
    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    /// Overflow slot content.
    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// Number of fill calls since booking or the last reset.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Mean of the filled values, 0 when empty.
    pub fn mean(&self) -> f64 {
        if self.sum_w == 0.0 {
            return 0.0;
        }
        self.sum_wx / self.sum_w
    }
}

/// 2-D frequency histogram.
#[derive(Clone, Debug, Serialize)]
pub struct Hist2D {
    /// X axis binning.
    pub x_axis: Axis,
    /// Y axis binning.
    pub y_axis: Axis,
    bins: Vec<f64>,
    out_of_range: f64,
    entries: u64,
}

impl Hist2D {
    fn new(nx: usize, x_low: f64, x_high: f64, ny: usize, y_low: f64, y_high: f64) -> Self {
        Self {
            x_axis: Axis::new(nx, x_low, x_high),
            y_axis: Axis::new(ny, y_low, y_high),
            bins: vec![0.0; nx * ny],
            out_of_range: 0.0,
            entries: 0,
        }
    }

    fn fill(&mut self, x: f64, y: f64) {
        self.entries += 1;
        match (self.x_axis.locate(x), self.y_axis.locate(y)) {
            (BinLocation::Inside(ix), BinLocation::Inside(iy)) => {
                self.bins[iy * self.x_axis.nbins + ix] += 1.0;
            }
            _ => self.out_of_range += 1.0,
        }
    }

    fn reset(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = 0.0);
        self.out_of_range = 0.0;
        self.entries = 0;
    }

    /// Content of cell `(ix, iy)` (0-based), 0 outside the binning.
    pub fn bin_content(&self, ix: usize, iy: usize) -> f64 {
        if ix >= self.x_axis.nbins || iy >= self.y_axis.nbins {
            return 0.0;
        }
        self.bins[iy * self.x_axis.nbins + ix]
    }

    /// Content of the cell that `(x, y)` falls into, 0 when out of range.
    pub fn content_at(&self, x: f64, y: f64) -> f64 {
        match (self.x_axis.locate(x), self.y_axis.locate(y)) {
            (BinLocation::Inside(ix), BinLocation::Inside(iy)) => self.bin_content(ix, iy),
            _ => 0.0,
        }
    }

    /// Entries that fell outside either axis range.
    pub fn out_of_range(&self) -> f64 {
        self.out_of_range
    }

    /// Number of fill calls since booking or the last reset.
    pub fn entries(&self) -> u64 {
        self.entries
    }
}

/// 1-D profile: per-bin mean of a sampled value.
#[derive(Clone, Debug, Serialize)]
pub struct Profile1D {
    /// X axis binning.
    pub axis: Axis,
    /// Lower bound of accepted sample values.
    pub v_low: f64,
    /// Upper bound of accepted sample values.
    pub v_high: f64,
    /// Title of the sampled-value axis.
    pub value_title: Option<String>,
    error_mode: ErrorMode,
    count: Vec<f64>,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    rejected: u64,
    entries: u64,
}

impl Profile1D {
    fn new(
        nbins: usize,
        low: f64,
        high: f64,
        v_low: f64,
        v_high: f64,
        error_mode: ErrorMode,
    ) -> Self {
        Self {
            axis: Axis::new(nbins, low, high),
            v_low,
            v_high,
            value_title: None,
            error_mode,
            count: vec![0.0; nbins],
            sum: vec![0.0; nbins],
            sum_sq: vec![0.0; nbins],
            rejected: 0,
            entries: 0,
        }
    }

    fn fill(&mut self, x: f64, v: f64) {
        if v.is_nan() || v < self.v_low || v > self.v_high {
            self.rejected += 1;
            return;
        }
        match self.axis.locate(x) {
            BinLocation::Inside(bin) => {
                self.entries += 1;
                self.count[bin] += 1.0;
                self.sum[bin] += v;
                self.sum_sq[bin] += v * v;
            }
            _ => self.rejected += 1,
        }
    }

    fn reset(&mut self) {
        self.count.iter_mut().for_each(|c| *c = 0.0);
        self.sum.iter_mut().for_each(|s| *s = 0.0);
        self.sum_sq.iter_mut().for_each(|s| *s = 0.0);
        self.rejected = 0;
        self.entries = 0;
    }

    /// Number of samples accumulated in bin `bin`.
    pub fn bin_entries(&self, bin: usize) -> f64 {
        self.count.get(bin).copied().unwrap_or(0.0)
    }

    /// Mean sampled value in bin `bin`, 0 when the bin is empty.
    pub fn bin_mean(&self, bin: usize) -> f64 {
        let count = self.bin_entries(bin);
        if count == 0.0 {
            return 0.0;
        }
        self.sum[bin] / count
    }

    /// Per-bin error in the configured [`ErrorMode`].
    pub fn bin_error(&self, bin: usize) -> f64 {
        let count = self.bin_entries(bin);
        if count == 0.0 {
            return 0.0;
        }
        let mean = self.sum[bin] / count;
        let variance = (self.sum_sq[bin] / count - mean * mean).max(0.0);
        let spread = variance.sqrt();
        match self.error_mode {
            ErrorMode::Spread => spread,
            ErrorMode::Mean => spread / count.sqrt(),
        }
    }

    /// Mean sampled value in the bin that `x` falls into.
    pub fn mean_at(&self, x: f64) -> f64 {
        match self.axis.locate(x) {
            BinLocation::Inside(bin) => self.bin_mean(bin),
            _ => 0.0,
        }
    }

    /// Samples accumulated in the bin that `x` falls into.
    pub fn entries_at(&self, x: f64) -> f64 {
        match self.axis.locate(x) {
            BinLocation::Inside(bin) => self.bin_entries(bin),
            _ => 0.0,
        }
    }

    /// Samples rejected for being outside the x range or value bounds.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Accepted samples since booking or the last reset.
    pub fn entries(&self) -> u64 {
        self.entries
    }
}

/// 2-D profile: per-cell mean of a sampled value.
#[derive(Clone, Debug, Serialize)]
pub struct Profile2D {
    /// X axis binning.
    pub x_axis: Axis,
    /// Y axis binning.
    pub y_axis: Axis,
    /// Lower bound of accepted sample values.
    pub v_low: f64,
    /// Upper bound of accepted sample values.
    pub v_high: f64,
    /// Title of the sampled-value axis.
    pub value_title: Option<String>,
    error_mode: ErrorMode,
    count: Vec<f64>,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    rejected: u64,
    entries: u64,
}

impl Profile2D {
    #[allow(clippy::too_many_arguments)]
    fn new(
        nx: usize,
        x_low: f64,
        x_high: f64,
        ny: usize,
        y_low: f64,
        y_high: f64,
        v_low: f64,
        v_high: f64,
        error_mode: ErrorMode,
    ) -> Self {
        Self {
            x_axis: Axis::new(nx, x_low, x_high),
            y_axis: Axis::new(ny, y_low, y_high),
            v_low,
            v_high,
            value_title: None,
            error_mode,
            count: vec![0.0; nx * ny],
            sum: vec![0.0; nx * ny],
            sum_sq: vec![0.0; nx * ny],
            rejected: 0,
            entries: 0,
        }
    }

    fn fill(&mut self, x: f64, y: f64, v: f64) {
        if v.is_nan() || v < self.v_low || v > self.v_high {
            self.rejected += 1;
            return;
        }
        match (self.x_axis.locate(x), self.y_axis.locate(y)) {
            (BinLocation::Inside(ix), BinLocation::Inside(iy)) => {
                let cell = iy * self.x_axis.nbins + ix;
                self.entries += 1;
                self.count[cell] += 1.0;
                self.sum[cell] += v;
                self.sum_sq[cell] += v * v;
            }
            _ => self.rejected += 1,
        }
    }

    fn reset(&mut self) {
        self.count.iter_mut().for_each(|c| *c = 0.0);
        self.sum.iter_mut().for_each(|s| *s = 0.0);
        self.sum_sq.iter_mut().for_each(|s| *s = 0.0);
        self.rejected = 0;
        self.entries = 0;
    }

    fn cell(&self, ix: usize, iy: usize) -> Option<usize> {
        if ix >= self.x_axis.nbins || iy >= self.y_axis.nbins {
            return None;
        }
        Some(iy * self.x_axis.nbins + ix)
    }

    /// Number of samples accumulated in cell `(ix, iy)`.
    pub fn cell_entries(&self, ix: usize, iy: usize) -> f64 {
        self.cell(ix, iy).map_or(0.0, |c| self.count[c])
    }

    /// Mean sampled value in cell `(ix, iy)`, 0 when the cell is empty.
    pub fn cell_mean(&self, ix: usize, iy: usize) -> f64 {
        match self.cell(ix, iy) {
            Some(c) if self.count[c] > 0.0 => self.sum[c] / self.count[c],
            _ => 0.0,
        }
    }

    /// Mean sampled value in the cell that `(x, y)` falls into.
    pub fn mean_at(&self, x: f64, y: f64) -> f64 {
        match (self.x_axis.locate(x), self.y_axis.locate(y)) {
            (BinLocation::Inside(ix), BinLocation::Inside(iy)) => self.cell_mean(ix, iy),
            _ => 0.0,
        }
    }

    /// Samples accumulated in the cell that `(x, y)` falls into.
    pub fn entries_at(&self, x: f64, y: f64) -> f64 {
        match (self.x_axis.locate(x), self.y_axis.locate(y)) {
            (BinLocation::Inside(ix), BinLocation::Inside(iy)) => self.cell_entries(ix, iy),
            _ => 0.0,
        }
    }

    /// Samples rejected for being outside the axis ranges or value bounds.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Accepted samples since booking or the last reset.
    pub fn entries(&self) -> u64 {
        self.entries
    }
}

/// The shape-specific payload of a monitoring element.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind")]
pub enum ElementData {
    /// 1-D frequency histogram.
    Hist1D(Hist1D),
    /// 2-D frequency histogram.
    Hist2D(Hist2D),
    /// 1-D profile.
    Profile1D(Profile1D),
    /// 2-D profile.
    Profile2D(Profile2D),
}

/// A named, shaped accumulator owned by the monitoring store.
///
/// An element is fully booked at construction: name, title, shape and axis
/// ranges are all set before the first fill can happen. Identity is the
/// name, which stays stable across booking, reset and removal.
#[derive(Clone, Debug, Serialize)]
pub struct MonitorElement {
    name: String,
    title: String,
    tag: Option<u32>,
    data: ElementData,
}

impl MonitorElement {
    pub(crate) fn new_1d(name: &str, title: &str, nbins: usize, low: f64, high: f64) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            tag: None,
            data: ElementData::Hist1D(Hist1D::new(nbins, low, high)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_2d(
        name: &str,
        title: &str,
        nx: usize,
        x_low: f64,
        x_high: f64,
        ny: usize,
        y_low: f64,
        y_high: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            tag: None,
            data: ElementData::Hist2D(Hist2D::new(nx, x_low, x_high, ny, y_low, y_high)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_profile(
        name: &str,
        title: &str,
        nbins: usize,
        low: f64,
        high: f64,
        v_low: f64,
        v_high: f64,
        error_mode: ErrorMode,
    ) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            tag: None,
            data: ElementData::Profile1D(Profile1D::new(
                nbins, low, high, v_low, v_high, error_mode,
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_profile_2d(
        name: &str,
        title: &str,
        nx: usize,
        x_low: f64,
        x_high: f64,
        ny: usize,
        y_low: f64,
        y_high: f64,
        v_low: f64,
        v_high: f64,
        error_mode: ErrorMode,
    ) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            tag: None,
            data: ElementData::Profile2D(Profile2D::new(
                nx, x_low, x_high, ny, y_low, y_high, v_low, v_high, error_mode,
            )),
        }
    }

    /// Element name; identity within its folder.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Integer tag attached by the store, if any.
    pub fn tag(&self) -> Option<u32> {
        self.tag
    }

    pub(crate) fn set_tag(&mut self, tag: u32) {
        self.tag = Some(tag);
    }

    /// Sets the title of axis `axis` (1-based, matching booking order; the
    /// sampled-value axis of a profile is the last one).
    pub fn set_axis_title(&mut self, title: &str, axis: usize) {
        let title = Some(title.to_string());
        match (&mut self.data, axis) {
            (ElementData::Hist1D(h), 1) => h.axis.title = title,
            (ElementData::Hist2D(h), 1) => h.x_axis.title = title,
            (ElementData::Hist2D(h), 2) => h.y_axis.title = title,
            (ElementData::Profile1D(p), 1) => p.axis.title = title,
            (ElementData::Profile1D(p), 2) => p.value_title = title,
            (ElementData::Profile2D(p), 1) => p.x_axis.title = title,
            (ElementData::Profile2D(p), 2) => p.y_axis.title = title,
            (ElementData::Profile2D(p), 3) => p.value_title = title,
            _ => error!(name = %self.name, axis, "axis index not valid for this shape"),
        }
    }

    /// Fills a 1-D histogram with `x`. A no-op on other shapes.
    pub fn fill(&mut self, x: f64) {
        match &mut self.data {
            ElementData::Hist1D(h) => h.fill(x),
            _ => error!(name = %self.name, "1-argument fill on a non-1D element"),
        }
    }

    /// Fills a 2-D histogram or a 1-D profile with `(x, y)`.
    pub fn fill2(&mut self, x: f64, y: f64) {
        match &mut self.data {
            ElementData::Hist2D(h) => h.fill(x, y),
            ElementData::Profile1D(p) => p.fill(x, y),
            _ => error!(name = %self.name, "2-argument fill on an incompatible element"),
        }
    }

    /// Fills a 2-D profile with `(x, y, v)`.
    pub fn fill3(&mut self, x: f64, y: f64, v: f64) {
        match &mut self.data {
            ElementData::Profile2D(p) => p.fill(x, y, v),
            _ => error!(name = %self.name, "3-argument fill on a non-profile-2D element"),
        }
    }

    /// Zeroes all contents, keeping shape, identity and tag.
    pub fn reset(&mut self) {
        match &mut self.data {
            ElementData::Hist1D(h) => h.reset(),
            ElementData::Hist2D(h) => h.reset(),
            ElementData::Profile1D(p) => p.reset(),
            ElementData::Profile2D(p) => p.reset(),
        }
    }

    /// Number of accepted fill calls since booking or the last reset.
    pub fn entries(&self) -> u64 {
        match &self.data {
            ElementData::Hist1D(h) => h.entries(),
            ElementData::Hist2D(h) => h.entries(),
            ElementData::Profile1D(p) => p.entries(),
            ElementData::Profile2D(p) => p.entries(),
        }
    }

    /// Shape-specific payload, for inspection.
    pub fn data(&self) -> &ElementData {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hist1d_routes_out_of_range_to_flows() {
        let mut h = Hist1D::new(50, 0.0, 10.0);
        h.fill(-0.1);
        h.fill(0.0);
        h.fill(9.99);
        h.fill(10.0);

        assert_eq!(h.underflow(), 1.0);
        assert_eq!(h.overflow(), 1.0);
        assert_eq!(h.integral(), 2.0);
        assert_eq!(h.bin_content(0), 1.0);
        assert_eq!(h.bin_content(49), 1.0);
        assert_eq!(h.entries(), 4);
    }

    #[test]
    fn hist1d_mean_tracks_raw_values() {
        let mut h = Hist1D::new(10, 0.0, 10.0);
        h.fill(2.0);
        h.fill(4.0);
        assert!((h.mean() - 3.0).abs() < 1e-12);

        h.reset();
        assert_eq!(h.mean(), 0.0);
        assert_eq!(h.entries(), 0);
    }

    #[test]
    fn hist2d_counts_cells_independently() {
        let mut h = Hist2D::new(100, 0.0, 200.0, 50, 0.0, 10.0);
        h.fill(15.0, 7.0);
        h.fill(15.0, 7.0);
        h.fill(199.0, 9.9);
        h.fill(250.0, 5.0);

        assert_eq!(h.content_at(15.0, 7.0), 2.0);
        assert_eq!(h.content_at(199.0, 9.9), 1.0);
        assert_eq!(h.out_of_range(), 1.0);
        assert_eq!(h.entries(), 4);
    }

    #[test]
    fn profile_means_per_bin() {
        let mut p = Profile1D::new(34, -85.0, 85.0, 0.0, 10.0, ErrorMode::Spread);
        p.fill(2.5, 4.0);
        p.fill(2.5, 6.0);
        p.fill(-80.0, 3.0);

        assert_eq!(p.entries_at(2.5), 2.0);
        assert!((p.mean_at(2.5) - 5.0).abs() < 1e-12);
        assert!((p.mean_at(-80.0) - 3.0).abs() < 1e-12);
        assert_eq!(p.rejected(), 0);
    }

    #[test]
    fn profile_rejects_samples_outside_value_bounds() {
        let mut p = Profile1D::new(10, 0.0, 10.0, 0.0, 10.0, ErrorMode::Spread);
        p.fill(5.0, 11.0);
        p.fill(5.0, -1.0);
        p.fill(5.0, 5.0);

        assert_eq!(p.rejected(), 2);
        assert_eq!(p.entries(), 1);
        assert!((p.mean_at(5.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn profile_spread_error() {
        let mut p = Profile1D::new(1, 0.0, 1.0, 0.0, 10.0, ErrorMode::Spread);
        p.fill(0.5, 4.0);
        p.fill(0.5, 6.0);
        // Spread of {4, 6} is 1.
        assert!((p.bin_error(0) - 1.0).abs() < 1e-12);

        let mut p = Profile1D::new(1, 0.0, 1.0, 0.0, 10.0, ErrorMode::Mean);
        p.fill(0.5, 4.0);
        p.fill(0.5, 6.0);
        assert!((p.bin_error(0) - 1.0 / 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn profile2d_accumulates_per_cell() {
        let mut p = Profile2D::new(
            72,
            0.0,
            360.0,
            34,
            -85.0,
            85.0,
            0.0,
            10.0,
            ErrorMode::Spread,
        );
        p.fill(10.5, 2.5, 7.0);
        p.fill(10.5, 2.5, 9.0);
        p.fill(350.0, -80.0, 1.0);

        assert_eq!(p.entries_at(10.5, 2.5), 2.0);
        assert!((p.mean_at(10.5, 2.5) - 8.0).abs() < 1e-12);
        assert!((p.mean_at(350.0, -80.0) - 1.0).abs() < 1e-12);

        p.reset();
        assert_eq!(p.entries(), 0);
        assert_eq!(p.entries_at(10.5, 2.5), 0.0);
    }

    #[test]
    fn element_fill_arity_mismatch_is_a_no_op() {
        let mut me = MonitorElement::new_1d("h", "h", 10, 0.0, 1.0);
        me.fill2(0.5, 0.5);
        me.fill3(0.5, 0.5, 0.5);
        assert_eq!(me.entries(), 0);

        me.fill(0.5);
        assert_eq!(me.entries(), 1);
    }

    #[test]
    fn element_reset_keeps_identity_and_tag() {
        let mut me = MonitorElement::new_1d("jitter", "jitter", 50, 0.0, 10.0);
        me.set_tag(3);
        me.fill(5.0);
        me.reset();

        assert_eq!(me.name(), "jitter");
        assert_eq!(me.tag(), Some(3));
        assert_eq!(me.entries(), 0);
    }
}
