//! Monitoring store service: booking, tagging, removal and snapshots.
//!
//! The store owns every booked [`MonitorElement`], organized in named
//! folders. Tasks hold cheap cloneable [`ElementHandle`]s to the elements
//! they booked and fill through them; the store itself is only touched at
//! lifecycle boundaries (booking, tagging, removal, reset, snapshot).
//!
//! A handle stays usable after its element is removed from the store: fills
//! then accumulate into a detached element that is dropped with the last
//! handle. That mirrors the contract the tasks are written against — filling
//! is never an error, removal only affects what a snapshot can see.

mod element;

pub use element::{Axis, ElementData, ErrorMode, Hist1D, Hist2D, MonitorElement, Profile1D, Profile2D};

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type SharedElement = Arc<Mutex<MonitorElement>>;

/// Cloneable handle to one booked element.
#[derive(Clone, Debug)]
pub struct ElementHandle {
    element: SharedElement,
}

impl ElementHandle {
    fn locked(&self) -> MutexGuard<'_, MonitorElement> {
        self.element.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fills a 1-D histogram with `x`.
    pub fn fill(&self, x: f64) {
        self.locked().fill(x);
    }

    /// Fills a 2-D histogram or 1-D profile with `(x, y)`.
    pub fn fill2(&self, x: f64, y: f64) {
        self.locked().fill2(x, y);
    }

    /// Fills a 2-D profile with `(x, y, v)`.
    pub fn fill3(&self, x: f64, y: f64, v: f64) {
        self.locked().fill3(x, y, v);
    }

    /// Zeroes the element's contents in place.
    pub fn reset(&self) {
        self.locked().reset();
    }

    /// Sets the title of axis `axis` (1-based).
    pub fn set_axis_title(&self, title: &str, axis: usize) {
        self.locked().set_axis_title(title, axis);
    }

    /// Element name.
    pub fn name(&self) -> String {
        self.locked().name().to_string()
    }

    /// Accepted fill calls since booking or the last reset.
    pub fn entries(&self) -> u64 {
        self.locked().entries()
    }

    /// A point-in-time copy of the element, for inspection.
    pub fn snapshot(&self) -> MonitorElement {
        self.locked().clone()
    }
}

#[derive(Default)]
struct StoreInner {
    current_folder: String,
    folders: BTreeMap<String, BTreeMap<String, SharedElement>>,
}

/// Snapshot of the whole store, folder by folder.
#[derive(Debug, Serialize)]
pub struct StoreSnapshot {
    /// Booked elements grouped by folder path.
    pub folders: BTreeMap<String, Vec<MonitorElement>>,
}

/// The monitoring store service.
///
/// Shared across tasks behind an `Arc`; all mutation goes through an internal
/// lock so handles can be filled from whichever task booked them.
#[derive(Default)]
pub struct MonitorStore {
    inner: Mutex<StoreInner>,
}

impl MonitorStore {
    /// Creates an empty store with the root folder selected.
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Selects the folder subsequent bookings and removals address.
    pub fn set_current_folder(&self, path: &str) {
        self.locked().current_folder = path.to_string();
    }

    /// The currently selected folder path.
    pub fn current_folder(&self) -> String {
        self.locked().current_folder.clone()
    }

    fn insert(&self, element: MonitorElement) -> ElementHandle {
        let mut inner = self.locked();
        let folder = inner.current_folder.clone();
        let name = element.name().to_string();
        let shared = Arc::new(Mutex::new(element));
        let replaced = inner
            .folders
            .entry(folder.clone())
            .or_default()
            .insert(name.clone(), Arc::clone(&shared));
        if replaced.is_some() {
            debug!(folder = %folder, name = %name, "rebooked element replaces existing entry");
        }
        ElementHandle { element: shared }
    }

    /// Books a 1-D histogram in the current folder.
    pub fn book_1d(
        &self,
        name: &str,
        title: &str,
        nbins: usize,
        low: f64,
        high: f64,
    ) -> ElementHandle {
        self.insert(MonitorElement::new_1d(name, title, nbins, low, high))
    }

    /// Books a 2-D histogram in the current folder.
    #[allow(clippy::too_many_arguments)]
    pub fn book_2d(
        &self,
        name: &str,
        title: &str,
        nx: usize,
        x_low: f64,
        x_high: f64,
        ny: usize,
        y_low: f64,
        y_high: f64,
    ) -> ElementHandle {
        self.insert(MonitorElement::new_2d(
            name, title, nx, x_low, x_high, ny, y_low, y_high,
        ))
    }

    /// Books a 1-D profile in the current folder.
    #[allow(clippy::too_many_arguments)]
    pub fn book_profile(
        &self,
        name: &str,
        title: &str,
        nbins: usize,
        low: f64,
        high: f64,
        v_low: f64,
        v_high: f64,
        error_mode: ErrorMode,
    ) -> ElementHandle {
        self.insert(MonitorElement::new_profile(
            name, title, nbins, low, high, v_low, v_high, error_mode,
        ))
    }

    /// Books a 2-D profile in the current folder.
    #[allow(clippy::too_many_arguments)]
    pub fn book_profile_2d(
        &self,
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
    ) -> ElementHandle {
        self.insert(MonitorElement::new_profile_2d(
            name, title, nx, x_low, x_high, ny, y_low, y_high, v_low, v_high, error_mode,
        ))
    }

    /// Attaches an integer tag to a booked element.
    pub fn tag(&self, handle: &ElementHandle, tag: u32) {
        handle.locked().set_tag(tag);
    }

    /// Removes the named element from the current folder.
    ///
    /// Live handles to the element stay usable but detached; a later booking
    /// under the same name creates a fresh element.
    pub fn remove_element(&self, name: &str) {
        let mut inner = self.locked();
        let folder = inner.current_folder.clone();
        if let Some(elements) = inner.folders.get_mut(&folder) {
            elements.remove(name);
            if elements.is_empty() {
                inner.folders.remove(&folder);
            }
        }
    }

    /// Removes a folder and everything below it.
    pub fn rmdir(&self, path: &str) {
        let prefix = format!("{path}/");
        let mut inner = self.locked();
        inner
            .folders
            .retain(|folder, _| folder != path && !folder.starts_with(&prefix));
    }

    /// Looks up an element by folder and name.
    pub fn element(&self, folder: &str, name: &str) -> Option<ElementHandle> {
        let inner = self.locked();
        inner
            .folders
            .get(folder)
            .and_then(|elements| elements.get(name))
            .map(|shared| ElementHandle {
                element: Arc::clone(shared),
            })
    }

    /// Whether the named element is currently booked.
    pub fn contains(&self, folder: &str, name: &str) -> bool {
        let inner = self.locked();
        inner
            .folders
            .get(folder)
            .is_some_and(|elements| elements.contains_key(name))
    }

    /// Total number of booked elements across all folders.
    pub fn element_count(&self) -> usize {
        let inner = self.locked();
        inner.folders.values().map(BTreeMap::len).sum()
    }

    /// A point-in-time copy of every booked element, grouped by folder.
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.locked();
        let folders = inner
            .folders
            .iter()
            .map(|(folder, elements)| {
                let copies = elements
                    .values()
                    .map(|shared| shared.lock().unwrap_or_else(PoisonError::into_inner).clone())
                    .collect();
                (folder.clone(), copies)
            })
            .collect();
        StoreSnapshot { folders }
    }
}
