use super::consts::{INVALID_VERSION, MAX_REGIONS};
use super::Rectangle;
use smallvec::SmallVec;

/// Default display width when the stream defines no bounds (SD).
pub(crate) const DEFAULT_SD_WIDTH: i32 = 720;

/// Default display height when the stream defines no bounds (SD).
pub(crate) const DEFAULT_SD_HEIGHT: i32 = 576;

/// Display definition: display and window bounds.
///
/// If no display definition segment was received the SD resolution from
/// the specification applies; an absent window equals the display. The
/// database owns two of these: the *parsed* one written by DDS and the
/// *current* one promoted from it on end-of-display-set.
#[derive(Debug, Clone)]
pub(crate) struct Display {
    version: u8,
    display_bounds: Rectangle,
    window_bounds: Rectangle,
}

impl Default for Display {
    fn default() -> Self {
        let display_bounds = Rectangle {
            x1: 0,
            y1: 0,
            x2: DEFAULT_SD_WIDTH,
            y2: DEFAULT_SD_HEIGHT,
        };
        Self {
            version: INVALID_VERSION,
            display_bounds,
            window_bounds: display_bounds,
        }
    }
}

impl Display {
    /// Version of the display definition (may be `INVALID_VERSION`).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn display_bounds(&self) -> Rectangle {
        self.display_bounds
    }

    pub fn window_bounds(&self) -> Rectangle {
        self.window_bounds
    }

    pub fn set(&mut self, version: u8, display_bounds: Rectangle, window_bounds: Rectangle) {
        self.version = version;
        self.display_bounds = display_bounds;
        self.window_bounds = window_bounds;
    }

    /// Back to the invalid version and default SD bounds.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Single rendered region entry of a [`RenderingState`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct RegionInfo {
    /// Region identifier.
    pub id: u8,
    /// Region version at draw time.
    pub version: u8,
    /// Region location on the display.
    pub rectangle: Rectangle,
    /// Marks regions that still need a draw/clear in the current pass.
    pub dirty: bool,
}

/// What is (or is about to be) on screen: bounds plus rendered regions.
///
/// The database holds two states and swaps them per draw; the presenter
/// diffs them to emit minimal drawing operations.
#[derive(Debug, Default, Clone)]
pub(crate) struct RenderingState {
    display_bounds: Rectangle,
    window_bounds: Rectangle,
    regions: SmallVec<[RegionInfo; MAX_REGIONS]>,
}

impl RenderingState {
    /// Invalidates the bounds and removes all regions.
    pub fn reset(&mut self) {
        self.display_bounds = Rectangle::default();
        self.window_bounds = Rectangle::default();
        self.regions.clear();
    }

    pub fn display_bounds(&self) -> Rectangle {
        self.display_bounds
    }

    pub fn window_bounds(&self) -> Rectangle {
        self.window_bounds
    }

    pub fn set_bounds(&mut self, display_bounds: Rectangle, window_bounds: Rectangle) {
        self.display_bounds = display_bounds;
        self.window_bounds = window_bounds;
    }

    pub fn remove_all_regions(&mut self) {
        self.regions.clear();
    }

    /// Appends a region entry; false when the 16-entry list is full.
    pub fn add_region(&mut self, id: u8, version: u8, rectangle: Rectangle) -> bool {
        if self.regions.len() < MAX_REGIONS {
            self.regions.push(RegionInfo {
                id,
                version,
                rectangle,
                dirty: true,
            });
            true
        } else {
            false
        }
    }

    pub fn mark_all_regions_dirty(&mut self) {
        for region in &mut self.regions {
            region.dirty = true;
        }
    }

    pub fn unmark_region_dirty(&mut self, index: usize) {
        self.regions[index].dirty = false;
    }

    pub fn regions(&self) -> &[RegionInfo] {
        &self.regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_defaults_to_sd() {
        let display = Display::default();
        assert_eq!(display.version(), INVALID_VERSION);
        let bounds = display.display_bounds();
        assert_eq!((bounds.x1, bounds.y1, bounds.x2, bounds.y2), (0, 0, 720, 576));
        assert_eq!(display.window_bounds(), bounds);
    }

    #[test]
    fn rendering_state_region_list_is_bounded() {
        let mut state = RenderingState::default();
        let rect = Rectangle {
            x1: 0,
            y1: 0,
            x2: 10,
            y2: 10,
        };
        for i in 0..MAX_REGIONS {
            assert!(state.add_region(i as u8, 0, rect));
        }
        assert!(!state.add_region(0xAA, 0, rect));
    }

    #[test]
    fn dirty_marking_round_trips() {
        let mut state = RenderingState::default();
        let rect = Rectangle {
            x1: 0,
            y1: 0,
            x2: 10,
            y2: 10,
        };
        state.add_region(1, 0, rect);
        state.add_region(2, 0, rect);
        state.unmark_region_dirty(1);
        assert!(state.regions()[0].dirty);
        assert!(!state.regions()[1].dirty);
        state.mark_all_regions_dirty();
        assert!(state.regions().iter().all(|region| region.dirty));
    }
}
