use super::consts::{INVALID_VERSION, MAX_REGIONS};
use super::StcTime;
use smallvec::SmallVec;

/// Page lifecycle state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PageState {
    /// Page contents are invalid.
    Invalid,
    /// Page is currently being parsed.
    Incomplete,
    /// Page was successfully parsed.
    Complete,
    /// Page was complete but timed out.
    TimedOut,
}

/// Region reference carried by a page composition segment.
#[derive(Debug, Copy, Clone)]
pub(crate) struct RegionReference {
    /// Region identifier.
    pub region_id: u8,
    /// Region position X (window relative).
    pub position_x: i32,
    /// Region position Y (window relative).
    pub position_y: i32,
}

/// Subtitles page: version, timing and the ordered region reference list.
///
/// The state transition graph is fixed: `Invalid -> Incomplete` via
/// `start_parsing`, `Incomplete -> Complete` via `finish_parsing`,
/// `Complete -> TimedOut` via `set_timed_out`; `reset` drops to `Invalid`
/// from any state. Calls outside the graph are collaborator bugs and
/// panic.
pub(crate) struct Page {
    state: PageState,
    version: u8,
    region_refs: SmallVec<[RegionReference; MAX_REGIONS]>,
    pts: StcTime,
    timeout: u32,
}

impl Page {
    pub fn new() -> Self {
        Self {
            state: PageState::Invalid,
            version: INVALID_VERSION,
            region_refs: SmallVec::new(),
            pts: StcTime::default(),
            timeout: 0,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Current version (may be `INVALID_VERSION`).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn pts(&self) -> StcTime {
        self.pts
    }

    /// Page timeout in seconds.
    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    /// Drops the page to `Invalid` and forgets all region references.
    pub fn reset(&mut self) {
        self.state = PageState::Invalid;
        self.version = INVALID_VERSION;
        self.pts = StcTime::default();
        self.timeout = 0;
        self.region_refs.clear();
    }

    /// Marks the page as being currently parsed.
    pub fn start_parsing(&mut self, version: u8, pts: StcTime, timeout: u32) {
        self.state = PageState::Incomplete;
        self.version = version;
        self.pts = pts;
        self.timeout = timeout;
        self.region_refs.clear();
    }

    /// Moves the page from `Incomplete` to `Complete`.
    pub fn finish_parsing(&mut self) {
        assert!(
            self.state == PageState::Incomplete,
            "finish_parsing outside Incomplete"
        );
        self.state = PageState::Complete;
    }

    /// Moves the page from `Complete` to `TimedOut` and forgets the region
    /// references, so drawing presents no regions.
    pub fn set_timed_out(&mut self) {
        assert!(
            self.state == PageState::Complete,
            "set_timed_out outside Complete"
        );
        self.state = PageState::TimedOut;
        self.region_refs.clear();
    }

    /// Appends a region reference; false when the 16-entry list is full.
    pub fn add_region(&mut self, region_id: u8, position_x: u16, position_y: u16) -> bool {
        assert!(
            self.state == PageState::Incomplete,
            "add_region outside Incomplete"
        );
        if self.region_refs.len() < MAX_REGIONS {
            self.region_refs.push(RegionReference {
                region_id,
                position_x: position_x as i32,
                position_y: position_y as i32,
            });
            true
        } else {
            false
        }
    }

    pub fn regions(&self) -> &[RegionReference] {
        &self.region_refs
    }
}
