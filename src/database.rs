use super::arena::{PixmapArena, PixmapSpan};
use super::clut::Clut;
use super::consts::{MAX_CLUTS, MAX_REGIONS};
use super::display::{Display, RenderingState};
use super::page::{Page, PageState};
use super::pool::{IdTable, ObjectRefPool};
use super::region::Region;
use super::{AcquisitionMode, Specification, StcTime};
use log::{info, trace};

/// Decoder status: stream selection and pipeline bookkeeping.
pub(crate) struct Status {
    spec_version: Specification,
    composition_page_id: u16,
    ancillary_page_id: u16,
    last_pts: StcTime,
    acquisition_mode: AcquisitionMode,
}

impl Status {
    fn new(spec_version: Specification) -> Self {
        Self {
            spec_version,
            composition_page_id: 0,
            ancillary_page_id: 0,
            last_pts: StcTime::default(),
            acquisition_mode: AcquisitionMode::EpochReset,
        }
    }

    pub fn spec_version(&self) -> Specification {
        self.spec_version
    }

    /// Selects composition and ancillary page ids. When no ancillary page
    /// is in use the caller passes the composition id in both slots.
    pub fn set_page_ids(&mut self, composition_page_id: u16, ancillary_page_id: u16) {
        self.composition_page_id = composition_page_id;
        self.ancillary_page_id = ancillary_page_id;
    }

    pub fn is_composition_page(&self, page_id: u16) -> bool {
        page_id == self.composition_page_id
    }

    pub fn is_ancillary_page(&self, page_id: u16) -> bool {
        page_id == self.ancillary_page_id
    }

    pub fn is_selected_page(&self, page_id: u16) -> bool {
        self.is_composition_page(page_id) || self.is_ancillary_page(page_id)
    }

    pub fn last_pts(&self) -> StcTime {
        self.last_pts
    }

    pub fn set_last_pts(&mut self, pts: StcTime) {
        self.last_pts = pts;
    }

    pub fn acquisition_mode(&self) -> AcquisitionMode {
        self.acquisition_mode
    }

    pub fn set_acquisition_mode(&mut self, mode: AcquisitionMode) {
        self.acquisition_mode = mode;
    }
}

/// Subtitles database.
///
/// Holds all parsed subtitle data (page, regions, CLUTs, object
/// references, pixmaps, display definitions) and the two rendering
/// states, inside pools sized once at construction. Contents cycle with
/// epochs; the structures live for the decoder lifetime.
pub(crate) struct Database {
    status: Status,
    is_epoch_start: bool,
    current_display: Display,
    parsed_display: Display,
    page: Page,
    regions: IdTable<Region>,
    cluts: IdTable<Clut>,
    object_refs: ObjectRefPool,
    pixmaps: PixmapArena,
    rendering_states: [RenderingState; 2],
    current_state: usize,
}

impl Database {
    pub fn new(spec_version: Specification) -> Self {
        Self {
            status: Status::new(spec_version),
            is_epoch_start: false,
            current_display: Display::default(),
            parsed_display: Display::default(),
            page: Page::new(),
            regions: IdTable::new(MAX_REGIONS),
            cluts: IdTable::new(MAX_CLUTS),
            object_refs: ObjectRefPool::new(),
            pixmaps: PixmapArena::new(spec_version.pixmap_pool_size()),
            rendering_states: [RenderingState::default(), RenderingState::default()],
            current_state: 1,
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    pub fn current_display(&self) -> &Display {
        &self.current_display
    }

    pub fn current_display_mut(&mut self) -> &mut Display {
        &mut self.current_display
    }

    pub fn parsed_display(&self) -> &Display {
        &self.parsed_display
    }

    pub fn parsed_display_mut(&mut self) -> &mut Display {
        &mut self.parsed_display
    }

    /// Resets the database on epoch start.
    ///
    /// Object references return to the pool, the region and CLUT tables
    /// are cleared (pixmaps invalidated), the pixmap arena is reclaimed
    /// whole, the page drops to invalid and region/CLUT creation is
    /// re-armed.
    pub fn epoch_reset(&mut self) {
        trace!("epoch reset");
        for index in 0..self.regions.count() {
            if let Some(region) = self.regions.by_index_mut(index) {
                region.clear_objects(&mut self.object_refs);
            }
        }
        self.regions.reset();
        self.cluts.reset();
        self.pixmaps.epoch_reset();
        self.page.reset();
        self.is_epoch_start = true;
    }

    /// Commits the page after it was successfully decoded; region and CLUT
    /// creation is disabled until the next epoch reset.
    pub fn commit_page(&mut self) {
        self.is_epoch_start = false;
    }

    /// Regions may be added only while gathering the epoch-start display
    /// set and while the page is being parsed.
    pub fn can_add_region(&self) -> bool {
        self.is_epoch_start
            && self.page.state() == PageState::Incomplete
            && self.regions.can_add()
    }

    pub fn region_count(&self) -> usize {
        self.regions.count()
    }

    pub fn region_by_id(&self, id: u8) -> Option<&Region> {
        self.regions.by_id(id)
    }

    pub fn region_by_id_mut(&mut self, id: u8) -> Option<&mut Region> {
        self.regions.by_id_mut(id)
    }

    pub fn clut_by_id(&self, id: u8) -> Option<&Clut> {
        self.cluts.by_id(id)
    }

    pub fn clut_by_id_mut(&mut self, id: u8) -> Option<&mut Clut> {
        self.cluts.by_id_mut(id)
    }

    /// Adds a region with its pixmap, creating the referenced CLUT if it
    /// does not exist yet. Returns false when any of the pools cannot
    /// satisfy the request.
    pub fn add_region_and_clut(
        &mut self,
        region_id: u8,
        width: i32,
        height: i32,
        compatibility_level: u8,
        depth: u8,
        clut_id: u8,
    ) -> bool {
        trace!(
            "add region={} size={}x{} comp={} depth={} clut={}",
            region_id,
            width,
            height,
            compatibility_level,
            depth,
            clut_id
        );

        if !self.can_add_region() {
            info!("region allocation disabled");
            return false;
        }
        if width <= 0 || height <= 0 {
            info!("invalid region size");
            return false;
        }
        if self.regions.by_id(region_id).is_some() {
            info!("region already exists");
            return false;
        }
        let needs_clut = self.cluts.by_id(clut_id).is_none();
        if needs_clut && !self.cluts.can_add() {
            info!("cannot add CLUT");
            return false;
        }
        let pixmap_size = (width as usize) * (height as usize);
        if !self.pixmaps.can_alloc(pixmap_size) {
            info!("cannot allocate pixmap memory ({} bytes)", pixmap_size);
            return false;
        }

        if needs_clut {
            // checked above; cannot fail
            let clut = self.cluts.add(clut_id).expect("CLUT table full");
            clut.set_id(clut_id);
            clut.reset();
        }
        let pixmap = self.pixmaps.alloc(pixmap_size).expect("pixmap arena full");
        let region = self.regions.add(region_id).expect("region table full");
        region.init(
            region_id,
            width,
            height,
            pixmap,
            compatibility_level,
            depth,
            clut_id,
        );

        true
    }

    /// Returns all object reference nodes of a region to the pool.
    pub fn remove_region_objects(&mut self, region_id: u8) {
        if let Some(region) = self.regions.by_id_mut(region_id) {
            region.clear_objects(&mut self.object_refs);
        }
    }

    /// Appends an object reference to a region; false when the shared
    /// 256-node pool is exhausted.
    pub fn add_region_object(
        &mut self,
        region_id: u8,
        object_id: u16,
        position_x: i32,
        position_y: i32,
    ) -> bool {
        let handle = match self.object_refs.alloc(object_id, position_x, position_y) {
            Some(handle) => handle,
            None => return false,
        };
        match self.regions.by_id_mut(region_id) {
            Some(region) => {
                region.add_object(&mut self.object_refs, handle);
                true
            }
            None => {
                self.object_refs.release(handle);
                false
            }
        }
    }

    /// Fills a region's pixmap with its background index.
    pub fn fill_region_pixmap(&mut self, region_id: u8) {
        if let Some(region) = self.regions.by_id(region_id) {
            let span = region.pixmap();
            let index = region.background_index();
            self.pixmaps.data_mut(span).fill(index);
        }
    }

    /// Disjoint borrows for object rendering: region table, object
    /// reference pool and the mutable pixmap arena.
    pub fn pixmap_parts(&mut self) -> (&IdTable<Region>, &ObjectRefPool, &mut PixmapArena) {
        (&self.regions, &self.object_refs, &mut self.pixmaps)
    }

    pub fn pixmap_data(&self, span: PixmapSpan) -> &[u8] {
        self.pixmaps.data(span)
    }

    /// Swaps current and previous rendering states.
    pub fn swap_rendering_states(&mut self) {
        self.current_state ^= 1;
    }

    pub fn current_rendering_state_mut(&mut self) -> &mut RenderingState {
        &mut self.rendering_states[self.current_state]
    }

    /// Both rendering states, current first.
    pub fn rendering_states(&self) -> (&RenderingState, &RenderingState) {
        (
            &self.rendering_states[self.current_state],
            &self.rendering_states[self.current_state ^ 1],
        )
    }

    /// Both rendering states, mutable, current first.
    pub fn rendering_states_mut(&mut self) -> (&mut RenderingState, &mut RenderingState) {
        let [first, second] = &mut self.rendering_states;
        if self.current_state == 0 {
            (first, second)
        } else {
            (second, first)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{depth_bits, MAX_OBJECT_REFS};

    fn incomplete_database() -> Database {
        let mut database = Database::new(Specification::V1_2_1);
        database.epoch_reset();
        database.page_mut().start_parsing(0, StcTime::default(), 10);
        database
    }

    #[test]
    fn regions_require_epoch_start_and_incomplete_page() {
        let mut database = Database::new(Specification::V1_2_1);
        assert!(!database.can_add_region());

        database.epoch_reset();
        // page still invalid
        assert!(!database.can_add_region());

        database.page_mut().start_parsing(0, StcTime::default(), 10);
        assert!(database.can_add_region());

        database.page_mut().finish_parsing();
        database.commit_page();
        assert!(!database.can_add_region());
    }

    #[test]
    fn add_region_creates_clut_once() {
        let mut database = incomplete_database();
        assert!(database.add_region_and_clut(
            1,
            40,
            20,
            depth_bits::DEPTH_4BIT,
            depth_bits::DEPTH_4BIT,
            7
        ));
        assert!(database.clut_by_id(7).is_some());
        let region = database.region_by_id(1).unwrap();
        assert_eq!(region.pixmap().len(), 40 * 20);

        // same clut is shared with the next region
        assert!(database.add_region_and_clut(
            2,
            8,
            8,
            depth_bits::DEPTH_2BIT,
            depth_bits::DEPTH_2BIT,
            7
        ));
        // duplicate region id is rejected
        assert!(!database.add_region_and_clut(
            1,
            8,
            8,
            depth_bits::DEPTH_2BIT,
            depth_bits::DEPTH_2BIT,
            7
        ));
    }

    #[test]
    fn epoch_reset_restores_all_pools() {
        let mut database = incomplete_database();
        assert!(database.add_region_and_clut(
            1,
            16,
            16,
            depth_bits::DEPTH_8BIT,
            depth_bits::DEPTH_8BIT,
            0
        ));
        for i in 0..20 {
            assert!(database.add_region_object(1, i, 0, 0));
        }
        assert_eq!(database.object_refs.free_count(), MAX_OBJECT_REFS - 20);

        database.epoch_reset();
        assert_eq!(database.region_count(), 0);
        assert!(database.clut_by_id(0).is_none());
        assert_eq!(database.object_refs.free_count(), MAX_OBJECT_REFS);
        assert_eq!(
            database.pixmaps.free_bytes(),
            Specification::V1_2_1.pixmap_pool_size()
        );
        assert_eq!(database.page().state(), PageState::Invalid);
        assert!(database.page_mut().regions().is_empty());
    }

    #[test]
    fn pixmap_fill_uses_background_index() {
        let mut database = incomplete_database();
        assert!(database.add_region_and_clut(
            1,
            4,
            2,
            depth_bits::DEPTH_4BIT,
            depth_bits::DEPTH_4BIT,
            0
        ));
        database.region_by_id_mut(1).unwrap().set_background_index(9);
        database.fill_region_pixmap(1);
        let span = database.region_by_id(1).unwrap().pixmap();
        assert_eq!(database.pixmap_data(span), &[9; 8]);
    }

    #[test]
    fn rendering_states_swap() {
        let mut database = Database::new(Specification::V1_2_1);
        database
            .current_rendering_state_mut()
            .add_region(1, 0, crate::Rectangle::default());
        database.swap_rendering_states();
        let (current, previous) = database.rendering_states_mut();
        assert!(current.regions().is_empty());
        assert_eq!(previous.regions().len(), 1);
    }
}
