use super::from_primitive_map_err;
use crate::database::Database;
use crate::page::PageState;
use crate::read_bitfield;
use crate::{AcquisitionMode, ErrorDetails, PacketReader, Result};
use log::{info, trace};
use modular_bitfield_msb::prelude::*;
use num_derive::FromPrimitive;

#[bitfield]
#[derive(Debug)]
pub(crate) struct PcsHeaderFlags {
    pub version: B4,
    pub page_state: B2,
    #[skip]
    reserved: B2,
}

/// Page state carried by a page composition segment.
///
/// The fourth (reserved) encoding is mapped to a parse error.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub(crate) enum PageCompositionState {
    /// Update of the currently displayed page.
    NormalCase,
    /// Display set carrying everything needed to show the page.
    AcquisitionPoint,
    /// New epoch.
    ModeChange,
}

/// Parses a page composition segment.
///
/// Handles the epoch/acquisition state machine, then (re)starts page
/// parsing and collects the region reference list.
pub(super) fn parse(database: &mut Database, reader: &mut PacketReader<'_>) -> Result<()> {
    let timeout = reader.read_u8()? as u32;
    let flags = read_bitfield!(reader, PcsHeaderFlags);
    let version = flags.version();

    let page_state: PageCompositionState = from_primitive_map_err(flags.page_state(), |_| {
        reader.make_error(ErrorDetails::InvalidPageState)
    })?;

    trace!(
        "page version={:X} timeout={} state={:?}",
        version,
        timeout,
        page_state
    );

    if database.page().version() == version {
        trace!("same page version, skipping");
        return Ok(());
    }

    let has_baseline = matches!(
        database.page().state(),
        PageState::Complete | PageState::TimedOut
    );

    match page_state {
        PageCompositionState::ModeChange => {
            // carries all the data needed, start from scratch
            database.epoch_reset();
        }
        PageCompositionState::AcquisitionPoint => {
            match database.status().acquisition_mode() {
                AcquisitionMode::Continue if has_baseline => {
                    // ETSI semantics: the page continues the epoch
                }
                _ => {
                    // acquisition points carry all the data needed, so a
                    // reset is the safe way to handle the page; content
                    // providers frequently broadcast every page
                    // composition as an acquisition point with some
                    // pages being empty
                    database.epoch_reset();
                }
            }
        }
        PageCompositionState::NormalCase => {
            if !has_baseline {
                // cannot update without a complete display set as baseline
                trace!("complete display set needed, skipping");
                return Ok(());
            }
        }
    }

    let last_pts = database.status().last_pts();
    database.page_mut().start_parsing(version, last_pts, timeout);

    while reader.remaining_len() > 0 {
        let region_id = reader.read_u8()?;
        reader.skip(1)?; // reserved
        let address_x = reader.read_be_u16()?;
        let address_y = reader.read_be_u16()?;

        trace!("page region id={:02X} pos={},{}", region_id, address_x, address_y);

        if !database.page_mut().add_region(region_id, address_x, address_y) {
            info!("not enough space to store region reference");
        }
    }

    Ok(())
}
