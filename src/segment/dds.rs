use crate::database::Database;
use crate::read_bitfield;
use crate::{PacketReader, Rectangle, Result};
use log::trace;
use modular_bitfield_msb::prelude::*;

#[bitfield]
#[derive(Debug)]
pub(crate) struct DdsHeaderFlags {
    pub version: B4,
    pub display_window_flag: bool,
    #[skip]
    reserved: B3,
}

/// Parses a display definition segment (specification 1.3.1 only).
///
/// Writes the *parsed* display; the end-of-display-set segment promotes
/// it to the current one. Without the window flag the window equals the
/// display bounds.
pub(super) fn parse(database: &mut Database, reader: &mut PacketReader<'_>) -> Result<()> {
    let flags = read_bitfield!(reader, DdsHeaderFlags);
    let version = flags.version();

    if database.parsed_display().version() == version {
        trace!("same display definition version, skipping");
        return Ok(());
    }

    let display_width = reader.read_be_u16()? as i32 + 1;
    let display_height = reader.read_be_u16()? as i32 + 1;

    let display_bounds = Rectangle {
        x1: 0,
        y1: 0,
        x2: display_width,
        y2: display_height,
    };

    let window_bounds = if flags.display_window_flag() {
        let h_min = reader.read_be_u16()? as i32;
        let h_max = reader.read_be_u16()? as i32;
        let v_min = reader.read_be_u16()? as i32;
        let v_max = reader.read_be_u16()? as i32;
        Rectangle {
            x1: h_min,
            y1: v_min,
            x2: h_max + 1,
            y2: v_max + 1,
        }
    } else {
        display_bounds
    };

    trace!(
        "display definition version={:X} display={}x{} window={:?}",
        version,
        display_width,
        display_height,
        window_bounds
    );

    database
        .parsed_display_mut()
        .set(version, display_bounds, window_bounds);

    Ok(())
}
