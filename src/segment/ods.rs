use crate::database::Database;
use crate::page::PageState;
use crate::pixels;
use crate::read_bitfield;
use crate::{PacketReader, Result};
use log::{info, trace};
use modular_bitfield_msb::prelude::*;

#[bitfield]
#[derive(Debug)]
pub(crate) struct OdsHeaderFlags {
    pub version: B4,
    pub coding_method: B2,
    pub non_modifying_colour: bool,
    #[skip]
    reserved: B1,
}

/// Object coding method carrying run-length coded pixels.
const CODING_METHOD_PIXELS: u8 = 0x00;

/// Parses an object data segment.
///
/// The object's two field data blocks are rendered onto the pixmap of
/// every region referencing the object id, at the position stored in the
/// reference, clipped to the pixmap. An empty bottom field reuses the top
/// field data for the odd lines.
pub(super) fn parse(database: &mut Database, reader: &mut PacketReader<'_>) -> Result<()> {
    if database.page().state() != PageState::Incomplete {
        trace!("page not currently being parsed");
        return Ok(());
    }

    let object_id = reader.read_be_u16()?;
    let flags = read_bitfield!(reader, OdsHeaderFlags);

    trace!(
        "object id={:04X} version={:X} coding={:X} non_modifying={}",
        object_id,
        flags.version(),
        flags.coding_method(),
        flags.non_modifying_colour()
    );

    if flags.coding_method() != CODING_METHOD_PIXELS {
        info!("unsupported object coding method: {}", flags.coding_method());
        return Ok(());
    }

    let top_field_length = reader.read_be_u16()? as usize;
    let bottom_field_length = reader.read_be_u16()? as usize;

    let top_field = reader.new_sub_reader(top_field_length)?;
    let bottom_field = reader.new_sub_reader(bottom_field_length)?;

    let (regions, object_refs, pixmaps) = database.pixmap_parts();

    for index in 0..regions.count() {
        let region = match regions.by_index(index) {
            Some(region) => region,
            None => continue,
        };
        for object_ref in region.objects(object_refs) {
            if object_ref.object_id != object_id {
                continue;
            }

            trace!(
                "rendering object {:04X} into region {} at {},{}",
                object_id,
                region.id(),
                object_ref.position_x,
                object_ref.position_y
            );

            // an empty bottom field means the top field data covers both
            let bottom = if bottom_field_length > 0 {
                &bottom_field
            } else {
                &top_field
            };

            pixels::render_object(
                pixmaps,
                region,
                object_ref.position_x,
                object_ref.position_y,
                &top_field,
                bottom,
                flags.non_modifying_colour(),
            )?;
        }
    }

    Ok(())
}
