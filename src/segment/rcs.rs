use super::from_primitive_map_err;
use crate::consts::depth_bits;
use crate::database::Database;
use crate::page::PageState;
use crate::read_bitfield;
use crate::{ErrorDetails, PacketReader, Result};
use log::{trace, warn};
use modular_bitfield_msb::prelude::*;
use num_derive::FromPrimitive;

#[bitfield]
#[derive(Debug)]
pub(crate) struct RcsHeaderFlags {
    pub version: B4,
    pub fill_flag: bool,
    #[skip]
    reserved: B3,
}

#[bitfield]
#[derive(Debug)]
pub(crate) struct RcsRegionFlags {
    pub compatibility_level: B3,
    pub depth: B3,
    #[skip]
    reserved: B2,
}

#[bitfield]
#[derive(Debug)]
pub(crate) struct RcsBackgroundFlags {
    pub pixel_4bit: B4,
    pub pixel_2bit: B2,
    #[skip]
    reserved: B2,
}

#[bitfield]
#[derive(Debug)]
pub(crate) struct RcsObjectWord {
    pub object_type: B2,
    pub provider_flag: B2,
    pub position_x: B12,
}

/// Region object types; only basic bitmaps are supported.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub(crate) enum RegionObjectType {
    BasicBitmap,
    BasicCharacter,
    CompositeString,
}

/// Object provider values; only the subtitling stream itself is supported.
const PROVIDER_SUBTITLING_STREAM: u8 = 0x00;

fn is_valid_depth_code(code: u8) -> bool {
    matches!(
        code,
        depth_bits::DEPTH_2BIT | depth_bits::DEPTH_4BIT | depth_bits::DEPTH_8BIT
    )
}

/// Parses a region composition segment.
///
/// Creates the region (with pixmap and CLUT) during epoch start, verifies
/// static parameters on redefinition and rebuilds the object reference
/// list. A conflicting redefinition or unsupported object is a fatal
/// epoch error.
pub(super) fn parse(database: &mut Database, reader: &mut PacketReader<'_>) -> Result<()> {
    if database.page().state() != PageState::Incomplete {
        trace!("page not currently being parsed");
        return Ok(());
    }

    let region_id = reader.read_u8()?;
    let flags = read_bitfield!(reader, RcsHeaderFlags);
    let version = flags.version();
    let fill_flag = flags.fill_flag();

    trace!("region id={:02X} version={:X} fill={}", region_id, version, fill_flag);

    let exists = match database.region_by_id(region_id) {
        Some(region) => {
            if region.version() == version {
                trace!("same region version, skipping");
                return Ok(());
            }
            true
        }
        None => {
            if !database.can_add_region() {
                warn!("Cannot add region to database, skipping");
                return Ok(());
            }
            false
        }
    };

    let width = reader.read_be_u16()? as i32;
    let height = reader.read_be_u16()? as i32;
    let region_flags = read_bitfield!(reader, RcsRegionFlags);
    let compatibility_level = region_flags.compatibility_level();
    let depth = region_flags.depth();
    let clut_id = reader.read_u8()?;

    trace!(
        "region size={}x{} compatibility={:X} depth={:X} clut={:02X}",
        width,
        height,
        compatibility_level,
        depth,
        clut_id
    );

    if !exists {
        if !is_valid_depth_code(compatibility_level) || !is_valid_depth_code(depth) {
            return Err(reader.make_error(ErrorDetails::InvalidRegionDepth));
        }
        if !database.add_region_and_clut(
            region_id,
            width,
            height,
            compatibility_level,
            depth,
            clut_id,
        ) {
            warn!("cannot add region, skipping");
            return Ok(());
        }
    } else if let Some(region) = database.region_by_id(region_id) {
        if region.width() != width
            || region.height() != height
            || region.depth() != depth
            || region.compatibility_level() != compatibility_level
            || region.clut_id() != clut_id
        {
            return Err(reader.make_error(ErrorDetails::RegionParamsChanged));
        }
    }

    let pixel_8bit = reader.read_u8()?;
    let background_flags = read_bitfield!(reader, RcsBackgroundFlags);

    let background_index = match depth {
        depth_bits::DEPTH_2BIT => background_flags.pixel_2bit(),
        depth_bits::DEPTH_4BIT => background_flags.pixel_4bit(),
        depth_bits::DEPTH_8BIT => pixel_8bit,
        _ => return Err(reader.make_error(ErrorDetails::InvalidRegionDepth)),
    };
    if let Some(region) = database.region_by_id_mut(region_id) {
        region.set_background_index(background_index);
    }

    database.remove_region_objects(region_id);

    while reader.remaining_len() > 0 {
        let object_id = reader.read_be_u16()?;
        let word = read_bitfield!(reader, RcsObjectWord);
        let position_y = (reader.read_be_u16()? & 0x0FFF) as i32;
        let position_x = word.position_x() as i32;

        trace!(
            "region object id={:04X} type={:X} provider={:X} pos={},{}",
            object_id,
            word.object_type(),
            word.provider_flag(),
            position_x,
            position_y
        );

        let object_type: RegionObjectType = from_primitive_map_err(word.object_type(), |raw| {
            reader.make_error(ErrorDetails::UnsupportedObjectType(raw))
        })?;

        if matches!(
            object_type,
            RegionObjectType::BasicCharacter | RegionObjectType::CompositeString
        ) {
            // foreground/background pixel codes of character objects
            let _foreground = reader.read_u8()?;
            let _background = reader.read_u8()?;
        }

        if object_type != RegionObjectType::BasicBitmap {
            return Err(reader.make_error(ErrorDetails::UnsupportedObjectType(
                object_type as u8,
            )));
        }
        if word.provider_flag() != PROVIDER_SUBTITLING_STREAM {
            return Err(reader.make_error(ErrorDetails::UnsupportedObjectProvider(
                word.provider_flag(),
            )));
        }

        if !database.add_region_object(region_id, object_id, position_x, position_y) {
            return Err(reader.make_error(ErrorDetails::ObjectRefsExhausted));
        }
    }

    if fill_flag {
        database.fill_region_pixmap(region_id);
    }

    if let Some(region) = database.region_by_id_mut(region_id) {
        region.set_version(version);
    }

    Ok(())
}
