use crate::clut::ColorYCrCbT;
use crate::consts::clut_flags;
use crate::database::Database;
use crate::page::PageState;
use crate::read_bitfield;
use crate::{PacketReader, Result};
use log::{info, trace, warn};
use modular_bitfield_msb::prelude::*;

#[bitfield]
#[derive(Debug)]
pub(crate) struct CdsHeaderFlags {
    pub version: B4,
    #[skip]
    reserved: B4,
}

/// Parses a CLUT definition segment.
///
/// Entries override the default tables loaded on CLUT reset; each entry
/// may target any combination of the 2-, 4- and 8-bit tables, gated by a
/// range check on the entry id.
pub(super) fn parse(database: &mut Database, reader: &mut PacketReader<'_>) -> Result<()> {
    if database.page().state() != PageState::Incomplete {
        trace!("page not currently being parsed");
        return Ok(());
    }

    let clut_id = reader.read_u8()?;
    let flags = read_bitfield!(reader, CdsHeaderFlags);
    let version = flags.version();

    trace!("clut id={:02X} version={:X}", clut_id, version);

    match database.clut_by_id(clut_id) {
        None => {
            info!("clut {} not found, skipping", clut_id);
            return Ok(());
        }
        Some(clut) => {
            if clut.version() == version {
                trace!("same clut version, skipping");
                return Ok(());
            }
        }
    }

    while reader.remaining_len() > 0 {
        let entry_id = reader.read_u8()?;
        let entry_flags = reader.read_u8()?;

        let color = if entry_flags & clut_flags::FULL_RANGE != 0 {
            ColorYCrCbT {
                y: reader.read_u8()?,
                cr: reader.read_u8()?,
                cb: reader.read_u8()?,
                t: reader.read_u8()?,
            }
        } else {
            // packed Y:6 Cr:4 Cb:4 T:2, shifted up to full range
            let value = reader.read_be_u16()?;
            ColorYCrCbT {
                y: (((value >> 10) & 0x3F) as u8) << 2,
                cr: (((value >> 6) & 0x0F) as u8) << 4,
                cb: (((value >> 2) & 0x0F) as u8) << 4,
                t: ((value & 0x03) as u8) << 6,
            }
        };

        let argb = color.to_argb();

        trace!("clut entry {} flags={:02X} argb={:08X}", entry_id, entry_flags, argb);

        // lookup again per entry; the table borrow cannot be held across
        // the reader calls above
        let clut = match database.clut_by_id_mut(clut_id) {
            Some(clut) => clut,
            None => break,
        };

        if entry_flags & clut_flags::ENTRY_2BIT != 0 {
            if entry_id < (1 << 2) {
                clut.set_2bit(entry_id, argb);
            } else {
                warn!("entry {} outside 2 bit range", entry_id);
            }
        }
        if entry_flags & clut_flags::ENTRY_4BIT != 0 {
            if entry_id < (1 << 4) {
                clut.set_4bit(entry_id, argb);
            } else {
                warn!("entry {} outside 4 bit range", entry_id);
            }
        }
        if entry_flags & clut_flags::ENTRY_8BIT != 0 {
            clut.set_8bit(entry_id, argb);
        }
    }

    if let Some(clut) = database.clut_by_id_mut(clut_id) {
        clut.set_version(version);
    }

    Ok(())
}
