//! Segment-level parsers for subtitle display sets.
//!
//! A PES packet body, once past the two-byte data-identifier prefix, is a
//! sequence of segments framed as sync byte 0x0F, type, page id, length
//! and payload, terminated by 0xFF. Each parser consumes exactly one
//! segment payload and mutates the [`Database`].

use super::consts::{pes_bits, segment_type};
use super::database::Database;
use super::{ErrorDetails, PacketReader, Result, Specification};
use log::{info, trace};

mod cds;
mod dds;
mod eds;
mod ods;
mod pcs;
mod rcs;

/// Maps a wire value onto an enum, turning unknown values into an error.
pub(crate) fn from_primitive_map_err<T: num_traits::FromPrimitive, E, F: FnOnce(u8) -> E>(
    value: u8,
    err_fn: F,
) -> std::result::Result<T, E> {
    match T::from_u8(value) {
        Some(parsed) => Ok(parsed),
        None => Err(err_fn(value)),
    }
}

/// Walks all subtitling segments of one PES packet body.
///
/// A wrong data identifier or subtitle stream id skips the packet
/// quietly; framing violations inside the segment sequence are parse
/// errors that make the pipeline reset the epoch.
pub(crate) fn parse_packet_data(database: &mut Database, reader: &mut PacketReader<'_>) -> Result<()> {
    trace!("packet data length={}", reader.remaining_len());

    let data_identifier = reader.read_u8()?;
    if data_identifier != pes_bits::SUBTITLE_DATA_IDENTIFIER {
        info!("Invalid data identifier: {}", data_identifier);
        return Ok(());
    }

    let subtitle_stream_id = reader.read_u8()?;
    if subtitle_stream_id != pes_bits::SUBTITLE_STREAM_ID {
        info!("Invalid DVB subtitles stream identifier: {}", subtitle_stream_id);
        return Ok(());
    }

    while reader.peek_u8()? == pes_bits::SYNC_BYTE {
        process_subtitling_segment(database, reader)?;
    }

    let end_marker = reader.read_u8()?;
    if end_marker != pes_bits::END_MARKER {
        info!("Invalid end marker: {:02X}", end_marker);
        return Err(reader.make_error(ErrorDetails::BadEndMarker));
    }

    Ok(())
}

fn process_subtitling_segment(database: &mut Database, reader: &mut PacketReader<'_>) -> Result<()> {
    let sync_byte = reader.read_u8()?;
    let seg_type = reader.read_u8()?;
    let page_id = reader.read_be_u16()?;
    let seg_length = reader.read_be_u16()? as usize;

    trace!(
        "segment sync={:02X} type={:02X} page={:04X} length={}",
        sync_byte,
        seg_type,
        page_id,
        seg_length
    );

    if sync_byte != pes_bits::SYNC_BYTE {
        return Err(reader.make_error(ErrorDetails::LostSync));
    }

    if database.status().is_selected_page(page_id) {
        let mut seg_reader = reader.new_sub_reader(seg_length)?;
        parse_segment(database, page_id, seg_type, &mut seg_reader)
    } else {
        trace!("segment for page that is not selected: {}", page_id);
        reader.skip(seg_length)
    }
}

fn parse_segment(
    database: &mut Database,
    page_id: u16,
    seg_type: u8,
    reader: &mut PacketReader<'_>,
) -> Result<()> {
    match seg_type {
        segment_type::PAGE_COMPOSITION => {
            if database.status().is_composition_page(page_id) {
                pcs::parse(database, reader)?;
            } else {
                trace!("ignored page composition segment for page={:04X}", page_id);
            }
        }

        segment_type::REGION_COMPOSITION => {
            if database.status().is_composition_page(page_id) {
                rcs::parse(database, reader)?;
            } else {
                trace!("ignored region composition segment for page={:04X}", page_id);
            }
        }

        segment_type::CLUT_DEFINITION => cds::parse(database, reader)?,

        segment_type::OBJECT_DATA => ods::parse(database, reader)?,

        segment_type::DISPLAY_DEFINITION => {
            if database.status().spec_version() == Specification::V1_3_1 {
                if database.status().is_composition_page(page_id) {
                    dds::parse(database, reader)?;
                } else {
                    trace!("ignored display definition segment for page={:04X}", page_id);
                }
            } else {
                trace!("ignored unexpected display definition (using spec 1.2.1)");
            }
        }

        segment_type::DISPARITY_SIGNALLING => {
            trace!("ignored disparity signalling segment for page={:04X}", page_id);
        }

        segment_type::END_OF_DISPLAY_SET => {
            // checked against the ancillary page only: when it equals the
            // composition page this collapses to the composition page, and
            // with distinct pages the ancillary segment defines the end of
            // data
            if database.status().is_ancillary_page(page_id) {
                eds::parse(database, reader)?;
            } else {
                trace!("ignored end of display set segment for page={:04X}", page_id);
            }
        }

        _ => {
            info!("unknown segment type {:02X} for page {:04X}", seg_type, page_id);
        }
    }

    Ok(())
}
