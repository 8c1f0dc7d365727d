//! Object pixel-data decoding.
//!
//! Implements the run-length coded pixel-code strings of EN 300 743
//! (2-, 4- and 8-bit variants), the map tables translating lower-depth
//! codes into deeper regions, and the interlaced writer that paints the
//! decoded CLUT indices onto a region pixmap. Data is consumed straight
//! from the packet reader; no scratch buffer is involved.

use super::arena::PixmapArena;
use super::consts::depth_bits;
use super::region::Region;
use super::{PacketReader, Result};
use log::warn;

/// Field data block types.
const DATA_TYPE_2BIT_CODES: u8 = 0x10;
const DATA_TYPE_4BIT_CODES: u8 = 0x11;
const DATA_TYPE_8BIT_CODES: u8 = 0x12;
const DATA_TYPE_MAP_2_TO_4: u8 = 0x20;
const DATA_TYPE_MAP_2_TO_8: u8 = 0x21;
const DATA_TYPE_MAP_4_TO_8: u8 = 0x22;
const DATA_TYPE_END_OF_LINE: u8 = 0xF0;

/// Default map tables applied at the start of each field.
const DEFAULT_MAP_2_TO_4: [u8; 4] = [0x0, 0x7, 0x8, 0xF];
const DEFAULT_MAP_2_TO_8: [u8; 4] = [0x00, 0x77, 0x88, 0xFF];
const DEFAULT_MAP_4_TO_8: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF,
];

/// Identity map for codes already at the region depth.
const IDENTITY_MAP_16: [u8; 16] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// The non-modifying colour: with the ODS flag set, pixels of this code
/// leave the pixmap untouched.
const NON_MODIFYING_COLOUR: u8 = 1;

/// Paints decoded pixel runs onto one field of a region pixmap.
///
/// Lines advance by two (interlaced fields); writes outside the pixmap
/// are clipped per pixel.
struct PixelWriter<'a> {
    pixmap: &'a mut [u8],
    width: i32,
    height: i32,
    origin_x: i32,
    x: i32,
    y: i32,
    non_modifying: bool,
}

impl<'a> PixelWriter<'a> {
    fn new(
        pixmap: &'a mut [u8],
        width: i32,
        height: i32,
        position_x: i32,
        position_y: i32,
        field_offset: i32,
        non_modifying: bool,
    ) -> Self {
        Self {
            pixmap,
            width,
            height,
            origin_x: position_x,
            x: position_x,
            y: position_y + field_offset,
            non_modifying,
        }
    }

    /// Writes `count` pixels of `code` at the cursor, clipped.
    fn put(&mut self, code: u8, count: u32) {
        if self.non_modifying && code == NON_MODIFYING_COLOUR {
            self.x += count as i32;
            return;
        }
        if self.y >= 0 && self.y < self.height {
            let start = self.x.clamp(0, self.width);
            let end = (self.x + count as i32).clamp(0, self.width);
            if start < end {
                let row = (self.y * self.width) as usize;
                self.pixmap[row + start as usize..row + end as usize].fill(code);
            }
        }
        self.x += count as i32;
    }

    /// Moves the cursor to the start of the next field line.
    fn end_of_line(&mut self) {
        self.x = self.origin_x;
        self.y += 2;
    }
}

/// MSB-first bit reader over the packet reader.
///
/// Dropped at the end of each pixel-code string, which discards any
/// buffered stuffing bits; the underlying reader only ever advances by
/// whole bytes, so byte alignment is automatic.
struct BitReader<'a, 'b> {
    reader: &'a mut PacketReader<'b>,
    bits: u32,
    count: u8,
}

impl<'a, 'b> BitReader<'a, 'b> {
    fn new(reader: &'a mut PacketReader<'b>) -> Self {
        Self {
            reader,
            bits: 0,
            count: 0,
        }
    }

    fn read(&mut self, count: u8) -> Result<u32> {
        while self.count < count {
            self.bits = (self.bits << 8) | self.reader.read_u8()? as u32;
            self.count += 8;
        }
        self.count -= count;
        let value = (self.bits >> self.count) & ((1 << count) - 1);
        Ok(value)
    }
}

/// Decodes one 2-bit pixel-code string.
fn decode_2bit_string(
    reader: &mut PacketReader<'_>,
    writer: &mut PixelWriter<'_>,
    map: &[u8; 4],
) -> Result<()> {
    let mut bits = BitReader::new(reader);
    loop {
        let code = bits.read(2)?;
        if code != 0 {
            writer.put(map[code as usize], 1);
            continue;
        }
        if bits.read(1)? == 1 {
            let run = bits.read(3)? + 3;
            let code = bits.read(2)?;
            writer.put(map[code as usize], run);
        } else if bits.read(1)? == 1 {
            writer.put(map[0], 1);
        } else {
            match bits.read(2)? {
                0 => break, // end of string
                1 => writer.put(map[0], 2),
                2 => {
                    let run = bits.read(4)? + 12;
                    let code = bits.read(2)?;
                    writer.put(map[code as usize], run);
                }
                _ => {
                    let run = bits.read(8)? + 29;
                    let code = bits.read(2)?;
                    writer.put(map[code as usize], run);
                }
            }
        }
    }
    Ok(())
}

/// Decodes one 4-bit pixel-code string.
fn decode_4bit_string(
    reader: &mut PacketReader<'_>,
    writer: &mut PixelWriter<'_>,
    map: &[u8; 16],
) -> Result<()> {
    let mut bits = BitReader::new(reader);
    loop {
        let code = bits.read(4)?;
        if code != 0 {
            writer.put(map[code as usize], 1);
            continue;
        }
        if bits.read(1)? == 0 {
            let run = bits.read(3)?;
            if run == 0 {
                break; // end of string
            }
            writer.put(map[0], run + 2);
        } else if bits.read(1)? == 0 {
            let run = bits.read(2)? + 4;
            let code = bits.read(4)?;
            writer.put(map[code as usize], run);
        } else {
            match bits.read(2)? {
                0 => writer.put(map[0], 1),
                1 => writer.put(map[0], 2),
                2 => {
                    let run = bits.read(4)? + 9;
                    let code = bits.read(4)?;
                    writer.put(map[code as usize], run);
                }
                _ => {
                    let run = bits.read(8)? + 25;
                    let code = bits.read(4)?;
                    writer.put(map[code as usize], run);
                }
            }
        }
    }
    Ok(())
}

/// Decodes one 8-bit pixel-code string.
fn decode_8bit_string(reader: &mut PacketReader<'_>, writer: &mut PixelWriter<'_>) -> Result<()> {
    let mut bits = BitReader::new(reader);
    loop {
        let code = bits.read(8)?;
        if code != 0 {
            writer.put(code as u8, 1);
            continue;
        }
        if bits.read(1)? == 0 {
            let run = bits.read(7)?;
            if run == 0 {
                break; // end of string
            }
            writer.put(0, run);
        } else {
            let run = bits.read(7)?;
            let code = bits.read(8)?;
            writer.put(code as u8, run);
        }
    }
    Ok(())
}

/// Decodes one object field onto the pixmap.
fn decode_field(
    reader: &mut PacketReader<'_>,
    writer: &mut PixelWriter<'_>,
    depth: u8,
) -> Result<()> {
    let mut map_2bit: [u8; 4] = match depth {
        depth_bits::DEPTH_4BIT => DEFAULT_MAP_2_TO_4,
        depth_bits::DEPTH_8BIT => DEFAULT_MAP_2_TO_8,
        _ => [0, 1, 2, 3],
    };
    let mut map_4bit: [u8; 16] = match depth {
        depth_bits::DEPTH_8BIT => DEFAULT_MAP_4_TO_8,
        _ => IDENTITY_MAP_16,
    };

    while reader.remaining_len() > 0 {
        let data_type = reader.read_u8()?;
        match data_type {
            DATA_TYPE_2BIT_CODES => decode_2bit_string(reader, writer, &map_2bit)?,
            DATA_TYPE_4BIT_CODES => decode_4bit_string(reader, writer, &map_4bit)?,
            DATA_TYPE_8BIT_CODES => decode_8bit_string(reader, writer)?,
            DATA_TYPE_MAP_2_TO_4 => {
                let packed = reader.read_array::<2>()?;
                map_2bit = [
                    packed[0] >> 4,
                    packed[0] & 0x0F,
                    packed[1] >> 4,
                    packed[1] & 0x0F,
                ];
            }
            DATA_TYPE_MAP_2_TO_8 => {
                map_2bit = reader.read_array::<4>()?;
            }
            DATA_TYPE_MAP_4_TO_8 => {
                map_4bit = reader.read_array::<16>()?;
            }
            DATA_TYPE_END_OF_LINE => writer.end_of_line(),
            _ => {
                warn!("unknown pixel data type: {:02X}", data_type);
                return Ok(());
            }
        }
    }

    Ok(())
}

/// Renders an object's two field data blocks onto a region pixmap.
///
/// The top field paints even lines, the bottom field odd lines, both
/// starting at the object position and clipped to the pixmap.
pub(crate) fn render_object(
    arena: &mut PixmapArena,
    region: &Region,
    position_x: i32,
    position_y: i32,
    top_field: &PacketReader<'_>,
    bottom_field: &PacketReader<'_>,
    non_modifying: bool,
) -> Result<()> {
    let span = region.pixmap();
    let width = region.width();
    let height = region.height();
    let depth = region.depth();

    let mut writer = PixelWriter::new(
        arena.data_mut(span),
        width,
        height,
        position_x,
        position_y,
        0,
        non_modifying,
    );
    decode_field(&mut top_field.clone(), &mut writer, depth)?;

    let mut writer = PixelWriter::new(
        arena.data_mut(span),
        width,
        height,
        position_x,
        position_y,
        1,
        non_modifying,
    );
    decode_field(&mut bottom_field.clone(), &mut writer, depth)?;

    Ok(())
}
