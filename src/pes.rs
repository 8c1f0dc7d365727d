use super::{
    consts::{pes_bits, PES_BUFFER_SIZE},
    ErrorDetails, PacketReader, Result, StcTime, StcTimeType,
};
use crate::read_bitfield;
use log::{info, trace, warn};
use modular_bitfield_msb::prelude::*;

#[bitfield]
#[derive(Debug)]
pub(crate) struct PesHeader {
    pub start_code: B24,
    pub stream_id: B8,
    pub packet_length: B16,
}

#[bitfield]
#[derive(Debug)]
pub(crate) struct PesOptionalHeader {
    pub marker_bits: B2,
    pub scrambling_control: B2,
    pub priority: bool,
    pub data_alignment_indicator: bool,
    pub copyright: bool,
    pub original: bool,
    pub has_pts: bool,
    pub has_dts: bool,
    pub escr: bool,
    pub es_rate: bool,
    pub dsm_trick_mode: bool,
    pub has_additional_copy_info: bool,
    pub has_crc: bool,
    pub has_extension: bool,
    pub additional_header_length: B8,
}

/// Parsed PES packet header as stored in the ring buffer.
#[derive(Debug, Clone)]
pub(crate) struct PesPacketHeader {
    /// PES stream id (0xBD for DVB subtitles).
    pub stream_id: u8,
    /// Value of the PES packet length field (bytes following it).
    pub pes_packet_length: u16,
    /// Extracted PTS projection, when present.
    pub pts: Option<StcTime>,
}

impl PesPacketHeader {
    /// True for private stream 1 packets, which carry DVB subtitles.
    pub fn is_subtitles_packet(&self) -> bool {
        self.stream_id == pes_bits::STREAM_ID_PRIVATE_1
    }

    /// Total packet size in the ring, including the six base header bytes.
    pub fn total_size(&self) -> usize {
        6 + self.pes_packet_length as usize
    }
}

/// Projects the five PES timestamp bytes onto 32 bits of the 33-bit PTS.
///
/// `High32` keeps bits 32..1 (the low bit is dropped); `Low32` keeps
/// bits 31..0 (the high bit is dropped).
fn project_timestamp(time_type: StcTimeType, b: [u8; 5]) -> u32 {
    let b: [u32; 5] = [
        b[0] as u32,
        b[1] as u32,
        b[2] as u32,
        b[3] as u32,
        b[4] as u32,
    ];
    match time_type {
        StcTimeType::High32 => {
            // byte 1 bits 3..1 to bits 31..29
            // byte 2 bits 7..0 to bits 28..21
            // byte 3 bits 7..1 to bits 20..14
            // byte 4 bits 7..0 to bits 13..6
            // byte 5 bits 7..2 to bits 5..0
            ((b[0] << 28) & 0xE000_0000)
                | ((b[1] << 21) & 0x1FE0_0000)
                | ((b[2] << 13) & 0x001F_C000)
                | ((b[3] << 6) & 0x0000_3FC0)
                | ((b[4] >> 2) & 0x0000_003F)
        }
        StcTimeType::Low32 => {
            // byte 1 bits 2..1 to bits 31..30
            // byte 2 bits 7..0 to bits 29..22
            // byte 3 bits 7..1 to bits 21..15
            // byte 4 bits 7..0 to bits 14..7
            // byte 5 bits 7..1 to bits 6..0
            ((b[0] << 29) & 0xC000_0000)
                | ((b[1] << 22) & 0x3FC0_0000)
                | ((b[2] << 14) & 0x003F_8000)
                | ((b[3] << 7) & 0x0000_7F80)
                | ((b[4] >> 1) & 0x0000_007F)
        }
    }
}

/// Ring buffer holding raw PES packets between [`add_pes_packet`] calls and
/// the per-tick processing pass.
///
/// The backing memory is sized once at construction; packets wrap around
/// the ring end and are surfaced through [`PacketReader`] windows so
/// consumers see a contiguous logical stream.
///
/// [`add_pes_packet`]: PesBuffer::add_pes_packet
pub(crate) struct PesBuffer {
    buffer: Box<[u8]>,
    used: usize,
    read_offset: usize,
    write_offset: usize,
}

impl PesBuffer {
    pub fn new() -> Self {
        Self::with_size(PES_BUFFER_SIZE)
    }

    fn with_size(size: usize) -> Self {
        Self {
            buffer: vec![0; size].into_boxed_slice(),
            used: 0,
            read_offset: 0,
            write_offset: 0,
        }
    }

    /// Validates and appends one complete PES packet.
    ///
    /// Returns false (without touching the ring) if the packet is shorter
    /// than a base header, does not open with `00 00 01 BD`, carries a PES
    /// length inconsistent with `packet.len()`, or does not fit in the
    /// free space.
    pub fn add_pes_packet(&mut self, packet: &[u8]) -> bool {
        let size_left = self.buffer.len() - self.used;
        if packet.len() > size_left {
            info!(
                "PES data dropped - not enough space (needed: {}, space: {})",
                packet.len(),
                size_left
            );
            return false;
        }

        if packet.len() < 6 {
            info!("PES data dropped - invalid packet size: {}", packet.len());
            return false;
        }

        if packet[0] != 0x00
            || packet[1] != 0x00
            || packet[2] != 0x01
            || packet[3] != pes_bits::STREAM_ID_PRIVATE_1
        {
            info!("PES data dropped - invalid packet header");
            return false;
        }

        let pes_length = u16::from_be_bytes([packet[4], packet[5]]) as usize;
        if pes_length == 0 {
            info!("PES data dropped - empty PES packet");
            return false;
        }
        if pes_length != packet.len() - 6 {
            info!(
                "PES data dropped - invalid PES length (found: {}, expected: {})",
                pes_length,
                packet.len() - 6
            );
            return false;
        }

        // two-chunk copy; space was already checked
        let first = packet.len().min(self.buffer.len() - self.write_offset);
        self.buffer[self.write_offset..self.write_offset + first].copy_from_slice(&packet[..first]);
        self.write_offset = (self.write_offset + first) % self.buffer.len();
        let second = packet.len() - first;
        if second > 0 {
            self.buffer[..second].copy_from_slice(&packet[first..]);
            self.write_offset = second;
        }
        self.used += packet.len();

        trace!(
            "PES added (size={}, left={})",
            packet.len(),
            self.buffer.len() - self.used
        );

        true
    }

    /// Drops all buffered data; the next `add_pes_packet` resynchronises.
    pub fn clear(&mut self) {
        trace!("PES buffer cleared (dropped={})", self.used);
        self.used = 0;
        self.read_offset = 0;
        self.write_offset = 0;
    }

    /// Two-chunk window over the first `length` buffered bytes.
    fn window(&self, length: usize) -> PacketReader<'_> {
        let first = length.min(self.buffer.len() - self.read_offset);
        PacketReader::new(
            &self.buffer[self.read_offset..self.read_offset + first],
            &self.buffer[..length - first],
        )
    }

    /// Parses the header of the oldest buffered packet and yields a reader
    /// bounded to the packet.
    ///
    /// Returns `Ok(None)` when the ring is empty. A malformed header is a
    /// parse error; the pipeline recovers by clearing the entire ring.
    pub fn next_packet(
        &self,
        time_type: StcTimeType,
    ) -> Result<Option<(PesPacketHeader, PacketReader<'_>)>> {
        if self.used == 0 {
            return Ok(None);
        }

        let mut reader = self.window(self.used);
        let header = read_header(time_type, &mut reader)?;

        let consumed = self.used - reader.remaining_len();
        let packet_size = header.total_size();

        if packet_size > self.used {
            warn!("not enough bytes for PES packet");
            return Err(reader.make_error(ErrorDetails::BadPesHeader));
        }
        if packet_size < consumed {
            warn!("invalid PES packet length - smaller than header");
            return Err(reader.make_error(ErrorDetails::BadPesHeader));
        }

        let mut data_reader = self.window(packet_size);
        data_reader.skip(consumed)?;

        Ok(Some((header, data_reader)))
    }

    /// Advances the read offset past a packet returned by `next_packet`.
    pub fn mark_packet_consumed(&mut self, header: &PesPacketHeader) {
        let packet_size = header.total_size();
        self.read_offset = (self.read_offset + packet_size) % self.buffer.len();
        self.used -= packet_size;
        trace!(
            "PES packet consumed (consumed={}, left={})",
            packet_size,
            self.buffer.len() - self.used
        );
    }
}

fn read_header(time_type: StcTimeType, reader: &mut PacketReader<'_>) -> Result<PesPacketHeader> {
    let base = read_bitfield!(reader, PesHeader);
    if base.start_code() != 0x00_0001 {
        return Err(reader.make_error(ErrorDetails::BadPesHeader));
    }

    let mut header = PesPacketHeader {
        stream_id: base.stream_id(),
        pes_packet_length: base.packet_length(),
        pts: None,
    };

    if header.is_subtitles_packet() {
        let optional = read_bitfield!(reader, PesOptionalHeader);
        let pes_header_length = optional.additional_header_length() as usize;

        if optional.has_pts() {
            if pes_header_length < 5 {
                warn!("Short read of PTS");
                return Err(reader.make_error(ErrorDetails::BadPesHeader));
            }
            let pts = project_timestamp(time_type, reader.read_array::<5>()?);
            header.pts = Some(StcTime::new(time_type, pts));
            trace!("PTS={}", pts);
            // skip rest of the optional header
            reader.skip(pes_header_length - 5)?;
        } else {
            reader.skip(pes_header_length)?;
        }
    }

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// PES packet with the given PTS (90 kHz, 33-bit) and payload.
    fn build_packet(pts: Option<u64>, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0x00, 0x00, 0x01, 0xBD];
        let header_data_length = if pts.is_some() { 5 } else { 0 };
        let pes_length = 3 + header_data_length + payload.len();
        out.extend_from_slice(&(pes_length as u16).to_be_bytes());
        out.push(0x80); // marker bits '10'
        out.push(if pts.is_some() { 0x80 } else { 0x00 });
        out.push(header_data_length as u8);
        if let Some(pts) = pts {
            out.push(0x21 | ((((pts >> 30) & 0x07) as u8) << 1));
            out.push(((pts >> 22) & 0xFF) as u8);
            out.push(0x01 | ((((pts >> 15) & 0x7F) as u8) << 1));
            out.push(((pts >> 7) & 0xFF) as u8);
            out.push(0x01 | (((pts & 0x7F) as u8) << 1));
        }
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn accepts_valid_packet_and_parses_header() {
        let mut buffer = PesBuffer::with_size(64);
        let packet = build_packet(Some(0x1_2345_6789), &[0x20, 0x00, 0xFF]);
        assert!(buffer.add_pes_packet(&packet));

        let (header, _reader) = buffer.next_packet(StcTimeType::Low32).unwrap().unwrap();
        assert_eq!(header.total_size(), packet.len());
        assert!(header.is_subtitles_packet());
        // bits 31..0 of the 33-bit value, the high bit dropped
        let pts = header.pts.unwrap();
        assert_eq!(pts.value, (0x1_2345_6789_u64 & 0xFFFF_FFFF) as u32);
    }

    #[test]
    fn high_projection_drops_the_low_bit() {
        let mut buffer = PesBuffer::with_size(64);
        let packet = build_packet(Some(0x1_2345_6789), &[0x20, 0x00, 0xFF]);
        assert!(buffer.add_pes_packet(&packet));

        let (header, _reader) = buffer.next_packet(StcTimeType::High32).unwrap().unwrap();
        let pts = header.pts.unwrap();
        // bits 32..1 of the 33-bit value, the low bit dropped
        assert_eq!(pts.value, (0x1_2345_6789_u64 >> 1) as u32);
        // conversion to the comparison space forces the low bit to zero
        assert_eq!(pts.to_low32(), ((0x1_2345_6789_u64 >> 1) << 1) as u32);
    }

    #[test]
    fn rejects_malformed_packets() {
        let mut buffer = PesBuffer::with_size(64);
        // too short
        assert!(!buffer.add_pes_packet(&[0x00, 0x00, 0x01, 0xBD, 0x00]));
        // wrong start code in a single position
        let mut packet = build_packet(None, &[0x20, 0x00, 0xFF]);
        packet[2] = 0x02;
        assert!(!buffer.add_pes_packet(&packet));
        // wrong stream id
        let mut packet = build_packet(None, &[0x20, 0x00, 0xFF]);
        packet[3] = 0xBE;
        assert!(!buffer.add_pes_packet(&packet));
        // inconsistent length field
        let mut packet = build_packet(None, &[0x20, 0x00, 0xFF]);
        packet[5] += 1;
        assert!(!buffer.add_pes_packet(&packet));
        // nothing was buffered
        assert!(buffer.next_packet(StcTimeType::Low32).unwrap().is_none());
    }

    #[test]
    fn rejects_packet_larger_than_free_space() {
        let mut buffer = PesBuffer::with_size(16);
        let packet = build_packet(None, &[0u8; 8]); // 17 bytes
        assert!(!buffer.add_pes_packet(&packet));
        let packet = build_packet(None, &[0u8; 7]); // 16 bytes, exact fit
        assert!(buffer.add_pes_packet(&packet));
        assert!(!buffer.add_pes_packet(&build_packet(None, &[0u8; 1])));
    }

    #[test]
    fn packets_wrap_around_the_ring_end() {
        let mut buffer = PesBuffer::with_size(32);
        let first = build_packet(None, &[0xAA; 11]); // 20 bytes
        assert!(buffer.add_pes_packet(&first));
        let (header, _) = buffer.next_packet(StcTimeType::Low32).unwrap().unwrap();
        buffer.mark_packet_consumed(&header);

        // 20 bytes again; wraps 8 bytes past the ring end
        let second = build_packet(None, &[0xBB; 11]);
        assert!(buffer.add_pes_packet(&second));
        let (header, mut reader) = buffer.next_packet(StcTimeType::Low32).unwrap().unwrap();
        assert_eq!(header.total_size(), 20);
        let mut body = Vec::new();
        while reader.remaining_len() > 0 {
            body.push(reader.read_u8().unwrap());
        }
        assert_eq!(body, vec![0xBB; 11]);
        buffer.mark_packet_consumed(&header);
        assert!(buffer.next_packet(StcTimeType::Low32).unwrap().is_none());
    }

    #[test]
    fn corrupt_header_is_a_parse_error() {
        let mut buffer = PesBuffer::with_size(64);
        let packet = build_packet(None, &[0x20, 0x00, 0xFF]);
        assert!(buffer.add_pes_packet(&packet));
        // corrupt the buffered start code after validation
        buffer.buffer[0] = 0xFF;
        assert!(buffer.next_packet(StcTimeType::Low32).is_err());
    }
}
