use super::{Error, ErrorDetails, Result};

/// Reader state for extracting big-endian data from a PES ring window.
///
/// The window consists of up to two disjoint byte chunks (the second is
/// non-empty when the packet wraps around the ring end) presented as one
/// logical stream. Unlike the [`std::io::Read`] implementation for
/// `&[u8]`, this keeps track of the location within the packet for more
/// informative errors via [`Result`].
///
/// # Example
///
/// ```
/// use dvbsub_io::PacketReader;
/// let head = [0x12];
/// let tail = [0x34];
/// let mut reader = PacketReader::new(&head, &tail);
/// assert_eq!(reader.read_be_u16()?, 0x1234);
/// # Ok::<(), dvbsub_io::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    chunks: [&'a [u8]; 2],
    location: usize,
}

impl<'a> PacketReader<'a> {
    /// Initializes a reader over two chunks forming one logical stream.
    pub fn new(first: &'a [u8], second: &'a [u8]) -> Self {
        Self {
            chunks: [first, second],
            location: 0,
        }
    }

    /// Creates an [`Error`] using the contained location.
    pub fn make_error(&self, details: ErrorDetails) -> Error {
        Error {
            location: self.location,
            details,
        }
    }

    /// Number of bytes remaining in the reader.
    pub fn remaining_len(&self) -> usize {
        self.chunks[0].len() + self.chunks[1].len()
    }

    /// Advance reader without extracting any data.
    pub fn skip(&mut self, length: usize) -> Result<()> {
        if length > self.remaining_len() {
            return Err(self.make_error(ErrorDetails::PacketOverrun(length)));
        }
        let first = length.min(self.chunks[0].len());
        self.chunks[0] = &self.chunks[0][first..];
        self.chunks[1] = &self.chunks[1][length - first..];
        self.location += length;
        Ok(())
    }

    /// Creates a fixed `length` sub-reader at the current position, then
    /// advances this reader to the sub-reader's end position.
    ///
    /// The sub-reader semantic makes reading nested data of known lengths
    /// easier with correct bounds checking of the nested data.
    pub fn new_sub_reader(&mut self, length: usize) -> Result<Self> {
        if length > self.remaining_len() {
            return Err(self.make_error(ErrorDetails::PacketOverrun(length)));
        }
        let location = self.location;
        let first = length.min(self.chunks[0].len());
        let sub = Self {
            chunks: [&self.chunks[0][..first], &self.chunks[1][..length - first]],
            location,
        };
        self.skip(length)?;
        Ok(sub)
    }

    /// Read one byte interpreted as [`u8`].
    pub fn read_u8(&mut self) -> Result<u8> {
        if self.chunks[0].is_empty() {
            self.chunks.swap(0, 1);
        }
        match self.chunks[0].split_first() {
            Some((&byte, rest)) => {
                self.chunks[0] = rest;
                self.location += 1;
                Ok(byte)
            }
            None => Err(self.make_error(ErrorDetails::PacketOverrun(1))),
        }
    }

    /// Read one byte without advancing.
    pub fn peek_u8(&self) -> Result<u8> {
        self.chunks[0]
            .first()
            .or_else(|| self.chunks[1].first())
            .copied()
            .ok_or_else(|| self.make_error(ErrorDetails::PacketOverrun(1)))
    }

    /// Read `N` bytes into an owned array.
    ///
    /// The window may span two chunks, so unlike a plain slice reader the
    /// bytes are copied out rather than borrowed.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        if N > self.remaining_len() {
            return Err(self.make_error(ErrorDetails::PacketOverrun(N)));
        }
        let mut out = [0_u8; N];
        let first = N.min(self.chunks[0].len());
        out[..first].copy_from_slice(&self.chunks[0][..first]);
        out[first..].copy_from_slice(&self.chunks[1][..N - first]);
        self.skip(N)?;
        Ok(out)
    }

    /// Read two bytes interpreted as big-endian [`u16`].
    pub fn read_be_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array::<2>()?))
    }
}

/// Convenience macro to read a modular bitfield from a [`PacketReader`]
///
/// Wraps [`PacketReader::read_array`] to read the exact number of bytes
/// required by the bitfield type. Must be expanded in a function that
/// returns [`Result`].
///
/// # Example
///
/// ```
/// use modular_bitfield_msb::prelude::*;
/// use dvbsub_io::{read_bitfield, PacketReader};
/// #[bitfield]
/// pub(crate) struct MyBitfield {
///     pub a_bit: B1,
///     #[skip]
///     padding: B7,
/// }
///
/// let some_data = [0x80];
/// let mut reader = PacketReader::new(&some_data, &[]);
/// let the_bitfield = read_bitfield!(reader, MyBitfield);
/// assert_eq!(the_bitfield.a_bit(), 1);
/// # Ok::<(), dvbsub_io::Error>(())
/// ```
#[macro_export]
macro_rules! read_bitfield {
    ($reader:expr, $type:ty) => {
        <$type>::from_bytes($reader.read_array::<{ std::mem::size_of::<$type>() }>()?)
    };
}
