//! Library for decoding DVB subtitle streams (ETSI EN 300 743).
//!
//! The decoder consumes PES packets carrying subtitle display sets,
//! maintains the decoded page/region/CLUT database and drives a
//! host-provided graphics sink with minimal draw and clear calls. All
//! working memory is sized at construction time, making the crate
//! suitable for set-top-box use.
//!
//! # Usage
//! Simply add this crate as a dependency in your `Cargo.toml`.
//!
//! ```toml
//! [dependencies]
//! dvbsub-io = "~0.1.0"
//! ```
//!
//! Implement [`DecoderClient`] for the graphics backend and
//! [`TimeProvider`] for the playback clock, then feed PES packets:
//!
//! ```no_run
//! use dvbsub_io::{
//!     Bitmap, Decoder, DecoderClient, Rectangle, Specification, StcTime, StcTimeType,
//!     TimeProvider,
//! };
//!
//! struct Sink;
//!
//! impl DecoderClient for Sink {
//!     fn gfx_set_display_bounds(&mut self, display: Rectangle, window: Rectangle) {}
//!     fn gfx_draw(&mut self, bitmap: Bitmap<'_>, src_rect: Rectangle, dst_rect: Rectangle) {}
//!     fn gfx_clear(&mut self, rect: Rectangle) {}
//!     fn gfx_finish(&mut self, rect: Rectangle) {}
//!     fn gfx_allocate(&mut self, size: usize) -> Option<Box<[u8]>> {
//!         Some(vec![0; size].into_boxed_slice())
//!     }
//!     fn gfx_free(&mut self, block: Box<[u8]>) {}
//! }
//!
//! struct Clock;
//!
//! impl TimeProvider for Clock {
//!     fn get_stc(&mut self) -> StcTime {
//!         StcTime::new(StcTimeType::Low32, 0)
//!     }
//! }
//!
//! let mut decoder = Decoder::new(Specification::V1_3_1, Sink, Clock);
//! decoder.set_page_ids(1, 1);
//! decoder.start();
//! // per received packet:
//! decoder.add_pes_packet(&[/* PES bytes */]);
//! // per tick:
//! if decoder.process() {
//!     decoder.draw();
//! }
//! ```

#![allow(unused)]
#![deny(missing_docs, unsafe_code, warnings)]

use log::{info, trace};
use std::result;

mod consts;

mod reader;
pub use reader::PacketReader;

mod arena;
mod clut;
mod display;
mod page;
mod pes;
mod pool;
mod region;

mod database;
use database::Database;

mod pixels;
mod segment;

mod parser;
mod presenter;

pub mod charset;

/// Errors that may be encountered while parsing a subtitle stream.
///
/// Reader and PES-framing errors surface at the pipeline boundary as a
/// ring clear; segment-level errors trigger an epoch reset. Both recovery
/// paths run inside [`Decoder::process`], so these details reach the
/// public API only through logs.
#[derive(Debug)]
pub enum ErrorDetails {
    /// Encountered when a [`PacketReader`] reads out of bounds.
    /// The [`usize`] parameter is the length of the offending read.
    PacketOverrun(usize),
    /// Encountered for inconsistent PES packet headers.
    BadPesHeader,
    /// Subtitling segments must open with a sync byte of 0x0F.
    /// This is the error when encountering any other value.
    LostSync,
    /// The end-of-PES-data-field marker was not 0xFF.
    BadEndMarker,
    /// A page composition segment carried the reserved page state.
    InvalidPageState,
    /// A region composition segment carried a depth or compatibility
    /// level outside the 2/4/8-bit codes.
    InvalidRegionDepth,
    /// A region composition segment re-declared an existing region with
    /// conflicting parameters.
    RegionParamsChanged,
    /// A region referenced an object type other than basic bitmaps.
    UnsupportedObjectType(u8),
    /// A region referenced an object provider other than the subtitling
    /// stream itself.
    UnsupportedObjectProvider(u8),
    /// The shared object-reference pool ran out of nodes.
    ObjectRefsExhausted,
}

/// Error type encapsulating all possible parser errors.
#[derive(Debug)]
pub struct Error {
    /// Byte index within the packet that the error was encountered.
    pub location: usize,
    /// Information about the error.
    pub details: ErrorDetails,
}

/// [`std::result::Result`] alias that uses [`Error`].
pub type Result<T> = result::Result<T, Error>;

/// Subtitling specification version in use by the stream.
///
/// Gates which segment types are honoured: display definition segments
/// are accepted only for [`Specification::V1_3_1`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Specification {
    /// ETSI EN 300 743 version 1.2.1.
    V1_2_1,
    /// ETSI EN 300 743 version 1.3.1.
    V1_3_1,
}

impl Specification {
    /// Size of the pixmap arena backing all region pixmaps of an epoch.
    ///
    /// Two full display planes: SD for 1.2.1, HD for 1.3.1 where display
    /// definition segments may announce larger displays.
    pub(crate) fn pixmap_pool_size(self) -> usize {
        match self {
            Specification::V1_2_1 => 2 * 720 * 576,
            Specification::V1_3_1 => 2 * 1920 * 1080,
        }
    }
}

/// Projection type of the 33-bit PES/STC counter onto 32 bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StcTimeType {
    /// High 32 bits of the 33-bit base clock (the low bit is dropped).
    High32,
    /// Low 32 bits of the 33-bit base clock (the high bit is dropped).
    Low32,
}

/// A 32-bit projection of the 33-bit PES/STC counter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StcTime {
    /// Which projection `value` carries.
    pub time_type: StcTimeType,
    /// Projected 90 kHz tick value.
    pub value: u32,
}

impl Default for StcTime {
    fn default() -> Self {
        Self::new(StcTimeType::High32, 0)
    }
}

impl StcTime {
    /// Creates a time value of the given projection.
    pub fn new(time_type: StcTimeType, value: u32) -> Self {
        Self { time_type, value }
    }

    /// Converts to the common low-adjusted comparison space.
    ///
    /// A `High32` value is shifted left by one, forcing the low bit to
    /// zero; consumers mixing projections must account for the one-tick
    /// ambiguity this introduces.
    pub fn to_low32(self) -> u32 {
        match self.time_type {
            StcTimeType::High32 => self.value << 1,
            StcTimeType::Low32 => self.value,
        }
    }
}

/// Half-open rectangle: `x1`/`y1` lie inside, `x2`/`y2` outside.
///
/// Valid rectangles satisfy `x1 < x2` and `y1 < y2`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Rectangle {
    /// Left position (inside the rectangle).
    pub x1: i32,
    /// Top position (inside the rectangle).
    pub y1: i32,
    /// Right position (outside the rectangle).
    pub x2: i32,
    /// Bottom position (outside the rectangle).
    pub y2: i32,
}

/// Indexed bitmap handed to [`DecoderClient::gfx_draw`].
///
/// Each pixel byte is an index into `clut`; the sink performs the lookup
/// while blitting.
#[derive(Debug, Copy, Clone)]
pub struct Bitmap<'a> {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Width*height pixel indices, row major.
    pub pixels: &'a [u8],
    /// ARGB lookup table matching the owning region's depth.
    pub clut: &'a [u32],
}

/// Handling of page composition segments in the acquisition-point state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// Reset the epoch on every acquisition point.
    ///
    /// This is the default: broadcasters frequently mark every page
    /// composition as an acquisition point while some of the pages are
    /// empty, and resetting handles those streams correctly.
    EpochReset,
    /// Follow ETSI semantics: keep the epoch when a complete baseline
    /// page exists, reset otherwise.
    Continue,
}

/// Host-provided graphics sink driven by [`Decoder::draw`].
///
/// The sink is only used for the duration of a `draw` call; the decoder
/// retains no pixmap references past its return.
pub trait DecoderClient {
    /// Announces display and window bounds.
    ///
    /// The implementation is expected to clear the entire screen.
    fn gfx_set_display_bounds(&mut self, display_bounds: Rectangle, window_bounds: Rectangle);

    /// Draws `src_rect` of `bitmap` at `dst_rect` (display coordinates).
    fn gfx_draw(&mut self, bitmap: Bitmap<'_>, src_rect: Rectangle, dst_rect: Rectangle);

    /// Clears a rectangle (display coordinates).
    fn gfx_clear(&mut self, rect: Rectangle);

    /// Finishes a drawing pass; `rect` covers everything modified by it
    /// (all zeros when nothing was).
    ///
    /// Called exactly once per [`Decoder::draw`].
    fn gfx_finish(&mut self, rect: Rectangle);

    /// Allocates scratch memory for object-bitmap decoding.
    fn gfx_allocate(&mut self, size: usize) -> Option<Box<[u8]>>;

    /// Releases memory obtained from [`DecoderClient::gfx_allocate`].
    fn gfx_free(&mut self, block: Box<[u8]>);
}

/// Host-provided playback clock.
pub trait TimeProvider {
    /// Current system time clock value.
    ///
    /// The projection type must stay fixed and match the stream's
    /// 45/90 kHz convention. Polled once per [`Decoder::process`].
    fn get_stc(&mut self) -> StcTime;
}

/// DVB subtitles decoder.
///
/// Drives the pipeline: PES intake, timing decisions, segment parsing
/// into the database and presentation through the client sink. All
/// methods must be called from a single thread of control.
pub struct Decoder<C: DecoderClient, T: TimeProvider> {
    client: C,
    time_provider: T,
    pes_buffer: pes::PesBuffer,
    database: Database,
    started: bool,
    redraw_needed: bool,
}

impl<C: DecoderClient, T: TimeProvider> Decoder<C, T> {
    /// Creates a decoder for the given specification version.
    ///
    /// All working memory (PES ring, pixmap arena, object pools) is
    /// acquired here; decoding itself never allocates.
    pub fn new(spec_version: Specification, client: C, time_provider: T) -> Self {
        Self {
            client,
            time_provider,
            pes_buffer: pes::PesBuffer::new(),
            database: Database::new(spec_version),
            started: false,
            redraw_needed: false,
        }
    }

    /// Selects the composition and ancillary page ids to decode.
    ///
    /// If no ancillary page is in use, pass the composition page id in
    /// both slots. Forces an internal [`Decoder::reset`].
    pub fn set_page_ids(&mut self, composition_page_id: u16, ancillary_page_id: u16) {
        trace!(
            "set_page_ids comp={} anc={}",
            composition_page_id,
            ancillary_page_id
        );
        self.database
            .status_mut()
            .set_page_ids(composition_page_id, ancillary_page_id);
        self.reset();
    }

    /// Selects how acquisition-point page compositions are handled.
    ///
    /// Intended for interoperability testing; the default is
    /// [`AcquisitionMode::EpochReset`].
    pub fn set_acquisition_mode(&mut self, mode: AcquisitionMode) {
        self.database.status_mut().set_acquisition_mode(mode);
    }

    /// Starts processing of packets. Idempotent.
    pub fn start(&mut self) {
        self.started = true;
    }

    /// Stops processing of packets. Idempotent.
    pub fn stop(&mut self) {
        self.started = false;
    }

    /// Drops the PES ring and all decoded data, resets both display
    /// definitions and invalidates the rendering state.
    ///
    /// The selected page ids are kept.
    pub fn reset(&mut self) {
        trace!("reset");
        self.pes_buffer.clear();
        self.database.epoch_reset();
        self.database.current_display_mut().reset();
        self.database.parsed_display_mut().reset();
        self.invalidate();
    }

    /// Copies one complete PES packet into the internal ring buffer.
    ///
    /// Returns false (leaving the ring untouched) when the packet is
    /// malformed or there is not enough space; see the module docs for
    /// the accepted framing.
    pub fn add_pes_packet(&mut self, packet: &[u8]) -> bool {
        self.pes_buffer.add_pes_packet(packet)
    }

    /// Marks the stored rendering state invalid so the next
    /// [`Decoder::draw`] repaints everything.
    pub fn invalidate(&mut self) {
        self.database.current_rendering_state_mut().reset();
        self.redraw_needed = true;
    }

    /// Processes buffered PES packets against the current STC.
    ///
    /// Packets inside the presentation window are parsed into the
    /// database; overdue packets are dropped; a packet ahead of the
    /// window stops the pass. Returns true when anything was parsed or a
    /// redraw is outstanding.
    pub fn process(&mut self) -> bool {
        if !self.started {
            info!("not started, skipping");
            return false;
        }

        let stc = self.time_provider.get_stc();
        let any_data_processed = parser::process(&mut self.database, &mut self.pes_buffer, stc);

        trace!(
            "process -> parsed={} redraw={}",
            any_data_processed,
            self.redraw_needed
        );

        any_data_processed | self.redraw_needed
    }

    /// Renders the committed page through the client sink.
    ///
    /// Emits the minimal set of clear/draw calls relative to the previous
    /// draw and exactly one `gfx_finish`.
    pub fn draw(&mut self) {
        presenter::draw(&mut self.client, &mut self.database);
        self.redraw_needed = false;
    }
}
