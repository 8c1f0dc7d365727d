//! Pipeline controller: PES intake loop, timing decisions and the page
//! timeout check.

use super::consts::{PES_DELAY_MAX_90KHZ, PTS_STC_DIFF_MAX_90KHZ, PTS_STC_DIFF_MIN_90KHZ};
use super::database::Database;
use super::page::PageState;
use super::pes::PesBuffer;
use super::segment;
use super::{StcTime, StcTimeType};
use log::{info, trace, warn};

/// Verdict for one buffered packet against the current STC.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum PesAction {
    /// Parse the packet now.
    Process,
    /// Too early; stop and retry next tick.
    Wait,
    /// Overdue; discard.
    Drop,
}

/// Processes buffered packets against the STC and re-checks the page
/// timeout. Returns true when any packet was parsed.
///
/// Packets are handled strictly in ring order. A `Wait` verdict stops
/// the pass without consuming the packet; segment-level errors reset the
/// epoch and abandon the packet; a malformed PES header clears the whole
/// ring.
pub(crate) fn process(database: &mut Database, pes_buffer: &mut PesBuffer, stc: StcTime) -> bool {
    let mut any_packets_processed = false;

    loop {
        let (header, mut data_reader) = match pes_buffer.next_packet(StcTimeType::Low32) {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(error) => {
                warn!(
                    "reset forced, reader error at {}: {:?}",
                    error.location, error.details
                );
                pes_buffer.clear();
                any_packets_processed = true;
                break;
            }
        };

        if header.is_subtitles_packet() {
            if let Some(pts) = header.pts {
                match time_to_process(stc, pts) {
                    PesAction::Wait => {
                        trace!("synchronizing, processing aborted");
                        // not consumed; retried on the next tick
                        break;
                    }
                    PesAction::Process => {
                        any_packets_processed = true;
                        database.status_mut().set_last_pts(pts);
                        if let Err(error) = segment::parse_packet_data(database, &mut data_reader)
                        {
                            info!(
                                "parsing error at {}: {:?} - resetting epoch",
                                error.location, error.details
                            );
                            database.epoch_reset();
                        }
                    }
                    PesAction::Drop => {
                        // the packet is consumed, which counts as progress
                        any_packets_processed = true;
                        info!("dropping overdue subtitle packet");
                    }
                }
            } else {
                info!("skipping subtitle packet without PTS");
            }
        } else {
            info!("skipping non-subtitle packet");
        }

        pes_buffer.mark_packet_consumed(&header);
    }

    check_page_timeout(database, stc);

    any_packets_processed
}

/// Presentation window decision in the low-adjusted 32-bit space.
fn time_to_process(stc: StcTime, pts: StcTime) -> PesAction {
    let stc_value = stc.to_low32();
    let pts_value = pts.to_low32();
    let pts_stc_diff = pts_value.wrapping_sub(stc_value);
    let stc_pts_diff = stc_value.wrapping_sub(pts_value);

    let action = if (PTS_STC_DIFF_MIN_90KHZ..=PTS_STC_DIFF_MAX_90KHZ).contains(&pts_stc_diff) {
        PesAction::Wait
    } else if pts_stc_diff <= PTS_STC_DIFF_MIN_90KHZ || stc_pts_diff <= PES_DELAY_MAX_90KHZ {
        PesAction::Process
    } else {
        PesAction::Drop
    };

    trace!(
        "stc={} pts={} diff={} action={:?}",
        stc_value,
        pts_value,
        pts_stc_diff,
        action
    );

    action
}

/// Moves a complete page to the timed-out state once its display timeout
/// (plus one second of slack) elapsed.
fn check_page_timeout(database: &mut Database, stc: StcTime) -> bool {
    if database.page().state() != PageState::Complete {
        trace!("page not complete, timeout check skipped");
        return false;
    }

    let stc_value = stc.to_low32();
    let pts_value = database.page().pts().to_low32();

    // the page may legitimately be on display slightly before its PTS due
    // to the decoding headstart
    let diff_before = pts_value.wrapping_sub(stc_value);
    if diff_before <= PTS_STC_DIFF_MIN_90KHZ {
        trace!("STC before PTS, timeout check skipped");
        return false;
    }

    let diff_after = stc_value.wrapping_sub(pts_value);
    // timeout plus an extra second, in 90 kHz units
    let timeout = (database.page().timeout() + 1) * 1000 * 90;
    if diff_after < timeout {
        trace!(
            "timeout not elapsed: stc={} pts={} diff={} timeout={}",
            stc_value,
            pts_value,
            diff_after,
            timeout
        );
        return false;
    }

    info!(
        "page timeout elapsed: stc={} pts={} diff={} timeout={}",
        stc_value, pts_value, diff_after, timeout
    );

    database.page_mut().set_timed_out();

    true
}
