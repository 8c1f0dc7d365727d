use crate::database::Database;
use crate::page::PageState;
use crate::{PacketReader, Result};
use log::trace;

/// Parses an end-of-display-set segment.
///
/// Promotes the parsed display definition to the current one, completes
/// the page and commits it (ending region/CLUT creation for the epoch).
pub(super) fn parse(database: &mut Database, _reader: &mut PacketReader<'_>) -> Result<()> {
    if database.page().state() != PageState::Incomplete {
        trace!("page not currently being parsed");
        return Ok(());
    }

    // the parsed display definition may just be defaults if no DDS was
    // received in this display set
    let parsed = database.parsed_display().clone();
    database
        .current_display_mut()
        .set(parsed.version(), parsed.display_bounds(), parsed.window_bounds());
    database.parsed_display_mut().reset();

    database.page_mut().finish_parsing();
    database.commit_page();

    Ok(())
}
