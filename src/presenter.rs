//! Presentation pass: diffs the previous and current rendering states and
//! emits minimal draw/clear calls to the client sink.

use super::consts::depth_bits;
use super::database::Database;
use super::display::RenderingState;
use super::page::PageState;
use super::{Bitmap, DecoderClient, Rectangle};
use log::{error, info, trace};

fn extend_rectangle(target: &mut Rectangle, source: Rectangle) {
    target.x1 = target.x1.min(source.x1);
    target.y1 = target.y1.min(source.y1);
    target.x2 = target.x2.max(source.x2);
    target.y2 = target.y2.max(source.y2);
}

/// Strict containment: the rectangle must lie fully inside the bounds and
/// both rectangles must be valid. Partially overlapping regions are
/// dropped whole, never clipped.
fn is_rectangle_inside(bounds: Rectangle, rect: Rectangle) -> bool {
    if bounds.x1 >= bounds.x2 || bounds.y1 >= bounds.y2 {
        return false;
    }
    if rect.x1 >= rect.x2 || rect.y1 >= rect.y2 {
        return false;
    }
    rect.x1 >= bounds.x1 && rect.x2 <= bounds.x2 && rect.y1 >= bounds.y1 && rect.y2 <= bounds.y2
}

/// Runs one drawing pass.
///
/// The rendering states are swapped first: the previous state is what is
/// on screen, the current one is rebuilt from the database. Regions
/// present in both with identical id, version and rectangle stay
/// untouched; vanished regions are cleared; new ones are drawn. A bounds
/// change re-announces the screen (which clears it) and forces a full
/// repaint. Exactly one `gfx_finish` closes the pass with the union of
/// all modified rectangles.
pub(crate) fn draw<C: DecoderClient>(client: &mut C, database: &mut Database) {
    database.swap_rendering_states();

    // invalid rectangle so min/max extension can accumulate; fixed at the
    // end if nothing was modified
    let mut modified_rectangle = Rectangle {
        x1: i32::MAX,
        y1: i32::MAX,
        x2: 0,
        y2: 0,
    };

    build_current_state(database);

    notify_screen_bounds(client, database, &mut modified_rectangle);

    detect_unmodified_regions(database);

    clear_regions(client, database, &mut modified_rectangle);

    draw_regions(client, database, &mut modified_rectangle);

    if modified_rectangle.x1 > modified_rectangle.x2 || modified_rectangle.y1 > modified_rectangle.y2
    {
        modified_rectangle = Rectangle::default();
    }

    client.gfx_finish(modified_rectangle);
}

/// Rebuilds the current rendering state from the committed database.
///
/// Only a complete page presents regions; incomplete or invalid pages
/// produce an empty state, which clears the subtitle area.
fn build_current_state(database: &mut Database) {
    let mut state = RenderingState::default();

    let display = database.current_display();
    state.set_bounds(display.display_bounds(), display.window_bounds());

    if database.page().state() == PageState::Complete {
        let window_bounds = state.window_bounds();

        for region_ref in database.page().regions() {
            let region = match database.region_by_id(region_ref.region_id) {
                Some(region) => region,
                None => {
                    info!("region not found: {}", region_ref.region_id);
                    continue;
                }
            };

            let mut region_rect = Rectangle {
                x1: region_ref.position_x,
                y1: region_ref.position_y,
                x2: region_ref.position_x + region.width(),
                y2: region_ref.position_y + region.height(),
            };

            if !is_rectangle_inside(window_bounds, region_rect) {
                info!(
                    "rectangle for region {} does not fit in window",
                    region_ref.region_id
                );
                continue;
            }

            // shift to screen coordinates as required by the sink
            region_rect.x1 += window_bounds.x1;
            region_rect.y1 += window_bounds.y1;
            region_rect.x2 += window_bounds.x1;
            region_rect.y2 += window_bounds.y1;

            if !state.add_region(region.id(), region.version(), region_rect) {
                info!("cannot add region {}", region_ref.region_id);
                continue;
            }

            trace!("region {} added at {:?}", region_ref.region_id, region_rect);
        }
    }

    *database.current_rendering_state_mut() = state;
}

/// Announces display/window bounds when they changed.
///
/// The sink clears the whole screen on a bounds change, so the previous
/// regions are forgotten and the modified rectangle grows to the display.
fn notify_screen_bounds<C: DecoderClient>(
    client: &mut C,
    database: &mut Database,
    modified_rectangle: &mut Rectangle,
) {
    let (current, previous) = database.rendering_states_mut();

    if current.display_bounds() != previous.display_bounds()
        || current.window_bounds() != previous.window_bounds()
    {
        trace!("notifying screen bounds");

        client.gfx_set_display_bounds(current.display_bounds(), current.window_bounds());

        // screen was cleared, so remove all old regions
        previous.remove_all_regions();

        extend_rectangle(modified_rectangle, current.display_bounds());
    }
}

/// Unmarks region pairs that are identical in both states; they remain
/// unchanged on screen.
fn detect_unmodified_regions(database: &mut Database) {
    let (current, previous) = database.rendering_states_mut();

    current.mark_all_regions_dirty();
    previous.mark_all_regions_dirty();

    for current_index in 0..current.regions().len() {
        for previous_index in 0..previous.regions().len() {
            let current_region = current.regions()[current_index];
            let previous_region = previous.regions()[previous_index];

            if current_region.id == previous_region.id
                && current_region.version == previous_region.version
                && current_region.rectangle == previous_region.rectangle
            {
                current.unmark_region_dirty(current_index);
                previous.unmark_region_dirty(previous_index);
            }
        }
    }
}

/// Clears regions that vanished from the screen.
fn clear_regions<C: DecoderClient>(
    client: &mut C,
    database: &Database,
    modified_rectangle: &mut Rectangle,
) {
    let (_, previous) = database.rendering_states();

    for region_info in previous.regions() {
        if region_info.dirty {
            client.gfx_clear(region_info.rectangle);
            trace!("region {} cleared at {:?}", region_info.id, region_info.rectangle);
            extend_rectangle(modified_rectangle, region_info.rectangle);
        }
    }
}

/// Draws regions that are new or changed.
fn draw_regions<C: DecoderClient>(
    client: &mut C,
    database: &Database,
    modified_rectangle: &mut Rectangle,
) {
    let (current, _) = database.rendering_states();

    for region_info in current.regions() {
        if !region_info.dirty {
            continue;
        }

        let region = match database.region_by_id(region_info.id) {
            Some(region) => region,
            None => {
                error!("region {} not found", region_info.id);
                continue;
            }
        };

        let clut = match database.clut_by_id(region.clut_id()) {
            Some(clut) => clut,
            None => {
                error!("region {} clut not found", region_info.id);
                continue;
            }
        };

        let clut_array = match region.depth() {
            depth_bits::DEPTH_2BIT => clut.array_2bit(),
            depth_bits::DEPTH_4BIT => clut.array_4bit(),
            depth_bits::DEPTH_8BIT => clut.array_8bit(),
            _ => {
                error!("region {} has unknown depth", region_info.id);
                continue;
            }
        };

        let bitmap = Bitmap {
            width: region.width() as u32,
            height: region.height() as u32,
            pixels: database.pixmap_data(region.pixmap()),
            clut: clut_array,
        };

        let src_rect = Rectangle {
            x1: 0,
            y1: 0,
            x2: region.width(),
            y2: region.height(),
        };

        client.gfx_draw(bitmap, src_rect, region_info.rectangle);
        trace!("region {} drawn at {:?}", region_info.id, region_info.rectangle);

        extend_rectangle(modified_rectangle, region_info.rectangle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x1: i32, y1: i32, x2: i32, y2: i32) -> Rectangle {
        Rectangle { x1, y1, x2, y2 }
    }

    #[test]
    fn containment_is_strict() {
        let bounds = rect(0, 0, 720, 576);
        assert!(is_rectangle_inside(bounds, rect(0, 0, 720, 576)));
        assert!(is_rectangle_inside(bounds, rect(100, 200, 140, 220)));
        // partial overlap is not containment
        assert!(!is_rectangle_inside(bounds, rect(700, 560, 740, 580)));
        assert!(!is_rectangle_inside(bounds, rect(-1, 0, 10, 10)));
        // degenerate rectangles never qualify
        assert!(!is_rectangle_inside(bounds, rect(10, 10, 10, 20)));
        assert!(!is_rectangle_inside(rect(0, 0, 0, 0), rect(0, 0, 0, 0)));
    }

    #[test]
    fn extension_accumulates_the_union() {
        let mut target = rect(i32::MAX, i32::MAX, 0, 0);
        extend_rectangle(&mut target, rect(100, 200, 140, 220));
        assert_eq!(target, rect(100, 200, 140, 220));
        extend_rectangle(&mut target, rect(50, 50, 80, 60));
        assert_eq!(target, rect(50, 50, 140, 220));
    }
}
