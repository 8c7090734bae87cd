//! Bounding a page of search results to one album.
//!
//! The album is a contiguous window of the page starting at a random offset,
//! not a random subset. A page shorter than the album is kept as is.

use log::debug;
use rand::Rng;

/// Number of photos kept per album
pub const ALBUM_CAPACITY: usize = 20;

/// Picks at most `capacity` consecutive items from `items`.
///
/// When `items.len() >= capacity` the window starts at an offset drawn
/// uniformly from `0..=items.len() - capacity`; otherwise the input is
/// returned unchanged.
pub fn sample_album<T, R>(mut items: Vec<T>, capacity: usize, rng: &mut R) -> Vec<T>
where
    R: Rng + ?Sized,
{
    if items.len() < capacity {
        return items;
    }

    let offset = rng.gen_range(0..=items.len() - capacity);
    debug!(
        "Sampling {} of {} results starting at offset {}",
        capacity,
        items.len(),
        offset
    );

    items.truncate(offset + capacity);
    items.drain(..offset);
    items
}
