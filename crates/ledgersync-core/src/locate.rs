//! Finding a date in the display sequence.

use crate::accumulate::DisplayItem;
use chrono::NaiveDate;
use std::cmp::Ordering;

/// Ordering of display items; a display sequence is sorted descending.
///
/// The header is greater than anything else. Other items compare by date,
/// and on the same date a transaction sorts before (below) the delimiter.
pub fn compare_items(a: &DisplayItem, b: &DisplayItem) -> Ordering {
    match (a, b) {
        (DisplayItem::Header, DisplayItem::Header) => Ordering::Equal,
        (DisplayItem::Header, _) => Ordering::Greater,
        (_, DisplayItem::Header) => Ordering::Less,
        (a, b) => a.date().cmp(&b.date()).then_with(|| rank(a).cmp(&rank(b))),
    }
}

fn rank(item: &DisplayItem) -> u8 {
    match item {
        DisplayItem::Transaction(_) => 0,
        DisplayItem::DateDelimiter { .. } => 1,
        DisplayItem::Header => 2,
    }
}

/// Binary search for the delimiter of `target`.
///
/// `Ok(index)` when a delimiter for that date exists, `Err(index)` with the
/// position where one would be inserted otherwise.
pub fn search(items: &[DisplayItem], target: NaiveDate) -> Result<usize, usize> {
    let probe = DisplayItem::DateDelimiter {
        date: target,
        month_boundary: false,
    };
    items.binary_search_by(|item| compare_items(item, &probe).reverse())
}

/// Index to scroll to for `target`: the match or the insertion point
pub fn locate(items: &[DisplayItem], target: NaiveDate) -> usize {
    match search(items, target) {
        Ok(index) | Err(index) => index,
    }
}

// ==================== Tests ====================
