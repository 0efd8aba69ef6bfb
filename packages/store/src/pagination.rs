//! # Pagination — page bounds and windowed page numbers
//!
//! Pure functions over `(page_size, current_page, total_items)`:
//!
//! | Function | Result |
//! |----------|--------|
//! | [`compute_state`] | [`PaginationState`]: total pages, `[start, end)` item range, next/prev flags. Never clamps the page. |
//! | [`slice`] | The items of the current page; empty when the page is out of range. |
//! | [`windowed_page_numbers`] | The `1 … 4 5 6 … 10` model shown by a pagination control. |
//! | [`go_to_page`] | The one place a requested page is clamped into range. |
//!
//! [`Paginator`] bundles the three inputs for list views that keep (and
//! persist) their paging position.

use serde::{Deserialize, Serialize};

/// Number of entries a pagination control shows by default.
pub const DEFAULT_MAX_VISIBLE: usize = 5;

/// Derived pagination metadata. Pages are 1-based; indices are 0-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    pub page_size: usize,
    pub current_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
    /// First item index of the current page (inclusive).
    pub start_index: usize,
    /// One past the last item index of the current page.
    pub end_index: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

/// One entry of a pagination control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageItem {
    Page(usize),
    Ellipsis,
}

/// Compute pagination metadata.
///
/// `current_page` is reported as given, even when out of range; the flags and
/// indices follow from it so callers can spot and correct a bad page. A
/// `page_size` of 0 is treated as 1.
pub fn compute_state(page_size: usize, current_page: usize, total_items: usize) -> PaginationState {
    let size = page_size.max(1);
    let total_pages = total_items.div_ceil(size);
    let start_index = current_page
        .saturating_sub(1)
        .saturating_mul(size)
        .min(total_items);
    let end_index = start_index.saturating_add(size).min(total_items);

    PaginationState {
        page_size: size,
        current_page,
        total_items,
        total_pages,
        start_index,
        end_index,
        has_next_page: current_page < total_pages,
        has_prev_page: current_page > 1,
    }
}

/// The items on `current_page`.
pub fn slice<T>(items: &[T], page_size: usize, current_page: usize) -> &[T] {
    let state = compute_state(page_size, current_page, items.len());
    &items[state.start_index..state.end_index]
}

/// Clamp a requested page into `[1, total_pages]`, or to 1 when there are no
/// pages at all.
pub fn go_to_page(requested: usize, total_pages: usize) -> usize {
    requested.clamp(1, total_pages.max(1))
}

/// Page numbers for a pagination control.
///
/// Up to `max_visible` pages are listed in full. Beyond that the result has
/// exactly `max_visible` entries: a window of pages starting
/// `max_visible / 2` before `current_page` (so an even width puts one more page
/// on the left), shifted to stay inside `1..=total_pages`. If the window does
/// not reach page 1 its first two entries become `1, …`; if it does not reach
/// the last page its last two become `…, total_pages`. Windowing needs room for
/// both ends and both ellipses, so `max_visible` is raised to
/// [`DEFAULT_MAX_VISIBLE`] when smaller; the result can then hold more than
/// `max_visible` entries (`(2, 4, 3)` lists all four pages).
///
/// An out-of-range `current_page` (a stale persisted position, say) is
/// windowed as the nearest valid page.
pub fn windowed_page_numbers(current_page: usize, total_pages: usize, max_visible: usize) -> Vec<PageItem> {
    if total_pages <= max_visible {
        return (1..=total_pages).map(PageItem::Page).collect();
    }
    let width = max_visible.max(DEFAULT_MAX_VISIBLE);
    if total_pages <= width {
        return (1..=total_pages).map(PageItem::Page).collect();
    }

    let current = current_page.clamp(1, total_pages);
    let mut start = current.saturating_sub(width / 2).max(1);
    let end = start.saturating_add(width - 1).min(total_pages);
    if end - start + 1 < width {
        start = end + 1 - width;
    }

    let mut items: Vec<PageItem> = (start..=end).map(PageItem::Page).collect();
    if start > 1 {
        items[0] = PageItem::Page(1);
        items[1] = PageItem::Ellipsis;
    }
    if end < total_pages {
        let last = items.len() - 1;
        items[last - 1] = PageItem::Ellipsis;
        items[last] = PageItem::Page(total_pages);
    }
    items
}

/// Paging position of one list view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginator {
    pub page_size: usize,
    pub current_page: usize,
    pub total_items: usize,
}

impl Paginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            current_page: 1,
            total_items: 0,
        }
    }

    pub fn state(&self) -> PaginationState {
        compute_state(self.page_size, self.current_page, self.total_items)
    }

    pub fn total_pages(&self) -> usize {
        self.state().total_pages
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        slice(items, self.page_size, self.current_page)
    }

    pub fn page_numbers(&self, max_visible: usize) -> Vec<PageItem> {
        windowed_page_numbers(self.current_page, self.total_pages(), max_visible)
    }

    pub fn go_to_page(&mut self, page: usize) {
        self.current_page = go_to_page(page, self.total_pages());
    }

    pub fn next_page(&mut self) {
        self.go_to_page(self.current_page.saturating_add(1));
    }

    pub fn prev_page(&mut self) {
        self.go_to_page(self.current_page.saturating_sub(1));
    }

    /// Change the page size and go back to the first page.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.current_page = 1;
    }

    /// Record a new collection size, pulling the current page back in range.
    pub fn set_total_items(&mut self, total_items: usize) {
        self.total_items = total_items;
        self.current_page = go_to_page(self.current_page, self.total_pages());
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(10)
    }
}
