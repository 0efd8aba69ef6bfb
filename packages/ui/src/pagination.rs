//! `use_pagination` — paging position that survives reloads.

use store::pagination::{PageItem, PaginationState, Paginator, DEFAULT_MAX_VISIBLE};

use crate::persistent::{use_persistent, UsePersistent};

/// Pagination for one list view, persisted under its own key.
#[derive(Clone)]
pub struct UsePagination {
    pager: UsePersistent<Paginator>,
}

impl UsePagination {
    pub fn state(&self) -> PaginationState {
        self.pager.get().state()
    }

    pub fn page_numbers(&self) -> Vec<PageItem> {
        self.pager.get().page_numbers(DEFAULT_MAX_VISIBLE)
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        self.pager.get().slice(items)
    }

    pub fn go_to_page(&self, page: usize) {
        self.modify(|p| p.go_to_page(page));
    }

    pub fn next_page(&self) {
        self.modify(Paginator::next_page);
    }

    pub fn prev_page(&self) {
        self.modify(Paginator::prev_page);
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.modify(|p| p.set_page_size(page_size));
    }

    /// Keep the pager in step with the collection it pages over. Call from an
    /// effect or event handler, not during render.
    pub fn set_total_items(&self, total_items: usize) {
        if self.pager.store().with(|p| p.total_items) != total_items {
            self.modify(|p| p.set_total_items(total_items));
        }
    }

    fn modify(&self, f: impl FnOnce(&mut Paginator)) {
        self.pager.update(|current| {
            let mut next = *current;
            f(&mut next);
            next
        });
    }
}

/// Persisted pagination for the list stored under `key`.
///
/// `page_size` only seeds a pager that has never been stored.
pub fn use_pagination(key: &str, page_size: usize) -> UsePagination {
    let pager = use_persistent(&format!("{key}.pagination"), || Paginator::new(page_size));
    UsePagination { pager }
}
