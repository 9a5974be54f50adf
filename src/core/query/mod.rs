//! Query language: predicates, sort specifications and windows
//!
//! A [`Query`] is what a storage collaborator receives from a resource:
//! the predicate to match, the order to return items in, and the window
//! of results to return.

mod eval;
pub mod params;
mod predicate;
mod sort;

pub use eval::{compare_values, values_equal};
pub use params::{ListParams, MAX_LIMIT, PaginationMeta};
pub use predicate::{Comparison, FIELD_OPERATORS, Predicate, lookup};
pub use sort::{Sort, SortField, total_cmp};

/// Slice of a result set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    /// `None` means no upper bound
    pub limit: Option<usize>,
}

impl Window {
    /// Window for a 1-based page, shifted by `skip`
    ///
    /// The offset saturates at `usize::MAX`, which selects nothing.
    pub fn from_page(page: usize, per_page: Option<usize>, skip: usize) -> Self {
        let offset = match per_page {
            Some(per_page) => page
                .saturating_sub(1)
                .saturating_mul(per_page)
                .saturating_add(skip),
            None => skip,
        };
        Self {
            offset,
            limit: per_page,
        }
    }

    /// Apply the window to an already ordered sequence
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// Complete query handed to storage
#[derive(Debug, Clone)]
pub struct Query {
    pub predicate: Predicate,
    pub sort: Sort,
    pub window: Window,
}

impl Query {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            sort: Sort::default(),
            window: Window::default(),
        }
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new(Predicate::all())
    }
}
