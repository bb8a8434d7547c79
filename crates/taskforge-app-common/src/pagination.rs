use serde::{Deserialize, Serialize};

/// Offset/limit window requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 200;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.min(Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// One page of results plus enough bookkeeping to fetch the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// Total result count before the window was applied.
    pub total: usize,
    /// Offset of the next page, if any results remain.
    pub next_offset: Option<usize>,
}

/// Apply an offset/limit window to an already-filtered result set.
///
/// Callers are expected to filter first and paginate last; the `total`
/// reported here is the post-filter count.
pub fn paginate<T>(items: Vec<T>, page: Page) -> Paginated<T> {
    let total = items.len();
    let start = page.offset.min(total);
    let end = start.saturating_add(page.limit).min(total);
    let next_offset = if end < total { Some(end) } else { None };

    let items = items.into_iter().skip(start).take(end - start).collect();

    Paginated {
        items,
        total,
        next_offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_windows() {
        let items: Vec<u32> = (0..10).collect();

        let first = paginate(items.clone(), Page::new(0, 4));
        assert_eq!(first.items, vec![0, 1, 2, 3]);
        assert_eq!(first.total, 10);
        assert_eq!(first.next_offset, Some(4));

        let last = paginate(items.clone(), Page::new(8, 4));
        assert_eq!(last.items, vec![8, 9]);
        assert_eq!(last.next_offset, None);

        let past_end = paginate(items, Page::new(20, 4));
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 10);
        assert_eq!(past_end.next_offset, None);
    }

    #[test]
    fn test_limit_is_clamped() {
        let page = Page::new(0, 10_000);
        assert_eq!(page.limit, Page::MAX_LIMIT);
    }
}
