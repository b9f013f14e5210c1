//! Paginated row cache.
//!
//! [`RowCache`] is the contract the reconciliation engine relies on: a
//! key-value store of page lists with replace-on-write semantics. Every
//! mutation goes through [`RowCache::set_cached_pages`], so the engine never
//! edits a cached page in place behind the provider's back.
//!
//! [`PageCache`] is the in-memory provider used by the client library. It
//! keeps a bounded window of pages per key.

use std::collections::HashMap;

use crate::page::{Page, Row};
use crate::types::RowId;

/// Query key under which the table pages are cached.
pub const TABLE_QUERY_KEY: &str = "table";

/// Default number of pages kept in the window.
pub const DEFAULT_MAX_PAGES: usize = 3;

/// Storage for cached pages, keyed by query key.
pub trait RowCache {
    /// Current pages for `key`, if anything is cached.
    fn cached_pages(&self, key: &str) -> Option<&[Page]>;

    /// Replace the pages for `key`.
    fn set_cached_pages(&mut self, key: &str, pages: Vec<Page>);

    /// Returns `true` if a row with `id` is inside the cached window.
    fn contains_row(&self, key: &str, id: RowId) -> bool {
        self.cached_pages(key)
            .is_some_and(|pages| pages.iter().any(|page| page.contains_row(id)))
    }

    /// Look up a cached row.
    fn row(&self, key: &str, id: RowId) -> Option<&Row> {
        self.cached_pages(key)?
            .iter()
            .flat_map(|page| page.data.iter())
            .find(|row| row.id == id)
    }

    /// Apply `update` to every cached copy of row `id` and write the result
    /// back through [`set_cached_pages`](Self::set_cached_pages).
    ///
    /// Returns `false` (and writes nothing) when the row is not cached.
    fn update_row<F>(&mut self, key: &str, id: RowId, mut update: F) -> bool
    where
        F: FnMut(&mut Row),
        Self: Sized,
    {
        let Some(pages) = self.cached_pages(key) else {
            return false;
        };
        if !pages.iter().any(|page| page.contains_row(id)) {
            return false;
        }

        let pages = pages
            .iter()
            .map(|page| {
                if !page.contains_row(id) {
                    return page.clone();
                }
                let mut page = page.clone();
                for row in page.data.iter_mut().filter(|row| row.id == id) {
                    update(row);
                }
                page
            })
            .collect();

        self.set_cached_pages(key, pages);
        true
    }
}

/// In-memory [`RowCache`] with a bounded page window per key.
#[derive(Debug, Clone)]
pub struct PageCache {
    entries: HashMap<String, Vec<Page>>,
    max_pages: usize,
}

impl PageCache {
    pub fn new(max_pages: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_pages: max_pages.max(1),
        }
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Append a page fetched going forward, dropping the oldest page at the
    /// front when the window is full.
    pub fn push_back_page(&mut self, key: &str, page: Page) {
        let pages = self.entries.entry(key.to_string()).or_default();
        pages.push(page);
        if pages.len() > self.max_pages {
            let excess = pages.len() - self.max_pages;
            pages.drain(..excess);
        }
    }

    /// Prepend a page fetched going backward, dropping pages at the back
    /// when the window is full.
    pub fn push_front_page(&mut self, key: &str, page: Page) {
        let pages = self.entries.entry(key.to_string()).or_default();
        pages.insert(0, page);
        pages.truncate(self.max_pages);
    }

    /// Total number of cached rows under `key`.
    pub fn row_count(&self, key: &str) -> usize {
        self.entries
            .get(key)
            .map(|pages| pages.iter().map(|p| p.data.len()).sum())
            .unwrap_or(0)
    }

    pub fn clear(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGES)
    }
}

impl RowCache for PageCache {
    fn cached_pages(&self, key: &str) -> Option<&[Page]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    fn set_cached_pages(&mut self, key: &str, pages: Vec<Page>) {
        self.entries.insert(key.to_string(), pages);
    }
}
