//! Page requests and paged results shared by every list read path.

use serde::{Deserialize, Serialize};

/// Default page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A normalized page request.
///
/// `page` is 1-based and never below 1; `page_size` is clamped to
/// `[1, MAX_PAGE_SIZE]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Builds a page request, normalizing out-of-range values.
    pub fn new(page: i64, page_size: i64) -> Self {
        let page = page.clamp(1, i64::from(u32::MAX)) as u32;
        let page_size = page_size.clamp(1, i64::from(MAX_PAGE_SIZE)) as u32;
        Self { page, page_size }
    }

    /// Builds a page request from optional query parameters.
    pub fn from_query(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self::new(
            page.unwrap_or(1),
            page_size.unwrap_or(i64::from(DEFAULT_PAGE_SIZE)),
        )
    }

    /// Returns the 1-based page number.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Returns the page size.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Returns the number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, i64::from(DEFAULT_PAGE_SIZE))
    }
}

/// One page of results plus the totals needed to navigate the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Assembles a page; `total_pages = ceil(total / page_size)`.
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let page_size = u64::from(request.page_size());
        Self {
            items,
            total,
            page: request.page(),
            page_size: request.page_size(),
            total_pages: total.div_ceil(page_size),
        }
    }

    /// Maps the items of the page, keeping the totals.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_page_and_size() {
        let req = PageRequest::new(0, 500);
        assert_eq!(req.page(), 1);
        assert_eq!(req.page_size(), MAX_PAGE_SIZE);

        let req = PageRequest::new(-3, 0);
        assert_eq!(req.page(), 1);
        assert_eq!(req.page_size(), 1);
    }

    #[test]
    fn defaults_when_absent() {
        let req = PageRequest::from_query(None, None);
        assert_eq!(req, PageRequest::default());
        assert_eq!(req.page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(PageRequest::new(1, 10).offset(), 0);
        assert_eq!(PageRequest::new(3, 25).offset(), 50);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<u8> = Page::new(vec![], 21, PageRequest::new(1, 10));
        assert_eq!(page.total_pages, 3);

        let page: Page<u8> = Page::new(vec![], 0, PageRequest::new(1, 10));
        assert_eq!(page.total_pages, 0);

        let page: Page<u8> = Page::new(vec![], 20, PageRequest::new(2, 10));
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page, 2);
    }
}
