//! Page-numbered list aggregation.
//!
//! Listing endpoints return one page per request and report the total page
//! count in a response header. The pager learns that total from the first
//! page and then walks the remaining pages in order.

use std::future::Future;
use tracing::debug;

use crate::api::{Page, PageRequest};
use crate::error::Result;

/// Page size used when the caller passes zero or a negative value.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Position within a paginated walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    /// Next page to fetch (1-based).
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
    /// Total pages, unknown until the first response arrives.
    pub total_pages: Option<u32>,
}

impl PageCursor {
    const fn request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Sequential aggregator over a page-numbered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    page_size: u32,
    /// `None` means "every page the server reports".
    page_count: Option<u32>,
}

impl Pager {
    /// Creates a pager.
    ///
    /// A `page_size` of zero or less becomes [`DEFAULT_PAGE_SIZE`]. A
    /// `page_count` of zero or less means every page.
    #[must_use]
    pub fn new(page_size: i64, page_count: i64) -> Self {
        let page_size = u32::try_from(page_size)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let page_count = u32::try_from(page_count).ok().filter(|count| *count > 0);

        Self {
            page_size,
            page_count,
        }
    }

    /// Pager that walks every page with the default page size.
    #[must_use]
    pub fn all() -> Self {
        Self::new(0, 0)
    }

    /// Returns the normalized page size.
    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetches pages sequentially and concatenates their items.
    ///
    /// Page 1 is always fetched first. With no explicit page count it
    /// reports the server's total and pages `2..=total` follow. With an
    /// explicit count, pages `2..=count` follow regardless of the total; a
    /// page past the end yields whatever the endpoint returns for it. Items
    /// keep page order, then server order within a page.
    ///
    /// # Errors
    ///
    /// Returns the first page failure; items already fetched are dropped.
    pub async fn fetch_all<T, F, Fut>(&self, mut fetch_page: F) -> Result<Vec<T>>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        let mut cursor = PageCursor {
            page: 1,
            page_size: self.page_size,
            total_pages: None,
        };

        let first = fetch_page(cursor.request()).await?;
        let total = first.total_pages;
        cursor.total_pages = Some(total);

        let last_page = self.page_count.unwrap_or(total);
        debug!(
            "Pagination: {total} page(s) reported, fetching up to page {}",
            last_page.max(1)
        );

        let mut items = first.items;

        while cursor.page < last_page {
            cursor.page += 1;
            let page = fetch_page(cursor.request()).await?;
            items.extend(page.items);
        }

        Ok(items)
    }
}
