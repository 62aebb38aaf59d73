//! The paginator seam.
//!
//! A paginator is the external, asynchronous producer of page geometry. `docview-core` never
//! drives pagination itself: it queries the attached [`Paginator`] for a few authoritative
//! values and consumes the paginator's callbacks as [`PaginatorEvent`] messages, which are
//! marshaled onto the layout queue (see [`crate::DocumentLayout`]) before any cache state is
//! touched.

use crate::geometry::Size;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Direction in which content flows across a row of pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowDirection {
    /// Pages are read left to right.
    #[default]
    LeftToRight,
    /// Pages are read right to left.
    RightToLeft,
}

/// Query surface of an incremental paginator.
///
/// All methods are called on the layout queue, synchronously, while handling an attach or a
/// callback.
pub trait Paginator {
    /// Authoritative number of pages produced so far.
    fn page_count(&self) -> usize;

    /// Whether pagination has finished, i.e. [`page_count`](Self::page_count) is final.
    fn is_page_count_valid(&self) -> bool;

    /// Suggested page size. Used as the default size of pages that have not been fetched yet.
    fn page_size(&self) -> Size;

    /// Content flow direction, if the paginator exposes it.
    fn flow_direction(&self) -> Option<FlowDirection> {
        None
    }
}

#[derive(Debug, Default)]
struct PageLiveness {
    destroyed: AtomicBool,
}

/// A page handed back by the paginator.
///
/// The handle carries the attach epoch of the source that produced it and a liveness flag the
/// producer flips (via [`destroy`](Self::destroy)) when it tears the page down. Clones share
/// the liveness flag.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    page_number: usize,
    size: Size,
    source_epoch: u64,
    liveness: Arc<PageLiveness>,
}

impl PartialEq for DocumentPage {
    /// Two handles are equal when they are clones of the same page.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.liveness, &other.liveness)
            && self.page_number == other.page_number
            && self.size == other.size
            && self.source_epoch == other.source_epoch
    }
}

impl DocumentPage {
    /// Create a live page produced by the source attached at `source_epoch`.
    ///
    /// Producers normally mint pages through [`crate::PaginatorLink::page`], which stamps the
    /// correct epoch.
    pub fn new(page_number: usize, size: Size, source_epoch: u64) -> Self {
        Self {
            page_number,
            size,
            source_epoch,
            liveness: Arc::new(PageLiveness::default()),
        }
    }

    /// Page number within the document.
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    /// Laid out size of the page.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Attach epoch of the paginator that produced this page.
    pub fn source_epoch(&self) -> u64 {
        self.source_epoch
    }

    /// Mark the page as torn down by its producer.
    pub fn destroy(&self) {
        self.liveness.destroyed.store(true, Ordering::Release);
    }

    /// Whether the producer has torn this page down.
    pub fn is_destroyed(&self) -> bool {
        self.liveness.destroyed.load(Ordering::Acquire)
    }
}

/// Payload of an asynchronous page fetch completion.
#[derive(Debug, Clone, PartialEq)]
pub struct GetPageCompleted {
    /// Requested page number.
    pub page_number: usize,
    /// The fetched page, or `None` if the paginator had no page to hand back.
    pub page: Option<DocumentPage>,
    /// Error message if the fetch failed.
    pub error: Option<String>,
    /// Whether the fetch was cancelled.
    pub cancelled: bool,
}

impl GetPageCompleted {
    /// A successful fetch.
    pub fn success(page: DocumentPage) -> Self {
        Self {
            page_number: page.page_number(),
            page: Some(page),
            error: None,
            cancelled: false,
        }
    }

    /// A cancelled fetch.
    pub fn cancelled(page_number: usize) -> Self {
        Self {
            page_number,
            page: None,
            error: None,
            cancelled: true,
        }
    }

    /// A failed fetch.
    pub fn failed(page_number: usize, error: impl Into<String>) -> Self {
        Self {
            page_number,
            page: None,
            error: Some(error.into()),
            cancelled: false,
        }
    }

    /// The page, if this completion carries a usable one (not cancelled, no error).
    pub fn usable_page(&self) -> Option<&DocumentPage> {
        if self.cancelled || self.error.is_some() {
            return None;
        }
        self.page.as_ref()
    }
}

/// A paginator callback.
#[derive(Debug, Clone, PartialEq)]
pub enum PaginatorEvent {
    /// Pages `[start, start + count)` became available or were re-paginated.
    PaginationProgress {
        /// First page of the range.
        start: usize,
        /// Number of pages (must be > 0).
        count: usize,
    },
    /// Pagination finished; the paginator's page count is now final.
    PaginationCompleted,
    /// Pages `[start, start + count)` were invalidated without necessarily changing size.
    ///
    /// `count` may run past the end of the document (e.g. `usize::MAX - start`), meaning "to
    /// the end".
    PagesChanged {
        /// First page of the range.
        start: usize,
        /// Number of pages (must be > 0).
        count: usize,
    },
    /// An asynchronous page fetch completed.
    GetPageCompleted(GetPageCompleted),
}
