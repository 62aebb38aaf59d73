//! Error types.
//!
//! Only contract violations are errors: a misbehaving paginator, or a viewer calling the caches
//! with arguments that break their invariants. "Not enough pages yet" is never an error; the row
//! cache defers the layout instead.

use thiserror::Error;

/// Errors raised while applying a paginator callback to a [`crate::PageCache`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageCacheError {
    /// A progress or changed callback reported zero pages.
    #[error("paginator reported an empty page range starting at {start}")]
    EmptyRange {
        /// First page of the reported range.
        start: usize,
    },

    /// `start + count` does not fit in `usize`.
    #[error("paginator reported a page range that overflows: start {start}, count {count}")]
    RangeOverflow {
        /// First page of the reported range.
        start: usize,
        /// Reported page count.
        count: usize,
    },

    /// A fetched page's own page number disagrees with the completion's page number.
    #[error("fetched page {page} was delivered for page number {requested}")]
    PageNumberMismatch {
        /// Page number carried by the completion.
        requested: usize,
        /// Page number carried by the page itself.
        page: usize,
    },
}

/// Errors raised by [`crate::RowCache`] operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowCacheError {
    /// No page cache is attached.
    #[error("no page cache is attached to the row cache")]
    NotAttached,

    /// The page cache passed in is not the one attached.
    #[error("the page cache passed in is not the attached page cache")]
    PageCacheMismatch,

    /// An incremental update was requested before any layout completed.
    #[error("row layout has not been computed")]
    NoLayout,

    /// Column count outside `1..=MAXIMUM_PAGES_ACROSS`.
    #[error("invalid column count: {0}")]
    InvalidColumns(usize),

    /// Pivot page past the end of the page cache.
    #[error("pivot page {pivot_page} is outside 0..={page_count}")]
    InvalidPivotPage {
        /// Requested pivot page.
        pivot_page: usize,
        /// Pages in the cache.
        page_count: usize,
    },

    /// Row index out of range.
    #[error("row {index} is out of range (row count {row_count})")]
    RowOutOfRange {
        /// Requested row.
        index: usize,
        /// Rows in the cache.
        row_count: usize,
    },

    /// Page number not covered by the current rows.
    #[error("page {page} is not covered by the row layout")]
    PageOutOfRange {
        /// Requested page.
        page: usize,
    },

    /// A page range that is empty or not covered by the current rows.
    #[error("invalid page range: start {start}, count {count}")]
    InvalidPageRange {
        /// First page of the range.
        start: usize,
        /// Page count of the range.
        count: usize,
    },

    /// Vertical offset outside `[0, extent_height]`, or not a number.
    #[error("vertical offset {offset} is outside 0..={extent_height}")]
    OffsetOutOfRange {
        /// Requested offset.
        offset: f64,
        /// Current extent height.
        extent_height: f64,
    },

    /// `end_offset` precedes `start_offset`.
    #[error("invalid offset range: {start}..{end}")]
    InvalidOffsetRange {
        /// Start offset.
        start: f64,
        /// End offset.
        end: f64,
    },

    /// Scale must be finite and positive.
    #[error("invalid scale: {0}")]
    InvalidScale(f64),

    /// Page spacing must be finite.
    #[error("invalid page spacing: {0}")]
    InvalidSpacing(f64),
}

/// Errors surfaced by [`crate::DocumentLayout`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    /// A paginator callback violated the page cache contract.
    #[error(transparent)]
    PageCache(#[from] PageCacheError),

    /// A row cache operation violated its contract.
    #[error(transparent)]
    RowCache(#[from] RowCacheError),

    /// The layout queue the link posts to has been dropped.
    #[error("layout queue is closed")]
    QueueClosed,
}
