#![warn(missing_docs)]
//! Docview Core - Headless Page and Row Layout Caches
//!
//! # Overview
//!
//! `docview-core` maintains the page geometry and row layout of a paginated document viewer while
//! the document is still being paginated in the background. It does no rendering and fetches no
//! page content; it only answers "how large is page N", "which pages share a row" and "which rows
//! are visible at this scroll offset", and reports every change as a diff so viewers can update
//! incrementally.
//!
//! # Core Features
//!
//! - **Page Cache**: per-page sizes with a dirty flag, padded and trimmed as the paginator reports
//! - **Row Cache**: fixed or width-budgeted rows, patched in place when pages change
//! - **Pivot Layout**: rows are packed outward from the page the viewer is looking at
//! - **Deferred Layout**: a layout asked for too early is retried when pages arrive
//! - **Change Notifications**: subscriber callbacks plus a drainable event buffer
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  DocumentLayout (serial queue, viewer API)  │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  RowCache (rows, extents, offset queries)   │  ← Row Diffs
//! ├─────────────────────────────────────────────┤
//! │  PageCache (page sizes, dirty flags)        │  ← Page Diffs
//! ├─────────────────────────────────────────────┤
//! │  Paginator + PaginatorLink (any thread)     │  ← Page Source
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## Driving the caches directly
//!
//! ```rust
//! use docview_core::{PageCache, Paginator, RowCache, Size};
//!
//! struct FixedDocument(usize);
//!
//! impl Paginator for FixedDocument {
//!     fn page_count(&self) -> usize { self.0 }
//!     fn is_page_count_valid(&self) -> bool { true }
//!     fn page_size(&self) -> Size { Size::new(816.0, 1056.0) }
//! }
//!
//! let mut pages = PageCache::new();
//! pages.attach(Some(Box::new(FixedDocument(5))));
//!
//! let mut rows = RowCache::new();
//! rows.attach(&pages);
//! rows.recalc_rows(&pages, 0, 2).unwrap();
//!
//! assert_eq!(rows.row_count(), 3);
//! assert_eq!(rows.extent_height(), 3.0 * 1056.0);
//! assert_eq!(rows.visible_row_indices(0.0, 1200.0).unwrap(), (0, 2));
//! ```
//!
//! ## Using the serial queue
//!
//! See [`DocumentLayout`]: paginators report through a [`PaginatorLink`] from any thread and the
//! owning thread applies their callbacks with [`DocumentLayout::process_pending`].
//!
//! # Module Description
//!
//! - [`geometry`] - Sizes and tolerant floating point comparisons
//! - [`paginator`] - The page source contract and its callbacks
//! - [`watcher`] - Stale page detection
//! - [`page_cache`] - Per-page size cache
//! - [`row_cache`] - Row layout over the page cache
//! - [`document_layout`] - Serial queue owning both caches
//! - [`options`] - Layout options and constants
//! - [`error`] - Error types
//!
//! # Logging
//!
//! Diagnostics go through the [`log`] facade under the `docview.page_cache`, `docview.row_cache`
//! and `docview.layout` targets. The library never installs a logger.

pub mod document_layout;
pub mod error;
pub mod geometry;
pub mod options;
pub mod page_cache;
pub mod paginator;
pub mod row_cache;
pub mod watcher;

pub use document_layout::{DocumentLayout, PaginatorLink};
pub use error::{LayoutError, PageCacheError, RowCacheError};
pub use geometry::{Size, are_close, greater_than, round_to};
pub use options::{
    DEFAULT_PAGE_SIZE, FIND_OFFSET_PRECISION, MAXIMUM_PAGES_ACROSS, RowLayoutOptions,
    VISIBLE_DELTA,
};
pub use page_cache::{
    PageCache, PageCacheCallback, PageCacheChange, PageCacheChangeType, PageCacheEntry,
    PageCacheEvent, PageCacheId,
};
pub use paginator::{DocumentPage, FlowDirection, GetPageCompleted, Paginator, PaginatorEvent};
pub use row_cache::{RowCache, RowCacheCallback, RowCacheChange, RowCacheEvent, RowInfo};
pub use watcher::PageDestroyedWatcher;
