//! Serial layout queue tying a paginator to the page and row caches.
//!
//! Paginators run on their own threads and report through a [`PaginatorLink`]. Callbacks are
//! queued and applied by [`DocumentLayout::process_pending`] on the thread that owns the layout,
//! which also serves every viewer query. Each page cache diff batch is forwarded to the row cache
//! in the same turn, so the two caches never disagree between turns.
//!
//! ```rust
//! use docview_core::{DocumentLayout, Paginator, RowLayoutOptions, Size};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Streaming(Arc<AtomicUsize>);
//!
//! impl Paginator for Streaming {
//!     fn page_count(&self) -> usize { self.0.load(Ordering::Acquire) }
//!     fn is_page_count_valid(&self) -> bool { false }
//!     fn page_size(&self) -> Size { Size::new(816.0, 1056.0) }
//! }
//!
//! let paginated = Arc::new(AtomicUsize::new(0));
//! let mut layout = DocumentLayout::new(RowLayoutOptions::default().with_columns(2)).unwrap();
//! let link = layout.attach(Box::new(Streaming(paginated.clone())));
//! layout.recalc_rows(0).unwrap();
//!
//! // Typically done on the paginator's thread.
//! paginated.store(5, Ordering::Release);
//! link.pagination_progress(0, 5).unwrap();
//! link.pagination_completed().unwrap();
//!
//! assert_eq!(layout.process_pending().unwrap(), 2);
//! assert_eq!(layout.rows().row_count(), 3);
//! assert_eq!(layout.visible_pages(0.0, 1500.0).unwrap(), 0..4);
//! ```

use crate::error::LayoutError;
use crate::geometry::Size;
use crate::options::RowLayoutOptions;
use crate::page_cache::{PageCache, PageCacheEvent};
use crate::paginator::{DocumentPage, GetPageCompleted, Paginator, PaginatorEvent};
use crate::row_cache::{RowCache, RowCacheEvent};
use log::{debug, trace, warn};
use std::ops::Range;
use std::sync::mpsc;

const LOG_TARGET: &str = "docview.layout";

/// A queued paginator callback.
#[derive(Debug)]
struct LayoutMessage {
    epoch: u64,
    event: PaginatorEvent,
}

/// Handle a paginator uses to report to a [`DocumentLayout`] from any thread.
///
/// Every message is tagged with the epoch of the attach that created the link; after the
/// layout re-attaches or detaches, messages from older links are dropped on arrival.
#[derive(Debug, Clone)]
pub struct PaginatorLink {
    epoch: u64,
    tx: mpsc::Sender<LayoutMessage>,
}

impl PaginatorLink {
    /// Epoch this link reports for.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queue a raw paginator event.
    pub fn send(&self, event: PaginatorEvent) -> Result<(), LayoutError> {
        self.tx
            .send(LayoutMessage {
                epoch: self.epoch,
                event,
            })
            .map_err(|_| LayoutError::QueueClosed)
    }

    /// Report pages `[start, start + count)` as paginated.
    pub fn pagination_progress(&self, start: usize, count: usize) -> Result<(), LayoutError> {
        self.send(PaginatorEvent::PaginationProgress { start, count })
    }

    /// Report the page count as final.
    pub fn pagination_completed(&self) -> Result<(), LayoutError> {
        self.send(PaginatorEvent::PaginationCompleted)
    }

    /// Report pages `[start, start + count)` as invalidated.
    pub fn pages_changed(&self, start: usize, count: usize) -> Result<(), LayoutError> {
        self.send(PaginatorEvent::PagesChanged { start, count })
    }

    /// Deliver the result of a page fetch.
    pub fn get_page_completed(&self, completed: GetPageCompleted) -> Result<(), LayoutError> {
        self.send(PaginatorEvent::GetPageCompleted(completed))
    }

    /// Mint a page stamped with this link's epoch.
    pub fn page(&self, page_number: usize, size: Size) -> DocumentPage {
        DocumentPage::new(page_number, size, self.epoch)
    }

    /// Report a cancelled fetch of `page_number`.
    pub fn cancelled(&self, page_number: usize) -> Result<(), LayoutError> {
        self.get_page_completed(GetPageCompleted::cancelled(page_number))
    }

    /// Report a failed fetch of `page_number`.
    pub fn failed(&self, page_number: usize, error: impl Into<String>) -> Result<(), LayoutError> {
        self.get_page_completed(GetPageCompleted::failed(page_number, error))
    }
}

/// Owner of a [`PageCache`] and the [`RowCache`] laid out over it.
pub struct DocumentLayout {
    pages: PageCache,
    rows: RowCache,
    options: RowLayoutOptions,
    /// Whether the viewer asked for rows; re-issued on every attach.
    layout_requested: bool,
    tx: mpsc::Sender<LayoutMessage>,
    rx: mpsc::Receiver<LayoutMessage>,
    page_events: Vec<PageCacheEvent>,
}

impl DocumentLayout {
    /// Create a layout with no paginator attached.
    pub fn new(options: RowLayoutOptions) -> Result<Self, LayoutError> {
        options.validate()?;

        let pages = PageCache::new();
        let mut rows = RowCache::new();
        rows.attach(&pages);
        rows.apply_options(&pages, &options)?;

        let (tx, rx) = mpsc::channel::<LayoutMessage>();
        Ok(Self {
            pages,
            rows,
            options,
            layout_requested: false,
            tx,
            rx,
            page_events: Vec::new(),
        })
    }

    /// Follow `paginator`, returning the link it must report through.
    ///
    /// Both caches are reset. If rows had been requested before, a layout anchored on page 0 is
    /// requested again (and deferred until enough pages arrive).
    pub fn attach(&mut self, paginator: Box<dyn Paginator>) -> PaginatorLink {
        let epoch = self.pages.attach(Some(paginator));
        self.rebind_rows();
        debug!(target: LOG_TARGET, "paginator attached (epoch {epoch})");

        PaginatorLink {
            epoch,
            tx: self.tx.clone(),
        }
    }

    /// Stop following the current paginator. Its links keep working but their messages are
    /// dropped.
    pub fn detach(&mut self) {
        let epoch = self.pages.detach();
        self.rebind_rows();
        debug!(target: LOG_TARGET, "paginator detached (epoch {epoch})");
    }

    fn rebind_rows(&mut self) {
        // The attach turn's page diffs describe a cache the row cache is about to drop.
        self.page_events.extend(self.pages.take_events());
        self.rows.attach(&self.pages);

        if self.layout_requested
            && let Err(err) = self.rows.recalc_rows(&self.pages, 0, self.options.columns)
        {
            warn!(target: LOG_TARGET, "failed to re-request row layout: {err}");
        }
    }

    /// Apply every queued paginator callback, oldest first.
    ///
    /// Returns the number of callbacks applied. The first contract violation stops processing
    /// and is returned; callbacks queued behind it stay queued.
    pub fn process_pending(&mut self) -> Result<usize, LayoutError> {
        let mut processed = 0;
        while let Ok(message) = self.rx.try_recv() {
            trace!(
                target: LOG_TARGET,
                "processing {:?} (epoch {})",
                message.event,
                message.epoch
            );
            processed += 1;
            self.pages.handle_event(message.epoch, message.event)?;
            self.route_page_events()?;
        }
        Ok(processed)
    }

    fn route_page_events(&mut self) -> Result<(), LayoutError> {
        let batch = self.pages.take_events();
        let routed = batch
            .iter()
            .try_for_each(|event| self.rows.on_page_cache_event(&self.pages, event));
        self.page_events.extend(batch);
        routed.map_err(LayoutError::from)
    }

    /// Lay out rows anchored on `pivot_page` with the configured columns.
    pub fn recalc_rows(&mut self, pivot_page: usize) -> Result<(), LayoutError> {
        self.layout_requested = true;
        self.rows
            .recalc_rows(&self.pages, pivot_page, self.options.columns)?;
        Ok(())
    }

    /// Lay out rows anchored on `pivot_page` with `columns` pages on the pivot row.
    ///
    /// `columns` becomes the configured column count.
    pub fn recalc_rows_with_columns(
        &mut self,
        pivot_page: usize,
        columns: usize,
    ) -> Result<(), LayoutError> {
        self.options.with_columns(columns).validate()?;
        self.options.columns = columns;
        self.recalc_rows(pivot_page)
    }

    /// Replace every option.
    ///
    /// Scale and spacing changes re-size the existing rows. A column change re-lays out around
    /// the first page of the current pivot row.
    pub fn set_options(&mut self, options: RowLayoutOptions) -> Result<(), LayoutError> {
        options.validate()?;
        self.rows.apply_options(&self.pages, &options)?;

        let columns_changed = options.columns != self.options.columns;
        self.options = options;
        self.sync_spacing();

        if columns_changed && self.layout_requested {
            let pivot_page = self
                .rows
                .row(self.rows.pivot_row_index())
                .map_or(0, |row| row.first_page);
            self.recalc_rows(pivot_page)?;
        }
        Ok(())
    }

    /// Set the zoom factor.
    pub fn set_scale(&mut self, scale: f64) -> Result<(), LayoutError> {
        self.rows.set_scale(&self.pages, scale)?;
        self.options.scale = self.rows.scale();
        Ok(())
    }

    /// Set the gutter below every page.
    pub fn set_vertical_page_spacing(&mut self, spacing: f64) -> Result<(), LayoutError> {
        self.rows.set_vertical_page_spacing(&self.pages, spacing)?;
        self.sync_spacing();
        Ok(())
    }

    /// Set the gutter to the right of every page.
    pub fn set_horizontal_page_spacing(&mut self, spacing: f64) -> Result<(), LayoutError> {
        self.rows.set_horizontal_page_spacing(&self.pages, spacing)?;
        self.sync_spacing();
        Ok(())
    }

    /// Keep the stored options equal to the (clamped) values the row cache uses.
    fn sync_spacing(&mut self) {
        self.options.vertical_page_spacing = self.rows.vertical_page_spacing();
        self.options.horizontal_page_spacing = self.rows.horizontal_page_spacing();
    }

    /// Rows visible between two vertical offsets, as `(first_row, row_count)`.
    pub fn visible_rows(
        &self,
        start_offset: f64,
        end_offset: f64,
    ) -> Result<(usize, usize), LayoutError> {
        Ok(self.rows.visible_row_indices(start_offset, end_offset)?)
    }

    /// Pages on the rows visible between two vertical offsets.
    pub fn visible_pages(
        &self,
        start_offset: f64,
        end_offset: f64,
    ) -> Result<Range<usize>, LayoutError> {
        let (first_row, count) = self.visible_rows(start_offset, end_offset)?;
        if count == 0 {
            return Ok(0..0);
        }
        let first = self.rows.row(first_row)?;
        let last = self.rows.row(first_row + count - 1)?;
        Ok(first.first_page..last.pages().end)
    }

    /// Vertical offset of the row holding `page`.
    pub fn offset_for_page(&self, page: usize) -> Result<f64, LayoutError> {
        Ok(self.rows.row_for_page(page)?.vertical_offset)
    }

    /// Current options.
    pub fn options(&self) -> &RowLayoutOptions {
        &self.options
    }

    /// The page cache.
    pub fn pages(&self) -> &PageCache {
        &self.pages
    }

    /// The row cache.
    pub fn rows(&self) -> &RowCache {
        &self.rows
    }

    /// Subscribe to page cache events.
    pub fn subscribe_pages<F>(&mut self, callback: F)
    where
        F: FnMut(&PageCacheEvent) + Send + 'static,
    {
        self.pages.subscribe(callback);
    }

    /// Subscribe to row cache events.
    pub fn subscribe_rows<F>(&mut self, callback: F)
    where
        F: FnMut(&RowCacheEvent) + Send + 'static,
    {
        self.rows.subscribe(callback);
    }

    /// Drain buffered page cache events.
    pub fn take_page_events(&mut self) -> Vec<PageCacheEvent> {
        std::mem::take(&mut self.page_events)
    }

    /// Drain buffered row cache events.
    pub fn take_row_events(&mut self) -> Vec<RowCacheEvent> {
        self.rows.take_events()
    }
}
