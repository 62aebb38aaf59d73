//! Page geometry cache
//!
//! [`PageCache`] proxies and caches the size of every page of a document whose pages are
//! produced asynchronously by an external [`Paginator`]. It re-exposes the paginator's
//! notifications in cache-relative terms: every callback that changes the cache produces exactly
//! one [`PageCacheEvent::PageCacheChanged`] batch describing what changed, emitted in the same
//! turn as the mutation and before the forwarded lifecycle event.
//!
//! # Example
//!
//! ```rust
//! use docview_core::{PageCache, PageCacheEvent, Paginator, PaginatorEvent, Size};
//!
//! struct Fixed(usize);
//!
//! impl Paginator for Fixed {
//!     fn page_count(&self) -> usize { self.0 }
//!     fn is_page_count_valid(&self) -> bool { false }
//!     fn page_size(&self) -> Size { Size::new(816.0, 1056.0) }
//! }
//!
//! let mut cache = PageCache::new();
//! let epoch = cache.attach(Some(Box::new(Fixed(5))));
//! assert_eq!(cache.page_count(), 5);
//! cache.take_events();
//!
//! cache
//!     .handle_event(epoch, PaginatorEvent::PagesChanged { start: 3, count: 100 })
//!     .unwrap();
//! assert!(cache.is_page_dirty(4));
//! assert!(matches!(cache.take_events()[1], PageCacheEvent::PagesChanged { start: 3, .. }));
//! ```

use crate::error::PageCacheError;
use crate::geometry::Size;
use crate::options::DEFAULT_PAGE_SIZE;
use crate::paginator::{FlowDirection, GetPageCompleted, Paginator, PaginatorEvent};
use crate::watcher::PageDestroyedWatcher;
use log::{debug, trace};
use std::sync::atomic::{AtomicU64, Ordering};

const LOG_TARGET: &str = "docview.page_cache";

/// Cached geometry of a single page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageCacheEntry {
    /// Last known size: the default size while dirty, the confirmed size otherwise.
    pub page_size: Size,
    /// `true` until a page fetch confirms the size.
    pub dirty: bool,
}

/// Kind of a [`PageCacheChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCacheChangeType {
    /// Pages appended at the end of the cache.
    Add,
    /// Pages removed from the end of the cache.
    Remove,
    /// Existing pages changed size or dirtiness.
    Update,
}

/// One record of a page cache diff: `count` pages starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCacheChange {
    /// First affected page.
    pub start: usize,
    /// Number of affected pages.
    pub count: usize,
    /// What happened to them.
    pub change_type: PageCacheChangeType,
}

impl PageCacheChange {
    /// Create a change record.
    pub fn new(start: usize, count: usize, change_type: PageCacheChangeType) -> Self {
        Self {
            start,
            count,
            change_type,
        }
    }

    /// Exclusive end page.
    pub fn end(&self) -> usize {
        self.start + self.count
    }
}

/// Notifications emitted by a [`PageCache`].
#[derive(Debug, Clone, PartialEq)]
pub enum PageCacheEvent {
    /// Forwarded paginator progress, after the cache absorbed it.
    PaginationProgress {
        /// First page of the range.
        start: usize,
        /// Number of pages.
        count: usize,
    },
    /// Forwarded paginator completion.
    PaginationCompleted,
    /// Forwarded paginator invalidation.
    PagesChanged {
        /// First page of the range.
        start: usize,
        /// Number of pages, as reported (possibly past the end).
        count: usize,
    },
    /// Forwarded page fetch completion (including dropped ones).
    GetPageCompleted(GetPageCompleted),
    /// Batched diff of one paginator callback.
    PageCacheChanged(Vec<PageCacheChange>),
}

/// Page cache change callback function type
pub type PageCacheCallback = Box<dyn FnMut(&PageCacheEvent) + Send>;

/// Process-unique identity of a [`PageCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageCacheId(u64);

impl PageCacheId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-page geometry cache fed by an incremental paginator.
///
/// Events are delivered to [`subscribe`](Self::subscribe)d callbacks and buffered until
/// [`take_events`](Self::take_events) drains them.
pub struct PageCache {
    id: PageCacheId,
    entries: Vec<PageCacheEntry>,
    source: Option<Box<dyn Paginator>>,
    watcher: PageDestroyedWatcher,
    /// Size given to dirty entries.
    default_page_size: Size,
    /// Whether `default_page_size` comes from a confirmed page.
    is_default_size_known: bool,
    last_confirmed_size: Option<Size>,
    dynamic_page_sizes: bool,
    is_content_right_to_left: bool,
    is_pagination_completed: bool,
    callbacks: Vec<PageCacheCallback>,
    events: Vec<PageCacheEvent>,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PageCache {
    /// Create an empty cache with no paginator attached.
    pub fn new() -> Self {
        Self {
            id: PageCacheId::next(),
            entries: Vec::new(),
            source: None,
            watcher: PageDestroyedWatcher::new(),
            default_page_size: DEFAULT_PAGE_SIZE,
            is_default_size_known: false,
            last_confirmed_size: None,
            dynamic_page_sizes: false,
            is_content_right_to_left: false,
            is_pagination_completed: false,
            callbacks: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Identity of this cache.
    pub fn id(&self) -> PageCacheId {
        self.id
    }

    /// Replace the paginator this cache follows.
    ///
    /// Returns the new source epoch; callbacks must be delivered to
    /// [`handle_event`](Self::handle_event) with this epoch; anything tagged with an older epoch
    /// is dropped.
    ///
    /// The cache is cleared (one bulk `Remove` diff when it was not empty) and every flag is
    /// reset. If the new paginator already has pages, progress (and completion, when its page
    /// count is final) is re-raised locally so observers converge without waiting for the next
    /// asynchronous callback.
    pub fn attach(&mut self, source: Option<Box<dyn Paginator>>) -> u64 {
        let epoch = self.watcher.advance();
        self.source = source;

        let mut changes = Vec::new();
        if !self.entries.is_empty() {
            changes.push(PageCacheChange::new(
                0,
                self.entries.len(),
                PageCacheChangeType::Remove,
            ));
            self.entries.clear();
        }

        self.is_default_size_known = false;
        self.last_confirmed_size = None;
        self.dynamic_page_sizes = false;
        self.is_pagination_completed = false;
        self.is_content_right_to_left = false;
        self.default_page_size = DEFAULT_PAGE_SIZE;

        let snapshot = self.source.as_ref().map(|source| {
            (
                source.page_count(),
                source.is_page_count_valid(),
                source.page_size(),
                source.flow_direction(),
            )
        });

        if let Some((_, _, hint, direction)) = snapshot {
            if !hint.is_empty() && hint.is_finite() {
                self.default_page_size = hint;
            }
            self.is_content_right_to_left = direction == Some(FlowDirection::RightToLeft);
        }

        debug!(
            target: LOG_TARGET,
            "attached paginator (epoch {epoch}, source: {}, default page size {:?})",
            self.source.is_some(),
            self.default_page_size
        );

        self.fire_changes(changes);

        if let Some((page_count, page_count_valid, _, _)) = snapshot {
            if page_count > 0 {
                self.apply_progress(0, page_count);
            }
            if page_count_valid {
                self.apply_pagination_completed();
            }
        }

        epoch
    }

    /// Detach the current paginator, clearing the cache.
    pub fn detach(&mut self) -> u64 {
        self.attach(None)
    }

    /// Whether a paginator is attached.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Epoch of the currently attached source.
    pub fn source_epoch(&self) -> u64 {
        self.watcher.epoch()
    }

    /// Apply a marshaled paginator callback.
    ///
    /// Malformed arguments are contract violations and return an error without touching the
    /// cache. Callbacks from a detached source (stale `epoch`) are dropped.
    pub fn handle_event(
        &mut self,
        epoch: u64,
        event: PaginatorEvent,
    ) -> Result<(), PageCacheError> {
        if self.source.is_none() || !self.watcher.is_current(epoch) {
            debug!(
                target: LOG_TARGET,
                "dropping callback from detached paginator (epoch {epoch}, current {})",
                self.watcher.epoch()
            );
            return Ok(());
        }

        match event {
            PaginatorEvent::PaginationProgress { start, count } => {
                validate_range(start, count)?;
                self.apply_progress(start, count);
            }
            PaginatorEvent::PaginationCompleted => self.apply_pagination_completed(),
            PaginatorEvent::PagesChanged { start, count } => {
                if count == 0 {
                    return Err(PageCacheError::EmptyRange { start });
                }
                self.apply_pages_changed(start, count);
            }
            PaginatorEvent::GetPageCompleted(args) => self.apply_get_page_completed(args)?,
        }
        Ok(())
    }

    /// Number of cached pages.
    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    /// Cached size of `page`, or [`Size::ZERO`] if the page is not in the cache.
    pub fn page_size(&self, page: usize) -> Size {
        self.entries
            .get(page)
            .map_or(Size::ZERO, |entry| entry.page_size)
    }

    /// Whether `page` still has a placeholder size. Pages outside the cache count as dirty.
    pub fn is_page_dirty(&self, page: usize) -> bool {
        self.entries.get(page).is_none_or(|entry| entry.dirty)
    }

    /// Cached entry for `page`.
    pub fn entry(&self, page: usize) -> Option<&PageCacheEntry> {
        self.entries.get(page)
    }

    /// All cached entries, in page order.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = &PageCacheEntry> + '_ {
        self.entries.iter()
    }

    /// Whether two differently sized confirmed pages have been seen since attach.
    pub fn dynamic_page_sizes(&self) -> bool {
        self.dynamic_page_sizes
    }

    /// Whether the attached content flows right to left.
    pub fn is_content_right_to_left(&self) -> bool {
        self.is_content_right_to_left
    }

    /// Whether the paginator reported completion (and has not restarted since).
    pub fn is_pagination_completed(&self) -> bool {
        self.is_pagination_completed
    }

    /// Size currently given to dirty pages.
    pub fn default_page_size(&self) -> Size {
        self.default_page_size
    }

    /// Subscribe to cache events.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&PageCacheEvent) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Clear all subscribers.
    pub fn clear_subscribers(&mut self) {
        self.callbacks.clear();
    }

    /// Drain buffered events, oldest first.
    pub fn take_events(&mut self) -> Vec<PageCacheEvent> {
        std::mem::take(&mut self.events)
    }

    fn apply_progress(&mut self, start: usize, count: usize) {
        if start == 0 && self.is_pagination_completed {
            debug!(target: LOG_TARGET, "pagination restarted from page 0");
            self.is_pagination_completed = false;
            self.is_default_size_known = false;
            self.last_confirmed_size = None;
            self.dynamic_page_sizes = false;
        }

        let len = self.entries.len();
        let end = start + count;
        let mut changes = Vec::with_capacity(3);
        if start >= len {
            changes.push(self.add_range(end));
        } else if end <= len {
            changes.push(self.dirty_range(start, count));
        } else {
            changes.push(self.dirty_range(start, len - start));
            changes.push(self.add_range(end));
        }

        changes.extend(self.trim_to_source());
        self.fire_changes(changes);
        self.emit(PageCacheEvent::PaginationProgress { start, count });
    }

    fn apply_pagination_completed(&mut self) {
        self.is_pagination_completed = true;
        let changes: Vec<_> = self.trim_to_source().into_iter().collect();
        self.fire_changes(changes);
        self.emit(PageCacheEvent::PaginationCompleted);
    }

    fn apply_pages_changed(&mut self, start: usize, count: usize) {
        let len = self.entries.len();
        if start < len {
            let end = start.saturating_add(count).min(len);
            let change = self.dirty_range(start, end - start);
            self.fire_changes(vec![change]);
        }
        self.emit(PageCacheEvent::PagesChanged { start, count });
    }

    fn apply_get_page_completed(&mut self, args: GetPageCompleted) -> Result<(), PageCacheError> {
        if let Some(page) = &args.page
            && page.page_number() != args.page_number
        {
            return Err(PageCacheError::PageNumberMismatch {
                requested: args.page_number,
                page: page.page_number(),
            });
        }
        if args.page_number.checked_add(1).is_none() {
            return Err(PageCacheError::RangeOverflow {
                start: args.page_number,
                count: 1,
            });
        }

        match args.usable_page() {
            None => debug!(
                target: LOG_TARGET,
                "ignoring unusable fetch of page {} (cancelled: {}, error: {:?})",
                args.page_number,
                args.cancelled,
                args.error
            ),
            Some(page) if self.watcher.is_destroyed(page) => debug!(
                target: LOG_TARGET,
                "dropping fetch of page {}: page was destroyed before the callback ran",
                args.page_number
            ),
            Some(page) if page.size().is_empty() || !page.size().is_finite() => debug!(
                target: LOG_TARGET,
                "ignoring fetch of page {} with unusable size {:?}",
                args.page_number,
                page.size()
            ),
            Some(page) => {
                let size = page.size();
                let changes = self.confirm_page_size(args.page_number, size);
                self.fire_changes(changes);
            }
        }

        self.emit(PageCacheEvent::GetPageCompleted(args));
        Ok(())
    }

    fn confirm_page_size(&mut self, page_number: usize, size: Size) -> Vec<PageCacheChange> {
        let mut changes = Vec::new();
        if page_number >= self.entries.len() {
            changes.push(self.add_range(page_number + 1));
        }

        if !self.is_default_size_known {
            self.default_page_size = size;
            self.is_default_size_known = true;
            changes.extend(self.backfill_dirty_entries());
        }

        if let Some(previous) = self.last_confirmed_size
            && !previous.is_close(&size)
            && !self.dynamic_page_sizes
        {
            debug!(
                target: LOG_TARGET,
                "page {page_number} is {size:?}, previous page was {previous:?}: page sizes are dynamic"
            );
            self.dynamic_page_sizes = true;
        }
        self.last_confirmed_size = Some(size);

        let entry = &mut self.entries[page_number];
        if entry.dirty || !entry.page_size.is_close(&size) {
            entry.page_size = size;
            entry.dirty = false;
            changes.push(PageCacheChange::new(
                page_number,
                1,
                PageCacheChangeType::Update,
            ));
        }
        changes
    }

    /// Give every dirty entry the current default size; one `Update` per contiguous run of
    /// entries that actually changed.
    fn backfill_dirty_entries(&mut self) -> Vec<PageCacheChange> {
        let default = self.default_page_size;
        let mut changes = Vec::new();
        let mut run: Option<(usize, usize)> = None;

        for (index, entry) in self.entries.iter_mut().enumerate() {
            let changed = entry.dirty && !entry.page_size.is_close(&default);
            if changed {
                entry.page_size = default;
                run = match run {
                    Some((start, count)) if start + count == index => Some((start, count + 1)),
                    Some((start, count)) => {
                        changes.push(PageCacheChange::new(
                            start,
                            count,
                            PageCacheChangeType::Update,
                        ));
                        Some((index, 1))
                    }
                    None => Some((index, 1)),
                };
            }
        }

        if let Some((start, count)) = run {
            changes.push(PageCacheChange::new(
                start,
                count,
                PageCacheChangeType::Update,
            ));
        }
        changes
    }

    /// Append dirty default-sized entries until the cache holds `new_len` pages.
    fn add_range(&mut self, new_len: usize) -> PageCacheChange {
        let start = self.entries.len();
        let entry = PageCacheEntry {
            page_size: self.default_page_size,
            dirty: true,
        };
        self.entries.resize(new_len.max(start), entry);
        PageCacheChange::new(start, self.entries.len() - start, PageCacheChangeType::Add)
    }

    fn dirty_range(&mut self, start: usize, count: usize) -> PageCacheChange {
        let default = self.default_page_size;
        for entry in &mut self.entries[start..start + count] {
            entry.page_size = default;
            entry.dirty = true;
        }
        PageCacheChange::new(start, count, PageCacheChangeType::Update)
    }

    /// Drop entries past the source's authoritative page count.
    fn trim_to_source(&mut self) -> Option<PageCacheChange> {
        let page_count = self.source.as_ref()?.page_count();
        let len = self.entries.len();
        if page_count >= len {
            return None;
        }
        self.entries.truncate(page_count);
        Some(PageCacheChange::new(
            page_count,
            len - page_count,
            PageCacheChangeType::Remove,
        ))
    }

    fn fire_changes(&mut self, changes: Vec<PageCacheChange>) {
        if changes.is_empty() {
            return;
        }
        trace!(target: LOG_TARGET, "page cache changed: {changes:?}");
        self.emit(PageCacheEvent::PageCacheChanged(changes));
    }

    fn emit(&mut self, event: PageCacheEvent) {
        for callback in &mut self.callbacks {
            callback(&event);
        }
        self.events.push(event);
    }
}

fn validate_range(start: usize, count: usize) -> Result<(), PageCacheError> {
    if count == 0 {
        return Err(PageCacheError::EmptyRange { start });
    }
    if start.checked_add(count).is_none() {
        return Err(PageCacheError::RangeOverflow { start, count });
    }
    Ok(())
}
