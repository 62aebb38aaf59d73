//! Row layout over a page cache
//!
//! [`RowCache`] partitions the pages of a [`PageCache`] into display rows (e.g. a two-page book
//! spread) and keeps that partition consistent as pages are paginated, resized or removed in the
//! background, without a full relayout on every page change.
//!
//! Two layout algorithms are used:
//!
//! - **Fixed page sizes**: rows are `columns`-page slices starting at page 0.
//! - **Dynamic page sizes**: the row containing the pivot page is built first with exactly
//!   `columns` pages; its width becomes the width budget. Rows before it are packed backward
//!   (right to left) down to page 0, rows after it forward to the last page. Packing outward from
//!   the pivot keeps the row in the middle of the viewport from changing composition when the
//!   surrounding content repaginates.
//!
//! Every row holds at least one page, even when that page alone exceeds the width budget.

use crate::error::RowCacheError;
use crate::geometry::{Size, are_close, greater_than, round_to};
use crate::options::{
    FIND_OFFSET_PRECISION, MAXIMUM_PAGES_ACROSS, RowLayoutOptions, VISIBLE_DELTA,
    validate_columns, validate_scale, validate_spacing,
};
use crate::page_cache::{
    PageCache, PageCacheChange, PageCacheChangeType, PageCacheEvent, PageCacheId,
};
use log::{debug, trace};
use std::ops::Range;

const LOG_TARGET: &str = "docview.row_cache";

/// A row of pages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowInfo {
    /// First page on the row.
    pub first_page: usize,
    /// Number of pages on the row (at least one).
    pub page_count: usize,
    /// Sum of the member pages' scaled widths, max of their scaled heights.
    pub row_size: Size,
    /// Sum of the heights of every previous row.
    pub vertical_offset: f64,
}

impl RowInfo {
    fn new(first_page: usize) -> Self {
        Self {
            first_page,
            page_count: 0,
            row_size: Size::ZERO,
            vertical_offset: 0.0,
        }
    }

    /// Pages on this row.
    pub fn pages(&self) -> Range<usize> {
        self.first_page..self.first_page + self.page_count
    }

    /// Whether `page` is on this row.
    pub fn contains_page(&self, page: usize) -> bool {
        self.pages().contains(&page)
    }

    /// Bottom edge of the row.
    pub fn bottom(&self) -> f64 {
        self.vertical_offset + self.row_size.height
    }

    fn add_page(&mut self, size: Size) {
        self.page_count += 1;
        self.row_size.width += size.width;
        self.row_size.height = self.row_size.height.max(size.height);
    }

    fn clear_pages(&mut self) {
        self.page_count = 0;
        self.row_size = Size::ZERO;
    }
}

/// One record of a row cache diff: `count` rows starting at `start`.
///
/// Row diffs carry no type: viewers re-query the affected rows (and the visible range).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCacheChange {
    /// First affected row.
    pub start: usize,
    /// Number of affected rows.
    pub count: usize,
}

/// Notifications emitted by a [`RowCache`].
#[derive(Debug, Clone, PartialEq)]
pub enum RowCacheEvent {
    /// Rows changed.
    RowCacheChanged(Vec<RowCacheChange>),
    /// A full layout pass finished.
    RowLayoutCompleted {
        /// Row containing the pivot page.
        pivot_row: usize,
    },
}

/// Row cache change callback function type
pub type RowCacheCallback = Box<dyn FnMut(&RowCacheEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackDirection {
    Forward,
    Backward,
}

/// Row-partitioned layout of a [`PageCache`].
///
/// The row cache does not own its page cache. It is bound to one with
/// [`attach`](Self::attach), and every operation that reads page geometry takes that same cache
/// by reference; passing another one is an error.
pub struct RowCache {
    page_cache: Option<PageCacheId>,
    rows: Vec<RowInfo>,
    scale: f64,
    vertical_page_spacing: f64,
    horizontal_page_spacing: f64,
    extent_width: f64,
    extent_height: f64,
    /// Columns of the last completed (or requested) layout.
    layout_columns: usize,
    layout_pivot_page: usize,
    pivot_row_index: usize,
    /// Width budget for dynamic packing.
    pivot_row_width: f64,
    layout_is_dynamic: bool,
    is_layout_requested: bool,
    has_valid_layout: bool,
    callbacks: Vec<RowCacheCallback>,
    events: Vec<RowCacheEvent>,
}

impl Default for RowCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RowCache {
    /// Create a detached row cache with default options.
    pub fn new() -> Self {
        Self {
            page_cache: None,
            rows: Vec::new(),
            scale: 1.0,
            vertical_page_spacing: 0.0,
            horizontal_page_spacing: 0.0,
            extent_width: 0.0,
            extent_height: 0.0,
            layout_columns: 1,
            layout_pivot_page: 0,
            pivot_row_index: 0,
            pivot_row_width: 0.0,
            layout_is_dynamic: false,
            is_layout_requested: false,
            has_valid_layout: false,
            callbacks: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Bind to `pages`, dropping every row and any pending layout request.
    pub fn attach(&mut self, pages: &PageCache) {
        debug!(target: LOG_TARGET, "attached to page cache {:?}", pages.id());
        self.page_cache = Some(pages.id());
        self.clear_layout();
    }

    /// Unbind from the page cache, dropping every row.
    pub fn detach(&mut self) {
        self.page_cache = None;
        self.clear_layout();
    }

    /// Whether a page cache is attached.
    pub fn is_attached(&self) -> bool {
        self.page_cache.is_some()
    }

    /// Drop every row and any pending request, reporting the dropped rows.
    fn clear_layout(&mut self) {
        let dropped = self.rows.len();
        self.rows.clear();
        self.extent_width = 0.0;
        self.extent_height = 0.0;
        self.pivot_row_index = 0;
        self.pivot_row_width = 0.0;
        self.is_layout_requested = false;
        self.has_valid_layout = false;
        if dropped > 0 {
            self.emit(RowCacheEvent::RowCacheChanged(vec![RowCacheChange {
                start: 0,
                count: dropped,
            }]));
        }
    }

    /// Zoom factor.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Gutter below every page.
    pub fn vertical_page_spacing(&self) -> f64 {
        self.vertical_page_spacing
    }

    /// Gutter to the right of every page.
    pub fn horizontal_page_spacing(&self) -> f64 {
        self.horizontal_page_spacing
    }

    /// Set the zoom factor, re-sizing existing rows if it changed.
    pub fn set_scale(&mut self, pages: &PageCache, scale: f64) -> Result<(), RowCacheError> {
        let scale = validate_scale(scale)?;
        if self.scale == scale {
            return Ok(());
        }
        self.scale = scale;
        self.relayout_after_option_change(pages)
    }

    /// Set the vertical gutter (negative values clamp to zero), re-sizing existing rows if it
    /// changed.
    pub fn set_vertical_page_spacing(
        &mut self,
        pages: &PageCache,
        spacing: f64,
    ) -> Result<(), RowCacheError> {
        let spacing = validate_spacing(spacing)?;
        if self.vertical_page_spacing == spacing {
            return Ok(());
        }
        self.vertical_page_spacing = spacing;
        self.relayout_after_option_change(pages)
    }

    /// Set the horizontal gutter (negative values clamp to zero), re-sizing existing rows if it
    /// changed.
    pub fn set_horizontal_page_spacing(
        &mut self,
        pages: &PageCache,
        spacing: f64,
    ) -> Result<(), RowCacheError> {
        let spacing = validate_spacing(spacing)?;
        if self.horizontal_page_spacing == spacing {
            return Ok(());
        }
        self.horizontal_page_spacing = spacing;
        self.relayout_after_option_change(pages)
    }

    /// Apply scale and spacing from `options` with at most one relayout.
    ///
    /// `options.columns` is not applied here; it is an argument of
    /// [`recalc_rows`](Self::recalc_rows).
    pub fn apply_options(
        &mut self,
        pages: &PageCache,
        options: &RowLayoutOptions,
    ) -> Result<(), RowCacheError> {
        let scale = validate_scale(options.scale)?;
        let vertical = validate_spacing(options.vertical_page_spacing)?;
        let horizontal = validate_spacing(options.horizontal_page_spacing)?;
        if self.scale == scale
            && self.vertical_page_spacing == vertical
            && self.horizontal_page_spacing == horizontal
        {
            return Ok(());
        }
        self.scale = scale;
        self.vertical_page_spacing = vertical;
        self.horizontal_page_spacing = horizontal;
        self.relayout_after_option_change(pages)
    }

    fn relayout_after_option_change(&mut self, pages: &PageCache) -> Result<(), RowCacheError> {
        if self.page_cache.is_none() {
            return Ok(());
        }
        self.recalc_layout_for_scale_or_spacing(pages)
    }

    /// Re-size every row for the current scale and spacing.
    ///
    /// Row membership is unchanged; offsets and extents are recomputed and one bulk
    /// [`RowCacheEvent::RowCacheChanged`] is emitted.
    pub fn recalc_layout_for_scale_or_spacing(
        &mut self,
        pages: &PageCache,
    ) -> Result<(), RowCacheError> {
        self.check_attached(pages)?;

        self.extent_width = 0.0;
        self.extent_height = 0.0;
        for index in 0..self.rows.len() {
            let mut row = self.rows[index];
            self.rebuild_row(pages, &mut row);
            row.vertical_offset = self.extent_height;
            self.extent_width = self.extent_width.max(row.row_size.width);
            self.extent_height += row.row_size.height;
            self.rows[index] = row;
        }
        if let Some(pivot) = self.rows.get(self.pivot_row_index) {
            self.pivot_row_width = pivot.row_size.width;
        }

        if !self.rows.is_empty() {
            self.emit(RowCacheEvent::RowCacheChanged(vec![RowCacheChange {
                start: 0,
                count: self.rows.len(),
            }]));
        }
        Ok(())
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// All rows, top to bottom.
    pub fn rows(&self) -> &[RowInfo] {
        &self.rows
    }

    /// Max row width.
    pub fn extent_width(&self) -> f64 {
        self.extent_width
    }

    /// Sum of row heights.
    pub fn extent_height(&self) -> f64 {
        self.extent_height
    }

    /// Whether a layout pass completed since the last reset or deferral.
    pub fn has_valid_layout(&self) -> bool {
        self.has_valid_layout
    }

    /// Whether a layout was requested but deferred until more pages arrive.
    pub fn is_layout_requested(&self) -> bool {
        self.is_layout_requested
    }

    /// Columns of the last layout (clamped value if the layout was clamped).
    pub fn layout_columns(&self) -> usize {
        self.layout_columns
    }

    /// Pivot row of the last full layout.
    pub fn pivot_row_index(&self) -> usize {
        self.pivot_row_index
    }

    /// Number of pages covered by the rows.
    pub fn page_count(&self) -> usize {
        self.rows.last().map_or(0, |row| row.first_page + row.page_count)
    }

    /// Row at `index`.
    pub fn row(&self, index: usize) -> Result<&RowInfo, RowCacheError> {
        self.rows.get(index).ok_or(RowCacheError::RowOutOfRange {
            index,
            row_count: self.rows.len(),
        })
    }

    /// Row containing `page`.
    pub fn row_for_page(&self, page: usize) -> Result<&RowInfo, RowCacheError> {
        let index = self.row_index_for_page(page)?;
        Ok(&self.rows[index])
    }

    /// Index of the row containing `page`.
    pub fn row_index_for_page(&self, page: usize) -> Result<usize, RowCacheError> {
        if page >= self.page_count() {
            return Err(RowCacheError::PageOutOfRange { page });
        }
        // Rows are sorted by first page and cover the pages contiguously.
        Ok(self.rows.partition_point(|row| row.first_page + row.page_count <= page))
    }

    /// Index of the row shown at `offset`.
    ///
    /// Offsets are compared at [`FIND_OFFSET_PRECISION`] decimals to absorb scale rounding.
    /// When no more than [`VISIBLE_DELTA`] of the matching row remains below `offset`, the next
    /// row is returned instead. Zero-height rows only match their exact offset, and the bottom
    /// of the document maps to the last row.
    pub fn row_index_for_vertical_offset(&self, offset: f64) -> Result<usize, RowCacheError> {
        let rounded = round_to(offset, FIND_OFFSET_PRECISION);
        if offset.is_nan()
            || offset < 0.0
            || greater_than(rounded, round_to(self.extent_height, FIND_OFFSET_PRECISION))
        {
            return Err(RowCacheError::OffsetOutOfRange {
                offset,
                extent_height: self.extent_height,
            });
        }
        if self.rows.is_empty() {
            return Ok(0);
        }

        let last = self.rows.len() - 1;
        for (index, row) in self.rows.iter().enumerate() {
            let top = round_to(row.vertical_offset, FIND_OFFSET_PRECISION);
            let bottom = top + round_to(row.row_size.height, FIND_OFFSET_PRECISION);

            if are_close(top, bottom) {
                if are_close(rounded, top) {
                    return Ok(index);
                }
                continue;
            }

            if rounded >= top && rounded < bottom {
                if bottom - rounded > VISIBLE_DELTA || index == last {
                    return Ok(index);
                }
                return Ok(index + 1);
            }
        }
        Ok(last)
    }

    /// Rows visible between `start_offset` and `end_offset`, as `(first_row, row_count)`.
    ///
    /// Returns `(0, 0)` when there are no rows or `start_offset` is outside the document.
    pub fn visible_row_indices(
        &self,
        start_offset: f64,
        end_offset: f64,
    ) -> Result<(usize, usize), RowCacheError> {
        if end_offset.is_nan() || start_offset.is_nan() || end_offset < start_offset {
            return Err(RowCacheError::InvalidOffsetRange {
                start: start_offset,
                end: end_offset,
            });
        }
        if self.rows.is_empty()
            || start_offset < 0.0
            || greater_than(
                round_to(start_offset, FIND_OFFSET_PRECISION),
                round_to(self.extent_height, FIND_OFFSET_PRECISION),
            )
        {
            return Ok((0, 0));
        }

        let first = self.row_index_for_vertical_offset(start_offset)?;
        let end = round_to(end_offset, FIND_OFFSET_PRECISION);
        let mut count = 1;
        for row in &self.rows[first + 1..] {
            let top = round_to(row.vertical_offset, FIND_OFFSET_PRECISION);
            if end - top <= VISIBLE_DELTA {
                break;
            }
            count += 1;
        }
        Ok((first, count))
    }

    /// Lay out every page, anchoring the layout on `pivot_page` with `columns` pages on its row.
    ///
    /// When the cache holds fewer than `columns` pages and pagination is still running, the
    /// request is latched and retried on the next page cache change or on pagination completion.
    /// Once pagination has completed, `columns` is clamped to the available page count instead.
    pub fn recalc_rows(
        &mut self,
        pages: &PageCache,
        pivot_page: usize,
        columns: usize,
    ) -> Result<(), RowCacheError> {
        self.check_attached(pages)?;
        let mut columns = validate_columns(columns)?;
        let page_count = pages.page_count();
        if pivot_page > page_count {
            return Err(RowCacheError::InvalidPivotPage {
                pivot_page,
                page_count,
            });
        }

        if page_count < columns {
            if !pages.is_pagination_completed() {
                debug!(
                    target: LOG_TARGET,
                    "deferring layout: {columns} columns requested, {page_count} pages available"
                );
                self.clear_layout();
                self.is_layout_requested = true;
                self.layout_columns = columns;
                self.layout_pivot_page = pivot_page;
                return Ok(());
            }
            let clamped = page_count.clamp(1, columns);
            debug!(
                target: LOG_TARGET,
                "pagination completed with {page_count} pages: clamping {columns} columns to {clamped}"
            );
            columns = clamped;
        }

        self.rows.clear();
        self.extent_width = 0.0;
        self.extent_height = 0.0;
        self.layout_is_dynamic = pages.dynamic_page_sizes();

        let pivot_row = if page_count == 0 {
            0
        } else if self.layout_is_dynamic {
            self.layout_dynamic(pages, pivot_page, columns)
        } else {
            self.layout_fixed(pages, pivot_page, columns)
        };

        self.layout_columns = columns;
        self.layout_pivot_page = pivot_page;
        self.pivot_row_index = pivot_row;
        self.pivot_row_width = self.rows.get(pivot_row).map_or(0.0, |row| row.row_size.width);
        self.is_layout_requested = false;
        self.has_valid_layout = true;

        trace!(
            target: LOG_TARGET,
            "laid out {page_count} pages into {} rows (columns {columns}, pivot row {pivot_row}, dynamic {})",
            self.rows.len(),
            self.layout_is_dynamic
        );

        self.emit(RowCacheEvent::RowLayoutCompleted { pivot_row });
        self.emit(RowCacheEvent::RowCacheChanged(vec![RowCacheChange {
            start: 0,
            count: self.rows.len(),
        }]));
        Ok(())
    }

    fn layout_fixed(&mut self, pages: &PageCache, pivot_page: usize, columns: usize) -> usize {
        let page_count = pages.page_count();
        let mut next = 0;
        while next < page_count {
            let row = self.create_fixed_row(pages, next, columns, page_count);
            next += row.page_count;
            self.add_row(row);
        }
        pivot_page.min(page_count - 1) / columns
    }

    fn layout_dynamic(&mut self, pages: &PageCache, pivot_page: usize, columns: usize) -> usize {
        let page_count = pages.page_count();
        // The pivot row always gets exactly `columns` pages.
        let pivot_page = pivot_page.min(page_count - columns);
        let pivot_row = self.create_fixed_row(pages, pivot_page, columns, page_count);
        let budget = pivot_row.row_size.width;

        let mut previous = Vec::with_capacity(pivot_page / columns + 1);
        let mut current = pivot_page;
        while current > 0 {
            let row =
                self.create_dynamic_row(pages, current - 1, budget, PackDirection::Backward, 0);
            current = row.first_page;
            previous.push(row);
        }
        for row in previous.into_iter().rev() {
            self.add_row(row);
        }

        let pivot_index = self.rows.len();
        let mut current = pivot_page + pivot_row.page_count;
        self.add_row(pivot_row);

        while current < page_count {
            let row =
                self.create_dynamic_row(pages, current, budget, PackDirection::Forward, page_count);
            current += row.page_count;
            self.add_row(row);
        }
        pivot_index
    }

    fn create_fixed_row(
        &self,
        pages: &PageCache,
        first_page: usize,
        columns: usize,
        end: usize,
    ) -> RowInfo {
        let mut row = RowInfo::new(first_page);
        for page in first_page..(first_page + columns).min(end) {
            row.add_page(self.scaled_page_size(pages, page));
        }
        row
    }

    /// Pack pages from `start` in `direction` while the row stays within `budget`.
    ///
    /// Forward packing stops before `end`; backward packing stops at page 0.
    fn create_dynamic_row(
        &self,
        pages: &PageCache,
        start: usize,
        budget: f64,
        direction: PackDirection,
        end: usize,
    ) -> RowInfo {
        let mut row = RowInfo::new(start);
        row.add_page(self.scaled_page_size(pages, start));

        while row.page_count < MAXIMUM_PAGES_ACROSS {
            let next = match direction {
                PackDirection::Forward => {
                    let next = start + row.page_count;
                    if next >= end {
                        break;
                    }
                    next
                }
                PackDirection::Backward => match start.checked_sub(row.page_count) {
                    Some(next) => next,
                    None => break,
                },
            };
            let size = self.scaled_page_size(pages, next);
            if greater_than(row.row_size.width + size.width, budget) {
                break;
            }
            row.add_page(size);
        }

        if direction == PackDirection::Backward {
            row.first_page = start + 1 - row.page_count;
        }
        row
    }

    /// React to a page cache event.
    ///
    /// Diffs patch an existing layout; without one, diffs and pagination completion retry a
    /// deferred layout request.
    pub fn on_page_cache_event(
        &mut self,
        pages: &PageCache,
        event: &PageCacheEvent,
    ) -> Result<(), RowCacheError> {
        match event {
            PageCacheEvent::PageCacheChanged(changes) => self.on_page_cache_changed(pages, changes),
            PageCacheEvent::PaginationCompleted => {
                self.check_attached(pages)?;
                self.retry_requested_layout(pages)
            }
            _ => Ok(()),
        }
    }

    fn on_page_cache_changed(
        &mut self,
        pages: &PageCache,
        changes: &[PageCacheChange],
    ) -> Result<(), RowCacheError> {
        self.check_attached(pages)?;
        if !self.has_valid_layout {
            return self.retry_requested_layout(pages);
        }

        let mut row_changes = Vec::with_capacity(changes.len());
        for change in changes {
            match change.change_type {
                PageCacheChangeType::Add | PageCacheChangeType::Update => {
                    let covered = self.page_count();
                    if change.start >= covered {
                        row_changes.push(self.add_page_range(pages, change.start, change.count)?);
                    } else if change.end() <= covered {
                        row_changes.push(self.update_page_range(
                            pages,
                            change.start,
                            change.count,
                        )?);
                    } else {
                        row_changes.push(self.update_page_range(
                            pages,
                            change.start,
                            covered - change.start,
                        )?);
                        row_changes.push(self.add_page_range(
                            pages,
                            covered,
                            change.end() - covered,
                        )?);
                    }
                }
                PageCacheChangeType::Remove => {
                    if pages.page_count() < self.page_count() {
                        row_changes.push(self.trim_page_range(pages, pages.page_count())?);
                    }

                    let below_one_row = self.rows.len() <= 1
                        && self
                            .rows
                            .first()
                            .is_none_or(|row| row.page_count < self.layout_columns);
                    if below_one_row {
                        debug!(
                            target: LOG_TARGET,
                            "document shrank below one row; recomputing layout"
                        );
                        // A completed layout reports every row itself; a deferred one only
                        // reports the rows that survived the trim.
                        let trimmed = std::mem::take(&mut row_changes);
                        self.recalc_rows(pages, 0, self.layout_columns)?;
                        if !self.has_valid_layout {
                            row_changes = trimmed;
                            break;
                        }
                    }
                }
            }
        }

        if !row_changes.is_empty() {
            trace!(target: LOG_TARGET, "row cache changed: {row_changes:?}");
            self.emit(RowCacheEvent::RowCacheChanged(row_changes));
        }
        Ok(())
    }

    fn retry_requested_layout(&mut self, pages: &PageCache) -> Result<(), RowCacheError> {
        if self.has_valid_layout || !self.is_layout_requested {
            return Ok(());
        }
        let pivot_page = self.layout_pivot_page.min(pages.page_count());
        self.recalc_rows(pages, pivot_page, self.layout_columns)
    }

    /// Lay out pages appended past the last row.
    ///
    /// The last row is filled first (up to the layout's columns, or the pivot row's width for
    /// dynamic layouts); remaining pages spill into new rows packed the same way.
    pub fn add_page_range(
        &mut self,
        pages: &PageCache,
        start: usize,
        count: usize,
    ) -> Result<RowCacheChange, RowCacheError> {
        self.check_attached(pages)?;
        if !self.has_valid_layout {
            return Err(RowCacheError::NoLayout);
        }
        let covered = self.page_count();
        let end = start.checked_add(count);
        let end = match end {
            Some(end) if count > 0 && start >= covered => end,
            _ => return Err(RowCacheError::InvalidPageRange { start, count }),
        };

        let mut next = covered;
        let mut first_row = self.rows.len();

        if let Some(index) = self.rows.len().checked_sub(1) {
            let mut row = self.rows[index];
            while next < end {
                let size = self.scaled_page_size(pages, next);
                if !self.row_accepts(&row, size) {
                    break;
                }
                row.add_page(size);
                next += 1;
            }
            if next > covered {
                self.rows[index] = row;
                self.extent_height = row.bottom();
                self.extent_width = self.extent_width.max(row.row_size.width);
                first_row = index;
            }
        }

        while next < end {
            let row = if self.layout_is_dynamic {
                self.create_dynamic_row(
                    pages,
                    next,
                    self.pivot_row_width,
                    PackDirection::Forward,
                    end,
                )
            } else {
                self.create_fixed_row(pages, next, self.layout_columns, end)
            };
            next += row.page_count;
            self.add_row(row);
        }

        Ok(RowCacheChange {
            start: first_row,
            count: self.rows.len() - first_row,
        })
    }

    /// Re-size the rows holding `[start, start + count)` without changing their membership.
    pub fn update_page_range(
        &mut self,
        pages: &PageCache,
        start: usize,
        count: usize,
    ) -> Result<RowCacheChange, RowCacheError> {
        self.check_attached(pages)?;
        if !self.has_valid_layout {
            return Err(RowCacheError::NoLayout);
        }
        let end = match start.checked_add(count) {
            Some(end) if count > 0 && end <= self.page_count() => end,
            _ => return Err(RowCacheError::InvalidPageRange { start, count }),
        };

        let first_row = self.row_index_for_page(start)?;
        let last_row = self.row_index_for_page(end - 1)?;
        let mut height_changed = false;

        for index in first_row..=last_row {
            let mut row = self.rows[index];
            let old_size = row.row_size;
            self.rebuild_row(pages, &mut row);
            self.rows[index] = row;

            if row.row_size.height != old_size.height {
                height_changed = true;
            }
            if row.row_size.width > self.extent_width {
                self.extent_width = row.row_size.width;
            } else if row.row_size.width < old_size.width
                && are_close(old_size.width, self.extent_width)
            {
                self.extent_width = self.max_row_width();
            }
            if index == self.pivot_row_index {
                self.pivot_row_width = row.row_size.width;
            }
        }

        if height_changed {
            self.restack_rows_from(first_row);
        }

        Ok(RowCacheChange {
            start: first_row,
            count: last_row - first_row + 1,
        })
    }

    /// Drop every page from `start_page` on.
    ///
    /// The row containing `start_page` keeps its surviving prefix (or is dropped when
    /// `start_page` is its first page); every later row is dropped.
    pub fn trim_page_range(
        &mut self,
        pages: &PageCache,
        start_page: usize,
    ) -> Result<RowCacheChange, RowCacheError> {
        self.check_attached(pages)?;
        if !self.has_valid_layout {
            return Err(RowCacheError::NoLayout);
        }
        let index = self.row_index_for_page(start_page)?;
        let old_len = self.rows.len();

        let mut row = self.rows[index];
        let keep = start_page - row.first_page;
        let first_dropped = if keep > 0 {
            row.page_count = keep;
            self.rebuild_row(pages, &mut row);
            self.rows[index] = row;
            index + 1
        } else {
            index
        };
        self.rows.truncate(first_dropped);

        self.extent_height = self.rows.last().map_or(0.0, RowInfo::bottom);
        self.extent_width = self.max_row_width();

        Ok(RowCacheChange {
            start: index,
            count: old_len - index,
        })
    }

    /// Subscribe to row cache events.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&RowCacheEvent) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Clear all subscribers.
    pub fn clear_subscribers(&mut self) {
        self.callbacks.clear();
    }

    /// Drain buffered events, oldest first.
    pub fn take_events(&mut self) -> Vec<RowCacheEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: RowCacheEvent) {
        for callback in &mut self.callbacks {
            callback(&event);
        }
        self.events.push(event);
    }

    fn check_attached(&self, pages: &PageCache) -> Result<(), RowCacheError> {
        match self.page_cache {
            None => Err(RowCacheError::NotAttached),
            Some(id) if id != pages.id() => Err(RowCacheError::PageCacheMismatch),
            Some(_) => Ok(()),
        }
    }

    fn scaled_page_size(&self, pages: &PageCache, page: usize) -> Size {
        let size = pages.page_size(page);
        Size::new(
            size.width * self.scale + self.horizontal_page_spacing,
            size.height * self.scale + self.vertical_page_spacing,
        )
    }

    /// Whether `row` can take one more page of `size` under the current layout's budget.
    fn row_accepts(&self, row: &RowInfo, size: Size) -> bool {
        if row.page_count >= MAXIMUM_PAGES_ACROSS {
            return false;
        }
        if self.layout_is_dynamic {
            !greater_than(row.row_size.width + size.width, self.pivot_row_width)
        } else {
            row.page_count < self.layout_columns
        }
    }

    /// Re-sum `row` from its current pages.
    fn rebuild_row(&self, pages: &PageCache, row: &mut RowInfo) {
        let members = row.pages();
        row.clear_pages();
        for page in members {
            row.add_page(self.scaled_page_size(pages, page));
        }
    }

    fn add_row(&mut self, mut row: RowInfo) {
        row.vertical_offset = self.extent_height;
        self.extent_width = self.extent_width.max(row.row_size.width);
        self.extent_height += row.row_size.height;
        self.rows.push(row);
    }

    /// Recompute offsets of `rows[start..]` and the extent height.
    fn restack_rows_from(&mut self, start: usize) {
        let mut offset = self.rows[start].vertical_offset;
        for row in &mut self.rows[start..] {
            row.vertical_offset = offset;
            offset += row.row_size.height;
        }
        self.extent_height = offset;
    }

    fn max_row_width(&self) -> f64 {
        self.rows
            .iter()
            .map(|row| row.row_size.width)
            .fold(0.0, f64::max)
    }
}
