#![allow(dead_code)]

use docview_core::{FlowDirection, Paginator, Size};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const LETTER: Size = Size::new(816.0, 1056.0);

/// A paginator whose page count and completion flag are driven by the test.
#[derive(Clone)]
pub struct FakePaginator {
    page_count: Arc<AtomicUsize>,
    valid: Arc<AtomicBool>,
    hint: Size,
    direction: Option<FlowDirection>,
}

impl FakePaginator {
    pub fn new(hint: Size) -> Self {
        Self {
            page_count: Arc::new(AtomicUsize::new(0)),
            valid: Arc::new(AtomicBool::new(false)),
            hint,
            direction: None,
        }
    }

    /// A finished document of `page_count` pages.
    pub fn finished(page_count: usize, hint: Size) -> Self {
        let paginator = Self::new(hint);
        paginator.set_page_count(page_count);
        paginator.complete();
        paginator
    }

    pub fn right_to_left(mut self) -> Self {
        self.direction = Some(FlowDirection::RightToLeft);
        self
    }

    pub fn set_page_count(&self, page_count: usize) {
        self.page_count.store(page_count, Ordering::Release);
    }

    pub fn complete(&self) {
        self.valid.store(true, Ordering::Release);
    }

    pub fn boxed(&self) -> Box<dyn Paginator> {
        Box::new(self.clone())
    }
}

impl Paginator for FakePaginator {
    fn page_count(&self) -> usize {
        self.page_count.load(Ordering::Acquire)
    }

    fn is_page_count_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn page_size(&self) -> Size {
        self.hint
    }

    fn flow_direction(&self) -> Option<FlowDirection> {
        self.direction
    }
}

/// `(first_page, page_count)` of every row.
pub fn membership(rows: &docview_core::RowCache) -> Vec<(usize, usize)> {
    rows.rows()
        .iter()
        .map(|row| (row.first_page, row.page_count))
        .collect()
}

/// Structural invariants every row layout must satisfy.
pub fn assert_row_invariants(pages: &docview_core::PageCache, rows: &docview_core::RowCache) {
    let mut next_page = 0;
    let mut offset = 0.0;
    let mut width: f64 = 0.0;
    for (index, row) in rows.rows().iter().enumerate() {
        assert_eq!(row.first_page, next_page, "row {index} is not contiguous");
        assert!(row.page_count >= 1, "row {index} is empty");
        assert!(
            row.page_count <= docview_core::MAXIMUM_PAGES_ACROSS,
            "row {index} is too wide"
        );
        assert!(
            docview_core::are_close(row.vertical_offset, offset),
            "row {index} offset {} != {offset}",
            row.vertical_offset
        );
        next_page += row.page_count;
        offset += row.row_size.height;
        width = width.max(row.row_size.width);
    }
    if rows.has_valid_layout() {
        assert_eq!(next_page, pages.page_count(), "rows do not cover every page");
    }
    assert!(docview_core::are_close(rows.extent_height(), offset));
    assert!(docview_core::are_close(rows.extent_width(), width));
}
