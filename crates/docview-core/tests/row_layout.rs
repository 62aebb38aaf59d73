mod common;

use common::{FakePaginator, LETTER, assert_row_invariants, membership};
use docview_core::{
    DocumentLayout, DocumentPage, GetPageCompleted, PageCache, PageCacheEvent, PaginatorEvent,
    RowCache, RowCacheChange, RowCacheError, RowCacheEvent, RowLayoutOptions, Size,
};
use pretty_assertions::assert_eq;

/// Route every buffered page cache event to the row cache, as the layout queue does.
fn route(pages: &mut PageCache, rows: &mut RowCache) {
    for event in pages.take_events() {
        rows.on_page_cache_event(pages, &event).unwrap();
    }
}

fn fetch(pages: &mut PageCache, rows: &mut RowCache, page: usize, size: Size) {
    let epoch = pages.source_epoch();
    pages
        .handle_event(
            epoch,
            PaginatorEvent::GetPageCompleted(GetPageCompleted::success(DocumentPage::new(
                page, size, epoch,
            ))),
        )
        .unwrap();
    route(pages, rows);
}

#[test]
fn test_five_default_pages_in_two_columns() {
    let mut pages = PageCache::new();
    pages.attach(Some(FakePaginator::finished(5, LETTER).boxed()));
    let mut rows = RowCache::new();
    rows.attach(&pages);
    rows.recalc_rows(&pages, 0, 2).unwrap();

    assert_eq!(membership(&rows), vec![(0, 2), (2, 2), (4, 1)]);
    assert_eq!(rows.extent_height(), 3.0 * 1056.0);
    assert_eq!(rows.extent_width(), 2.0 * 816.0);
    assert_eq!(
        rows.take_events(),
        vec![
            RowCacheEvent::RowLayoutCompleted { pivot_row: 0 },
            RowCacheEvent::RowCacheChanged(vec![RowCacheChange { start: 0, count: 3 }]),
        ]
    );
}

#[test]
fn test_trim_from_page_three() {
    let mut pages = PageCache::new();
    pages.attach(Some(FakePaginator::finished(5, LETTER).boxed()));
    let mut rows = RowCache::new();
    rows.attach(&pages);
    rows.recalc_rows(&pages, 0, 2).unwrap();

    rows.trim_page_range(&pages, 3).unwrap();
    assert_eq!(membership(&rows), vec![(0, 2), (2, 1)]);
    assert_eq!(rows.extent_height(), 2.0 * 1056.0);
}

#[test]
fn test_streamed_pages_match_full_relayout() {
    let paginator = FakePaginator::new(LETTER);
    let mut pages = PageCache::new();
    let epoch = pages.attach(Some(paginator.boxed()));
    let mut rows = RowCache::new();
    rows.attach(&pages);

    paginator.set_page_count(3);
    pages
        .handle_event(epoch, PaginatorEvent::PaginationProgress { start: 0, count: 3 })
        .unwrap();
    route(&mut pages, &mut rows);
    rows.recalc_rows(&pages, 0, 3).unwrap();

    for start in 3..10 {
        paginator.set_page_count(start + 1);
        pages
            .handle_event(epoch, PaginatorEvent::PaginationProgress { start, count: 1 })
            .unwrap();
        route(&mut pages, &mut rows);
        assert_row_invariants(&pages, &rows);
    }
    let streamed = rows.rows().to_vec();

    rows.recalc_rows(&pages, 0, 3).unwrap();
    assert_eq!(rows.rows(), &streamed[..]);
    assert_eq!(membership(&rows), vec![(0, 3), (3, 3), (6, 3), (9, 1)]);
}

#[test]
fn test_taller_page_shifts_later_rows() {
    let mut pages = PageCache::new();
    pages.attach(Some(FakePaginator::finished(6, LETTER).boxed()));
    let mut rows = RowCache::new();
    rows.attach(&pages);
    // Confirm the default first so later fetches compare against it.
    fetch(&mut pages, &mut rows, 0, LETTER);
    rows.recalc_rows(&pages, 0, 2).unwrap();
    rows.take_events();

    fetch(&mut pages, &mut rows, 3, Size::new(816.0, 1200.0));

    assert_eq!(membership(&rows), vec![(0, 2), (2, 2), (4, 2)]);
    assert_eq!(rows.row(1).unwrap().row_size.height, 1200.0);
    assert_eq!(rows.row(2).unwrap().vertical_offset, 1056.0 + 1200.0);
    assert_eq!(rows.extent_height(), 2.0 * 1056.0 + 1200.0);
    assert_eq!(
        rows.take_events(),
        vec![RowCacheEvent::RowCacheChanged(vec![RowCacheChange {
            start: 1,
            count: 1
        }])]
    );
    assert_row_invariants(&pages, &rows);
}

#[test]
fn test_narrower_widest_row_rescans_extent_width() {
    let mut pages = PageCache::new();
    pages.attach(Some(FakePaginator::finished(3, LETTER).boxed()));
    let mut rows = RowCache::new();
    rows.attach(&pages);
    fetch(&mut pages, &mut rows, 0, LETTER);
    rows.recalc_rows(&pages, 0, 1).unwrap();
    fetch(&mut pages, &mut rows, 1, Size::new(900.0, 1056.0));
    assert_eq!(rows.extent_width(), 900.0);

    // Page 1 is re-measured narrower; the extent falls back to the widest remaining row.
    let epoch = pages.source_epoch();
    pages
        .handle_event(epoch, PaginatorEvent::PagesChanged { start: 1, count: 1 })
        .unwrap();
    route(&mut pages, &mut rows);
    fetch(&mut pages, &mut rows, 1, Size::new(500.0, 1056.0));
    assert_eq!(rows.extent_width(), 816.0);
    assert_row_invariants(&pages, &rows);
}

#[test]
fn test_shrinking_document_trims_rows() {
    let paginator = FakePaginator::new(LETTER);
    let mut pages = PageCache::new();
    let epoch = pages.attach(Some(paginator.boxed()));
    let mut rows = RowCache::new();
    rows.attach(&pages);

    paginator.set_page_count(7);
    pages
        .handle_event(epoch, PaginatorEvent::PaginationProgress { start: 0, count: 7 })
        .unwrap();
    route(&mut pages, &mut rows);
    rows.recalc_rows(&pages, 0, 2).unwrap();
    rows.take_events();

    paginator.set_page_count(3);
    paginator.complete();
    pages
        .handle_event(epoch, PaginatorEvent::PaginationCompleted)
        .unwrap();
    route(&mut pages, &mut rows);

    assert_eq!(membership(&rows), vec![(0, 2), (2, 1)]);
    assert_eq!(
        rows.take_events(),
        vec![RowCacheEvent::RowCacheChanged(vec![RowCacheChange {
            start: 1,
            count: 3
        }])]
    );
    assert_row_invariants(&pages, &rows);
}

#[test]
fn test_shrinking_below_one_row_relayouts() {
    let paginator = FakePaginator::new(LETTER);
    let mut pages = PageCache::new();
    let epoch = pages.attach(Some(paginator.boxed()));
    let mut rows = RowCache::new();
    rows.attach(&pages);

    paginator.set_page_count(4);
    pages
        .handle_event(epoch, PaginatorEvent::PaginationProgress { start: 0, count: 4 })
        .unwrap();
    route(&mut pages, &mut rows);
    rows.recalc_rows(&pages, 0, 2).unwrap();
    rows.take_events();

    // Pagination restarts and only one page survives so far.
    paginator.set_page_count(1);
    pages
        .handle_event(epoch, PaginatorEvent::PaginationProgress { start: 0, count: 1 })
        .unwrap();
    route(&mut pages, &mut rows);

    assert!(!rows.has_valid_layout());
    assert!(rows.is_layout_requested());
    assert_eq!(rows.row_count(), 0);

    // Both rows that existed before the trim are reported gone.
    let reported_end = rows
        .take_events()
        .iter()
        .flat_map(|event| match event {
            RowCacheEvent::RowCacheChanged(changes) => changes.clone(),
            RowCacheEvent::RowLayoutCompleted { .. } => Vec::new(),
        })
        .map(|change| change.start + change.count)
        .max();
    assert_eq!(reported_end, Some(2));

    paginator.set_page_count(2);
    pages
        .handle_event(epoch, PaginatorEvent::PaginationProgress { start: 1, count: 1 })
        .unwrap();
    route(&mut pages, &mut rows);

    assert!(rows.has_valid_layout());
    assert_eq!(membership(&rows), vec![(0, 2)]);
}

#[test]
fn test_deferred_layout_clamps_on_completion() {
    let paginator = FakePaginator::new(LETTER);
    let mut pages = PageCache::new();
    let epoch = pages.attach(Some(paginator.boxed()));
    let mut rows = RowCache::new();
    rows.attach(&pages);
    rows.recalc_rows(&pages, 0, 3).unwrap();

    paginator.set_page_count(2);
    pages
        .handle_event(epoch, PaginatorEvent::PaginationProgress { start: 0, count: 2 })
        .unwrap();
    route(&mut pages, &mut rows);
    assert!(rows.is_layout_requested());

    paginator.complete();
    pages
        .handle_event(epoch, PaginatorEvent::PaginationCompleted)
        .unwrap();
    route(&mut pages, &mut rows);

    assert!(rows.has_valid_layout());
    assert_eq!(rows.layout_columns(), 2);
    assert_eq!(membership(&rows), vec![(0, 2)]);
}

#[test]
fn test_dynamic_appends_respect_pivot_width() {
    let mut pages = PageCache::new();
    let paginator = FakePaginator::new(LETTER);
    let epoch = pages.attach(Some(paginator.boxed()));
    let mut rows = RowCache::new();
    rows.attach(&pages);

    let narrow = Size::new(400.0, 1056.0);
    paginator.set_page_count(2);
    pages
        .handle_event(epoch, PaginatorEvent::PaginationProgress { start: 0, count: 2 })
        .unwrap();
    route(&mut pages, &mut rows);
    fetch(&mut pages, &mut rows, 0, LETTER);
    fetch(&mut pages, &mut rows, 1, LETTER);
    // Page 2 is narrow: sizes become dynamic before the layout runs.
    fetch(&mut pages, &mut rows, 2, narrow);
    assert!(pages.dynamic_page_sizes());
    rows.recalc_rows(&pages, 0, 2).unwrap();
    assert_eq!(membership(&rows), vec![(0, 2), (2, 1)]);

    // Budget is 1632: four narrow pages fit next to each other.
    for page in 3..7 {
        fetch(&mut pages, &mut rows, page, narrow);
    }
    assert_eq!(membership(&rows), vec![(0, 2), (2, 4), (6, 1)]);
    assert_row_invariants(&pages, &rows);
}

#[test]
fn test_queries_outside_layout_are_errors() {
    let mut pages = PageCache::new();
    pages.attach(Some(FakePaginator::finished(2, LETTER).boxed()));
    let mut rows = RowCache::new();
    rows.attach(&pages);
    rows.recalc_rows(&pages, 0, 1).unwrap();

    assert_eq!(
        rows.row_index_for_page(2),
        Err(RowCacheError::PageOutOfRange { page: 2 })
    );
    assert!(rows.row_index_for_vertical_offset(f64::NAN).is_err());
    assert!(rows.visible_row_indices(10.0, 0.0).is_err());
    assert_eq!(rows.visible_row_indices(1e9, 2e9), Ok((0, 0)));
    assert_eq!(
        rows.add_page_range(&pages, 0, 1),
        Err(RowCacheError::InvalidPageRange { start: 0, count: 1 })
    );
    assert_eq!(
        rows.update_page_range(&pages, 1, 5),
        Err(RowCacheError::InvalidPageRange { start: 1, count: 5 })
    );
}

#[test]
fn test_layout_reattach_rerequests_rows() {
    let mut layout = DocumentLayout::new(RowLayoutOptions::default().with_columns(2)).unwrap();
    layout.attach(FakePaginator::finished(4, LETTER).boxed());
    layout.recalc_rows(0).unwrap();
    assert_eq!(layout.rows().row_count(), 2);

    let paginator = FakePaginator::new(LETTER);
    let link = layout.attach(paginator.boxed());
    assert!(layout.rows().is_layout_requested());
    assert_eq!(layout.rows().row_count(), 0);

    paginator.set_page_count(3);
    link.pagination_progress(0, 3).unwrap();
    layout.process_pending().unwrap();
    assert_eq!(membership(layout.rows()), vec![(0, 2), (2, 1)]);

    let page_events = layout.take_page_events();
    assert!(
        page_events
            .iter()
            .any(|event| matches!(event, PageCacheEvent::PaginationProgress { start: 0, count: 3 }))
    );
}
