use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use docview_core::{
    DocumentPage, GetPageCompleted, PageCache, Paginator, PaginatorEvent, RowCache, Size,
};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Clone)]
struct BenchPaginator(Rc<Cell<usize>>);

impl Paginator for BenchPaginator {
    fn page_count(&self) -> usize {
        self.0.get()
    }

    fn is_page_count_valid(&self) -> bool {
        false
    }

    fn page_size(&self) -> Size {
        Size::new(816.0, 1056.0)
    }
}

/// A page cache of `page_count` pages whose widths vary, so rows are packed dynamically.
fn dynamic_document(page_count: usize) -> PageCache {
    let count = Rc::new(Cell::new(page_count));
    let mut pages = PageCache::new();
    let epoch = pages.attach(Some(Box::new(BenchPaginator(count))));
    for page in 0..page_count {
        let width = 600.0 + (page % 7) as f64 * 60.0;
        let event = PaginatorEvent::GetPageCompleted(GetPageCompleted::success(
            DocumentPage::new(page, Size::new(width, 1056.0), epoch),
        ));
        pages.handle_event(epoch, event).unwrap();
    }
    pages.take_events();
    pages
}

fn bench_full_relayout(c: &mut Criterion) {
    let pages = dynamic_document(10_000);
    let mut rows = RowCache::new();
    rows.attach(&pages);
    c.bench_function("full_relayout/10k_pages_dynamic", |b| {
        b.iter(|| {
            rows.recalc_rows(&pages, black_box(5_000), 2).unwrap();
            rows.take_events();
            black_box(rows.row_count());
        })
    });
}

fn bench_incremental_append(c: &mut Criterion) {
    c.bench_function("incremental_append/1k_pages", |b| {
        b.iter_batched(
            || {
                let count = Rc::new(Cell::new(0));
                let mut pages = PageCache::new();
                let epoch = pages.attach(Some(Box::new(BenchPaginator(count.clone()))));
                let mut rows = RowCache::new();
                rows.attach(&pages);
                rows.recalc_rows(&pages, 0, 1).unwrap();
                (count, pages, rows, epoch)
            },
            |(count, mut pages, mut rows, epoch)| {
                for start in 0..1_000 {
                    count.set(start + 1);
                    pages
                        .handle_event(epoch, PaginatorEvent::PaginationProgress { start, count: 1 })
                        .unwrap();
                    for event in pages.take_events() {
                        rows.on_page_cache_event(&pages, &event).unwrap();
                    }
                }
                black_box(rows.row_count());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_visible_rows(c: &mut Criterion) {
    let pages = dynamic_document(10_000);
    let mut rows = RowCache::new();
    rows.attach(&pages);
    rows.recalc_rows(&pages, 0, 2).unwrap();
    let extent = rows.extent_height();
    c.bench_function("visible_rows/10k_pages", |b| {
        b.iter(|| {
            let mut offset = 0.0;
            while offset < extent {
                black_box(rows.visible_row_indices(offset, offset + 900.0).unwrap());
                offset += extent / 64.0;
            }
        })
    });
}

criterion_group!(
    benches,
    bench_full_relayout,
    bench_incremental_append,
    bench_visible_rows
);
criterion_main!(benches);
