use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessel_core::{Node, NoopFlushScheduler, Renderer, RootId, ViewId};
use tessel_testing::RecordingBridge;

const LIST_SIZES: &[usize] = &[100, 500, 1_000];
const CONTAINER: ViewId = ViewId(0);

fn row(key: usize, label: &str) -> Node {
    Node::element("Row")
        .key(&key)
        .child(Node::element("Text").prop("text", format!("{label} {key}")))
        .child(Node::element("Badge").prop("count", key as i64))
        .into()
}

fn list(keys: &[usize], highlighted: Option<usize>) -> Node {
    Node::element("List")
        .children(keys.iter().map(|key| {
            let label = if Some(*key) == highlighted { "Selected" } else { "Item" };
            row(*key, label)
        }))
        .into()
}

struct ListFixture {
    renderer: Renderer<RecordingBridge>,
    root: RootId,
    keys: Vec<usize>,
}

impl ListFixture {
    fn new(size: usize) -> Self {
        let renderer = Renderer::new(RecordingBridge::new(), Arc::new(NoopFlushScheduler));
        let keys: Vec<usize> = (0..size).collect();
        let root = renderer.render(CONTAINER, list(&keys, None)).expect("initial mount");
        Self { renderer, root, keys }
    }

    fn commit(&self, highlighted: Option<usize>) {
        let report = self
            .renderer
            .update_root(self.root, list(&self.keys, highlighted))
            .expect("update");
        black_box(report);
        // Batches pile up in the recorder otherwise.
        self.renderer
            .with_bridge_mut(RecordingBridge::clear_batches)
            .expect("bridge idle");
    }
}

fn bench_mount(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_mount");
    for &size in LIST_SIZES {
        group.bench_with_input(BenchmarkId::new("rows", size), &size, |b, &size| {
            b.iter(|| black_box(ListFixture::new(size)));
        });
    }
    group.finish();
}

fn bench_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_reverse");
    for &size in LIST_SIZES {
        group.bench_with_input(BenchmarkId::new("rows", size), &size, |b, &size| {
            let mut fixture = ListFixture::new(size);
            b.iter(|| {
                fixture.keys.reverse();
                fixture.commit(None);
            });
        });
    }
    group.finish();
}

fn bench_single_prop_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_single_update");
    for &size in LIST_SIZES {
        group.bench_with_input(BenchmarkId::new("rows", size), &size, |b, &size| {
            let fixture = ListFixture::new(size);
            let mut selected = 0;
            b.iter(|| {
                selected = (selected + 1) % size;
                fixture.commit(Some(selected));
            });
        });
    }
    group.finish();
}

fn bench_unchanged(c: &mut Criterion) {
    let fixture = ListFixture::new(1_000);
    fixture.commit(None);

    c.bench_function("reconcile_unchanged", |b| {
        b.iter(|| fixture.commit(None));
    });
}

criterion_group!(
    reconcile,
    bench_mount,
    bench_reverse,
    bench_single_prop_update,
    bench_unchanged
);
criterion_main!(reconcile);
