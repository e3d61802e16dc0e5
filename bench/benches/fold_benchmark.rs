use bukusync::models::{Bookmark, BookmarkId, OwnerId, ServerId};
use bukusync::store::ChangeEvent;
use bukusync::sync::{fold, Collection};
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn row(i: u64) -> Bookmark {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(i as i64);
    Bookmark {
        id: BookmarkId::Committed(ServerId::new(format!("srv-{}", i))),
        owner: OwnerId::new("alice"),
        url: format!("https://example.com/{}", i),
        title: format!("Title {}", i),
        favicon_url: None,
        created_at: at,
        updated_at: at,
    }
}

fn inserts(n: u64) -> Vec<ChangeEvent> {
    (0..n).map(|i| ChangeEvent::Insert(row(i))).collect()
}

fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold");

    group.bench_function("insert 500", |b| {
        let events = inserts(500);
        b.iter(|| {
            events
                .iter()
                .fold(Collection::new(), |acc, e| fold(acc, black_box(e)))
        });
    });

    group.bench_function("duplicate delivery of 500", |b| {
        let events = inserts(500);
        b.iter_with_setup(
            || events.iter().fold(Collection::new(), |acc, e| fold(acc, e)),
            |mut collection| {
                // Every event is already folded
                for e in &events {
                    collection.apply(black_box(e));
                }
                collection
            },
        );
    });

    group.bench_function("update 500", |b| {
        let events = inserts(500);
        let updates: Vec<ChangeEvent> = (0..500)
            .map(|i| {
                let mut updated = row(i);
                updated.title = format!("Renamed {}", i);
                updated.updated_at += Duration::seconds(60);
                ChangeEvent::Update(updated)
            })
            .collect();
        b.iter_with_setup(
            || events.iter().fold(Collection::new(), |acc, e| fold(acc, e)),
            |mut collection| {
                for e in &updates {
                    collection.apply(black_box(e));
                }
                collection
            },
        );
    });

    group.finish();
}

fn bench_rebase(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebase");

    group.bench_function("1000 rows with 50 replayed events", |b| {
        let rows: Vec<Bookmark> = (0..1000).map(row).collect();
        let current = inserts(1000)
            .iter()
            .fold(Collection::new(), |acc, e| fold(acc, e));
        let replay: Vec<ChangeEvent> = (1000..1025)
            .map(|i| ChangeEvent::Insert(row(i)))
            .chain((0..25).map(|i| ChangeEvent::Delete(ServerId::new(format!("srv-{}", i)))))
            .collect();

        b.iter(|| current.rebase(black_box(rows.clone()), black_box(&replay)));
    });

    group.finish();
}

criterion_group!(benches, bench_fold, bench_rebase);
criterion_main!(benches);
