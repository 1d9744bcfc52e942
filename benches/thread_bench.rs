//! Benchmarks for thread assembly and layout on large posts.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use courtside::{
    models::{CollapseState, Comment, LikeState, SortMode},
    services::{build_forest, render_forest, sort_forest},
};
use std::collections::HashMap;

/// Roughly a busy match thread: every fourth comment starts a new thread and
/// the rest reply to a recent comment.
fn thread(size: usize) -> (Vec<Comment>, HashMap<String, LikeState>) {
    let start = Utc.with_ymd_and_hms(2024, 7, 14, 19, 0, 0).unwrap();
    let mut comments = Vec::with_capacity(size);
    let mut likes = HashMap::with_capacity(size);
    for i in 0..size {
        let parent = (i % 4 != 0).then(|| format!("c{}", i.saturating_sub(1 + i % 3)));
        let at = start + Duration::seconds(i as i64 * 7);
        let id = format!("c{}", i);
        comments.push(Comment {
            id: id.clone(),
            post_id: "final".to_string(),
            author_id: format!("fan{}", i % 50),
            parent_comment_id: parent,
            content: "What a match".to_string(),
            is_edited: false,
            is_deleted: i % 17 == 0,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        });
        likes.insert(
            id,
            LikeState {
                count: (i % 13) as i64,
                user_has_liked: i % 5 == 0,
            },
        );
    }
    (comments, likes)
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_forest");
    for size in [100, 1_000, 10_000] {
        let (comments, likes) = thread(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| build_forest(black_box(&comments), black_box(&likes)))
        });
    }
    group.finish();
}

fn bench_sort_and_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_and_render");
    let (comments, likes) = thread(1_000);
    let forest = build_forest(&comments, &likes);
    let collapsed = CollapseState::new();

    for mode in [SortMode::Recent, SortMode::Popular] {
        group.bench_function(format!("sort_{:?}", mode).to_lowercase(), |b| {
            b.iter(|| sort_forest(black_box(&forest), mode))
        });
    }

    let sorted = sort_forest(&forest, SortMode::Popular);
    group.bench_function("render_depth_3", |b| {
        b.iter(|| render_forest(black_box(&sorted), 3, &collapsed))
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_sort_and_render);
criterion_main!(benches);
