//! Performance benchmarks for the channel subsystem.

use channelkit::{
    collections, to_fields, Caller, ChannelId, ChannelService, DirectoryConfig, MemoryStore,
    NewChannel, OverlayField, StoreGateway, UserId,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Channel owned by u0 with `members` further followers, half with profiles.
fn populated_channel(
    rt: &Runtime,
    service: &ChannelService,
    store: &MemoryStore,
    members: usize,
) -> ChannelId {
    rt.block_on(async {
        let channel = service
            .lifecycle()
            .create_channel(NewChannel::new("Bench", "", true), &Caller::user("u0"))
            .await
            .unwrap();

        for i in 1..=members {
            let user = format!("u{}", i);
            if i % 2 == 0 {
                store
                    .create(
                        collections::USER_PROFILES,
                        to_fields(&json!({"display_name": format!("User number {}", i)})).unwrap(),
                        Some(user.as_str()),
                    )
                    .await
                    .unwrap();
            }
            service
                .membership()
                .follow(&channel, &Caller::user(user))
                .await
                .unwrap();
        }
        channel
    })
}

/// Benchmark member listing with identity decoration
fn bench_list_members(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_members");
    let rt = runtime();

    for members in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("members", members), &members, |b, &n| {
            let store = Arc::new(MemoryStore::new());
            let service = ChannelService::new(store.clone());
            let channel = populated_channel(&rt, &service, &store, n);

            b.iter(|| {
                black_box(rt.block_on(service.membership().list_members(&channel)).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark list_members with the identity cache disabled
fn bench_list_members_uncached(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_members_uncached");
    let rt = runtime();

    for concurrency in [1, 16, 64] {
        group.bench_with_input(
            BenchmarkId::new("concurrency", concurrency),
            &concurrency,
            |b, &cap| {
                let store = Arc::new(MemoryStore::new());
                let service = ChannelService::with_config(
                    store.clone(),
                    DirectoryConfig {
                        max_concurrent_lookups: cap,
                        identity_cache_size: 0,
                        ..Default::default()
                    },
                );
                let channel = populated_channel(&rt, &service, &store, 200);

                b.iter(|| {
                    black_box(rt.block_on(service.membership().list_members(&channel)).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark merged reads across many followed channels
fn bench_followed_channels(c: &mut Criterion) {
    let mut group = c.benchmark_group("followed_channels");
    let rt = runtime();

    for channels in [10, 100] {
        group.bench_with_input(BenchmarkId::new("channels", channels), &channels, |b, &n| {
            let store = Arc::new(MemoryStore::new());
            let service = ChannelService::new(store.clone());
            let fan = Caller::user("fan");

            rt.block_on(async {
                for i in 0..n {
                    let channel = service
                        .lifecycle()
                        .create_channel(
                            NewChannel::new(format!("Channel {}", i), "", true),
                            &Caller::user("owner"),
                        )
                        .await
                        .unwrap();
                    if i % 3 == 0 {
                        service
                            .lifecycle()
                            .update_overlay_field(&channel, OverlayField::Description, "edited")
                            .await
                            .unwrap();
                    }
                    service.membership().follow(&channel, &fan).await.unwrap();
                }
            });

            let user = UserId::from("fan");
            b.iter(|| {
                black_box(rt.block_on(service.membership().list_followed_channels(&user)).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark cascading delete of a channel with members and messages
fn bench_cascade_delete(c: &mut Criterion) {
    let rt = runtime();

    c.bench_function("cascade_delete_100_members", |b| {
        b.iter_batched(
            || {
                let store = Arc::new(MemoryStore::new());
                let service = ChannelService::new(store.clone());
                let channel = populated_channel(&rt, &service, &store, 100);
                rt.block_on(async {
                    for i in 0..50 {
                        service
                            .feed()
                            .post_message(&channel, &Caller::user("u1"), format!("message {}", i))
                            .await
                            .unwrap();
                    }
                });
                (service, channel)
            },
            |(service, channel)| {
                black_box(
                    rt.block_on(service.lifecycle().delete_channel_and_dependents(&channel))
                        .unwrap(),
                );
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_list_members,
    bench_list_members_uncached,
    bench_followed_channels,
    bench_cascade_delete,
);
criterion_main!(benches);
