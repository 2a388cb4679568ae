//! Racing callers against one engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use adgate::test_utils::{EngineFixture, permissive_policy};
use adgate::{AdKind, Denial, Limit};

const THREADS: usize = 100;

#[test]
fn reservations_never_exceed_the_hourly_cap() {
    let mut policy = permissive_policy();
    policy.interstitial.max_per_hour = Limit::AtMost(10);
    let fixture = EngineFixture::with_policy(policy);
    let engine = &fixture.engine;
    let barrier = Barrier::new(THREADS);
    let granted = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                barrier.wait();
                if engine.reserve(AdKind::Interstitial) {
                    granted.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(granted.load(Ordering::SeqCst), 10);
    assert_eq!(engine.counters(AdKind::Interstitial), (10, 10));
    assert_eq!(engine.outstanding_reservations(AdKind::Interstitial), 10);
}

#[test]
fn interleaved_unreserve_keeps_counts_consistent() {
    let mut policy = permissive_policy();
    policy.banner.max_per_day = Limit::AtMost(5);
    let fixture = EngineFixture::with_policy(policy);
    let engine = &fixture.engine;
    let barrier = Barrier::new(THREADS);

    thread::scope(|scope| {
        for i in 0..THREADS {
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                if engine.reserve(AdKind::Banner) && i % 2 == 0 {
                    engine.unreserve(AdKind::Banner);
                }
            });
        }
    });

    let (_, day) = engine.counters(AdKind::Banner);
    assert!(day <= 5);
    assert_eq!(day, engine.outstanding_reservations(AdKind::Banner));
}

#[test]
fn only_one_full_screen_claim_wins() {
    let fixture = EngineFixture::with_policy(permissive_policy());
    let engine = &fixture.engine;
    let barrier = Barrier::new(THREADS);
    let winners = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                barrier.wait();
                if engine.gate().try_claim_full_screen() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert!(engine.gate().is_full_screen_showing());
    assert!(engine.gate().is_banner_force_hidden());
}

#[test]
fn racing_show_flows_leave_one_full_screen_ad() {
    let fixture = EngineFixture::with_policy(permissive_policy());
    let engine = &fixture.engine;
    let barrier = Barrier::new(THREADS);
    let started = AtomicUsize::new(0);
    let busy = AtomicUsize::new(0);

    thread::scope(|scope| {
        for i in 0..THREADS {
            let (barrier, started, busy) = (&barrier, &started, &busy);
            let kind = if i % 2 == 0 { AdKind::AppOpen } else { AdKind::Interstitial };
            scope.spawn(move || {
                barrier.wait();
                match engine.begin_show(kind) {
                    Ok(()) => {
                        started.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(Denial::FullScreenBusy) => {
                        busy.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(other) => panic!("unexpected denial {other:?}"),
                }
            });
        }
    });

    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(busy.load(Ordering::SeqCst), THREADS - 1);
    let held = engine.outstanding_reservations(AdKind::AppOpen)
        + engine.outstanding_reservations(AdKind::Interstitial);
    assert_eq!(held, 1);
}

#[test]
fn policy_swaps_race_cleanly_with_reservations() {
    let fixture = EngineFixture::with_policy(permissive_policy());
    let engine = Arc::new(fixture.engine);
    let barrier = Arc::new(Barrier::new(2));

    let writer = {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for round in 0..200 {
                let mut policy = permissive_policy();
                policy.banner.enabled = round % 2 == 0;
                engine.set_policy(policy);
            }
        })
    };

    barrier.wait();
    let mut granted = 0_u32;
    for _ in 0..200 {
        if engine.reserve(AdKind::Banner) {
            granted += 1;
        }
    }
    writer.join().unwrap();

    assert_eq!(engine.counters(AdKind::Banner).1, granted);
}
