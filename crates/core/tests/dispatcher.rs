//! Dispatcher-level integration tests (testable properties, §8).
//!
//! Runs a real `Dispatcher<F>` against `deluge_platform::reference`. The
//! registry is a process-wide singleton, so every test pins device count to
//! one via `DELUGE_DEVICE_COUNT` before the first `Registry::acquire` in this
//! binary — `ensure_single_device` uses a `Once` so whichever test thread
//! gets there first decides it for the whole process, and every other thread
//! blocks until that's done.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deluge_core::{Blake3Family, DelugeError, Dispatcher, HighwayFamily, Uint320};

fn ensure_single_device() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();
        // SAFETY: runs once, before any test has spawned a thread that reads
        // the environment, via `Once`'s happens-before guarantee.
        unsafe { std::env::set_var("DELUGE_DEVICE_COUNT", "1") };
    });
}

fn recv_one<T>(rx: &mpsc::Receiver<T>) -> T {
    rx.recv_timeout(Duration::from_secs(5)).expect("callback did not fire")
}

#[test]
fn blake3_single_zero_input_matches_reference_keyed_hash() {
    ensure_single_device();
    let dispatcher = Dispatcher::create(Blake3Family::new([0u8; 32])).unwrap();
    let (tx, rx) = mpsc::channel();
    dispatcher.schedule(&[0u64], move |result| tx.send(result).unwrap()).unwrap();
    let digest = recv_one(&rx).expect("hash succeeded");

    let keyed = blake3::keyed_hash(&[0u8; 32], &0u64.to_le_bytes());
    let expected = Uint320::from(*keyed.as_bytes()).to_be_bytes();
    assert_eq!(digest, expected);
}

#[test]
fn reduction_is_commutative_across_submission_order() {
    ensure_single_device();
    let key = [9u8; 32];
    let dispatcher = Dispatcher::create(Blake3Family::new(key)).unwrap();

    let (tx_a, rx_a) = mpsc::channel();
    dispatcher.schedule(&[1, 2, 3, 4], move |r| tx_a.send(r).unwrap()).unwrap();
    let a = recv_one(&rx_a).unwrap();

    let (tx_b, rx_b) = mpsc::channel();
    dispatcher.schedule(&[4, 3, 2, 1], move |r| tx_b.send(r).unwrap()).unwrap();
    let b = recv_one(&rx_b).unwrap();

    assert_eq!(a, b);
}

#[test]
fn empty_input_is_a_synchronous_no_op() {
    ensure_single_device();
    let dispatcher = Dispatcher::create(Blake3Family::new([1u8; 32])).unwrap();
    let fired = Arc::new(Mutex::new(false));
    let fired2 = fired.clone();
    let result = dispatcher.schedule(&[], move |_| *fired2.lock().unwrap() = true);
    assert!(result.is_ok());
    std::thread::sleep(Duration::from_millis(50));
    assert!(!*fired.lock().unwrap(), "callback must not fire for an empty batch");
}

#[test]
fn fifo_drain_on_a_single_backend() {
    ensure_single_device();
    let dispatcher = Dispatcher::create(Blake3Family::new([3u8; 32])).unwrap();
    let (tx, rx) = mpsc::channel();
    for i in 0..16u64 {
        let tx = tx.clone();
        dispatcher.schedule(&[i], move |result| tx.send((i, result)).unwrap()).unwrap();
    }
    drop(tx);
    let mut order = Vec::new();
    while let Ok((i, result)) = rx.recv_timeout(Duration::from_secs(5)) {
        result.unwrap();
        order.push(i);
    }
    assert_eq!(order, (0..16).collect::<Vec<_>>());
}

#[test]
fn callback_fires_exactly_once_per_job() {
    ensure_single_device();
    let dispatcher = Dispatcher::create(HighwayFamily::new([1, 2, 3, 4])).unwrap();
    let counts: Vec<Arc<Mutex<u32>>> = (0..64).map(|_| Arc::new(Mutex::new(0))).collect();
    let (tx, rx) = mpsc::channel();
    for (i, count) in counts.iter().enumerate() {
        let count = count.clone();
        let tx = tx.clone();
        dispatcher
            .schedule(&[i as u64], move |result| {
                *count.lock().unwrap() += 1;
                tx.send(result).unwrap();
            })
            .unwrap();
    }
    drop(tx);
    for _ in 0..counts.len() {
        recv_one(&rx).unwrap();
    }
    for count in &counts {
        assert_eq!(*count.lock().unwrap(), 1);
    }
}

#[test]
fn concurrent_schedules_all_complete() {
    ensure_single_device();
    let dispatcher = Dispatcher::create(Blake3Family::new([5u8; 32])).unwrap();
    let (tx, rx) = mpsc::channel();
    let threads: Vec<_> = (0..8)
        .map(|t| {
            let dispatcher = dispatcher.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                for i in 0..32u64 {
                    let tx = tx.clone();
                    dispatcher
                        .schedule(&[t, i], move |result| tx.send(result).unwrap())
                        .unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    drop(tx);
    let mut completed = 0;
    while let Ok(result) = rx.recv_timeout(Duration::from_secs(10)) {
        result.unwrap();
        completed += 1;
    }
    assert_eq!(completed, 8 * 32);
}

#[test]
fn destroy_cancels_backlog_without_dropping_any_job() {
    ensure_single_device();
    let dispatcher = Dispatcher::create(HighwayFamily::new([0, 0, 0, 0])).unwrap();
    let (tx, rx) = mpsc::channel();
    let mut accepted = 0u64;
    for i in 0..2_000u64 {
        let tx = tx.clone();
        // A synchronous `Err` here means a concurrent `destroy` already set
        // `stopping` before this submission ran, so the job was never
        // accepted and owes no callback (§7) — don't count it below.
        if dispatcher
            .schedule(&[i], move |result| {
                let _ = tx.send(result);
            })
            .is_ok()
        {
            accepted += 1;
        }
    }
    dispatcher.destroy();
    drop(tx);

    let mut success = 0;
    let mut cancelled = 0;
    while let Ok(result) = rx.recv_timeout(Duration::from_secs(5)) {
        match result {
            Ok(_) => success += 1,
            Err(DelugeError::Cancel) => cancelled += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(success + cancelled, accepted, "every accepted job must report exactly one outcome");
    assert!(accepted > 0);
}

#[test]
fn schedule_after_destroy_is_rejected_synchronously() {
    ensure_single_device();
    let dispatcher = Dispatcher::create(Blake3Family::new([2u8; 32])).unwrap();
    dispatcher.destroy();
    let result = dispatcher.schedule(&[1, 2, 3], |_| panic!("callback must not run"));
    assert_eq!(result, Err(DelugeError::Cancel));
}

#[test]
fn ring_grows_under_backlog_without_dropping_jobs() {
    ensure_single_device();
    let dispatcher = Dispatcher::create(HighwayFamily::new([7, 7, 7, 7])).unwrap();
    const N: u64 = 5_000;
    let (tx, rx) = mpsc::channel();
    for i in 0..N {
        let tx = tx.clone();
        dispatcher.schedule(&[i], move |result| tx.send(result).unwrap()).unwrap();
    }
    drop(tx);
    let mut completed = 0u64;
    while let Ok(result) = rx.recv_timeout(Duration::from_secs(15)) {
        result.unwrap();
        completed += 1;
    }
    assert_eq!(completed, N);
}
