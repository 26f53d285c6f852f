//! Integration tests for edge delivery and runtime reconfiguration.
//!
//! These tests drive a full board through the mock backend:
//! 1. Edges → tick reconstruction → debounce → count and fan-out
//! 2. Reconfigure → identity preservation, retention and rollback
//! 3. Close → teardown and end of delivery

mod common;

use common::{PIN_11, PIN_13, PIN_15, TestBoard, assert_exclusive};
use raspi_core::{Level, LineId, PinConfig, Tick};
use raspi_hardware::mock::MockGpio;
use raspi_hardware::{Board, HardwareError, interrupt_callback};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Edge Delivery
// ============================================================================

#[test]
fn test_debounce_scenario_across_reconfigure() {
    let test = TestBoard::new(vec![PinConfig::interrupt("i1", "11")]);
    let i1 = test.interrupt("i1");

    test.gpio.drive(PIN_11, Level::Low, 0);
    test.gpio.drive(PIN_11, Level::High, 0);
    assert_eq!(i1.value(), 1);

    test.reconfigure(vec![PinConfig::interrupt("i1", "11").with_debounce_ms(5)])
        .unwrap();
    assert!(Arc::ptr_eq(&i1, &test.interrupt("i1")));

    assert_eq!(test.gpio.drive(PIN_11, Level::Low, 2), 0);
    assert_eq!(test.gpio.drive(PIN_11, Level::High, 3), 0);
    assert_eq!(i1.value(), 1);

    assert_eq!(test.gpio.drive(PIN_11, Level::High, 10_000), 1);
    assert_eq!(i1.value(), 2);
}

#[test]
fn test_edges_separated_by_window_both_count() {
    let test = TestBoard::new(vec![PinConfig::interrupt("i1", "11").with_debounce_ms(1)]);

    test.gpio.drive(PIN_11, Level::High, 0);
    test.gpio.drive(PIN_11, Level::High, 1_001);

    assert_eq!(test.interrupt("i1").value(), 2);
}

#[tokio::test]
async fn test_subscribers_get_one_tick_per_accepted_edge() {
    let test = TestBoard::new(vec![PinConfig::interrupt("i1", "11").with_debounce_ms(1)]);
    let i1 = test.interrupt("i1");
    let (tx1, mut rx1) = mpsc::channel(8);
    let (tx2, mut rx2) = mpsc::channel(8);
    i1.subscribe(tx1).unwrap();
    i1.subscribe(tx2).unwrap();

    test.gpio.drive(PIN_11, Level::High, 100);
    test.gpio.drive(PIN_11, Level::Low, 200); // bounce
    test.gpio.drive(PIN_11, Level::Low, 2_000);

    let expected = vec![
        Tick {
            name: "i1".into(),
            high: true,
            timestamp_nanos: 100_000,
        },
        Tick {
            name: "i1".into(),
            high: false,
            timestamp_nanos: 2_000_000,
        },
    ];
    for rx in [&mut rx1, &mut rx2] {
        let got = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        assert_eq!(got, expected);
        assert!(rx.try_recv().is_err());
    }
}

#[test]
fn test_unsubscribed_channel_gets_nothing() {
    let test = TestBoard::new(vec![PinConfig::interrupt("i1", "11")]);
    let i1 = test.interrupt("i1");
    let (kept_tx, mut kept_rx) = mpsc::channel(8);
    let (gone_tx, mut gone_rx) = mpsc::channel(8);
    i1.subscribe(kept_tx).unwrap();
    i1.subscribe(gone_tx.clone()).unwrap();

    assert!(i1.unsubscribe(&gone_tx));
    test.gpio.drive(PIN_11, Level::High, 5);

    assert!(gone_rx.try_recv().is_err());
    assert!(kept_rx.try_recv().unwrap().high);
}

#[test]
fn test_ticks_stay_monotonic_across_wraparound() {
    let test = TestBoard::new(vec![PinConfig::interrupt("i1", "11")]);
    let (tx, mut rx) = mpsc::channel(8);
    test.interrupt("i1").subscribe(tx).unwrap();

    test.gpio.drive(PIN_11, Level::High, 4_294_967_290);
    test.gpio.drive(PIN_11, Level::Low, 10);

    let first = rx.try_recv().unwrap().timestamp_nanos;
    let second = rx.try_recv().unwrap().timestamp_nanos;
    assert_eq!(first, 4_294_967_290 * 1_000);
    assert_eq!(second, (4_294_967_296 + 10) * 1_000);
}

#[test]
fn test_watchdog_callback_is_ignored() {
    let test = TestBoard::new(vec![PinConfig::interrupt("i1", "11")]);

    assert_eq!(test.gpio.drive_raw(PIN_11, 2, 1_000), 0);

    assert_eq!(test.interrupt("i1").value(), 0);
    assert_eq!(test.dispatcher.clock().rollovers(), 0);
}

#[test]
fn test_servo_reports_average_pulse_width() {
    let test = TestBoard::new(vec![
        PinConfig::interrupt("servo", "15")
            .with_interrupt_type(raspi_core::InterruptType::Servo),
    ]);

    test.gpio.drive(PIN_15, Level::High, 0);
    test.gpio.drive(PIN_15, Level::Low, 1_500);
    test.gpio.drive(PIN_15, Level::High, 20_000);
    test.gpio.drive(PIN_15, Level::Low, 22_000);

    assert_eq!(test.interrupt("servo").value(), 1_750);
}

// ============================================================================
// Reconfiguration
// ============================================================================

#[test]
fn test_rename_preserves_count_and_subscribers() {
    let test = TestBoard::new(vec![PinConfig::interrupt("x", "11")]);
    let x = test.interrupt("x");
    let (tx, mut rx) = mpsc::channel(8);
    x.subscribe(tx).unwrap();
    test.gpio.drive(PIN_11, Level::High, 1);

    test.reconfigure(vec![PinConfig::interrupt("y", "11")]).unwrap();
    test.gpio.drive(PIN_11, Level::High, 2);

    assert_eq!(test.board.digital_interrupt_names(), vec!["y"]);
    assert!(Arc::ptr_eq(&x, &test.interrupt("y")));
    assert_eq!(x.value(), 2);
    assert_eq!(rx.try_recv().unwrap().name, "x");
    assert_eq!(rx.try_recv().unwrap().name, "y");
}

#[test]
fn test_move_to_other_pin_keeps_count() {
    let test = TestBoard::new(vec![PinConfig::interrupt("i1", "11")]);
    let i1 = test.interrupt("i1");
    test.gpio.drive(PIN_11, Level::High, 1);

    test.reconfigure(vec![PinConfig::interrupt("i1", "13")]).unwrap();

    // The old line no longer reaches it
    assert_eq!(test.gpio.drive(PIN_11, Level::High, 2), 0);
    test.gpio.drive(PIN_13, Level::High, 3);

    assert_eq!(i1.line(), PIN_13);
    assert_eq!(i1.value(), 2);
    assert_exclusive(&test);
}

#[test]
fn test_implicit_interrupt_survives_reconfigure() {
    let test = TestBoard::new(vec![PinConfig::interrupt("i1", "11")]);
    let implicit = test.interrupt("13");
    test.gpio.drive(PIN_13, Level::High, 1);

    test.reconfigure(vec![PinConfig::interrupt("i1", "11")]).unwrap();

    assert_eq!(test.board.digital_interrupt_names(), vec!["13", "i1"]);
    assert!(Arc::ptr_eq(&implicit, &test.interrupt("13")));
    assert_eq!(implicit.value(), 1);
    assert_exclusive(&test);
}

#[test]
fn test_explicit_interrupt_dropped_when_omitted() {
    let test = TestBoard::new(vec![
        PinConfig::interrupt("i1", "11"),
        PinConfig::interrupt("foo", "13"),
    ]);

    test.reconfigure(vec![PinConfig::interrupt("i1", "11")]).unwrap();

    assert_eq!(test.board.digital_interrupt_names(), vec!["i1"]);
    assert!(!test.gpio.is_registered(PIN_13));
    assert_eq!(test.gpio.drive(PIN_13, Level::High, 1), 0);
}

#[test]
fn test_lookup_by_label_after_configuration() {
    let test = TestBoard::new(vec![PinConfig::interrupt("button", "11")]);

    // "io17" names the configured line, so no second interrupt appears
    let by_label = test.interrupt("io17");

    assert!(Arc::ptr_eq(&by_label, &test.interrupt("button")));
    assert_eq!(test.board.interrupt_count(), 1);
}

#[test]
fn test_failed_reconfigure_changes_nothing() {
    let test = TestBoard::new(vec![
        PinConfig::interrupt("a", "11"),
        PinConfig::interrupt("b", "13"),
    ]);
    let a = test.interrupt("a");
    let before = test.board.pin_configs();
    test.gpio.fail_register(PIN_15);

    let err = test
        .reconfigure(vec![
            PinConfig::interrupt("renamed", "11").with_debounce_ms(9),
            PinConfig::interrupt("c", "15"),
        ])
        .unwrap_err();

    assert!(matches!(err, HardwareError::HardwareRegistrationFailed { .. }));
    assert_eq!(test.board.digital_interrupt_names(), vec!["a", "b"]);
    assert_eq!(test.board.pin_configs(), before);
    assert_eq!(a.name(), "a");
    assert!(a.debounce().is_zero());

    // Both lines still dispatch
    assert_eq!(test.gpio.drive(PIN_11, Level::High, 1), 1);
    assert_eq!(test.gpio.drive(PIN_13, Level::High, 2), 1);
    assert_exclusive(&test);
}

#[test]
fn test_unknown_pin_aborts_without_hardware_calls() {
    let test = TestBoard::new(vec![PinConfig::interrupt("a", "11")]);
    let calls = test.gpio.register_calls();

    let err = test
        .reconfigure(vec![
            PinConfig::interrupt("a", "11"),
            PinConfig::interrupt("b", "not-a-pin"),
        ])
        .unwrap_err();

    assert!(matches!(err, HardwareError::UnknownPin { .. }));
    assert_eq!(test.gpio.register_calls(), calls);
}

#[test]
fn test_swap_and_shuffle_stays_exclusive() {
    let test = TestBoard::new(vec![
        PinConfig::interrupt("a", "11"),
        PinConfig::interrupt("b", "13"),
    ]);
    test.interrupt("15");

    test.reconfigure(vec![
        PinConfig::interrupt("b", "11"),
        PinConfig::interrupt("a", "13"),
        PinConfig::interrupt("c", "29"),
    ])
    .unwrap();
    assert_exclusive(&test);

    test.reconfigure(vec![
        PinConfig::interrupt("c", "11"),
        PinConfig::interrupt("d", "31"),
    ])
    .unwrap();
    assert_exclusive(&test);
    assert_eq!(test.board.digital_interrupt_names(), vec!["15", "c", "d"]);
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_close_aggregates_teardown_errors() {
    let test = TestBoard::new(vec![
        PinConfig::interrupt("a", "11"),
        PinConfig::interrupt("b", "13"),
        PinConfig::interrupt("c", "15"),
    ]);
    test.gpio.fail_unregister(PIN_11);
    test.gpio.fail_unregister(PIN_13);

    let err = test.board.close().await.unwrap_err();

    match err {
        HardwareError::Multiple(errors) => assert_eq!(errors.len(), 2),
        other => panic!("expected aggregated error, got {other}"),
    }
    assert!(!test.gpio.is_registered(PIN_15));
    assert!(test.board.digital_interrupt_names().is_empty());
}

#[tokio::test]
async fn test_close_stops_dispatch() {
    let test = TestBoard::new(vec![PinConfig::interrupt("a", "11")]);
    let a = test.interrupt("a");
    let (tx, mut rx) = mpsc::channel(8);
    test.board
        .stream_ticks(&[a.clone()], tx, CancellationToken::new())
        .unwrap();

    test.board.close().await.unwrap();

    assert_eq!(test.dispatcher.dispatch(PIN_11.as_u32(), 1, 1), 0);
    assert_eq!(a.value(), 0);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_native_callback_reaches_board() {
    let (backend, gpio) = MockGpio::new();
    let board = Board::new(
        &raspi_core::BoardConfig::new(vec![PinConfig::interrupt("global", "36")]),
        backend,
    )
    .unwrap();
    let line = LineId::new(16);

    gpio.drive(line, Level::High, 100);
    interrupt_callback(line.as_u32(), 1, 200);

    assert_eq!(board.digital_interrupt_by_name("global").unwrap().value(), 2);
    board.close().await.unwrap();
    assert_eq!(gpio.drive(line, Level::High, 300), 0);
}

// ============================================================================
// Foreign-thread callbacks
// ============================================================================

/// Spawn one OS thread per line that keeps firing edges until `stop` is set.
fn spawn_edge_drivers(
    test: &TestBoard,
    lines: &[LineId],
    stop: &Arc<AtomicBool>,
) -> Vec<thread::JoinHandle<()>> {
    lines
        .iter()
        .map(|&line| {
            let gpio = test.gpio.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut raw = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    let level = if raw % 2 == 0 { Level::Low } else { Level::High };
                    gpio.drive(line, level, raw);
                    raw = raw.wrapping_add(1);
                }
            })
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_edges_from_native_threads_race_reconfigure_and_close() {
    let test = TestBoard::new(vec![
        PinConfig::interrupt("a", "11"),
        PinConfig::interrupt("b", "13"),
    ]);
    let stop = Arc::new(AtomicBool::new(false));
    let drivers = spawn_edge_drivers(&test, &[PIN_11, PIN_13, PIN_15], &stop);

    let layouts = [
        vec![PinConfig::interrupt("a", "11"), PinConfig::interrupt("b", "13")],
        vec![PinConfig::interrupt("a", "13"), PinConfig::interrupt("b", "11")],
        vec![
            PinConfig::interrupt("a", "15"),
            PinConfig::interrupt("c", "11").with_debounce_ms(1),
        ],
        vec![PinConfig::interrupt("b", "15")],
    ];
    for round in 0..50 {
        test.reconfigure(layouts[round % layouts.len()].clone())
            .unwrap();
        assert_exclusive(&test);
    }

    // Edges keep arriving while the board shuts down
    test.board.close().await.unwrap();

    stop.store(true, Ordering::Relaxed);
    for driver in drivers {
        driver.join().expect("edge driver panicked");
    }

    assert_eq!(test.gpio.callback_count(), 0);
    assert_eq!(test.dispatcher.board_count(), 0);
    for line in [PIN_11, PIN_13, PIN_15] {
        assert_eq!(test.dispatcher.dispatch(line.as_u32(), 1, 0), 0);
    }
}

#[test]
fn test_reconfigure_racing_close_leaves_nothing_armed() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    for _ in 0..20 {
        let test = TestBoard::new(vec![PinConfig::interrupt("a", "11")]);

        thread::scope(|scope| {
            for offset in 0..3 {
                let test = &test;
                scope.spawn(move || {
                    let labels = ["11", "13", "15"];
                    for i in 0..20 {
                        let label = labels[(i + offset) % labels.len()];
                        match test.reconfigure(vec![PinConfig::interrupt("a", label)]) {
                            Ok(()) => {}
                            Err(HardwareError::Closed) => break,
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                });
            }
            runtime.block_on(test.board.close()).unwrap();
        });

        assert!(matches!(
            test.reconfigure(vec![PinConfig::interrupt("a", "11")]),
            Err(HardwareError::Closed)
        ));
        assert_eq!(test.gpio.callback_count(), 0);
        assert!(test.board.digital_interrupt_names().is_empty());
    }
}
