// canlink/tests/cansocket.rs
//
// Tests against a real (virtual) CAN interface. Most of these need the
// kernel vcan module and an interface brought up beforehand:
//
//     ip link add dev vcan0 type vcan
//     ip link set up vcan0
//
// and run with `--features vcan_tests`.

use canlink::CanBus;

#[cfg(feature = "vcan_tests")]
use canlink::{CanFilter, CanFrame, EmbeddedFrame, ReceiveLoop, ERR_MASK_ALL, ERR_MASK_NONE};
#[cfg(feature = "vcan_tests")]
use serial_test::serial;
#[cfg(feature = "vcan_tests")]
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc,
        Arc,
    },
    time::Duration,
};

// The virtual CAN interface to use for tests.
#[cfg(feature = "vcan_tests")]
const VCAN: &str = "vcan0";

#[test]
fn test_nonexistent_device() {
    assert!(CanBus::open("invalid", &[]).is_err());
}

#[test]
#[cfg(feature = "vcan_tests")]
#[serial]
fn vcan_timeout() {
    use canlink::ShouldRetry;

    let bus = CanBus::open(VCAN, &[]).unwrap();
    // Filter out _any_ traffic
    bus.set_error_filter(ERR_MASK_NONE).unwrap();
    bus.set_read_timeout(Duration::from_millis(100)).unwrap();

    assert!(bus.recv_frame().should_retry());
}

#[test]
#[cfg(feature = "vcan_tests")]
#[serial]
fn vcan_set_error_mask() {
    let bus = CanBus::open(VCAN, &[]).unwrap();
    bus.set_error_filter(ERR_MASK_ALL).unwrap();
    bus.set_error_filter(ERR_MASK_NONE).unwrap();
}

#[test]
#[cfg(feature = "vcan_tests")]
#[serial]
fn vcan_send_and_receive_own_frame() {
    let bus = CanBus::open(VCAN, &[]).unwrap();
    bus.set_loopback(true).unwrap();
    bus.set_recv_own_msgs(true).unwrap();
    bus.set_read_timeout(Duration::from_millis(500)).unwrap();

    let frame = CanFrame::from_raw_id(0x123, &[0xAA, 0x55]).unwrap();
    bus.send(&frame).unwrap();

    let received = bus.recv_frame().unwrap();
    assert_eq!(received.raw_id(), 0x123);
    assert_eq!(received.data(), &[0xAA, 0x55]);

    bus.close().unwrap();
}

/// Two filters installed, three frames sent: only the matching two may
/// ever reach the receive loop, in their relative transmit order. The
/// middle frame is rejected in the kernel.
#[test]
#[cfg(feature = "vcan_tests")]
#[serial]
fn vcan_filters_reject_in_the_kernel() {
    let rules = [CanFilter::new(0x100, 0x7FF), CanFilter::new(0x200, 0x7FF)];
    let rx_bus = Arc::new(CanBus::open(VCAN, &rules).unwrap());

    let (tx, rx) = mpsc::sync_channel(16);
    let running = Arc::new(AtomicBool::new(true));
    let handle = ReceiveLoop::new(Arc::clone(&rx_bus), tx, Arc::clone(&running))
        .spawn()
        .unwrap();

    let tx_bus = CanBus::open(VCAN, &[]).unwrap();
    for id in [0x100, 0x150, 0x200] {
        tx_bus.send(&CanFrame::from_raw_id(id, &[]).unwrap()).unwrap();
    }

    let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first.raw_id(), 0x100);
    assert_eq!(second.raw_id(), 0x200);

    // 0x150 must never show up
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    running.store(false, Ordering::Release);
    handle.join().unwrap();

    tx_bus.close().unwrap();
    Arc::try_unwrap(rx_bus).unwrap().close().unwrap();
}
