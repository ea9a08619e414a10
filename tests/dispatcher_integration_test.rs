// Dispatcher thread driving a simulated concentrator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use lorawan_jit::airtime::FixedAirtime;
use lorawan_jit::clock::delta_us;
use lorawan_jit::concentrator::{Concentrator, SimulatedConcentrator};
use lorawan_jit::packet::{Bandwidth, DownlinkPacket, Modulation};
use lorawan_jit::scheduler::{JitDispatcher, JitQueue, TxEvent, TxOutcome};
use lorawan_jit::{DispatcherConfig, JitConfig, PacketType};

type Harness = (Arc<JitQueue>, Arc<SimulatedConcentrator>, Arc<JitDispatcher>, Receiver<TxEvent>);

fn setup(counter_start: u32) -> Harness {
    let airtime = Arc::new(FixedAirtime(20_000));
    let queue = Arc::new(JitQueue::with_airtime(&JitConfig::default(), airtime.clone()));
    let radio = Arc::new(SimulatedConcentrator::starting_at(counter_start).with_airtime(airtime));
    let config = DispatcherConfig {
        poll_interval_ms: 1,
        ..DispatcherConfig::default()
    };
    let (dispatcher, events) = JitDispatcher::new(queue.clone(), radio.clone(), config);
    (queue, radio, Arc::new(dispatcher), events)
}

fn wait_for_frames(radio: &SimulatedConcentrator, count: usize, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if radio.sent().len() >= count {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn immediate_downlink_reaches_the_radio() {
    let (queue, radio, dispatcher, events) = setup(0);
    dispatcher.start().unwrap();

    let packet = DownlinkPacket::immediate(
        vec![0xA0, 0x01, 0x02],
        869_525_000,
        Modulation::lora(9, Bandwidth::Khz125),
    );
    let id = packet.id;
    let now = radio.now_us();
    let target = queue.enqueue(now, packet, PacketType::ClassC).unwrap();
    assert_eq!(delta_us(target, now), 80_000);

    assert!(wait_for_frames(&radio, 1, Duration::from_secs(2)));
    dispatcher.stop();

    let sent = radio.sent();
    assert_eq!(sent[0].packet_id, id);
    assert_eq!(sent[0].target_time_us, target);
    // programmed inside the look-ahead window, ahead of the target
    assert!(delta_us(target, sent[0].programmed_at_us) <= 40_000);

    let event = events.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(event.outcome, TxOutcome::Sent);
    assert!(queue.is_empty());
}

#[test]
fn downlinks_go_out_in_time_order_across_counter_wrap() {
    // counter wraps about 150 ms into the test
    let (queue, radio, dispatcher, _events) = setup(u32::MAX - 150_000);
    let now = radio.now_us();
    let modulation = Modulation::lora(7, Bandwidth::Khz125);
    let offsets = [400_000u32, 100_000, 250_000];
    for offset in offsets {
        let packet =
            DownlinkPacket::timestamped(vec![1, 2, 3], now.wrapping_add(offset), 0, modulation);
        queue.enqueue(now, packet, PacketType::ClassA).unwrap();
    }

    dispatcher.start().unwrap();
    assert!(wait_for_frames(&radio, 3, Duration::from_secs(3)));
    dispatcher.stop();

    let targets: Vec<u32> = radio.sent().iter().map(|f| f.target_time_us).collect();
    let expected: Vec<u32> = [100_000u32, 250_000, 400_000]
        .iter()
        .map(|o| now.wrapping_add(*o))
        .collect();
    assert_eq!(targets, expected);
    assert_eq!(queue.stats().snapshot().transmitted[PacketType::ClassA], 3);
}

#[test]
fn missed_downlink_is_dropped_instead_of_sent_late() {
    let (queue, radio, dispatcher, _events) = setup(0);
    let now = radio.now_us();
    let packet = DownlinkPacket::timestamped(
        vec![1],
        now.wrapping_add(100_000),
        0,
        Modulation::lora(7, Bandwidth::Khz125),
    );
    queue.enqueue(now, packet, PacketType::ClassA).unwrap();

    // dispatcher only starts after the slot has passed
    std::thread::sleep(Duration::from_millis(200));
    dispatcher.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    dispatcher.stop();

    assert!(radio.sent().is_empty());
    assert!(queue.is_empty());
    assert_eq!(queue.stats().snapshot().stale_dropped[PacketType::ClassA], 1);
}
