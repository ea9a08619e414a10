use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use lorawan_jit::airtime::{FixedAirtime, SemtechAirtime, TimeOnAir};
use lorawan_jit::packet::{Bandwidth, DownlinkPacket, Modulation};
use lorawan_jit::{JitConfig, JitQueue, PacketType};

const SLOT_US: u32 = 250_000;

fn packet(target: u32) -> DownlinkPacket {
    DownlinkPacket::timestamped(
        vec![0u8; 32],
        target,
        869_525_000,
        Modulation::lora(9, Bandwidth::Khz125),
    )
}

/// Queue filled to capacity with non-colliding Class A downlinks.
fn full_queue() -> JitQueue {
    let queue = JitQueue::with_airtime(&JitConfig::default(), Arc::new(FixedAirtime(50_000)));
    for i in 0..queue.capacity() as u32 {
        queue
            .enqueue(0, packet(100_000 + i * SLOT_US), PacketType::ClassA)
            .unwrap();
    }
    queue
}

fn bench_jit_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("jit_queue");

    group.bench_function("dequeue_enqueue_full", |b| {
        let queue = full_queue();

        b.iter(|| {
            // take the earliest downlink and put it straight back
            let (packet, packet_type) = queue.dequeue(black_box(0)).unwrap();
            queue.enqueue(0, packet, packet_type).unwrap();
        });
    });

    group.bench_function("enqueue_rejected_collision", |b| {
        let queue = full_queue();
        queue.dequeue(0).unwrap();

        b.iter(|| {
            let err = queue
                .enqueue(0, black_box(packet(100_000 + 5 * SLOT_US)), PacketType::ClassA)
                .unwrap_err();
            black_box(err);
        });
    });

    group.bench_function("enqueue_asap_full_scan", |b| {
        let queue = full_queue();
        queue.dequeue(queue.len() - 1).unwrap();
        let push = DownlinkPacket::immediate(
            vec![0u8; 32],
            869_525_000,
            Modulation::lora(9, Bandwidth::Khz125),
        );

        b.iter(|| {
            let target = queue
                .enqueue(0, black_box(push.clone()), PacketType::ClassC)
                .unwrap();
            let index = queue
                .snapshot()
                .iter()
                .position(|e| e.target_time_us == target)
                .unwrap();
            black_box(queue.dequeue(index).unwrap());
        });
    });

    group.bench_function("peek_full", |b| {
        let queue = full_queue();

        b.iter(|| {
            black_box(queue.peek(black_box(1_000)).unwrap());
        });
    });
}

fn bench_airtime(c: &mut Criterion) {
    let mut group = c.benchmark_group("airtime");

    group.bench_function("lora_sf12", |b| {
        let p = DownlinkPacket::timestamped(
            vec![0u8; 51],
            0,
            869_525_000,
            Modulation::lora(12, Bandwidth::Khz125),
        );
        b.iter(|| black_box(SemtechAirtime.time_on_air_us(black_box(&p))));
    });
}

criterion_group!(benches, bench_jit_queue, bench_airtime);
criterion_main!(benches);
