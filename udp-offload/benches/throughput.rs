use criterion::{criterion_group, criterion_main, Criterion};
use std::net::UdpSocket;
use udp_offload::{
    probe, BatchTransmitter, OffloadState, SingleTransmitter, Transmit, Transmitter, MAX_SEGMENTS,
};

pub fn criterion_benchmark(c: &mut Criterion) {
    const TOTAL_BYTES: usize = 10 * 1024 * 1024;
    // Maximum GSO buffer size is 64k.
    const MAX_BUFFER_SIZE: usize = u16::MAX as usize;
    const SEGMENT_SIZE: usize = 1280;

    let send = UdpSocket::bind("[::1]:0")
        .or_else(|_| UdpSocket::bind("127.0.0.1:0"))
        .unwrap();
    let recv = UdpSocket::bind("[::1]:0")
        .or_else(|_| UdpSocket::bind("127.0.0.1:0"))
        .unwrap();
    let dst_addr = recv.local_addr().unwrap();
    let caps = probe((&send).into());
    let max_segments = MAX_SEGMENTS.min(MAX_BUFFER_SIZE / SEGMENT_SIZE);

    let mut receive_buffer = vec![0; MAX_BUFFER_SIZE];
    let transmitters: [(&str, Box<dyn Transmitter>); 2] = [
        ("single", Box::new(SingleTransmitter::new())),
        ("batch", Box::new(BatchTransmitter::new())),
    ];

    for gso_enabled in [false, true] {
        if gso_enabled && !caps.can_segment_on_send {
            continue;
        }
        let state = match gso_enabled {
            true => OffloadState::probed(caps),
            false => OffloadState::new(),
        };
        let segments = if gso_enabled { max_segments } else { 1 };
        let msg = vec![0xAB; SEGMENT_SIZE * segments];
        let transmit = Transmit::new(dst_addr, &msg)
            .with_segment_size(SEGMENT_SIZE)
            .unwrap();
        // Keep each call's output within the default receive buffer
        let transmits = vec![transmit; if gso_enabled { 2 } else { 8 }];

        let mut group = c.benchmark_group(format!("gso_{}", gso_enabled));
        group.throughput(criterion::Throughput::Bytes(TOTAL_BYTES as u64));

        for (name, transmitter) in &transmitters {
            group.bench_function(*name, |b| {
                b.iter(|| {
                    let mut sent: usize = 0;
                    while sent < TOTAL_BYTES {
                        let outcome = transmitter.send((&send).into(), &state, &transmits);
                        assert!(outcome.results.iter().all(|r| r.is_ok()));
                        sent += outcome.bytes_sent();

                        let mut received = 0;
                        while received < outcome.bytes_sent() {
                            let (n, _) = recv.recv_from(&mut receive_buffer).unwrap();
                            received += n;
                        }
                    }
                })
            });
        }
        group.finish();
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
