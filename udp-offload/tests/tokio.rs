#![cfg(feature = "runtime-tokio")]

use std::net::Ipv4Addr;

use tokio::net::UdpSocket;
use udp_offload::{
    default_transmitter, probe, runtime, BatchTransmitter, OffloadState, SingleTransmitter,
    Transmit, Transmitter,
};

#[tokio::test]
async fn async_send() {
    let send = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let recv = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let state = OffloadState::probed(probe((&send).into()));
    let dst = recv.local_addr().unwrap();
    let payload = [9u8; 3600];
    let transmits = [
        Transmit::new(dst, &payload[..10]),
        Transmit::new(dst, &payload).with_segment_size(1200).unwrap(),
    ];
    let expected = if state.segmentation_enabled() {
        vec![10, 1200, 1200, 1200]
    } else {
        vec![10, 3600]
    };

    let transmitters: [Box<dyn Transmitter>; 3] = [
        Box::new(SingleTransmitter::new()),
        Box::new(BatchTransmitter::new()),
        default_transmitter(),
    ];
    for transmitter in &transmitters {
        let outcome = runtime::send(&send, transmitter.as_ref(), &state, &transmits).await;
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.is_ok()));
        assert_eq!(outcome.bytes_sent(), 3610);

        let mut buf = [0; u16::MAX as usize];
        for &len in &expected {
            let (n, _) = recv.recv_from(&mut buf).await.unwrap();
            assert_eq!(n, len);
        }
    }
}

#[tokio::test]
async fn async_empty() {
    let send = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let state = OffloadState::new();
    let outcome = runtime::send(&send, &SingleTransmitter::new(), &state, &[]).await;
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.count_mismatch, None);
}
