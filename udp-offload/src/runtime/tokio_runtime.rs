use std::io;

use tokio::{io::Interest, net::UdpSocket};

use crate::{
    OffloadState, SendOutcome, Transmit, TransmitError, TransmitResult, Transmitter, UdpSockRef,
};

/// Sends `transmits` through `transmitter` on a non-blocking tokio socket
///
/// Requests that hit `WouldBlock`, or that a batch call did not get to, are submitted again
/// once the socket is writable, so every result reflects a completed attempt. The first count
/// mismatch observed along the way is reported as a diagnostic.
pub async fn send(
    socket: &UdpSocket,
    transmitter: &dyn Transmitter,
    state: &OffloadState,
    transmits: &[Transmit<'_>],
) -> SendOutcome {
    let mut slots = (0..transmits.len())
        .map(|_| None)
        .collect::<Vec<Option<TransmitResult>>>();
    let mut count_mismatch = None;

    loop {
        let pending = (0..transmits.len())
            .filter(|&i| slots[i].is_none())
            .collect::<Vec<_>>();
        if pending.is_empty() {
            break;
        }
        let batch = pending.iter().map(|&i| transmits[i]).collect::<Vec<_>>();

        let attempt = loop {
            if let Err(e) = socket.writable().await {
                break Err(e);
            }
            match socket.try_io(Interest::WRITABLE, || {
                let outcome = transmitter.send(UdpSockRef::from(socket), state, &batch);
                match outcome.results.iter().all(TransmitResult::is_retryable) {
                    // Nothing went out, clear readiness and wait again
                    true => Err(io::ErrorKind::WouldBlock.into()),
                    false => Ok(outcome),
                }
            }) {
                Ok(outcome) => break Ok(outcome),
                Err(_would_block) => continue,
            }
        };

        match attempt {
            Ok(outcome) => {
                count_mismatch = count_mismatch.or(outcome.count_mismatch);
                for (i, result) in pending.into_iter().zip(outcome.results) {
                    if !result.is_retryable() {
                        slots[i] = Some(result);
                    }
                }
            }
            Err(e) => {
                for i in pending {
                    let e = match e.raw_os_error() {
                        Some(raw) => io::Error::from_raw_os_error(raw),
                        None => io::Error::new(e.kind(), e.to_string()),
                    };
                    slots[i] = Some(TransmitResult {
                        bytes_sent: 0,
                        ancillary_bytes_sent: 0,
                        error: Some(TransmitError::from(e)),
                    });
                }
                break;
            }
        }
    }

    SendOutcome {
        results: slots.into_iter().flatten().collect(),
        count_mismatch,
    }
}
