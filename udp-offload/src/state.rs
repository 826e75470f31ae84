use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Mutex, PoisonError,
    },
    time::Instant,
};

use tracing::{debug, error, warn};

use crate::{
    CapabilitySnapshot, Classification, Transmit, TransmitError, IO_ERROR_LOG_INTERVAL,
};

const UNKNOWN: u8 = 0;
const ENABLED: u8 = 1;
const PROBED_OFF: u8 = 2;
const DISABLED: u8 = 3;

/// Snapshot of an [`OffloadState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffloadMode {
    /// No probe result has been adopted yet
    Unknown,
    /// A probe result was adopted
    Probed {
        /// Whether segmentation descriptors are attached to sends
        enabled: bool,
    },
    /// Segmentation was switched off after the device failed to honor it
    Disabled,
}

/// Whether segmentation descriptors are attached to a transport's sends
///
/// One instance belongs to each socket and is shared by reference between every sender using
/// that socket. The state only moves forward: `Unknown` becomes `Probed` once a
/// [`CapabilitySnapshot`] is adopted, and `Probed { enabled: true }` becomes `Disabled` when a
/// send fails with the platform's offload-unsupported error. Nothing leaves `Disabled`; probing
/// again means creating a new state.
#[derive(Debug)]
pub struct OffloadState {
    mode: AtomicU8,
    last_send_error: Mutex<Instant>,
}

impl OffloadState {
    /// Creates a state in [`OffloadMode::Unknown`]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            mode: AtomicU8::new(UNKNOWN),
            last_send_error: Mutex::new(now.checked_sub(2 * IO_ERROR_LOG_INTERVAL).unwrap_or(now)),
        }
    }

    /// Creates a state that has already adopted `caps`
    pub fn probed(caps: CapabilitySnapshot) -> Self {
        let state = Self::new();
        state.adopt(caps);
        state
    }

    /// Moves from `Unknown` to `Probed`, enabling segmentation if `caps` allows it
    ///
    /// Returns `false` without changing anything if a probe result was adopted before.
    pub fn adopt(&self, caps: CapabilitySnapshot) -> bool {
        let next = if caps.can_segment_on_send {
            ENABLED
        } else {
            PROBED_OFF
        };
        let adopted = self
            .mode
            .compare_exchange(UNKNOWN, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok();
        if adopted {
            debug!(
                enabled = caps.can_segment_on_send,
                "adopted segmentation offload probe"
            );
        }
        adopted
    }

    /// The current mode
    pub fn mode(&self) -> OffloadMode {
        match self.mode.load(Ordering::Relaxed) {
            UNKNOWN => OffloadMode::Unknown,
            ENABLED => OffloadMode::Probed { enabled: true },
            PROBED_OFF => OffloadMode::Probed { enabled: false },
            _ => OffloadMode::Disabled,
        }
    }

    /// Whether segmentation descriptors should be attached to new sends
    #[inline]
    pub fn segmentation_enabled(&self) -> bool {
        self.mode.load(Ordering::Relaxed) == ENABLED
    }

    /// Switches segmentation off for good
    ///
    /// Only `Probed { enabled: true }` can be disabled. Returns whether this call made the
    /// transition, so concurrent senders observing the same failure log it once.
    pub fn disable(&self) -> bool {
        let disabled = self
            .mode
            .compare_exchange(ENABLED, DISABLED, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok();
        if disabled {
            error!("got transmit error, halting segmentation offload");
        }
        disabled
    }

    /// Classifies a transmit failure, disabling segmentation if it proves the device can't do it
    pub fn record_failure(&self, err: &TransmitError) -> Classification {
        let class = err.classify();
        if class == Classification::FatalOffloadUnsupported {
            self.disable();
        }
        class
    }

    /// Logs a warning message when sendmsg fails
    ///
    /// Logging will only be performed if at least [`IO_ERROR_LOG_INTERVAL`]
    /// has elapsed since the last error was logged.
    pub(crate) fn log_send_error(&self, err: &TransmitError, transmit: &Transmit<'_>) {
        let now = Instant::now();
        let mut last_send_error = self
            .last_send_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if now.saturating_duration_since(*last_send_error) > IO_ERROR_LOG_INTERVAL {
            *last_send_error = now;
            warn!(
                "sendmsg error: {:?}, Transmit: {{ destination: {:?}, len: {:?}, segment_size: {:?} }}",
                err,
                transmit.destination(),
                transmit.contents().len(),
                transmit.segment_size()
            );
        }
    }
}

impl Default for OffloadState {
    fn default() -> Self {
        Self::new()
    }
}
