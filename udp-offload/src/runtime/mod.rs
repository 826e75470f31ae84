//! Async adapters over the blocking transmit path
//!
//! The adapters only wait for writability; what is sent and what is reported is decided by the
//! same [`Transmitter`](crate::Transmitter) a blocking caller would use.

mod tokio_runtime;
pub use tokio_runtime::send;
