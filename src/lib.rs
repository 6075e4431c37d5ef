//! LPC43xx UART bootstrap loader.
//!
//! Synchronises with a device waiting in its UART boot mode, announces the
//! image size in a fixed header and streams the image padded to 512 byte
//! blocks. The device does not acknowledge the transfer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[macro_use]
extern crate log;

extern crate embedded_hal;
use embedded_hal::serial::{Read, Write};

#[cfg(feature = "structopt")]
extern crate structopt;

#[cfg(feature = "linux")]
extern crate linux_embedded_hal;

#[cfg(feature = "linux")]
pub mod linux;

pub mod protocol;
pub mod session;
pub mod stream;
pub mod sync;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use protocol::{Header, ImageTooLarge};
pub use session::{Loader, Outcome, State};
pub use stream::{Counters, Image, Progress};
pub use sync::SyncStatus;
pub use transport::Transport;

/// Serial port usable by the loader, any embedded-hal byte serial
/// implementation qualifies
pub trait SerialPort<E>: Write<u8, Error = E> + Read<u8, Error = E> {}

impl<T, E> SerialPort<E> for T where T: Write<u8, Error = E> + Read<u8, Error = E> {}

#[derive(Debug, thiserror::Error)]
pub enum Error<SerialError: core::fmt::Debug> {
    #[error("serial error: {0:?}")]
    Serial(SerialError),

    #[error("failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    #[error("transport already closed")]
    Closed,

    #[error(transparent)]
    TooLarge(#[from] ImageTooLarge),

    #[error("image read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Number of sync probes before giving up
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "11"))]
    pub sync_attempts: u32,

    /// Timeout to wait for each bootloader reply
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "2000"))]
    pub response_timeout_ms: u32,

    /// Period to poll for bootloader replies
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1"))]
    pub poll_delay_ms: u32,

    /// Size of each read from the image file
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1024"))]
    pub chunk_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sync_attempts: 11,
            response_timeout_ms: 2000,
            poll_delay_ms: 1,
            chunk_size: 1024,
        }
    }
}

/// Cooperative cancellation flag, checked between probes and between chunks.
///
/// Clones share the same flag, so one can be handed to a signal handler.
#[derive(Clone, Debug, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
