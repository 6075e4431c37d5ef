use std::io::{Read, Seek};

use embedded_hal::blocking::delay::DelayMs;

use crate::protocol::Header;
use crate::stream::{self, Counters, Image, Progress};
use crate::sync::{self, SyncStatus};
use crate::transport::Transport;
use crate::{Cancel, Error, Options, SerialPort};

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum State {
    Idle,
    Syncing,
    HeaderSent,
    Streaming,
    Complete,
    SyncTimeout,
    Interrupted,
    Failed,
}

/// Terminal result of a load session
#[derive(Debug)]
pub enum Outcome<E: core::fmt::Debug> {
    /// Image and padding sent in full
    Sent(Counters),
    /// Bootloader never replied ready, nothing but probes was sent
    SyncTimeout { attempts: u32 },
    /// Cancelled, counters are empty if this happened before the header
    Interrupted(Counters),
    /// Transport or image failure, the device state is unknown
    Failed(Error<E>),
}

impl<E: core::fmt::Debug> Outcome<E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Sent(_))
    }

    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Sent(_) => 0,
            Outcome::SyncTimeout { .. } => 1,
            Outcome::Interrupted(_) => 130,
            Outcome::Failed(_) => 1,
        }
    }
}

/// Drives a single load: sync, header, image.
///
/// A session cannot be resumed. After any failure past the header the
/// device must be reset and the whole load repeated.
pub struct Loader<P, D, E>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    state: State,
    options: Options,
    transport: Transport<P, D, E>,
    cancel: Cancel,
}

impl<P, D, E> Loader<P, D, E>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    /// Create a new loader over an open serial port
    pub fn new(port: P, delay: D, options: Options) -> Self {
        let transport = Transport::new(
            port,
            delay,
            options.response_timeout_ms,
            options.poll_delay_ms,
        );

        Self {
            state: State::Idle,
            options,
            transport,
            cancel: Cancel::new(),
        }
    }

    /// Use an externally controlled cancellation flag
    pub fn with_cancel(mut self, cancel: Cancel) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch the session state
    pub fn state(&self) -> State {
        self.state
    }

    pub fn cancel_handle(&self) -> Cancel {
        self.cancel.clone()
    }

    /// Execute the session, closing the port and the image on every path
    pub fn run<R: Read + Seek>(
        &mut self,
        mut image: Image<R>,
        progress: &mut dyn Progress,
    ) -> Outcome<E> {
        let outcome = self.load(&mut image, progress);

        self.state = match &outcome {
            Outcome::Sent(_) => State::Complete,
            Outcome::SyncTimeout { .. } => State::SyncTimeout,
            Outcome::Interrupted(_) => State::Interrupted,
            Outcome::Failed(_) => State::Failed,
        };

        self.transport.close();
        drop(image);

        outcome
    }

    fn load<R: Read + Seek>(
        &mut self,
        image: &mut Image<R>,
        progress: &mut dyn Progress,
    ) -> Outcome<E> {
        if self.state != State::Idle {
            warn!("Loader reused after {:?}", self.state);
            return Outcome::Failed(Error::Closed);
        }

        // Validate before anything reaches the wire
        let header = match Header::for_image(image.len()) {
            Ok(h) => h,
            Err(e) => return Outcome::Failed(e.into()),
        };

        debug!("Awaiting bootloader");
        self.state = State::Syncing;

        match sync::sync(&mut self.transport, self.options.sync_attempts, &self.cancel) {
            Ok(SyncStatus::Ready { .. }) => info!("Synced"),
            Ok(SyncStatus::TimedOut { attempts }) => return Outcome::SyncTimeout { attempts },
            Ok(SyncStatus::Interrupted) => return Outcome::Interrupted(Counters::default()),
            Err(e) => return Outcome::Failed(e),
        }

        let encoded = header.encode();
        debug!(
            "Sending header for {} blocks: {}",
            header.blocks(),
            hex::encode(encoded)
        );

        if let Err(e) = self.transport.write(&encoded) {
            return Outcome::Failed(e);
        }
        self.state = State::HeaderSent;

        info!("Sending {} blocks", header.blocks());
        self.state = State::Streaming;
        let streamed = match stream::stream(
            &mut self.transport,
            image,
            &header,
            self.options.chunk_size,
            &self.cancel,
            progress,
        ) {
            Ok(s) => s,
            Err(e) => return Outcome::Failed(e),
        };

        // The device sends nothing back after the image
        if streamed.interrupted {
            Outcome::Interrupted(streamed.counters)
        } else {
            Outcome::Sent(streamed.counters)
        }
    }
}
