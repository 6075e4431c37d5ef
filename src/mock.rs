//! Scripted serial port and delay for unit tests

use std::collections::VecDeque;
use std::io::ErrorKind;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};

use crate::protocol::SYNC_PROBE;

/// Serial port that answers each sync probe with the next scripted reply
#[derive(Debug, Default)]
pub struct MockPort {
    /// Everything written to the port, probes included
    pub written: Vec<u8>,
    /// Number of successful flushes
    pub flushes: usize,
    replies: VecDeque<Vec<u8>>,
    pending: VecDeque<u8>,
    fail_after: Option<usize>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies, one consumed per probe received
    pub fn with_replies<I, B>(mut self, replies: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        self.replies
            .extend(replies.into_iter().map(|r| r.as_ref().to_vec()));
        self
    }

    /// Bytes already waiting to be read, as if sent unprompted
    pub fn with_pending(mut self, data: &[u8]) -> Self {
        self.pending.extend(data);
        self
    }

    /// Fail every write once `n` bytes have been accepted
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn probes(&self) -> usize {
        self.written.iter().take_while(|&&b| b == SYNC_PROBE).count()
    }

    /// Bytes written after the sync probes
    pub fn payload(&self) -> &[u8] {
        &self.written[self.probes()..]
    }
}

impl Write<u8> for MockPort {
    type Error = ErrorKind;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        if let Some(n) = self.fail_after {
            if self.written.len() >= n {
                return Err(nb::Error::Other(ErrorKind::BrokenPipe));
            }
        }

        self.written.push(word);

        if word == SYNC_PROBE {
            if let Some(r) = self.replies.pop_front() {
                self.pending.extend(r);
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        self.flushes += 1;
        Ok(())
    }
}

impl Read<u8> for MockPort {
    type Error = ErrorKind;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.pending.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

/// Delay that only records how long it was asked to wait
#[derive(Debug, Default)]
pub struct MockDelay {
    pub elapsed_ms: u64,
}

impl DelayMs<u32> for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ms += u64::from(ms);
    }
}

// Borrowed forms, so tests can inspect the port after the loader closes it

impl Write<u8> for &mut MockPort {
    type Error = ErrorKind;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        (**self).write(word)
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        (**self).flush()
    }
}

impl Read<u8> for &mut MockPort {
    type Error = ErrorKind;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        (**self).read()
    }
}

impl DelayMs<u32> for &mut MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}
