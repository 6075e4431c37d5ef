use core::marker::PhantomData;

use embedded_hal::blocking::delay::DelayMs;
use nb::block;

use crate::protocol::{LINE_DELIMITER, MAX_RESPONSE_LEN};
use crate::{Error, SerialPort};

/// Timeout-bounded line reads and blocking writes over a serial port.
///
/// Writes have no timeout: a device that stops draining blocks the caller
/// indefinitely.
pub struct Transport<P, D, E>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    port: Option<P>,
    delay: D,
    response_timeout_ms: u32,
    poll_delay_ms: u32,
    _err: PhantomData<E>,
}

impl<P, D, E> Transport<P, D, E>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    pub fn new(port: P, delay: D, response_timeout_ms: u32, poll_delay_ms: u32) -> Self {
        Self {
            port: Some(port),
            delay,
            response_timeout_ms,
            // Zero would never advance the timeout
            poll_delay_ms: poll_delay_ms.max(1),
            _err: PhantomData,
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Write all bytes, blocking until the driver accepts each one
    pub fn write(&mut self, data: &[u8]) -> Result<(), Error<E>> {
        let port = self.port.as_mut().ok_or(Error::Closed)?;

        for b in data {
            block!(port.write(*b)).map_err(Error::Serial)?;
        }
        block!(port.flush()).map_err(Error::Serial)?;

        Ok(())
    }

    /// Read until a line delimiter arrives or the response timeout elapses.
    ///
    /// Whatever was received is returned, so a short or empty result just
    /// means no complete reply yet.
    pub fn read_line(&mut self) -> Result<Vec<u8>, Error<E>> {
        let port = self.port.as_mut().ok_or(Error::Closed)?;
        let mut line = Vec::new();
        let mut t = 0;

        loop {
            match port.read() {
                Err(nb::Error::WouldBlock) => (),
                Err(nb::Error::Other(e)) => return Err(Error::Serial(e)),
                Ok(v) => {
                    line.push(v);
                    if v == LINE_DELIMITER || line.len() >= MAX_RESPONSE_LEN {
                        return Ok(line);
                    }
                    continue;
                }
            }

            if t >= self.response_timeout_ms {
                return Ok(line);
            }

            self.delay.delay_ms(self.poll_delay_ms);
            t += self.poll_delay_ms;
        }
    }

    /// Flush and release the port, further calls do nothing
    pub fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = block!(port.flush()) {
                warn!("Flush on close failed: {:?}", e);
            }
            debug!("Serial port closed");
        }
    }
}

impl<P, D, E> Drop for Transport<P, D, E>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockPort};

    #[test]
    fn read_line_stops_at_delimiter() {
        let mut port = MockPort::new().with_pending(b"OK\r\nnext\n");
        let mut delay = MockDelay::default();
        let mut t = Transport::new(&mut port, &mut delay, 2000, 1);

        assert_eq!(t.read_line().unwrap(), b"OK\r\n".to_vec());
        assert_eq!(t.read_line().unwrap(), b"next\n".to_vec());
        drop(t);

        assert_eq!(delay.elapsed_ms, 0);
    }

    #[test]
    fn read_line_times_out_with_partial_reply() {
        let mut port = MockPort::new().with_pending(b"O");
        let mut delay = MockDelay::default();
        let mut t = Transport::new(&mut port, &mut delay, 2000, 10);

        assert_eq!(t.read_line().unwrap(), b"O".to_vec());
        assert_eq!(t.read_line().unwrap(), Vec::<u8>::new());
        drop(t);

        assert_eq!(delay.elapsed_ms, 4000);
    }

    #[test]
    fn read_line_is_bounded_without_delimiter() {
        let noise = vec![b'x'; MAX_RESPONSE_LEN + 10];
        let mut port = MockPort::new().with_pending(&noise);
        let mut delay = MockDelay::default();
        let mut t = Transport::new(&mut port, &mut delay, 2000, 1);

        assert_eq!(t.read_line().unwrap().len(), MAX_RESPONSE_LEN);
        assert_eq!(t.read_line().unwrap().len(), 10);
    }

    #[test]
    fn write_reports_serial_errors() {
        let mut port = MockPort::new().fail_after(2);
        let mut delay = MockDelay::default();
        let mut t = Transport::new(&mut port, &mut delay, 2000, 1);

        match t.write(b"abc") {
            Err(Error::Serial(std::io::ErrorKind::BrokenPipe)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
        drop(t);

        assert_eq!(port.written, b"ab".to_vec());
    }

    #[test]
    fn close_is_idempotent() {
        let mut port = MockPort::new();
        let mut delay = MockDelay::default();
        let mut t = Transport::new(&mut port, &mut delay, 2000, 1);

        t.write(b"x").unwrap();
        t.close();
        t.close();
        assert!(!t.is_open());

        match t.write(b"y") {
            Err(Error::Closed) => (),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(t.read_line(), Err(Error::Closed)));
        drop(t);

        assert_eq!(port.written, b"x".to_vec());
        // One for the write, one on close
        assert_eq!(port.flushes, 2);
    }
}
