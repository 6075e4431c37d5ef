use embedded_hal::blocking::delay::DelayMs;

use crate::protocol::{is_ready, SYNC_PROBE};
use crate::transport::Transport;
use crate::{Cancel, Error, SerialPort};

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum SyncStatus {
    /// Bootloader replied ready to the given probe
    Ready { attempts: u32 },
    /// No ready reply within the attempt ceiling
    TimedOut { attempts: u32 },
    /// Cancelled before the bootloader replied
    Interrupted,
}

/// Probe the bootloader until it reports ready.
///
/// Probing is repeated because the device may still be printing boot text
/// when the first probes arrive.
pub fn sync<P, D, E>(
    transport: &mut Transport<P, D, E>,
    max_attempts: u32,
    cancel: &Cancel,
) -> Result<SyncStatus, Error<E>>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Ok(SyncStatus::Interrupted);
        }

        transport.write(&[SYNC_PROBE])?;

        let reply = transport.read_line()?;
        if is_ready(&reply) {
            debug!("Bootloader ready after {} probe(s)", attempt);
            return Ok(SyncStatus::Ready { attempts: attempt });
        }

        trace!("Probe {}: reply {}", attempt, hex::encode(&reply));
    }

    Ok(SyncStatus::TimedOut { attempts: max_attempts })
}
