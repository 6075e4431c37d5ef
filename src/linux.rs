use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::time::Duration;

use linux_embedded_hal::{Delay, Serial};
use serial_core::{
    BaudRate, CharSize, FlowControl, Parity, SerialDevice as _, SerialPortSettings as _,
    StopBits,
};

use crate::protocol::BAUD_RATE;
use crate::{Error, Loader, Options};

/// Driver level read timeout, reply timing is handled by the transport poll loop
const DRIVER_READ_TIMEOUT: Duration = Duration::from_millis(1);

fn open(path: &Path) -> Result<Serial, serial_core::Error> {
    let mut port = Serial::open(path)?;

    // 8N1, no flow control
    let mut settings = port.0.read_settings()?;

    settings.set_char_size(CharSize::Bits8);
    settings.set_stop_bits(StopBits::Stop1);
    settings.set_baud_rate(BaudRate::from_speed(BAUD_RATE))?;
    settings.set_flow_control(FlowControl::FlowNone);
    settings.set_parity(Parity::ParityNone);

    port.0.write_settings(&settings)?;
    port.0.set_timeout(DRIVER_READ_TIMEOUT)?;

    Ok(port)
}

impl Loader<Serial, Delay, IoErrorKind> {
    /// Create a loader on a linux serial device
    pub fn linux<P: AsRef<Path>>(device: P, options: Options) -> Result<Self, Error<IoErrorKind>> {
        let device = device.as_ref();

        debug!("Opening {} at {} baud", device.display(), BAUD_RATE);

        let port = open(device).map_err(|e| Error::Open {
            device: device.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self::new(port, Delay {}, options))
    }
}
