//! Image streaming and block padding.

use std::io::{Read, Seek, SeekFrom};

use embedded_hal::blocking::delay::DelayMs;

use crate::protocol::Header;
use crate::transport::Transport;
use crate::{Cancel, Error, SerialPort};

/// Padding progress is reported every this many bytes
const PADDING_REPORT_INTERVAL: u64 = 64;

/// Firmware image with its length fixed at open time
pub struct Image<R> {
    reader: R,
    len: u64,
}

impl<R: Read + Seek> Image<R> {
    /// Measure the image by seeking to its end and back
    pub fn new(mut reader: R) -> std::io::Result<Self> {
        let pos = reader.seek(SeekFrom::Current(0))?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(pos))?;

        Ok(Self {
            reader,
            len: end.saturating_sub(pos),
        })
    }
}

impl<R> Image<R> {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bytes placed on the wire after the header
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Counters {
    /// Blocks announced in the header
    pub blocks: u16,
    /// Image bytes sent
    pub body: u64,
    /// Zero bytes sent after the image
    pub padding: u64,
}

impl Counters {
    pub fn total(&self) -> u64 {
        self.body + self.padding
    }
}

/// Receives transfer progress
pub trait Progress {
    fn start(&mut self, _total: u64) {}

    fn update(&mut self, _sent: u64) {}

    fn finish(&mut self) {}
}

impl Progress for () {}

#[cfg(feature = "indicatif")]
impl Progress for indicatif::ProgressBar {
    fn start(&mut self, total: u64) {
        self.set_length(total);
        self.set_position(0);
    }

    fn update(&mut self, sent: u64) {
        self.set_position(sent);
    }

    fn finish(&mut self) {
        indicatif::ProgressBar::finish(self);
    }
}

/// Result of streaming an image
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Streamed {
    pub counters: Counters,
    /// Cancellation stopped the image body early
    pub interrupted: bool,
}

/// Stream the image body, then zero padding up to the announced block count.
///
/// `cancel` is checked before each chunk read. Once set no more image data
/// is read, but padding is still sent so the device receives the number of
/// bytes the header announced.
pub fn stream<P, D, E, R>(
    transport: &mut Transport<P, D, E>,
    image: &mut Image<R>,
    header: &Header,
    chunk_size: usize,
    cancel: &Cancel,
    progress: &mut dyn Progress,
) -> Result<Streamed, Error<E>>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
    R: Read,
{
    let total = header.transfer_len();
    let mut counters = Counters {
        blocks: header.blocks(),
        ..Counters::default()
    };
    let mut interrupted = false;

    // Never read past the length announced in the header
    let mut body = (&mut image.reader).take(image.len);
    let mut buff = vec![0u8; chunk_size.max(1)];

    progress.start(total);

    loop {
        if cancel.is_cancelled() {
            warn!("Interrupted after {} image bytes", counters.body);
            interrupted = true;
            break;
        }

        let n = match body.read(&mut buff) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        transport.write(&buff[..n])?;
        counters.body += n as u64;

        progress.update(counters.total());
    }

    debug!(
        "Image body sent ({} bytes), padding {} bytes",
        counters.body,
        total.saturating_sub(counters.body)
    );

    while counters.total() < total {
        transport.write(&[0])?;
        counters.padding += 1;

        if counters.padding % PADDING_REPORT_INTERVAL == 0 {
            progress.update(counters.total());
        }
    }

    progress.update(counters.total());
    progress.finish();

    Ok(Streamed {
        counters,
        interrupted,
    })
}
