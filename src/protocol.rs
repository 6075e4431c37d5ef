//! Wire format of the LPC43xx UART bootstrap loader.
//!
//! A load is a probe/reply handshake, then a fixed header (magic plus a 14
//! byte descriptor), then the image body zero padded to whole blocks:
//!
//! ```text
//! +-------+-------------+----------+----------+------------+
//! | Magic | Block count | Reserved | Reserved | Sentinel   |
//! +-------+-------------+----------+----------+------------+
//! | 2     | u16 LE      | u32 LE   | u32 LE   | u32 LE     |
//! | DA FF | blocks      | 0        | 0        | 0xFFFFFFFF |
//! +-------+-------------+----------+----------+------------+
//! ```

use std::convert::TryFrom;

use byteorder::{ByteOrder, LittleEndian};

/// Probe character sent while waiting for the bootloader
pub const SYNC_PROBE: u8 = b'?';

/// Marker the bootloader includes in its reply once it is ready
pub const READY_MARKER: &str = "OK";

/// Terminates a bootloader reply
pub const LINE_DELIMITER: u8 = b'\n';

/// Upper bound on a single reply, in case the device never sends a delimiter
pub const MAX_RESPONSE_LEN: usize = 256;

/// Fixed line rate of the bootstrap loader
pub const BAUD_RATE: usize = 115_200;

/// Transfer unit expected by the device
pub const BLOCK_SIZE: u64 = 512;

/// Header magic
pub const HEADER_MAGIC: [u8; 2] = [0xDA, 0xFF];

/// Trailing header word
pub const HEADER_SENTINEL: u32 = 0xFFFF_FFFF;

/// Length of the packed fields following the magic
pub const DESCRIPTOR_LEN: usize = 14;

/// Encoded header length, magic included
pub const HEADER_LEN: usize = HEADER_MAGIC.len() + DESCRIPTOR_LEN;

/// Number of blocks announced for an image of `len` bytes.
///
/// This is `round((len + 512) / 512)` with ties going to the even block
/// count, so one block more than strictly needed is usually reserved.
/// The device was observed to expect exactly this value.
pub fn block_count(len: u64) -> u64 {
    let n = len + BLOCK_SIZE;
    let (q, r) = (n / BLOCK_SIZE, n % BLOCK_SIZE);

    match r.cmp(&(BLOCK_SIZE / 2)) {
        std::cmp::Ordering::Less => q,
        std::cmp::Ordering::Greater => q + 1,
        std::cmp::Ordering::Equal => q + (q & 1),
    }
}

/// Whether a bootloader reply signals readiness.
///
/// Replies are decoded as latin-1 and searched for [`READY_MARKER`] anywhere,
/// since the device may echo probes or print boot text around it.
pub fn is_ready(reply: &[u8]) -> bool {
    let text: String = reply.iter().map(|&b| b as char).collect();
    text.contains(READY_MARKER)
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("image of {len} bytes needs {blocks} blocks, more than a header can announce")]
pub struct ImageTooLarge {
    pub len: u64,
    pub blocks: u64,
}

/// Transfer header sent once after sync
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    blocks: u16,
}

impl Header {
    /// Build the header for an image of `len` bytes
    pub fn for_image(len: u64) -> Result<Self, ImageTooLarge> {
        let blocks = block_count(len);

        match u16::try_from(blocks) {
            Ok(blocks) => Ok(Self { blocks }),
            Err(_) => Err(ImageTooLarge { len, blocks }),
        }
    }

    /// Announced number of blocks
    pub fn blocks(&self) -> u16 {
        self.blocks
    }

    /// Exact number of bytes that must follow the header
    pub fn transfer_len(&self) -> u64 {
        u64::from(self.blocks) * BLOCK_SIZE
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buff = [0u8; HEADER_LEN];

        buff[..2].copy_from_slice(&HEADER_MAGIC);
        LittleEndian::write_u16(&mut buff[2..4], self.blocks);
        LittleEndian::write_u32(&mut buff[4..8], 0);
        LittleEndian::write_u32(&mut buff[8..12], 0);
        LittleEndian::write_u32(&mut buff[12..16], HEADER_SENTINEL);

        buff
    }
}
