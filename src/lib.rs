#![cfg_attr(not(test), no_std)]
//! This is a platform agnostic driver for the GigaDevice GD25Q serial NOR flash series using
//! [embedded-hal](https://github.com/rust-embedded/embedded-hal).
//!
//! Multiple chips are supported:
//! * GD25Q40 (512kB)
//! * GD25Q80 (1MB)
//! * GD25Q16 (2MB)
//! * GD25Q32 (4MB)
//! * GD25Q64 (8MB)
//! * GD25Q128 (16MB)
//!
//! Two surfaces are offered per driver, in blocking and async flavours:
//! * [`blocking::GD25Q`] / [`asynchronous::AsyncGD25Q`]: the raw chip commands plus the
//!   aligned `embedded-storage` `NorFlash` traits,
//! * [`blocking::FlashFile`] / [`asynchronous::AsyncFlashFile`]: a seekable, byte
//!   addressable view with a read-modify-write engine underneath, exposing the
//!   `embedded-io` `Read`/`Write`/`Seek` and `embedded-storage` `Storage` traits.

pub mod address;
pub mod asynchronous;
pub mod blocking;
mod command;
pub mod error;
pub mod register;

pub use address::{Address, BLOCK32_SIZE, BLOCK64_SIZE, PAGE_SIZE, SECTOR_SIZE};
pub use embedded_io::SeekFrom;

use crate::error::Error;

/// Value every byte of an erased region reads back as.
pub const ERASED_BYTE: u8 = 0xFF;

/// Largest transfer staged through a handle's buffers in one bus exchange.
pub const MAX_TRANSFER: usize = SECTOR_SIZE as usize;

// Readiness polling: attempts and the delay between them.
pub(crate) const READY_RETRIES: u32 = 5;
pub(crate) const READY_POLL_MS: u32 = 5;

/// Transmit and receive staging buffers of one open handle.
///
/// The transmit half stages caller bytes (widened to a full sector image when an
/// erase intervenes); the receive half holds the current sector contents read back
/// before a partial write is evaluated.
pub(crate) struct TransferBuffers {
    pub(crate) tx: [u8; MAX_TRANSFER],
    pub(crate) rx: [u8; MAX_TRANSFER],
}

impl TransferBuffers {
    pub(crate) const fn new() -> Self {
        Self {
            tx: [ERASED_BYTE; MAX_TRANSFER],
            rx: [ERASED_BYTE; MAX_TRANSFER],
        }
    }
}

/// Whether programming `incoming` over `current` needs the containing sector erased first.
///
/// Programming can only clear bits. A position whose current byte is fully erased can
/// take any value; a position already holding the incoming byte needs no change; any
/// other position cannot be reached by programming alone.
pub fn needs_erase(current: &[u8], incoming: &[u8]) -> bool {
    current
        .iter()
        .zip(incoming)
        .any(|(&old, &new)| old != ERASED_BYTE && old != new)
}

pub(crate) fn check_erase<E>(capacity: usize, from: u32, to: u32) -> Result<(), Error<E>> {
    let capacity = capacity as u32;
    if from > to || to > capacity {
        return Err(Error::OutOfBounds);
    }
    if from % SECTOR_SIZE != 0 || to % SECTOR_SIZE != 0 {
        return Err(Error::NotAligned);
    }
    Ok(())
}

pub(crate) fn check_write<E>(capacity: usize, offset: u32, length: usize) -> Result<(), Error<E>> {
    let capacity = capacity as u32;
    let length = length as u32;
    if length > capacity || offset > capacity - length {
        return Err(Error::OutOfBounds);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erased_range_never_needs_erase() {
        assert!(!needs_erase(&[0xFF; 8], &[0x00; 8]));
    }

    #[test]
    fn matching_bytes_need_no_erase() {
        assert!(!needs_erase(&[0xFF, 0xA5, 0xFF], &[0x12, 0xA5, 0x00]));
    }

    #[test]
    fn one_conflicting_byte_forces_erase() {
        assert!(needs_erase(&[0xFF, 0xA5, 0xFF], &[0x12, 0xA4, 0x00]));
        // A subset bit pattern still counts as a conflict; the predicate
        // compares whole bytes, not bit coverage.
        assert!(needs_erase(&[0b1111_0000], &[0b1100_0000]));
    }

    #[test]
    fn empty_range_needs_no_erase() {
        assert!(!needs_erase(&[], &[]));
    }

    #[test]
    fn write_bounds_are_end_exclusive() {
        assert!(check_write::<()>(0x1000, 0x0FFF, 1).is_ok());
        assert!(check_write::<()>(0x1000, 0, 0x1000).is_ok());
        assert_eq!(check_write::<()>(0x1000, 0x0FFF, 2), Err(Error::OutOfBounds));
        assert_eq!(check_write::<()>(0x1000, 0x1000, 1), Err(Error::OutOfBounds));
        assert_eq!(check_write::<()>(0x1000, 0, 0x1001), Err(Error::OutOfBounds));
    }

    #[test]
    fn erase_bounds_require_alignment() {
        assert!(check_erase::<()>(0x4000, 0x1000, 0x3000).is_ok());
        assert_eq!(check_erase::<()>(0x4000, 0x1001, 0x3000), Err(Error::NotAligned));
        assert_eq!(check_erase::<()>(0x4000, 0x3000, 0x1000), Err(Error::OutOfBounds));
        assert_eq!(check_erase::<()>(0x4000, 0x1000, 0x5000), Err(Error::OutOfBounds));
    }
}
