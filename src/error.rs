use core::fmt::Debug;

use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

/// All possible errors emitted by the driver
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<SpiError> {
    /// Internal Spi error
    Spi(SpiError),

    /// Address or length falls outside the device
    OutOfBounds,

    /// Address not aligned to the requested erase unit
    NotAligned,

    /// More bytes staged for one engine pass than fit in a sector
    OversizeWrite,

    /// Seek target outside the device, or an unsupported origin
    InvalidSeek,
}

impl<SpiError> NorFlashError for Error<SpiError>
where
    SpiError: Debug,
{
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Error::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            Error::NotAligned => NorFlashErrorKind::NotAligned,
            Error::Spi(_) | Error::OversizeWrite | Error::InvalidSeek => NorFlashErrorKind::Other,
        }
    }
}

impl<SpiError> embedded_io::Error for Error<SpiError>
where
    SpiError: Debug,
{
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Error::Spi(_) => embedded_io::ErrorKind::Other,
            Error::OutOfBounds | Error::NotAligned | Error::OversizeWrite | Error::InvalidSeek => {
                embedded_io::ErrorKind::InvalidInput
            }
        }
    }
}
