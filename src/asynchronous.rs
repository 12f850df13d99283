use crate::{
    address::{Address, Block32, Block64, Sector, BLOCK32_SIZE, BLOCK64_SIZE, PAGE_SIZE, SECTOR_SIZE},
    check_erase, check_write,
    command::Command,
    error::Error,
    needs_erase,
    register::{DeviceId, JedecId, ManufacturerId, MemoryDensity, MemoryType, StatusRegister},
    SeekFrom, TransferBuffers, MAX_TRANSFER, READY_POLL_MS, READY_RETRIES,
};
use embedded_hal::spi::Operation;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;

/// Async type alias for the GD25Q40
pub type AsyncGD25Q40<SPI, D> = AsyncGD25Q<0x07FFFF, SPI, D>;

/// Async type alias for the GD25Q80
pub type AsyncGD25Q80<SPI, D> = AsyncGD25Q<0x0FFFFF, SPI, D>;

/// Async type alias for the GD25Q16
pub type AsyncGD25Q16<SPI, D> = AsyncGD25Q<0x1FFFFF, SPI, D>;

/// Async type alias for the GD25Q32
pub type AsyncGD25Q32<SPI, D> = AsyncGD25Q<0x3FFFFF, SPI, D>;

/// Async type alias for the GD25Q64
pub type AsyncGD25Q64<SPI, D> = AsyncGD25Q<0x7FFFFF, SPI, D>;

/// Async type alias for the GD25Q128
pub type AsyncGD25Q128<SPI, D> = AsyncGD25Q<0xFFFFFF, SPI, D>;

/// Async type alias for an [`AsyncFlashFile`] over the GD25Q40
pub type AsyncGD25Q40File<SPI, D> = AsyncFlashFile<0x07FFFF, SPI, D>;

/// Async type alias for an [`AsyncFlashFile`] over the GD25Q80
pub type AsyncGD25Q80File<SPI, D> = AsyncFlashFile<0x0FFFFF, SPI, D>;

/// Async type alias for an [`AsyncFlashFile`] over the GD25Q16
pub type AsyncGD25Q16File<SPI, D> = AsyncFlashFile<0x1FFFFF, SPI, D>;

/// Async type alias for an [`AsyncFlashFile`] over the GD25Q32
pub type AsyncGD25Q32File<SPI, D> = AsyncFlashFile<0x3FFFFF, SPI, D>;

/// Async type alias for an [`AsyncFlashFile`] over the GD25Q64
pub type AsyncGD25Q64File<SPI, D> = AsyncFlashFile<0x7FFFFF, SPI, D>;

/// Async type alias for an [`AsyncFlashFile`] over the GD25Q128
pub type AsyncGD25Q128File<SPI, D> = AsyncFlashFile<0xFFFFFF, SPI, D>;

/// The generic low level async GD25Q driver: one method per chip command
pub struct AsyncGD25QLowLevel<const SIZE: u32, SPI, D>
where
    SPI: SpiDevice,
{
    spi: SPI,
    delay: D,
}

impl<const SIZE: u32, SPI, D, E> AsyncGD25QLowLevel<SIZE, SPI, D>
where
    SPI: SpiDevice<Error = E>,
    D: DelayNs,
{
    /// Total device capacity in bytes; `SIZE` is the highest valid address.
    pub const CAPACITY: usize = SIZE as usize + 1;

    pub fn new(spi: SPI, delay: D) -> Self {
        Self { spi, delay }
    }

    /// Release the bus and the delay provider.
    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }

    pub fn verify_addr(addr: Address) -> Result<u32, Error<E>> {
        let val: u32 = addr.into();
        if val > SIZE {
            return Err(Error::OutOfBounds);
        }
        Ok(val)
    }

    async fn command_write(&mut self, bytes: &[u8]) -> Result<(), Error<E>> {
        self.spi.write(bytes).await.map_err(Error::Spi)
    }

    async fn command_transfer(&mut self, bytes: &mut [u8]) -> Result<(), Error<E>> {
        self.spi.transfer_in_place(bytes).await.map_err(Error::Spi)
    }

    async fn addr_command(&mut self, addr: Address, cmd: Command) -> Result<(), Error<E>> {
        let addr_val = Self::verify_addr(addr)?;
        let cmd: [u8; 4] = [
            cmd as u8,
            (addr_val >> 16) as u8,
            (addr_val >> 8) as u8,
            addr_val as u8,
        ];
        self.command_write(&cmd).await
    }

    async fn read_base(
        &mut self,
        addr: Address,
        cmd: Command,
        buff: &mut [u8],
    ) -> Result<(), Error<E>> {
        let addr_val = Self::verify_addr(addr)?;
        let cmd: [u8; 4] = [
            cmd as u8,
            (addr_val >> 16) as u8,
            (addr_val >> 8) as u8,
            addr_val as u8,
        ];
        self.spi
            .transaction(&mut [Operation::Write(&cmd), Operation::Read(buff)])
            .await
            .map_err(Error::Spi)
    }

    async fn write_base(&mut self, addr: Address, cmd: Command, buff: &[u8]) -> Result<(), Error<E>> {
        let addr_val = Self::verify_addr(addr)?;
        let cmd: [u8; 4] = [
            cmd as u8,
            (addr_val >> 16) as u8,
            (addr_val >> 8) as u8,
            addr_val as u8,
        ];
        self.spi
            .transaction(&mut [Operation::Write(&cmd), Operation::Write(buff)])
            .await
            .map_err(Error::Spi)
    }

    /// Read n bytes starting at an address
    pub async fn read(&mut self, addr: Address, buff: &mut [u8]) -> Result<(), Error<E>> {
        self.read_base(addr, Command::Read, buff).await
    }

    /// Program up to one page worth of bytes at an address.
    ///
    /// The chunk must not run past the end of the page containing `addr`; the chip
    /// would wrap around within the page. Write must be enabled, see
    /// [`Self::write_enable`].
    pub async fn page_program(&mut self, addr: Address, buff: &[u8]) -> Result<(), Error<E>> {
        if buff.len() > addr.page_remaining() {
            return Err(Error::OutOfBounds);
        }
        self.write_base(addr, Command::ProgramPage, buff).await
    }

    /// Erase a 4kB sector. Write must be enabled, see [`Self::write_enable`]
    pub async fn erase_sector(&mut self, sector: Sector) -> Result<(), Error<E>> {
        self.addr_command(Address::from_sector(sector), Command::SectorErase)
            .await
    }

    /// Erase a 32kB block. Write must be enabled, see [`Self::write_enable`]
    pub async fn erase_block32(&mut self, block: Block32) -> Result<(), Error<E>> {
        self.addr_command(Address::from_block32(block), Command::Block32Erase)
            .await
    }

    /// Erase a 64kB block. Write must be enabled, see [`Self::write_enable`]
    pub async fn erase_block64(&mut self, block: Block64) -> Result<(), Error<E>> {
        self.addr_command(Address::from_block64(block), Command::Block64Erase)
            .await
    }

    /// Erase the whole chip. Write must be enabled, see [`Self::write_enable`]
    pub async fn erase_chip(&mut self) -> Result<(), Error<E>> {
        self.command_write(&[Command::ChipErase as u8]).await
    }

    /// Enable write operations
    pub async fn write_enable(&mut self) -> Result<(), Error<E>> {
        self.command_write(&[Command::WriteEnable as u8]).await
    }

    /// Disable write operations
    pub async fn write_disable(&mut self) -> Result<(), Error<E>> {
        self.command_write(&[Command::WriteDisable as u8]).await
    }

    /// Read the status register
    pub async fn read_status(&mut self) -> Result<StatusRegister, Error<E>> {
        let mut command: [u8; 2] = [Command::ReadStatus as u8, 0];
        self.command_transfer(&mut command).await?;
        Ok(command[1].into())
    }

    /// Read the JEDEC identification of the device
    pub async fn read_jedec_id(&mut self) -> Result<JedecId, Error<E>> {
        let mut command = [Command::ReadJedecId as u8, 0, 0, 0];
        self.command_transfer(&mut command).await?;
        Ok(JedecId {
            manufacturer: ManufacturerId(command[1]),
            memory_type: MemoryType(command[2]),
            density: MemoryDensity(command[3]),
        })
    }

    /// Read the manufacturer ID and the device ID
    pub async fn read_device_id(&mut self) -> Result<(ManufacturerId, DeviceId), Error<E>> {
        let dummy = Command::Dummy as u8;
        let mut command = [Command::ReadDeviceId as u8, dummy, dummy, 0x00, 0, 0];
        self.command_transfer(&mut command).await?;
        Ok((ManufacturerId(command[4]), DeviceId(command[5])))
    }

    /// Poll the busy bit until the chip reports ready.
    ///
    /// The poll is bounded: after a fixed number of attempts it gives up and still
    /// returns `Ok`, leaving the chip to stretch or reject the next command itself.
    /// Bus errors during a poll do propagate.
    pub async fn wait_ready(&mut self) -> Result<(), Error<E>> {
        for _ in 0..READY_RETRIES {
            if !self.read_status().await?.wip_bit {
                return Ok(());
            }
            self.delay.delay_ms(READY_POLL_MS).await;
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("flash not ready after {=u32} status polls", READY_RETRIES);
        Ok(())
    }
}

/// The higher level async GD25Q driver: sequences write-enable and readiness
/// polling around every command
pub struct AsyncGD25Q<const SIZE: u32, SPI, D>
where
    SPI: SpiDevice,
{
    ll: AsyncGD25QLowLevel<SIZE, SPI, D>,
}

impl<const SIZE: u32, SPI, D, E> AsyncGD25Q<SIZE, SPI, D>
where
    SPI: SpiDevice<Error = E>,
    D: DelayNs,
{
    pub const CAPACITY: usize = AsyncGD25QLowLevel::<SIZE, SPI, D>::CAPACITY;

    pub fn new(spi: SPI, delay: D) -> Self {
        Self {
            ll: AsyncGD25QLowLevel::new(spi, delay),
        }
    }

    pub fn capacity(&self) -> usize {
        Self::CAPACITY
    }

    /// Release the bus and the delay provider.
    pub fn release(self) -> (SPI, D) {
        self.ll.release()
    }

    async fn prepare_write(&mut self) -> Result<(), Error<E>> {
        self.ll.write_enable().await?;
        self.ll.wait_ready().await
    }

    /// Read n bytes starting at an address
    pub async fn read(&mut self, addr: Address, buff: &mut [u8]) -> Result<(), Error<E>> {
        self.ll.wait_ready().await?;
        self.ll.read(addr, buff).await
    }

    /// Program one page-bounded chunk at an address, returning the accepted byte count.
    ///
    /// A successful transaction carries the whole chunk; there is no partial
    /// acceptance short of a bus error.
    pub async fn program_page(&mut self, addr: Address, buff: &[u8]) -> Result<usize, Error<E>> {
        self.prepare_write().await?;
        self.ll.page_program(addr, buff).await?;
        Ok(buff.len())
    }

    /// Erase a 4kB sector
    pub async fn erase_sector(&mut self, sector: Sector) -> Result<(), Error<E>> {
        self.prepare_write().await?;
        self.ll.erase_sector(sector).await?;
        #[cfg(feature = "defmt")]
        defmt::trace!("erased sector {=u16}", sector.0);
        Ok(())
    }

    /// Erase a 32kB block
    pub async fn erase_block32(&mut self, block: Block32) -> Result<(), Error<E>> {
        self.prepare_write().await?;
        self.ll.erase_block32(block).await
    }

    /// Erase a 64kB block
    pub async fn erase_block64(&mut self, block: Block64) -> Result<(), Error<E>> {
        self.prepare_write().await?;
        self.ll.erase_block64(block).await
    }

    /// Erase the whole chip
    pub async fn erase_chip(&mut self) -> Result<(), Error<E>> {
        self.prepare_write().await?;
        self.ll.erase_chip().await
    }

    /// Read the status register
    pub async fn read_status(&mut self) -> Result<StatusRegister, Error<E>> {
        self.ll.read_status().await
    }

    /// Read the JEDEC identification of the device
    pub async fn read_jedec_id(&mut self) -> Result<JedecId, Error<E>> {
        self.ll.read_jedec_id().await
    }

    /// Read the manufacturer ID and the device ID
    pub async fn read_device_id(&mut self) -> Result<(ManufacturerId, DeviceId), Error<E>> {
        self.ll.read_device_id().await
    }
}

/// Implementation of the `NorFlash` traits of the `embedded_storage_async` crate
/// for the aligned command surface.
mod es {
    use super::*;
    use core::fmt::Debug;
    use embedded_storage_async::nor_flash::{
        ErrorType, MultiwriteNorFlash, NorFlash, ReadNorFlash,
    };

    impl<const SIZE: u32, SPI, D, E> ErrorType for AsyncGD25Q<SIZE, SPI, D>
    where
        SPI: SpiDevice<Error = E>,
        E: Debug,
    {
        type Error = Error<E>;
    }

    impl<const SIZE: u32, SPI, D, E> ReadNorFlash for AsyncGD25Q<SIZE, SPI, D>
    where
        SPI: SpiDevice<Error = E>,
        D: DelayNs,
        E: Debug,
    {
        const READ_SIZE: usize = 1;

        async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            check_write(self.capacity(), offset, bytes.len())?;
            self.read(Address(offset), bytes).await
        }

        fn capacity(&self) -> usize {
            Self::CAPACITY
        }
    }

    impl<const SIZE: u32, SPI, D, E> NorFlash for AsyncGD25Q<SIZE, SPI, D>
    where
        SPI: SpiDevice<Error = E>,
        D: DelayNs,
        E: Debug,
    {
        const WRITE_SIZE: usize = 1;
        const ERASE_SIZE: usize = SECTOR_SIZE as usize;

        async fn erase(&mut self, mut from: u32, to: u32) -> Result<(), Self::Error> {
            check_erase(self.capacity(), from, to)?;
            while from < to {
                if from % BLOCK64_SIZE == 0 && to - from >= BLOCK64_SIZE {
                    self.erase_block64(Block64((from / BLOCK64_SIZE) as u16))
                        .await?;
                    from += BLOCK64_SIZE;
                } else if from % BLOCK32_SIZE == 0 && to - from >= BLOCK32_SIZE {
                    self.erase_block32(Block32((from / BLOCK32_SIZE) as u16))
                        .await?;
                    from += BLOCK32_SIZE;
                } else {
                    self.erase_sector(Address(from).sector()).await?;
                    from += SECTOR_SIZE;
                }
            }
            Ok(())
        }

        async fn write(&mut self, mut offset: u32, mut bytes: &[u8]) -> Result<(), Self::Error> {
            check_write(self.capacity(), offset, bytes.len())?;
            while !bytes.is_empty() {
                let chunk = Address(offset).page_remaining().min(bytes.len());
                self.program_page(Address(offset), &bytes[..chunk]).await?;
                offset += chunk as u32;
                bytes = &bytes[chunk..];
            }
            Ok(())
        }
    }

    impl<const SIZE: u32, SPI, D, E> MultiwriteNorFlash for AsyncGD25Q<SIZE, SPI, D>
    where
        SPI: SpiDevice<Error = E>,
        D: DelayNs,
        E: Debug,
    {
    }
}

/// A seekable, byte addressable view of the flash array; async twin of
/// [`FlashFile`](crate::blocking::FlashFile).
///
/// One `AsyncFlashFile` is one open handle: it owns the driver, a cursor into the
/// address space and a pair of sector-sized staging buffers, and reconciles
/// arbitrary-offset, arbitrary-length writes with the chip's erase and page
/// program granularities through a sector read-modify-write engine. The JEDEC
/// identification is read once at [`open`](Self::open) and cached.
pub struct AsyncFlashFile<const SIZE: u32, SPI, D>
where
    SPI: SpiDevice,
{
    flash: AsyncGD25Q<SIZE, SPI, D>,
    id: JedecId,
    cursor: u32,
    bufs: TransferBuffers,
}

impl<const SIZE: u32, SPI, D, E> AsyncFlashFile<SIZE, SPI, D>
where
    SPI: SpiDevice<Error = E>,
    D: DelayNs,
{
    pub const CAPACITY: usize = AsyncGD25Q::<SIZE, SPI, D>::CAPACITY;

    /// Open a handle on the device: queries the JEDEC identification once and
    /// places the cursor at address 0.
    pub async fn open(spi: SPI, delay: D) -> Result<Self, Error<E>> {
        let mut flash = AsyncGD25Q::new(spi, delay);
        let id = flash.read_jedec_id().await?;
        Ok(Self {
            flash,
            id,
            cursor: 0,
            bufs: TransferBuffers::new(),
        })
    }

    /// Release the bus and the delay provider.
    pub fn release(self) -> (SPI, D) {
        self.flash.release()
    }

    pub fn capacity(&self) -> usize {
        Self::CAPACITY
    }

    /// The identification read when the handle was opened.
    pub fn jedec_id(&self) -> JedecId {
        self.id
    }

    /// Current cursor position.
    pub fn position(&self) -> u32 {
        self.cursor
    }

    /// Move the cursor. `Start` and `Current` origins only; the device has no
    /// notion of an end to seek from. The cursor may sit at `capacity` (any
    /// following write fails the bounds check, a read returns 0).
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u32, Error<E>> {
        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => {
                let pos = (self.cursor as i64)
                    .checked_add(delta)
                    .ok_or(Error::InvalidSeek)?;
                u64::try_from(pos).map_err(|_| Error::InvalidSeek)?
            }
            SeekFrom::End(_) => return Err(Error::InvalidSeek),
        };
        if target > self.capacity() as u64 {
            return Err(Error::InvalidSeek);
        }
        self.cursor = target as u32;
        Ok(self.cursor)
    }

    /// Read from the cursor into `buf`, advancing the cursor.
    ///
    /// Reads at most until the end of the device; at the end, returns `Ok(0)`.
    /// A bus error after some bytes were already delivered returns the short
    /// count; an error before any byte propagates.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error<E>> {
        let avail = self.capacity() - self.cursor as usize;
        let want = buf.len().min(avail);
        let mut done = 0;
        while done < want {
            let chunk = (want - done).min(MAX_TRANSFER);
            match self
                .flash
                .read(Address(self.cursor), &mut self.bufs.rx[..chunk])
                .await
            {
                Ok(()) => {}
                Err(e) if done == 0 => return Err(e),
                Err(_) => break,
            }
            buf[done..done + chunk].copy_from_slice(&self.bufs.rx[..chunk]);
            self.cursor += chunk as u32;
            done += chunk;
        }
        Ok(done)
    }

    /// Write `data` at the cursor, advancing the cursor.
    ///
    /// Rejects the whole request up front if it runs past the end of the device.
    /// The request is split so that no single engine pass covers more than one
    /// sector: the first chunk is capped to the remainder of the cursor's sector,
    /// later chunks to [`MAX_TRANSFER`](crate::MAX_TRANSFER). A failure after
    /// earlier chunks completed returns the short count; a failure on the first
    /// chunk propagates.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, Error<E>> {
        check_write(self.capacity(), self.cursor, data.len())?;
        let mut data = data;
        let mut offset = Address(self.cursor).sector_offset();
        let mut chunk = data.len().min(SECTOR_SIZE as usize - offset);
        let mut total = 0;
        while !data.is_empty() {
            self.bufs.tx[offset..offset + chunk].copy_from_slice(&data[..chunk]);
            let written = match self.write_sector(chunk).await {
                Ok(n) => n,
                Err(e) if total == 0 => return Err(e),
                Err(_) => return Ok(total),
            };
            total += written;
            if written < chunk {
                return Ok(total);
            }
            data = &data[chunk..];
            offset = 0;
            chunk = data.len().min(MAX_TRANSFER);
        }
        Ok(total)
    }

    /// Write up to one sector worth of bytes staged in the transmit buffer at the
    /// cursor's in-sector offset; see the blocking twin for the full contract.
    async fn write_sector(&mut self, len: usize) -> Result<usize, Error<E>> {
        let offset = Address(self.cursor).sector_offset();
        if offset + len > SECTOR_SIZE as usize {
            return Err(Error::OversizeWrite);
        }
        let base = Address(self.cursor).sector_base();
        // Before-image of the whole sector; reused below, never re-read.
        self.flash.read(base, &mut self.bufs.rx).await?;

        let end = offset + len;
        let (mut start, stop, mut chunk) =
            if needs_erase(&self.bufs.rx[offset..end], &self.bufs.tx[offset..end]) {
                self.flash.erase_sector(base.sector()).await?;
                self.bufs.tx[..offset].copy_from_slice(&self.bufs.rx[..offset]);
                self.bufs.tx[end..].copy_from_slice(&self.bufs.rx[end..]);
                self.cursor = base.into();
                // The rewrite starts on the sector base, which is page aligned.
                (0, SECTOR_SIZE as usize, PAGE_SIZE as usize)
            } else {
                (offset, end, Address(self.cursor).page_remaining().min(len))
            };

        let widened = stop - start != len;
        let mut programmed = 0;
        while start < stop {
            let take = chunk.min(stop - start);
            let accepted = self
                .flash
                .program_page(Address(self.cursor), &self.bufs.tx[start..start + take])
                .await?;
            self.cursor += accepted as u32;
            programmed += accepted;
            start += accepted;
            if accepted < take {
                break;
            }
            chunk = PAGE_SIZE as usize;
        }
        if widened {
            Ok(programmed.saturating_sub(offset).min(len))
        } else {
            Ok(programmed)
        }
    }

    /// Erase every sector needed to cover `len` bytes counted from the cursor,
    /// starting with the sector containing the cursor. `len` of 0 is treated as
    /// 1. The cursor does not move.
    pub async fn erase_sectors(&mut self, len: u32) -> Result<(), Error<E>> {
        let len = len.max(1);
        let end = self.cursor.checked_add(len).ok_or(Error::OutOfBounds)?;
        if end > self.capacity() as u32 {
            return Err(Error::OutOfBounds);
        }
        let mut sector = Address(self.cursor).sector();
        let mut remaining = len;
        loop {
            self.flash.erase_sector(sector).await?;
            if remaining <= SECTOR_SIZE {
                break;
            }
            remaining -= SECTOR_SIZE;
            sector = Sector(sector.0 + 1);
        }
        Ok(())
    }

    /// Erase the 32kB block containing the cursor. The cursor does not move.
    pub async fn erase_block32(&mut self) -> Result<(), Error<E>> {
        self.flash
            .erase_block32(Block32((self.cursor / BLOCK32_SIZE) as u16))
            .await
    }

    /// Erase the 64kB block containing the cursor. The cursor does not move.
    pub async fn erase_block64(&mut self) -> Result<(), Error<E>> {
        self.flash
            .erase_block64(Block64((self.cursor / BLOCK64_SIZE) as u16))
            .await
    }

    /// Erase the whole chip.
    pub async fn erase_chip(&mut self) -> Result<(), Error<E>> {
        self.flash.erase_chip().await
    }
}

/// Implementation of the byte addressable `Storage` traits of the
/// `embedded_storage_async` crate: absolute offsets, whole-request-or-error.
mod storage {
    use super::*;
    use embedded_storage_async::{ReadStorage, Storage};

    impl<const SIZE: u32, SPI, D, E> ReadStorage for AsyncFlashFile<SIZE, SPI, D>
    where
        SPI: SpiDevice<Error = E>,
        D: DelayNs,
    {
        type Error = Error<E>;

        async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            // Same end-exclusive range rule as writes.
            check_write(self.capacity(), offset, bytes.len())?;
            self.cursor = offset;
            let mut done = 0;
            while done < bytes.len() {
                let chunk = (bytes.len() - done).min(MAX_TRANSFER);
                self.flash
                    .read(Address(self.cursor), &mut self.bufs.rx[..chunk])
                    .await?;
                bytes[done..done + chunk].copy_from_slice(&self.bufs.rx[..chunk]);
                self.cursor += chunk as u32;
                done += chunk;
            }
            Ok(())
        }

        fn capacity(&self) -> usize {
            Self::CAPACITY
        }
    }

    impl<const SIZE: u32, SPI, D, E> Storage for AsyncFlashFile<SIZE, SPI, D>
    where
        SPI: SpiDevice<Error = E>,
        D: DelayNs,
    {
        async fn write(&mut self, offset: u32, mut bytes: &[u8]) -> Result<(), Self::Error> {
            check_write(self.capacity(), offset, bytes.len())?;
            self.cursor = offset;
            while !bytes.is_empty() {
                let offset_in = Address(self.cursor).sector_offset();
                let chunk = bytes.len().min(SECTOR_SIZE as usize - offset_in);
                self.bufs.tx[offset_in..offset_in + chunk].copy_from_slice(&bytes[..chunk]);
                self.write_sector(chunk).await?;
                bytes = &bytes[chunk..];
            }
            Ok(())
        }
    }
}

/// Implementation of the `Read`/`Write`/`Seek` traits of the `embedded_io_async`
/// crate.
mod io {
    use super::*;
    use core::fmt::Debug;

    impl<const SIZE: u32, SPI, D, E> embedded_io_async::ErrorType for AsyncFlashFile<SIZE, SPI, D>
    where
        SPI: SpiDevice<Error = E>,
        E: Debug,
    {
        type Error = Error<E>;
    }

    impl<const SIZE: u32, SPI, D, E> embedded_io_async::Read for AsyncFlashFile<SIZE, SPI, D>
    where
        SPI: SpiDevice<Error = E>,
        D: DelayNs,
        E: Debug,
    {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            AsyncFlashFile::read(self, buf).await
        }
    }

    impl<const SIZE: u32, SPI, D, E> embedded_io_async::Write for AsyncFlashFile<SIZE, SPI, D>
    where
        SPI: SpiDevice<Error = E>,
        D: DelayNs,
        E: Debug,
    {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            AsyncFlashFile::write(self, buf).await
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl<const SIZE: u32, SPI, D, E> embedded_io_async::Seek for AsyncFlashFile<SIZE, SPI, D>
    where
        SPI: SpiDevice<Error = E>,
        D: DelayNs,
        E: Debug,
    {
        async fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
            AsyncFlashFile::seek(self, pos).map(u64::from)
        }
    }
}
