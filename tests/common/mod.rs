#![allow(dead_code)]

use embedded_hal::spi::{self, Operation};

pub const SECTOR: usize = 4096;
pub const PAGE: usize = 256;
pub const BLOCK32: usize = 32 * 1024;
pub const BLOCK64: usize = 64 * 1024;

/// JEDEC bytes of a GD25Q64 and its 0x90 device id byte.
pub const JEDEC: [u8; 3] = [0xC8, 0x40, 0x17];
pub const DEVICE_ID: u8 = 0x16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

impl spi::Error for SimError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

/// In-memory GD25Q chip.
///
/// Models what the driver relies on: programming only clears bits and wraps
/// inside a page, erases set whole aligned regions to 0xFF, mutating commands
/// require the write enable latch, the busy bit drains over status polls. Every
/// command is logged so tests can assert on the exact bus traffic.
pub struct SimFlash {
    pub mem: Vec<u8>,
    write_latch: bool,
    /// Status polls left that will report busy.
    pub busy_polls: u32,
    /// Busy polls armed after every program or erase.
    pub busy_after_op: u32,
    /// Fail the bus transaction of the nth page program (0-based).
    pub fail_on_program: Option<u32>,
    /// Fail the bus transaction of the nth data read (0-based).
    pub fail_on_read: Option<u32>,
    pub status_reads: u32,
    pub sector_erases: Vec<u32>,
    pub block32_erases: Vec<u32>,
    pub block64_erases: Vec<u32>,
    pub chip_erases: u32,
    pub page_programs: Vec<(u32, usize)>,
    pub reads: Vec<(u32, usize)>,
}

impl SimFlash {
    pub fn new(capacity: usize) -> Self {
        Self {
            mem: vec![0xFF; capacity],
            write_latch: false,
            busy_polls: 0,
            busy_after_op: 0,
            fail_on_program: None,
            fail_on_read: None,
            status_reads: 0,
            sector_erases: Vec::new(),
            block32_erases: Vec::new(),
            block64_erases: Vec::new(),
            chip_erases: 0,
            page_programs: Vec::new(),
            reads: Vec::new(),
        }
    }

    /// Total erase commands of any granularity seen so far.
    pub fn erases(&self) -> usize {
        self.sector_erases.len()
            + self.block32_erases.len()
            + self.block64_erases.len()
            + self.chip_erases as usize
    }

    fn addr(cmd: &[u8]) -> u32 {
        (cmd[1] as u32) << 16 | (cmd[2] as u32) << 8 | cmd[3] as u32
    }

    fn finish_op(&mut self) {
        self.write_latch = false;
        self.busy_polls = self.busy_after_op;
    }

    fn erase_region(&mut self, base: usize, len: usize) {
        self.mem[base..base + len].fill(0xFF);
        self.finish_op();
    }

    fn run(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SimError> {
        match operations {
            [Operation::TransferInPlace(buf)] => match buf[0] {
                0x05 => {
                    self.status_reads += 1;
                    let busy = self.busy_polls > 0;
                    if busy && self.busy_polls != u32::MAX {
                        self.busy_polls -= 1;
                    }
                    buf[1] = busy as u8;
                }
                0x9F => buf[1..4].copy_from_slice(&JEDEC),
                0x90 => {
                    buf[4] = JEDEC[0];
                    buf[5] = DEVICE_ID;
                }
                op => panic!("unexpected transfer opcode {op:#04x}"),
            },
            [Operation::Write(cmd), Operation::Read(out)] => {
                assert_eq!(cmd[0], 0x03, "only plain reads carry a read phase");
                if self.fail_on_read == Some(self.reads.len() as u32) {
                    return Err(SimError);
                }
                let addr = Self::addr(cmd);
                self.reads.push((addr, out.len()));
                for (i, b) in out.iter_mut().enumerate() {
                    // Address bits above the capacity mirror, as on the chip.
                    *b = self.mem[(addr as usize + i) % self.mem.len()];
                }
            }
            [Operation::Write(cmd), Operation::Write(data)] => {
                assert_eq!(cmd[0], 0x02, "only page programs carry a data phase");
                assert!(self.write_latch, "page program without write enable");
                if self.fail_on_program == Some(self.page_programs.len() as u32) {
                    return Err(SimError);
                }
                let addr = Self::addr(cmd) as usize;
                assert!(
                    addr % PAGE + data.len() <= PAGE,
                    "page program at {addr:#x} len {} runs over the page boundary",
                    data.len()
                );
                self.page_programs.push((addr as u32, data.len()));
                for (i, &b) in data.iter().enumerate() {
                    // Programming can only clear bits.
                    self.mem[addr + i] &= b;
                }
                self.finish_op();
            }
            [Operation::Write(cmd)] => match (cmd[0], cmd.len()) {
                (0x06, 1) => self.write_latch = true,
                (0x04, 1) => self.write_latch = false,
                (0xC7, 1) => {
                    assert!(self.write_latch, "chip erase without write enable");
                    self.chip_erases += 1;
                    let len = self.mem.len();
                    self.erase_region(0, len);
                }
                (0x20, 4) => {
                    assert!(self.write_latch, "sector erase without write enable");
                    let base = Self::addr(cmd) as usize & !(SECTOR - 1);
                    self.sector_erases.push(base as u32);
                    self.erase_region(base, SECTOR);
                }
                (0x52, 4) => {
                    assert!(self.write_latch, "block erase without write enable");
                    let base = Self::addr(cmd) as usize & !(BLOCK32 - 1);
                    self.block32_erases.push(base as u32);
                    self.erase_region(base, BLOCK32);
                }
                (0xD8, 4) => {
                    assert!(self.write_latch, "block erase without write enable");
                    let base = Self::addr(cmd) as usize & !(BLOCK64 - 1);
                    self.block64_erases.push(base as u32);
                    self.erase_region(base, BLOCK64);
                }
                (op, n) => panic!("unexpected command {op:#04x} of length {n}"),
            },
            other => panic!("unexpected transaction shape ({} operations)", other.len()),
        }
        Ok(())
    }
}

impl spi::ErrorType for SimFlash {
    type Error = SimError;
}

impl embedded_hal::spi::SpiDevice for SimFlash {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.run(operations)
    }
}

impl embedded_hal_async::spi::SpiDevice for SimFlash {
    async fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.run(operations)
    }
}

/// Counting no-op delay provider.
#[derive(Debug, Default)]
pub struct SimDelay {
    pub slept_ns: u64,
}

impl embedded_hal::delay::DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.slept_ns += ns as u64;
    }
}

impl embedded_hal_async::delay::DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.slept_ns += ns as u64;
    }
}
