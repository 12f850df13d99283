use bit::BitIndex;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManufacturerId(pub u8);

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType(pub u8);

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryDensity(pub u8);

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(pub u8);

/// The JEDEC identification triple, read once when a handle is opened.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JedecId {
    pub manufacturer: ManufacturerId,
    pub memory_type: MemoryType,
    pub density: MemoryDensity,
}

impl JedecId {
    /// The three id bytes packed into one word, manufacturer in the high byte.
    pub fn raw(self) -> u32 {
        (self.manufacturer.0 as u32) << 16 | (self.memory_type.0 as u32) << 8 | self.density.0 as u32
    }
}

/// Low status register byte
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct StatusRegister {
    pub status_write_protect: bool,
    pub protected_block: u8,
    pub write_enable_latch: bool,
    pub wip_bit: bool,
}

impl From<u8> for StatusRegister {
    fn from(val: u8) -> StatusRegister {
        StatusRegister {
            status_write_protect: val.bit(7),
            protected_block: val.bit_range(2..7),
            write_enable_latch: val.bit(1),
            wip_bit: val.bit(0),
        }
    }
}
