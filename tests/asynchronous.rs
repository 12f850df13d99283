mod common;

use common::{SimDelay, SimFlash, PAGE, SECTOR};
use embassy_futures::block_on;
use gd25q::asynchronous::AsyncFlashFile;
use gd25q::error::Error;
use gd25q::{SeekFrom, SECTOR_SIZE};

const SIZE: u32 = 0x01FFFF;
const CAPACITY: usize = SIZE as usize + 1;

type File = AsyncFlashFile<SIZE, SimFlash, SimDelay>;

fn open(sim: SimFlash) -> File {
    block_on(AsyncFlashFile::open(sim, SimDelay::default())).unwrap()
}

#[test]
fn jedec_id_is_read_at_open() {
    let f = open(SimFlash::new(CAPACITY));
    assert_eq!(f.jedec_id().raw(), 0x00C84017);
}

#[test]
fn round_trip_preserves_sector_neighbours() {
    let mut sim = SimFlash::new(CAPACITY);
    sim.mem[0x2000..0x3000].fill(0x55);
    let mut f = open(sim);

    let pattern = [0xA6u8; 100];
    f.seek(SeekFrom::Start(0x2345)).unwrap();
    assert_eq!(block_on(f.write(&pattern)).unwrap(), 100);

    f.seek(SeekFrom::Start(0x2000)).unwrap();
    let mut back = [0u8; SECTOR];
    assert_eq!(block_on(f.read(&mut back)).unwrap(), SECTOR);
    assert!(back[..0x345].iter().all(|&b| b == 0x55));
    assert_eq!(&back[0x345..0x345 + 100], &pattern[..]);
    assert!(back[0x345 + 100..].iter().all(|&b| b == 0x55));

    let (sim, _) = f.release();
    assert_eq!(sim.sector_erases, vec![0x2000]);
}

#[test]
fn erased_target_range_is_programmed_without_erase() {
    let mut f = open(SimFlash::new(CAPACITY));
    let start = 2 * SECTOR_SIZE + 4000;
    f.seek(SeekFrom::Start(start as u64)).unwrap();
    assert_eq!(block_on(f.write(&[0xAA; 10])).unwrap(), 10);
    assert_eq!(f.position(), start + 10);

    let (sim, _) = f.release();
    assert_eq!(sim.erases(), 0);
    assert_eq!(sim.page_programs, vec![(start, 10)]);
}

#[test]
fn conflicting_byte_forces_exactly_one_sector_erase() {
    let mut sim = SimFlash::new(CAPACITY);
    sim.mem[0x1000..0x2000].fill(0x00);
    let mut f = open(sim);

    f.seek(SeekFrom::Start(0x1800)).unwrap();
    assert_eq!(block_on(f.write(&[0x0F; 8])).unwrap(), 8);
    assert_eq!(f.position(), 0x2000);

    let (sim, _) = f.release();
    assert_eq!(sim.sector_erases, vec![0x1000]);
    assert!(sim.mem[0x1000..0x1800].iter().all(|&b| b == 0x00));
    assert!(sim.mem[0x1800..0x1808].iter().all(|&b| b == 0x0F));
    assert!(sim.mem[0x1808..0x2000].iter().all(|&b| b == 0x00));
}

#[test]
fn payload_is_split_on_page_boundaries() {
    let mut f = open(SimFlash::new(CAPACITY));
    let start = 0x3000 + (PAGE as u32 - 10);
    f.seek(SeekFrom::Start(start as u64)).unwrap();
    assert_eq!(block_on(f.write(&[0x11; 300])).unwrap(), 300);

    let (sim, _) = f.release();
    assert_eq!(
        sim.page_programs,
        vec![(start, 10), (start + 10, 256), (start + 266, 34)]
    );
}

#[test]
fn bounds_are_enforced() {
    let mut f = open(SimFlash::new(CAPACITY));
    assert_eq!(
        f.seek(SeekFrom::Start(CAPACITY as u64 + 1)),
        Err(Error::InvalidSeek)
    );
    assert_eq!(f.seek(SeekFrom::End(0)), Err(Error::InvalidSeek));
    assert_eq!(f.seek(SeekFrom::Current(-1)), Err(Error::InvalidSeek));

    f.seek(SeekFrom::Start(SIZE as u64)).unwrap();
    assert_eq!(block_on(f.write(&[0x5A])).unwrap(), 1);
    assert_eq!(block_on(f.write(&[0x5A])), Err(Error::OutOfBounds));
}

#[test]
fn storage_traits_round_trip_at_absolute_offsets() {
    use embedded_storage_async::{ReadStorage, Storage};

    let mut f = open(SimFlash::new(CAPACITY));
    let data: Vec<u8> = (0..600).map(|i| i as u8).collect();
    block_on(Storage::write(&mut f, 0x4100, &data)).unwrap();
    let mut back = vec![0u8; 600];
    block_on(ReadStorage::read(&mut f, 0x4100, &mut back)).unwrap();
    assert_eq!(back, data);
}

#[test]
fn embedded_io_async_traits_drive_the_handle() {
    use embedded_io_async::{Read, Seek, Write};

    let mut f = open(SimFlash::new(CAPACITY));
    block_on(Seek::seek(&mut f, SeekFrom::Start(0x6000))).unwrap();
    assert_eq!(block_on(Write::write(&mut f, b"sensor log")).unwrap(), 10);

    block_on(Seek::seek(&mut f, SeekFrom::Current(-10))).unwrap();
    let mut back = [0u8; 10];
    assert_eq!(block_on(Read::read(&mut f, &mut back)).unwrap(), 10);
    assert_eq!(&back, b"sensor log");
}
