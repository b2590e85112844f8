use pc8086_rs::memory::{linear, OPEN_BUS};
use pc8086_rs::{MappedMemory, Memory, Region};

fn map() -> MappedMemory {
    let mut mem = MappedMemory::new();
    mem.map(Region::ram(0, 0x1000));
    mem.map(Region::rom(0xF0000, vec![0xEA, 0x5B, 0xE0, 0x00, 0xF0]));
    mem
}

#[test]
fn unmapped_reads_open_bus() {
    let mut mem = map();
    assert_eq!(mem.read_u8(0x5000), OPEN_BUS);
    assert_eq!(mem.read_u16(0x5000), 0xFFFF);
    mem.write_u8(0x5000, 0x12);
    assert_eq!(mem.read_u8(0x5000), OPEN_BUS);
}

#[test]
fn rom_ignores_writes() {
    let mut mem = map();
    mem.write_u8(0xF0000, 0x00);
    mem.write_u16(0xF0001, 0x0000);
    assert_eq!(mem.read_u8(0xF0000), 0xEA);
    assert_eq!(mem.read_u16(0xF0001), 0xE05B);
}

#[test]
fn word_straddles_region_end() {
    let mut mem = map();
    mem.write_u16(0x0FFF, 0xABCD);
    assert_eq!(mem.read_u8(0x0FFF), 0xCD);
    assert_eq!(mem.read_u16(0x0FFF), 0xFFCD);
}

#[test]
fn later_region_shadows_earlier() {
    let mut mem = map();
    mem.write_u8(0x0800, 0x11);
    mem.map(Region::rom(0x0800, vec![0x22]));
    assert_eq!(mem.read_u8(0x0800), 0x22);
    assert_eq!(mem.read_u8(0x0801), 0x00);
}

#[test]
fn addresses_wrap_at_one_megabyte() {
    assert_eq!(linear(0xFFFF, 0x0010), 0);
    assert_eq!(linear(0xF000, 0xFFF0), 0xFFFF0);
    let mut mem = map();
    mem.write_u8(0x100000, 0x42);
    assert_eq!(mem.read_u8(0), 0x42);
}
