mod common;

use common::{setup, step};
use pc8086_rs::isa::register::Reg;
use pc8086_rs::memory::linear;
use pc8086_rs::{Flags, Memory};

/// ADD AL, imm8 over every operand pair, checked against flag rules
/// derived independently from the sum.
#[test]
fn add_byte_flags_exhaustive() {
    let (mut cpu, mut mem) = setup(&[0x04, 0x00]); // add al, imm8
    for a in 0..=255u16 {
        for b in 0..=255u16 {
            mem.write_u8(linear(common::SEG, 0x101), b as u8);
            cpu.regs.set_ip(0x100);
            cpu.set_reg(Reg::AL, a);
            step(&mut cpu, &mut mem, 1);

            let sum = a + b;
            let res = sum & 0xFF;
            let signed = (a as u8 as i8 as i16) + (b as u8 as i8 as i16);
            let f = cpu.flags();
            assert_eq!(cpu.reg(Reg::AL), res);
            assert_eq!(f.contains(Flags::CF), sum > 0xFF, "CF {a}+{b}");
            assert_eq!(f.contains(Flags::ZF), res == 0, "ZF {a}+{b}");
            assert_eq!(f.contains(Flags::SF), res & 0x80 != 0, "SF {a}+{b}");
            assert_eq!(f.contains(Flags::OF), !(-128..=127).contains(&signed), "OF {a}+{b}");
            assert_eq!(f.contains(Flags::AF), (a & 0xF) + (b & 0xF) > 0xF, "AF {a}+{b}");
            assert_eq!(f.contains(Flags::PF), res.count_ones() % 2 == 0, "PF {a}+{b}");
        }
    }
}

#[test]
fn logic_ops_clear_carry_and_overflow() {
    let (mut cpu, mut mem) = setup(&[
        0xF9, // stc
        0xB0, 0xF0, // mov al, F0h
        0x24, 0x0F, // and al, 0Fh
    ]);
    step(&mut cpu, &mut mem, 3);
    let f = cpu.flags();
    assert_eq!(cpu.reg(Reg::AL), 0);
    assert!(f.contains(Flags::ZF | Flags::PF));
    assert!(!f.intersects(Flags::CF | Flags::OF | Flags::SF));
}

#[test]
fn inc_preserves_carry() {
    let (mut cpu, mut mem) = setup(&[0xF9, 0xBB, 0xFF, 0xFF, 0x43]); // stc; mov bx, FFFFh; inc bx
    step(&mut cpu, &mut mem, 3);
    assert_eq!(cpu.reg(Reg::BX), 0);
    assert!(cpu.flag(Flags::CF));
    assert!(cpu.flag(Flags::ZF));
}

#[test]
fn sbb_uses_borrow() {
    let (mut cpu, mut mem) = setup(&[
        0xF9, // stc
        0xB8, 0x10, 0x00, // mov ax, 10h
        0x1D, 0x0F, 0x00, // sbb ax, 0Fh
    ]);
    step(&mut cpu, &mut mem, 3);
    assert_eq!(cpu.reg(Reg::AX), 0);
    assert!(cpu.flag(Flags::ZF));
    assert!(!cpu.flag(Flags::CF));
}

#[test]
fn mul_sets_carry_on_wide_result() {
    let (mut cpu, mut mem) = setup(&[
        0xB0, 0x10, // mov al, 10h
        0xB3, 0x20, // mov bl, 20h
        0xF6, 0xE3, // mul bl
    ]);
    step(&mut cpu, &mut mem, 3);
    assert_eq!(cpu.reg(Reg::AX), 0x0200);
    assert!(cpu.flag(Flags::CF | Flags::OF));
}

#[test]
fn lahf_sahf_and_flag_ops() {
    let (mut cpu, mut mem) = setup(&[
        0xF9, // stc
        0xFD, // std
        0x9F, // lahf
        0xF8, // clc
        0x9E, // sahf
    ]);
    step(&mut cpu, &mut mem, 3);
    assert_eq!(cpu.reg(Reg::AH) & 0x01, 0x01);
    assert!(cpu.flag(Flags::DF));
    step(&mut cpu, &mut mem, 2);
    assert!(cpu.flag(Flags::CF));
}

#[test]
fn flags_register_keeps_reserved_bits() {
    let (mut cpu, mut mem) = setup(&[0x31, 0xC0, 0x50, 0x9D, 0x9C, 0x5B]); // xor ax,ax; push ax; popf; pushf; pop bx
    step(&mut cpu, &mut mem, 5);
    assert_eq!(cpu.reg(Reg::BX), 0xF002);
}
