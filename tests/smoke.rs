mod common;

use common::{setup, step, step_io, SEG};
use pc8086_rs::exec::IntExecutor;
use pc8086_rs::io::NullIo;
use pc8086_rs::isa::i8086::I8086Decoder;
use pc8086_rs::isa::register::Reg;
use pc8086_rs::memory::linear;
use pc8086_rs::{
    CpuConfig, Diagnostics, Fault, Flags, IoBus, Machine, MachineConfig, Memory, ResetVector,
};

#[test]
fn loop_sums_counter() {
    let (mut cpu, mut mem) = setup(&[
        0xB9, 0x05, 0x00, // mov cx, 5
        0x31, 0xC0, // xor ax, ax
        0x01, 0xC8, // add ax, cx
        0xE2, 0xFC, // loop -4
        0xF4, // hlt
    ]);
    step(&mut cpu, &mut mem, 13);
    assert_eq!(cpu.reg(Reg::AX), 15);
    assert_eq!(cpu.reg(Reg::CX), 0);
    assert!(cpu.halted);
    assert_eq!(cpu.ip(), 0x10A);
}

#[test]
fn call_ret_and_stack() {
    let (mut cpu, mut mem) = setup(&[
        0xBB, 0x34, 0x12, // mov bx, 1234h
        0x53, // push bx
        0xE8, 0x03, 0x00, // call +3
        0x5A, // pop dx
        0xF4, // hlt
        0x90, // nop
        0xB8, 0x01, 0x00, // mov ax, 1
        0xC3, // ret
    ]);
    step(&mut cpu, &mut mem, 3);
    assert_eq!(cpu.ip(), 0x10A);
    assert_eq!(cpu.reg(Reg::SP), 0xFFFA);
    assert_eq!(mem.read_u16(linear(SEG, 0xFFFA)), 0x107);
    step(&mut cpu, &mut mem, 4);
    assert_eq!(cpu.reg(Reg::AX), 1);
    assert_eq!(cpu.reg(Reg::DX), 0x1234);
    assert_eq!(cpu.reg(Reg::SP), 0xFFFE);
    assert!(cpu.halted);
}

#[test]
fn software_interrupt_round_trip() {
    let (mut cpu, mut mem) = setup(&[0xFB, 0xCD, 0x21, 0xF4]); // sti; int 21h; hlt
    mem.write_u16(0x21 * 4, 0x0000);
    mem.write_u16(0x21 * 4 + 2, 0x2000);
    mem.load(0x20000, &[0xB0, 0x41, 0xCF]); // mov al, 'A'; iret

    step(&mut cpu, &mut mem, 2);
    assert_eq!(cpu.reg(Reg::CS), 0x2000);
    assert_eq!(cpu.ip(), 0);
    assert!(!cpu.flag(Flags::IF));
    step(&mut cpu, &mut mem, 2);
    assert_eq!(cpu.reg(Reg::AL), 0x41);
    assert_eq!(cpu.reg(Reg::CS), SEG);
    assert_eq!(cpu.ip(), 0x103);
    assert!(cpu.flag(Flags::IF));
}

#[test]
fn divide_by_zero_raises_vector_0() {
    let (mut cpu, mut mem) = setup(&[0x31, 0xDB, 0xF7, 0xF3]); // xor bx, bx; div bx
    mem.write_u16(0, 0x0010);
    mem.write_u16(2, 0x2000);
    step(&mut cpu, &mut mem, 2);
    assert_eq!(cpu.reg(Reg::CS), 0x2000);
    assert_eq!(cpu.ip(), 0x0010);
    assert_eq!(mem.read_u16(linear(SEG, cpu.reg(Reg::SP))), 0x104);
}

#[test]
fn div_and_idiv() {
    let (mut cpu, mut mem) = setup(&[
        0xB8, 0x64, 0x00, // mov ax, 100
        0xB3, 0x07, // mov bl, 7
        0xF6, 0xF3, // div bl
        0xB8, 0x9C, 0xFF, // mov ax, -100
        0xF6, 0xFB, // idiv bl
    ]);
    step(&mut cpu, &mut mem, 3);
    assert_eq!(cpu.reg(Reg::AL), 14);
    assert_eq!(cpu.reg(Reg::AH), 2);
    step(&mut cpu, &mut mem, 2);
    assert_eq!(cpu.reg(Reg::AL) as u8 as i8, -14);
    assert_eq!(cpu.reg(Reg::AH) as u8 as i8, -2);
}

#[test]
fn rep_movsb_copies_block() {
    let (mut cpu, mut mem) = setup(&[0xFC, 0xF3, 0xA4]); // cld; rep movsb
    mem.load(linear(SEG, 0x200), b"HELLO");
    cpu.set_reg(Reg::SI, 0x200);
    cpu.set_reg(Reg::DI, 0x300);
    cpu.set_reg(Reg::CX, 5);
    step(&mut cpu, &mut mem, 2);
    let copied: Vec<u8> = (0..5).map(|i| mem.read_u8(linear(SEG, 0x300 + i))).collect();
    assert_eq!(copied, b"HELLO");
    assert_eq!(cpu.reg(Reg::CX), 0);
    assert_eq!(cpu.reg(Reg::SI), 0x205);
    assert_eq!(cpu.ip(), 0x103);
}

#[test]
fn repne_scasb_stops_on_match() {
    let (mut cpu, mut mem) = setup(&[0xF2, 0xAE]);
    mem.load(linear(SEG, 0x200), b"HELLO");
    cpu.set_reg(Reg::AL, b'L' as u16);
    cpu.set_reg(Reg::DI, 0x200);
    cpu.set_reg(Reg::CX, 5);
    step(&mut cpu, &mut mem, 1);
    assert_eq!(cpu.reg(Reg::DI), 0x203);
    assert_eq!(cpu.reg(Reg::CX), 2);
    assert!(cpu.flag(Flags::ZF));
}

#[test]
fn segment_override_reads_extra_segment() {
    let (mut cpu, mut mem) = setup(&[0x26, 0x8B, 0x07]); // mov ax, es:[bx]
    cpu.set_reg(Reg::ES, 0x3000);
    cpu.set_reg(Reg::BX, 0x10);
    mem.write_u16(linear(0x3000, 0x10), 0xBEEF);
    mem.write_u16(linear(SEG, 0x10), 0x1111);
    step(&mut cpu, &mut mem, 1);
    assert_eq!(cpu.reg(Reg::AX), 0xBEEF);
}

#[test]
fn conditional_jumps() {
    let (mut cpu, mut mem) = setup(&[
        0xB0, 0x05, // mov al, 5
        0x3C, 0x07, // cmp al, 7
        0x7C, 0x02, // jl +2
        0xB3, 0x01, // mov bl, 1 (skipped)
        0x77, 0x02, // ja +2 (not taken)
        0xB7, 0x02, // mov bh, 2
    ]);
    step(&mut cpu, &mut mem, 5);
    assert_eq!(cpu.reg(Reg::BL), 0);
    assert_eq!(cpu.reg(Reg::BH), 2);
}

#[test]
fn shifts_and_rotates() {
    let (mut cpu, mut mem) = setup(&[
        0xB0, 0x81, // mov al, 81h
        0xD0, 0xC0, // rol al, 1
        0xB1, 0x04, // mov cl, 4
        0xD2, 0xE8, // shr al, cl
    ]);
    step(&mut cpu, &mut mem, 2);
    assert_eq!(cpu.reg(Reg::AL), 0x03);
    assert!(cpu.flag(Flags::CF));
    step(&mut cpu, &mut mem, 2);
    assert_eq!(cpu.reg(Reg::AL), 0x00);
    assert!(cpu.flag(Flags::ZF));
}

#[test]
fn port_io_programs_timer() {
    let (mut cpu, mut mem) = setup(&[
        0xB0, 0x34, 0xE6, 0x43, // ch0 lo/hi mode 2
        0xB0, 0x0A, 0xE6, 0x40, // count low
        0xB0, 0x00, 0xE6, 0x40, // count high
        0xBA, 0x21, 0x00, // mov dx, 21h
        0xB0, 0xFD, 0xEE, // out dx, al (IMR)
        0xEC, // in al, dx
    ]);
    let mut io = IoBus::new();
    step_io(&mut cpu, &mut mem, &mut io, 10);
    assert_eq!(io.pit.channels[0].mode(), 2);
    io.pit.tick();
    assert_eq!(io.pit.channels[0].count(), 10);
    assert_eq!(cpu.reg(Reg::AL), 0xFD);
}

#[test]
fn invalid_opcode_is_reported() {
    let (mut cpu, mut mem) = setup(&[0x0F, 0x0B]);
    let mut diag = Diagnostics::new();
    let err = cpu
        .execute(&mut mem, &mut NullIo, &I8086Decoder::new(), &IntExecutor, &mut diag)
        .unwrap_err();
    assert_eq!(
        err,
        Fault::InvalidOpcode {
            cs: SEG,
            ip: 0x100,
            byte: 0x0F
        }
    );
    assert!(diag.has_fault());
    assert_eq!(cpu.ip(), 0x100);
}

#[test]
fn trace_records_each_instruction() {
    let (mut cpu, mut mem) = setup(&[0xB4, 0x09, 0x90]);
    cpu.cfg.trace = true;
    let mut diag = Diagnostics::new();
    let dec = I8086Decoder::new();
    for _ in 0..2 {
        cpu.execute(&mut mem, &mut NullIo, &dec, &IntExecutor, &mut diag).unwrap();
    }
    let lines: Vec<&str> = diag.traces().map(|d| d.message.as_str()).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("1000:0100"));
    assert!(lines[0].ends_with("mov ah, 09h"));
    assert!(lines[1].ends_with("nop"));
}

#[test]
fn reset_vector_choices() {
    let bios = vec![0xF4; 0x10000];
    let cfg = |reset_vector| MachineConfig {
        cpu: CpuConfig {
            reset_vector,
            ..CpuConfig::default()
        },
        ..MachineConfig::default()
    };

    let m = Machine::new(cfg(ResetVector::ImageStart), bios.clone());
    assert_eq!((m.cpu.reg(Reg::CS), m.cpu.ip()), (0xF000, 0));

    let m = Machine::new(cfg(ResetVector::Architectural), bios.clone());
    assert_eq!((m.cpu.reg(Reg::CS), m.cpu.ip()), (0xFFFF, 0));
    assert_eq!(m.cpu.pc(), 0xFFFF0);

    let m = Machine::new(cfg(ResetVector::Explicit { cs: 0xF800, ip: 0x10 }), bios);
    assert_eq!(m.cpu.pc(), 0xF8010);
}
