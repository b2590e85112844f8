use crate::alu::{self, ShiftOp};
use crate::cpu::{Cpu, Fault, Flags};
use crate::decoder::Decoded;
use crate::io::PortIo;
use crate::isa::opcode::Mnemonic;
use crate::isa::operand::{Disp, MemoryOperand, Operand};
use crate::isa::register::{Reg, Width};
use crate::isa::table::Prefix;
use crate::memory::{linear, Memory};

pub trait Executor {
    /// Run `d` against the CPU. Returns how far IP should advance; control
    /// transfers set IP themselves and return 0.
    fn exec<M: Memory, P: PortIo>(&self, cpu: &mut Cpu, mem: &mut M, io: &mut P, d: &Decoded) -> Result<u16, Fault>;
}

pub struct IntExecutor;

impl Executor for IntExecutor {
    fn exec<M: Memory, P: PortIo>(&self, cpu: &mut Cpu, mem: &mut M, io: &mut P, d: &Decoded) -> Result<u16, Fault> {
        Ctx { cpu, mem, io, d }.run()
    }
}

macro_rules! by_width {
    ($w:expr, $f:ident($a:expr, $b:expr $(, $rest:expr)*)) => {
        match $w {
            Width::Byte => {
                let (r, fl) = alu::$f::<u8>($a as u8, $b as u8 $(, $rest)*);
                (r as u16, fl)
            }
            Width::Word => alu::$f::<u16>($a, $b $(, $rest)*),
        }
    };
}

struct Ctx<'a, M, P> {
    cpu: &'a mut Cpu,
    mem: &'a mut M,
    io: &'a mut P,
    d: &'a Decoded,
}

impl<M: Memory, P: PortIo> Ctx<'_, M, P> {
    fn unsupported(&self) -> Fault {
        Fault::Unsupported {
            cs: self.cpu.reg(Reg::CS),
            ip: self.cpu.ip(),
            mnemonic: self.d.mnemonic.name(),
        }
    }

    fn op(&self, i: usize) -> Result<&Operand, Fault> {
        self.d.operands.get(i).ok_or_else(|| self.unsupported())
    }

    /// Segment and offset of a memory operand.
    fn ea(&self, m: &MemoryOperand) -> Result<(u16, u16), Fault> {
        let mut off = 0u16;
        for r in [m.base, m.index].into_iter().flatten() {
            off = off.wrapping_add(self.cpu.reg(r));
        }
        match &m.disp {
            Some(Disp::Imm(i)) => off = off.wrapping_add(i.value as u16),
            Some(Disp::Label(_)) => return Err(self.unsupported()),
            None => {}
        }
        let seg = m.segment.unwrap_or_else(|| m.default_segment());
        Ok((self.cpu.reg(seg), off))
    }

    fn read(&self, op: &Operand, w: Width) -> Result<u16, Fault> {
        match op {
            Operand::Reg(r) => Ok(self.cpu.reg(*r)),
            Operand::Imm(i) => Ok(i.value as u16 & w.mask()),
            Operand::Mem(m) => {
                let (seg, off) = self.ea(m)?;
                Ok(self.load(seg, off, w))
            }
            Operand::Placeholder(_) => Err(self.unsupported()),
        }
    }

    fn write(&mut self, op: &Operand, w: Width, value: u16) -> Result<(), Fault> {
        match op {
            Operand::Reg(r) => {
                self.cpu.set_reg(*r, value);
                Ok(())
            }
            Operand::Mem(m) => {
                let (seg, off) = self.ea(m)?;
                self.store(seg, off, w, value);
                Ok(())
            }
            _ => Err(self.unsupported()),
        }
    }

    fn load(&self, seg: u16, off: u16, w: Width) -> u16 {
        match w {
            Width::Byte => self.mem.read_u8(linear(seg, off)) as u16,
            Width::Word => u16::from_le_bytes([
                self.mem.read_u8(linear(seg, off)),
                self.mem.read_u8(linear(seg, off.wrapping_add(1))),
            ]),
        }
    }

    fn store(&mut self, seg: u16, off: u16, w: Width, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.mem.write_u8(linear(seg, off), lo);
        if w == Width::Word {
            self.mem.write_u8(linear(seg, off.wrapping_add(1)), hi);
        }
    }

    fn next_ip(&self) -> u16 {
        self.cpu.ip().wrapping_add(self.d.len as u16)
    }

    fn jump_rel(&mut self) -> Result<u16, Fault> {
        let rel = match self.op(0)? {
            Operand::Imm(i) => i.value as u16,
            _ => return Err(self.unsupported()),
        };
        let target = self.next_ip().wrapping_add(rel);
        self.cpu.regs.set_ip(target);
        Ok(0)
    }

    fn branch(&mut self, taken: bool) -> Result<u16, Fault> {
        if taken {
            self.jump_rel()
        } else {
            Ok(self.d.len as u16)
        }
    }

    fn condition(&self, code: u8) -> bool {
        let f = self.cpu.flags();
        let sign_ne_over = f.contains(Flags::SF) != f.contains(Flags::OF);
        let c = match (code >> 1) & 7 {
            0 => f.contains(Flags::OF),
            1 => f.contains(Flags::CF),
            2 => f.contains(Flags::ZF),
            3 => f.intersects(Flags::CF | Flags::ZF),
            4 => f.contains(Flags::SF),
            5 => f.contains(Flags::PF),
            6 => sign_ne_over,
            _ => f.contains(Flags::ZF) || sign_ne_over,
        };
        c != (code & 1 == 1)
    }

    fn run(&mut self) -> Result<u16, Fault> {
        use Mnemonic::*;
        let len = self.d.len as u16;
        let w = self.d.width();

        match self.d.mnemonic {
            Add | Or | Adc | Sbb | And | Sub | Xor | Cmp | Test => {
                let (dst, src) = (self.op(0)?.clone(), self.op(1)?.clone());
                let a = self.read(&dst, w)?;
                let b = self.read(&src, w)?;
                let cf = self.cpu.flag(Flags::CF);
                let m = self.d.mnemonic;
                let (res, flags, affected) = match m {
                    Add | Adc => {
                        let (r, f) = by_width!(w, add(a, b, m == Adc && cf));
                        (r, f, Flags::ARITH)
                    }
                    Sub | Sbb | Cmp => {
                        let (r, f) = by_width!(w, sub(a, b, m == Sbb && cf));
                        (r, f, Flags::ARITH)
                    }
                    _ => {
                        let r = match m {
                            Or => a | b,
                            Xor => a ^ b,
                            _ => a & b,
                        } & w.mask();
                        let f = match w {
                            Width::Byte => alu::logic(r as u8),
                            Width::Word => alu::logic(r),
                        };
                        (r, f, alu::LOGIC)
                    }
                };
                if !matches!(m, Cmp | Test) {
                    self.write(&dst, w, res)?;
                }
                self.cpu.update_flags(flags, affected);
                Ok(len)
            }
            Inc | Dec => {
                let dst = self.op(0)?.clone();
                let a = self.read(&dst, w)?;
                let (r, f) = if self.d.mnemonic == Inc {
                    by_width!(w, add(a, 1, false))
                } else {
                    by_width!(w, sub(a, 1, false))
                };
                self.write(&dst, w, r)?;
                self.cpu.update_flags(f, Flags::ARITH - Flags::CF);
                Ok(len)
            }
            Neg => {
                let dst = self.op(0)?.clone();
                let a = self.read(&dst, w)?;
                let (r, f) = by_width!(w, sub(0, a, false));
                self.write(&dst, w, r)?;
                self.cpu.update_flags(f, Flags::ARITH);
                Ok(len)
            }
            Not => {
                let dst = self.op(0)?.clone();
                let a = self.read(&dst, w)?;
                self.write(&dst, w, !a & w.mask())?;
                Ok(len)
            }
            Mul | Imul => {
                let src = self.op(0)?.clone();
                let b = self.read(&src, w)?;
                let signed = self.d.mnemonic == Imul;
                let wide = match w {
                    Width::Byte => {
                        let a = self.cpu.reg(Reg::AL);
                        let r = if signed {
                            ((a as u8 as i8 as i16) * (b as u8 as i8 as i16)) as u16
                        } else {
                            a * b
                        };
                        self.cpu.set_reg(Reg::AX, r);
                        if signed {
                            r as i16 != r as u8 as i8 as i16
                        } else {
                            r > 0xFF
                        }
                    }
                    Width::Word => {
                        let a = self.cpu.reg(Reg::AX);
                        let r = if signed {
                            ((a as i16 as i32) * (b as i16 as i32)) as u32
                        } else {
                            a as u32 * b as u32
                        };
                        self.cpu.set_reg(Reg::AX, r as u16);
                        self.cpu.set_reg(Reg::DX, (r >> 16) as u16);
                        if signed {
                            r as i32 != r as u16 as i16 as i32
                        } else {
                            r > 0xFFFF
                        }
                    }
                };
                self.cpu.set_flag(Flags::CF | Flags::OF, wide);
                Ok(len)
            }
            Div | Idiv => {
                let src = self.op(0)?.clone();
                let b = self.read(&src, w)?;
                let ok = if self.d.mnemonic == Div {
                    self.divide(w, b)
                } else {
                    self.divide_signed(w, b)
                };
                if ok {
                    Ok(len)
                } else {
                    let ret = self.next_ip();
                    self.cpu.interrupt(self.mem, 0, ret);
                    Ok(0)
                }
            }
            Rol | Ror | Rcl | Rcr | Shl | Sal | Shr | Sar => {
                let dst = self.op(0)?.clone();
                let count = match self.op(1)? {
                    Operand::Reg(Reg::CL) => self.cpu.reg(Reg::CL) as u8,
                    _ => 1,
                };
                let op = match self.d.mnemonic {
                    Rol => ShiftOp::Rol,
                    Ror => ShiftOp::Ror,
                    Rcl => ShiftOp::Rcl,
                    Rcr => ShiftOp::Rcr,
                    Shr => ShiftOp::Shr,
                    Sar => ShiftOp::Sar,
                    _ => ShiftOp::Shl,
                };
                let a = self.read(&dst, w)?;
                let cf = self.cpu.flag(Flags::CF);
                let (r, f, affected) = match w {
                    Width::Byte => {
                        let (r, f, x) = alu::shift(op, a as u8, count, cf);
                        (r as u16, f, x)
                    }
                    Width::Word => alu::shift(op, a, count, cf),
                };
                self.write(&dst, w, r)?;
                self.cpu.update_flags(f, affected);
                Ok(len)
            }
            Mov => {
                let (dst, src) = (self.op(0)?.clone(), self.op(1)?.clone());
                let w = dst.width().or(src.width()).unwrap_or(Width::Word);
                let v = self.read(&src, w)?;
                self.write(&dst, w, v)?;
                Ok(len)
            }
            Xchg => {
                let (a, b) = (self.op(0)?.clone(), self.op(1)?.clone());
                let va = self.read(&a, w)?;
                let vb = self.read(&b, w)?;
                self.write(&a, w, vb)?;
                self.write(&b, w, va)?;
                Ok(len)
            }
            Lea => {
                let dst = self.op(0)?.clone();
                let off = match self.op(1)? {
                    Operand::Mem(m) => self.ea(m)?.1,
                    _ => return Err(self.unsupported()),
                };
                self.write(&dst, Width::Word, off)?;
                Ok(len)
            }
            Push => {
                let v = self.read(&self.op(0)?.clone(), Width::Word)?;
                self.cpu.push(self.mem, v);
                Ok(len)
            }
            Pop => {
                let dst = self.op(0)?.clone();
                let v = self.cpu.pop(self.mem);
                self.write(&dst, Width::Word, v)?;
                Ok(len)
            }
            Pushf => {
                let f = self.cpu.flags().bits();
                self.cpu.push(self.mem, f);
                Ok(len)
            }
            Popf => {
                let f = self.cpu.pop(self.mem);
                self.cpu.regs.set_flags(Flags::from_bits_retain(f));
                Ok(len)
            }
            Lahf => {
                let f = self.cpu.flags().bits() as u8;
                self.cpu.set_reg(Reg::AH, f as u16);
                Ok(len)
            }
            Sahf => {
                let ah = Flags::from_bits_retain(self.cpu.reg(Reg::AH));
                self.cpu
                    .update_flags(ah, Flags::SF | Flags::ZF | Flags::AF | Flags::PF | Flags::CF);
                Ok(len)
            }
            Cbw => {
                let al = self.cpu.reg(Reg::AL) as u8 as i8 as i16 as u16;
                self.cpu.set_reg(Reg::AX, al);
                Ok(len)
            }
            Cwd => {
                let dx = if self.cpu.reg(Reg::AX) & 0x8000 != 0 { 0xFFFF } else { 0 };
                self.cpu.set_reg(Reg::DX, dx);
                Ok(len)
            }
            Jmp | Call => {
                let target = match self.op(0)? {
                    Operand::Imm(i) => self.next_ip().wrapping_add(i.value as u16),
                    other => {
                        let other = other.clone();
                        self.read(&other, Width::Word)?
                    }
                };
                if self.d.mnemonic == Call {
                    let ret = self.next_ip();
                    self.cpu.push(self.mem, ret);
                }
                self.cpu.regs.set_ip(target);
                Ok(0)
            }
            Ret | Retf => {
                let ip = self.cpu.pop(self.mem);
                if self.d.mnemonic == Retf {
                    let cs = self.cpu.pop(self.mem);
                    self.cpu.set_reg(Reg::CS, cs);
                }
                if let Some(Operand::Imm(i)) = self.d.operands.first() {
                    let sp = self.cpu.reg(Reg::SP).wrapping_add(i.value as u16);
                    self.cpu.set_reg(Reg::SP, sp);
                }
                self.cpu.regs.set_ip(ip);
                Ok(0)
            }
            Iret => {
                let ip = self.cpu.pop(self.mem);
                let cs = self.cpu.pop(self.mem);
                let f = self.cpu.pop(self.mem);
                self.cpu.set_reg(Reg::CS, cs);
                self.cpu.regs.set_flags(Flags::from_bits_retain(f));
                self.cpu.regs.set_ip(ip);
                Ok(0)
            }
            Loop | Loope | Loopne => {
                let cx = self.cpu.reg(Reg::CX).wrapping_sub(1);
                self.cpu.set_reg(Reg::CX, cx);
                let zf = self.cpu.flag(Flags::ZF);
                let taken = cx != 0
                    && match self.d.mnemonic {
                        Loope => zf,
                        Loopne => !zf,
                        _ => true,
                    };
                self.branch(taken)
            }
            Jcxz => {
                let taken = self.cpu.reg(Reg::CX) == 0;
                self.branch(taken)
            }
            Jo | Jno | Jb | Jae | Je | Jne | Jbe | Ja | Js | Jns | Jp | Jnp | Jl | Jge | Jle | Jg => {
                let taken = self.condition(self.d.opcode.code & 0x0F);
                self.branch(taken)
            }
            Int | Int3 | Into => {
                let vector = match (self.d.mnemonic, self.d.operands.first()) {
                    (Int, Some(Operand::Imm(i))) => i.value as u8,
                    (Int3, _) => 3,
                    (Into, _) if self.cpu.flag(Flags::OF) => 4,
                    (Into, _) => return Ok(len),
                    _ => return Err(self.unsupported()),
                };
                let ret = self.next_ip();
                self.cpu.interrupt(self.mem, vector, ret);
                Ok(0)
            }
            In | Out => {
                let (acc, port) = match self.d.mnemonic {
                    In => (self.op(0)?.clone(), self.op(1)?.clone()),
                    _ => (self.op(1)?.clone(), self.op(0)?.clone()),
                };
                let w = acc.width().unwrap_or(Width::Byte);
                let port = match port {
                    Operand::Imm(i) => i.value as u16 & 0xFF,
                    _ => self.cpu.reg(Reg::DX),
                };
                if self.d.mnemonic == In {
                    let v = self.io.read(w, port);
                    self.write(&acc, w, v)?;
                } else {
                    let v = self.read(&acc, w)?;
                    self.io.write(w, port, v);
                }
                Ok(len)
            }
            Clc | Stc | Cmc | Cli | Sti | Cld | Std => {
                match self.d.mnemonic {
                    Clc => self.cpu.set_flag(Flags::CF, false),
                    Stc => self.cpu.set_flag(Flags::CF, true),
                    Cmc => {
                        let cf = self.cpu.flag(Flags::CF);
                        self.cpu.set_flag(Flags::CF, !cf);
                    }
                    Cli => self.cpu.set_flag(Flags::IF, false),
                    Sti => self.cpu.set_flag(Flags::IF, true),
                    Cld => self.cpu.set_flag(Flags::DF, false),
                    _ => self.cpu.set_flag(Flags::DF, true),
                }
                Ok(len)
            }
            Hlt => {
                let next = self.next_ip();
                self.cpu.regs.set_ip(next);
                self.cpu.halted = true;
                Ok(0)
            }
            Nop => Ok(len),
            Movsb | Movsw | Cmpsb | Cmpsw | Stosb | Stosw | Lodsb | Lodsw | Scasb | Scasw => {
                self.string_op();
                Ok(len)
            }
            // aliases never come out of the decoder
            Jc | Jnae | Jnb | Jnc | Jz | Jnz | Jna | Jnbe | Jpe | Jpo | Jnge | Jnl | Jng | Jnle | Loopz
            | Loopnz => Err(self.unsupported()),
        }
    }

    fn divide(&mut self, w: Width, divisor: u16) -> bool {
        if divisor == 0 {
            return false;
        }
        match w {
            Width::Byte => {
                let n = self.cpu.reg(Reg::AX);
                let q = n / divisor;
                if q > 0xFF {
                    return false;
                }
                self.cpu.set_reg(Reg::AL, q);
                self.cpu.set_reg(Reg::AH, n % divisor);
            }
            Width::Word => {
                let n = ((self.cpu.reg(Reg::DX) as u32) << 16) | self.cpu.reg(Reg::AX) as u32;
                let q = n / divisor as u32;
                if q > 0xFFFF {
                    return false;
                }
                self.cpu.set_reg(Reg::AX, q as u16);
                self.cpu.set_reg(Reg::DX, (n % divisor as u32) as u16);
            }
        }
        true
    }

    fn divide_signed(&mut self, w: Width, divisor: u16) -> bool {
        if divisor == 0 {
            return false;
        }
        match w {
            Width::Byte => {
                let n = self.cpu.reg(Reg::AX) as i16 as i32;
                let d = divisor as u8 as i8 as i32;
                let q = n / d;
                if !(-128..=127).contains(&q) {
                    return false;
                }
                self.cpu.set_reg(Reg::AL, q as u16);
                self.cpu.set_reg(Reg::AH, (n % d) as u16);
            }
            Width::Word => {
                let n = (((self.cpu.reg(Reg::DX) as u32) << 16) | self.cpu.reg(Reg::AX) as u32) as i32 as i64;
                let d = divisor as i16 as i64;
                let q = n / d;
                if !(-32768..=32767).contains(&q) {
                    return false;
                }
                self.cpu.set_reg(Reg::AX, q as u16);
                self.cpu.set_reg(Reg::DX, (n % d) as u16);
            }
        }
        true
    }

    /// One string instruction including its REP loop.
    fn string_op(&mut self) {
        use Mnemonic::*;
        let m = self.d.mnemonic;
        let w = match m {
            Movsb | Cmpsb | Stosb | Lodsb | Scasb => Width::Byte,
            _ => Width::Word,
        };
        let step = match (w, self.cpu.flag(Flags::DF)) {
            (Width::Byte, false) => 1u16,
            (Width::Word, false) => 2,
            (Width::Byte, true) => 1u16.wrapping_neg(),
            (Width::Word, true) => 2u16.wrapping_neg(),
        };
        let src_seg = self.cpu.reg(self.d.segment.unwrap_or(Reg::DS));
        let acc = if w == Width::Byte { Reg::AL } else { Reg::AX };
        let compares = matches!(m, Cmpsb | Cmpsw | Scasb | Scasw);

        loop {
            if self.d.rep.is_some() && self.cpu.reg(Reg::CX) == 0 {
                break;
            }
            let si = self.cpu.reg(Reg::SI);
            let di = self.cpu.reg(Reg::DI);
            let es = self.cpu.reg(Reg::ES);
            match m {
                Movsb | Movsw => {
                    let v = self.load(src_seg, si, w);
                    self.store(es, di, w, v);
                }
                Cmpsb | Cmpsw => {
                    let a = self.load(src_seg, si, w);
                    let b = self.load(es, di, w);
                    let (_, f) = by_width!(w, sub(a, b, false));
                    self.cpu.update_flags(f, Flags::ARITH);
                }
                Stosb | Stosw => {
                    let v = self.cpu.reg(acc);
                    self.store(es, di, w, v);
                }
                Lodsb | Lodsw => {
                    let v = self.load(src_seg, si, w);
                    self.cpu.set_reg(acc, v);
                }
                _ => {
                    let a = self.cpu.reg(acc);
                    let b = self.load(es, di, w);
                    let (_, f) = by_width!(w, sub(a, b, false));
                    self.cpu.update_flags(f, Flags::ARITH);
                }
            }
            if matches!(m, Movsb | Movsw | Cmpsb | Cmpsw | Lodsb | Lodsw) {
                self.cpu.set_reg(Reg::SI, si.wrapping_add(step));
            }
            if !matches!(m, Lodsb | Lodsw) {
                self.cpu.set_reg(Reg::DI, di.wrapping_add(step));
            }

            let Some(rep) = self.d.rep else { break };
            let cx = self.cpu.reg(Reg::CX).wrapping_sub(1);
            self.cpu.set_reg(Reg::CX, cx);
            if compares {
                let zf = self.cpu.flag(Flags::ZF);
                match rep {
                    Prefix::Repne if zf => break,
                    Prefix::Rep | Prefix::Repe if !zf => break,
                    _ => {}
                }
            }
        }
    }
}
