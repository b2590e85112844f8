//! Width-generic arithmetic with 8086 flag semantics.

use crate::cpu::Flags;
use num_traits::{AsPrimitive, PrimInt, WrappingAdd, WrappingSub};

pub trait Word: PrimInt + WrappingAdd + WrappingSub + AsPrimitive<u32> + 'static {
    const BITS: u32;
    fn from_u32(v: u32) -> Self;
}

impl Word for u8 {
    const BITS: u32 = 8;
    fn from_u32(v: u32) -> Self {
        v as u8
    }
}

impl Word for u16 {
    const BITS: u32 = 16;
    fn from_u32(v: u32) -> Self {
        v as u16
    }
}

fn msb<T: Word>(v: T) -> bool {
    (v.as_() >> (T::BITS - 1)) & 1 == 1
}

/// SF, ZF and PF for a result. PF looks at the low byte only.
pub fn szp<T: Word>(res: T) -> Flags {
    let mut f = Flags::empty();
    f.set(Flags::SF, msb(res));
    f.set(Flags::ZF, res.is_zero());
    f.set(Flags::PF, (res.as_() & 0xFF).count_ones() % 2 == 0);
    f
}

pub fn add<T: Word>(a: T, b: T, carry: bool) -> (T, Flags) {
    let c = carry as u32;
    let wide = a.as_() + b.as_() + c;
    let res = T::from_u32(wide);
    let mut f = szp(res);
    f.set(Flags::CF, wide > T::max_value().as_());
    f.set(Flags::AF, (a.as_() ^ b.as_() ^ res.as_()) & 0x10 != 0);
    f.set(Flags::OF, msb((a ^ res) & (b ^ res)));
    (res, f)
}

pub fn sub<T: Word>(a: T, b: T, borrow: bool) -> (T, Flags) {
    let c = borrow as u32;
    let res = T::from_u32(a.as_().wrapping_sub(b.as_()).wrapping_sub(c));
    let mut f = szp(res);
    f.set(Flags::CF, a.as_() < b.as_() + c);
    f.set(Flags::AF, (a.as_() ^ b.as_() ^ res.as_()) & 0x10 != 0);
    f.set(Flags::OF, msb((a ^ b) & (a ^ res)));
    (res, f)
}

/// Flags for AND/OR/XOR/TEST: OF and CF cleared, AF left alone.
pub fn logic<T: Word>(res: T) -> Flags {
    szp(res)
}

pub const LOGIC: Flags = Flags::CF
    .union(Flags::PF)
    .union(Flags::ZF)
    .union(Flags::SF)
    .union(Flags::OF);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rol,
    Ror,
    Rcl,
    Rcr,
    Shl,
    Shr,
    Sar,
}

/// Shift or rotate `v` by `count`. Returns the result, the new flag
/// values and the set of flags the operation defines.
pub fn shift<T: Word>(op: ShiftOp, v: T, count: u8, cf: bool) -> (T, Flags, Flags) {
    if count == 0 {
        return (v, Flags::empty(), Flags::empty());
    }
    let top = T::one() << (T::BITS as usize - 1);
    let mut res = v;
    let mut carry = cf;
    for _ in 0..count {
        let out_hi = msb(res);
        let out_lo = res & T::one() == T::one();
        res = match op {
            ShiftOp::Rol => (res << 1) | if out_hi { T::one() } else { T::zero() },
            ShiftOp::Ror => (res >> 1) | if out_lo { top } else { T::zero() },
            ShiftOp::Rcl => (res << 1) | if carry { T::one() } else { T::zero() },
            ShiftOp::Rcr => (res >> 1) | if carry { top } else { T::zero() },
            ShiftOp::Shl => res << 1,
            ShiftOp::Shr => res >> 1,
            ShiftOp::Sar => (res >> 1) | if out_hi { top } else { T::zero() },
        };
        carry = match op {
            ShiftOp::Rol | ShiftOp::Rcl | ShiftOp::Shl => out_hi,
            _ => out_lo,
        };
    }

    let mut f = Flags::empty();
    f.set(Flags::CF, carry);
    let of = match op {
        ShiftOp::Rol | ShiftOp::Rcl | ShiftOp::Shl => msb(res) != carry,
        ShiftOp::Ror | ShiftOp::Rcr => msb(res) != msb(res << 1),
        ShiftOp::Shr => msb(v),
        ShiftOp::Sar => false,
    };
    f.set(Flags::OF, of);

    let affected = match op {
        ShiftOp::Shl | ShiftOp::Shr | ShiftOp::Sar => {
            f |= szp(res);
            Flags::CF | Flags::OF | Flags::SF | Flags::ZF | Flags::PF
        }
        _ => Flags::CF | Flags::OF,
    };
    (res, f, affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_byte_overflow_and_carry() {
        let (r, f) = add(0x7Fu8, 1, false);
        assert_eq!(r, 0x80);
        assert!(f.contains(Flags::OF | Flags::SF | Flags::AF));
        assert!(!f.contains(Flags::CF));

        let (r, f) = add(0xFFu8, 1, false);
        assert_eq!(r, 0);
        assert!(f.contains(Flags::CF | Flags::ZF | Flags::PF));
        assert!(!f.contains(Flags::OF));
    }

    #[test]
    fn sub_word_borrow() {
        let (r, f) = sub(0u16, 1, false);
        assert_eq!(r, 0xFFFF);
        assert!(f.contains(Flags::CF | Flags::SF));
        let (r, f) = sub(0x8000u16, 1, false);
        assert_eq!(r, 0x7FFF);
        assert!(f.contains(Flags::OF));
    }

    #[test]
    fn rotate_through_carry() {
        let (r, f, _) = shift(ShiftOp::Rcl, 0x80u8, 1, false);
        assert_eq!(r, 0);
        assert!(f.contains(Flags::CF));
        let (r, f, _) = shift(ShiftOp::Rcr, 0x01u8, 1, true);
        assert_eq!(r, 0x80);
        assert!(f.contains(Flags::CF));
    }

    #[test]
    fn sar_keeps_sign() {
        let (r, f, affected) = shift(ShiftOp::Sar, 0x8001u16, 1, false);
        assert_eq!(r, 0xC000);
        assert!(f.contains(Flags::CF | Flags::SF));
        assert!(affected.contains(Flags::ZF));
    }
}
