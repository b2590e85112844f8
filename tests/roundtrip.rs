use pc8086_rs::isa::i8086::I8086Decoder;
use pc8086_rs::isa::opcode::{OpCode, Slot};
use pc8086_rs::isa::operand::{Disp, Immediate, MemoryOperand, Operand};
use pc8086_rs::isa::register::{Reg, Width};
use pc8086_rs::isa::table::INSTRUCTIONS;
use pc8086_rs::Decoder;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn opcodes() -> Vec<&'static OpCode> {
    INSTRUCTIONS.iter().flat_map(|i| i.opcodes.iter()).collect()
}

fn imm(range: std::ops::RangeInclusive<i64>) -> BoxedStrategy<Operand> {
    range.prop_map(|v| Operand::Imm(Immediate::new(v))).boxed()
}

fn reg(width: Width) -> BoxedStrategy<Operand> {
    (0u8..8)
        .prop_map(move |c| Operand::Reg(Reg::general(width, c)))
        .boxed()
}

fn mem(width: Option<Width>) -> BoxedStrategy<Operand> {
    let base = prop_oneof![Just(None), Just(Some(Reg::BX)), Just(Some(Reg::BP))];
    let index = prop_oneof![Just(None), Just(Some(Reg::SI)), Just(Some(Reg::DI))];
    (base, index, any::<i16>())
        .prop_map(move |(base, index, d)| {
            let disp = if base.is_none() && index.is_none() {
                Some(d as u16 as i64)
            } else if d == 0 {
                None
            } else {
                Some(d as i64)
            };
            Operand::Mem(MemoryOperand {
                base,
                index,
                disp: disp.map(|v| Disp::Imm(Immediate::new(v))),
                segment: None,
                width,
            })
        })
        .boxed()
}

fn operand(slot: Slot) -> BoxedStrategy<Operand> {
    match slot {
        Slot::Fixed(r) => Just(Operand::Reg(r)).boxed(),
        Slot::One => Just(Operand::Imm(Immediate::new(1))).boxed(),
        Slot::RegOp(w) | Slot::G(w) => reg(w),
        Slot::S => (0u8..4).prop_map(|c| Operand::Reg(Reg::segment(c))).boxed(),
        Slot::E(w) => prop_oneof![reg(w), mem(Some(w))].boxed(),
        Slot::M => mem(None),
        Slot::I(Width::Byte) => imm(0..=0xFF),
        Slot::I(Width::Word) => imm(0..=0xFFFF),
        Slot::Ibs | Slot::Rel(Width::Byte) => imm(-128..=127),
        Slot::Rel(Width::Word) => imm(-32768..=32767),
    }
}

fn case() -> impl Strategy<Value = (&'static OpCode, Vec<Operand>)> {
    let all = opcodes();
    (0..all.len()).prop_flat_map(move |i| {
        let op = all[i];
        let slots: Vec<BoxedStrategy<Operand>> = op.slots.iter().map(|s| operand(*s)).collect();
        (Just(op), slots)
    })
}

proptest! {
    #[test]
    fn encode_then_decode_yields_same_operands((opcode, operands) in case()) {
        let enc = opcode.encode(&operands).unwrap();
        let d = I8086Decoder::new().decode(&enc.bytes).unwrap();
        // swapped operand orders and NOP decode through a different entry
        prop_assume!(std::ptr::eq(d.opcode, opcode));
        prop_assert_eq!(d.len as usize, enc.bytes.len());
        prop_assert_eq!(&d.operands, &operands);
    }
}

#[test]
fn every_opcode_byte_decodes_to_a_table_entry() {
    let dec = I8086Decoder::new();
    for op in opcodes() {
        let mut bytes = vec![op.code, op.ext.unwrap_or(0) << 3 | 0xC0, 0, 0, 0, 0];
        if op.slots.contains(&Slot::M) {
            bytes[1] = op.ext.unwrap_or(0) << 3;
        }
        let d = dec.decode(&bytes).unwrap_or_else(|| panic!("{:02X} undecodable", op.code));
        assert_eq!(d.opcode.code, op.code);
    }
}
