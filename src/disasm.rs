use crate::decoder::Decoded;
use crate::isa::opcode::Slot;
use crate::isa::operand::Operand;

/// One-line listing of a decoded instruction, lower case, e.g.
/// `rep movsb` or `mov ah, 09h`. Relative targets print as a signed
/// displacement from the next instruction.
pub fn fmt_decoded(d: &Decoded) -> String {
    let mut s = String::new();
    if d.lock {
        s.push_str("lock ");
    }
    if let Some(rep) = d.rep {
        s.push_str(&rep.name().to_ascii_lowercase());
        s.push(' ');
    }
    s.push_str(&d.mnemonic.name().to_ascii_lowercase());

    let ops: Vec<String> = d
        .opcode
        .slots
        .iter()
        .zip(&d.operands)
        .map(|(slot, op)| match (slot, op) {
            (Slot::Rel(_), Operand::Imm(i)) if i.value >= 0 => format!("+{}", i),
            _ => op.to_string(),
        })
        .collect();
    if !ops.is_empty() {
        s.push(' ');
        s.push_str(&ops.join(", ").to_ascii_lowercase());
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::isa::i8086::I8086Decoder;

    fn dis(bytes: &[u8]) -> String {
        fmt_decoded(&I8086Decoder::new().decode(bytes).unwrap())
    }

    #[test]
    fn listing() {
        assert_eq!(dis(&[0xB4, 0x09]), "mov ah, 09h");
        assert_eq!(dis(&[0xF3, 0xA4]), "rep movsb");
        assert_eq!(dis(&[0x26, 0x8B, 0x07]), "mov ax, word es:[bx]");
        assert_eq!(dis(&[0x75, 0xFC]), "jne -04h");
        assert_eq!(dis(&[0xD1, 0xE0]), "shl ax, 1");
        assert_eq!(dis(&[0x8D, 0x46, 0x02]), "lea ax, [bp+02h]");
    }
}
