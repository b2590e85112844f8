//! The 8086 opcode table and keyword registry shared by the assembler and
//! the CPU decoder.

use super::opcode::{Instruction, Mnemonic, OpCode, Slot};
use super::register::{Reg, Width};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

const AL: Slot = Slot::Fixed(Reg::AL);
const AX: Slot = Slot::Fixed(Reg::AX);
const CL: Slot = Slot::Fixed(Reg::CL);
const DX: Slot = Slot::Fixed(Reg::DX);
const ONE: Slot = Slot::One;
const RB: Slot = Slot::RegOp(Width::Byte);
const RW: Slot = Slot::RegOp(Width::Word);
const GB: Slot = Slot::G(Width::Byte);
const GW: Slot = Slot::G(Width::Word);
const EB: Slot = Slot::E(Width::Byte);
const EW: Slot = Slot::E(Width::Word);
const SR: Slot = Slot::S;
const M: Slot = Slot::M;
const IB: Slot = Slot::I(Width::Byte);
const IW: Slot = Slot::I(Width::Word);
const IBS: Slot = Slot::Ibs;
const REL8: Slot = Slot::Rel(Width::Byte);
const REL16: Slot = Slot::Rel(Width::Word);

macro_rules! alu {
    ($name:ident, $base:literal, $ext:literal) => {
        static $name: [OpCode; 9] = [
            OpCode::plain($base + 4, &[AL, IB]),
            OpCode::plain($base + 5, &[AX, IW]),
            OpCode::modrm(0x80, $ext, &[EB, IB]),
            OpCode::modrm(0x83, $ext, &[EW, IBS]),
            OpCode::modrm(0x81, $ext, &[EW, IW]),
            OpCode::plain($base, &[EB, GB]),
            OpCode::plain($base + 1, &[EW, GW]),
            OpCode::plain($base + 2, &[GB, EB]),
            OpCode::plain($base + 3, &[GW, EW]),
        ];
    };
}

macro_rules! shift {
    ($name:ident, $ext:literal) => {
        static $name: [OpCode; 4] = [
            OpCode::modrm(0xD0, $ext, &[EB, ONE]),
            OpCode::modrm(0xD1, $ext, &[EW, ONE]),
            OpCode::modrm(0xD2, $ext, &[EB, CL]),
            OpCode::modrm(0xD3, $ext, &[EW, CL]),
        ];
    };
}

macro_rules! unary {
    ($name:ident, $ext:literal) => {
        static $name: [OpCode; 2] = [
            OpCode::modrm(0xF6, $ext, &[EB]),
            OpCode::modrm(0xF7, $ext, &[EW]),
        ];
    };
}

macro_rules! single {
    ($($name:ident = $code:literal),* $(,)?) => {
        $(static $name: [OpCode; 1] = [OpCode::plain($code, &[])];)*
    };
}

macro_rules! branch {
    ($($name:ident = $code:literal),* $(,)?) => {
        $(static $name: [OpCode; 1] = [OpCode::plain($code, &[REL8])];)*
    };
}

alu!(ADD, 0x00, 0);
alu!(OR, 0x08, 1);
alu!(ADC, 0x10, 2);
alu!(SBB, 0x18, 3);
alu!(AND, 0x20, 4);
alu!(SUB, 0x28, 5);
alu!(XOR, 0x30, 6);
alu!(CMP, 0x38, 7);

shift!(ROL, 0);
shift!(ROR, 1);
shift!(RCL, 2);
shift!(RCR, 3);
shift!(SHL, 4);
shift!(SHR, 5);
shift!(SAR, 7);

unary!(NOT, 2);
unary!(NEG, 3);
unary!(MUL, 4);
unary!(IMUL, 5);
unary!(DIV, 6);
unary!(IDIV, 7);

single! {
    NOP = 0x90, PUSHF = 0x9C, POPF = 0x9D, IRET = 0xCF, INT3 = 0xCC, INTO = 0xCE,
    CLC = 0xF8, STC = 0xF9, CMC = 0xF5, CLI = 0xFA, STI = 0xFB, CLD = 0xFC, STD = 0xFD,
    HLT = 0xF4, CBW = 0x98, CWD = 0x99, LAHF = 0x9F, SAHF = 0x9E,
    MOVSB = 0xA4, MOVSW = 0xA5, CMPSB = 0xA6, CMPSW = 0xA7,
    STOSB = 0xAA, STOSW = 0xAB, LODSB = 0xAC, LODSW = 0xAD, SCASB = 0xAE, SCASW = 0xAF,
}

branch! {
    JO = 0x70, JNO = 0x71, JB = 0x72, JAE = 0x73, JE = 0x74, JNE = 0x75, JBE = 0x76, JA = 0x77,
    JS = 0x78, JNS = 0x79, JP = 0x7A, JNP = 0x7B, JL = 0x7C, JGE = 0x7D, JLE = 0x7E, JG = 0x7F,
    LOOPNE = 0xE0, LOOPE = 0xE1, LOOP = 0xE2, JCXZ = 0xE3,
}

static MOV: [OpCode; 10] = [
    OpCode::plain(0xB0, &[RB, IB]),
    OpCode::plain(0xB8, &[RW, IW]),
    OpCode::plain(0x88, &[EB, GB]),
    OpCode::plain(0x89, &[EW, GW]),
    OpCode::plain(0x8A, &[GB, EB]),
    OpCode::plain(0x8B, &[GW, EW]),
    OpCode::plain(0x8C, &[EW, SR]),
    OpCode::plain(0x8E, &[SR, EW]),
    OpCode::modrm(0xC6, 0, &[EB, IB]),
    OpCode::modrm(0xC7, 0, &[EW, IW]),
];

static INC: [OpCode; 3] = [
    OpCode::plain(0x40, &[RW]),
    OpCode::modrm(0xFE, 0, &[EB]),
    OpCode::modrm(0xFF, 0, &[EW]),
];

static DEC: [OpCode; 3] = [
    OpCode::plain(0x48, &[RW]),
    OpCode::modrm(0xFE, 1, &[EB]),
    OpCode::modrm(0xFF, 1, &[EW]),
];

static PUSH: [OpCode; 6] = [
    OpCode::plain(0x50, &[RW]),
    OpCode::plain(0x06, &[Slot::Fixed(Reg::ES)]),
    OpCode::plain(0x0E, &[Slot::Fixed(Reg::CS)]),
    OpCode::plain(0x16, &[Slot::Fixed(Reg::SS)]),
    OpCode::plain(0x1E, &[Slot::Fixed(Reg::DS)]),
    OpCode::modrm(0xFF, 6, &[EW]),
];

static POP: [OpCode; 5] = [
    OpCode::plain(0x58, &[RW]),
    OpCode::plain(0x07, &[Slot::Fixed(Reg::ES)]),
    OpCode::plain(0x17, &[Slot::Fixed(Reg::SS)]),
    OpCode::plain(0x1F, &[Slot::Fixed(Reg::DS)]),
    OpCode::modrm(0x8F, 0, &[EW]),
];

static XCHG: [OpCode; 6] = [
    OpCode::plain(0x90, &[AX, RW]),
    OpCode::plain(0x90, &[RW, AX]),
    OpCode::plain(0x86, &[EB, GB]),
    OpCode::plain(0x86, &[GB, EB]),
    OpCode::plain(0x87, &[EW, GW]),
    OpCode::plain(0x87, &[GW, EW]),
];

static TEST: [OpCode; 8] = [
    OpCode::plain(0xA8, &[AL, IB]),
    OpCode::plain(0xA9, &[AX, IW]),
    OpCode::modrm(0xF6, 0, &[EB, IB]),
    OpCode::modrm(0xF7, 0, &[EW, IW]),
    OpCode::plain(0x84, &[EB, GB]),
    OpCode::plain(0x85, &[EW, GW]),
    OpCode::plain(0x84, &[GB, EB]),
    OpCode::plain(0x85, &[GW, EW]),
];

static JMP: [OpCode; 3] = [
    OpCode::plain(0xE9, &[REL16]),
    OpCode::plain(0xEB, &[REL8]),
    OpCode::modrm(0xFF, 4, &[EW]),
];

static CALL: [OpCode; 2] = [
    OpCode::plain(0xE8, &[REL16]),
    OpCode::modrm(0xFF, 2, &[EW]),
];

static RET: [OpCode; 2] = [OpCode::plain(0xC3, &[]), OpCode::plain(0xC2, &[IW])];
static RETF: [OpCode; 2] = [OpCode::plain(0xCB, &[]), OpCode::plain(0xCA, &[IW])];
static INT: [OpCode; 1] = [OpCode::plain(0xCD, &[IB])];
static LEA: [OpCode; 1] = [OpCode::plain(0x8D, &[GW, M])];

static IN: [OpCode; 4] = [
    OpCode::plain(0xE4, &[AL, IB]),
    OpCode::plain(0xE5, &[AX, IB]),
    OpCode::plain(0xEC, &[AL, DX]),
    OpCode::plain(0xED, &[AX, DX]),
];

static OUT: [OpCode; 4] = [
    OpCode::plain(0xE6, &[IB, AL]),
    OpCode::plain(0xE7, &[IB, AX]),
    OpCode::plain(0xEE, &[DX, AL]),
    OpCode::plain(0xEF, &[DX, AX]),
];

macro_rules! instructions {
    ($($m:ident: $ops:ident),* $(,)?) => {
        &[$(Instruction { mnemonic: Mnemonic::$m, opcodes: &$ops }),*]
    };
}

/// Every instruction, canonical names before aliases so that a reverse
/// lookup by opcode byte finds the canonical mnemonic first.
pub static INSTRUCTIONS: &[Instruction] = instructions! {
    Add: ADD, Or: OR, Adc: ADC, Sbb: SBB, And: AND, Sub: SUB, Xor: XOR, Cmp: CMP,
    Nop: NOP, Mov: MOV, Inc: INC, Dec: DEC, Push: PUSH, Pop: POP,
    Pushf: PUSHF, Popf: POPF, Xchg: XCHG, Test: TEST,
    Not: NOT, Neg: NEG, Mul: MUL, Imul: IMUL, Div: DIV, Idiv: IDIV,
    Rol: ROL, Ror: ROR, Rcl: RCL, Rcr: RCR, Shl: SHL, Shr: SHR, Sar: SAR,
    Jmp: JMP, Call: CALL, Ret: RET, Retf: RETF, Iret: IRET,
    Jo: JO, Jno: JNO, Jb: JB, Jae: JAE, Je: JE, Jne: JNE, Jbe: JBE, Ja: JA,
    Js: JS, Jns: JNS, Jp: JP, Jnp: JNP, Jl: JL, Jge: JGE, Jle: JLE, Jg: JG,
    Loopne: LOOPNE, Loope: LOOPE, Loop: LOOP, Jcxz: JCXZ,
    Int: INT, Int3: INT3, Into: INTO, In: IN, Out: OUT,
    Clc: CLC, Stc: STC, Cmc: CMC, Cli: CLI, Sti: STI, Cld: CLD, Std: STD,
    Hlt: HLT, Lea: LEA, Cbw: CBW, Cwd: CWD, Lahf: LAHF, Sahf: SAHF,
    Movsb: MOVSB, Movsw: MOVSW, Cmpsb: CMPSB, Cmpsw: CMPSW,
    Stosb: STOSB, Stosw: STOSW, Lodsb: LODSB, Lodsw: LODSW, Scasb: SCASB, Scasw: SCASW,
    // aliases
    Sal: SHL, Jc: JB, Jnae: JB, Jnb: JAE, Jnc: JAE, Jz: JE, Jnz: JNE,
    Jna: JBE, Jnbe: JA, Jpe: JP, Jpo: JNP, Jnge: JL, Jnl: JGE, Jng: JLE, Jnle: JG,
    Loopz: LOOPE, Loopnz: LOOPNE,
};

pub fn instruction(mnemonic: Mnemonic) -> Option<&'static Instruction> {
    INSTRUCTIONS.iter().find(|i| i.mnemonic == mnemonic)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prefix {
    Lock,
    Rep,
    Repe,
    Repne,
}

impl Prefix {
    pub fn byte(self) -> u8 {
        match self {
            Prefix::Lock => 0xF0,
            Prefix::Rep | Prefix::Repe => 0xF3,
            Prefix::Repne => 0xF2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Prefix::Lock => "LOCK",
            Prefix::Rep => "REP",
            Prefix::Repe => "REPE",
            Prefix::Repne => "REPNE",
        }
    }
}

/// Segment override prefix byte for `reg`.
pub fn segment_prefix(reg: Reg) -> Option<u8> {
    match reg {
        Reg::ES => Some(0x26),
        Reg::CS => Some(0x2E),
        Reg::SS => Some(0x36),
        Reg::DS => Some(0x3E),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Directive {
    Org,
    Format,
    Segment,
    Entry,
    Stack,
    Heap,
    Db,
    Dw,
    Dd,
    Dp,
    Df,
    Dq,
    Dt,
    Rb,
    Rw,
    Rd,
    Rp,
    Rf,
    Rq,
    Rt,
}

impl Directive {
    pub const ALL: [Directive; 20] = [
        Directive::Org,
        Directive::Format,
        Directive::Segment,
        Directive::Entry,
        Directive::Stack,
        Directive::Heap,
        Directive::Db,
        Directive::Dw,
        Directive::Dd,
        Directive::Dp,
        Directive::Df,
        Directive::Dq,
        Directive::Dt,
        Directive::Rb,
        Directive::Rw,
        Directive::Rd,
        Directive::Rp,
        Directive::Rf,
        Directive::Rq,
        Directive::Rt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Directive::Org => "ORG",
            Directive::Format => "FORMAT",
            Directive::Segment => "SEGMENT",
            Directive::Entry => "ENTRY",
            Directive::Stack => "STACK",
            Directive::Heap => "HEAP",
            Directive::Db => "DB",
            Directive::Dw => "DW",
            Directive::Dd => "DD",
            Directive::Dp => "DP",
            Directive::Df => "DF",
            Directive::Dq => "DQ",
            Directive::Dt => "DT",
            Directive::Rb => "RB",
            Directive::Rw => "RW",
            Directive::Rd => "RD",
            Directive::Rp => "RP",
            Directive::Rf => "RF",
            Directive::Rq => "RQ",
            Directive::Rt => "RT",
        }
    }

    /// Element size in bytes for `D*` directives.
    pub fn data_size(self) -> Option<usize> {
        match self {
            Directive::Db => Some(1),
            Directive::Dw => Some(2),
            Directive::Dd => Some(4),
            Directive::Dp | Directive::Df => Some(6),
            Directive::Dq => Some(8),
            Directive::Dt => Some(10),
            _ => None,
        }
    }

    /// Element size in bytes for `R*` directives.
    pub fn reserve_size(self) -> Option<usize> {
        match self {
            Directive::Rb => Some(1),
            Directive::Rw => Some(2),
            Directive::Rd => Some(4),
            Directive::Rp | Directive::Rf => Some(6),
            Directive::Rq => Some(8),
            Directive::Rt => Some(10),
            _ => None,
        }
    }
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Keyword {
    Prefix(Prefix),
    Instruction(&'static Instruction),
    Directive(Directive),
    Register(Reg),
    Size(Width),
    Ptr,
}

fn registry() -> &'static HashMap<String, Keyword> {
    static REGISTRY: OnceLock<HashMap<String, Keyword>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for p in [Prefix::Lock, Prefix::Rep, Prefix::Repe, Prefix::Repne] {
            map.insert(p.name().to_ascii_lowercase(), Keyword::Prefix(p));
        }
        map.insert("repz".into(), Keyword::Prefix(Prefix::Repe));
        map.insert("repnz".into(), Keyword::Prefix(Prefix::Repne));
        for i in INSTRUCTIONS {
            map.insert(i.mnemonic.name().to_ascii_lowercase(), Keyword::Instruction(i));
        }
        for d in Directive::ALL {
            map.insert(d.name().to_ascii_lowercase(), Keyword::Directive(d));
        }
        for r in Reg::ALL {
            map.insert(r.name().to_ascii_lowercase(), Keyword::Register(r));
        }
        map.insert("byte".into(), Keyword::Size(Width::Byte));
        map.insert("word".into(), Keyword::Size(Width::Word));
        map.insert("ptr".into(), Keyword::Ptr);
        map
    })
}

/// Case-insensitive lookup of a reserved word.
pub fn keyword(name: &str) -> Option<Keyword> {
    registry().get(&name.to_ascii_lowercase()).copied()
}
