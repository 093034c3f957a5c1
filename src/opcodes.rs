//! Stable nibble-level encodings shared by the assembler and the CPU core.
//!
//! Every table here is part of the wire format: changing a discriminant
//! changes what a previously assembled image means.

/// The 16 opcodes, in their stable nibble encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    Inc = 1,
    Dec = 2,
    Add = 3,
    Sub = 4,
    Rlc = 5,
    Rrc = 6,
    And = 7,
    Or = 8,
    Xor = 9,
    Cmp = 10,
    Psh = 11,
    Pop = 12,
    Jmp = 13,
    Jsr = 14,
    Mov = 15,
}

pub const OPCODE_MNEMONICS: [(&str, Opcode); 16] = [
    ("NOP", Opcode::Nop),
    ("INC", Opcode::Inc),
    ("DEC", Opcode::Dec),
    ("ADD", Opcode::Add),
    ("SUB", Opcode::Sub),
    ("RLC", Opcode::Rlc),
    ("RRC", Opcode::Rrc),
    ("AND", Opcode::And),
    ("OR", Opcode::Or),
    ("XOR", Opcode::Xor),
    ("CMP", Opcode::Cmp),
    ("PSH", Opcode::Psh),
    ("POP", Opcode::Pop),
    ("JMP", Opcode::Jmp),
    ("JSR", Opcode::Jsr),
    ("MOV", Opcode::Mov),
];

impl Opcode {
    pub fn from_mnemonic(text: &str) -> Option<Opcode> {
        let upper = text.to_uppercase();
        OPCODE_MNEMONICS
            .iter()
            .find(|(name, _)| *name == upper)
            .map(|(_, op)| *op)
    }

    pub fn from_nibble(nibble: u8) -> Option<Opcode> {
        OPCODE_MNEMONICS
            .iter()
            .map(|(_, op)| *op)
            .find(|op| *op as u8 == nibble)
    }

    pub fn mnemonic(self) -> &'static str {
        OPCODE_MNEMONICS
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(name, _)| *name)
            .expect("every Opcode variant has a mnemonic entry")
    }
}

/// Register codes, including the three virtual codes (CV, MD, MX) that only
/// ever appear in the instruction encoding, never in the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegisterCode {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    F = 5,
    S0 = 6,
    S1 = 7,
    Pc = 8,
    Sp = 9,
    Iv = 10,
    Ix = 11,
    Ta = 12,
    Cv = 13,
    Md = 14,
    Mx = 15,
}

pub const REGISTER_NAMES: [(&str, RegisterCode); 13] = [
    ("a", RegisterCode::A),
    ("b", RegisterCode::B),
    ("c", RegisterCode::C),
    ("d", RegisterCode::D),
    ("e", RegisterCode::E),
    ("f", RegisterCode::F),
    ("s0", RegisterCode::S0),
    ("s1", RegisterCode::S1),
    ("pc", RegisterCode::Pc),
    ("sp", RegisterCode::Sp),
    ("iv", RegisterCode::Iv),
    ("ix", RegisterCode::Ix),
    ("ta", RegisterCode::Ta),
];

impl RegisterCode {
    /// Parses a `%name` operand's register name. CV/MD/MX are deliberately
    /// absent from `REGISTER_NAMES`: they are never spelled as `%name`.
    pub fn from_name(text: &str) -> Option<RegisterCode> {
        let lower = text.to_lowercase();
        REGISTER_NAMES
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, reg)| *reg)
    }

    pub fn from_nibble(nibble: u8) -> Option<RegisterCode> {
        match nibble {
            0 => Some(RegisterCode::A),
            1 => Some(RegisterCode::B),
            2 => Some(RegisterCode::C),
            3 => Some(RegisterCode::D),
            4 => Some(RegisterCode::E),
            5 => Some(RegisterCode::F),
            6 => Some(RegisterCode::S0),
            7 => Some(RegisterCode::S1),
            8 => Some(RegisterCode::Pc),
            9 => Some(RegisterCode::Sp),
            10 => Some(RegisterCode::Iv),
            11 => Some(RegisterCode::Ix),
            12 => Some(RegisterCode::Ta),
            13 => Some(RegisterCode::Cv),
            14 => Some(RegisterCode::Md),
            15 => Some(RegisterCode::Mx),
            _ => None,
        }
    }

    /// True for the six 4-bit general-purpose/flag-view registers (A..F, S0, S1).
    pub fn is_four_bit(self) -> bool {
        (self as u8) < 8
    }

    /// True for the five 16-bit memory-pointer registers (PC, SP, IV, IX, TA).
    pub fn is_sixteen_bit(self) -> bool {
        matches!(self as u8, 8..=12)
    }

    /// True for the three virtual codes that never appear in the register file.
    pub fn is_virtual(self) -> bool {
        matches!(self as u8, 13..=15)
    }
}

/// `flag_index` mapping used both by the assembler's condition parser and
/// the CPU's flag byte. Also doubles as the bit position within the flag
/// byte (N=0 .. True=7), since the two happen to coincide by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flag {
    Negative = 0,
    Zero = 1,
    Carry = 2,
    Overflow = 3,
    Interrupt = 4,
    Halt = 5,
    False = 6,
    True = 7,
}

pub const FLAG_CHARS: [(char, Flag); 8] = [
    ('N', Flag::Negative),
    ('Z', Flag::Zero),
    ('C', Flag::Carry),
    ('O', Flag::Overflow),
    ('I', Flag::Interrupt),
    ('H', Flag::Halt),
    ('0', Flag::False),
    ('1', Flag::True),
];

impl Flag {
    pub fn from_char(c: char) -> Option<Flag> {
        let upper = c.to_ascii_uppercase();
        FLAG_CHARS
            .iter()
            .find(|(ch, _)| *ch == upper)
            .map(|(_, flag)| *flag)
    }
}
