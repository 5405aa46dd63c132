//! USSE binary decoder
//!
//! Splits a program into 64-bit words and turns every word into an
//! [`Instruction`] through a static table of bit-pattern matchers. The first
//! matching entry wins. Words nothing matches, and matched words that cannot
//! be represented, become logged no-ops so a single bad word never takes the
//! whole program down.

pub mod alu;
pub mod compare;
pub mod flow;
pub mod helpers;
pub mod ialu;
pub mod matcher;
pub mod texture;

pub use helpers::*;
pub use matcher::{DecodeFn, Fields, Matcher};

use crate::disasm;
use crate::types::*;
use once_cell::sync::Lazy;
use ov_core::error::DecodeError;
use ov_core::{shader_error, shader_trace, shader_warn};

/// Maximum number of instructions in one program
pub const MAX_INSTRUCTIONS: usize = 4096;

/// Size of one instruction word in bytes
pub const WORD_SIZE: usize = 8;

/// Default per-repeat increments: register N advances by N
const DEFAULT_INCREMENTS: [i32; MAX_REPEATS] = [0, 1, 2, 3];

/// Per-program decoding state
#[derive(Debug, Clone)]
pub struct DecodeContext {
    /// Index of the word being decoded
    pub pc: u32,
    /// The word being decoded
    pub word: u64,
    /// Decoding the secondary (uniform setup) program
    pub secondary: bool,
    /// Increments configured by SMLSI, per operand slot and repeat
    increments: [[i32; MAX_REPEATS]; 4],
}

impl DecodeContext {
    pub fn new(secondary: bool) -> Self {
        Self {
            pc: 0,
            word: 0,
            secondary,
            increments: [DEFAULT_INCREMENTS; 4],
        }
    }

    /// Start an instruction at the current position
    pub fn instruction(&self, opcode: Opcode) -> Instruction {
        Instruction::new(self.pc, self.word, opcode)
    }

    pub fn set_increments(&mut self, increments: [[i32; MAX_REPEATS]; 4]) {
        self.increments = increments;
    }

    pub fn increments(&self) -> &[[i32; MAX_REPEATS]; 4] {
        &self.increments
    }

    fn repeat_offset(&self, op: &Operand, slot: OperandSlot, repeat: usize, mode: RepeatMode, multiplier: i32) -> i32 {
        let idx = repeat as i32;
        let internal = op.bank == RegisterBank::FpInternal;

        if mode == RepeatMode::Internal {
            return if internal { idx } else { 0 };
        }

        // GPI operands only advance with internal repeats
        if op.flags.contains(OperandFlags::GPI) {
            return 0;
        }

        match mode {
            RepeatMode::Both => {
                if internal {
                    idx
                } else {
                    idx * 4
                }
            }
            RepeatMode::External => {
                if internal {
                    0
                } else {
                    idx * 4
                }
            }
            RepeatMode::Slmsi => {
                let inc = self.increments[slot as usize][repeat];
                let scaled = matches!(
                    op.bank,
                    RegisterBank::Temp
                        | RegisterBank::PrimAttr
                        | RegisterBank::Output
                        | RegisterBank::SecAttr
                        | RegisterBank::Predicate
                );
                if scaled {
                    inc * multiplier
                } else {
                    inc
                }
            }
            RepeatMode::Internal => 0,
        }
    }

    /// Fill the repeat count and the per-repeat operand offsets
    ///
    /// `multipliers` scale the SMLSI increments per slot (src0, src1, src2, dest).
    pub fn apply_repeat(&self, inst: &mut Instruction, count: u8, mode: RepeatMode, multipliers: [i32; 4]) {
        inst.repeat_count = count.clamp(1, MAX_REPEATS as u8);
        inst.repeat_mode = mode;

        let slots = [
            (OperandSlot::Src0, inst.src0),
            (OperandSlot::Src1, inst.src1),
            (OperandSlot::Src2, inst.src2),
            (OperandSlot::Dest, inst.dest),
        ];
        for repeat in 0..inst.repeat_count as usize {
            for (slot, op) in &slots {
                inst.repeat_offsets[repeat][*slot as usize] =
                    self.repeat_offset(op, *slot, repeat, mode, multipliers[*slot as usize]);
            }
        }
    }
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Repeat count from an encoded field, saturating at four repeats
pub fn repeat_count(raw: u8) -> u8 {
    raw.min(MAX_REPEATS as u8 - 1) + 1
}

//=============================================================================
// DECODE TABLE
//=============================================================================

const PATTERNS: &[(&str, &str, DecodeFn)] = &[
    ("VMOV", "00111pppstrydecbmmaanoooiwwwwkllffgghhhhjjjjjjqqqqqquuuuuuvvvvvv", alu::vmov),
    ("VMAD", "00011pppsg1oderiiattnwwwwcbfhzkkjjllmmmmmmqqqquuuuvvxyAAAABBBBBB", alu::vmad),
    ("VMAD2", "00000dpps-ry-cbawwwineeeemmookttffgghhhhhhzzjjllllllqqqqqquuuuuu", alu::vmad2),
    ("VNMAD32", "00001pppsrrydcbawwwwneeeemmoiittkkllffffffzzzzzzzggghhhhhhjjjjjj", alu::vnmad),
    ("VNMAD16", "00010pppsrrydcbawwwwneeeemmoiittkkllffffffzzzzzzzggghhhhhhjjjjjj", alu::vnmad),
    ("VPCK", "01000pppsnuyderc-aaaffftttmmmmbbkkllgggggggoohiijjqqqqqqvwwwwwwx", alu::vpck),
    ("SOP2", "10000ppcsnaaderbmooofllggghhhittkkjjqqqqqqquvvwwxyzzzzzzzAAAAAAA", flow::unsupported),
    ("I8MAD", "10001ppcsnaaderbmoootCAMNOxygkDDFFGGqqqqqqquuuuuuuvvvvvvvwwwwwww", ialu::i8mad),
    ("I16MAD", "10010ppasnghderbooommttffHOO-kDDSSTTqqqqqqquuuuuuuvvvvvvvwwwwwww", ialu::i16mad),
    ("I32MAD", "10011pphnijderbooogtyy-------kDDSSTTqqqqqqquuuuuuuvvvvvvvwwwwwww", ialu::i32mad),
    ("VTST", "01001ppps-oydrceavttiizzmhhhnnbbkkffgggggggwlluuuujjjjjjjqqqqqqq", compare::vtst),
    ("VTSTMSK", "01111ppps-oydtrcevuuiizzm-aa--bbnnkkfffffffwllgggghhhhhhhjjjjjjj", compare::vtstmsk),
    ("VBW", "01ooopppsnrydecxmmmmittttthhabkkffggjjjjjjjlllllllqqqqqqquuuuuuu", ialu::vbw),
    ("PHAS", "11111----100----------------------------------------------------", flow::phas),
    ("NOP", "11111----000-----------101--------------------------------------", flow::nop),
    ("BR", "11111ppps000e-----wynba00r----------------iloooooooooooooooooooo", flow::br),
    ("SMP", "11100pppsn-ymrceffaaddlltbbggkhhiijjoooooooqqqqqqquuuuuuuvvvvvvv", texture::smp),
    ("SMLSI", "11111010--01-n--ttttppppssssdrcieeeeeeeeaaaaaaaabbbbbbbbffffffff", flow::smlsi),
    ("KILL", "11111001--11000000000pp00000011011110000000000000000000000000000", flow::kill),
    ("SPEC", "11111----scc----------------------------------------------------", flow::spec),
    ("VCOMP", "00110pppsddyenr-aaaaobbccmmff-ttkk--ggggggg-------hhhhhhh---wwww", alu::vcomp),
    ("VDP", "00011pppsc0oderiigaanwwwwbflllttkkhhjjjjjjzzzzmmmqqqyyyxxxuuuuuu", alu::vdp),
    ("VDUAL", "0010cgsskdtpuuuunaaalriiiiwwwwmmffeebbbbbbbooohhjqvvxxyyyzzzzzzz", flow::unsupported),
    ("VLDST", "111oopppsnmycrbakkkkddeetgffihjlqquuvvvvvvvwwwwwwwxxxxxxxzzzzzzz", flow::unsupported),
];

static DECODE_TABLE: Lazy<Vec<Matcher>> = Lazy::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(name, pattern, decode)| match Matcher::new(name, pattern, *decode) {
            Ok(m) => Some(m),
            Err(e) => {
                shader_error!("Dropping decode table entry: {}", e);
                None
            }
        })
        .collect()
});

/// The decode table in priority order
pub fn decode_table() -> &'static [Matcher] {
    &DECODE_TABLE
}

/// Find the first matcher accepting `word`
pub fn find_matcher(word: u64) -> Option<&'static Matcher> {
    DECODE_TABLE.iter().find(|m| m.matches(word))
}

//=============================================================================
// PROGRAM DECODING
//=============================================================================

/// Decode one word at the context's position
pub fn decode_instruction(ctx: &mut DecodeContext, word: u64) -> Instruction {
    ctx.word = word;

    let Some(matcher) = find_matcher(word) else {
        shader_warn!("pc {}: no decoder matches {:016x}", ctx.pc, word);
        return Instruction::skipped(ctx.pc, word, "unknown instruction");
    };

    match matcher.decode(ctx, word) {
        Ok(inst) => {
            shader_trace!("{}", disasm::instruction_to_str(&inst));
            inst
        }
        Err(reason) => {
            shader_warn!("pc {}: {} {:016x} skipped: {}", ctx.pc, matcher.name(), word, reason);
            Instruction::skipped(ctx.pc, word, format!("{}: {}", matcher.name(), reason))
        }
    }
}

/// Decode a sequence of instruction words
pub fn decode_program(words: &[u64], secondary: bool) -> Result<Vec<Instruction>, DecodeError> {
    if words.is_empty() {
        return Err(DecodeError::Empty);
    }
    if words.len() > MAX_INSTRUCTIONS {
        return Err(DecodeError::TooManyInstructions {
            count: words.len(),
            limit: MAX_INSTRUCTIONS,
        });
    }

    let mut ctx = DecodeContext::new(secondary);
    let mut out = Vec::with_capacity(words.len());
    for (pc, &word) in words.iter().enumerate() {
        ctx.pc = pc as u32;
        out.push(decode_instruction(&mut ctx, word));
    }
    Ok(out)
}

/// Split raw program bytes into little-endian words
pub fn words_from_bytes(code: &[u8]) -> Result<Vec<u64>, DecodeError> {
    if code.len() % WORD_SIZE != 0 {
        return Err(DecodeError::Misaligned(code.len()));
    }
    Ok(code
        .chunks_exact(WORD_SIZE)
        .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect())
}

/// Decode raw program bytes
pub fn decode_bytes(code: &[u8], secondary: bool) -> Result<Vec<Instruction>, DecodeError> {
    let words = words_from_bytes(code)?;
    decode_program(&words, secondary)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Assemble a word from a pattern and field values
    pub(crate) fn assemble(pattern: &str, fields: &[(char, u64)]) -> u64 {
        let chars: Vec<char> = pattern.chars().collect();
        assert_eq!(chars.len(), 64, "pattern length");
        let mut word = 0u64;
        for (c, value) in fields {
            let positions: Vec<usize> = (0..64).filter(|&i| chars[i] == *c).collect();
            assert!(!positions.is_empty(), "no field {}", c);
            for (k, &i) in positions.iter().enumerate() {
                let bit = (value >> (positions.len() - 1 - k)) & 1;
                word |= bit << (63 - i);
            }
        }
        for (i, c) in chars.iter().enumerate() {
            if *c == '1' {
                word |= 1 << (63 - i);
            }
        }
        word
    }

    pub(crate) fn pattern(name: &str) -> &'static str {
        PATTERNS
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, p, _)| *p)
            .unwrap()
    }

    #[test]
    fn test_table_compiles() {
        assert_eq!(decode_table().len(), PATTERNS.len());
        for (name, pattern, _) in PATTERNS {
            assert_eq!(pattern.len(), 64, "{} pattern length", name);
        }
    }

    #[test]
    fn test_dispatch_priorities() {
        let vmov = assemble(pattern("VMOV"), &[]);
        assert_eq!(find_matcher(vmov).unwrap().name(), "VMOV");

        let vdp = assemble(pattern("VDP"), &[]);
        assert_eq!(find_matcher(vdp).unwrap().name(), "VDP");

        let vmad = assemble(pattern("VMAD"), &[]);
        assert_eq!(find_matcher(vmad).unwrap().name(), "VMAD");

        let kill = assemble(pattern("KILL"), &[]);
        assert_eq!(find_matcher(kill).unwrap().name(), "KILL");

        let nop = assemble(pattern("NOP"), &[]);
        assert_eq!(find_matcher(nop).unwrap().name(), "NOP");

        let br = assemble(pattern("BR"), &[]);
        assert_eq!(find_matcher(br).unwrap().name(), "BR");

        let smlsi = assemble(pattern("SMLSI"), &[]);
        assert_eq!(find_matcher(smlsi).unwrap().name(), "SMLSI");

        let vpck = assemble(pattern("VPCK"), &[]);
        assert_eq!(find_matcher(vpck).unwrap().name(), "VPCK");

        let vbw = assemble(pattern("VBW"), &[('o', 0b011)]);
        assert_eq!(find_matcher(vbw).unwrap().name(), "VBW");
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_program(&[], false), Err(DecodeError::Empty));
        let words = vec![0u64; MAX_INSTRUCTIONS + 1];
        assert_eq!(
            decode_program(&words, false),
            Err(DecodeError::TooManyInstructions { count: MAX_INSTRUCTIONS + 1, limit: MAX_INSTRUCTIONS })
        );
        assert_eq!(decode_bytes(&[0u8; 12], false), Err(DecodeError::Misaligned(12)));
    }

    #[test]
    fn test_unsupported_family_becomes_skipped_nop() {
        let word = assemble(pattern("VDUAL"), &[]);
        let program = decode_program(&[word], false).unwrap();
        assert_eq!(program[0].opcode, Opcode::Nop);
        assert!(program[0].is_skipped());
    }

    #[test]
    fn test_pc_assigned_in_order() {
        let nop = assemble(pattern("NOP"), &[]);
        let program = decode_program(&[nop, nop, nop], false).unwrap();
        let pcs: Vec<u32> = program.iter().map(|i| i.pc).collect();
        assert_eq!(pcs, vec![0, 1, 2]);
    }

    #[test]
    fn test_repeat_offsets_by_mode() {
        let ctx = DecodeContext::new(false);
        let mut inst = ctx.instruction(Opcode::Vmad);
        inst.dest = Operand { bank: RegisterBank::Temp, num: 0, ..Default::default() };
        inst.src0 = decode_gpi(1);
        inst.src1 = Operand { bank: RegisterBank::PrimAttr, num: 4, ..Default::default() };
        inst.src2 = Operand { bank: RegisterBank::FpInternal, num: 2, ..Default::default() };

        ctx.apply_repeat(&mut inst, 3, RepeatMode::Both, [1; 4]);
        assert_eq!(inst.repeat_offset(2, OperandSlot::Dest), 8);
        assert_eq!(inst.repeat_offset(2, OperandSlot::Src0), 0);
        assert_eq!(inst.repeat_offset(2, OperandSlot::Src2), 2);

        ctx.apply_repeat(&mut inst, 3, RepeatMode::Internal, [1; 4]);
        assert_eq!(inst.repeat_offset(1, OperandSlot::Src0), 1);
        assert_eq!(inst.repeat_offset(1, OperandSlot::Dest), 0);

        ctx.apply_repeat(&mut inst, 3, RepeatMode::External, [1; 4]);
        assert_eq!(inst.repeat_offset(1, OperandSlot::Src1), 4);
        assert_eq!(inst.repeat_offset(1, OperandSlot::Src2), 0);

        ctx.apply_repeat(&mut inst, 2, RepeatMode::Slmsi, [2, 2, 2, 2]);
        assert_eq!(inst.repeat_offset(1, OperandSlot::Dest), 2);
        assert_eq!(inst.repeat_offset(1, OperandSlot::Src2), 1);
    }

    #[test]
    fn test_repeat_count_saturates() {
        assert_eq!(repeat_count(0), 1);
        assert_eq!(repeat_count(3), 4);
        assert_eq!(repeat_count(7), 4);
    }
}
