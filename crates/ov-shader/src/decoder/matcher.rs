//! Bit-pattern instruction matchers
//!
//! A pattern is a 64 character string, most significant bit first:
//! `0`/`1` are fixed bits, `-` is don't-care and any letter names a field.
//! A letter may appear in more than one run, the runs are concatenated in
//! pattern order.

use super::DecodeContext;
use crate::types::Instruction;

/// Number of distinct field letters (`a-z`, `A-Z`)
const FIELD_SLOTS: usize = 52;

/// Decode function invoked for a matching word
pub type DecodeFn = fn(&mut DecodeContext, &Fields) -> Result<Instruction, String>;

fn slot_of(c: char) -> Option<usize> {
    match c {
        'a'..='z' => Some(c as usize - 'a' as usize),
        'A'..='Z' => Some(26 + c as usize - 'A' as usize),
        _ => None,
    }
}

/// A contiguous run of one field inside the word
#[derive(Debug, Clone, Copy)]
struct FieldRun {
    slot: u8,
    shift: u8,
    width: u8,
}

/// Field values extracted from one instruction word
#[derive(Debug, Clone)]
pub struct Fields {
    values: [u64; FIELD_SLOTS],
}

impl Fields {
    /// Value of the field named by `c`, zero when the pattern has no such field
    pub fn get(&self, c: char) -> u64 {
        slot_of(c).map(|s| self.values[s]).unwrap_or(0)
    }

    pub fn u8(&self, c: char) -> u8 {
        self.get(c) as u8
    }

    pub fn u32(&self, c: char) -> u32 {
        self.get(c) as u32
    }

    pub fn bit(&self, c: char) -> bool {
        self.get(c) != 0
    }
}

/// One entry of the decode table
pub struct Matcher {
    name: &'static str,
    mask: u64,
    expected: u64,
    runs: Vec<FieldRun>,
    decode: DecodeFn,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("name", &self.name)
            .field("mask", &format_args!("{:016x}", self.mask))
            .field("expected", &format_args!("{:016x}", self.expected))
            .finish()
    }
}

impl Matcher {
    /// Compile a pattern, failing on wrong length or unknown characters
    pub fn new(name: &'static str, pattern: &str, decode: DecodeFn) -> Result<Self, String> {
        let chars: Vec<char> = pattern.chars().collect();
        if chars.len() != 64 {
            return Err(format!("{}: pattern has {} bits", name, chars.len()));
        }

        let mut mask = 0u64;
        let mut expected = 0u64;
        let mut runs: Vec<FieldRun> = Vec::new();

        let mut i = 0;
        while i < 64 {
            let c = chars[i];
            let bit = 63 - i as u32;
            match c {
                '0' | '1' => {
                    mask |= 1 << bit;
                    if c == '1' {
                        expected |= 1 << bit;
                    }
                    i += 1;
                }
                '-' => i += 1,
                _ => {
                    let slot = slot_of(c).ok_or_else(|| format!("{}: bad pattern character {:?}", name, c))?;
                    let start = i;
                    while i < 64 && chars[i] == c {
                        i += 1;
                    }
                    let width = (i - start) as u8;
                    runs.push(FieldRun {
                        slot: slot as u8,
                        shift: (64 - i) as u8,
                        width,
                    });
                }
            }
        }

        Ok(Self { name, mask, expected, runs, decode })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matches(&self, word: u64) -> bool {
        word & self.mask == self.expected
    }

    pub fn extract(&self, word: u64) -> Fields {
        let mut values = [0u64; FIELD_SLOTS];
        for run in &self.runs {
            let field_mask = if run.width >= 64 { u64::MAX } else { (1u64 << run.width) - 1 };
            let value = (word >> run.shift) & field_mask;
            let slot = &mut values[run.slot as usize];
            *slot = (*slot << run.width) | value;
        }
        Fields { values }
    }

    pub fn decode(&self, ctx: &mut DecodeContext, word: u64) -> Result<Instruction, String> {
        let fields = self.extract(word);
        (self.decode)(ctx, &fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(ctx: &mut DecodeContext, _: &Fields) -> Result<Instruction, String> {
        Ok(Instruction::new(ctx.pc, ctx.word, crate::types::Opcode::Nop))
    }

    #[test]
    fn test_fixed_bits() {
        let pattern = format!("11111{}", "-".repeat(59));
        let m = Matcher::new("TEST", &pattern, dummy).unwrap();
        assert!(m.matches(0xF800_0000_0000_0000));
        assert!(m.matches(u64::MAX));
        assert!(!m.matches(0x7800_0000_0000_0000));
    }

    #[test]
    fn test_field_extraction() {
        let pattern = format!("aaab{}cc", "-".repeat(58));
        let m = Matcher::new("TEST", &pattern, dummy).unwrap();
        let fields = m.extract(0b1011u64 << 60 | 0b10);
        assert_eq!(fields.get('a'), 0b101);
        assert!(fields.bit('b'));
        assert_eq!(fields.get('c'), 0b10);
        assert_eq!(fields.get('z'), 0);
    }

    #[test]
    fn test_split_field_concatenates() {
        let pattern = format!("aa--aa{}", "-".repeat(58));
        let m = Matcher::new("TEST", &pattern, dummy).unwrap();
        let fields = m.extract(0b100001u64 << 58);
        assert_eq!(fields.get('a'), 0b1001);
    }

    #[test]
    fn test_bad_patterns() {
        assert!(Matcher::new("SHORT", "0101", dummy).is_err());
        let pattern = format!("0?{}", "-".repeat(62));
        assert!(Matcher::new("BADCHAR", &pattern, dummy).is_err());
    }
}
