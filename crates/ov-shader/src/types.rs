//! USSE shader type definitions
//!
//! Register banks, data types, swizzles, predicates and the decoded
//! instruction shape shared by the decoder, resolver and code generator.

use bitflags::bitflags;

//=============================================================================
// REGISTER BANKS
//=============================================================================

/// USSE register bank
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterBank {
    Temp = 0,
    PrimAttr = 1,
    Output = 2,
    SecAttr = 3,
    FpInternal = 4,
    Special = 5,
    Global = 6,
    FpConstant = 7,
    Immediate = 8,
    Index = 9,
    Indexed1 = 10,
    Indexed2 = 11,
    Predicate = 12,
    Invalid = 13,
}

impl RegisterBank {
    /// Short prefix used in disassembly output
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Temp => "r",
            Self::PrimAttr => "pa",
            Self::Output => "o",
            Self::SecAttr => "sa",
            Self::FpInternal => "i",
            Self::Special => "spec",
            Self::Global => "g",
            Self::FpConstant => "c",
            Self::Immediate => "#",
            Self::Index => "idx",
            Self::Indexed1 => "idx1",
            Self::Indexed2 => "idx2",
            Self::Predicate => "p",
            Self::Invalid => "?",
        }
    }

    /// Banks backed by per-shader storage the resolver can allocate
    pub const fn is_storage(self) -> bool {
        matches!(
            self,
            Self::Temp | Self::PrimAttr | Self::Output | Self::SecAttr | Self::FpInternal
        )
    }
}

//=============================================================================
// DATA TYPES
//=============================================================================

/// Operand data type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8 = 0,
    Int16 = 1,
    Int32 = 2,
    C10 = 3,
    F16 = 4,
    F32 = 5,
    Uint8 = 6,
    Uint16 = 7,
    Uint32 = 8,
    O8 = 9,
    Unk = 10,
}

impl From<u8> for DataType {
    fn from(v: u8) -> Self {
        match v {
            0 => DataType::Int8,
            1 => DataType::Int16,
            2 => DataType::Int32,
            3 => DataType::C10,
            4 => DataType::F16,
            5 => DataType::F32,
            6 => DataType::Uint8,
            7 => DataType::Uint16,
            8 => DataType::Uint32,
            9 => DataType::O8,
            _ => DataType::Unk,
        }
    }
}

impl DataType {
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16 | Self::C10)
    }

    pub const fn is_unsigned(self) -> bool {
        matches!(self, Self::Uint8 | Self::Uint16 | Self::Uint32 | Self::O8)
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32)
    }

    /// Width of one component in bits
    pub const fn bits(self) -> u32 {
        match self {
            Self::Int8 | Self::Uint8 | Self::O8 => 8,
            Self::Int16 | Self::Uint16 | Self::F16 | Self::C10 => 16,
            Self::Int32 | Self::Uint32 | Self::F32 | Self::Unk => 32,
        }
    }

    /// Number of components packed into one 32-bit register
    pub const fn per_register(self) -> u32 {
        32 / self.bits()
    }

    /// Short name used in disassembly output
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Int8 => "i8",
            Self::Int16 => "i16",
            Self::Int32 => "i32",
            Self::C10 => "c10",
            Self::F16 => "f16",
            Self::F32 => "f32",
            Self::Uint8 => "u8",
            Self::Uint16 => "u16",
            Self::Uint32 => "u32",
            Self::O8 => "o8",
            Self::Unk => "unk",
        }
    }
}

//=============================================================================
// SWIZZLES
//=============================================================================

/// One swizzle selector
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwizzleChannel {
    X = 0,
    Y = 1,
    Z = 2,
    W = 3,
    Zero = 4,
    One = 5,
    Two = 6,
    Half = 7,
    Undefined = 8,
}

impl From<u8> for SwizzleChannel {
    fn from(v: u8) -> Self {
        match v {
            0 => SwizzleChannel::X,
            1 => SwizzleChannel::Y,
            2 => SwizzleChannel::Z,
            3 => SwizzleChannel::W,
            4 => SwizzleChannel::Zero,
            5 => SwizzleChannel::One,
            6 => SwizzleChannel::Two,
            7 => SwizzleChannel::Half,
            _ => SwizzleChannel::Undefined,
        }
    }
}

impl SwizzleChannel {
    /// Component index for register channels, `None` for constants
    pub const fn component(self) -> Option<u32> {
        match self {
            Self::X => Some(0),
            Self::Y => Some(1),
            Self::Z => Some(2),
            Self::W => Some(3),
            _ => None,
        }
    }

    /// Constant value for the immediate channels
    pub const fn constant(self) -> Option<f32> {
        match self {
            Self::Zero => Some(0.0),
            Self::One => Some(1.0),
            Self::Two => Some(2.0),
            Self::Half => Some(0.5),
            _ => None,
        }
    }

    pub const fn as_char(self) -> char {
        match self {
            Self::X => 'x',
            Self::Y => 'y',
            Self::Z => 'z',
            Self::W => 'w',
            Self::Zero => '0',
            Self::One => '1',
            Self::Two => '2',
            Self::Half => 'h',
            Self::Undefined => '?',
        }
    }
}

pub type Swizzle4 = [SwizzleChannel; 4];
pub type Swizzle3 = [SwizzleChannel; 3];

pub const SWIZZLE_XYZW: Swizzle4 = [
    SwizzleChannel::X,
    SwizzleChannel::Y,
    SwizzleChannel::Z,
    SwizzleChannel::W,
];

pub const SWIZZLE_UNDEFINED: Swizzle4 = [SwizzleChannel::Undefined; 4];

/// Widen a three-channel swizzle, the fourth channel reads X
pub const fn to_swizzle4(sw: Swizzle3) -> Swizzle4 {
    [sw[0], sw[1], sw[2], SwizzleChannel::X]
}

/// Compare two swizzles on the channels selected by `mask`
pub fn swizzles_identical(lhs: &Swizzle4, rhs: &Swizzle4, mask: u8) -> bool {
    (0..4).all(|i| mask & (1 << i) == 0 || lhs[i] == rhs[i])
}

//=============================================================================
// PREDICATES
//=============================================================================

/// Extended predicate (3-bit encoding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtPredicate {
    None = 0,
    P0 = 1,
    P1 = 2,
    P2 = 3,
    P3 = 4,
    NegP0 = 5,
    NegP1 = 6,
    PN = 7,
}

impl From<u8> for ExtPredicate {
    fn from(v: u8) -> Self {
        match v & 0x7 {
            1 => ExtPredicate::P0,
            2 => ExtPredicate::P1,
            3 => ExtPredicate::P2,
            4 => ExtPredicate::P3,
            5 => ExtPredicate::NegP0,
            6 => ExtPredicate::NegP1,
            7 => ExtPredicate::PN,
            _ => ExtPredicate::None,
        }
    }
}

impl ExtPredicate {
    /// Predicate register and negation, `None` when unconditional
    pub const fn register(self) -> Option<(u8, bool)> {
        match self {
            Self::P0 => Some((0, false)),
            Self::P1 => Some((1, false)),
            Self::P2 => Some((2, false)),
            Self::P3 => Some((3, false)),
            Self::NegP0 => Some((0, true)),
            Self::NegP1 => Some((1, true)),
            Self::None | Self::PN => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::P0 => "p0 ",
            Self::P1 => "p1 ",
            Self::P2 => "p2 ",
            Self::P3 => "p3 ",
            Self::NegP0 => "!p0 ",
            Self::NegP1 => "!p1 ",
            Self::PN => "pn ",
        }
    }
}

/// Short predicate (2-bit encoding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShortPredicate {
    None = 0,
    P0 = 1,
    P1 = 2,
    NegP0 = 3,
}

impl From<u8> for ShortPredicate {
    fn from(v: u8) -> Self {
        match v & 0x3 {
            1 => ShortPredicate::P0,
            2 => ShortPredicate::P1,
            3 => ShortPredicate::NegP0,
            _ => ShortPredicate::None,
        }
    }
}

impl From<ShortPredicate> for ExtPredicate {
    fn from(p: ShortPredicate) -> Self {
        match p {
            ShortPredicate::None => ExtPredicate::None,
            ShortPredicate::P0 => ExtPredicate::P0,
            ShortPredicate::P1 => ExtPredicate::P1,
            ShortPredicate::NegP0 => ExtPredicate::NegP0,
        }
    }
}

//=============================================================================
// REPEATS, COMPARES AND TESTS
//=============================================================================

/// How operand register numbers advance across repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepeatMode {
    /// Increments configured by the last SMLSI
    Slmsi,
    /// Only fp-internal operands advance
    Internal,
    /// Non fp-internal operands advance by a whole vec4
    External,
    /// Fp-internal by one, everything else by a vec4
    Both,
}

impl From<u8> for RepeatMode {
    fn from(v: u8) -> Self {
        match v & 0x3 {
            1 => RepeatMode::Internal,
            2 => RepeatMode::External,
            3 => RepeatMode::Both,
            _ => RepeatMode::Slmsi,
        }
    }
}

/// Conditional move comparison against zero
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareMethod {
    NeZero = 0,
    EqZero = 1,
    LtZero = 2,
    LteZero = 3,
}

impl From<u8> for CompareMethod {
    fn from(v: u8) -> Self {
        match v & 0x3 {
            1 => CompareMethod::EqZero,
            2 => CompareMethod::LtZero,
            3 => CompareMethod::LteZero,
            _ => CompareMethod::NeZero,
        }
    }
}

impl CompareMethod {
    /// Scalar comparison operator
    pub const fn operator(self) -> &'static str {
        match self {
            Self::NeZero => "!=",
            Self::EqZero => "==",
            Self::LtZero => "<",
            Self::LteZero => "<=",
        }
    }

    /// Component-wise comparison builtin
    pub const fn function(self) -> &'static str {
        match self {
            Self::NeZero => "notEqual",
            Self::EqZero => "equal",
            Self::LtZero => "lessThan",
            Self::LteZero => "lessThanEqual",
        }
    }
}

/// Zero half of a test condition
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZeroTest {
    Always = 0,
    Zero = 1,
    NonZero = 2,
}

impl ZeroTest {
    pub fn from_bits(v: u8) -> Option<Self> {
        match v {
            0 => Some(ZeroTest::Always),
            1 => Some(ZeroTest::Zero),
            2 => Some(ZeroTest::NonZero),
            _ => None,
        }
    }
}

/// Sign half of a test condition
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignTest {
    None = 0,
    LessThan = 1,
    GreaterThan = 2,
}

impl SignTest {
    pub fn from_bits(v: u8) -> Option<Self> {
        match v {
            0 => Some(SignTest::None),
            1 => Some(SignTest::LessThan),
            2 => Some(SignTest::GreaterThan),
            _ => None,
        }
    }
}

//=============================================================================
// OPCODES
//=============================================================================

/// Decoded USSE opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Phas,
    Spec,
    Smlsi,
    Kill,
    Br,
    Smp,

    Vmov,
    Vmovc,
    Vmovcu8,

    Vmad,
    Vf16Mad,
    Vdp,
    Vf16Dp,
    Vmul,
    Vf16Mul,
    Vadd,
    Vf16Add,
    Vsub,
    Vf16Sub,
    Vfrc,
    Vf16Frc,
    Vdsx,
    Vf16Dsx,
    Vdsy,
    Vf16Dsy,
    Vmin,
    Vf16Min,
    Vmax,
    Vf16Max,

    Vrcp,
    Vrsq,
    Vlog,
    Vexp,

    Vpck,

    And,
    Or,
    Xor,
    Shl,
    Shr,
    Rol,
    Asr,

    Ima8,
    Ima16,
    Imad,

    Iadd8,
    Isub8,
    Iaddu8,
    Isubu8,
    Imul8,
    Imulu8,
    Fpmul8,
    Fpadd8,
    Fpsub8,
    Iadd16,
    Isub16,
    Imul16,
    Iaddu16,
    Isubu16,
    Imulu16,
    Iadd32,
    Iaddu32,
    Isub32,
    Isubu32,

    Vtst,
    Vtstmsk,
}

/// Groups of opcodes sharing one code generation handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeFamily {
    Move,
    FloatMad,
    FloatVector,
    Complex,
    Pack,
    Bitwise,
    IntegerMad,
    Test,
    TestMask,
    Sample,
    Branch,
    Kill,
    Misc,
}

impl Opcode {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Phas => "PHAS",
            Self::Spec => "SPEC",
            Self::Smlsi => "SMLSI",
            Self::Kill => "KILL",
            Self::Br => "BR",
            Self::Smp => "SMP",
            Self::Vmov => "VMOV",
            Self::Vmovc => "VMOVC",
            Self::Vmovcu8 => "VMOVCU8",
            Self::Vmad => "VMAD",
            Self::Vf16Mad => "VF16MAD",
            Self::Vdp => "VDP",
            Self::Vf16Dp => "VF16DP",
            Self::Vmul => "VMUL",
            Self::Vf16Mul => "VF16MUL",
            Self::Vadd => "VADD",
            Self::Vf16Add => "VF16ADD",
            Self::Vsub => "VSUB",
            Self::Vf16Sub => "VF16SUB",
            Self::Vfrc => "VFRC",
            Self::Vf16Frc => "VF16FRC",
            Self::Vdsx => "VDSX",
            Self::Vf16Dsx => "VF16DSX",
            Self::Vdsy => "VDSY",
            Self::Vf16Dsy => "VF16DSY",
            Self::Vmin => "VMIN",
            Self::Vf16Min => "VF16MIN",
            Self::Vmax => "VMAX",
            Self::Vf16Max => "VF16MAX",
            Self::Vrcp => "VRCP",
            Self::Vrsq => "VRSQ",
            Self::Vlog => "VLOG",
            Self::Vexp => "VEXP",
            Self::Vpck => "VPCK",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Shl => "SHL",
            Self::Shr => "SHR",
            Self::Rol => "ROL",
            Self::Asr => "ASR",
            Self::Ima8 => "IMA8",
            Self::Ima16 => "IMA16",
            Self::Imad => "IMAD",
            Self::Iadd8 => "IADD8",
            Self::Isub8 => "ISUB8",
            Self::Iaddu8 => "IADDU8",
            Self::Isubu8 => "ISUBU8",
            Self::Imul8 => "IMUL8",
            Self::Imulu8 => "IMULU8",
            Self::Fpmul8 => "FPMUL8",
            Self::Fpadd8 => "FPADD8",
            Self::Fpsub8 => "FPSUB8",
            Self::Iadd16 => "IADD16",
            Self::Isub16 => "ISUB16",
            Self::Imul16 => "IMUL16",
            Self::Iaddu16 => "IADDU16",
            Self::Isubu16 => "ISUBU16",
            Self::Imulu16 => "IMULU16",
            Self::Iadd32 => "IADD32",
            Self::Iaddu32 => "IADDU32",
            Self::Isub32 => "ISUB32",
            Self::Isubu32 => "ISUBU32",
            Self::Vtst => "VTST",
            Self::Vtstmsk => "VTSTMSK",
        }
    }

    pub const fn family(self) -> OpcodeFamily {
        match self {
            Self::Vmov | Self::Vmovc | Self::Vmovcu8 => OpcodeFamily::Move,
            Self::Vmad | Self::Vf16Mad => OpcodeFamily::FloatMad,
            Self::Vdp
            | Self::Vf16Dp
            | Self::Vmul
            | Self::Vf16Mul
            | Self::Vadd
            | Self::Vf16Add
            | Self::Vsub
            | Self::Vf16Sub
            | Self::Vfrc
            | Self::Vf16Frc
            | Self::Vdsx
            | Self::Vf16Dsx
            | Self::Vdsy
            | Self::Vf16Dsy
            | Self::Vmin
            | Self::Vf16Min
            | Self::Vmax
            | Self::Vf16Max => OpcodeFamily::FloatVector,
            Self::Vrcp | Self::Vrsq | Self::Vlog | Self::Vexp => OpcodeFamily::Complex,
            Self::Vpck => OpcodeFamily::Pack,
            Self::And | Self::Or | Self::Xor | Self::Shl | Self::Shr | Self::Rol | Self::Asr => {
                OpcodeFamily::Bitwise
            }
            Self::Ima8 | Self::Ima16 | Self::Imad => OpcodeFamily::IntegerMad,
            Self::Vtst => OpcodeFamily::Test,
            Self::Vtstmsk => OpcodeFamily::TestMask,
            Self::Smp => OpcodeFamily::Sample,
            Self::Br => OpcodeFamily::Branch,
            Self::Kill => OpcodeFamily::Kill,
            _ => OpcodeFamily::Misc,
        }
    }

    /// Subtraction variants, compared operand against operand by tests
    pub const fn is_sub(self) -> bool {
        matches!(
            self,
            Self::Vsub
                | Self::Vf16Sub
                | Self::Isub8
                | Self::Isubu8
                | Self::Fpsub8
                | Self::Isub16
                | Self::Isubu16
                | Self::Isub32
                | Self::Isubu32
        )
    }
}

//=============================================================================
// OPERANDS AND INSTRUCTIONS
//=============================================================================

bitflags! {
    /// Operand modifiers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OperandFlags: u8 {
        const ABSOLUTE = 0x01;
        const NEGATIVE = 0x02;
        /// General purpose internal register, never advanced by external repeats
        const GPI = 0x04;
    }
}

/// Operand slot, indexes per-operand repeat state
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandSlot {
    Src0 = 0,
    Src1 = 1,
    Src2 = 2,
    Dest = 3,
}

/// A decoded register operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    pub bank: RegisterBank,
    pub num: u32,
    pub swizzle: Swizzle4,
    pub dtype: DataType,
    pub flags: OperandFlags,
}

impl Default for Operand {
    fn default() -> Self {
        Self {
            bank: RegisterBank::Invalid,
            num: 0,
            swizzle: SWIZZLE_XYZW,
            dtype: DataType::F32,
            flags: OperandFlags::empty(),
        }
    }
}

impl Operand {
    pub fn is_present(&self) -> bool {
        self.bank != RegisterBank::Invalid
    }

    /// Same register and the same swizzle on the masked channels
    pub fn is_same(&self, other: &Operand, mask: u8) -> bool {
        self.bank == other.bank
            && self.num == other.num
            && swizzles_identical(&self.swizzle, &other.swizzle, mask)
    }
}

/// Family-specific decoded payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detail {
    None,
    /// Decoded but not representable, replaced by a comment
    Skipped { reason: String },
    ConditionalMove { compare: CompareMethod },
    Dot { rotate_mask: bool },
    Test { alu_op: Opcode, zero: ZeroTest, sign: SignTest },
    Bitwise { immediate: Option<u32>, rotate: u8 },
    ByteMad { csel0: u8, asel0: bool, negate_add: bool },
    ShortMad { negate_add: bool },
    Pack { src_format: DataType, dest_format: DataType, scale: bool, split: bool },
    Sample { dim: u8, lod_mode: u8, sb_mode: u8 },
    Branch { target: Option<u32>, link: bool },
    Smlsi { increments: [[i32; 4]; 4] },
}

/// Maximum number of repeats an instruction can encode
pub const MAX_REPEATS: usize = 4;

/// A fully decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub pc: u32,
    pub word: u64,
    pub opcode: Opcode,
    pub predicate: ExtPredicate,
    pub dest: Operand,
    pub src0: Operand,
    pub src1: Operand,
    pub src2: Operand,
    pub dest_mask: u8,
    pub src_masks: [u8; 3],
    /// Number of repetitions, 1..=4
    pub repeat_count: u8,
    pub repeat_mode: RepeatMode,
    /// Register offset per repetition and operand slot
    pub repeat_offsets: [[i32; 4]; MAX_REPEATS],
    pub detail: Detail,
}

impl Instruction {
    pub fn new(pc: u32, word: u64, opcode: Opcode) -> Self {
        Self {
            pc,
            word,
            opcode,
            predicate: ExtPredicate::None,
            dest: Operand::default(),
            src0: Operand::default(),
            src1: Operand::default(),
            src2: Operand::default(),
            dest_mask: 0,
            src_masks: [0; 3],
            repeat_count: 1,
            repeat_mode: RepeatMode::Slmsi,
            repeat_offsets: [[0; 4]; MAX_REPEATS],
            detail: Detail::None,
        }
    }

    /// A no-op standing in for an instruction that could not be decoded
    pub fn skipped(pc: u32, word: u64, reason: impl Into<String>) -> Self {
        let mut inst = Self::new(pc, word, Opcode::Nop);
        inst.detail = Detail::Skipped { reason: reason.into() };
        inst
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.detail, Detail::Skipped { .. })
    }

    pub fn family(&self) -> OpcodeFamily {
        self.opcode.family()
    }

    pub fn repeat_offset(&self, repeat: usize, slot: OperandSlot) -> i32 {
        self.repeat_offsets
            .get(repeat)
            .map(|offsets| offsets[slot as usize])
            .unwrap_or(0)
    }
}

//=============================================================================
// PROGRAM-LEVEL TYPES
//=============================================================================

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// File extension used by the disk cache and shader dumps
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
        }
    }
}

/// Colour surface format the fragment output is written to
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorFormat {
    #[default]
    U8U8U8U8 = 0,
    F16F16F16F16 = 1,
    F32F32F32F32 = 2,
}

/// Per-draw information that changes the generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hints {
    /// Bit N set when vertex attribute location N is bound
    pub attribute_mask: u32,
    pub color_format: ColorFormat,
    pub mask_update: bool,
}

impl Default for Hints {
    fn default() -> Self {
        Self {
            attribute_mask: !0,
            color_format: ColorFormat::default(),
            mask_update: false,
        }
    }
}

impl Hints {
    /// Stable byte form mixed into the cache key
    pub fn to_bytes(&self) -> [u8; 6] {
        let mask = self.attribute_mask.to_le_bytes();
        [
            mask[0],
            mask[1],
            mask[2],
            mask[3],
            self.color_format as u8,
            self.mask_update as u8,
        ]
    }
}

bitflags! {
    /// Renderer capabilities the generated code may rely on
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeatureFlags: u32 {
        const DIRECT_FRAGCOLOR = 0x01;
        const INTEGER_MIXING = 0x02;
        const SHADER_INTERLOCK = 0x04;
        const TEXTURE_BARRIER = 0x08;
        const MASK_BIT = 0x10;
    }
}

impl FeatureFlags {
    /// Build the capability mask from the shader configuration
    pub fn from_config(config: &ov_core::config::ShaderConfig) -> Self {
        let mut flags = FeatureFlags::INTEGER_MIXING;
        flags.set(FeatureFlags::DIRECT_FRAGCOLOR, config.direct_fragcolor);
        flags.set(FeatureFlags::SHADER_INTERLOCK, config.support_shader_interlock);
        flags.set(FeatureFlags::TEXTURE_BARRIER, config.support_texture_barrier);
        flags.set(FeatureFlags::MASK_BIT, config.use_mask_bit);
        flags
    }
}

/// Result of translating one program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShader {
    pub source: String,
    pub stage: ShaderStage,
    /// SHA-256 of the program binary
    pub hash: [u8; 32],
    /// Cache key, SHA-256 of the program binary and the hints
    pub key: [u8; 32],
    pub hints: Hints,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_properties() {
        assert!(DataType::F16.is_float());
        assert!(DataType::Uint8.is_unsigned());
        assert!(DataType::Int32.is_signed());
        assert_eq!(DataType::Uint8.per_register(), 4);
        assert_eq!(DataType::F16.per_register(), 2);
        assert_eq!(DataType::F32.per_register(), 1);
        assert_eq!(DataType::from(5), DataType::F32);
        assert_eq!(DataType::from(12), DataType::Unk);
    }

    #[test]
    fn test_predicates() {
        assert_eq!(ExtPredicate::from(6).register(), Some((1, true)));
        assert_eq!(ExtPredicate::from(0).register(), None);
        assert_eq!(ExtPredicate::from(ShortPredicate::NegP0), ExtPredicate::NegP0);
    }

    #[test]
    fn test_operand_is_same() {
        let a = Operand { bank: RegisterBank::Temp, num: 4, ..Default::default() };
        let mut b = a;
        assert!(a.is_same(&b, 0b1111));
        b.swizzle[3] = SwizzleChannel::X;
        assert!(a.is_same(&b, 0b0111));
        assert!(!a.is_same(&b, 0b1111));
    }

    #[test]
    fn test_opcode_families() {
        assert_eq!(Opcode::Vmovc.family(), OpcodeFamily::Move);
        assert_eq!(Opcode::Vf16Dp.family(), OpcodeFamily::FloatVector);
        assert_eq!(Opcode::Asr.family(), OpcodeFamily::Bitwise);
        assert_eq!(Opcode::Smlsi.family(), OpcodeFamily::Misc);
        assert!(Opcode::Isubu16.is_sub());
        assert!(!Opcode::Iadd32.is_sub());
    }

    #[test]
    fn test_repeat_offset_lookup() {
        let mut inst = Instruction::new(0, 0, Opcode::Vmov);
        inst.repeat_offsets[2][OperandSlot::Dest as usize] = 8;
        assert_eq!(inst.repeat_offset(2, OperandSlot::Dest), 8);
        assert_eq!(inst.repeat_offset(7, OperandSlot::Dest), 0);
    }

    #[test]
    fn test_hints_bytes() {
        let hints = Hints { attribute_mask: 0x3, color_format: ColorFormat::F16F16F16F16, mask_update: true };
        assert_eq!(hints.to_bytes(), [3, 0, 0, 0, 1, 1]);
        assert_eq!(Hints::default().attribute_mask, u32::MAX);
    }
}
