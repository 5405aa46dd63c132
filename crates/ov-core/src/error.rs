//! Error types for the oxidized-vita emulator

use thiserror::Error;

/// Main error type for the emulator
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Shader error: {0}")]
    Shader(#[from] ShaderError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}

/// Errors raised while splitting a program blob into instruction words
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Program code is {0} bytes, not a multiple of the 8-byte word size")]
    Misaligned(usize),

    #[error("Program contains no instructions")]
    Empty,

    #[error("Program has {count} instructions, limit is {limit}")]
    TooManyInstructions { count: usize, limit: usize },

    #[error("Program code range 0x{offset:x}+0x{len:x} exceeds blob size 0x{size:x}")]
    OutOfBounds { offset: usize, len: usize, size: usize },
}

/// Shader container, translation and cache errors
#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Bad GXP magic: {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("GXP blob truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Shader generation failed: {0}")]
    Generation(String),

    #[error("Shader cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kernel synchronization errors
///
/// Every variant maps to the numeric code a guest sees through [`KernelError::code`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    #[error("Illegal attribute bits")]
    IllegalAttr,

    #[error("Unknown thread ID")]
    UnknownThreadId,

    #[error("Illegal count")]
    IllegalCount,

    #[error("Object name too long")]
    UidNameTooLong,

    #[error("Wait timed out")]
    WaitTimeout,

    #[error("Wait cancelled")]
    WaitCancel,

    #[error("Object deleted while waiting")]
    WaitDelete,

    #[error("Unknown semaphore ID")]
    UnknownSemaId,

    #[error("Semaphore count is zero")]
    SemaZero,

    #[error("Semaphore count overflow")]
    SemaOverflow,

    #[error("Unknown event flag ID")]
    UnknownEventFlagId,

    #[error("Event flag already has a waiting thread")]
    EventFlagMulti,

    #[error("Event flag condition not met")]
    EventFlagCondition,

    #[error("Unknown mutex ID")]
    UnknownMutexId,

    #[error("Mutex is not recursive")]
    MutexRecursive,

    #[error("Mutex lock count overflow")]
    MutexLockOverflow,

    #[error("Mutex unlock underflow")]
    MutexUnlockUnderflow,

    #[error("Failed to own mutex")]
    MutexFailedToOwn,

    #[error("Unknown lightweight mutex ID")]
    UnknownLwMutexId,

    #[error("Lightweight mutex is not recursive")]
    LwMutexRecursive,

    #[error("Lightweight mutex unlock underflow")]
    LwMutexUnlockUnderflow,

    #[error("Failed to own lightweight mutex")]
    LwMutexFailedToOwn,

    #[error("Unknown condition variable ID")]
    UnknownCondId,

    #[error("Signal target is not waiting on the condition variable")]
    CondSignalTargetNotWaiting,

    #[error("Unknown lightweight condition variable ID")]
    UnknownLwCondId,

    #[error("Unknown message pipe ID")]
    UnknownMsgPipeId,

    #[error("Message pipe is full")]
    MsgPipeFull,

    #[error("Message pipe is empty")]
    MsgPipeEmpty,
}

impl KernelError {
    /// Guest-visible error code
    pub const fn code(&self) -> u32 {
        match self {
            Self::UnknownThreadId => 0x8002_8001,
            Self::IllegalCount => 0x8002_00FE,
            Self::IllegalAttr => 0x8002_0193,
            Self::UidNameTooLong => 0x8002_0185,
            Self::WaitTimeout => 0x8002_8005,
            Self::WaitCancel => 0x8002_8006,
            Self::WaitDelete => 0x8002_8007,
            Self::UnknownSemaId => 0x8002_81C1,
            Self::SemaZero => 0x8002_81C2,
            Self::SemaOverflow => 0x8002_81C3,
            Self::UnknownEventFlagId => 0x8002_8201,
            Self::EventFlagMulti => 0x8002_8202,
            Self::EventFlagCondition => 0x8002_8203,
            Self::UnknownMutexId => 0x8002_8241,
            Self::MutexRecursive => 0x8002_8242,
            Self::MutexLockOverflow => 0x8002_8243,
            Self::MutexUnlockUnderflow => 0x8002_8244,
            Self::MutexFailedToOwn => 0x8002_8245,
            Self::UnknownLwMutexId => 0x8002_8281,
            Self::LwMutexRecursive => 0x8002_8282,
            Self::LwMutexUnlockUnderflow => 0x8002_8284,
            Self::LwMutexFailedToOwn => 0x8002_8285,
            Self::UnknownCondId => 0x8002_82C1,
            Self::CondSignalTargetNotWaiting => 0x8002_82C2,
            Self::UnknownLwCondId => 0x8002_8301,
            Self::UnknownMsgPipeId => 0x8002_8381,
            Self::MsgPipeFull => 0x8002_8382,
            Self::MsgPipeEmpty => 0x8002_8383,
        }
    }
}

/// Result type alias for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DecodeError::TooManyInstructions { count: 5000, limit: 4096 };
        assert_eq!(format!("{}", err), "Program has 5000 instructions, limit is 4096");

        let err = ShaderError::BadMagic(*b"ELF\0");
        assert_eq!(format!("{}", err), "Bad GXP magic: [45, 4c, 46, 00]");
    }

    #[test]
    fn test_error_conversion() {
        let decode_err = DecodeError::Empty;
        let shader_err: ShaderError = decode_err.into();
        assert!(matches!(shader_err, ShaderError::Decode(DecodeError::Empty)));

        let emu_err: EmulatorError = KernelError::SemaZero.into();
        assert!(matches!(emu_err, EmulatorError::Kernel(KernelError::SemaZero)));
    }

    #[test]
    fn test_kernel_codes_distinct_per_weight() {
        assert_ne!(KernelError::MutexRecursive.code(), KernelError::LwMutexRecursive.code());
        assert_ne!(KernelError::UnknownMutexId.code(), KernelError::UnknownLwMutexId.code());
        assert_eq!(KernelError::UnknownSemaId.code(), 0x800281C1);
        assert_eq!(KernelError::MutexFailedToOwn.code(), 0x80028245);
    }
}
