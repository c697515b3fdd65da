//! Shared types: storage precision and the crate error type.

use std::fmt;

use thiserror::Error;

/// Storage precision of the gate and scratch-gate buffers.
///
/// Cell states, hidden/cell gradients and peephole weights are always f32;
/// only the gate buffers follow this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    BF16,
}

impl DType {
    /// Size in bytes per element.
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::BF16 => 2,
        }
    }

    /// Short lowercase name, used in logs and dump file names.
    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::BF16 => "bf16",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("compile error: {0}")]
    CompileError(String),
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    #[error("kernel generator already initialized")]
    AlreadyInitialized,
    #[error("kernel generator not initialized")]
    NotInitialized,
    #[error("shape mismatch for {buffer}: expected {expected} elements, got {got}")]
    ShapeMismatch {
        buffer: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("storage dtype mismatch: kernel built for {expected}, called with {got}")]
    DTypeMismatch { expected: DType, got: DType },
    #[error("invalid ISA override: {0}")]
    InvalidIsaOverride(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KernelError>;

impl From<iced_x86::IcedError> for KernelError {
    fn from(err: iced_x86::IcedError) -> Self {
        KernelError::CompileError(err.to_string())
    }
}
