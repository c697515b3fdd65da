//! Code generation trait and shared emission infrastructure.
//!
//! The `KernelCodegen` trait is the interface a kernel generator exposes
//! to the compiler: given its resolved target it emits one self-contained
//! machine-code blob (code followed by its constant tables).

pub mod math_approx;
pub mod reg_pool;
pub mod target_desc;
pub mod x86_64;

use crate::types::Result;

/// Output of code generation: raw machine code bytes.
#[derive(Debug, Clone)]
pub struct CodegenOutput {
    /// Code followed by constant tables.
    pub code: Vec<u8>,
    /// Offset of the first constant table (end of instructions).
    pub text_len: usize,
}

impl CodegenOutput {
    /// Bytes of instructions, without tables.
    pub fn text(&self) -> &[u8] {
        &self.code[..self.text_len]
    }
}

/// Trait for kernel generators.
pub trait KernelCodegen {
    /// Emit the kernel.
    fn generate(&self) -> Result<CodegenOutput>;
}
