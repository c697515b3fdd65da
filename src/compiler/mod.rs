//! JIT compilation of RNN post-GEMM kernels.
//!
//! # Pipeline
//!
//! ```text
//! (IsaLevel, DType) → IsaTraits → KernelCodegen → CodegenOutput → JitKernel
//!        ↑                ↑              ↑                            ↑
//!    dispatch/      codegen/       rnn/postgemm_bwd.rs        executable.rs
//!                   target_desc.rs
//! ```

pub mod codegen;
pub mod executable;

pub use codegen::{CodegenOutput, KernelCodegen};
pub use executable::{JitKernel, LstmBwdKernelFn};

use std::path::{Path, PathBuf};

use crate::types::Result;

/// Environment variable enabling code dumps: `1` writes to the current
/// directory, any other non-empty value names the target directory.
pub const DUMP_ENV: &str = "RNN_JIT_DUMP";

/// Directory generated code should be written to, if dumping is enabled.
pub fn dump_dir() -> Option<PathBuf> {
    match std::env::var(DUMP_ENV) {
        Ok(v) if v.is_empty() || v == "0" => None,
        Ok(v) if v == "1" => Some(PathBuf::from(".")),
        Ok(v) => Some(PathBuf::from(v)),
        Err(_) => None,
    }
}

/// Write `code` to `dir/name`, creating `dir` if needed.
pub fn dump_code(dir: &Path, name: &str, code: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, code)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_code_writes_file() {
        let dir = std::env::temp_dir().join(format!("rnn-jit-dump-{}", std::process::id()));
        let path = dump_code(&dir, "blob.bin", &[0xC3]).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xC3]);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
