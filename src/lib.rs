//! rnn-postgemm-jit: JIT-generated x86-64 kernels for the elementwise
//! stages of RNN cells.
//!
//! The crate emits machine code at runtime, specialized per vector ISA
//! (SSE4.1, AVX2, AVX-512 core, AVX-512 core + bf16) and per gate storage
//! precision (f32, bf16). The first kernel is the LSTM cell backward
//! post-GEMM stage: gate gradients and the cell-state gradient from the
//! forward gate activations.
//!
//! # Quick Start
//!
//! ```ignore
//! use rnn_postgemm_jit::{DType, LstmCellPostgemmBwd, PrimitiveDesc, RnnConf};
//!
//! let conf = RnnConf::new(512).with_peephole(true);
//! let mut stage = LstmCellPostgemmBwd::new(&conf, &PrimitiveDesc::for_host()?);
//! stage.init(DType::F32)?;
//! stage.execute(args)?;
//! ```
//!
//! # Environment
//!
//! - `RNN_JIT_MAX_ISA`: cap the detected ISA (`sse41`, `avx2`,
//!   `avx512_core`, `avx512_core_bf16`).
//! - `RNN_JIT_DUMP`: write each generated kernel to disk (`1` for the
//!   current directory, or a directory path).

pub mod compiler;
pub mod dispatch;
pub mod rnn;
pub mod traits;
pub mod types;

pub use compiler::{JitKernel, LstmBwdKernelFn};
pub use dispatch::{effective_isa_level, IsaLevel};
pub use rnn::reference::lstm_postgemm_bwd as lstm_postgemm_bwd_reference;
pub use rnn::{Gate, GateBuffers, LstmBwdArgs, LstmCellPostgemmBwd, PrimitiveDesc, RnnConf};
pub use traits::StorageElement;
pub use types::{DType, KernelError, Result};
