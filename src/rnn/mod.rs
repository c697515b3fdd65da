//! RNN cell post-GEMM kernels.
//!
//! `postgemm_bwd` generates the LSTM backward elementwise stage; `reference`
//! evaluates the same formulas in portable Rust.

pub mod args;
pub mod config;
pub mod postgemm_bwd;
pub mod reference;

pub use args::{GateBuffers, LstmBwdArgs};
pub use config::{PrimitiveDesc, RnnConf};
pub use postgemm_bwd::LstmCellPostgemmBwd;

/// Gate rows per element in the gate buffers.
pub const N_GATES: usize = 4;
/// Peephole weight rows.
pub const N_PEEPHOLE: usize = 3;

/// Gate rows of the workspace and scratch buffers, in memory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Input,
    Forget,
    Candidate,
    Output,
}

impl Gate {
    pub const ALL: [Gate; N_GATES] = [Gate::Input, Gate::Forget, Gate::Candidate, Gate::Output];

    /// Row index within a gate buffer.
    pub const fn slot(self) -> usize {
        match self {
            Gate::Input => 0,
            Gate::Forget => 1,
            Gate::Candidate => 2,
            Gate::Output => 3,
        }
    }

    /// Row index within the peephole weights, for gates that have one.
    pub const fn peephole_slot(self) -> Option<usize> {
        match self {
            Gate::Input => Some(0),
            Gate::Forget => Some(1),
            Gate::Output => Some(2),
            Gate::Candidate => None,
        }
    }
}
