//! Cell configuration and the primitive-level target descriptor.

use crate::dispatch::{effective_isa_level, IsaLevel};
use crate::types::{DType, KernelError, Result};

use super::{N_GATES, N_PEEPHOLE};

/// Shape and structural variant of one LSTM cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RnnConf {
    /// Hidden width: elements per gate and per state row.
    pub dhc: usize,
    pub is_lstm_peephole: bool,
    /// With projection the hidden-state gradient from the next timestep
    /// is not added.
    pub is_lstm_projection: bool,
}

impl RnnConf {
    pub fn new(dhc: usize) -> Self {
        RnnConf {
            dhc,
            is_lstm_peephole: false,
            is_lstm_projection: false,
        }
    }

    pub fn with_peephole(mut self, on: bool) -> Self {
        self.is_lstm_peephole = on;
        self
    }

    pub fn with_projection(mut self, on: bool) -> Self {
        self.is_lstm_projection = on;
        self
    }

    /// Check the configuration can be addressed by a kernel storing gates
    /// in `dtype`: every gate and peephole row offset must fit a 32-bit
    /// displacement.
    pub fn validate(&self, dtype: DType) -> Result<()> {
        if self.dhc == 0 {
            return Err(KernelError::InvalidConfig("dhc must be at least 1".into()));
        }
        let gate_span = self.dhc.checked_mul(N_GATES * dtype.size_bytes());
        let state_span = self.dhc.checked_mul(N_PEEPHOLE * std::mem::size_of::<f32>());
        let fits = |span: Option<usize>| span.is_some_and(|s| s <= i32::MAX as usize);
        if !fits(gate_span) || !fits(state_span) {
            return Err(KernelError::InvalidConfig(format!(
                "dhc {} too large for 32-bit gate offsets",
                self.dhc
            )));
        }
        Ok(())
    }
}

/// What the enclosing primitive decided about the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveDesc {
    pub isa: IsaLevel,
}

impl PrimitiveDesc {
    pub fn new(isa: IsaLevel) -> Self {
        PrimitiveDesc { isa }
    }

    /// Target the host's ISA, capped by `RNN_JIT_MAX_ISA`.
    pub fn for_host() -> Result<Self> {
        Ok(PrimitiveDesc {
            isa: effective_isa_level()?,
        })
    }
}
