//! Buffers passed to one kernel invocation.

use crate::traits::StorageElement;
use crate::types::{KernelError, Result};

use super::config::RnnConf;
use super::{N_GATES, N_PEEPHOLE};

/// Forward gate values in, gate gradients out.
pub enum GateBuffers<'a, T> {
    /// Gradients go to a buffer distinct from the forward values.
    Separate {
        ws_gates: &'a [T],
        scratch_gates: &'a mut [T],
    },
    /// One buffer holds the forward values on entry and the gradients on
    /// exit.
    InPlace(&'a mut [T]),
}

/// Arguments of one backward post-GEMM step. Gate buffers hold `4 * dhc`
/// elements in gate-major order; every other buffer holds `dhc` f32 values
/// (peephole weights: `3 * dhc`).
pub struct LstmBwdArgs<'a, T> {
    pub gates: GateBuffers<'a, T>,
    /// dH from the layer above.
    pub diff_states_t_lp1: &'a [f32],
    /// dH from the next timestep; unused with projection.
    pub diff_states_tp1_l: &'a [f32],
    /// dC of this timestep (written).
    pub diff_c_states_t_l: &'a mut [f32],
    /// dC from the next timestep.
    pub diff_c_states_tp1_l: &'a [f32],
    pub c_states_tm1_l: &'a [f32],
    pub c_states_t_l: &'a [f32],
    /// `[input, forget, output]` rows; required iff the cell has peephole.
    pub weights_peephole: Option<&'a [f32]>,
}

impl<T: StorageElement> LstmBwdArgs<'_, T> {
    /// Check every buffer is long enough for `conf`.
    pub fn validate(&self, conf: &RnnConf) -> Result<()> {
        let dhc = conf.dhc;
        let gates_len = N_GATES * dhc;
        match &self.gates {
            GateBuffers::Separate {
                ws_gates,
                scratch_gates,
            } => {
                check("ws_gates", gates_len, ws_gates.len())?;
                check("scratch_gates", gates_len, scratch_gates.len())?;
            }
            GateBuffers::InPlace(gates) => check("gates", gates_len, gates.len())?,
        }
        check("diff_states_t_lp1", dhc, self.diff_states_t_lp1.len())?;
        if !conf.is_lstm_projection {
            check("diff_states_tp1_l", dhc, self.diff_states_tp1_l.len())?;
        }
        check("diff_c_states_t_l", dhc, self.diff_c_states_t_l.len())?;
        check("diff_c_states_tp1_l", dhc, self.diff_c_states_tp1_l.len())?;
        check("c_states_tm1_l", dhc, self.c_states_tm1_l.len())?;
        check("c_states_t_l", dhc, self.c_states_t_l.len())?;
        if conf.is_lstm_peephole {
            let got = self.weights_peephole.map_or(0, |w| w.len());
            check("weights_peephole", N_PEEPHOLE * dhc, got)?;
        }
        Ok(())
    }
}

fn check(buffer: &'static str, expected: usize, got: usize) -> Result<()> {
    if got < expected {
        return Err(KernelError::ShapeMismatch {
            buffer,
            expected,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_buffer_reported() {
        let conf = RnnConf::new(4).with_peephole(true);
        let ws = vec![0.0f32; 16];
        let mut scratch = vec![0.0f32; 16];
        let rows = vec![0.0f32; 4];
        let mut dc = vec![0.0f32; 3];
        let args = LstmBwdArgs {
            gates: GateBuffers::Separate {
                ws_gates: &ws,
                scratch_gates: &mut scratch,
            },
            diff_states_t_lp1: &rows,
            diff_states_tp1_l: &rows,
            diff_c_states_t_l: &mut dc,
            diff_c_states_tp1_l: &rows,
            c_states_tm1_l: &rows,
            c_states_t_l: &rows,
            weights_peephole: None,
        };
        match args.validate(&conf) {
            Err(KernelError::ShapeMismatch { buffer, expected, got }) => {
                assert_eq!((buffer, expected, got), ("diff_c_states_t_l", 4, 3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_projection_ignores_next_timestep_gradient() {
        let conf = RnnConf::new(2).with_projection(true);
        let mut gates = vec![0.0f32; 8];
        let rows = vec![0.0f32; 2];
        let mut dc = vec![0.0f32; 2];
        let args = LstmBwdArgs {
            gates: GateBuffers::InPlace(&mut gates),
            diff_states_t_lp1: &rows,
            diff_states_tp1_l: &[],
            diff_c_states_t_l: &mut dc,
            diff_c_states_tp1_l: &rows,
            c_states_tm1_l: &rows,
            c_states_t_l: &rows,
            weights_peephole: None,
        };
        assert!(args.validate(&conf).is_ok());
    }
}
