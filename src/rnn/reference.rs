//! Portable LSTM backward post-GEMM step.
//!
//! Same formulas and accumulation order as the generated kernel, with tanh
//! from the injector's scalar mirror. Used to check generated code and as
//! the fallback when no kernel can be generated for the host.

use crate::compiler::codegen::math_approx::tanh_approx;
use crate::traits::StorageElement;
use crate::types::Result;

use super::args::{GateBuffers, LstmBwdArgs};
use super::config::RnnConf;
use super::{Gate, N_GATES};

/// Run one step over all `dhc` elements.
pub fn lstm_postgemm_bwd<T: StorageElement>(conf: &RnnConf, args: LstmBwdArgs<'_, T>) -> Result<()> {
    args.validate(conf)?;
    let dhc = conf.dhc;
    let (ws, scratch): (Option<&[T]>, &mut [T]) = match args.gates {
        GateBuffers::Separate {
            ws_gates,
            scratch_gates,
        } => (Some(ws_gates), scratch_gates),
        GateBuffers::InPlace(gates) => (None, gates),
    };
    let peephole = if conf.is_lstm_peephole {
        args.weights_peephole
    } else {
        None
    };
    let weight = |gate: Gate, i: usize| -> f32 {
        match (peephole, gate.peephole_slot()) {
            (Some(w), Some(slot)) => w[slot * dhc + i],
            _ => 0.0,
        }
    };

    for i in 0..dhc {
        let mut g = [0.0f32; N_GATES];
        for gate in Gate::ALL {
            let idx = gate.slot() * dhc + i;
            g[gate.slot()] = ws.map_or(scratch[idx], |w| w[idx]).to_f32();
        }
        let [g_in, g_forget, g_cand, g_out] = g;

        let tanh_c = tanh_approx(args.c_states_t_l[i]);
        let mut dh = args.diff_states_t_lp1[i];
        if !conf.is_lstm_projection {
            dh += args.diff_states_tp1_l[i];
        }

        let mut dc = args.diff_c_states_tp1_l[i] + (1.0 - tanh_c * tanh_c) * dh * g_out;
        let d_out = g_out * (1.0 - g_out) * dh * tanh_c;
        if peephole.is_some() {
            dc += d_out * weight(Gate::Output, i);
        }
        let d_in = g_in * (1.0 - g_in) * dc * g_cand;
        let d_forget = g_forget * (1.0 - g_forget) * dc * args.c_states_tm1_l[i];
        let d_cand = (1.0 - g_cand * g_cand) * (g_in * dc);

        let mut dc_this = dc * g_forget;
        if peephole.is_some() {
            dc_this += d_in * weight(Gate::Input, i);
            dc_this += d_forget * weight(Gate::Forget, i);
        }

        args.diff_c_states_t_l[i] = dc_this;
        scratch[Gate::Input.slot() * dhc + i] = T::from_f32(d_in);
        scratch[Gate::Forget.slot() * dhc + i] = T::from_f32(d_forget);
        scratch[Gate::Candidate.slot() * dhc + i] = T::from_f32(d_cand);
        scratch[Gate::Output.slot() * dhc + i] = T::from_f32(d_out);
    }
    Ok(())
}
