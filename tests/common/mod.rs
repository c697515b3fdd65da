//! Shared fixtures: random cell inputs, JIT and reference runners.

#![allow(dead_code, unused_macros)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rnn_postgemm_jit::dispatch::host_isa_level;
use rnn_postgemm_jit::rnn::reference::lstm_postgemm_bwd;
use rnn_postgemm_jit::{
    Gate, GateBuffers, IsaLevel, LstmBwdArgs, LstmCellPostgemmBwd, PrimitiveDesc, RnnConf,
    StorageElement,
};

/// Every ISA level the host can execute.
pub fn host_isas() -> Vec<IsaLevel> {
    match host_isa_level() {
        Some(host) => IsaLevel::ALL.into_iter().filter(|&isa| isa <= host).collect(),
        None => Vec::new(),
    }
}

macro_rules! skip_without_isa {
    ($isas:expr) => {
        if $isas.is_empty() {
            eprintln!("no supported x86-64 vector ISA on this host, skipping");
            return;
        }
    };
}

/// Lanes per vector at `isa`.
pub fn simd_w(isa: IsaLevel) -> usize {
    match isa {
        IsaLevel::Sse41 => 4,
        IsaLevel::Avx2 => 8,
        IsaLevel::Avx512Core | IsaLevel::Avx512CoreBf16 => 16,
    }
}

/// Inputs of one step, f32 master copy.
#[derive(Debug, Clone)]
pub struct Case {
    pub conf: RnnConf,
    pub ws_gates: Vec<f32>,
    pub diff_states_t_lp1: Vec<f32>,
    pub diff_states_tp1_l: Vec<f32>,
    pub diff_c_states_tp1_l: Vec<f32>,
    pub c_states_tm1_l: Vec<f32>,
    pub c_states_t_l: Vec<f32>,
    pub weights_peephole: Vec<f32>,
}

/// Outputs of one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Outputs<T> {
    pub scratch_gates: Vec<T>,
    pub diff_c_states_t_l: Vec<f32>,
}

impl Case {
    /// Sigmoid-range gates, tanh-range candidate, moderate states and
    /// gradients.
    pub fn random(conf: RnnConf, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let dhc = conf.dhc;
        let mut ws_gates = vec![0.0f32; 4 * dhc];
        for gate in Gate::ALL {
            for i in 0..dhc {
                ws_gates[gate.slot() * dhc + i] = match gate {
                    Gate::Candidate => rng.gen_range(-0.99..0.99),
                    _ => rng.gen_range(0.01..0.99),
                };
            }
        }
        let mut row = |lo: f32, hi: f32| -> Vec<f32> { (0..dhc).map(|_| rng.gen_range(lo..hi)).collect() };
        let diff_states_t_lp1 = row(-1.0, 1.0);
        let diff_states_tp1_l = row(-1.0, 1.0);
        let diff_c_states_tp1_l = row(-1.0, 1.0);
        let c_states_tm1_l = row(-3.0, 3.0);
        let c_states_t_l = row(-3.0, 3.0);
        let weights_peephole = (0..3 * dhc).map(|_| rng.gen_range(-0.5..0.5)).collect();
        Case {
            conf,
            ws_gates,
            diff_states_t_lp1,
            diff_states_tp1_l,
            diff_c_states_tp1_l,
            c_states_tm1_l,
            c_states_t_l,
            weights_peephole,
        }
    }

    /// All gates `g` except the candidate (`g_cand`); every other input zero.
    pub fn uniform(conf: RnnConf, g: f32, g_cand: f32) -> Self {
        let dhc = conf.dhc;
        let mut ws_gates = vec![g; 4 * dhc];
        ws_gates[Gate::Candidate.slot() * dhc..(Gate::Candidate.slot() + 1) * dhc].fill(g_cand);
        Case {
            conf,
            ws_gates,
            diff_states_t_lp1: vec![0.0; dhc],
            diff_states_tp1_l: vec![0.0; dhc],
            diff_c_states_tp1_l: vec![0.0; dhc],
            c_states_tm1_l: vec![0.0; dhc],
            c_states_t_l: vec![0.0; dhc],
            weights_peephole: vec![0.0; 3 * dhc],
        }
    }

    /// Copy every per-element input of element `from` to element `to`.
    pub fn duplicate_element(&mut self, from: usize, to: usize) {
        let dhc = self.conf.dhc;
        for gate in Gate::ALL {
            let base = gate.slot() * dhc;
            self.ws_gates[base + to] = self.ws_gates[base + from];
        }
        for row in [
            &mut self.diff_states_t_lp1,
            &mut self.diff_states_tp1_l,
            &mut self.diff_c_states_tp1_l,
            &mut self.c_states_tm1_l,
            &mut self.c_states_t_l,
        ] {
            row[to] = row[from];
        }
        for k in 0..3 {
            self.weights_peephole[k * dhc + to] = self.weights_peephole[k * dhc + from];
        }
    }

    fn gates_as<T: StorageElement>(&self) -> Vec<T> {
        self.ws_gates.iter().map(|&v| T::from_f32(v)).collect()
    }

    fn run_with<T: StorageElement>(
        &self,
        in_place: bool,
        step: impl FnOnce(LstmBwdArgs<'_, T>),
    ) -> Outputs<T> {
        let ws: Vec<T> = self.gates_as();
        let mut scratch: Vec<T> = if in_place {
            ws.clone()
        } else {
            vec![T::default(); ws.len()]
        };
        let mut dc = vec![f32::NAN; self.conf.dhc];
        let gates = if in_place {
            GateBuffers::InPlace(&mut scratch)
        } else {
            GateBuffers::Separate {
                ws_gates: &ws,
                scratch_gates: &mut scratch,
            }
        };
        step(LstmBwdArgs {
            gates,
            diff_states_t_lp1: &self.diff_states_t_lp1,
            diff_states_tp1_l: &self.diff_states_tp1_l,
            diff_c_states_t_l: &mut dc,
            diff_c_states_tp1_l: &self.diff_c_states_tp1_l,
            c_states_tm1_l: &self.c_states_tm1_l,
            c_states_t_l: &self.c_states_t_l,
            weights_peephole: self.conf.is_lstm_peephole.then_some(&self.weights_peephole[..]),
        });
        Outputs {
            scratch_gates: scratch,
            diff_c_states_t_l: dc,
        }
    }

    pub fn run_jit<T: StorageElement>(&self, stage: &LstmCellPostgemmBwd, in_place: bool) -> Outputs<T> {
        self.run_with(in_place, |args| stage.execute(args).unwrap())
    }

    pub fn run_reference<T: StorageElement>(&self, in_place: bool) -> Outputs<T> {
        self.run_with(in_place, |args| lstm_postgemm_bwd(&self.conf, args).unwrap())
    }
}

/// Generate a stage for `conf` at `isa` storing gates as `T`.
pub fn build_stage<T: StorageElement>(conf: RnnConf, isa: IsaLevel) -> LstmCellPostgemmBwd {
    let mut stage = LstmCellPostgemmBwd::new(&conf, &PrimitiveDesc::new(isa));
    stage.init(T::DTYPE).unwrap();
    stage
}

/// `|got - want| <= tol * max(1, |want|)` elementwise.
pub fn assert_close(got: &[f32], want: &[f32], tol: f32, what: &str) {
    assert_eq!(got.len(), want.len(), "{what}: length");
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        let bound = tol * w.abs().max(1.0);
        assert!(
            (g - w).abs() <= bound,
            "{what}[{i}]: got {g}, want {w} (tol {bound})"
        );
    }
}

pub fn to_f32<T: StorageElement>(v: &[T]) -> Vec<f32> {
    v.iter().map(|x| x.to_f32()).collect()
}
