//! Property-based tests for the LSTM backward post-GEMM generator.
//!
//! - Generated kernel matches the reference for any width and variant
//! - Code generation is deterministic
//! - Generated code reads no peephole row when peephole is off

#![cfg(target_arch = "x86_64")]

mod common;

use proptest::prelude::*;

use common::*;
use rnn_postgemm_jit::compiler::codegen::x86_64::disassemble;
use rnn_postgemm_jit::compiler::codegen::KernelCodegen;
use rnn_postgemm_jit::rnn::postgemm_bwd::LstmBwdCodegen;
use rnn_postgemm_jit::{DType, IsaLevel, RnnConf};

fn arb_isa() -> impl Strategy<Value = IsaLevel> {
    prop::sample::select(IsaLevel::ALL.to_vec())
}

fn arb_conf() -> impl Strategy<Value = RnnConf> {
    (1usize..80, any::<bool>(), any::<bool>()).prop_map(|(dhc, peephole, projection)| {
        RnnConf::new(dhc)
            .with_peephole(peephole)
            .with_projection(projection)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// JIT output equals the reference within f32 rounding noise.
    #[test]
    fn prop_matches_reference(conf in arb_conf(), pick in any::<prop::sample::Index>(), seed in any::<u64>()) {
        let isas = host_isas();
        prop_assume!(!isas.is_empty());
        let isa = *pick.get(&isas);
        let case = Case::random(conf, seed);
        let stage = build_stage::<f32>(conf, isa);
        let got = case.run_jit::<f32>(&stage, false);
        let want = case.run_reference::<f32>(false);
        assert_close(&got.scratch_gates, &want.scratch_gates, 2e-5, "gates");
        assert_close(&got.diff_c_states_t_l, &want.diff_c_states_t_l, 2e-5, "dC");
    }

    /// In-place and separate buffers give bit-identical results.
    #[test]
    fn prop_in_place_is_transparent(conf in arb_conf(), seed in any::<u64>()) {
        let isas = host_isas();
        prop_assume!(!isas.is_empty());
        let case = Case::random(conf, seed);
        let stage = build_stage::<f32>(conf, *isas.last().unwrap());
        prop_assert_eq!(case.run_jit::<f32>(&stage, true), case.run_jit::<f32>(&stage, false));
    }

    /// Same configuration, same bytes; runs on any host.
    #[test]
    fn prop_codegen_deterministic(conf in arb_conf(), isa in arb_isa()) {
        let a = LstmBwdCodegen::new(conf, isa, DType::F32).unwrap().generate().unwrap();
        let b = LstmBwdCodegen::new(conf, isa, DType::F32).unwrap().generate().unwrap();
        prop_assert!(a.text_len < b.code.len());
        prop_assert_eq!(a.text_len, b.text_len);
        prop_assert_eq!(&a.code, &b.code);
    }

    #[test]
    fn prop_weights_register_only_with_peephole(conf in arb_conf(), isa in arb_isa()) {
        let out = LstmBwdCodegen::new(conf, isa, DType::F32).unwrap().generate().unwrap();
        let text = disassemble(out.text()).join("\n");
        prop_assert_eq!(text.contains("r12"), conf.is_lstm_peephole);
    }
}
