//! LSTM cell backward post-GEMM kernel generator.
//!
//! Emits, for one `RnnConf` and target, a kernel computing per element:
//!
//! ```text
//! tanhC   = tanh(c_t)
//! dH      = dH_above + (projection ? 0 : dH_next)
//! dC      = dC_next + dH * G_out * (1 - tanhC^2)      [+ dG_out * w_out]
//! dG_out  = G_out * (1 - G_out) * dH * tanhC
//! dG_in   = G_in * (1 - G_in) * dC * G_cand
//! dG_fgt  = G_fgt * (1 - G_fgt) * dC * c_{t-1}
//! dG_cand = (1 - G_cand^2) * G_in * dC
//! dC_t    = dC * G_fgt                                [+ dG_in * w_in + dG_fgt * w_fgt]
//! ```
//!
//! A vector loop covers whole vectors; a scalar loop finishes the tail.
//! Both loops come from the same body generator, so they evaluate the same
//! instruction sequence on different lane counts.
//!
//! Register map: dG0..dG3 = 1..4, tanhC = 5, dH = 6, dC = 7, G0 = 8, G1 = 9,
//! one = 10, temporaries from 11 up to the emulation block (if any).

use iced_x86::code_asm::*;

use crate::compiler::codegen::math_approx::TanhInjector;
use crate::compiler::codegen::reg_pool::{TmpPool, VReg};
use crate::compiler::codegen::target_desc::IsaTraits;
use crate::compiler::codegen::x86_64::{disassemble, Address, BinOp, FmaOp, Lanes, Shift, X86Emitter};
use crate::compiler::codegen::{CodegenOutput, KernelCodegen};
use crate::compiler::executable::JitKernel;
use crate::compiler::{dump_code, dump_dir};
use crate::dispatch::{ensure_host_supports, host_isa_level, IsaLevel};
use crate::traits::StorageElement;
use crate::types::{DType, KernelError, Result};

use super::args::{GateBuffers, LstmBwdArgs};
use super::config::{PrimitiveDesc, RnnConf};
use super::Gate;

// ── Register and argument map ───────────────────────────────────────────────

const D_G0: VReg = VReg(1);
const D_G1: VReg = VReg(2);
const D_G2: VReg = VReg(3);
const D_G3: VReg = VReg(4);
const TANH_CT: VReg = VReg(5);
const D_HT: VReg = VReg(6);
const D_CT: VReg = VReg(7);
const G0: VReg = VReg(8);
const G1: VReg = VReg(9);
const ONE: VReg = VReg(10);
const FIRST_TMP: usize = 11;
const MIN_TMPS: usize = 4;

const WS_GATES: AsmRegister64 = rdi;
const SCRATCH_GATES: AsmRegister64 = rsi;
const DIFF_STATES_T_LP1: AsmRegister64 = rdx;
const DIFF_STATES_TP1_L: AsmRegister64 = rcx;
const DIFF_C_STATES_T_L: AsmRegister64 = r8;
const DIFF_C_STATES_TP1_L: AsmRegister64 = r9;
const C_STATES_TM1_L: AsmRegister64 = r10;
const C_STATES_T_L: AsmRegister64 = r11;
const WEIGHTS_PEEPHOLE: AsmRegister64 = r12;
const LOOP_CNT: AsmRegister64 = rbx;
const TABLE: AsmRegister64 = rax;

// Kernel table slots (one vector each).
const TABLE_ONE: usize = 0;
const TABLE_BF16_BIAS: usize = 1;
const TABLE_BF16_LSB: usize = 2;

/// Code generator for one configuration and target.
pub struct LstmBwdCodegen {
    conf: RnnConf,
    traits: IsaTraits,
}

impl LstmBwdCodegen {
    pub fn new(conf: RnnConf, isa: IsaLevel, dtype: DType) -> Result<Self> {
        conf.validate(dtype)?;
        let traits = IsaTraits::resolve(isa, dtype)?;
        Ok(LstmBwdCodegen { conf, traits })
    }

    fn bf16_regs(&self) -> Option<(VReg, VReg, VReg)> {
        self.traits.emu_vreg_base().map(|base| {
            let base = base as u8;
            (VReg(base), VReg(base + 1), VReg(base + 2))
        })
    }

    fn gate_addr(&self, base: AsmRegister64, gate: Gate) -> Address {
        let row = gate.slot() * self.conf.dhc * self.traits.storage_size();
        Address::new(base, row as i32)
    }

    fn peephole_addr(&self, gate: Gate) -> Result<Address> {
        let slot = gate
            .peephole_slot()
            .ok_or_else(|| KernelError::CompileError(format!("{gate:?} gate has no peephole")))?;
        let row = slot * self.conf.dhc * std::mem::size_of::<f32>();
        Ok(Address::new(WEIGHTS_PEEPHOLE, row as i32))
    }

    fn load_gate(&self, e: &mut X86Emitter, lanes: Lanes, dst: VReg, gate: Gate) -> Result<()> {
        let addr = self.gate_addr(WS_GATES, gate);
        match self.traits.dtype {
            DType::F32 => e.load_f32(lanes, dst, addr),
            DType::BF16 => e.load_bf16(lanes, dst, addr),
        }
    }

    fn store_gate(&self, e: &mut X86Emitter, lanes: Lanes, gate: Gate, src: VReg) -> Result<()> {
        let addr = self.gate_addr(SCRATCH_GATES, gate);
        if self.traits.dtype == DType::F32 {
            return e.store_f32(lanes, addr, src);
        }
        if self.traits.native_bf16 {
            let tmp = e.next_tmp();
            return e.store_bf16_native(lanes, addr, src, tmp);
        }
        // round to nearest even: (x + 0x7fff + ((x >> 16) & 1)) >> 16
        let (bias, lsb, t) = self
            .bf16_regs()
            .ok_or_else(|| KernelError::CompileError("bf16 emulation registers missing".into()))?;
        let len = lanes.reg_len();
        e.vshift(Shift::RightI32, len, t, src, 16)?;
        e.vbinop(BinOp::AndI32, len, t, t, lsb)?;
        e.vbinop(BinOp::AddI32, len, t, t, bias)?;
        e.vbinop(BinOp::AddI32, len, t, t, src)?;
        e.vshift(Shift::RightI32, len, t, t, 16)?;
        // the rounding add can carry a NaN into the sign bit; NaN lanes
        // take (x >> 16) | 0x40 instead
        let quiet = e.next_tmp();
        e.vshift(Shift::LeftI32, len, quiet, lsb, 6)?;
        e.bf16_quiet_nans(lanes, t, src, quiet)?;
        e.store_low_words(lanes, addr, t)
    }

    /// One step over `lanes` elements, then the pointer bumps.
    fn emit_body(&self, e: &mut X86Emitter, tanh: &TanhInjector, lanes: Lanes) -> Result<()> {
        let conf = &self.conf;

        e.load_f32(lanes, TANH_CT, Address::new(C_STATES_T_L, 0))?;
        tanh.compute_vector(e, lanes, TANH_CT)?;

        e.load_f32(lanes, D_HT, Address::new(DIFF_STATES_T_LP1, 0))?;
        if !conf.is_lstm_projection {
            e.binop_mem(lanes, BinOp::Add, D_HT, D_HT, Address::new(DIFF_STATES_TP1_L, 0))?;
        }

        // dC = dC_next + (1 - tanhC^2) * dH * G3
        let t1 = e.next_tmp();
        e.mov(lanes, t1, ONE)?;
        e.fma(lanes, FmaOp::Fnmadd231, t1, TANH_CT, TANH_CT)?;
        e.binop(lanes, BinOp::Mul, t1, t1, D_HT)?;
        self.load_gate(e, lanes, D_G3, Gate::Output)?;
        e.binop(lanes, BinOp::Mul, t1, t1, D_G3)?;
        e.load_f32(lanes, D_CT, Address::new(DIFF_C_STATES_TP1_L, 0))?;
        e.binop(lanes, BinOp::Add, D_CT, D_CT, t1)?;

        // dG3 = G3 * (1 - G3) * dH * tanhC
        e.fma(lanes, FmaOp::Fnmadd231, D_G3, D_G3, D_G3)?;
        e.binop(lanes, BinOp::Mul, D_G3, D_G3, D_HT)?;
        e.binop(lanes, BinOp::Mul, D_G3, D_G3, TANH_CT)?;

        if conf.is_lstm_peephole {
            let w_out = self.peephole_addr(Gate::Output)?;
            e.fma_mem(lanes, FmaOp::Fmadd231, D_CT, D_G3, w_out)?;
        }

        // dG0 = G0 * (1 - G0) * dC * G2
        self.load_gate(e, lanes, G0, Gate::Input)?;
        self.load_gate(e, lanes, D_G2, Gate::Candidate)?;
        e.mov(lanes, D_G0, G0)?;
        e.fma(lanes, FmaOp::Fnmadd231, D_G0, G0, G0)?;
        e.binop(lanes, BinOp::Mul, D_G0, D_G0, D_CT)?;
        e.binop(lanes, BinOp::Mul, D_G0, D_G0, D_G2)?;

        // dG1 = G1 * (1 - G1) * dC * c_{t-1}
        self.load_gate(e, lanes, G1, Gate::Forget)?;
        e.mov(lanes, D_G1, G1)?;
        e.fma(lanes, FmaOp::Fnmadd231, D_G1, G1, G1)?;
        e.binop(lanes, BinOp::Mul, D_G1, D_G1, D_CT)?;
        e.binop_mem(lanes, BinOp::Mul, D_G1, D_G1, Address::new(C_STATES_TM1_L, 0))?;

        // dG2 = (1 - G2^2) * G0 * dC
        let t4 = e.next_tmp();
        e.mov(lanes, t4, ONE)?;
        e.fma(lanes, FmaOp::Fnmadd231, t4, D_G2, D_G2)?;
        e.binop(lanes, BinOp::Mul, G0, G0, D_CT)?;
        e.binop(lanes, BinOp::Mul, t4, t4, G0)?;
        e.mov(lanes, D_G2, t4)?;

        // dC_t = dC * G1 [+ dG0 * w_in + dG1 * w_fgt]
        e.binop(lanes, BinOp::Mul, D_CT, D_CT, G1)?;
        if conf.is_lstm_peephole {
            let w_in = self.peephole_addr(Gate::Input)?;
            let w_fgt = self.peephole_addr(Gate::Forget)?;
            e.fma_mem(lanes, FmaOp::Fmadd231, D_CT, D_G0, w_in)?;
            e.fma_mem(lanes, FmaOp::Fmadd231, D_CT, D_G1, w_fgt)?;
        }

        e.store_f32(lanes, Address::new(DIFF_C_STATES_T_L, 0), D_CT)?;
        self.store_gate(e, lanes, Gate::Input, D_G0)?;
        self.store_gate(e, lanes, Gate::Forget, D_G1)?;
        self.store_gate(e, lanes, Gate::Candidate, D_G2)?;
        self.store_gate(e, lanes, Gate::Output, D_G3)?;

        let elems = match lanes {
            Lanes::Vector(_) => self.traits.simd_w,
            Lanes::Scalar => 1,
        };
        let gate_step = (elems * self.traits.storage_size()) as i32;
        let f32_step = (elems * std::mem::size_of::<f32>()) as i32;
        let asm = e.asm();
        asm.add(WS_GATES, gate_step)?;
        asm.add(SCRATCH_GATES, gate_step)?;
        asm.add(DIFF_STATES_T_LP1, f32_step)?;
        if !conf.is_lstm_projection {
            asm.add(DIFF_STATES_TP1_L, f32_step)?;
        }
        asm.add(DIFF_C_STATES_T_L, f32_step)?;
        asm.add(DIFF_C_STATES_TP1_L, f32_step)?;
        asm.add(C_STATES_TM1_L, f32_step)?;
        asm.add(C_STATES_T_L, f32_step)?;
        if conf.is_lstm_peephole {
            asm.add(WEIGHTS_PEEPHOLE, f32_step)?;
        }
        Ok(())
    }

    fn table_words(&self) -> Vec<u32> {
        let lanes = self.traits.simd_w;
        let mut words = vec![1.0f32.to_bits(); lanes];
        if self.bf16_regs().is_some() {
            words.extend(std::iter::repeat(0x7FFF).take(lanes));
            words.extend(std::iter::repeat(1).take(lanes));
        }
        words
    }
}

impl KernelCodegen for LstmBwdCodegen {
    fn generate(&self) -> Result<CodegenOutput> {
        let t = self.traits;
        let pool = TmpPool::new(FIRST_TMP, t.usable_vregs(), MIN_TMPS)?;
        let mut e = X86Emitter::new(t, pool)?;
        let mut tanh = TanhInjector::new(&mut e, TABLE);
        let mut table = e.create_label();

        let mut saved = vec![LOOP_CNT];
        if self.conf.is_lstm_peephole {
            saved.push(WEIGHTS_PEEPHOLE);
        }
        e.preamble(&saved)?;
        let (p0, p1, p2) = (e.stack_param(0), e.stack_param(1), e.stack_param(2));
        e.asm().mov(C_STATES_TM1_L, p0)?;
        e.asm().mov(C_STATES_T_L, p1)?;
        if self.conf.is_lstm_peephole {
            e.asm().mov(WEIGHTS_PEEPHOLE, p2)?;
        }

        // kernel constants first; the injector then takes over the base register
        let vlen = t.vlen as i32;
        e.load_label_addr(TABLE, table)?;
        e.vload(t.vec_len, ONE, Address::new(TABLE, TABLE_ONE as i32 * vlen))?;
        if let Some((bias, lsb, _)) = self.bf16_regs() {
            e.vload(t.vec_len, bias, Address::new(TABLE, TABLE_BF16_BIAS as i32 * vlen))?;
            e.vload(t.vec_len, lsb, Address::new(TABLE, TABLE_BF16_LSB as i32 * vlen))?;
        }
        tanh.load_table_addr(&mut e)?;

        let simd_w = t.simd_w as i32;
        e.asm().mov(LOOP_CNT, self.conf.dhc as i64)?;

        let mut vec_loop = e.create_label();
        let mut vec_end = e.create_label();
        e.asm().cmp(LOOP_CNT, simd_w)?;
        e.asm().jl(vec_end)?;
        e.bind(&mut vec_loop)?;
        self.emit_body(&mut e, &tanh, Lanes::Vector(t.vec_len))?;
        e.asm().sub(LOOP_CNT, simd_w)?;
        e.asm().cmp(LOOP_CNT, simd_w)?;
        e.asm().jge(vec_loop)?;
        e.bind(&mut vec_end)?;

        let mut rem_loop = e.create_label();
        let mut rem_end = e.create_label();
        e.asm().cmp(LOOP_CNT, 0)?;
        e.asm().je(rem_end)?;
        e.bind(&mut rem_loop)?;
        self.emit_body(&mut e, &tanh, Lanes::Scalar)?;
        e.asm().sub(LOOP_CNT, 1)?;
        e.asm().cmp(LOOP_CNT, 0)?;
        e.asm().jg(rem_loop)?;
        e.bind(&mut rem_end)?;

        e.postamble()?;
        e.emit_table(&mut table, &self.table_words())?;
        tanh.prepare_table(&mut e)?;
        e.finalize(table)
    }
}

// ── Public generator ────────────────────────────────────────────────────────

/// LSTM backward post-GEMM stage: generates its kernel once and runs it.
pub struct LstmCellPostgemmBwd {
    conf: RnnConf,
    isa: IsaLevel,
    dtype: Option<DType>,
    kernel: Option<JitKernel>,
}

impl LstmCellPostgemmBwd {
    pub fn new(conf: &RnnConf, pd: &PrimitiveDesc) -> Self {
        LstmCellPostgemmBwd {
            conf: *conf,
            isa: pd.isa,
            dtype: None,
            kernel: None,
        }
    }

    /// Generate the kernel for gate storage in `dtype`. May be called once;
    /// on failure no kernel is kept. An ISA the host cannot execute is
    /// `Unsupported`.
    pub fn init(&mut self, dtype: DType) -> Result<()> {
        if self.kernel.is_some() {
            return Err(KernelError::AlreadyInitialized);
        }
        let kernel = self.build(dtype).inspect_err(|err| {
            log::warn!(
                "lstm bwd postgemm: no kernel for {} {} dhc={}: {err}",
                self.isa,
                dtype,
                self.conf.dhc
            );
        })?;
        self.dtype = Some(dtype);
        self.kernel = Some(kernel);
        Ok(())
    }

    fn build(&self, dtype: DType) -> Result<JitKernel> {
        let codegen = LstmBwdCodegen::new(self.conf, self.isa, dtype)?;
        ensure_host_supports(self.isa, host_isa_level())?;
        let out = codegen.generate()?;

        if log::log_enabled!(log::Level::Trace) {
            for line in disassemble(out.text()) {
                log::trace!("{line}");
            }
        }
        if let Some(dir) = dump_dir() {
            let path = dump_code(&dir, &self.dump_file_name(dtype), &out.code)?;
            log::debug!("lstm bwd postgemm: dumped to {}", path.display());
        }

        let kernel = JitKernel::from_code(&out.code)?;
        log::debug!(
            "lstm bwd postgemm: {} {} dhc={} peephole={} projection={}: {} bytes ({} code)",
            self.isa,
            dtype,
            self.conf.dhc,
            self.conf.is_lstm_peephole,
            self.conf.is_lstm_projection,
            out.code.len(),
            out.text_len
        );
        Ok(kernel)
    }

    /// `rnn_lstm_postgemm_bwd.<isa>.<dtype>.dhc<dhc>.bin`
    pub fn dump_file_name(&self, dtype: DType) -> String {
        format!(
            "rnn_lstm_postgemm_bwd.{}.{}.dhc{}.bin",
            self.isa, dtype, self.conf.dhc
        )
    }

    pub fn conf(&self) -> &RnnConf {
        &self.conf
    }

    pub fn isa(&self) -> IsaLevel {
        self.isa
    }

    /// Storage precision the kernel was built for.
    pub fn dtype(&self) -> Option<DType> {
        self.dtype
    }

    /// The generated kernel, for callers driving it through raw pointers.
    pub fn kernel(&self) -> Option<&JitKernel> {
        self.kernel.as_ref()
    }

    /// Run the kernel over one step after checking buffer lengths and
    /// storage type.
    pub fn execute<T: StorageElement>(&self, args: LstmBwdArgs<'_, T>) -> Result<()> {
        let (kernel, dtype) = match (&self.kernel, self.dtype) {
            (Some(kernel), Some(dtype)) => (kernel, dtype),
            _ => return Err(KernelError::NotInitialized),
        };
        if T::DTYPE != dtype {
            return Err(KernelError::DTypeMismatch {
                expected: dtype,
                got: T::DTYPE,
            });
        }
        args.validate(&self.conf)?;

        let (ws, scratch) = match args.gates {
            GateBuffers::Separate {
                ws_gates,
                scratch_gates,
            } => (ws_gates.as_ptr() as *const u8, scratch_gates.as_mut_ptr() as *mut u8),
            GateBuffers::InPlace(gates) => {
                let p = gates.as_mut_ptr() as *mut u8;
                (p as *const u8, p)
            }
        };
        let peephole = match args.weights_peephole {
            Some(w) if self.conf.is_lstm_peephole => w.as_ptr(),
            _ => std::ptr::null(),
        };

        // SAFETY: lengths were validated against `conf.dhc` above; the kernel
        // reads and writes exactly that many elements per buffer.
        unsafe {
            let f = kernel.as_fn();
            f(
                ws,
                scratch,
                args.diff_states_t_lp1.as_ptr(),
                args.diff_states_tp1_l.as_ptr(),
                args.diff_c_states_t_l.as_mut_ptr(),
                args.diff_c_states_tp1_l.as_ptr(),
                args.c_states_tm1_l.as_ptr(),
                args.c_states_t_l.as_ptr(),
                peephole,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(conf: RnnConf, isa: IsaLevel, dtype: DType) -> String {
        let out = LstmBwdCodegen::new(conf, isa, dtype).unwrap().generate().unwrap();
        disassemble(out.text()).join("\n")
    }

    #[test]
    fn test_generation_is_deterministic() {
        let conf = RnnConf::new(37).with_peephole(true);
        for isa in IsaLevel::ALL {
            let a = LstmBwdCodegen::new(conf, isa, DType::F32).unwrap().generate().unwrap();
            let b = LstmBwdCodegen::new(conf, isa, DType::F32).unwrap().generate().unwrap();
            assert_eq!(a.code, b.code, "{isa}");
        }
    }

    #[test]
    fn test_table_starts_with_ones() {
        let gen = LstmBwdCodegen::new(RnnConf::new(8), IsaLevel::Avx2, DType::F32).unwrap();
        let out = gen.generate().unwrap();
        let one = 1.0f32.to_le_bytes();
        for lane in 0..8 {
            let at = out.text_len + lane * 4;
            assert_eq!(&out.code[at..at + 4], &one);
        }
    }

    #[test]
    fn test_peephole_off_never_touches_weights() {
        let text = listing(RnnConf::new(16), IsaLevel::Avx2, DType::F32);
        assert!(!text.contains("r12"), "{text}");
        let text = listing(RnnConf::new(16).with_peephole(true), IsaLevel::Avx2, DType::F32);
        assert!(text.contains("push r12"), "{text}");
        assert!(text.contains("[r12"), "{text}");
    }

    #[test]
    fn test_projection_never_reads_next_timestep_gradient() {
        let text = listing(RnnConf::new(16).with_projection(true), IsaLevel::Avx2, DType::F32);
        assert!(!text.contains("rcx"), "{text}");
        let text = listing(RnnConf::new(16), IsaLevel::Avx2, DType::F32);
        assert!(text.contains("[rcx]"), "{text}");
    }

    #[test]
    fn test_sse_has_no_fused_memory_arithmetic() {
        let text = listing(RnnConf::new(10).with_peephole(true), IsaLevel::Sse41, DType::F32);
        for line in text.lines() {
            let arith = ["addps", "subps", "mulps", "divps", "minps", "andps", "orps", "paddd"]
                .iter()
                .any(|op| line.contains(op));
            assert!(!(arith && line.contains('[')), "fused memory operand: {line}");
        }
        assert!(!text.contains("vfmadd"), "{text}");
        assert!(!text.contains("vzeroupper"), "{text}");
    }

    #[test]
    fn test_bf16_emulated_store_uses_reserved_registers() {
        let text = listing(RnnConf::new(20), IsaLevel::Avx512Core, DType::BF16);
        assert!(text.contains("vpmovdw"), "{text}");
        assert!(text.contains("vcmpunordps k1"), "{text}");
        assert!(text.contains("zmm31"), "{text}");
        assert!(!text.contains("vcvtneps2bf16"), "{text}");
        let text = listing(RnnConf::new(20), IsaLevel::Avx512CoreBf16, DType::BF16);
        assert!(text.contains("vcvtneps2bf16"), "{text}");
        assert!(!text.contains("zmm31"), "{text}");
    }

    #[test]
    fn test_bf16_below_avx512_unsupported() {
        for isa in [IsaLevel::Sse41, IsaLevel::Avx2] {
            let mut g = LstmCellPostgemmBwd::new(&RnnConf::new(8), &PrimitiveDesc::new(isa));
            assert!(matches!(g.init(DType::BF16), Err(KernelError::Unsupported(_))));
            assert!(g.kernel().is_none());
            assert!(g.dtype().is_none());
        }
    }

    #[test]
    fn test_isa_above_host_rejected() {
        let host = host_isa_level();
        let Some(isa) = IsaLevel::ALL
            .into_iter()
            .find(|&isa| host.map_or(true, |host| isa > host))
        else {
            return;
        };
        let mut g = LstmCellPostgemmBwd::new(&RnnConf::new(8), &PrimitiveDesc::new(isa));
        assert!(matches!(g.init(DType::F32), Err(KernelError::Unsupported(_))));
        assert!(g.kernel().is_none());
        assert!(g.dtype().is_none());
    }

    #[test]
    fn test_dump_file_name() {
        let g = LstmCellPostgemmBwd::new(&RnnConf::new(33), &PrimitiveDesc::new(IsaLevel::Avx2));
        assert_eq!(g.dump_file_name(DType::F32), "rnn_lstm_postgemm_bwd.avx2.f32.dhc33.bin");
    }

    #[test]
    fn test_execute_before_init() {
        let g = LstmCellPostgemmBwd::new(&RnnConf::new(1), &PrimitiveDesc::new(IsaLevel::Sse41));
        let mut gates = [0.5f32; 4];
        let mut dc = [0.0f32];
        let err = g
            .execute(LstmBwdArgs {
                gates: GateBuffers::InPlace(&mut gates),
                diff_states_t_lp1: &[0.0],
                diff_states_tp1_l: &[0.0],
                diff_c_states_t_l: &mut dc,
                diff_c_states_tp1_l: &[0.0],
                c_states_tm1_l: &[0.0],
                c_states_t_l: &[0.0],
                weights_peephole: None,
            })
            .unwrap_err();
        assert!(matches!(err, KernelError::NotInitialized));
    }
}
