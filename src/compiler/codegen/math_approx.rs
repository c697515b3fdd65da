//! tanh injector: emits an in-place `tanh(x)` on a vector register.
//!
//! Algorithm (every lane):
//! 1. Split the sign off: `s = x & 0x8000_0000`, `a = |x|`
//! 2. Clamp `a` to 9.0 (tanh(9) rounds to 1.0f32); NaN passes through
//! 3. `z = 2a`, `k = round(z * log2(e))`
//! 4. Cody-Waite reduction: `r = z - k*ln2_hi - k*ln2_lo`, |r| <= ln2/2
//! 5. `e^r` by degree-6 Taylor polynomial (Horner)
//! 6. `t = e^r * 2^k`, with `2^k` built as `(k + 127) << 23`
//! 7. `tanh = s | (t - 1) / (t + 1)`
//!
//! Absolute error stays below 1e-6 over the whole f32 range.
//!
//! The injector owns a constant table appended after the host kernel's
//! tables and a fixed aux register set: `0, 11, 12, 13`. It never allocates
//! from the emitter's temporary pool, so the host must not hold live values
//! in the aux registers across `compute_vector`.

use iced_x86::code_asm::{AsmRegister64, CodeLabel};

use super::reg_pool::VReg;
use super::target_desc::IsaTraits;
use super::x86_64::{Address, BinOp, Cvt, FmaOp, Lanes, Shift, X86Emitter};
use crate::types::Result;

// ── Constants ───────────────────────────────────────────────────────────────

pub const TANH_ABS_MASK: u32 = 0x7FFF_FFFF;
/// |x| beyond which tanh(x) is 1.0 in f32.
pub const TANH_CLAMP: f32 = 9.0;
pub const TANH_LOG2E: f32 = std::f32::consts::LOG2_E;
/// Cody-Waite split of ln(2); `LN2_HI` has trailing zero bits so `k * LN2_HI`
/// is exact for the k range reached here.
pub const TANH_LN2_HI: f32 = 0.693_359_4;
pub const TANH_LN2_LO: f32 = -2.121_944_4e-4;
/// Taylor coefficients of e^r, highest degree first.
pub const TANH_EXP_POLY: [f32; 7] = [
    1.0 / 720.0,
    1.0 / 120.0,
    1.0 / 24.0,
    1.0 / 6.0,
    0.5,
    1.0,
    1.0,
];
pub const TANH_EXP_BIAS: u32 = 127;

// Table slots, in emission order.
const ABS_MASK: usize = 0;
const CLAMP: usize = 1;
const LOG2E: usize = 2;
const LN2_HI: usize = 3;
const LN2_LO: usize = 4;
const POLY: usize = 5;
const ONE: usize = POLY + TANH_EXP_POLY.len();
const EXP_BIAS: usize = ONE + 1;
const TABLE_SLOTS: usize = EXP_BIAS + 1;

fn slot_bits() -> [u32; TABLE_SLOTS] {
    let mut bits = [0u32; TABLE_SLOTS];
    bits[ABS_MASK] = TANH_ABS_MASK;
    bits[CLAMP] = TANH_CLAMP.to_bits();
    bits[LOG2E] = TANH_LOG2E.to_bits();
    bits[LN2_HI] = TANH_LN2_HI.to_bits();
    bits[LN2_LO] = TANH_LN2_LO.to_bits();
    for (i, c) in TANH_EXP_POLY.iter().enumerate() {
        bits[POLY + i] = c.to_bits();
    }
    bits[ONE] = 1.0f32.to_bits();
    bits[EXP_BIAS] = TANH_EXP_BIAS;
    bits
}

// ── Injector ────────────────────────────────────────────────────────────────

pub struct TanhInjector {
    traits: IsaTraits,
    table_reg: AsmRegister64,
    table: CodeLabel,
}

impl TanhInjector {
    /// Fixed aux registers: sign, exponent, polynomial, memory staging.
    pub const AUX_VREGS: [VReg; 4] = [VReg(0), VReg(11), VReg(12), VReg(13)];

    /// Create before emitting the host body; `table_reg` is clobbered by
    /// `load_table_addr`.
    pub fn new(e: &mut X86Emitter, table_reg: AsmRegister64) -> Self {
        TanhInjector {
            traits: *e.traits(),
            table_reg,
            table: e.create_label(),
        }
    }

    /// Point the table register at this injector's table. Must run before
    /// any `compute_vector` and after the host's last read through the same
    /// register.
    pub fn load_table_addr(&self, e: &mut X86Emitter) -> Result<()> {
        e.load_label_addr(self.table_reg, self.table)
    }

    /// `v = tanh(v)`. With `Lanes::Scalar` only the low lane is meaningful.
    pub fn compute_vector(&self, e: &mut X86Emitter, lanes: Lanes, v: VReg) -> Result<()> {
        let len = lanes.reg_len();
        let [sign, ex, poly, stage] = Self::AUX_VREGS;
        let via = Some(stage);

        // sign bit and |x|
        e.vmov(len, sign, v)?;
        e.vbinop_mem_via(BinOp::And, len, v, v, self.at(ABS_MASK), via)?;
        e.vbinop(BinOp::Xor, len, sign, sign, v)?;

        // min(9, |x|) with |x| as second operand keeps NaN
        e.vload(len, stage, self.at(CLAMP))?;
        e.vbinop(BinOp::Min, len, stage, stage, v)?;
        e.vmov(len, v, stage)?;

        // z = 2|x|, k = round(z * log2e)
        e.vbinop(BinOp::Add, len, v, v, v)?;
        e.vbinop_mem_via(BinOp::Mul, len, ex, v, self.at(LOG2E), via)?;
        e.vcvt(Cvt::F32ToI32, len, ex, ex)?;
        e.vcvt(Cvt::I32ToF32, len, poly, ex)?;

        // r = z - k*ln2
        e.vfma_mem_via(FmaOp::Fnmadd231, len, v, poly, self.at(LN2_HI), via)?;
        e.vfma_mem_via(FmaOp::Fnmadd231, len, v, poly, self.at(LN2_LO), via)?;

        // 2^k
        e.vbinop_mem_via(BinOp::AddI32, len, ex, ex, self.at(EXP_BIAS), via)?;
        e.vshift(Shift::LeftI32, len, ex, ex, 23)?;

        // e^r
        e.vload(len, poly, self.at(POLY))?;
        for i in 1..TANH_EXP_POLY.len() {
            let coeff = self.at(POLY + i);
            e.vfma_mem_via(FmaOp::Fmadd213, len, poly, v, coeff, via)?;
        }
        e.vbinop(BinOp::Mul, len, poly, poly, ex)?;

        // (t - 1) / (t + 1), sign restored
        e.vbinop_mem_via(BinOp::Sub, len, v, poly, self.at(ONE), via)?;
        e.vbinop_mem_via(BinOp::Add, len, poly, poly, self.at(ONE), via)?;
        e.vbinop(BinOp::Div, len, v, v, poly)?;
        e.vbinop(BinOp::Or, len, v, v, sign)?;
        Ok(())
    }

    /// Emit the table. Call after the host's own tables.
    pub fn prepare_table(&mut self, e: &mut X86Emitter) -> Result<()> {
        let lanes = self.traits.vlen / std::mem::size_of::<u32>();
        let words: Vec<u32> = slot_bits()
            .iter()
            .flat_map(|&w| std::iter::repeat(w).take(lanes))
            .collect();
        e.emit_table(&mut self.table, &words)
    }

    fn at(&self, slot: usize) -> Address {
        Address::new(self.table_reg, (slot * self.traits.vlen) as i32)
    }
}

/// Scalar mirror of the emitted sequence, for checking generated code and
/// for the reference kernel.
pub fn tanh_approx(x: f32) -> f32 {
    if x.is_nan() {
        return x;
    }
    let sign = x.to_bits() & !TANH_ABS_MASK;
    let z = 2.0 * x.abs().min(TANH_CLAMP);
    let k = (z * TANH_LOG2E).round_ties_even();
    let r = (-k).mul_add(TANH_LN2_LO, (-k).mul_add(TANH_LN2_HI, z));
    let p = TANH_EXP_POLY[1..]
        .iter()
        .fold(TANH_EXP_POLY[0], |acc, &c| acc.mul_add(r, c));
    let t = p * f32::from_bits(((k as i32 + TANH_EXP_BIAS as i32) as u32) << 23);
    let y = (t - 1.0) / (t + 1.0);
    f32::from_bits(y.to_bits() | sign)
}
