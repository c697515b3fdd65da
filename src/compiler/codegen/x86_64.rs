//! x86-64 emission substrate over iced-x86's `CodeAssembler`.
//!
//! Provides what the kernel generators build on:
//! - preamble/postamble that save and restore the callee-saved GPRs a body uses
//! - constant tables placed after the code and addressed RIP-relative
//! - ISA-uniform vector/scalar ops: one call site emits legacy SSE, VEX or
//!   EVEX forms depending on the resolved `IsaTraits`
//! - `op dst, lhs, [mem]` helpers that either use the fused memory form or
//!   load into a scratch register first (`MemOperandForm`)
//! - FMA lowering to multiply + add/sub on ISAs without FMA
//!
//! Register convention: System V AMD64. Integer arguments 1-6 arrive in
//! rdi, rsi, rdx, rcx, r8, r9; the rest on the stack.

use iced_x86::code_asm::*;
use iced_x86::{BlockEncoderOptions, Decoder, DecoderOptions, Formatter, Instruction, IntelFormatter};

use super::reg_pool::{TmpPool, VReg};
use super::target_desc::{IsaTraits, MemOperandForm, VecLen};
use super::CodegenOutput;
use crate::types::{KernelError, Result};

// ── Operands ────────────────────────────────────────────────────────────────

/// Memory address `[base + disp]`.
#[derive(Debug, Clone, Copy)]
pub struct Address {
    pub base: AsmRegister64,
    pub disp: i32,
}

impl Address {
    pub fn new(base: AsmRegister64, disp: i32) -> Self {
        Address { base, disp }
    }

    fn mem(self) -> AsmMemoryOperand {
        self.base + self.disp
    }
}

/// Whether an op works on whole vectors or on the low f32 lane only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lanes {
    Vector(VecLen),
    Scalar,
}

impl Lanes {
    /// Register class the lanes live in; scalars use xmm.
    pub fn reg_len(self) -> VecLen {
        match self {
            Lanes::Vector(len) => len,
            Lanes::Scalar => VecLen::Xmm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    And,
    Or,
    Xor,
    /// 32-bit integer lane add.
    AddI32,
    /// Bitwise and on integer lanes.
    AndI32,
}

impl BinOp {
    fn is_commutative(self) -> bool {
        !matches!(self, BinOp::Sub | BinOp::Div | BinOp::Min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmaOp {
    /// dst = dst + a * b
    Fmadd231,
    /// dst = dst - a * b
    Fnmadd231,
    /// dst = dst * a + b
    Fmadd213,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cvt {
    /// f32 -> i32, current rounding mode (nearest-even by default).
    F32ToI32,
    I32ToF32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    LeftI32,
    RightI32,
}

// ── Register mapping ────────────────────────────────────────────────────────

pub fn xmm_reg(r: VReg) -> AsmRegisterXmm {
    let regs = [
        xmm0, xmm1, xmm2, xmm3, xmm4, xmm5, xmm6, xmm7, xmm8, xmm9, xmm10, xmm11, xmm12, xmm13,
        xmm14, xmm15, xmm16, xmm17, xmm18, xmm19, xmm20, xmm21, xmm22, xmm23, xmm24, xmm25,
        xmm26, xmm27, xmm28, xmm29, xmm30, xmm31,
    ];
    regs[r.idx()]
}

pub fn ymm_reg(r: VReg) -> AsmRegisterYmm {
    let regs = [
        ymm0, ymm1, ymm2, ymm3, ymm4, ymm5, ymm6, ymm7, ymm8, ymm9, ymm10, ymm11, ymm12, ymm13,
        ymm14, ymm15, ymm16, ymm17, ymm18, ymm19, ymm20, ymm21, ymm22, ymm23, ymm24, ymm25,
        ymm26, ymm27, ymm28, ymm29, ymm30, ymm31,
    ];
    regs[r.idx()]
}

pub fn zmm_reg(r: VReg) -> AsmRegisterZmm {
    let regs = [
        zmm0, zmm1, zmm2, zmm3, zmm4, zmm5, zmm6, zmm7, zmm8, zmm9, zmm10, zmm11, zmm12, zmm13,
        zmm14, zmm15, zmm16, zmm17, zmm18, zmm19, zmm20, zmm21, zmm22, zmm23, zmm24, zmm25,
        zmm26, zmm27, zmm28, zmm29, zmm30, zmm31,
    ];
    regs[r.idx()]
}

/// Packed three-register op at the given width.
macro_rules! packed_rrr {
    ($asm:expr, $op:ident, $len:expr, $d:expr, $a:expr, $b:expr) => {
        match $len {
            VecLen::Xmm => $asm.$op(xmm_reg($d), xmm_reg($a), xmm_reg($b)),
            VecLen::Ymm => $asm.$op(ymm_reg($d), ymm_reg($a), ymm_reg($b)),
            VecLen::Zmm => $asm.$op(zmm_reg($d), zmm_reg($a), zmm_reg($b)),
        }
    };
}

/// Packed op with a full-width memory source as third operand.
macro_rules! packed_rrm {
    ($asm:expr, $op:ident, $len:expr, $d:expr, $a:expr, $m:expr) => {
        match $len {
            VecLen::Xmm => $asm.$op(xmm_reg($d), xmm_reg($a), xmmword_ptr($m.mem())),
            VecLen::Ymm => $asm.$op(ymm_reg($d), ymm_reg($a), ymmword_ptr($m.mem())),
            VecLen::Zmm => $asm.$op(zmm_reg($d), zmm_reg($a), zmmword_ptr($m.mem())),
        }
    };
}

/// Packed two-register op (`dst, src`).
macro_rules! packed_rr {
    ($asm:expr, $op:ident, $len:expr, $d:expr, $s:expr) => {
        match $len {
            VecLen::Xmm => $asm.$op(xmm_reg($d), xmm_reg($s)),
            VecLen::Ymm => $asm.$op(ymm_reg($d), ymm_reg($s)),
            VecLen::Zmm => $asm.$op(zmm_reg($d), zmm_reg($s)),
        }
    };
}

// ── Emitter ─────────────────────────────────────────────────────────────────

pub struct X86Emitter {
    asm: CodeAssembler,
    traits: IsaTraits,
    pool: TmpPool,
    saved_gprs: Vec<AsmRegister64>,
}

impl X86Emitter {
    pub fn new(traits: IsaTraits, pool: TmpPool) -> Result<Self> {
        let mut asm = CodeAssembler::new(64)?;
        // xmm/ymm16-31 only exist in EVEX; let AVX-512 targets pick it.
        asm.set_prefer_vex(!traits.isa.is_avx512());
        Ok(X86Emitter {
            asm,
            traits,
            pool,
            saved_gprs: Vec::new(),
        })
    }

    pub fn traits(&self) -> &IsaTraits {
        &self.traits
    }

    /// Direct access for GPR bookkeeping (pointer bumps, loop counters).
    pub fn asm(&mut self) -> &mut CodeAssembler {
        &mut self.asm
    }

    /// Next scratch register from the cyclic pool.
    pub fn next_tmp(&mut self) -> VReg {
        self.pool.next()
    }

    pub fn create_label(&mut self) -> CodeLabel {
        self.asm.create_label()
    }

    pub fn bind(&mut self, label: &mut CodeLabel) -> Result<()> {
        self.asm.set_label(label)?;
        Ok(())
    }

    // ── Frame ───────────────────────────────────────────────────────────

    /// Push the callee-saved GPRs the body clobbers.
    pub fn preamble(&mut self, callee_saved: &[AsmRegister64]) -> Result<()> {
        for &reg in callee_saved {
            self.asm.push(reg)?;
        }
        self.saved_gprs = callee_saved.to_vec();
        Ok(())
    }

    /// Restore what `preamble` saved and return.
    pub fn postamble(&mut self) -> Result<()> {
        if self.traits.isa.is_vex() {
            self.asm.vzeroupper()?;
        }
        for &reg in self.saved_gprs.iter().rev() {
            self.asm.pop(reg)?;
        }
        self.asm.ret()?;
        Ok(())
    }

    /// Stack-passed argument `k` (0 = the 7th integer argument), valid
    /// between preamble and postamble.
    pub fn stack_param(&self, k: usize) -> AsmMemoryOperand {
        let disp = 8 * (self.saved_gprs.len() + 1 + k);
        qword_ptr(rsp + disp as i32)
    }

    // ── Constant tables ─────────────────────────────────────────────────

    /// `lea reg, [rip + label]`.
    pub fn load_label_addr(&mut self, reg: AsmRegister64, label: CodeLabel) -> Result<()> {
        self.asm.lea(reg, ptr(label))?;
        Ok(())
    }

    /// Bind `label` and emit `words` as little-endian 32-bit data.
    pub fn emit_table(&mut self, label: &mut CodeLabel, words: &[u32]) -> Result<()> {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.asm.set_label(label)?;
        self.asm.db(&bytes)?;
        Ok(())
    }

    /// Assemble. `text_end` marks where code ends and data begins.
    pub fn finalize(mut self, text_end: CodeLabel) -> Result<CodegenOutput> {
        let result = self
            .asm
            .assemble_options(0, BlockEncoderOptions::RETURN_NEW_INSTRUCTION_OFFSETS)?;
        let text_len = result.label_ip(&text_end)? as usize;
        Ok(CodegenOutput {
            code: result.inner.code_buffer,
            text_len,
        })
    }

    // ── Moves ───────────────────────────────────────────────────────────

    /// Full register copy.
    pub fn vmov(&mut self, len: VecLen, dst: VReg, src: VReg) -> Result<()> {
        if dst == src {
            return Ok(());
        }
        if self.traits.isa.is_vex() {
            packed_rr!(self.asm, vmovaps, len, dst, src)?;
        } else {
            self.asm.movaps(xmm_reg(dst), xmm_reg(src))?;
        }
        Ok(())
    }

    /// Unaligned full-vector load.
    pub fn vload(&mut self, len: VecLen, dst: VReg, addr: Address) -> Result<()> {
        if !self.traits.isa.is_vex() {
            self.asm.movups(xmm_reg(dst), xmmword_ptr(addr.mem()))?;
            return Ok(());
        }
        match len {
            VecLen::Xmm => self.asm.vmovups(xmm_reg(dst), xmmword_ptr(addr.mem()))?,
            VecLen::Ymm => self.asm.vmovups(ymm_reg(dst), ymmword_ptr(addr.mem()))?,
            VecLen::Zmm => self.asm.vmovups(zmm_reg(dst), zmmword_ptr(addr.mem()))?,
        }
        Ok(())
    }

    /// Unaligned full-vector store.
    pub fn vstore(&mut self, len: VecLen, addr: Address, src: VReg) -> Result<()> {
        if !self.traits.isa.is_vex() {
            self.asm.movups(xmmword_ptr(addr.mem()), xmm_reg(src))?;
            return Ok(());
        }
        match len {
            VecLen::Xmm => self.asm.vmovups(xmmword_ptr(addr.mem()), xmm_reg(src))?,
            VecLen::Ymm => self.asm.vmovups(ymmword_ptr(addr.mem()), ymm_reg(src))?,
            VecLen::Zmm => self.asm.vmovups(zmmword_ptr(addr.mem()), zmm_reg(src))?,
        }
        Ok(())
    }

    /// Load one f32 into the low lane.
    pub fn sload(&mut self, dst: VReg, addr: Address) -> Result<()> {
        if self.traits.isa.is_vex() {
            self.asm.vmovss(xmm_reg(dst), dword_ptr(addr.mem()))?;
        } else {
            self.asm.movss(xmm_reg(dst), dword_ptr(addr.mem()))?;
        }
        Ok(())
    }

    /// Store the low f32 lane.
    pub fn sstore(&mut self, addr: Address, src: VReg) -> Result<()> {
        if self.traits.isa.is_vex() {
            self.asm.vmovss(dword_ptr(addr.mem()), xmm_reg(src))?;
        } else {
            self.asm.movss(dword_ptr(addr.mem()), xmm_reg(src))?;
        }
        Ok(())
    }

    // ── Packed arithmetic ───────────────────────────────────────────────

    /// dst = a <op> b
    pub fn vbinop(&mut self, op: BinOp, len: VecLen, dst: VReg, a: VReg, b: VReg) -> Result<()> {
        if !self.traits.isa.is_vex() {
            return self.sse_three_operand(op, false, dst, a, b);
        }
        match op {
            BinOp::Add => packed_rrr!(self.asm, vaddps, len, dst, a, b)?,
            BinOp::Sub => packed_rrr!(self.asm, vsubps, len, dst, a, b)?,
            BinOp::Mul => packed_rrr!(self.asm, vmulps, len, dst, a, b)?,
            BinOp::Div => packed_rrr!(self.asm, vdivps, len, dst, a, b)?,
            BinOp::Min => packed_rrr!(self.asm, vminps, len, dst, a, b)?,
            BinOp::And => packed_rrr!(self.asm, vandps, len, dst, a, b)?,
            BinOp::Or => packed_rrr!(self.asm, vorps, len, dst, a, b)?,
            BinOp::Xor => packed_rrr!(self.asm, vxorps, len, dst, a, b)?,
            BinOp::AddI32 => packed_rrr!(self.asm, vpaddd, len, dst, a, b)?,
            BinOp::AndI32 if self.traits.isa.is_avx512() => {
                packed_rrr!(self.asm, vpandd, len, dst, a, b)?
            }
            BinOp::AndI32 => match len {
                VecLen::Xmm => self.asm.vpand(xmm_reg(dst), xmm_reg(a), xmm_reg(b))?,
                VecLen::Ymm => self.asm.vpand(ymm_reg(dst), ymm_reg(a), ymm_reg(b))?,
                VecLen::Zmm => {
                    return Err(KernelError::Unsupported("zmm vpand without avx512".into()))
                }
            },
        }
        Ok(())
    }

    /// dst = a <op> [addr], scratch from the pool when the fused form is
    /// unavailable.
    pub fn vbinop_mem(&mut self, op: BinOp, len: VecLen, dst: VReg, a: VReg, addr: Address) -> Result<()> {
        let tmp = match self.traits.mem_form {
            MemOperandForm::Fused => None,
            MemOperandForm::LoadThenCompute => Some(self.next_tmp()),
        };
        self.vbinop_mem_via(op, len, dst, a, addr, tmp)
    }

    /// `vbinop_mem` with a caller-chosen scratch register.
    pub fn vbinop_mem_via(
        &mut self,
        op: BinOp,
        len: VecLen,
        dst: VReg,
        a: VReg,
        addr: Address,
        tmp: Option<VReg>,
    ) -> Result<()> {
        if self.traits.mem_form == MemOperandForm::LoadThenCompute {
            let tmp = tmp.ok_or_else(|| missing_scratch("vbinop_mem"))?;
            self.vload(len, tmp, addr)?;
            return self.vbinop(op, len, dst, a, tmp);
        }
        match op {
            BinOp::Add => packed_rrm!(self.asm, vaddps, len, dst, a, addr)?,
            BinOp::Sub => packed_rrm!(self.asm, vsubps, len, dst, a, addr)?,
            BinOp::Mul => packed_rrm!(self.asm, vmulps, len, dst, a, addr)?,
            BinOp::Div => packed_rrm!(self.asm, vdivps, len, dst, a, addr)?,
            BinOp::Min => packed_rrm!(self.asm, vminps, len, dst, a, addr)?,
            BinOp::And => packed_rrm!(self.asm, vandps, len, dst, a, addr)?,
            BinOp::Or => packed_rrm!(self.asm, vorps, len, dst, a, addr)?,
            BinOp::Xor => packed_rrm!(self.asm, vxorps, len, dst, a, addr)?,
            BinOp::AddI32 => packed_rrm!(self.asm, vpaddd, len, dst, a, addr)?,
            BinOp::AndI32 if self.traits.isa.is_avx512() => {
                packed_rrm!(self.asm, vpandd, len, dst, a, addr)?
            }
            BinOp::AndI32 => match len {
                VecLen::Xmm => self.asm.vpand(xmm_reg(dst), xmm_reg(a), xmmword_ptr(addr.mem()))?,
                VecLen::Ymm => self.asm.vpand(ymm_reg(dst), ymm_reg(a), ymmword_ptr(addr.mem()))?,
                VecLen::Zmm => {
                    return Err(KernelError::Unsupported("zmm vpand without avx512".into()))
                }
            },
        }
        Ok(())
    }

    /// Fused multiply-add family. Without FMA this becomes a multiply into a
    /// pool temporary followed by add/sub; no source operand is clobbered.
    pub fn vfma(&mut self, op: FmaOp, len: VecLen, dst: VReg, a: VReg, b: VReg) -> Result<()> {
        if !self.traits.has_fma {
            let tmp = self.next_tmp();
            return self.fma_emulated(Lanes::Vector(len), op, dst, a, b, tmp);
        }
        match op {
            FmaOp::Fmadd231 => packed_rrr!(self.asm, vfmadd231ps, len, dst, a, b)?,
            FmaOp::Fnmadd231 => packed_rrr!(self.asm, vfnmadd231ps, len, dst, a, b)?,
            FmaOp::Fmadd213 => packed_rrr!(self.asm, vfmadd213ps, len, dst, a, b)?,
        }
        Ok(())
    }

    /// FMA with the last source in memory.
    pub fn vfma_mem(&mut self, op: FmaOp, len: VecLen, dst: VReg, a: VReg, addr: Address) -> Result<()> {
        let tmp = if self.traits.has_fma && self.traits.mem_form == MemOperandForm::Fused {
            None
        } else {
            Some(self.next_tmp())
        };
        self.vfma_mem_via(op, len, dst, a, addr, tmp)
    }

    /// `vfma_mem` with a caller-chosen scratch register.
    pub fn vfma_mem_via(
        &mut self,
        op: FmaOp,
        len: VecLen,
        dst: VReg,
        a: VReg,
        addr: Address,
        tmp: Option<VReg>,
    ) -> Result<()> {
        if self.traits.has_fma && self.traits.mem_form == MemOperandForm::Fused {
            match op {
                FmaOp::Fmadd231 => packed_rrm!(self.asm, vfmadd231ps, len, dst, a, addr)?,
                FmaOp::Fnmadd231 => packed_rrm!(self.asm, vfnmadd231ps, len, dst, a, addr)?,
                FmaOp::Fmadd213 => packed_rrm!(self.asm, vfmadd213ps, len, dst, a, addr)?,
            }
            return Ok(());
        }
        let tmp = tmp.ok_or_else(|| missing_scratch("vfma_mem"))?;
        self.fma_mem_split(Lanes::Vector(len), op, dst, a, addr, tmp)
    }

    pub fn vcvt(&mut self, cvt: Cvt, len: VecLen, dst: VReg, src: VReg) -> Result<()> {
        if !self.traits.isa.is_vex() {
            match cvt {
                Cvt::F32ToI32 => self.asm.cvtps2dq(xmm_reg(dst), xmm_reg(src))?,
                Cvt::I32ToF32 => self.asm.cvtdq2ps(xmm_reg(dst), xmm_reg(src))?,
            }
            return Ok(());
        }
        match cvt {
            Cvt::F32ToI32 => packed_rr!(self.asm, vcvtps2dq, len, dst, src)?,
            Cvt::I32ToF32 => packed_rr!(self.asm, vcvtdq2ps, len, dst, src)?,
        }
        Ok(())
    }

    /// Shift each 32-bit lane by an immediate.
    pub fn vshift(&mut self, shift: Shift, len: VecLen, dst: VReg, src: VReg, imm: i32) -> Result<()> {
        if !self.traits.isa.is_vex() {
            self.vmov(VecLen::Xmm, dst, src)?;
            match shift {
                Shift::LeftI32 => self.asm.pslld(xmm_reg(dst), imm)?,
                Shift::RightI32 => self.asm.psrld(xmm_reg(dst), imm)?,
            }
            return Ok(());
        }
        match (shift, len) {
            (Shift::LeftI32, VecLen::Xmm) => self.asm.vpslld(xmm_reg(dst), xmm_reg(src), imm)?,
            (Shift::LeftI32, VecLen::Ymm) => self.asm.vpslld(ymm_reg(dst), ymm_reg(src), imm)?,
            (Shift::LeftI32, VecLen::Zmm) => self.asm.vpslld(zmm_reg(dst), zmm_reg(src), imm)?,
            (Shift::RightI32, VecLen::Xmm) => self.asm.vpsrld(xmm_reg(dst), xmm_reg(src), imm)?,
            (Shift::RightI32, VecLen::Ymm) => self.asm.vpsrld(ymm_reg(dst), ymm_reg(src), imm)?,
            (Shift::RightI32, VecLen::Zmm) => self.asm.vpsrld(zmm_reg(dst), zmm_reg(src), imm)?,
        }
        Ok(())
    }

    // ── Scalar arithmetic (low lane) ────────────────────────────────────

    pub fn sbinop(&mut self, op: BinOp, dst: VReg, a: VReg, b: VReg) -> Result<()> {
        if !self.traits.isa.is_vex() {
            return self.sse_three_operand(op, true, dst, a, b);
        }
        let (d, a, b) = (xmm_reg(dst), xmm_reg(a), xmm_reg(b));
        match op {
            BinOp::Add => self.asm.vaddss(d, a, b)?,
            BinOp::Sub => self.asm.vsubss(d, a, b)?,
            BinOp::Mul => self.asm.vmulss(d, a, b)?,
            BinOp::Div => self.asm.vdivss(d, a, b)?,
            _ => return Err(no_scalar_form(op)),
        }
        Ok(())
    }

    pub fn sbinop_mem(&mut self, op: BinOp, dst: VReg, a: VReg, addr: Address) -> Result<()> {
        if self.traits.mem_form == MemOperandForm::LoadThenCompute {
            let tmp = self.next_tmp();
            self.sload(tmp, addr)?;
            return self.sbinop(op, dst, a, tmp);
        }
        let (d, a, m) = (xmm_reg(dst), xmm_reg(a), dword_ptr(addr.mem()));
        match op {
            BinOp::Add => self.asm.vaddss(d, a, m)?,
            BinOp::Sub => self.asm.vsubss(d, a, m)?,
            BinOp::Mul => self.asm.vmulss(d, a, m)?,
            BinOp::Div => self.asm.vdivss(d, a, m)?,
            _ => return Err(no_scalar_form(op)),
        }
        Ok(())
    }

    pub fn sfma(&mut self, op: FmaOp, dst: VReg, a: VReg, b: VReg) -> Result<()> {
        if !self.traits.has_fma {
            let tmp = self.next_tmp();
            return self.fma_emulated(Lanes::Scalar, op, dst, a, b, tmp);
        }
        let (d, a, b) = (xmm_reg(dst), xmm_reg(a), xmm_reg(b));
        match op {
            FmaOp::Fmadd231 => self.asm.vfmadd231ss(d, a, b)?,
            FmaOp::Fnmadd231 => self.asm.vfnmadd231ss(d, a, b)?,
            FmaOp::Fmadd213 => self.asm.vfmadd213ss(d, a, b)?,
        }
        Ok(())
    }

    pub fn sfma_mem(&mut self, op: FmaOp, dst: VReg, a: VReg, addr: Address) -> Result<()> {
        if self.traits.has_fma && self.traits.mem_form == MemOperandForm::Fused {
            let (d, a, m) = (xmm_reg(dst), xmm_reg(a), dword_ptr(addr.mem()));
            match op {
                FmaOp::Fmadd231 => self.asm.vfmadd231ss(d, a, m)?,
                FmaOp::Fnmadd231 => self.asm.vfnmadd231ss(d, a, m)?,
                FmaOp::Fmadd213 => self.asm.vfmadd213ss(d, a, m)?,
            }
            return Ok(());
        }
        let tmp = self.next_tmp();
        self.fma_mem_split(Lanes::Scalar, op, dst, a, addr, tmp)
    }

    // ── Lane-generic front end ──────────────────────────────────────────
    //
    // The kernel body is written once against these and emitted twice: with
    // `Lanes::Vector` for the main loop and `Lanes::Scalar` for the tail.

    pub fn mov(&mut self, lanes: Lanes, dst: VReg, src: VReg) -> Result<()> {
        self.vmov(lanes.reg_len(), dst, src)
    }

    pub fn load_f32(&mut self, lanes: Lanes, dst: VReg, addr: Address) -> Result<()> {
        match lanes {
            Lanes::Vector(len) => self.vload(len, dst, addr),
            Lanes::Scalar => self.sload(dst, addr),
        }
    }

    pub fn store_f32(&mut self, lanes: Lanes, addr: Address, src: VReg) -> Result<()> {
        match lanes {
            Lanes::Vector(len) => self.vstore(len, addr, src),
            Lanes::Scalar => self.sstore(addr, src),
        }
    }

    pub fn binop(&mut self, lanes: Lanes, op: BinOp, dst: VReg, a: VReg, b: VReg) -> Result<()> {
        match lanes {
            Lanes::Vector(len) => self.vbinop(op, len, dst, a, b),
            Lanes::Scalar => self.sbinop(op, dst, a, b),
        }
    }

    pub fn binop_mem(&mut self, lanes: Lanes, op: BinOp, dst: VReg, a: VReg, addr: Address) -> Result<()> {
        match lanes {
            Lanes::Vector(len) => self.vbinop_mem(op, len, dst, a, addr),
            Lanes::Scalar => self.sbinop_mem(op, dst, a, addr),
        }
    }

    pub fn fma(&mut self, lanes: Lanes, op: FmaOp, dst: VReg, a: VReg, b: VReg) -> Result<()> {
        match lanes {
            Lanes::Vector(len) => self.vfma(op, len, dst, a, b),
            Lanes::Scalar => self.sfma(op, dst, a, b),
        }
    }

    pub fn fma_mem(&mut self, lanes: Lanes, op: FmaOp, dst: VReg, a: VReg, addr: Address) -> Result<()> {
        match lanes {
            Lanes::Vector(len) => self.vfma_mem(op, len, dst, a, addr),
            Lanes::Scalar => self.sfma_mem(op, dst, a, addr),
        }
    }

    // ── bf16 storage (AVX-512 only) ─────────────────────────────────────

    /// Widen bf16 storage at `addr` into f32 lanes of `dst`.
    pub fn load_bf16(&mut self, lanes: Lanes, dst: VReg, addr: Address) -> Result<()> {
        self.require_avx512("bf16 load")?;
        match lanes {
            Lanes::Vector(VecLen::Zmm) => {
                self.asm.vpmovzxwd(zmm_reg(dst), ymmword_ptr(addr.mem()))?;
            }
            Lanes::Vector(VecLen::Ymm) => {
                self.asm.vpmovzxwd(ymm_reg(dst), xmmword_ptr(addr.mem()))?;
            }
            Lanes::Vector(VecLen::Xmm) => {
                self.asm.vpmovzxwd(xmm_reg(dst), qword_ptr(addr.mem()))?;
            }
            Lanes::Scalar => {
                // Word 0 of the low dword takes the value; the shift below
                // drops whatever word 1 held.
                let d = xmm_reg(dst);
                self.asm.vpinsrw(d, d, word_ptr(addr.mem()), 0)?;
            }
        }
        let len = lanes.reg_len();
        self.vshift(Shift::LeftI32, len, dst, dst, 16)
    }

    /// Store the low 16 bits of each 32-bit lane of `src`.
    pub fn store_low_words(&mut self, lanes: Lanes, addr: Address, src: VReg) -> Result<()> {
        self.require_avx512("bf16 store")?;
        match lanes {
            Lanes::Vector(VecLen::Zmm) => self.asm.vpmovdw(ymmword_ptr(addr.mem()), zmm_reg(src))?,
            Lanes::Vector(VecLen::Ymm) => self.asm.vpmovdw(xmmword_ptr(addr.mem()), ymm_reg(src))?,
            Lanes::Vector(VecLen::Xmm) => self.asm.vpmovdw(qword_ptr(addr.mem()), xmm_reg(src))?,
            Lanes::Scalar => self.asm.vpextrw(word_ptr(addr.mem()), xmm_reg(src), 0)?,
        }
        Ok(())
    }

    /// For the NaN lanes of `src`, `dst = (src >> 16) | quiet`; other lanes
    /// of `dst` are kept. `quiet` holds 0x40 per lane, the bf16 quiet bit.
    /// Clobbers k1.
    pub fn bf16_quiet_nans(&mut self, lanes: Lanes, dst: VReg, src: VReg, quiet: VReg) -> Result<()> {
        self.require_avx512("bf16 NaN narrowing")?;
        // _CMP_UNORD_Q
        const UNORD: i32 = 3;
        match lanes.reg_len() {
            VecLen::Zmm => {
                let (d, s, q) = (zmm_reg(dst), zmm_reg(src), zmm_reg(quiet));
                self.asm.vcmpps(k1, s, s, UNORD)?;
                self.asm.vpsrld(d.k1(), s, 16)?;
                self.asm.vpord(d.k1(), d, q)?;
            }
            VecLen::Ymm => {
                let (d, s, q) = (ymm_reg(dst), ymm_reg(src), ymm_reg(quiet));
                self.asm.vcmpps(k1, s, s, UNORD)?;
                self.asm.vpsrld(d.k1(), s, 16)?;
                self.asm.vpord(d.k1(), d, q)?;
            }
            VecLen::Xmm => {
                let (d, s, q) = (xmm_reg(dst), xmm_reg(src), xmm_reg(quiet));
                self.asm.vcmpps(k1, s, s, UNORD)?;
                self.asm.vpsrld(d.k1(), s, 16)?;
                self.asm.vpord(d.k1(), d, q)?;
            }
        }
        Ok(())
    }

    /// Native round-to-nearest-even narrowing of `src` into `addr` through
    /// `tmp`.
    pub fn store_bf16_native(&mut self, lanes: Lanes, addr: Address, src: VReg, tmp: VReg) -> Result<()> {
        if !self.traits.native_bf16 {
            return Err(KernelError::Unsupported(format!(
                "vcvtneps2bf16 on {}",
                self.traits.isa
            )));
        }
        match lanes {
            Lanes::Vector(VecLen::Zmm) => {
                self.asm.vcvtneps2bf16(ymm_reg(tmp), zmm_reg(src))?;
                self.asm.vmovdqu16(ymmword_ptr(addr.mem()), ymm_reg(tmp))?;
            }
            Lanes::Vector(VecLen::Ymm) => {
                self.asm.vcvtneps2bf16(xmm_reg(tmp), ymm_reg(src))?;
                self.asm.vmovdqu16(xmmword_ptr(addr.mem()), xmm_reg(tmp))?;
            }
            Lanes::Vector(VecLen::Xmm) => {
                self.asm.vcvtneps2bf16(xmm_reg(tmp), xmm_reg(src))?;
                self.asm.vmovq(qword_ptr(addr.mem()), xmm_reg(tmp))?;
            }
            Lanes::Scalar => {
                self.asm.vcvtneps2bf16(xmm_reg(tmp), xmm_reg(src))?;
                self.asm.vpextrw(word_ptr(addr.mem()), xmm_reg(tmp), 0)?;
            }
        }
        Ok(())
    }

    // ── Lowering helpers ────────────────────────────────────────────────

    /// Two-operand SSE lowering of `dst = a <op> b`.
    fn sse_three_operand(&mut self, op: BinOp, scalar: bool, dst: VReg, a: VReg, b: VReg) -> Result<()> {
        if dst == a {
            return self.sse_two_operand(op, scalar, dst, b);
        }
        if dst == b {
            if op.is_commutative() {
                return self.sse_two_operand(op, scalar, dst, a);
            }
            let tmp = self.next_tmp();
            self.asm.movaps(xmm_reg(tmp), xmm_reg(a))?;
            self.sse_two_operand(op, scalar, tmp, b)?;
            self.asm.movaps(xmm_reg(dst), xmm_reg(tmp))?;
            return Ok(());
        }
        self.asm.movaps(xmm_reg(dst), xmm_reg(a))?;
        self.sse_two_operand(op, scalar, dst, b)
    }

    fn sse_two_operand(&mut self, op: BinOp, scalar: bool, dst: VReg, src: VReg) -> Result<()> {
        let (d, s) = (xmm_reg(dst), xmm_reg(src));
        match (op, scalar) {
            (BinOp::Add, false) => self.asm.addps(d, s)?,
            (BinOp::Sub, false) => self.asm.subps(d, s)?,
            (BinOp::Mul, false) => self.asm.mulps(d, s)?,
            (BinOp::Div, false) => self.asm.divps(d, s)?,
            (BinOp::Min, false) => self.asm.minps(d, s)?,
            (BinOp::And, false) => self.asm.andps(d, s)?,
            (BinOp::Or, false) => self.asm.orps(d, s)?,
            (BinOp::Xor, false) => self.asm.xorps(d, s)?,
            (BinOp::AddI32, false) => self.asm.paddd(d, s)?,
            (BinOp::AndI32, false) => self.asm.pand(d, s)?,
            (BinOp::Add, true) => self.asm.addss(d, s)?,
            (BinOp::Sub, true) => self.asm.subss(d, s)?,
            (BinOp::Mul, true) => self.asm.mulss(d, s)?,
            (BinOp::Div, true) => self.asm.divss(d, s)?,
            (op, true) => return Err(no_scalar_form(op)),
        }
        Ok(())
    }

    /// FMA as multiply + add/sub through `tmp`.
    fn fma_emulated(&mut self, lanes: Lanes, op: FmaOp, dst: VReg, a: VReg, b: VReg, tmp: VReg) -> Result<()> {
        match op {
            FmaOp::Fmadd231 => {
                self.binop(lanes, BinOp::Mul, tmp, a, b)?;
                self.binop(lanes, BinOp::Add, dst, dst, tmp)
            }
            FmaOp::Fnmadd231 => {
                self.binop(lanes, BinOp::Mul, tmp, a, b)?;
                self.binop(lanes, BinOp::Sub, dst, dst, tmp)
            }
            FmaOp::Fmadd213 => {
                self.binop(lanes, BinOp::Mul, tmp, dst, a)?;
                self.binop(lanes, BinOp::Add, dst, tmp, b)
            }
        }
    }

    /// FMA with a memory operand when it can't be one instruction: the
    /// operand is loaded into `tmp` first.
    fn fma_mem_split(&mut self, lanes: Lanes, op: FmaOp, dst: VReg, a: VReg, addr: Address, tmp: VReg) -> Result<()> {
        self.load_f32(lanes, tmp, addr)?;
        if self.traits.has_fma {
            return self.fma(lanes, op, dst, a, tmp);
        }
        match op {
            FmaOp::Fmadd231 => {
                self.binop(lanes, BinOp::Mul, tmp, tmp, a)?;
                self.binop(lanes, BinOp::Add, dst, dst, tmp)
            }
            FmaOp::Fnmadd231 => {
                self.binop(lanes, BinOp::Mul, tmp, tmp, a)?;
                self.binop(lanes, BinOp::Sub, dst, dst, tmp)
            }
            FmaOp::Fmadd213 => {
                self.binop(lanes, BinOp::Mul, dst, dst, a)?;
                self.binop(lanes, BinOp::Add, dst, dst, tmp)
            }
        }
    }

    fn require_avx512(&self, what: &str) -> Result<()> {
        if self.traits.isa.is_avx512() {
            Ok(())
        } else {
            Err(KernelError::Unsupported(format!("{what} on {}", self.traits.isa)))
        }
    }
}

fn missing_scratch(what: &str) -> KernelError {
    KernelError::CompileError(format!("{what}: load-then-compute needs a scratch register"))
}

fn no_scalar_form(op: BinOp) -> KernelError {
    KernelError::CompileError(format!("{op:?} has no scalar form"))
}

/// Intel-syntax listing of `code`, one line per instruction.
pub fn disassemble(code: &[u8]) -> Vec<String> {
    let mut decoder = Decoder::with_ip(64, code, 0, DecoderOptions::NONE);
    let mut formatter = IntelFormatter::new();
    let mut instr = Instruction::default();
    let mut text = String::new();
    let mut lines = Vec::new();
    while decoder.can_decode() {
        decoder.decode_out(&mut instr);
        text.clear();
        formatter.format(&instr, &mut text);
        lines.push(format!("{:06x}  {}", instr.ip(), text));
    }
    lines
}
