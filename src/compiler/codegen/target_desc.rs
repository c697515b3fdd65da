//! Target descriptor: sizing and capability facts for one {ISA, dtype} pair.
//!
//! Resolved once before emission. Every loop stride, register-pool bound
//! and instruction-shape decision in the generators reads these fields
//! instead of re-checking the ISA.

use crate::dispatch::IsaLevel;
use crate::types::{DType, KernelError, Result};

/// Vector register class used by the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecLen {
    Xmm,
    Ymm,
    Zmm,
}

impl VecLen {
    pub const fn bytes(self) -> usize {
        match self {
            Self::Xmm => 16,
            Self::Ymm => 32,
            Self::Zmm => 64,
        }
    }
}

/// How `op dst, lhs, [mem]` is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOperandForm {
    /// One instruction with a memory source operand (VEX/EVEX, no alignment
    /// requirement).
    Fused,
    /// `movups tmp, [mem]` then the register form. Legacy SSE packed memory
    /// operands fault on unaligned addresses.
    LoadThenCompute,
}

/// Registers reserved by the emulated f32 -> bf16 narrowing on AVX-512
/// without native bf16: rounding bias, lsb mask and one temporary.
pub const BF16_EMU_VREGS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsaTraits {
    pub isa: IsaLevel,
    pub dtype: DType,
    /// Register class of the main loop.
    pub vec_len: VecLen,
    /// Vector register width in bytes (16, 32, 64).
    pub vlen: usize,
    /// f32 lanes per vector, which is also the number of elements one main
    /// loop iteration consumes at any storage precision.
    pub simd_w: usize,
    /// Bytes of gate storage one main loop iteration consumes.
    pub vlen_storage: usize,
    /// Architectural vector registers (16 or 32).
    pub n_vregs: usize,
    /// Registers at the top of the file held by a type-emulation path.
    pub n_emu_vregs: usize,
    pub mem_form: MemOperandForm,
    pub has_fma: bool,
    /// `vcvtneps2bf16` is available.
    pub native_bf16: bool,
}

impl IsaTraits {
    /// Resolve sizing for `isa` with gate storage in `dtype`.
    ///
    /// bf16 storage needs AVX-512 (word-granular `vpmovdw` stores and the
    /// extra registers of the emulated rounding path).
    pub fn resolve(isa: IsaLevel, dtype: DType) -> Result<Self> {
        if dtype == DType::BF16 && !isa.is_avx512() {
            return Err(KernelError::Unsupported(format!(
                "{dtype} gate storage requires avx512_core, target is {isa}"
            )));
        }

        let (vec_len, n_vregs) = match isa {
            IsaLevel::Sse41 => (VecLen::Xmm, 16),
            IsaLevel::Avx2 => (VecLen::Ymm, 16),
            IsaLevel::Avx512Core | IsaLevel::Avx512CoreBf16 => (VecLen::Zmm, 32),
        };
        let vlen = vec_len.bytes();
        let simd_w = vlen / std::mem::size_of::<f32>();
        let native_bf16 = isa == IsaLevel::Avx512CoreBf16;
        let n_emu_vregs = if dtype == DType::BF16 && !native_bf16 {
            BF16_EMU_VREGS
        } else {
            0
        };
        let (mem_form, has_fma) = if isa.is_vex() {
            (MemOperandForm::Fused, true)
        } else {
            (MemOperandForm::LoadThenCompute, false)
        };

        Ok(IsaTraits {
            isa,
            dtype,
            vec_len,
            vlen,
            simd_w,
            vlen_storage: simd_w * dtype.size_bytes(),
            n_vregs,
            n_emu_vregs,
            mem_form,
            has_fma,
            native_bf16,
        })
    }

    /// One past the last register scratch allocation may hand out.
    #[inline]
    pub fn usable_vregs(&self) -> usize {
        self.n_vregs - self.n_emu_vregs
    }

    /// First register of the emulation block, if one is reserved.
    #[inline]
    pub fn emu_vreg_base(&self) -> Option<usize> {
        (self.n_emu_vregs > 0).then(|| self.usable_vregs())
    }

    /// Gate storage element size in bytes.
    #[inline]
    pub fn storage_size(&self) -> usize {
        self.dtype.size_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_sse41_f32() {
        let t = IsaTraits::resolve(IsaLevel::Sse41, DType::F32).unwrap();
        assert_eq!(t.vlen, 16);
        assert_eq!(t.simd_w, 4);
        assert_eq!(t.vlen_storage, 16);
        assert_eq!(t.n_vregs, 16);
        assert_eq!(t.usable_vregs(), 16);
        assert_eq!(t.mem_form, MemOperandForm::LoadThenCompute);
        assert!(!t.has_fma);
    }

    #[test]
    fn test_resolve_avx2_f32() {
        let t = IsaTraits::resolve(IsaLevel::Avx2, DType::F32).unwrap();
        assert_eq!(t.vec_len, VecLen::Ymm);
        assert_eq!(t.simd_w, 8);
        assert_eq!(t.mem_form, MemOperandForm::Fused);
        assert!(t.has_fma);
        assert_eq!(t.emu_vreg_base(), None);
    }

    #[test]
    fn test_resolve_avx512_bf16_reserves_emulation_registers() {
        let t = IsaTraits::resolve(IsaLevel::Avx512Core, DType::BF16).unwrap();
        assert_eq!(t.simd_w, 16);
        assert_eq!(t.vlen_storage, 32);
        assert_eq!(t.n_emu_vregs, BF16_EMU_VREGS);
        assert_eq!(t.usable_vregs(), 32 - BF16_EMU_VREGS);
        assert_eq!(t.emu_vreg_base(), Some(29));
    }

    #[test]
    fn test_resolve_native_bf16_reserves_nothing() {
        let t = IsaTraits::resolve(IsaLevel::Avx512CoreBf16, DType::BF16).unwrap();
        assert!(t.native_bf16);
        assert_eq!(t.usable_vregs(), 32);
    }

    #[test]
    fn test_resolve_rejects_bf16_below_avx512() {
        for isa in [IsaLevel::Sse41, IsaLevel::Avx2] {
            assert!(matches!(
                IsaTraits::resolve(isa, DType::BF16),
                Err(KernelError::Unsupported(_))
            ));
        }
    }
}
