use std::fmt::Debug;

use half::bf16;

use crate::types::DType;

/// Element type of the gate buffers (forward gates and scratch gates).
///
/// Values are widened to f32 before any arithmetic and narrowed back on
/// store, so the trait only needs the two conversions.
pub trait StorageElement: Debug + Clone + Copy + Send + Sync + Default + 'static {
    const DTYPE: DType;

    fn from_f32(v: f32) -> Self;
    fn to_f32(self) -> f32;
}

impl StorageElement for f32 {
    const DTYPE: DType = DType::F32;

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        v
    }

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }
}

impl StorageElement for bf16 {
    const DTYPE: DType = DType::BF16;

    /// Round-to-nearest-even, the same rounding the generated kernels use.
    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        bf16::from_f32(v)
    }

    #[inline(always)]
    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_tags() {
        assert_eq!(<f32 as StorageElement>::DTYPE, DType::F32);
        assert_eq!(<bf16 as StorageElement>::DTYPE, DType::BF16);
        assert_eq!(DType::BF16.size_bytes(), std::mem::size_of::<bf16>());
    }

    #[test]
    fn test_bf16_round_trip_exact_values() {
        for v in [0.0f32, 1.0, -2.5, 0.125, 256.0] {
            assert_eq!(<bf16 as StorageElement>::from_f32(v).to_f32(), v);
        }
    }
}
