//! Host ISA levels and feature detection.

use std::fmt;
use std::str::FromStr;

use crate::types::KernelError;

/// x86-64 vector ISA level a kernel is generated for.
///
/// Levels are ordered: a host that supports a level supports every level
/// below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IsaLevel {
    /// SSE4.1, 16 xmm registers, no FMA, legacy two-operand encoding.
    Sse41,
    /// AVX2 + FMA, 16 ymm registers.
    Avx2,
    /// AVX-512 F/BW/DQ/VL, 32 zmm registers.
    Avx512Core,
    /// `Avx512Core` plus native bf16 conversion (`vcvtneps2bf16`).
    Avx512CoreBf16,
}

impl IsaLevel {
    pub const ALL: [IsaLevel; 4] = [
        IsaLevel::Sse41,
        IsaLevel::Avx2,
        IsaLevel::Avx512Core,
        IsaLevel::Avx512CoreBf16,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sse41 => "sse41",
            Self::Avx2 => "avx2",
            Self::Avx512Core => "avx512_core",
            Self::Avx512CoreBf16 => "avx512_core_bf16",
        }
    }

    /// True for the AVX-512 levels.
    pub const fn is_avx512(self) -> bool {
        matches!(self, Self::Avx512Core | Self::Avx512CoreBf16)
    }

    /// True when instructions use VEX/EVEX three-operand encodings.
    pub const fn is_vex(self) -> bool {
        !matches!(self, Self::Sse41)
    }
}

impl fmt::Display for IsaLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IsaLevel {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        IsaLevel::ALL
            .into_iter()
            .find(|isa| value.eq_ignore_ascii_case(isa.name()))
            .ok_or_else(|| KernelError::InvalidIsaOverride(value.to_string()))
    }
}

/// Detect the highest supported level on this host.
///
/// Returns `None` when the host is not x86-64 or lacks SSE4.1.
#[cfg(target_arch = "x86_64")]
pub fn detect_isa_level() -> Option<IsaLevel> {
    let avx512_core = is_x86_feature_detected!("avx512f")
        && is_x86_feature_detected!("avx512bw")
        && is_x86_feature_detected!("avx512dq")
        && is_x86_feature_detected!("avx512vl");
    if avx512_core && is_x86_feature_detected!("avx512bf16") {
        Some(IsaLevel::Avx512CoreBf16)
    } else if avx512_core {
        Some(IsaLevel::Avx512Core)
    } else if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
        Some(IsaLevel::Avx2)
    } else if is_x86_feature_detected!("sse4.1") {
        Some(IsaLevel::Sse41)
    } else {
        None
    }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn detect_isa_level() -> Option<IsaLevel> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isa_ordering() {
        assert!(IsaLevel::Sse41 < IsaLevel::Avx2);
        assert!(IsaLevel::Avx2 < IsaLevel::Avx512Core);
        assert!(IsaLevel::Avx512Core < IsaLevel::Avx512CoreBf16);
    }

    #[test]
    fn test_isa_parse() {
        assert_eq!("avx2".parse::<IsaLevel>().unwrap(), IsaLevel::Avx2);
        assert_eq!(" AVX512_CORE ".parse::<IsaLevel>().unwrap(), IsaLevel::Avx512Core);
        assert!(matches!(
            "avx9".parse::<IsaLevel>(),
            Err(KernelError::InvalidIsaOverride(_))
        ));
    }

    #[test]
    fn test_isa_name_round_trip() {
        for isa in IsaLevel::ALL {
            assert_eq!(isa.to_string().parse::<IsaLevel>().unwrap(), isa);
        }
    }
}
