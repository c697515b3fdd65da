//! ISA selection for kernel generation.
//!
//! The host level is detected once and cached. `RNN_JIT_MAX_ISA` caps it,
//! the same way a deployment pins a lower ISA to reproduce results across
//! machines.

pub mod device_profile;

pub use device_profile::{detect_isa_level, IsaLevel};

use std::env;
use std::sync::OnceLock;

use crate::types::{KernelError, Result};

/// Environment variable capping the ISA used for generation.
pub const MAX_ISA_ENV: &str = "RNN_JIT_MAX_ISA";

static HOST_ISA: OnceLock<Option<IsaLevel>> = OnceLock::new();

/// Highest ISA level supported by the host (cached for process lifetime).
pub fn host_isa_level() -> Option<IsaLevel> {
    *HOST_ISA.get_or_init(detect_isa_level)
}

/// Parse an `RNN_JIT_MAX_ISA` value.
pub fn parse_max_isa(value: &str) -> Result<IsaLevel> {
    value.parse()
}

/// Apply an optional cap to a detected level.
pub fn cap_isa_level(detected: IsaLevel, cap: Option<IsaLevel>) -> IsaLevel {
    match cap {
        Some(cap) => detected.min(cap),
        None => detected,
    }
}

/// Fails unless a host at `host` can execute code generated for `isa`.
pub fn ensure_host_supports(isa: IsaLevel, host: Option<IsaLevel>) -> Result<()> {
    match host {
        Some(host) if isa <= host => Ok(()),
        Some(host) => Err(KernelError::Unsupported(format!(
            "{isa} kernels cannot run on a {host} host"
        ))),
        None => Err(KernelError::Unsupported(format!(
            "{isa} kernels need an x86-64 host with a supported vector ISA"
        ))),
    }
}

/// ISA level kernels should target on this host: the detected level,
/// lowered by `RNN_JIT_MAX_ISA` when set.
pub fn effective_isa_level() -> Result<IsaLevel> {
    let detected = host_isa_level().ok_or_else(|| {
        KernelError::Unsupported("host has no supported x86-64 vector ISA".into())
    })?;
    let cap = match env::var(MAX_ISA_ENV) {
        Ok(value) => Some(parse_max_isa(&value)?),
        Err(_) => None,
    };
    let isa = cap_isa_level(detected, cap);
    if isa != detected {
        log::debug!("{MAX_ISA_ENV} caps ISA {detected} -> {isa}");
    }
    Ok(isa)
}
