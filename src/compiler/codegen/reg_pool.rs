//! Cyclic scratch-register pool.
//!
//! Temporaries are handed out round-robin from a fixed index range and wrap
//! around. A register may be handed out again once its previous value has
//! been consumed; callers keep the number of simultaneously pending
//! temporaries below the pool size.

use crate::types::{KernelError, Result};

/// Virtual vector register, an index into the architectural register file.
/// The emitter maps it to xmm/ymm/zmm of the same number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg(pub u8);

impl VReg {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct TmpPool {
    begin: u8,
    end: u8,
    next: u8,
}

impl TmpPool {
    /// Pool over registers `[begin, end)`; needs at least `min_len` of them.
    pub fn new(begin: usize, end: usize, min_len: usize) -> Result<Self> {
        if end > 32 || end < begin || end - begin < min_len {
            return Err(KernelError::Unsupported(format!(
                "scratch register range [{begin}, {end}) holds fewer than {min_len} registers"
            )));
        }
        Ok(TmpPool {
            begin: begin as u8,
            end: end as u8,
            next: begin as u8,
        })
    }

    /// Next register in round-robin order.
    pub fn next(&mut self) -> VReg {
        let reg = VReg(self.next);
        self.next += 1;
        if self.next == self.end {
            self.next = self.begin;
        }
        reg
    }

    pub fn contains(&self, reg: VReg) -> bool {
        (self.begin..self.end).contains(&reg.0)
    }
}
