//! JitKernel: mmap'd executable code for one generated kernel.
//!
//! The assembled bytes (code plus constant tables) are copied into an
//! anonymous mapping which is then flipped to read+execute. The mapping is
//! released when the kernel is dropped.

use crate::types::{KernelError, Result};

/// Signature of the LSTM backward post-GEMM kernel.
///
/// ```text
/// fn(ws_gates, scratch_gates,
///    diff_states_t_lp1, diff_states_tp1_l,
///    diff_c_states_t_l (out), diff_c_states_tp1_l,
///    c_states_tm1_l, c_states_t_l, weights_peephole)
/// ```
///
/// Gate buffers are in the kernel's storage precision; everything else is
/// f32. `weights_peephole` is ignored by kernels built without peephole.
pub type LstmBwdKernelFn = unsafe extern "sysv64" fn(
    *const u8,  // ws_gates
    *mut u8,    // scratch_gates
    *const f32, // diff_states_t_lp1
    *const f32, // diff_states_tp1_l
    *mut f32,   // diff_c_states_t_l
    *const f32, // diff_c_states_tp1_l
    *const f32, // c_states_tm1_l
    *const f32, // c_states_t_l
    *const f32, // weights_peephole
);

/// A generated kernel in executable memory.
pub struct JitKernel {
    code: ExecutableBuffer,
    /// Bytes of code and tables actually emitted (the mapping is page-rounded).
    code_size: usize,
}

impl JitKernel {
    /// Map `code` as executable.
    pub fn from_code(code: &[u8]) -> Result<Self> {
        if code.is_empty() {
            return Err(KernelError::CompileError("empty kernel".into()));
        }
        Ok(JitKernel {
            code: ExecutableBuffer::new(code)?,
            code_size: code.len(),
        })
    }

    /// Typed entry point.
    ///
    /// # Safety
    /// Every pointer passed to the returned function must be valid for the
    /// `dhc` elements the kernel was generated for (gate buffers: `4 * dhc`,
    /// peephole weights: `3 * dhc` when enabled).
    #[inline]
    pub unsafe fn as_fn(&self) -> LstmBwdKernelFn {
        std::mem::transmute::<*const u8, LstmBwdKernelFn>(self.code.as_ptr())
    }

    /// Size of the emitted code and tables in bytes.
    pub fn code_size(&self) -> usize {
        self.code_size
    }

    /// Size of the executable mapping (page-rounded).
    pub fn mapped_size(&self) -> usize {
        self.code.len
    }
}

impl std::fmt::Debug for JitKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitKernel")
            .field("code_size", &self.code_size)
            .finish()
    }
}

/// An executable memory buffer backed by mmap.
pub(crate) struct ExecutableBuffer {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: ExecutableBuffer owns its mmap'd memory exclusively. The pointer is
// never aliased and the buffer is immutable (PROT_READ|PROT_EXEC) after construction.
unsafe impl Send for ExecutableBuffer {}
unsafe impl Sync for ExecutableBuffer {}

impl ExecutableBuffer {
    /// Allocate an executable memory region and copy code into it.
    pub(crate) fn new(code: &[u8]) -> Result<Self> {
        if code.is_empty() {
            return Ok(ExecutableBuffer {
                ptr: std::ptr::null_mut(),
                len: 0,
            });
        }

        let page_size = page_size();
        let len = (code.len() + page_size - 1) & !(page_size - 1);

        // SAFETY: anonymous private mapping, no fd; MAP_FAILED is checked.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(KernelError::OutOfMemory(format!(
                "mmap of {len} bytes failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let ptr = ptr as *mut u8;

        // SAFETY: `ptr` is a fresh writable mapping of at least `code.len()` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), ptr, code.len());
        }

        // SAFETY: `ptr`/`len` describe the mapping created above.
        let ret = unsafe { libc::mprotect(ptr as *mut _, len, libc::PROT_READ | libc::PROT_EXEC) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            unsafe {
                libc::munmap(ptr as *mut _, len);
            }
            return Err(KernelError::OutOfMemory(format!(
                "mprotect to read+exec failed: {err}"
            )));
        }

        Ok(ExecutableBuffer { ptr, len })
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.ptr
    }
}

impl Drop for ExecutableBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() && self.len > 0 {
            unsafe {
                libc::munmap(self.ptr as *mut _, self.len);
            }
        }
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
