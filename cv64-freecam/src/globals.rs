use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::warn;

use crate::frame::PatchSystem;
use crate::hook::CodeCache;
use crate::input::SharedInput;
use crate::memory::GuestMemory;

/// Host function that drops recompiled blocks covering `size` bytes at guest `addr`.
pub type InvalidateFn = unsafe extern "C" fn(addr: u32, size: u32);

lazy_static::lazy_static! {
    pub static ref MEMORY: Arc<GuestMemory> = Arc::new(GuestMemory::new());
    pub static ref INPUT: Arc<SharedInput> = Arc::new(SharedInput::new());
}

// Only the emulation thread and the input callbacks take this; neither blocks while holding it.
pub static SYSTEM: Mutex<Option<PatchSystem>> = Mutex::new(None);

static INVALIDATOR: Mutex<Option<InvalidateFn>> = Mutex::new(None);
static MISSING_INVALIDATOR_LOGGED: AtomicBool = AtomicBool::new(false);

/// Run `f` against the patch system if one has been created.
pub fn with_system<R>(f: impl FnOnce(&mut PatchSystem) -> R) -> Option<R> {
    let mut guard = SYSTEM.lock().unwrap_or_else(PoisonError::into_inner);
    guard.as_mut().map(f)
}

pub fn set_invalidator(func: Option<InvalidateFn>) {
    *INVALIDATOR.lock().unwrap_or_else(PoisonError::into_inner) = func;
    MISSING_INVALIDATOR_LOGGED.store(false, Ordering::Relaxed);
}

/// The host's code cache as registered through the C ABI.
pub struct HostCodeCache {
    func: Option<InvalidateFn>,
}

impl HostCodeCache {
    pub fn current() -> Self {
        Self {
            func: *INVALIDATOR.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

impl CodeCache for HostCodeCache {
    fn invalidate(&self, addr: u32, size: u32) {
        match self.func {
            // SAFETY: the host registered this function for exactly this purpose.
            Some(func) => unsafe { func(addr, size) },
            None => {
                if !MISSING_INVALIDATOR_LOGGED.swap(true, Ordering::Relaxed) {
                    warn!(
                        "[HOOK] No code cache invalidator registered, 0x{:08X}+{} may run stale code",
                        addr, size
                    );
                }
            }
        }
    }
}
