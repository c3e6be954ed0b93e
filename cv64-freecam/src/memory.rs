//! Bounds-checked view over the emulated console's RDRAM.
//!
//! The emulator core hands us a raw pointer and a size when a ROM is opened and
//! takes it away again on close, possibly from another thread than the one that
//! polls memory every frame. The pointer/size pair is published through a small
//! seqlock so a reader never pairs an old pointer with a new size.
//!
//! RDRAM is kept by the core as native-endian 32-bit words. Word and float
//! accesses therefore go straight through, while byte and halfword accesses flip
//! their lane inside the word (`^ 3` and `^ 2`). Nothing outside this module is
//! allowed to do that arithmetic itself.

use std::sync::atomic::{fence, AtomicPtr, AtomicU32, AtomicUsize, Ordering};

use log::{info, warn};
use nalgebra_glm as glm;
use thiserror::Error;

/// Stock RDRAM size without the expansion pak.
pub const RDRAM_BASE_SIZE: usize = 0x40_0000;
/// RDRAM size with the expansion pak; the injected stub lives near the top of it.
pub const RDRAM_EXPANDED_SIZE: usize = 0x80_0000;

const PHYSICAL_MASK: u32 = 0x1FFF_FFFF;
const SEGMENT_MASK: u32 = 0xE000_0000;
const KSEG0: u32 = 0x8000_0000;
const KSEG1: u32 = 0xA000_0000;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("guest memory is not attached")]
    Detached,
    #[error("guest access out of bounds: {size} bytes at 0x{addr:08X}")]
    OutOfBounds { addr: u32, size: usize },
}

/// Fallible access to guest memory, addressed with guest virtual addresses.
///
/// Every call may fail: the buffer can disappear between two frames, and an
/// address table entry can be wrong for an unexpected ROM revision.
pub trait GuestBus {
    fn read_u8(&self, addr: u32) -> Result<u8, MemoryError>;
    fn read_u16(&self, addr: u32) -> Result<u16, MemoryError>;
    fn read_u32(&self, addr: u32) -> Result<u32, MemoryError>;

    fn write_u8(&self, addr: u32, value: u8) -> Result<(), MemoryError>;
    fn write_u16(&self, addr: u32, value: u16) -> Result<(), MemoryError>;
    fn write_u32(&self, addr: u32, value: u32) -> Result<(), MemoryError>;

    /// Whether `width` bytes starting at `addr` are currently addressable.
    fn contains(&self, addr: u32, width: usize) -> bool;

    // Floats are moved as raw bits, never converted numerically, so NaN payloads
    // and negative zero survive a round trip.
    fn read_f32(&self, addr: u32) -> Result<f32, MemoryError> {
        self.read_u32(addr).map(f32::from_bits)
    }

    fn write_f32(&self, addr: u32, value: f32) -> Result<(), MemoryError> {
        self.write_u32(addr, value.to_bits())
    }

    fn read_vec3(&self, addr: u32) -> Result<glm::Vec3, MemoryError> {
        Ok(glm::vec3(
            self.read_f32(addr)?,
            self.read_f32(addr.wrapping_add(4))?,
            self.read_f32(addr.wrapping_add(8))?,
        ))
    }
}

/// Returns true for KSEG0/KSEG1 addresses, the only ones game pointers use.
pub fn is_direct_mapped(addr: u32) -> bool {
    matches!(addr & SEGMENT_MASK, KSEG0 | KSEG1)
}

#[derive(Clone, Copy)]
struct Snapshot {
    ptr: *mut u8,
    size: usize,
}

/// Non-owning handle to the emulator's RDRAM buffer.
///
/// Single writer (the emulator integration layer), any number of readers.
pub struct GuestMemory {
    seq: AtomicU32,
    ptr: AtomicPtr<u8>,
    size: AtomicUsize,
    attachments: AtomicU32,
}

impl Default for GuestMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestMemory {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            ptr: AtomicPtr::new(std::ptr::null_mut()),
            size: AtomicUsize::new(0),
            attachments: AtomicU32::new(0),
        }
    }

    /// Attach (or, with a null pointer or zero size, detach) the RDRAM buffer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `size` bytes that stay valid for reads and writes
    /// until the next `set_buffer`/`clear_buffer` call.
    pub unsafe fn set_buffer(&self, ptr: *mut u8, size: usize) {
        if ptr.is_null() || size == 0 {
            self.clear_buffer();
            return;
        }

        if !probe_buffer(ptr, size) {
            warn!("[MEMORY] Buffer at {:p} ({} bytes) failed the access probe, treating as absent", ptr, size);
            self.publish(std::ptr::null_mut(), 0);
            return;
        }

        self.publish(ptr, size);
        self.attachments.fetch_add(1, Ordering::Release);
        info!("[MEMORY] Guest RAM attached: 0x{:X} bytes", size);
        if size < RDRAM_EXPANDED_SIZE {
            warn!(
                "[MEMORY] Guest RAM is only 0x{:X} bytes; features above 0x{:X} (camera hook) will stay inactive",
                size, RDRAM_BASE_SIZE
            );
        }
    }

    pub fn clear_buffer(&self) {
        let was_attached = self.is_initialized();
        self.publish(std::ptr::null_mut(), 0);
        if was_attached {
            info!("[MEMORY] Guest RAM detached");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Bumped on every successful attach. A change means the RDRAM behind the
    /// handle is a fresh one and anything patched into the old buffer is gone.
    pub fn generation(&self) -> u32 {
        self.attachments.load(Ordering::Acquire)
    }

    /// Attached size in bytes, 0 when detached.
    pub fn size(&self) -> usize {
        self.snapshot().map_or(0, |s| s.size)
    }

    fn publish(&self, ptr: *mut u8, size: usize) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.ptr.store(ptr, Ordering::Relaxed);
        self.size.store(size, Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    fn snapshot(&self) -> Option<Snapshot> {
        let before = self.seq.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }
        let ptr = self.ptr.load(Ordering::Relaxed);
        let size = self.size.load(Ordering::Relaxed);
        fence(Ordering::Acquire);
        if self.seq.load(Ordering::Relaxed) != before || ptr.is_null() || size == 0 {
            return None;
        }
        Some(Snapshot { ptr, size })
    }

    /// Host offset of an access, with the byte-lane swap applied for sub-word widths.
    fn locate(&self, addr: u32, width: usize) -> Result<(Snapshot, usize), MemoryError> {
        let snap = self.snapshot().ok_or(MemoryError::Detached)?;
        let lane = match width {
            1 => 3,
            2 => 2,
            _ => 0,
        };
        let offset = (addr & PHYSICAL_MASK) as usize ^ lane;
        match offset.checked_add(width) {
            Some(end) if is_direct_mapped(addr) && end <= snap.size => Ok((snap, offset)),
            _ => Err(MemoryError::OutOfBounds { addr, size: width }),
        }
    }

    fn load<T: Copy>(&self, addr: u32) -> Result<T, MemoryError> {
        let (snap, offset) = self.locate(addr, std::mem::size_of::<T>())?;
        // SAFETY: `locate` checked offset + size_of::<T>() against the attached size.
        Ok(unsafe { snap.ptr.add(offset).cast::<T>().read_unaligned() })
    }

    fn store<T: Copy>(&self, addr: u32, value: T) -> Result<(), MemoryError> {
        let (snap, offset) = self.locate(addr, std::mem::size_of::<T>())?;
        // SAFETY: as in `load`.
        unsafe { snap.ptr.add(offset).cast::<T>().write_unaligned(value) };
        Ok(())
    }
}

impl GuestBus for GuestMemory {
    fn read_u8(&self, addr: u32) -> Result<u8, MemoryError> {
        self.load(addr)
    }

    fn read_u16(&self, addr: u32) -> Result<u16, MemoryError> {
        self.load(addr)
    }

    fn read_u32(&self, addr: u32) -> Result<u32, MemoryError> {
        self.load(addr)
    }

    fn write_u8(&self, addr: u32, value: u8) -> Result<(), MemoryError> {
        self.store(addr, value)
    }

    fn write_u16(&self, addr: u32, value: u16) -> Result<(), MemoryError> {
        self.store(addr, value)
    }

    fn write_u32(&self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.store(addr, value)
    }

    fn contains(&self, addr: u32, width: usize) -> bool {
        self.locate(addr, width).is_ok()
    }
}

#[cfg(windows)]
unsafe fn probe_buffer(ptr: *mut u8, size: usize) -> bool {
    is_page_writable(ptr as usize) && is_page_writable(ptr as usize + size - 1)
}

#[cfg(windows)]
unsafe fn is_page_writable(addr: usize) -> bool {
    use winapi::um::memoryapi::VirtualQuery;
    use winapi::um::winnt::{
        MEMORY_BASIC_INFORMATION, MEM_COMMIT, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY,
        PAGE_GUARD, PAGE_READWRITE, PAGE_WRITECOPY,
    };

    let mut mbi: MEMORY_BASIC_INFORMATION = std::mem::zeroed();
    let result = VirtualQuery(
        addr as *const _,
        &mut mbi,
        std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
    );
    if result == 0 || mbi.State != MEM_COMMIT || mbi.Protect & PAGE_GUARD != 0 {
        return false;
    }
    matches!(
        mbi.Protect & 0xFF,
        PAGE_READWRITE | PAGE_WRITECOPY | PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY
    )
}

// No cheap page query here; trust the size the core reports.
#[cfg(not(windows))]
unsafe fn probe_buffer(_ptr: *mut u8, _size: usize) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached(ram: &mut [u8]) -> GuestMemory {
        let mem = GuestMemory::new();
        unsafe { mem.set_buffer(ram.as_mut_ptr(), ram.len()) };
        mem
    }

    #[test]
    fn detached_reads_default_and_writes_fail() {
        let mem = GuestMemory::new();
        assert!(!mem.is_initialized());
        assert_eq!(mem.read_u32(0x8038_9C3E).unwrap_or_default(), 0);
        assert_eq!(mem.read_u32(0x8038_9C3E), Err(MemoryError::Detached));
        assert!(mem.write_u16(0x8038_9C3E, 100).is_err());
    }

    #[test]
    fn generation_counts_successful_attaches() {
        let mut ram = vec![0u8; 0x1000];
        let mem = GuestMemory::new();
        assert_eq!(mem.generation(), 0);
        unsafe { mem.set_buffer(ram.as_mut_ptr(), ram.len()) };
        assert_eq!(mem.generation(), 1);
        mem.clear_buffer();
        assert_eq!(mem.generation(), 1);
        unsafe { mem.set_buffer(std::ptr::null_mut(), 0) };
        assert_eq!(mem.generation(), 1);
        unsafe { mem.set_buffer(ram.as_mut_ptr(), ram.len()) };
        assert_eq!(mem.generation(), 2);
    }

    #[test]
    fn out_of_bounds_never_touches_memory() {
        let mut ram = vec![0xAAu8; 0x110];
        let mem = GuestMemory::new();
        unsafe { mem.set_buffer(ram.as_mut_ptr(), 0x100) };

        assert!(mem.write_u32(0x8000_00FC, 0x1234_5678).is_ok());
        assert!(matches!(
            mem.write_u32(0x8000_00FE, 0xFFFF_FFFF),
            Err(MemoryError::OutOfBounds { .. })
        ));
        assert!(mem.write_u32(0x8000_0100, 0).is_err());
        assert!(mem.write_u8(0x8000_0100, 0).is_err());
        assert_eq!(mem.read_u32(0x8000_0200).unwrap_or_default(), 0);
        assert!(mem.read_f32(0x8000_0100).is_err());
        assert!(ram[0x100..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn word_and_float_round_trip_preserve_bits() {
        let mut ram = vec![0u8; 0x1000];
        let mem = attached(&mut ram);

        mem.write_u32(0x8000_0010, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read_u32(0x8000_0010), Ok(0xDEAD_BEEF));

        let quiet_nan = f32::from_bits(0x7FC0_1234);
        mem.write_f32(0x8000_0020, quiet_nan).unwrap();
        assert_eq!(mem.read_f32(0x8000_0020).unwrap().to_bits(), 0x7FC0_1234);

        mem.write_f32(0x8000_0024, -0.0).unwrap();
        assert_eq!(mem.read_f32(0x8000_0024).unwrap().to_bits(), 0x8000_0000);
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn sub_word_accesses_see_big_endian_lanes() {
        let mut ram = vec![0u8; 0x100];
        let mem = attached(&mut ram);

        mem.write_u32(0x8000_0040, 0x1122_3344).unwrap();
        assert_eq!(mem.read_u8(0x8000_0040), Ok(0x11));
        assert_eq!(mem.read_u8(0x8000_0043), Ok(0x44));
        assert_eq!(mem.read_u16(0x8000_0040), Ok(0x1122));
        assert_eq!(mem.read_u16(0x8000_0042), Ok(0x3344));

        mem.write_u8(0x8000_0041, 0xAB).unwrap();
        assert_eq!(mem.read_u32(0x8000_0040), Ok(0x11AB_3344));
    }

    #[test]
    fn kseg1_mirrors_kseg0_and_other_segments_are_rejected() {
        let mut ram = vec![0u8; 0x100];
        let mem = attached(&mut ram);

        mem.write_u32(0xA000_0010, 7).unwrap();
        assert_eq!(mem.read_u32(0x8000_0010), Ok(7));
        assert!(mem.read_u32(0x0000_0010).is_err());
        assert!(!mem.contains(0xC000_0010, 4));
    }

    #[test]
    fn health_halfword_round_trips_in_expanded_ram() {
        let mut ram = vec![0u8; RDRAM_EXPANDED_SIZE];
        let mem = attached(&mut ram);

        mem.write_u16(0x8038_9C3E, 100).unwrap();
        assert_eq!(mem.read_u16(0x8038_9C3E), Ok(100));
        assert_eq!(mem.size(), RDRAM_EXPANDED_SIZE);
    }

    #[test]
    fn detach_makes_later_accesses_fail() {
        let mut ram = vec![0u8; 0x100];
        let mem = attached(&mut ram);
        assert!(mem.is_initialized());

        mem.clear_buffer();
        assert!(!mem.is_initialized());
        assert_eq!(mem.size(), 0);
        assert!(mem.read_u8(0x8000_0000).is_err());

        unsafe { mem.set_buffer(std::ptr::null_mut(), 0x100) };
        assert!(!mem.is_initialized());
    }
}
