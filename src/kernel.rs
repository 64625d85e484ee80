/*!
 * Platform Memory
 * Reserves and releases the address range behind a `SystemStore`
 */

use std::{ptr::NonNull, sync::OnceLock};

/// Cached after the first query, the OS never changes it while we run.
static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// The operating system, as far as the arena is concerned.
pub(crate) struct Kernel;

/// What a [`crate::SystemStore`] needs from the OS: one readable, writable,
/// zero-filled range up front and a way to give it back on drop.
trait PlatformMemory {
    /// Maps `len` zeroed bytes. `None` if the OS refuses.
    unsafe fn reserve(len: usize) -> Option<NonNull<u8>>;

    /// Unmaps a range previously returned by [`PlatformMemory::reserve`].
    unsafe fn unreserve(base: NonNull<u8>, len: usize);

    unsafe fn page_size() -> usize;
}

/// Granularity of every reservation, usually 4096.
#[inline]
pub(crate) fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| unsafe { Kernel::page_size() })
}

/// # Safety
///
/// `len` must be a non-zero multiple of [`page_size`].
#[inline]
pub(crate) unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
    unsafe { Kernel::reserve(len) }
}

/// # Safety
///
/// `base` and `len` must come from one successful [`reserve`] call and the
/// range must not be touched afterwards.
#[inline]
pub(crate) unsafe fn unreserve(base: NonNull<u8>, len: usize) {
    unsafe { Kernel::unreserve(base, len) }
}

#[cfg(unix)]
mod unix {
    use std::{os::raw::c_void, ptr::NonNull};

    use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_READ, PROT_WRITE};

    use super::{Kernel, PlatformMemory};

    impl PlatformMemory for Kernel {
        unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
            // Anonymous pages are zero filled and only backed once touched,
            // so reserving the whole capacity up front costs nothing.
            let flags = MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE;

            let base = unsafe { libc::mmap(std::ptr::null_mut(), len, PROT_READ | PROT_WRITE, flags, -1, 0) };

            if base == MAP_FAILED {
                return None;
            }

            NonNull::new(base.cast())
        }

        unsafe fn unreserve(base: NonNull<u8>, len: usize) {
            unsafe {
                libc::munmap(base.as_ptr().cast::<c_void>(), len);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, ptr::NonNull};

    use windows::Win32::System::{
        Memory::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE, VirtualAlloc, VirtualFree},
        SystemInformation::GetSystemInfo,
    };

    use super::{Kernel, PlatformMemory};

    impl PlatformMemory for Kernel {
        unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
            let base = unsafe { VirtualAlloc(None, len, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE) };

            NonNull::new(base.cast())
        }

        unsafe fn unreserve(base: NonNull<u8>, _len: usize) {
            // MEM_RELEASE frees the whole reservation and wants a zero size.
            let _ = unsafe { VirtualFree(base.as_ptr().cast(), 0, MEM_RELEASE) };
        }

        unsafe fn page_size() -> usize {
            let mut info = MaybeUninit::uninit();

            unsafe {
                GetSystemInfo(info.as_mut_ptr());
                info.assume_init().dwPageSize as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let size = page_size();

        assert!(size.is_power_of_two());
        assert_eq!(size, page_size());
    }

    #[test]
    fn reserved_range_is_zeroed_and_writable() {
        let len = 4 * page_size();

        unsafe {
            let base = reserve(len).expect("reservation failed");
            let bytes = std::slice::from_raw_parts_mut(base.as_ptr(), len);

            assert!(bytes.iter().all(|&b| b == 0));
            bytes[len - 1] = 0xAB;
            assert_eq!(bytes[len - 1], 0xAB);

            unreserve(base, len);
        }
    }
}
