//! Small helpers shared across the on-disk structures.

use std::mem::size_of;
use std::slice;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current timestamp as seconds since the Unix epoch, truncated
/// to whole seconds as the spec requires.
pub fn get_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs() as u32
}

/// Integer ceiling division.
pub fn ceil_division(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

/// Reinterprets a `#[repr(C, packed)]` value as its raw byte representation,
/// for writing straight into the image file.
///
/// # Safety
/// `T` must have no padding and no invalid bit patterns (i.e. it must be
/// safe to read back from arbitrary bytes of the same size).
pub unsafe fn reinterpret<T>(val: &T) -> &[u8] {
    slice::from_raw_parts(val as *const T as *const u8, size_of::<T>())
}

/// Reinterprets a mutable `#[repr(C, packed)]` value as its raw byte
/// representation, for reading straight out of the image file.
///
/// # Safety
/// See [`reinterpret`].
pub unsafe fn reinterpret_mut<T>(val: &mut T) -> &mut [u8] {
    slice::from_raw_parts_mut(val as *mut T as *mut u8, size_of::<T>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_division_exact() {
        assert_eq!(ceil_division(10, 5), 2);
    }

    #[test]
    fn ceil_division_rounds_up() {
        assert_eq!(ceil_division(11, 5), 3);
        assert_eq!(ceil_division(1, 5), 1);
        assert_eq!(ceil_division(0, 5), 0);
    }
}
