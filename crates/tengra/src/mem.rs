//! The audited raw-memory primitives.
//!
//! These two functions are the only places where bytes cross into or out
//! of engine-allocated buffers; everything else in the crate operates on
//! typed slices. Lengths are validated before any copy happens.

use crate::error::Result;
use crate::status::Status;

/// Copies `src` into a native buffer of capacity `dst_len` bytes.
///
/// Rejects the copy when the source would overrun the destination.
pub(crate) fn copy_into(src: &[u8], dst: *mut u8, dst_len: usize) -> Result<()> {
    if src.len() > dst_len {
        return Err(Status::invalid_argument(format!(
            "source length {} exceeds destination capacity {}",
            src.len(),
            dst_len
        ))
        .into());
    }
    if src.is_empty() {
        return Ok(());
    }
    if dst.is_null() {
        return Err(Status::internal("engine returned a null buffer pointer").into());
    }
    unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len()) };
    Ok(())
}

/// Borrows a native buffer as a byte slice.
///
/// # Safety
/// `ptr` must point to at least `len` readable bytes that stay valid and
/// unmodified for the returned lifetime.
pub(crate) unsafe fn borrow_bytes<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overrun() {
        let mut dst = [0u8; 2];
        let err = copy_into(&[1, 2, 3], dst.as_mut_ptr(), dst.len()).unwrap_err();
        assert_eq!(err.code(), Some(crate::Code::InvalidArgument));
    }

    #[test]
    fn copies_up_to_capacity() {
        let mut dst = [0u8; 4];
        copy_into(&[1, 2, 3], dst.as_mut_ptr(), dst.len()).unwrap();
        assert_eq!(dst, [1, 2, 3, 0]);
    }

    #[test]
    fn empty_source_ignores_destination() {
        copy_into(&[], std::ptr::null_mut(), 0).unwrap();
    }
}
