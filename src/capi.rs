use std::os::raw::c_uchar;
use std::ptr;

use crate::config::ExtractorConfig;
use crate::extractor::{StreamFrameExtractor, ValidatedPayload};
use crate::validation::TieredValidator;

/// Opaque handle for StreamFrameExtractor plus the last emitted payload
/// not yet copied out by the caller.
pub struct HarvesterHandle {
    extractor: StreamFrameExtractor,
    pending: Option<ValidatedPayload>,
}

/// Create a JPEG extractor (FF D8 / FF D9 markers, length + structure check).
/// The caller must free this with harvester_destroy.
#[unsafe(no_mangle)]
pub extern "C" fn harvester_create_jpeg() -> *mut HarvesterHandle {
    Box::into_raw(Box::new(HarvesterHandle {
        extractor: StreamFrameExtractor::jpeg(),
        pending: None,
    }))
}

/// Create an extractor with custom markers and length-only validation.
/// Returns null if a marker pointer is null or a marker is empty.
#[unsafe(no_mangle)]
pub extern "C" fn harvester_create(
    start: *const c_uchar,
    start_len: usize,
    end: *const c_uchar,
    end_len: usize,
    min_payload_len: usize,
) -> *mut HarvesterHandle {
    if start.is_null() || end.is_null() {
        return ptr::null_mut();
    }
    let start = unsafe { std::slice::from_raw_parts(start, start_len) };
    let end = unsafe { std::slice::from_raw_parts(end, end_len) };

    match ExtractorConfig::new(start, end, min_payload_len) {
        Ok(config) => Box::into_raw(Box::new(HarvesterHandle {
            extractor: StreamFrameExtractor::new(
                config,
                TieredValidator::length_only(min_payload_len),
            ),
            pending: None,
        })),
        Err(_) => ptr::null_mut(),
    }
}

/// Destroy an extractor handle. Any buffered partial frame is discarded.
#[unsafe(no_mangle)]
pub extern "C" fn harvester_destroy(handle: *mut HarvesterHandle) {
    if !handle.is_null() {
        unsafe {
            drop(Box::from_raw(handle));
        }
    }
}

/// Append data and scan for the next frame.
/// A zero-length call (data may be null) drains frames already buffered.
/// Returns the length of the newly emitted payload (>0), 0 if no frame is
/// ready, -1 on invalid arguments, -6 if a previous payload was never taken.
#[unsafe(no_mangle)]
pub extern "C" fn harvester_ingest(
    handle: *mut HarvesterHandle,
    data: *const c_uchar,
    len: usize,
) -> i64 {
    if handle.is_null() || (data.is_null() && len > 0) {
        return -1;
    }
    let h = unsafe { &mut *handle };
    if h.pending.is_some() {
        return -6;
    }
    let chunk: &[u8] = if len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }
    };

    match h.extractor.ingest(chunk) {
        Some(payload) => {
            let n = payload.len() as i64;
            h.pending = Some(payload);
            n
        }
        None => 0,
    }
}

/// Copy the pending payload into the caller's buffer.
/// Returns 1 when copied (pending slot cleared), 0 if nothing is pending,
/// -1 on invalid arguments, -2 if the buffer is too small (payload kept).
#[unsafe(no_mangle)]
pub extern "C" fn harvester_take(
    handle: *mut HarvesterHandle,
    out_buf: *mut c_uchar,
    out_max_len: usize,
    out_written: *mut usize,
) -> i32 {
    if handle.is_null() || out_buf.is_null() || out_written.is_null() {
        return -1;
    }
    let h = unsafe { &mut *handle };

    let Some(payload) = h.pending.as_ref() else {
        return 0;
    };
    if payload.len() > out_max_len {
        return -2;
    }
    unsafe {
        ptr::copy_nonoverlapping(payload.as_slice().as_ptr(), out_buf, payload.len());
        *out_written = payload.len();
    }
    h.pending = None;
    1
}

/// Number of bytes currently held in the accumulation buffer.
#[unsafe(no_mangle)]
pub extern "C" fn harvester_buffered_len(handle: *const HarvesterHandle) -> usize {
    if handle.is_null() {
        return 0;
    }
    unsafe { (*handle).extractor.buffered_len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_api_roundtrip() {
        let start = b"<<";
        let end = b">>";
        let handle = harvester_create(start.as_ptr(), 2, end.as_ptr(), 2, 4);
        assert!(!handle.is_null());

        let stream = b"..<<payload>>..<<next>>";
        let n = harvester_ingest(handle, stream.as_ptr(), stream.len());
        assert_eq!(n, 11);

        // pending payload blocks further ingest until taken
        assert_eq!(harvester_ingest(handle, ptr::null(), 0), -6);

        let mut small = [0u8; 4];
        let mut written = 0usize;
        assert_eq!(harvester_take(handle, small.as_mut_ptr(), small.len(), &mut written), -2);

        let mut out = [0u8; 64];
        assert_eq!(harvester_take(handle, out.as_mut_ptr(), out.len(), &mut written), 1);
        assert_eq!(&out[..written], b"<<payload>>");

        assert_eq!(harvester_ingest(handle, ptr::null(), 0), 8);
        assert_eq!(harvester_take(handle, out.as_mut_ptr(), out.len(), &mut written), 1);
        assert_eq!(&out[..written], b"<<next>>");
        assert_eq!(harvester_take(handle, out.as_mut_ptr(), out.len(), &mut written), 0);
        assert_eq!(harvester_buffered_len(handle), 0);

        harvester_destroy(handle);
    }

    #[test]
    fn test_c_api_rejects_bad_arguments() {
        let end = b">>";
        assert!(harvester_create(ptr::null(), 0, end.as_ptr(), 2, 4).is_null());
        assert!(harvester_create(end.as_ptr(), 0, end.as_ptr(), 2, 4).is_null());
        assert_eq!(harvester_ingest(ptr::null_mut(), ptr::null(), 0), -1);

        let handle = harvester_create_jpeg();
        assert_eq!(harvester_ingest(handle, ptr::null(), 5), -1);
        harvester_destroy(handle);
    }
}
