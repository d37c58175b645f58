use std::panic;

use crate::config::ConvConfig;
use crate::event::Event;
use crate::strategy::{self, EventConvolver, Strategy};

/// Opaque convolver handle handed to C callers.
pub struct FfiConvolver {
    inner: Box<dyn EventConvolver>,
}

/// Creates a new convolver. `exact` selects the per-event patch strategy;
/// otherwise frames are smoothed when requested.
///
/// Returns a null pointer if any parameter is invalid (zero or oversized
/// dimensions, even kernel size, non-positive `alpha`, `sigma`, or
/// `tick_seconds`, zero `max_stamp`).
#[no_mangle]
pub extern "C" fn econv_create(
    width: u32,
    height: u32,
    alpha: f64,
    kernel_size: u32,
    sigma: f64,
    max_stamp: u32,
    tick_seconds: f64,
    exact: bool,
) -> *mut FfiConvolver {
    let result = panic::catch_unwind(|| {
        let config = ConvConfig::new(width, height)
            .with_alpha(alpha)
            .with_kernel(kernel_size as usize, sigma)
            .with_clock(max_stamp, tick_seconds)
            .with_strategy(if exact {
                Strategy::Exact
            } else {
                Strategy::Approximate
            });
        strategy::build(&config).map(|inner| Box::new(FfiConvolver { inner }))
    });
    match result {
        Ok(Ok(conv)) => Box::into_raw(conv),
        _ => std::ptr::null_mut(),
    }
}

/// Ingests `len` events in order. Returns the number of events applied
/// (events outside the frame are skipped).
///
/// # Safety
///
/// - `conv` must be a valid, non-null pointer returned by `econv_create`.
/// - `events` must point to `len` initialized `Event`s whose `polarity` byte is 0 or 1,
///   or be null when `len` is 0.
/// - `conv` must not be used concurrently from multiple threads.
#[no_mangle]
pub unsafe extern "C" fn econv_ingest(
    conv: *mut FfiConvolver,
    events: *const Event,
    len: usize,
) -> usize {
    if conv.is_null() || (events.is_null() && len > 0) {
        return 0;
    }
    let conv = &mut *conv;
    let batch: &[Event] = if len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(events, len)
    };
    panic::catch_unwind(panic::AssertUnwindSafe(|| conv.inner.ingest(batch).applied)).unwrap_or(0)
}

/// Global time of the last ingested event in seconds, or 0 for null.
///
/// # Safety
///
/// - `conv` must be a valid pointer returned by `econv_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn econv_global_time(conv: *const FfiConvolver) -> f64 {
    if conv.is_null() {
        return 0.0;
    }
    (*conv).inner.global_time()
}

/// Returns a heap-allocated copy of the current frame (row-major f64) and
/// writes its dimensions. The caller must free it with `econv_free_frame`.
///
/// # Safety
///
/// - `conv` must be a valid, non-null pointer returned by `econv_create`.
/// - `out_width` and `out_height` must be valid, non-null pointers.
#[no_mangle]
pub unsafe extern "C" fn econv_get_frame(
    conv: *const FfiConvolver,
    out_width: *mut usize,
    out_height: *mut usize,
) -> *mut f64 {
    if conv.is_null() || out_width.is_null() || out_height.is_null() {
        return std::ptr::null_mut();
    }
    let conv = &*conv;
    let frame = match panic::catch_unwind(panic::AssertUnwindSafe(|| conv.inner.current_frame())) {
        Ok(frame) => frame,
        Err(_) => return std::ptr::null_mut(),
    };
    *out_width = frame.width();
    *out_height = frame.height();
    let data = frame.data().to_vec().into_boxed_slice();
    Box::into_raw(data) as *mut f64
}

/// Free a frame buffer allocated by `econv_get_frame`.
///
/// # Safety
///
/// - `ptr` must be a pointer returned by `econv_get_frame`, or null.
/// - `len` must be `width * height` as reported by that call.
#[no_mangle]
pub unsafe extern "C" fn econv_free_frame(ptr: *mut f64, len: usize) {
    if !ptr.is_null() && len > 0 {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)));
    }
}

/// # Safety
///
/// - `conv` must be a valid pointer returned by `econv_create`, or null.
/// - After this call, `conv` is invalid and must not be used again.
#[no_mangle]
pub unsafe extern "C" fn econv_destroy(conv: *mut FfiConvolver) {
    if !conv.is_null() {
        drop(Box::from_raw(conv));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_invalid_returns_null() {
        assert!(econv_create(0, 10, 1.0, 3, 1.0, 1000, 1e-3, true).is_null());
        assert!(econv_create(10, 10, 1.0, 4, 1.0, 1000, 1e-3, true).is_null());
        assert!(econv_create(10, 10, -1.0, 3, 1.0, 1000, 1e-3, false).is_null());
    }

    #[test]
    fn test_null_safety() {
        unsafe {
            assert_eq!(econv_ingest(std::ptr::null_mut(), std::ptr::null(), 0), 0);
            assert_eq!(econv_global_time(std::ptr::null()), 0.0);
            let (mut w, mut h) = (0usize, 0usize);
            assert!(econv_get_frame(std::ptr::null(), &mut w, &mut h).is_null());
            econv_free_frame(std::ptr::null_mut(), 0);
            econv_destroy(std::ptr::null_mut());
        }
    }
}
