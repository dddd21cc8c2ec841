//! C bindings for AetherBus
//!
//! Provides a raw C API for publishing to and consuming from a bus
//! segment through opaque handles.

use crate::frame::topic_hash;
use crate::reader::BusReader;
use crate::writer::{BusConfig, BusWriter};
use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;
use std::slice;

// Opaque handles
pub struct AetherWriterHandle(BusWriter);
pub struct AetherReaderHandle(BusReader);

/// Create the bus segment (or attach to an existing one) as the writer
///
/// Pass `segment_size = 0` for the default 16 MiB segment. Returns a
/// null pointer on failure.
///
/// # Safety
/// `name` must be a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn aether_writer_create(
    name: *const c_char,
    segment_size: usize,
) -> *mut AetherWriterHandle {
    if name.is_null() {
        return ptr::null_mut();
    }

    let c_str = CStr::from_ptr(name);
    let str_slice = match c_str.to_str() {
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };

    let config = if segment_size == 0 {
        BusConfig::default()
    } else {
        BusConfig { segment_size }
    };

    match BusWriter::create(str_slice, config) {
        Ok(writer) => Box::into_raw(Box::new(AetherWriterHandle(writer))),
        Err(_) => ptr::null_mut(),
    }
}

/// Publish one message under `topic`
///
/// Copies the message id into `out_id` (16 bytes) when it is non-null.
/// Returns 0 on success, -1 on failure.
///
/// # Safety
/// `handle` must come from `aether_writer_create`, `topic` must be a
/// valid null-terminated string, and `payload` must point at
/// `payload_len` readable bytes (it may be null when `payload_len` is 0)
#[no_mangle]
pub unsafe extern "C" fn aether_writer_write(
    handle: *mut AetherWriterHandle,
    topic: *const c_char,
    payload: *const u8,
    payload_len: usize,
    out_id: *mut u8,
) -> i32 {
    if handle.is_null() || topic.is_null() {
        return -1;
    }

    let topic = match CStr::from_ptr(topic).to_str() {
        Ok(s) => s,
        Err(_) => return -1,
    };

    let payload = if payload_len == 0 {
        &[][..]
    } else if payload.is_null() {
        return -1;
    } else {
        slice::from_raw_parts(payload, payload_len)
    };

    let writer = &mut (*handle).0;
    match writer.write(topic, payload) {
        Ok(id) => {
            if !out_id.is_null() {
                ptr::copy_nonoverlapping(id.as_bytes().as_ptr(), out_id, 16);
            }
            0
        }
        Err(_) => -1,
    }
}

/// Destroy a writer handle, unlinking the segment name
#[no_mangle]
pub unsafe extern "C" fn aether_writer_destroy(handle: *mut AetherWriterHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

// --- Reader Side ---

/// Attach to an existing bus segment
///
/// Returns a null pointer when the segment does not exist yet; callers
/// typically retry until the writer has created it.
///
/// # Safety
/// `name` must be a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn aether_reader_connect(name: *const c_char) -> *mut AetherReaderHandle {
    if name.is_null() {
        return ptr::null_mut();
    }

    let c_str = CStr::from_ptr(name);
    let str_slice = match c_str.to_str() {
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };

    match BusReader::connect(str_slice) {
        Ok(reader) => Box::into_raw(Box::new(AetherReaderHandle(reader))),
        Err(_) => ptr::null_mut(),
    }
}

/// Pop the next pending message, if any
///
/// Copies up to `max_len` payload bytes into `buf` and fills the
/// optional out parameters (`out_id` needs room for 16 bytes). Returns
/// the full payload length, which may exceed `max_len` when `buf` was
/// too small, or -1 when no message is pending.
///
/// # Safety
/// `handle` must come from `aether_reader_connect` and `buf` must point
/// at `max_len` writable bytes
#[no_mangle]
pub unsafe extern "C" fn aether_reader_next(
    handle: *mut AetherReaderHandle,
    buf: *mut u8,
    max_len: usize,
    out_timestamp: *mut f64,
    out_topic_hash: *mut u32,
    out_id: *mut u8,
) -> isize {
    if handle.is_null() {
        return -1;
    }

    let reader = &mut (*handle).0;
    match reader.read().next() {
        Some(msg) => {
            let copy_len = msg.payload.len().min(max_len);
            if copy_len > 0 && !buf.is_null() {
                ptr::copy_nonoverlapping(msg.payload.as_ptr(), buf, copy_len);
            }
            if !out_timestamp.is_null() {
                *out_timestamp = msg.timestamp;
            }
            if !out_topic_hash.is_null() {
                *out_topic_hash = msg.topic_hash;
            }
            if !out_id.is_null() {
                ptr::copy_nonoverlapping(msg.id.as_bytes().as_ptr(), out_id, 16);
            }
            msg.payload.len() as isize
        }
        None => -1,
    }
}

/// Number of times this reader was lapped by the writer
///
/// # Safety
/// `handle` must come from `aether_reader_connect`
#[no_mangle]
pub unsafe extern "C" fn aether_reader_overruns(handle: *mut AetherReaderHandle) -> u64 {
    if handle.is_null() {
        return 0;
    }
    (*handle).0.overruns()
}

/// Destroy a reader handle (the segment name stays linked)
#[no_mangle]
pub unsafe extern "C" fn aether_reader_destroy(handle: *mut AetherReaderHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Hash a topic string to its 32-bit wire form
///
/// Returns 0 when `topic` is null or not valid UTF-8.
///
/// # Safety
/// `topic` must be a valid null-terminated string when non-null
#[no_mangle]
pub unsafe extern "C" fn aether_topic_hash(topic: *const c_char) -> u32 {
    if topic.is_null() {
        return 0;
    }
    match CStr::from_ptr(topic).to_str() {
        Ok(s) => topic_hash(s),
        Err(_) => 0,
    }
}
