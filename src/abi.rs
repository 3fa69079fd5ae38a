//! Purpose: C ABI bridge for hosts embedding jsonhandle (libjsonhandle).
//! Exports: C-callable runtime/value/iterator functions and buffer/error helpers.
//! Role: Native-function surface; one entry point per runtime operation.
//! Invariants: Handles cross the boundary as `uint64_t`; `JH_BAD_HANDLE` means none.
//! Invariants: Status codes: `JH_OK`, `JH_ERR` (see `jh_error`), `JH_WRONG_TYPE`,
//! `JH_OUT_OF_RANGE`, `JH_EXHAUSTED`. Only `JH_ERR` allocates an error.
//! Invariants: Error kinds map 1:1 with core error kinds via `to_exit_code`.
//! Notes: Out-pointers are validated before any handle is minted, so a null
//! out-pointer never strands a handle.
#![allow(clippy::result_large_err)]
#![allow(non_camel_case_types)]

use crate::api::{
    Access, EncodeFlags, Error, ErrorKind, Handle, IterRead, IterStep, OwnerId, Runtime,
    RuntimeOptions, to_exit_code,
};
use libc::c_char;
use std::ffi::CString;
use std::ptr;

pub const JH_OK: i32 = 0;
pub const JH_ERR: i32 = -1;
pub const JH_WRONG_TYPE: i32 = 1;
pub const JH_OUT_OF_RANGE: i32 = 2;
pub const JH_EXHAUSTED: i32 = 3;

pub const JH_BAD_HANDLE: u64 = crate::api::BAD_HANDLE;

#[repr(C)]
pub struct jh_runtime {
    runtime: Runtime,
}

#[repr(C)]
pub struct jh_buf {
    pub data: *mut u8,
    pub len: usize,
}

impl Default for jh_buf {
    fn default() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
        }
    }
}

#[repr(C)]
pub struct jh_error {
    pub kind: i32,
    pub message: *mut c_char,
    pub handle: u64,
    pub line: u64,
    pub column: u64,
    pub has_handle: u8,
    pub has_position: u8,
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_runtime_new(
    max_handles: u64,
    out_runtime: *mut *mut jh_runtime,
    out_err: *mut *mut jh_error,
) -> i32 {
    if out_runtime.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_runtime is null"),
        );
    }
    let mut options = RuntimeOptions::new();
    if max_handles != 0 {
        options = options.with_max_handles(max_handles as usize);
    }
    let handle = Box::new(jh_runtime {
        runtime: Runtime::with_options(options),
    });
    unsafe {
        *out_runtime = Box::into_raw(handle);
    }
    JH_OK
}

/// Destroys every remaining handle, then the runtime itself.
#[unsafe(no_mangle)]
pub extern "C" fn jh_runtime_free(runtime: *mut jh_runtime) {
    if runtime.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(runtime));
    }
}

/// Owner-context teardown. Returns the number of handles destroyed.
#[unsafe(no_mangle)]
pub extern "C" fn jh_owner_release(runtime: *mut jh_runtime, owner: u32) -> u64 {
    if runtime.is_null() {
        return 0;
    }
    let runtime = unsafe { &mut *runtime };
    runtime.runtime.release_owner(OwnerId(owner)) as u64
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_live_handles(runtime: *const jh_runtime) -> u64 {
    if runtime.is_null() {
        return 0;
    }
    let runtime = unsafe { &*runtime };
    runtime.runtime.live_handles() as u64
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_parse(
    runtime: *mut jh_runtime,
    owner: u32,
    json_bytes: *const u8,
    json_len: usize,
    out_handle: *mut u64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_handle, "out_handle", out_err) {
        return code;
    }
    let text = match parse_utf8(json_bytes, json_len, "json_bytes") {
        Ok(text) => text,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).parse(text) {
        Ok(handle) => {
            write_handle(out_handle, handle.raw());
            JH_OK
        }
        Err(err) => {
            write_handle(out_handle, JH_BAD_HANDLE);
            fail(out_err, err)
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_dumps(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    flags: u32,
    out_json: *mut jh_buf,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_json, "out_json", out_err) {
        return code;
    }
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    let session = runtime.runtime.session(OwnerId(owner));
    match session.dumps(handle, EncodeFlags::from_bits(flags)) {
        Ok(text) => {
            write_buf(out_json, text.into_bytes());
            JH_OK
        }
        Err(err) => fail(out_err, err),
    }
}

/// Writes the `JsonType::code` of the value.
#[unsafe(no_mangle)]
pub extern "C" fn jh_type(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    out_type: *mut i32,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_type, "out_type", out_err) {
        return code;
    }
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).type_of(handle) {
        Ok(json_type) => {
            unsafe {
                *out_type = json_type.code();
            }
            JH_OK
        }
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_read_string(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    out_value: *mut jh_buf,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_value, "out_value", out_err) {
        return code;
    }
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).read_string(handle) {
        Ok(access) => finish(access, |value| write_buf(out_value, value.into_bytes())),
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_read_integer(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    out_value: *mut i64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_value, "out_value", out_err) {
        return code;
    }
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).read_integer(handle) {
        Ok(access) => finish(access, |value| unsafe { *out_value = value }),
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_read_real(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    out_value: *mut f64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_value, "out_value", out_err) {
        return code;
    }
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).read_real(handle) {
        Ok(access) => finish(access, |value| unsafe { *out_value = value }),
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_read_bool(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    out_value: *mut u8,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_value, "out_value", out_err) {
        return code;
    }
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).read_bool(handle) {
        Ok(access) => finish(access, |value| unsafe { *out_value = u8::from(value) }),
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_array_size(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    out_size: *mut u64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_size, "out_size", out_err) {
        return code;
    }
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).array_size(handle) {
        Ok(access) => finish(access, |size| unsafe { *out_size = size as u64 }),
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_array_get(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    index: i64,
    out_handle: *mut u64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_handle, "out_handle", out_err) {
        return code;
    }
    write_handle(out_handle, JH_BAD_HANDLE);
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).array_get(handle, index) {
        Ok(access) => finish(access, |child| write_handle(out_handle, child.raw())),
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_object_size(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    out_size: *mut u64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_size, "out_size", out_err) {
        return code;
    }
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).object_size(handle) {
        Ok(access) => finish(access, |size| unsafe { *out_size = size as u64 }),
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_object_get(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    key_bytes: *const u8,
    key_len: usize,
    out_handle: *mut u64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_handle, "out_handle", out_err) {
        return code;
    }
    write_handle(out_handle, JH_BAD_HANDLE);
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    let key = match parse_utf8(key_bytes, key_len, "key_bytes") {
        Ok(key) => key,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).object_get(handle, key) {
        Ok(access) => finish(access, |child| write_handle(out_handle, child.raw())),
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_object_iter(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    out_iter: *mut u64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_iter, "out_iter", out_err) {
        return code;
    }
    write_handle(out_iter, JH_BAD_HANDLE);
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).object_iter(handle) {
        Ok(access) => finish(access, |iter| write_handle(out_iter, iter.raw())),
        Err(err) => fail(out_err, err),
    }
}

/// On `JH_EXHAUSTED` the iterator handle has already been destroyed.
#[unsafe(no_mangle)]
pub extern "C" fn jh_object_iter_read(
    runtime: *mut jh_runtime,
    owner: u32,
    iter: u64,
    out_key: *mut jh_buf,
    out_value: *mut u64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Err(code) = require_out(out_key, "out_key", out_err) {
        return code;
    }
    if let Err(code) = require_out(out_value, "out_value", out_err) {
        return code;
    }
    write_handle(out_value, JH_BAD_HANDLE);
    unsafe {
        *out_key = jh_buf::default();
    }
    let iter = match parse_handle(iter) {
        Ok(iter) => iter,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).object_iter_read(iter) {
        Ok(IterRead::Entry { key, value }) => {
            write_buf(out_key, key.into_bytes());
            write_handle(out_value, value.raw());
            JH_OK
        }
        Ok(IterRead::Exhausted) => JH_EXHAUSTED,
        Err(err) => fail(out_err, err),
    }
}

/// On `JH_EXHAUSTED` the iterator handle has already been destroyed.
#[unsafe(no_mangle)]
pub extern "C" fn jh_object_iter_next(
    runtime: *mut jh_runtime,
    owner: u32,
    iter: u64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    let iter = match parse_handle(iter) {
        Ok(iter) => iter,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).object_iter_next(iter) {
        Ok(IterStep::Advanced(_)) => JH_OK,
        Ok(IterStep::Exhausted) => JH_EXHAUSTED,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_handle_close(
    runtime: *mut jh_runtime,
    owner: u32,
    handle: u64,
    out_err: *mut *mut jh_error,
) -> i32 {
    let runtime = match borrow_runtime(runtime, out_err) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    let handle = match parse_handle(handle) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    match runtime.runtime.session(OwnerId(owner)).close(handle) {
        Ok(()) => JH_OK,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_buf_free(buf: *mut jh_buf) {
    if buf.is_null() {
        return;
    }
    unsafe {
        let buf = &mut *buf;
        if !buf.data.is_null() && buf.len != 0 {
            drop(Vec::from_raw_parts(buf.data, buf.len, buf.len));
        }
        buf.data = ptr::null_mut();
        buf.len = 0;
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn jh_error_free(err: *mut jh_error) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        if !err.message.is_null() {
            drop(CString::from_raw(err.message));
        }
    }
}

fn borrow_runtime<'a>(
    runtime: *mut jh_runtime,
    out_err: *mut *mut jh_error,
) -> Result<&'a mut jh_runtime, i32> {
    if runtime.is_null() {
        return Err(fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("runtime is null"),
        ));
    }
    unsafe { Ok(&mut *runtime) }
}

fn require_out<T>(out: *mut T, name: &str, out_err: *mut *mut jh_error) -> Result<(), i32> {
    if out.is_null() {
        return Err(fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message(format!("{name} is null")),
        ));
    }
    Ok(())
}

fn parse_handle(raw: u64) -> Result<Handle, Error> {
    Handle::from_raw(raw).ok_or_else(|| {
        Error::new(ErrorKind::InvalidHandle)
            .with_message("handle is JH_BAD_HANDLE")
            .with_handle(raw)
    })
}

fn parse_utf8<'a>(bytes: *const u8, len: usize, name: &str) -> Result<&'a str, Error> {
    if bytes.is_null() {
        if len == 0 {
            return Ok("");
        }
        return Err(Error::new(ErrorKind::Usage).with_message(format!("{name} is null")));
    }
    let slice = unsafe { std::slice::from_raw_parts(bytes, len) };
    std::str::from_utf8(slice).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{name} is not valid UTF-8"))
            .with_source(err)
    })
}

fn finish<T>(access: Access<T>, write: impl FnOnce(T)) -> i32 {
    match access {
        Access::Value(value) => {
            write(value);
            JH_OK
        }
        Access::WrongType => JH_WRONG_TYPE,
        Access::OutOfRange => JH_OUT_OF_RANGE,
    }
}

fn write_handle(out: *mut u64, raw: u64) {
    unsafe {
        *out = raw;
    }
}

fn write_buf(out: *mut jh_buf, bytes: Vec<u8>) {
    unsafe {
        let buf = &mut *out;
        let mut data = bytes.into_boxed_slice();
        buf.len = data.len();
        buf.data = if data.is_empty() {
            ptr::null_mut()
        } else {
            data.as_mut_ptr()
        };
        std::mem::forget(data);
    }
}

fn fail(out_err: *mut *mut jh_error, err: Error) -> i32 {
    if out_err.is_null() {
        return JH_ERR;
    }
    let position = err.line().zip(err.column());
    let error = Box::new(jh_error {
        kind: to_exit_code(err.kind()),
        message: to_c_string(err.message().unwrap_or("")),
        handle: err.handle().unwrap_or(0),
        line: position.map(|(line, _)| line as u64).unwrap_or(0),
        column: position.map(|(_, column)| column as u64).unwrap_or(0),
        has_handle: if err.handle().is_some() { 1 } else { 0 },
        has_position: if position.is_some() { 1 } else { 0 },
    });
    unsafe {
        *out_err = Box::into_raw(error);
    }
    JH_ERR
}

fn to_c_string(input: &str) -> *mut c_char {
    CString::new(input.replace('\0', "\\u0000"))
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}
