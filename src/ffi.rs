//! C ABI for the parse and serialize service.
//!
//! Every object handed to C is one of four kinds: a package handle, an error,
//! the data of a serialized buffer, or a string. All are released with the one
//! entry point [`flux_free`], which looks the pointer up in a process-wide
//! registry to find out what it is. Releasing a pointer that is not live is
//! logged and ignored instead of corrupting the heap.
//!
//! # Protocol
//!
//! ```c
//! flux_ast_pkg_t *pkg = flux_parse("a = 1");
//! flux_buffer_t buf;
//! flux_error_t *err = flux_ast_marshal_json(pkg, &buf);
//! if (err != NULL) {
//!     char *msg = flux_error_str(err);
//!     /* ... */
//!     flux_free(msg);
//!     flux_free(err);
//! } else {
//!     /* use buf.data[0..buf.len] */
//!     flux_free(buf.data);
//! }
//! flux_free(pkg);
//! ```
//!
//! Functions that can fail return a `flux_error_t *`, null on success. Out
//! parameters are written only on success. Panics never cross the boundary;
//! they are caught and reported as `Internal` errors.

#![allow(non_camel_case_types)]

use std::any::Any;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::{Mutex, MutexGuard};

use log::{error, warn};
use once_cell::sync::Lazy;

use crate::ast::Package;
use crate::codec::{binary, json};
use crate::diagnostics::{ErrorCode, FluxError};
use crate::syntax;

// ============================================================================
// HANDLE TYPES
// ============================================================================

/// Opaque handle to a parsed package.
pub struct flux_ast_pkg_t {
    pkg: Package,
}

impl flux_ast_pkg_t {
    /// Borrows the package behind a handle.
    pub fn package(&self) -> &Package {
        &self.pkg
    }
}

/// Opaque handle to an error.
pub struct flux_error_t {
    err: FluxError,
}

impl flux_error_t {
    pub fn error(&self) -> &FluxError {
        &self.err
    }
}

/// Serialized bytes owned by the caller. Release `data` with [`flux_free`].
#[repr(C)]
#[derive(Debug)]
pub struct flux_buffer_t {
    pub data: *mut u8,
    pub len: usize,
}

impl Default for flux_buffer_t {
    fn default() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
        }
    }
}

// ============================================================================
// ALLOCATION REGISTRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Allocation {
    Package,
    Error,
    Buffer { len: usize },
    CString,
}

static ALLOCATIONS: Lazy<Mutex<HashMap<usize, Allocation>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn registry() -> MutexGuard<'static, HashMap<usize, Allocation>> {
    // Entries are inserted and removed atomically, so a poisoned map is still
    // consistent.
    ALLOCATIONS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn register(addr: usize, kind: Allocation) {
    if let Some(previous) = registry().insert(addr, kind) {
        error!("address {:#x} registered twice ({:?}, then {:?})", addr, previous, kind);
    }
}

fn new_package(pkg: Package) -> NonNull<flux_ast_pkg_t> {
    let handle = NonNull::from(Box::leak(Box::new(flux_ast_pkg_t { pkg })));
    register(handle.as_ptr() as usize, Allocation::Package);
    handle
}

fn new_error(err: FluxError) -> *mut flux_error_t {
    let raw = Box::into_raw(Box::new(flux_error_t { err }));
    register(raw as usize, Allocation::Error);
    raw
}

fn new_buffer(bytes: Vec<u8>) -> flux_buffer_t {
    if bytes.is_empty() {
        return flux_buffer_t::default();
    }
    let len = bytes.len();
    let data = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;
    register(data as usize, Allocation::Buffer { len });
    flux_buffer_t { data, len }
}

fn new_c_string(s: &str) -> *mut c_char {
    let cstr = match CString::new(s) {
        Ok(cstr) => cstr,
        Err(_) => match CString::new(s.replace('\0', "\\0")) {
            Ok(cstr) => cstr,
            Err(_) => return ptr::null_mut(),
        },
    };
    let raw = cstr.into_raw();
    register(raw as usize, Allocation::CString);
    raw
}

/// Number of objects handed out through the C ABI and not yet freed.
pub fn live_allocations() -> usize {
    registry().len()
}

/// Looks up a live handle of the expected kind.
///
/// # Safety
///
/// A registered address always points at a live value of its recorded kind.
unsafe fn lookup<'a, T>(ptr: *const T, kind: Allocation, what: &str) -> Result<&'a T, FluxError> {
    if ptr.is_null() {
        return Err(FluxError::invalid_argument(format!("{} must not be null", what)));
    }
    match registry().get(&(ptr as usize)) {
        Some(found) if *found == kind => {}
        Some(found) => {
            return Err(FluxError::invalid_argument(format!(
                "{} points at a {:?}, not a {:?}",
                what, found, kind
            )))
        }
        None => {
            return Err(FluxError::invalid_argument(format!(
                "{} is not a live allocation",
                what
            )))
        }
    }
    // SAFETY: the registry only holds addresses produced by `Box::into_raw`
    // for values of the recorded kind that have not been freed yet.
    Ok(unsafe { &*ptr })
}

// ============================================================================
// PANIC BOUNDARY
// ============================================================================

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs `f`, converting both its error and any panic into an error handle.
fn guard(name: &str, f: impl FnOnce() -> Result<(), FluxError>) -> *mut flux_error_t {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => ptr::null_mut(),
        Ok(Err(err)) => new_error(err),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("panic in {}: {}", name, message);
            new_error(FluxError::internal(format!("panic in {}: {}", name, message)))
        }
    }
}

fn check_out<T>(out: *mut T, what: &str) -> Result<(), FluxError> {
    if out.is_null() {
        return Err(FluxError::invalid_argument(format!("{} must not be null", what)));
    }
    Ok(())
}

// ============================================================================
// PARSING
// ============================================================================

/// Parses Flux source text. Never returns null.
///
/// Syntax errors are embedded in the package; see [`flux_ast_get_error`]. A
/// null `src` parses as empty text, and invalid UTF-8 is replaced.
///
/// # Safety
///
/// `src` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn flux_parse(src: *const c_char) -> *mut flux_ast_pkg_t {
    let text = if src.is_null() {
        String::new()
    } else {
        // SAFETY: caller guarantees src is a valid NUL-terminated string
        let bytes = unsafe { CStr::from_ptr(src) }.to_bytes();
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(e) => {
                warn!("flux_parse: source is not valid UTF-8 ({}), replacing invalid bytes", e);
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    };

    parse_to_handle(&text).as_ptr()
}

/// Parses `text` into a registered package handle. A panic in the parser
/// becomes an error embedded in an otherwise empty package.
pub(crate) fn parse_to_handle(text: &str) -> NonNull<flux_ast_pkg_t> {
    let pkg = match catch_unwind(|| syntax::parse(text)) {
        Ok(pkg) => pkg,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("panic in flux_parse: {}", message);
            let mut pkg = Package::new(syntax::DEFAULT_PACKAGE);
            pkg.base.errors.push(format!("internal error: panic in parser: {}", message));
            pkg
        }
    };
    new_package(pkg)
}

/// Decodes a JSON AST. On success `*out` receives a package handle.
///
/// # Safety
///
/// `src` must be null or a valid NUL-terminated string, and `out` must be
/// null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flux_parse_json(src: *const c_char, out: *mut *mut flux_ast_pkg_t) -> *mut flux_error_t {
    guard("flux_parse_json", || {
        check_out(out, "out")?;
        if src.is_null() {
            return Err(FluxError::invalid_argument("JSON source must not be null"));
        }
        // SAFETY: caller guarantees src is a valid NUL-terminated string
        let bytes = unsafe { CStr::from_ptr(src) }.to_bytes();
        let pkg = json::from_slice(bytes)?;
        // SAFETY: out was checked for null; caller guarantees it is writable
        unsafe { *out = new_package(pkg).as_ptr() };
        Ok(())
    })
}

/// Decodes a binary AST of `len` bytes. On success `*out` receives a handle.
///
/// # Safety
///
/// `data` must be valid for reads of `len` bytes (it may be null only when
/// `len` is zero), and `out` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flux_parse_fb(data: *const u8, len: usize, out: *mut *mut flux_ast_pkg_t) -> *mut flux_error_t {
    guard("flux_parse_fb", || {
        check_out(out, "out")?;
        let bytes: &[u8] = if data.is_null() {
            if len != 0 {
                return Err(FluxError::invalid_argument("binary AST data is null but len is non-zero"));
            }
            &[]
        } else {
            // SAFETY: caller guarantees data is valid for len bytes
            unsafe { std::slice::from_raw_parts(data, len) }
        };
        let pkg = binary::decode(bytes)?;
        // SAFETY: out was checked for null; caller guarantees it is writable
        unsafe { *out = new_package(pkg).as_ptr() };
        Ok(())
    })
}

// ============================================================================
// SERIALIZATION
// ============================================================================

unsafe fn marshal(
    name: &str,
    pkg: *const flux_ast_pkg_t,
    buf: *mut flux_buffer_t,
    encode: fn(&Package) -> Result<Vec<u8>, FluxError>,
) -> *mut flux_error_t {
    guard(name, || {
        check_out(buf, "buf")?;
        // SAFETY: registered handles are live packages
        let handle = unsafe { lookup(pkg, Allocation::Package, "pkg") }?;
        let bytes = encode(&handle.pkg)?;
        // SAFETY: buf was checked for null; caller guarantees it is writable
        unsafe { *buf = new_buffer(bytes) };
        Ok(())
    })
}

/// Serializes a package as JSON into `*buf`.
///
/// # Safety
///
/// `pkg` must be null or a pointer returned by this library, and `buf` must be
/// null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flux_ast_marshal_json(pkg: *const flux_ast_pkg_t, buf: *mut flux_buffer_t) -> *mut flux_error_t {
    // SAFETY: forwarded caller guarantees
    unsafe { marshal("flux_ast_marshal_json", pkg, buf, json::to_vec) }
}

/// Serializes a package in the binary format into `*buf`.
///
/// # Safety
///
/// Same as [`flux_ast_marshal_json`].
#[no_mangle]
pub unsafe extern "C" fn flux_ast_marshal_fb(pkg: *const flux_ast_pkg_t, buf: *mut flux_buffer_t) -> *mut flux_error_t {
    // SAFETY: forwarded caller guarantees
    unsafe { marshal("flux_ast_marshal_fb", pkg, buf, binary::encode) }
}

/// Returns the first syntax error embedded in a package, or null if it has
/// none.
///
/// # Safety
///
/// `pkg` must be null or a pointer returned by this library.
#[no_mangle]
pub unsafe extern "C" fn flux_ast_get_error(pkg: *const flux_ast_pkg_t) -> *mut flux_error_t {
    guard("flux_ast_get_error", || {
        // SAFETY: registered handles are live packages
        let handle = unsafe { lookup(pkg, Allocation::Package, "pkg") }?;
        // A syntax error is an InvalidArgument: the handle is fine, but the
        // source text it was parsed from is not. The message has the position.
        match handle.pkg.errors().into_iter().next() {
            Some(diag) => Err(FluxError::invalid_argument(diag.to_string())),
            None => Ok(()),
        }
    })
}

// ============================================================================
// ERRORS
// ============================================================================

/// Returns the message of an error as a new string owned by the caller.
///
/// Returns null if `err` is not a live error.
///
/// # Safety
///
/// `err` must be null or a pointer returned by this library.
#[no_mangle]
pub unsafe extern "C" fn flux_error_str(err: *const flux_error_t) -> *mut c_char {
    // SAFETY: registered handles are live errors
    match unsafe { lookup(err, Allocation::Error, "err") } {
        Ok(handle) => new_c_string(handle.err.message()),
        Err(e) => {
            warn!("flux_error_str: {}", e);
            ptr::null_mut()
        }
    }
}

/// Returns the numeric category of an error, or 0 if `err` is not a live
/// error. Categories match [`ErrorCode::as_c_int`].
///
/// # Safety
///
/// `err` must be null or a pointer returned by this library.
#[no_mangle]
pub unsafe extern "C" fn flux_error_code(err: *const flux_error_t) -> c_int {
    // SAFETY: registered handles are live errors
    match unsafe { lookup(err, Allocation::Error, "err") } {
        Ok(handle) => handle.err.code().as_c_int(),
        Err(e) => {
            warn!("flux_error_code: {}", e);
            0
        }
    }
}

/// Maps a numeric category back to its [`ErrorCode`].
pub fn error_code_from_c_int(code: c_int) -> Option<ErrorCode> {
    [
        ErrorCode::Internal,
        ErrorCode::InvalidArgument,
        ErrorCode::Serialization,
        ErrorCode::Deserialization,
    ]
    .into_iter()
    .find(|c| c.as_c_int() == code)
}

// ============================================================================
// RELEASE
// ============================================================================

/// Releases any package, error, buffer data, or string from this library.
///
/// Null is ignored. Freeing an unknown or already freed pointer logs a warning
/// and does nothing.
///
/// # Safety
///
/// `ptr` must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn flux_free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    let Some(kind) = registry().remove(&(ptr as usize)) else {
        warn!("flux_free: {:p} is not a live allocation (double free?), ignoring", ptr);
        return;
    };
    // SAFETY: the address was registered with this kind when it was handed
    // out and has just been removed, so it is released exactly once.
    unsafe {
        match kind {
            Allocation::Package => drop(Box::from_raw(ptr as *mut flux_ast_pkg_t)),
            Allocation::Error => drop(Box::from_raw(ptr as *mut flux_error_t)),
            Allocation::Buffer { len } => {
                drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr as *mut u8, len)));
            }
            Allocation::CString => drop(CString::from_raw(ptr as *mut c_char)),
        }
    }
}

/// Number of live allocations, for leak checks from C.
#[no_mangle]
pub extern "C" fn flux_live_allocations() -> usize {
    live_allocations()
}

#[cfg(test)]
mod tests {
    use super::*;

    // The registry is process-wide and tests run in parallel, so these tests
    // only assert on their own pointers, never on the global count.

    fn is_live(ptr: *const c_void) -> bool {
        registry().contains_key(&(ptr as usize))
    }

    #[test]
    fn test_parse_and_free() {
        let src = CString::new("a = 1").unwrap();
        let pkg = unsafe { flux_parse(src.as_ptr()) };
        assert!(!pkg.is_null());
        assert!(is_live(pkg as *const c_void));
        assert_eq!(unsafe { &*pkg }.package().files[0].body.len(), 1);
        unsafe { flux_free(pkg as *mut c_void) };
        assert!(!is_live(pkg as *const c_void));
    }

    #[test]
    fn test_unknown_pointer_is_ignored() {
        let mut local = 0u8;
        let ptr = &mut local as *mut u8 as *mut c_void;
        unsafe { flux_free(ptr) };
        assert_eq!(local, 0);
        assert!(!is_live(ptr));
    }

    #[test]
    fn test_null_arguments() {
        let mut buf = flux_buffer_t::default();
        let err = unsafe { flux_ast_marshal_json(ptr::null(), &mut buf) };
        assert!(!err.is_null());
        assert_eq!(unsafe { flux_error_code(err) }, ErrorCode::InvalidArgument.as_c_int());
        assert!(buf.data.is_null());
        unsafe { flux_free(err as *mut c_void) };

        let err = unsafe { flux_parse_json(ptr::null(), ptr::null_mut()) };
        assert_eq!(unsafe { flux_error_code(err) }, ErrorCode::InvalidArgument.as_c_int());
        unsafe { flux_free(err as *mut c_void) };
    }

    #[test]
    fn test_wrong_kind_of_handle() {
        let src = CString::new("{").unwrap();
        let pkg = unsafe { flux_parse(src.as_ptr()) };
        let err = unsafe { flux_ast_get_error(pkg) };
        assert!(!err.is_null());
        // An error handle passed where a package is expected.
        let mut buf = flux_buffer_t::default();
        let wrong = unsafe { flux_ast_marshal_json(err as *const flux_ast_pkg_t, &mut buf) };
        let cstr = unsafe { flux_error_str(wrong) };
        let msg = unsafe { CStr::from_ptr(cstr) }.to_str().unwrap().to_string();
        assert!(msg.contains("not a Package"), "{}", msg);
        unsafe {
            flux_free(cstr as *mut c_void);
            flux_free(wrong as *mut c_void);
            flux_free(err as *mut c_void);
            flux_free(pkg as *mut c_void);
        }
    }

    #[test]
    fn test_error_code_mapping() {
        for code in [
            ErrorCode::Internal,
            ErrorCode::InvalidArgument,
            ErrorCode::Serialization,
            ErrorCode::Deserialization,
        ] {
            assert_eq!(error_code_from_c_int(code.as_c_int()), Some(code));
        }
        assert_eq!(error_code_from_c_int(0), None);
    }

    #[test]
    fn test_panic_becomes_internal_error() {
        let err = guard("test", || panic!("boom"));
        let handle = unsafe { &*err };
        assert_eq!(handle.error().code(), ErrorCode::Internal);
        assert_eq!(handle.error().message(), "panic in test: boom");
        unsafe { flux_free(err as *mut c_void) };
    }
}
