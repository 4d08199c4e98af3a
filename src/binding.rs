//! Safe ownership of C ABI handles.
//!
//! [`AstPkg`] drives the [`crate::ffi`] functions exactly the way a foreign
//! host would, but releases everything it receives through `Drop`, so Rust
//! callers cannot leak or double free.

use std::ffi::{c_void, CStr, CString};
use std::ptr::{self, NonNull};

use log::warn;

use crate::ast::Package;
use crate::diagnostics::{ErrorCode, FluxError};
use crate::ffi::{self, flux_ast_pkg_t, flux_buffer_t, flux_error_t};

/// An owned package handle.
///
/// # Examples
///
/// ```rust
/// use flux_syntax::binding::AstPkg;
/// let pkg = AstPkg::parse("a = 1");
/// assert!(pkg.error().is_none());
/// let json = pkg.marshal_json().unwrap();
/// let again = AstPkg::parse_json(&json).unwrap();
/// assert_eq!(again.package(), pkg.package());
/// ```
#[derive(Debug)]
pub struct AstPkg {
    ptr: NonNull<flux_ast_pkg_t>,
}

// SAFETY: the handle is uniquely owned and the package behind it is never
// shared, so moving it to another thread is sound.
unsafe impl Send for AstPkg {}

impl AstPkg {
    /// Parses source text. Syntax errors are reported by [`AstPkg::error`].
    ///
    /// As with `flux_parse`, which takes NUL-terminated text, anything from the
    /// first NUL byte on is dropped.
    pub fn parse(source: &str) -> AstPkg {
        let text = match source.find('\0') {
            Some(nul) => {
                warn!("source contains a NUL byte at offset {}, truncating", nul);
                &source[..nul]
            }
            None => source,
        };
        AstPkg {
            ptr: ffi::parse_to_handle(text),
        }
    }

    /// Builds a package from its JSON encoding.
    pub fn parse_json(bytes: &[u8]) -> Result<AstPkg, FluxError> {
        let cstr = CString::new(bytes).map_err(|e| {
            FluxError::deserialization(format!("JSON contains a NUL byte at offset {}", e.nul_position()))
                .context("could not get handle from JSON AST")
        })?;
        let mut out = ptr::null_mut();
        // SAFETY: cstr is NUL-terminated and out is a valid local
        let err = unsafe { ffi::flux_parse_json(cstr.as_ptr(), &mut out) };
        Self::from_result(out, err).map_err(|e| e.context("could not get handle from JSON AST"))
    }

    /// Builds a package from its binary encoding.
    pub fn parse_fb(bytes: &[u8]) -> Result<AstPkg, FluxError> {
        let mut out = ptr::null_mut();
        // SAFETY: the slice is valid for its length and out is a valid local
        let err = unsafe { ffi::flux_parse_fb(bytes.as_ptr(), bytes.len(), &mut out) };
        Self::from_result(out, err).map_err(|e| e.context("could not get handle from FlatBuffer AST"))
    }

    fn from_result(out: *mut flux_ast_pkg_t, err: *mut flux_error_t) -> Result<AstPkg, FluxError> {
        if let Some(err) = NonNull::new(err) {
            return Err(take_error(err));
        }
        NonNull::new(out)
            .map(|ptr| AstPkg { ptr })
            .ok_or_else(|| FluxError::internal("no package and no error returned"))
    }

    pub fn marshal_json(&self) -> Result<Vec<u8>, FluxError> {
        self.marshal(ffi::flux_ast_marshal_json)
            .map_err(|e| e.context("could not marshal AST to JSON"))
    }

    pub fn marshal_fb(&self) -> Result<Vec<u8>, FluxError> {
        self.marshal(ffi::flux_ast_marshal_fb)
            .map_err(|e| e.context("could not marshal AST to FlatBuffer"))
    }

    fn marshal(
        &self,
        f: unsafe extern "C" fn(*const flux_ast_pkg_t, *mut flux_buffer_t) -> *mut flux_error_t,
    ) -> Result<Vec<u8>, FluxError> {
        let mut buf = flux_buffer_t::default();
        // SAFETY: self.ptr is a live handle and buf is a valid local
        let err = unsafe { f(self.ptr.as_ptr(), &mut buf) };
        if let Some(err) = NonNull::new(err) {
            return Err(take_error(err));
        }
        if buf.data.is_null() {
            return Ok(Vec::new());
        }
        // SAFETY: on success buf.data points at buf.len initialized bytes that
        // we own until they are freed below.
        let bytes = unsafe { std::slice::from_raw_parts(buf.data, buf.len) }.to_vec();
        // SAFETY: buf.data came from the library and is freed exactly once
        unsafe { ffi::flux_free(buf.data as *mut c_void) };
        Ok(bytes)
    }

    /// The first syntax error embedded in the package, if any.
    pub fn error(&self) -> Option<FluxError> {
        // SAFETY: self.ptr is a live handle
        let err = unsafe { ffi::flux_ast_get_error(self.ptr.as_ptr()) };
        NonNull::new(err).map(take_error)
    }

    /// Borrows the package without copying it.
    pub fn package(&self) -> &Package {
        // SAFETY: self.ptr stays live until drop and nothing else mutates it
        unsafe { self.ptr.as_ref() }.package()
    }
}

impl Drop for AstPkg {
    fn drop(&mut self) {
        // SAFETY: the handle is owned by self and released only here
        unsafe { ffi::flux_free(self.ptr.as_ptr() as *mut c_void) };
    }
}

/// Converts an error handle into a [`FluxError`] and releases it.
fn take_error(err: NonNull<flux_error_t>) -> FluxError {
    let raw = err.as_ptr();
    // SAFETY: raw is a live error handle returned by the library
    let code = unsafe { ffi::flux_error_code(raw) };
    // SAFETY: as above
    let cstr = unsafe { ffi::flux_error_str(raw) };
    let message = if cstr.is_null() {
        String::from("unknown error")
    } else {
        // SAFETY: cstr is a NUL-terminated string from the library, freed once
        unsafe {
            let message = CStr::from_ptr(cstr).to_string_lossy().into_owned();
            ffi::flux_free(cstr as *mut c_void);
            message
        }
    };
    // SAFETY: raw is released exactly once, here
    unsafe { ffi::flux_free(raw as *mut c_void) };
    let code = ffi::error_code_from_c_int(code).unwrap_or(ErrorCode::Internal);
    FluxError::from_parts(code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_marshal() {
        let pkg = AstPkg::parse("a = 1\nb = a + 2");
        assert!(pkg.error().is_none());
        let fb = pkg.marshal_fb().unwrap();
        let again = AstPkg::parse_fb(&fb).unwrap();
        assert_eq!(again.package(), pkg.package());
        assert_eq!(again.package().files[0].body.len(), 2);
    }

    #[test]
    fn test_embedded_error() {
        let pkg = AstPkg::parse("{");
        let err = pkg.error().unwrap();
        assert!(err.message().contains("expected RBRACE, got EOF"), "{}", err);
        // The package is still usable.
        assert!(pkg.marshal_json().is_ok());
    }

    #[test]
    fn test_parse_always_yields_a_marshalable_handle() {
        let source = format!("a = {}", vec!["1"; 5_000].join(" + "));
        let pkg = AstPkg::parse(&source);
        let err = pkg.error().unwrap();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(err.message().ends_with("program is too deeply nested"), "{}", err);
        assert!(pkg.marshal_json().is_ok());
        assert!(pkg.marshal_fb().is_ok());
    }

    #[test]
    fn test_parse_stops_at_nul() {
        let pkg = AstPkg::parse("a = 1\0b = 2");
        assert!(pkg.error().is_none());
        assert_eq!(pkg.package().files[0].body.len(), 1);
    }

    #[test]
    fn test_bad_json_is_wrapped() {
        let err = AstPkg::parse_json(b"{\"type\":").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Deserialization);
        assert!(
            err.message().starts_with("could not get handle from JSON AST: "),
            "{}",
            err
        );
    }

    #[test]
    fn test_bad_binary_is_wrapped() {
        let err = AstPkg::parse_fb(b"nope").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Deserialization);
        assert!(err.message().starts_with("could not get handle from FlatBuffer AST: "));
    }

    #[test]
    fn test_interior_nul_truncates() {
        let pkg = AstPkg::parse("a = 1\0b = 2");
        assert_eq!(pkg.package().files[0].body.len(), 1);
    }
}
