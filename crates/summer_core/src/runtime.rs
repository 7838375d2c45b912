//! Host runtime library: the small set of native functions a compiled
//! program can call by declaring a matching `extern`, resolved into the
//! JIT by name rather than by linking against an object file.
//!
//! Grounded on the original's `lib::import()`, which registers `putd`/`putc`
//! into the MCJIT memory manager's symbol table via `LLVMAddSymbol` before
//! the first module is sealed. Here the same table is consulted by
//! [`crate::codegen::Engine::resolve_externals`] when a sealed module still
//! has unresolved external declarations.

use std::collections::HashMap;
use std::ffi::{c_char, CStr, CString};
use std::os::raw::c_double;

use once_cell::sync::Lazy;

/// `print_number(n: number): void` — writes `n` followed by a newline.
#[no_mangle]
pub extern "C" fn print_number(value: c_double) {
    println!("{value}");
}

/// `print_string(s: string): void` — writes `s` followed by a newline.
///
/// # Safety
/// `ptr` must be a valid, NUL-terminated C string, which every `string`
/// value produced by this crate's codegen is by construction.
#[no_mangle]
pub unsafe extern "C" fn print_string(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    let text = CStr::from_ptr(ptr).to_string_lossy();
    println!("{text}");
}

/// `str_cat(a: string, b: string): string` — concatenates two strings into
/// a freshly allocated, leaked C string (compiled programs never free
/// string values, matching the source language's lack of a `free`
/// primitive).
///
/// # Safety
/// `a` and `b` must be valid, NUL-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn str_cat(a: *const c_char, b: *const c_char) -> *mut c_char {
    let left = if a.is_null() { "".into() } else { CStr::from_ptr(a).to_string_lossy() };
    let right = if b.is_null() { "".into() } else { CStr::from_ptr(b).to_string_lossy() };
    let joined = format!("{left}{right}");
    CString::new(joined)
        .unwrap_or_else(|_| CString::new("").unwrap())
        .into_raw()
}

/// Lazily built once per process: the registered-by-name host symbol table,
/// the JIT-visible equivalent of the original's `LLVMAddSymbol` calls.
static HOST_SYMBOLS: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert("print_number", print_number as usize);
    table.insert("print_string", print_string as usize);
    table.insert("str_cat", str_cat as usize);
    table
});

/// Resolves a host runtime symbol by its source-visible `extern` name.
/// Consulted before falling back to an earlier sealed engine's compiled
/// functions, matching the original resolver's precedence.
pub fn host_symbol_address(name: &str) -> Option<usize> {
    HOST_SYMBOLS.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn unknown_symbol_is_not_resolved() {
        assert!(host_symbol_address("does_not_exist").is_none());
    }

    #[test]
    fn known_symbols_resolve_to_nonzero_addresses() {
        assert!(host_symbol_address("print_number").unwrap() != 0);
        assert!(host_symbol_address("print_string").unwrap() != 0);
        assert!(host_symbol_address("str_cat").unwrap() != 0);
    }

    #[test]
    fn str_cat_joins_two_c_strings() {
        let a = CString::new("foo").unwrap();
        let b = CString::new("bar").unwrap();
        unsafe {
            let joined = str_cat(a.as_ptr(), b.as_ptr());
            let text = CStr::from_ptr(joined).to_str().unwrap();
            assert_eq!(text, "foobar");
            drop(CString::from_raw(joined));
        }
    }
}
