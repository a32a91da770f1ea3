//! Registration of the sqlite-vec extension.
//!
//! The vector index stores embeddings in a `vec0` virtual table, which only
//! exists on connections opened after the extension is registered.

use std::sync::Once;

use rusqlite::ffi::{sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;
use tracing::debug;

type SqliteExtensionFn =
    unsafe extern "C" fn(*mut sqlite3, *mut *mut i8, *const sqlite3_api_routines) -> i32;

static REGISTER: Once = Once::new();

/// Register sqlite-vec as an auto-loaded extension for every connection
/// opened afterwards. Repeated calls are no-ops.
#[allow(unsafe_code)]
pub fn init_sqlite_vec_extension() {
    REGISTER.call_once(|| {
        // SAFETY: sqlite3_vec_init has the extension entry-point signature that
        // sqlite3_auto_extension expects; it is only cast, never called here.
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteExtensionFn>(
                sqlite3_vec_init as *const (),
            )));
        }
        debug!("sqlite-vec registered");
    });
}
