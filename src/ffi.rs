//! C interface over the process-wide collector.

use crate::GCResult;
use crate::browser::GarbageBrowser;
use crate::error::GCError;
use crate::gc::global;
use crate::session::{end_debug_garbage, start_debug_garbage};
use std::ffi::c_int;
use std::io::{self, Write};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GBReturnCode {
    Success = 0,
    ErrorCollectorStateConflict = -1,
    ErrorIo = -2,
    ErrorCollectionInProgress = -3,
    ErrorInvalidArgument = -4,
    ErrorInternal = -5,
}

impl From<&GCError> for GBReturnCode {
    fn from(err: &GCError) -> Self {
        match err {
            GCError::CollectorStateConflict => GBReturnCode::ErrorCollectorStateConflict,
            GCError::IoWrite(_) => GBReturnCode::ErrorIo,
            GCError::CollectionInProgress => GBReturnCode::ErrorCollectionInProgress,
            GCError::InvalidGeneration(_) => GBReturnCode::ErrorInvalidArgument,
            _ => GBReturnCode::ErrorInternal,
        }
    }
}

impl<T> From<GCResult<T>> for GBReturnCode {
    fn from(result: GCResult<T>) -> Self {
        match result {
            Ok(_) => GBReturnCode::Success,
            Err(err) => {
                log::error!("garbage browser call failed: {err}");
                GBReturnCode::from(&err)
            }
        }
    }
}

/// Writes to a file descriptor the caller keeps ownership of.
struct FdWriter {
    fd: c_int,
}

impl Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = unsafe { libc::write(self.fd, buf.as_ptr().cast(), buf.len()) };
        if written < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(written as usize)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Installs `env_logger` so library logging reaches stderr; honours `RUST_LOG`.
#[unsafe(no_mangle)]
pub extern "C" fn gb_init_logging() -> GBReturnCode {
    match env_logger::try_init() {
        Ok(()) => GBReturnCode::Success,
        Err(_) => GBReturnCode::ErrorInternal,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_gc_enable() -> GBReturnCode {
    global::enable();
    GBReturnCode::Success
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_gc_disable() -> GBReturnCode {
    global::disable();
    GBReturnCode::Success
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_gc_is_enabled() -> c_int {
    if global::is_enabled() { 1 } else { 0 }
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_gc_collect() -> GBReturnCode {
    global::collect().into()
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_gc_set_debug(flags: c_int) -> GBReturnCode {
    if flags < 0 {
        return GBReturnCode::ErrorInvalidArgument;
    }
    global::set_debug(flags as u32);
    GBReturnCode::Success
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_gc_get_debug() -> c_int {
    global::get_debug() as c_int
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_start_debug_garbage() -> GBReturnCode {
    start_debug_garbage().into()
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_end_debug_garbage() -> GBReturnCode {
    end_debug_garbage();
    GBReturnCode::Success
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_garbage_count() -> c_int {
    global::get_gc().read().garbage().len() as c_int
}

#[unsafe(no_mangle)]
pub extern "C" fn gb_clear_garbage() -> GBReturnCode {
    global::get_gc().write().clear_garbage().into()
}

/// Captures the global collector's garbage and writes the statistics table to
/// `fd`. The descriptor is neither closed nor flushed beyond the writes.
#[unsafe(no_mangle)]
pub extern "C" fn gb_print_garbage_stats(fd: c_int, reduce: c_int) -> GBReturnCode {
    if fd < 0 {
        return GBReturnCode::ErrorInvalidArgument;
    }

    let browser = match GarbageBrowser::from_global(reduce != 0) {
        Ok(browser) => browser,
        Err(err) => return GBReturnCode::from(GCResult::<()>::Err(err)),
    };
    browser.print_stats(&mut FdWriter { fd }).into()
}
