// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Support for in-kernel debugging.
//!
//! For printing, the board installs an [`IoWrite`] sink (usually a polled
//! UART) with [`set_debug_writer`]. Messages are then printed with the
//! `debug!` macro:
//!
//! ```ignore
//! debug!("Yes the code gets here with value {}", i);
//! ```
//!
//! `debug_verbose!` additionally prefixes the message with the source file
//! and line. Until a sink is installed all output is discarded.

use core::fmt::{self, Arguments, Write};
use core::ptr::addr_of;

/// Byte sink the debug output is written to.
pub trait IoWrite {
    /// Write as many bytes of `buf` as possible, returning how many were
    /// consumed. Returning 0 drops the rest of the message.
    fn write(&self, buf: &[u8]) -> usize;
}

static mut DEBUG_WRITER: Option<&'static dyn IoWrite> = None;

/// Install the sink used by `debug!`.
///
/// ## Safety
///
/// Must be called during board initialization, before interrupts are enabled
/// and before any other code can call `debug!`.
pub unsafe fn set_debug_writer(writer: &'static dyn IoWrite) {
    // SAFETY: the caller guarantees no concurrent readers.
    unsafe {
        DEBUG_WRITER = Some(writer);
    }
}

fn debug_writer() -> Option<&'static dyn IoWrite> {
    // SAFETY: the writer is only set once during initialization, after which
    // it is only read.
    unsafe { *addr_of!(DEBUG_WRITER) }
}

struct DebugWriterWrapper {
    sink: &'static dyn IoWrite,
}

impl Write for DebugWriterWrapper {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut bytes = s.as_bytes();
        while !bytes.is_empty() {
            let written = self.sink.write(bytes);
            if written == 0 {
                return Err(fmt::Error);
            }
            bytes = &bytes[written.min(bytes.len())..];
        }
        Ok(())
    }
}

/// Write a debug message without a trailing newline.
pub fn debug_print(args: Arguments) {
    if let Some(sink) = debug_writer() {
        let mut writer = DebugWriterWrapper { sink };
        let _ = writer.write_fmt(args);
    }
}

/// Write a debug message followed by a newline.
pub fn debug_println(args: Arguments) {
    if let Some(sink) = debug_writer() {
        let mut writer = DebugWriterWrapper { sink };
        let _ = writer.write_fmt(args);
        let _ = writer.write_str("\r\n");
    }
}

/// Write a debug message prefixed with its source location.
pub fn debug_verbose_println(args: Arguments, file_line: &(&'static str, u32)) {
    if let Some(sink) = debug_writer() {
        let mut writer = DebugWriterWrapper { sink };
        let (file, line) = *file_line;
        let _ = writer.write_fmt(format_args!("{}:{}: ", file, line));
        let _ = writer.write_fmt(args);
        let _ = writer.write_str("\r\n");
    }
}

/// In-kernel `println()` debugging.
#[macro_export]
macro_rules! debug {
    () => ({
        // Allow an empty debug!() to print a bare newline
        $crate::debug!("")
    });
    ($msg:expr $(,)?) => ({
        $crate::debug::debug_println(format_args!($msg))
    });
    ($fmt:expr, $($arg:tt)+) => ({
        $crate::debug::debug_println(format_args!($fmt, $($arg)+))
    });
}

/// In-kernel `println()` debugging with the file and line of the call site.
#[macro_export]
macro_rules! debug_verbose {
    () => ({
        $crate::debug_verbose!("")
    });
    ($msg:expr $(,)?) => ({
        $crate::debug::debug_verbose_println(format_args!($msg), {
            static _FILE_LINE: (&'static str, u32) = (file!(), line!());
            &_FILE_LINE
        })
    });
    ($fmt:expr, $($arg:tt)+) => ({
        $crate::debug::debug_verbose_println(format_args!($fmt, $($arg)+), {
            static _FILE_LINE: (&'static str, u32) = (file!(), line!());
            &_FILE_LINE
        })
    });
}
