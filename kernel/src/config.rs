// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Data structure for storing compile-time configuration options.
//!
//! Configuration lives in a typed `const` rather than behind `#[cfg]` so that
//! every code path is type-checked even when disabled. The compiler folds the
//! constant, so a disabled option costs nothing in the final binary.

/// Data structure holding compile-time configuration options.
///
/// To change the configuration, enable the matching cargo feature of the
/// kernel crate from the board crate.
pub struct Config {
    /// Whether the USB stack should trace protocol activity to the debug
    /// output.
    ///
    /// If enabled, every setup packet, control stage transition and bus event
    /// (reset, suspend, wakeup) is printed with `debug!`. Start-of-frame
    /// events are never traced, they arrive every millisecond.
    pub trace_usb: bool,
}

/// A unique instance of `Config` where compile-time configuration options are
/// defined. These options are available in the kernel crate and to every
/// chip and capsule crate.
pub const CONFIG: Config = Config {
    trace_usb: cfg!(feature = "trace_usb"),
};
