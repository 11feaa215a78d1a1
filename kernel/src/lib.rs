// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Core kernel crate for the USB device stack.
//!
//! Holds the code that chips and capsules share: the Hardware Interface Layer
//! (HIL) definitions, the kernel-wide error type, debug output, compile-time
//! configuration and small utilities for memory-mapped registers.

#![no_std]

pub mod config;
pub mod debug;
pub mod errorcode;
pub mod hil;
pub mod utilities;

pub use crate::errorcode::ErrorCode;
