// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! USB 2.0 full-speed device stack.
//!
//! [`device::UsbCore`] sits on top of a [`kernel::hil::usb::UsbController`]
//! and implements enumeration: the endpoint 0 control transfer state
//! machine, the device state machine and the chapter 9 standard requests.
//! Everything class specific is delegated to a [`driver::UsbDriver`], for
//! example the CDC-ACM serial port in [`cdc`].
//!
//! Usage
//! -----
//!
//! ```rust,ignore
//! use capsules_usb::cdc::CdcAcm;
//! use capsules_usb::device::UsbCore;
//!
//! let usb = stm32l4xx::usb::Usb::new();
//! let core = UsbCore::new(&usb);
//! let cdc = CdcAcm::new(&core);
//! core.init(&cdc);
//! cdc.set_client(&console);
//! // From the chip's interrupt dispatch:
//! usb.handle_interrupt();
//! ```

#![no_std]
#![forbid(unsafe_code)]

pub mod cdc;
pub mod control;
pub mod descriptors;
pub mod device;
pub mod driver;
pub mod endpoint_table;
pub mod requests;
pub mod state;

#[cfg(test)]
mod fake;
