// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Peripheral implementations for the STM32L4xx MCU family.
//!
//! Only the USB full-speed device peripheral (STM32L41x/L42x/L43x/L45x) is
//! provided. Clock tree, GPIO and power-rail bring-up are left to the board.

#![no_std]

pub mod usb;
