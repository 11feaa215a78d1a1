// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Tock Cell types.

#![no_std]

pub mod map_cell;
pub mod optional_cell;
