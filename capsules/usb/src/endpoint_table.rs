// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Per-endpoint, per-direction completion handlers.

use kernel::hil::usb::{Direction, NUM_ENDPOINTS};
use kernel::utilities::cells::OptionalCell;

use crate::driver::EndpointClient;

/// Who handles transfer-complete events of one endpoint direction.
#[derive(Copy, Clone)]
pub enum Handler<'a> {
    /// The control transfer state machine of the core.
    Control,
    Client(&'a dyn EndpointClient),
}

pub struct EndpointTable<'a> {
    handlers: [[OptionalCell<Handler<'a>>; 2]; NUM_ENDPOINTS],
}

impl<'a> EndpointTable<'a> {
    pub fn new() -> Self {
        EndpointTable {
            handlers: core::array::from_fn(|_| [OptionalCell::empty(), OptionalCell::empty()]),
        }
    }

    pub fn set(&self, endpoint: usize, direction: Direction, handler: Handler<'a>) {
        self.handlers[endpoint][direction as usize].set(handler);
    }

    pub fn get(&self, endpoint: usize, direction: Direction) -> Option<Handler<'a>> {
        self.handlers
            .get(endpoint)
            .and_then(|pair| pair[direction as usize].map(|handler| *handler))
    }

    pub fn clear(&self, endpoint: usize) {
        for handler in self.handlers[endpoint].iter() {
            handler.clear();
        }
    }

    pub fn clear_all(&self) {
        for endpoint in 0..NUM_ENDPOINTS {
            self.clear(endpoint);
        }
    }

    /// Number of endpoints with at least one direction registered.
    pub fn registered(&self) -> usize {
        self.handlers
            .iter()
            .filter(|pair| pair.iter().any(OptionalCell::is_some))
            .count()
    }
}

impl Default for EndpointTable<'_> {
    fn default() -> Self {
        Self::new()
    }
}
