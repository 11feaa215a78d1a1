// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Endpoint 0 control transfer state machine.
//!
//! ```text
//!   control read:   Setup -> DataIn* -> StatusOut
//!   control write:  Setup -> DataOut* -> StatusIn
//!   no data:        Setup -> StatusIn
//! ```
//!
//! Every control transfer goes through one shared [`ControlTransfer`]
//! context. Responses are copied into the context buffer when they are
//! staged, so request handlers can answer from temporaries.

use core::cell::Cell;
use core::cmp::min;

use kernel::debug;
use kernel::hil::usb::{Direction, EndpointStatus, UsbController};
use kernel::utilities::cells::{MapCell, OptionalCell};

use crate::descriptors::{SetupPacket, SETUP_PACKET_LEN};
use crate::device::{UsbCore, EP0_MAX_PACKET};
use crate::driver::ControlOutClient;
use crate::state::DeviceState;

/// Largest amount of data a single control transfer can carry.
pub const CTRL_BUFFER_LEN: usize = 256;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for a setup packet.
    Setup,
    DataIn,
    DataOut,
    StatusIn,
    StatusOut,
}

pub struct ControlTransfer<'a> {
    stage: Cell<Stage>,
    setup: OptionalCell<SetupPacket>,
    buffer: MapCell<[u8; CTRL_BUFFER_LEN]>,
    /// Next byte to send or receive.
    position: Cell<usize>,
    remaining: Cell<usize>,
    /// A zero-length packet has to follow the data.
    zero_length_packet: Cell<bool>,
    completion: OptionalCell<&'a dyn ControlOutClient>,
}

impl<'a> ControlTransfer<'a> {
    pub fn new() -> Self {
        ControlTransfer {
            stage: Cell::new(Stage::Setup),
            setup: OptionalCell::empty(),
            buffer: MapCell::new([0; CTRL_BUFFER_LEN]),
            position: Cell::new(0),
            remaining: Cell::new(0),
            zero_length_packet: Cell::new(false),
            completion: OptionalCell::empty(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage.get()
    }

    pub fn setup(&self) -> Option<SetupPacket> {
        self.setup.map(|setup| *setup)
    }

    /// Drop everything about the current transfer and wait for a setup
    /// packet.
    pub fn clear(&self) {
        self.stage.set(Stage::Setup);
        self.setup.clear();
        self.position.set(0);
        self.remaining.set(0);
        self.zero_length_packet.set(false);
        self.completion.clear();
    }

    /// `wLength` of the current request, or 0 outside a transfer.
    fn requested_length(&self) -> usize {
        self.setup.map_or(0, |setup| setup.length as usize)
    }
}

impl Default for ControlTransfer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, C: UsbController<'a>> UsbCore<'a, C> {
    /// Endpoint 0 transfer-complete event. A setup packet always restarts
    /// the state machine, whatever stage it was in.
    pub(crate) fn control_event(&self, direction: Direction, setup: bool) {
        if setup {
            self.control.stage.set(Stage::Setup);
        }
        match (self.control.stage.get(), direction) {
            (Stage::Setup, Direction::Out) => self.setup_stage(),
            (Stage::DataIn, Direction::In) => self.data_in_stage(),
            (Stage::DataOut, Direction::Out) => self.data_out_stage(),
            (Stage::StatusIn, Direction::In) => self.status_in_stage(),
            (Stage::StatusOut, Direction::Out) => self.status_out_stage(),
            (stage, direction) => {
                if kernel::config::CONFIG.trace_usb {
                    debug!("usb: ep0 {:?} complete in {:?} stage", direction, stage);
                }
            }
        }
    }

    fn setup_stage(&self) {
        // An address whose status stage never completed is dropped, even if
        // this setup packet turns out to be malformed.
        self.pending_address.clear();

        let count = self.controller.endpoint_received_count(0);
        if count != SETUP_PACKET_LEN {
            if kernel::config::CONFIG.trace_usb {
                debug!("usb: setup packet of {} bytes", count);
            }
            self.stall_control();
            return;
        }

        let mut packet = [0u8; SETUP_PACKET_LEN];
        self.controller.endpoint_read(0, &mut packet);
        let setup = match SetupPacket::parse(&packet) {
            Some(setup) => setup,
            None => {
                self.stall_control();
                return;
            }
        };

        // A new setup aborts whatever was left of the previous transfer.
        self.control.clear();
        self.controller.endpoint_clear_kind(0);
        self.controller
            .endpoint_set_status(0, Direction::In, EndpointStatus::Nak);
        self.control.setup.set(setup);

        if kernel::config::CONFIG.trace_usb {
            debug!(
                "usb: setup {:?} {:#x} {:#x} {:#x} {}",
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                setup.length
            );
        }

        self.dispatch(&setup);
    }

    fn send_next_packet(&self) {
        let position = self.control.position.get();
        let count = min(self.control.remaining.get(), EP0_MAX_PACKET);
        self.control.buffer.map(|buffer| {
            self.controller
                .endpoint_write(0, &buffer[position..position + count]);
        });
        self.control.position.set(position + count);
        self.control.remaining.set(self.control.remaining.get() - count);
    }

    fn data_in_stage(&self) {
        if self.control.remaining.get() > 0 {
            self.send_next_packet();
        } else if self.control.zero_length_packet.get() {
            self.control.zero_length_packet.set(false);
            self.controller.endpoint_write(0, &[]);
        } else {
            // Only a zero-length OUT is accepted as status.
            self.control.stage.set(Stage::StatusOut);
            self.controller.endpoint_set_kind(0);
            self.controller
                .endpoint_set_status(0, Direction::Out, EndpointStatus::Valid);
        }
    }

    fn data_out_stage(&self) {
        let received = self.controller.endpoint_received_count(0);
        let position = self.control.position.get();
        let count = min(min(received, self.control.remaining.get()), EP0_MAX_PACKET);
        let count = self.control.buffer.map_or(0, |buffer| {
            self.controller
                .endpoint_read(0, &mut buffer[position..position + count])
        });
        self.control.position.set(position + count);
        self.control.remaining.set(self.control.remaining.get() - count);

        if self.control.remaining.get() == 0 || received < EP0_MAX_PACKET {
            self.control.stage.set(Stage::StatusIn);
            self.controller.endpoint_write(0, &[]);
        } else {
            self.controller
                .endpoint_set_status(0, Direction::Out, EndpointStatus::Valid);
        }
    }

    fn status_in_stage(&self) {
        if let Some(address) = self.pending_address.take() {
            self.controller.set_address(address);
            match self.state.get() {
                DeviceState::Addressed if address == 0 => self.state.set(DeviceState::Default),
                DeviceState::Default if address != 0 => self.state.set(DeviceState::Addressed),
                _ => {}
            }
            if kernel::config::CONFIG.trace_usb {
                debug!("usb: address {} {:?}", address, self.state.get());
            }
        }

        if let (Some(completion), Some(setup)) =
            (self.control.completion.take(), self.control.setup())
        {
            let len = self.control.position.get();
            self.control.buffer.map(|buffer| {
                completion.control_out_complete(&setup, &buffer[..len]);
            });
        }

        self.control.clear();
        self.controller
            .endpoint_set_status(0, Direction::Out, EndpointStatus::Valid);
    }

    fn status_out_stage(&self) {
        self.controller.endpoint_clear_kind(0);
        self.control.clear();
        self.controller
            .endpoint_set_status(0, Direction::Out, EndpointStatus::Valid);
    }

    /// Refuse the current request. The next setup packet clears the stall.
    pub(crate) fn stall_control(&self) {
        if kernel::config::CONFIG.trace_usb {
            debug!("usb: stall ep0");
        }
        self.controller.endpoint_set_stall(0, Direction::In);
        self.controller.endpoint_set_stall(0, Direction::Out);
        self.control.clear();
    }

    pub(crate) fn prepare_data_in(&self, data: &[u8]) {
        let requested = self.control.requested_length();
        let length = min(min(data.len(), requested), CTRL_BUFFER_LEN);
        let short = length < requested;

        self.control.buffer.map(|buffer| {
            buffer[..length].copy_from_slice(&data[..length]);
        });
        self.control.position.set(0);
        self.control.remaining.set(length);
        self.control
            .zero_length_packet
            .set(short && length > 0 && length % EP0_MAX_PACKET == 0);
        self.control.stage.set(Stage::DataIn);

        // Keep the host from starting the status stage before all data is
        // out.
        let out_status = if !short && length > EP0_MAX_PACKET {
            EndpointStatus::Stall
        } else {
            EndpointStatus::Nak
        };
        self.controller
            .endpoint_set_status(0, Direction::Out, out_status);

        self.send_next_packet();
    }

    pub(crate) fn prepare_data_out(
        &self,
        length: usize,
        completion: Option<&'a dyn ControlOutClient>,
    ) {
        let length = min(min(length, self.control.requested_length()), CTRL_BUFFER_LEN);
        self.control.completion.insert(completion);
        self.control.position.set(0);
        self.control.remaining.set(length);

        if length == 0 {
            self.prepare_status_in();
            return;
        }
        self.control.stage.set(Stage::DataOut);
        self.controller
            .endpoint_set_status(0, Direction::Out, EndpointStatus::Valid);
    }

    pub(crate) fn prepare_status_in(&self) {
        self.control.stage.set(Stage::StatusIn);
        self.controller.endpoint_write(0, &[]);
    }
}
