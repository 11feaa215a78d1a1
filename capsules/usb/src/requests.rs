// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Setup packet dispatch and the chapter 9 standard requests.
//!
//! Any request that is not legal in the current device state, or that the
//! driver refuses, is answered by stalling endpoint 0.

use core::cmp::min;

use kernel::debug;
use kernel::hil::usb::{Direction, UsbController, NUM_ENDPOINTS};

use crate::descriptors::{get_u16, DescriptorType, FeatureSelector, Recipient, SetupPacket};
use crate::device::UsbCore;
use crate::state::{DeviceState, Request, RequestHandler};

/// Self-reported length of a descriptor that starts with `bLength`.
fn length_field(descriptor: &[u8]) -> usize {
    descriptor.first().map_or(0, |len| *len as usize)
}

/// `wTotalLength` of a configuration or BOS descriptor.
fn total_length_field(descriptor: &[u8]) -> usize {
    match descriptor {
        [_, _, low, high, ..] => get_u16(*low, *high) as usize,
        _ => 0,
    }
}

/// Endpoint number and direction addressed by `wIndex`.
fn endpoint_of(setup: &SetupPacket) -> (usize, Direction) {
    (
        (setup.index & 0x0F) as usize,
        Direction::from_endpoint_address(setup.index),
    )
}

fn interface_of(setup: &SetupPacket) -> u8 {
    (setup.index & 0x7F) as u8
}

impl<'a, C: UsbController<'a>> UsbCore<'a, C> {
    pub(crate) fn dispatch(&self, setup: &SetupPacket) {
        let handler: Option<RequestHandler<'a, C>> =
            Request::decode(setup).and_then(|request| self.state.get().request_handler(request));
        match handler {
            Some(handler) => handler(self, setup),
            None => {
                if kernel::config::CONFIG.trace_usb {
                    debug!(
                        "usb: request {:#x} not allowed in {:?}",
                        setup.request,
                        self.state.get()
                    );
                }
                self.stall_control();
            }
        }
    }

    fn endpoint_is_valid(&self, endpoint: usize, direction: Direction) -> bool {
        endpoint < NUM_ENDPOINTS && self.driver().is_endpoint_valid(endpoint, direction)
    }

    pub(crate) fn get_status(&self, setup: &SetupPacket) {
        let driver = self.driver();
        let mut status = [0u8; 2];
        match setup.request_type.recipient() {
            Recipient::Device => {
                status[0] =
                    ((driver.get_remote_wakeup() as u8) << 1) | driver.is_self_powered() as u8;
            }
            Recipient::Interface => {
                if !driver.is_interface_valid(interface_of(setup)) {
                    self.stall_control();
                    return;
                }
            }
            Recipient::Endpoint => {
                let (endpoint, direction) = endpoint_of(setup);
                if endpoint != 0 && !self.endpoint_is_valid(endpoint, direction) {
                    self.stall_control();
                    return;
                }
                status[0] = self.controller.endpoint_is_stalled(endpoint, direction) as u8;
            }
            _ => {
                self.stall_control();
                return;
            }
        }
        self.prepare_data_in(&status);
    }

    pub(crate) fn clear_feature(&self, setup: &SetupPacket) {
        let driver = self.driver();
        match (
            setup.request_type.recipient(),
            FeatureSelector::get(setup.value),
        ) {
            (Recipient::Device, FeatureSelector::DeviceRemoteWakeup) => {
                driver.set_remote_wakeup(false);
            }
            (Recipient::Endpoint, FeatureSelector::EndpointHalt) => {
                let (endpoint, direction) = endpoint_of(setup);
                if !self.endpoint_is_valid(endpoint, direction) {
                    self.stall_control();
                    return;
                }
                self.controller.endpoint_clear_stall(endpoint, direction);
                driver.clear_stall(endpoint, direction);
            }
            _ => {
                self.stall_control();
                return;
            }
        }
        self.prepare_status_in();
    }

    pub(crate) fn set_feature(&self, setup: &SetupPacket) {
        match (
            setup.request_type.recipient(),
            FeatureSelector::get(setup.value),
        ) {
            (Recipient::Device, FeatureSelector::DeviceRemoteWakeup) => {
                self.driver().set_remote_wakeup(true);
            }
            (Recipient::Endpoint, FeatureSelector::EndpointHalt) => {
                let (endpoint, direction) = endpoint_of(setup);
                if !self.endpoint_is_valid(endpoint, direction) {
                    self.stall_control();
                    return;
                }
                self.controller.endpoint_set_stall(endpoint, direction);
            }
            _ => {
                self.stall_control();
                return;
            }
        }
        self.prepare_status_in();
    }

    /// The address only takes effect once the status stage is acknowledged,
    /// the host still talks to the old address until then.
    pub(crate) fn set_address_request(&self, setup: &SetupPacket) {
        if setup.value > 0x7F {
            self.stall_control();
            return;
        }
        self.pending_address.set(setup.value as u8);
        self.prepare_status_in();
    }

    pub(crate) fn get_descriptor(&self, setup: &SetupPacket) {
        let driver = self.driver();
        let index = setup.descriptor_index();
        let descriptor = match DescriptorType::from_u8(setup.descriptor_type()) {
            Some(DescriptorType::Device) => driver
                .device_descriptor()
                .map(|d| (d, length_field(d))),
            Some(DescriptorType::Configuration) => driver
                .configuration_descriptor(index)
                .map(|d| (d, total_length_field(d))),
            Some(DescriptorType::String) => driver
                .string_descriptor(index, setup.index)
                .map(|d| (d, length_field(d))),
            Some(DescriptorType::Bos) => driver
                .bos_descriptor()
                .map(|d| (d, total_length_field(d))),
            _ => None,
        };

        match descriptor {
            Some((descriptor, length)) => {
                let length = min(length, descriptor.len());
                self.prepare_data_in(&descriptor[..length]);
            }
            None => self.stall_control(),
        }
    }

    pub(crate) fn set_descriptor(&self, setup: &SetupPacket) {
        if self.driver().set_descriptor(setup).is_err() {
            self.stall_control();
        }
    }

    pub(crate) fn get_configuration(&self, _setup: &SetupPacket) {
        let configuration = self.driver().get_configuration();
        self.prepare_data_in(&[configuration]);
    }

    pub(crate) fn set_configuration(&self, setup: &SetupPacket) {
        let driver = self.driver();
        let configuration = (setup.value & 0xFF) as u8;
        if configuration != 0 && !driver.is_configuration_valid(configuration) {
            self.stall_control();
            return;
        }
        driver.set_configuration(configuration);
        self.set_state(if configuration != 0 {
            DeviceState::Configured
        } else {
            DeviceState::Addressed
        });
        self.prepare_status_in();
    }

    pub(crate) fn get_interface(&self, setup: &SetupPacket) {
        let driver = self.driver();
        let interface = interface_of(setup);
        if !driver.is_interface_valid(interface) {
            self.stall_control();
            return;
        }
        self.prepare_data_in(&[driver.get_interface(interface)]);
    }

    pub(crate) fn set_interface(&self, setup: &SetupPacket) {
        let driver = self.driver();
        let interface = interface_of(setup);
        let alternate = (setup.value & 0xFF) as u8;
        if !driver.is_interface_valid(interface)
            || driver.set_interface(interface, alternate).is_err()
        {
            self.stall_control();
            return;
        }
        self.prepare_status_in();
    }

    /// Frame numbers are not tracked, so isochronous synchronization is
    /// unsupported.
    pub(crate) fn synch_frame(&self, _setup: &SetupPacket) {
        self.stall_control();
    }

    pub(crate) fn class_request(&self, setup: &SetupPacket) {
        if self.driver().class_request(setup).is_err() {
            self.stall_control();
        }
    }

    pub(crate) fn vendor_request(&self, setup: &SetupPacket) {
        if self.driver().vendor_request(setup).is_err() {
            self.stall_control();
        }
    }
}
