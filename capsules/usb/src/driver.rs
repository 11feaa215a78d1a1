// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Interfaces between the USB device core and the class drivers built on
//! top of it.
//!
//! ```text
//!   +-----------------+   UsbDriver (requests, descriptors, bus events)
//!   |   class driver  | <------------------------------------------+
//!   +-----------------+                                            |
//!        |  UsbDevice (endpoints, control stages)                 |
//!        v                                                         |
//!   +-----------------+   EndpointClient / ControlOutClient        |
//!   |  device::UsbCore | --------------------------------------------+
//!   +-----------------+
//!        |  hil::usb::UsbController
//!        v
//!     hardware
//! ```

use kernel::hil::usb::{Direction, TransferType};
use kernel::ErrorCode;

use crate::descriptors::SetupPacket;

/// Device and class specific knowledge the core consults while handling
/// standard requests, plus the targets for class and vendor requests.
///
/// Methods with a default body are optional. A descriptor getter returning
/// `None` and a request handler returning `Err` both stall endpoint 0.
///
/// Methods that may register endpoints or stage a control transfer take
/// `&'a self`, so the driver can hand itself to the core as a client.
pub trait UsbDriver<'a> {
    fn is_self_powered(&self) -> bool;

    fn set_remote_wakeup(&self, _enabled: bool) {}

    fn get_remote_wakeup(&self) -> bool {
        false
    }

    fn is_interface_valid(&self, interface: u8) -> bool;

    fn is_endpoint_valid(&self, endpoint: usize, direction: Direction) -> bool;

    /// The host cleared the halt feature of an endpoint. The hardware
    /// stall is already cleared.
    fn clear_stall(&self, endpoint: usize, direction: Direction);

    fn device_descriptor(&self) -> Option<&[u8]>;

    fn configuration_descriptor(&self, index: u8) -> Option<&[u8]>;

    fn string_descriptor(&self, _index: u8, _lang_id: u16) -> Option<&[u8]> {
        None
    }

    fn bos_descriptor(&self) -> Option<&[u8]> {
        None
    }

    fn set_descriptor(&self, _setup: &SetupPacket) -> Result<(), ErrorCode> {
        Err(ErrorCode::NOSUPPORT)
    }

    fn get_configuration(&self) -> u8;

    fn is_configuration_valid(&self, configuration: u8) -> bool;

    fn set_configuration(&'a self, configuration: u8);

    /// Current alternate setting of `interface`.
    fn get_interface(&self, _interface: u8) -> u8 {
        0
    }

    fn set_interface(&self, _interface: u8, alternate: u8) -> Result<(), ErrorCode> {
        if alternate == 0 {
            Ok(())
        } else {
            Err(ErrorCode::INVAL)
        }
    }

    /// Handle a class request. On success the driver must have staged the
    /// rest of the transfer through one of the `prepare_*_stage` methods of
    /// [`UsbDevice`].
    fn class_request(&'a self, setup: &SetupPacket) -> Result<(), ErrorCode>;

    /// Handle a vendor request, with the same contract as
    /// [`UsbDriver::class_request`].
    fn vendor_request(&'a self, setup: &SetupPacket) -> Result<(), ErrorCode>;

    /// Called after the core has returned to the default state.
    fn bus_reset(&self) {}

    fn suspend(&self) {}

    fn wakeup(&self) {}

    fn start_of_frame(&self) {}
}

/// Completion callbacks of a data endpoint.
pub trait EndpointClient {
    /// An IN packet was sent and acknowledged.
    fn packet_in(&self, _endpoint: usize) {}

    /// An OUT packet was received. The OUT direction stays NAK until
    /// [`UsbDevice::endpoint_resume_out`] is called.
    fn packet_out(&self, _endpoint: usize) {}
}

/// Receives the data of a control write once its status stage completed.
pub trait ControlOutClient {
    fn control_out_complete(&self, setup: &SetupPacket, data: &[u8]);
}

/// Services the USB device core offers to class drivers.
///
/// PMA offsets are byte offsets and must be even. Every registration
/// precondition is checked and a violation panics.
pub trait UsbDevice<'a> {
    /// Register a bidirectional endpoint with single buffers.
    fn register_endpoint(
        &self,
        endpoint: usize,
        transfer_type: TransferType,
        tx: u16,
        rx: u16,
        rx_count: u16,
        client: &'a dyn EndpointClient,
    );

    /// Register an IN only endpoint.
    fn register_endpoint_tx(
        &self,
        endpoint: usize,
        transfer_type: TransferType,
        tx: u16,
        client: &'a dyn EndpointClient,
    );

    /// Register an OUT only endpoint.
    fn register_endpoint_rx(
        &self,
        endpoint: usize,
        transfer_type: TransferType,
        rx: u16,
        rx_count: u16,
        client: &'a dyn EndpointClient,
    );

    /// Register a double-buffered IN endpoint. Only bulk and isochronous
    /// endpoints can be double-buffered.
    fn register_endpoint_double_tx(
        &self,
        endpoint: usize,
        transfer_type: TransferType,
        buffers: (u16, u16),
        client: &'a dyn EndpointClient,
    );

    /// Register a double-buffered OUT endpoint.
    fn register_endpoint_double_rx(
        &self,
        endpoint: usize,
        transfer_type: TransferType,
        buffers: (u16, u16),
        rx_count: u16,
        client: &'a dyn EndpointClient,
    );

    fn unregister_endpoint(&self, endpoint: usize);

    fn pma_read(&self, offset: usize, buf: &mut [u8]);

    fn pma_write(&self, offset: usize, data: &[u8]);

    /// Answer the current control read with `data`. The response is
    /// truncated to the host's `wLength`.
    fn prepare_data_in_stage(&self, data: &[u8]);

    /// Receive up to `length` bytes for the current control write. The data
    /// is handed to `completion` once the status stage has completed.
    fn prepare_data_out_stage(&self, length: usize, completion: Option<&'a dyn ControlOutClient>);

    /// Acknowledge the current request without a data stage.
    fn prepare_status_in_stage(&self);

    /// Send `data` as the next IN packet of `endpoint`.
    fn endpoint_transmit(&self, endpoint: usize, data: &[u8]);

    /// Copy the last OUT packet of `endpoint` into `buf`.
    fn endpoint_receive(&self, endpoint: usize, buf: &mut [u8]) -> usize;

    /// Accept the next OUT packet on `endpoint`.
    fn endpoint_resume_out(&self, endpoint: usize);
}
