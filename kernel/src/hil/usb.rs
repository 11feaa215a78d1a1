// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Interface to USB full-speed device controller hardware.
//!
//! The controller is modeled after peripherals that keep endpoint data in a
//! dedicated packet memory area (PMA) and expose one control register per
//! endpoint. A capsule drives the USB protocol through [`UsbController`] and
//! receives bus events through [`Client`].
//!
//! Endpoint numbers are `0..NUM_ENDPOINTS`. PMA offsets are byte offsets from
//! the start of packet memory.

/// Number of endpoint register pairs provided by the controller.
pub const NUM_ENDPOINTS: usize = 8;

/// Transfer type of an endpoint, encoded as in the endpoint descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferType {
    Control = 0,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Direction of an endpoint, from the point of view of the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Host to device
    Out = 0,
    /// Device to host
    In = 1,
}

impl Direction {
    /// Decode the direction bit (bit 7) of an endpoint address.
    pub fn from_endpoint_address(address: u16) -> Direction {
        if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// Handshake the hardware answers with on one direction of an endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndpointStatus {
    /// All requests are ignored.
    Disabled = 0,
    /// All requests are answered with STALL.
    Stall = 1,
    /// All requests are answered with NAK.
    Nak = 2,
    /// The endpoint is armed for one transaction.
    Valid = 3,
}

/// Buffer layout of an endpoint in packet memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndpointConfig {
    /// One buffer per direction. A direction without a buffer is left
    /// disabled.
    Single {
        transfer_type: TransferType,
        /// PMA offset of the IN buffer
        tx: Option<u16>,
        /// PMA offset and size of the OUT buffer
        rx: Option<(u16, u16)>,
    },
    /// Two alternating IN buffers. Both directions start disabled.
    DoubleTx {
        transfer_type: TransferType,
        buffers: (u16, u16),
    },
    /// Two alternating OUT buffers of `rx_count` bytes each. Both directions
    /// start disabled.
    DoubleRx {
        transfer_type: TransferType,
        buffers: (u16, u16),
        rx_count: u16,
    },
}

/// USB device controller interface.
///
/// All methods run to completion. None of them block on the bus.
pub trait UsbController<'a> {
    fn set_client(&self, client: &'a dyn Client);

    /// Power up the peripheral, clear packet memory and unmask the
    /// interrupts the client needs. The device stays invisible to the host
    /// until [`UsbController::attach`] is called.
    fn enable(&self);

    /// Signal presence to the host (enable the D+ pull-up).
    fn attach(&self);

    fn detach(&self);

    /// Program buffer descriptors and the endpoint register for `endpoint`.
    /// Data toggles are reset.
    fn endpoint_configure(&self, endpoint: usize, config: EndpointConfig);

    /// Return `endpoint` to its reset state: no buffers, both directions
    /// disabled, pending transfer-complete flags cleared.
    fn endpoint_clear_configuration(&self, endpoint: usize);

    fn endpoint_set_status(&self, endpoint: usize, direction: Direction, status: EndpointStatus);

    fn endpoint_status(&self, endpoint: usize, direction: Direction) -> EndpointStatus;

    /// Halt one direction. Has no effect on a disabled direction.
    fn endpoint_set_stall(&self, endpoint: usize, direction: Direction);

    /// Leave the halted state and reset the data toggle. Has no effect unless
    /// the direction is currently stalled.
    fn endpoint_clear_stall(&self, endpoint: usize, direction: Direction);

    fn endpoint_is_stalled(&self, endpoint: usize, direction: Direction) -> bool;

    /// Set the kind bit. On a control endpoint this means only zero-length
    /// OUT packets are accepted (status-out expected).
    fn endpoint_set_kind(&self, endpoint: usize);

    fn endpoint_clear_kind(&self, endpoint: usize);

    /// Copy `data` into the IN buffer of `endpoint`, set the transmit count
    /// and arm the IN direction.
    fn endpoint_write(&self, endpoint: usize, data: &[u8]);

    /// Copy the last received OUT packet into `buf`. Returns the number of
    /// bytes copied, which is never more than the received count or
    /// `buf.len()`. The OUT direction is not re-armed.
    fn endpoint_read(&self, endpoint: usize, buf: &mut [u8]) -> usize;

    /// Number of bytes in the last OUT packet received on `endpoint`.
    fn endpoint_received_count(&self, endpoint: usize) -> usize;

    /// Enable the function and respond on `address` from now on.
    fn set_address(&self, address: u8);

    /// Size of the packet memory area in bytes.
    fn pma_size(&self) -> usize;

    /// Raw copy out of packet memory. No bounds checking beyond the PMA size.
    fn pma_read(&self, offset: usize, buf: &mut [u8]);

    /// Raw copy into packet memory. No bounds checking beyond the PMA size.
    fn pma_write(&self, offset: usize, data: &[u8]);
}

/// Events raised by the controller interrupt handler.
///
/// Within one interrupt, events are delivered in the order transfer
/// complete, reset, wakeup, suspend, start-of-frame.
pub trait Client {
    /// A transaction finished on `endpoint`. The transfer-complete flag is
    /// already cleared. `setup` is true if the OUT transaction carried a
    /// SETUP token.
    fn transfer_complete(&self, endpoint: usize, direction: Direction, setup: bool);

    fn bus_reset(&self);

    fn wakeup(&self);

    fn suspend(&self);

    fn start_of_frame(&self);
}
