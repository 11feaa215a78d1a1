// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Software USB controller and class driver for host-side tests.
//!
//! `FakeController` keeps per-endpoint handshake state the way the hardware
//! does: a completed OUT transaction leaves the OUT direction NAK, a
//! completed IN transaction leaves the IN direction NAK. The `host_*`
//! methods play the host side of the bus.

use core::cell::Cell;
use core::ops::Deref;

use kernel::hil::usb::{
    Client, Direction, EndpointConfig, EndpointStatus, TransferType, UsbController, NUM_ENDPOINTS,
};
use kernel::utilities::cells::{MapCell, OptionalCell};
use kernel::ErrorCode;

use crate::descriptors::{
    put_u16, DescriptorBuffer, DeviceDescriptor, LanguagesDescriptor, SetupPacket,
    StringDescriptor,
};
use crate::device::UsbCore;
use crate::driver::{ControlOutClient, EndpointClient, UsbDevice, UsbDriver};

const PMA_SIZE: usize = 1024;
const MAX_PACKET: usize = 64;

#[derive(Copy, Clone)]
pub struct Packet {
    data: [u8; MAX_PACKET],
    len: usize,
}

impl Packet {
    const EMPTY: Packet = Packet {
        data: [0; MAX_PACKET],
        len: 0,
    };

    fn from_slice(bytes: &[u8]) -> Packet {
        assert!(bytes.len() <= MAX_PACKET, "packet of {} bytes", bytes.len());
        let mut packet = Packet::EMPTY;
        packet.data[..bytes.len()].copy_from_slice(bytes);
        packet.len = bytes.len();
        packet
    }
}

impl Deref for Packet {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

pub struct FakeController<'a> {
    client: OptionalCell<&'a dyn Client>,
    enabled: Cell<bool>,
    attached: Cell<bool>,
    status: [[Cell<EndpointStatus>; 2]; NUM_ENDPOINTS],
    kind: [Cell<bool>; NUM_ENDPOINTS],
    transfer_type: [Cell<Option<TransferType>>; NUM_ENDPOINTS],
    tx: [Cell<Packet>; NUM_ENDPOINTS],
    rx: [Cell<Packet>; NUM_ENDPOINTS],
    address: Cell<Option<u8>>,
    pma: MapCell<[u8; PMA_SIZE]>,
}

impl<'a> FakeController<'a> {
    pub fn new() -> Self {
        FakeController {
            client: OptionalCell::empty(),
            enabled: Cell::new(false),
            attached: Cell::new(false),
            status: core::array::from_fn(|_| {
                [
                    Cell::new(EndpointStatus::Disabled),
                    Cell::new(EndpointStatus::Disabled),
                ]
            }),
            kind: core::array::from_fn(|_| Cell::new(false)),
            transfer_type: core::array::from_fn(|_| Cell::new(None)),
            tx: core::array::from_fn(|_| Cell::new(Packet::EMPTY)),
            rx: core::array::from_fn(|_| Cell::new(Packet::EMPTY)),
            address: Cell::new(None),
            pma: MapCell::new([0; PMA_SIZE]),
        }
    }

    fn client(&self) -> &'a dyn Client {
        self.client.expect("no client installed")
    }

    pub fn enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn attached(&self) -> bool {
        self.attached.get()
    }

    pub fn status(&self, endpoint: usize, direction: Direction) -> EndpointStatus {
        self.status[endpoint][direction as usize].get()
    }

    pub fn kind(&self, endpoint: usize) -> bool {
        self.kind[endpoint].get()
    }

    pub fn transfer_type(&self, endpoint: usize) -> Option<TransferType> {
        self.transfer_type[endpoint].get()
    }

    pub fn address(&self) -> Option<u8> {
        self.address.get()
    }

    /// Endpoint 0 answered the last request with STALL.
    pub fn is_stalled(&self, endpoint: usize) -> bool {
        self.status(endpoint, Direction::In) == EndpointStatus::Stall
    }

    fn set(&self, endpoint: usize, direction: Direction, status: EndpointStatus) {
        self.status[endpoint][direction as usize].set(status);
    }

    pub fn host_reset(&self) {
        self.client().bus_reset();
    }

    /// A SETUP transaction is always accepted, whatever the OUT status.
    pub fn host_setup(&self, packet: &[u8]) {
        self.rx[0].set(Packet::from_slice(packet));
        self.set(0, Direction::Out, EndpointStatus::Nak);
        self.client().transfer_complete(0, Direction::Out, true);
    }

    pub fn host_out(&self, endpoint: usize, data: &[u8]) {
        assert_eq!(
            self.status(endpoint, Direction::Out),
            EndpointStatus::Valid,
            "OUT on endpoint {} not accepted",
            endpoint
        );
        self.rx[endpoint].set(Packet::from_slice(data));
        self.set(endpoint, Direction::Out, EndpointStatus::Nak);
        self.client()
            .transfer_complete(endpoint, Direction::Out, false);
    }

    pub fn host_in(&self, endpoint: usize) -> Packet {
        assert_eq!(
            self.status(endpoint, Direction::In),
            EndpointStatus::Valid,
            "IN on endpoint {} not armed",
            endpoint
        );
        let packet = self.tx[endpoint].get();
        self.set(endpoint, Direction::In, EndpointStatus::Nak);
        self.client()
            .transfer_complete(endpoint, Direction::In, false);
        packet
    }
}

impl<'a> UsbController<'a> for FakeController<'a> {
    fn set_client(&self, client: &'a dyn Client) {
        self.client.set(client);
    }

    fn enable(&self) {
        self.enabled.set(true);
    }

    fn attach(&self) {
        self.attached.set(true);
    }

    fn detach(&self) {
        self.attached.set(false);
    }

    fn endpoint_configure(&self, endpoint: usize, config: EndpointConfig) {
        let (transfer_type, rx_status, tx_status, kind) = match config {
            EndpointConfig::Single {
                transfer_type,
                tx,
                rx,
            } => (
                transfer_type,
                rx.map_or(EndpointStatus::Disabled, |_| EndpointStatus::Valid),
                tx.map_or(EndpointStatus::Disabled, |_| EndpointStatus::Nak),
                false,
            ),
            EndpointConfig::DoubleTx { transfer_type, .. }
            | EndpointConfig::DoubleRx { transfer_type, .. } => (
                transfer_type,
                EndpointStatus::Disabled,
                EndpointStatus::Disabled,
                transfer_type == TransferType::Bulk,
            ),
        };
        self.transfer_type[endpoint].set(Some(transfer_type));
        self.set(endpoint, Direction::Out, rx_status);
        self.set(endpoint, Direction::In, tx_status);
        self.kind[endpoint].set(kind);
    }

    fn endpoint_clear_configuration(&self, endpoint: usize) {
        self.transfer_type[endpoint].set(None);
        self.set(endpoint, Direction::Out, EndpointStatus::Disabled);
        self.set(endpoint, Direction::In, EndpointStatus::Disabled);
        self.kind[endpoint].set(false);
    }

    fn endpoint_set_status(&self, endpoint: usize, direction: Direction, status: EndpointStatus) {
        self.set(endpoint, direction, status);
    }

    fn endpoint_status(&self, endpoint: usize, direction: Direction) -> EndpointStatus {
        self.status(endpoint, direction)
    }

    fn endpoint_set_stall(&self, endpoint: usize, direction: Direction) {
        if self.status(endpoint, direction) != EndpointStatus::Disabled {
            self.set(endpoint, direction, EndpointStatus::Stall);
        }
    }

    fn endpoint_clear_stall(&self, endpoint: usize, direction: Direction) {
        if self.status(endpoint, direction) == EndpointStatus::Stall {
            let status = match direction {
                Direction::Out => EndpointStatus::Valid,
                Direction::In => EndpointStatus::Nak,
            };
            self.set(endpoint, direction, status);
        }
    }

    fn endpoint_is_stalled(&self, endpoint: usize, direction: Direction) -> bool {
        self.status(endpoint, direction) == EndpointStatus::Stall
    }

    fn endpoint_set_kind(&self, endpoint: usize) {
        self.kind[endpoint].set(true);
    }

    fn endpoint_clear_kind(&self, endpoint: usize) {
        self.kind[endpoint].set(false);
    }

    fn endpoint_write(&self, endpoint: usize, data: &[u8]) {
        self.tx[endpoint].set(Packet::from_slice(data));
        self.set(endpoint, Direction::In, EndpointStatus::Valid);
    }

    fn endpoint_read(&self, endpoint: usize, buf: &mut [u8]) -> usize {
        let packet = self.rx[endpoint].get();
        let count = packet.len.min(buf.len());
        buf[..count].copy_from_slice(&packet.data[..count]);
        count
    }

    fn endpoint_received_count(&self, endpoint: usize) -> usize {
        self.rx[endpoint].get().len
    }

    fn set_address(&self, address: u8) {
        self.address.set(Some(address));
    }

    fn pma_size(&self) -> usize {
        PMA_SIZE
    }

    fn pma_read(&self, offset: usize, buf: &mut [u8]) {
        self.pma.map(|pma| {
            let len = buf.len().min(PMA_SIZE - offset);
            buf[..len].copy_from_slice(&pma[offset..offset + len]);
        });
    }

    fn pma_write(&self, offset: usize, data: &[u8]) {
        self.pma.map(|pma| {
            let len = data.len().min(PMA_SIZE - offset);
            pma[offset..offset + len].copy_from_slice(&data[..len]);
        });
    }
}

/// SET_ADDRESS through its status stage.
pub fn address(fake: &FakeController, address: u8) {
    fake.host_setup(&[0x00, 0x05, address, 0, 0, 0, 0, 0]);
    fake.host_in(0);
}

/// SET_CONFIGURATION through its status stage.
pub fn configure(fake: &FakeController, configuration: u8) {
    fake.host_setup(&[0x00, 0x09, configuration, 0, 0, 0, 0, 0]);
    fake.host_in(0);
}

/// Class request codes understood by [`FakeDriver`].
pub const FAKE_CLASS_WRITE: u8 = 0x55;
pub const FAKE_CLASS_READ: u8 = 0x56;

/// A minimal class driver: one interface, an interrupt IN endpoint 1 in
/// configuration 1, a class write and a class read request.
pub struct FakeDriver<'a> {
    core: &'a UsbCore<'a, FakeController<'a>>,
    device: DescriptorBuffer,
    configuration_descriptor: [u8; 256],
    languages: DescriptorBuffer,
    product: DescriptorBuffer,
    configuration: Cell<u8>,
    remote_wakeup: Cell<bool>,
    requests: Cell<usize>,
    resets: Cell<usize>,
    cleared_stalls: Cell<usize>,
    packets_in: Cell<usize>,
    packets_out: Cell<usize>,
    received: Cell<Option<(usize, u8, u8)>>,
}

impl<'a> FakeDriver<'a> {
    pub fn new(core: &'a UsbCore<'a, FakeController<'a>>) -> Self {
        Self::with_configuration_len(core, 32)
    }

    /// The configuration descriptor reports `len` as its total length.
    pub fn with_configuration_len(core: &'a UsbCore<'a, FakeController<'a>>, len: usize) -> Self {
        let mut configuration_descriptor = [0u8; 256];
        for (i, byte) in configuration_descriptor.iter_mut().enumerate() {
            *byte = i as u8;
        }
        configuration_descriptor[0] = 9;
        configuration_descriptor[1] = 2;
        put_u16(&mut configuration_descriptor[2..4], len as u16);

        FakeDriver {
            core,
            device: DescriptorBuffer::from_descriptor(&DeviceDescriptor::default()),
            configuration_descriptor,
            languages: DescriptorBuffer::from_descriptor(&LanguagesDescriptor { langs: &[0x0409] }),
            product: DescriptorBuffer::from_descriptor(&StringDescriptor { string: "Fake" }),
            configuration: Cell::new(0),
            remote_wakeup: Cell::new(false),
            requests: Cell::new(0),
            resets: Cell::new(0),
            cleared_stalls: Cell::new(0),
            packets_in: Cell::new(0),
            packets_out: Cell::new(0),
            received: Cell::new(None),
        }
    }

    /// Class and vendor requests seen so far.
    pub fn requests(&self) -> usize {
        self.requests.get()
    }

    pub fn resets(&self) -> usize {
        self.resets.get()
    }

    pub fn cleared_stalls(&self) -> usize {
        self.cleared_stalls.get()
    }

    pub fn packets(&self) -> (usize, usize) {
        (self.packets_in.get(), self.packets_out.get())
    }

    /// Length, first and last byte of the last completed control write.
    pub fn received(&self) -> Option<(usize, u8, u8)> {
        self.received.get()
    }
}

impl<'a> UsbDriver<'a> for FakeDriver<'a> {
    fn is_self_powered(&self) -> bool {
        true
    }

    fn set_remote_wakeup(&self, enabled: bool) {
        self.remote_wakeup.set(enabled);
    }

    fn get_remote_wakeup(&self) -> bool {
        self.remote_wakeup.get()
    }

    fn is_interface_valid(&self, interface: u8) -> bool {
        interface == 0
    }

    fn is_endpoint_valid(&self, endpoint: usize, direction: Direction) -> bool {
        endpoint == 1 && direction == Direction::In
    }

    fn clear_stall(&self, _endpoint: usize, _direction: Direction) {
        self.cleared_stalls.set(self.cleared_stalls.get() + 1);
    }

    fn device_descriptor(&self) -> Option<&[u8]> {
        Some(self.device.as_slice())
    }

    fn configuration_descriptor(&self, index: u8) -> Option<&[u8]> {
        match index {
            0 => Some(&self.configuration_descriptor[..]),
            _ => None,
        }
    }

    fn string_descriptor(&self, index: u8, _lang_id: u16) -> Option<&[u8]> {
        match index {
            0 => Some(self.languages.as_slice()),
            1 => Some(self.product.as_slice()),
            _ => None,
        }
    }

    fn set_descriptor(&self, _setup: &SetupPacket) -> Result<(), ErrorCode> {
        self.core.prepare_status_in_stage();
        Ok(())
    }

    fn get_configuration(&self) -> u8 {
        self.configuration.get()
    }

    fn is_configuration_valid(&self, configuration: u8) -> bool {
        configuration <= 1
    }

    fn set_configuration(&'a self, configuration: u8) {
        self.configuration.set(configuration);
        if configuration == 1 {
            self.core
                .register_endpoint_tx(1, TransferType::Interrupt, 192, self);
        } else {
            self.core.unregister_endpoint(1);
        }
    }

    fn class_request(&'a self, setup: &SetupPacket) -> Result<(), ErrorCode> {
        self.requests.set(self.requests.get() + 1);
        match setup.request {
            FAKE_CLASS_WRITE => {
                self.core
                    .prepare_data_out_stage(setup.length as usize, Some(self));
                Ok(())
            }
            FAKE_CLASS_READ => {
                self.core.prepare_data_in_stage(&[0xA5; 3]);
                Ok(())
            }
            _ => Err(ErrorCode::NOSUPPORT),
        }
    }

    fn vendor_request(&'a self, setup: &SetupPacket) -> Result<(), ErrorCode> {
        self.requests.set(self.requests.get() + 1);
        match setup.request {
            1 => {
                self.core.prepare_status_in_stage();
                Ok(())
            }
            _ => Err(ErrorCode::NOSUPPORT),
        }
    }

    fn bus_reset(&self) {
        self.resets.set(self.resets.get() + 1);
        self.configuration.set(0);
    }
}

impl EndpointClient for FakeDriver<'_> {
    fn packet_in(&self, _endpoint: usize) {
        self.packets_in.set(self.packets_in.get() + 1);
    }

    fn packet_out(&self, _endpoint: usize) {
        self.packets_out.set(self.packets_out.get() + 1);
    }
}

impl ControlOutClient for FakeDriver<'_> {
    fn control_out_complete(&self, _setup: &SetupPacket, data: &[u8]) {
        let first = data.first().copied().unwrap_or(0);
        let last = data.last().copied().unwrap_or(0);
        self.received.set(Some((data.len(), first, last)));
    }
}

