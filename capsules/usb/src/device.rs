// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! The USB device core.
//!
//! `UsbCore` is the single owner of the device state, the control transfer
//! context and the endpoint table. All of them are only changed from the
//! controller's interrupt path, through the [`hil::usb::Client`]
//! callbacks, or by a class driver while it is being called from there.

use core::cell::Cell;

use kernel::debug;
use kernel::hil;
use kernel::hil::usb::{Direction, EndpointConfig, EndpointStatus, TransferType, NUM_ENDPOINTS};
use kernel::utilities::cells::OptionalCell;

use crate::control::{ControlTransfer, Stage};
use crate::driver::{ControlOutClient, EndpointClient, UsbDevice, UsbDriver};
use crate::endpoint_table::{EndpointTable, Handler};
use crate::state::DeviceState;

/// Max packet size of endpoint 0.
pub const EP0_MAX_PACKET: usize = 64;

/// PMA offset of the endpoint 0 IN buffer.
pub const ADDR0_TX: u16 = 64;

/// PMA offset of the endpoint 0 OUT buffer.
pub const ADDR0_RX: u16 = 128;

/// Bytes at the start of packet memory taken by the buffer descriptor
/// table.
const BTABLE_SIZE: usize = NUM_ENDPOINTS * 8;

/// Largest bulk or interrupt packet at full speed. Every IN buffer has to
/// hold one.
const MAX_PACKET: usize = 64;

/// Largest OUT buffer a buffer descriptor can describe.
const MAX_RX_COUNT: u16 = 0x3FF;

pub struct UsbCore<'a, C: hil::usb::UsbController<'a>> {
    pub(crate) controller: &'a C,
    driver: OptionalCell<&'a dyn UsbDriver<'a>>,
    endpoints: EndpointTable<'a>,
    pub(crate) control: ControlTransfer<'a>,
    pub(crate) state: Cell<DeviceState>,
    previous_state: OptionalCell<DeviceState>,
    /// Address from SET_ADDRESS, applied once its status stage completes.
    pub(crate) pending_address: OptionalCell<u8>,
}

impl<'a, C: hil::usb::UsbController<'a>> UsbCore<'a, C> {
    pub fn new(controller: &'a C) -> Self {
        UsbCore {
            controller,
            driver: OptionalCell::empty(),
            endpoints: EndpointTable::new(),
            control: ControlTransfer::new(),
            state: Cell::new(DeviceState::Default),
            previous_state: OptionalCell::empty(),
            pending_address: OptionalCell::empty(),
        }
    }

    /// Install `driver`, power up the controller and attach to the bus.
    /// Enumeration starts with the first bus reset from the host.
    pub fn init(&'a self, driver: &'a dyn UsbDriver<'a>) {
        self.driver.set(driver);
        self.controller.set_client(self);
        self.controller.enable();
        self.controller.attach();
    }

    pub fn state(&self) -> DeviceState {
        self.state.get()
    }

    pub fn stage(&self) -> Stage {
        self.control.stage()
    }

    pub(crate) fn driver(&self) -> &'a dyn UsbDriver<'a> {
        self.driver
            .unwrap_or_else(|| panic!("USB: no driver installed, call UsbCore::init"))
    }

    pub(crate) fn set_state(&self, state: DeviceState) {
        self.state.set(state);
    }

    fn check_pma_window(&self, offset: u16, len: usize) {
        let offset = offset as usize;
        if offset < BTABLE_SIZE || offset % 2 != 0 || offset + len > self.controller.pma_size() {
            panic!(
                "USB: PMA buffer {}+{} overlaps the descriptor table or leaves packet memory",
                offset, len
            );
        }
    }

    fn check_endpoint(&self, endpoint: usize, transfer_type: TransferType) {
        assert!(endpoint < NUM_ENDPOINTS, "USB: no endpoint {}", endpoint);
        assert!(
            endpoint != 0 && transfer_type != TransferType::Control,
            "USB: endpoint 0 and control transfers are reserved for the device core"
        );
    }

    fn check_single(&self, endpoint: usize, transfer_type: TransferType) {
        self.check_endpoint(endpoint, transfer_type);
        assert!(
            transfer_type != TransferType::Isochronous,
            "USB: isochronous endpoint {} must be double-buffered",
            endpoint
        );
    }

    fn check_double(&self, endpoint: usize, transfer_type: TransferType) {
        self.check_endpoint(endpoint, transfer_type);
        assert!(
            matches!(
                transfer_type,
                TransferType::Bulk | TransferType::Isochronous
            ),
            "USB: endpoint {} of type {:?} cannot be double-buffered",
            endpoint,
            transfer_type
        );
    }

    fn check_rx_count(rx_count: u16) {
        assert!(
            rx_count > 0 && rx_count <= MAX_RX_COUNT,
            "USB: invalid OUT buffer size {}",
            rx_count
        );
    }

    /// Endpoint 0, as it is set up after every bus reset.
    fn configure_control_endpoint(&self) {
        self.controller.endpoint_configure(
            0,
            EndpointConfig::Single {
                transfer_type: TransferType::Control,
                tx: Some(ADDR0_TX),
                rx: Some((ADDR0_RX, EP0_MAX_PACKET as u16)),
            },
        );
        self.endpoints.set(0, Direction::In, Handler::Control);
        self.endpoints.set(0, Direction::Out, Handler::Control);
    }

    /// Number of endpoints that currently have a handler.
    pub fn registered_endpoints(&self) -> usize {
        self.endpoints.registered()
    }
}

impl<'a, C: hil::usb::UsbController<'a>> UsbDevice<'a> for UsbCore<'a, C> {
    fn register_endpoint(
        &self,
        endpoint: usize,
        transfer_type: TransferType,
        tx: u16,
        rx: u16,
        rx_count: u16,
        client: &'a dyn EndpointClient,
    ) {
        self.check_single(endpoint, transfer_type);
        Self::check_rx_count(rx_count);
        self.check_pma_window(tx, MAX_PACKET);
        self.check_pma_window(rx, rx_count as usize);

        self.controller.endpoint_configure(
            endpoint,
            EndpointConfig::Single {
                transfer_type,
                tx: Some(tx),
                rx: Some((rx, rx_count)),
            },
        );
        self.endpoints
            .set(endpoint, Direction::In, Handler::Client(client));
        self.endpoints
            .set(endpoint, Direction::Out, Handler::Client(client));
    }

    fn register_endpoint_tx(
        &self,
        endpoint: usize,
        transfer_type: TransferType,
        tx: u16,
        client: &'a dyn EndpointClient,
    ) {
        self.check_single(endpoint, transfer_type);
        self.check_pma_window(tx, MAX_PACKET);

        self.controller.endpoint_configure(
            endpoint,
            EndpointConfig::Single {
                transfer_type,
                tx: Some(tx),
                rx: None,
            },
        );
        self.endpoints
            .set(endpoint, Direction::In, Handler::Client(client));
    }

    fn register_endpoint_rx(
        &self,
        endpoint: usize,
        transfer_type: TransferType,
        rx: u16,
        rx_count: u16,
        client: &'a dyn EndpointClient,
    ) {
        self.check_single(endpoint, transfer_type);
        Self::check_rx_count(rx_count);
        self.check_pma_window(rx, rx_count as usize);

        self.controller.endpoint_configure(
            endpoint,
            EndpointConfig::Single {
                transfer_type,
                tx: None,
                rx: Some((rx, rx_count)),
            },
        );
        self.endpoints
            .set(endpoint, Direction::Out, Handler::Client(client));
    }

    fn register_endpoint_double_tx(
        &self,
        endpoint: usize,
        transfer_type: TransferType,
        buffers: (u16, u16),
        client: &'a dyn EndpointClient,
    ) {
        self.check_double(endpoint, transfer_type);
        self.check_pma_window(buffers.0, MAX_PACKET);
        self.check_pma_window(buffers.1, MAX_PACKET);

        self.controller.endpoint_configure(
            endpoint,
            EndpointConfig::DoubleTx {
                transfer_type,
                buffers,
            },
        );
        self.endpoints
            .set(endpoint, Direction::In, Handler::Client(client));
    }

    fn register_endpoint_double_rx(
        &self,
        endpoint: usize,
        transfer_type: TransferType,
        buffers: (u16, u16),
        rx_count: u16,
        client: &'a dyn EndpointClient,
    ) {
        self.check_double(endpoint, transfer_type);
        Self::check_rx_count(rx_count);
        self.check_pma_window(buffers.0, rx_count as usize);
        self.check_pma_window(buffers.1, rx_count as usize);

        self.controller.endpoint_configure(
            endpoint,
            EndpointConfig::DoubleRx {
                transfer_type,
                buffers,
                rx_count,
            },
        );
        self.endpoints
            .set(endpoint, Direction::Out, Handler::Client(client));
    }

    fn unregister_endpoint(&self, endpoint: usize) {
        assert!(
            endpoint > 0 && endpoint < NUM_ENDPOINTS,
            "USB: cannot unregister endpoint {}",
            endpoint
        );
        self.endpoints.clear(endpoint);
        self.controller.endpoint_clear_configuration(endpoint);
    }

    fn pma_read(&self, offset: usize, buf: &mut [u8]) {
        self.controller.pma_read(offset, buf);
    }

    fn pma_write(&self, offset: usize, data: &[u8]) {
        self.controller.pma_write(offset, data);
    }

    fn prepare_data_in_stage(&self, data: &[u8]) {
        self.prepare_data_in(data);
    }

    fn prepare_data_out_stage(&self, length: usize, completion: Option<&'a dyn ControlOutClient>) {
        self.prepare_data_out(length, completion);
    }

    fn prepare_status_in_stage(&self) {
        self.prepare_status_in();
    }

    fn endpoint_transmit(&self, endpoint: usize, data: &[u8]) {
        self.controller.endpoint_write(endpoint, data);
    }

    fn endpoint_receive(&self, endpoint: usize, buf: &mut [u8]) -> usize {
        self.controller.endpoint_read(endpoint, buf)
    }

    fn endpoint_resume_out(&self, endpoint: usize) {
        self.controller
            .endpoint_set_status(endpoint, Direction::Out, EndpointStatus::Valid);
    }
}

impl<'a, C: hil::usb::UsbController<'a>> hil::usb::Client for UsbCore<'a, C> {
    fn transfer_complete(&self, endpoint: usize, direction: Direction, setup: bool) {
        match self.endpoints.get(endpoint, direction) {
            Some(Handler::Control) => self.control_event(direction, setup),
            Some(Handler::Client(client)) => match direction {
                Direction::In => client.packet_in(endpoint),
                Direction::Out => client.packet_out(endpoint),
            },
            None => panic!(
                "USB: transfer complete on unregistered endpoint {} {:?}",
                endpoint, direction
            ),
        }
    }

    fn bus_reset(&self) {
        for endpoint in 0..NUM_ENDPOINTS {
            self.controller.endpoint_clear_configuration(endpoint);
        }
        self.endpoints.clear_all();
        self.configure_control_endpoint();

        self.control.clear();
        self.state.set(DeviceState::Default);
        self.previous_state.clear();
        self.pending_address.clear();
        self.controller.set_address(0);

        if kernel::config::CONFIG.trace_usb {
            debug!("usb: bus reset");
        }
        self.driver().bus_reset();
    }

    fn wakeup(&self) {
        if let Some(state) = self.previous_state.take() {
            self.state.set(state);
        }
        self.driver().wakeup();
    }

    fn suspend(&self) {
        if self.state.get() != DeviceState::Suspended {
            self.previous_state.set(self.state.get());
            self.state.set(DeviceState::Suspended);
        }
        self.driver().suspend();
    }

    fn start_of_frame(&self) {
        self.driver().start_of_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{address, configure, FakeController, FakeDriver};
    use hil::usb::Client;

    #[test]
    fn init_enables_and_attaches() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        assert!(fake.enabled());
        assert!(fake.attached());
        assert_eq!(core.state(), DeviceState::Default);
    }

    #[test]
    fn bus_reset_returns_to_default_with_only_endpoint_zero() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        fake.host_reset();
        address(&fake, 9);
        configure(&fake, 1);
        assert_eq!(core.state(), DeviceState::Configured);
        assert_eq!(core.registered_endpoints(), 2);
        core.suspend();

        fake.host_reset();
        assert_eq!(core.state(), DeviceState::Default);
        assert_eq!(core.registered_endpoints(), 1);
        assert_eq!(fake.address(), Some(0));
        assert_eq!(fake.transfer_type(0), Some(TransferType::Control));
        assert_eq!(fake.transfer_type(1), None);
        assert_eq!(fake.status(0, Direction::Out), EndpointStatus::Valid);
        assert_eq!(fake.status(0, Direction::In), EndpointStatus::Nak);
        assert_eq!(core.stage(), Stage::Setup);
        assert_eq!(driver.resets(), 2);
    }

    #[test]
    fn suspend_and_wakeup_restore_state() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        fake.host_reset();
        address(&fake, 3);

        core.suspend();
        assert_eq!(core.state(), DeviceState::Suspended);
        // A second suspend event must not overwrite the saved state.
        core.suspend();
        core.wakeup();
        assert_eq!(core.state(), DeviceState::Addressed);
    }

    #[test]
    fn requests_stall_while_suspended() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        fake.host_reset();
        core.suspend();

        fake.host_setup(&[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]);
        assert!(fake.is_stalled(0));
    }

    #[test]
    fn registration_programs_the_controller() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        fake.host_reset();

        core.register_endpoint_rx(3, TransferType::Interrupt, 320, 16, &driver);
        assert_eq!(fake.transfer_type(3), Some(TransferType::Interrupt));
        assert_eq!(fake.status(3, Direction::Out), EndpointStatus::Valid);
        assert_eq!(fake.status(3, Direction::In), EndpointStatus::Disabled);

        core.register_endpoint_double_tx(4, TransferType::Bulk, (384, 448), &driver);
        assert_eq!(fake.status(4, Direction::In), EndpointStatus::Disabled);
        assert_eq!(core.registered_endpoints(), 3);

        core.unregister_endpoint(3);
        assert_eq!(fake.transfer_type(3), None);
        assert_eq!(core.registered_endpoints(), 2);
    }

    #[test]
    fn data_endpoint_events_reach_the_client() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        fake.host_reset();

        core.register_endpoint(5, TransferType::Bulk, 256, 320, 64, &driver);
        core.endpoint_transmit(5, &[1, 2, 3]);
        assert_eq!(fake.host_in(5).len(), 3);
        fake.host_out(5, &[4, 5]);
        assert_eq!(driver.packets(), (1, 1));

        let mut buf = [0u8; 8];
        assert_eq!(core.endpoint_receive(5, &mut buf), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(fake.status(5, Direction::Out), EndpointStatus::Nak);
        core.endpoint_resume_out(5);
        assert_eq!(fake.status(5, Direction::Out), EndpointStatus::Valid);
    }

    #[test]
    #[should_panic(expected = "no endpoint")]
    fn registering_endpoint_out_of_range_panics() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        core.register_endpoint_tx(8, TransferType::Bulk, 256, &driver);
    }

    #[test]
    #[should_panic(expected = "reserved")]
    fn registering_endpoint_zero_panics() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        core.register_endpoint_tx(0, TransferType::Bulk, 256, &driver);
    }

    #[test]
    #[should_panic(expected = "double-buffered")]
    fn single_buffered_isochronous_panics() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        core.register_endpoint_tx(1, TransferType::Isochronous, 256, &driver);
    }

    #[test]
    #[should_panic(expected = "packet memory")]
    fn buffer_outside_packet_memory_panics() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        core.register_endpoint_rx(1, TransferType::Bulk, 1000, 64, &driver);
    }

    #[test]
    #[should_panic(expected = "packet memory")]
    fn transmit_buffer_running_past_packet_memory_panics() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        core.register_endpoint_tx(1, TransferType::Bulk, 1000, &driver);
    }

    #[test]
    #[should_panic(expected = "packet memory")]
    fn second_transmit_buffer_is_checked_too() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        core.register_endpoint_double_tx(2, TransferType::Bulk, (384, 992), &driver);
    }

    #[test]
    fn set_address_cut_off_by_new_setup_is_dropped() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        fake.host_reset();
        address(&fake, 5);

        // SET_ADDRESS(9) never gets its status stage.
        fake.host_setup(&[0x00, 0x05, 9, 0, 0, 0, 0, 0]);
        assert_eq!(core.pending_address.map(|address| *address), Some(9));
        fake.host_setup(&[0x80, 0x08, 0, 0, 0, 0, 1, 0]);
        assert_eq!(&*fake.host_in(0), &[0]);
        assert!(core.pending_address.is_none());

        configure(&fake, 1);
        assert_eq!(fake.address(), Some(5));
        assert_eq!(core.state(), DeviceState::Configured);
    }

    #[test]
    fn malformed_setup_also_drops_pending_address() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        fake.host_reset();

        fake.host_setup(&[0x00, 0x05, 9, 0, 0, 0, 0, 0]);
        fake.host_setup(&[0x00, 0x05, 9, 0]);
        assert!(fake.is_stalled(0));
        assert!(core.pending_address.is_none());

        address(&fake, 3);
        assert_eq!(fake.address(), Some(3));
        assert_eq!(core.state(), DeviceState::Addressed);
    }

    #[test]
    #[should_panic(expected = "unregistered endpoint")]
    fn event_on_unregistered_endpoint_panics() {
        let fake = FakeController::new();
        let core = UsbCore::new(&fake);
        let driver = FakeDriver::new(&core);
        core.init(&driver);
        fake.host_reset();
        core.transfer_complete(6, Direction::In, false);
    }
}
