// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! CDC-ACM (virtual serial port) class driver.
//!
//! Endpoint 1 carries the (unused) interrupt notifications, endpoint 2 the
//! bulk data in both directions. Received packets are handed to a
//! [`CdcClient`] one at a time and the OUT endpoint is re-armed once the
//! client returns.

use core::cell::Cell;

use kernel::debug;
use kernel::hil::usb::{Direction, TransferType};
use kernel::utilities::cells::OptionalCell;
use kernel::ErrorCode;

use crate::descriptors::{
    self, ConfigurationAttributes, ConfigurationDescriptor, CsInterfaceDescriptor,
    CsInterfaceDescriptorSubType, DescriptorBuffer, DeviceDescriptor, EndpointAddress,
    EndpointDescriptor, InterfaceDescriptor, LanguagesDescriptor, SetupPacket, StringDescriptor,
    TransferDirection,
};
use crate::driver::{ControlOutClient, EndpointClient, UsbDevice, UsbDriver};

const VENDOR_ID: u16 = 0x0483;
const PRODUCT_ID: u16 = 0x5740;

static LANGUAGES: &[u16; 1] = &[
    0x0409, // English (United States)
];

static STRINGS: &[&str; 3] = &[
    "Tock",             // Manufacturer
    "Virtual COM Port", // Product
    "00000001",         // Serial number
];

const CONFIGURATION: u8 = 1;

const NOTIFICATION_ENDPOINT: usize = 1;
const DATA_ENDPOINT: usize = 2;

/// PMA layout, after the endpoint 0 buffers.
const EP1_TX: u16 = 192;
const EP2_TX: u16 = 200;
const EP2_RX: u16 = 264;

const NOTIFICATION_PACKET_SIZE: u16 = 8;
/// Max packet size of the bulk endpoints.
pub const MAX_PACKET_SIZE: usize = 64;

const SET_LINE_CODING: u8 = 0x20;
const GET_LINE_CODING: u8 = 0x21;
const SET_CONTROL_LINE_STATE: u8 = 0x22;

const LINE_CODING_LEN: usize = 7;

/// Serial parameters as exchanged with SET/GET_LINE_CODING.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineCoding {
    pub baud_rate: u32,
    /// 0: 1 stop bit, 1: 1.5 stop bits, 2: 2 stop bits
    pub stop_bits: u8,
    /// 0: none, 1: odd, 2: even, 3: mark, 4: space
    pub parity: u8,
    pub data_bits: u8,
}

impl LineCoding {
    fn to_bytes(self) -> [u8; LINE_CODING_LEN] {
        let rate = self.baud_rate.to_le_bytes();
        [
            rate[0],
            rate[1],
            rate[2],
            rate[3],
            self.stop_bits,
            self.parity,
            self.data_bits,
        ]
    }

    fn from_bytes(bytes: &[u8]) -> Option<LineCoding> {
        match *bytes {
            [b0, b1, b2, b3, stop_bits, parity, data_bits] => Some(LineCoding {
                baud_rate: u32::from_le_bytes([b0, b1, b2, b3]),
                stop_bits,
                parity,
                data_bits,
            }),
            _ => None,
        }
    }
}

impl Default for LineCoding {
    fn default() -> Self {
        LineCoding {
            baud_rate: 115200,
            stop_bits: 0,
            parity: 0,
            data_bits: 8,
        }
    }
}

pub trait CdcClient {
    /// A bulk OUT packet arrived.
    fn received(&self, data: &[u8]);

    /// The packet queued with [`CdcAcm::transmit`] was picked up by the host.
    fn transmit_done(&self) {}
}

pub struct CdcAcm<'a, U: UsbDevice<'a>> {
    usb: &'a U,
    client: OptionalCell<&'a dyn CdcClient>,

    device_descriptor: DescriptorBuffer,
    configuration_descriptor: DescriptorBuffer,
    /// Language table followed by the strings in `STRINGS` order.
    string_descriptors: [DescriptorBuffer; 4],

    configuration: Cell<u8>,
    line_coding: Cell<LineCoding>,
    dtr: Cell<bool>,
    rts: Cell<bool>,
    tx_busy: Cell<bool>,
}

impl<'a, U: UsbDevice<'a>> CdcAcm<'a, U> {
    pub fn new(usb: &'a U) -> Self {
        let device_descriptor = DescriptorBuffer::from_descriptor(&DeviceDescriptor {
            class: 0x02, // CDC
            vendor_id: VENDOR_ID,
            product_id: PRODUCT_ID,
            device_release: 0x0100,
            manufacturer_string: 1,
            product_string: 2,
            serial_number_string: 3,
            ..DeviceDescriptor::default()
        });

        let interfaces: &mut [InterfaceDescriptor] = &mut [
            InterfaceDescriptor {
                interface_number: 0,
                interface_class: 0x02,    // CDC communication
                interface_subclass: 0x02, // abstract control model (ACM)
                interface_protocol: 0x00,
                ..InterfaceDescriptor::default()
            },
            InterfaceDescriptor {
                interface_number: 1,
                interface_class: 0x0a, // CDC data
                interface_subclass: 0x00,
                interface_protocol: 0x00,
                ..InterfaceDescriptor::default()
            },
        ];

        let cs_descriptors: &[CsInterfaceDescriptor] = &[
            CsInterfaceDescriptor {
                subtype: CsInterfaceDescriptorSubType::Header,
                field1: 0x20, // CDC 1.20
                field2: 0x01,
            },
            CsInterfaceDescriptor {
                subtype: CsInterfaceDescriptorSubType::CallManagement,
                field1: 0x00, // no call management
                field2: 0x01, // data interface
            },
            CsInterfaceDescriptor {
                subtype: CsInterfaceDescriptorSubType::AbstractControlManagement,
                field1: 0x02, // line coding and serial state
                field2: 0x00,
            },
            CsInterfaceDescriptor {
                subtype: CsInterfaceDescriptorSubType::Union,
                field1: 0x00, // control interface
                field2: 0x01, // subordinate interface
            },
        ];

        let endpoints: &[&[EndpointDescriptor]] = &[
            &[EndpointDescriptor {
                endpoint_address: EndpointAddress::new(
                    NOTIFICATION_ENDPOINT,
                    TransferDirection::DeviceToHost,
                ),
                transfer_type: TransferType::Interrupt,
                max_packet_size: NOTIFICATION_PACKET_SIZE,
                interval: 0xff,
            }],
            &[
                EndpointDescriptor {
                    endpoint_address: EndpointAddress::new(
                        DATA_ENDPOINT,
                        TransferDirection::DeviceToHost,
                    ),
                    transfer_type: TransferType::Bulk,
                    max_packet_size: MAX_PACKET_SIZE as u16,
                    interval: 0xff,
                },
                EndpointDescriptor {
                    endpoint_address: EndpointAddress::new(
                        DATA_ENDPOINT,
                        TransferDirection::HostToDevice,
                    ),
                    transfer_type: TransferType::Bulk,
                    max_packet_size: MAX_PACKET_SIZE as u16,
                    interval: 0xff,
                },
            ],
        ];

        let configuration_descriptor = descriptors::create_configuration_buffer(
            ConfigurationDescriptor {
                configuration_value: CONFIGURATION,
                attributes: ConfigurationAttributes::new(false, false),
                max_power: 0xfe,
                ..ConfigurationDescriptor::default()
            },
            interfaces,
            endpoints,
            Some(cs_descriptors),
        );

        CdcAcm {
            usb,
            client: OptionalCell::empty(),
            device_descriptor,
            configuration_descriptor,
            string_descriptors: [
                DescriptorBuffer::from_descriptor(&LanguagesDescriptor { langs: LANGUAGES }),
                DescriptorBuffer::from_descriptor(&StringDescriptor { string: STRINGS[0] }),
                DescriptorBuffer::from_descriptor(&StringDescriptor { string: STRINGS[1] }),
                DescriptorBuffer::from_descriptor(&StringDescriptor { string: STRINGS[2] }),
            ],
            configuration: Cell::new(0),
            line_coding: Cell::new(LineCoding::default()),
            dtr: Cell::new(false),
            rts: Cell::new(false),
            tx_busy: Cell::new(false),
        }
    }

    pub fn set_client(&self, client: &'a dyn CdcClient) {
        self.client.set(client);
    }

    pub fn line_coding(&self) -> LineCoding {
        self.line_coding.get()
    }

    /// Data terminal ready, as last signalled by the host.
    pub fn dtr(&self) -> bool {
        self.dtr.get()
    }

    pub fn rts(&self) -> bool {
        self.rts.get()
    }

    pub fn is_configured(&self) -> bool {
        self.configuration.get() == CONFIGURATION
    }

    /// Queue one packet on the bulk IN endpoint.
    pub fn transmit(&self, data: &[u8]) -> Result<(), ErrorCode> {
        if !self.is_configured() {
            return Err(ErrorCode::OFF);
        }
        if self.tx_busy.get() {
            return Err(ErrorCode::BUSY);
        }
        if data.len() > MAX_PACKET_SIZE {
            return Err(ErrorCode::SIZE);
        }
        self.tx_busy.set(true);
        self.usb.endpoint_transmit(DATA_ENDPOINT, data);
        Ok(())
    }

    fn reset(&self) {
        self.configuration.set(0);
        self.tx_busy.set(false);
    }
}

impl<'a, U: UsbDevice<'a>> UsbDriver<'a> for CdcAcm<'a, U> {
    fn is_self_powered(&self) -> bool {
        false
    }

    fn is_interface_valid(&self, interface: u8) -> bool {
        interface <= 1
    }

    fn is_endpoint_valid(&self, endpoint: usize, direction: Direction) -> bool {
        matches!(
            (endpoint, direction),
            (NOTIFICATION_ENDPOINT, Direction::In) | (DATA_ENDPOINT, _)
        )
    }

    fn clear_stall(&self, endpoint: usize, direction: Direction) {
        // Whatever was queued before the halt is gone.
        if endpoint == DATA_ENDPOINT && direction == Direction::In {
            self.tx_busy.set(false);
        }
    }

    fn device_descriptor(&self) -> Option<&[u8]> {
        Some(self.device_descriptor.as_slice())
    }

    fn configuration_descriptor(&self, index: u8) -> Option<&[u8]> {
        match index {
            0 => Some(self.configuration_descriptor.as_slice()),
            _ => None,
        }
    }

    fn string_descriptor(&self, index: u8, _lang_id: u16) -> Option<&[u8]> {
        self.string_descriptors
            .get(index as usize)
            .map(DescriptorBuffer::as_slice)
    }

    fn get_configuration(&self) -> u8 {
        self.configuration.get()
    }

    fn is_configuration_valid(&self, configuration: u8) -> bool {
        configuration == CONFIGURATION
    }

    fn set_configuration(&'a self, configuration: u8) {
        if configuration == CONFIGURATION {
            self.usb.register_endpoint_tx(
                NOTIFICATION_ENDPOINT,
                TransferType::Interrupt,
                EP1_TX,
                self,
            );
            self.usb.register_endpoint(
                DATA_ENDPOINT,
                TransferType::Bulk,
                EP2_TX,
                EP2_RX,
                MAX_PACKET_SIZE as u16,
                self,
            );
            self.configuration.set(CONFIGURATION);
        } else {
            self.usb.unregister_endpoint(NOTIFICATION_ENDPOINT);
            self.usb.unregister_endpoint(DATA_ENDPOINT);
            self.reset();
        }
    }

    fn class_request(&'a self, setup: &SetupPacket) -> Result<(), ErrorCode> {
        match setup.request {
            SET_LINE_CODING => {
                self.usb
                    .prepare_data_out_stage(LINE_CODING_LEN, Some(self));
                Ok(())
            }
            GET_LINE_CODING => {
                self.usb
                    .prepare_data_in_stage(&self.line_coding.get().to_bytes());
                Ok(())
            }
            SET_CONTROL_LINE_STATE => {
                self.dtr.set(setup.value & 0x1 != 0);
                self.rts.set(setup.value & 0x2 != 0);
                self.usb.prepare_status_in_stage();
                Ok(())
            }
            _ => {
                if kernel::config::CONFIG.trace_usb {
                    debug!("cdc: unsupported request {:#x}", setup.request);
                }
                Err(ErrorCode::NOSUPPORT)
            }
        }
    }

    fn vendor_request(&'a self, _setup: &SetupPacket) -> Result<(), ErrorCode> {
        Err(ErrorCode::NOSUPPORT)
    }

    /// The core has already dropped every endpoint.
    fn bus_reset(&self) {
        self.reset();
    }
}

impl<'a, U: UsbDevice<'a>> EndpointClient for CdcAcm<'a, U> {
    fn packet_in(&self, endpoint: usize) {
        if endpoint == DATA_ENDPOINT {
            self.tx_busy.set(false);
            self.client.map(|client| client.transmit_done());
        }
    }

    fn packet_out(&self, endpoint: usize) {
        if endpoint != DATA_ENDPOINT {
            return;
        }
        let mut packet = [0u8; MAX_PACKET_SIZE];
        let count = self.usb.endpoint_receive(DATA_ENDPOINT, &mut packet);
        self.client.map(|client| client.received(&packet[..count]));
        self.usb.endpoint_resume_out(DATA_ENDPOINT);
    }
}

impl<'a, U: UsbDevice<'a>> ControlOutClient for CdcAcm<'a, U> {
    fn control_out_complete(&self, setup: &SetupPacket, data: &[u8]) {
        if setup.request != SET_LINE_CODING {
            return;
        }
        match LineCoding::from_bytes(data) {
            Some(line_coding) => self.line_coding.set(line_coding),
            None => {
                if kernel::config::CONFIG.trace_usb {
                    debug!("cdc: short line coding ({} bytes)", data.len());
                }
            }
        }
    }
}
