// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Platform-independent USB 2.0 protocol library.
//!
//! The setup packet, request type decoding and builders for the descriptors
//! a full-speed device has to serve during enumeration.

use core::cmp::min;
use core::fmt;
use kernel::hil::usb::TransferType;

/// Length of a setup packet on the wire.
pub const SETUP_PACKET_LEN: usize = 8;

/// The data structure sent in a SETUP handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: DeviceRequestType,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    /// Parse a packet received on the wire. Anything but exactly
    /// [`SETUP_PACKET_LEN`] bytes is rejected.
    pub fn parse(p: &[u8]) -> Option<Self> {
        if p.len() != SETUP_PACKET_LEN {
            return None;
        }
        Some(SetupPacket {
            request_type: DeviceRequestType(p[0]),
            request: p[1],
            value: get_u16(p[2], p[3]),
            index: get_u16(p[4], p[5]),
            length: get_u16(p[6], p[7]),
        })
    }

    /// Descriptor type of a GET_DESCRIPTOR or SET_DESCRIPTOR request.
    pub fn descriptor_type(&self) -> u8 {
        (self.value >> 8) as u8
    }

    pub fn descriptor_index(&self) -> u8 {
        (self.value & 0xff) as u8
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct DeviceRequestType(pub u8);

impl DeviceRequestType {
    pub fn transfer_direction(self) -> TransferDirection {
        match self.0 & (1 << 7) {
            0 => TransferDirection::HostToDevice,
            _ => TransferDirection::DeviceToHost,
        }
    }

    pub fn request_type(self) -> RequestType {
        match (self.0 & (0b11 << 5)) >> 5 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub fn recipient(self) -> Recipient {
        match self.0 & 0b11111 {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }
}

impl fmt::Debug for DeviceRequestType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{{:?}, {:?}, {:?}}}",
            self.transfer_direction(),
            self.request_type(),
            self.recipient()
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    HostToDevice = 0,
    DeviceToHost = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

/// `bRequest` codes of the chapter 9 standard requests.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StandardRequest {
    GetStatus = 0,
    ClearFeature = 1,
    SetFeature = 3,
    SetAddress = 5,
    GetDescriptor = 6,
    SetDescriptor = 7,
    GetConfiguration = 8,
    SetConfiguration = 9,
    GetInterface = 10,
    SetInterface = 11,
    SynchFrame = 12,
}

impl StandardRequest {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(StandardRequest::GetStatus),
            1 => Some(StandardRequest::ClearFeature),
            3 => Some(StandardRequest::SetFeature),
            5 => Some(StandardRequest::SetAddress),
            6 => Some(StandardRequest::GetDescriptor),
            7 => Some(StandardRequest::SetDescriptor),
            8 => Some(StandardRequest::GetConfiguration),
            9 => Some(StandardRequest::SetConfiguration),
            10 => Some(StandardRequest::GetInterface),
            11 => Some(StandardRequest::SetInterface),
            12 => Some(StandardRequest::SynchFrame),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FeatureSelector {
    EndpointHalt,
    DeviceRemoteWakeup,
    Unknown,
}

impl FeatureSelector {
    pub fn get(value: u16) -> Self {
        match value {
            0 => FeatureSelector::EndpointHalt,
            1 => FeatureSelector::DeviceRemoteWakeup,
            _ => FeatureSelector::Unknown,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DescriptorType {
    Device = 1,
    Configuration,
    String,
    Interface,
    Endpoint,
    Bos = 0x0F,
    CsInterface = 0x24,
}

impl DescriptorType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(DescriptorType::Device),
            2 => Some(DescriptorType::Configuration),
            3 => Some(DescriptorType::String),
            4 => Some(DescriptorType::Interface),
            5 => Some(DescriptorType::Endpoint),
            0x0F => Some(DescriptorType::Bos),
            0x24 => Some(DescriptorType::CsInterface),
            _ => None,
        }
    }
}

pub trait Descriptor {
    /// Serialized size of Descriptor
    fn size(&self) -> usize;

    /// Serialize the descriptor to a buffer for transmission on the bus.
    /// Returns 0 if `buf` is too short.
    fn write_to(&self, buf: &mut [u8]) -> usize {
        if self.size() > buf.len() {
            0
        } else {
            self.write_to_unchecked(buf)
        }
    }

    /// Same as `write_to()`, but doesn't check that `buf` is long enough
    /// before indexing into it.  This should be used only if the result
    /// of `size()` is first consulted.
    fn write_to_unchecked(&self, buf: &mut [u8]) -> usize;
}

pub struct DeviceDescriptor {
    /// Valid values include 0x0100 (USB1.0), 0x0110 (USB1.1) and 0x0200 (USB2.0)
    pub usb_release: u16,

    /// 0x00 means each interface defines its own class.
    /// 0xFF means the class behavior is defined by the vendor.
    /// All other values have meaning assigned by USB-IF
    pub class: u8,

    pub subclass: u8,

    pub protocol: u8,

    /// Max packet size for endpoint 0.  Must be 8, 16, 32 or 64
    pub max_packet_size_ep0: u8,

    pub vendor_id: u16,

    pub product_id: u16,

    /// Device release number in binary coded decimal (BCD)
    pub device_release: u16,

    /// Index of the string descriptor describing manufacturer, or 0 if none
    pub manufacturer_string: u8,

    /// Index of the string descriptor describing product, or 0 if none
    pub product_string: u8,

    /// Index of the string descriptor giving device serial number, or 0 if none
    pub serial_number_string: u8,

    /// Number of configurations the device supports.  Must be at least one
    pub num_configurations: u8,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        DeviceDescriptor {
            usb_release: 0x0200,
            class: 0,
            subclass: 0,
            protocol: 0,
            max_packet_size_ep0: 64,
            vendor_id: 0x6667,
            product_id: 0xabcd,
            device_release: 0x0001,
            manufacturer_string: 0,
            product_string: 0,
            serial_number_string: 0,
            num_configurations: 1,
        }
    }
}

impl Descriptor for DeviceDescriptor {
    fn size(&self) -> usize {
        18
    }

    fn write_to_unchecked(&self, buf: &mut [u8]) -> usize {
        buf[0] = 18;
        buf[1] = DescriptorType::Device as u8;
        put_u16(&mut buf[2..4], self.usb_release);
        buf[4] = self.class;
        buf[5] = self.subclass;
        buf[6] = self.protocol;
        buf[7] = self.max_packet_size_ep0;
        put_u16(&mut buf[8..10], self.vendor_id);
        put_u16(&mut buf[10..12], self.product_id);
        put_u16(&mut buf[12..14], self.device_release);
        buf[14] = self.manufacturer_string;
        buf[15] = self.product_string;
        buf[16] = self.serial_number_string;
        buf[17] = self.num_configurations;
        18
    }
}

/// Serialized descriptor bytes, ready to be handed to the control endpoint.
pub struct DescriptorBuffer {
    pub buf: [u8; 128],
    pub len: usize,
}

impl DescriptorBuffer {
    pub const fn new() -> Self {
        DescriptorBuffer {
            buf: [0; 128],
            len: 0,
        }
    }

    /// Serialize a single descriptor.
    pub fn from_descriptor(descriptor: &dyn Descriptor) -> Self {
        let mut buffer = DescriptorBuffer::new();
        buffer.len = descriptor.write_to(&mut buffer.buf);
        buffer
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Default for DescriptorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a configuration with its interfaces, class-specific interface
/// descriptors and endpoints into one buffer.
///
/// Each endpoint descriptor list corresponds to the matching index in the
/// interface descriptor list. Class-specific descriptors follow the first
/// interface. `num_interfaces`, `num_endpoints` and `wTotalLength` are
/// filled in from the tree.
pub fn create_configuration_buffer(
    mut configuration_descriptor: ConfigurationDescriptor,
    interface_descriptors: &mut [InterfaceDescriptor],
    endpoint_descriptors: &[&[EndpointDescriptor]],
    cs_descriptors: Option<&[CsInterfaceDescriptor]>,
) -> DescriptorBuffer {
    let mut other_buf = DescriptorBuffer::new();

    configuration_descriptor.num_interfaces = interface_descriptors.len() as u8;
    configuration_descriptor.related_descriptor_length = interface_descriptors
        .iter()
        .map(|d| d.size())
        .sum::<usize>()
        + endpoint_descriptors
            .iter()
            .map(|descs| descs.iter().map(|d| d.size()).sum::<usize>())
            .sum::<usize>()
        + cs_descriptors.map_or(0, |ds| ds.iter().map(|d| d.size()).sum::<usize>());

    for (i, d) in interface_descriptors.iter_mut().enumerate() {
        d.num_endpoints = endpoint_descriptors.get(i).map_or(0, |e| e.len() as u8);
    }

    let mut len = 0;
    len += configuration_descriptor.write_to(&mut other_buf.buf[len..]);

    for (i, d) in interface_descriptors.iter().enumerate() {
        len += d.write_to(&mut other_buf.buf[len..]);

        if i == 0 {
            if let Some(dcs) = cs_descriptors {
                for cs in dcs {
                    len += cs.write_to(&mut other_buf.buf[len..]);
                }
            }
        }

        for de in endpoint_descriptors.get(i).copied().unwrap_or(&[]) {
            len += de.write_to(&mut other_buf.buf[len..]);
        }
    }
    other_buf.len = min(len, other_buf.buf.len());
    other_buf
}

pub struct ConfigurationDescriptor {
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub string_index: u8,
    pub attributes: ConfigurationAttributes,
    pub max_power: u8, // in 2mA units
    pub related_descriptor_length: usize,
}

impl Default for ConfigurationDescriptor {
    fn default() -> Self {
        ConfigurationDescriptor {
            num_interfaces: 1,
            configuration_value: 1,
            string_index: 0,
            attributes: ConfigurationAttributes::new(true, false),
            max_power: 0,
            related_descriptor_length: 0,
        }
    }
}

impl Descriptor for ConfigurationDescriptor {
    fn size(&self) -> usize {
        9
    }

    fn write_to_unchecked(&self, buf: &mut [u8]) -> usize {
        buf[0] = 9;
        buf[1] = DescriptorType::Configuration as u8;
        put_u16(&mut buf[2..4], (9 + self.related_descriptor_length) as u16);
        buf[4] = self.num_interfaces;
        buf[5] = self.configuration_value;
        buf[6] = self.string_index;
        buf[7] = From::from(self.attributes);
        buf[8] = self.max_power;
        9
    }
}

#[derive(Copy, Clone)]
pub struct ConfigurationAttributes(u8);

impl ConfigurationAttributes {
    pub fn new(is_self_powered: bool, supports_remote_wakeup: bool) -> Self {
        ConfigurationAttributes(
            (1 << 7)
                | if is_self_powered { 1 << 6 } else { 0 }
                | if supports_remote_wakeup { 1 << 5 } else { 0 },
        )
    }
}

impl From<ConfigurationAttributes> for u8 {
    fn from(ca: ConfigurationAttributes) -> u8 {
        ca.0
    }
}

pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub string_index: u8,
}

impl Default for InterfaceDescriptor {
    fn default() -> Self {
        InterfaceDescriptor {
            interface_number: 0,
            alternate_setting: 0,
            num_endpoints: 0,      // (excluding default control endpoint)
            interface_class: 0xff, // vendor_specific
            interface_subclass: 0,
            interface_protocol: 0,
            string_index: 0,
        }
    }
}

impl Descriptor for InterfaceDescriptor {
    fn size(&self) -> usize {
        9
    }

    fn write_to_unchecked(&self, buf: &mut [u8]) -> usize {
        buf[0] = 9;
        buf[1] = DescriptorType::Interface as u8;
        buf[2] = self.interface_number;
        buf[3] = self.alternate_setting;
        buf[4] = self.num_endpoints;
        buf[5] = self.interface_class;
        buf[6] = self.interface_subclass;
        buf[7] = self.interface_protocol;
        buf[8] = self.string_index;
        9
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EndpointAddress(u8);

impl EndpointAddress {
    pub const fn new(endpoint: usize, direction: TransferDirection) -> Self {
        EndpointAddress(endpoint as u8 & 0xf | (direction as u8) << 7)
    }
}

impl From<EndpointAddress> for u8 {
    fn from(address: EndpointAddress) -> u8 {
        address.0
    }
}

pub struct EndpointDescriptor {
    pub endpoint_address: EndpointAddress,
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
    // Poll for device data every `interval` frames
    pub interval: u8,
}

impl Descriptor for EndpointDescriptor {
    fn size(&self) -> usize {
        7
    }

    fn write_to_unchecked(&self, buf: &mut [u8]) -> usize {
        let len = self.size();
        buf[0] = len as u8;
        buf[1] = DescriptorType::Endpoint as u8;
        buf[2] = self.endpoint_address.0;
        // No synchronization, data endpoint.
        buf[3] = self.transfer_type as u8;
        put_u16(&mut buf[4..6], self.max_packet_size & 0x7ff);
        buf[6] = self.interval;
        len
    }
}

//
// For CDC
//

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CsInterfaceDescriptorSubType {
    Header = 0x00,
    CallManagement = 0x01,
    AbstractControlManagement = 0x02,
    Union = 0x06,
}

/// Class-specific interface descriptor with up to two payload bytes.
pub struct CsInterfaceDescriptor {
    pub subtype: CsInterfaceDescriptorSubType,
    pub field1: u8,
    pub field2: u8,
}

impl Descriptor for CsInterfaceDescriptor {
    fn size(&self) -> usize {
        3 + match self.subtype {
            CsInterfaceDescriptorSubType::Header => 2,
            CsInterfaceDescriptorSubType::CallManagement => 2,
            CsInterfaceDescriptorSubType::AbstractControlManagement => 1,
            CsInterfaceDescriptorSubType::Union => 2,
        }
    }

    fn write_to_unchecked(&self, buf: &mut [u8]) -> usize {
        let len = self.size();
        buf[0] = len as u8;
        buf[1] = DescriptorType::CsInterface as u8;
        buf[2] = self.subtype as u8;
        if len >= 4 {
            buf[3] = self.field1;
        }
        if len >= 5 {
            buf[4] = self.field2;
        }
        len
    }
}

/// String descriptor zero: the list of supported language IDs.
pub struct LanguagesDescriptor<'a> {
    pub langs: &'a [u16],
}

impl Descriptor for LanguagesDescriptor<'_> {
    fn size(&self) -> usize {
        2 + (2 * self.langs.len())
    }

    fn write_to_unchecked(&self, buf: &mut [u8]) -> usize {
        let len = self.size();
        buf[0] = len as u8;
        buf[1] = DescriptorType::String as u8;
        for (i, lang) in self.langs.iter().enumerate() {
            put_u16(&mut buf[2 + (2 * i)..4 + (2 * i)], *lang);
        }
        len
    }
}

pub struct StringDescriptor<'a> {
    pub string: &'a str,
}

impl Descriptor for StringDescriptor<'_> {
    fn size(&self) -> usize {
        2 + self.string.chars().map(|ch| 2 * ch.len_utf16()).sum::<usize>()
    }

    // Encode as utf16-le
    fn write_to_unchecked(&self, buf: &mut [u8]) -> usize {
        buf[1] = DescriptorType::String as u8;
        let mut i = 2;
        for ch in self.string.chars() {
            let mut chbuf = [0; 2];
            for w in ch.encode_utf16(&mut chbuf) {
                put_u16(&mut buf[i..i + 2], *w);
                i += 2;
            }
        }
        buf[0] = i as u8;
        i
    }
}

/// Parse a `u16` from two bytes as received on the bus
pub fn get_u16(b0: u8, b1: u8) -> u16 {
    (b0 as u16) | ((b1 as u16) << 8)
}

/// Write a `u16` to a buffer for transmission on the bus
pub fn put_u16(buf: &mut [u8], n: u16) {
    buf[0] = (n & 0xff) as u8;
    buf[1] = (n >> 8) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_packet_fields_are_little_endian() {
        let setup = SetupPacket::parse(&[0x80, 0x06, 0x00, 0x01, 0x09, 0x04, 0x40, 0x00]).unwrap();
        assert_eq!(setup.request_type.transfer_direction(), TransferDirection::DeviceToHost);
        assert_eq!(setup.request_type.request_type(), RequestType::Standard);
        assert_eq!(setup.request_type.recipient(), Recipient::Device);
        assert_eq!(setup.request, StandardRequest::GetDescriptor as u8);
        assert_eq!(setup.descriptor_type(), DescriptorType::Device as u8);
        assert_eq!(setup.descriptor_index(), 0);
        assert_eq!(setup.index, 0x0409);
        assert_eq!(setup.length, 64);
    }

    #[test]
    fn setup_packet_must_be_eight_bytes() {
        assert!(SetupPacket::parse(&[0; 7]).is_none());
        assert!(SetupPacket::parse(&[0; 9]).is_none());
    }

    #[test]
    fn request_type_decoding() {
        let class = DeviceRequestType(0x21);
        assert_eq!(class.request_type(), RequestType::Class);
        assert_eq!(class.recipient(), Recipient::Interface);
        assert_eq!(class.transfer_direction(), TransferDirection::HostToDevice);
        assert_eq!(DeviceRequestType(0xC0).request_type(), RequestType::Vendor);
        assert_eq!(DeviceRequestType(0x60).request_type(), RequestType::Reserved);
        assert_eq!(DeviceRequestType(0x02).recipient(), Recipient::Endpoint);
    }

    #[test]
    fn unknown_standard_codes_are_rejected() {
        assert_eq!(StandardRequest::from_code(2), None);
        assert_eq!(StandardRequest::from_code(4), None);
        assert_eq!(StandardRequest::from_code(13), None);
        assert_eq!(StandardRequest::from_code(12), Some(StandardRequest::SynchFrame));
    }

    #[test]
    fn only_served_descriptor_types_and_features_decode() {
        assert_eq!(DescriptorType::from_u8(0x0F), Some(DescriptorType::Bos));
        assert_eq!(DescriptorType::from_u8(6), None);
        assert_eq!(DescriptorType::from_u8(0x24), Some(DescriptorType::CsInterface));
        assert_eq!(FeatureSelector::get(1), FeatureSelector::DeviceRemoteWakeup);
        assert_eq!(FeatureSelector::get(2), FeatureSelector::Unknown);
    }

    #[test]
    fn string_descriptor_is_utf16le() {
        let buffer = DescriptorBuffer::from_descriptor(&StringDescriptor { string: "Tö" });
        assert_eq!(buffer.as_slice(), &[6, 3, b'T', 0, 0xF6, 0]);
    }

    #[test]
    fn configuration_total_length_covers_the_tree() {
        let mut interfaces = [InterfaceDescriptor::default()];
        let endpoints: &[&[EndpointDescriptor]] = &[&[EndpointDescriptor {
            endpoint_address: EndpointAddress::new(1, TransferDirection::DeviceToHost),
            transfer_type: TransferType::Bulk,
            max_packet_size: 64,
            interval: 0,
        }]];
        let buffer = create_configuration_buffer(
            ConfigurationDescriptor::default(),
            &mut interfaces,
            endpoints,
            None,
        );
        assert_eq!(buffer.len, 9 + 9 + 7);
        assert_eq!(get_u16(buffer.buf[2], buffer.buf[3]), 25);
        // bNumEndpoints of the interface
        assert_eq!(buffer.buf[9 + 4], 1);
        // bEndpointAddress
        assert_eq!(buffer.buf[18 + 2], 0x81);
    }

    #[test]
    fn write_to_rejects_short_buffers() {
        let mut buf = [0u8; 17];
        assert_eq!(DeviceDescriptor::default().write_to(&mut buf), 0);
    }
}
