// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Device state machine and the table of requests legal in each state.
//!
//! ```text
//!            SET_ADDRESS(n != 0)          SET_CONFIGURATION(n != 0)
//!   Default ---------------------> Addressed ---------------------> Configured
//!           <---------------------           <---------------------
//!            SET_ADDRESS(0)               SET_CONFIGURATION(0)
//!
//!   any state --suspend--> Suspended --wakeup--> previous state
//!   any state --bus reset--> Default
//! ```

use kernel::hil::usb::UsbController;

use crate::descriptors::{RequestType, SetupPacket, StandardRequest};
use crate::device::UsbCore;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Default,
    Addressed,
    Configured,
    Suspended,
}

/// The dispatch points of a setup packet: the standard requests, and the
/// class and vendor request types.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Request {
    GetStatus,
    ClearFeature,
    SetFeature,
    SetAddress,
    GetDescriptor,
    SetDescriptor,
    GetConfiguration,
    SetConfiguration,
    GetInterface,
    SetInterface,
    SynchFrame,
    Class,
    Vendor,
}

impl Request {
    pub const ALL: [Request; 13] = [
        Request::GetStatus,
        Request::ClearFeature,
        Request::SetFeature,
        Request::SetAddress,
        Request::GetDescriptor,
        Request::SetDescriptor,
        Request::GetConfiguration,
        Request::SetConfiguration,
        Request::GetInterface,
        Request::SetInterface,
        Request::SynchFrame,
        Request::Class,
        Request::Vendor,
    ];

    /// Decode `bmRequestType` and `bRequest`. Reserved request types and
    /// unknown standard codes have no dispatch point.
    pub fn decode(setup: &SetupPacket) -> Option<Request> {
        match setup.request_type.request_type() {
            RequestType::Standard => {
                StandardRequest::from_code(setup.request).map(|code| match code {
                    StandardRequest::GetStatus => Request::GetStatus,
                    StandardRequest::ClearFeature => Request::ClearFeature,
                    StandardRequest::SetFeature => Request::SetFeature,
                    StandardRequest::SetAddress => Request::SetAddress,
                    StandardRequest::GetDescriptor => Request::GetDescriptor,
                    StandardRequest::SetDescriptor => Request::SetDescriptor,
                    StandardRequest::GetConfiguration => Request::GetConfiguration,
                    StandardRequest::SetConfiguration => Request::SetConfiguration,
                    StandardRequest::GetInterface => Request::GetInterface,
                    StandardRequest::SetInterface => Request::SetInterface,
                    StandardRequest::SynchFrame => Request::SynchFrame,
                })
            }
            RequestType::Class => Some(Request::Class),
            RequestType::Vendor => Some(Request::Vendor),
            RequestType::Reserved => None,
        }
    }
}

pub type RequestHandler<'a, C> = fn(&UsbCore<'a, C>, &SetupPacket);

impl DeviceState {
    /// Handler for `request` in this state, or `None` if the request is not
    /// legal here and endpoint 0 has to stall.
    pub fn request_handler<'a, C: UsbController<'a>>(
        self,
        request: Request,
    ) -> Option<RequestHandler<'a, C>> {
        match (self, request) {
            (DeviceState::Suspended, _) => None,

            (DeviceState::Default, Request::SetAddress) => Some(UsbCore::set_address_request),
            (DeviceState::Default, Request::GetDescriptor) => Some(UsbCore::get_descriptor),
            (DeviceState::Default, _) => None,

            (DeviceState::Configured, Request::SetAddress) => None,
            (
                DeviceState::Addressed,
                Request::SetDescriptor
                | Request::GetInterface
                | Request::SetInterface
                | Request::SynchFrame
                | Request::Class,
            ) => None,

            (_, Request::GetStatus) => Some(UsbCore::get_status),
            (_, Request::ClearFeature) => Some(UsbCore::clear_feature),
            (_, Request::SetFeature) => Some(UsbCore::set_feature),
            (_, Request::SetAddress) => Some(UsbCore::set_address_request),
            (_, Request::GetDescriptor) => Some(UsbCore::get_descriptor),
            (_, Request::SetDescriptor) => Some(UsbCore::set_descriptor),
            (_, Request::GetConfiguration) => Some(UsbCore::get_configuration),
            (_, Request::SetConfiguration) => Some(UsbCore::set_configuration),
            (_, Request::GetInterface) => Some(UsbCore::get_interface),
            (_, Request::SetInterface) => Some(UsbCore::set_interface),
            (_, Request::SynchFrame) => Some(UsbCore::synch_frame),
            (_, Request::Class) => Some(UsbCore::class_request),
            (_, Request::Vendor) => Some(UsbCore::vendor_request),
        }
    }
}
