// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Read-modify-write rules for the endpoint registers (EPnR).
//!
//! An EPnR mixes three kinds of bits and each needs its own write rule:
//!
//! - plain bits (`EP_TYPE`, `EP_KIND`, `EA`) hold the value written.
//! - write-clear bits (`CTR_RX`, `CTR_TX`) are cleared by writing 0 and left
//!   alone by writing 1.
//! - toggle bits (`DTOG_RX`, `STAT_RX`, `DTOG_TX`, `STAT_TX`) flip when
//!   written with 1 and are left alone by writing 0.
//!
//! [`EndpointRegister`] wraps one snapshot of the register. Each operation
//! computes the single value to write back so that only the targeted field
//! changes. Toggle fields reach a target value by writing `current ^ target`
//! and write-clear flags are preserved by writing 1.

use kernel::hil::usb::{Direction, EndpointStatus, TransferType};
use kernel::utilities::registers::LocalRegisterCopy;

use super::registers::EPR;

/// Write-clear flags. Writing 1 leaves them unchanged.
const RC_W0: u32 = 0x8080;
/// Toggle fields. Writing 0 leaves them unchanged.
const TOGGLE: u32 = 0x7070;
/// Plain read/write fields: type, kind and address.
const RW: u32 = 0x070F;

const STAT_RX: u32 = 0x3000;
const STAT_TX: u32 = 0x0030;
const DTOG_RX: u32 = 0x4000;
const DTOG_TX: u32 = 0x0040;
const CTR_RX: u32 = 0x8000;
const CTR_TX: u32 = 0x0080;
const EP_KIND: u32 = 0x0100;

/// Force the toggle bits selected by `masks` to the value in `target`.
///
/// Plain fields are written back unchanged, write-clear flags as 1 and toggle
/// fields outside `masks` as 0.
fn set_toggle(reg: u32, target: u32, masks: u32) -> u32 {
    ((reg ^ target) & (RW | masks)) | RC_W0
}

/// Write back plain fields, keep every toggle field.
fn preserve(reg: u32) -> u32 {
    (reg & !TOGGLE) | RC_W0
}

fn status_shift(direction: Direction) -> usize {
    match direction {
        Direction::Out => 12,
        Direction::In => 4,
    }
}

fn status_mask(direction: Direction) -> u32 {
    match direction {
        Direction::Out => STAT_RX,
        Direction::In => STAT_TX,
    }
}

fn dtog_mask(direction: Direction) -> u32 {
    match direction {
        Direction::Out => DTOG_RX,
        Direction::In => DTOG_TX,
    }
}

fn status_bits(direction: Direction, status: EndpointStatus) -> u32 {
    (status as u32) << status_shift(direction)
}

fn type_bits(transfer_type: TransferType) -> u32 {
    let field = match transfer_type {
        TransferType::Bulk => EPR::EP_TYPE::Bulk,
        TransferType::Control => EPR::EP_TYPE::Control,
        TransferType::Isochronous => EPR::EP_TYPE::Isochronous,
        TransferType::Interrupt => EPR::EP_TYPE::Interrupt,
    };
    field.value
}

/// One snapshot of an endpoint register.
#[derive(Copy, Clone)]
pub struct EndpointRegister(LocalRegisterCopy<u32, EPR::Register>);

impl EndpointRegister {
    pub fn new(value: u32) -> EndpointRegister {
        EndpointRegister(LocalRegisterCopy::new(value & 0xFFFF))
    }

    fn raw(self) -> u32 {
        self.0.get()
    }

    pub fn status(self, direction: Direction) -> EndpointStatus {
        let bits = match direction {
            Direction::Out => self.0.read(EPR::STAT_RX),
            Direction::In => self.0.read(EPR::STAT_TX),
        };
        match bits {
            0 => EndpointStatus::Disabled,
            1 => EndpointStatus::Stall,
            2 => EndpointStatus::Nak,
            _ => EndpointStatus::Valid,
        }
    }

    pub fn transfer_complete(self, direction: Direction) -> bool {
        match direction {
            Direction::Out => self.0.is_set(EPR::CTR_RX),
            Direction::In => self.0.is_set(EPR::CTR_TX),
        }
    }

    pub fn is_setup(self) -> bool {
        self.0.is_set(EPR::SETUP)
    }

    pub fn kind(self) -> bool {
        self.0.is_set(EPR::EP_KIND)
    }

    /// Program type, kind, address and both directions' status. Both data
    /// toggles are reset and pending transfer-complete flags kept.
    pub fn configure(
        self,
        transfer_type: TransferType,
        kind: bool,
        address: usize,
        rx: EndpointStatus,
        tx: EndpointStatus,
    ) -> u32 {
        let target = status_bits(Direction::Out, rx) | status_bits(Direction::In, tx);
        ((self.raw() ^ target) & TOGGLE)
            | RC_W0
            | type_bits(transfer_type)
            | if kind { EP_KIND } else { 0 }
            | (address as u32 & 0xF)
    }

    /// Reset every field: toggles and status to zero, plain fields cleared,
    /// transfer-complete flags cleared.
    pub fn clear_configuration(self) -> u32 {
        self.raw() & TOGGLE
    }

    pub fn set_status(self, direction: Direction, status: EndpointStatus) -> u32 {
        set_toggle(
            self.raw(),
            status_bits(direction, status),
            status_mask(direction),
        )
    }

    /// Reset the data toggle of one direction to DATA0.
    pub fn clear_data_toggle(self, direction: Direction) -> u32 {
        set_toggle(self.raw(), 0, dtog_mask(direction))
    }

    /// `None` if the direction is disabled.
    pub fn set_stall(self, direction: Direction) -> Option<u32> {
        match self.status(direction) {
            EndpointStatus::Disabled => None,
            _ => Some(self.set_status(direction, EndpointStatus::Stall)),
        }
    }

    /// Leave STALL and restart at DATA0. An IN direction goes to NAK until
    /// data is queued, an OUT direction is re-armed. `None` if the direction
    /// is not stalled.
    pub fn clear_stall(self, direction: Direction) -> Option<u32> {
        if self.status(direction) != EndpointStatus::Stall {
            return None;
        }
        let status = match direction {
            Direction::Out => EndpointStatus::Valid,
            Direction::In => EndpointStatus::Nak,
        };
        Some(set_toggle(
            self.raw(),
            status_bits(direction, status),
            status_mask(direction) | dtog_mask(direction),
        ))
    }

    pub fn set_kind(self) -> u32 {
        preserve(self.raw()) | EP_KIND
    }

    pub fn clear_kind(self) -> u32 {
        preserve(self.raw()) & !EP_KIND
    }

    /// Clear the transfer-complete flag of one direction, keep the other.
    pub fn clear_transfer_complete(self, direction: Direction) -> u32 {
        let flag = match direction {
            Direction::Out => CTR_RX,
            Direction::In => CTR_TX,
        };
        preserve(self.raw()) & !flag
    }
}
