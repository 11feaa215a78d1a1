// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Register map of the USB FS device peripheral and its packet memory.

use kernel::utilities::registers::{register_bitfields, register_structs, ReadOnly, ReadWrite};
use kernel::utilities::StaticRef;

pub const USB_BASE: StaticRef<UsbRegisters> =
    unsafe { StaticRef::new(0x4000_6800 as *const UsbRegisters) };

pub const PMA_BASE: StaticRef<PmaRegisters> =
    unsafe { StaticRef::new(0x4000_6C00 as *const PmaRegisters) };

/// Size of the packet memory area in bytes.
pub const PMA_SIZE: usize = 0x400;

register_structs! {
    pub UsbRegisters {
        /// Endpoint n register
        (0x00 => pub epr: [ReadWrite<u32, EPR::Register>; 8]),
        (0x20 => _reserved0),
        /// Control register
        (0x40 => pub cntr: ReadWrite<u32, CNTR::Register>),
        /// Interrupt status register
        (0x44 => pub istr: ReadWrite<u32, ISTR::Register>),
        /// Frame number register
        (0x48 => pub fnr: ReadOnly<u32, FNR::Register>),
        /// Device address
        (0x4C => pub daddr: ReadWrite<u32, DADDR::Register>),
        /// Buffer table address
        (0x50 => pub btable: ReadWrite<u32, BTABLE::Register>),
        /// LPM control and status register
        (0x54 => pub lpmcsr: ReadWrite<u32, LPMCSR::Register>),
        /// Battery charging detector
        (0x58 => pub bcdr: ReadWrite<u32, BCDR::Register>),
        (0x5C => @END),
    }
}

register_structs! {
    /// Packet memory, only accessible as 16-bit half-words.
    pub PmaRegisters {
        (0x000 => pub words: [ReadWrite<u16>; 512]),
        (0x400 => @END),
    }
}

register_bitfields![u32,
    pub EPR [
        /// Correct transfer for reception (rc_w0)
        CTR_RX OFFSET(15) NUMBITS(1) [],
        /// Data toggle, for reception transfers (toggle)
        DTOG_RX OFFSET(14) NUMBITS(1) [],
        /// Status bits, for reception transfers (toggle)
        STAT_RX OFFSET(12) NUMBITS(2) [
            Disabled = 0,
            Stall = 1,
            Nak = 2,
            Valid = 3
        ],
        /// Last transaction was a SETUP (read-only)
        SETUP OFFSET(11) NUMBITS(1) [],
        /// Endpoint type
        EP_TYPE OFFSET(9) NUMBITS(2) [
            Bulk = 0,
            Control = 1,
            Isochronous = 2,
            Interrupt = 3
        ],
        /// Endpoint kind: double buffering for bulk, STATUS_OUT for control
        EP_KIND OFFSET(8) NUMBITS(1) [],
        /// Correct transfer for transmission (rc_w0)
        CTR_TX OFFSET(7) NUMBITS(1) [],
        /// Data toggle, for transmission transfers (toggle)
        DTOG_TX OFFSET(6) NUMBITS(1) [],
        /// Status bits, for transmission transfers (toggle)
        STAT_TX OFFSET(4) NUMBITS(2) [
            Disabled = 0,
            Stall = 1,
            Nak = 2,
            Valid = 3
        ],
        /// Endpoint address
        EA OFFSET(0) NUMBITS(4) []
    ],
    pub CNTR [
        CTRM OFFSET(15) NUMBITS(1) [],
        PMAOVRM OFFSET(14) NUMBITS(1) [],
        ERRM OFFSET(13) NUMBITS(1) [],
        WKUPM OFFSET(12) NUMBITS(1) [],
        SUSPM OFFSET(11) NUMBITS(1) [],
        RESETM OFFSET(10) NUMBITS(1) [],
        SOFM OFFSET(9) NUMBITS(1) [],
        ESOFM OFFSET(8) NUMBITS(1) [],
        L1REQM OFFSET(7) NUMBITS(1) [],
        L1RESUME OFFSET(5) NUMBITS(1) [],
        RESUME OFFSET(4) NUMBITS(1) [],
        FSUSP OFFSET(3) NUMBITS(1) [],
        LP_MODE OFFSET(2) NUMBITS(1) [],
        /// Power down
        PDWN OFFSET(1) NUMBITS(1) [],
        /// Force USB reset
        FRES OFFSET(0) NUMBITS(1) []
    ],
    pub ISTR [
        /// Correct transfer (read-only, cleared through EPnR)
        CTR OFFSET(15) NUMBITS(1) [],
        PMAOVR OFFSET(14) NUMBITS(1) [],
        ERR OFFSET(13) NUMBITS(1) [],
        WKUP OFFSET(12) NUMBITS(1) [],
        SUSP OFFSET(11) NUMBITS(1) [],
        RESET OFFSET(10) NUMBITS(1) [],
        SOF OFFSET(9) NUMBITS(1) [],
        ESOF OFFSET(8) NUMBITS(1) [],
        L1REQ OFFSET(7) NUMBITS(1) [],
        DIR OFFSET(4) NUMBITS(1) [],
        EP_ID OFFSET(0) NUMBITS(4) []
    ],
    pub FNR [
        RXDP OFFSET(15) NUMBITS(1) [],
        RXDM OFFSET(14) NUMBITS(1) [],
        LCK OFFSET(13) NUMBITS(1) [],
        LSOF OFFSET(11) NUMBITS(2) [],
        FN OFFSET(0) NUMBITS(11) []
    ],
    pub DADDR [
        /// Enable function
        EF OFFSET(7) NUMBITS(1) [],
        ADD OFFSET(0) NUMBITS(7) []
    ],
    pub BTABLE [
        BTABLE OFFSET(3) NUMBITS(13) []
    ],
    pub LPMCSR [
        BESL OFFSET(4) NUMBITS(4) [],
        REMWAKE OFFSET(3) NUMBITS(1) [],
        LPMACK OFFSET(1) NUMBITS(1) [],
        LPMEN OFFSET(0) NUMBITS(1) []
    ],
    pub BCDR [
        /// DP pull-up control
        DPPU OFFSET(15) NUMBITS(1) [],
        PS2DET OFFSET(7) NUMBITS(1) [],
        SDET OFFSET(6) NUMBITS(1) [],
        PDET OFFSET(5) NUMBITS(1) [],
        DCDET OFFSET(4) NUMBITS(1) [],
        SDEN OFFSET(3) NUMBITS(1) [],
        PDEN OFFSET(2) NUMBITS(1) [],
        DCDEN OFFSET(1) NUMBITS(1) [],
        BCDEN OFFSET(0) NUMBITS(1) []
    ]
];
