// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! USB full-speed device controller.
//!
//! Endpoint buffers live in the 1 KiB packet memory area, described by a
//! buffer descriptor table placed at PMA offset 0. Every endpoint register
//! update goes through [`endpoint::EndpointRegister`], which reads the
//! register once and computes a single write that leaves unrelated toggle
//! and write-clear bits untouched.
//!
//! The chip only moves bytes and flips handshake bits. Protocol handling is
//! done by the [`hil::usb::Client`], typically the USB device core capsule.

use kernel::debug;
use kernel::hil;
use kernel::hil::usb::{Direction, EndpointConfig, EndpointStatus, TransferType};
use kernel::utilities::cells::OptionalCell;
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable, Writeable};
use kernel::utilities::StaticRef;

pub mod endpoint;
pub mod pma;
pub mod registers;

use self::endpoint::EndpointRegister;
use self::pma::BufferDescriptorField;
use self::registers::{
    PmaRegisters, UsbRegisters, BCDR, CNTR, DADDR, ISTR, PMA_BASE, PMA_SIZE, USB_BASE,
};

/// Byte offset of the buffer descriptor table in packet memory.
const BTABLE_OFFSET: usize = 0;

/// Busy-wait iterations covering the 1 µs analog startup time (tSTARTUP)
/// at the highest core clock.
const STARTUP_SPINS: usize = 80;

pub struct Usb<'a> {
    registers: StaticRef<UsbRegisters>,
    pma: StaticRef<PmaRegisters>,
    client: OptionalCell<&'a dyn hil::usb::Client>,
}

impl<'a> Usb<'a> {
    pub const fn new() -> Usb<'a> {
        Usb::with_registers(USB_BASE, PMA_BASE)
    }

    const fn with_registers(
        registers: StaticRef<UsbRegisters>,
        pma: StaticRef<PmaRegisters>,
    ) -> Usb<'a> {
        Usb {
            registers,
            pma,
            client: OptionalCell::empty(),
        }
    }

    fn endpoint_register(&self, endpoint: usize) -> EndpointRegister {
        EndpointRegister::new(self.registers.epr[endpoint].get())
    }

    fn write_endpoint_register(&self, endpoint: usize, value: u32) {
        self.registers.epr[endpoint].set(value);
    }

    fn descriptor(&self, endpoint: usize, field: BufferDescriptorField) -> u16 {
        self.pma.words[pma::descriptor_word(BTABLE_OFFSET, endpoint, field)].get()
    }

    fn set_descriptor(&self, endpoint: usize, field: BufferDescriptorField, value: u16) {
        self.pma.words[pma::descriptor_word(BTABLE_OFFSET, endpoint, field)].set(value);
    }

    fn check_pma_range(offset: usize, len: usize) {
        if offset + len > PMA_SIZE || offset & 1 != 0 {
            panic!("USB: PMA access {}+{} outside packet memory", offset, len);
        }
    }

    /// Entry point of the USB interrupt.
    ///
    /// Transfer-complete events are served first, one endpoint at a time,
    /// until ISTR.CTR drops. The remaining conditions are then handled from
    /// the status read on entry in the order reset, wakeup, suspend,
    /// start-of-frame, and acknowledged with a single write.
    pub fn handle_interrupt(&self) {
        let istr = self.registers.istr.extract();
        let mut handled = 0u32;

        // ISTR.CTR and EP_ID track the highest priority endpoint with a
        // pending CTR_RX/CTR_TX and move on as soon as those are cleared.
        let mut pending = istr;
        while pending.is_set(ISTR::CTR) {
            let endpoint = pending.read(ISTR::EP_ID) as usize;
            self.transfer_complete(endpoint);
            pending = self.registers.istr.extract();
        }

        if istr.is_set(ISTR::RESET) {
            handled |= ISTR::RESET::SET.value;
            self.client.map(|client| client.bus_reset());
        }

        if istr.is_set(ISTR::WKUP) {
            handled |= ISTR::WKUP::SET.value;
            self.client.map(|client| client.wakeup());
        }

        if istr.is_set(ISTR::SUSP) {
            handled |= ISTR::SUSP::SET.value;
            self.client.map(|client| client.suspend());
        }

        if istr.is_set(ISTR::SOF) {
            handled |= ISTR::SOF::SET.value;
            self.client.map(|client| client.start_of_frame());
        }

        // Status flags are rc_w0: only the flags handled above are written
        // as 0, anything raised since the read survives.
        self.registers.istr.set(!handled & 0xFFFF);
    }

    /// Acknowledge one direction of `endpoint` and report it. IN is served
    /// before OUT when both are pending.
    fn transfer_complete(&self, endpoint: usize) {
        let epr = self.endpoint_register(endpoint);
        let direction = if epr.transfer_complete(Direction::In) {
            Direction::In
        } else {
            Direction::Out
        };
        self.write_endpoint_register(endpoint, epr.clear_transfer_complete(direction));
        let setup = direction == Direction::Out && epr.is_setup();

        self.client.map(|client| {
            client.transfer_complete(endpoint, direction, setup);
        });
    }
}

impl<'a> hil::usb::UsbController<'a> for Usb<'a> {
    fn set_client(&self, client: &'a dyn hil::usb::Client) {
        self.client.set(client);
    }

    fn enable(&self) {
        self.registers.cntr.modify(CNTR::PDWN::CLEAR);
        for _ in 0..STARTUP_SPINS {
            core::hint::spin_loop();
        }
        self.registers.btable.set(BTABLE_OFFSET as u32);

        for word in self.pma.words.iter() {
            word.set(0);
        }

        self.registers.cntr.modify(CNTR::FRES::CLEAR);
        self.registers.cntr.modify(
            CNTR::CTRM::SET
                + CNTR::RESETM::SET
                + CNTR::SUSPM::SET
                + CNTR::WKUPM::SET
                + CNTR::SOFM::SET,
        );
        self.registers.istr.set(0);

        if kernel::config::CONFIG.trace_usb {
            debug!("usb: controller enabled");
        }
    }

    fn attach(&self) {
        self.registers.bcdr.modify(BCDR::DPPU::SET);
    }

    fn detach(&self) {
        self.registers.bcdr.modify(BCDR::DPPU::CLEAR);
    }

    fn endpoint_configure(&self, endpoint: usize, config: EndpointConfig) {
        use BufferDescriptorField::{AddrRx, AddrTx, CountRx, CountTx};

        let epr = self.endpoint_register(endpoint);
        let value = match config {
            EndpointConfig::Single {
                transfer_type,
                tx,
                rx,
            } => {
                self.set_descriptor(endpoint, AddrTx, tx.unwrap_or(0));
                self.set_descriptor(endpoint, CountTx, 0);
                let (rx_addr, rx_count) = rx.unwrap_or((0, 0));
                self.set_descriptor(endpoint, AddrRx, rx_addr);
                self.set_descriptor(endpoint, CountRx, pma::rx_count_allocation(rx_count));

                let rx_status = match rx {
                    Some(_) => EndpointStatus::Valid,
                    None => EndpointStatus::Disabled,
                };
                let tx_status = match tx {
                    Some(_) => EndpointStatus::Nak,
                    None => EndpointStatus::Disabled,
                };
                epr.configure(transfer_type, false, endpoint, rx_status, tx_status)
            }
            EndpointConfig::DoubleTx {
                transfer_type,
                buffers: (buf0, buf1),
            } => {
                self.set_descriptor(endpoint, AddrTx, buf0);
                self.set_descriptor(endpoint, CountTx, 0);
                self.set_descriptor(endpoint, AddrRx, buf1);
                self.set_descriptor(endpoint, CountRx, 0);
                epr.configure(
                    transfer_type,
                    transfer_type == TransferType::Bulk,
                    endpoint,
                    EndpointStatus::Disabled,
                    EndpointStatus::Disabled,
                )
            }
            EndpointConfig::DoubleRx {
                transfer_type,
                buffers: (buf0, buf1),
                rx_count,
            } => {
                let allocation = pma::rx_count_allocation(rx_count);
                self.set_descriptor(endpoint, AddrTx, buf0);
                self.set_descriptor(endpoint, CountTx, allocation);
                self.set_descriptor(endpoint, AddrRx, buf1);
                self.set_descriptor(endpoint, CountRx, allocation);
                epr.configure(
                    transfer_type,
                    transfer_type == TransferType::Bulk,
                    endpoint,
                    EndpointStatus::Disabled,
                    EndpointStatus::Disabled,
                )
            }
        };
        self.write_endpoint_register(endpoint, value);
    }

    fn endpoint_clear_configuration(&self, endpoint: usize) {
        use BufferDescriptorField::{AddrRx, AddrTx, CountRx, CountTx};

        for field in [AddrTx, CountTx, AddrRx, CountRx] {
            self.set_descriptor(endpoint, field, 0);
        }
        let epr = self.endpoint_register(endpoint);
        self.write_endpoint_register(endpoint, epr.clear_configuration());
    }

    fn endpoint_set_status(&self, endpoint: usize, direction: Direction, status: EndpointStatus) {
        let epr = self.endpoint_register(endpoint);
        self.write_endpoint_register(endpoint, epr.set_status(direction, status));
    }

    fn endpoint_status(&self, endpoint: usize, direction: Direction) -> EndpointStatus {
        self.endpoint_register(endpoint).status(direction)
    }

    fn endpoint_set_stall(&self, endpoint: usize, direction: Direction) {
        if let Some(value) = self.endpoint_register(endpoint).set_stall(direction) {
            self.write_endpoint_register(endpoint, value);
        }
    }

    fn endpoint_clear_stall(&self, endpoint: usize, direction: Direction) {
        if let Some(value) = self.endpoint_register(endpoint).clear_stall(direction) {
            self.write_endpoint_register(endpoint, value);
        }
    }

    fn endpoint_is_stalled(&self, endpoint: usize, direction: Direction) -> bool {
        self.endpoint_status(endpoint, direction) == EndpointStatus::Stall
    }

    fn endpoint_set_kind(&self, endpoint: usize) {
        let epr = self.endpoint_register(endpoint);
        self.write_endpoint_register(endpoint, epr.set_kind());
    }

    fn endpoint_clear_kind(&self, endpoint: usize) {
        let epr = self.endpoint_register(endpoint);
        self.write_endpoint_register(endpoint, epr.clear_kind());
    }

    fn endpoint_write(&self, endpoint: usize, data: &[u8]) {
        let addr = self.descriptor(endpoint, BufferDescriptorField::AddrTx) as usize;
        Self::check_pma_range(addr, data.len());
        pma::write(&self.pma.words, addr, data);
        self.set_descriptor(endpoint, BufferDescriptorField::CountTx, data.len() as u16);
        self.endpoint_set_status(endpoint, Direction::In, EndpointStatus::Valid);
    }

    fn endpoint_read(&self, endpoint: usize, buf: &mut [u8]) -> usize {
        let count = self.endpoint_received_count(endpoint).min(buf.len());
        let addr = self.descriptor(endpoint, BufferDescriptorField::AddrRx) as usize;
        Self::check_pma_range(addr, count);
        pma::read(&self.pma.words, addr, &mut buf[..count]);
        count
    }

    fn endpoint_received_count(&self, endpoint: usize) -> usize {
        (self.descriptor(endpoint, BufferDescriptorField::CountRx) & pma::COUNT_MASK) as usize
    }

    fn set_address(&self, address: u8) {
        self.registers
            .daddr
            .write(DADDR::EF::SET + DADDR::ADD.val(address as u32 & 0x7F));
    }

    fn pma_size(&self) -> usize {
        PMA_SIZE
    }

    fn pma_read(&self, offset: usize, buf: &mut [u8]) {
        Self::check_pma_range(offset, buf.len());
        pma::read(&self.pma.words, offset, buf);
    }

    fn pma_write(&self, offset: usize, data: &[u8]) {
        Self::check_pma_range(offset, data.len());
        pma::write(&self.pma.words, offset, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use kernel::hil::usb::{Client, UsbController};

    const CTR: u32 = 1 << 15;
    const RESET: u32 = 1 << 10;
    const EPR_CTR_RX: u32 = 1 << 15;
    const EPR_SETUP: u32 = 1 << 11;
    const EPR_CTR_TX: u32 = 1 << 7;

    /// Stands in for the hardware ISTR update: after each acknowledged
    /// transfer the next queued status value becomes visible.
    struct Host<'r> {
        registers: &'r UsbRegisters,
        queued: Cell<&'r [u32]>,
        transfers: Cell<[Option<(usize, Direction, bool)>; 4]>,
        count: Cell<usize>,
        resets: Cell<usize>,
    }

    impl Client for Host<'_> {
        fn transfer_complete(&self, endpoint: usize, direction: Direction, setup: bool) {
            let mut transfers = self.transfers.get();
            transfers[self.count.get()] = Some((endpoint, direction, setup));
            self.transfers.set(transfers);
            self.count.set(self.count.get() + 1);

            match self.queued.get().split_first() {
                Some((next, rest)) => {
                    self.registers.istr.set(*next);
                    self.queued.set(rest);
                }
                None => self.registers.istr.set(0),
            }
        }

        fn bus_reset(&self) {
            self.resets.set(self.resets.get() + 1);
        }

        fn wakeup(&self) {}

        fn suspend(&self) {}

        fn start_of_frame(&self) {}
    }

    #[test]
    fn every_pending_transfer_is_served_in_one_interrupt() {
        // SAFETY: the register blocks are plain cells, all-zero is a valid
        // value.
        let registers: UsbRegisters = unsafe { core::mem::zeroed() };
        let pma: PmaRegisters = unsafe { core::mem::zeroed() };
        let usb = Usb::with_registers(
            unsafe { StaticRef::new(&registers as *const UsbRegisters) },
            unsafe { StaticRef::new(&pma as *const PmaRegisters) },
        );

        registers.epr[0].set(EPR_CTR_RX | EPR_SETUP | EPR_CTR_TX);
        registers.epr[2].set(EPR_CTR_RX);
        registers.istr.set(CTR | RESET);
        let queued = [CTR | RESET, CTR | RESET | 2, RESET];
        let host = Host {
            registers: &registers,
            queued: Cell::new(&queued[..]),
            transfers: Cell::new([None; 4]),
            count: Cell::new(0),
            resets: Cell::new(0),
        };
        usb.set_client(&host);

        // Both directions of EP0 are pending: IN first, then the SETUP.
        usb.handle_interrupt();

        let transfers = host.transfers.get();
        assert_eq!(host.count.get(), 3);
        assert_eq!(transfers[0], Some((0, Direction::In, false)));
        assert_eq!(transfers[1], Some((0, Direction::Out, true)));
        assert_eq!(transfers[2], Some((2, Direction::Out, false)));
        assert_eq!(registers.epr[2].get() & EPR_CTR_RX, 0);
        assert_eq!(host.resets.get(), 1);
        assert_eq!(registers.istr.get() & RESET, 0);
    }
}
