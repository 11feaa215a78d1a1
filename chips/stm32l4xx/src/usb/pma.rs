// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Packet memory access and buffer descriptor table layout.
//!
//! The PMA is only reachable with 16-bit accesses. Bytes are packed two per
//! half-word, low byte first. Offsets are byte offsets and must be even.

use kernel::utilities::registers::interfaces::{Readable, Writeable};

/// Mask of the byte count in a COUNTn_TX / COUNTn_RX entry.
pub const COUNT_MASK: u16 = 0x3FF;

const BLSIZE: u16 = 1 << 15;

/// Entries of one endpoint in the buffer descriptor table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferDescriptorField {
    /// ADDRn_TX, or ADDRn_RX_0 for a double-buffered OUT endpoint
    AddrTx = 0,
    /// COUNTn_TX, or COUNTn_RX_0 for a double-buffered OUT endpoint
    CountTx = 1,
    /// ADDRn_RX, or ADDRn_TX_1 for a double-buffered IN endpoint
    AddrRx = 2,
    /// COUNTn_RX, or COUNTn_TX_1 for a double-buffered IN endpoint
    CountRx = 3,
}

/// Half-word index of a buffer descriptor table entry.
pub fn descriptor_word(btable: usize, endpoint: usize, field: BufferDescriptorField) -> usize {
    ((btable + endpoint * 8) >> 1) + field as usize
}

/// Encode the size of an OUT buffer for a COUNTn_RX entry.
///
/// Sizes up to 62 bytes are allocated in 2-byte blocks, larger ones in
/// 32-byte blocks. The allocation is rounded up, never down.
pub fn rx_count_allocation(count: u16) -> u16 {
    if count > 62 {
        let blocks = count.div_ceil(32);
        BLSIZE | ((blocks - 1) << 10)
    } else {
        count.div_ceil(2) << 10
    }
}

/// Copy `src` into packet memory starting at byte `offset`.
///
/// An odd final byte is written into the low half of its half-word with the
/// high half zeroed. No bounds checking is done beyond slice indexing.
pub fn write<W>(words: &[W], offset: usize, src: &[u8])
where
    W: Writeable<T = u16, R = ()>,
{
    let base = offset >> 1;
    for (i, pair) in src.chunks(2).enumerate() {
        let low = pair[0] as u16;
        let high = pair.get(1).map_or(0, |b| *b as u16);
        words[base + i].set(low | (high << 8));
    }
}

/// Copy `dst.len()` bytes out of packet memory starting at byte `offset`.
pub fn read<M>(words: &[M], offset: usize, dst: &mut [u8])
where
    M: Readable<T = u16, R = ()>,
{
    let base = offset >> 1;
    for (i, pair) in dst.chunks_mut(2).enumerate() {
        let word = words[base + i].get();
        pair[0] = word as u8;
        if let Some(high) = pair.get_mut(1) {
            *high = (word >> 8) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::utilities::registers::InMemoryRegister;

    fn memory() -> [InMemoryRegister<u16>; 64] {
        core::array::from_fn(|_| InMemoryRegister::new(0))
    }

    fn pattern(n: usize) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        for (i, b) in bytes.iter_mut().enumerate().take(n) {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        bytes
    }

    #[test]
    fn read_back_reproduces_written_bytes() {
        for n in [0usize, 1, 2, 3, 64, 65] {
            let words = memory();
            let src = pattern(n);
            write(&words, 4, &src[..n]);
            let mut dst = [0xAAu8; 65];
            read(&words, 4, &mut dst[..n]);
            assert_eq!(&dst[..n], &src[..n], "length {}", n);
        }
    }

    #[test]
    fn bytes_are_packed_low_byte_first() {
        let words = memory();
        write(&words, 2, &[0x34, 0x12, 0x78]);
        assert_eq!(words[0].get(), 0);
        assert_eq!(words[1].get(), 0x1234);
        assert_eq!(words[2].get(), 0x0078);
        assert_eq!(words[3].get(), 0);
    }

    #[test]
    fn odd_read_leaves_trailing_byte_untouched() {
        let words = memory();
        words[0].set(0xBBAA);
        let mut dst = [0u8; 2];
        read(&words, 0, &mut dst[..1]);
        assert_eq!(dst, [0xAA, 0]);
    }

    #[test]
    fn rx_allocation_encoding() {
        assert_eq!(rx_count_allocation(0), 0);
        assert_eq!(rx_count_allocation(8), 4 << 10);
        assert_eq!(rx_count_allocation(9), 5 << 10);
        assert_eq!(rx_count_allocation(62), 31 << 10);
        assert_eq!(rx_count_allocation(64), BLSIZE | (1 << 10));
        assert_eq!(rx_count_allocation(100), BLSIZE | (3 << 10));
    }

    #[test]
    fn descriptor_table_layout() {
        assert_eq!(descriptor_word(0, 0, BufferDescriptorField::AddrTx), 0);
        assert_eq!(descriptor_word(0, 0, BufferDescriptorField::CountRx), 3);
        assert_eq!(descriptor_word(0, 2, BufferDescriptorField::AddrRx), 10);
        assert_eq!(descriptor_word(0x40, 1, BufferDescriptorField::CountTx), 37);
    }
}
