// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Tock specific `MapCell` type for sharing references.

use core::cell::{Cell, UnsafeCell};
use core::mem::MaybeUninit;
use core::ptr;

/// A mutable memory location that enforces borrow rules at runtime without
/// possible panics.
///
/// A `MapCell` is a potential reference to mutable memory. Borrow rules are
/// enforced by forcing clients to either move the memory out of the cell or
/// operate on a borrow within a closure. You can think of a `MapCell` as an
/// `Option` wrapped in a `RefCell`: attempts to take the value from inside a
/// `MapCell` may fail by returning `None`.
pub struct MapCell<T> {
    // Initialized unless `state` is `Uninit`.
    val: UnsafeCell<MaybeUninit<T>>,
    state: Cell<MapCellState>,
}

#[derive(Clone, Copy, PartialEq)]
enum MapCellState {
    Uninit,
    Init,
    Borrowed,
}

impl<T> MapCell<T> {
    pub const fn empty() -> MapCell<T> {
        MapCell {
            val: UnsafeCell::new(MaybeUninit::uninit()),
            state: Cell::new(MapCellState::Uninit),
        }
    }

    /// Creates a new `MapCell` containing `value`
    pub const fn new(value: T) -> MapCell<T> {
        MapCell {
            val: UnsafeCell::new(MaybeUninit::new(value)),
            state: Cell::new(MapCellState::Init),
        }
    }

    pub fn is_none(&self) -> bool {
        !self.is_some()
    }

    /// A value that is currently lent to a `map` closure counts as present.
    pub fn is_some(&self) -> bool {
        self.state.get() != MapCellState::Uninit
    }

    /// Takes the value out of the `MapCell` leaving it empty. If
    /// the value has already been taken elsewhere (and not `replace`ed), the
    /// returned `Option` will be `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tock_cells::map_cell::MapCell;
    ///
    /// let cell = MapCell::new(1234);
    /// let x = &cell;
    /// let y = &cell;
    ///
    /// assert_eq!(x.take(), Some(1234));
    /// assert_eq!(y.take(), None);
    /// ```
    pub fn take(&self) -> Option<T> {
        if self.state.get() != MapCellState::Init {
            None
        } else {
            self.state.set(MapCellState::Uninit);
            // SAFETY: the value is initialized and no borrow is outstanding.
            // Marking the cell `Uninit` hands ownership to the caller.
            unsafe { Some(ptr::read(self.val.get()).assume_init()) }
        }
    }

    /// Stores `val`, dropping the previous contents. Has no effect while the
    /// value is borrowed by a `map` closure.
    pub fn put(&self, val: T) {
        drop(self.replace(val));
    }

    /// Replaces the contents of the `MapCell` with `val`. If the cell was not
    /// empty, the previous value is returned, otherwise `None` is returned.
    /// While the value is borrowed by a `map` closure, `val` is handed back
    /// unchanged.
    pub fn replace(&self, val: T) -> Option<T> {
        match self.state.get() {
            MapCellState::Borrowed => Some(val),
            MapCellState::Init => {
                // SAFETY: initialized and not borrowed.
                unsafe { Some(ptr::replace(self.val.get(), MaybeUninit::new(val)).assume_init()) }
            }
            MapCellState::Uninit => {
                // SAFETY: nothing to drop and not borrowed.
                unsafe { ptr::write(self.val.get(), MaybeUninit::new(val)) };
                self.state.set(MapCellState::Init);
                None
            }
        }
    }

    /// Allows `closure` to borrow the contents of the `MapCell` if-and-only-if
    /// it is not `take`n already. The state of the `MapCell` is unchanged
    /// after the closure completes.
    ///
    /// # Examples
    ///
    /// ```
    /// use tock_cells::map_cell::MapCell;
    ///
    /// let cell = MapCell::new(1234);
    /// let x = &cell;
    /// let y = &cell;
    ///
    /// x.map(|value| {
    ///     // We have mutable access to the value while in the closure
    ///     *value += 1;
    /// });
    ///
    /// // After the closure completes, the mutable memory is still in the cell,
    /// // but potentially changed.
    /// assert_eq!(y.take(), Some(1235));
    /// ```
    pub fn map<F, R>(&self, closure: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        if self.state.get() == MapCellState::Init {
            self.state.set(MapCellState::Borrowed);
            // SAFETY: the value is initialized, and while the cell is
            // `Borrowed` no other access to it is handed out.
            let valref = unsafe { (*self.val.get()).assume_init_mut() };
            let res = closure(valref);
            self.state.set(MapCellState::Init);
            Some(res)
        } else {
            None
        }
    }

    pub fn map_or<F, R>(&self, default: R, closure: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        self.map(closure).unwrap_or(default)
    }

    /// Behaves the same as `map`, except the closure is allowed to return
    /// an `Option`.
    pub fn and_then<F, R>(&self, closure: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> Option<R>,
    {
        self.map(closure).flatten()
    }

    pub fn modify_or_replace<F, G>(&self, modify: F, mkval: G)
    where
        F: FnOnce(&mut T),
        G: FnOnce() -> T,
    {
        if self.is_none() {
            self.put(mkval());
        } else {
            self.map(modify);
        }
    }
}

impl<T> Drop for MapCell<T> {
    fn drop(&mut self) {
        drop(self.take());
    }
}

#[cfg(test)]
mod tests {
    use super::MapCell;

    #[test]
    fn map_is_refused_while_borrowed() {
        let cell = MapCell::new([0u8; 4]);
        let outer = cell.map(|buf| {
            buf[0] = 7;
            cell.map(|inner| inner[0])
        });
        assert_eq!(outer, Some(None));
        assert_eq!(cell.map(|buf| buf[0]), Some(7));
    }

    #[test]
    fn put_while_borrowed_keeps_the_borrowed_value() {
        let cell = MapCell::new(1u32);
        cell.map(|v| {
            assert_eq!(cell.replace(9), Some(9));
            assert_eq!(cell.take(), None);
            *v = 2;
        });
        assert_eq!(cell.take(), Some(2));
    }

    #[test]
    fn empty_cell_is_filled_by_put() {
        let cell = MapCell::empty();
        assert!(cell.is_none());
        cell.modify_or_replace(|v: &mut u32| *v += 1, || 10);
        cell.modify_or_replace(|v| *v += 1, || 10);
        assert_eq!(cell.replace(3), Some(11));
        assert_eq!(cell.take(), Some(3));
        assert!(cell.is_none());
    }
}
