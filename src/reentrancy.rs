//! Debug-only detection of a table being re-entered from its own callbacks.
//!
//! Lookups run user `Hash` and `KeyEq` code while holding references into
//! the chain. A callback that reaches back into the same table (through a
//! raw pointer or interior mutability) would observe a half-walked run. In
//! debug builds the table marks itself busy for the duration of every
//! probe and panics on a nested probe. Release builds carry no state.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

#[derive(Debug, Default)]
pub(crate) struct ProbeFlag {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
}

impl ProbeFlag {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Cell::new(false),
        }
    }

    /// Marks the table busy until the returned guard drops.
    #[inline]
    pub(crate) fn enter(&self) -> Probe<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "table re-entered from a hash or equality callback"
            );
        }
        Probe {
            #[cfg(debug_assertions)]
            flag: self,
            _lt: PhantomData,
        }
    }
}

pub(crate) struct Probe<'a> {
    #[cfg(debug_assertions)]
    flag: &'a ProbeFlag,
    _lt: PhantomData<&'a ()>,
}

impl Drop for Probe<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.flag.busy.set(false);
    }
}
