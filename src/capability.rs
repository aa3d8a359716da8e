//! Pluggable key equality and allocator copy policy.
//!
//! Hashing is supplied through `core::hash::BuildHasher`, the way std maps
//! take it. Equality is a separate capability so a table can compare keys by
//! something other than `Eq` (case folding, tolerance, identity). Whatever
//! equality is installed must agree with the hasher: keys that compare equal
//! must hash equal.

use allocator_api2::alloc::Global;

/// Key equality used on every insert, lookup and erase.
///
/// `Q` is the type being compared against a stored key; for owned-key
/// operations it is `K` itself, for borrowed lookups it is the borrowed form.
pub trait KeyEq<Q: ?Sized> {
    fn equal(&self, stored: &Q, probe: &Q) -> bool;
}

/// Equality through `Eq`; the default capability.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DefaultEq;

impl<Q: ?Sized + Eq> KeyEq<Q> for DefaultEq {
    #[inline]
    fn equal(&self, stored: &Q, probe: &Q) -> bool {
        stored == probe
    }
}

/// Adapts a closure `Fn(&Q, &Q) -> bool` into a `KeyEq<Q>`.
#[derive(Copy, Clone, Debug)]
pub struct EqFn<F>(pub F);

impl<Q: ?Sized, F> KeyEq<Q> for EqFn<F>
where
    F: Fn(&Q, &Q) -> bool,
{
    #[inline]
    fn equal(&self, stored: &Q, probe: &Q) -> bool {
        (self.0)(stored, probe)
    }
}

/// Which allocator a copied table uses.
///
/// Copying a table calls `select_on_copy` on the source's allocator; the
/// result backs every entry of the copy.
pub trait SelectOnCopy {
    fn select_on_copy(&self) -> Self;
}

impl SelectOnCopy for Global {
    fn select_on_copy(&self) -> Self {
        Global
    }
}

// A borrowed allocator is shared with the copy.
impl<A: ?Sized> SelectOnCopy for &A {
    fn select_on_copy(&self) -> Self {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_eq_uses_eq() {
        assert!(KeyEq::<str>::equal(&DefaultEq, "a", "a"));
        assert!(!KeyEq::<str>::equal(&DefaultEq, "a", "b"));
    }

    #[test]
    fn closure_eq() {
        let ci = EqFn(|a: &str, b: &str| a.eq_ignore_ascii_case(b));
        assert!(ci.equal("Key", "kEY"));
        assert!(!ci.equal("Key", "kay"));
    }
}
