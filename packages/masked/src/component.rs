//! Base definitions for components.
//!
//! Entities carry no data of their own; everything is attached to them as
//! components. Each component type registered with a `World` is given one bit
//! of a `ComponentMask`, and every entity records which components it has in
//! its own mask.

use std::any::{type_name, TypeId};
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// The maximum number of component types a single world can register.
pub const MAX_COMPONENT_TYPES: usize = u64::BITS as usize;

/// The component trait is implemented on all component types.
///
/// Newly attached components start out as `Default::default()`.
pub trait Component: Debug + Default + Send + Sync + 'static {}

impl<T: Debug + Default + Send + Sync + 'static> Component for T {}

/// A set of component types, one bit per registered type.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentMask(u64);

impl ComponentMask {
    /// The mask with no components in it.
    pub const EMPTY: ComponentMask = ComponentMask(0);

    /// Create a mask from its raw bits.
    pub const fn from_bits(bits: u64) -> ComponentMask {
        ComponentMask(bits)
    }

    /// Create a mask with only the bit at `index` set.
    pub fn bit(index: usize) -> ComponentMask {
        assert!(index < MAX_COMPONENT_TYPES, "component bit {} out of range", index);
        ComponentMask(1 << index)
    }

    /// Return the raw bits of this mask.
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Returns true if no bits are set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Return the number of component types in the mask.
    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns true if every bit of `other` is also set in this mask.
    pub const fn contains(&self, other: ComponentMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if this mask and `other` share at least one bit.
    pub const fn intersects(&self, other: ComponentMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns true if the bit at `index` is set.
    pub fn has_bit(&self, index: usize) -> bool {
        index < MAX_COMPONENT_TYPES && self.0 & (1 << index) != 0
    }

    /// Return this mask with the bits of `other` set.
    pub const fn with(self, other: ComponentMask) -> ComponentMask {
        ComponentMask(self.0 | other.0)
    }

    /// Return this mask with the bits of `other` cleared.
    pub const fn without(self, other: ComponentMask) -> ComponentMask {
        ComponentMask(self.0 & !other.0)
    }

    /// Iterate over the indices of the set bits, lowest first.
    pub fn iter(&self) -> MaskBits {
        MaskBits(self.0)
    }
}

impl Debug for ComponentMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentMask({:#b})", self.0)
    }
}

impl BitOr for ComponentMask {
    type Output = ComponentMask;

    fn bitor(self, rhs: ComponentMask) -> ComponentMask {
        ComponentMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ComponentMask {
    fn bitor_assign(&mut self, rhs: ComponentMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ComponentMask {
    type Output = ComponentMask;

    fn bitand(self, rhs: ComponentMask) -> ComponentMask {
        ComponentMask(self.0 & rhs.0)
    }
}

impl BitAndAssign for ComponentMask {
    fn bitand_assign(&mut self, rhs: ComponentMask) {
        self.0 &= rhs.0;
    }
}

impl Not for ComponentMask {
    type Output = ComponentMask;

    fn not(self) -> ComponentMask {
        ComponentMask(!self.0)
    }
}

impl IntoIterator for ComponentMask {
    type Item = usize;
    type IntoIter = MaskBits;

    fn into_iter(self) -> MaskBits {
        MaskBits(self.0)
    }
}

/// An iterator over the set bit indices of a `ComponentMask`.
#[derive(Clone, Debug)]
pub struct MaskBits(u64);

impl Iterator for MaskBits {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }

        let index = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for MaskBits {}

/// A typed handle to a component type registered with a `World`.
///
/// Handles are only meaningful for the world which issued them. Using one with a
/// different world finds either nothing or a mismatched type, and accessors
/// return `None` in both cases.
pub struct ComponentType<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ComponentType<T> {
    pub(crate) fn new(index: usize) -> ComponentType<T> {
        debug_assert!(index < MAX_COMPONENT_TYPES);
        ComponentType {
            index,
            _marker: PhantomData,
        }
    }

    /// Return the bit index assigned to this component type.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Return the mask containing only this component type.
    pub fn mask(&self) -> ComponentMask {
        ComponentMask::bit(self.index)
    }
}

impl<T> Clone for ComponentType<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ComponentType<T> {}

impl<T> PartialEq for ComponentType<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for ComponentType<T> {}

impl<T> Debug for ComponentType<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType<{}>(#{})", type_name::<T>(), self.index)
    }
}

impl<T> From<ComponentType<T>> for ComponentMask {
    fn from(ty: ComponentType<T>) -> ComponentMask {
        ty.mask()
    }
}

impl<T> BitOr<ComponentType<T>> for ComponentMask {
    type Output = ComponentMask;

    fn bitor(self, rhs: ComponentType<T>) -> ComponentMask {
        self | rhs.mask()
    }
}

impl<T, R: Into<ComponentMask>> BitOr<R> for ComponentType<T> {
    type Output = ComponentMask;

    fn bitor(self, rhs: R) -> ComponentMask {
        self.mask() | rhs.into()
    }
}

/// The dynamic description of a registered component type.
#[derive(Clone, Copy)]
pub struct ComponentRegistration {
    index: usize,
    type_id: TypeId,
    name: &'static str,
    size: usize,
}

impl ComponentRegistration {
    pub(crate) fn new<T: Component>(index: usize) -> ComponentRegistration {
        ComponentRegistration {
            index,
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            size: std::mem::size_of::<T>(),
        }
    }

    /// Return the bit index of this component type.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Return the mask containing only this component type.
    pub fn mask(&self) -> ComponentMask {
        ComponentMask::bit(self.index)
    }

    /// Return the Rust `TypeId` of the payload.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Get the name of this component type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the size in bytes of one payload.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Debug for ComponentRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<ComponentRegistration {} #{}>", self.name, self.index)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mask_operations() {
        let a = ComponentMask::bit(0);
        let b = ComponentMask::bit(3);
        let ab = a | b;

        assert_eq!(ab.bits(), 0b1001);
        assert_eq!(ab.len(), 2);
        assert!(ab.contains(a));
        assert!(ab.contains(ab));
        assert!(!a.contains(ab));
        assert!(a.intersects(ab));
        assert!(!a.intersects(b));
        assert!(ab.contains(ComponentMask::EMPTY));
        assert!(!ComponentMask::EMPTY.intersects(ab));
        assert_eq!(ab.without(a), b);
        assert_eq!(a.with(b), ab);
        assert_eq!(ab & b, b);
        assert!(ab.has_bit(3));
        assert!(!ab.has_bit(2));
        assert!(!ab.has_bit(MAX_COMPONENT_TYPES));
    }

    #[test]
    fn test_mask_iter() {
        let mask = ComponentMask::bit(1) | ComponentMask::bit(5) | ComponentMask::bit(63);
        let bits: Vec<_> = mask.iter().collect();
        assert_eq!(bits, vec![1, 5, 63]);
        assert_eq!(mask.iter().len(), 3);
        assert_eq!(ComponentMask::EMPTY.iter().next(), None);
    }

    #[test]
    #[should_panic]
    fn test_mask_bit_out_of_range() {
        ComponentMask::bit(MAX_COMPONENT_TYPES);
    }

    #[test]
    fn test_component_type_mask() {
        #[derive(Debug, Default)]
        struct A;
        #[derive(Debug, Default)]
        struct B(u32);

        let a = ComponentType::<A>::new(0);
        let b = ComponentType::<B>::new(2);

        assert_eq!(a.mask(), ComponentMask::bit(0));
        assert_eq!(ComponentMask::from(b), ComponentMask::bit(2));
        assert_eq!(a | b, ComponentMask::from_bits(0b101));

        let registration = ComponentRegistration::new::<B>(2);
        assert_eq!(registration.mask(), b.mask());
        assert_eq!(registration.size(), 4);
        assert_eq!(registration.type_id(), TypeId::of::<B>());
    }
}
