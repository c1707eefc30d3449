//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To
/// "modify" one, build a new one (e.g. `DocumentTotals::compute(..)` returns a
/// fresh set of totals every time lines change).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
