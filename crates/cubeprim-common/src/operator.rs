use crate::{Element, Numeric};

/// An associative binary operator used by scans and reductions.
///
/// Operators are cloned into every kernel that uses them, so they should be cheap to clone.
/// Associativity is required, commutativity is not: primitives always combine operands in
/// increasing index order, `combine(earlier, later)`.
pub trait BinaryOp<T>: Clone + Send + Sync + 'static {
    /// Combine two values.
    fn combine(&self, lhs: T, rhs: T) -> T;
}

/// A strict weak ordering used by sorts and binary searches.
pub trait CompareOp<T>: Clone + Send + Sync + 'static {
    /// Whether `lhs` is ordered strictly before `rhs`.
    fn less(&self, lhs: &T, rhs: &T) -> bool;
}

/// An equivalence predicate used by searches.
pub trait BinaryPredicate<T>: Clone + Send + Sync + 'static {
    /// Whether `lhs` and `rhs` are considered equal.
    fn test(&self, lhs: &T, rhs: &T) -> bool;
}

/// Addition.
#[derive(Clone, Copy, Debug, Default)]
pub struct Plus;

/// Minimum, keeping the left operand on ties.
#[derive(Clone, Copy, Debug, Default)]
pub struct Minimum;

/// Maximum, keeping the left operand on ties.
#[derive(Clone, Copy, Debug, Default)]
pub struct Maximum;

/// Ascending order.
#[derive(Clone, Copy, Debug, Default)]
pub struct Less;

/// Descending order.
#[derive(Clone, Copy, Debug, Default)]
pub struct Greater;

/// Equality.
#[derive(Clone, Copy, Debug, Default)]
pub struct EqualTo;

impl<T: Numeric> BinaryOp<T> for Plus {
    fn combine(&self, lhs: T, rhs: T) -> T {
        lhs.plus(rhs)
    }
}

impl<T: Element + PartialOrd> BinaryOp<T> for Minimum {
    fn combine(&self, lhs: T, rhs: T) -> T {
        if rhs < lhs { rhs } else { lhs }
    }
}

impl<T: Element + PartialOrd> BinaryOp<T> for Maximum {
    fn combine(&self, lhs: T, rhs: T) -> T {
        if lhs < rhs { rhs } else { lhs }
    }
}

impl<T, F> BinaryOp<T> for F
where
    F: Fn(T, T) -> T + Clone + Send + Sync + 'static,
{
    fn combine(&self, lhs: T, rhs: T) -> T {
        self(lhs, rhs)
    }
}

impl<T: PartialOrd> CompareOp<T> for Less {
    fn less(&self, lhs: &T, rhs: &T) -> bool {
        lhs < rhs
    }
}

impl<T: PartialOrd> CompareOp<T> for Greater {
    fn less(&self, lhs: &T, rhs: &T) -> bool {
        lhs > rhs
    }
}

impl<T, F> CompareOp<T> for F
where
    F: Fn(&T, &T) -> bool + Clone + Send + Sync + 'static,
{
    fn less(&self, lhs: &T, rhs: &T) -> bool {
        self(lhs, rhs)
    }
}

impl<T: PartialEq> BinaryPredicate<T> for EqualTo {
    fn test(&self, lhs: &T, rhs: &T) -> bool {
        lhs == rhs
    }
}

impl<T, F> BinaryPredicate<T> for F
where
    F: Fn(&T, &T) -> bool + Clone + Send + Sync + 'static,
{
    fn test(&self, lhs: &T, rhs: &T) -> bool {
        self(lhs, rhs)
    }
}
