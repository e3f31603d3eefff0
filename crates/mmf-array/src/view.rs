//! Read-only list views.
//!
//! Downstream analytics consume data through [`ReadOnlyList`] without caring
//! whether it comes from a mapped file, a computed sequence or a widened
//! view of a narrower store.

use std::borrow::Cow;
use std::marker::PhantomData;


use crate::array::MappedArray;
use crate::convert;
use crate::record::Record;
use crate::{ArrayError, Result};

/// Read-only access to an indexed sequence.
pub trait ReadOnlyList<T: Clone> {
    /// Number of items.
    fn len(&self) -> usize;

    /// Check if the list is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `index`, bounds-checked.
    fn get(&self, index: usize) -> Result<T>;

    /// Item at `index` without checking the logical length.
    fn read_unchecked(&self, index: usize) -> T;

    /// `len` items starting at `start`.
    fn range(&self, start: usize, len: usize) -> Result<Cow<'_, [T]>>;
}

fn check_range(start: usize, len: usize, count: usize) -> Result<()> {
    match start.checked_add(len) {
        Some(end) if end <= count => Ok(()),
        _ => Err(ArrayError::OutOfRange(format!(
            "range {start}+{len} out of bounds for length {count}"
        ))),
    }
}

/// View over a [`MappedArray`] without write access.
#[derive(Debug)]
pub struct ArrayView<'a, T: Record> {
    array: &'a MappedArray<T>,
}

impl<'a, T: Record> ArrayView<'a, T> {
    /// Wrap an array.
    pub const fn new(array: &'a MappedArray<T>) -> Self {
        Self { array }
    }
}

impl<T: Record> ReadOnlyList<T> for ArrayView<'_, T> {
    fn len(&self) -> usize {
        self.array.len()
    }

    fn get(&self, index: usize) -> Result<T> {
        self.array.get(index)
    }

    fn read_unchecked(&self, index: usize) -> T {
        self.array.read_unchecked(index)
    }

    fn range(&self, start: usize, len: usize) -> Result<Cow<'_, [T]>> {
        self.array.as_span(start, len)
    }
}

impl<T: Record> ReadOnlyList<T> for MappedArray<T> {
    fn len(&self) -> usize {
        Self::len(self)
    }

    fn get(&self, index: usize) -> Result<T> {
        Self::get(self, index)
    }

    fn read_unchecked(&self, index: usize) -> T {
        Self::read_unchecked(self, index)
    }

    fn range(&self, start: usize, len: usize) -> Result<Cow<'_, [T]>> {
        self.as_span(start, len)
    }
}

/// Lazily computed list backed by two closures.
///
/// Nothing is snapshotted: if the closures read a source that changes,
/// the view changes with it.
pub struct ComputedView<T, C, F>
where
    C: Fn() -> usize,
    F: Fn(usize) -> T,
{
    count: C,
    value_at: F,
}

impl<T, C, F> ComputedView<T, C, F>
where
    C: Fn() -> usize,
    F: Fn(usize) -> T,
{
    /// Build a view from a length function and an element function.
    pub const fn new(count: C, value_at: F) -> Self {
        Self { count, value_at }
    }
}

impl<T, C, F> ReadOnlyList<T> for ComputedView<T, C, F>
where
    T: Clone,
    C: Fn() -> usize,
    F: Fn(usize) -> T,
{
    fn len(&self) -> usize {
        (self.count)()
    }

    fn get(&self, index: usize) -> Result<T> {
        let len = self.len();
        if index >= len {
            return Err(ArrayError::OutOfRange(format!(
                "index {index} out of bounds for length {len}"
            )));
        }
        Ok((self.value_at)(index))
    }

    fn read_unchecked(&self, index: usize) -> T {
        (self.value_at)(index)
    }

    fn range(&self, start: usize, len: usize) -> Result<Cow<'_, [T]>> {
        check_range(start, len, self.len())?;
        Ok(Cow::Owned((start..start + len).map(&self.value_at).collect()))
    }
}

/// Widening view: presents a list of narrow records as records of `W`.
///
/// Single reads convert one value; range reads widen the whole source
/// range into a temporary `i64` buffer and narrow it into `W` in bulk.
pub struct PromotingView<S, V, W>
where
    S: Record,
    V: ReadOnlyList<S>,
    W: Record,
{
    source: V,
    _marker: PhantomData<(S, W)>,
}

impl<S, V, W> PromotingView<S, V, W>
where
    S: Record,
    V: ReadOnlyList<S>,
    W: Record,
{
    /// Wrap `source`. Fails with `Unsupported` unless every value of `S`
    /// fits `W`.
    pub fn new(source: V) -> Result<Self> {
        let widens = match (S::KIND.bounds(), W::KIND.bounds()) {
            (Some((s_min, s_max)), Some((w_min, w_max))) => w_min <= s_min && s_max <= w_max,
            _ => false,
        };
        if !widens {
            return Err(ArrayError::Unsupported(format!(
                "cannot promote {} to {}",
                S::DATA_TYPE,
                W::DATA_TYPE
            )));
        }
        Ok(Self {
            source,
            _marker: PhantomData,
        })
    }

    /// The wrapped source view.
    pub const fn source(&self) -> &V {
        &self.source
    }

    fn promote(value: S) -> Result<W> {
        convert::from_i64(convert::to_i64(value)?)
    }
}

impl<S, V, W> ReadOnlyList<W> for PromotingView<S, V, W>
where
    S: Record,
    V: ReadOnlyList<S>,
    W: Record,
{
    fn len(&self) -> usize {
        self.source.len()
    }

    fn get(&self, index: usize) -> Result<W> {
        Self::promote(self.source.get(index)?)
    }

    fn read_unchecked(&self, index: usize) -> W {
        // `new` checked that every `S` fits `W`.
        Self::promote(self.source.read_unchecked(index)).unwrap_or_else(|_| W::new_zeroed())
    }

    fn range(&self, start: usize, len: usize) -> Result<Cow<'_, [W]>> {
        let narrow = self.source.range(start, len)?;
        let mut wide = vec![0i64; narrow.len()];
        convert::copy_range_to_i64(&*narrow, &mut wide)?;
        let mut out = vec![W::new_zeroed(); wide.len()];
        convert::copy_range_from_i64(&wide, &mut out)?;
        Ok(Cow::Owned(out))
    }
}
