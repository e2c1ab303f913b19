//! Sorted-merge and duplicate-coalescing primitives
//!
//! Both operate on sequences already ascending under the supplied comparer.
//! `merge_duplicates` checks that; `merge_sorted` trusts it.

use crate::error::{ExtractError, Result};
use std::cmp::Ordering;
use std::iter::Peekable;

/// Lazy two-way merge of ascending sequences. Ties yield from `a` first.
pub struct MergeSorted<A, B, F>
where
    A: Iterator,
    B: Iterator<Item = A::Item>,
{
    a: Peekable<A>,
    b: Peekable<B>,
    compare: F,
}

impl<A, B, F> Iterator for MergeSorted<A, B, F>
where
    A: Iterator,
    B: Iterator<Item = A::Item>,
    F: FnMut(&A::Item, &A::Item) -> Ordering,
{
    type Item = A::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let take_a = match (self.a.peek(), self.b.peek()) {
            (Some(x), Some(y)) => (self.compare)(x, y) != Ordering::Greater,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if take_a {
            self.a.next()
        } else {
            self.b.next()
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (a_lo, a_hi) = self.a.size_hint();
        let (b_lo, b_hi) = self.b.size_hint();
        let hi = match (a_hi, b_hi) {
            (Some(x), Some(y)) => x.checked_add(y),
            _ => None,
        };
        (a_lo.saturating_add(b_lo), hi)
    }
}

/// Merge two ascending sequences into one ascending sequence in linear time
pub fn merge_sorted<A, B, F>(a: A, b: B, compare: F) -> MergeSorted<A::IntoIter, B::IntoIter, F>
where
    A: IntoIterator,
    B: IntoIterator<Item = A::Item>,
    F: FnMut(&A::Item, &A::Item) -> Ordering,
{
    MergeSorted {
        a: a.into_iter().peekable(),
        b: b.into_iter().peekable(),
        compare,
    }
}

/// Coalesce each run of adjacent equal items with `merge(previous, current)`.
///
/// Fails with [`ExtractError::SortOrder`] as soon as an item compares less
/// than its predecessor.
pub fn merge_duplicates<I, M, F>(items: I, mut merge: M, mut compare: F) -> Result<Vec<I::Item>>
where
    I: IntoIterator,
    M: FnMut(&mut I::Item, I::Item),
    F: FnMut(&I::Item, &I::Item) -> Ordering,
{
    let mut out: Vec<I::Item> = Vec::new();
    for (position, item) in items.into_iter().enumerate() {
        match out.last_mut() {
            Some(previous) => match compare(previous, &item) {
                Ordering::Less => out.push(item),
                Ordering::Equal => merge(previous, item),
                Ordering::Greater => {
                    return Err(ExtractError::SortOrder(format!(
                        "item at position {} is smaller than its predecessor",
                        position
                    )));
                }
            },
            None => out.push(item),
        }
    }
    Ok(out)
}
