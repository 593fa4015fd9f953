//! A [`HashMap`] from keys to use counts.
//!
//! Keys aren't removed when their count reaches zero. They linger until [`RcHashMap::drain_weak`] collects them,
//! so that a name that is unlistened and listened again within one update keeps its entry.

use core::{borrow::Borrow, hash::Hash};
use hashbrown::{
	hash_map::{DrainFilter, Entry},
	HashMap,
};
use num_traits::{CheckedAdd, CheckedSub, One, Zero};

#[derive(Debug)]
pub(crate) struct RcHashMap<K: Hash + Eq, C: CheckedAdd + CheckedSub + One + Zero>(HashMap<K, C>);
impl<K: Hash + Eq, C: CheckedAdd + CheckedSub + One + Zero> RcHashMap<K, C> {
	#[must_use]
	pub fn new() -> Self {
		Self(HashMap::new())
	}

	/// Counts one more use of `k`. Returns `true` if `k` wasn't present before.
	pub fn increment(&mut self, k: K) -> Result<bool, CountSaturatedError> {
		match self.0.entry(k) {
			Entry::Occupied(occupied) => {
				let c = occupied.into_mut();
				*c = c.checked_add(&C::one()).ok_or(CountSaturatedError)?;
				Ok(false)
			}
			Entry::Vacant(vacant) => {
				vacant.insert(C::one());
				Ok(true)
			}
		}
	}

	/// Counts one use fewer of `k`. Fails if the count is already zero, returns `false` if `k` is unknown.
	pub fn weak_decrement<Q: ?Sized>(&mut self, k: &Q) -> Result<bool, CountSaturatedError>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		match self.0.get_mut(k) {
			Some(c) => {
				*c = c.checked_sub(&C::one()).ok_or(CountSaturatedError)?;
				Ok(true)
			}
			None => Ok(false),
		}
	}

	/// Removes and yields every key with a count of zero.
	pub fn drain_weak(&mut self) -> DrainWeak<'_, K, C> {
		DrainWeak(self.0.drain_filter(DrainWeak::<K, C>::weak_filter as fn(&K, &mut C) -> bool))
	}

	/// All keys, including those with a count of zero that weren't drained yet.
	pub fn keys(&self) -> impl Iterator<Item = &K> {
		self.0.keys()
	}
}

pub(crate) struct DrainWeak<'a, K, C>(DrainFilter<'a, K, C, fn(&K, &mut C) -> bool>);
impl<'a, K, C: Zero> DrainWeak<'a, K, C> {
	fn weak_filter(_: &K, c: &mut C) -> bool {
		c.is_zero()
	}
}
impl<'a, K, C> Iterator for DrainWeak<'a, K, C> {
	type Item = K;

	fn next(&mut self) -> Option<Self::Item> {
		self.0.next().map(|(k, _)| k)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.0.size_hint()
	}
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CountSaturatedError;
