//! Allocation accounting by memory category.
//!
//! Host-side arrays built while talking to the driver (enumeration results,
//! per-image handle arrays) are owned by [`TaggedVec`], which reports its
//! capacity to a [`MemoryTracker`] under a [`MemoryTag`]. The tracker is an
//! explicit object owned by whoever creates the renderer context; there is no
//! process-wide registry.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Category a host allocation is accounted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryTag {
    Unknown,
    /// Driver enumeration results (extensions, formats, present modes, queue families).
    Enumeration,
    /// Swapchain image, view and semaphore arrays.
    Swapchain,
    /// Descriptor pool bookkeeping.
    Descriptors,
    /// Staging copies for uploads.
    Staging,
}

impl MemoryTag {
    /// Number of tags.
    pub const COUNT: usize = 5;

    /// All tags in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Unknown,
        Self::Enumeration,
        Self::Swapchain,
        Self::Descriptors,
        Self::Staging,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::Enumeration => 1,
            Self::Swapchain => 2,
            Self::Descriptors => 3,
            Self::Staging => 4,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Enumeration => "enumeration",
            Self::Swapchain => "swapchain",
            Self::Descriptors => "descriptors",
            Self::Staging => "staging",
        }
    }
}

impl fmt::Display for MemoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of the counters for one tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagStats {
    /// Bytes currently reserved.
    pub current_bytes: usize,
    /// Highest value `current_bytes` has reached.
    pub peak_bytes: usize,
    /// Number of reservations made.
    pub allocations: usize,
    /// Number of releases made.
    pub frees: usize,
}

#[derive(Debug, Default)]
struct TagCounters {
    current: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicUsize,
    frees: AtomicUsize,
}

/// Per-tag byte counters.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    counters: [TagCounters; MemoryTag::COUNT],
}

impl MemoryTracker {
    /// Create a tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared tracker.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record `bytes` reserved under `tag`.
    pub fn record_alloc(&self, tag: MemoryTag, bytes: usize) {
        let counters = &self.counters[tag.index()];
        let current = counters.current.fetch_add(bytes, Ordering::Relaxed) + bytes;
        counters.peak.fetch_max(current, Ordering::Relaxed);
        counters.allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `bytes` released under `tag`.
    pub fn record_free(&self, tag: MemoryTag, bytes: usize) {
        let counters = &self.counters[tag.index()];
        let previous = counters.current.fetch_sub(bytes, Ordering::Relaxed);
        debug_assert!(previous >= bytes, "freed more {tag} bytes than were reserved");
        counters.frees.fetch_add(1, Ordering::Relaxed);
    }

    /// Counters for a single tag.
    pub fn stats(&self, tag: MemoryTag) -> TagStats {
        let counters = &self.counters[tag.index()];
        TagStats {
            current_bytes: counters.current.load(Ordering::Relaxed),
            peak_bytes: counters.peak.load(Ordering::Relaxed),
            allocations: counters.allocations.load(Ordering::Relaxed),
            frees: counters.frees.load(Ordering::Relaxed),
        }
    }

    /// Bytes currently reserved across all tags.
    pub fn total_bytes(&self) -> usize {
        MemoryTag::ALL
            .iter()
            .map(|&tag| self.stats(tag).current_bytes)
            .sum()
    }

    /// Log the current counters at debug level.
    pub fn log_summary(&self) {
        for tag in MemoryTag::ALL {
            let stats = self.stats(tag);
            if stats.allocations > 0 {
                tracing::debug!(
                    "memory[{tag}]: {} bytes live, {} peak, {} allocs, {} frees",
                    stats.current_bytes,
                    stats.peak_bytes,
                    stats.allocations,
                    stats.frees,
                );
            }
        }
    }
}

/// Owned growable sequence carrying its own category tag.
///
/// Capacity changes are reported to the attached tracker; an untracked
/// sequence behaves like a plain `Vec`.
pub struct TaggedVec<T> {
    items: Vec<T>,
    tag: MemoryTag,
    tracker: Option<Arc<MemoryTracker>>,
    accounted: usize,
}

impl<T> TaggedVec<T> {
    /// Create an empty, untracked sequence.
    pub const fn new(tag: MemoryTag) -> Self {
        Self {
            items: Vec::new(),
            tag,
            tracker: None,
            accounted: 0,
        }
    }

    /// Create an empty sequence reporting to `tracker`.
    pub fn tracked(tag: MemoryTag, tracker: &Arc<MemoryTracker>) -> Self {
        Self {
            items: Vec::new(),
            tag,
            tracker: Some(Arc::clone(tracker)),
            accounted: 0,
        }
    }

    /// Create a sequence with room for `capacity` elements, reporting to `tracker`.
    pub fn with_capacity(tag: MemoryTag, tracker: &Arc<MemoryTracker>, capacity: usize) -> Self {
        Self::from_vec(tag, tracker, Vec::with_capacity(capacity))
    }

    /// Take ownership of an existing `Vec` and start accounting for it.
    pub fn from_vec(tag: MemoryTag, tracker: &Arc<MemoryTracker>, items: Vec<T>) -> Self {
        let mut tagged = Self {
            items,
            tag,
            tracker: Some(Arc::clone(tracker)),
            accounted: 0,
        };
        tagged.sync_accounting();
        tagged
    }

    /// Category this sequence is accounted under.
    pub const fn tag(&self) -> MemoryTag {
        self.tag
    }

    /// Bytes currently reported to the tracker.
    pub const fn accounted_bytes(&self) -> usize {
        self.accounted
    }

    /// Number of elements the sequence can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Append an element.
    pub fn push(&mut self, value: T) {
        self.items.push(value);
        self.sync_accounting();
    }

    /// Remove and return the last element.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Resize to `len`, filling new slots with clones of `value`.
    pub fn resize(&mut self, len: usize, value: T)
    where
        T: Clone,
    {
        self.items.resize(len, value);
        self.sync_accounting();
    }

    /// Shorten to `len` elements.
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    /// Remove all elements, keeping the allocation.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Drop excess capacity.
    pub fn shrink_to_fit(&mut self) {
        self.items.shrink_to_fit();
        self.sync_accounting();
    }

    /// Remove all elements, yielding them in order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.drain(..)
    }

    /// Release the accounting and hand back the inner `Vec`.
    pub fn into_vec(mut self) -> Vec<T> {
        self.release_accounting();
        std::mem::take(&mut self.items)
    }

    fn sync_accounting(&mut self) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        let bytes = self.items.capacity() * std::mem::size_of::<T>();
        if bytes > self.accounted {
            tracker.record_alloc(self.tag, bytes - self.accounted);
        } else if bytes < self.accounted {
            tracker.record_free(self.tag, self.accounted - bytes);
        }
        self.accounted = bytes;
    }

    fn release_accounting(&mut self) {
        if let Some(tracker) = &self.tracker {
            if self.accounted > 0 {
                tracker.record_free(self.tag, self.accounted);
            }
        }
        self.accounted = 0;
    }
}

impl<T: Clone> TaggedVec<T> {
    /// Append clones of every element in `values`.
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.items.extend_from_slice(values);
        self.sync_accounting();
    }
}

impl<T> Extend<T> for TaggedVec<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
        self.sync_accounting();
    }
}

impl<T> Deref for TaggedVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for TaggedVec<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<'a, T> IntoIterator for &'a TaggedVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for TaggedVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedVec")
            .field("tag", &self.tag)
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for TaggedVec<T> {
    fn drop(&mut self) {
        self.release_accounting();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_is_accounted_under_tag() {
        let tracker = MemoryTracker::shared();
        let mut v = TaggedVec::<u64>::tracked(MemoryTag::Enumeration, &tracker);
        for i in 0..10 {
            v.push(i);
        }

        let stats = tracker.stats(MemoryTag::Enumeration);
        assert_eq!(stats.current_bytes, v.capacity() * 8);
        assert_eq!(v.accounted_bytes(), stats.current_bytes);
        assert_eq!(tracker.stats(MemoryTag::Swapchain).current_bytes, 0);
        assert_eq!(v.len(), 10);
        assert_eq!(v[3], 3);
    }

    #[test]
    fn drop_releases_everything() {
        let tracker = MemoryTracker::shared();
        {
            let v = TaggedVec::from_vec(MemoryTag::Swapchain, &tracker, vec![1u32; 64]);
            assert!(tracker.stats(MemoryTag::Swapchain).current_bytes >= 256);
            drop(v);
        }

        let stats = tracker.stats(MemoryTag::Swapchain);
        assert_eq!(stats.current_bytes, 0);
        assert!(stats.peak_bytes >= 256);
        assert_eq!(tracker.total_bytes(), 0);
    }

    #[test]
    fn into_vec_stops_accounting() {
        let tracker = MemoryTracker::shared();
        let v = TaggedVec::from_vec(MemoryTag::Staging, &tracker, vec![0u8; 32]);
        let inner = v.into_vec();

        assert_eq!(inner.len(), 32);
        assert_eq!(tracker.stats(MemoryTag::Staging).current_bytes, 0);
    }

    #[test]
    fn shrink_reports_free() {
        let tracker = MemoryTracker::shared();
        let mut v = TaggedVec::with_capacity(MemoryTag::Descriptors, &tracker, 100);
        v.push(7u32);
        let before = tracker.stats(MemoryTag::Descriptors).current_bytes;
        v.shrink_to_fit();
        let after = tracker.stats(MemoryTag::Descriptors).current_bytes;

        assert!(after < before);
        assert_eq!(after, v.capacity() * 4);
    }

    #[test]
    fn untracked_vec_behaves_like_vec() {
        let mut v = TaggedVec::new(MemoryTag::Unknown);
        v.extend([1, 2, 3]);
        v.truncate(2);
        assert_eq!(&*v, &[1, 2]);
        assert_eq!(v.accounted_bytes(), 0);
    }
}
