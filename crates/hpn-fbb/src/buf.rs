//! The framed byte buffer itself.
//!
//! # Invariants
//!
//! For every live [`Fbb`], at every externally observable moment:
//!
//! `0 <= consume_offset <= live_size <= capacity <= max_capacity`
//!
//! A violation of this is treated as memory corruption and aborts the
//! process (see [`Inner::check_invariants`]) rather than attempting to
//! recover: there is no way to repair a buffer whose bookkeeping has
//! already diverged from reality.

use std::cell::RefCell;
use std::rc::Rc;

use crate::err::FbbError;

/// Default initial/minimum backing allocation.
const DEFAULT_CAPACITY: usize = 4 * 1024;

/// Growth increment for naive reallocation.
const GROWTH_INCREMENT: usize = 32 * 1024;

/// Above this single-request growth size, the window hint (if set and if
/// it would actually help) is consulted instead of the naive increment.
const GROWTH_WATERSHED: usize = 256 * 1024;

/// A max-capacity value above this is rejected outright: nothing this
/// crate is used for needs a single buffer bigger than this.
const HARD_CEILING: usize = 1 << 30; // 1 GiB

/// Minimum consumed-prefix size that makes opportunistic packing worth it.
const PACK_THRESHOLD: usize = 4 * 1024;

/// Diagnostic counters for a buffer, exposed for tests and instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of times the backing allocation has been grown or shrunk.
    pub reallocations: usize,
    /// Number of times the live region has been shifted to offset 0.
    pub packs: usize,
}

/// The shared, owned state of a buffer and all of its backing bytes.
///
/// Child views hold an `Rc` clone of this, which is exactly what makes
/// `Rc::strong_count` double as the buffer's "refcount": as long as a
/// child view is alive, more than one handle points at this `Inner`, and
/// mutation through the owning [`Fbb`] must be refused.
struct Inner {
    /// Backing bytes. `data.len()` is always equal to `capacity`.
    data: Vec<u8>,
    /// Live-size watermark, `<= capacity`.
    live_size: usize,
    /// Consume cursor, `<= live_size`.
    consume_offset: usize,
    /// Maximum capacity this buffer may ever grow to.
    max_capacity: usize,
    /// Buffers created via [`Fbb::view_over`] are permanently read-only.
    read_only: bool,
    /// Advisory growth target set by [`Fbb::set_window_hint`].
    window_hint: Option<usize>,
    /// Diagnostic counters.
    stats: Stats,
}

impl Inner {
    /// Abort the process if the invariant has been violated. Called at the
    /// top of every externally observable operation.
    fn check_invariants(&self) {
        let ok = self.consume_offset <= self.live_size
            && self.live_size <= self.data.len()
            && self.data.len() <= self.max_capacity;
        if !ok {
            // Corruption: do not attempt to repair, just stop.
            std::process::abort();
        }
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn available(&self) -> usize {
        self.live_size - self.consume_offset
    }

    /// Shift the live-but-unconsumed region down to offset 0, if doing so
    /// is worthwhile (or `forced`).
    fn maybe_pack(&mut self, forced: bool) {
        if self.read_only || self.consume_offset == 0 {
            return;
        }
        let worthwhile = self.consume_offset >= PACK_THRESHOLD
            && self.consume_offset * 2 >= self.live_size;
        if !forced && !worthwhile {
            return;
        }
        let remaining = self.live_size - self.consume_offset;
        self.data.copy_within(self.consume_offset..self.live_size, 0);
        self.consume_offset = 0;
        self.live_size = remaining;
        self.stats.packs += 1;
    }

    /// Grow (or shrink) the backing allocation so that it is exactly
    /// `new_cap` bytes, zero-filling any newly exposed bytes.
    fn resize_backing(&mut self, new_cap: usize) {
        if new_cap == self.data.len() {
            return;
        }
        self.data.resize(new_cap, 0);
        self.stats.reallocations += 1;
    }

    /// Ensure at least `additional` bytes are available past `live_size`,
    /// applying the growth policy described in the module docs.
    fn grow_for(&mut self, additional: usize) -> std::result::Result<(), FbbError> {
        self.maybe_pack(false);
        let needed = self
            .live_size
            .checked_add(additional)
            .ok_or(FbbError::WouldExceedMax)?;
        if needed > self.max_capacity {
            return Err(FbbError::WouldExceedMax);
        }
        if needed <= self.capacity() {
            return Ok(());
        }
        let mut new_cap = self.capacity().max(DEFAULT_CAPACITY);
        if new_cap >= GROWTH_WATERSHED || needed > GROWTH_WATERSHED {
            // Past the watershed, naive fixed-increment growth would cause
            // a reallocation every few kilobytes on a hot stream. Prefer
            // doubling, but let the window hint (if it is actually bigger
            // than where doubling would land us) jump straight to its
            // target the first time we cross while still below it.
            if let Some(hint) = self.window_hint {
                let clamped_hint = hint.min(self.max_capacity);
                if new_cap < clamped_hint {
                    new_cap = clamped_hint;
                }
            }
            new_cap = new_cap.max(needed).max(self.capacity().saturating_mul(2));
        } else {
            let increments = needed.div_ceil(GROWTH_INCREMENT);
            new_cap = new_cap.max(increments * GROWTH_INCREMENT);
        }
        new_cap = new_cap.min(self.max_capacity);
        if new_cap < needed {
            return Err(FbbError::WouldExceedMax);
        }
        self.resize_backing(new_cap);
        Ok(())
    }
}

/// A view into a buffer: either the owning handle, or a read-only window
/// borrowed from some other buffer's current live region.
enum Kind {
    /// The handle that owns the backing allocation.
    Owned(Rc<RefCell<Inner>>),
    /// A read-only window `[start, start+len)` into `root`'s live region,
    /// fixed at creation time (it does not track the parent's later
    /// growth or consumption).
    View {
        root: Rc<RefCell<Inner>>,
        start: usize,
        len: usize,
    },
}

/// A framed, growable byte buffer with an append region and a consume
/// cursor. See the module docs for the invariants this type upholds.
pub struct Fbb {
    kind: Kind,
}

impl Fbb {
    /// Create an empty, mutable buffer with the default capacity and an
    /// unbounded (up to the hard ceiling) max capacity.
    #[must_use]
    pub fn create() -> Self {
        Self::create_with_max(HARD_CEILING)
    }

    /// Create an empty, mutable buffer with the default capacity and the
    /// given max capacity.
    #[must_use]
    pub fn create_with_max(max_capacity: usize) -> Self {
        let max_capacity = max_capacity.min(HARD_CEILING);
        let inner = Inner {
            data: vec![0; DEFAULT_CAPACITY.min(max_capacity)],
            live_size: 0,
            consume_offset: 0,
            max_capacity,
            read_only: false,
            window_hint: None,
            stats: Stats::default(),
        };
        Self {
            kind: Kind::Owned(Rc::new(RefCell::new(inner))),
        }
    }

    /// Create a read-only buffer over caller-supplied bytes, without
    /// copying them: `bytes` is moved in as the backing allocation.
    #[must_use]
    pub fn view_over(bytes: Vec<u8>) -> Self {
        let live_size = bytes.len();
        let inner = Inner {
            max_capacity: live_size,
            data: bytes,
            live_size,
            consume_offset: 0,
            read_only: true,
            window_hint: None,
            stats: Stats::default(),
        };
        Self {
            kind: Kind::Owned(Rc::new(RefCell::new(inner))),
        }
    }

    /// Create a read-only child view borrowing the window
    /// `[start, start+len)` of `parent`'s *current* live region.
    ///
    /// This extends `parent`'s refcount for as long as the returned
    /// buffer (or any further children attached to it) is alive: while
    /// that hold exists, `parent` is refused for mutation.
    pub fn attach_parent(parent: &Fbb, start: usize, len: usize) -> crate::Result<Self> {
        let (root, base) = match &parent.kind {
            Kind::Owned(inner) => (Rc::clone(inner), 0),
            Kind::View { root, start, .. } => (Rc::clone(root), *start),
        };
        let parent_live = parent.live_size();
        let end = start.checked_add(len).ok_or(FbbError::WindowOutOfBounds {
            start,
            len,
            live_size: parent_live,
        })?;
        if end > parent_live {
            return Err(FbbError::WindowOutOfBounds {
                start,
                len,
                live_size: parent_live,
            });
        }
        Ok(Self {
            kind: Kind::View {
                root,
                start: base + start,
                len,
            },
        })
    }

    /// Borrow this buffer's shared inner state, if it owns one.
    fn inner(&self) -> &Rc<RefCell<Inner>> {
        match &self.kind {
            Kind::Owned(inner) => inner,
            Kind::View { root, .. } => root,
        }
    }

    /// True if this handle is a read-only window (a child view), as
    /// opposed to the handle that owns the backing allocation.
    fn is_view(&self) -> bool {
        matches!(self.kind, Kind::View { .. })
    }

    /// True if mutation must be refused: the buffer is a view, was
    /// constructed read-only, or is currently shared with a live child.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        if self.is_view() {
            return true;
        }
        let inner = self.inner().borrow();
        inner.read_only || Rc::strong_count(self.inner()) > 1
    }

    /// Current live size: the number of bytes that have been appended
    /// and not yet consumed from the tail.
    #[must_use]
    pub fn live_size(&self) -> usize {
        match &self.kind {
            Kind::Owned(inner) => {
                let inner = inner.borrow();
                inner.check_invariants();
                inner.live_size
            }
            Kind::View { len, .. } => *len,
        }
    }

    /// Current consume cursor.
    #[must_use]
    pub fn consume_offset(&self) -> usize {
        match &self.kind {
            Kind::Owned(inner) => {
                let inner = inner.borrow();
                inner.check_invariants();
                inner.consume_offset
            }
            Kind::View { .. } => 0,
        }
    }

    /// Number of unconsumed bytes available to read.
    #[must_use]
    pub fn available(&self) -> usize {
        self.live_size() - self.consume_offset()
    }

    /// Current backing capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        match &self.kind {
            Kind::Owned(inner) => {
                let inner = inner.borrow();
                inner.check_invariants();
                inner.capacity()
            }
            Kind::View { len, .. } => *len,
        }
    }

    /// Diagnostic counters for the owning buffer (reallocations, packs).
    #[must_use]
    pub fn stats(&self) -> Stats {
        let inner = self.inner().borrow();
        inner.stats
    }

    /// A slice over the unconsumed, live bytes.
    #[must_use]
    pub fn as_slice(&self) -> std::cell::Ref<'_, [u8]> {
        match &self.kind {
            Kind::Owned(inner) => {
                let inner = inner.borrow();
                inner.check_invariants();
                std::cell::Ref::map(inner, |i| &i.data[i.consume_offset..i.live_size])
            }
            Kind::View { root, start, len } => {
                let inner = root.borrow();
                inner.check_invariants();
                std::cell::Ref::map(inner, |i| &i.data[*start..*start + *len])
            }
        }
    }

    /// Set (or clear) the advisory growth-target window hint.
    ///
    /// A no-op on read-only or shared buffers.
    pub fn set_window_hint(&self, hint: Option<usize>) {
        if self.is_read_only() {
            return;
        }
        if let Kind::Owned(inner) = &self.kind {
            let mut inner = inner.borrow_mut();
            inner.check_invariants();
            inner.window_hint = hint;
        }
    }

    /// Bound future growth to `n` bytes, possibly shrinking the backing
    /// region immediately.
    ///
    /// # Errors
    /// Returns [`FbbError::ReadOnly`] on a read-only or shared buffer,
    /// [`FbbError::ExceedsHardCeiling`] if `n` exceeds this crate's hard
    /// ceiling, and [`FbbError::CapacityBelowLiveSize`] if `n` is below
    /// the current live size.
    pub fn set_max_capacity(&self, n: usize) -> crate::Result<()> {
        let Kind::Owned(inner) = &self.kind else {
            return Err(FbbError::ReadOnly);
        };
        let mut inner = inner.borrow_mut();
        inner.check_invariants();
        if inner.read_only || Rc::strong_count(self.inner()) > 1 {
            return Err(FbbError::ReadOnly);
        }
        if n > HARD_CEILING {
            return Err(FbbError::ExceedsHardCeiling {
                requested: n,
                ceiling: HARD_CEILING,
            });
        }
        if n < inner.live_size {
            return Err(FbbError::CapacityBelowLiveSize {
                requested: n,
                live_size: inner.live_size,
            });
        }
        inner.maybe_pack(false);
        inner.max_capacity = n;
        if inner.capacity() > n {
            inner.resize_backing(n.max(inner.live_size));
        }
        Ok(())
    }

    /// Clear all contents and, if the backing region has grown past the
    /// default capacity, shrink it back down.
    ///
    /// A no-op on read-only or shared buffers, per spec.
    pub fn reset(&self) {
        let Kind::Owned(inner) = &self.kind else {
            return;
        };
        let mut inner = inner.borrow_mut();
        inner.check_invariants();
        if inner.read_only || Rc::strong_count(self.inner()) > 1 {
            return;
        }
        inner.live_size = 0;
        inner.consume_offset = 0;
        if inner.capacity() > DEFAULT_CAPACITY {
            let target = DEFAULT_CAPACITY.min(inner.max_capacity);
            inner.resize_backing(target);
        }
    }

    /// Reserve `n` freshly appended bytes at the tail and return their
    /// offset within [`Fbb::as_slice`]'s complement — callers write
    /// through [`Fbb::reserved_mut`] immediately after this call.
    ///
    /// # Errors
    /// [`FbbError::ReadOnly`] on a read-only or shared buffer,
    /// [`FbbError::WouldExceedMax`] if growing by `n` would exceed the
    /// max capacity.
    pub fn reserve(&self, n: usize) -> crate::Result<()> {
        let Kind::Owned(inner) = &self.kind else {
            return Err(FbbError::ReadOnly);
        };
        let mut inner = inner.borrow_mut();
        inner.check_invariants();
        if inner.read_only || Rc::strong_count(self.inner()) > 1 {
            return Err(FbbError::ReadOnly);
        }
        inner.grow_for(n)?;
        inner.live_size += n;
        Ok(())
    }

    /// Append `bytes` to the tail, growing as needed. Convenience wrapper
    /// around [`Fbb::reserve`] for the common case of writing a known
    /// slice rather than filling a reserved region in place.
    ///
    /// # Errors
    /// See [`Fbb::reserve`].
    pub fn append(&self, bytes: &[u8]) -> crate::Result<()> {
        let Kind::Owned(inner) = &self.kind else {
            return Err(FbbError::ReadOnly);
        };
        {
            let mut inner = inner.borrow_mut();
            inner.check_invariants();
            if inner.read_only || Rc::strong_count(self.inner()) > 1 {
                return Err(FbbError::ReadOnly);
            }
            inner.grow_for(bytes.len())?;
            let start = inner.live_size;
            let end = start + bytes.len();
            inner.data[start..end].copy_from_slice(bytes);
            inner.live_size = end;
        }
        Ok(())
    }

    /// Advance the consume cursor by `n` bytes. If this empties the
    /// buffer, the cursor and live size both reset to zero.
    ///
    /// # Errors
    /// [`FbbError::ReadOnly`] on a read-only or shared buffer,
    /// [`FbbError::InsufficientData`] if `n` exceeds what's available.
    pub fn consume_head(&self, n: usize) -> crate::Result<()> {
        let Kind::Owned(inner) = &self.kind else {
            return Err(FbbError::ReadOnly);
        };
        let mut inner = inner.borrow_mut();
        inner.check_invariants();
        if inner.read_only || Rc::strong_count(self.inner()) > 1 {
            return Err(FbbError::ReadOnly);
        }
        let available = inner.available();
        if n > available {
            return Err(FbbError::InsufficientData {
                requested: n,
                available,
            });
        }
        inner.consume_offset += n;
        if inner.consume_offset == inner.live_size {
            inner.consume_offset = 0;
            inner.live_size = 0;
        }
        Ok(())
    }

    /// Shrink the live region by `n` bytes from the tail.
    ///
    /// # Errors
    /// [`FbbError::ReadOnly`] on a read-only or shared buffer,
    /// [`FbbError::InsufficientData`] if `n` exceeds what's available.
    pub fn consume_tail(&self, n: usize) -> crate::Result<()> {
        let Kind::Owned(inner) = &self.kind else {
            return Err(FbbError::ReadOnly);
        };
        let mut inner = inner.borrow_mut();
        inner.check_invariants();
        if inner.read_only || Rc::strong_count(self.inner()) > 1 {
            return Err(FbbError::ReadOnly);
        }
        let available = inner.available();
        if n > available {
            return Err(FbbError::InsufficientData {
                requested: n,
                available,
            });
        }
        inner.live_size -= n;
        if inner.consume_offset == inner.live_size {
            inner.consume_offset = 0;
            inner.live_size = 0;
        }
        Ok(())
    }

    /// Write into the `n` bytes most recently reserved via
    /// [`Fbb::reserve`] (i.e. `[live_size - n, live_size)`).
    ///
    /// # Errors
    /// [`FbbError::ReadOnly`] on a read-only or shared buffer.
    pub fn fill_reserved(&self, n: usize, f: impl FnOnce(&mut [u8])) -> crate::Result<()> {
        let Kind::Owned(inner) = &self.kind else {
            return Err(FbbError::ReadOnly);
        };
        let mut inner = inner.borrow_mut();
        inner.check_invariants();
        if inner.read_only || Rc::strong_count(self.inner()) > 1 {
            return Err(FbbError::ReadOnly);
        }
        let live_size = inner.live_size;
        let start = live_size.saturating_sub(n);
        f(&mut inner.data[start..live_size]);
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Zeroise before the allocation goes away. `data` is always this
        // buffer's own allocation, whether or not it started life
        // read-only, so there is nothing unsafe about wiping it here.
        for b in self.data.iter_mut() {
            *b = 0;
        }
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn reserve_then_consume_empties_buffer() {
        let b = Fbb::create();
        b.reserve(10).unwrap();
        assert_eq!(b.live_size(), 10);
        b.consume_head(10).unwrap();
        assert_eq!(b.live_size(), 0);
        assert_eq!(b.consume_offset(), 0);
    }

    #[test]
    fn invariants_hold_across_random_ops() {
        let b = Fbb::create_with_max(1 << 20);
        let mut model_live = 0usize;
        let mut model_off = 0usize;
        let ops: &[(bool, usize)] = &[
            (true, 100),
            (false, 40),
            (true, 200),
            (false, 60),
            (false, 200),
            (true, 50),
        ];
        for &(reserve, n) in ops {
            if reserve {
                if b.live_size() + n <= 1 << 20 {
                    b.reserve(n).unwrap();
                    model_live += n;
                }
            } else if n <= model_live - model_off {
                b.consume_head(n).unwrap();
                model_off += n;
                if model_off == model_live {
                    model_off = 0;
                    model_live = 0;
                }
            }
            assert!(b.consume_offset() <= b.live_size());
            assert!(b.live_size() <= b.capacity());
        }
    }

    #[test]
    fn read_only_view_rejects_mutation() {
        let bytes = b"hello world".to_vec();
        let v = Fbb::view_over(bytes.clone());
        assert!(v.is_read_only());
        assert_eq!(&*v.as_slice(), &bytes[..]);
        assert!(matches!(v.reserve(1), Err(FbbError::ReadOnly)));
        assert!(matches!(v.consume_head(1), Err(FbbError::ReadOnly)));
        assert_eq!(&*v.as_slice(), &bytes[..]);
    }

    #[test]
    fn child_view_borrows_window_and_pins_parent() {
        let parent = Fbb::create();
        parent.append(b"0123456789").unwrap();
        let child = Fbb::attach_parent(&parent, 2, 5).unwrap();
        assert_eq!(&*child.as_slice(), b"23456");
        assert!(parent.is_read_only(), "parent must be shared while child lives");
        assert!(matches!(parent.reserve(1), Err(FbbError::ReadOnly)));
        drop(child);
        assert!(!parent.is_read_only());
        parent.reserve(1).unwrap();
    }

    #[test]
    fn child_view_out_of_bounds_is_rejected() {
        let parent = Fbb::create();
        parent.append(b"abc").unwrap();
        assert!(matches!(
            Fbb::attach_parent(&parent, 1, 10),
            Err(FbbError::WindowOutOfBounds { .. })
        ));
    }

    #[test]
    fn grandchild_view_composes_offsets() {
        let root = Fbb::create();
        root.append(b"0123456789").unwrap();
        let child = Fbb::attach_parent(&root, 2, 8).unwrap(); // "23456789"
        let grandchild = Fbb::attach_parent(&child, 1, 3).unwrap(); // "345"
        assert_eq!(&*grandchild.as_slice(), b"345");
    }

    #[test]
    fn set_max_capacity_rejects_below_live_size() {
        let b = Fbb::create();
        b.append(b"0123456789").unwrap();
        assert!(matches!(
            b.set_max_capacity(5),
            Err(FbbError::CapacityBelowLiveSize { .. })
        ));
    }

    #[test]
    fn set_max_capacity_rejects_above_hard_ceiling() {
        let b = Fbb::create();
        assert!(matches!(
            b.set_max_capacity(HARD_CEILING + 1),
            Err(FbbError::ExceedsHardCeiling { .. })
        ));
    }

    #[test]
    fn reset_clears_and_shrinks() {
        let b = Fbb::create();
        b.reserve(1_000_000).unwrap();
        assert!(b.capacity() > DEFAULT_CAPACITY);
        b.reset();
        assert_eq!(b.live_size(), 0);
        assert!(b.capacity() <= DEFAULT_CAPACITY);
    }

    #[test]
    fn reset_is_noop_on_shared_buffer() {
        let parent = Fbb::create();
        parent.append(b"abc").unwrap();
        let _child = Fbb::attach_parent(&parent, 0, 3).unwrap();
        parent.reset();
        assert_eq!(parent.live_size(), 3, "reset must no-op while shared");
    }

    #[test]
    fn consume_tail_shrinks_live_size() {
        let b = Fbb::create();
        b.append(b"0123456789").unwrap();
        b.consume_tail(4).unwrap();
        assert_eq!(&*b.as_slice(), b"012345");
        assert!(matches!(
            b.consume_tail(100),
            Err(FbbError::InsufficientData { .. })
        ));
    }

    #[test]
    fn window_hint_skips_intermediate_reallocations() {
        let b = Fbb::create_with_max(4 << 20);
        b.set_window_hint(Some(512 * 1024));
        let chunk = vec![0xABu8; 4096];
        for _ in 0..(1_000_000 / 4096) {
            b.append(&chunk).unwrap();
        }
        assert!(
            b.stats().reallocations < 20,
            "expected <20 reallocations, got {}",
            b.stats().reallocations
        );
    }

    #[test]
    fn without_window_hint_still_bounded_by_increment_growth() {
        let b = Fbb::create_with_max(4 << 20);
        let chunk = vec![0xCDu8; 4096];
        for _ in 0..(1_000_000 / 4096) {
            b.append(&chunk).unwrap();
        }
        assert_eq!(b.live_size(), 1_000_000);
    }
}
