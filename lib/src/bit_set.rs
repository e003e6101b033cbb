/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! A fixed-width bit set, one bit per byte of the flattened register address
//! space.

use std::cmp;
use std::fmt;

const BLOCK_SIZE: usize = 64;

#[derive(Clone, PartialEq, Eq)]
pub struct BitSet {
  bits: Vec<u64>,
  len: usize,
}

impl BitSet {
  pub fn new(len: usize) -> Self {
    Self { bits: vec![0; (len + BLOCK_SIZE - 1) / BLOCK_SIZE], len }
  }

  /// Number of addressable bits.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn card(&self) -> usize {
    self.bits.iter().map(|b| b.count_ones() as usize).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.bits.iter().all(|&b| b == 0)
  }

  pub fn clear(&mut self) {
    for b in self.bits.iter_mut() {
      *b = 0;
    }
  }

  pub fn test(&self, ix: usize) -> bool {
    if ix >= self.len {
      return false;
    }
    (1 & (self.bits[get_bits_index(ix)] >> get_offset(ix))) != 0
  }

  /// Set `count` bits starting at `start`.  Bits past the end are ignored.
  pub fn set_range(&mut self, start: usize, count: usize) {
    let end = cmp::min(start + count, self.len);
    let mut ix = start;
    while ix < end {
      let offset = get_offset(ix);
      let n = cmp::min(BLOCK_SIZE - offset, end - ix);
      self.bits[get_bits_index(ix)] |= mask(offset, n);
      ix += n;
    }
  }

  /// Is any bit in `[start, start + count)` set?
  pub fn test_any(&self, start: usize, count: usize) -> bool {
    let end = cmp::min(start + count, self.len);
    let mut ix = start;
    while ix < end {
      let offset = get_offset(ix);
      let n = cmp::min(BLOCK_SIZE - offset, end - ix);
      if self.bits[get_bits_index(ix)] & mask(offset, n) != 0 {
        return true;
      }
      ix += n;
    }
    false
  }

  /// Are all the bits in `[start, start + count)` set?
  pub fn test_all(&self, start: usize, count: usize) -> bool {
    if count == 0 || start + count > self.len {
      return false;
    }
    let end = start + count;
    let mut ix = start;
    while ix < end {
      let offset = get_offset(ix);
      let n = cmp::min(BLOCK_SIZE - offset, end - ix);
      let m = mask(offset, n);
      if self.bits[get_bits_index(ix)] & m != m {
        return false;
      }
      ix += n;
    }
    true
  }

  pub fn intersects(&self, other: &Self) -> bool {
    let smallest_set_size = cmp::min(self.bits.len(), other.bits.len());
    for i in 0..smallest_set_size {
      if self.bits[i] & other.bits[i] != 0 {
        return true;
      }
    }
    false
  }

  /// Do the two sets intersect within `[start, start + count)`?
  pub fn intersects_in(&self, other: &Self, start: usize, count: usize) -> bool {
    let end = cmp::min(start + count, cmp::min(self.len, other.len));
    let mut ix = start;
    while ix < end {
      let offset = get_offset(ix);
      let n = cmp::min(BLOCK_SIZE - offset, end - ix);
      let bix = get_bits_index(ix);
      if self.bits[bix] & other.bits[bix] & mask(offset, n) != 0 {
        return true;
      }
      ix += n;
    }
    false
  }

  pub fn union(&mut self, other: &Self) {
    let smallest_set_size = cmp::min(self.bits.len(), other.bits.len());
    for i in 0..smallest_set_size {
      self.bits[i] |= other.bits[i];
    }
  }

  /// Remove every bit of `other` from `self`.  Returns whether anything
  /// changed.
  pub fn remove(&mut self, other: &Self) -> bool {
    let smallest_set_size = cmp::min(self.bits.len(), other.bits.len());
    let mut changed = false;
    for i in 0..smallest_set_size {
      let old = self.bits[i];
      self.bits[i] &= !other.bits[i];
      changed |= old != self.bits[i];
    }
    changed
  }

  /// Iterate over maximal runs of set bits, as `(start, len)` pairs.
  pub fn runs(&self) -> BitSetRuns {
    BitSetRuns { set: self, next: 0 }
  }
}

fn get_offset(ix: usize) -> usize {
  ix % BLOCK_SIZE
}

fn get_bits_index(ix: usize) -> usize {
  ix / BLOCK_SIZE
}

fn mask(offset: usize, n: usize) -> u64 {
  if n >= BLOCK_SIZE {
    !0
  } else {
    ((1u64 << n) - 1) << offset
  }
}

impl fmt::Debug for BitSet {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{{")?;
    let mut first = true;
    for (start, len) in self.runs() {
      if !first {
        write!(fmt, ", ")?;
      }
      first = false;
      write!(fmt, "{}..{}", start, start + len)?;
    }
    write!(fmt, "}}")
  }
}

pub struct BitSetRuns<'set> {
  set: &'set BitSet,
  next: usize,
}

impl<'set> Iterator for BitSetRuns<'set> {
  type Item = (usize, usize);

  fn next(&mut self) -> Option<Self::Item> {
    let len = self.set.len;
    let mut ix = self.next;
    // Skip over empty words quickly.
    while ix < len {
      if get_offset(ix) == 0 && self.set.bits[get_bits_index(ix)] == 0 {
        ix += BLOCK_SIZE;
        continue;
      }
      if self.set.test(ix) {
        break;
      }
      ix += 1;
    }
    if ix >= len {
      self.next = len;
      return None;
    }
    let start = ix;
    while ix < len && self.set.test(ix) {
      ix += 1;
    }
    self.next = ix;
    Some((start, ix - start))
  }
}

#[test]
fn test_set_and_test_ranges() {
  let mut s = BitSet::new(200);
  assert!(s.is_empty());
  s.set_range(60, 10);
  assert_eq!(s.card(), 10);
  assert!(s.test(60));
  assert!(s.test(69));
  assert!(!s.test(70));
  assert!(s.test_any(0, 61));
  assert!(!s.test_any(0, 60));
  assert!(s.test_all(62, 8));
  assert!(!s.test_all(62, 9));

  // Ranges running off the end are clipped.
  s.set_range(190, 50);
  assert_eq!(s.card(), 20);
  assert!(s.test(199));
  assert!(!s.test(200));
}

#[test]
fn test_full_words() {
  let mut s = BitSet::new(256);
  s.set_range(64, 128);
  assert!(s.test_all(64, 128));
  assert!(!s.test(63));
  assert!(!s.test(192));
  assert_eq!(s.runs().collect::<Vec<_>>(), vec![(64, 128)]);
}

#[test]
fn test_intersections() {
  let mut a = BitSet::new(128);
  let mut b = BitSet::new(128);
  a.set_range(0, 4);
  b.set_range(4, 4);
  assert!(!a.intersects(&b));
  b.set_range(3, 1);
  assert!(a.intersects(&b));
  assert!(a.intersects_in(&b, 0, 4));
  assert!(!a.intersects_in(&b, 0, 3));

  let mut c = a.clone();
  c.union(&b);
  assert_eq!(c.card(), 8);
  assert!(c.remove(&a));
  assert_eq!(c.runs().collect::<Vec<_>>(), vec![(4, 4)]);
  assert!(!c.remove(&a));
}

#[test]
fn test_runs() {
  let mut s = BitSet::new(300);
  s.set_range(1, 2);
  s.set_range(100, 1);
  s.set_range(250, 50);
  assert_eq!(
    s.runs().collect::<Vec<_>>(),
    vec![(1, 2), (100, 1), (250, 50)]
  );
  assert_eq!(format!("{:?}", s), "{1..3, 100..101, 250..300}");
}
