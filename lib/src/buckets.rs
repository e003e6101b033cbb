/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The bucket index: for every register-sized bucket of the address space,
//! the live DepSets that touch it, oldest first.
//!
//! Removal leaves a tombstone so that a caller walking a bucket by slot
//! number can evict entries (from this or any other bucket) as it goes.
//! Tombstones are swept when the bucket next grows.

use crate::data_structures::DepSetIx;

pub struct Buckets {
  buckets: Vec<Vec<Option<DepSetIx>>>,
}

impl Buckets {
  pub fn new(total: u32) -> Self {
    Self { buckets: vec![Vec::new(); total as usize] }
  }

  pub fn clear(&mut self) {
    for b in self.buckets.iter_mut() {
      b.clear();
    }
  }

  /// Number of slots in `bucket`, tombstones included.
  pub fn num_slots(&self, bucket: u32) -> usize {
    self.buckets[bucket as usize].len()
  }

  pub fn get(&self, bucket: u32, slot: usize) -> Option<DepSetIx> {
    self.buckets[bucket as usize][slot]
  }

  pub fn add(&mut self, bucket: u32, ds: DepSetIx) {
    let b = &mut self.buckets[bucket as usize];
    if b.contains(&Some(ds)) {
      return;
    }
    b.retain(|e| e.is_some());
    b.push(Some(ds));
  }

  pub fn clear_slot(&mut self, bucket: u32, slot: usize) {
    self.buckets[bucket as usize][slot] = None;
  }

  /// Remove `ds` from the given buckets.
  pub fn remove(&mut self, buckets: &[u32], ds: DepSetIx) {
    for &bucket in buckets {
      for e in self.buckets[bucket as usize].iter_mut() {
        if *e == Some(ds) {
          *e = None;
        }
      }
    }
  }
}

#[test]
fn test_buckets() {
  let d0 = DepSetIx::new(0);
  let d1 = DepSetIx::new(1);
  let d2 = DepSetIx::new(2);
  let mut bs = Buckets::new(4);
  bs.add(1, d0);
  bs.add(1, d1);
  bs.add(1, d1);
  bs.add(3, d1);
  assert_eq!(bs.num_slots(1), 2);

  // Removing during a walk leaves the slot numbering intact.
  bs.remove(&[1, 3], d1);
  assert_eq!(bs.num_slots(1), 2);
  assert_eq!(bs.get(1, 0), Some(d0));
  assert_eq!(bs.get(1, 1), None);
  assert_eq!(bs.get(3, 0), None);

  // Adding sweeps the tombstones.
  bs.add(1, d2);
  assert_eq!(bs.num_slots(1), 2);
  assert_eq!(bs.get(1, 1), Some(d2));
  bs.clear_slot(1, 0);
  assert_eq!(bs.get(1, 0), None);
  assert_eq!(bs.get(1, 1), Some(d2));
  bs.clear();
  assert_eq!(bs.num_slots(1), 0);
  assert_eq!(bs.num_slots(3), 0);
}
