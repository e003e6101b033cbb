/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The scoreboard id pool.

use crate::data_structures::DepSetIx;

#[derive(Clone, Copy, Debug)]
struct Slot {
  free: bool,
  /// The (input, output) footprints of the instruction holding the id.
  owner: Option<(DepSetIx, DepSetIx)>,
}

impl Slot {
  fn free() -> Self {
    Self { free: true, owner: None }
  }
}

/// `count` hardware ids, each either free or held by one out-of-order
/// producer.  Free ids are handed out round-robin, starting after the id
/// most recently allocated.
pub struct SbidPool {
  slots: Vec<Slot>,
  cursor: u32,
}

impl SbidPool {
  pub fn new(count: u32) -> Self {
    assert!(count > 0);
    Self { slots: vec![Slot::free(); count as usize], cursor: 0 }
  }

  pub fn count(&self) -> u32 {
    self.slots.len() as u32
  }

  pub fn is_free(&self, id: u32) -> bool {
    self.slots[id as usize].free
  }

  pub fn num_bound(&self) -> u32 {
    self.slots.iter().filter(|s| !s.free).count() as u32
  }

  /// The ids currently held, in id order.
  pub fn bound_ids(&self) -> Vec<u32> {
    (0..self.count()).filter(|&id| !self.is_free(id)).collect()
  }

  /// Bind a free id to `owner`.  When every id is held, returns the
  /// round-robin victim as `Err`; the caller must wait for it, `release` it
  /// and then `bind` it.
  pub fn allocate(&mut self, owner: (DepSetIx, DepSetIx)) -> Result<u32, u32> {
    let n = self.count();
    for k in 0..n {
      let id = (self.cursor + k) % n;
      if self.slots[id as usize].free {
        self.bind(id, owner);
        return Ok(id);
      }
    }
    Err(self.cursor % n)
  }

  /// Bind `id`, which must be free.
  pub fn bind(&mut self, id: u32, owner: (DepSetIx, DepSetIx)) {
    let slot = &mut self.slots[id as usize];
    debug_assert!(slot.free);
    slot.free = false;
    slot.owner = Some(owner);
    self.cursor = (id + 1) % self.count();
  }

  /// Free `id`, returning the footprints that held it.
  pub fn release(&mut self, id: u32) -> Option<(DepSetIx, DepSetIx)> {
    let slot = &mut self.slots[id as usize];
    let owner = if slot.free { None } else { slot.owner };
    *slot = Slot::free();
    owner
  }

  /// Forget every binding.  The cursor keeps going so ids are spread over
  /// blocks.
  pub fn reset(&mut self) {
    for slot in self.slots.iter_mut() {
      *slot = Slot::free();
    }
  }
}

#[test]
fn test_round_robin() {
  let o = (DepSetIx::new(0), DepSetIx::new(1));
  let mut pool = SbidPool::new(3);
  assert_eq!(pool.allocate(o), Ok(0));
  assert_eq!(pool.allocate(o), Ok(1));
  assert_eq!(pool.release(0), Some(o));
  // The search starts after the last allocated id.
  assert_eq!(pool.allocate(o), Ok(2));
  assert_eq!(pool.allocate(o), Ok(0));
  assert_eq!(pool.num_bound(), 3);
  assert_eq!(pool.bound_ids(), vec![0, 1, 2]);
}

#[test]
fn test_exhaustion() {
  let o = (DepSetIx::new(2), DepSetIx::new(3));
  let mut pool = SbidPool::new(2);
  assert_eq!(pool.allocate(o), Ok(0));
  assert_eq!(pool.allocate(o), Ok(1));
  let victim = pool.allocate(o).unwrap_err();
  assert_eq!(victim, 0);
  assert!(pool.release(victim).is_some());
  assert!(pool.release(victim).is_none());
  pool.bind(victim, o);
  assert!(!pool.is_free(victim));
  assert_eq!(pool.allocate(o).unwrap_err(), 1);
  pool.reset();
  assert_eq!(pool.num_bound(), 0);
}
