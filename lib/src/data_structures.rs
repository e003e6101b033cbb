/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Data structures shared by the whole crate: typed indices, index-keyed
//! vectors and index ranges.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::slice::{Iter, IterMut};

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

//=============================================================================
// Maps and sets

pub type Map<K, V> = FxHashMap<K, V>;
pub type Set<T> = FxHashSet<T>;

//=============================================================================
// Iteration facilities for the typed indices

pub trait PlusOne {
  fn plus_one(&self) -> Self;
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MyRange<T> {
  first: T,
  len: usize,
}

impl<T: Copy + PartialOrd + PlusOne> MyRange<T> {
  pub fn new(first: T, len: usize) -> MyRange<T> {
    MyRange { first, len }
  }
  pub fn first(&self) -> T {
    assert!(self.len > 0);
    self.first
  }
  pub fn last(&self) -> T {
    assert!(self.len > 0);
    let mut t = self.first;
    for _ in 1..self.len {
      t = t.plus_one();
    }
    t
  }
  pub fn start(&self) -> T {
    self.first
  }
  pub fn len(&self) -> usize {
    self.len
  }
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }
  pub fn contains(&self, t: T) -> bool {
    if self.len == 0 || t < self.first {
      return false;
    }
    t <= self.last()
  }
}

impl<T: Copy + PartialOrd + PlusOne> IntoIterator for MyRange<T> {
  type Item = T;
  type IntoIter = MyIterator<T>;
  fn into_iter(self) -> Self::IntoIter {
    MyIterator { range: self, next: self.first, remaining: self.len }
  }
}

impl<T: fmt::Debug> fmt::Debug for MyRange<T> {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "[{:?}, +{})", self.first, self.len)
  }
}

pub struct MyIterator<T> {
  range: MyRange<T>,
  next: T,
  remaining: usize,
}

impl<T: Copy + PlusOne> Iterator for MyIterator<T> {
  type Item = T;
  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      None
    } else {
      let res = self.next;
      self.next = self.next.plus_one();
      self.remaining -= 1;
      Some(res)
    }
  }
}

impl<T> MyIterator<T> {
  pub fn range(&self) -> &MyRange<T> {
    &self.range
  }
}

//=============================================================================
// Vectors where both the index and element types can be specified (and at
// most 2^32-1 elems can be stored).

pub struct TypedIxVec<TyIx, Ty> {
  vek: Vec<Ty>,
  ty_ix: PhantomData<TyIx>,
}

impl<TyIx, Ty> TypedIxVec<TyIx, Ty>
where
  Ty: Clone,
  TyIx: Copy + From<u32> + Into<u32>,
{
  pub fn new() -> Self {
    Self { vek: Vec::new(), ty_ix: PhantomData::<TyIx> }
  }
  pub fn from_vec(vek: Vec<Ty>) -> Self {
    Self { vek, ty_ix: PhantomData::<TyIx> }
  }
  pub fn append(&mut self, other: &mut Vec<Ty>) {
    self.vek.append(other);
  }
  pub fn iter(&self) -> Iter<Ty> {
    self.vek.iter()
  }
  pub fn iter_mut(&mut self) -> IterMut<Ty> {
    self.vek.iter_mut()
  }
  pub fn len(&self) -> u32 {
    self.vek.len() as u32
  }
  pub fn is_empty(&self) -> bool {
    self.vek.is_empty()
  }
  pub fn push(&mut self, item: Ty) -> TyIx {
    let ix = TyIx::from(self.vek.len() as u32);
    self.vek.push(item);
    ix
  }
  pub fn clear(&mut self) {
    self.vek.clear();
  }
  pub fn into_vec(self) -> Vec<Ty> {
    self.vek
  }
  pub fn elems(&self) -> &[Ty] {
    &self.vek[..]
  }
}

impl<TyIx, Ty> TypedIxVec<TyIx, Ty>
where
  Ty: Clone,
  TyIx: Copy + From<u32> + Into<u32> + PartialOrd + PlusOne,
{
  pub fn range(&self) -> MyRange<TyIx> {
    MyRange::new(TyIx::from(0), self.vek.len())
  }
}

impl<TyIx, Ty> Index<TyIx> for TypedIxVec<TyIx, Ty>
where
  TyIx: Into<u32>,
{
  type Output = Ty;
  fn index(&self, ix: TyIx) -> &Ty {
    &self.vek[ix.into() as usize]
  }
}

impl<TyIx, Ty> IndexMut<TyIx> for TypedIxVec<TyIx, Ty>
where
  TyIx: Into<u32>,
{
  fn index_mut(&mut self, ix: TyIx) -> &mut Ty {
    &mut self.vek[ix.into() as usize]
  }
}

impl<TyIx, Ty> Clone for TypedIxVec<TyIx, Ty>
where
  Ty: Clone,
{
  // This is only needed for debug printing.
  fn clone(&self) -> Self {
    Self { vek: self.vek.clone(), ty_ix: PhantomData::<TyIx> }
  }
}

impl<TyIx, Ty: fmt::Debug> fmt::Debug for TypedIxVec<TyIx, Ty> {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{:?}", self.vek)
  }
}

//=============================================================================
// Typed indices

macro_rules! generate_boilerplate {
  ($TypeIx:ident, $PrintingPrefix:expr) => {
    #[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
    #[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
    pub struct $TypeIx(u32);
    impl $TypeIx {
      pub fn new(n: u32) -> Self {
        Self(n)
      }
      pub fn get(self) -> u32 {
        self.0
      }
      pub fn plus(self, delta: u32) -> $TypeIx {
        $TypeIx(self.0 + delta)
      }
      pub fn minus(self, delta: u32) -> $TypeIx {
        $TypeIx(self.0 - delta)
      }
      pub fn dotdot(&self, last_plus1: $TypeIx) -> MyRange<$TypeIx> {
        let len = (last_plus1.0 - self.0) as usize;
        MyRange::new(*self, len)
      }
    }
    impl fmt::Debug for $TypeIx {
      fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}{}", $PrintingPrefix, &self.0)
      }
    }
    impl PlusOne for $TypeIx {
      fn plus_one(&self) -> Self {
        self.plus(1)
      }
    }
    impl Into<u32> for $TypeIx {
      fn into(self) -> u32 {
        self.0
      }
    }
    impl From<u32> for $TypeIx {
      fn from(n: u32) -> $TypeIx {
        $TypeIx::new(n)
      }
    }
  };
}

generate_boilerplate!(InstIx, "i");

generate_boilerplate!(BlockIx, "b");

generate_boilerplate!(DepSetIx, "d");

#[test]
fn test_my_range() {
  let r = InstIx::new(3).dotdot(InstIx::new(6));
  assert_eq!(r.len(), 3);
  assert_eq!(r.first(), InstIx::new(3));
  assert_eq!(r.last(), InstIx::new(5));
  assert!(r.contains(InstIx::new(4)));
  assert!(!r.contains(InstIx::new(6)));
  let all: Vec<InstIx> = r.into_iter().collect();
  assert_eq!(all, vec![InstIx::new(3), InstIx::new(4), InstIx::new(5)]);

  let empty = BlockIx::new(2).dotdot(BlockIx::new(2));
  assert!(empty.is_empty());
  assert_eq!(empty.into_iter().count(), 0);
}

#[test]
fn test_typed_ix_vec() {
  let mut v = TypedIxVec::<DepSetIx, &'static str>::new();
  let a = v.push("a");
  let b = v.push("b");
  assert_eq!(a, DepSetIx::new(0));
  assert_eq!(b, DepSetIx::new(1));
  v[b] = "c";
  assert_eq!(v[b], "c");
  assert_eq!(v.len(), 2);
}
