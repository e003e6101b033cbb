/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Register footprints.
//!
//! All tracked register files are flattened into one byte-addressed space:
//!
//!   [ GRF | a0 | acc | flag | cr/sr/ce ]
//!
//! with each file starting on a bucket boundary.  A bucket is one GRF (but
//! never less than 32 bytes), so the bucket number of a GRF byte is its
//! register number.  A `DepSet` is the set of bytes one instruction (or one
//! DPAS macro) reads, or writes, together with everything the scheduler
//! needs to know about the producer when a later instruction hits it.

use crate::bit_set::BitSet;
use crate::data_structures::{DepSetIx, InstIx};
use crate::inst::{Op, RegName, RegRef, Sfid};
use crate::platform::RegGeometry;

use smallvec::SmallVec;
use std::fmt;

//=============================================================================
// Classification

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepType {
  Read,
  Write,
  /// A read that must be waited on regardless of byte overlap.
  ReadAlwaysInterfere,
  /// A write that must be waited on regardless of byte overlap.
  WriteAlwaysInterfere,
}

impl DepType {
  pub fn is_read(self) -> bool {
    match self {
      DepType::Read | DepType::ReadAlwaysInterfere => true,
      _ => false,
    }
  }

  pub fn is_write(self) -> bool {
    !self.is_read()
  }

  pub fn is_always_interfere(self) -> bool {
    match self {
      DepType::ReadAlwaysInterfere | DepType::WriteAlwaysInterfere => true,
      _ => false,
    }
  }
}

/// The pipe an instruction executes in.  `Short`, `Long` and `ControlFlow`
/// are only used in single-distance-pipe mode, `Float`, `Integer`, `Long64`
/// and `MathInOrder` only in the multi-pipe modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepPipe {
  None,
  Short,
  Long,
  ControlFlow,
  Float,
  Integer,
  Long64,
  MathInOrder,
  Send,
  SendUnknown,
  Dpas,
  Math,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepClass {
  InOrder,
  OutOfOrder,
  /// Instructions whose dependencies are implied by hardware (`sync`).
  Other,
}

//=============================================================================
// Instruction counters

/// Program-order counters.  `global` counts every instruction; `in_order`
/// counts in-order instructions; the per-pipe counters count instructions of
/// their own pipe only.  A DepSet keeps a snapshot taken when it was built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct InstIds {
  pub global: u32,
  pub in_order: u32,
  pub float_pipe: u32,
  pub int_pipe: u32,
  pub long_pipe: u32,
  pub math_pipe: u32,
}

impl InstIds {
  pub fn new() -> Self {
    Self {
      global: 1,
      in_order: 1,
      float_pipe: 1,
      int_pipe: 1,
      long_pipe: 1,
      math_pipe: 1,
    }
  }

  /// Reset the in-order counters; `global` keeps counting across blocks.
  pub fn reset_in_order(&mut self) {
    let global = self.global;
    *self = InstIds::new();
    self.global = global;
  }

  /// The counter that ages producers of `pipe`, or `None` for pipes that
  /// have no counter of their own.
  pub fn pipe_counter(&self, pipe: DepPipe) -> Option<u32> {
    match pipe {
      DepPipe::Float => Some(self.float_pipe),
      DepPipe::Integer => Some(self.int_pipe),
      DepPipe::Long64 => Some(self.long_pipe),
      DepPipe::MathInOrder => Some(self.math_pipe),
      _ => None,
    }
  }

  /// Count one more in-order instruction of `pipe`.
  pub fn advance(&mut self, pipe: DepPipe, single_pipe: bool) {
    self.in_order += 1;
    if single_pipe {
      return;
    }
    match pipe {
      DepPipe::Float => self.float_pipe += 1,
      DepPipe::Integer => self.int_pipe += 1,
      DepPipe::Long64 => self.long_pipe += 1,
      DepPipe::MathInOrder => self.math_pipe += 1,
      _ => panic!("InstIds::advance: {:?} is not an in-order pipe", pipe),
    }
  }
}

//=============================================================================
// The flattened register address space

#[derive(Clone, Debug)]
pub struct AddressSpace {
  pub geometry: RegGeometry,
  pub bucket_bytes: u32,
  pub grf_start: u32,
  pub grf_len: u32,
  pub a_start: u32,
  pub a_len: u32,
  pub acc_start: u32,
  pub acc_len: u32,
  pub flag_start: u32,
  pub flag_len: u32,
  pub special_start: u32,
  pub special_len: u32,
  pub total_bytes: u32,
  pub total_buckets: u32,
}

impl AddressSpace {
  pub fn new(geometry: &RegGeometry) -> Self {
    let bucket_bytes = std::cmp::max(geometry.grf_bytes_per_reg, 32);
    let align = |n: u32| (n + bucket_bytes - 1) / bucket_bytes * bucket_bytes;

    let grf_start = 0;
    let grf_len = geometry.grf_regs * geometry.grf_bytes_per_reg;
    let a_start = align(grf_start + grf_len);
    let a_len = geometry.a_regs * geometry.a_bytes_per_reg;
    let acc_start = align(a_start + a_len);
    let acc_len = geometry.acc_regs * geometry.acc_bytes_per_reg;
    let flag_start = align(acc_start + acc_len);
    let flag_len = geometry.flag_regs * geometry.flag_bytes_per_reg;
    let special_start = align(flag_start + flag_len);
    let special_len = geometry.special_regs * geometry.special_bytes_per_reg;
    let total_bytes = align(special_start + special_len);

    Self {
      geometry: *geometry,
      bucket_bytes,
      grf_start,
      grf_len,
      a_start,
      a_len,
      acc_start,
      acc_len,
      flag_start,
      flag_len,
      special_start,
      special_len,
      total_bytes,
      total_buckets: total_bytes / bucket_bytes,
    }
  }

  /// The `(start, len)` of a register file, or `None` if it isn't tracked.
  /// The control, state and channel-enable registers share one file.
  pub fn file(&self, reg: RegName) -> Option<(u32, u32)> {
    match reg {
      RegName::Grf => Some((self.grf_start, self.grf_len)),
      RegName::Address => Some((self.a_start, self.a_len)),
      RegName::Acc => Some((self.acc_start, self.acc_len)),
      RegName::Flag => Some((self.flag_start, self.flag_len)),
      RegName::Control | RegName::State | RegName::ChannelEnable => {
        Some((self.special_start, self.special_len))
      }
      _ => None,
    }
  }

  pub fn bytes_per_reg(&self, reg: RegName) -> u32 {
    let g = &self.geometry;
    match reg {
      RegName::Grf => g.grf_bytes_per_reg,
      RegName::Address => g.a_bytes_per_reg,
      RegName::Acc => g.acc_bytes_per_reg,
      RegName::Flag => g.flag_bytes_per_reg,
      RegName::Control | RegName::State | RegName::ChannelEnable => {
        g.special_bytes_per_reg
      }
      _ => 0,
    }
  }

  /// Byte address of `rr` in file `reg`, with sub-registers counted in
  /// elements of `type_bytes`.  `None` for untracked files.
  pub fn address_of(
    &self,
    reg: RegName,
    rr: RegRef,
    type_bytes: u32,
  ) -> Option<u32> {
    let (start, _) = self.file(reg)?;
    Some(
      start
        + rr.reg_num as u32 * self.bytes_per_reg(reg)
        + rr.sub_reg_num as u32 * type_bytes,
    )
  }

  pub fn bucket_of(&self, addr: u32) -> u32 {
    addr / self.bucket_bytes
  }

  /// The bucket every tracked access also looks up, so that producers
  /// touching special registers are always found.
  pub fn special_bucket(&self) -> u32 {
    self.bucket_of(self.special_start)
  }

  /// First bucket past the GRF file.
  pub fn grf_bucket_end(&self) -> u32 {
    self.bucket_of(self.a_start)
  }
}

//=============================================================================
// DepSet

#[derive(Clone)]
pub struct DepSet {
  /// The instruction this footprint belongs to; for a DPAS macro, its last
  /// member.
  pub inst: InstIx,
  pub ids: InstIds,
  pub dep_type: DepType,
  pub pipe: DepPipe,
  pub class: DepClass,
  pub bits: BitSet,
  pub buckets: SmallVec<[u32; 4]>,
  /// The scoreboard id held by the producer, once it has one.
  pub sbid: Option<u32>,
  pub has_indirect: bool,
  pub has_sr: bool,
  /// The other half (inputs or outputs) of the same instruction.
  pub companion: Option<DepSetIx>,
  // What later instructions need to know about the producer.
  pub op: Op,
  pub sfid: Option<Sfid>,
  pub exec_size: u8,
  pub chan_off: u8,
}

impl DepSet {
  pub fn new(
    space: &AddressSpace,
    inst: InstIx,
    ids: InstIds,
    dep_type: DepType,
    pipe: DepPipe,
    class: DepClass,
  ) -> Self {
    Self {
      inst,
      ids,
      dep_type,
      pipe,
      class,
      bits: BitSet::new(space.total_bytes as usize),
      buckets: SmallVec::new(),
      sbid: None,
      has_indirect: false,
      has_sr: false,
      companion: None,
      op: Op::Nop,
      sfid: None,
      exec_size: 1,
      chan_off: 0,
    }
  }

  pub fn add_bytes(&mut self, start: u32, len: u32) {
    self.bits.set_range(start as usize, len as usize);
  }

  pub fn add_bucket(&mut self, bucket: u32) {
    if !self.buckets.contains(&bucket) {
      self.buckets.push(bucket);
    }
  }

  /// Add every bucket overlapped by `[lo, hi)`.
  pub fn add_buckets_for(&mut self, space: &AddressSpace, lo: u32, hi: u32) {
    if hi <= lo {
      return;
    }
    for b in space.bucket_of(lo)..=space.bucket_of(hi - 1) {
      self.add_bucket(b);
    }
  }

  /// Add a whole GRF, bytes and bucket.
  pub fn add_grf(&mut self, space: &AddressSpace, reg: u32) {
    let bytes = space.geometry.grf_bytes_per_reg;
    self.add_bytes(space.grf_start + reg * bytes, bytes);
    self.add_bucket(reg);
  }

  pub fn is_in_order(&self) -> bool {
    self.class == DepClass::InOrder
  }

  pub fn is_out_of_order(&self) -> bool {
    self.class == DepClass::OutOfOrder
  }

  /// Forget the footprint.  Used once a producer has been waited on.
  pub fn reset(&mut self) {
    self.bits.clear();
    self.buckets.clear();
  }

  /// The byte ranges of the footprint that fall within the GRF file.
  pub fn grf_ranges(&self, space: &AddressSpace) -> Vec<std::ops::Range<u32>> {
    let end = (space.grf_start + space.grf_len) as usize;
    self
      .bits
      .runs()
      .filter(|&(start, _)| start < end)
      .map(|(start, len)| {
        let stop = std::cmp::min(start + len, end);
        start as u32..stop as u32
      })
      .collect()
  }

  /// A short register-level description, e.g. `{r3,r4.0-15,f0.0-1}`.
  pub fn describe(&self, space: &AddressSpace) -> String {
    let mut out = String::new();
    let mut first = true;
    let files: [(&str, RegName, u32); 5] = [
      ("r", RegName::Grf, space.geometry.grf_regs),
      ("a", RegName::Address, space.geometry.a_regs),
      ("acc", RegName::Acc, space.geometry.acc_regs),
      ("f", RegName::Flag, space.geometry.flag_regs),
      ("s", RegName::State, space.geometry.special_regs),
    ];
    out.push('{');
    for &(name, reg, count) in files.iter() {
      let (start, _) = match space.file(reg) {
        Some(f) => f,
        None => continue,
      };
      let per_reg = space.bytes_per_reg(reg);
      for r in 0..count {
        let base = (start + r * per_reg) as usize;
        let len = per_reg as usize;
        if self.bits.test_all(base, len) {
          push_item(&mut out, &mut first, &format!("{}{}", name, r));
          continue;
        }
        let mut i = 0;
        while i < len {
          if !self.bits.test(base + i) {
            i += 1;
            continue;
          }
          let mut j = i;
          while j < len && self.bits.test(base + j) {
            j += 1;
          }
          let item = if j > i + 1 {
            format!("{}{}.{}-{}", name, r, i, j - 1)
          } else {
            format!("{}{}.{}", name, r, i)
          };
          push_item(&mut out, &mut first, &item);
          i = j;
        }
      }
    }
    out.push('}');
    out
  }
}

fn push_item(out: &mut String, first: &mut bool, item: &str) {
  if !*first {
    out.push(',');
  }
  *first = false;
  out.push_str(item);
}

impl fmt::Debug for DepSet {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(
      fmt,
      "{:?}:{:?}/{:?}/{:?} bits={:?} buckets={:?}",
      self.inst,
      self.dep_type,
      self.pipe,
      self.class,
      self.bits,
      self.buckets
    )?;
    if let Some(id) = self.sbid {
      write!(fmt, " ${}", id)?;
    }
    Ok(())
  }
}

#[cfg(test)]
fn test_space() -> AddressSpace {
  use crate::platform::{Platform, PlatformCaps};
  AddressSpace::new(&PlatformCaps::new(Platform::XeLp).geometry)
}

#[test]
fn test_address_space_layout() {
  let space = test_space();
  assert_eq!(space.bucket_bytes, 32);
  assert_eq!(space.grf_len, 128 * 32);
  assert_eq!(space.a_start, 4096);
  assert_eq!(space.acc_start, 4096 + 32);
  assert_eq!(space.flag_start, space.acc_start + 8 * 32);
  assert_eq!(space.special_start % 32, 0);
  assert_eq!(space.total_bytes % space.bucket_bytes, 0);
  assert_eq!(space.bucket_of(5 * 32 + 7), 5);
  assert_eq!(space.grf_bucket_end(), 128);

  let rr = RegRef::new(1, 2);
  assert_eq!(space.address_of(RegName::Grf, rr, 4), Some(32 + 8));
  assert_eq!(space.address_of(RegName::Other, rr, 4), None);
  // cr, sr and ce alias.
  assert_eq!(
    space.address_of(RegName::Control, RegRef::new(0, 1), 4),
    space.address_of(RegName::State, RegRef::new(0, 1), 4)
  );
}

#[test]
fn test_wide_grf_buckets() {
  use crate::platform::{Platform, PlatformCaps};
  let space = AddressSpace::new(&PlatformCaps::new(Platform::XeHpc).geometry);
  assert_eq!(space.bucket_bytes, 64);
  assert_eq!(space.bucket_of(64 * 3), 3);
  assert_eq!(space.flag_len, 16);
}

#[test]
fn test_inst_ids() {
  let mut ids = InstIds::new();
  ids.global = 7;
  ids.advance(DepPipe::Float, false);
  ids.advance(DepPipe::Float, false);
  ids.advance(DepPipe::Integer, false);
  assert_eq!(ids.in_order, 4);
  assert_eq!(ids.pipe_counter(DepPipe::Float), Some(3));
  assert_eq!(ids.pipe_counter(DepPipe::Integer), Some(2));
  assert_eq!(ids.pipe_counter(DepPipe::Send), None);
  ids.reset_in_order();
  assert_eq!(ids.in_order, 1);
  assert_eq!(ids.global, 7);

  // Single pipe mode only counts the unified stream.
  ids.advance(DepPipe::Short, true);
  assert_eq!(ids.in_order, 2);
  assert_eq!(ids.float_pipe, 1);
}

#[test]
fn test_dep_set_describe() {
  let space = test_space();
  let mut ds = DepSet::new(
    &space,
    InstIx::new(0),
    InstIds::new(),
    DepType::Write,
    DepPipe::Short,
    DepClass::InOrder,
  );
  ds.add_grf(&space, 3);
  ds.add_bytes(space.grf_start + 4 * 32, 16);
  ds.add_buckets_for(&space, 4 * 32, 4 * 32 + 16);
  ds.add_bytes(space.flag_start, 2);
  assert_eq!(ds.describe(&space), "{r3,r4.0-15,f0.0-1}");
  assert_eq!(ds.buckets.as_slice(), &[3, 4]);
  assert_eq!(ds.grf_ranges(&space), vec![96..144]);
  ds.reset();
  assert!(ds.bits.is_empty());
  assert!(ds.buckets.is_empty());
}
