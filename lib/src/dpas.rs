/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! DPAS macros.
//!
//! Consecutive DPAS instructions that share their shape and reuse one
//! another's src1 or src2 are issued back to back by the systolic array,
//! with the repeated operand read only once.  Such a run is handled as one
//! out-of-order producer: its footprints are the union of its members', the
//! first member waits on whatever the macro depends on, and the last member
//! takes the scoreboard id.  All but the last member are marked `Atomic`.
//!
//! Operand extents, in bytes, for exec size E, repeat count R, systolic
//! depth D:
//!
//!   dst, src0:  E * R * sizeof(type)
//!   src1:       E * D * 4
//!   src2:       R * D * 4
//!
//! When R < 8 the hardware reads src2 as if R were 8.  That extra range is
//! part of what the macro reads, but it can't create a conflict between the
//! members.

use log::debug;
use std::ops::Range;

use crate::data_structures::InstIx;
use crate::dep_builder::DepSetBuilder;
use crate::dep_set::{DepSet, DepType, InstIds};
use crate::inst::{InstDesc, OperandKind, RegName};
use crate::interface::SwsbError;

/// The GRF byte ranges of one DPAS instruction.  `None` for a null operand.
#[derive(Clone, Debug, PartialEq, Eq)]
struct DpasRanges {
  dst: Option<Range<u32>>,
  src0: Option<Range<u32>>,
  src1: Option<Range<u32>>,
  src2: Option<Range<u32>>,
  /// src2 as actually read by the hardware.
  src2_read: Option<Range<u32>>,
}

fn overlaps(a: &Option<Range<u32>>, b: &Option<Range<u32>>) -> bool {
  match (a, b) {
    (Some(a), Some(b)) => a.start < b.end && b.start < a.end,
    _ => false,
  }
}

impl DpasRanges {
  fn srcs(&self) -> [&Option<Range<u32>>; 3] {
    [&self.src0, &self.src1, &self.src2]
  }

  /// Would this instruction read its own result?  Depth-8 DPAS may
  /// accumulate in place, with dst and src0 the very same bytes.
  fn self_conflict(&self, depth: u8) -> bool {
    let in_place = depth == 8 && self.dst.is_some() && self.dst == self.src0;
    (!in_place && overlaps(&self.dst, &self.src0))
      || overlaps(&self.dst, &self.src1)
      || overlaps(&self.dst, &self.src2)
  }

  /// Does `self` (issued after `prev`) depend on `prev`?
  fn depends_on(&self, prev: &DpasRanges) -> bool {
    let raw = self.srcs().iter().any(|s| overlaps(s, &prev.dst));
    let war = prev.srcs().iter().any(|s| overlaps(&self.dst, s));
    let waw = overlaps(&self.dst, &prev.dst);
    raw || war || waw
  }

  /// Can the hardware skip reading src1 or src2 of `self` because `prev`
  /// just read exactly the same bytes?
  fn suppresses_read(&self, prev: &DpasRanges) -> bool {
    (self.src1.is_some() && self.src1 == prev.src1)
      || (self.src2.is_some() && self.src2 == prev.src2)
  }
}

/// Do `a` and `b` have the shape required to share a macro?
fn same_shape(a: &InstDesc, b: &InstDesc) -> bool {
  let types = |d: &InstDesc| {
    let dst = d.dst.map(|o| o.ty);
    let srcs: Vec<_> = d.srcs.iter().map(|o| o.ty).collect();
    (dst, srcs)
  };
  a.op == b.op
    && a.exec_size == b.exec_size
    && a.chan_off == b.chan_off
    && a.no_mask == b.no_mask
    && a.pred == b.pred
    && a.flag == b.flag
    && a.dpas.map(|d| d.systolic_depth) == b.dpas.map(|d| d.systolic_depth)
    && types(a) == types(b)
}

pub struct DpasMacro {
  /// The member instructions, in order.
  pub members: Vec<InstIx>,
  pub input: DepSet,
  pub output: DepSet,
}

struct Member {
  ranges: DpasRanges,
  input: DepSet,
  output: DepSet,
}

/// Form the macro that starts at `insts[0]`, which must be a DPAS.  `insts`
/// is the rest of the block.
pub fn form_macro(
  builder: &DepSetBuilder,
  descs: &[InstDesc],
  insts: &[InstIx],
  ids: InstIds,
) -> Result<DpasMacro, SwsbError> {
  let first_ix = insts[0];
  let first = &descs[first_ix.get() as usize];
  if !builder.caps().has_dpas {
    return Err(SwsbError::UnsupportedOp { inst: first_ix, op: first.op });
  }
  let depth = match first.dpas {
    Some(d) => d.systolic_depth,
    None => {
      return Err(SwsbError::Operand {
        inst: first_ix,
        reason: "dpas without a systolic depth and repeat count".to_string(),
      })
    }
  };

  let head = member(builder, first_ix, first, ids)?;
  let mut members = vec![first_ix];
  let mut input = head.input;
  let mut output = head.output;

  if !head.ranges.self_conflict(depth) {
    let mut seen = vec![head.ranges];
    for &ix in insts[1..].iter() {
      let desc = &descs[ix.get() as usize];
      if !desc.op.is_dpas() || !same_shape(first, desc) {
        break;
      }
      let next = member(builder, ix, desc, ids)?;
      let prev = &seen[seen.len() - 1];
      if next.ranges.self_conflict(depth)
        || !next.ranges.suppresses_read(prev)
        || seen.iter().any(|p| next.ranges.depends_on(p))
      {
        break;
      }
      input.bits.union(&next.input.bits);
      output.bits.union(&next.output.bits);
      for &b in next.input.buckets.iter() {
        input.add_bucket(b);
      }
      for &b in next.output.buckets.iter() {
        output.add_bucket(b);
      }
      members.push(ix);
      seen.push(next.ranges);
    }
  }

  // The macro is represented by its last member.
  let last = members[members.len() - 1];
  input.inst = last;
  output.inst = last;
  if members.len() > 1 {
    debug!(
      "dpas macro {:?}..={:?}: reads {} writes {}",
      first_ix,
      last,
      input.describe(builder.space()),
      output.describe(builder.space())
    );
  }
  Ok(DpasMacro { members, input, output })
}

/// Footprints and GRF ranges of one DPAS instruction.
fn member(
  builder: &DepSetBuilder,
  ix: InstIx,
  desc: &InstDesc,
  ids: InstIds,
) -> Result<Member, SwsbError> {
  let space = builder.space();
  let dpas = desc.dpas.ok_or_else(|| SwsbError::Operand {
    inst: ix,
    reason: "dpas without a systolic depth and repeat count".to_string(),
  })?;
  let exec = desc.exec_size as u32;
  let depth = dpas.systolic_depth as u32;
  let rcount = dpas.repeat_count as u32;

  // The start of a GRF operand, or None for null.
  let start_of = |n: usize| -> Result<Option<u32>, SwsbError> {
    let op = if n == 0 { desc.dst } else { desc.srcs.get(n - 1).cloned() };
    let op = match op {
      Some(op) => op,
      None => return Ok(None),
    };
    match op.kind {
      OperandKind::Direct { reg: RegName::Null, .. } => Ok(None),
      OperandKind::Direct { reg: RegName::Grf, rr, .. } => {
        Ok(space.address_of(RegName::Grf, rr, op.ty.size_bytes()))
      }
      _ => Err(SwsbError::Operand {
        inst: ix,
        reason: "dpas operands must be direct GRFs".to_string(),
      }),
    }
  };
  let ty_bytes = |n: usize| -> u32 {
    let op = if n == 0 { desc.dst } else { desc.srcs.get(n - 1).cloned() };
    op.map(|o| o.ty.size_bytes()).unwrap_or(4)
  };
  let grf_end = space.grf_start + space.grf_len;
  let range = |start: Option<u32>, len: u32| {
    let r: Result<Option<Range<u32>>, SwsbError> = match start {
      Some(s) if s + len > grf_end => Err(SwsbError::Operand {
        inst: ix,
        reason: "dpas operand runs past the end of the GRF file".to_string(),
      }),
      Some(s) => Ok(Some(s..s + len)),
      None => Ok(None),
    };
    r
  };

  let src2_start = start_of(3)?;
  let ranges = DpasRanges {
    dst: range(start_of(0)?, exec * rcount * ty_bytes(0))?,
    src0: range(start_of(1)?, exec * rcount * ty_bytes(1))?,
    src1: range(start_of(2)?, exec * depth * 4)?,
    src2: range(src2_start, rcount * depth * 4)?,
    // The over-read is clipped at the end of the file.
    src2_read: src2_start.map(|s| {
      s..std::cmp::min(s + std::cmp::max(rcount, 8) * depth * 4, grf_end)
    }),
  };

  let mut input = builder.empty(ix, desc, ids, DepType::Read);
  let mut output = builder.empty(ix, desc, ids, DepType::Write);
  if desc.reads_flag() {
    builder.add_flag(ix, desc, &mut input)?;
  }
  for r in [&ranges.src0, &ranges.src1, &ranges.src2_read].iter() {
    if let Some(r) = r {
      input.add_bytes(r.start, r.end - r.start);
      input.add_buckets_for(space, r.start, r.end);
    }
  }
  if let Some(r) = &ranges.dst {
    output.add_bytes(r.start, r.end - r.start);
    output.add_buckets_for(space, r.start, r.end);
  }
  input.add_bucket(space.special_bucket());
  output.add_bucket(space.special_bucket());
  Ok(Member { ranges, input, output })
}

//=============================================================================
// Tests

#[cfg(test)]
mod test {
  use super::*;
  use crate::dep_set::AddressSpace;
  use crate::inst::{Op, Operand, Region, Type};
  use crate::platform::{Platform, PlatformCaps};

  /// `dpas.8x<rcount> (8) r<dst> r<src0> r<src1> r<src2>`
  fn dpas(dst: u16, src0: u16, src1: u16, src2: u16, rcount: u8) -> InstDesc {
    InstDesc::new(Op::Dpas, 8)
      .with_dst(Operand::grf(dst, 0, Region::DST1, Type::F))
      .with_src(Operand::grf(src0, 0, Region::SRC110, Type::F))
      .with_src(Operand::grf(src1, 0, Region::SRC110, Type::HF))
      .with_src(Operand::grf(src2, 0, Region::SRC110, Type::HF))
      .with_dpas(8, rcount)
  }

  fn ixs(n: u32) -> Vec<InstIx> {
    (0..n).map(InstIx::new).collect()
  }

  fn run(
    platform: Platform,
    descs: &[InstDesc],
  ) -> Result<DpasMacro, SwsbError> {
    let caps = PlatformCaps::new(platform);
    let space = AddressSpace::new(&caps.geometry);
    let builder = DepSetBuilder::new(&caps, &space);
    let insts = ixs(descs.len() as u32);
    form_macro(&builder, descs, &insts, InstIds::new())
  }

  #[test]
  fn test_operand_extents() {
    let caps = PlatformCaps::new(Platform::XeHp);
    let space = AddressSpace::new(&caps.geometry);
    let builder = DepSetBuilder::new(&caps, &space);
    let desc = dpas(10, 10, 40, 60, 4);
    let m = member(&builder, InstIx::new(0), &desc, InstIds::new()).unwrap();
    // dst/src0: 8 * 4 * 4 bytes = 4 GRFs; src1: 8 * 8 * 4 = 8 GRFs;
    // src2: 4 * 8 * 4 = 4 GRFs, read as 8.
    assert_eq!(m.ranges.dst, Some(320..448));
    assert_eq!(m.ranges.src0, m.ranges.dst);
    assert_eq!(m.ranges.src1, Some(1280..1536));
    assert_eq!(m.ranges.src2, Some(1920..2048));
    assert_eq!(m.ranges.src2_read, Some(1920..2176));
    assert!(!m.ranges.self_conflict(8));
    assert!(m.ranges.self_conflict(4));
    assert!(m.input.bits.test(2175));
  }

  #[test]
  fn test_macro_formation() {
    // Four dpas sharing src1, each accumulating into its own registers.
    let descs = vec![
      dpas(10, 10, 110, 60, 8),
      dpas(18, 18, 110, 70, 8),
      dpas(26, 26, 110, 80, 8),
      dpas(34, 34, 110, 90, 8),
    ];
    let m = run(Platform::XeHp, &descs).unwrap();
    assert_eq!(m.members, ixs(4));
    assert_eq!(m.input.inst, InstIx::new(3));
    // The footprint is the union of the members'.
    for d in descs.iter() {
      let dst = d.dst.unwrap().direct_grf().unwrap().reg_num as u32;
      assert!(m.output.buckets.contains(&dst));
    }
    assert!(m.input.buckets.contains(&90));
  }

  #[test]
  fn test_macro_breaks() {
    // No reused source.
    let descs = vec![dpas(10, 10, 40, 60, 8), dpas(18, 18, 48, 70, 8)];
    assert_eq!(run(Platform::XeHp, &descs).unwrap().members.len(), 1);

    // The second reads what the first writes.
    let descs = vec![dpas(10, 10, 40, 60, 8), dpas(18, 18, 40, 12, 8)];
    assert_eq!(run(Platform::XeHp, &descs).unwrap().members.len(), 1);

    // A different shape.
    let mut other = dpas(18, 18, 40, 70, 8);
    other.exec_size = 16;
    let descs = vec![dpas(10, 10, 40, 60, 8), other];
    assert_eq!(run(Platform::XeHp, &descs).unwrap().members.len(), 1);

    // The over-read of src2 never breaks a macro: the second member's dst
    // sits where the first member's src2 is over-read.
    let descs = vec![dpas(10, 10, 40, 60, 4), dpas(64, 64, 40, 80, 4)];
    assert_eq!(run(Platform::XeHp, &descs).unwrap().members.len(), 2);
  }

  #[test]
  fn test_unsupported() {
    let descs = vec![dpas(10, 10, 40, 60, 8)];
    match run(Platform::XeLp, &descs) {
      Err(SwsbError::UnsupportedOp { op: Op::Dpas, .. }) => {}
      _ => panic!("dpas must be rejected on a platform without it"),
    }
  }
}
