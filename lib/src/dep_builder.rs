/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Building the input and output footprints of a single instruction.
//!
//! Sources are walked row by row through their `<vt;wi,hz>` region,
//! destinations channel by channel through their horizontal stride.  On top
//! of the explicit operands, the builder adds the implicit ones: the flag
//! read by predication and written by a condition modifier, the
//! accumulator read by `mac`/`mach` and written under `AccWrEn`, and the
//! address registers holding send descriptors.
//!
//! Every tracked access also registers the special bucket, so a later
//! instruction that touches `cr`/`sr`/`ce` (which is always-interfere) is
//! found by anything that follows it.

use log::trace;
use std::cmp::{max, min};

use crate::data_structures::InstIx;
use crate::dep_set::{
  AddressSpace, DepClass, DepPipe, DepSet, DepType, InstIds,
};
use crate::inst::{
  InstDesc, MathFc, Op, OperandKind, RegName, RegRef, Region,
};
use crate::interface::SwsbError;
use crate::platform::{PlatformCaps, SwsbEncodeMode};

/// Send message lengths we can't deduce are assumed to be this many GRFs.
const UNKNOWN_MSG_LEN: u32 = 31;

//=============================================================================
// Pipe classification

/// Which pipe `desc` executes in, and whether that pipe retires in order.
pub fn classify(mode: SwsbEncodeMode, desc: &InstDesc) -> (DepPipe, DepClass) {
  let pipe = match mode {
    SwsbEncodeMode::SingleDistPipe => single_pipe(desc),
    _ => multi_pipe(mode, desc),
  };
  let class = match desc.op {
    Op::Sync(_) | Op::Illegal => DepClass::Other,
    _ => match pipe {
      DepPipe::Send | DepPipe::SendUnknown | DepPipe::Dpas | DepPipe::Math => {
        DepClass::OutOfOrder
      }
      _ => DepClass::InOrder,
    },
  };
  (pipe, class)
}

fn single_pipe(desc: &InstDesc) -> DepPipe {
  if desc.op.is_math() {
    DepPipe::Math
  } else if desc.op.is_send() {
    DepPipe::Send
  } else if desc.op.is_branch() {
    DepPipe::ControlFlow
  } else if desc.has_64bit_operand() {
    DepPipe::Long
  } else {
    DepPipe::Short
  }
}

fn multi_pipe(mode: SwsbEncodeMode, desc: &InstDesc) -> DepPipe {
  if desc.op.is_math() {
    return match mode {
      SwsbEncodeMode::ThreeDistPipeDpMath if desc.has_64bit_operand() => {
        DepPipe::Long64
      }
      SwsbEncodeMode::FourDistPipe => DepPipe::MathInOrder,
      _ => DepPipe::Math,
    };
  }
  if desc.op.is_send() {
    return match desc.send.and_then(|s| s.sfid) {
      Some(_) => DepPipe::Send,
      None => DepPipe::SendUnknown,
    };
  }
  if desc.op.is_dpas() {
    return DepPipe::Dpas;
  }
  if desc.op.is_branch() {
    return DepPipe::Integer;
  }
  if desc.has_64bit_operand() {
    return DepPipe::Long64;
  }
  match desc.dst {
    Some(dst) if dst.ty.is_float() => DepPipe::Float,
    _ => DepPipe::Integer,
  }
}

//=============================================================================
// The builder

pub struct DepSetBuilder<'a> {
  caps: &'a PlatformCaps,
  space: &'a AddressSpace,
}

impl<'a> DepSetBuilder<'a> {
  pub fn new(caps: &'a PlatformCaps, space: &'a AddressSpace) -> Self {
    Self { caps, space }
  }

  pub fn space(&self) -> &AddressSpace {
    self.space
  }

  pub fn caps(&self) -> &PlatformCaps {
    self.caps
  }

  /// An empty footprint carrying everything later instructions need to
  /// know about `desc`.
  pub(crate) fn empty(
    &self,
    ix: InstIx,
    desc: &InstDesc,
    ids: InstIds,
    dep_type: DepType,
  ) -> DepSet {
    let (pipe, class) = classify(self.caps.mode, desc);
    let mut ds = DepSet::new(self.space, ix, ids, dep_type, pipe, class);
    ds.op = desc.op;
    ds.sfid = desc.send.and_then(|s| s.sfid);
    ds.exec_size = desc.exec_size;
    ds.chan_off = desc.chan_off;
    ds
  }

  /// Both footprints of an ordinary (non-DPAS) instruction, with the
  /// platform's destination workarounds applied.
  pub fn inst_dep_sets(
    &self,
    ix: InstIx,
    desc: &InstDesc,
    ids: InstIds,
  ) -> Result<(DepSet, DepSet), SwsbError> {
    let mut input = self.src_dep_set(ix, desc, ids)?;
    let mut output = if self.needs_read_suppression_wa(desc) {
      self.dst_dep_set_full_grf(ix, desc, ids, true)?
    } else {
      self.dst_dep_set(ix, desc, ids)?
    };
    self.add_rmw_footprint(desc, &mut input, &mut output);
    trace!(
      "    {:?} reads {} writes {}",
      ix,
      input.describe(self.space),
      output.describe(self.space)
    );
    Ok((input, output))
  }

  /// Math writes must be treated as whole-register writes when the
  /// read-suppression workaround is active.
  pub fn needs_read_suppression_wa(&self, desc: &InstDesc) -> bool {
    self.caps.read_suppression_wa
      && desc.op.is_math()
      && desc.dst.and_then(|d| d.direct_grf()).is_some()
  }

  //---------------------------------------------------------------------------
  // Sources

  pub fn src_dep_set(
    &self,
    ix: InstIx,
    desc: &InstDesc,
    ids: InstIds,
  ) -> Result<DepSet, SwsbError> {
    let mut ds = self.empty(ix, desc, ids, DepType::Read);
    let exec = desc.exec_size as u32;

    if desc.reads_flag() {
      self.add_flag(ix, desc, &mut ds)?;
    }

    let send = if desc.op.is_send() {
      Some(desc.send.ok_or_else(|| SwsbError::Operand {
        inst: ix,
        reason: "send without a message descriptor".to_string(),
      })?)
    } else {
      None
    };
    if let Some(send) = send {
      for rr in send.desc_reg.iter().chain(send.ex_desc_reg.iter()) {
        self.add_region(ix, &mut ds, RegName::Address, *rr, 4, |add| {
          add(0, 4)
        })?;
      }
    }

    // mac and mach read acc0 implicitly.
    if desc.op == Op::Mac || desc.op == Op::Mach {
      self.set_src_region(
        ix,
        &mut ds,
        RegName::Acc,
        RegRef::default(),
        Region::SRC110,
        exec,
        2,
      )?;
    }

    if desc.srcs.is_empty() || desc.op.is_sync() {
      ds.add_bucket(self.space.special_bucket());
      return Ok(ds);
    }

    let num_srcs = desc.srcs.len();
    for (src_ix, src) in desc.srcs.iter().enumerate() {
      let type_bytes = src.ty.size_bytes();
      match src.kind {
        OperandKind::Direct { reg, rr, region } => {
          if let Some(send) = send {
            if reg != RegName::Grf {
              continue;
            }
            let len = if src_ix == 0 { send.src0_len } else { send.src1_len };
            self.add_grfs(
              ix,
              &mut ds,
              rr.reg_num as u32,
              len.map(|n| n as u32).unwrap_or(UNKNOWN_MSG_LEN),
            )?;
            ds.add_bucket(self.space.special_bucket());
            continue;
          }
          let region = if desc.op == Op::Brc {
            Region::SRC221
          } else if num_srcs == 3 {
            ternary_region(src_ix, region)
          } else {
            region
          };
          self.set_src_region(ix, &mut ds, reg, rr, region, exec, type_bytes)?;
        }
        OperandKind::Indirect { addr, region, vxh } => {
          ds.has_indirect = true;
          ds.dep_type = DepType::ReadAlwaysInterfere;
          // Only the address register access is known.
          let count = if vxh { exec / max(region.wi as u32, 1) } else { 1 };
          self.set_src_region(
            ix,
            &mut ds,
            RegName::Address,
            addr,
            Region::SRC110,
            max(count, 1),
            2,
          )?;
        }
        OperandKind::Imm(_) | OperandKind::Label(_) => {}
      }
    }
    Ok(ds)
  }

  fn set_src_region(
    &self,
    ix: InstIx,
    ds: &mut DepSet,
    reg: RegName,
    rr: RegRef,
    region: Region,
    exec: u32,
    type_bytes: u32,
  ) -> Result<(), SwsbError> {
    if !reg.is_tracked() {
      // Still look for always-interfere producers.
      ds.add_bucket(self.space.special_bucket());
      return Ok(());
    }

    if reg == RegName::Acc {
      self.add_acc_pair(ix, ds, rr)?;
    } else {
      let v = region.vt as u32;
      let w = max(region.wi as u32, 1);
      let h = region.hz as u32;
      let rows = max(exec / w, 1);
      self.add_region(ix, ds, reg, rr, type_bytes, |add| {
        let mut row_base = 0;
        for _ in 0..rows {
          let mut offset = row_base;
          for _ in 0..w {
            add(offset, type_bytes);
            offset += h * type_bytes;
          }
          row_base += v * type_bytes;
        }
      })?;
    }

    if reg.is_special() {
      ds.has_sr = true;
      ds.dep_type = DepType::ReadAlwaysInterfere;
    } else {
      ds.add_bucket(self.space.special_bucket());
    }
    Ok(())
  }

  //---------------------------------------------------------------------------
  // Destinations

  pub fn dst_dep_set(
    &self,
    ix: InstIx,
    desc: &InstDesc,
    ids: InstIds,
  ) -> Result<DepSet, SwsbError> {
    let mut ds = self.empty(ix, desc, ids, DepType::Write);
    let exec = desc.exec_size as u32;

    if desc.writes_flag() {
      self.add_flag(ix, desc, &mut ds)?;
    }

    let dst = match desc.dst {
      Some(dst) if desc.has_dst() => dst,
      _ => {
        ds.add_bucket(self.space.special_bucket());
        return Ok(ds);
      }
    };
    let type_bytes = dst.ty.size_bytes();

    // Implicit accumulator writes.
    if desc.opts.acc_wr_en
      || desc.op == Op::Addc
      || desc.op == Op::Subb
      || desc.op == Op::Mach
    {
      let elems = self.space.geometry.acc_bytes_per_reg / type_bytes;
      let chan = desc.chan_off as u32;
      let rr = RegRef::new((chan / elems) as u16, (chan % elems) as u16);
      self.set_dst_region(
        ix,
        &mut ds,
        RegName::Acc,
        rr,
        Region::DST1,
        exec,
        type_bytes,
      )?;
    }

    match dst.kind {
      OperandKind::Direct { reg: RegName::Grf, rr, .. } if desc.op.is_send() => {
        let len = desc.send.and_then(|s| s.dst_len);
        self.add_grfs(
          ix,
          &mut ds,
          rr.reg_num as u32,
          len.map(|n| n as u32).unwrap_or(UNKNOWN_MSG_LEN),
        )?;
        ds.add_bucket(self.space.special_bucket());
      }
      OperandKind::Direct { reg: RegName::Grf, rr, .. }
        if desc.op == Op::Math(MathFc::Idiv) =>
      {
        // idiv writes quotient and remainder.
        self.check_grf(ix, rr.reg_num as u32 + 1)?;
        ds.add_grf(self.space, rr.reg_num as u32);
        ds.add_grf(self.space, rr.reg_num as u32 + 1);
        ds.add_bucket(self.space.special_bucket());
      }
      OperandKind::Direct { reg, rr, region } => {
        self.set_dst_region(ix, &mut ds, reg, rr, region, exec, type_bytes)?;
      }
      OperandKind::Indirect { addr, .. } => {
        ds.has_indirect = true;
        self.set_dst_region(
          ix,
          &mut ds,
          RegName::Address,
          addr,
          Region::DST1,
          1,
          2,
        )?;
        ds.dep_type = DepType::WriteAlwaysInterfere;
      }
      OperandKind::Imm(_) | OperandKind::Label(_) => {}
    }
    Ok(ds)
  }

  fn set_dst_region(
    &self,
    ix: InstIx,
    ds: &mut DepSet,
    reg: RegName,
    rr: RegRef,
    region: Region,
    exec: u32,
    type_bytes: u32,
  ) -> Result<(), SwsbError> {
    if !reg.is_tracked() {
      ds.add_bucket(self.space.special_bucket());
      return Ok(());
    }

    if reg == RegName::Acc {
      self.add_acc_pair(ix, ds, rr)?;
    } else {
      let stride = region.hz as u32 * type_bytes;
      self.add_region(ix, ds, reg, rr, type_bytes, |add| {
        for ch in 0..exec {
          add(ch * stride, type_bytes);
        }
      })?;
    }

    if reg.is_special() {
      ds.has_sr = true;
      ds.dep_type = DepType::WriteAlwaysInterfere;
    } else {
      ds.add_bucket(self.space.special_bucket());
    }
    Ok(())
  }

  /// The destination widened to the whole GRF(s) it touches.  With
  /// `as_output` this is the instruction's real output footprint and also
  /// carries the flag write; otherwise it is the shadow footprint checked
  /// by the instruction right after a math.
  pub fn dst_dep_set_full_grf(
    &self,
    ix: InstIx,
    desc: &InstDesc,
    ids: InstIds,
    as_output: bool,
  ) -> Result<DepSet, SwsbError> {
    let mut ds = self.empty(ix, desc, ids, DepType::Write);
    if as_output {
      if desc.writes_flag() {
        self.add_flag(ix, desc, &mut ds)?;
      }
      ds.add_bucket(self.space.special_bucket());
    }

    let (rr, region, ty) = match desc.dst {
      Some(dst) if desc.has_dst() => match dst.kind {
        OperandKind::Direct { reg: RegName::Grf, rr, region } => {
          (rr, region, dst.ty)
        }
        _ => return Ok(ds),
      },
      _ => return Ok(ds),
    };

    let grf_bytes = self.space.geometry.grf_bytes_per_reg;
    let type_bytes = ty.size_bytes();
    let base = rr.reg_num as u32 * grf_bytes + rr.sub_reg_num as u32 * type_bytes;
    let span = (max(desc.exec_size as u32, 1) - 1) * region.hz as u32 * type_bytes
      + type_bytes;
    let first = base / grf_bytes;
    let mut last = (base + span - 1) / grf_bytes;
    if desc.op == Op::Math(MathFc::Idiv) {
      last = max(last, first + 1);
    }
    self.check_grf(ix, last)?;
    for reg in first..=last {
      ds.add_grf(self.space, reg);
    }
    Ok(ds)
  }

  /// Byte destinations are read-modify-write of the whole register on some
  /// platforms: both footprints get the full destination GRFs.
  pub fn add_rmw_footprint(
    &self,
    desc: &InstDesc,
    input: &mut DepSet,
    output: &mut DepSet,
  ) {
    if !self.caps.rmw_on_byte_dst || !has_byte_grf_dst(desc) {
      return;
    }
    let grf_end = self.space.grf_bucket_end();
    let grf_buckets: Vec<u32> =
      output.buckets.iter().cloned().filter(|&b| b < grf_end).collect();
    for b in grf_buckets {
      input.add_grf(self.space, b);
      output.add_grf(self.space, b);
    }
  }

  //---------------------------------------------------------------------------
  // Helpers

  /// The flag sub-register the instruction predicates on or writes, at its
  /// channel offset.
  pub(crate) fn add_flag(
    &self,
    ix: InstIx,
    desc: &InstDesc,
    ds: &mut DepSet,
  ) -> Result<(), SwsbError> {
    let fr = desc.flag;
    let offset = fr.reg_num as u32 * self.space.geometry.flag_bytes_per_reg
      + fr.sub_reg_num as u32 * 2
      + desc.chan_off as u32 / 8;
    let len = max(1, desc.exec_size as u32 / 8);
    if offset + len > self.space.flag_len {
      return Err(SwsbError::Operand {
        inst: ix,
        reason: format!(
          "flag f{}.{} at channel offset {} is out of range",
          fr.reg_num, fr.sub_reg_num, desc.chan_off
        ),
      });
    }
    let addr = self.space.flag_start + offset;
    ds.add_bytes(addr, len);
    ds.add_buckets_for(self.space, addr, addr + len);
    Ok(())
  }

  /// Accumulators are always tracked as even/odd pairs, since float and
  /// integer views of them overlap differently.
  fn add_acc_pair(
    &self,
    ix: InstIx,
    ds: &mut DepSet,
    rr: RegRef,
  ) -> Result<(), SwsbError> {
    let bytes = self.space.geometry.acc_bytes_per_reg;
    let even = rr.reg_num as u32 & !1;
    if even + 2 > self.space.geometry.acc_regs {
      return Err(SwsbError::Operand {
        inst: ix,
        reason: format!("acc{} is out of range", rr.reg_num),
      });
    }
    let lo = self.space.acc_start + even * bytes;
    ds.add_bytes(lo, 2 * bytes);
    ds.add_buckets_for(self.space, lo, lo + 2 * bytes);
    Ok(())
  }

  /// Run `walk`, which reports `(offset, len)` byte pieces relative to
  /// `rr`, and add them all to `ds`.  Fails if any piece leaves the file.
  fn add_region<F>(
    &self,
    ix: InstIx,
    ds: &mut DepSet,
    reg: RegName,
    rr: RegRef,
    type_bytes: u32,
    walk: F,
  ) -> Result<(), SwsbError>
  where
    F: FnOnce(&mut dyn FnMut(u32, u32)),
  {
    let (file_start, file_len) = match self.space.file(reg) {
      Some(f) => f,
      None => return Ok(()),
    };
    let base = self.space.address_of(reg, rr, type_bytes).unwrap_or(file_start);
    let mut lo = u32::max_value();
    let mut hi = 0;
    let mut pieces: Vec<(u32, u32)> = Vec::new();
    walk(&mut |offset, len| {
      lo = min(lo, base + offset);
      hi = max(hi, base + offset + len);
      pieces.push((base + offset, len));
    });
    if pieces.is_empty() {
      return Ok(());
    }
    if hi > file_start + file_len {
      return Err(SwsbError::Operand {
        inst: ix,
        reason: format!(
          "{:?} register {:?} region runs past the end of its file",
          reg, rr
        ),
      });
    }
    for (start, len) in pieces {
      ds.add_bytes(start, len);
    }
    ds.add_buckets_for(self.space, lo, hi);
    Ok(())
  }

  pub(crate) fn check_grf(
    &self,
    ix: InstIx,
    reg: u32,
  ) -> Result<(), SwsbError> {
    if reg >= self.space.geometry.grf_regs {
      return Err(SwsbError::Operand {
        inst: ix,
        reason: format!("r{} is out of range", reg),
      });
    }
    Ok(())
  }

  /// `count` whole GRFs from `first`, clipped at the end of the file.
  fn add_grfs(
    &self,
    ix: InstIx,
    ds: &mut DepSet,
    first: u32,
    count: u32,
  ) -> Result<(), SwsbError> {
    self.check_grf(ix, first)?;
    let end = min(first + count, self.space.geometry.grf_regs);
    for reg in first..end {
      ds.add_grf(self.space, reg);
    }
    Ok(())
  }
}

/// Align1 ternary sources have implicit region parts.
fn ternary_region(src_ix: usize, rgn: Region) -> Region {
  if src_ix < 2 {
    let wi = if rgn.vt == 0 && rgn.hz == 0 {
      1
    } else if rgn.hz == 0 {
      rgn.vt
    } else if rgn.vt != 0 {
      rgn.vt / rgn.hz
    } else {
      rgn.vt
    };
    Region::new(rgn.vt, wi, rgn.hz)
  } else {
    // <H> means <H;1,0>
    Region::new(rgn.hz, 1, 0)
  }
}

pub fn has_byte_grf_dst(desc: &InstDesc) -> bool {
  match desc.dst {
    Some(dst) => dst.direct_grf().is_some() && dst.ty.size_bits() == 8,
    None => false,
  }
}

//=============================================================================
// Tests

#[cfg(test)]
mod test {
  use super::*;
  use crate::inst::{
    CondMod, Operand, PredCtrl, SendDesc, Sfid, SyncFc, Type,
  };
  use crate::platform::Platform;

  fn setup(platform: Platform) -> (PlatformCaps, AddressSpace) {
    let caps = PlatformCaps::new(platform);
    let space = AddressSpace::new(&caps.geometry);
    (caps, space)
  }

  fn ix() -> InstIx {
    InstIx::new(0)
  }

  #[test]
  fn test_classify() {
    let add_f = InstDesc::new(Op::Add, 8)
      .with_dst(Operand::grf(1, 0, Region::DST1, Type::F));
    let add_d = InstDesc::new(Op::Add, 8)
      .with_dst(Operand::grf(1, 0, Region::DST1, Type::D));
    let add_df = InstDesc::new(Op::Add, 8)
      .with_dst(Operand::grf(1, 0, Region::DST1, Type::DF));
    let math = InstDesc::new(Op::Math(MathFc::Exp), 8)
      .with_dst(Operand::grf(1, 0, Region::DST1, Type::F));
    let math_df = InstDesc::new(Op::Math(MathFc::Sqrt), 8)
      .with_dst(Operand::grf(1, 0, Region::DST1, Type::DF));
    let send = InstDesc::new(Op::Send, 8).with_send(SendDesc {
      sfid: None,
      dst_len: Some(1),
      src0_len: Some(1),
      src1_len: None,
      desc_reg: None,
      ex_desc_reg: None,
    });
    let sync = InstDesc::sync(SyncFc::Nop);

    use DepClass::*;
    use SwsbEncodeMode::*;
    let pipe = |mode, desc: &InstDesc| classify(mode, desc);
    assert_eq!(pipe(SingleDistPipe, &add_f), (DepPipe::Short, InOrder));
    assert_eq!(pipe(SingleDistPipe, &add_df), (DepPipe::Long, InOrder));
    assert_eq!(pipe(SingleDistPipe, &math), (DepPipe::Math, OutOfOrder));
    assert_eq!(pipe(SingleDistPipe, &send), (DepPipe::Send, OutOfOrder));
    assert_eq!(pipe(ThreeDistPipe, &add_f), (DepPipe::Float, InOrder));
    assert_eq!(pipe(ThreeDistPipe, &add_d), (DepPipe::Integer, InOrder));
    assert_eq!(pipe(ThreeDistPipe, &add_df), (DepPipe::Long64, InOrder));
    assert_eq!(pipe(ThreeDistPipe, &math), (DepPipe::Math, OutOfOrder));
    assert_eq!(pipe(ThreeDistPipeDpMath, &math_df), (DepPipe::Long64, InOrder));
    assert_eq!(pipe(ThreeDistPipeDpMath, &math), (DepPipe::Math, OutOfOrder));
    assert_eq!(pipe(FourDistPipe, &math), (DepPipe::MathInOrder, InOrder));
    assert_eq!(pipe(FourDistPipe, &send), (DepPipe::SendUnknown, OutOfOrder));
    assert_eq!(pipe(FourDistPipe, &sync).1, Other);
  }

  #[test]
  fn test_src_regions() {
    let (caps, space) = setup(Platform::XeLp);
    let b = DepSetBuilder::new(&caps, &space);

    // <8;8,1>:f over 16 channels is two full GRFs.
    let desc = InstDesc::new(Op::Mov, 16)
      .with_dst(Operand::grf(10, 0, Region::DST1, Type::F))
      .with_src(Operand::grf(2, 0, Region::SRC881, Type::F));
    let ds = b.src_dep_set(ix(), &desc, InstIds::new()).unwrap();
    assert_eq!(ds.describe(&space), "{r2,r3}");
    assert!(ds.buckets.contains(&2));
    assert!(ds.buckets.contains(&3));
    assert!(ds.buckets.contains(&space.special_bucket()));

    // A scalar broadcast reads one element.
    let desc = InstDesc::new(Op::Mov, 16)
      .with_dst(Operand::grf(10, 0, Region::DST1, Type::F))
      .with_src(Operand::grf(4, 3, Region::SRC010, Type::F));
    let ds = b.src_dep_set(ix(), &desc, InstIds::new()).unwrap();
    assert_eq!(ds.describe(&space), "{r4.12-15}");

    // Running off the end of the GRF file is an error.
    let desc = InstDesc::new(Op::Mov, 16)
      .with_dst(Operand::grf(10, 0, Region::DST1, Type::F))
      .with_src(Operand::grf(127, 0, Region::SRC881, Type::F));
    assert!(b.src_dep_set(ix(), &desc, InstIds::new()).is_err());
  }

  #[test]
  fn test_ternary_regions() {
    assert_eq!(ternary_region(0, Region::new(0, 0, 0)), Region::new(0, 1, 0));
    assert_eq!(ternary_region(1, Region::new(8, 0, 0)), Region::new(8, 8, 0));
    assert_eq!(ternary_region(0, Region::new(8, 0, 1)), Region::new(8, 8, 1));
    assert_eq!(ternary_region(2, Region::new(0, 0, 1)), Region::new(1, 1, 0));
  }

  #[test]
  fn test_dst_and_implicit_operands() {
    let (caps, space) = setup(Platform::XeLp);
    let b = DepSetBuilder::new(&caps, &space);
    let f0 = RegRef::new(0, 0);

    let desc = InstDesc::new(Op::Cmp, 16)
      .with_chan_off(16)
      .with_cond_mod(f0, CondMod::Lt)
      .with_dst(Operand::grf(5, 0, Region::DST1, Type::D))
      .with_src(Operand::grf(6, 0, Region::SRC881, Type::D));
    let out = b.dst_dep_set(ix(), &desc, InstIds::new()).unwrap();
    assert_eq!(out.describe(&space), "{r5,r6,f0.2-3}");

    let desc = InstDesc::new(Op::Mach, 8)
      .with_pred(f0, PredCtrl::Seq)
      .with_dst(Operand::grf(5, 0, Region::DST1, Type::D))
      .with_src(Operand::grf(6, 0, Region::SRC881, Type::D))
      .with_src(Operand::grf(7, 0, Region::SRC881, Type::D));
    let inp = b.src_dep_set(ix(), &desc, InstIds::new()).unwrap();
    assert_eq!(inp.describe(&space), "{r6,r7,acc0,acc1,f0.0}");
    let out = b.dst_dep_set(ix(), &desc, InstIds::new()).unwrap();
    assert_eq!(out.describe(&space), "{r5,acc0,acc1}");
  }

  #[test]
  fn test_sends_and_idiv() {
    let (caps, space) = setup(Platform::XeLp);
    let b = DepSetBuilder::new(&caps, &space);
    let send = InstDesc::new(Op::Send, 16)
      .with_dst(Operand::grf(20, 0, Region::DST1, Type::UD))
      .with_src(Operand::grf(30, 0, Region::SRC110, Type::UD))
      .with_send(SendDesc {
        sfid: Some(Sfid::Dc0),
        dst_len: Some(2),
        src0_len: None,
        src1_len: None,
        desc_reg: Some(RegRef::new(0, 1)),
        ex_desc_reg: None,
      });
    let out = b.dst_dep_set(ix(), &send, InstIds::new()).unwrap();
    assert_eq!(out.describe(&space), "{r20,r21}");
    // An unknown length reads 31 registers, clipped at the end of the file.
    let inp = b.src_dep_set(ix(), &send, InstIds::new()).unwrap();
    assert_eq!(inp.bits.card() as u32, 31 * 32 + 4);
    assert!(inp.describe(&space).ends_with("r60,a0.4-7}"));

    let idiv = InstDesc::new(Op::Math(MathFc::Idiv), 8)
      .with_dst(Operand::grf(40, 0, Region::DST1, Type::D))
      .with_src(Operand::grf(41, 0, Region::SRC881, Type::D));
    let out = b.dst_dep_set(ix(), &idiv, InstIds::new()).unwrap();
    assert_eq!(out.describe(&space), "{r40,r41}");
  }

  #[test]
  fn test_always_interfere() {
    let (caps, space) = setup(Platform::XeHp);
    let b = DepSetBuilder::new(&caps, &space);
    let desc = InstDesc::new(Op::Mov, 1)
      .with_dst(Operand::grf(1, 0, Region::DST1, Type::UD))
      .with_src(Operand::direct(
        RegName::State,
        RegRef::new(0, 1),
        Region::SRC010,
        Type::UD,
      ));
    let inp = b.src_dep_set(ix(), &desc, InstIds::new()).unwrap();
    assert!(inp.has_sr);
    assert_eq!(inp.dep_type, DepType::ReadAlwaysInterfere);

    let desc = InstDesc::new(Op::Mov, 8)
      .with_dst(Operand {
        kind: OperandKind::Indirect {
          addr: RegRef::new(0, 2),
          region: Region::DST1,
          vxh: false,
        },
        ty: Type::F,
      })
      .with_src(Operand::grf(3, 0, Region::SRC881, Type::F));
    let out = b.dst_dep_set(ix(), &desc, InstIds::new()).unwrap();
    assert!(out.has_indirect);
    assert_eq!(out.dep_type, DepType::WriteAlwaysInterfere);
    assert_eq!(out.describe(&space), "{a0.4-5}");
  }

  #[test]
  fn test_full_grf_workarounds() {
    let (caps, space) = setup(Platform::XeHp);
    let b = DepSetBuilder::new(&caps, &space);
    let math = InstDesc::new(Op::Math(MathFc::Inv), 1)
      .with_dst(Operand::grf(5, 0, Region::DST1, Type::F))
      .with_src(Operand::grf(6, 0, Region::SRC010, Type::F));
    assert!(b.needs_read_suppression_wa(&math));
    let (_, out) = b.inst_dep_sets(ix(), &math, InstIds::new()).unwrap();
    assert_eq!(out.describe(&space), "{r5}");

    let (caps, space) = setup(Platform::XeHpc);
    let b = DepSetBuilder::new(&caps, &space);
    let mov = InstDesc::new(Op::Mov, 8)
      .with_dst(Operand::grf(13, 1, Region::new(0, 0, 2), Type::UB))
      .with_src(Operand::grf(50, 0, Region::new(1, 1, 0), Type::UW));
    let (inp, out) = b.inst_dep_sets(ix(), &mov, InstIds::new()).unwrap();
    assert_eq!(out.describe(&space), "{r13}");
    assert!(inp.describe(&space).contains("r13"));
  }
}
