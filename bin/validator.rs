/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Checks on test programs: that an input is well formed, and that an
//! annotated result really orders every GRF hazard it contains.

use std::ops::Range;

use swsb::{
  inst_footprint, BlockIx, DepClass, DepPipe, DistType, InstFootprint, InstIx,
  Op, OperandKind, PlatformCaps, Sfid, SwsbEncodeMode, SyncFc, TokenType,
};

use crate::test_framework::*;

//=============================================================================
// Input well-formedness

pub fn validate(program: &Program) -> Result<(), String> {
  let num_blocks = program.blocks.len();
  if num_blocks == 0 {
    return Err("no blocks".into());
  }

  // Blocks must tile the instructions, in order.
  let mut next = 0u32;
  for b in program.blocks.iter() {
    if b.start.get() != next {
      return Err(format!("block {} doesn't start at {}", b.name, next));
    }
    next = match b.start.get().checked_add(b.len) {
      Some(n) => n,
      None => return Err(format!("block {} is too long", b.name)),
    };
  }
  if next != program.insts.len() {
    return Err("blocks don't cover all instructions".into());
  }

  for (n, inst) in program.insts.iter().enumerate() {
    let d = &inst.desc;
    if !d.exec_size.is_power_of_two() || d.exec_size > 32 {
      return Err(format!("i{}: bad exec size {}", n, d.exec_size));
    }
    if d.op.is_send() && d.send.is_none() {
      return Err(format!("i{}: send without a descriptor", n));
    }
    if d.op.is_dpas() && d.dpas.is_none() {
      return Err(format!("i{}: dpas without a shape", n));
    }
    for src in d.srcs.iter() {
      if let OperandKind::Label(target) = src.kind {
        if target >= num_blocks {
          return Err(format!("i{}: branch to unknown block {}", n, target));
        }
      }
    }
  }
  Ok(())
}

//=============================================================================
// Annotation soundness

/// Per-pipe counts of issued in-order instructions.
#[derive(Clone, Copy, Debug, Default)]
struct Counters {
  in_order: u32,
  float: u32,
  int: u32,
  long: u32,
  math: u32,
}

impl Counters {
  /// Counters on entry to a block: one instruction, whatever branched or
  /// fell through to it, has issued before.
  fn entry() -> Self {
    Self { in_order: 1, float: 1, int: 1, long: 1, math: 1 }
  }

  fn of(&self, pipe: DepPipe, single_pipe: bool) -> u32 {
    if single_pipe {
      return self.in_order;
    }
    match pipe {
      DepPipe::Float => self.float,
      DepPipe::Integer => self.int,
      DepPipe::Long64 => self.long,
      DepPipe::MathInOrder => self.math,
      _ => self.in_order,
    }
  }

  fn advance(&mut self, pipe: DepPipe) {
    self.in_order += 1;
    match pipe {
      DepPipe::Float => self.float += 1,
      DepPipe::Integer => self.int += 1,
      DepPipe::Long64 => self.long += 1,
      DepPipe::MathInOrder => self.math += 1,
      _ => {}
    }
  }
}

fn dist_covers(dist_type: DistType, pipe: DepPipe) -> bool {
  match dist_type {
    DistType::NoDist => false,
    DistType::RegDist | DistType::RegDistAll => true,
    DistType::RegDistFloat => pipe == DepPipe::Float,
    DistType::RegDistInt => pipe == DepPipe::Integer,
    DistType::RegDistLong => pipe == DepPipe::Long64,
    DistType::RegDistMath => pipe == DepPipe::MathInOrder,
  }
}

fn latency(caps: &PlatformCaps, pipe: DepPipe) -> u32 {
  match pipe {
    DepPipe::Long64 => caps.latencies.long64,
    DepPipe::MathInOrder => caps.latencies.math_in_order,
    _ => caps.latencies.in_order,
  }
}

/// The GRF part of a footprint; other register files are either forwarded
/// by the pipes or handled conservatively by the pass.
fn grf_only(ranges: &[Range<u32>], grf_end: u32) -> Vec<Range<u32>> {
  ranges
    .iter()
    .filter(|r| r.start < grf_end)
    .map(|r| r.start..std::cmp::min(r.end, grf_end))
    .collect()
}

fn overlap(a: &[Range<u32>], b: &[Range<u32>]) -> bool {
  a.iter().any(|x| b.iter().any(|y| x.start < y.end && y.start < x.end))
}

#[derive(Clone)]
struct Producer {
  inst: InstIx,
  pipe: DepPipe,
  in_order: bool,
  /// In-order producers: the pipe's counter when issued.
  counter: u32,
  /// Out-of-order producers: the id they hold.
  sbid: u32,
  sfid: Option<Sfid>,
  reads: Vec<Range<u32>>,
  writes: Vec<Range<u32>>,
  /// Waited for until it read its sources.
  read_done: bool,
  /// Waited for until it completed.
  done: bool,
}

struct Consumer {
  pipe: DepPipe,
  sfid: Option<Sfid>,
  is_send: bool,
  reads: Vec<Range<u32>>,
  writes: Vec<Range<u32>>,
}

/// Could `cur` overtake `prev`?  Sends to different units may.
fn diff_pipe(prev: &Producer, cur: &Consumer) -> bool {
  let prev_is_send =
    prev.pipe == DepPipe::Send || prev.pipe == DepPipe::SendUnknown;
  let send_in_diff_pipe = prev_is_send
    && cur.is_send
    && (prev.pipe == DepPipe::SendUnknown
      || cur.pipe == DepPipe::SendUnknown
      || prev.sfid.is_none()
      || prev.sfid != cur.sfid);
  cur.pipe != prev.pipe || send_in_diff_pipe
}

struct BlockChecker<'a> {
  caps: &'a PlatformCaps,
  single_pipe: bool,
  grf_end: u32,
  counters: Counters,
  producers: Vec<Producer>,
  /// Members of a DPAS macro whose id is set by a later member.
  pending: Vec<Producer>,
}

impl<'a> BlockChecker<'a> {
  fn new(caps: &'a PlatformCaps) -> Self {
    Self {
      caps,
      single_pipe: caps.mode == SwsbEncodeMode::SingleDistPipe,
      grf_end: caps.geometry.grf_regs * caps.geometry.grf_bytes_per_reg,
      counters: Counters::entry(),
      producers: Vec::new(),
      pending: Vec::new(),
    }
  }

  /// Apply the waits carried by the instruction `inst`.
  fn wait(&mut self, inst: &Inst) -> Result<(), String> {
    let swsb = swsb_of(inst);
    if swsb.has_token() && swsb.sbid >= self.caps.sbid_count {
      return Err(format!("{}: id out of range", inst));
    }
    if swsb.has_dist() {
      let (counters, single_pipe) = (self.counters, self.single_pipe);
      for p in self.producers.iter_mut().filter(|p| p.in_order) {
        let now = counters.of(p.pipe, single_pipe);
        if dist_covers(swsb.dist_type, p.pipe)
          && now.saturating_sub(p.counter) >= swsb.min_dist
        {
          p.done = true;
        }
      }
    }
    for p in self.producers.iter_mut().filter(|p| !p.in_order) {
      let same = swsb.sbid == p.sbid;
      match swsb.token_type {
        // Taking an id over waits for its previous holder.
        TokenType::Dst | TokenType::Set if same => p.done = true,
        TokenType::Src if same => p.read_done = true,
        _ => {}
      }
      match inst.desc.op {
        Op::Sync(SyncFc::AllWr) => p.done = true,
        Op::Sync(SyncFc::AllRd) => p.read_done = true,
        _ => {}
      }
    }
    Ok(())
  }

  /// Check that `cur` is ordered after every producer it conflicts with.
  fn check(&self, inst: &Inst, cur: &Consumer) -> Result<(), String> {
    for p in self.producers.iter() {
      let raw = overlap(&cur.reads, &p.writes);
      if p.in_order {
        if p.done || self.expired(p) {
          continue;
        }
        let waw = overlap(&cur.writes, &p.writes)
          && diff_pipe(p, cur)
          && !self.short_write_first(p, cur);
        let war = overlap(&cur.writes, &p.reads) && diff_pipe(p, cur);
        if raw {
          return Err(format!(
            "{} reads what {:?} writes without a distance",
            inst, p.inst
          ));
        }
        if waw || war {
          return Err(format!(
            "{} overwrites what {:?} uses without a distance",
            inst, p.inst
          ));
        }
        continue;
      }
      let waw = overlap(&cur.writes, &p.writes);
      let war = overlap(&cur.writes, &p.reads) && diff_pipe(p, cur);
      if (raw || waw) && !p.done {
        return Err(format!(
          "{} conflicts with {:?} (${}) without waiting for it",
          inst, p.inst, p.sbid
        ));
      }
      if war && !p.done && !p.read_done {
        return Err(format!(
          "{} overwrites what {:?} (${}) reads without waiting for it",
          inst, p.inst, p.sbid
        ));
      }
    }
    Ok(())
  }

  fn expired(&self, p: &Producer) -> bool {
    let now = self.counters.of(p.pipe, self.single_pipe);
    now.saturating_sub(p.counter) >= latency(self.caps, p.pipe)
  }

  /// With a single distance pipe, a short write completes before any later
  /// short or long write is issued.
  fn short_write_first(&self, p: &Producer, cur: &Consumer) -> bool {
    self.single_pipe
      && p.pipe == DepPipe::Short
      && (cur.pipe == DepPipe::Short || cur.pipe == DepPipe::Long)
  }

  /// Check the end of a block, returning the in-order writes still in
  /// flight when it is left.  Their sources have been read by then.
  fn finish(
    &self,
    block: &Block,
    last: Option<&Inst>,
  ) -> Result<Vec<Producer>, String> {
    // The thread ends there.
    if let Some(last) = last {
      if last.desc.is_eot_send() {
        return Ok(Vec::new());
      }
    }
    if let Some(p) = self.producers.iter().find(|p| !p.in_order && !p.done) {
      return Err(format!(
        "{:?} (${}) still in flight at the end of block {}",
        p.inst, p.sbid, block.name
      ));
    }
    Ok(
      self
        .producers
        .iter()
        .filter(|p| p.in_order && !p.done && !self.expired(p))
        .filter(|p| !p.writes.is_empty())
        .map(|p| Producer {
          counter: 0,
          reads: Vec::new(),
          ..p.clone()
        })
        .collect(),
    )
  }
}

/// The blocks control can reach when leaving `block` through `last`.
fn successors(
  program: &Program,
  block: usize,
  last: Option<&Inst>,
) -> Vec<usize> {
  let num_blocks = program.blocks.len() as usize;
  let mut succs = Vec::new();
  if let Some(last) = last {
    if last.desc.is_eot_send() {
      return succs;
    }
    if last.desc.op.is_branch() {
      for src in last.desc.srcs.iter() {
        match src.kind {
          OperandKind::Label(t) if (t as usize) < num_blocks => {
            succs.push(t as usize)
          }
          _ => {}
        }
      }
      if succs.is_empty() {
        return (0..num_blocks).collect();
      }
    }
  }
  if block + 1 < num_blocks {
    succs.push(block + 1);
  }
  succs
}

/// Check that the annotations of `result`, an annotated program, order every
/// GRF hazard.  Instructions with an imprecise footprint are skipped, as are
/// the later members of write-combined chains; DPAS footprints are
/// approximated by their operand regions.
///
/// In-order writes still in flight when a block is left are checked against
/// every block control can reach from there.  A block is checked again
/// whenever a new such write reaches it.
pub fn check_annotations(
  result: &Program,
  caps: &PlatformCaps,
) -> Result<(), String> {
  let num_blocks = result.blocks.len() as usize;
  let mut carried: Vec<Vec<Producer>> = vec![Vec::new(); num_blocks];
  let mut dirty = vec![true; num_blocks];
  while let Some(n) = dirty.iter().position(|&d| d) {
    dirty[n] = false;
    let (last, out) = check_block(result, caps, n, &carried[n])?;
    for t in successors(result, n, last) {
      for p in out.iter() {
        if !carried[t].iter().any(|q| q.inst == p.inst) {
          carried[t].push(p.clone());
          dirty[t] = true;
        }
      }
    }
  }
  Ok(())
}

/// Check block `block` of `result`, entered with the writes in `carried` in
/// flight.  Returns its last instruction and the writes it leaves in flight.
fn check_block<'r>(
  result: &'r Program,
  caps: &PlatformCaps,
  block: usize,
  carried: &[Producer],
) -> Result<(Option<&'r Inst>, Vec<Producer>), String> {
  let b = &result.blocks[BlockIx::new(block as u32)];
  let mut checker = BlockChecker::new(caps);
  checker.producers.extend(carried.iter().cloned());
  let mut in_chain = false;
  let mut last = None;
  for n in b.start.get()..b.start.get() + b.len {
    let ix = InstIx::new(n);
    let inst = &result.insts[ix];
    let desc = &inst.desc;
    let swsb = swsb_of(inst);

    // Nothing out-of-order is in flight on entry.
    if n == b.start.get()
      && ((swsb.has_dist() && carried.is_empty())
        || swsb.token_type == TokenType::Src
        || swsb.token_type == TokenType::Dst)
    {
      return Err(format!("block {} starts with a wait: {}", b.name, inst));
    }

    checker.wait(inst)?;
    if desc.op.is_sync() || desc.op == Op::Illegal {
      continue;
    }
    last = Some(inst);

    let fp: InstFootprint = match inst_footprint(caps, ix, desc) {
      Ok(fp) => fp,
      Err(e) => return Err(format!("{}: {}", inst, e)),
    };
    let atomic = inst.annotation.atomic || desc.opts.atomic;
    let cur = Consumer {
      pipe: fp.pipe,
      sfid: desc.send.and_then(|s| s.sfid),
      is_send: desc.op.is_send(),
      reads: grf_only(&fp.reads, checker.grf_end),
      writes: grf_only(&fp.writes, checker.grf_end),
    };
    if !fp.imprecise && !in_chain {
      checker.check(inst, &cur)?;
    }
    in_chain = atomic && !desc.op.is_dpas();

    let in_order = fp.class == DepClass::InOrder;
    let pipe_counter = checker.counters.of(fp.pipe, checker.single_pipe);
    if in_order {
      checker.counters.advance(fp.pipe);
    }
    if fp.imprecise || fp.class == DepClass::Other {
      continue;
    }
    let producer = Producer {
      inst: ix,
      pipe: fp.pipe,
      in_order,
      counter: pipe_counter,
      sbid: swsb.sbid,
      sfid: cur.sfid,
      reads: cur.reads,
      writes: cur.writes,
      read_done: false,
      done: false,
    };
    if in_order {
      checker.producers.push(producer);
    } else if swsb.token_type == TokenType::Set {
      let sbid = swsb.sbid;
      for mut p in checker.pending.drain(..) {
        p.sbid = sbid;
        checker.producers.push(p);
      }
      checker.producers.push(producer);
    } else if atomic {
      checker.pending.push(producer);
    } else {
      return Err(format!("{}: out-of-order without an id", inst));
    }
  }
  if let Some(p) = checker.pending.first() {
    return Err(format!("{:?}: atomic chain without an id", p.inst));
  }
  let out = checker.finish(b, last)?;
  Ok((last, out))
}

#[test]
fn test_call_write_needs_a_distance() {
  use swsb::{Platform, Swsb, SwsbOptions};
  let caps = SwsbOptions::new(Platform::XeLp).caps().unwrap();
  let mut p = Program::new("call");
  p.block("entry", vec![i_call(8, BlockIx::new(1))]);
  p.block("next", vec![i_addi(8, 9, 8, 10)]);
  assert!(check_annotations(&p, &caps).is_err());

  p.insts[InstIx::new(1)].annotation.swsb = Swsb::dist(DistType::RegDist, 1);
  check_annotations(&p, &caps).unwrap();
}

#[test]
fn test_in_order_overwrite_across_pipes() {
  use swsb::{Platform, Swsb, SwsbOptions};
  let caps = SwsbOptions::new(Platform::XeHp).caps().unwrap();
  let mut p = Program::new("overwrite");
  p.block("entry", vec![i_add(8, 1, 2, 3), i_addi(8, 1, 4, 5)]);
  assert!(check_annotations(&p, &caps).is_err());

  p.insts[InstIx::new(1)].annotation.swsb =
    Swsb::dist(DistType::RegDistFloat, 1);
  check_annotations(&p, &caps).unwrap();
}
