/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The dependency scheduler.
//!
//! Each block is walked in program order.  For every instruction (or DPAS
//! macro) the input and output footprints are built and looked up in the
//! bucket index.  A hit on an in-order producer becomes a distance, a hit on
//! an out-of-order producer becomes a wait on its scoreboard id.  Then the
//! instruction's own footprints are registered, an out-of-order instruction
//! takes an id, and in-order producers that are old enough to have retired
//! are dropped.
//!
//! Nothing is assumed about what's in flight when a block is entered: every
//! block starts from an empty state and drains what it started before it
//! ends.  The exception is a branch that writes a register, such as a call
//! saving its return address.  It leaves its block with that write still
//! in flight, so its footprint is carried into every block it can reach.

use log::{debug, trace, warn};
use smallvec::SmallVec;
use std::cmp::{max, min};

use crate::buckets::Buckets;
use crate::data_structures::{DepSetIx, InstIx, MyRange, TypedIxVec};
use crate::dep_builder::DepSetBuilder;
use crate::dep_set::{
  AddressSpace, DepClass, DepPipe, DepSet, DepType, InstIds,
};
use crate::dpas;
use crate::inst::{InstDesc, Op, OperandKind};
use crate::interface::{SwsbError, SwsbStats};
use crate::platform::{PlatformCaps, SwsbEncodeMode};
use crate::sbid::SbidPool;
use crate::swsb::{DistType, Swsb, SyncKind, TokenType};

//=============================================================================
// The output of the walk

/// Where an output instruction comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
  Inst(InstIx),
  Sync(SyncKind),
}

/// One instruction of the output, with its annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
  pub origin: Origin,
  pub swsb: Swsb,
  pub atomic: bool,
  /// A wait that must not be removed as redundant.
  pub pinned: bool,
}

impl Entry {
  pub fn inst(ix: InstIx, swsb: Swsb, atomic: bool) -> Self {
    Self { origin: Origin::Inst(ix), swsb, atomic, pinned: false }
  }

  pub fn sync(kind: SyncKind, swsb: Swsb) -> Self {
    Self { origin: Origin::Sync(kind), swsb, atomic: false, pinned: false }
  }

  pub fn nop(swsb: Swsb) -> Self {
    Self::sync(SyncKind::Nop, swsb)
  }
}

//=============================================================================
// Analyzer state

/// An id the current instruction has to wait on, and whether it waits for
/// the producer's reads or its writes.
#[derive(Clone, Copy, Debug)]
struct ActiveSbid {
  sbid: u32,
  dep_type: DepType,
}

type ActiveSbids = SmallVec<[ActiveSbid; 4]>;

/// An in-order producer still within its pipe's latency window.
#[derive(Clone, Copy, Debug)]
struct TrackerNode {
  input: DepSetIx,
  output: DepSetIx,
}

/// State for the math predication workaround: the instruction right after a
/// math with a different predication control must also check against the
/// math's whole destination registers.
#[derive(Clone, Copy, Debug, Default)]
struct MathWa {
  inst: Option<InstIx>,
  ids: InstIds,
  sbid: Option<u32>,
  previous_is_math: bool,
}

pub struct SwsbAnalyzer<'a> {
  caps: &'a PlatformCaps,
  descs: &'a [InstDesc],
  space: AddressSpace,

  // Per block state.
  arena: TypedIxVec<DepSetIx, DepSet>,
  buckets: Buckets,
  pool: SbidPool,
  tracker: Vec<TrackerNode>,
  ids: InstIds,
  math_wa: MathWa,

  /// Syncs to be emitted before the instruction being processed.
  pending: Vec<Entry>,

  stats: SwsbStats,
}

impl<'a> SwsbAnalyzer<'a> {
  pub fn new(caps: &'a PlatformCaps, descs: &'a [InstDesc]) -> Self {
    let space = AddressSpace::new(&caps.geometry);
    let buckets = Buckets::new(space.total_buckets);
    Self {
      caps,
      descs,
      space,
      arena: TypedIxVec::new(),
      buckets,
      pool: SbidPool::new(caps.sbid_count),
      tracker: Vec::new(),
      ids: InstIds::new(),
      math_wa: MathWa::default(),
      pending: Vec::new(),
      stats: SwsbStats {
        num_insts: descs.len() as u32,
        ..SwsbStats::default()
      },
    }
  }

  pub fn stats(&self) -> &SwsbStats {
    &self.stats
  }

  fn builder(&self) -> DepSetBuilder {
    DepSetBuilder::new(self.caps, &self.space)
  }

  fn single_pipe(&self) -> bool {
    self.caps.mode == SwsbEncodeMode::SingleDistPipe
  }

  /// The distance type that waits on every in-order pipe.
  fn all_pipes(&self) -> DistType {
    if self.single_pipe() {
      DistType::RegDist
    } else {
      DistType::RegDistAll
    }
  }

  fn desc_of(&self, ix: InstIx) -> &'a InstDesc {
    let descs: &'a [InstDesc] = self.descs;
    &descs[ix.get() as usize]
  }

  //---------------------------------------------------------------------------
  // The walk

  /// Analyze every block, returning the annotated instructions of each.
  pub fn run(
    &mut self,
    blocks: &[MyRange<InstIx>],
  ) -> Result<Vec<Vec<Entry>>, SwsbError> {
    let carried = self.branch_writes(blocks);
    let mut out = Vec::with_capacity(blocks.len());
    for (n, block) in blocks.iter().enumerate() {
      let is_last_block = n + 1 == blocks.len();
      out.push(self.analyze_block(*block, &carried[n], is_last_block)?);
    }
    Ok(out)
  }

  /// For each block, the register writing branches that can transfer
  /// control to it.  A labelled branch reaches its targets and, when it
  /// returns, the next block.  Without a label it could land anywhere.
  fn branch_writes(&self, blocks: &[MyRange<InstIx>]) -> Vec<Vec<InstIx>> {
    let mut carried = vec![Vec::new(); blocks.len()];
    for (n, block) in blocks.iter().enumerate() {
      if block.is_empty() {
        continue;
      }
      let ix = block.last();
      let desc = self.desc_of(ix);
      if !desc.op.is_branch() || !desc.has_dst() {
        continue;
      }
      let mut targets: Vec<usize> = desc
        .srcs
        .iter()
        .filter_map(|src| match src.kind {
          OperandKind::Label(t) if (t as usize) < blocks.len() => {
            Some(t as usize)
          }
          _ => None,
        })
        .collect();
      if targets.is_empty() {
        targets.extend(0..blocks.len());
      } else if n + 1 < blocks.len() {
        targets.push(n + 1);
      }
      for t in targets {
        if !carried[t].contains(&ix) {
          debug!("branch_writes: {:?} reaches block {}", ix, t);
          carried[t].push(ix);
        }
      }
    }
    carried
  }

  /// Register the in-order footprints of the branches in `carried` as if
  /// they were the instruction just before the block.
  fn carry_in(&mut self, carried: &[InstIx]) -> Result<(), SwsbError> {
    let mut pipe = None;
    for &ix in carried {
      let desc = self.desc_of(ix);
      let (input, output) = self.builder().inst_dep_sets(ix, desc, self.ids)?;
      // Anything else was drained before the branch.
      if !input.is_in_order() {
        continue;
      }
      trace!("  carried in: {}", output.describe(&self.space));
      pipe = Some(input.pipe);
      let in_ix = self.arena.push(input);
      let out_ix = self.arena.push(output);
      self.arena[in_ix].companion = Some(out_ix);
      self.arena[out_ix].companion = Some(in_ix);
      self.track(in_ix, out_ix);
      self.add_to_buckets(in_ix, false);
      self.add_to_buckets(out_ix, false);
    }
    // They all issued right before the block.
    if let Some(pipe) = pipe {
      let single_pipe = self.single_pipe();
      self.ids.advance(pipe, single_pipe);
    }
    Ok(())
  }

  fn reset_block(&mut self) {
    self.buckets.clear();
    self.arena.clear();
    self.tracker.clear();
    self.pool.reset();
    self.ids.reset_in_order();
    self.math_wa = MathWa::default();
    self.pending.clear();
  }

  fn analyze_block(
    &mut self,
    block: MyRange<InstIx>,
    carried: &[InstIx],
    is_last_block: bool,
  ) -> Result<Vec<Entry>, SwsbError> {
    self.reset_block();
    self.carry_in(carried)?;
    let insts: Vec<InstIx> = block.into_iter().collect();
    let mut entries = Vec::with_capacity(insts.len());
    trace!("analyze_block: {:?}", block);

    let mut k = 0;
    while k < insts.len() {
      let ix = insts[k];
      let desc = self.desc_of(ix);
      self.ids.global += 1;
      // Illegal instructions take part in nothing and carry nothing.
      if desc.op == Op::Illegal {
        entries.push(Entry::inst(ix, Swsb::default(), desc.opts.atomic));
        k += 1;
        continue;
      }
      k += self.analyze_inst(&insts[k..], is_last_block, &mut entries)?;
    }

    let last = match insts.last() {
      Some(&last) => self.desc_of(last),
      None => return Ok(entries),
    };
    // Branches flush for themselves, and EOT sends need no flushing.
    if !last.op.is_branch() && !last.is_eot_send() {
      self.flush_sbids();
      if is_last_block || self.has_live_in_order(None) {
        self.insert_barrier();
      }
      entries.extend(self.pending.drain(..));
    }
    Ok(entries)
  }

  /// Analyze the instruction at `rest[0]` (or the DPAS macro starting
  /// there), appending it and whatever syncs it needs to `entries`.
  /// Returns the number of instructions consumed.
  fn analyze_inst(
    &mut self,
    rest: &[InstIx],
    is_last_block: bool,
    entries: &mut Vec<Entry>,
  ) -> Result<usize, SwsbError> {
    let ix = rest[0];
    let desc = self.desc_of(ix);

    if self.math_wa.inst.is_some() {
      self.math_wa.previous_is_math = true;
    }
    if desc.op.is_math() {
      // Only the last of consecutive maths matters.
      self.math_wa =
        MathWa { inst: Some(ix), ids: self.ids, ..MathWa::default() };
    }

    let (members, input, output) = if desc.op.is_dpas() {
      let m = dpas::form_macro(&self.builder(), self.descs, rest, self.ids)?;
      if m.members.len() > 1 {
        self.stats.num_dpas_macros += 1;
      }
      (m.members, m.input, m.output)
    } else {
      let (input, output) = self.builder().inst_dep_sets(ix, desc, self.ids)?;
      (vec![ix], input, output)
    };
    let last = members[members.len() - 1];
    let last_desc = self.desc_of(last);

    let imprecise = input.has_indirect
      || input.has_sr
      || output.has_indirect
      || output.has_sr;
    let pipe = input.pipe;
    let in_order = input.is_in_order();
    let out_of_order = output.is_out_of_order();
    let class = output.class;

    let in_ix = self.arena.push(input);
    let out_ix = self.arena.push(output);
    self.arena[in_ix].companion = Some(out_ix);
    self.arena[out_ix].companion = Some(in_ix);

    let mut swsb = Swsb::default();
    if imprecise {
      // We can't tell what is touched: wait for everything.
      debug!("{:?}: imprecise footprint, synchronizing everything", ix);
      if !self.flush_sbids() && out_of_order {
        self.insert_flush_syncs();
      }
      if self.has_live_in_order(None) {
        swsb = Swsb::dist(self.all_pipes(), 1);
      }
      self.track(in_ix, out_ix);
      self.add_to_buckets(in_ix, true);
      self.add_to_buckets(out_ix, true);
      if out_of_order {
        let id = self.assign_sbid(in_ix, out_ix, &mut swsb, false, desc, class);
        if desc.op.is_math() {
          self.math_wa.sbid = Some(id);
        }
      }
      if self.math_wa.previous_is_math {
        self.math_wa = MathWa::default();
      }
    } else {
      let wa = self.math_wa_dep_set(desc)?;

      let mut active = ActiveSbids::new();
      let mut need_sync = false;
      self.calculate_dependence(in_ix, &mut swsb, &mut active, &mut need_sync);
      self.calculate_dependence(out_ix, &mut swsb, &mut active, &mut need_sync);

      if self.math_wa.previous_is_math {
        if let Some(wa) = wa {
          self.evict(wa);
        }
        self.math_wa = MathWa::default();
      }

      self.process_active(&mut swsb, &active, desc, class);
      if out_of_order {
        let id =
          self.assign_sbid(in_ix, out_ix, &mut swsb, need_sync, desc, class);
        if desc.op.is_math() {
          self.math_wa.sbid = Some(id);
        }
      }

      self.track(in_ix, out_ix);
      // An EOT send ends the thread; nothing can depend on it.
      if !last_desc.is_eot_send() {
        self.add_to_buckets(in_ix, false);
        self.add_to_buckets(out_ix, false);
      }
    }
    if in_order {
      let single_pipe = self.single_pipe();
      self.ids.advance(pipe, single_pipe);
    }

    // Branches leave the block: drain everything before them.  The
    // branch's own write is picked up by the blocks it reaches.
    if last_desc.op.is_branch() {
      self.flush_sbids();
      let terminates = rest.len() == members.len();
      if terminates
        && (is_last_block || self.has_live_in_order(Some(in_ix)))
      {
        self.insert_barrier();
      }
    }

    trace!("{:?}: {}", ix, swsb);
    entries.extend(self.pending.drain(..));
    if members.len() == 1 {
      entries.push(Entry::inst(ix, swsb, desc.opts.atomic));
    } else {
      // The first member waits, the last one takes the id.
      let n = members.len();
      for (i, &m) in members.iter().enumerate() {
        let s = if i == 0 {
          Swsb::dist(swsb.dist_type, swsb.min_dist)
        } else if i == n - 1 {
          Swsb::token(swsb.token_type, swsb.sbid)
        } else {
          Swsb::default()
        };
        entries.push(Entry::inst(m, s, i + 1 < n));
      }
    }
    Ok(members.len())
  }

  /// Register the math workaround footprint, if the current instruction
  /// needs it.
  fn math_wa_dep_set(
    &mut self,
    desc: &InstDesc,
  ) -> Result<Option<DepSetIx>, SwsbError> {
    if !self.math_wa.previous_is_math {
      return Ok(None);
    }
    let math_ix = match self.math_wa.inst {
      Some(ix) => ix,
      None => return Ok(None),
    };
    let math = self.desc_of(math_ix);
    let ctrl = |d: &InstDesc| d.pred.map(|p| p.ctrl);
    if ctrl(math) == ctrl(desc) {
      return Ok(None);
    }
    let mut ds = self.builder().dst_dep_set_full_grf(
      math_ix,
      math,
      self.math_wa.ids,
      false,
    )?;
    ds.sbid = self.math_wa.sbid;
    trace!("  math workaround footprint {}", ds.describe(&self.space));
    let wa = self.arena.push(ds);
    self.add_to_buckets(wa, true);
    Ok(Some(wa))
  }

  //---------------------------------------------------------------------------
  // Hazard detection

  /// Check `cur` against every live producer sharing a bucket with it,
  /// accumulating distances in `swsb` and ids to wait on in `active`.
  fn calculate_dependence(
    &mut self,
    cur: DepSetIx,
    swsb: &mut Swsb,
    active: &mut ActiveSbids,
    need_sync: &mut bool,
  ) {
    let cur_buckets = self.arena[cur].buckets.clone();
    let cur_type = self.arena[cur].dep_type;
    let cur_pipe = self.arena[cur].pipe;
    let bucket_bytes = self.space.bucket_bytes;

    for &bucket in cur_buckets.iter() {
      // Youngest first.
      for slot in (0..self.buckets.num_slots(bucket)).rev() {
        let dep = match self.buckets.get(bucket, slot) {
          Some(dep) => dep,
          None => continue,
        };

        if self.arena[dep].dep_type.is_always_interfere() {
          if self.arena[dep].is_out_of_order() {
            self.set_sbid_dependency(dep, cur, active, need_sync);
          } else {
            swsb.dist_type = self.all_pipes();
            swsb.min_dist = 1;
            self.buckets.clear_slot(bucket, slot);
          }
        }

        let prev = &self.arena[dep];
        let curr = &self.arena[cur];
        if !prev.bits.intersects(&curr.bits) {
          continue;
        }
        let prev_type = prev.dep_type;
        let prev_class = prev.class;

        // Sends to different units, or to an unknown one, may complete
        // out of order with each other.
        let send_in_diff_pipe = prev.op.is_send()
          && curr.op.is_send()
          && (prev.pipe == DepPipe::SendUnknown
            || cur_pipe == DepPipe::SendUnknown
            || prev.sfid.is_none()
            || prev.sfid != curr.sfid);
        let diff_pipe = cur_pipe != prev.pipe || send_in_diff_pipe;

        let mut raw = cur_type.is_read() && prev_type.is_write();
        let waw = cur_type.is_write() && prev_type.is_write() && diff_pipe;
        let war = cur_type.is_write() && prev_type.is_read() && diff_pipe;
        let waw_out_of_order = cur_type.is_write()
          && prev_type.is_write()
          && prev_class == DepClass::OutOfOrder;
        if raw && cur_pipe == prev.pipe && self.acc_flag_only(prev, curr) {
          // The pipe forwards these itself.
          raw = false;
        }
        if !(raw || waw || war || waw_out_of_order) {
          continue;
        }

        let start = (bucket * bucket_bytes) as usize;
        if !prev.bits.test_any(start, bucket_bytes as usize) {
          self.buckets.clear_slot(bucket, slot);
        }

        match prev_class {
          DepClass::InOrder => {
            self.set_distance_dependency(dep, swsb, waw, cur_pipe)
          }
          DepClass::OutOfOrder => {
            self.set_sbid_dependency(dep, cur, active, need_sync)
          }
          // Implied by hardware.
          DepClass::Other => {}
        }
      }
    }
  }

  /// Is the overlap between `prev` and `curr` confined to the accumulators
  /// and flags?
  fn acc_flag_only(&self, prev: &DepSet, curr: &DepSet) -> bool {
    let s = &self.space;
    let hit = |start: u32, len: u32| {
      prev.bits.intersects_in(&curr.bits, start as usize, len as usize)
    };
    let acc = hit(s.acc_start, s.acc_len);
    let flag = hit(s.flag_start, s.flag_len);
    let other = hit(s.grf_start, s.grf_len)
      || hit(s.a_start, s.a_len)
      || hit(s.special_start, s.special_len);
    (acc || flag) && !other
  }

  fn set_distance_dependency(
    &mut self,
    dep: DepSetIx,
    swsb: &mut Swsb,
    is_waw: bool,
    cur_pipe: DepPipe,
  ) {
    let max_dist = self.caps.max_distance;
    let prev = &self.arena[dep];
    let prev_pipe = prev.pipe;
    let prev_ids = prev.ids;

    if self.single_pipe() {
      // A short write is always done before a later write completes.
      let exempt = is_waw
        && prev_pipe == DepPipe::Short
        && (cur_pipe == DepPipe::Short || cur_pipe == DepPipe::Long);
      if exempt {
        // Still live for whatever the later write doesn't cover.
        return;
      }
      let now = self.ids.in_order;
      let mut d = max(now.saturating_sub(prev_ids.in_order), 1);
      if swsb.min_dist != 0 {
        d = min(swsb.min_dist, d);
      }
      swsb.min_dist = min(d, max_dist);
      swsb.dist_type = DistType::RegDist;
    } else {
      let (now, then, dist_type) = match prev_pipe {
        DepPipe::Float => {
          (self.ids.float_pipe, prev_ids.float_pipe, DistType::RegDistFloat)
        }
        DepPipe::Integer => {
          (self.ids.int_pipe, prev_ids.int_pipe, DistType::RegDistInt)
        }
        DepPipe::Long64 => {
          (self.ids.long_pipe, prev_ids.long_pipe, DistType::RegDistLong)
        }
        DepPipe::MathInOrder => {
          (self.ids.math_pipe, prev_ids.math_pipe, DistType::RegDistMath)
        }
        _ => (self.ids.in_order, prev_ids.in_order, DistType::RegDistAll),
      };
      let mut d = max(now.saturating_sub(then), 1);
      if swsb.has_dist() {
        d = min(swsb.min_dist, d);
        if swsb.dist_type != dist_type {
          swsb.dist_type = DistType::RegDistAll;
        }
      } else {
        swsb.dist_type = dist_type;
      }
      swsb.min_dist = min(d, max_dist);
    }

    // Both halves of an in-order producer are done once it is waited on,
    // except that a special register access must stay visible to the next
    // instruction.
    self.evict(dep);
    if let Some(companion) = self.arena[dep].companion {
      if !self.arena[companion].dep_type.is_always_interfere() {
        self.evict(companion);
      }
    }
  }

  fn set_sbid_dependency(
    &mut self,
    dep: DepSetIx,
    cur: DepSetIx,
    active: &mut ActiveSbids,
    need_sync: &mut bool,
  ) {
    let prev = &self.arena[dep];
    let curr = &self.arena[cur];
    let sbid = prev.sbid;
    let dep_type = prev.dep_type;
    match sbid {
      Some(id) if !self.pool.is_free(id) => {}
      _ => warn!(
        "{:?}: out-of-order producer {:?} holds no id ({:?})",
        curr.inst, prev.inst, sbid
      ),
    }
    // The instruction may be shot down in some channels; the id must then
    // be preserved in a sync of its own.
    if self.desc_of(curr.inst).pred.is_some()
      || curr.exec_size != prev.exec_size
      || curr.chan_off != prev.chan_off
    {
      *need_sync = true;
    }
    self.evict(dep);

    let sbid = match sbid {
      Some(id) => id,
      None => return,
    };
    match active.iter_mut().find(|a| a.sbid == sbid) {
      // A write takes longer than a read.
      Some(a) => {
        if dep_type.is_write() {
          a.dep_type = dep_type;
        }
      }
      None => active.push(ActiveSbid { sbid, dep_type }),
    }
  }

  /// Turn the ids the instruction waits on into tokens: the first goes on
  /// the instruction, the rest on syncs before it.
  fn process_active(
    &mut self,
    swsb: &mut Swsb,
    active: &ActiveSbids,
    desc: &InstDesc,
    class: DepClass,
  ) {
    for a in active.iter() {
      // Already waited on, or flushed.
      if self.pool.is_free(a.sbid) {
        continue;
      }
      let token_type = if a.dep_type.is_read() {
        TokenType::Src
      } else {
        // Once the write is done, so is everything else.
        self.release(a.sbid);
        TokenType::Dst
      };
      if !swsb.has_token() {
        swsb.token_type = token_type;
        swsb.sbid = a.sbid;
      } else {
        self.insert_nop(Swsb::token(token_type, a.sbid));
      }
    }
    self.adjust(swsb, desc, class, true);
  }

  //---------------------------------------------------------------------------
  // Scoreboard ids

  /// Give the out-of-order instruction owning `input` and `output` an id,
  /// and set it in `swsb`.
  fn assign_sbid(
    &mut self,
    input: DepSetIx,
    output: DepSetIx,
    swsb: &mut Swsb,
    need_sync: bool,
    desc: &InstDesc,
    class: DepClass,
  ) -> u32 {
    let id = match self.pool.allocate((input, output)) {
      Ok(id) => id,
      Err(victim) => {
        // Every id is in flight: wait for the oldest one and take it over.
        debug!("  all ids in use, reusing ${}", victim);
        self.stats.num_sbid_evictions += 1;
        let mut wait = Entry::nop(Swsb::token(TokenType::Dst, victim));
        wait.pinned = true;
        self.insert(wait);
        self.release(victim);
        self.pool.bind(victim, (input, output));
        victim
      }
    };
    self.arena[input].sbid = Some(id);
    self.arena[output].sbid = Some(id);
    debug_assert!(self.pool.num_bound() <= self.pool.count());
    trace!(
      "  ${}: {} of {} ids held",
      id,
      self.pool.num_bound(),
      self.pool.count()
    );

    if need_sync {
      // Keep an all-pipes @1 ahead of the token sync.
      if swsb.min_dist == 1
        && (swsb.dist_type == DistType::RegDist
          || swsb.dist_type == DistType::RegDistAll)
      {
        let dist = swsb.take_dist();
        self.insert_nop(dist);
      }
      self.insert_nop(Swsb::token(TokenType::Set, id));
    }
    if swsb.has_token() {
      let token = swsb.take_token();
      self.insert_nop(token);
    }
    swsb.token_type = TokenType::Set;
    swsb.sbid = id;
    self.adjust(swsb, desc, class, false);
    id
  }

  /// Free `id`, forgetting its owner's footprints.
  fn release(&mut self, id: u32) {
    if let Some((input, output)) = self.pool.release(id) {
      self.evict(input);
      self.evict(output);
    }
  }

  /// Release every id in flight, inserting `sync.allrd` and `sync.allwr`
  /// if there were any.  Returns whether it inserted them.
  fn flush_sbids(&mut self) -> bool {
    let bound = self.pool.bound_ids();
    for &id in bound.iter() {
      self.release(id);
    }
    if bound.is_empty() {
      return false;
    }
    self.insert_flush_syncs();
    true
  }

  fn insert_flush_syncs(&mut self) {
    self.stats.num_flushes += 1;
    self.insert(Entry::sync(SyncKind::AllRd, Swsb::default()));
    self.insert(Entry::sync(SyncKind::AllWr, Swsb::default()));
  }

  //---------------------------------------------------------------------------
  // Token validity

  /// Make `swsb` encodable on the current instruction, moving its distance
  /// or its token to a sync.
  fn adjust(
    &mut self,
    swsb: &mut Swsb,
    desc: &InstDesc,
    class: DepClass,
    prefer_move_sbid: bool,
  ) {
    let moved = swsb.split_invalid(
      self.caps.mode,
      class,
      desc.op.is_send(),
      prefer_move_sbid,
    );
    if let Some(moved) = moved {
      self.insert_nop(moved);
    }
  }

  //---------------------------------------------------------------------------
  // Retiring in-order producers

  /// Record an in-order producer, and drop the ones of the same pipe that
  /// are old enough to have retired.
  fn track(&mut self, input: DepSetIx, output: DepSetIx) {
    if !self.arena[input].is_in_order() {
      return;
    }
    self.tracker.push(TrackerNode { input, output });

    let single_pipe = self.single_pipe();
    let pipe_id = |ds: &DepSet| {
      if single_pipe {
        ds.ids.in_order
      } else {
        ds.ids.pipe_counter(ds.pipe).unwrap_or(ds.ids.in_order)
      }
    };
    let new_pipe = self.arena[input].pipe;
    let new_id = pipe_id(&self.arena[input]);
    let latency = match new_pipe {
      DepPipe::Long64 => self.caps.latencies.long64,
      DepPipe::MathInOrder => self.caps.latencies.math_in_order,
      _ => self.caps.latencies.in_order,
    };

    let arena = &self.arena;
    let mut expired = Vec::new();
    self.tracker.retain(|node| {
      let ds = &arena[node.input];
      if node.input == input || ds.pipe != new_pipe {
        return true;
      }
      if new_id.saturating_sub(pipe_id(ds)) >= latency {
        expired.push(*node);
        return false;
      }
      true
    });
    for node in expired {
      trace!("  retired {:?}", self.arena[node.input].inst);
      self.evict(node.input);
      self.evict(node.output);
    }
  }

  /// Are any in-order producers still live, other than `except`'s?
  fn has_live_in_order(&self, except: Option<DepSetIx>) -> bool {
    self.tracker.iter().any(|node| {
      Some(node.input) != except
        && (!self.arena[node.input].buckets.is_empty()
          || !self.arena[node.output].buckets.is_empty())
    })
  }

  //---------------------------------------------------------------------------
  // Buckets

  fn add_to_buckets(&mut self, ix: DepSetIx, with_special: bool) {
    let special = self.space.special_bucket();
    let ds = &self.arena[ix];
    // The special bucket only holds producers that everything depends on.
    let with_special = with_special || ds.dep_type.is_always_interfere();
    for &b in ds.buckets.iter() {
      if b == special && !with_special {
        continue;
      }
      self.buckets.add(b, ix);
    }
  }

  /// Forget a producer's footprint.
  fn evict(&mut self, ix: DepSetIx) {
    let buckets = std::mem::take(&mut self.arena[ix].buckets);
    self.buckets.remove(&buckets, ix);
    self.arena[ix].reset();
  }

  //---------------------------------------------------------------------------
  // Inserted syncs

  fn insert(&mut self, entry: Entry) {
    debug!("  insert {:?} {}", entry.origin, entry.swsb);
    self.pending.push(entry);
  }

  fn insert_nop(&mut self, swsb: Swsb) {
    self.insert(Entry::nop(swsb));
  }

  /// Wait for every in-order pipe.
  fn insert_barrier(&mut self) {
    let barrier = Swsb::dist(self.all_pipes(), 1);
    self.insert_nop(barrier);
  }
}

//=============================================================================
// Tests

#[cfg(test)]
mod test {
  use super::*;
  use crate::inst::{
    MathFc, Operand, OperandKind, RegRef, Region, SendDesc, Sfid, Type,
  };
  use crate::platform::Platform;

  fn add(dst: u16, src0: u16, src1: u16) -> InstDesc {
    InstDesc::new(Op::Add, 8)
      .with_dst(Operand::grf(dst, 0, Region::DST1, Type::F))
      .with_src(Operand::grf(src0, 0, Region::SRC110, Type::F))
      .with_src(Operand::grf(src1, 0, Region::SRC110, Type::F))
  }

  fn add_d(dst: u16, src0: u16, src1: u16) -> InstDesc {
    InstDesc::new(Op::Add, 8)
      .with_dst(Operand::grf(dst, 0, Region::DST1, Type::D))
      .with_src(Operand::grf(src0, 0, Region::SRC110, Type::D))
      .with_src(Operand::grf(src1, 0, Region::SRC110, Type::D))
  }

  fn send(dst: u16, src: u16) -> InstDesc {
    InstDesc::new(Op::Send, 8)
      .with_dst(Operand::grf(dst, 0, Region::DST1, Type::UD))
      .with_src(Operand::grf(src, 0, Region::SRC110, Type::UD))
      .with_send(SendDesc {
        sfid: Some(Sfid::Dc0),
        dst_len: Some(1),
        src0_len: Some(1),
        src1_len: Some(0),
        desc_reg: None,
        ex_desc_reg: None,
      })
  }

  fn blocks_of(sizes: &[u32]) -> Vec<MyRange<InstIx>> {
    let mut start = 0;
    sizes
      .iter()
      .map(|&n| {
        let r = InstIx::new(start).dotdot(InstIx::new(start + n));
        start += n;
        r
      })
      .collect()
  }

  fn run_blocks(
    platform: Platform,
    descs: &[InstDesc],
    sizes: &[u32],
  ) -> (Vec<Vec<Entry>>, SwsbStats) {
    let caps = PlatformCaps::new(platform);
    let mut analyzer = SwsbAnalyzer::new(&caps, descs);
    let out = analyzer.run(&blocks_of(sizes)).unwrap();
    (out, analyzer.stats().clone())
  }

  fn run_one(platform: Platform, descs: &[InstDesc]) -> Vec<Entry> {
    let n = descs.len() as u32;
    let (mut out, _) = run_blocks(platform, descs, &[n]);
    out.remove(0)
  }

  fn inst(n: u32, swsb: Swsb) -> Entry {
    Entry::inst(InstIx::new(n), swsb, false)
  }

  fn dist(d: u32) -> Swsb {
    Swsb::dist(DistType::RegDist, d)
  }

  fn token(token_type: TokenType, sbid: u32) -> Swsb {
    Swsb::token(token_type, sbid)
  }

  #[test]
  fn test_distance_within_window() {
    let descs = vec![add(1, 2, 3), add(4, 5, 6), add(7, 1, 8)];
    let out = run_one(Platform::XeLp, &descs);
    assert_eq!(
      out,
      vec![
        inst(0, Swsb::default()),
        inst(1, Swsb::default()),
        inst(2, dist(2)),
        Entry::nop(dist(1)),
      ]
    );
  }

  #[test]
  fn test_distance_outside_window() {
    // Ten unrelated instructions retire the producer.
    let mut descs = vec![add(1, 2, 3)];
    for i in 0..10 {
      descs.push(add(20 + i, 40, 41));
    }
    descs.push(add(7, 1, 8));
    let out = run_one(Platform::XeLp, &descs);
    assert_eq!(out[11], inst(11, Swsb::default()));
  }

  #[test]
  fn test_send_then_use() {
    let descs = vec![send(10, 20), add(30, 10, 31)];
    let out = run_one(Platform::XeLp, &descs);
    assert_eq!(
      out,
      vec![
        inst(0, token(TokenType::Set, 0)),
        inst(1, token(TokenType::Dst, 0)),
        Entry::nop(dist(1)),
      ]
    );
  }

  #[test]
  fn test_write_after_send_read() {
    // Overwriting the send's payload waits for the send to have read it.
    let descs = vec![send(10, 20), add(20, 30, 31)];
    let out = run_one(Platform::XeLp, &descs);
    assert_eq!(out[1], inst(1, token(TokenType::Src, 0)));
  }

  #[test]
  fn test_sbid_exhaustion() {
    let descs: Vec<InstDesc> = (0..17).map(|i| send(10 + i, 100)).collect();
    let (out, stats) = run_blocks(Platform::XeLp, &descs, &[17]);
    let out = &out[0];
    for i in 0..16 {
      assert_eq!(out[i], inst(i as u32, token(TokenType::Set, i as u32)));
    }
    let mut wait = Entry::nop(token(TokenType::Dst, 0));
    wait.pinned = true;
    assert_eq!(out[16], wait);
    assert_eq!(out[17], inst(16, token(TokenType::Set, 0)));
    assert_eq!(stats.num_sbid_evictions, 1);
    // The block end drains everything.
    assert_eq!(out[18].origin, Origin::Sync(SyncKind::AllRd));
    assert_eq!(out[19].origin, Origin::Sync(SyncKind::AllWr));
  }

  #[test]
  fn test_math_read_suppression() {
    let math = InstDesc::new(Op::Math(MathFc::Exp), 1)
      .with_dst(Operand::grf(5, 0, Region::DST1, Type::F))
      .with_src(Operand::grf(20, 0, Region::SRC010, Type::F));
    let mov = InstDesc::new(Op::Mov, 1)
      .with_dst(Operand::grf(6, 0, Region::DST1, Type::F))
      .with_src(Operand::grf(5, 4, Region::SRC010, Type::F));
    let descs = vec![math, mov];

    // The math is taken to write all of r5.
    let out = run_one(Platform::XeHp, &descs);
    assert_eq!(out[0], inst(0, token(TokenType::Set, 0)));
    assert_eq!(out[1], inst(1, token(TokenType::Dst, 0)));

    // Without the workaround the two don't overlap.
    let out = run_one(Platform::XeLp, &descs);
    assert_eq!(out[1], inst(1, Swsb::default()));
  }

  #[test]
  fn test_block_isolation() {
    let descs = vec![send(10, 20), send(11, 21), send(12, 22), add(30, 10, 11)];
    let (out, stats) = run_blocks(Platform::XeLp, &descs, &[3, 1]);
    assert_eq!(out[0].len(), 5);
    assert_eq!(out[0][3].origin, Origin::Sync(SyncKind::AllRd));
    assert_eq!(out[0][4].origin, Origin::Sync(SyncKind::AllWr));
    assert_eq!(out[1][0], inst(3, Swsb::default()));
    assert_eq!(stats.num_flushes, 1);
  }

  #[test]
  fn test_multi_pipe_distances() {
    let descs = vec![
      add(1, 2, 3),
      add_d(4, 5, 6),
      add(7, 1, 8),
      add_d(9, 4, 1),
    ];
    let out = run_one(Platform::XeHp, &descs);
    // One float instruction back.
    assert_eq!(out[2], inst(2, Swsb::dist(DistType::RegDistFloat, 1)));
    // r4 is one integer instruction back; r1 was already waited on.
    assert_eq!(out[3], inst(3, Swsb::dist(DistType::RegDistInt, 1)));
    assert_eq!(out[4], Entry::nop(Swsb::dist(DistType::RegDistAll, 1)));
  }

  #[test]
  fn test_mixed_pipes_combine() {
    let descs = vec![add(1, 2, 3), add_d(4, 5, 6), add_d(9, 4, 1)];
    let out = run_one(Platform::XeHp, &descs);
    assert_eq!(out[2], inst(2, Swsb::dist(DistType::RegDistAll, 1)));
  }

  #[test]
  fn test_wait_and_distance_split() {
    // An integer distance can't share an instruction with a wait.
    let descs = vec![send(10, 20), add_d(4, 5, 6), add_d(9, 4, 10)];
    let out = run_one(Platform::XeHp, &descs);
    assert_eq!(out[2], Entry::nop(token(TokenType::Dst, 0)));
    assert_eq!(out[3], inst(2, Swsb::dist(DistType::RegDistInt, 1)));

    // Single pipe mode encodes both.
    let out = run_one(Platform::XeLp, &descs);
    let both = Swsb {
      dist_type: DistType::RegDist,
      min_dist: 1,
      token_type: TokenType::Dst,
      sbid: 0,
    };
    assert_eq!(out[2], inst(2, both));
  }

  #[test]
  fn test_indirect_flushes() {
    let indirect = InstDesc::new(Op::Mov, 8)
      .with_dst(Operand {
        kind: OperandKind::Indirect {
          addr: RegRef::new(0, 0),
          region: Region::DST1,
          vxh: false,
        },
        ty: Type::F,
      })
      .with_src(Operand::grf(40, 0, Region::SRC110, Type::F));
    let descs = vec![send(10, 20), indirect, add(50, 51, 52)];
    let out = run_one(Platform::XeLp, &descs);
    assert_eq!(out[0], inst(0, token(TokenType::Set, 0)));
    assert_eq!(out[1].origin, Origin::Sync(SyncKind::AllRd));
    assert_eq!(out[2].origin, Origin::Sync(SyncKind::AllWr));
    // Nothing in-order is in flight yet.
    assert_eq!(out[3], inst(1, Swsb::default()));
    // Everything after an indirect write waits for it.
    assert_eq!(out[4], inst(2, dist(1)));
  }

  #[test]
  fn test_indirect_waits_for_live_in_order() {
    let indirect = InstDesc::new(Op::Mov, 8)
      .with_dst(Operand::grf(40, 0, Region::DST1, Type::F))
      .with_src(Operand {
        kind: OperandKind::Indirect {
          addr: RegRef::new(0, 0),
          region: Region::SRC110,
          vxh: false,
        },
        ty: Type::F,
      });
    let descs = vec![add(1, 2, 3), indirect];
    let out = run_one(Platform::XeLp, &descs);
    assert_eq!(out[1], inst(1, dist(1)));
    let out = run_one(Platform::XeHp, &descs);
    assert_eq!(out[1], inst(1, Swsb::dist(DistType::RegDistAll, 1)));
  }

  #[test]
  fn test_terminating_branch() {
    let jmp = InstDesc::new(Op::Jmpi, 1)
      .with_src(Operand::imm(0, Type::D));
    let descs = vec![send(10, 20), add(1, 2, 3), jmp, add(4, 5, 6)];
    let (out, _) = run_blocks(Platform::XeLp, &descs, &[3, 1]);
    let kinds: Vec<Origin> = out[0].iter().map(|e| e.origin).collect();
    assert_eq!(
      kinds,
      vec![
        Origin::Inst(InstIx::new(0)),
        Origin::Inst(InstIx::new(1)),
        Origin::Sync(SyncKind::AllRd),
        Origin::Sync(SyncKind::AllWr),
        Origin::Sync(SyncKind::Nop),
        Origin::Inst(InstIx::new(2)),
      ]
    );
    assert_eq!(out[0][4].swsb, dist(1));
  }

  fn call(dst: u16, target: u32) -> InstDesc {
    InstDesc::new(Op::Call, 1)
      .with_dst(Operand::grf(dst, 0, Region::DST1, Type::D))
      .with_src(Operand { kind: OperandKind::Label(target), ty: Type::D })
  }

  #[test]
  fn test_call_write_reaches_next_block() {
    let descs = vec![call(8, 1), add_d(9, 8, 10)];
    let (out, _) = run_blocks(Platform::XeLp, &descs, &[1, 1]);
    assert_eq!(out[0], vec![inst(0, Swsb::default())]);
    assert_eq!(out[1][0], inst(1, dist(1)));

    // Branches run in the integer pipe.
    let (out, _) = run_blocks(Platform::XeHp, &descs, &[1, 1]);
    assert_eq!(out[1][0], inst(1, Swsb::dist(DistType::RegDistInt, 1)));
  }

  #[test]
  fn test_call_write_reaches_target_and_return() {
    let descs = vec![call(8, 2), add_d(9, 8, 10), add_d(11, 8, 12)];
    let (out, _) = run_blocks(Platform::XeLp, &descs, &[1, 1, 1]);
    assert_eq!(out[1][0], inst(1, dist(1)));
    assert_eq!(out[2][0], inst(2, dist(1)));

    // Reads of other registers don't wait.
    let descs = vec![call(8, 1), add_d(9, 7, 10)];
    let (out, _) = run_blocks(Platform::XeLp, &descs, &[1, 1]);
    assert_eq!(out[1][0], inst(1, Swsb::default()));
  }

  #[test]
  fn test_eot_needs_no_flush() {
    let mut eot = send(10, 20);
    eot.opts.eot = true;
    let descs = vec![send(11, 21), eot];
    let out = run_one(Platform::XeLp, &descs);
    assert_eq!(out.len(), 2);
  }
}
