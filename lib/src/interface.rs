/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The public interface: what a client must provide, and what it gets back.

use log::info;
use std::fmt;
use std::ops::Range;

use crate::analyzer::{Origin, SwsbAnalyzer};
use crate::dep_builder::DepSetBuilder;
use crate::dep_set::{AddressSpace, DepSet, InstIds};
use crate::post_process;

pub use crate::data_structures::{
  BlockIx, InstIx, Map, MyRange, Set, TypedIxVec,
};
pub use crate::dep_builder::classify;
pub use crate::dep_set::{DepClass, DepPipe};
pub use crate::inst::*;
pub use crate::platform::{
  PipeLatencies, Platform, PlatformCaps, RegGeometry, SwsbEncodeMode,
  SwsbOptions, MAX_SBID_COUNT, MAX_VALID_DISTANCE,
};
pub use crate::swsb::{Annotation, DistType, Swsb, SyncKind, TokenType};

//=============================================================================
// The client's kernel

/// A function, as seen by the pass: a sequence of blocks, each a contiguous
/// range of instructions.  The pass never looks inside `Inst` other than
/// through `describe`.
pub trait Kernel {
  type Inst: Clone + fmt::Debug;

  /// All the instructions, in layout order.
  fn insts(&self) -> &[Self::Inst];

  fn get_inst(&self, ix: InstIx) -> &Self::Inst {
    &self.insts()[ix.get() as usize]
  }

  /// The blocks, in layout order.
  fn blocks(&self) -> MyRange<BlockIx>;

  /// The instructions of `block`.  Blocks must tile `insts()` in order.
  fn block_insts(&self, block: BlockIx) -> MyRange<InstIx>;

  /// Decode `inst` into the operand view the analysis works on.
  fn describe(&self, inst: &Self::Inst) -> InstDesc;

  /// Make a new sync instruction of the given kind, carrying no annotation.
  fn gen_sync(&self, kind: SyncKind) -> Self::Inst;

  /// Store the computed annotation in `inst`.
  fn annotate(&self, inst: &mut Self::Inst, annotation: &Annotation);
}

//=============================================================================
// Results

/// Counters describing one run of the pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwsbStats {
  /// Instructions in the input.
  pub num_insts: u32,
  /// Sync instructions present in the output that weren't in the input.
  pub num_syncs_inserted: u32,
  /// Output instructions carrying a distance.
  pub num_dist_tokens: u32,
  /// Output instructions setting a scoreboard id.
  pub num_sbid_sets: u32,
  /// Times every id was in use and one had to be waited on and reused.
  pub num_sbid_evictions: u32,
  /// `sync.allrd`/`sync.allwr` pairs emitted.
  pub num_flushes: u32,
  pub num_dpas_macros: u32,
}

impl fmt::Display for SwsbStats {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(
      fmt,
      "{} insts, {} syncs inserted, {} distances, {} sbid sets, \
       {} evictions, {} flushes, {} dpas macros",
      self.num_insts,
      self.num_syncs_inserted,
      self.num_dist_tokens,
      self.num_sbid_sets,
      self.num_sbid_evictions,
      self.num_flushes,
      self.num_dpas_macros
    )
  }
}

/// The annotated kernel.
pub struct SwsbResult<K: Kernel> {
  /// The new instruction sequence: the original instructions, annotated,
  /// with sync instructions spliced in.
  pub insts: Vec<K::Inst>,

  /// The annotation of each instruction in `insts`.
  pub annotations: Vec<Annotation>,

  /// Start index of each block in `insts`, indexed by the original block
  /// index.  Clients use it to retarget branches.
  pub target_map: TypedIxVec<BlockIx, InstIx>,

  /// For each instruction in `insts`, the original instruction it is, or
  /// `None` for inserted syncs.
  pub orig_inst_map: Vec<Option<InstIx>>,

  pub stats: SwsbStats,
}

//=============================================================================
// Errors

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwsbError {
  /// An operand is malformed: a register beyond the end of its file, or a
  /// missing send or DPAS descriptor.
  Operand { inst: InstIx, reason: String },

  /// The opcode isn't available on the target platform.
  UnsupportedOp { inst: InstIx, op: Op },

  /// An `{Atomic}` chain is left open at the end of its block, or mixes in
  /// instructions that can't be write-combined.
  AtomicBlock { inst: InstIx, reason: String },

  /// The options don't describe a usable configuration.
  Config(String),
}

impl fmt::Display for SwsbError {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      SwsbError::Operand { inst, reason } => {
        write!(fmt, "malformed operand in {:?}: {}", inst, reason)
      }
      SwsbError::UnsupportedOp { inst, op } => write!(
        fmt,
        "{:?}: {} is not supported on this platform",
        inst,
        op.name()
      ),
      SwsbError::AtomicBlock { inst, reason } => {
        write!(fmt, "malformed atomic block at {:?}: {}", inst, reason)
      }
      SwsbError::Config(msg) => write!(fmt, "invalid configuration: {}", msg),
    }
  }
}

impl std::error::Error for SwsbError {}

//=============================================================================
// Entry points

/// Compute the software scoreboard annotations of `kernel`, and return the
/// annotated instruction sequence with the required sync instructions
/// inserted.
pub fn set_swsb<K: Kernel>(
  kernel: &K,
  opts: &SwsbOptions,
) -> Result<SwsbResult<K>, SwsbError> {
  let caps = opts.caps()?;
  info!(
    "set_swsb: begin, {} insts, {} blocks, platform {} ({:?}, {} ids)",
    kernel.insts().len(),
    kernel.blocks().len(),
    caps.platform,
    caps.mode,
    caps.sbid_count
  );

  let descs: Vec<InstDesc> =
    kernel.insts().iter().map(|inst| kernel.describe(inst)).collect();
  let blocks: Vec<MyRange<InstIx>> =
    kernel.blocks().into_iter().map(|b| kernel.block_insts(b)).collect();

  let mut analyzer = SwsbAnalyzer::new(&caps, &descs);
  let mut block_entries = analyzer.run(&blocks)?;
  let mut stats = analyzer.stats().clone();

  for entries in block_entries.iter_mut() {
    if caps.rmw_on_byte_dst {
      post_process::write_combined_blocks(&caps, &descs, entries)?;
    }
    post_process::remove_redundant_syncs(&descs, entries);
  }

  // Materialize.
  let mut insts = Vec::with_capacity(descs.len());
  let mut annotations = Vec::with_capacity(descs.len());
  let mut orig_inst_map = Vec::with_capacity(descs.len());
  let mut target_map = TypedIxVec::new();
  for entries in block_entries.iter() {
    target_map.push(InstIx::new(insts.len() as u32));
    for entry in entries {
      let annotation = Annotation { swsb: entry.swsb, atomic: entry.atomic };
      let (mut inst, orig) = match entry.origin {
        Origin::Inst(ix) => (kernel.get_inst(ix).clone(), Some(ix)),
        Origin::Sync(kind) => {
          stats.num_syncs_inserted += 1;
          (kernel.gen_sync(kind), None)
        }
      };
      if entry.swsb.has_dist() {
        stats.num_dist_tokens += 1;
      }
      if entry.swsb.token_type == TokenType::Set {
        stats.num_sbid_sets += 1;
      }
      kernel.annotate(&mut inst, &annotation);
      insts.push(inst);
      annotations.push(annotation);
      orig_inst_map.push(orig);
    }
  }

  info!("set_swsb: end, {}", stats);
  Ok(SwsbResult { insts, annotations, target_map, orig_inst_map, stats })
}

/// The registers an instruction reads and writes, as byte ranges of the
/// flattened register address space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstFootprint {
  pub reads: Vec<Range<u32>>,
  pub writes: Vec<Range<u32>>,
  pub pipe: DepPipe,
  pub class: DepClass,
  /// The footprint isn't exact (indirect addressing, special registers);
  /// the instruction has to synchronize with everything.
  pub imprecise: bool,
}

/// Compute the footprint of a single, non-DPAS-macro instruction the way the
/// pass sees it.  Useful for checking the pass's output independently.
pub fn inst_footprint(
  caps: &PlatformCaps,
  ix: InstIx,
  desc: &InstDesc,
) -> Result<InstFootprint, SwsbError> {
  let space = AddressSpace::new(&caps.geometry);
  let builder = DepSetBuilder::new(caps, &space);
  let (input, output) = builder.inst_dep_sets(ix, desc, InstIds::new())?;
  let ranges = |ds: &DepSet| -> Vec<Range<u32>> {
    ds.bits.runs().map(|(s, l)| s as u32..(s + l) as u32).collect()
  };
  Ok(InstFootprint {
    reads: ranges(&input),
    writes: ranges(&output),
    pipe: input.pipe,
    class: input.class,
    imprecise: input.has_indirect
      || input.has_sr
      || output.has_indirect
      || output.has_sr,
  })
}
