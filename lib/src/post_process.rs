/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Clean-ups run over each annotated block after the analysis.

use log::debug;

use crate::analyzer::{Entry, Origin};
use crate::data_structures::{InstIx, Set};
use crate::dep_builder::{classify, has_byte_grf_dst};
use crate::dep_set::DepClass;
use crate::inst::{InstDesc, Op, SyncFc};
use crate::interface::SwsbError;
use crate::platform::{PlatformCaps, SwsbEncodeMode};
use crate::swsb::{Swsb, SyncKind, TokenType};

fn desc_of<'a>(descs: &'a [InstDesc], entry: &Entry) -> Option<&'a InstDesc> {
  match entry.origin {
    Origin::Inst(ix) => Some(&descs[ix.get() as usize]),
    Origin::Sync(_) => None,
  }
}

fn is_sync_nop(descs: &[InstDesc], entry: &Entry) -> bool {
  match desc_of(descs, entry) {
    Some(desc) => desc.op == Op::Sync(SyncFc::Nop),
    None => entry.origin == Origin::Sync(SyncKind::Nop),
  }
}

//=============================================================================
// Write-combined atomic blocks

/// Byte writes that the hardware may combine into one register write when
/// they're chained with `{Atomic}`.
fn is_write_combined(desc: &InstDesc) -> bool {
  (desc.op == Op::Mov || desc.op == Op::Srnd) && has_byte_grf_dst(desc)
}

/// Add `swsb` to the annotation of `target`, putting whatever doesn't fit on
/// syncs pushed to `before`.
fn add_swsb_to(
  mode: SwsbEncodeMode,
  descs: &[InstDesc],
  target: &mut Entry,
  swsb: &Swsb,
  before: &mut Vec<Entry>,
) {
  let mut merged = target.swsb;
  merged.merge_dist(swsb);
  if swsb.has_token() {
    if !merged.has_token() {
      merged.token_type = swsb.token_type;
      merged.sbid = swsb.sbid;
    } else if merged.token_type != swsb.token_type || merged.sbid != swsb.sbid
    {
      before.push(Entry::nop(Swsb::token(swsb.token_type, swsb.sbid)));
    }
  }
  let (class, is_send) = match desc_of(descs, target) {
    Some(desc) => (classify(mode, desc).1, desc.op.is_send()),
    None => (DepClass::Other, false),
  };
  if let Some(moved) = merged.split_invalid(mode, class, is_send, false) {
    before.push(Entry::nop(moved));
  }
  target.swsb = merged;
}

/// Rewrite the write-combined `{Atomic}` chains of a block so that the
/// chain carries all its waits on its first instruction:
///
///   (W) mov (32|M0)  r13.0<2>:ub  r50.0<1;1,0>:uw  {Atomic, I@1}
///   (W) mov (32|M0)  r13.1<2>:ub  r52.0<1;1,0>:uw  {Atomic}
///   (W) mov (32|M0)  r13.2<2>:ub  r54.0<1;1,0>:uw
///       add (1)      r13.0<1>:df  r100.0<0;1,0>:df  {I@1}
///
/// Syncs found inside the chain are moved before it.  Distances found in
/// the chain are also put on the instruction that follows it, since a
/// dependency on the chain may have been resolved by a member's own
/// distance; a chain ending the block gets a trailing `sync.nop` for this.
pub fn write_combined_blocks(
  caps: &PlatformCaps,
  descs: &[InstDesc],
  entries: &mut Vec<Entry>,
) -> Result<(), SwsbError> {
  let mode = caps.mode;
  let mut out = Vec::with_capacity(entries.len());
  let mut i = 0;
  while i < entries.len() {
    let starts_chain = match desc_of(descs, &entries[i]) {
      Some(desc) => desc.opts.atomic && is_write_combined(desc),
      None => false,
    };
    if !starts_chain {
      out.push(entries[i]);
      i += 1;
      continue;
    }

    let mut first = entries[i];
    let first_ix = match first.origin {
      Origin::Inst(ix) => ix,
      Origin::Sync(_) => InstIx::new(0),
    };
    let mut before = Vec::new();
    let mut rest = Vec::new();
    let mut all_dist = Swsb::default();
    let mut closed = false;
    let mut j = i + 1;
    while j < entries.len() {
      let mut cur = entries[j];
      j += 1;
      let desc = match desc_of(descs, &cur) {
        // Inserted syncs go as they are.
        None => {
          before.push(cur);
          continue;
        }
        Some(desc) => desc,
      };
      if desc.op.is_sync() {
        if !cur.swsb.is_empty() {
          before.push(Entry::nop(cur.swsb));
          cur.swsb = Swsb::default();
        }
        rest.push(cur);
        continue;
      }
      if !is_write_combined(desc) {
        return Err(SwsbError::AtomicBlock {
          inst: first_ix,
          reason: format!(
            "{} in a write-combined block is not a byte move",
            desc.op.name()
          ),
        });
      }
      if !cur.swsb.is_empty() {
        all_dist.merge_dist(&cur.swsb);
        add_swsb_to(mode, descs, &mut first, &cur.swsb, &mut before);
        cur.swsb = Swsb::default();
      }
      rest.push(cur);
      if !desc.opts.atomic {
        closed = true;
        break;
      }
    }
    if !closed {
      return Err(SwsbError::AtomicBlock {
        inst: first_ix,
        reason: "the block ends inside the chain".to_string(),
      });
    }
    debug!(
      "write_combined_blocks: chain of {} at {:?}, {}",
      rest.len() + 1,
      first_ix,
      first.swsb
    );

    out.extend(before);
    out.push(first);
    out.extend(rest);
    if j < entries.len() {
      // The follower may start a chain of its own; revisit it.
      let mut syncs = Vec::new();
      add_swsb_to(mode, descs, &mut entries[j], &all_dist, &mut syncs);
      out.extend(syncs);
    } else if all_dist.has_dist() {
      out.push(Entry::nop(all_dist));
    }
    i = j;
  }
  *entries = out;
  Ok(())
}

//=============================================================================
// Redundant syncs

/// Remove `sync.nop`s that do nothing:
///
/// * a wait on the id the next instruction sets, since reusing an id waits
///   for it anyway (unless the wait is pinned);
/// * a token already carried by another sync of the same run;
/// * `sync.nop`s left with no annotation at all.
pub fn remove_redundant_syncs(descs: &[InstDesc], entries: &mut Vec<Entry>) {
  for i in 0..entries.len() {
    if is_sync_nop(descs, &entries[i]) {
      continue;
    }
    let cur = entries[i].swsb;
    let mut seen = Set::default();
    for k in (0..i).rev() {
      if !is_sync_nop(descs, &entries[k]) {
        break;
      }
      let sync = &mut entries[k];
      if cur.token_type == TokenType::Set
        && !sync.pinned
        && sync.swsb.has_token()
        && sync.swsb.token_type != TokenType::Set
        && sync.swsb.sbid == cur.sbid
      {
        sync.swsb.clear_token();
      }
      if sync.swsb.has_token()
        && !seen.insert((sync.swsb.token_type, sync.swsb.sbid))
      {
        sync.swsb.clear_token();
      }
    }
  }
  let before = entries.len();
  entries.retain(|e| !(is_sync_nop(descs, e) && e.swsb.is_empty()));
  if entries.len() != before {
    debug!("remove_redundant_syncs: {} removed", before - entries.len());
  }
}

//=============================================================================
// Tests

#[cfg(test)]
mod test {
  use super::*;
  use crate::inst::{Operand, Region, Type};
  use crate::platform::Platform;
  use crate::swsb::DistType;

  fn byte_mov(dst: u16, sub: u16, src: u16, atomic: bool) -> InstDesc {
    let mut d = InstDesc::new(Op::Mov, 32)
      .with_dst(Operand::grf(dst, sub, Region::new(0, 0, 2), Type::UB))
      .with_src(Operand::grf(src, 0, Region::new(1, 1, 0), Type::UW));
    d.opts.atomic = atomic;
    d
  }

  fn add_df() -> InstDesc {
    InstDesc::new(Op::Add, 1)
      .with_dst(Operand::grf(13, 0, Region::DST1, Type::DF))
      .with_src(Operand::grf(100, 0, Region::SRC010, Type::DF))
  }

  fn inst(n: u32, swsb: Swsb) -> Entry {
    Entry::inst(InstIx::new(n), swsb, false)
  }

  fn int_dist(d: u32) -> Swsb {
    Swsb::dist(DistType::RegDistInt, d)
  }

  fn chain() -> Vec<InstDesc> {
    vec![
      byte_mov(13, 0, 50, true),
      byte_mov(13, 1, 52, true),
      byte_mov(13, 2, 54, false),
      add_df(),
    ]
  }

  #[test]
  fn test_chain_collects_waits() {
    let caps = PlatformCaps::new(Platform::XeHpc);
    let descs = chain();
    let mut entries = vec![
      inst(0, int_dist(1)),
      inst(1, Swsb::default()),
      inst(2, Swsb::token(TokenType::Dst, 3)),
      inst(3, Swsb::default()),
    ];
    write_combined_blocks(&caps, &descs, &mut entries).unwrap();
    // The wait can't share the first instruction with an integer distance.
    assert_eq!(
      entries,
      vec![
        Entry::nop(int_dist(1)),
        inst(0, Swsb::token(TokenType::Dst, 3)),
        inst(1, Swsb::default()),
        inst(2, Swsb::default()),
        inst(3, Swsb::default()),
      ]
    );
  }

  #[test]
  fn test_chain_distance_replicated() {
    let caps = PlatformCaps::new(Platform::XeHpc);
    let descs = chain();
    let mut entries = vec![
      inst(0, Swsb::default()),
      Entry::nop(Swsb::token(TokenType::Src, 1)),
      inst(1, int_dist(2)),
      inst(2, Swsb::default()),
      inst(3, Swsb::default()),
    ];
    write_combined_blocks(&caps, &descs, &mut entries).unwrap();
    assert_eq!(
      entries,
      vec![
        Entry::nop(Swsb::token(TokenType::Src, 1)),
        inst(0, int_dist(2)),
        inst(1, Swsb::default()),
        inst(2, Swsb::default()),
        inst(3, int_dist(2)),
      ]
    );

    // At the end of the block the distance goes on a sync.
    let mut entries = vec![
      inst(0, Swsb::default()),
      inst(1, int_dist(2)),
      inst(2, Swsb::default()),
    ];
    write_combined_blocks(&caps, &descs[..3], &mut entries).unwrap();
    assert_eq!(entries[3], Entry::nop(int_dist(2)));
  }

  #[test]
  fn test_malformed_chains() {
    let caps = PlatformCaps::new(Platform::XeHpc);
    let mut descs = chain();
    let mut entries: Vec<Entry> =
      (0..3).map(|n| inst(n, Swsb::default())).collect();
    descs[2].opts.atomic = true;
    match write_combined_blocks(&caps, &descs, &mut entries) {
      Err(SwsbError::AtomicBlock { inst, .. }) => {
        assert_eq!(inst, InstIx::new(0))
      }
      r => panic!("unexpected {:?}", r),
    }

    let mut descs = chain();
    descs[1] = add_df();
    descs[1].opts.atomic = true;
    let mut entries: Vec<Entry> =
      (0..4).map(|n| inst(n, Swsb::default())).collect();
    assert!(write_combined_blocks(&caps, &descs, &mut entries).is_err());
  }

  #[test]
  fn test_redundant_syncs() {
    let descs = vec![add_df(), add_df(), InstDesc::sync(SyncFc::Nop)];
    let mut pinned = Entry::nop(Swsb::token(TokenType::Dst, 2));
    pinned.pinned = true;
    let mut entries = vec![
      inst(0, Swsb::default()),
      Entry::nop(Swsb::token(TokenType::Dst, 2)),
      Entry::nop(Swsb::token(TokenType::Src, 4)),
      Entry::nop(Swsb::token(TokenType::Src, 4)),
      inst(2, Swsb::default()),
      inst(1, Swsb::token(TokenType::Set, 2)),
      pinned,
      inst(1, Swsb::token(TokenType::Set, 2)),
    ];
    remove_redundant_syncs(&descs, &mut entries);
    assert_eq!(
      entries,
      vec![
        inst(0, Swsb::default()),
        Entry::nop(Swsb::token(TokenType::Src, 4)),
        inst(1, Swsb::token(TokenType::Set, 2)),
        pinned,
        inst(1, Swsb::token(TokenType::Set, 2)),
      ]
    );
  }
}
