/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

/// Test cases.  The list of them is right at the bottom, function
/// |find_program|.  Add new ones there.
use swsb::{MathFc, Op, Operand, Region, Sfid, Type};

use crate::parser;
use crate::test_framework::*;

use std::path::{Path, PathBuf};

/// A producer read back two instructions later.
fn test_dist_window() -> Program {
  let mut p = Program::new("dist_window");
  p.block(
    "entry",
    vec![i_add(8, 1, 2, 3), i_add(8, 4, 5, 6), i_add(8, 7, 1, 8)],
  );
  p
}

/// A load whose result is used right away.
fn test_send_use() -> Program {
  let mut p = Program::new("send_use");
  p.block(
    "entry",
    vec![
      i_load(Sfid::Ugm, 10, 1, 20),
      i_add(8, 30, 10, 31),
      i_store(Sfid::Ugm, 21, 30, 1),
    ],
  );
  p
}

/// One more load in flight than there are ids.
fn test_sbid_pressure() -> Program {
  let mut p = Program::new("sbid_pressure");
  let mut insts: Vec<Inst> =
    (0..17).map(|i| i_load(Sfid::Ugm, 10 + i, 1, 100)).collect();
  // Use them all, oldest first.
  insts.push(i_add(8, 60, 10, 26));
  p.block("entry", insts);
  p
}

/// A scalar math result read at another sub-register of the same GRF.
fn test_math_wa() -> Program {
  let mut p = Program::new("math_wa");
  let math = i_alu(
    Op::Math(MathFc::Exp),
    1,
    Operand::grf(5, 0, Region::DST1, Type::F),
    &[Operand::grf(20, 0, Region::SRC010, Type::F)],
  );
  let mov = i_alu(
    Op::Mov,
    1,
    Operand::grf(6, 0, Region::DST1, Type::F),
    &[Operand::grf(5, 4, Region::SRC010, Type::F)],
  );
  p.block("entry", vec![math, mov]);
  p
}

/// Three loads still in flight at the end of the block, used in the next.
fn test_block_end() -> Program {
  let mut p = Program::new("block_end");
  p.block(
    "b0",
    vec![
      i_load(Sfid::Ugm, 10, 1, 20),
      i_load(Sfid::Ugm, 11, 1, 21),
      i_load(Sfid::Ugm, 12, 1, 22),
    ],
  );
  p.block("b1", vec![i_add(8, 30, 10, 11), i_add(8, 31, 12, 30)]);
  p
}

/// Two DPAS sharing src1, then a use of the second's result.
fn test_dpas_macro() -> Program {
  let mut p = Program::new("dpas_macro");
  p.block(
    "entry",
    vec![
      i_dpas(8, 10, 40, 50),
      i_dpas(8, 20, 40, 60),
      i_add(8, 70, 20, 71),
    ],
  );
  p
}

/// `mov (32) rD.sub<2>:ub rS<1;1,0>:uw`
fn byte_mov(d: u16, sub: u16, s: u16, atomic: bool) -> Inst {
  let mut inst = i_alu(
    Op::Mov,
    32,
    Operand::grf(d, sub, Region::new(0, 0, 2), Type::UB),
    &[Operand::grf(s, 0, Region::SRC110, Type::UW)],
  );
  inst.desc.no_mask = true;
  inst.desc.opts.atomic = atomic;
  inst
}

/// Interleaved byte writes chained into one register write.
fn test_write_combine() -> Program {
  let mut p = Program::new("write_combine");
  let add_df = i_alu(
    Op::Add,
    1,
    r(13, Type::DF),
    &[Operand::grf(100, 0, Region::SRC010, Type::DF)],
  );
  p.block(
    "entry",
    vec![
      i_addi(16, 50, 60, 61),
      byte_mov(13, 0, 50, true),
      byte_mov(13, 1, 52, true),
      byte_mov(13, 2, 54, false),
      add_df,
    ],
  );
  p
}

/// Every in-order pipe at once.
fn test_mixed_pipes() -> Program {
  let mut p = Program::new("mixed_pipes");
  let long = i_alu(
    Op::Add,
    4,
    r(40, Type::DF),
    &[rs(41, Type::DF), rs(42, Type::DF)],
  );
  let use_all = i_alu(
    Op::Add,
    8,
    r(60, Type::F),
    &[rs(1, Type::F), rs(4, Type::F)],
  );
  p.block(
    "entry",
    vec![
      i_add(8, 1, 2, 3),
      i_addi(8, 4, 5, 6),
      long,
      i_math(MathFc::Inv, 8, 50, 51),
      use_all,
      i_add(8, 61, 40, 50),
    ],
  );
  p
}

const LOOP_SOURCE: &str = "
// A counted loop over loads, with the exit in its own block.
entry:
    mov (8|M0) r1.0<1>:d 0x0:d
    send.ugm (8|M0) [1,1,0] r10.0<1>:ud r20.0<1;1,0>:ud null:ud
loop:
    add (8|M0) r1.0<1>:d r1.0<1;1,0>:d 0x1:d
    send.ugm (8|M0) [1,1,0] r11.0<1>:ud r1.0<1;1,0>:ud null:ud
    add (8|M0) r12.0<1>:f r11.0<1;1,0>:f r12.0<1;1,0>:f
    cmp (8|M0) (lt)f0.0 null:d r1.0<1;1,0>:d 0x10:d
    (f0.0) jmpi (1|M0) @loop
exit:
    send.ugm (8|M0) [0,1,1] null:ud r21.0<1;1,0>:ud r12.0<1;1,0>:ud
    send.gateway (8|M0) [0,1,0] null:ud r127.0<1;1,0>:ud null:ud {EOT}
";

fn test_loop() -> Program {
  match parser::parse_content("loop", LOOP_SOURCE) {
    Ok(p) => p,
    Err(err) => panic!("unparseable test case: {:?}", err),
  }
}

const INDIRECT_SOURCE: &str = "
entry:
    send.ugm (8|M0) [1,1,0] r10.0<1>:ud r20.0<1;1,0>:ud null:ud
    mov (8|M0) r[a0.0]<1>:f r40.0<1;1,0>:f
    add (8|M0) r50.0<1>:f r51.0<1;1,0>:f r52.0<1;1,0>:f
    mov (8|M0) r60.0<1>:f r[a0.2]<1,0>:f
    send.gateway (8|M0) [0,1,0] null:ud r127.0<1;1,0>:ud null:ud {EOT}
";

fn test_indirect() -> Program {
  match parser::parse_content("indirect", INDIRECT_SOURCE) {
    Ok(p) => p,
    Err(err) => panic!("unparseable test case: {:?}", err),
  }
}

const CALL_SOURCE: &str = "
// The return address written by the call is read on both sides of it.
entry:
    call (1|M0) r8.0<1>:d @sub
ret_point:
    add (8|M0) r9.0<1>:d r8.0<0;1,0>:d r10.0<1;1,0>:d
    send.gateway (8|M0) [0,1,0] null:ud r127.0<1;1,0>:ud null:ud {EOT}
sub:
    mov (1|M0) r30.0<1>:d r8.0<0;1,0>:d
    ret (1|M0) r30.0<0;1,0>:d
";

fn test_call() -> Program {
  match parser::parse_content("call", CALL_SOURCE) {
    Ok(p) => p,
    Err(err) => panic!("unparseable test case: {:?}", err),
  }
}

/// Stores and loads to different units, which may complete in any order.
fn test_send_units() -> Program {
  let mut p = Program::new("send_units");
  p.block(
    "entry",
    vec![
      i_store(Sfid::Slm, 20, 30, 1),
      i_load(Sfid::Ugm, 30, 1, 21),
      i_load(Sfid::Ugm, 31, 1, 30),
      i_load(Sfid::Slm, 32, 1, 22),
      i_add(8, 33, 31, 32),
      i_eot(127),
    ],
  );
  p
}

pub fn all_programs() -> Vec<Program> {
  vec![
    test_dist_window(),
    test_send_use(),
    test_sbid_pressure(),
    test_math_wa(),
    test_block_end(),
    test_dpas_macro(),
    test_write_combine(),
    test_mixed_pipes(),
    test_loop(),
    test_indirect(),
    test_send_units(),
    test_call(),
  ]
}

pub fn find_program(name: &str) -> Result<Program, Vec<String>> {
  let all = all_programs();
  let mut all_names: Vec<String> =
    all.iter().map(|p| p.name.clone()).collect();

  for cand in all {
    if cand.name == *name {
      return Ok(cand);
    }
  }

  fn ends_in_tilde(path: &PathBuf) -> bool {
    match path.to_str() {
      Some(s) => s.ends_with('~'),
      None => false,
    }
  }

  let test_dir = Path::new("tests");
  match test_dir.read_dir() {
    Err(err) => {
      println!("can't read test directory: {}", err);
    }
    Ok(entries) => {
      for entry in entries.flatten() {
        let path = entry.path();
        // Skip editor backup files.
        if ends_in_tilde(&path) {
          continue;
        }
        let basename = match path.file_stem().and_then(|s| s.to_str()) {
          Some(b) => b.to_string(),
          None => continue,
        };
        if basename == name {
          match parser::parse_file(path) {
            Ok(program) => return Ok(program),
            Err(err) => {
              println!("can't parse {}: {:?}", basename, err);
              continue;
            }
          }
        }
        all_names.push(basename);
      }
    }
  }

  all_names.sort();
  Err(all_names)
}
