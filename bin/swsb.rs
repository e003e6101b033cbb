/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

mod fuzzing;
mod parser;
mod test_cases;
mod test_framework;
mod validator;

use std::path::PathBuf;
use std::str::FromStr;

use swsb::{set_swsb, Annotation, InstIx, Platform, SwsbOptions};
use test_framework::Program;

use clap;
use log::{self, error, info};
use pretty_env_logger;

//=============================================================================
// Top level

fn main() {
  pretty_env_logger::init();

  let app = clap::App::new("swsb-util")
    .about("a simple program to allow separate testing of the swsb pass")
    .arg(
      clap::Arg::new("test")
        .short('t')
        .long("test")
        .takes_value(true)
        .conflicts_with("file")
        .required_unless_present("file")
        .help("test case name"),
    )
    .arg(
      clap::Arg::new("file")
        .short('f')
        .long("file")
        .takes_value(true)
        .help("assembly file to annotate"),
    )
    .arg(
      clap::Arg::new("platform")
        .short('p')
        .long("platform")
        .takes_value(true)
        .possible_values(["xelp", "xehp", "xehpg", "xehpc"])
        .default_value("xehp")
        .help("target platform"),
    )
    .arg(
      clap::Arg::new("sbids")
        .long("sbids")
        .takes_value(true)
        .help("number of scoreboard ids (platform default if not set)"),
    )
    .arg(
      clap::Arg::new("max-dist")
        .long("max-dist")
        .takes_value(true)
        .help("largest distance to encode (platform default if not set)"),
    )
    .arg(
      clap::Arg::new("output")
        .short('o')
        .long("output")
        .takes_value(true)
        .help("file to write the annotations to, in bincode"),
    );
  let matches = app.get_matches();

  let program = if let Some(path) = matches.value_of("file") {
    match parser::parse_file(PathBuf::from(path)) {
      Ok(program) => program,
      Err(err) => {
        error!("can't parse {}: {:?}", path, err);
        return;
      }
    }
  } else {
    let name = matches.value_of("test").unwrap_or("");
    match test_cases::find_program(name) {
      Ok(program) => program,
      Err(available_names) => {
        error!("can't find Program with name '{}'", name);
        println!("available program names are:");
        for name in available_names {
          println!("     {}", name);
        }
        return;
      }
    }
  };

  // Unreachable failure because of defined "possible_values".
  let platform = match Platform::from_str(
    matches.value_of("platform").unwrap_or("xehp"),
  ) {
    Ok(platform) => platform,
    Err(msg) => {
      println!("{}", msg);
      return;
    }
  };

  let mut opts = SwsbOptions::new(platform);
  match parse_opt(matches.value_of("sbids")) {
    Ok(n) => opts.sbid_count = n,
    Err(()) => {
      println!("invalid sbids value");
      return;
    }
  }
  match parse_opt(matches.value_of("max-dist")) {
    Ok(n) => opts.max_distance = n,
    Err(()) => {
      println!("invalid max-dist value");
      return;
    }
  }

  if let Err(err) = validator::validate(&program) {
    println!("invalid program: {}", err);
    return;
  }

  let caps = match opts.caps() {
    Ok(caps) => caps,
    Err(err) => {
      println!("{}", err);
      return;
    }
  };
  info!("annotating {} for {}", program.name, platform);

  program.print("before annotation");

  let result = match set_swsb(&program, &opts) {
    Err(e) => {
      println!("annotation failed: {}", e);
      return;
    }
    Ok(r) => r,
  };
  println!("\n// {}", result.stats);

  let dump = annotation_dump(&result.orig_inst_map, &result.annotations);

  let mut annotated = program.clone();
  annotated.update_from_result(result);

  annotated.print("after annotation");

  if let Some(path) = matches.value_of("output") {
    match bincode::serialize(&dump) {
      Ok(bytes) => {
        if let Err(err) = std::fs::write(path, bytes) {
          error!("can't write {}: {}", path, err);
        }
      }
      Err(err) => error!("can't serialize the annotations: {}", err),
    }
  }

  println!("");
  match validator::check_annotations(&annotated, &caps) {
    Ok(()) => println!("all hazards ordered"),
    Err(err) => println!("unordered hazard: {}", err),
  }
}

fn parse_opt(value: Option<&str>) -> Result<Option<u32>, ()> {
  match value {
    None => Ok(None),
    Some(s) => s.parse::<u32>().map(Some).map_err(|_| ()),
  }
}

/// What gets written by `-o`: each output instruction's origin, and its
/// annotation.
fn annotation_dump(
  orig_inst_map: &[Option<InstIx>],
  annotations: &[Annotation],
) -> Vec<(Option<InstIx>, Annotation)> {
  orig_inst_map.iter().cloned().zip(annotations.iter().cloned()).collect()
}

#[cfg(test)]
mod test_utils {
  use super::*;
  use crate::validator::check_annotations;
  use swsb::{SwsbError, SwsbResult};

  pub fn run(
    program_name: &str,
    platform: Platform,
  ) -> (Program, SwsbResult<Program>) {
    let _ = pretty_env_logger::try_init();
    let program = test_cases::find_program(program_name).unwrap();
    let result = set_swsb(&program, &SwsbOptions::new(platform))
      .unwrap_or_else(|err| {
        panic!("annotation failed: {}", err);
      });
    (program, result)
  }

  /// Position in the output of original instruction `n`.
  pub fn pos(result: &SwsbResult<Program>, n: u32) -> usize {
    result
      .orig_inst_map
      .iter()
      .position(|o| *o == Some(InstIx::new(n)))
      .unwrap()
  }

  pub fn annotation(result: &SwsbResult<Program>, n: u32) -> Annotation {
    result.annotations[pos(result, n)]
  }

  /// Annotate and check `program`; platforms without an opcode it uses are
  /// skipped.
  pub fn check_program(program: &Program, platform: Platform) {
    let caps = SwsbOptions::new(platform).caps().unwrap();
    match set_swsb(program, &SwsbOptions::new(platform)) {
      Ok(result) => {
        let mut annotated = program.clone();
        annotated.update_from_result(result);
        if let Err(err) = check_annotations(&annotated, &caps) {
          program.print("input");
          annotated.print("output");
          panic!("{} on {}: {}", program.name, platform, err);
        }
      }
      Err(SwsbError::UnsupportedOp { .. }) => {}
      Err(err) => panic!("{} on {}: {}", program.name, platform, err),
    }
  }
}

#[cfg(test)]
mod test {
  use super::test_utils::*;
  use super::*;
  use crate::test_framework::Inst;
  use arbitrary::{Arbitrary, Unstructured};
  use swsb::{DistType, Op, Swsb, SyncFc, TokenType};

  fn is_sync(inst: &Inst, fc: SyncFc) -> bool {
    inst.desc.op == Op::Sync(fc)
  }

  #[test]
  fn test_dist_window() {
    let (_, result) = run("dist_window", Platform::XeLp);
    assert_eq!(annotation(&result, 0).swsb, Swsb::default());
    assert_eq!(annotation(&result, 1).swsb, Swsb::default());
    let third = annotation(&result, 2).swsb;
    assert_eq!(third, Swsb::dist(DistType::RegDist, 2));
    assert!(third.min_dist <= 10);
  }

  #[test]
  fn test_send_use() {
    let (_, result) = run("send_use", Platform::XeLp);
    let load = annotation(&result, 0).swsb;
    let add = annotation(&result, 1).swsb;
    assert_eq!(load.token_type, TokenType::Set);
    assert_eq!(add.token_type, TokenType::Dst);
    assert_eq!(add.sbid, load.sbid);
  }

  #[test]
  fn test_sbid_pressure() {
    let (_, result) = run("sbid_pressure", Platform::XeLp);
    assert_eq!(result.stats.num_sbid_evictions, 1);
    for n in 0..16 {
      assert_eq!(annotation(&result, n).swsb, Swsb::token(TokenType::Set, n));
    }
    // An inserted wait frees an id for the 17th load.
    let p = pos(&result, 16);
    assert_eq!(result.orig_inst_map[p - 1], None);
    assert!(is_sync(&result.insts[p - 1], SyncFc::Nop));
    assert_eq!(
      result.annotations[p - 1].swsb,
      Swsb::token(TokenType::Dst, 0)
    );
    assert_eq!(annotation(&result, 16).swsb, Swsb::token(TokenType::Set, 0));
  }

  #[test]
  fn test_math_wa() {
    // The scalar write is taken to cover all of r5.
    let (_, result) = run("math_wa", Platform::XeHp);
    let math = annotation(&result, 0).swsb;
    let mov = annotation(&result, 1).swsb;
    assert_eq!(math.token_type, TokenType::Set);
    assert_eq!(mov.token_type, TokenType::Dst);
    assert_eq!(mov.sbid, math.sbid);

    // Without the workaround r5.4 isn't written.
    let (_, result) = run("math_wa", Platform::XeLp);
    assert_eq!(annotation(&result, 1).swsb, Swsb::default());
  }

  #[test]
  fn test_block_end() {
    let (_, result) = run("block_end", Platform::XeLp);
    assert_eq!(result.stats.num_flushes, 1);
    let b1_start = result.target_map[swsb::BlockIx::new(1)].get() as usize;
    let b0 = &result.insts[..b1_start];
    assert!(b0.iter().any(|i| is_sync(i, SyncFc::AllRd)));
    assert!(b0.iter().any(|i| is_sync(i, SyncFc::AllWr)));
    // Nothing is inherited from the previous block.
    assert_eq!(result.orig_inst_map[b1_start], Some(InstIx::new(3)));
    assert_eq!(result.annotations[b1_start].swsb, Swsb::default());
  }

  #[test]
  fn test_dpas_macro() {
    let (_, result) = run("dpas_macro", Platform::XeHp);
    assert_eq!(result.stats.num_dpas_macros, 1);
    let first = annotation(&result, 0);
    let second = annotation(&result, 1);
    assert!(first.atomic);
    assert!(!first.swsb.has_token());
    assert!(!second.atomic);
    assert_eq!(second.swsb.token_type, TokenType::Set);
    // The use waits on the whole macro.
    let add = annotation(&result, 2).swsb;
    assert_eq!(add.token_type, TokenType::Dst);
    assert_eq!(add.sbid, second.swsb.sbid);
  }

  #[test]
  fn test_dpas_unsupported() {
    let program = test_cases::find_program("dpas_macro").unwrap();
    match set_swsb(&program, &SwsbOptions::new(Platform::XeLp)) {
      Err(swsb::SwsbError::UnsupportedOp { op: Op::Dpas, .. }) => {}
      _ => panic!("dpas must be rejected on xelp"),
    }
  }

  #[test]
  fn test_write_combine() {
    let (_, result) = run("write_combine", Platform::XeHpc);
    // The chain's waits are all carried by its first instruction.
    assert!(annotation(&result, 2).swsb.is_empty());
    assert!(annotation(&result, 3).swsb.is_empty());
    assert!(annotation(&result, 1).swsb.has_dist());
  }

  #[test]
  fn test_target_map() {
    let (program, result) = run("loop", Platform::XeHpg);
    assert_eq!(result.target_map.len(), program.blocks.len());
    for bix in program.blocks.range() {
      let start = result.target_map[bix].get() as usize;
      assert!(start < result.insts.len());
    }
    // Every original instruction is there, in order.
    let origs: Vec<InstIx> =
      result.orig_inst_map.iter().filter_map(|o| *o).collect();
    let expected: Vec<InstIx> =
      (0..program.insts.len()).map(InstIx::new).collect();
    assert_eq!(origs, expected);
    assert_eq!(result.stats.num_insts, program.insts.len());
  }

  #[test]
  fn test_call_return() {
    let (_, result) = run("call", Platform::XeLp);
    // The return address is read first thing on both sides of the call.
    let after = Swsb::dist(DistType::RegDist, 1);
    assert_eq!(annotation(&result, 1).swsb, after);
    assert_eq!(annotation(&result, 3).swsb, after);

    let (_, result) = run("call", Platform::XeHp);
    let after = Swsb::dist(DistType::RegDistInt, 1);
    assert_eq!(annotation(&result, 1).swsb, after);
    assert_eq!(annotation(&result, 3).swsb, after);
  }

  #[test]
  fn test_all_programs() {
    for program in test_cases::all_programs() {
      validator::validate(&program).unwrap();
      for &platform in Platform::all() {
        check_program(&program, platform);
      }
    }
  }

  #[test]
  fn test_fewer_sbids() {
    let program = test_cases::find_program("sbid_pressure").unwrap();
    let mut opts = SwsbOptions::new(Platform::XeHp);
    opts.sbid_count = Some(4);
    let caps = opts.caps().unwrap();
    let result = set_swsb(&program, &opts).unwrap();
    assert_eq!(result.stats.num_sbid_evictions, 13);
    assert!(result.annotations.iter().all(|a| a.swsb.sbid < 4));
    let mut annotated = program.clone();
    annotated.update_from_result(result);
    check_annotations_ok(&annotated, &caps);
  }

  fn check_annotations_ok(program: &Program, caps: &swsb::PlatformCaps) {
    if let Err(err) = validator::check_annotations(program, caps) {
      program.print("output");
      panic!("{}", err);
    }
  }

  #[test]
  fn test_generated_programs() {
    let _ = pretty_env_logger::try_init();
    let mut seed = 0x9e37_79b9u32;
    let mut num_checked = 0;
    for _ in 0..40 {
      let bytes: Vec<u8> = (0..4096)
        .map(|_| {
          seed ^= seed << 13;
          seed ^= seed >> 17;
          seed ^= seed << 5;
          seed as u8
        })
        .collect();
      let mut u = Unstructured::new(&bytes);
      let program = match Program::arbitrary(&mut u) {
        Ok(program) => program,
        Err(_) => continue,
      };
      for &platform in Platform::all() {
        check_program(&program, platform);
      }
      num_checked += 1;
    }
    assert!(num_checked > 0);
  }

  #[test]
  fn test_annotation_dump() {
    let (_, result) = run("send_units", Platform::XeHp);
    let dump = annotation_dump(&result.orig_inst_map, &result.annotations);
    assert_eq!(dump.len(), result.insts.len());
    let bytes = bincode::serialize(&dump).unwrap();
    let back: Vec<(Option<InstIx>, Annotation)> =
      bincode::deserialize(&bytes).unwrap();
    assert_eq!(back, dump);
  }
}
