/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Implements fuzzing primitives for test programs.

use arbitrary::{Arbitrary, Result, Unstructured};

use swsb::{
  BlockIx, InstIx, MathFc, Op, Operand, OperandKind, PredCtrl, RegRef,
  Region, Sfid, SyncFc, Type, TypedIxVec,
};

use crate::test_framework::*;

/// Registers used by generated operands stay below this, so that the widest
/// operand still fits in a 128 register file.
const MAX_GRF: u16 = 100;

const SFIDS: &[Sfid] = &[Sfid::Ugm, Sfid::Slm, Sfid::Dc0, Sfid::Sampler];
const ALU_OPS: &[Op] =
  &[Op::Add, Op::Mul, Op::Mov, Op::And, Op::Sel, Op::Cmp];
const ALU_TYPES: &[Type] = &[Type::F, Type::D, Type::UD, Type::HF, Type::DF];
const MATH_FCS: &[MathFc] =
  &[MathFc::Inv, MathFc::Exp, MathFc::Sqrt, MathFc::Fdiv, MathFc::Idiv];

struct FuzzingEnv {
  num_blocks: u8,
}

fn pick<T: Copy>(u: &mut Unstructured, choices: &[T]) -> Result<T> {
  Ok(choices[usize::arbitrary(u)? % choices.len()])
}

impl FuzzingEnv {
  fn block(&self, u: &mut Unstructured) -> Result<BlockIx> {
    Ok(BlockIx::new((u8::arbitrary(u)? % self.num_blocks) as u32))
  }

  fn grf(&self, u: &mut Unstructured) -> Result<u16> {
    Ok(u16::arbitrary(u)? % MAX_GRF)
  }

  fn exec_size(&self, u: &mut Unstructured) -> Result<u8> {
    pick(u, &[1, 8, 16])
  }

  fn flag(&self, u: &mut Unstructured) -> Result<RegRef> {
    Ok(RegRef::new(u16::arbitrary(u)? % 2, u16::arbitrary(u)? % 2))
  }

  fn src(&self, ty: Type, u: &mut Unstructured) -> Result<Operand> {
    Ok(match u8::arbitrary(u)? % 8 {
      0 => Operand::imm(u64::from(u16::arbitrary(u)?), ty),
      1 => Operand::grf(self.grf(u)?, 0, Region::SRC010, ty),
      2 => Operand {
        kind: OperandKind::Indirect {
          addr: RegRef::new(0, u16::arbitrary(u)? % 8),
          region: Region::SRC110,
          vxh: false,
        },
        ty,
      },
      _ => Operand::grf(self.grf(u)?, 0, Region::SRC110, ty),
    })
  }

  fn alu(&self, u: &mut Unstructured) -> Result<Inst> {
    let op = pick(u, ALU_OPS)?;
    let ty = pick(u, ALU_TYPES)?;
    let exec = self.exec_size(u)?;
    let dst = if bool::arbitrary(u)? && op == Op::Cmp {
      Operand::null(ty)
    } else {
      Operand::grf(self.grf(u)?, 0, Region::DST1, ty)
    };
    let num_srcs = if op == Op::Mov { 1 } else { 2 };
    let mut inst = i_alu(op, exec, dst, &[]);
    for _ in 0..num_srcs {
      inst.desc = inst.desc.with_src(self.src(ty, u)?);
    }
    if op == Op::Cmp || op == Op::Sel {
      let cm = pick(u, ALL_COND_MODS)?;
      inst.desc = inst.desc.with_cond_mod(self.flag(u)?, cm);
    } else if u8::arbitrary(u)? % 4 == 0 {
      let ctrl = pick(u, &[PredCtrl::Seq, PredCtrl::Any8h, PredCtrl::All])?;
      inst.desc = inst.desc.with_pred(self.flag(u)?, ctrl);
    }
    inst.desc.no_mask = bool::arbitrary(u)?;
    Ok(inst)
  }

  fn send(&self, u: &mut Unstructured) -> Result<Inst> {
    let sfid = pick(u, SFIDS)?;
    let a = self.grf(u)?;
    let inst = if bool::arbitrary(u)? {
      i_load(sfid, self.grf(u)?, 1 + u8::arbitrary(u)? % 4, a)
    } else {
      i_store(sfid, a, self.grf(u)?, 1 + u8::arbitrary(u)? % 2)
    };
    Ok(inst)
  }

  fn math(&self, u: &mut Unstructured) -> Result<Inst> {
    let fc = pick(u, MATH_FCS)?;
    let exec = self.exec_size(u)?;
    let dst = Operand::grf(self.grf(u)?, 0, Region::DST1, Type::F);
    let mut srcs = vec![self.src(Type::F, u)?];
    if fc == MathFc::Fdiv || fc == MathFc::Idiv {
      srcs.push(self.src(Type::F, u)?);
    }
    Ok(i_alu(Op::Math(fc), exec, dst, &srcs))
  }

  /// A run of DPAS sharing src1, which may be issued as one macro.
  fn dpas_run(&self, u: &mut Unstructured) -> Result<Vec<Inst>> {
    let repeat = pick(u, &[1, 2, 4, 8])?;
    let src1 = self.grf(u)?;
    let n = 1 + u8::arbitrary(u)? % 3;
    let mut insts = Vec::new();
    for _ in 0..n {
      insts.push(i_dpas(repeat, self.grf(u)?, src1, self.grf(u)?));
    }
    Ok(insts)
  }

  /// Byte writes into one register, chained with `{Atomic}`.
  fn byte_chain(&self, u: &mut Unstructured) -> Result<Vec<Inst>> {
    let d = self.grf(u)?;
    let n = 2 + u16::arbitrary(u)? % 3;
    let mut insts = Vec::new();
    for i in 0..n {
      let mut inst = i_alu(
        Op::Mov,
        16,
        Operand::grf(d, i, Region::new(0, 0, 4), Type::UB),
        &[Operand::grf(self.grf(u)?, 0, Region::SRC110, Type::UW)],
      );
      inst.desc.no_mask = true;
      inst.desc.opts.atomic = i + 1 < n;
      insts.push(inst);
    }
    Ok(insts)
  }

  fn insts(&self, u: &mut Unstructured) -> Result<Vec<Inst>> {
    const NUM_VARIANTS: u8 = 8;
    Ok(match u8::arbitrary(u)? % NUM_VARIANTS {
      0 | 1 | 2 => vec![self.alu(u)?],
      3 | 4 => vec![self.send(u)?],
      5 => vec![self.math(u)?],
      6 => self.dpas_run(u)?,
      7 => match u8::arbitrary(u)? % 3 {
        0 => vec![Inst::sync(SyncFc::Nop)],
        _ => self.byte_chain(u)?,
      },
      x => {
        debug_assert!(x < NUM_VARIANTS, "update NUM_VARIANTS above");
        unreachable!()
      }
    })
  }

  fn block_end(&self, is_last: bool, u: &mut Unstructured) -> Result<Inst> {
    if is_last {
      return Ok(i_eot(127));
    }
    if u8::arbitrary(u)? % 4 == 0 {
      return Ok(i_call(self.grf(u)?, self.block(u)?));
    }
    let mut jmp = i_jmpi(self.block(u)?);
    if bool::arbitrary(u)? {
      jmp.desc = jmp.desc.with_pred(self.flag(u)?, PredCtrl::Seq);
    }
    Ok(jmp)
  }
}

impl<'a> Arbitrary<'a> for Program {
  fn arbitrary(u: &mut Unstructured<'a>) -> Result<Program> {
    let num_blocks = 1 + (u8::arbitrary(u)? % 8);
    let env = FuzzingEnv { num_blocks };

    let mut insts = TypedIxVec::new();
    let mut blocks = TypedIxVec::new();

    for b in 0..num_blocks {
      let start = insts.len();
      let num_groups = u8::arbitrary(u)? % 40;
      for _ in 0..num_groups {
        let mut group = env.insts(u)?;
        insts.append(&mut group);
      }
      if bool::arbitrary(u)? || b + 1 == num_blocks {
        insts.push(env.block_end(b + 1 == num_blocks, u)?);
      }
      blocks.push(Block {
        name: format!("b{}", b),
        start: InstIx::new(start),
        len: insts.len() - start,
      });
    }

    let mut program = Program::new("fuzz");
    program.insts = insts;
    program.blocks = blocks;
    Ok(program)
  }
}

#[test]
fn test_generated_programs_are_valid() {
  use crate::validator::validate;
  let mut seed = 0x2545_f491u32;
  for _ in 0..50 {
    let bytes: Vec<u8> = (0..2048)
      .map(|_| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        seed as u8
      })
      .collect();
    let mut u = Unstructured::new(&bytes);
    if let Ok(program) = Program::arbitrary(&mut u) {
      if let Err(e) = validate(&program) {
        panic!("generated an invalid program: {}", e);
      }
    }
  }
}
