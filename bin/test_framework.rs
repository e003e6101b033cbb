/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

/// As part of this set of test cases, we define a mini assembly IR and
/// implement the `Kernel` trait for it so that we can use the swsb public
/// interface.
use swsb::{
  Annotation, BlockIx, CondMod, DistType, InstDesc, InstIx, Kernel, MathFc,
  MyRange, Op, Operand, OperandKind, PredCtrl, RegName, RegRef, Region,
  SendDesc, Sfid, Swsb, SwsbResult, SyncFc, SyncKind, TokenType, Type,
  TypedIxVec,
};

use std::fmt;
use std::fmt::Write;

//=============================================================================
// Names of things, shared by the printer and the parser.

pub const ALL_OPS: &[Op] = &[
  Op::Illegal,
  Op::Nop,
  Op::Mov,
  Op::Movi,
  Op::Sel,
  Op::Not,
  Op::And,
  Op::Or,
  Op::Xor,
  Op::Shl,
  Op::Shr,
  Op::Asr,
  Op::Cmp,
  Op::Add,
  Op::Add3,
  Op::Addc,
  Op::Subb,
  Op::Mul,
  Op::Mac,
  Op::Mach,
  Op::Mad,
  Op::Bfn,
  Op::Frc,
  Op::Rndd,
  Op::Srnd,
  Op::Math(MathFc::Inv),
  Op::Math(MathFc::Log),
  Op::Math(MathFc::Exp),
  Op::Math(MathFc::Sqrt),
  Op::Math(MathFc::Rsqt),
  Op::Math(MathFc::Sin),
  Op::Math(MathFc::Cos),
  Op::Math(MathFc::Fdiv),
  Op::Math(MathFc::Pow),
  Op::Math(MathFc::Idiv),
  Op::Math(MathFc::Iqot),
  Op::Math(MathFc::Irem),
  Op::Send,
  Op::Sendc,
  Op::Dpas,
  Op::Dpasw,
  Op::Sync(SyncFc::Nop),
  Op::Sync(SyncFc::AllRd),
  Op::Sync(SyncFc::AllWr),
  Op::Sync(SyncFc::Bar),
  Op::Sync(SyncFc::Host),
  Op::Jmpi,
  Op::Brc,
  Op::Brd,
  Op::If,
  Op::Else,
  Op::Endif,
  Op::While,
  Op::Break,
  Op::Cont,
  Op::Halt,
  Op::Goto,
  Op::Join,
  Op::Call,
  Op::Calla,
  Op::Ret,
];

pub fn op_from_name(name: &str) -> Option<Op> {
  ALL_OPS.iter().cloned().find(|op| op.name() == name)
}

/// Instructions of the test IR write a destination operand unless they are
/// one of these.  Calls write their return address.
pub fn has_dst_operand(op: Op) -> bool {
  match op {
    Op::Call | Op::Calla => true,
    _ => {
      !(op.is_sync() || op.is_branch() || op == Op::Nop || op == Op::Illegal)
    }
  }
}

pub const ALL_SFIDS: &[Sfid] = &[
  Sfid::Null,
  Sfid::Sampler,
  Sfid::Gateway,
  Sfid::Urb,
  Sfid::RenderCache,
  Sfid::Dc0,
  Sfid::Dc1,
  Sfid::Ugm,
  Sfid::Ugml,
  Sfid::Slm,
  Sfid::Tgm,
  Sfid::Rta,
];

pub fn sfid_name(sfid: Sfid) -> String {
  format!("{:?}", sfid).to_lowercase()
}

pub fn sfid_from_name(name: &str) -> Option<Sfid> {
  ALL_SFIDS.iter().cloned().find(|&s| sfid_name(s) == name)
}

pub const ALL_PRED_CTRLS: &[PredCtrl] = &[
  PredCtrl::Seq,
  PredCtrl::Any,
  PredCtrl::All,
  PredCtrl::Any2h,
  PredCtrl::Any4h,
  PredCtrl::Any8h,
  PredCtrl::Any16h,
  PredCtrl::All16h,
];

pub fn pred_ctrl_name(ctrl: PredCtrl) -> String {
  format!("{:?}", ctrl).to_lowercase()
}

pub fn pred_ctrl_from_name(name: &str) -> Option<PredCtrl> {
  ALL_PRED_CTRLS.iter().cloned().find(|&c| pred_ctrl_name(c) == name)
}

pub const ALL_COND_MODS: &[CondMod] = &[
  CondMod::Eq,
  CondMod::Ne,
  CondMod::Gt,
  CondMod::Ge,
  CondMod::Lt,
  CondMod::Le,
  CondMod::Ov,
  CondMod::Un,
];

pub fn cond_mod_name(cm: CondMod) -> String {
  format!("{:?}", cm).to_lowercase()
}

pub fn cond_mod_from_name(name: &str) -> Option<CondMod> {
  ALL_COND_MODS.iter().cloned().find(|&c| cond_mod_name(c) == name)
}

/// Register file prefixes, longest first so that they can be matched
/// greedily.
pub const REG_PREFIXES: &[(&str, RegName)] = &[
  ("null", RegName::Null),
  ("acc", RegName::Acc),
  ("cr", RegName::Control),
  ("sr", RegName::State),
  ("ce", RegName::ChannelEnable),
  ("tm", RegName::Other),
  ("r", RegName::Grf),
  ("a", RegName::Address),
  ("f", RegName::Flag),
];

pub fn reg_prefix(reg: RegName) -> &'static str {
  match REG_PREFIXES.iter().find(|(_, r)| *r == reg) {
    Some((prefix, _)) => prefix,
    None => "?",
  }
}

/// Split `r12` into `(Grf, 12)`.
pub fn split_reg(word: &str) -> Option<(RegName, u16)> {
  for &(prefix, reg) in REG_PREFIXES {
    if !word.starts_with(prefix) {
      continue;
    }
    let num = &word[prefix.len()..];
    if reg == RegName::Null {
      return if num.is_empty() { Some((reg, 0)) } else { None };
    }
    if let Ok(n) = num.parse::<u16>() {
      return Some((reg, n));
    }
  }
  None
}

//=============================================================================
// Instructions

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inst {
  pub desc: InstDesc,
  pub annotation: Annotation,
}

impl Inst {
  pub fn new(desc: InstDesc) -> Self {
    Self { desc, annotation: Annotation::default() }
  }

  pub fn sync(fc: SyncFc) -> Self {
    Self::new(InstDesc::sync(fc))
  }
}

// Convenience constructors for test cases.  Sources read `exec` consecutive
// elements; destinations are packed.

pub fn r(reg: u16, ty: Type) -> Operand {
  Operand::grf(reg, 0, Region::DST1, ty)
}

pub fn rs(reg: u16, ty: Type) -> Operand {
  Operand::grf(reg, 0, Region::SRC110, ty)
}

pub fn i_alu(op: Op, exec: u8, dst: Operand, srcs: &[Operand]) -> Inst {
  let mut desc = InstDesc::new(op, exec).with_dst(dst);
  for &src in srcs {
    desc = desc.with_src(src);
  }
  Inst::new(desc)
}

/// `add (exec) rD:f rA:f rB:f`
pub fn i_add(exec: u8, d: u16, a: u16, b: u16) -> Inst {
  i_alu(Op::Add, exec, r(d, Type::F), &[rs(a, Type::F), rs(b, Type::F)])
}

/// Same, on integers.
pub fn i_addi(exec: u8, d: u16, a: u16, b: u16) -> Inst {
  i_alu(Op::Add, exec, r(d, Type::D), &[rs(a, Type::D), rs(b, Type::D)])
}

pub fn i_mov(exec: u8, d: u16, a: u16) -> Inst {
  i_alu(Op::Mov, exec, r(d, Type::F), &[rs(a, Type::F)])
}

pub fn i_math(fc: MathFc, exec: u8, d: u16, a: u16) -> Inst {
  i_alu(Op::Math(fc), exec, r(d, Type::F), &[rs(a, Type::F)])
}

/// A load of `dst_len` registers into `rD` with a one register address
/// payload in `rA`.
pub fn i_load(sfid: Sfid, d: u16, dst_len: u8, a: u16) -> Inst {
  let desc = InstDesc::new(Op::Send, 8)
    .with_dst(r(d, Type::UD))
    .with_src(rs(a, Type::UD))
    .with_src(Operand::null(Type::UD))
    .with_send(SendDesc {
      sfid: Some(sfid),
      dst_len: Some(dst_len),
      src0_len: Some(1),
      src1_len: Some(0),
      desc_reg: None,
      ex_desc_reg: None,
    });
  Inst::new(desc)
}

/// A store of `src1_len` registers from `rS` to the address in `rA`.
pub fn i_store(sfid: Sfid, a: u16, s: u16, src1_len: u8) -> Inst {
  let desc = InstDesc::new(Op::Send, 8)
    .with_dst(Operand::null(Type::UD))
    .with_src(rs(a, Type::UD))
    .with_src(rs(s, Type::UD))
    .with_send(SendDesc {
      sfid: Some(sfid),
      dst_len: Some(0),
      src0_len: Some(1),
      src1_len: Some(src1_len),
      desc_reg: None,
      ex_desc_reg: None,
    });
  Inst::new(desc)
}

pub fn i_eot(a: u16) -> Inst {
  let mut inst = i_store(Sfid::Gateway, a, a, 0);
  inst.desc.opts.eot = true;
  inst
}

pub fn i_jmpi(target: BlockIx) -> Inst {
  Inst::new(InstDesc::new(Op::Jmpi, 1).with_src(Operand {
    kind: OperandKind::Label(target.get()),
    ty: Type::D,
  }))
}

/// `call (1) rD:d @target`
pub fn i_call(d: u16, target: BlockIx) -> Inst {
  let desc = InstDesc::new(Op::Call, 1).with_dst(r(d, Type::D)).with_src(
    Operand { kind: OperandKind::Label(target.get()), ty: Type::D },
  );
  Inst::new(desc)
}

/// `dpas.8xR (8) rD:f rD:f rB:hf rC:hf`, accumulating in place.
pub fn i_dpas(repeat: u8, d: u16, b: u16, c: u16) -> Inst {
  let desc = InstDesc::new(Op::Dpas, 8)
    .with_dst(r(d, Type::F))
    .with_src(rs(d, Type::F))
    .with_src(rs(b, Type::HF))
    .with_src(rs(c, Type::HF))
    .with_dpas(8, repeat);
  Inst::new(desc)
}

//-----------------------------------------------------------------------------
// Printing.  The syntax is close to the usual GEN assembly:
//
//   (W&~f0.1.any8h) add (8|M0) (gt)f0.1 r1.0<1>:f r2.0<1;1,0>:f ... {@2}
//
// with sends carrying their message lengths and descriptor registers in
// brackets right after the execution size, e.g. `send.ugm (8|M0) [1,1,0]`.

fn fmt_region(
  fmt: &mut fmt::Formatter,
  region: Region,
  is_dst: bool,
  vxh: bool,
) -> fmt::Result {
  if is_dst {
    write!(fmt, "<{}>", region.hz)
  } else if vxh {
    write!(fmt, "<{},{}>", region.wi, region.hz)
  } else {
    write!(fmt, "<{};{},{}>", region.vt, region.wi, region.hz)
  }
}

fn fmt_operand(
  fmt: &mut fmt::Formatter,
  op: &Operand,
  is_dst: bool,
) -> fmt::Result {
  match op.kind {
    OperandKind::Direct { reg: RegName::Null, .. } => {
      write!(fmt, "null")?;
    }
    OperandKind::Direct { reg, rr, region } => {
      write!(fmt, "{}{}.{}", reg_prefix(reg), rr.reg_num, rr.sub_reg_num)?;
      fmt_region(fmt, region, is_dst, false)?;
    }
    OperandKind::Indirect { addr, region, vxh } => {
      write!(fmt, "r[a{}.{}]", addr.reg_num, addr.sub_reg_num)?;
      fmt_region(fmt, region, is_dst, vxh)?;
    }
    OperandKind::Imm(value) => {
      write!(fmt, "0x{:x}", value)?;
    }
    OperandKind::Label(block) => {
      return write!(fmt, "@{}", block);
    }
  }
  write!(fmt, ":{}", op.ty.name())
}

fn fmt_len(fmt: &mut fmt::Formatter, len: Option<u8>) -> fmt::Result {
  match len {
    Some(n) => write!(fmt, "{}", n),
    None => write!(fmt, "?"),
  }
}

fn fmt_addr(fmt: &mut fmt::Formatter, reg: Option<RegRef>) -> fmt::Result {
  match reg {
    Some(rr) => write!(fmt, "a{}.{}", rr.reg_num, rr.sub_reg_num),
    None => write!(fmt, "-"),
  }
}

fn fmt_send(fmt: &mut fmt::Formatter, send: &SendDesc) -> fmt::Result {
  write!(fmt, " [")?;
  fmt_len(fmt, send.dst_len)?;
  write!(fmt, ",")?;
  fmt_len(fmt, send.src0_len)?;
  write!(fmt, ",")?;
  fmt_len(fmt, send.src1_len)?;
  if send.desc_reg.is_some() || send.ex_desc_reg.is_some() {
    write!(fmt, ";")?;
    fmt_addr(fmt, send.desc_reg)?;
    write!(fmt, ",")?;
    fmt_addr(fmt, send.ex_desc_reg)?;
  }
  write!(fmt, "]")
}

/// The items between the braces: options first, then the annotation.
fn braces(inst: &Inst) -> Vec<String> {
  let d = &inst.desc;
  let swsb = &inst.annotation.swsb;
  let mut items = Vec::new();
  if d.opts.atomic || inst.annotation.atomic {
    items.push("Atomic".to_string());
  }
  if d.opts.eot {
    items.push("EOT".to_string());
  }
  if d.opts.acc_wr_en {
    items.push("AccWrEn".to_string());
  }
  if swsb.has_dist() {
    let prefix = match swsb.dist_type {
      DistType::RegDistAll => "A",
      DistType::RegDistFloat => "F",
      DistType::RegDistInt => "I",
      DistType::RegDistLong => "L",
      DistType::RegDistMath => "M",
      _ => "",
    };
    items.push(format!("{}@{}", prefix, swsb.min_dist));
  }
  match swsb.token_type {
    TokenType::NoToken => {}
    TokenType::Set => items.push(format!("${}", swsb.sbid)),
    TokenType::Src => items.push(format!("${}.src", swsb.sbid)),
    TokenType::Dst => items.push(format!("${}.dst", swsb.sbid)),
  }
  items
}

impl fmt::Display for Inst {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    let d = &self.desc;
    match (d.no_mask, d.pred) {
      (false, None) => {}
      (true, None) => write!(fmt, "(W) ")?,
      (no_mask, Some(pred)) => {
        write!(fmt, "(")?;
        if no_mask {
          write!(fmt, "W&")?;
        }
        if pred.inverse {
          write!(fmt, "~")?;
        }
        write!(fmt, "f{}.{}", d.flag.reg_num, d.flag.sub_reg_num)?;
        if pred.ctrl != PredCtrl::Seq {
          write!(fmt, ".{}", pred_ctrl_name(pred.ctrl))?;
        }
        write!(fmt, ") ")?;
      }
    }

    write!(fmt, "{}", d.op.name())?;
    if let Some(sfid) = d.send.and_then(|s| s.sfid) {
      write!(fmt, ".{}", sfid_name(sfid))?;
    }
    if let Some(dpas) = d.dpas {
      write!(fmt, ".{}x{}", dpas.systolic_depth, dpas.repeat_count)?;
    }
    write!(fmt, " ({}|M{})", d.exec_size, d.chan_off)?;
    if let Some(send) = &d.send {
      fmt_send(fmt, send)?;
    }
    if let Some(cm) = d.cond_mod {
      write!(
        fmt,
        " ({})f{}.{}",
        cond_mod_name(cm),
        d.flag.reg_num,
        d.flag.sub_reg_num
      )?;
    }

    if has_dst_operand(d.op) {
      write!(fmt, " ")?;
      match &d.dst {
        Some(dst) => fmt_operand(fmt, dst, true)?,
        None => write!(fmt, "null:ud")?,
      }
    }
    for src in d.srcs.iter() {
      write!(fmt, " ")?;
      fmt_operand(fmt, src, false)?;
    }

    let items = braces(self);
    if !items.is_empty() {
      write!(fmt, " {{{}}}", items.join(", "))?;
    }
    Ok(())
  }
}

//=============================================================================
// Definition of Block and Program, and printing thereof.

#[derive(Clone, Debug)]
pub struct Block {
  pub name: String,
  pub start: InstIx,
  pub len: u32,
}

impl Block {
  pub fn new(name: String, start: InstIx, len: u32) -> Self {
    Self { name, start, len }
  }
}

#[derive(Clone, Debug)]
pub struct Program {
  pub name: String,
  pub insts: TypedIxVec<InstIx, Inst>,

  // Blocks are in order of increasing `Block::start` and tile `insts`.
  pub blocks: TypedIxVec<BlockIx, Block>,
}

impl Program {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      insts: TypedIxVec::new(),
      blocks: TypedIxVec::new(),
    }
  }

  /// Append a block.
  pub fn block(&mut self, name: &str, mut insts: Vec<Inst>) -> BlockIx {
    let start = InstIx::new(self.insts.len());
    let len = insts.len() as u32;
    self.insts.append(&mut insts);
    self.blocks.push(Block::new(name.to_string(), start, len))
  }

  pub fn block_of(&self, ix: InstIx) -> BlockIx {
    for bix in self.blocks.range() {
      let b = &self.blocks[bix];
      if ix.get() < b.start.get() + b.len {
        return bix;
      }
    }
    BlockIx::new(self.blocks.len() - 1)
  }

  pub fn render(&self, who: &str, out: &mut String) -> fmt::Result {
    writeln!(out, "// {}: {}", who, self.name)?;
    for b in self.blocks.iter() {
      writeln!(out, "{}:", b.name)?;
      for i in b.start.get()..b.start.get() + b.len {
        writeln!(out, "    {}", self.insts[InstIx::new(i)])?;
      }
    }
    Ok(())
  }

  pub fn print(&self, who: &str) {
    let mut out = String::new();
    if self.render(who, &mut out).is_ok() {
      println!("");
      print!("{}", out);
    }
  }

  /// Replace the instructions with the annotated ones, and move the block
  /// boundaries accordingly.
  pub fn update_from_result(&mut self, result: SwsbResult<Program>) {
    self.insts = TypedIxVec::from_vec(result.insts);
    let num_blocks = self.blocks.len();
    let total = self.insts.len();
    for bix in self.blocks.range() {
      let start = result.target_map[bix];
      let end = if bix.get() + 1 < num_blocks {
        result.target_map[bix.plus(1)].get()
      } else {
        total
      };
      let block = &mut self.blocks[bix];
      block.start = start;
      block.len = end - start.get();
    }
  }
}

impl Kernel for Program {
  type Inst = Inst;

  fn insts(&self) -> &[Inst] {
    self.insts.elems()
  }

  fn blocks(&self) -> MyRange<BlockIx> {
    self.blocks.range()
  }

  fn block_insts(&self, block: BlockIx) -> MyRange<InstIx> {
    MyRange::new(self.blocks[block].start, self.blocks[block].len as usize)
  }

  fn describe(&self, inst: &Inst) -> InstDesc {
    inst.desc.clone()
  }

  fn gen_sync(&self, kind: SyncKind) -> Inst {
    Inst::sync(match kind {
      SyncKind::Nop => SyncFc::Nop,
      SyncKind::AllRd => SyncFc::AllRd,
      SyncKind::AllWr => SyncFc::AllWr,
    })
  }

  fn annotate(&self, inst: &mut Inst, annotation: &Annotation) {
    inst.annotation = *annotation;
  }
}

/// The annotation of an instruction, for tests.
pub fn swsb_of(inst: &Inst) -> Swsb {
  inst.annotation.swsb
}

#[test]
fn test_print_inst() {
  let mut add = i_add(8, 1, 2, 3);
  add.annotation.swsb = Swsb::dist(DistType::RegDist, 2);
  assert_eq!(
    add.to_string(),
    "add (8|M0) r1.0<1>:f r2.0<1;1,0>:f r3.0<1;1,0>:f {@2}"
  );

  let mut load = i_load(Sfid::Ugm, 10, 2, 20);
  load.annotation.swsb = Swsb::token(TokenType::Set, 3);
  assert_eq!(
    load.to_string(),
    "send.ugm (8|M0) [2,1,0] r10.0<1>:ud r20.0<1;1,0>:ud null:ud {$3}"
  );

  let mut sel = i_alu(Op::Sel, 16, r(4, Type::D), &[rs(5, Type::D)])
    .desc
    .with_pred(RegRef::new(0, 1), PredCtrl::Any8h)
    .with_chan_off(16);
  sel.no_mask = true;
  if let Some(pred) = sel.pred.as_mut() {
    pred.inverse = true;
  }
  assert_eq!(
    Inst::new(sel).to_string(),
    "(W&~f0.1.any8h) sel (16|M16) r4.0<1>:d r5.0<1;1,0>:d"
  );

  let nop = Inst::sync(SyncFc::Nop);
  assert_eq!(nop.to_string(), "sync.nop (1|M0)");

  let call = i_call(8, BlockIx::new(2));
  assert_eq!(call.to_string(), "call (1|M0) r8.0<1>:d @2");
}
