/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The decoded view of an instruction that clients hand to the analysis.
//! This is the only thing the analysis knows about the client's instruction
//! representation.

use smallvec::SmallVec;
use std::fmt;

//=============================================================================
// Registers

/// Register files.  Only the GRF, the address register, the accumulators,
/// the flags and the special registers (`cr`, `sr`, `ce`) are tracked;
/// accesses to anything else are not hazards as far as this pass goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegName {
  Grf,
  Address,
  Acc,
  Flag,
  Control,
  State,
  ChannelEnable,
  Null,
  /// Some architecture register we don't track (`tm0`, `ip`, `sp`, ...).
  Other,
}

impl RegName {
  pub fn is_special(self) -> bool {
    match self {
      RegName::Control | RegName::State | RegName::ChannelEnable => true,
      _ => false,
    }
  }

  pub fn is_tracked(self) -> bool {
    match self {
      RegName::Grf | RegName::Address | RegName::Acc | RegName::Flag => true,
      _ => self.is_special(),
    }
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegRef {
  pub reg_num: u16,
  pub sub_reg_num: u16,
}

impl RegRef {
  pub fn new(reg_num: u16, sub_reg_num: u16) -> Self {
    Self { reg_num, sub_reg_num }
  }
}

impl fmt::Debug for RegRef {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{}.{}", self.reg_num, self.sub_reg_num)
  }
}

/// A `<vt;wi,hz>` region, in elements.  Destinations only use `hz`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
  pub vt: u16,
  pub wi: u16,
  pub hz: u16,
}

impl Region {
  pub const SRC010: Region = Region { vt: 0, wi: 1, hz: 0 };
  pub const SRC110: Region = Region { vt: 1, wi: 1, hz: 0 };
  pub const SRC221: Region = Region { vt: 2, wi: 2, hz: 1 };
  pub const SRC881: Region = Region { vt: 8, wi: 8, hz: 1 };
  pub const DST1: Region = Region { vt: 0, wi: 0, hz: 1 };

  pub fn new(vt: u16, wi: u16, hz: u16) -> Self {
    Self { vt, wi, hz }
  }
}

//=============================================================================
// Types

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
  UB,
  B,
  UW,
  W,
  HF,
  BF,
  UD,
  D,
  F,
  TF32,
  UQ,
  Q,
  DF,
}

impl Type {
  pub fn size_bits(self) -> u32 {
    match self {
      Type::UB | Type::B => 8,
      Type::UW | Type::W | Type::HF | Type::BF => 16,
      Type::UD | Type::D | Type::F | Type::TF32 => 32,
      Type::UQ | Type::Q | Type::DF => 64,
    }
  }

  pub fn size_bytes(self) -> u32 {
    self.size_bits() / 8
  }

  pub fn is_64bit(self) -> bool {
    self.size_bits() == 64
  }

  pub fn is_float(self) -> bool {
    match self {
      Type::HF | Type::BF | Type::F | Type::TF32 | Type::DF => true,
      _ => false,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Type::UB => "ub",
      Type::B => "b",
      Type::UW => "uw",
      Type::W => "w",
      Type::HF => "hf",
      Type::BF => "bf",
      Type::UD => "ud",
      Type::D => "d",
      Type::F => "f",
      Type::TF32 => "tf32",
      Type::UQ => "uq",
      Type::Q => "q",
      Type::DF => "df",
    }
  }

  pub fn from_name(name: &str) -> Option<Type> {
    Some(match name {
      "ub" => Type::UB,
      "b" => Type::B,
      "uw" => Type::UW,
      "w" => Type::W,
      "hf" => Type::HF,
      "bf" => Type::BF,
      "ud" => Type::UD,
      "d" => Type::D,
      "f" => Type::F,
      "tf32" => Type::TF32,
      "uq" => Type::UQ,
      "q" => Type::Q,
      "df" => Type::DF,
      _ => return None,
    })
  }
}

//=============================================================================
// Opcodes

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MathFc {
  Inv,
  Log,
  Exp,
  Sqrt,
  Rsqt,
  Sin,
  Cos,
  Fdiv,
  Pow,
  Idiv,
  Iqot,
  Irem,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncFc {
  Nop,
  AllRd,
  AllWr,
  Bar,
  Host,
}

/// Shared function ids of the message units a send can talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sfid {
  Null,
  Sampler,
  Gateway,
  Urb,
  RenderCache,
  Dc0,
  Dc1,
  Ugm,
  Ugml,
  Slm,
  Tgm,
  Rta,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
  Illegal,
  Nop,
  Mov,
  Movi,
  Sel,
  Not,
  And,
  Or,
  Xor,
  Shl,
  Shr,
  Asr,
  Cmp,
  Add,
  Add3,
  Addc,
  Subb,
  Mul,
  Mac,
  Mach,
  Mad,
  Bfn,
  Frc,
  Rndd,
  Srnd,
  Math(MathFc),
  Send,
  Sendc,
  Dpas,
  Dpasw,
  Sync(SyncFc),
  Jmpi,
  Brc,
  Brd,
  If,
  Else,
  Endif,
  While,
  Break,
  Cont,
  Halt,
  Goto,
  Join,
  Call,
  Calla,
  Ret,
}

impl Op {
  pub fn is_send(self) -> bool {
    match self {
      Op::Send | Op::Sendc => true,
      _ => false,
    }
  }

  pub fn is_math(self) -> bool {
    match self {
      Op::Math(_) => true,
      _ => false,
    }
  }

  pub fn is_dpas(self) -> bool {
    match self {
      Op::Dpas | Op::Dpasw => true,
      _ => false,
    }
  }

  pub fn is_sync(self) -> bool {
    match self {
      Op::Sync(_) => true,
      _ => false,
    }
  }

  pub fn is_branch(self) -> bool {
    match self {
      Op::Jmpi
      | Op::Brc
      | Op::Brd
      | Op::If
      | Op::Else
      | Op::Endif
      | Op::While
      | Op::Break
      | Op::Cont
      | Op::Halt
      | Op::Goto
      | Op::Join
      | Op::Call
      | Op::Calla
      | Op::Ret => true,
      _ => false,
    }
  }

  /// Three-source instructions, whose align1 regions have implicit parts.
  pub fn is_ternary(self) -> bool {
    match self {
      Op::Mad | Op::Add3 | Op::Bfn => true,
      _ => false,
    }
  }

  pub fn name(self) -> String {
    match self {
      Op::Math(fc) => format!("math.{}", format!("{:?}", fc).to_lowercase()),
      Op::Sync(fc) => format!("sync.{}", format!("{:?}", fc).to_lowercase()),
      _ => format!("{:?}", self).to_lowercase(),
    }
  }
}

//=============================================================================
// Predication and condition modifiers

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PredCtrl {
  Seq,
  Any,
  All,
  Any2h,
  Any4h,
  Any8h,
  Any16h,
  All16h,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Predication {
  pub ctrl: PredCtrl,
  pub inverse: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CondMod {
  Eq,
  Ne,
  Gt,
  Ge,
  Lt,
  Le,
  Ov,
  Un,
}

//=============================================================================
// Operands

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandKind {
  Direct { reg: RegName, rr: RegRef, region: Region },
  /// `r[a0.N]`: the register is only known at run time.  A VxH region reads
  /// `exec_size / region.wi` address sub-registers, otherwise one.
  Indirect { addr: RegRef, region: Region, vxh: bool },
  Imm(u64),
  /// A branch target: the index of a block, in layout order.
  Label(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Operand {
  pub kind: OperandKind,
  pub ty: Type,
}

impl Operand {
  pub fn direct(reg: RegName, rr: RegRef, region: Region, ty: Type) -> Self {
    Self { kind: OperandKind::Direct { reg, rr, region }, ty }
  }

  pub fn grf(reg_num: u16, sub_reg_num: u16, region: Region, ty: Type) -> Self {
    Self::direct(RegName::Grf, RegRef::new(reg_num, sub_reg_num), region, ty)
  }

  pub fn null(ty: Type) -> Self {
    Self::direct(RegName::Null, RegRef::default(), Region::DST1, ty)
  }

  pub fn imm(value: u64, ty: Type) -> Self {
    Self { kind: OperandKind::Imm(value), ty }
  }

  pub fn direct_grf(&self) -> Option<RegRef> {
    match self.kind {
      OperandKind::Direct { reg: RegName::Grf, rr, .. } => Some(rr),
      _ => None,
    }
  }
}

//=============================================================================
// Instruction descriptions

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SendDesc {
  /// `None` when the message target is only known at run time.
  pub sfid: Option<Sfid>,
  /// Message lengths in registers; `None` when the descriptor lives in a
  /// register and the length can't be deduced.
  pub dst_len: Option<u8>,
  pub src0_len: Option<u8>,
  pub src1_len: Option<u8>,
  /// Address registers holding the descriptors, if any.
  pub desc_reg: Option<RegRef>,
  pub ex_desc_reg: Option<RegRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DpasDesc {
  pub systolic_depth: u8,
  pub repeat_count: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct InstOpts {
  pub atomic: bool,
  pub eot: bool,
  pub acc_wr_en: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstDesc {
  pub op: Op,
  pub exec_size: u8,
  /// Channel offset, in channels (the `M8` in `(8|M8)`).
  pub chan_off: u8,
  pub no_mask: bool,
  pub pred: Option<Predication>,
  pub cond_mod: Option<CondMod>,
  pub flag: RegRef,
  pub dst: Option<Operand>,
  pub srcs: SmallVec<[Operand; 3]>,
  pub send: Option<SendDesc>,
  pub dpas: Option<DpasDesc>,
  pub opts: InstOpts,
}

impl InstDesc {
  pub fn new(op: Op, exec_size: u8) -> Self {
    Self {
      op,
      exec_size,
      chan_off: 0,
      no_mask: false,
      pred: None,
      cond_mod: None,
      flag: RegRef::default(),
      dst: None,
      srcs: SmallVec::new(),
      send: None,
      dpas: None,
      opts: InstOpts::default(),
    }
  }

  pub fn sync(fc: SyncFc) -> Self {
    let mut desc = Self::new(Op::Sync(fc), 1);
    desc.no_mask = true;
    desc
  }

  pub fn with_dst(mut self, dst: Operand) -> Self {
    self.dst = Some(dst);
    self
  }

  pub fn with_src(mut self, src: Operand) -> Self {
    self.srcs.push(src);
    self
  }

  pub fn with_chan_off(mut self, chan_off: u8) -> Self {
    self.chan_off = chan_off;
    self
  }

  pub fn with_pred(mut self, flag: RegRef, ctrl: PredCtrl) -> Self {
    self.flag = flag;
    self.pred = Some(Predication { ctrl, inverse: false });
    self
  }

  pub fn with_cond_mod(mut self, flag: RegRef, cond_mod: CondMod) -> Self {
    self.flag = flag;
    self.cond_mod = Some(cond_mod);
    self
  }

  pub fn with_send(mut self, send: SendDesc) -> Self {
    self.send = Some(send);
    self
  }

  pub fn with_dpas(mut self, depth: u8, repeat: u8) -> Self {
    self.dpas =
      Some(DpasDesc { systolic_depth: depth, repeat_count: repeat });
    self
  }

  pub fn with_opts(mut self, opts: InstOpts) -> Self {
    self.opts = opts;
    self
  }

  pub fn is_eot_send(&self) -> bool {
    self.op.is_send() && self.opts.eot
  }

  /// Does this instruction write through a destination operand at all?
  pub fn has_dst(&self) -> bool {
    match self.op {
      Op::Nop | Op::Sync(_) | Op::Illegal => false,
      _ => self.dst.is_some(),
    }
  }

  /// The condition modifier writes the flag, except on `sel` which reads it.
  pub fn writes_flag(&self) -> bool {
    self.cond_mod.is_some() && self.op != Op::Sel
  }

  pub fn reads_flag(&self) -> bool {
    self.pred.is_some() || (self.op == Op::Sel && self.cond_mod.is_some())
  }

  /// Does any operand use a 64-bit type?
  pub fn has_64bit_operand(&self) -> bool {
    self.dst.iter().chain(self.srcs.iter()).any(|op| op.ty.is_64bit())
  }
}

#[test]
fn test_desc_flags() {
  let f0 = RegRef::new(0, 0);
  let sel = InstDesc::new(Op::Sel, 8).with_cond_mod(f0, CondMod::Lt);
  assert!(sel.reads_flag());
  assert!(!sel.writes_flag());

  let cmp = InstDesc::new(Op::Cmp, 8).with_cond_mod(f0, CondMod::Lt);
  assert!(!cmp.reads_flag());
  assert!(cmp.writes_flag());

  let add = InstDesc::new(Op::Add, 8)
    .with_dst(Operand::grf(1, 0, Region::DST1, Type::DF))
    .with_pred(f0, PredCtrl::Seq);
  assert!(add.reads_flag());
  assert!(add.has_64bit_operand());
  assert!(add.has_dst());

  assert_eq!(Op::Math(MathFc::Idiv).name(), "math.idiv");
  assert_eq!(Op::Sync(SyncFc::AllRd).name(), "sync.allrd");
  assert_eq!(Op::Mov.name(), "mov");
}
