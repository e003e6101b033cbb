/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! A parser for the textual form printed by `Program::render`.  One block
//! label (`name:`) or instruction per line; `//` starts a comment.  Branch
//! targets are written `@name` or `@N` with N a block number.

use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::path::PathBuf;

use rustc_hash::FxHashMap;

use swsb::{
  DistType, DpasDesc, InstDesc, Op, Operand, OperandKind, PredCtrl,
  Predication, RegName, RegRef, Region, SendDesc, Swsb, TokenType, Type,
};

use crate::test_framework::*;

#[derive(Debug)]
pub enum ParseError {
  IoError(io::Error),
  Parse(String),
}

impl From<io::Error> for ParseError {
  fn from(err: io::Error) -> ParseError {
    ParseError::IoError(err)
  }
}

pub type ParseResult<T> = Result<T, ParseError>;

pub fn parse_file(path: PathBuf) -> ParseResult<Program> {
  let basename = match path.file_stem().and_then(|s| s.to_str()) {
    Some(name) => name.to_string(),
    None => {
      return Err(ParseError::Parse(format!("bad file name {:?}", path)))
    }
  };
  let mut file = File::open(path)?;
  let mut content = String::new();
  file.read_to_string(&mut content)?;
  parse_content(&basename, &content)
}

/// Strip the comment, if any, and surrounding whitespace.
fn strip_line(line: &str) -> &str {
  match line.find("//") {
    Some(pos) => line[..pos].trim(),
    None => line.trim(),
  }
}

fn is_label(line: &str) -> bool {
  line.ends_with(':')
    && line.len() > 1
    && line[..line.len() - 1].chars().all(is_alpha_numeric)
}

struct Parser<'l> {
  labels: &'l FxHashMap<String, u32>,
  chars: Vec<char>,
  current: usize,
  line: usize,
}

impl<'l> Parser<'l> {
  fn new(
    labels: &'l FxHashMap<String, u32>,
    source: &str,
    line: usize,
  ) -> Self {
    Self { labels, chars: source.chars().collect(), current: 0, line }
  }

  // Parsing.
  fn peek(&self) -> Option<char> {
    self.chars.get(self.current).cloned()
  }

  fn advance(&mut self) -> Option<char> {
    let c = self.peek();
    if c.is_some() {
      self.current += 1;
    }
    c
  }

  fn skip_whitespace(&mut self) {
    while let Some(c) = self.peek() {
      if c == ' ' || c == '\t' {
        self.current += 1;
      } else {
        break;
      }
    }
  }

  fn read_char(&mut self) -> ParseResult<char> {
    self.skip_whitespace();
    match self.advance() {
      Some(c) => Ok(c),
      None => self.error("expected char"),
    }
  }

  /// Consume `expected` if it comes next, without skipping whitespace.
  fn try_read_char(&mut self, expected: char) -> bool {
    if self.peek() == Some(expected) {
      self.current += 1;
      true
    } else {
      false
    }
  }

  fn expect_char(&mut self, expected: char) -> ParseResult<()> {
    if self.try_read_char(expected) {
      Ok(())
    } else {
      self.error(&format!("expected char '{}'", expected))
    }
  }

  fn is_done(&mut self) -> bool {
    self.skip_whitespace();
    self.peek().is_none()
  }

  /// A run of characters satisfying `pred`, possibly empty.
  fn read_while(&mut self, pred: fn(char) -> bool) -> String {
    let start = self.current;
    while let Some(c) = self.peek() {
      if !pred(c) {
        break;
      }
      self.current += 1;
    }
    self.chars[start..self.current].iter().collect()
  }

  fn read_word(&mut self) -> ParseResult<String> {
    let word = self.read_while(is_alpha_numeric);
    if word.is_empty() {
      self.error("expected a word")
    } else {
      Ok(word)
    }
  }

  /// A decimal or `0x` hexadecimal integer.
  fn read_u64(&mut self) -> ParseResult<u64> {
    let word = self.read_while(is_alpha_numeric);
    let parsed = if word.starts_with("0x") {
      u64::from_str_radix(&word[2..], 16)
    } else {
      word.parse::<u64>()
    };
    match parsed {
      Ok(n) => Ok(n),
      Err(_) => self.error(&format!("expected an integer, got '{}'", word)),
    }
  }

  fn read_int<T: std::convert::TryFrom<u64>>(&mut self) -> ParseResult<T> {
    let n = self.read_u64()?;
    match T::try_from(n) {
      Ok(v) => Ok(v),
      Err(_) => self.error(&format!("integer {} out of range", n)),
    }
  }

  /// `N.M`
  fn read_reg_ref(&mut self) -> ParseResult<RegRef> {
    let reg_num = self.read_int()?;
    self.expect_char('.')?;
    let sub_reg_num = self.read_int()?;
    Ok(RegRef::new(reg_num, sub_reg_num))
  }

  /// `fN.M`
  fn read_flag(&mut self) -> ParseResult<RegRef> {
    self.expect_char('f')?;
    self.read_reg_ref()
  }

  /// `aN.M`
  fn read_addr(&mut self) -> ParseResult<RegRef> {
    self.expect_char('a')?;
    self.read_reg_ref()
  }

  fn read_type(&mut self) -> ParseResult<Type> {
    self.expect_char(':')?;
    let name = self.read_word()?;
    match Type::from_name(&name) {
      Some(ty) => Ok(ty),
      None => self.error(&format!("unknown type '{}'", name)),
    }
  }

  /// `<hz>`, `<wi,hz>` or `<vt;wi,hz>`; returns whether the region is VxH.
  fn read_region(&mut self) -> ParseResult<(Region, bool)> {
    self.expect_char('<')?;
    let first = self.read_int()?;
    if self.try_read_char('>') {
      return Ok((Region::new(0, 0, first), false));
    }
    if self.try_read_char(',') {
      let hz = self.read_int()?;
      self.expect_char('>')?;
      return Ok((Region::new(0, first, hz), true));
    }
    self.expect_char(';')?;
    let wi = self.read_int()?;
    self.expect_char(',')?;
    let hz = self.read_int()?;
    self.expect_char('>')?;
    Ok((Region::new(first, wi, hz), false))
  }

  fn read_label(&mut self) -> ParseResult<u32> {
    self.expect_char('@')?;
    let name = self.read_word()?;
    if let Ok(n) = name.parse::<u32>() {
      return Ok(n);
    }
    match self.labels.get(&name) {
      Some(&n) => Ok(n),
      None => self.error(&format!("unknown block '{}'", name)),
    }
  }

  fn read_operand(&mut self) -> ParseResult<Operand> {
    self.skip_whitespace();
    if self.peek() == Some('@') {
      let block = self.read_label()?;
      return Ok(Operand { kind: OperandKind::Label(block), ty: Type::D });
    }
    if self.peek() == Some('0') {
      let value = self.read_u64()?;
      let ty = self.read_type()?;
      return Ok(Operand::imm(value, ty));
    }
    let start = self.current;
    if self.try_read_char('r') && self.try_read_char('[') {
      let addr = self.read_addr()?;
      self.expect_char(']')?;
      let (region, vxh) = self.read_region()?;
      let ty = self.read_type()?;
      let kind = OperandKind::Indirect { addr, region, vxh };
      return Ok(Operand { kind, ty });
    }
    self.current = start;
    let word = self.read_while(is_alpha);
    let num = self.read_while(is_digit);
    let (reg, reg_num) = match split_reg(&format!("{}{}", word, num)) {
      Some(split) => split,
      None => {
        return self.error(&format!("unknown register '{}{}'", word, num))
      }
    };
    if reg == RegName::Null {
      let ty = self.read_type()?;
      return Ok(Operand::null(ty));
    }
    self.expect_char('.')?;
    let sub_reg_num = self.read_int()?;
    let (region, _) = self.read_region()?;
    let ty = self.read_type()?;
    Ok(Operand::direct(reg, RegRef::new(reg_num, sub_reg_num), region, ty))
  }

  /// `(W)`, `(f0.0)`, `(W&~f1.0.any8h)`...
  fn read_predication(&mut self, desc: &mut InstDesc) -> ParseResult<()> {
    self.expect_char('(')?;
    if self.try_read_char('W') {
      desc.no_mask = true;
      if self.try_read_char(')') {
        return Ok(());
      }
      self.expect_char('&')?;
    }
    let inverse = self.try_read_char('~');
    desc.flag = self.read_flag()?;
    let mut ctrl = PredCtrl::Seq;
    if self.try_read_char('.') {
      let name = self.read_word()?;
      ctrl = match pred_ctrl_from_name(&name) {
        Some(ctrl) => ctrl,
        None => return self.error(&format!("unknown predicate '{}'", name)),
      };
    }
    self.expect_char(')')?;
    desc.pred = Some(Predication { ctrl, inverse });
    Ok(())
  }

  /// `add`, `math.exp`, `send.ugm`, `dpas.8x4`...
  fn read_opcode(&mut self, desc: &mut InstDesc) -> ParseResult<()> {
    self.skip_whitespace();
    let name = self.read_while(|c| is_alpha_numeric(c) || c == '.');
    if let Some(op) = op_from_name(&name) {
      desc.op = op;
      return Ok(());
    }
    let (base, suffix) = match name.rfind('.') {
      Some(pos) => (&name[..pos], &name[pos + 1..]),
      None => return self.error(&format!("unknown opcode '{}'", name)),
    };
    desc.op = match op_from_name(base) {
      Some(op) => op,
      None => return self.error(&format!("unknown opcode '{}'", name)),
    };
    if desc.op.is_send() {
      let sfid = match sfid_from_name(suffix) {
        Some(sfid) => sfid,
        None => return self.error(&format!("unknown sfid '{}'", suffix)),
      };
      desc.send = Some(SendDesc {
        sfid: Some(sfid),
        dst_len: None,
        src0_len: None,
        src1_len: None,
        desc_reg: None,
        ex_desc_reg: None,
      });
      return Ok(());
    }
    if desc.op.is_dpas() {
      let parts: Vec<&str> = suffix.split('x').collect();
      if parts.len() == 2 {
        if let (Ok(depth), Ok(repeat)) =
          (parts[0].parse::<u8>(), parts[1].parse::<u8>())
        {
          desc.dpas =
            Some(DpasDesc { systolic_depth: depth, repeat_count: repeat });
          return Ok(());
        }
      }
      return self.error(&format!("bad dpas shape '{}'", suffix));
    }
    self.error(&format!("unknown opcode '{}'", name))
  }

  fn read_len(&mut self) -> ParseResult<Option<u8>> {
    if self.try_read_char('?') {
      Ok(None)
    } else {
      Ok(Some(self.read_int()?))
    }
  }

  fn read_opt_addr(&mut self) -> ParseResult<Option<RegRef>> {
    if self.try_read_char('-') {
      Ok(None)
    } else {
      Ok(Some(self.read_addr()?))
    }
  }

  /// `[d,s0,s1]` or `[d,s0,s1;aN.M,-]`
  fn read_send_desc(&mut self, desc: &mut InstDesc) -> ParseResult<()> {
    let mut send = match desc.send {
      Some(send) => send,
      None => SendDesc {
        sfid: None,
        dst_len: None,
        src0_len: None,
        src1_len: None,
        desc_reg: None,
        ex_desc_reg: None,
      },
    };
    self.expect_char('[')?;
    send.dst_len = self.read_len()?;
    self.expect_char(',')?;
    send.src0_len = self.read_len()?;
    self.expect_char(',')?;
    send.src1_len = self.read_len()?;
    if self.try_read_char(';') {
      send.desc_reg = self.read_opt_addr()?;
      self.expect_char(',')?;
      send.ex_desc_reg = self.read_opt_addr()?;
    }
    self.expect_char(']')?;
    desc.send = Some(send);
    Ok(())
  }

  /// The contents of `{...}`.
  fn read_braces(&mut self, inst: &mut Inst) -> ParseResult<()> {
    loop {
      self.skip_whitespace();
      if self.try_read_char('}') {
        return Ok(());
      }
      if self.try_read_char('$') {
        let sbid = self.read_int()?;
        let mut token_type = TokenType::Set;
        if self.try_read_char('.') {
          token_type = match self.read_word()?.as_str() {
            "src" => TokenType::Src,
            "dst" => TokenType::Dst,
            other => {
              return self.error(&format!("unknown token kind '{}'", other))
            }
          };
        }
        inst.annotation.swsb.token_type = token_type;
        inst.annotation.swsb.sbid = sbid;
      } else {
        let word = self.read_while(is_alpha);
        if self.try_read_char('@') {
          let dist_type = match DistType::from_prefix(&word) {
            Some(dt) => dt,
            None => return self.error(&format!("unknown pipe '{}'", word)),
          };
          let min_dist = self.read_int()?;
          let tok = inst.annotation.swsb;
          inst.annotation.swsb = Swsb { dist_type, min_dist, ..tok };
        } else {
          match word.as_str() {
            "Atomic" => inst.desc.opts.atomic = true,
            "EOT" => inst.desc.opts.eot = true,
            "AccWrEn" => inst.desc.opts.acc_wr_en = true,
            _ => return self.error(&format!("unknown option '{}'", word)),
          }
        }
      }
      self.skip_whitespace();
      if !self.try_read_char(',') {
        self.expect_char('}')?;
        return Ok(());
      }
    }
  }

  fn read_inst(&mut self) -> ParseResult<Inst> {
    let mut desc = InstDesc::new(Op::Nop, 1);
    self.skip_whitespace();
    if self.peek() == Some('(') {
      self.read_predication(&mut desc)?;
    }
    self.read_opcode(&mut desc)?;

    self.skip_whitespace();
    self.expect_char('(')?;
    desc.exec_size = self.read_int()?;
    self.expect_char('|')?;
    self.expect_char('M')?;
    desc.chan_off = self.read_int()?;
    self.expect_char(')')?;

    self.skip_whitespace();
    if self.peek() == Some('[') {
      self.read_send_desc(&mut desc)?;
    }
    self.skip_whitespace();
    if self.try_read_char('(') {
      let name = self.read_word()?;
      desc.cond_mod = match cond_mod_from_name(&name) {
        Some(cm) => Some(cm),
        None => return self.error(&format!("unknown condition '{}'", name)),
      };
      self.expect_char(')')?;
      desc.flag = self.read_flag()?;
    }

    let mut operands = Vec::new();
    while !self.is_done() && self.peek() != Some('{') {
      operands.push(self.read_operand()?);
    }
    let mut operands = operands.into_iter();
    if has_dst_operand(desc.op) {
      match operands.next() {
        Some(dst) => desc.dst = Some(dst),
        None => return self.error("missing destination"),
      }
    }
    for src in operands {
      desc = desc.with_src(src);
    }

    let mut inst = Inst::new(desc);
    if self.try_read_char('{') {
      self.read_braces(&mut inst)?;
    }
    if !self.is_done() {
      return self.error("trailing characters");
    }
    Ok(inst)
  }

  fn error<T>(&self, msg: &str) -> ParseResult<T> {
    Err(ParseError::Parse(format!("error at line {}: {}", self.line, msg)))
  }
}

pub fn parse_content(name: &str, content: &str) -> ParseResult<Program> {
  // Number the blocks first, so that branches can refer to later ones.
  let mut labels = FxHashMap::default();
  for line in content.lines().map(strip_line) {
    if is_label(line) {
      let n = labels.len() as u32;
      if labels.insert(line[..line.len() - 1].to_string(), n).is_some() {
        return Err(ParseError::Parse(format!("duplicate block {}", line)));
      }
    }
  }

  let mut program = Program::new(name);
  let mut current: Option<(String, Vec<Inst>)> = None;
  for (i, line) in content.lines().map(strip_line).enumerate() {
    if line.is_empty() {
      continue;
    }
    if is_label(line) {
      if let Some((name, insts)) = current.take() {
        program.block(&name, insts);
      }
      current = Some((line[..line.len() - 1].to_string(), Vec::new()));
      continue;
    }
    let mut parser = Parser::new(&labels, line, i + 1);
    let inst = parser.read_inst()?;
    match current.as_mut() {
      Some((_, insts)) => insts.push(inst),
      None => return parser.error("instruction outside of a block"),
    }
  }
  if let Some((name, insts)) = current.take() {
    program.block(&name, insts);
  }
  if program.blocks.is_empty() {
    return Err(ParseError::Parse("no blocks".to_string()));
  }
  Ok(program)
}

fn is_digit(c: char) -> bool {
  c >= '0' && c <= '9'
}

fn is_alpha(c: char) -> bool {
  c >= 'a' && c <= 'z' || c >= 'A' && c <= 'Z' || c == '_'
}

fn is_alpha_numeric(c: char) -> bool {
  is_digit(c) || is_alpha(c)
}

#[test]
fn test_parse_and_render() {
  let source = "
// two blocks
entry:
    send.ugm (8|M0) [2,1,0] r10.0<1>:ud r20.0<1;1,0>:ud null:ud {$0}
    (W&~f0.1.any8h) sel (16|M16) r4.0<1>:d r5.0<1;1,0>:d
    mov (8|M0) (lt)f1.0 r30.0<1>:f r[a0.2]<1,0>:f {@1}
    jmpi (1|M0) @exit
exit:
    add (8|M0) r1.0<1>:f r10.0<1;1,0>:f 0x3f800000:f {F@2, $0.dst}
    send.gateway (8|M0) [0,1,0;a0.0,-] null:ud r1.0<1;1,0>:ud null:ud {EOT}
";
  let program = match parse_content("two_blocks", source) {
    Ok(p) => p,
    Err(e) => panic!("{:?}", e),
  };
  assert_eq!(program.blocks.len(), 2);
  assert_eq!(program.insts.len(), 6);

  let jmpi = &program.insts[swsb::InstIx::new(3)].desc;
  assert_eq!(jmpi.srcs[0].kind, OperandKind::Label(1));

  let mov = &program.insts[swsb::InstIx::new(2)].desc;
  assert_eq!(
    mov.srcs[0].kind,
    OperandKind::Indirect {
      addr: RegRef::new(0, 2),
      region: Region::new(0, 1, 0),
      vxh: true
    }
  );

  let add = &program.insts[swsb::InstIx::new(4)];
  assert_eq!(add.annotation.swsb.dist_type, DistType::RegDistFloat);
  assert_eq!(add.annotation.swsb.token_type, TokenType::Dst);

  // Rendering then parsing again is stable.
  let mut first = String::new();
  assert!(program.render("test", &mut first).is_ok());
  let reparsed = match parse_content("two_blocks", &first) {
    Ok(p) => p,
    Err(e) => panic!("{:?}", e),
  };
  let mut second = String::new();
  assert!(reparsed.render("test", &mut second).is_ok());
  assert_eq!(first, second);
  assert!(first.contains("jmpi (1|M0) @1"));
}

#[test]
fn test_parse_errors() {
  let labels = FxHashMap::default();
  let mut parser = Parser::new(&labels, "frob (8|M0) r1.0<1>:f", 1);
  assert!(parser.read_inst().is_err());
  assert!(parse_content("x", "add (8|M0) r1.0<1>:f r2.0<1;1,0>:f").is_err());
  assert!(parse_content("x", "b:\n    jmpi (1|M0) @nowhere").is_err());
}
