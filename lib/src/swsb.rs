/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The software scoreboard annotation attached to each instruction.

use std::fmt;

use crate::dep_set::DepClass;
use crate::platform::SwsbEncodeMode;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// Which in-order pipe(s) a distance refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum DistType {
  NoDist,
  /// The single in-order pipe, in single-distance-pipe mode.
  RegDist,
  /// All in-order pipes.
  RegDistAll,
  RegDistFloat,
  RegDistInt,
  RegDistLong,
  RegDistMath,
}

impl DistType {
  fn prefix(self) -> &'static str {
    match self {
      DistType::NoDist | DistType::RegDist => "",
      DistType::RegDistAll => "A",
      DistType::RegDistFloat => "F",
      DistType::RegDistInt => "I",
      DistType::RegDistLong => "L",
      DistType::RegDistMath => "M",
    }
  }

  pub fn from_prefix(prefix: &str) -> Option<DistType> {
    Some(match prefix {
      "" => DistType::RegDist,
      "A" => DistType::RegDistAll,
      "F" => DistType::RegDistFloat,
      "I" => DistType::RegDistInt,
      "L" => DistType::RegDistLong,
      "M" => DistType::RegDistMath,
      _ => return None,
    })
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum TokenType {
  NoToken,
  /// Wait until the producer holding the id has read its sources.
  Src,
  /// Wait until the producer holding the id has written its destination.
  Dst,
  /// This instruction takes the id.
  Set,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Swsb {
  pub dist_type: DistType,
  pub min_dist: u32,
  pub token_type: TokenType,
  pub sbid: u32,
}

impl Default for Swsb {
  fn default() -> Self {
    Self {
      dist_type: DistType::NoDist,
      min_dist: 0,
      token_type: TokenType::NoToken,
      sbid: 0,
    }
  }
}

impl Swsb {
  pub fn dist(dist_type: DistType, min_dist: u32) -> Self {
    Self { dist_type, min_dist, ..Self::default() }
  }

  pub fn token(token_type: TokenType, sbid: u32) -> Self {
    Self { token_type, sbid, ..Self::default() }
  }

  pub fn has_dist(&self) -> bool {
    self.dist_type != DistType::NoDist
  }

  pub fn has_token(&self) -> bool {
    self.token_type != TokenType::NoToken
  }

  pub fn is_empty(&self) -> bool {
    !self.has_dist() && !self.has_token()
  }

  pub fn has_both(&self) -> bool {
    self.has_dist() && self.has_token()
  }

  pub fn clear_dist(&mut self) {
    self.dist_type = DistType::NoDist;
    self.min_dist = 0;
  }

  pub fn clear_token(&mut self) {
    self.token_type = TokenType::NoToken;
    self.sbid = 0;
  }

  /// Split off the distance part, leaving only the token here.
  pub fn take_dist(&mut self) -> Swsb {
    let d = Swsb::dist(self.dist_type, self.min_dist);
    self.clear_dist();
    d
  }

  /// Split off the token part, leaving only the distance here.
  pub fn take_token(&mut self) -> Swsb {
    let t = Swsb::token(self.token_type, self.sbid);
    self.clear_token();
    t
  }

  /// Can this be encoded on an instruction of class `class`?  In the
  /// multi-pipe modes a distance and a token can only be combined when the
  /// token sets an id, or when the distance covers all pipes.
  pub fn verify(&self, mode: SwsbEncodeMode, class: DepClass) -> bool {
    if !self.has_both() || mode == SwsbEncodeMode::SingleDistPipe {
      return true;
    }
    match class {
      DepClass::OutOfOrder => self.token_type == TokenType::Set,
      _ => self.dist_type == DistType::RegDistAll,
    }
  }

  /// Make this encodable by splitting off the distance or the token, which
  /// is returned to be carried by a `sync.nop` placed before the
  /// instruction.  A send only keeps a token that sets an id.
  pub fn split_invalid(
    &mut self,
    mode: SwsbEncodeMode,
    class: DepClass,
    is_send: bool,
    prefer_move_sbid: bool,
  ) -> Option<Swsb> {
    if self.verify(mode, class) {
      return None;
    }
    if is_send {
      return if self.token_type == TokenType::Set {
        Some(self.take_dist())
      } else if self.has_token() {
        Some(self.take_token())
      } else {
        None
      };
    }
    Some(if prefer_move_sbid {
      self.take_token()
    } else {
      self.take_dist()
    })
  }

  /// Fold the distance of `other` into this one.  Distances on different
  /// pipes become a wait on all of them.
  pub fn merge_dist(&mut self, other: &Swsb) {
    if !other.has_dist() {
      return;
    }
    if !self.has_dist() {
      self.dist_type = other.dist_type;
      self.min_dist = other.min_dist;
    } else {
      if self.dist_type != other.dist_type {
        self.dist_type = DistType::RegDistAll;
      }
      self.min_dist = std::cmp::min(self.min_dist, other.min_dist);
    }
  }
}

impl fmt::Display for Swsb {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{{")?;
    if self.has_dist() {
      write!(fmt, "{}@{}", self.dist_type.prefix(), self.min_dist)?;
    }
    if self.has_token() {
      if self.has_dist() {
        write!(fmt, ", ")?;
      }
      match self.token_type {
        TokenType::Src => write!(fmt, "${}.src", self.sbid)?,
        TokenType::Dst => write!(fmt, "${}.dst", self.sbid)?,
        _ => write!(fmt, "${}", self.sbid)?,
      }
    }
    write!(fmt, "}}")
  }
}

impl fmt::Debug for Swsb {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    fmt::Display::fmt(self, fmt)
  }
}

/// The synchronization instructions the pass may insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum SyncKind {
  Nop,
  AllRd,
  AllWr,
}

/// What the pass attaches to an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Annotation {
  pub swsb: Swsb,
  /// The instruction is a non-final member of an atomic group.
  pub atomic: bool,
}

#[test]
fn test_swsb_display() {
  assert_eq!(Swsb::default().to_string(), "{}");
  assert_eq!(Swsb::dist(DistType::RegDist, 3).to_string(), "{@3}");
  assert_eq!(Swsb::dist(DistType::RegDistFloat, 2).to_string(), "{F@2}");
  assert_eq!(Swsb::token(TokenType::Set, 1).to_string(), "{$1}");
  let both = Swsb {
    dist_type: DistType::RegDistAll,
    min_dist: 1,
    token_type: TokenType::Dst,
    sbid: 3,
  };
  assert_eq!(both.to_string(), "{A@1, $3.dst}");
}

#[test]
fn test_swsb_split() {
  let mut s = Swsb {
    dist_type: DistType::RegDistInt,
    min_dist: 4,
    token_type: TokenType::Src,
    sbid: 7,
  };
  assert!(s.has_both());
  let d = s.take_dist();
  assert_eq!(d, Swsb::dist(DistType::RegDistInt, 4));
  assert_eq!(s, Swsb::token(TokenType::Src, 7));
  let t = s.take_token();
  assert!(s.is_empty());
  assert_eq!(t.sbid, 7);
  assert_eq!(DistType::from_prefix("I"), Some(DistType::RegDistInt));
  assert_eq!(DistType::from_prefix("X"), None);
}

#[test]
fn test_swsb_encodability() {
  let multi = SwsbEncodeMode::ThreeDistPipe;
  let mut s = Swsb {
    dist_type: DistType::RegDistInt,
    min_dist: 2,
    token_type: TokenType::Dst,
    sbid: 4,
  };
  assert!(s.verify(SwsbEncodeMode::SingleDistPipe, DepClass::InOrder));
  assert!(!s.verify(multi, DepClass::InOrder));
  assert!(!s.verify(multi, DepClass::OutOfOrder));

  let mut t = s;
  let moved = t.split_invalid(multi, DepClass::InOrder, false, true);
  assert_eq!(moved, Some(Swsb::token(TokenType::Dst, 4)));
  assert_eq!(t, Swsb::dist(DistType::RegDistInt, 2));

  // A send keeps the id it sets and loses the distance.
  s.token_type = TokenType::Set;
  assert!(s.verify(multi, DepClass::OutOfOrder));
  s.dist_type = DistType::RegDistFloat;
  let moved = s.split_invalid(multi, DepClass::Other, true, false);
  assert_eq!(moved, Some(Swsb::dist(DistType::RegDistFloat, 2)));
  assert_eq!(s, Swsb::token(TokenType::Set, 4));

  let all = Swsb {
    dist_type: DistType::RegDistAll,
    min_dist: 1,
    token_type: TokenType::Src,
    sbid: 0,
  };
  assert!(all.verify(multi, DepClass::InOrder));
  assert!(!all.verify(multi, DepClass::OutOfOrder));
}

#[test]
fn test_swsb_merge_dist() {
  let mut s = Swsb::token(TokenType::Src, 1);
  s.merge_dist(&Swsb::dist(DistType::RegDistFloat, 3));
  assert_eq!(s.dist_type, DistType::RegDistFloat);
  s.merge_dist(&Swsb::dist(DistType::RegDistFloat, 5));
  assert_eq!(s.min_dist, 3);
  s.merge_dist(&Swsb::dist(DistType::RegDistInt, 2));
  assert_eq!(s.dist_type, DistType::RegDistAll);
  assert_eq!(s.min_dist, 2);
  s.merge_dist(&Swsb::default());
  assert_eq!(s.min_dist, 2);
}
