/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Platform parameters consumed by the analysis, and the options a client
//! uses to select and override them.

use crate::interface::SwsbError;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// The largest distance a token can encode.
pub const MAX_VALID_DISTANCE: u32 = 7;

/// The largest scoreboard pool any platform provides.
pub const MAX_SBID_COUNT: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Platform {
  XeLp,
  XeHp,
  XeHpg,
  XeHpc,
}

impl Platform {
  pub fn all() -> &'static [Platform] {
    &[Platform::XeLp, Platform::XeHp, Platform::XeHpg, Platform::XeHpc]
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    let name = match self {
      Platform::XeLp => "xelp",
      Platform::XeHp => "xehp",
      Platform::XeHpg => "xehpg",
      Platform::XeHpc => "xehpc",
    };
    write!(fmt, "{}", name)
  }
}

impl FromStr for Platform {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "xelp" => Ok(Platform::XeLp),
      "xehp" => Ok(Platform::XeHp),
      "xehpg" => Ok(Platform::XeHpg),
      "xehpc" => Ok(Platform::XeHpc),
      _ => Err(format!("unknown platform '{}'", s)),
    }
  }
}

/// How many in-order pipes the distance field can name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum SwsbEncodeMode {
  /// One unified in-order distance.
  SingleDistPipe,
  /// Float, integer and long pipes; math is out of order.
  ThreeDistPipe,
  /// As `ThreeDistPipe`, but double precision math runs in the long pipe.
  ThreeDistPipeDpMath,
  /// Float, integer, long and in-order math pipes.
  FourDistPipe,
}

impl SwsbEncodeMode {
  pub fn num_dist_pipes(self) -> u32 {
    match self {
      SwsbEncodeMode::SingleDistPipe => 1,
      SwsbEncodeMode::ThreeDistPipe | SwsbEncodeMode::ThreeDistPipeDpMath => 3,
      SwsbEncodeMode::FourDistPipe => 4,
    }
  }
}

/// Register file sizes.  The files are laid out in this order in the
/// flattened address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct RegGeometry {
  pub grf_regs: u32,
  pub grf_bytes_per_reg: u32,
  pub a_regs: u32,
  pub a_bytes_per_reg: u32,
  pub acc_regs: u32,
  pub acc_bytes_per_reg: u32,
  pub flag_regs: u32,
  pub flag_bytes_per_reg: u32,
  pub special_regs: u32,
  pub special_bytes_per_reg: u32,
}

/// Back-to-back latencies, in instructions of the same pipe, after which an
/// in-order producer is known to have retired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct PipeLatencies {
  pub in_order: u32,
  pub long64: u32,
  pub math_in_order: u32,
}

/// Options for a run of the analysis.  Everything but the platform is an
/// override of the platform default.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SwsbOptions {
  pub platform: Platform,
  pub sbid_count: Option<u32>,
  pub latencies: Option<PipeLatencies>,
  pub max_distance: Option<u32>,
  pub grf_regs: Option<u32>,
  pub read_suppression_wa: Option<bool>,
}

impl SwsbOptions {
  pub fn new(platform: Platform) -> Self {
    Self {
      platform,
      sbid_count: None,
      latencies: None,
      max_distance: None,
      grf_regs: None,
      read_suppression_wa: None,
    }
  }

  /// Resolve the options against the platform defaults.
  pub fn caps(&self) -> Result<PlatformCaps, SwsbError> {
    let mut caps = PlatformCaps::new(self.platform);
    if let Some(n) = self.sbid_count {
      if n == 0 || n > MAX_SBID_COUNT {
        return Err(SwsbError::Config(format!(
          "sbid count must be within 1..={}, got {}",
          MAX_SBID_COUNT, n
        )));
      }
      caps.sbid_count = n;
    }
    if let Some(lat) = self.latencies {
      if lat.in_order == 0 || lat.long64 == 0 || lat.math_in_order == 0 {
        return Err(SwsbError::Config("pipe latencies must be non-zero".into()));
      }
      caps.latencies = lat;
    }
    if let Some(d) = self.max_distance {
      if d == 0 || d > MAX_VALID_DISTANCE {
        return Err(SwsbError::Config(format!(
          "max distance must be within 1..={}, got {}",
          MAX_VALID_DISTANCE, d
        )));
      }
      caps.max_distance = d;
    }
    if let Some(n) = self.grf_regs {
      if n == 0 || n > 256 {
        return Err(SwsbError::Config(format!(
          "GRF count must be within 1..=256, got {}",
          n
        )));
      }
      caps.geometry.grf_regs = n;
    }
    if let Some(wa) = self.read_suppression_wa {
      caps.read_suppression_wa = wa;
    }
    Ok(caps)
  }
}

/// Everything the analysis needs to know about the target, selected once
/// per run.
#[derive(Clone, Debug)]
pub struct PlatformCaps {
  pub platform: Platform,
  pub mode: SwsbEncodeMode,
  pub geometry: RegGeometry,
  pub sbid_count: u32,
  pub latencies: PipeLatencies,
  pub max_distance: u32,
  pub has_dpas: bool,
  /// Math destinations must be treated as whole registers.
  pub read_suppression_wa: bool,
  /// Byte destinations are read-modify-write of the containing register.
  pub rmw_on_byte_dst: bool,
}

impl PlatformCaps {
  pub fn new(platform: Platform) -> Self {
    let geometry = |grf_bytes, flag_regs| RegGeometry {
      grf_regs: 128,
      grf_bytes_per_reg: grf_bytes,
      a_regs: 1,
      a_bytes_per_reg: 32,
      acc_regs: 8,
      acc_bytes_per_reg: grf_bytes,
      flag_regs,
      flag_bytes_per_reg: 4,
      special_regs: 1,
      special_bytes_per_reg: 16,
    };
    let latencies = |long64| PipeLatencies {
      in_order: 10,
      long64,
      math_in_order: 18,
    };
    match platform {
      Platform::XeLp => PlatformCaps {
        platform,
        mode: SwsbEncodeMode::SingleDistPipe,
        geometry: geometry(32, 2),
        sbid_count: 16,
        latencies: latencies(12),
        max_distance: MAX_VALID_DISTANCE,
        has_dpas: false,
        read_suppression_wa: false,
        rmw_on_byte_dst: false,
      },
      Platform::XeHp => PlatformCaps {
        platform,
        mode: SwsbEncodeMode::ThreeDistPipe,
        geometry: geometry(32, 2),
        sbid_count: 16,
        latencies: latencies(12),
        max_distance: MAX_VALID_DISTANCE,
        has_dpas: true,
        read_suppression_wa: true,
        rmw_on_byte_dst: false,
      },
      Platform::XeHpg => PlatformCaps {
        platform,
        mode: SwsbEncodeMode::ThreeDistPipeDpMath,
        geometry: geometry(32, 2),
        sbid_count: 16,
        latencies: latencies(12),
        max_distance: MAX_VALID_DISTANCE,
        has_dpas: true,
        read_suppression_wa: true,
        rmw_on_byte_dst: false,
      },
      Platform::XeHpc => PlatformCaps {
        platform,
        mode: SwsbEncodeMode::FourDistPipe,
        geometry: geometry(64, 4),
        sbid_count: 32,
        latencies: latencies(14),
        max_distance: MAX_VALID_DISTANCE,
        has_dpas: true,
        read_suppression_wa: false,
        rmw_on_byte_dst: true,
      },
    }
  }

  pub fn num_dist_pipes(&self) -> u32 {
    self.mode.num_dist_pipes()
  }
}

#[test]
fn test_platform_defaults() {
  let lp = PlatformCaps::new(Platform::XeLp);
  assert_eq!(lp.num_dist_pipes(), 1);
  assert_eq!(lp.sbid_count, 16);
  assert_eq!(lp.latencies.long64, 12);

  let hpc = PlatformCaps::new(Platform::XeHpc);
  assert_eq!(hpc.num_dist_pipes(), 4);
  assert_eq!(hpc.sbid_count, 32);
  assert_eq!(hpc.latencies.long64, 14);
  assert_eq!(hpc.geometry.grf_bytes_per_reg, 64);
  assert!(hpc.rmw_on_byte_dst);

  for p in Platform::all() {
    assert_eq!(p.to_string().parse::<Platform>(), Ok(*p));
  }
}

#[test]
fn test_option_overrides() {
  let mut opts = SwsbOptions::new(Platform::XeHp);
  opts.sbid_count = Some(4);
  opts.read_suppression_wa = Some(false);
  opts.latencies =
    Some(PipeLatencies { in_order: 4, long64: 6, math_in_order: 8 });
  let caps = opts.caps().unwrap();
  assert_eq!(caps.sbid_count, 4);
  assert!(!caps.read_suppression_wa);
  assert_eq!(caps.latencies.in_order, 4);

  opts.sbid_count = Some(0);
  assert!(opts.caps().is_err());
  opts.sbid_count = None;
  opts.max_distance = Some(8);
  assert!(opts.caps().is_err());
}
