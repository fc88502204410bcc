// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Traffic patterns for the DMA mesh.
//!
//! Each [TrafficPattern] is registered in a table together with its name and
//! a pure function which, given the position of a node in the mesh, returns
//! the accesses that node performs ([NodeTraffic]). Adding a pattern means
//! adding a variant and a table entry.
//!
//! Most patterns are permutations of the tile index in the style of the
//! classic synthetic NoC workloads (bit-complement, bit-reverse, shuffle,
//! transpose, tornado, ...). A few target the HBM channels instead of the
//! tiles, and `matmul` mimics the accesses of a blocked matrix multiply.
//!
//! The `uniform` pattern is the only one that consumes randomness. It draws
//! from a [TrafficRng] that is passed in by the caller, so a run with the same
//! seed always produces the same traffic.

use std::fmt;
use std::str::FromStr;

use log::trace;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobOptions, encode};
use crate::mesh::{Address, Coord, MeshConfig};
use crate::mesh_error;
use crate::types::{JobGenError, JobGenResult};

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 42;

/// The single random stream shared by all nodes of a run.
pub type TrafficRng = Xoshiro256PlusPlus;

#[must_use]
pub fn new_rng(seed: u64) -> TrafficRng {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

/// Whether a node reads from or writes to the external address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
        }
    }
}

/// One memory access made by a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Access {
    pub ext_addr: Address,
    pub direction: Direction,
    pub length: u64,
}

/// All accesses made by one node, relative to its local memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeTraffic {
    pub local: Address,
    pub accesses: Vec<Access>,
}

impl NodeTraffic {
    /// Turn the accesses into jobs.
    ///
    /// Reads copy from the external address into local memory, writes copy
    /// from local memory to the external address.
    pub fn jobs(&self, options: JobOptions) -> impl Iterator<Item = Job> + '_ {
        self.accesses.iter().map(move |access| {
            let (src, dst) = match access.direction {
                Direction::Read => (&access.ext_addr, &self.local),
                Direction::Write => (&self.local, &access.ext_addr),
            };
            encode(access.length, src.clone(), dst.clone(), options)
        })
    }
}

/// Everything a pattern needs to know about the node it is generating for.
#[derive(Clone, Copy, Debug)]
pub struct PatternInput<'a> {
    pub mesh: &'a MeshConfig,
    pub node: Coord,
    pub direction: Direction,
    pub wide_length: u64,
}

type PatternFn = fn(&PatternInput, &mut TrafficRng) -> JobGenResult<NodeTraffic>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrafficPattern {
    /// Every node accesses the HBM channel of its row
    Hbm,

    /// Every node accesses a random other tile
    Uniform,

    /// Only node (0, 0) is active, accessing its neighbour in y
    Onehop,

    /// Access the tile at the mirrored position in both dimensions
    BitComplement,

    /// Access the tile whose index is the bit-reversed node index
    BitReverse,

    /// Access the tile whose index is the node index rotated right by one
    BitRotation,

    /// Access the next tile in x, wrapping at the edge
    Neighbor,

    /// Access the tile given by a perfect shuffle of the node index
    Shuffle,

    /// Access the tile with x and y swapped (block-wise on non-square meshes)
    Transpose,

    /// Access the tile half way round the x dimension
    Tornado,

    /// Every node accesses the centre tile
    Hotspot,

    /// Every node accesses the middle HBM channel
    HotspotBoundary,

    /// Blocked matrix multiply reading A and B and writing C to HBM
    Matmul,
}

struct PatternEntry {
    pattern: TrafficPattern,
    name: &'static str,
    generate: PatternFn,
}

/// Registry of all patterns, in the same order as the enum.
static PATTERNS: [PatternEntry; 13] = [
    PatternEntry {
        pattern: TrafficPattern::Hbm,
        name: "hbm",
        generate: hbm,
    },
    PatternEntry {
        pattern: TrafficPattern::Uniform,
        name: "uniform",
        generate: uniform,
    },
    PatternEntry {
        pattern: TrafficPattern::Onehop,
        name: "onehop",
        generate: onehop,
    },
    PatternEntry {
        pattern: TrafficPattern::BitComplement,
        name: "bit_complement",
        generate: bit_complement,
    },
    PatternEntry {
        pattern: TrafficPattern::BitReverse,
        name: "bit_reverse",
        generate: bit_reverse,
    },
    PatternEntry {
        pattern: TrafficPattern::BitRotation,
        name: "bit_rotation",
        generate: bit_rotation,
    },
    PatternEntry {
        pattern: TrafficPattern::Neighbor,
        name: "neighbor",
        generate: neighbor,
    },
    PatternEntry {
        pattern: TrafficPattern::Shuffle,
        name: "shuffle",
        generate: shuffle,
    },
    PatternEntry {
        pattern: TrafficPattern::Transpose,
        name: "transpose",
        generate: transpose,
    },
    PatternEntry {
        pattern: TrafficPattern::Tornado,
        name: "tornado",
        generate: tornado,
    },
    PatternEntry {
        pattern: TrafficPattern::Hotspot,
        name: "hotspot",
        generate: hotspot,
    },
    PatternEntry {
        pattern: TrafficPattern::HotspotBoundary,
        name: "hotspot_boundary",
        generate: hotspot_boundary,
    },
    PatternEntry {
        pattern: TrafficPattern::Matmul,
        name: "matmul",
        generate: matmul,
    },
];

impl TrafficPattern {
    pub fn all() -> impl Iterator<Item = TrafficPattern> {
        PATTERNS.iter().map(|entry| entry.pattern)
    }

    /// Names of all registered patterns.
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        PATTERNS.iter().map(|entry| entry.name).collect()
    }

    fn entry(self) -> &'static PatternEntry {
        &PATTERNS[self as usize]
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// Check the pattern can be applied to every node of the mesh.
    pub fn check_mesh(self, mesh: &MeshConfig) -> JobGenResult<()> {
        let num_x = mesh.num_x();
        let num_y = mesh.num_y();
        match self {
            TrafficPattern::Uniform if mesh.num_tiles() < 2 => {
                mesh_error!(format!("{self} needs at least two tiles, got {num_x}x{num_y}"))
            }
            TrafficPattern::BitReverse | TrafficPattern::BitRotation
                if !mesh.num_tiles().is_power_of_two() =>
            {
                mesh_error!(format!(
                    "{self} needs a power of two number of tiles, got {num_x}x{num_y}"
                ))
            }
            TrafficPattern::Transpose if num_y > num_x && num_y % num_x != 0 => {
                mesh_error!(format!("NUM_Y ({num_y}) must be divisible by NUM_X ({num_x})"))
            }
            TrafficPattern::Transpose if num_x > num_y && num_x % num_y != 0 => {
                mesh_error!(format!("NUM_X ({num_x}) must be divisible by NUM_Y ({num_y})"))
            }
            _ => Ok(()),
        }
    }

    /// Compute the accesses of one node.
    pub fn generate(self, input: &PatternInput, rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
        self.check_mesh(input.mesh)?;
        let traffic = (self.entry().generate)(input, rng)?;
        trace!(
            "{self} {}: {} access(es) from {}",
            input.node,
            traffic.accesses.len(),
            traffic.local
        );
        Ok(traffic)
    }
}

impl fmt::Display for TrafficPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TrafficPattern {
    type Err = JobGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PATTERNS
            .iter()
            .find(|entry| entry.name == s)
            .map(|entry| entry.pattern)
            .ok_or_else(|| JobGenError::UnsupportedPattern(s.to_string()))
    }
}

/// Ceiling of log2, with `clog2(0) == clog2(1) == 0`.
#[must_use]
fn clog2(value: usize) -> u32 {
    if value <= 1 {
        0
    } else {
        usize::BITS - (value - 1).leading_zeros()
    }
}

/// A node accessing one external address with the full wide length.
fn single(input: &PatternInput, ext_addr: Address) -> JobGenResult<NodeTraffic> {
    Ok(NodeTraffic {
        local: input.mesh.coord_address(input.node)?,
        accesses: vec![Access {
            ext_addr,
            direction: input.direction,
            length: input.wide_length,
        }],
    })
}

/// A node accessing the tile at the permuted index `index`.
fn permuted(input: &PatternInput, index: usize) -> JobGenResult<NodeTraffic> {
    let dest = input.mesh.pattern_coord(index);
    single(input, input.mesh.coord_address(dest)?)
}

fn hbm(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    single(input, input.mesh.hbm_address(input.node.y)?)
}

fn uniform(input: &PatternInput, rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let mesh = input.mesh;
    let local = mesh.coord_address(input.node)?;
    let mut ext_addr = local.clone();
    while ext_addr == local {
        let x = rng.gen_range(0..mesh.num_x());
        let y = rng.gen_range(0..mesh.num_y());
        ext_addr = mesh.tile_address(x, y)?;
    }
    single(input, ext_addr)
}

fn onehop(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let node = input.node;
    if node != Coord::new(0, 0) {
        return Ok(NodeTraffic {
            local: Address::zero(),
            accesses: vec![Access {
                ext_addr: Address::zero(),
                direction: input.direction,
                length: 0,
            }],
        });
    }
    single(input, input.mesh.tile_address(node.x, node.y + 1)?)
}

fn bit_complement(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let mesh = input.mesh;
    let node = input.node;
    let (max_x, max_y) = (mesh.num_x() - 1, mesh.num_y() - 1);
    let outside = || JobGenError::InvalidCoordinate {
        x: node.x,
        y: node.y,
        max_x,
        max_y,
    };
    let dest_x = max_x.checked_sub(node.x).ok_or_else(outside)?;
    let dest_y = max_y.checked_sub(node.y).ok_or_else(outside)?;
    single(input, mesh.tile_address(dest_x, dest_y)?)
}

fn bit_reverse(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let mut straight = input.mesh.node_index(input.node);
    let num_bits = clog2(input.mesh.num_tiles());
    let mut reverse = straight & 1;
    for _ in 1..num_bits {
        reverse <<= 1;
        straight >>= 1;
        reverse |= straight & 1;
    }
    permuted(input, reverse)
}

fn bit_rotation(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let source = input.mesh.node_index(input.node);
    let num_destinations = input.mesh.num_tiles();
    let dest = if source % 2 == 0 {
        source / 2
    } else {
        source / 2 + num_destinations / 2
    };
    permuted(input, dest)
}

fn neighbor(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let mesh = input.mesh;
    let node = input.node;
    single(input, mesh.tile_address((node.x + 1) % mesh.num_x(), node.y)?)
}

fn shuffle(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let source = input.mesh.node_index(input.node);
    let num_destinations = input.mesh.num_tiles();
    // The lower half maps to the even indices and the upper half to the odd
    let half = num_destinations.div_ceil(2);
    let dest = if source < half {
        source * 2
    } else {
        source * 2 + 1 - 2 * half
    };
    permuted(input, dest)
}

fn transpose(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let mesh = input.mesh;
    let (num_x, num_y) = (mesh.num_x(), mesh.num_y());
    let Coord { x, y } = input.node;
    let (dest_x, dest_y) = if num_x == num_y {
        (y, x)
    } else if num_y > num_x {
        let block = y / num_x;
        (y - block * num_x, x + block * num_x)
    } else {
        let block = x / num_y;
        (y + block * num_y, x - block * num_y)
    };
    single(input, mesh.tile_address(dest_x, dest_y)?)
}

fn tornado(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let mesh = input.mesh;
    let node = input.node;
    let num_x = mesh.num_x();
    let dest_x = (node.x + num_x.div_ceil(2) - 1) % num_x;
    single(input, mesh.tile_address(dest_x, node.y)?)
}

fn hotspot(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let mesh = input.mesh;
    single(input, mesh.tile_address(mesh.num_x() / 2, mesh.num_y() / 2)?)
}

fn hotspot_boundary(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let mesh = input.mesh;
    single(input, mesh.hbm_address(mesh.num_y() / 2)?)
}

fn matmul(input: &PatternInput, _rng: &mut TrafficRng) -> JobGenResult<NodeTraffic> {
    let mesh = input.mesh;
    let num_y = mesh.num_y();
    let y = input.node.y;
    let half = input.wide_length / 2;
    let row_channel = mesh.hbm_address(y)?;

    let mut accesses = Vec::with_capacity(num_y + 2);

    // Matrix A from the channel of this row
    accesses.push(Access {
        ext_addr: row_channel.clone(),
        direction: Direction::Read,
        length: half,
    });

    // Matrix B spread across all channels
    for i in 0..num_y {
        accesses.push(Access {
            ext_addr: mesh.hbm_address((y + i) % num_y)?,
            direction: Direction::Read,
            length: half / num_y as u64,
        });
    }

    // Write back matrix C
    accesses.push(Access {
        ext_addr: row_channel,
        direction: Direction::Write,
        length: input.wide_length / 4,
    });

    Ok(NodeTraffic {
        local: mesh.coord_address(input.node)?,
        accesses,
    })
}
