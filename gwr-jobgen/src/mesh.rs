// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Address map of the DMA mesh.
//!
//! The mesh is a rectangular grid of `num_x` x `num_y` tiles, each of which
//! owns `mem_size` bytes of local memory. Tile memories are laid out
//! contiguously from address zero:
//!
//! ```text
//! tile_address(x, y) = (x * num_y + y) * mem_size
//! ```
//!
//! The HBM channels live in a separate address family above `hbm_base`. Each
//! channel is offset by `channel << mem_size`, i.e. the shift amount is the
//! tile memory size in bytes. This makes the channel regions enormous, so all
//! addresses are held as arbitrary precision integers ([Address]).
//!
//! Coordinates may go one beyond the mesh in each dimension (`num_x + 1`,
//! `num_y + 1`) so that edge and channel tiles can be addressed.

use std::fmt;

use itertools::Itertools;
use num::BigUint;
use num::traits::Zero;

use crate::types::{JobGenError, JobGenResult};

pub const DEFAULT_NUM_X: usize = 4;
pub const DEFAULT_NUM_Y: usize = 4;
pub const DEFAULT_MEM_SIZE: u64 = 1 << 16;
pub const DEFAULT_HBM_BASE: u64 = 0x8000_0000;

/// Largest supported tile memory, which bounds the size of HBM addresses.
pub const MAX_MEM_SIZE: u64 = 1 << 20;

/// Largest supported number of tiles in either dimension.
pub const MAX_MESH_DIM: usize = 1024;

/// An address in the flat address space seen by the DMA engines.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(BigUint);

impl Address {
    #[must_use]
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<BigUint> for Address {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

/// Addresses are always displayed as `0x`-prefixed lower-case hex.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", self.0.to_str_radix(16))
    }
}

/// The position of a tile in the mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    #[must_use]
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Geometry and address map of a mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshConfig {
    /// Number of tiles in the x dimension
    num_x: usize,

    /// Number of tiles in the y dimension
    num_y: usize,

    /// Bytes of local memory at each tile
    mem_size: u64,

    /// Start of the HBM address family
    hbm_base: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            num_x: DEFAULT_NUM_X,
            num_y: DEFAULT_NUM_Y,
            mem_size: DEFAULT_MEM_SIZE,
            hbm_base: DEFAULT_HBM_BASE,
        }
    }
}

impl MeshConfig {
    pub fn new(num_x: usize, num_y: usize, mem_size: u64, hbm_base: u64) -> JobGenResult<Self> {
        if num_x == 0 || num_y == 0 {
            return Err(JobGenError::InvalidConfig(format!(
                "mesh dimensions must be non-zero, got {num_x}x{num_y}"
            )));
        }
        if num_x > MAX_MESH_DIM || num_y > MAX_MESH_DIM {
            return Err(JobGenError::InvalidConfig(format!(
                "mesh dimensions are limited to {MAX_MESH_DIM}, got {num_x}x{num_y}"
            )));
        }
        if !mem_size.is_power_of_two() || mem_size > MAX_MEM_SIZE {
            return Err(JobGenError::InvalidConfig(format!(
                "tile memory size must be a power of two no larger than {MAX_MEM_SIZE}, got {mem_size}"
            )));
        }
        // End of the highest edge tile, (num_x + 1, num_y + 1)
        let top_tile = ((num_x + 1) * num_y + num_y + 1) as u64;
        let tiles_end = (top_tile + 1) * mem_size;
        if hbm_base < tiles_end {
            return Err(JobGenError::InvalidConfig(format!(
                "HBM base {hbm_base:#x} overlaps tile memory ending at {tiles_end:#x}"
            )));
        }
        Ok(Self {
            num_x,
            num_y,
            mem_size,
            hbm_base,
        })
    }

    #[must_use]
    pub fn num_x(&self) -> usize {
        self.num_x
    }

    #[must_use]
    pub fn num_y(&self) -> usize {
        self.num_y
    }

    #[must_use]
    pub fn mem_size(&self) -> u64 {
        self.mem_size
    }

    #[must_use]
    pub fn hbm_base(&self) -> u64 {
        self.hbm_base
    }

    #[must_use]
    pub fn num_tiles(&self) -> usize {
        self.num_x * self.num_y
    }

    /// Base address of the local memory of tile (`x`, `y`).
    pub fn tile_address(&self, x: usize, y: usize) -> JobGenResult<Address> {
        let max_x = self.num_x + 1;
        let max_y = self.num_y + 1;
        if x > max_x || y > max_y {
            return Err(JobGenError::InvalidCoordinate { x, y, max_x, max_y });
        }
        let tile = BigUint::from(x * self.num_y + y);
        Ok(Address(tile * self.mem_size))
    }

    /// Base address of an HBM channel.
    pub fn hbm_address(&self, channel: usize) -> JobGenResult<Address> {
        let max = self.num_y + 1;
        if channel > max {
            return Err(JobGenError::InvalidChannel { channel, max });
        }
        // `mem_size` is bounded by MAX_MEM_SIZE so this cannot truncate
        let shift = self.mem_size as usize;
        let offset = BigUint::from(channel) << shift;
        Ok(Address(offset + self.hbm_base))
    }

    /// Check a transfer fits within the memory of a single tile.
    pub fn check_capacity(&self, length: u64) -> JobGenResult<()> {
        if length > self.mem_size {
            return Err(JobGenError::LengthExceedsCapacity {
                length,
                capacity: self.mem_size,
            });
        }
        Ok(())
    }

    /// Address of a tile given as a coordinate.
    pub fn coord_address(&self, coord: Coord) -> JobGenResult<Address> {
        self.tile_address(coord.x, coord.y)
    }

    /// Linear index of a node: `x * num_y + y`.
    #[must_use]
    pub fn node_index(&self, coord: Coord) -> usize {
        coord.x * self.num_y + coord.y
    }

    /// Map a permuted index back onto the grid.
    ///
    /// Note that this is not the inverse of [node_index](Self::node_index):
    /// the permutation patterns de-linearize in x-major order.
    #[must_use]
    pub fn pattern_coord(&self, index: usize) -> Coord {
        Coord::new(index % self.num_x, index / self.num_x)
    }

    /// All nodes of the mesh, x outer and y inner.
    pub fn coords(&self) -> impl Iterator<Item = Coord> {
        (0..self.num_x)
            .cartesian_product(0..self.num_y)
            .map(|(x, y)| Coord::new(x, y))
    }
}

impl fmt::Display for MeshConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} mesh with {} bytes per tile",
            self.num_x, self.num_y, self.mem_size
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn tile_address_formula() {
        let mesh = MeshConfig::default();
        assert_eq!(mesh.tile_address(0, 0).unwrap(), Address::from(0_u64));
        assert_eq!(mesh.tile_address(0, 1).unwrap(), Address::from(0x1_0000_u64));
        assert_eq!(mesh.tile_address(1, 0).unwrap(), Address::from(0x4_0000_u64));
        assert_eq!(mesh.tile_address(2, 2).unwrap(), Address::from(0xa_0000_u64));
    }

    #[test]
    fn tile_address_allows_edge_tiles() {
        let mesh = MeshConfig::default();
        assert_eq!(
            mesh.tile_address(5, 5).unwrap(),
            Address::from((5 * 4 + 5) * 0x1_0000_u64)
        );
    }

    #[test]
    fn tile_address_out_of_range() {
        let mesh = MeshConfig::default();
        let err = mesh.tile_address(6, 0).unwrap_err();
        assert!(matches!(
            err,
            JobGenError::InvalidCoordinate {
                x: 6,
                y: 0,
                max_x: 5,
                max_y: 5
            }
        ));
        assert!(mesh.tile_address(0, 6).is_err());
    }

    #[test]
    fn hbm_address_channel_zero_is_base() {
        let mesh = MeshConfig::default();
        assert_eq!(mesh.hbm_address(0).unwrap(), Address::from(DEFAULT_HBM_BASE));
    }

    #[test]
    fn hbm_address_shifts_by_mem_size() {
        let mesh = MeshConfig::new(2, 2, 16, 0x100).unwrap();
        assert_eq!(mesh.hbm_address(1).unwrap(), Address::from(0x1_0100_u64));
        assert_eq!(mesh.hbm_address(3).unwrap(), Address::from(0x3_0100_u64));
        assert!(matches!(
            mesh.hbm_address(4),
            Err(JobGenError::InvalidChannel { channel: 4, max: 3 })
        ));
    }

    #[test]
    fn hbm_address_default_mesh_is_wide() {
        let mesh = MeshConfig::default();
        let expected = (BigUint::from(1u32) << 65536usize) + DEFAULT_HBM_BASE;
        assert_eq!(mesh.hbm_address(1).unwrap(), Address::from(expected));
    }

    #[test]
    fn tile_addresses_are_unique_and_below_hbm() {
        let mesh = MeshConfig::default();
        let mut seen = HashSet::new();
        for coord in mesh.coords() {
            let addr = mesh.coord_address(coord).unwrap();
            assert!(seen.insert(addr), "duplicate address for {coord}");
        }

        let hbm = mesh.hbm_address(0).unwrap();
        for x in 0..=mesh.num_x() + 1 {
            for y in 0..=mesh.num_y() + 1 {
                assert!(mesh.tile_address(x, y).unwrap() < hbm);
            }
        }
    }

    #[test]
    fn hbm_base_must_clear_tile_memory() {
        assert!(matches!(
            MeshConfig::new(4, 4, 1 << 16, 0),
            Err(JobGenError::InvalidConfig(_))
        ));
        assert!(matches!(
            MeshConfig::new(4, 1024, MAX_MEM_SIZE, DEFAULT_HBM_BASE),
            Err(JobGenError::InvalidConfig(_))
        ));

        // Edge tile (3, 3) of a 2x2 mesh ends at 10 * 16
        assert!(MeshConfig::new(2, 2, 16, 0x9f).is_err());
        let mesh = MeshConfig::new(2, 2, 16, 0xa0).unwrap();
        let last_tile = mesh.tile_address(3, 3).unwrap();
        assert!(last_tile.as_biguint() + 15_u64 < *mesh.hbm_address(0).unwrap().as_biguint());
    }

    #[test]
    fn coords_are_x_major() {
        let mesh = MeshConfig::new(2, 3, 64, 0x1000).unwrap();
        let coords: Vec<_> = mesh.coords().collect();
        assert_eq!(coords.len(), 6);
        assert_eq!(coords[0], Coord::new(0, 0));
        assert_eq!(coords[1], Coord::new(0, 1));
        assert_eq!(coords[3], Coord::new(1, 0));
        assert_eq!(mesh.node_index(Coord::new(1, 2)), 5);
        assert_eq!(mesh.pattern_coord(5), Coord::new(1, 2));
        assert_eq!(mesh.pattern_coord(3), Coord::new(1, 1));
    }

    #[test]
    fn address_display_is_hex() {
        assert_eq!(Address::zero().to_string(), "0x0");
        assert_eq!(Address::from(0x10000_u64).to_string(), "0x10000");
        assert_eq!(Address::from(DEFAULT_HBM_BASE).to_string(), "0x80000000");
    }

    #[test]
    fn capacity_is_tile_memory() {
        let mesh = MeshConfig::default();
        assert!(mesh.check_capacity(DEFAULT_MEM_SIZE).is_ok());
        assert!(matches!(
            mesh.check_capacity(DEFAULT_MEM_SIZE + 1),
            Err(JobGenError::LengthExceedsCapacity {
                length: 65537,
                capacity: 65536
            })
        ));
    }

    #[test]
    fn invalid_mesh_parameters() {
        assert!(MeshConfig::new(0, 4, 64, DEFAULT_HBM_BASE).is_err());
        assert!(MeshConfig::new(4, 4, 100, DEFAULT_HBM_BASE).is_err());
        assert!(MeshConfig::new(4, 4, MAX_MEM_SIZE * 2, DEFAULT_HBM_BASE).is_err());
        assert!(MeshConfig::new(4, MAX_MESH_DIM + 1, 64, DEFAULT_HBM_BASE).is_err());
    }
}
