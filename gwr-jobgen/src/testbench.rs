// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Job generation for each of the supported testbenches.
//!
//! - `chimney2chimney`: two chimneys exchanging narrow bursts.
//! - `nw_chimney2chimney`: two chimneys exchanging both narrow and wide
//!   bursts, with a separate stream for each width.
//! - `dma_mesh`: every tile of the mesh runs the selected [TrafficPattern],
//!   again with one stream per width.
//!
//! Narrow streams are given an index [NARROW_INDEX_OFFSET] above the index of
//! the DMA engine, so that e.g. tile 3 of the mesh has its wide jobs in
//! `mesh_3.txt` and its narrow jobs in `mesh_103.txt`.
//!
//! All streams of a run are generated before any is emitted, so a run that
//! fails leaves no partial output behind.

use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};

use crate::config::RunConfig;
use crate::emit::JobSink;
use crate::job::{JobOptions, JobStream, encode};
use crate::mesh::{Address, MeshConfig};
use crate::mesh_error;
use crate::topology::{Direction, PatternInput, TrafficPattern, TrafficRng, new_rng};
use crate::types::{JobGenError, JobGenResult};

/// Bits per beat of the wide data lane.
pub const WIDE_DATA_WIDTH: u64 = 512;

/// Bits per beat of the narrow data lane.
pub const NARROW_DATA_WIDTH: u64 = 64;

pub const NUM_CHIMNEYS: usize = 2;

/// Offset added to the index of narrow job streams.
pub const NARROW_INDEX_OFFSET: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Testbench {
    Chimney2Chimney,
    NwChimney2Chimney,
    DmaMesh,
}

impl Testbench {
    pub const NAMES: [&'static str; 3] = ["chimney2chimney", "nw_chimney2chimney", "dma_mesh"];

    #[must_use]
    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }

    /// Prefix of the job files written for this testbench.
    #[must_use]
    pub fn stream_name(self) -> &'static str {
        match self {
            Testbench::Chimney2Chimney => "chimney2chimney",
            Testbench::NwChimney2Chimney => "nw_chimney2chimney",
            Testbench::DmaMesh => "mesh",
        }
    }
}

impl fmt::Display for Testbench {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Testbench {
    type Err = JobGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chimney2chimney" => Ok(Testbench::Chimney2Chimney),
            "nw_chimney2chimney" => Ok(Testbench::NwChimney2Chimney),
            "dma_mesh" => Ok(Testbench::DmaMesh),
            _ => Err(JobGenError::UnsupportedTestbench(s.to_string())),
        }
    }
}

/// Number and size of the bursts issued by each DMA engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BurstConfig {
    /// Beats per narrow burst
    pub narrow_burst_length: u64,

    /// Beats per wide burst
    pub wide_burst_length: u64,

    pub num_narrow_bursts: usize,
    pub num_wide_bursts: usize,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            narrow_burst_length: 1,
            wide_burst_length: 16,
            num_narrow_bursts: 10,
            num_wide_bursts: 100,
        }
    }
}

impl BurstConfig {
    /// Bytes moved by one narrow burst.
    #[must_use]
    pub fn narrow_length(&self) -> u64 {
        self.narrow_burst_length.saturating_mul(NARROW_DATA_WIDTH) / 8
    }

    /// Bytes moved by one wide burst.
    #[must_use]
    pub fn wide_length(&self) -> u64 {
        self.wide_burst_length.saturating_mul(WIDE_DATA_WIDTH) / 8
    }

    /// Check both burst sizes fit in the memory of a tile.
    pub fn check_capacity(&self, mesh: &MeshConfig) -> JobGenResult<()> {
        mesh.check_capacity(self.wide_length())?;
        mesh.check_capacity(self.narrow_length())
    }
}

/// A job stream together with the identity of the DMA engine running it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedJobStream {
    pub name: &'static str,
    pub index: usize,
    pub stream: JobStream,
}

/// Source and destination of the fixed chimney transfers.
fn chimney_addresses(mesh: &MeshConfig, direction: Direction) -> (Address, Address) {
    let remote = Address::from(mesh.mem_size());
    match direction {
        Direction::Write => (Address::zero(), remote),
        Direction::Read => (remote, Address::zero()),
    }
}

/// Generate narrow traffic between two chimneys.
///
/// Only the first chimney is active unless `bidir` is set. The stream of an
/// inactive chimney is empty.
pub fn chimney2chimney_traffic(
    mesh: &MeshConfig,
    bursts: &BurstConfig,
    direction: Direction,
    bidir: bool,
) -> JobGenResult<Vec<NamedJobStream>> {
    let length = bursts.narrow_length();
    mesh.check_capacity(length)?;
    let (src, dst) = chimney_addresses(mesh, direction);

    let name = Testbench::Chimney2Chimney.stream_name();
    let streams = (0..NUM_CHIMNEYS)
        .map(|i| {
            let mut stream = JobStream::new();
            if bidir || i == 0 {
                stream.extend((0..bursts.num_narrow_bursts).map(|_| {
                    encode(length, src.clone(), dst.clone(), JobOptions::default())
                }));
            }
            NamedJobStream {
                name,
                index: i,
                stream,
            }
        })
        .collect();
    Ok(streams)
}

/// Generate narrow and wide traffic between two chimneys.
pub fn nw_chimney2chimney_traffic(
    mesh: &MeshConfig,
    bursts: &BurstConfig,
    direction: Direction,
    bidir: bool,
) -> JobGenResult<Vec<NamedJobStream>> {
    bursts.check_capacity(mesh)?;
    let wide_length = bursts.wide_length();
    let narrow_length = bursts.narrow_length();
    let (src, dst) = chimney_addresses(mesh, direction);

    let name = Testbench::NwChimney2Chimney.stream_name();
    let mut streams = Vec::with_capacity(2 * NUM_CHIMNEYS);
    for i in 0..NUM_CHIMNEYS {
        let mut wide_stream = JobStream::new();
        let mut narrow_stream = JobStream::new();
        if bidir || i == 0 {
            wide_stream.extend((0..bursts.num_wide_bursts).map(|_| {
                encode(wide_length, src.clone(), dst.clone(), JobOptions::default())
            }));
            narrow_stream.extend((0..bursts.num_narrow_bursts).map(|_| {
                encode(narrow_length, src.clone(), dst.clone(), JobOptions::default())
            }));
        }
        streams.push(NamedJobStream {
            name,
            index: i,
            stream: wide_stream,
        });
        streams.push(NamedJobStream {
            name,
            index: i + NARROW_INDEX_OFFSET,
            stream: narrow_stream,
        });
    }
    Ok(streams)
}

/// Generate the traffic of every tile in the mesh for the given pattern.
///
/// The accesses of each tile are computed once and then repeated
/// `num_wide_bursts` times in its wide stream and `num_narrow_bursts` times
/// in its narrow stream.
pub fn mesh_traffic(
    mesh: &MeshConfig,
    bursts: &BurstConfig,
    direction: Direction,
    pattern: TrafficPattern,
    rng: &mut TrafficRng,
) -> JobGenResult<Vec<NamedJobStream>> {
    bursts.check_capacity(mesh)?;
    pattern.check_mesh(mesh)?;
    if mesh.num_tiles() > NARROW_INDEX_OFFSET {
        return mesh_error!(format!(
            "{} tiles would clash with the narrow stream offset of {NARROW_INDEX_OFFSET}",
            mesh.num_tiles()
        ));
    }

    let name = Testbench::DmaMesh.stream_name();
    let wide_length = bursts.wide_length();
    let mut streams = Vec::with_capacity(2 * mesh.num_tiles());
    for node in mesh.coords() {
        let input = PatternInput {
            mesh,
            node,
            direction,
            wide_length,
        };
        let traffic = pattern.generate(&input, rng)?;

        let mut wide_stream = JobStream::new();
        for _ in 0..bursts.num_wide_bursts {
            wide_stream.extend(traffic.jobs(JobOptions::default()));
        }
        let mut narrow_stream = JobStream::new();
        for _ in 0..bursts.num_narrow_bursts {
            narrow_stream.extend(traffic.jobs(JobOptions::default()));
        }

        let index = mesh.node_index(node);
        streams.push(NamedJobStream {
            name,
            index,
            stream: wide_stream,
        });
        streams.push(NamedJobStream {
            name,
            index: index + NARROW_INDEX_OFFSET,
            stream: narrow_stream,
        });
    }
    Ok(streams)
}

/// Generate all job streams of a run.
pub fn generate(config: &RunConfig) -> JobGenResult<Vec<NamedJobStream>> {
    match config.testbench {
        Testbench::Chimney2Chimney => chimney2chimney_traffic(
            &config.mesh,
            &config.bursts,
            config.direction,
            config.bidir,
        ),
        Testbench::NwChimney2Chimney => nw_chimney2chimney_traffic(
            &config.mesh,
            &config.bursts,
            config.direction,
            config.bidir,
        ),
        Testbench::DmaMesh => {
            if config.bidir {
                warn!("--bidir has no effect on the {} testbench", config.testbench);
            }
            let mut rng = new_rng(config.seed);
            mesh_traffic(
                &config.mesh,
                &config.bursts,
                config.direction,
                config.pattern,
                &mut rng,
            )
        }
    }
}

/// Totals of a completed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub num_streams: usize,
    pub num_jobs: usize,
    pub num_bytes: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} jobs moving {} bytes in {} streams",
            self.num_jobs, self.num_bytes, self.num_streams
        )
    }
}

/// Hand all the streams to the sink, in order.
pub fn emit_streams(streams: &[NamedJobStream], sink: &mut dyn JobSink) -> JobGenResult<RunSummary> {
    let mut summary = RunSummary::default();
    for named in streams {
        debug!("{}_{}: {} jobs", named.name, named.index, named.stream.len());
        sink.emit(&named.stream, named.name, named.index)?;
        summary.num_streams += 1;
        summary.num_jobs += named.stream.len();
        summary.num_bytes += named.stream.total_bytes();
    }
    Ok(summary)
}

/// Generate all the jobs of a run and emit them to `sink`.
pub fn run(config: &RunConfig, sink: &mut dyn JobSink) -> JobGenResult<RunSummary> {
    info!(
        "Generating {} jobs on a {} ({} traffic, {})",
        config.testbench, config.mesh, config.pattern, config.direction
    );
    let streams = generate(config)?;
    let summary = emit_streams(&streams, sink)?;
    info!("Generated {summary}");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::MemorySink;
    use crate::topology::DEFAULT_SEED;

    fn small_bursts() -> BurstConfig {
        BurstConfig {
            narrow_burst_length: 2,
            wide_burst_length: 4,
            num_narrow_bursts: 2,
            num_wide_bursts: 3,
        }
    }

    #[test]
    fn testbench_names() {
        for name in Testbench::NAMES {
            let testbench: Testbench = name.parse().unwrap();
            assert_eq!(testbench.name(), name);
        }
        assert!(matches!(
            "dma_ring".parse::<Testbench>(),
            Err(JobGenError::UnsupportedTestbench(_))
        ));
    }

    #[test]
    fn burst_lengths_in_bytes() {
        let bursts = BurstConfig::default();
        assert_eq!(bursts.narrow_length(), 8);
        assert_eq!(bursts.wide_length(), 1024);
    }

    #[test]
    fn chimney_write_single_direction() {
        let mesh = MeshConfig::default();
        let streams =
            chimney2chimney_traffic(&mesh, &small_bursts(), Direction::Write, false).unwrap();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].index, 0);
        assert_eq!(streams[0].stream.len(), 2);
        assert!(streams[1].stream.is_empty());

        let job = streams[0].stream.iter().next().unwrap();
        assert_eq!(job.length(), 16);
        assert!(job.src().is_zero());
        assert_eq!(job.dst(), &Address::from(mesh.mem_size()));
    }

    #[test]
    fn chimney_read_bidir() {
        let mesh = MeshConfig::default();
        let streams =
            chimney2chimney_traffic(&mesh, &small_bursts(), Direction::Read, true).unwrap();
        for named in &streams {
            assert_eq!(named.name, "chimney2chimney");
            assert_eq!(named.stream.len(), 2);
            let job = named.stream.iter().next().unwrap();
            assert_eq!(job.src(), &Address::from(mesh.mem_size()));
            assert!(job.dst().is_zero());
        }
    }

    #[test]
    fn nw_chimney_streams() {
        let mesh = MeshConfig::default();
        let streams =
            nw_chimney2chimney_traffic(&mesh, &small_bursts(), Direction::Write, false).unwrap();
        let indices: Vec<usize> = streams.iter().map(|s| s.index).collect();
        assert_eq!(indices, [0, 100, 1, 101]);
        assert_eq!(streams[0].stream.len(), 3);
        assert_eq!(streams[0].stream.total_bytes(), 3 * 256);
        assert_eq!(streams[1].stream.len(), 2);
        assert_eq!(streams[1].stream.total_bytes(), 2 * 16);
        assert!(streams[2].stream.is_empty());
        assert!(streams[3].stream.is_empty());
    }

    #[test]
    fn burst_larger_than_tile() {
        let mesh = MeshConfig::new(4, 4, 1024, 0x8000_0000).unwrap();
        let bursts = BurstConfig {
            wide_burst_length: 32,
            ..small_bursts()
        };
        let err = nw_chimney2chimney_traffic(&mesh, &bursts, Direction::Read, false).unwrap_err();
        assert!(matches!(
            err,
            JobGenError::LengthExceedsCapacity {
                length: 2048,
                capacity: 1024
            }
        ));

        let mut rng = new_rng(DEFAULT_SEED);
        assert!(
            mesh_traffic(&mesh, &bursts, Direction::Read, TrafficPattern::Hbm, &mut rng).is_err()
        );
    }

    #[test]
    fn mesh_repeats_accesses() {
        let mesh = MeshConfig::default();
        let mut rng = new_rng(DEFAULT_SEED);
        let streams = mesh_traffic(
            &mesh,
            &small_bursts(),
            Direction::Read,
            TrafficPattern::Matmul,
            &mut rng,
        )
        .unwrap();
        assert_eq!(streams.len(), 32);

        // Six matmul accesses per repetition
        assert_eq!(streams[0].index, 0);
        assert_eq!(streams[0].stream.len(), 3 * 6);
        assert_eq!(streams[1].index, 100);
        assert_eq!(streams[1].stream.len(), 2 * 6);

        let wide = streams[0].stream.to_string();
        let narrow = streams[1].stream.to_string();
        assert!(wide.starts_with(&narrow));
    }

    #[test]
    fn mesh_index_order() {
        let mesh = MeshConfig::new(2, 3, 1 << 16, 0x8000_0000).unwrap();
        let mut rng = new_rng(DEFAULT_SEED);
        let streams = mesh_traffic(
            &mesh,
            &small_bursts(),
            Direction::Write,
            TrafficPattern::Neighbor,
            &mut rng,
        )
        .unwrap();
        let wide_indices: Vec<usize> = streams.iter().step_by(2).map(|s| s.index).collect();
        assert_eq!(wide_indices, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn mesh_too_large_for_offset() {
        let mesh = MeshConfig::new(16, 8, 1 << 16, 0x8000_0000).unwrap();
        let mut rng = new_rng(DEFAULT_SEED);
        let err = mesh_traffic(
            &mesh,
            &small_bursts(),
            Direction::Read,
            TrafficPattern::Neighbor,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, JobGenError::IncompatibleMesh(_)));
    }

    #[test]
    fn failed_run_emits_nothing() {
        let config = RunConfig {
            mesh: MeshConfig::new(3, 4, 1 << 16, 0x8000_0000).unwrap(),
            pattern: TrafficPattern::Transpose,
            ..Default::default()
        };
        let mut sink = MemorySink::new();
        assert!(run(&config, &mut sink).is_err());
        assert_eq!(sink.num_files(), 0);
    }

    #[test]
    fn run_summary_counts() {
        let config = RunConfig {
            testbench: Testbench::Chimney2Chimney,
            bidir: true,
            bursts: small_bursts(),
            ..Default::default()
        };
        let mut sink = MemorySink::new();
        let summary = run(&config, &mut sink).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                num_streams: 2,
                num_jobs: 4,
                num_bytes: 64,
            }
        );
        assert_eq!(sink.num_files(), 2);
    }
}
