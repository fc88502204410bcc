// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! `gwr-jobgen` - DMA job generation for mesh testbenches
//!
//! This library produces the job files consumed by the DMA testbenches. A job
//! describes a single memory-to-memory transfer. Jobs are grouped into
//! streams, one per DMA engine, and each stream is written to its own file.
//!
//! The main pieces are:
//!  - [mesh]: the address map of a mesh of tiles and its HBM channels.
//!  - [job]: the job record and its text encoding.
//!  - [topology]: the traffic patterns that decide which addresses each node
//!    of the mesh accesses.
//!  - [testbench]: the testbenches jobs can be generated for.
//!  - [emit]: writing the generated streams out.
//!  - [config]: layered configuration from defaults, a TOML file, environment
//!    variables and the command line.
//!
//! # Example
//!
//! ```rust
//! use gwr_jobgen::config::RunConfig;
//! use gwr_jobgen::emit::MemorySink;
//! use gwr_jobgen::testbench::{Testbench, run};
//!
//! let config = RunConfig {
//!     testbench: Testbench::Chimney2Chimney,
//!     ..Default::default()
//! };
//! let mut sink = MemorySink::new();
//! let summary = run(&config, &mut sink).unwrap();
//! assert_eq!(summary.num_streams, 2);
//! assert!(sink.get("chimney2chimney", 0).unwrap().starts_with("8\n0x10000\n0x0\n"));
//! ```

pub mod config;
pub mod emit;
pub mod job;
pub mod mesh;
pub mod testbench;
pub mod topology;
pub mod types;
