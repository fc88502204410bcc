// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! DMA job records and their textual encoding.
//!
//! A job is rendered as ten newline-terminated lines:
//!
//! ```text
//! length                (decimal)
//! source address        (hex, 0x-prefixed)
//! destination address   (hex, 0x-prefixed)
//! source protocol       (decimal, 0 = AXI)
//! destination protocol  (decimal)
//! max source burst      (decimal)
//! max destination burst (decimal)
//! r/aw decouple         (0 or 1)
//! r/w decouple          (0 or 1)
//! number of errors      (decimal)
//! ```
//!
//! A [JobStream] is simply the concatenation of its jobs.

use std::fmt;

use crate::mesh::Address;

pub const DEFAULT_MAX_BURST_SIZE: u32 = 256;

/// Bus protocol used on either side of a transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Axi,
}

impl Protocol {
    #[must_use]
    pub fn id(self) -> u32 {
        match self {
            Protocol::Axi => 0,
        }
    }
}

/// Per-job settings that are rarely changed from their defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobOptions {
    pub src_protocol: Protocol,
    pub dst_protocol: Protocol,
    pub max_src_burst_size: u32,
    pub max_dst_burst_size: u32,

    /// Decouple the read and write address channels
    pub r_aw_decouple: bool,

    /// Decouple the read and write data channels
    pub r_w_decouple: bool,

    /// Number of errors the testbench should inject
    pub num_errors: u32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            src_protocol: Protocol::Axi,
            dst_protocol: Protocol::Axi,
            max_src_burst_size: DEFAULT_MAX_BURST_SIZE,
            max_dst_burst_size: DEFAULT_MAX_BURST_SIZE,
            r_aw_decouple: false,
            r_w_decouple: false,
            num_errors: 0,
        }
    }
}

/// A single DMA transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    length: u64,
    src: Address,
    dst: Address,
    options: JobOptions,
}

impl Job {
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }

    #[must_use]
    pub fn src(&self) -> &Address {
        &self.src
    }

    #[must_use]
    pub fn dst(&self) -> &Address {
        &self.dst
    }

    #[must_use]
    pub fn options(&self) -> &JobOptions {
        &self.options
    }
}

/// Create a job moving `length` bytes from `src` to `dst`.
#[must_use]
pub fn encode(length: u64, src: Address, dst: Address, options: JobOptions) -> Job {
    Job {
        length,
        src,
        dst,
        options,
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let options = &self.options;
        writeln!(f, "{}", self.length)?;
        writeln!(f, "{}", self.src)?;
        writeln!(f, "{}", self.dst)?;
        writeln!(f, "{}", options.src_protocol.id())?;
        writeln!(f, "{}", options.dst_protocol.id())?;
        writeln!(f, "{}", options.max_src_burst_size)?;
        writeln!(f, "{}", options.max_dst_burst_size)?;
        writeln!(f, "{}", u8::from(options.r_aw_decouple))?;
        writeln!(f, "{}", u8::from(options.r_w_decouple))?;
        writeln!(f, "{}", options.num_errors)
    }
}

/// The ordered jobs to be executed by one DMA engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobStream {
    jobs: Vec<Job>,
}

impl JobStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Total number of bytes moved by the stream.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.jobs.iter().map(Job::length).sum()
    }
}

impl Extend<Job> for JobStream {
    fn extend<I: IntoIterator<Item = Job>>(&mut self, iter: I) {
        self.jobs.extend(iter);
    }
}

impl FromIterator<Job> for JobStream {
    fn from_iter<I: IntoIterator<Item = Job>>(iter: I) -> Self {
        Self {
            jobs: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for JobStream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for job in &self.jobs {
            write!(f, "{job}")?;
        }
        Ok(())
    }
}
