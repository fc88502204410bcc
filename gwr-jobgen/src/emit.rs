// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Persistence of job streams.
//!
//! Each stream is identified by a name (the testbench it was generated for)
//! and an index (the DMA engine that will execute it). A [DirectoryWriter]
//! stores it as `{out_dir}/{name}_{index}.txt`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::job::JobStream;
use crate::types::{JobGenError, JobGenResult};

/// Something that can take ownership of a generated job stream.
pub trait JobSink {
    fn emit(&mut self, stream: &JobStream, name: &str, index: usize) -> JobGenResult<()>;
}

/// File name used for the stream of a given DMA engine.
#[must_use]
pub fn job_file_name(name: &str, index: usize) -> String {
    format!("{name}_{index}.txt")
}

/// Writes each stream to its own file, creating the directory as required.
pub struct DirectoryWriter {
    out_dir: PathBuf,
}

impl DirectoryWriter {
    #[must_use]
    pub fn new(out_dir: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
        }
    }

    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

impl JobSink for DirectoryWriter {
    fn emit(&mut self, stream: &JobStream, name: &str, index: usize) -> JobGenResult<()> {
        fs::create_dir_all(&self.out_dir).map_err(|source| JobGenError::Io {
            path: self.out_dir.clone(),
            source,
        })?;

        let path = self.out_dir.join(job_file_name(name, index));
        fs::write(&path, stream.to_string()).map_err(|source| JobGenError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Wrote {} jobs to {}", stream.len(), path.display());
        Ok(())
    }
}

/// Keeps the rendered streams in memory, keyed by file name.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: BTreeMap<String, String>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str, index: usize) -> Option<&str> {
        self.files.get(&job_file_name(name, index)).map(String::as_str)
    }

    #[must_use]
    pub fn num_files(&self) -> usize {
        self.files.len()
    }

    pub fn files(&self) -> impl Iterator<Item = (&String, &String)> {
        self.files.iter()
    }
}

impl JobSink for MemorySink {
    fn emit(&mut self, stream: &JobStream, name: &str, index: usize) -> JobGenResult<()> {
        self.files
            .insert(job_file_name(name, index), stream.to_string());
        Ok(())
    }
}
