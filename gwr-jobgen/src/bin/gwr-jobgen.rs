// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! # GWR Job Generator
//!
//! `gwr-jobgen` writes the DMA job files for the chimney and mesh
//! testbenches. Run with `--help` for the full set of options, all of which
//! can also be given in a TOML file (`--conf-file`) or as `GWR_JOBGEN_`
//! prefixed environment variables.

use std::io::Write;

use color_eyre::Result;
use gwr_jobgen::config::Settings;
use gwr_jobgen::emit::{DirectoryWriter, MemorySink};
use gwr_jobgen::testbench::run;
use log::{LevelFilter, info};

fn setup_logger(level: LevelFilter) {
    env_logger::builder()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .init();
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let settings = Settings::parse_all_sources()?;
    setup_logger(settings.log_level);

    let config = settings.resolve()?;
    if config.dry_run {
        let mut sink = MemorySink::new();
        run(&config, &mut sink)?;
        for (file_name, contents) in sink.files() {
            info!("{file_name}: {} bytes", contents.len());
        }
        info!("Dry run, nothing written to {}", config.out_dir.display());
    } else {
        let mut writer = DirectoryWriter::new(&config.out_dir);
        run(&config, &mut writer)?;
        info!("Job files written to {}", writer.out_dir().display());
    }
    Ok(())
}
