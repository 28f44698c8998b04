//! CLI surface and the `Config` it resolves to (§6).
//!
//! Grounded on the teacher's `config.rs` load-and-validate shape; the flag
//! set itself is grounded on `original_source/src/emulator.py`'s
//! `Emulator.__init__` parameters and `original_source/src/common.py`'s
//! `RunningMode`.

use crate::error::RehostError;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Full C3→C8 pipeline.
    Run,
    /// Inference only (through C4); reports compatibility, no filesystem writes.
    Check,
    /// Through cataloguing (C5); prints the resulting Firmware Image state.
    Analyze,
    /// Full pipeline, leaves the raw image attached/mounted, dumps full state.
    Debug,
}

#[derive(Debug, Parser)]
#[command(
    name = "rehost-prep",
    about = "Recovers a bootable rootfs+kernel from a firmware blob and rewrites it for emulation"
)]
pub struct Config {
    #[arg(short = 'm', long = "mode", value_enum, default_value_t = RunMode::Run)]
    pub mode: RunMode,

    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    #[arg(short = 'o', long = "output", default_value = "./output")]
    pub output: PathBuf,

    #[arg(short = 'b', long = "brand", default_value = "auto")]
    pub brand: String,

    #[arg(long = "sql", default_value = "")]
    pub sql_host: String,

    #[arg(short = 'p', long = "port", default_value_t = 5432)]
    pub port: u16,
}

impl Config {
    /// Validates the resolved flags before the pipeline starts. Missing
    /// input is a `ConfigError` (§7); catalog reachability is checked
    /// separately once a runtime is available.
    pub fn validate(&self) -> Result<(), RehostError> {
        if !self.input.exists() {
            return Err(RehostError::Config(format!(
                "input path {} does not exist",
                self.input.display()
            )));
        }
        Ok(())
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output.join("images")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.output.join("workDir")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_input() {
        let config = Config {
            mode: RunMode::Run,
            input: PathBuf::from("/nonexistent/path/to/firmware.bin"),
            output: PathBuf::from("/tmp/output"),
            brand: "auto".to_string(),
            sql_host: String::new(),
            port: 5432,
        };
        assert!(config.validate().is_err());
    }
}
