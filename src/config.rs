//! Processing options for a session.
//!
//! All options have defaults, so a JSON file only needs the fields it
//! changes:
//!
//! ```json
//! { "fit": { "window": 5.0 }, "box_half_width": 2 }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lm::LmConfig;

/// How map fits start from the accepted guide fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Hold band positions and decays at their guide values; only
    /// intensities vary. Default: false
    pub fix_position_and_decay: bool,

    /// Half width of the window positions and decays may move within.
    /// Default: 3.0
    pub window: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            fix_position_and_decay: false,
            window: 3.0,
        }
    }
}

/// Session-wide processing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub fit: FitOptions,

    /// Half width, in samples, of the box averaged at each anchor. Default: 3
    pub box_half_width: usize,

    /// Where working copies of open maps are kept. Default: `TEMP`
    pub temp_dir: PathBuf,

    /// Solver settings used for every fit.
    pub lm: LmConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            fit: FitOptions::default(),
            box_half_width: 3,
            temp_dir: PathBuf::from("TEMP"),
            lm: LmConfig::default(),
        }
    }
}

impl ProcessingConfig {
    pub fn with_fix_position_and_decay(mut self, fixed: bool) -> Self {
        self.fit.fix_position_and_decay = fixed;
        self
    }

    pub fn with_window(mut self, window: f64) -> Self {
        self.fit.window = window;
        self
    }

    pub fn with_box_half_width(mut self, half_width: usize) -> Self {
        self.box_half_width = half_width;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_lm(mut self, lm: LmConfig) -> Self {
        self.lm = lm;
        self
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
