//! Raman maps: the map text format, per-map metadata and the destructive
//! map operations (cut, shift, anchor subtraction).
//!
//! A map file is tab separated. The first row holds two empty cells and the
//! frequency axis; every following row holds the `y` and `x` coordinates of
//! one point and its intensities:
//!
//! ```text
//! \t\t100.000\t101.000\t
//! 0.0\t0.0\t12.50\t13.75\t
//! 0.0\t1.0\t11.25\t14.00\t
//! ```
//!
//! Coordinates are kept as the text read from the file so that per-point
//! file names and heatmap rows reproduce them exactly.

use std::fs::{self, File};
use std::io::{self, prelude::*, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};
use ndarray::{s, Array1};
use serde::{Deserialize, Serialize};

use crate::anchors::{find_closest, AnchorSet, Subtraction};
use crate::config::ProcessingConfig;
use crate::error::{RamanError, Result};
use crate::export;
use crate::fitting::Progress;

pub const CUT_SUFFIX: &str = "_cut";
pub const SHIFTED_SUFFIX: &str = "_shifted";
pub const SUBTRACTED_SUFFIX: &str = "_subtracted";

/// `(x_text, y_text)` of one map point.
pub type PointKey = (String, String);

/// Frequencies plus one intensity array per point, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct MapData {
    frequencies: Array1<f64>,
    spectra: IndexMap<PointKey, Array1<f64>>,
}

impl MapData {
    pub fn new(frequencies: Array1<f64>) -> Self {
        Self {
            frequencies,
            spectra: IndexMap::new(),
        }
    }

    /// Add or replace the spectrum at `key`.
    pub fn insert(&mut self, key: PointKey, intensities: Array1<f64>) -> Result<()> {
        if intensities.len() != self.frequencies.len() {
            return Err(RamanError::DimensionMismatch(format!(
                "point ({}, {}) has {} intensities for {} frequencies",
                key.0,
                key.1,
                intensities.len(),
                self.frequencies.len()
            )));
        }
        self.spectra.insert(key, intensities);
        Ok(())
    }

    pub fn frequencies(&self) -> &Array1<f64> {
        &self.frequencies
    }

    pub fn spectra(&self) -> &IndexMap<PointKey, Array1<f64>> {
        &self.spectra
    }

    pub fn get(&self, x: &str, y: &str) -> Option<&Array1<f64>> {
        self.spectra.get(&(x.to_string(), y.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PointKey, &Array1<f64>)> {
        self.spectra.iter()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Parse map text.
    ///
    /// Blank lines are skipped. Every point row must carry exactly one
    /// intensity per frequency.
    pub fn read<R: Read>(source: R) -> Result<Self> {
        let mut reader = BufReader::new(source);
        let mut buffer = String::new();
        let mut line_number = 0;
        let mut data: Option<MapData> = None;

        loop {
            buffer.clear();
            if reader.read_line(&mut buffer)? == 0 {
                break;
            }
            line_number += 1;
            let tokens: Vec<&str> = buffer.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            let values = |tokens: &[&str]| -> Result<Vec<f64>> {
                tokens
                    .iter()
                    .map(|t| {
                        t.parse::<f64>().map_err(|_| RamanError::MapFormat {
                            line: line_number,
                            message: format!("'{}' is not a number", t),
                        })
                    })
                    .collect()
            };

            match data.as_mut() {
                None => data = Some(MapData::new(Array1::from(values(&tokens)?))),
                Some(data) => {
                    if tokens.len() < 2 {
                        return Err(RamanError::MapFormat {
                            line: line_number,
                            message: "missing point coordinates".to_string(),
                        });
                    }
                    let intensities = values(&tokens[2..])?;
                    if intensities.len() != data.frequencies.len() {
                        return Err(RamanError::MapFormat {
                            line: line_number,
                            message: format!(
                                "{} intensities for {} frequencies",
                                intensities.len(),
                                data.frequencies.len()
                            ),
                        });
                    }
                    let key = (tokens[1].to_string(), tokens[0].to_string());
                    data.spectra.insert(key, Array1::from(intensities));
                }
            }
        }

        data.ok_or_else(|| RamanError::MapFormat {
            line: line_number,
            message: "no frequency row".to_string(),
        })
    }

    pub fn read_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read(File::open(path)?)
    }

    /// Write map text: frequencies with 3 decimals, intensities with 2.
    pub fn write<W: Write>(&self, sink: W) -> Result<()> {
        let mut writer = BufWriter::new(sink);
        write!(writer, "\t\t")?;
        for f in self.frequencies.iter() {
            write!(writer, "{:.3}\t", f)?;
        }
        writeln!(writer)?;
        for ((x, y), intensities) in &self.spectra {
            write!(writer, "{}\t{}\t", y, x)?;
            for i in intensities.iter() {
                write!(writer, "{:.2}\t", i)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write(File::create(path)?)
    }

    /// Element-wise mean over all points.
    pub fn average(&self) -> Result<Array1<f64>> {
        if self.spectra.is_empty() {
            return Err(RamanError::NoData("map has no points".to_string()));
        }
        let mut sum = Array1::<f64>::zeros(self.frequencies.len());
        for intensities in self.spectra.values() {
            sum += intensities;
        }
        Ok(sum / self.spectra.len() as f64)
    }

    /// `(start, end)` sample range covering `[low, high]`, end exclusive.
    pub fn cut_indices(&self, low: f64, high: f64) -> Result<(usize, usize)> {
        if self.frequencies.is_empty() {
            return Err(RamanError::NoData("map has no frequencies".to_string()));
        }
        let start = find_closest(low, self.frequencies.view());
        let end = find_closest(high, self.frequencies.view()) + 1;
        if start >= end {
            return Err(RamanError::ParameterError(format!(
                "empty cut range {} to {}",
                low, high
            )));
        }
        Ok((start, end))
    }

    /// Keep samples `start..end` of every spectrum.
    pub fn cut(&self, start: usize, end: usize) -> Result<Self> {
        if start >= end || end > self.frequencies.len() {
            return Err(RamanError::DimensionMismatch(format!(
                "cut {}..{} of {} samples",
                start,
                end,
                self.frequencies.len()
            )));
        }
        Ok(Self {
            frequencies: self.frequencies.slice(s![start..end]).to_owned(),
            spectra: self
                .spectra
                .iter()
                .map(|(key, i)| (key.clone(), i.slice(s![start..end]).to_owned()))
                .collect(),
        })
    }

    /// Add `dx` to every frequency and `dy` to every intensity.
    pub fn shift(&self, dx: f64, dy: f64) -> Self {
        Self {
            frequencies: &self.frequencies + dx,
            spectra: self
                .spectra
                .iter()
                .map(|(key, i)| (key.clone(), i + dy))
                .collect(),
        }
    }

    /// Subtract the anchor baseline from every point.
    pub fn subtract(
        &self,
        anchors: &AnchorSet,
        half_width: usize,
    ) -> Result<(Self, IndexMap<PointKey, Subtraction>)> {
        let mut result = Self::new(self.frequencies.clone());
        let mut subtractions = IndexMap::with_capacity(self.spectra.len());
        for (key, intensities) in &self.spectra {
            let subtraction = anchors.subtract(&self.frequencies, intensities, half_width)?;
            result
                .spectra
                .insert(key.clone(), subtraction.subtracted.clone());
            subtractions.insert(key.clone(), subtraction);
        }
        Ok((result, subtractions))
    }
}

/// Where a map lives on disk and what has been done to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub directory: PathBuf,

    /// Display name, accumulating operation suffixes.
    pub name: String,

    /// Name of the original file, used as a stable key.
    pub orig: String,

    /// Number of points, known once the map has been read.
    pub spectra_num: Option<usize>,
}

impl Map {
    pub fn new(directory: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            directory: directory.into(),
            orig: name.clone(),
            name,
            spectra_num: None,
        }
    }

    /// Build from the path of a map file: its parent and stem.
    pub fn from_path(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| RamanError::NoData(format!("{} is not a map file", path.display())))?;
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::new(directory, stem))
    }

    /// Append an operation suffix once.
    pub fn add_suffix(&mut self, suffix: &str) {
        if !self.name.contains(suffix) {
            self.name.push_str(suffix);
        }
    }

    /// `{directory}/{orig}_Files`
    pub fn files_dir(&self) -> PathBuf {
        self.directory.join(format!("{}_Files", self.orig))
    }

    pub fn parameters_dir(&self) -> PathBuf {
        self.files_dir().join("Parameters")
    }

    pub fn fits_dir(&self) -> PathBuf {
        self.files_dir().join("Fits")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.fits_dir().join("Reports")
    }

    pub fn heatmaps_dir(&self) -> PathBuf {
        self.fits_dir().join("Heatmaps")
    }

    pub fn individual_dir(&self) -> PathBuf {
        self.files_dir().join("Individual Spectra")
    }

    pub fn subtracted_dir(&self) -> PathBuf {
        self.individual_dir().join("Subtracted")
    }

    pub fn average_dir(&self) -> PathBuf {
        self.files_dir().join("Average Spectra")
    }

    /// The map file under its current name.
    pub fn file_path(&self) -> PathBuf {
        self.directory.join(format!("{}.txt", self.name))
    }
}

/// Average spectrum of one map.
#[derive(Debug, Clone, PartialEq)]
pub struct AverageSpectrum {
    pub orig: String,
    pub frequencies: Array1<f64>,
    pub intensities: Array1<f64>,
}

/// Open maps with their working copies.
///
/// Every map is copied into `temp_dir` on open; operations rewrite the
/// working copy and, when persisted, the map file under its new name.
#[derive(Debug, Clone)]
pub struct MapStore {
    temp_dir: PathBuf,
    maps: Vec<Map>,
}

impl MapStore {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Result<Self> {
        let temp_dir = temp_dir.into();
        fs::create_dir_all(&temp_dir)?;
        Ok(Self {
            temp_dir,
            maps: Vec::new(),
        })
    }

    /// Store keeping its working copies under `config.temp_dir`.
    pub fn from_config(config: &ProcessingConfig) -> Result<Self> {
        Self::new(config.temp_dir.clone())
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn maps(&self) -> &[Map] {
        &self.maps
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn get(&self, orig: &str) -> Result<&Map> {
        self.maps
            .iter()
            .find(|m| m.orig == orig)
            .ok_or_else(|| RamanError::MapNotFound(orig.to_string()))
    }

    fn get_mut(&mut self, orig: &str) -> Result<&mut Map> {
        self.maps
            .iter_mut()
            .find(|m| m.orig == orig)
            .ok_or_else(|| RamanError::MapNotFound(orig.to_string()))
    }

    fn working_path(&self, orig: &str) -> PathBuf {
        self.temp_dir.join(format!("{}.txt", orig))
    }

    /// Read a map file, keep a working copy and register it.
    pub fn open(&mut self, path: &Path) -> Result<&Map> {
        let mut map = Map::from_path(path)?;
        if self.maps.iter().any(|m| m.orig == map.orig) {
            return Err(RamanError::DuplicateMap(map.orig));
        }
        let data = MapData::read_path(path)?;
        data.write_path(self.working_path(&map.orig))?;
        map.spectra_num = Some(data.len());
        info!(
            "Opened map {} with {} points and {} frequencies",
            map.orig,
            data.len(),
            data.frequencies().len()
        );
        let orig = map.orig.clone();
        self.maps.push(map);
        self.get(&orig)
    }

    /// Forget a map and drop its working copy.
    pub fn remove(&mut self, orig: &str) -> Result<Map> {
        let index = self
            .maps
            .iter()
            .position(|m| m.orig == orig)
            .ok_or_else(|| RamanError::MapNotFound(orig.to_string()))?;
        let map = self.maps.remove(index);
        remove_if_present(&self.working_path(orig))?;
        Ok(map)
    }

    /// Forget every map and drop all working copies.
    pub fn clear(&mut self) -> Result<()> {
        for map in std::mem::take(&mut self.maps) {
            remove_if_present(&self.working_path(&map.orig))?;
        }
        Ok(())
    }

    /// Current data of a map.
    pub fn read(&mut self, orig: &str) -> Result<MapData> {
        let data = MapData::read_path(self.working_path(orig))?;
        let map = self.get_mut(orig)?;
        if map.spectra_num.is_none() {
            map.spectra_num = Some(data.len());
        }
        Ok(data)
    }

    /// Replace the working copy; with `persist` also write
    /// `{directory}/{name}.txt`.
    pub fn write(&mut self, orig: &str, data: &MapData, persist: bool) -> Result<()> {
        let map = self.get(orig)?.clone();
        data.write_path(self.working_path(orig))?;
        if persist {
            data.write_path(map.file_path())?;
        }
        self.get_mut(orig)?.spectra_num = Some(data.len());
        Ok(())
    }

    /// Average spectrum of one map, from its current data.
    pub fn average(&mut self, orig: &str) -> Result<AverageSpectrum> {
        let data = self.read(orig)?;
        Ok(AverageSpectrum {
            orig: orig.to_string(),
            intensities: data.average()?,
            frequencies: data.frequencies().clone(),
        })
    }

    /// Average spectra of every map, in open order.
    pub fn averages(&mut self) -> Result<Vec<AverageSpectrum>> {
        let origs: Vec<String> = self.maps.iter().map(|m| m.orig.clone()).collect();
        origs.iter().map(|orig| self.average(orig)).collect()
    }

    fn origs(&self) -> Result<Vec<String>> {
        if self.maps.is_empty() {
            return Err(RamanError::NoMaps);
        }
        Ok(self.maps.iter().map(|m| m.orig.clone()).collect())
    }

    /// Cut every map to `[low, high]`.
    ///
    /// The sample range is resolved on the first map and applied to all.
    pub fn cut_all(&mut self, low: f64, high: f64) -> Result<()> {
        let origs = self.origs()?;
        let first = self.read(&origs[0])?;
        let (start, end) = first.cut_indices(low, high)?;

        let mut cut = Vec::with_capacity(origs.len());
        for orig in &origs {
            cut.push(self.read(orig)?.cut(start, end)?);
        }
        for (orig, data) in origs.iter().zip(&cut) {
            self.get_mut(orig)?.add_suffix(CUT_SUFFIX);
            self.write(orig, data, true)?;
        }
        info!(
            "Cut {} maps to samples {}..{} ({} to {})",
            origs.len(),
            start,
            end,
            low,
            high
        );
        Ok(())
    }

    /// Shift every map by `dx` in frequency and `dy` in intensity.
    pub fn shift_all(&mut self, dx: f64, dy: f64) -> Result<()> {
        let origs = self.origs()?;
        for orig in &origs {
            let shifted = self.read(orig)?.shift(dx, dy);
            self.get_mut(orig)?.add_suffix(SHIFTED_SUFFIX);
            self.write(orig, &shifted, true)?;
        }
        info!("Shifted {} maps by ({}, {})", origs.len(), dx, dy);
        Ok(())
    }

    /// Subtract the anchor baseline from every point of every map.
    ///
    /// Each subtracted point is saved under `Individual Spectra/Subtracted`
    /// and the anchors under `Parameters/BaselineParameters.txt`.
    pub fn subtract_all(
        &mut self,
        anchors: &AnchorSet,
        half_width: usize,
        mut progress: impl FnMut(Progress),
    ) -> Result<()> {
        let origs = self.origs()?;
        let mut subtracted = Vec::with_capacity(origs.len());
        for orig in &origs {
            subtracted.push(self.read(orig)?.subtract(anchors, half_width)?);
        }

        let total = subtracted.iter().map(|(data, _)| data.len()).sum();
        let mut done = 0;
        let parameter_text = anchors.to_parameter_text(half_width);
        for (orig, (data, _)) in origs.iter().zip(&subtracted) {
            let map = self.get(orig)?.clone();
            let dir = map.subtracted_dir();
            fs::create_dir_all(&dir)?;
            for (key, intensities) in data.iter() {
                let stem = export::point_file_stem(&map.orig, key);
                export::save_spectrum(
                    dir.join(format!("{}_subtracted.txt", stem)),
                    data.frequencies(),
                    intensities,
                )?;
                done += 1;
                progress(Progress::new(done, total));
            }
            debug!("Saved {} subtracted spectra of {}", data.len(), orig);

            self.get_mut(orig)?.add_suffix(SUBTRACTED_SUFFIX);
            self.write(orig, data, true)?;
            export::save_text(
                map.parameters_dir().join("BaselineParameters.txt"),
                &parameter_text,
            )?;
        }
        info!(
            "Subtracted a {}-anchor baseline from {} maps",
            anchors.len(),
            origs.len()
        );
        Ok(())
    }

    /// Save every map's average spectrum; returns the written paths.
    pub fn save_averages(&mut self) -> Result<Vec<PathBuf>> {
        let origs = self.origs()?;
        let mut paths = Vec::with_capacity(origs.len());
        for orig in &origs {
            let average = self.average(orig)?;
            let map = self.get(orig)?;
            let path = map.average_dir().join(format!("{}_average.txt", map.name));
            export::save_spectrum(&path, &average.frequencies, &average.intensities)?;
            paths.push(path);
        }
        info!("Saved {} average spectra", paths.len());
        Ok(paths)
    }

    /// Save every map's average spectrum with the anchor baseline removed.
    pub fn save_subtracted_averages(
        &mut self,
        anchors: &AnchorSet,
        half_width: usize,
    ) -> Result<Vec<PathBuf>> {
        let origs = self.origs()?;
        let mut paths = Vec::with_capacity(origs.len());
        for orig in &origs {
            let average = self.average(orig)?;
            let subtraction =
                anchors.subtract(&average.frequencies, &average.intensities, half_width)?;
            let map = self.get(orig)?;
            let path = map
                .average_dir()
                .join(format!("{}_subAverage.txt", map.name));
            export::save_spectrum(&path, &average.frequencies, &subtraction.subtracted)?;
            paths.push(path);
        }
        info!("Saved {} subtracted average spectra", paths.len());
        Ok(paths)
    }

    /// Save every point of every map as its own spectrum file.
    pub fn save_individual_spectra(&mut self, mut progress: impl FnMut(Progress)) -> Result<()> {
        let origs = self.origs()?;
        let mut all = Vec::with_capacity(origs.len());
        for orig in &origs {
            all.push(self.read(orig)?);
        }
        let total = all.iter().map(MapData::len).sum();
        let mut done = 0;
        for (orig, data) in origs.iter().zip(&all) {
            let map = self.get(orig)?;
            let dir = map.individual_dir();
            fs::create_dir_all(&dir)?;
            for (key, intensities) in data.iter() {
                let stem = export::point_file_stem(&map.name, key);
                export::save_spectrum(
                    dir.join(format!("{}.txt", stem)),
                    data.frequencies(),
                    intensities,
                )?;
                done += 1;
                progress(Progress::new(done, total));
            }
        }
        info!("Saved {} individual spectra", total);
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
