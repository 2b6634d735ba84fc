//! Text exports: two-column spectra, fit spectra and heatmaps.
//!
//! Every numeric column is written with 2 decimals. Writers take any
//! [`Write`]; the `save_*` helpers create missing parent directories.

use std::fs::{self, File};
use std::io::{prelude::*, BufWriter};
use std::path::Path;

use ndarray::Array1;

use crate::error::{RamanError, Result};
use crate::fitting::{FitSpectrum, Heatmap};
use crate::maps::PointKey;

/// `{name}_X_{x}_Y_{y}` with the fractional part of each coordinate dropped.
pub fn point_file_stem(name: &str, key: &PointKey) -> String {
    let integral = |s: &str| s.split('.').next().unwrap_or_default().to_string();
    format!("{}_X_{}_Y_{}", name, integral(&key.0), integral(&key.1))
}

/// `Wavenumber(cm-1)\tIntensity` followed by one row per sample.
pub fn write_spectrum<W: Write>(
    sink: W,
    frequencies: &Array1<f64>,
    intensities: &Array1<f64>,
) -> Result<()> {
    if frequencies.len() != intensities.len() {
        return Err(RamanError::DimensionMismatch(format!(
            "{} intensities for {} frequencies",
            intensities.len(),
            frequencies.len()
        )));
    }
    let mut writer = BufWriter::new(sink);
    writeln!(writer, "Wavenumber(cm-1)\tIntensity")?;
    for (f, i) in frequencies.iter().zip(intensities.iter()) {
        writeln!(writer, "{:.2}\t{:.2}", f, i)?;
    }
    writer.flush()?;
    Ok(())
}

/// Observed data, total fit, baseline and one baseline-plus-band column per
/// band.
pub fn write_fit_spectrum<W: Write>(sink: W, spectrum: &FitSpectrum) -> Result<()> {
    let mut writer = BufWriter::new(sink);
    write!(writer, "Wavenumber(cm-1)\tIntData\tInt(FitTotal)\tInt(Baseline)")?;
    for i in 0..spectrum.bands.len() {
        write!(writer, "\tInt(B{})", i)?;
    }
    writeln!(writer)?;

    for (row, f) in spectrum.frequencies.iter().enumerate() {
        write!(
            writer,
            "{:.2}\t{:.2}\t{:.2}\t{:.2}",
            f, spectrum.observed[row], spectrum.total[row], spectrum.baseline[row]
        )?;
        for band in &spectrum.bands {
            write!(writer, "\t{:.2}", band[row])?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// `X(um)\tY(um)\tI(B0)...`, then one row per point.
pub fn write_heatmap<W: Write>(sink: W, heatmap: &Heatmap) -> Result<()> {
    let mut writer = BufWriter::new(sink);
    write!(writer, "X(um)\tY(um)")?;
    for i in 0..heatmap.band_count() {
        write!(writer, "\tI(B{})", i)?;
    }
    for ((x, y), intensities) in heatmap.rows() {
        write!(writer, "\n{}\t{}", x, y)?;
        for h in intensities {
            write!(writer, "\t{:.2}", h)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn create<P: AsRef<Path>>(path: P) -> Result<File> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

pub fn save_spectrum<P: AsRef<Path>>(
    path: P,
    frequencies: &Array1<f64>,
    intensities: &Array1<f64>,
) -> Result<()> {
    write_spectrum(create(path)?, frequencies, intensities)
}

pub fn save_fit_spectrum<P: AsRef<Path>>(path: P, spectrum: &FitSpectrum) -> Result<()> {
    write_fit_spectrum(create(path)?, spectrum)
}

pub fn save_heatmap<P: AsRef<Path>>(path: P, heatmap: &Heatmap) -> Result<()> {
    write_heatmap(create(path)?, heatmap)
}

pub fn save_text<P: AsRef<Path>>(path: P, text: &str) -> Result<()> {
    create(path)?.write_all(text.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn key(x: &str, y: &str) -> PointKey {
        (x.to_string(), y.to_string())
    }

    #[test]
    fn test_point_file_stem_drops_fraction() {
        assert_eq!(
            point_file_stem("map_cut", &key("12.5", "-3.75")),
            "map_cut_X_12_Y_-3"
        );
        assert_eq!(point_file_stem("m", &key("4", "0")), "m_X_4_Y_0");
    }

    #[test]
    fn test_write_spectrum() {
        let mut out = Vec::new();
        write_spectrum(&mut out, &array![100.0, 101.5], &array![1.234, -2.0]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Wavenumber(cm-1)\tIntensity\n100.00\t1.23\n101.50\t-2.00\n"
        );
        assert!(write_spectrum(Vec::new(), &array![1.0], &array![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_write_fit_spectrum() {
        let spectrum = FitSpectrum {
            frequencies: array![100.0],
            observed: array![10.0],
            total: array![9.5],
            baseline: array![1.0],
            bands: vec![array![8.0], array![2.5]],
        };
        let mut out = Vec::new();
        write_fit_spectrum(&mut out, &spectrum).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Wavenumber(cm-1)\tIntData\tInt(FitTotal)\tInt(Baseline)\tInt(B0)\tInt(B1)\n\
             100.00\t10.00\t9.50\t1.00\t8.00\t2.50\n"
        );
    }

    #[test]
    fn test_write_heatmap() {
        let mut heatmap = Heatmap::new(2);
        heatmap.push(key("0", "0"), vec![1.0, 2.5]);
        heatmap.push(key("5", "0"), vec![3.25, 4.0]);
        let mut out = Vec::new();
        write_heatmap(&mut out, &heatmap).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "X(um)\tY(um)\tI(B0)\tI(B1)\n0\t0\t1.00\t2.50\n5\t0\t3.25\t4.00"
        );
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("notes.txt");
        save_text(&path, "hello").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "hello");
    }
}
