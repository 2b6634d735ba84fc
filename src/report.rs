//! Human-readable fit reports and re-import of guide-fit parameters.
//!
//! The report follows the lmfit `fit_report` layout:
//!
//! ```text
//! [[Fit Statistics]]
//!     # fitting method   = leastsq
//!     # function evals   = 29
//!     ...
//! [[Variables]]
//!     offset:  4.99812345 +/- 0.12345678 (2.47%) (init = 0)
//!     x0:      100.001234 +/- 0.01234567 (0.01%) (init = 97)
//! [[Correlations]] (unreported correlations are < 0.100)
//!     C(offset, slope) = -0.9912
//! ```
//!
//! [`import_report`] reads the `Variables` section back into baseline and
//! band values.

use std::fmt::Write as _;

use nom::{
    character::complete::{alpha1, char, digit0, space0, space1},
    combinator::{opt, recognize},
    number::complete::double,
    sequence::pair,
    IResult, Parser,
};

use crate::error::{RamanError, Result};
use crate::minimizer::MinimizerResult;
use crate::parameters::spectral::{OFFSET, SLOPE};
use crate::utils::round_to;

/// Correlations below this magnitude are left out of the report.
pub const MIN_CORRELATION: f64 = 0.1;

/// Render an lmfit-style report of a fit.
pub fn fit_report(result: &MinimizerResult) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, result);
    out
}

fn write_report(out: &mut String, result: &MinimizerResult) -> std::fmt::Result {
    writeln!(out, "[[Fit Statistics]]")?;
    writeln!(out, "    # fitting method   = leastsq")?;
    writeln!(out, "    # function evals   = {}", result.nfev)?;
    writeln!(out, "    # data points      = {}", result.ndata)?;
    writeln!(out, "    # variables        = {}", result.nvarys)?;
    writeln!(out, "    chi-square         = {:.8}", result.chisqr)?;
    writeln!(out, "    reduced chi-square = {:.8}", result.redchi)?;
    writeln!(out, "    Akaike info crit   = {:.8}", result.aic())?;
    writeln!(out, "    Bayesian info crit = {:.8}", result.bic())?;
    if !result.success {
        writeln!(out, "##  Warning: {}", result.message)?;
    }
    if result.nvarys > 0 && !result.errorbars() {
        writeln!(out, "##  Warning: uncertainties could not be estimated")?;
    }

    writeln!(out, "[[Variables]]")?;
    let width = result.params.names().iter().map(|n| n.len()).max().unwrap_or(0) + 1;
    for (name, param) in result.params.iter() {
        let label = format!("{}:", name);
        write!(out, "    {:<width$} {:.8}", label, param.value(), width = width)?;
        if !param.vary() {
            writeln!(out, " (fixed)")?;
            continue;
        }
        if let Some(stderr) = param.stderr() {
            write!(out, " +/- {:.8}", stderr)?;
            if param.value() != 0.0 {
                write!(out, " ({:.2}%)", (stderr / param.value()).abs() * 100.0)?;
            }
        }
        let init = result
            .init_params
            .get(name)
            .map(|p| p.value())
            .unwrap_or(f64::NAN);
        writeln!(out, " (init = {})", init)?;
    }

    writeln!(
        out,
        "[[Correlations]] (unreported correlations are < {:.3})",
        MIN_CORRELATION
    )?;
    let mut pairs = Vec::new();
    if let Some(correlation) = &result.correlation {
        for i in 0..result.var_names.len() {
            for j in (i + 1)..result.var_names.len() {
                let c = correlation[[i, j]];
                if c.abs() >= MIN_CORRELATION {
                    pairs.push((format!("C({}, {})", result.var_names[i], result.var_names[j]), c));
                }
            }
        }
    }
    pairs.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    let width = pairs.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    for (label, c) in pairs {
        writeln!(out, "    {:<width$} = {:+.4}", label, c, width = width)?;
    }
    Ok(())
}

/// Baseline and band values read back from a report.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedGuide {
    pub offset: f64,
    pub slope: f64,
    /// `(position, decay, intensity)` per band, in report order.
    pub bands: Vec<(f64, f64, f64)>,
}

type NomError<'a> = nom::error::Error<&'a str>;

/// `name[:] value`, e.g. `    x0:      100.001234 +/- ...`.
fn variable_line(input: &str) -> IResult<&str, (&str, f64)> {
    let (input, _) = space0::<&str, NomError>.parse(input)?;
    let (input, name) = recognize(pair(
        alpha1::<&str, NomError>,
        digit0::<&str, NomError>,
    ))
    .parse(input)?;
    let (input, _) = opt(char::<&str, NomError>(':')).parse(input)?;
    let (input, _) = space1::<&str, NomError>.parse(input)?;
    let (input, value) = double::<&str, NomError>(input)?;
    Ok((input, (name, value)))
}

fn is_band_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some('x' | 'd' | 'h'))
        && !chars.as_str().is_empty()
        && chars.all(|c| c.is_ascii_digit())
}

/// Read baseline and band values from a guide-fit report.
///
/// Only the lines between the `Variables` and `Correlations` markers are
/// read. Band values are taken in the order met and grouped in threes;
/// every value is rounded to 2 decimals. Nothing is returned unless the
/// whole section is well formed.
pub fn import_report(text: &str) -> Result<ImportedGuide> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| l.contains("Variables"));
    let end = start.and_then(|s| {
        lines[s..]
            .iter()
            .position(|l| l.contains("Correlations"))
            .map(|e| s + e)
    });
    let (Some(start), Some(end)) = (start, end) else {
        return Err(RamanError::ImportFormat(
            "file must be the result of a guide fit".to_string(),
        ));
    };

    let mut offset = None;
    let mut slope = None;
    let mut values = Vec::new();
    for line in &lines[start + 1..end] {
        let Ok((_, (name, value))) = variable_line(line) else {
            continue;
        };
        let value = round_to(value, 2);
        match name {
            OFFSET => offset = Some(value),
            SLOPE => slope = Some(value),
            name if is_band_name(name) => values.push(value),
            _ => {}
        }
    }

    if values.is_empty() || values.len() % 3 != 0 {
        return Err(RamanError::ImportFormat(format!(
            "no parameters to import or incorrect number of parameters ({})",
            values.len()
        )));
    }
    let (Some(offset), Some(slope)) = (offset, slope) else {
        return Err(RamanError::ImportFormat(
            "baseline offset or slope missing".to_string(),
        ));
    };

    Ok(ImportedGuide {
        offset,
        slope,
        bands: values.chunks(3).map(|c| (c[0], c[1], c[2])).collect(),
    })
}
