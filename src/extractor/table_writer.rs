use crate::config::{OutputConfig, DEFAULT_PRECISION};
use crate::error::{ExtractError, Result};
use crate::extractor::RegionTimeSeries;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Serialises a [`RegionTimeSeries`] as a delimited table: one header row of
/// region labels, then one row per time point.
#[derive(Debug, Clone)]
pub struct TableWriter {
    precision: usize,
    delimiter: u8,
}

impl TableWriter {
    pub fn new() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            delimiter: b',',
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new()
            .with_precision(config.precision)
            .with_delimiter(config.delimiter as u8)
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision.clamp(1, 17);
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Writes (or overwrites) `path`. The parent directory must already exist.
    pub fn write<P: AsRef<Path>>(&self, path: P, series: &RegionTimeSeries) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ExtractError::write(
                    path,
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("directory {} does not exist", parent.display()),
                    ),
                ));
            }
        }

        let file = fs::File::create(path).map_err(|e| ExtractError::write(path, e))?;

        match self.write_to(BufWriter::new(file), series) {
            Ok(()) => {
                log::debug!(
                    "Wrote {} rows x {} columns to {}",
                    series.n_timepoints(),
                    series.n_regions(),
                    path.display()
                );
                Ok(())
            }
            Err(ExtractError::Io(e)) => Err(ExtractError::write(path, e)),
            Err(ExtractError::Csv(e)) => Err(ExtractError::write(
                path,
                io::Error::new(io::ErrorKind::Other, e),
            )),
            Err(e) => Err(e),
        }
    }

    pub fn write_to<W: Write>(&self, writer: W, series: &RegionTimeSeries) -> Result<()> {
        let mut table = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(writer);

        table.write_record(series.labels.iter().map(|label| label.to_string()))?;

        for row in series.values.rows() {
            table.write_record(row.iter().map(|&v| format_significant(v, self.precision)))?;
        }

        table.flush()?;
        Ok(())
    }

    pub fn render(&self, series: &RegionTimeSeries) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer, series)?;
        String::from_utf8(buffer).map_err(|e| ExtractError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

impl Default for TableWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats `value` with `precision` significant digits the way C's `%g`
/// does: fixed notation for decimal exponents in `[-4, precision)`,
/// scientific otherwise, trailing zeros removed.
pub fn format_significant(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}
