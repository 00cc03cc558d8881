// src/process/feed.rs

use chrono::NaiveDate;
use tracing::{debug, instrument};

use crate::error::{ForecastError, Result};
use crate::process::date_parser::date_from_fields;

/// Lines starting with this character form the feed's preamble.
pub const COMMENT_MARKER: char = '#';

/// Zero-based position of the daily Ap index in a nowcast row:
/// `YYYY MM DD days days_m Bsr dB Kp1..Kp8 ap1..ap8 Ap SN F10.7obs F10.7adj D`.
pub const DAILY_AP_COLUMN: usize = 23;

/// One data row: its calendar day plus every numeric field, date fields included.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub fields: Vec<f64>,
}

/// Data rows of a feed, in file order, all of the same width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    rows: Vec<Observation>,
    width: usize,
}

impl ObservationTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fields per row; zero for an empty table.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    /// Values of column `index`, or `None` when the rows are narrower than that.
    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        if self.is_empty() {
            return Some(Vec::new());
        }
        if index >= self.width {
            return None;
        }
        Some(self.rows.iter().map(|r| r.fields[index]).collect())
    }

    /// The daily Ap series.
    pub fn ap_series(&self) -> Vec<f64> {
        self.column(DAILY_AP_COLUMN).unwrap_or_default()
    }
}

/// Parse a whitespace-delimited feed.
///
/// Data starts at the first line that does not begin with [`COMMENT_MARKER`];
/// blank lines after that point are skipped. The first data row fixes the
/// field count and every later row must match it exactly.
#[instrument(level = "debug", skip(text), fields(bytes = text.len()))]
pub fn parse_feed(text: &str) -> Result<ObservationTable> {
    let lines: Vec<&str> = text.lines().collect();
    let Some(data_start) = lines.iter().position(|l| !l.starts_with(COMMENT_MARKER)) else {
        debug!("feed holds no data lines");
        return Ok(ObservationTable::default());
    };

    let mut table = ObservationTable::default();
    for (idx, line) in lines.iter().enumerate().skip(data_start) {
        let line_no = idx + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        if table.is_empty() {
            if tokens.len() <= DAILY_AP_COLUMN {
                return Err(ForecastError::parse(
                    line_no,
                    format!(
                        "expected at least {} fields, found {}",
                        DAILY_AP_COLUMN + 1,
                        tokens.len()
                    ),
                ));
            }
            table.width = tokens.len();
        } else if tokens.len() != table.width {
            return Err(ForecastError::parse(
                line_no,
                format!("expected {} fields, found {}", table.width, tokens.len()),
            ));
        }

        table.rows.push(parse_row(line_no, &tokens)?);
    }

    debug!(rows = table.len(), width = table.width, "parsed feed");
    Ok(table)
}

fn parse_row(line_no: usize, tokens: &[&str]) -> Result<Observation> {
    let fields = tokens
        .iter()
        .enumerate()
        .map(|(i, tok)| {
            tok.parse::<f64>().map_err(|_| {
                ForecastError::parse(line_no, format!("field {} ({:?}) is not numeric", i, tok))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    let date = date_from_fields(tokens[0], tokens[1], tokens[2]).ok_or_else(|| {
        ForecastError::parse(
            line_no,
            format!(
                "{} {} {} is not a valid year/month/day",
                tokens[0], tokens[1], tokens[2]
            ),
        )
    })?;

    Ok(Observation { date, fields })
}
