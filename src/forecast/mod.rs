// src/forecast/mod.rs

pub mod arima;
pub mod optimize;

use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::error::{ForecastError, Result};
use crate::process::date_parser::{following_days, format_iso};
use crate::process::feed::ObservationTable;
use arima::Arima;

/// Days forecast per request.
pub const HORIZON: usize = 7;
/// Observations fed to the model.
pub const WINDOW: usize = 7;
/// The window skips the newest row, which is usually a partial day.
pub const MIN_ROWS: usize = WINDOW + 1;
/// ARIMA (p, d, q)
pub const ORDER: (usize, usize, usize) = (2, 1, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: i64,
}

/// Exactly [`HORIZON`] consecutive days with non-negative integer forecasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastResult {
    points: Vec<ForecastPoint>,
}

impl ForecastResult {
    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    /// `YYYY-MM-DD` strings, in order.
    pub fn dates(&self) -> Vec<String> {
        self.points.iter().map(|p| format_iso(p.date)).collect()
    }

    pub fn values(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

/// Rows `[n - 8, n - 1)`: the seven observations before the newest one.
pub fn forecast_window(values: &[f64]) -> Result<&[f64]> {
    let n = values.len();
    if n < MIN_ROWS {
        return Err(ForecastError::InsufficientData {
            required: MIN_ROWS,
            actual: n,
        });
    }
    Ok(&values[n - MIN_ROWS..n - 1])
}

/// Fit ARIMA(2,1,2) to `window` and forecast `steps` values, rounded half to
/// even and clipped below at zero.
pub fn forecast_values(window: &[f64], steps: usize) -> Result<Vec<i64>> {
    let (p, d, q) = ORDER;
    let mut model = Arima::new(p, d, q)?;
    model.fit(window)?;

    model
        .predict(steps)?
        .into_iter()
        .map(|v| {
            if v.is_finite() {
                Ok((v.round_ties_even() as i64).max(0))
            } else {
                Err(ForecastError::Model("forecast is not finite".to_string()))
            }
        })
        .collect()
}

/// Dates and Ap forecasts for the week after the second-to-last observation.
#[instrument(level = "info", skip(table), fields(rows = table.len()))]
pub fn forecast_table(table: &ObservationTable) -> Result<ForecastResult> {
    let series = table.ap_series();
    let window = forecast_window(&series)?;
    let values = forecast_values(window, HORIZON)?;

    let rows = table.rows();
    let anchor = rows[rows.len() - 2].date;
    let dates = following_days(anchor, HORIZON);
    if dates.len() != HORIZON {
        return Err(ForecastError::Model(format!(
            "calendar overflow after {}",
            anchor
        )));
    }

    info!(%anchor, forecast = ?values, "Ap forecast ready");
    Ok(ForecastResult {
        points: dates
            .into_iter()
            .zip(values)
            .map(|(date, value)| ForecastPoint { date, value })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::feed::parse_feed;

    fn feed(aps: &[i32]) -> String {
        let mut text = String::from("# synthetic nowcast\n");
        let start = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        for (i, ap) in aps.iter().enumerate() {
            let day = start + chrono::Days::new(i as u64);
            let kp = vec!["2.000"; 8].join(" ");
            let ap3 = vec!["7"; 8].join(" ");
            text.push_str(&format!(
                "{} 33600 33600.5 2607 1 {kp} {ap3} {ap} 120 160.0 158.0 0\n",
                day.format("%Y %m %d")
            ));
        }
        text
    }

    #[test]
    fn test_window_excludes_newest_row() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(
            forecast_window(&values).unwrap(),
            &[3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
        );
    }

    #[test]
    fn test_window_needs_eight_rows() {
        let err = forecast_window(&[1.0; 7]).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientData {
                required: 8,
                actual: 7
            }
        ));
    }

    #[test]
    fn test_trend_is_continued_and_rounded() {
        let window: Vec<f64> = (0..7).map(|i| 10.0 + 2.0 * i as f64).collect();
        let values = forecast_values(&window, HORIZON).unwrap();
        let expected: Vec<i64> = (1..=7).map(|h| 22 + 2 * h).collect();
        for (got, want) in values.iter().zip(&expected) {
            assert!((got - want).abs() <= 1, "{:?} vs {:?}", values, expected);
        }
    }

    #[test]
    fn test_falling_series_is_clipped_at_zero() {
        let window: Vec<f64> = (0..7).map(|i| 30.0 - 5.0 * i as f64).collect();
        let values = forecast_values(&window, HORIZON).unwrap();
        assert_eq!(values.len(), HORIZON);
        assert!(values.iter().all(|v| *v >= 0));
        assert_eq!(*values.last().unwrap(), 0);
    }

    #[test]
    fn test_forecast_table_dates_follow_second_to_last_row() {
        // rows 2024-12-20 .. 2024-12-29, last one a partial day
        let table = parse_feed(&feed(&[5, 7, 6, 9, 12, 8, 7, 6, 9, -1])).unwrap();
        let result = forecast_table(&table).unwrap();

        assert_eq!(
            result.dates(),
            vec![
                "2024-12-29",
                "2024-12-30",
                "2024-12-31",
                "2025-01-01",
                "2025-01-02",
                "2025-01-03",
                "2025-01-04",
            ]
        );
        assert_eq!(result.values().len(), HORIZON);
        assert!(result.values().iter().all(|v| *v >= 0));
        for pair in result.points().windows(2) {
            assert_eq!(pair[1].date - pair[0].date, chrono::Duration::days(1));
        }
    }

    #[test]
    fn test_forecast_table_rejects_short_feed() {
        let table = parse_feed(&feed(&[5, 7, 6, 9, 12])).unwrap();
        let err = forecast_table(&table).unwrap_err();
        assert_eq!(err.code(), "insufficient_data");
    }
}
