//! Synthetic weather forecasts

use chrono::{Duration, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of days returned per forecast
pub const FORECAST_DAYS: i64 = 5;

/// Inclusive lower and exclusive upper bound for generated Celsius values
pub const TEMPERATURE_RANGE_C: std::ops::Range<i32> = -20..55;

pub const SUMMARIES: [&str; 10] = [
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

/// One day of forecast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    pub date: NaiveDate,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: String,
}

impl WeatherForecast {
    pub fn new(date: NaiveDate, temperature_c: i32, summary: impl Into<String>) -> Self {
        Self {
            date,
            temperature_c,
            temperature_f: to_fahrenheit(temperature_c),
            summary: summary.into(),
        }
    }
}

/// Fahrenheit conversion, truncated toward zero
pub fn to_fahrenheit(celsius: i32) -> i32 {
    32 + (f64::from(celsius) / 0.5556) as i32
}

/// Forecast for the days following `today`
pub fn generate<R: Rng>(today: NaiveDate, rng: &mut R) -> Vec<WeatherForecast> {
    (1..=FORECAST_DAYS)
        .map(|offset| {
            let summary = SUMMARIES[rng.gen_range(0..SUMMARIES.len())];
            WeatherForecast::new(
                today + Duration::days(offset),
                rng.gen_range(TEMPERATURE_RANGE_C),
                summary,
            )
        })
        .collect()
}
