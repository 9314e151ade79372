//! Collapsing upstream readings into one high/low pair per calendar day.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::model::DailyForecast;

/// One upstream reading, already attributed to a calendar date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub date: NaiveDate,
    pub temp_min: f64,
    pub temp_max: f64,
}

/// Reduces `samples` to at most `day_count` days in ascending date order.
///
/// Each day keeps the lowest `temp_min` and the highest `temp_max` seen for it.
/// Non-finite readings are skipped, and days whose high ends up below their low are
/// dropped with a warning.
pub fn reduce_daily<I>(provider: &str, samples: I, day_count: usize) -> Vec<DailyForecast>
where
    I: IntoIterator<Item = Sample>,
{
    let mut by_date: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();

    for sample in samples {
        if !sample.temp_min.is_finite() || !sample.temp_max.is_finite() {
            tracing::warn!(provider, date = %sample.date, "skipping non-finite temperature sample");
            continue;
        }

        by_date
            .entry(sample.date)
            .and_modify(|(low, high)| {
                *low = low.min(sample.temp_min);
                *high = high.max(sample.temp_max);
            })
            .or_insert((sample.temp_min, sample.temp_max));
    }

    by_date
        .into_iter()
        .filter_map(|(date, (temp_min, temp_max))| {
            if temp_max < temp_min {
                tracing::warn!(
                    provider,
                    %date,
                    temp_max,
                    temp_min,
                    "dropping day with max temperature below min"
                );
                return None;
            }
            Some(DailyForecast { date, temp_max, temp_min })
        })
        .take(day_count)
        .collect()
}
