use chrono::{Datelike, Days, Months, NaiveDate};

use crate::error::BacktestError;
use crate::models::RebalanceFrequency;

/// Split `[start, end)` into consecutive rebalance windows.
///
/// Each window runs from one rebalance date up to (not including) the next,
/// so adjacent windows share a boundary date. Monthly and quarterly windows
/// snap to calendar boundaries after the first; the last window is cut at
/// `end`.
pub fn generate_periods(
    start: NaiveDate,
    end: NaiveDate,
    frequency: RebalanceFrequency,
) -> Result<Vec<(NaiveDate, NaiveDate)>, BacktestError> {
    if end <= start {
        return Err(BacktestError::InvalidConfig(format!(
            "period end {end} must be after start {start}"
        )));
    }

    let mut periods = Vec::new();
    let mut current = start;
    while current < end {
        let next = next_boundary(current, frequency)
            .ok_or_else(|| BacktestError::InvalidConfig(format!("date overflow after {current}")))?
            .min(end);
        periods.push((current, next));
        current = next;
    }
    Ok(periods)
}

fn next_boundary(date: NaiveDate, frequency: RebalanceFrequency) -> Option<NaiveDate> {
    match frequency {
        RebalanceFrequency::Daily => date.succ_opt(),
        RebalanceFrequency::Weekly => date.checked_add_days(Days::new(7)),
        RebalanceFrequency::Monthly => date
            .with_day(1)?
            .checked_add_months(Months::new(1)),
        RebalanceFrequency::Quarterly => {
            let quarter_month = (date.month() - 1) / 3 * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), quarter_month, 1)?
                .checked_add_months(Months::new(3))
        }
    }
}
