//! Meal confirmation rules.
//!
//! Students confirm breakfast, early breakfast and supper per day. Breakfast choices for
//! the current day freeze at the campus lock time; away periods override everything.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::ApiError;

/// The lock applied when no `MEAL_LOCK_TIME` is configured: 08:00.
pub fn default_lock_time() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// MealSelection
///
/// The three meal flags a student can toggle for a day. Missing fields mean "not taken",
/// matching unchecked form boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MealSelection {
    #[serde(default)]
    pub breakfast: bool,
    #[serde(default)]
    pub early: bool,
    #[serde(default)]
    pub supper: bool,
}

/// MealPlan
///
/// What will actually be stored after the time-lock has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MealPlan {
    pub selection: MealSelection,
    pub breakfast_locked: bool,
}

/// True when breakfast choices for `meal_date` can no longer change at `now`.
/// Only the current day locks, and only strictly after the lock time.
pub fn is_breakfast_locked(meal_date: NaiveDate, now: NaiveDateTime, lock_time: NaiveTime) -> bool {
    meal_date == now.date() && now.time() > lock_time
}

/// plan_confirmation
///
/// Applies the breakfast time-lock to a requested selection. When locked, breakfast and
/// early breakfast keep their stored values (or `false` for a day with no record yet);
/// supper always follows the request.
///
/// Dates before `now`'s day are rejected outright.
pub fn plan_confirmation(
    requested: MealSelection,
    stored: Option<MealSelection>,
    meal_date: NaiveDate,
    now: NaiveDateTime,
    lock_time: NaiveTime,
) -> Result<MealPlan, ApiError> {
    if meal_date < now.date() {
        return Err(ApiError::PastDate);
    }

    if !is_breakfast_locked(meal_date, now, lock_time) {
        return Ok(MealPlan {
            selection: requested,
            breakfast_locked: false,
        });
    }

    let stored = stored.unwrap_or_default();
    Ok(MealPlan {
        selection: MealSelection {
            breakfast: stored.breakfast,
            early: stored.early,
            supper: requested.supper,
        },
        breakfast_locked: true,
    })
}

/// Longest away period a student can declare in one request, in days.
pub const MAX_AWAY_DAYS: i64 = 365;

/// away_day_count
///
/// Number of days in the inclusive range `start..=end`, i.e. the meal records an away period
/// overwrites. Reversed ranges and ranges longer than [`MAX_AWAY_DAYS`] are rejected.
pub fn away_day_count(start: NaiveDate, end: NaiveDate) -> Result<i64, ApiError> {
    if start > end {
        return Err(ApiError::InvalidAwayRange);
    }
    let days = (end - start).num_days() + 1;
    if days > MAX_AWAY_DAYS {
        return Err(ApiError::AwayRangeTooLong);
    }
    Ok(days)
}
