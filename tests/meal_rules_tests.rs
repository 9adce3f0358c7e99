use campuscare_portal::{
    error::ApiError,
    meals::{
        MAX_AWAY_DAYS, MealSelection, away_day_count, default_lock_time, is_breakfast_locked,
        plan_confirmation,
    },
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(day: NaiveDate, h: u32, min: u32, s: u32) -> NaiveDateTime {
    day.and_hms_opt(h, min, s).unwrap()
}

const ALL_MEALS: MealSelection = MealSelection {
    breakfast: true,
    early: true,
    supper: true,
};

#[test]
fn test_default_lock_is_eight_am() {
    assert_eq!(default_lock_time(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
}

#[test]
fn test_lock_applies_strictly_after_lock_time_on_the_same_day() {
    let today = date(2025, 3, 10);
    let lock = default_lock_time();

    assert!(!is_breakfast_locked(today, at(today, 7, 59, 59), lock));
    assert!(!is_breakfast_locked(today, at(today, 8, 0, 0), lock));
    assert!(is_breakfast_locked(today, at(today, 8, 0, 1), lock));
    assert!(!is_breakfast_locked(date(2025, 3, 11), at(today, 23, 0, 0), lock));
}

#[test]
fn test_unlocked_confirmation_applies_request() {
    let today = date(2025, 3, 10);
    let plan = plan_confirmation(
        ALL_MEALS,
        Some(MealSelection::default()),
        today,
        at(today, 6, 30, 0),
        default_lock_time(),
    )
    .unwrap();

    assert_eq!(plan.selection, ALL_MEALS);
    assert!(!plan.breakfast_locked);
}

#[test]
fn test_locked_confirmation_keeps_stored_breakfast() {
    let today = date(2025, 3, 10);
    let stored = MealSelection {
        breakfast: true,
        early: false,
        supper: false,
    };
    let requested = MealSelection {
        breakfast: false,
        early: true,
        supper: true,
    };

    let plan = plan_confirmation(
        requested,
        Some(stored),
        today,
        at(today, 9, 15, 0),
        default_lock_time(),
    )
    .unwrap();

    assert!(plan.breakfast_locked);
    assert_eq!(
        plan.selection,
        MealSelection {
            breakfast: true,
            early: false,
            supper: true,
        }
    );
}

#[test]
fn test_locked_confirmation_without_record_defaults_breakfast_off() {
    let today = date(2025, 3, 10);
    let plan =
        plan_confirmation(ALL_MEALS, None, today, at(today, 12, 0, 0), default_lock_time()).unwrap();

    assert_eq!(
        plan.selection,
        MealSelection {
            breakfast: false,
            early: false,
            supper: true,
        }
    );
}

#[test]
fn test_future_dates_never_lock() {
    let today = date(2025, 3, 10);
    let plan = plan_confirmation(
        ALL_MEALS,
        None,
        date(2025, 3, 11),
        at(today, 23, 59, 0),
        default_lock_time(),
    )
    .unwrap();
    assert_eq!(plan.selection, ALL_MEALS);
    assert!(!plan.breakfast_locked);
}

#[test]
fn test_past_dates_are_rejected() {
    let today = date(2025, 3, 10);
    let result = plan_confirmation(
        ALL_MEALS,
        None,
        date(2025, 3, 9),
        at(today, 5, 0, 0),
        default_lock_time(),
    );
    assert!(matches!(result, Err(ApiError::PastDate)));
}

#[test]
fn test_away_range_is_inclusive() {
    assert_eq!(away_day_count(date(2025, 2, 27), date(2025, 3, 2)).unwrap(), 4);
    assert_eq!(away_day_count(date(2025, 3, 5), date(2025, 3, 5)).unwrap(), 1);
}

#[test]
fn test_reversed_away_range_is_rejected() {
    let result = away_day_count(date(2025, 3, 5), date(2025, 3, 4));
    assert!(matches!(result, Err(ApiError::InvalidAwayRange)));
}

#[test]
fn test_away_range_is_capped_at_a_year() {
    let start = date(2025, 1, 1);
    let last_allowed = start + chrono::Days::new(MAX_AWAY_DAYS as u64 - 1);

    assert_eq!(away_day_count(start, last_allowed).unwrap(), MAX_AWAY_DAYS);
    assert!(matches!(
        away_day_count(start, last_allowed + chrono::Days::new(1)),
        Err(ApiError::AwayRangeTooLong)
    ));
    assert!(matches!(
        away_day_count(start, date(9999, 12, 31)),
        Err(ApiError::AwayRangeTooLong)
    ));
}
