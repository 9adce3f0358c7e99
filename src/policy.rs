//! Permission matrix for the staff-facing operations.
//!
//! Each protected route group under `/manage` is gated by one of these requirements.
//! `OPERATIONS` lists them by name so a caller can be told what they are able to reach.

use crate::{
    access::{AccessRequirement, StaffIdentity, is_permitted},
    roles::Category,
};

/// Kitchen dashboard and daily meal counts.
pub const MEAL_REPORTS: AccessRequirement = AccessRequirement::new(
    &["Admin", "Warden", "Finance", "CATERING_IN_CHARGE"],
    &[Category::StudentServices],
);

/// Students marked away on a given day.
pub const AWAY_LIST: AccessRequirement = AccessRequirement::legacy(&["Admin", "Warden"]);

/// The audit trail.
pub const AUDIT_LOGS: AccessRequirement =
    AccessRequirement::new(&["Admin", "AUDIT_LOGS"], &[Category::FinanceAdmin]);

/// Cross-department oversight reports.
pub const STAFF_OVERSIGHT: AccessRequirement =
    AccessRequirement::categories(&[Category::AcademicAdmin, Category::FinanceAdmin]);

/// The finance view of every student payment.
pub const PAYMENTS: AccessRequirement = AccessRequirement::legacy(&["Admin", "Finance"]);

pub const OPERATIONS: &[(&str, AccessRequirement)] = &[
    ("meal_reports", MEAL_REPORTS),
    ("away_list", AWAY_LIST),
    ("audit_logs", AUDIT_LOGS),
    ("staff_oversight", STAFF_OVERSIGHT),
    ("payments", PAYMENTS),
];

/// Names of every operation in `OPERATIONS` the identity is allowed to invoke.
pub fn permitted_operations(identity: &StaffIdentity) -> Vec<String> {
    OPERATIONS
        .iter()
        .filter(|(_, requirement)| is_permitted(identity, requirement))
        .map(|(name, _)| name.to_string())
        .collect()
}
