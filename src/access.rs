use std::collections::BTreeSet;
use uuid::Uuid;

use crate::roles::{Category, RoleCode, classify};

/// StaffIdentity
///
/// The resolved caller of a single request. Built once per request by the `auth` extractor
/// and never mutated afterwards. An anonymous caller is represented explicitly
/// (`is_authenticated = false`) rather than by the absence of an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaffIdentity {
    /// The account behind the request, when one was resolved.
    pub account_id: Option<Uuid>,
    pub is_authenticated: bool,
    pub is_superuser: bool,
    /// Flat group names such as "Admin" or "Warden" that predate staff categories.
    pub legacy_groups: BTreeSet<String>,
    /// Present only for accounts with a staff profile.
    pub staff_role: Option<RoleCode>,
    /// A stored staff role code missing from the catalog. Still matched by code and classified.
    pub unrecognized_role: Option<String>,
}

impl StaffIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated account with no staff profile, no groups and no elevated flags.
    pub fn authenticated(account_id: Uuid) -> Self {
        Self {
            account_id: Some(account_id),
            is_authenticated: true,
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: RoleCode) -> Self {
        self.staff_role = Some(role);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.legacy_groups.insert(group.into());
        self
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn with_unrecognized_role(mut self, code: impl Into<String>) -> Self {
        self.unrecognized_role = Some(code.into());
        self
    }

    /// The staff role code as stored, whether or not the catalog knows it.
    pub fn role_code(&self) -> Option<&str> {
        match self.staff_role {
            Some(role) => Some(role.as_str()),
            None => self.unrecognized_role.as_deref(),
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self.staff_role {
            Some(role) => Some(role.category()),
            None => self.unrecognized_role.as_deref().map(classify),
        }
    }
}

/// AccessRequirement
///
/// The gate attached to a protected operation. Both lists are static so a requirement can be
/// declared as a `const` next to the routes it protects.
///
/// Legacy roles match either a legacy group name or a staff role code. The two lists are
/// independent OR-gates: matching either is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequirement {
    pub allowed_legacy_roles: &'static [&'static str],
    pub allowed_categories: &'static [Category],
}

impl AccessRequirement {
    pub const fn new(
        allowed_legacy_roles: &'static [&'static str],
        allowed_categories: &'static [Category],
    ) -> Self {
        Self {
            allowed_legacy_roles,
            allowed_categories,
        }
    }

    pub const fn legacy(allowed_legacy_roles: &'static [&'static str]) -> Self {
        Self::new(allowed_legacy_roles, &[])
    }

    pub const fn categories(allowed_categories: &'static [Category]) -> Self {
        Self::new(&[], allowed_categories)
    }

    /// With both lists empty only superusers and executives get through.
    pub fn is_degenerate(&self) -> bool {
        self.allowed_legacy_roles.is_empty() && self.allowed_categories.is_empty()
    }
}

/// is_permitted
///
/// Decides whether `identity` may invoke an operation guarded by `requirement`. Checks run in
/// a fixed order and the first success wins:
///
/// 1. superusers always pass;
/// 2. any legacy group listed in the requirement;
/// 3. the staff role code itself listed as a legacy role;
/// 4. the staff role's category listed in the requirement;
/// 5. executives pass whatever categories are listed.
///
/// Authentication is not considered here; that is the guard's job.
pub fn is_permitted(identity: &StaffIdentity, requirement: &AccessRequirement) -> bool {
    if identity.is_superuser {
        return true;
    }

    let legacy = requirement.allowed_legacy_roles;
    if !legacy.is_empty()
        && identity
            .legacy_groups
            .iter()
            .any(|group| legacy.contains(&group.as_str()))
    {
        return true;
    }

    let (Some(code), Some(category)) = (identity.role_code(), identity.category()) else {
        return false;
    };

    if legacy.contains(&code) {
        return true;
    }

    if requirement.allowed_categories.contains(&category) {
        return true;
    }

    category == Category::Executive
}
