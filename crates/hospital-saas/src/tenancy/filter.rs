//! Row-level tenant isolation.
//!
//! A principal resolves to at most one tenant. Listings then keep rows owned
//! by that tenant plus rows with no tenant at all; unassigned rows stay
//! visible to everyone.

use serde::Serialize;
use tracing::debug;

use super::principal::{Employee, Practitioner, Principal};
use crate::ids::HospitalId;
use crate::store::{HospitalStore, Record, RepositoryError};

/// Column carrying the tenant on a given record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantColumn {
    /// Records owned by this application (`OPD Token`, `IPD Admission`, ...).
    Hospital,
    /// Records customised with an extra tenant column (`Patient`, `Lab Test`, ...).
    CustomHospital,
}

impl TenantColumn {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hospital => "hospital",
            Self::CustomHospital => "custom_hospital",
        }
    }
}

/// Read predicate applied to every listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "hospital", rename_all = "snake_case")]
pub enum TenantFilter {
    Unrestricted,
    Scoped(HospitalId),
}

impl TenantFilter {
    pub fn scoped_to(&self) -> Option<&HospitalId> {
        match self {
            Self::Unrestricted => None,
            Self::Scoped(hospital) => Some(hospital),
        }
    }

    /// Whether a row owned by `tenant` is visible. Blank ids count as unset.
    pub fn allows(&self, tenant: Option<&HospitalId>) -> bool {
        match (self, tenant) {
            (Self::Unrestricted, _) => true,
            (Self::Scoped(_), None) => true,
            (Self::Scoped(_), Some(owner)) if owner.as_str().trim().is_empty() => true,
            (Self::Scoped(scope), Some(owner)) => scope == owner,
        }
    }

    pub fn allows_record<T: Record>(&self, record: &T) -> bool {
        self.allows(record.tenant())
    }

    /// SQL-style condition for `column`; empty when unrestricted.
    pub fn to_sql(&self, column: TenantColumn) -> String {
        match self {
            Self::Unrestricted => String::new(),
            Self::Scoped(hospital) => {
                let column = column.name();
                let escaped = escape_sql_literal(hospital.as_str());
                format!("(`{column}` = {escaped} OR `{column}` IS NULL OR `{column}` = '')")
            }
        }
    }
}

fn escape_sql_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => escaped.push_str("\\'"),
            '\\' => escaped.push_str("\\\\"),
            _ => escaped.push(ch),
        }
    }
    escaped.push('\'');
    escaped
}

/// Tenant of `principal`: employee record, then the account itself, then a
/// practitioner record. First non-empty match wins.
pub fn resolve_tenant<S: HospitalStore + ?Sized>(
    store: &S,
    principal: &Principal,
) -> Result<Option<HospitalId>, RepositoryError> {
    if principal.id.as_str() == Principal::ADMINISTRATOR {
        return Ok(None);
    }

    let user = &principal.id;
    let employee = store
        .employees()
        .select(&|employee: &Employee| &employee.user == user)?
        .into_iter()
        .find_map(|employee| non_empty(employee.hospital));
    if employee.is_some() {
        return Ok(employee);
    }

    if let Some(hospital) = non_empty(principal.hospital.clone()) {
        return Ok(Some(hospital));
    }

    let practitioner = store
        .practitioners()
        .select(&|practitioner: &Practitioner| practitioner.user.as_ref() == Some(user))?
        .into_iter()
        .find_map(|practitioner| non_empty(practitioner.hospital));
    Ok(practitioner)
}

fn non_empty(hospital: Option<HospitalId>) -> Option<HospitalId> {
    hospital.filter(|id| !id.as_str().trim().is_empty())
}

/// Build the read filter for `principal`.
pub fn tenant_filter<S: HospitalStore + ?Sized>(
    store: &S,
    principal: &Principal,
) -> Result<TenantFilter, RepositoryError> {
    if principal.is_unrestricted() {
        return Ok(TenantFilter::Unrestricted);
    }

    let filter = match resolve_tenant(store, principal)? {
        Some(hospital) => TenantFilter::Scoped(hospital),
        None => TenantFilter::Unrestricted,
    };
    debug!(principal = %principal.id, ?filter, "resolved tenant filter");
    Ok(filter)
}

/// Per-document check: the same visibility rule as [`tenant_filter`].
pub fn has_hospital_permission<S: HospitalStore + ?Sized>(
    store: &S,
    principal: &Principal,
    document_tenant: Option<&HospitalId>,
) -> Result<bool, RepositoryError> {
    Ok(tenant_filter(store, principal)?.allows(document_tenant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{EmployeeId, PractitionerId};
    use crate::store::MemoryStore;
    use crate::tenancy::Role;

    fn practitioner(user: &str, hospital: &str) -> Practitioner {
        Practitioner {
            id: PractitionerId::from("HLC-PRAC-0001"),
            practitioner_name: "Dr. Rao".to_string(),
            user: Some(user.into()),
            hospital: Some(hospital.into()),
            department: None,
            designation: None,
            consulting_charge: 0.0,
        }
    }

    #[test]
    fn employee_record_wins_over_account_and_practitioner() {
        let store = MemoryStore::default();
        store
            .employees()
            .insert(Employee {
                id: EmployeeId::from("EMP-0001"),
                user: "nurse@h1".into(),
                employee_name: "Asha".to_string(),
                hospital: Some("H1".into()),
            })
            .expect("employee");
        store
            .practitioners()
            .insert(practitioner("nurse@h1", "H3"))
            .expect("practitioner");

        let principal = Principal::new("nurse@h1", "Asha").with_hospital("H2".into());
        assert_eq!(
            resolve_tenant(&store, &principal).expect("resolves"),
            Some(HospitalId::from("H1"))
        );
    }

    #[test]
    fn falls_back_to_account_then_practitioner() {
        let store = MemoryStore::default();
        store
            .practitioners()
            .insert(practitioner("doc@h3", "H3"))
            .expect("practitioner");

        let account = Principal::new("doc@h3", "Dr. Rao").with_hospital("H2".into());
        assert_eq!(
            resolve_tenant(&store, &account).expect("resolves"),
            Some(HospitalId::from("H2"))
        );

        let bare = Principal::new("doc@h3", "Dr. Rao");
        assert_eq!(
            resolve_tenant(&store, &bare).expect("resolves"),
            Some(HospitalId::from("H3"))
        );
    }

    #[test]
    fn empty_employee_tenant_is_skipped() {
        let store = MemoryStore::default();
        store
            .employees()
            .insert(Employee {
                id: EmployeeId::from("EMP-0002"),
                user: "clerk".into(),
                employee_name: "Clerk".to_string(),
                hospital: Some("".into()),
            })
            .expect("employee");
        let principal = Principal::new("clerk", "Clerk").with_hospital("H9".into());
        assert_eq!(
            resolve_tenant(&store, &principal).expect("resolves"),
            Some(HospitalId::from("H9"))
        );
    }

    #[test]
    fn override_roles_and_unassigned_users_are_unrestricted() {
        let store = MemoryStore::default();
        let admin = Principal::new(Principal::ADMINISTRATOR, "Administrator");
        let manager = Principal::new("ops", "Ops")
            .with_roles([Role::SystemManager])
            .with_hospital("H1".into());
        let floating = Principal::new("temp", "Temp");

        for principal in [admin, manager, floating] {
            assert_eq!(
                tenant_filter(&store, &principal).expect("filter"),
                TenantFilter::Unrestricted
            );
        }
    }

    #[test]
    fn scoped_filter_admits_own_and_unassigned_rows_only() {
        let filter = TenantFilter::Scoped("A".into());
        assert!(filter.allows(Some(&"A".into())));
        assert!(filter.allows(None));
        assert!(filter.allows(Some(&"".into())));
        assert!(filter.allows(Some(&"  ".into())));
        assert!(!filter.allows(Some(&"B".into())));
        assert!(TenantFilter::Unrestricted.allows(Some(&"B".into())));
    }

    #[test]
    fn renders_sql_condition_per_column() {
        let filter = TenantFilter::Scoped("H'1".into());
        assert_eq!(
            filter.to_sql(TenantColumn::Hospital),
            "(`hospital` = 'H\\'1' OR `hospital` IS NULL OR `hospital` = '')"
        );
        assert!(filter
            .to_sql(TenantColumn::CustomHospital)
            .starts_with("(`custom_hospital` = "));
        assert_eq!(TenantFilter::Unrestricted.to_sql(TenantColumn::Hospital), "");
    }
}
