//! Hospital workflows. Each area keeps its records in `domain`, its
//! operations in `service` and its HTTP surface in `router`.
//!
//! Services are synchronous: they write through the store, then hand the
//! events they raised to the shared [`EventDispatcher`].

/// Status enum with fixed display labels. Serialises as the label and
/// rejects anything outside the enumeration.
macro_rules! labelled_status {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            pub fn parse(value: &str) -> Result<Self, $crate::workflows::ServiceError> {
                let trimmed = value.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|status| status.label() == trimmed)
                    .ok_or_else(|| $crate::workflows::ServiceError::InvalidStatus {
                        kind: $kind,
                        value: value.to_string(),
                    })
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.label())
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<Ser: ::serde::Serializer>(
                &self,
                serializer: Ser,
            ) -> Result<Ser::Ok, Ser::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<De: ::serde::Deserializer<'de>>(
                deserializer: De,
            ) -> Result<Self, De::Error> {
                let raw = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                Self::parse(&raw).map_err(<De::Error as ::serde::de::Error>::custom)
            }
        }
    };
}

pub mod appointments;
pub mod billing;
pub mod dashboard;
mod error;
pub mod ipd;
pub mod lab;
pub mod opd;
pub mod pharmacy;
pub mod radiology;
pub mod registry;

pub use error::ServiceError;

use std::sync::Arc;

use axum::Router;

use crate::config::HospitalSettings;
use crate::events::{
    Broadcaster, EventDispatcher, NotificationListener, Notifier, RealtimeListener,
};
use crate::ids::{HospitalId, PrincipalId};
use crate::sequence::{SequenceCounter, SequenceKey};
use crate::store::{HospitalStore, Record, Table};
use crate::tenancy::{has_hospital_permission, resolve_tenant, Principal, Role, TenantFilter};

labelled_status!(
    /// Document state shared by submittable records.
    DocStatus, "document" {
        Draft => "Draft",
        Submitted => "Submitted",
        Cancelled => "Cancelled",
    }
);

impl DocStatus {
    pub fn is_submitted(self) -> bool {
        self == Self::Submitted
    }
}

/// Look up the calling account. The built-in administrator always exists.
pub fn load_principal<S: HospitalStore + ?Sized>(
    store: &S,
    id: &PrincipalId,
) -> Result<Principal, ServiceError> {
    if id.as_str() == Principal::ADMINISTRATOR {
        return Ok(Principal::new(Principal::ADMINISTRATOR, "Administrator")
            .with_roles([Role::SystemManager]));
    }
    store
        .principals()
        .fetch(id)?
        .ok_or(ServiceError::Unauthenticated)
}

/// Tenant a new record is written under: the requested one when the caller
/// may use it, otherwise the caller's own.
pub(crate) fn write_tenant<S: HospitalStore + ?Sized>(
    store: &S,
    principal: &Principal,
    requested: Option<HospitalId>,
) -> Result<Option<HospitalId>, ServiceError> {
    match requested.filter(|hospital| !hospital.as_str().trim().is_empty()) {
        Some(hospital) => {
            if !has_hospital_permission(store, principal, Some(&hospital))? {
                return Err(ServiceError::permission(format!(
                    "Not permitted to create records for hospital {hospital}"
                )));
            }
            Ok(Some(hospital))
        }
        None if principal.is_unrestricted() => Ok(None),
        None => Ok(resolve_tenant(store, principal)?),
    }
}

/// Reject access to a record owned by another tenant.
pub(crate) fn ensure_visible<S, T>(
    store: &S,
    principal: &Principal,
    record: &T,
) -> Result<(), ServiceError>
where
    S: HospitalStore + ?Sized,
    T: Record,
{
    if has_hospital_permission(store, principal, record.tenant())? {
        Ok(())
    } else {
        Err(ServiceError::permission(format!(
            "Not permitted to access {} {}",
            T::KIND,
            record.id()
        )))
    }
}

/// Read scope for listings: an explicit hospital narrows the caller's filter
/// but never widens it.
pub(crate) fn read_scope<S: HospitalStore + ?Sized>(
    store: &S,
    principal: &Principal,
    requested: Option<HospitalId>,
) -> Result<TenantFilter, ServiceError> {
    let filter = crate::tenancy::tenant_filter(store, principal)?;
    match requested.filter(|hospital| !hospital.as_str().trim().is_empty()) {
        None => Ok(filter),
        Some(hospital) if filter.allows(Some(&hospital)) => Ok(TenantFilter::Scoped(hospital)),
        Some(hospital) => Err(ServiceError::permission(format!(
            "Not permitted to read hospital {hospital}"
        ))),
    }
}

/// `{prefix}-00001` style document name from a lifetime counter per kind.
pub(crate) fn next_document_name<S, T>(
    store: &S,
    table: &dyn Table<T>,
    prefix: &str,
) -> Result<String, ServiceError>
where
    S: SequenceCounter + ?Sized,
    T: Record,
{
    let value = store.next_value(&SequenceKey::document(T::KIND), &|| {
        Ok(row_count(table.count(&|_: &T| true)?))
    })?;
    Ok(format!("{prefix}-{value:05}"))
}

pub(crate) fn row_count(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Every workflow service over one store, wired to the shared listeners.
pub struct HospitalServices<S> {
    pub store: Arc<S>,
    pub events: Arc<EventDispatcher>,
    pub registry: Arc<registry::RegistryService<S>>,
    pub opd: Arc<opd::OpdService<S>>,
    pub lab: Arc<lab::LabService<S>>,
    pub ipd: Arc<ipd::IpdService<S>>,
    pub radiology: Arc<radiology::RadiologyService<S>>,
    pub pharmacy: Arc<pharmacy::PharmacyService<S>>,
    pub billing: Arc<billing::BillingService<S>>,
    pub appointments: Arc<appointments::AppointmentService<S>>,
    pub dashboard: Arc<dashboard::DashboardService<S>>,
}

impl<S> HospitalServices<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        settings: HospitalSettings,
        notifier: Arc<dyn Notifier>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        let billing = Arc::new(billing::BillingService::new(store.clone()));

        let events = Arc::new(
            EventDispatcher::new()
                .with_listener(Arc::new(NotificationListener::new(
                    store.clone(),
                    settings.clone(),
                    notifier,
                )))
                .with_listener(Arc::new(RealtimeListener::new(broadcaster)))
                .with_listener(Arc::new(billing::BillingListener::new(
                    billing.clone(),
                    settings.clone(),
                ))),
        );

        Self {
            registry: Arc::new(registry::RegistryService::new(store.clone(), events.clone())),
            opd: Arc::new(opd::OpdService::new(store.clone(), events.clone())),
            lab: Arc::new(lab::LabService::new(store.clone(), events.clone())),
            ipd: Arc::new(ipd::IpdService::new(
                store.clone(),
                events.clone(),
                settings.default_total_beds,
            )),
            radiology: Arc::new(radiology::RadiologyService::new(store.clone(), events.clone())),
            pharmacy: Arc::new(pharmacy::PharmacyService::new(store.clone(), events.clone())),
            appointments: Arc::new(appointments::AppointmentService::new(
                store.clone(),
                events.clone(),
            )),
            dashboard: Arc::new(dashboard::DashboardService::new(
                store.clone(),
                settings.default_total_beds,
            )),
            billing,
            events,
            store,
        }
    }
}

/// All workflow endpoints on one router.
pub fn hospital_router<S>(services: &HospitalServices<S>) -> Router
where
    S: HospitalStore + 'static,
{
    Router::new()
        .merge(registry::registry_router(services.registry.clone()))
        .merge(opd::opd_router(services.opd.clone()))
        .merge(lab::lab_router(services.lab.clone()))
        .merge(ipd::ipd_router(services.ipd.clone()))
        .merge(radiology::radiology_router(services.radiology.clone()))
        .merge(pharmacy::pharmacy_router(services.pharmacy.clone()))
        .merge(billing::billing_router(services.billing.clone()))
        .merge(appointments::appointment_router(services.appointments.clone()))
        .merge(dashboard::dashboard_router(services.dashboard.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EmployeeId;
    use crate::store::MemoryStore;
    use crate::tenancy::Employee;

    #[test]
    fn administrator_is_synthesised_and_unknown_users_are_rejected() {
        let store = MemoryStore::default();
        let admin = load_principal(&store, &PrincipalId::from("Administrator")).expect("admin");
        assert!(admin.is_unrestricted());
        assert!(matches!(
            load_principal(&store, &PrincipalId::from("ghost@example.test")),
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[test]
    fn write_tenant_defaults_to_the_callers_hospital() {
        let store = MemoryStore::default();
        let nurse = Principal::new("nurse@h1.test", "Nurse").with_roles([Role::Nurse]);
        store.principals().insert(nurse.clone()).expect("principal");
        store
            .employees()
            .insert(Employee {
                id: EmployeeId::from("EMP-0001"),
                user: nurse.id.clone(),
                employee_name: "Nurse".to_string(),
                hospital: Some(HospitalId::from("H1")),
            })
            .expect("employee");

        assert_eq!(
            write_tenant(&store, &nurse, None).expect("tenant"),
            Some(HospitalId::from("H1"))
        );
        assert!(matches!(
            write_tenant(&store, &nurse, Some(HospitalId::from("H2"))),
            Err(ServiceError::PermissionDenied(_))
        ));
        assert!(matches!(
            read_scope(&store, &nurse, Some(HospitalId::from("H2"))),
            Err(ServiceError::PermissionDenied(_))
        ));
    }

    #[test]
    fn doc_status_parses_labels() {
        assert_eq!(DocStatus::parse("Submitted").expect("known"), DocStatus::Submitted);
        assert!(DocStatus::parse("submitted").is_err());
        assert_eq!(round_to(66.666, 1), 66.7);
        assert_eq!(round_to(12.0, 2), 12.0);
    }
}
