//! Tenants, principals and the row-level visibility rules between them.

mod filter;
mod hospital;
mod principal;

pub use filter::{
    has_hospital_permission, resolve_tenant, tenant_filter, TenantColumn, TenantFilter,
};
pub use hospital::{
    AdminDraft, Hospital, HospitalDraft, HospitalNotice, HospitalStatus, NoticeLevel,
    SocialLinks, SubscriptionStatus, TRIAL_DAYS,
};
pub use principal::{Employee, Practitioner, Principal, Role};
