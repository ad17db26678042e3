use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use super::domain::{
    normalise_mobile, Department, DepartmentDraft, DepartmentStats, DepartmentStatus,
    HospitalStats, HospitalSummary, Patient, PatientDraft, WizardOutcome,
};
use crate::events::{DomainEvent, EventDispatcher};
use crate::ids::{DepartmentId, HospitalId, PatientId, PrincipalId};
use crate::sequence::{format_identifier, SequenceKey, SequencePeriod, Series};
use crate::store::{require, HospitalStore, Record};
use crate::tenancy::{AdminDraft, Hospital, HospitalDraft, Practitioner, Principal, Role};
use crate::workflows::appointments::{Appointment, AppointmentStatus};
use crate::workflows::opd::{QueueToken, TokenStatus};
use crate::workflows::{
    ensure_visible, load_principal, next_document_name, read_scope, row_count, write_tenant,
    ServiceError,
};

/// Tenants, patients and departments.
pub struct RegistryService<S> {
    store: Arc<S>,
    events: Arc<EventDispatcher>,
}

impl<S> RegistryService<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<EventDispatcher>) -> Self {
        Self { store, events }
    }

    pub fn principal(&self, user: &PrincipalId) -> Result<Principal, ServiceError> {
        load_principal(&*self.store, user)
    }

    /// Onboard a hospital from allow-listed fields, optionally with its
    /// administrator account.
    pub fn create_hospital_wizard(
        &self,
        principal: &Principal,
        draft: HospitalDraft,
        admin: Option<AdminDraft>,
        now: NaiveDateTime,
    ) -> Result<WizardOutcome, ServiceError> {
        if !principal.is_unrestricted() {
            return Err(ServiceError::permission("Access denied"));
        }
        if let Some(field) = draft.missing_field() {
            return Err(ServiceError::MissingField(field));
        }

        let hospitals = self.store.hospitals();
        let value = self.store.next_value(&SequenceKey::document(Hospital::KIND), &|| {
            Ok(row_count(hospitals.count(&|_: &Hospital| true)?))
        })?;
        let id = HospitalId::new(format_identifier("H", value, 5));

        let mut hospital = draft.into_hospital(id, now);
        for notice in hospital.validate(now.date()) {
            info!(hospital = %hospital.id, level = ?notice.level, "{}", notice.message);
        }
        let mut hospital = hospitals.insert(hospital)?;
        info!(hospital = %hospital.id, name = %hospital.business_name, "hospital created");

        let mut outcome = WizardOutcome {
            hospital: hospital.id.clone(),
            organisation_code: hospital.organisation_code.clone(),
            business_name: hospital.business_name.clone(),
            admin_user: None,
            admin_error: None,
        };

        let Some(admin) = admin else {
            return Ok(outcome);
        };
        let Some(email) = admin.email.filter(|email| !email.trim().is_empty()) else {
            return Ok(outcome);
        };

        let first_name = admin.first_name.unwrap_or_else(|| "Admin".to_string());
        let full_name = match admin.last_name.filter(|last| !last.is_empty()) {
            Some(last) => format!("{first_name} {last}"),
            None => first_name,
        };
        let mut account = Principal::new(email.trim(), full_name)
            .with_roles([Role::HospitalAdministrator])
            .with_hospital(hospital.id.clone());
        account.email = Some(email.trim().to_string());

        match self.store.principals().insert(account) {
            Ok(account) => {
                hospital.admin_user = Some(account.id.clone());
                self.store.hospitals().update(hospital)?;
                outcome.admin_user = Some(account.id);
            }
            Err(error) => {
                warn!(hospital = %outcome.hospital, %error, "admin account not created");
                outcome.admin_error = Some(error.to_string());
            }
        }
        Ok(outcome)
    }

    pub fn hospital_stats(
        &self,
        principal: &Principal,
        hospital: &HospitalId,
        today: NaiveDate,
    ) -> Result<HospitalStats, ServiceError> {
        let record = require(self.store.hospitals(), hospital)?;
        ensure_visible(&*self.store, principal, &record)?;
        let owned = Some(hospital);

        Ok(HospitalStats {
            departments: self
                .store
                .departments()
                .count(&|department: &Department| department.hospital.as_ref() == owned)?,
            staff: self
                .store
                .practitioners()
                .count(&|practitioner: &Practitioner| practitioner.hospital.as_ref() == owned)?,
            patients: self
                .store
                .patients()
                .count(&|patient: &Patient| patient.hospital.as_ref() == owned)?,
            today_appointments: self.store.appointments().count(&|appointment: &Appointment| {
                appointment.hospital.as_ref() == owned && appointment.appointment_date == today
            })?,
            active_tokens: self.store.tokens().count(&|token: &QueueToken| {
                token.is_on(owned, today) && TokenStatus::ON_DISPLAY.contains(&token.status)
            })?,
            name: record.id,
            organisation_code: record.organisation_code,
            business_name: record.business_name,
            total_beds: record.total_beds,
            icu_beds: record.icu_beds,
            emergency_beds: record.emergency_beds,
            operation_theaters: record.operation_theaters,
            subscription_status: record.subscription_status,
            subscription_end: record.subscription_end,
        })
    }

    /// Every visible hospital, newest first, with head counts.
    pub fn all_hospitals_summary(
        &self,
        principal: &Principal,
    ) -> Result<Vec<HospitalSummary>, ServiceError> {
        let filter = read_scope(&*self.store, principal, None)?;
        let mut hospitals = self
            .store
            .hospitals()
            .select(&|hospital: &Hospital| filter.allows_record(hospital))?;
        hospitals.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        hospitals
            .into_iter()
            .map(|hospital| {
                let owned = Some(&hospital.id);
                let patient_count = self
                    .store
                    .patients()
                    .count(&|patient: &Patient| patient.hospital.as_ref() == owned)?;
                let staff_count = self
                    .store
                    .practitioners()
                    .count(&|practitioner: &Practitioner| practitioner.hospital.as_ref() == owned)?;
                Ok::<_, ServiceError>(HospitalSummary {
                    name: hospital.id,
                    organisation_code: hospital.organisation_code,
                    business_name: hospital.business_name,
                    city: hospital.city,
                    state: hospital.state,
                    hospital_type: hospital.hospital_type,
                    status: hospital.status,
                    subscription_status: hospital.subscription_status,
                    subscription_end: hospital.subscription_end,
                    owner_name: hospital.owner_name,
                    owner_email: hospital.owner_email,
                    owner_mobile: hospital.owner_mobile,
                    patient_count,
                    staff_count,
                })
            })
            .collect()
    }

    /// Register a patient under the requested or the caller's hospital.
    pub fn register_patient(
        &self,
        principal: &Principal,
        draft: PatientDraft,
        now: NaiveDateTime,
    ) -> Result<Patient, ServiceError> {
        let patient_name = draft.patient_name.trim().to_string();
        if patient_name.is_empty() {
            return Err(ServiceError::MissingField("patient_name"));
        }
        let hospital = write_tenant(&*self.store, principal, draft.hospital)?;
        let patients = self.store.patients();
        let id = PatientId::new(next_document_name(&*self.store, patients, "PAT")?);

        let patient = patients.insert(Patient {
            id,
            patient_name,
            sex: draft.sex,
            dob: draft.dob,
            mobile: draft
                .mobile
                .map(|mobile| normalise_mobile(&mobile))
                .filter(|mobile| !mobile.is_empty()),
            email: draft.email.filter(|email| !email.trim().is_empty()),
            hospital,
            customer: None,
            created_at: now,
        })?;

        info!(patient = %patient.id, hospital = ?patient.hospital, "patient registered");
        self.events
            .dispatch(&[DomainEvent::PatientRegistered(patient.clone())]);
        Ok(patient)
    }

    pub fn list_patients(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
    ) -> Result<Vec<Patient>, ServiceError> {
        let filter = read_scope(&*self.store, principal, hospital)?;
        Ok(self
            .store
            .patients()
            .select(&|patient: &Patient| filter.allows_record(patient))?)
    }

    pub fn create_department(
        &self,
        principal: &Principal,
        draft: DepartmentDraft,
    ) -> Result<Department, ServiceError> {
        let department_name = draft.department_name.trim().to_string();
        if department_name.is_empty() {
            return Err(ServiceError::MissingField("department_name"));
        }
        let tenant = write_tenant(&*self.store, principal, draft.hospital)?;

        if let Some(parent) = draft.parent_department.as_ref() {
            let parent = require(self.store.departments(), parent)?;
            if parent.hospital != tenant {
                return Err(ServiceError::TenantMismatch(
                    "Parent department must belong to the same hospital".to_string(),
                ));
            }
        }

        let department_code = match draft.department_code.filter(|code| !code.trim().is_empty()) {
            Some(code) => code,
            None => self.next_department_code(tenant.as_ref(), &department_name)?,
        };

        let departments = self.store.departments();
        let id = DepartmentId::new(next_document_name(&*self.store, departments, "DEPT")?);
        let department = departments.insert(Department {
            id,
            department_name,
            department_code,
            hospital: tenant,
            parent_department: draft.parent_department,
            specialization: draft.specialization,
            department_head: draft.department_head,
            status: DepartmentStatus::Active,
            consultation_rooms: draft.consultation_rooms,
            beds_allocated: draft.beds_allocated,
            daily_opd_capacity: draft.daily_opd_capacity,
        })?;
        info!(
            department = %department.id,
            code = %department.department_code,
            "department created"
        );
        Ok(department)
    }

    fn next_department_code(
        &self,
        tenant: Option<&HospitalId>,
        department_name: &str,
    ) -> Result<String, ServiceError> {
        let hospital_code = match tenant {
            Some(id) => self
                .store
                .hospitals()
                .fetch(id)?
                .map(|hospital| hospital.code_prefix("HOSP"))
                .unwrap_or_else(|| "HOSP".to_string()),
            None => "HOSP".to_string(),
        };
        let stem = format!("{hospital_code}-{}", Department::code_prefix(department_name));

        let key = SequenceKey::new(
            Series::DepartmentCode(stem.clone()),
            tenant.cloned(),
            SequencePeriod::Lifetime,
        );
        let departments = self.store.departments();
        let value = self.store.next_value(&key, &|| {
            let existing = departments.count(&|department: &Department| {
                department.hospital.as_ref() == tenant
                    && department.department_code.starts_with(&stem)
            })?;
            Ok(row_count(existing))
        })?;
        Ok(format!("{stem}{value:02}"))
    }

    pub fn departments_by_hospital(
        &self,
        principal: &Principal,
        hospital: &HospitalId,
    ) -> Result<Vec<Department>, ServiceError> {
        let filter = read_scope(&*self.store, principal, Some(hospital.clone()))?;
        Ok(self.store.departments().select(&|department: &Department| {
            department.hospital.as_ref() == Some(hospital)
                && department.status == DepartmentStatus::Active
                && filter.allows_record(department)
        })?)
    }

    pub fn department_stats(
        &self,
        principal: &Principal,
        department: &DepartmentId,
        today: NaiveDate,
    ) -> Result<DepartmentStats, ServiceError> {
        let record = require(self.store.departments(), department)?;
        ensure_visible(&*self.store, principal, &record)?;
        let practitioners = self
            .store
            .practitioners()
            .count(&|practitioner: &Practitioner| {
                practitioner.department.as_ref() == Some(department)
            })?;
        let today_appointments = self.store.appointments().count(&|appointment: &Appointment| {
            appointment.department.as_ref() == Some(department)
                && appointment.appointment_date == today
                && appointment.status != AppointmentStatus::Cancelled
        })?;

        Ok(DepartmentStats {
            name: record.id,
            department_name: record.department_name,
            consultation_rooms: record.consultation_rooms,
            beds_allocated: record.beds_allocated,
            daily_opd_capacity: record.daily_opd_capacity,
            practitioners,
            today_appointments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .and_then(|date| date.and_hms_opt(10, 0, 0))
            .expect("valid timestamp")
    }

    fn service() -> (RegistryService<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (
            RegistryService::new(store.clone(), Arc::new(EventDispatcher::new())),
            store,
        )
    }

    fn admin() -> Principal {
        Principal::new(Principal::ADMINISTRATOR, "Administrator")
    }

    fn draft() -> HospitalDraft {
        HospitalDraft {
            business_name: Some("City Care".to_string()),
            email: Some("desk@citycare.test".to_string()),
            address_line_1: Some("1 Main Road".to_string()),
            city: Some("Pune".to_string()),
            state: Some("MH".to_string()),
            pincode: Some("411001".to_string()),
            owner_name: Some("R. Iyer".to_string()),
            owner_email: Some("owner@citycare.test".to_string()),
            owner_mobile: Some("9800000001".to_string()),
            hospital_code: Some("CC".to_string()),
            facebook_url: Some("facebook.com/citycare".to_string()),
            ..HospitalDraft::default()
        }
    }

    #[test]
    fn wizard_requires_fields_and_an_unrestricted_caller() {
        let (service, _) = service();
        let mut incomplete = draft();
        incomplete.pincode = None;
        assert!(matches!(
            service.create_hospital_wizard(&admin(), incomplete, None, at(1)),
            Err(ServiceError::MissingField("pincode"))
        ));

        let nurse = Principal::new("nurse@h1.test", "Nurse").with_roles([Role::Nurse]);
        assert!(matches!(
            service.create_hospital_wizard(&nurse, draft(), None, at(1)),
            Err(ServiceError::PermissionDenied(_))
        ));
    }

    #[test]
    fn wizard_creates_hospital_and_admin() {
        let (service, store) = service();
        let admin_draft = AdminDraft {
            email: Some("admin@citycare.test".to_string()),
            first_name: Some("Meera".to_string()),
            last_name: None,
        };
        let outcome = service
            .create_hospital_wizard(&admin(), draft(), Some(admin_draft.clone()), at(1))
            .expect("hospital");

        assert_eq!(outcome.hospital.as_str(), "H00001");
        assert_eq!(outcome.organisation_code, "H00001");
        assert_eq!(outcome.admin_user.as_ref().map(|id| id.as_str()), Some("admin@citycare.test"));

        let hospital = store
            .hospitals()
            .fetch(&outcome.hospital)
            .expect("fetch")
            .expect("hospital");
        assert_eq!(
            hospital.social.facebook_url.as_deref(),
            Some("https://facebook.com/citycare")
        );
        assert_eq!(hospital.admin_user, outcome.admin_user);

        let second = service
            .create_hospital_wizard(&admin(), draft(), Some(admin_draft), at(2))
            .expect("second hospital");
        assert_eq!(second.hospital.as_str(), "H00002");
        assert!(second.admin_user.is_none());
        assert!(second.admin_error.is_some());
    }

    #[test]
    fn department_codes_count_per_prefix() {
        let (service, _) = service();
        let hospital = service
            .create_hospital_wizard(&admin(), draft(), None, at(1))
            .expect("hospital")
            .hospital;
        let department = |name: &str| DepartmentDraft {
            department_name: name.to_string(),
            department_code: None,
            hospital: Some(hospital.clone()),
            parent_department: None,
            specialization: None,
            department_head: None,
            consultation_rooms: 0,
            beds_allocated: 0,
            daily_opd_capacity: 0,
        };

        let first = service
            .create_department(&admin(), department("Cardiology"))
            .expect("first");
        let second = service
            .create_department(&admin(), department("Cardiac Surgery"))
            .expect("second");
        let other = service
            .create_department(&admin(), department("Orthopaedics"))
            .expect("other");

        assert_eq!(first.department_code, "CC-CAR01");
        assert_eq!(second.department_code, "CC-CAR02");
        assert_eq!(other.department_code, "CC-ORT01");
    }

    #[test]
    fn parent_department_must_share_the_tenant() {
        let (service, _) = service();
        let parent = service
            .create_department(
                &admin(),
                DepartmentDraft {
                    department_name: "Surgery".to_string(),
                    department_code: None,
                    hospital: Some(HospitalId::from("H1")),
                    parent_department: None,
                    specialization: None,
                    department_head: None,
                    consultation_rooms: 2,
                    beds_allocated: 10,
                    daily_opd_capacity: 40,
                },
            )
            .expect("parent");
        assert_eq!(parent.department_code, "HOSP-SUR01");

        let error = service
            .create_department(
                &admin(),
                DepartmentDraft {
                    department_name: "Neuro Surgery".to_string(),
                    department_code: None,
                    hospital: Some(HospitalId::from("H2")),
                    parent_department: Some(parent.id),
                    specialization: None,
                    department_head: None,
                    consultation_rooms: 0,
                    beds_allocated: 0,
                    daily_opd_capacity: 0,
                },
            )
            .expect_err("cross-tenant parent");
        assert!(matches!(error, ServiceError::TenantMismatch(_)));
    }

    #[test]
    fn patients_get_normalised_mobile_and_caller_tenant() {
        let (service, store) = service();
        let clerk = Principal::new("clerk@h1.test", "Clerk")
            .with_roles([Role::Receptionist])
            .with_hospital(HospitalId::from("H1"));
        store.principals().insert(clerk.clone()).expect("clerk");

        let patient = service
            .register_patient(
                &clerk,
                PatientDraft {
                    patient_name: "Ravi Kumar".to_string(),
                    sex: None,
                    dob: None,
                    mobile: Some("+91 98000 00002".to_string()),
                    email: None,
                    hospital: None,
                },
                at(3),
            )
            .expect("patient");

        assert_eq!(patient.id.as_str(), "PAT-00001");
        assert_eq!(patient.hospital, Some(HospitalId::from("H1")));
        assert_eq!(patient.mobile.as_deref(), Some("+919800000002"));
        assert_eq!(service.list_patients(&clerk, None).expect("list").len(), 1);
    }
}
