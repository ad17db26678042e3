use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::info;

use super::domain::{
    Admission, AdmissionRequest, AdmissionStatus, AdvanceReceipt, BillingUpdate,
    DischargeOutcome, DischargeRequest, IpdDashboard,
};
use crate::events::{DomainEvent, EventDispatcher};
use crate::ids::{AdmissionId, HospitalId, PrincipalId};
use crate::sequence::{SequenceKey, SequencePeriod, Series};
use crate::store::{require, HospitalStore};
use crate::tenancy::{Hospital, Principal, TenantFilter};
use crate::workflows::{
    ensure_visible, load_principal, next_document_name, read_scope, round_to, row_count,
    write_tenant, ServiceError,
};

const DASHBOARD_LIMIT: usize = 50;

/// Inpatient admissions, bed occupancy and the running bill.
pub struct IpdService<S> {
    store: Arc<S>,
    events: Arc<EventDispatcher>,
    default_beds: u32,
}

impl<S> IpdService<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<EventDispatcher>, default_beds: u32) -> Self {
        Self {
            store,
            events,
            default_beds,
        }
    }

    pub fn principal(&self, user: &PrincipalId) -> Result<Principal, ServiceError> {
        load_principal(&*self.store, user)
    }

    pub fn admit(
        &self,
        principal: &Principal,
        request: AdmissionRequest,
        now: NaiveDateTime,
    ) -> Result<Admission, ServiceError> {
        let patient = require(self.store.patients(), &request.patient)?;
        ensure_visible(&*self.store, principal, &patient)?;
        if let Some(practitioner) = request.practitioner.as_ref() {
            require(self.store.practitioners(), practitioner)?;
        }
        let tenant = write_tenant(&*self.store, principal, request.hospital)?
            .or_else(|| patient.hospital.clone());
        let admission_date = request.admission_date.unwrap_or_else(|| now.date());
        let period = SequencePeriod::month_of(admission_date);

        let admissions = self.store.admissions();
        let key = SequenceKey::new(Series::IpdAdmission, tenant.clone(), period);
        let sequence = self.store.next_value(&key, &|| {
            let this_month = admissions.count(&|admission: &Admission| {
                admission.hospital == tenant && period.contains(admission.admission_date)
            })?;
            Ok(row_count(this_month))
        })?;

        let id = AdmissionId::new(next_document_name(&*self.store, admissions, "ADM")?);
        let age = patient.dob.map(|dob| {
            let years = admission_date.signed_duration_since(dob).num_days() / 365;
            format!("{years} years")
        });
        let mut admission = Admission {
            id,
            admission_id: Admission::display_id(sequence),
            patient: patient.id,
            patient_name: patient.patient_name,
            age,
            mobile: patient.mobile,
            hospital: tenant,
            ward: request.ward,
            room: request.room,
            bed: request.bed,
            practitioner: request.practitioner,
            diagnosis: request.diagnosis,
            admission_date,
            status: AdmissionStatus::Admitted,
            total_billed: 0.0,
            advance_paid: 0.0,
            balance_due: 0.0,
            actual_discharge: None,
            discharge_type: None,
            discharge_summary: None,
            created_at: now,
        };
        admission.recalculate_balance();
        let admission = admissions.insert(admission)?;

        info!(
            admission = %admission.id,
            admission_id = %admission.admission_id,
            hospital = ?admission.hospital,
            "patient admitted"
        );
        self.events
            .dispatch(&[DomainEvent::AdmissionCreated(admission.clone())]);
        Ok(admission)
    }

    pub fn start_treatment(
        &self,
        principal: &Principal,
        id: &AdmissionId,
    ) -> Result<Admission, ServiceError> {
        let mut admission = self.visible(principal, id)?;
        let previous = admission.status;
        previous.ensure_transition(AdmissionStatus::InTreatment)?;

        admission.status = AdmissionStatus::InTreatment;
        self.store.admissions().update(admission.clone())?;
        self.events.dispatch(&[DomainEvent::AdmissionStatusChanged {
            admission: admission.clone(),
            previous,
        }]);
        Ok(admission)
    }

    pub fn discharge(
        &self,
        principal: &Principal,
        id: &AdmissionId,
        request: DischargeRequest,
        now: NaiveDateTime,
    ) -> Result<DischargeOutcome, ServiceError> {
        let mut admission = self.visible(principal, id)?;
        admission.status.ensure_transition(AdmissionStatus::Discharged)?;

        admission.status = AdmissionStatus::Discharged;
        admission.actual_discharge = Some(now);
        admission.discharge_type = Some(request.discharge_type);
        admission.discharge_summary = Some(request.summary);
        admission.recalculate_balance();
        self.store.admissions().update(admission.clone())?;

        info!(
            admission = %admission.id,
            balance_due = admission.balance_due,
            "patient discharged"
        );
        self.events
            .dispatch(&[DomainEvent::AdmissionDischarged(admission.clone())]);
        Ok(DischargeOutcome {
            message: format!("Patient {} discharged successfully", admission.patient_name),
            admission,
        })
    }

    pub fn add_advance_payment(
        &self,
        principal: &Principal,
        id: &AdmissionId,
        amount: f64,
        mode_of_payment: &str,
    ) -> Result<AdvanceReceipt, ServiceError> {
        if amount.is_nan() || amount <= 0.0 {
            return Err(ServiceError::validation("Advance amount must be greater than 0"));
        }
        let mut admission = self.visible(principal, id)?;
        admission.advance_paid = round_to(admission.advance_paid + amount, 2);
        admission.recalculate_balance();
        self.store.admissions().update(admission.clone())?;

        info!(admission = %admission.id, amount, mode = mode_of_payment, "advance recorded");
        Ok(AdvanceReceipt {
            message: format!("Advance of Rs.{amount} added"),
            total_advance: admission.advance_paid,
            balance_due: admission.balance_due,
        })
    }

    pub fn update_billing(
        &self,
        principal: &Principal,
        id: &AdmissionId,
        total_billed: f64,
    ) -> Result<BillingUpdate, ServiceError> {
        if total_billed < 0.0 {
            return Err(ServiceError::validation("Billed amount cannot be negative"));
        }
        let mut admission = self.visible(principal, id)?;
        admission.total_billed = round_to(total_billed, 2);
        admission.recalculate_balance();
        self.store.admissions().update(admission.clone())?;
        Ok(BillingUpdate {
            total_billed: admission.total_billed,
            balance_due: admission.balance_due,
        })
    }

    /// Admitted or in-treatment patients, newest first.
    pub fn active_admissions(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
    ) -> Result<Vec<Admission>, ServiceError> {
        let scope = read_scope(&*self.store, principal, hospital)?;
        self.active_in(&scope)
    }

    pub fn ipd_dashboard(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
    ) -> Result<IpdDashboard, ServiceError> {
        let scope = read_scope(&*self.store, principal, hospital)?;
        let mut admissions = self.active_in(&scope)?;
        let occupied_beds = row_count(
            admissions
                .iter()
                .filter(|admission| admission.bed.as_deref().is_some_and(|bed| !bed.is_empty()))
                .count(),
        );
        let total_beds = self.total_beds(&scope)?;
        let occupancy_rate = if total_beds > 0 {
            round_to(f64::from(occupied_beds) / f64::from(total_beds) * 100.0, 1)
        } else {
            0.0
        };
        admissions.truncate(DASHBOARD_LIMIT);

        Ok(IpdDashboard {
            admissions,
            total_beds,
            occupied_beds,
            available_beds: total_beds.saturating_sub(occupied_beds),
            occupancy_rate,
        })
    }

    /// Recorded bed count of the scoped hospital, or of every hospital that
    /// has one, falling back to the configured default.
    pub fn total_beds(&self, scope: &TenantFilter) -> Result<u32, ServiceError> {
        let recorded: u32 = match scope.scoped_to() {
            Some(hospital) => self
                .store
                .hospitals()
                .fetch(hospital)?
                .and_then(|hospital| hospital.total_beds)
                .unwrap_or(0),
            None => self
                .store
                .hospitals()
                .select(&|_: &Hospital| true)?
                .iter()
                .filter_map(|hospital| hospital.total_beds)
                .sum(),
        };
        Ok(if recorded > 0 {
            recorded
        } else {
            self.default_beds
        })
    }

    fn active_in(&self, scope: &TenantFilter) -> Result<Vec<Admission>, ServiceError> {
        let mut admissions = self
            .store
            .admissions()
            .select(&|admission: &Admission| {
                admission.is_active() && scope.allows_record(admission)
            })?;
        admissions.sort_by(|a, b| {
            b.admission_date
                .cmp(&a.admission_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(admissions)
    }

    fn visible(&self, principal: &Principal, id: &AdmissionId) -> Result<Admission, ServiceError> {
        let admission = require(self.store.admissions(), id)?;
        ensure_visible(&*self.store, principal, &admission)?;
        Ok(admission)
    }
}
