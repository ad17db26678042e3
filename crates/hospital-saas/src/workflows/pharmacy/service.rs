use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::info;

use super::domain::{
    validate_lines, DispenseOutcome, Medication, MedicationDraft, Pharmacy, PharmacyDraft,
    PharmacyQueueEntry, Prescription, PrescriptionItem, PrescriptionRequest, PrescriptionStatus,
};
use crate::events::{DomainEvent, EventDispatcher};
use crate::ids::{HospitalId, MedicationId, PharmacyId, PrescriptionId, PrincipalId};
use crate::sequence::{SequenceKey, SequencePeriod, Series};
use crate::store::{require, HospitalStore, Record};
use crate::tenancy::Principal;
use crate::workflows::{
    ensure_visible, load_principal, next_document_name, read_scope, row_count, write_tenant,
    DocStatus, ServiceError,
};

/// Pharmacies, medications and the prescription counter.
pub struct PharmacyService<S> {
    store: Arc<S>,
    events: Arc<EventDispatcher>,
}

impl<S> PharmacyService<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<EventDispatcher>) -> Self {
        Self { store, events }
    }

    pub fn principal(&self, user: &PrincipalId) -> Result<Principal, ServiceError> {
        load_principal(&*self.store, user)
    }

    /// Register a pharmacy. Marking it default clears the tenant's previous
    /// default.
    pub fn register_pharmacy(
        &self,
        principal: &Principal,
        draft: PharmacyDraft,
    ) -> Result<Pharmacy, ServiceError> {
        let name = draft.pharmacy_name.trim();
        if name.is_empty() {
            return Err(ServiceError::MissingField("pharmacy_name"));
        }
        let tenant = write_tenant(&*self.store, principal, draft.hospital)?;
        let pharmacy_code = match draft.pharmacy_code.filter(|code| !code.trim().is_empty()) {
            Some(code) => code,
            None => self.next_pharmacy_code(tenant.as_ref())?,
        };

        if draft.is_default {
            let pharmacies = self.store.pharmacies();
            let previous = pharmacies.select(&|pharmacy: &Pharmacy| {
                pharmacy.is_default && pharmacy.hospital == tenant
            })?;
            for mut pharmacy in previous {
                pharmacy.is_default = false;
                pharmacies.update(pharmacy)?;
            }
        }

        let pharmacy = self.store.pharmacies().insert(Pharmacy {
            id: PharmacyId::new(name),
            pharmacy_name: name.to_string(),
            pharmacy_code,
            hospital: tenant,
            is_default: draft.is_default,
            is_active: draft.is_active,
            is_warehouse: draft.is_warehouse,
        })?;
        info!(pharmacy = %pharmacy.id, code = %pharmacy.pharmacy_code, "pharmacy registered");
        Ok(pharmacy)
    }

    fn next_pharmacy_code(&self, tenant: Option<&HospitalId>) -> Result<String, ServiceError> {
        let hospital_code = match tenant {
            Some(id) => self
                .store
                .hospitals()
                .fetch(id)?
                .map(|hospital| hospital.code_prefix("H"))
                .unwrap_or_else(|| "H".to_string()),
            None => "H".to_string(),
        };
        let key = SequenceKey::new(Series::PharmacyCode, tenant.cloned(), SequencePeriod::Lifetime);
        let pharmacies = self.store.pharmacies();
        let value = self.store.next_value(&key, &|| {
            let existing =
                pharmacies.count(&|pharmacy: &Pharmacy| pharmacy.hospital.as_ref() == tenant)?;
            Ok(row_count(existing))
        })?;
        Ok(format!("{hospital_code}-PH{value:02}"))
    }

    /// The tenant's default pharmacy, else any active one.
    pub fn default_pharmacy(
        &self,
        hospital: Option<&HospitalId>,
    ) -> Result<Option<Pharmacy>, ServiceError> {
        let pharmacies = self.store.pharmacies();
        let in_tenant =
            |pharmacy: &Pharmacy| hospital.is_none() || pharmacy.hospital.as_ref() == hospital;
        let defaults = pharmacies.select(&|pharmacy: &Pharmacy| {
            pharmacy.is_active && pharmacy.is_default && in_tenant(pharmacy)
        })?;
        if let Some(pharmacy) = defaults.into_iter().next() {
            return Ok(Some(pharmacy));
        }
        if hospital.is_none() {
            return Ok(None);
        }
        let active =
            pharmacies.select(&|pharmacy: &Pharmacy| pharmacy.is_active && in_tenant(pharmacy))?;
        Ok(active.into_iter().next())
    }

    pub fn add_medication(
        &self,
        principal: &Principal,
        draft: MedicationDraft,
    ) -> Result<Medication, ServiceError> {
        let name = draft.medication_name.trim();
        if name.is_empty() {
            return Err(ServiceError::MissingField("medication_name"));
        }
        if draft.standard_rate < 0.0 {
            return Err(ServiceError::validation("Rate cannot be negative"));
        }
        let hospital = write_tenant(&*self.store, principal, draft.hospital)?;
        Ok(self.store.medications().insert(Medication {
            id: MedicationId::new(name),
            medication_name: name.to_string(),
            standard_rate: draft.standard_rate,
            hospital,
        })?)
    }

    pub fn create_prescription(
        &self,
        principal: &Principal,
        request: PrescriptionRequest,
        now: NaiveDateTime,
    ) -> Result<Prescription, ServiceError> {
        validate_lines(&request.items)?;
        let patient = require(self.store.patients(), &request.patient)?;
        ensure_visible(&*self.store, principal, &patient)?;
        let practitioner_name = match request.practitioner.as_ref() {
            Some(id) => Some(require(self.store.practitioners(), id)?.practitioner_name),
            None => None,
        };
        if let Some(pharmacy) = request.pharmacy.as_ref() {
            require(self.store.pharmacies(), pharmacy)?;
        }

        let mut items = Vec::with_capacity(request.items.len());
        for line in request.items {
            let Some(medication_id) = line.medication else {
                continue;
            };
            let medication = require(self.store.medications(), &medication_id)?;
            let rate = if line.rate > 0.0 {
                line.rate
            } else {
                medication.standard_rate
            };
            items.push(PrescriptionItem {
                medication: medication.id,
                drug_name: medication.medication_name,
                dosage: line.dosage,
                quantity: line.quantity,
                rate,
                amount: 0.0,
                is_dispensed: false,
                dispensed_qty: 0.0,
                dispensed_by: None,
                dispensed_at: None,
            });
        }

        let tenant = write_tenant(&*self.store, principal, request.hospital)?
            .or_else(|| patient.hospital.clone());
        let prescriptions = self.store.prescriptions();
        let id = PrescriptionId::new(next_document_name(&*self.store, prescriptions, "RX")?);
        let mut prescription = Prescription {
            id,
            patient: patient.id,
            patient_name: patient.patient_name,
            practitioner: request.practitioner,
            practitioner_name,
            pharmacy: request.pharmacy,
            hospital: tenant,
            prescription_date: request.prescription_date.unwrap_or_else(|| now.date()),
            items,
            total_quantity: 0.0,
            total_amount: 0.0,
            discount_amount: request.discount_amount,
            net_amount: 0.0,
            status: PrescriptionStatus::Draft,
            docstatus: DocStatus::Draft,
            dispensed_by: None,
            dispensed_at: None,
            sales_invoice: None,
            created_at: now,
        };
        prescription.recalculate();
        Ok(prescriptions.insert(prescription)?)
    }

    pub fn submit_prescription(
        &self,
        principal: &Principal,
        id: &PrescriptionId,
    ) -> Result<Prescription, ServiceError> {
        let mut prescription = self.visible(principal, id)?;
        if prescription.docstatus != DocStatus::Draft {
            return Err(ServiceError::IllegalTransition {
                kind: Prescription::KIND,
                from: prescription.docstatus.label(),
                to: DocStatus::Submitted.label(),
            });
        }
        if prescription.items.is_empty() {
            return Err(ServiceError::validation(
                "Please add prescription items before submitting",
            ));
        }
        prescription.docstatus = DocStatus::Submitted;
        self.save(&mut prescription)?;
        info!(prescription = %prescription.id, "prescription submitted");
        Ok(prescription)
    }

    pub fn cancel_prescription(
        &self,
        principal: &Principal,
        id: &PrescriptionId,
    ) -> Result<Prescription, ServiceError> {
        let mut prescription = self.visible(principal, id)?;
        if !prescription.docstatus.is_submitted() {
            return Err(ServiceError::IllegalTransition {
                kind: Prescription::KIND,
                from: prescription.docstatus.label(),
                to: DocStatus::Cancelled.label(),
            });
        }
        prescription.docstatus = DocStatus::Cancelled;
        self.save(&mut prescription)?;
        Ok(prescription)
    }

    /// Dispense every outstanding line from the prescription's pharmacy or
    /// the tenant default. Billing reacts to the dispensed event.
    pub fn dispense_all(
        &self,
        principal: &Principal,
        id: &PrescriptionId,
        now: NaiveDateTime,
    ) -> Result<DispenseOutcome, ServiceError> {
        let mut prescription = self.visible(principal, id)?;
        if prescription.status == PrescriptionStatus::Dispensed {
            return Err(ServiceError::validation("Prescription already dispensed"));
        }
        if !prescription.docstatus.is_submitted() {
            return Err(ServiceError::validation("Prescription must be submitted"));
        }
        let pharmacy = match prescription.pharmacy.clone() {
            Some(pharmacy) => Some(pharmacy),
            None => self
                .default_pharmacy(prescription.hospital.as_ref())?
                .map(|pharmacy| pharmacy.id),
        };
        let Some(pharmacy) = pharmacy else {
            return Err(ServiceError::validation("Please select a pharmacy"));
        };

        for item in prescription.items.iter_mut().filter(|item| !item.is_dispensed) {
            item.dispensed_qty = item.quantity;
            item.is_dispensed = true;
            item.dispensed_by = Some(principal.id.clone());
            item.dispensed_at = Some(now);
        }
        prescription.pharmacy = Some(pharmacy);
        prescription.dispensed_by = Some(principal.id.clone());
        prescription.dispensed_at = Some(now);
        self.save(&mut prescription)?;

        info!(prescription = %prescription.id, "prescription dispensed");
        self.events
            .dispatch(&[DomainEvent::PrescriptionDispensed(prescription.clone())]);
        Ok(DispenseOutcome {
            success: true,
            message: "Prescription dispensed successfully".to_string(),
            prescription: require(self.store.prescriptions(), &prescription.id)?,
        })
    }

    /// Submitted prescriptions still waiting at the counter, oldest first.
    pub fn pharmacy_queue(
        &self,
        principal: &Principal,
        pharmacy: Option<&PharmacyId>,
        hospital: Option<HospitalId>,
    ) -> Result<Vec<PharmacyQueueEntry>, ServiceError> {
        let scope = read_scope(&*self.store, principal, hospital)?;
        let mut open = self.store.prescriptions().select(&|prescription: &Prescription| {
            prescription.docstatus.is_submitted()
                && PrescriptionStatus::OPEN.contains(&prescription.status)
                && pharmacy
                    .map_or(true, |pharmacy| prescription.pharmacy.as_ref() == Some(pharmacy))
                && scope.allows_record(prescription)
        })?;
        open.sort_by_key(|prescription| prescription.created_at);
        Ok(open.into_iter().map(PharmacyQueueEntry::from).collect())
    }

    fn save(&self, prescription: &mut Prescription) -> Result<(), ServiceError> {
        prescription.recalculate();
        prescription.status = prescription.derived_status();
        self.store.prescriptions().update(prescription.clone())?;
        Ok(())
    }

    fn visible(
        &self,
        principal: &Principal,
        id: &PrescriptionId,
    ) -> Result<Prescription, ServiceError> {
        let prescription = require(self.store.prescriptions(), id)?;
        ensure_visible(&*self.store, principal, &prescription)?;
        Ok(prescription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tenancy::Hospital;
    use crate::workflows::pharmacy::domain::PrescriptionLine;
    use crate::workflows::registry::Patient;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("timestamp")
    }

    fn admin() -> Principal {
        Principal::new(Principal::ADMINISTRATOR, "Administrator")
    }

    fn service() -> PharmacyService<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        let mut hospital = Hospital::named(HospitalId::from("H1"), "City Care");
        hospital.hospital_code = Some("CC".to_string());
        store.hospitals().insert(hospital).expect("hospital");
        store
            .patients()
            .insert(Patient::fixture("PAT-00001", Some("H1")))
            .expect("patient");
        let pharmacy = PharmacyService::new(store, Arc::new(EventDispatcher::new()));
        pharmacy
            .add_medication(
                &admin(),
                MedicationDraft {
                    medication_name: "Paracetamol 500mg".to_string(),
                    standard_rate: 2.5,
                    hospital: None,
                },
            )
            .expect("medication");
        pharmacy
    }

    fn draft(name: &str, is_default: bool) -> PharmacyDraft {
        PharmacyDraft {
            pharmacy_name: name.to_string(),
            pharmacy_code: None,
            hospital: Some(HospitalId::from("H1")),
            is_default,
            is_active: true,
            is_warehouse: false,
        }
    }

    fn request(quantity: f64) -> PrescriptionRequest {
        PrescriptionRequest {
            patient: "PAT-00001".into(),
            practitioner: None,
            pharmacy: None,
            hospital: None,
            prescription_date: None,
            discount_amount: 5.0,
            items: vec![PrescriptionLine {
                medication: Some("Paracetamol 500mg".into()),
                dosage: Some("1-0-1".to_string()),
                quantity,
                rate: 0.0,
            }],
        }
    }

    #[test]
    fn pharmacy_codes_count_per_hospital_and_one_default_wins() {
        let pharmacy = service();
        let main = pharmacy.register_pharmacy(&admin(), draft("Main", true)).expect("main");
        let annex = pharmacy.register_pharmacy(&admin(), draft("Annex", true)).expect("annex");
        assert_eq!(main.pharmacy_code, "CC-PH01");
        assert_eq!(annex.pharmacy_code, "CC-PH02");

        let main = require(pharmacy.store.pharmacies(), &main.id).expect("main");
        assert!(!main.is_default);
        let default = pharmacy
            .default_pharmacy(Some(&HospitalId::from("H1")))
            .expect("lookup")
            .expect("default");
        assert_eq!(default.id, annex.id);
    }

    #[test]
    fn rates_fall_back_to_the_standard_rate() {
        let pharmacy = service();
        let prescription = pharmacy
            .create_prescription(&admin(), request(10.0), at(9))
            .expect("prescription");
        assert_eq!(prescription.id.as_str(), "RX-00001");
        assert_eq!(prescription.items[0].rate, 2.5);
        assert_eq!(prescription.total_amount, 25.0);
        assert_eq!(prescription.net_amount, 20.0);
        assert_eq!(prescription.hospital, Some(HospitalId::from("H1")));
        assert!(pharmacy.create_prescription(&admin(), request(0.0), at(9)).is_err());
    }

    #[test]
    fn dispensing_needs_a_pharmacy_and_happens_once() {
        let pharmacy = service();
        let prescription = pharmacy
            .create_prescription(&admin(), request(4.0), at(9))
            .expect("prescription");
        assert!(pharmacy.dispense_all(&admin(), &prescription.id, at(10)).is_err());
        pharmacy
            .submit_prescription(&admin(), &prescription.id)
            .expect("submitted");

        assert!(matches!(
            pharmacy.dispense_all(&admin(), &prescription.id, at(10)),
            Err(ServiceError::Validation(message)) if message == "Please select a pharmacy"
        ));
        let queue = pharmacy.pharmacy_queue(&admin(), None, None).expect("queue");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].status, PrescriptionStatus::Pending);

        pharmacy.register_pharmacy(&admin(), draft("Main", false)).expect("pharmacy");
        let outcome = pharmacy
            .dispense_all(&admin(), &prescription.id, at(10))
            .expect("dispensed");
        assert_eq!(outcome.prescription.status, PrescriptionStatus::Dispensed);
        assert!(outcome.prescription.items.iter().all(|item| item.dispensed_qty == 4.0));
        assert!(pharmacy.dispense_all(&admin(), &prescription.id, at(11)).is_err());
        assert!(pharmacy.pharmacy_queue(&admin(), None, None).expect("queue").is_empty());
    }
}
