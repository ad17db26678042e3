use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::info;

use super::domain::{
    LabQueueBoard, LabQueueEntry, LabQueueStatus, LabStats, LabStatusUpdate, LabTemplate,
    LabTemplateDraft, LabTest, LabTestRequest, PaymentStatus, QueueNumber, TemplateCount,
};
use crate::events::{DomainEvent, EventDispatcher};
use crate::ids::{HospitalId, LabTemplateId, LabTestId, PrincipalId};
use crate::sequence::{SequenceKey, SequencePeriod, Series};
use crate::store::{require, HospitalStore};
use crate::tenancy::Principal;
use crate::workflows::{
    ensure_visible, load_principal, next_document_name, read_scope, row_count, write_tenant,
    DocStatus, ServiceError,
};

const WAITING_LIMIT: usize = 50;
const COLLECTION_LIMIT: usize = 10;
const PROCESSING_LIMIT: usize = 20;

/// Laboratory queue: numbering, board and status moves.
pub struct LabService<S> {
    store: Arc<S>,
    events: Arc<EventDispatcher>,
}

impl<S> LabService<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<EventDispatcher>) -> Self {
        Self { store, events }
    }

    pub fn principal(&self, user: &PrincipalId) -> Result<Principal, ServiceError> {
        load_principal(&*self.store, user)
    }

    pub fn add_template(
        &self,
        principal: &Principal,
        draft: LabTemplateDraft,
    ) -> Result<LabTemplate, ServiceError> {
        let name = draft.lab_test_name.trim();
        if name.is_empty() {
            return Err(ServiceError::MissingField("lab_test_name"));
        }
        if draft.test_fee < 0.0 {
            return Err(ServiceError::validation("Test fee cannot be negative"));
        }
        let hospital = write_tenant(&*self.store, principal, draft.hospital)?;
        Ok(self.store.lab_templates().insert(LabTemplate {
            id: LabTemplateId::new(name),
            lab_test_name: name.to_string(),
            test_fee: draft.test_fee,
            hospital,
        })?)
    }

    /// Order a test and put it on today's board.
    pub fn create_test(
        &self,
        principal: &Principal,
        request: LabTestRequest,
        now: NaiveDateTime,
    ) -> Result<LabTest, ServiceError> {
        let patient = require(self.store.patients(), &request.patient)?;
        ensure_visible(&*self.store, principal, &patient)?;
        if let Some(template) = request.template.as_ref() {
            require(self.store.lab_templates(), template)?;
        }
        let tenant = write_tenant(&*self.store, principal, request.hospital)?
            .or_else(|| patient.hospital.clone());

        let queue_number = self.allocate_queue_number(tenant.as_ref(), now.date())?;
        let tests = self.store.lab_tests();
        let id = LabTestId::new(next_document_name(&*self.store, tests, "LT")?);
        let test = tests.insert(LabTest {
            id,
            patient: patient.id,
            patient_name: patient.patient_name,
            template: request.template,
            practitioner: request.practitioner,
            hospital: tenant,
            queue_number: Some(queue_number),
            queue_status: LabQueueStatus::Waiting,
            payment_status: Some(PaymentStatus::Pending),
            docstatus: DocStatus::Draft,
            created_at: now,
            modified_at: now,
        })?;
        info!(lab_test = %test.id, hospital = ?test.hospital, queue_number, "lab test queued");
        Ok(test)
    }

    /// Give an existing test a fresh number for today and send it back to
    /// the waiting list.
    pub fn assign_queue_number(
        &self,
        principal: &Principal,
        id: &LabTestId,
        now: NaiveDateTime,
    ) -> Result<QueueNumber, ServiceError> {
        let mut test = require(self.store.lab_tests(), id)?;
        ensure_visible(&*self.store, principal, &test)?;
        let queue_number = self.allocate_queue_number(test.hospital.as_ref(), now.date())?;

        let previous = test.queue_status;
        test.queue_number = Some(queue_number);
        test.queue_status = LabQueueStatus::Waiting;
        test.modified_at = now;
        self.store.lab_tests().update(test.clone())?;
        if previous != LabQueueStatus::Waiting {
            self.events
                .dispatch(&[DomainEvent::LabQueueChanged { test, previous }]);
        }
        Ok(QueueNumber { queue_number })
    }

    pub fn update_status(
        &self,
        principal: &Principal,
        id: &LabTestId,
        status: &str,
        now: NaiveDateTime,
    ) -> Result<LabStatusUpdate, ServiceError> {
        let next = LabQueueStatus::parse(status)?;
        let mut test = require(self.store.lab_tests(), id)?;
        ensure_visible(&*self.store, principal, &test)?;
        let previous = test.queue_status;
        previous.ensure_transition(next)?;

        test.queue_status = next;
        test.modified_at = now;
        self.store.lab_tests().update(test.clone())?;
        if previous != next {
            info!(lab_test = %test.id, from = %previous, to = %next, "lab queue status changed");
            self.events
                .dispatch(&[DomainEvent::LabQueueChanged { test, previous }]);
        }
        Ok(LabStatusUpdate {
            success: true,
            status: next,
        })
    }

    /// Today's board, optionally for one hospital. Open to guests.
    pub fn lab_queue(
        &self,
        hospital: Option<&HospitalId>,
        today: NaiveDate,
    ) -> Result<LabQueueBoard, ServiceError> {
        let on_board = |test: &LabTest| {
            test.docstatus != DocStatus::Cancelled
                && (hospital.is_none() || test.hospital.as_ref() == hospital)
        };
        let todays = self.store.lab_tests().select(&|test: &LabTest| {
            on_board(test) && test.created_at.date() == today
        })?;
        let completed_count = self.store.lab_tests().count(&|test: &LabTest| {
            on_board(test)
                && test.queue_status == LabQueueStatus::Completed
                && test.modified_at.date() >= today
        })?;

        let names = self.template_names()?;
        let column = |status: LabQueueStatus, limit: usize| {
            let mut tests: Vec<&LabTest> = todays
                .iter()
                .filter(|test| test.queue_status == status)
                .collect();
            if status == LabQueueStatus::Waiting {
                tests.sort_by_key(|test| (test.queue_number.unwrap_or(u32::MAX), test.created_at));
            } else {
                tests.sort_by_key(|test| test.created_at);
            }
            tests
                .into_iter()
                .take(limit)
                .map(|test| board_entry(test, &names))
                .collect::<Vec<_>>()
        };

        let waiting = column(LabQueueStatus::Waiting, WAITING_LIMIT);
        let collection = column(LabQueueStatus::SampleCollection, COLLECTION_LIMIT);
        let processing = column(LabQueueStatus::Processing, PROCESSING_LIMIT);
        Ok(LabQueueBoard {
            current: collection.first().cloned(),
            waiting_count: waiting.len(),
            collection_count: collection.len(),
            processing_count: processing.len(),
            completed_count,
            waiting,
            collection,
            processing,
        })
    }

    pub fn lab_stats(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<LabStats, ServiceError> {
        let scope = read_scope(&*self.store, principal, hospital)?;
        let tests = self.store.lab_tests().select(&|test: &LabTest| {
            let day = test.created_at.date();
            test.docstatus != DocStatus::Cancelled
                && day >= from_date
                && day <= to_date
                && scope.allows_record(test)
        })?;

        let mut by_status = BTreeMap::new();
        let mut by_template: HashMap<Option<LabTemplateId>, usize> = HashMap::new();
        for test in &tests {
            *by_status
                .entry(test.queue_status.label().to_string())
                .or_insert(0) += 1;
            *by_template.entry(test.template.clone()).or_insert(0) += 1;
        }
        let mut by_type: Vec<TemplateCount> = by_template
            .into_iter()
            .map(|(template, count)| TemplateCount { template, count })
            .collect();
        by_type.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.template.cmp(&b.template)));
        by_type.truncate(10);

        Ok(LabStats {
            total: tests.len(),
            by_status,
            by_type,
            from_date,
            to_date,
        })
    }

    fn allocate_queue_number(
        &self,
        tenant: Option<&HospitalId>,
        day: NaiveDate,
    ) -> Result<u32, ServiceError> {
        let key = SequenceKey::new(
            Series::LabQueue,
            tenant.cloned(),
            SequencePeriod::Day(day),
        );
        let tests = self.store.lab_tests();
        Ok(self.store.next_value(&key, &|| {
            let numbered = tests.count(&|test: &LabTest| {
                test.created_on(tenant, day) && test.queue_number.is_some()
            })?;
            Ok(row_count(numbered))
        })?)
    }

    fn template_names(&self) -> Result<HashMap<LabTemplateId, String>, ServiceError> {
        Ok(self
            .store
            .lab_templates()
            .select(&|_: &LabTemplate| true)?
            .into_iter()
            .map(|template| (template.id, template.lab_test_name))
            .collect())
    }
}

fn board_entry(test: &LabTest, names: &HashMap<LabTemplateId, String>) -> LabQueueEntry {
    let test_name = match test.template.as_ref() {
        Some(template) => names
            .get(template)
            .cloned()
            .unwrap_or_else(|| template.to_string()),
        None => "Lab Test".to_string(),
    };
    LabQueueEntry {
        name: test.id.clone(),
        patient: test.patient.clone(),
        patient_name: test.patient_name.clone(),
        template: test.template.clone(),
        test_name,
        queue_number: test.board_number(),
        hospital: test.hospital.clone(),
        created_at: test.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PatientId;
    use crate::store::MemoryStore;
    use crate::workflows::registry::Patient;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("timestamp")
    }

    fn service() -> LabService<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        for (id, hospital) in [("PAT-00001", "H1"), ("PAT-00002", "H2")] {
            store
                .patients()
                .insert(Patient::fixture(id, Some(hospital)))
                .expect("patient");
        }
        store
            .lab_templates()
            .insert(LabTemplate {
                id: LabTemplateId::from("CBC"),
                lab_test_name: "Complete Blood Count".to_string(),
                test_fee: 350.0,
                hospital: None,
            })
            .expect("template");
        LabService::new(store, Arc::new(EventDispatcher::new()))
    }

    fn request(patient: &str) -> LabTestRequest {
        LabTestRequest {
            patient: PatientId::from(patient),
            template: Some(LabTemplateId::from("CBC")),
            practitioner: None,
            hospital: None,
        }
    }

    #[test]
    fn queue_numbers_restart_per_tenant_and_day() {
        let lab = service();
        let admin = Principal::new(Principal::ADMINISTRATOR, "Administrator");
        let first = lab.create_test(&admin, request("PAT-00001"), at(1, 9)).expect("first");
        let second = lab.create_test(&admin, request("PAT-00001"), at(1, 10)).expect("second");
        let other = lab.create_test(&admin, request("PAT-00002"), at(1, 10)).expect("other");
        let tomorrow = lab.create_test(&admin, request("PAT-00001"), at(2, 9)).expect("next day");

        assert_eq!(first.queue_number, Some(1));
        assert_eq!(second.queue_number, Some(2));
        assert_eq!(other.queue_number, Some(1));
        assert_eq!(tomorrow.queue_number, Some(1));
        assert_eq!(first.payment_status, Some(PaymentStatus::Pending));
    }

    #[test]
    fn board_groups_by_status_and_names_templates() {
        let lab = service();
        let admin = Principal::new(Principal::ADMINISTRATOR, "Administrator");
        let first = lab.create_test(&admin, request("PAT-00001"), at(1, 9)).expect("first");
        lab.create_test(&admin, request("PAT-00001"), at(1, 10)).expect("second");
        lab.update_status(&admin, &first.id, "Sample Collection", at(1, 11))
            .expect("collecting");

        let board = lab
            .lab_queue(Some(&HospitalId::from("H1")), at(1, 12).date())
            .expect("board");
        assert_eq!(board.waiting_count, 1);
        assert_eq!(board.collection_count, 1);
        let current = board.current.expect("current");
        assert_eq!(current.name, first.id);
        assert_eq!(current.test_name, "Complete Blood Count");
        assert_eq!(board.waiting[0].queue_number, "2");
    }

    #[test]
    fn skipping_a_stage_is_rejected_and_status_kept() {
        let lab = service();
        let admin = Principal::new(Principal::ADMINISTRATOR, "Administrator");
        let test = lab.create_test(&admin, request("PAT-00001"), at(1, 9)).expect("test");

        assert!(lab.update_status(&admin, &test.id, "Completed", at(1, 10)).is_err());
        assert!(matches!(
            lab.update_status(&admin, &test.id, "Done", at(1, 10)),
            Err(ServiceError::InvalidStatus { .. })
        ));
        let stats = lab.lab_stats(&admin, None, at(1, 0).date(), at(1, 0).date()).expect("stats");
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_status.get("Waiting"), Some(&1));
        assert_eq!(stats.by_type[0].template, Some(LabTemplateId::from("CBC")));
    }

    #[test]
    fn reassigned_number_does_not_collide() {
        let lab = service();
        let admin = Principal::new(Principal::ADMINISTRATOR, "Administrator");
        let first = lab.create_test(&admin, request("PAT-00001"), at(1, 9)).expect("first");
        lab.create_test(&admin, request("PAT-00001"), at(1, 9)).expect("second");
        let assigned = lab
            .assign_queue_number(&admin, &first.id, at(1, 10))
            .expect("assigned");
        assert_eq!(assigned.queue_number, 3);
    }
}
