use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::info;

use super::domain::{
    examination_code, ExaminationType, ExaminationTypeDraft, LabelCount, OrderRequest,
    OrderStatus, OrderStatusUpdate, RadiologyAck, RadiologyOrder, RadiologyResult,
    RadiologyStatistics, ResultFindings, ResultStatus, ScheduleRequest,
};
use super::report::{build_report, turnaround_hours, OrdersReport, ReportFilters};
use crate::events::{DomainEvent, EventDispatcher};
use crate::ids::{
    ExaminationTypeId, HospitalId, PatientId, PrincipalId, RadiologyOrderId, RadiologyResultId,
};
use crate::store::{require, HospitalStore, Record};
use crate::tenancy::{Principal, Role, TenantFilter};
use crate::workflows::{
    ensure_visible, load_principal, next_document_name, read_scope, round_to, write_tenant,
    DocStatus, ServiceError,
};

/// Roles allowed to move orders through the department.
const RADIOLOGY_STAFF: [Role; 3] = [
    Role::RadiologyTechnician,
    Role::Radiologist,
    Role::HospitalAdministrator,
];

/// Default look-back for department statistics.
pub const STATISTICS_WINDOW_DAYS: i64 = 30;

/// Radiology orders, scheduling and reporting.
pub struct RadiologyService<S> {
    store: Arc<S>,
    events: Arc<EventDispatcher>,
}

impl<S> RadiologyService<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<EventDispatcher>) -> Self {
        Self { store, events }
    }

    pub fn principal(&self, user: &PrincipalId) -> Result<Principal, ServiceError> {
        load_principal(&*self.store, user)
    }

    pub fn add_examination_type(
        &self,
        principal: &Principal,
        draft: ExaminationTypeDraft,
    ) -> Result<ExaminationType, ServiceError> {
        let name = draft.examination_name.trim();
        if name.is_empty() {
            return Err(ServiceError::MissingField("examination_name"));
        }
        if draft.fee < 0.0 {
            return Err(ServiceError::validation("Rate cannot be negative"));
        }
        let duration_minutes = u32::try_from(draft.duration_minutes)
            .map_err(|_| ServiceError::validation("Duration cannot be negative"))?;
        let hospital = write_tenant(&*self.store, principal, draft.hospital)?;
        let examination_code = draft
            .examination_code
            .filter(|code| !code.trim().is_empty())
            .unwrap_or_else(|| examination_code(draft.modality, name));

        Ok(self.store.examination_types().insert(ExaminationType {
            id: ExaminationTypeId::new(name),
            examination_name: name.to_string(),
            examination_code,
            modality: draft.modality,
            fee: draft.fee,
            duration_minutes,
            hospital,
        })?)
    }

    /// Place a draft order. The fee is captured from the examination type.
    pub fn create_order(
        &self,
        principal: &Principal,
        request: OrderRequest,
        now: NaiveDateTime,
    ) -> Result<RadiologyOrder, ServiceError> {
        let patient = require(self.store.patients(), &request.patient)?;
        ensure_visible(&*self.store, principal, &patient)?;
        let examination = require(self.store.examination_types(), &request.examination_type)?;
        let practitioner_name = match request.practitioner.as_ref() {
            Some(id) => Some(require(self.store.practitioners(), id)?.practitioner_name),
            None => None,
        };

        let order_date = request.order_date.unwrap_or_else(|| now.date());
        if request
            .scheduled_date
            .is_some_and(|scheduled| scheduled < order_date)
        {
            return Err(ServiceError::validation(
                "Scheduled date cannot be before order date",
            ));
        }
        let tenant = write_tenant(&*self.store, principal, request.hospital)?
            .or_else(|| patient.hospital.clone());

        let orders = self.store.radiology_orders();
        let id = RadiologyOrderId::new(next_document_name(&*self.store, orders, "RO")?);
        let order = orders.insert(RadiologyOrder {
            id,
            patient: patient.id,
            patient_name: patient.patient_name,
            patient_sex: patient.sex,
            examination_type: examination.id,
            modality: examination.modality,
            body_part: request.body_part,
            practitioner: request.practitioner,
            practitioner_name,
            priority: request.priority,
            status: OrderStatus::Draft,
            docstatus: DocStatus::Draft,
            order_date,
            order_time: now.time(),
            scheduled_date: request.scheduled_date,
            scheduled_time: request.scheduled_time,
            radiology_room: None,
            technician: None,
            clinical_history: request.clinical_history,
            rate: examination.fee,
            invoiced: false,
            sales_invoice: None,
            hospital: tenant,
            created_at: now,
        })?;
        info!(order = %order.id, title = %order.title(), "radiology order drafted");
        Ok(order)
    }

    pub fn submit_order(
        &self,
        principal: &Principal,
        id: &RadiologyOrderId,
    ) -> Result<RadiologyOrder, ServiceError> {
        let mut order = self.visible_order(principal, id)?;
        if order.docstatus != DocStatus::Draft {
            return Err(ServiceError::IllegalTransition {
                kind: RadiologyOrder::KIND,
                from: order.docstatus.label(),
                to: DocStatus::Submitted.label(),
            });
        }
        order.docstatus = DocStatus::Submitted;
        order.status = OrderStatus::Ordered;
        self.store.radiology_orders().update(order.clone())?;

        info!(order = %order.id, priority = %order.priority, "radiology order submitted");
        self.events
            .dispatch(&[DomainEvent::RadiologyOrderSubmitted(order.clone())]);
        // Listeners may have attached an invoice.
        Ok(require(self.store.radiology_orders(), &order.id)?)
    }

    pub fn cancel_order(
        &self,
        principal: &Principal,
        id: &RadiologyOrderId,
    ) -> Result<RadiologyOrder, ServiceError> {
        let mut order = self.visible_order(principal, id)?;
        if !order.docstatus.is_submitted() {
            return Err(ServiceError::IllegalTransition {
                kind: RadiologyOrder::KIND,
                from: order.docstatus.label(),
                to: DocStatus::Cancelled.label(),
            });
        }
        order.docstatus = DocStatus::Cancelled;
        order.status = OrderStatus::Cancelled;
        self.store.radiology_orders().update(order.clone())?;

        info!(order = %order.id, "radiology order cancelled");
        self.events
            .dispatch(&[DomainEvent::RadiologyOrderCancelled(order.clone())]);
        Ok(order)
    }

    /// Move a submitted order along the transition table.
    pub fn update_order_status(
        &self,
        principal: &Principal,
        id: &RadiologyOrderId,
        status: &str,
    ) -> Result<OrderStatusUpdate, ServiceError> {
        ensure_staff(principal)?;
        let next = OrderStatus::parse(status)?;
        let mut order = self.visible_order(principal, id)?;
        ensure_submitted(&order)?;
        let previous = order.status;
        previous.ensure_transition(next)?;

        order.status = next;
        self.store.radiology_orders().update(order.clone())?;
        self.events
            .dispatch(&[DomainEvent::RadiologyOrderStatusChanged { order, previous }]);
        Ok(OrderStatusUpdate {
            success: true,
            status: next,
        })
    }

    /// Book a slot, rejecting a room already taken at that date and time.
    pub fn schedule_order(
        &self,
        principal: &Principal,
        id: &RadiologyOrderId,
        request: ScheduleRequest,
    ) -> Result<RadiologyAck, ServiceError> {
        ensure_staff(principal)?;
        let mut order = self.visible_order(principal, id)?;
        ensure_submitted(&order)?;
        if !matches!(order.status, OrderStatus::Ordered | OrderStatus::Scheduled) {
            return Err(ServiceError::validation(format!(
                "Cannot schedule order with status {}",
                order.status
            )));
        }

        let previous = order.status;
        order.scheduled_date = Some(request.scheduled_date);
        order.scheduled_time = Some(request.scheduled_time);
        if request.radiology_room.is_some() {
            order.radiology_room = request.radiology_room;
        }
        if request.technician.is_some() {
            order.technician = request.technician;
        }

        if order.radiology_room.is_some() {
            let candidate = order.clone();
            let conflicts = self
                .store
                .radiology_orders()
                .select(&|other: &RadiologyOrder| candidate.collides_with(other))?;
            if let Some(conflict) = conflicts.first() {
                return Err(ServiceError::Conflict(format!(
                    "Scheduling conflict: Room {} is booked for {} at this time",
                    order.radiology_room.as_deref().unwrap_or_default(),
                    conflict.patient_name
                )));
            }
        }

        order.status = OrderStatus::Scheduled;
        self.store.radiology_orders().update(order.clone())?;
        if previous != OrderStatus::Scheduled {
            self.events
                .dispatch(&[DomainEvent::RadiologyOrderStatusChanged { order, previous }]);
        }
        Ok(RadiologyAck {
            success: true,
            message: "Order scheduled successfully".to_string(),
        })
    }

    pub fn start_examination(
        &self,
        principal: &Principal,
        id: &RadiologyOrderId,
    ) -> Result<OrderStatusUpdate, ServiceError> {
        ensure_staff(principal)?;
        let mut order = self.visible_order(principal, id)?;
        if !matches!(order.status, OrderStatus::Ordered | OrderStatus::Scheduled) {
            return Err(ServiceError::validation(format!(
                "Cannot start examination with status {}",
                order.status
            )));
        }
        let previous = order.status;
        order.status = OrderStatus::InProgress;
        self.store.radiology_orders().update(order.clone())?;

        self.events.dispatch(&[
            DomainEvent::RadiologyOrderStatusChanged {
                order: order.clone(),
                previous,
            },
            DomainEvent::RadiologyExamStarted(order),
        ]);
        Ok(OrderStatusUpdate {
            success: true,
            status: OrderStatus::InProgress,
        })
    }

    /// Draft a result carrying the order's patient and examination.
    pub fn create_result(
        &self,
        principal: &Principal,
        order_id: &RadiologyOrderId,
        now: NaiveDateTime,
    ) -> Result<RadiologyResult, ServiceError> {
        if !(principal.is_unrestricted() || principal.has_any_role(&RADIOLOGY_STAFF)) {
            return Err(ServiceError::permission("Not permitted"));
        }
        let order = self.visible_order(principal, order_id)?;
        if order.status == OrderStatus::Completed {
            return Err(ServiceError::Conflict(
                "Result already exists for this order".to_string(),
            ));
        }
        if !order.docstatus.is_submitted() {
            return Err(ServiceError::validation("Radiology Order must be submitted"));
        }

        let results = self.store.radiology_results();
        let id = RadiologyResultId::new(next_document_name(&*self.store, results, "RR")?);
        Ok(results.insert(RadiologyResult {
            id,
            radiology_order: Some(order.id),
            patient: order.patient,
            patient_name: order.patient_name,
            examination_type: order.examination_type,
            modality: order.modality,
            practitioner: order.practitioner,
            practitioner_name: order.practitioner_name,
            examination_date: now.date(),
            examination_time: now.time(),
            findings: None,
            impression: None,
            status: ResultStatus::Draft,
            docstatus: DocStatus::Draft,
            reported_at: None,
            approved_by: None,
            approval_date: None,
            hospital: order.hospital,
            created_at: now,
        })?)
    }

    /// Report the findings; the order completes and the referrer is told.
    pub fn submit_result(
        &self,
        principal: &Principal,
        id: &RadiologyResultId,
        findings: ResultFindings,
        now: NaiveDateTime,
    ) -> Result<RadiologyResult, ServiceError> {
        let mut result = self.visible_result(principal, id)?;
        if result.docstatus != DocStatus::Draft {
            return Err(ServiceError::IllegalTransition {
                kind: RadiologyResult::KIND,
                from: result.docstatus.label(),
                to: DocStatus::Submitted.label(),
            });
        }
        if findings.findings.is_some() {
            result.findings = findings.findings;
        }
        if findings.impression.is_some() {
            result.impression = findings.impression;
        }
        result.docstatus = DocStatus::Submitted;
        result.status = ResultStatus::PendingReview;
        result.reported_at = Some(now);
        self.store.radiology_results().update(result.clone())?;

        let mut events = Vec::with_capacity(2);
        if let Some(order) = self.set_order_status(&result, OrderStatus::Completed)? {
            events.push(order);
        }
        events.push(DomainEvent::RadiologyResultSubmitted(result.clone()));
        info!(result = %result.id, "radiology result reported");
        self.events.dispatch(&events);
        Ok(result)
    }

    /// Withdraw a submitted result; the order goes back to In Progress.
    pub fn cancel_result(
        &self,
        principal: &Principal,
        id: &RadiologyResultId,
    ) -> Result<RadiologyResult, ServiceError> {
        let mut result = self.visible_result(principal, id)?;
        if !result.docstatus.is_submitted() {
            return Err(ServiceError::IllegalTransition {
                kind: RadiologyResult::KIND,
                from: result.docstatus.label(),
                to: DocStatus::Cancelled.label(),
            });
        }
        result.docstatus = DocStatus::Cancelled;
        self.store.radiology_results().update(result.clone())?;
        if let Some(event) = self.set_order_status(&result, OrderStatus::InProgress)? {
            self.events.dispatch(&[event]);
        }
        Ok(result)
    }

    pub fn approve_result(
        &self,
        principal: &Principal,
        id: &RadiologyResultId,
        now: NaiveDateTime,
    ) -> Result<RadiologyAck, ServiceError> {
        if !(principal.is_unrestricted() || principal.has_role(Role::Radiologist)) {
            return Err(ServiceError::permission("Not permitted"));
        }
        let mut result = self.visible_result(principal, id)?;
        if !result.docstatus.is_submitted() {
            return Err(ServiceError::validation(
                "Result must be submitted before approval",
            ));
        }
        if result.status == ResultStatus::Approved {
            return Err(ServiceError::validation("Result is already approved"));
        }

        result.status = ResultStatus::Approved;
        result.approved_by = Some(principal.id.clone());
        result.approval_date = Some(now);
        self.store.radiology_results().update(result.clone())?;
        info!(result = %result.id, approved_by = %principal.id, "radiology result approved");
        Ok(RadiologyAck {
            success: true,
            message: "Result approved successfully".to_string(),
        })
    }

    /// Pending submitted orders, STAT first. Open to guests.
    pub fn radiology_queue(
        &self,
        hospital: Option<&HospitalId>,
    ) -> Result<Vec<RadiologyOrder>, ServiceError> {
        let mut orders = self.store.radiology_orders().select(&|order: &RadiologyOrder| {
            order.is_pending() && (hospital.is_none() || order.hospital.as_ref() == hospital)
        })?;
        orders.sort_by_key(|order| (order.priority.rank(), order.created_at));
        Ok(orders)
    }

    /// Pending orders booked for today, unscheduled, or placed today.
    pub fn today_queue(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
        today: NaiveDate,
    ) -> Result<Vec<RadiologyOrder>, ServiceError> {
        let scope = read_scope(&*self.store, principal, hospital)?;
        let mut orders = self.store.radiology_orders().select(&|order: &RadiologyOrder| {
            order.is_pending()
                && scope.allows_record(order)
                && (order.scheduled_date.map_or(true, |date| date == today)
                    || order.order_date == today)
        })?;
        orders.sort_by_key(|order| (order.priority.rank(), order.order_date, order.order_time));
        Ok(orders)
    }

    pub fn statistics(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<RadiologyStatistics, ServiceError> {
        let scope = read_scope(&*self.store, principal, hospital)?;
        let from_date = from_date.unwrap_or(today - Duration::days(STATISTICS_WINDOW_DAYS));
        let to_date = to_date.unwrap_or(today);
        let orders = self.store.radiology_orders().select(&|order: &RadiologyOrder| {
            order.docstatus.is_submitted()
                && order.order_date >= from_date
                && order.order_date <= to_date
                && scope.allows_record(order)
        })?;
        let results = self.submitted_results(&scope)?;

        let mut status_breakdown: Vec<LabelCount> = Vec::new();
        let mut modality_breakdown: Vec<LabelCount> = Vec::new();
        for order in &orders {
            tally(&mut status_breakdown, order.status.label());
            tally(&mut modality_breakdown, order.modality.label());
        }
        modality_breakdown.sort_by(|a, b| b.count.cmp(&a.count));

        let turnarounds: Vec<f64> = orders
            .iter()
            .flat_map(|order| {
                results
                    .iter()
                    .filter(move |result| result.radiology_order.as_ref() == Some(&order.id))
                    .map(move |result| turnaround_hours(order, result))
            })
            .collect();
        let avg_turnaround_hours = if turnarounds.is_empty() {
            0.0
        } else {
            round_to(turnarounds.iter().sum::<f64>() / turnarounds.len() as f64, 1)
        };

        Ok(RadiologyStatistics {
            total_orders: orders.len(),
            status_breakdown,
            modality_breakdown,
            pending_results: results
                .iter()
                .filter(|result| result.status == ResultStatus::PendingReview)
                .count(),
            avg_turnaround_hours,
        })
    }

    /// Submitted results for a patient, newest examination first.
    pub fn patient_history(
        &self,
        principal: &Principal,
        patient: &PatientId,
    ) -> Result<Vec<RadiologyResult>, ServiceError> {
        let patient = require(self.store.patients(), patient)?;
        ensure_visible(&*self.store, principal, &patient)?;
        let scope = read_scope(&*self.store, principal, None)?;
        let mut results = self.store.radiology_results().select(&|result: &RadiologyResult| {
            result.patient == patient.id
                && result.docstatus.is_submitted()
                && scope.allows_record(result)
        })?;
        results.sort_by(|a, b| b.examined_at().cmp(&a.examined_at()));
        Ok(results)
    }

    pub fn orders_report(
        &self,
        principal: &Principal,
        filters: &ReportFilters,
    ) -> Result<OrdersReport, ServiceError> {
        let scope = read_scope(&*self.store, principal, filters.hospital.clone())?;
        let orders = self.store.radiology_orders().select(&|order: &RadiologyOrder| {
            filters.matches(order) && scope.allows_record(order)
        })?;
        let results = self.submitted_results(&scope)?;
        Ok(build_report(orders, &results))
    }

    fn submitted_results(
        &self,
        scope: &TenantFilter,
    ) -> Result<Vec<RadiologyResult>, ServiceError> {
        Ok(self
            .store
            .radiology_results()
            .select(&|result: &RadiologyResult| {
                result.docstatus.is_submitted() && scope.allows_record(result)
            })?)
    }

    fn set_order_status(
        &self,
        result: &RadiologyResult,
        status: OrderStatus,
    ) -> Result<Option<DomainEvent>, ServiceError> {
        let Some(order_id) = result.radiology_order.as_ref() else {
            return Ok(None);
        };
        let Some(mut order) = self.store.radiology_orders().fetch(order_id)? else {
            return Ok(None);
        };
        let previous = order.status;
        if previous == status {
            return Ok(None);
        }
        order.status = status;
        self.store.radiology_orders().update(order.clone())?;
        Ok(Some(DomainEvent::RadiologyOrderStatusChanged { order, previous }))
    }

    fn visible_order(
        &self,
        principal: &Principal,
        id: &RadiologyOrderId,
    ) -> Result<RadiologyOrder, ServiceError> {
        let order = require(self.store.radiology_orders(), id)?;
        ensure_visible(&*self.store, principal, &order)?;
        Ok(order)
    }

    fn visible_result(
        &self,
        principal: &Principal,
        id: &RadiologyResultId,
    ) -> Result<RadiologyResult, ServiceError> {
        let result = require(self.store.radiology_results(), id)?;
        ensure_visible(&*self.store, principal, &result)?;
        Ok(result)
    }
}

fn ensure_staff(principal: &Principal) -> Result<(), ServiceError> {
    if principal.is_unrestricted() || principal.has_any_role(&RADIOLOGY_STAFF) {
        Ok(())
    } else {
        Err(ServiceError::permission("Not permitted"))
    }
}

fn ensure_submitted(order: &RadiologyOrder) -> Result<(), ServiceError> {
    if order.docstatus.is_submitted() {
        Ok(())
    } else {
        Err(ServiceError::validation("Order must be submitted"))
    }
}

fn tally(counts: &mut Vec<LabelCount>, label: &str) {
    match counts.iter_mut().find(|entry| entry.label == label) {
        Some(entry) => entry.count += 1,
        None => counts.push(LabelCount {
            label: label.to_string(),
            count: 1,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::workflows::radiology::domain::{Modality, Priority};
    use crate::workflows::registry::Patient;
    use chrono::NaiveTime;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("timestamp")
    }

    fn admin() -> Principal {
        Principal::new(Principal::ADMINISTRATOR, "Administrator")
    }

    fn service() -> RadiologyService<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store
            .patients()
            .insert(Patient::fixture("PAT-00001", Some("H1")))
            .expect("patient");
        let mut other = Patient::fixture("PAT-00002", Some("H1"));
        other.patient_name = "Ravi Kumar".to_string();
        store.patients().insert(other).expect("patient");
        let radiology = RadiologyService::new(store, Arc::new(EventDispatcher::new()));
        radiology
            .add_examination_type(
                &admin(),
                ExaminationTypeDraft {
                    examination_name: "Chest PA".to_string(),
                    modality: Modality::XRay,
                    examination_code: None,
                    fee: 450.0,
                    duration_minutes: 15,
                    hospital: None,
                },
            )
            .expect("examination type");
        radiology
    }

    fn order_for(
        radiology: &RadiologyService<MemoryStore>,
        patient: &str,
        priority: Priority,
        now: NaiveDateTime,
    ) -> RadiologyOrder {
        let order = radiology
            .create_order(
                &admin(),
                OrderRequest {
                    patient: PatientId::from(patient),
                    examination_type: ExaminationTypeId::from("Chest PA"),
                    practitioner: None,
                    priority,
                    body_part: None,
                    clinical_history: None,
                    order_date: None,
                    scheduled_date: None,
                    scheduled_time: None,
                    hospital: None,
                },
                now,
            )
            .expect("order");
        radiology.submit_order(&admin(), &order.id).expect("submitted")
    }

    #[test]
    fn negative_fee_or_duration_is_rejected() {
        let radiology = service();
        let draft = |fee: f64, duration_minutes: i64| ExaminationTypeDraft {
            examination_name: "Head CT".to_string(),
            modality: Modality::CtScan,
            examination_code: None,
            fee,
            duration_minutes,
            hospital: None,
        };
        assert!(radiology.add_examination_type(&admin(), draft(-1.0, 10)).is_err());
        assert!(radiology.add_examination_type(&admin(), draft(10.0, -5)).is_err());
        let exam = radiology
            .add_examination_type(&admin(), draft(1500.0, 20))
            .expect("created");
        assert_eq!(exam.examination_code, "CT-HC");
    }

    #[test]
    fn illegal_transition_leaves_status_unchanged() {
        let radiology = service();
        let order = order_for(&radiology, "PAT-00001", Priority::Routine, at(1, 9));
        assert_eq!(order.status, OrderStatus::Ordered);
        assert_eq!(order.rate, 450.0);

        let outcome = radiology.update_order_status(&admin(), &order.id, "Completed");
        assert!(matches!(outcome, Err(ServiceError::IllegalTransition { .. })));
        let stored = require(radiology.store.radiology_orders(), &order.id).expect("order");
        assert_eq!(stored.status, OrderStatus::Ordered);

        let clerk = Principal::new("clerk@h1.test", "Clerk").with_roles([Role::Receptionist]);
        assert!(matches!(
            radiology.update_order_status(&clerk, &order.id, "Scheduled"),
            Err(ServiceError::PermissionDenied(_))
        ));
    }

    #[test]
    fn room_double_booking_is_a_conflict() {
        let radiology = service();
        let first = order_for(&radiology, "PAT-00001", Priority::Routine, at(1, 9));
        let second = order_for(&radiology, "PAT-00002", Priority::Routine, at(1, 9));
        let slot = || ScheduleRequest {
            scheduled_date: at(2, 0).date(),
            scheduled_time: NaiveTime::from_hms_opt(11, 0, 0).expect("time"),
            radiology_room: Some("XR-1".to_string()),
            technician: None,
        };

        radiology.schedule_order(&admin(), &first.id, slot()).expect("scheduled");
        match radiology.schedule_order(&admin(), &second.id, slot()) {
            Err(ServiceError::Conflict(message)) => assert_eq!(
                message,
                "Scheduling conflict: Room XR-1 is booked for Asha Rao at this time"
            ),
            other => panic!("expected conflict, got {other:?}"),
        }
        let stored = require(radiology.store.radiology_orders(), &second.id).expect("order");
        assert_eq!(stored.status, OrderStatus::Ordered);
    }

    #[test]
    fn result_lifecycle_completes_and_reopens_the_order() {
        let radiology = service();
        let order = order_for(&radiology, "PAT-00001", Priority::Stat, at(1, 9));
        radiology.start_examination(&admin(), &order.id).expect("started");

        let result = radiology
            .create_result(&admin(), &order.id, at(1, 12))
            .expect("draft result");
        let reported = radiology
            .submit_result(
                &admin(),
                &result.id,
                ResultFindings {
                    findings: Some("Clear lung fields".to_string()),
                    impression: Some("Normal".to_string()),
                },
                at(1, 13),
            )
            .expect("submitted");
        assert_eq!(reported.status, ResultStatus::PendingReview);
        let completed = require(radiology.store.radiology_orders(), &order.id).expect("order");
        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(radiology.create_result(&admin(), &order.id, at(1, 14)).is_err());

        let technician =
            Principal::new("tech@h1.test", "Tech").with_roles([Role::RadiologyTechnician]);
        assert!(radiology.approve_result(&technician, &result.id, at(1, 15)).is_err());
        radiology
            .approve_result(&admin(), &result.id, at(1, 15))
            .expect("approved");
        assert!(radiology.approve_result(&admin(), &result.id, at(1, 16)).is_err());

        let stats = radiology
            .statistics(&admin(), None, None, None, at(2, 0).date())
            .expect("stats");
        assert_eq!(stats.total_orders, 1);
        assert_eq!(stats.avg_turnaround_hours, 3.0);
        assert_eq!(stats.pending_results, 0);

        radiology.cancel_result(&admin(), &result.id).expect("cancelled");
        let reopened = require(radiology.store.radiology_orders(), &order.id).expect("order");
        assert_eq!(reopened.status, OrderStatus::InProgress);
        assert!(radiology
            .patient_history(&admin(), &PatientId::from("PAT-00001"))
            .expect("history")
            .is_empty());
    }

    #[test]
    fn queue_puts_stat_orders_first() {
        let radiology = service();
        let routine = order_for(&radiology, "PAT-00001", Priority::Routine, at(1, 8));
        let stat = order_for(&radiology, "PAT-00002", Priority::Stat, at(1, 9));

        let queue = radiology.radiology_queue(None).expect("queue");
        let ids: Vec<_> = queue.iter().map(|order| order.id.clone()).collect();
        assert_eq!(ids, vec![stat.id.clone(), routine.id.clone()]);

        radiology.cancel_order(&admin(), &stat.id).expect("cancelled");
        let today = radiology
            .today_queue(&admin(), None, at(1, 0).date())
            .expect("today");
        assert_eq!(today.len(), 1);
    }
}
