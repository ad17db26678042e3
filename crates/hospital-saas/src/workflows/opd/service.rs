use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

use super::domain::{
    CallNextOutcome, QueueDisplay, QueueToken, StatusUpdate, TokenReceipt, TokenRequest,
    TokenStatus,
};
use crate::events::{DomainEvent, EventDispatcher};
use crate::ids::{HospitalId, PractitionerId, PrincipalId, TokenId};
use crate::sequence::{format_identifier, next_after, SequenceKey, SequencePeriod, Series};
use crate::store::{require, HospitalStore};
use crate::tenancy::Principal;
use crate::workflows::{
    ensure_visible, load_principal, next_document_name, read_scope, row_count, write_tenant,
    ServiceError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextTokenNumber {
    pub token_number: u32,
    pub display_number: String,
}

/// Daily outpatient queue: token issue, calling and the waiting-room board.
pub struct OpdService<S> {
    store: Arc<S>,
    events: Arc<EventDispatcher>,
}

impl<S> OpdService<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<EventDispatcher>) -> Self {
        Self { store, events }
    }

    pub fn principal(&self, user: &PrincipalId) -> Result<Principal, ServiceError> {
        load_principal(&*self.store, user)
    }

    /// Issue the next token of the day for a patient.
    pub fn generate_token(
        &self,
        principal: &Principal,
        request: TokenRequest,
        now: NaiveDateTime,
    ) -> Result<TokenReceipt, ServiceError> {
        let patient = require(self.store.patients(), &request.patient)?;
        ensure_visible(&*self.store, principal, &patient)?;
        let tenant = write_tenant(&*self.store, principal, request.hospital)?
            .or_else(|| patient.hospital.clone());
        let token_date = request.token_date.unwrap_or_else(|| now.date());

        let practitioner_name = match request.practitioner.as_ref() {
            Some(id) => Some(require(self.store.practitioners(), id)?.practitioner_name),
            None => None,
        };

        let key = SequenceKey::new(
            Series::OpdToken,
            tenant.clone(),
            SequencePeriod::Day(token_date),
        );
        let tokens = self.store.tokens();
        let token_number = self.store.next_value(&key, &|| {
            let issued =
                tokens.count(&|token: &QueueToken| token.is_on(tenant.as_ref(), token_date))?;
            Ok(row_count(issued))
        })?;

        let ahead = tokens.count(&|token: &QueueToken| {
            token.is_on(tenant.as_ref(), token_date)
                && TokenStatus::QUEUED.contains(&token.status)
                && (request.practitioner.is_none() || token.practitioner == request.practitioner)
        })?;
        let queue_position = next_after(ahead);

        let id = TokenId::new(next_document_name(&*self.store, tokens, "TKN")?);
        let age = patient.dob.map(|dob| {
            let years = token_date.signed_duration_since(dob).num_days() / 365;
            format!("{years} years")
        });

        let token = tokens.insert(QueueToken {
            id,
            hospital: tenant,
            token_date,
            token_number,
            patient: patient.id.clone(),
            patient_name: patient.patient_name.clone(),
            mobile: patient.mobile.clone(),
            age,
            practitioner: request.practitioner,
            practitioner_name,
            department: request.department,
            queue_position,
            status: TokenStatus::Waiting,
            called_at: None,
            consultation_started: None,
            consultation_ended: None,
            created_at: now,
        })?;

        info!(
            token = %token.id,
            hospital = ?token.hospital,
            number = token.token_number,
            position = token.queue_position,
            "issued opd token"
        );
        let receipt = TokenReceipt {
            success: true,
            token_number: token.token_number,
            token_id: token.id.clone(),
            token_name: token.id.clone(),
            display_number: token.display_number(),
            queue_position: token.queue_position,
        };
        self.events.dispatch(&[DomainEvent::TokenCreated(token)]);
        Ok(receipt)
    }

    /// Call the lowest-numbered waiting token of the day.
    pub fn call_next_token(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
        now: NaiveDateTime,
    ) -> Result<CallNextOutcome, ServiceError> {
        let scope = write_tenant(&*self.store, principal, hospital)?;
        let today = now.date();
        let waiting = self.store.tokens().select(&|token: &QueueToken| {
            token.token_date == today
                && token.status == TokenStatus::Waiting
                && (scope.is_none() || token.hospital == scope)
        })?;

        let Some(mut token) = waiting.into_iter().min_by_key(|token| token.token_number) else {
            debug!(hospital = ?scope, "no waiting tokens to call");
            return Ok(CallNextOutcome::empty());
        };

        let previous = token.status;
        token.status = TokenStatus::Called;
        token.called_at = Some(now);
        self.store.tokens().update(token.clone())?;

        info!(token = %token.id, number = token.token_number, "called next token");
        let outcome = CallNextOutcome::called(&token);
        self.events.dispatch(&[
            DomainEvent::TokenStatusChanged {
                token: token.clone(),
                previous,
            },
            DomainEvent::TokenCalled(token),
        ]);
        Ok(outcome)
    }

    /// Apply a status by label. Unknown labels leave the token untouched.
    pub fn update_status(
        &self,
        principal: &Principal,
        id: &TokenId,
        status: &str,
        now: NaiveDateTime,
    ) -> Result<StatusUpdate, ServiceError> {
        let next = TokenStatus::parse(status)?;
        let token = self.transition(principal, id, next, now)?;
        Ok(StatusUpdate {
            success: true,
            status: token.status,
            message: format!("Token {} is now {}", token.display_number(), token.status),
        })
    }

    /// Send the patient to the consultation room queue.
    pub fn call_patient(
        &self,
        principal: &Principal,
        id: &TokenId,
        now: NaiveDateTime,
    ) -> Result<StatusUpdate, ServiceError> {
        let token = self.transition(principal, id, TokenStatus::InQueue, now)?;
        Ok(StatusUpdate {
            success: true,
            status: token.status,
            message: format!("Patient {} called", token.patient_name),
        })
    }

    pub fn start_consultation(
        &self,
        principal: &Principal,
        id: &TokenId,
        now: NaiveDateTime,
    ) -> Result<StatusUpdate, ServiceError> {
        let token = self.transition(principal, id, TokenStatus::WithDoctor, now)?;
        Ok(StatusUpdate {
            success: true,
            status: token.status,
            message: "Consultation started".to_string(),
        })
    }

    pub fn end_consultation(
        &self,
        principal: &Principal,
        id: &TokenId,
        now: NaiveDateTime,
    ) -> Result<StatusUpdate, ServiceError> {
        let token = self.transition(principal, id, TokenStatus::Completed, now)?;
        Ok(StatusUpdate {
            success: true,
            status: token.status,
            message: "Consultation completed".to_string(),
        })
    }

    fn transition(
        &self,
        principal: &Principal,
        id: &TokenId,
        next: TokenStatus,
        now: NaiveDateTime,
    ) -> Result<QueueToken, ServiceError> {
        let mut token = require(self.store.tokens(), id)?;
        ensure_visible(&*self.store, principal, &token)?;
        let previous = token.status;
        previous.ensure_transition(next)?;
        if previous == next {
            return Ok(token);
        }

        token.status = next;
        match next {
            TokenStatus::Called | TokenStatus::InQueue => token.called_at = Some(now),
            TokenStatus::WithDoctor => {
                token.consultation_started.get_or_insert(now);
            }
            TokenStatus::Completed => token.consultation_ended = Some(now),
            _ => {}
        }
        self.store.tokens().update(token.clone())?;

        info!(
            token = %token.id,
            from = previous.label(),
            to = next.label(),
            "opd token status changed"
        );
        self.events.dispatch(&[DomainEvent::TokenStatusChanged {
            token: token.clone(),
            previous,
        }]);
        Ok(token)
    }

    /// Today's open tokens for one practitioner, by number.
    pub fn practitioner_tokens(
        &self,
        principal: &Principal,
        practitioner: &PractitionerId,
        today: NaiveDate,
    ) -> Result<Vec<QueueToken>, ServiceError> {
        let filter = read_scope(&*self.store, principal, None)?;
        let mut tokens = self.store.tokens().select(&|token: &QueueToken| {
            token.token_date == today
                && token.practitioner.as_ref() == Some(practitioner)
                && TokenStatus::ON_DISPLAY.contains(&token.status)
                && filter.allows_record(token)
        })?;
        tokens.sort_by_key(|token| token.token_number);
        Ok(tokens)
    }

    /// Number the next token for `hospital` on `date` would receive.
    pub fn next_token_number(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
        date: NaiveDate,
    ) -> Result<NextTokenNumber, ServiceError> {
        let tenant = write_tenant(&*self.store, principal, hospital)?;
        let highest = self
            .store
            .tokens()
            .select(&|token: &QueueToken| token.is_on(tenant.as_ref(), date))?
            .into_iter()
            .map(|token| token.token_number)
            .max()
            .unwrap_or(0);
        let token_number = highest.saturating_add(1);
        Ok(NextTokenNumber {
            token_number,
            display_number: format_identifier("OPD", token_number, 3),
        })
    }

    /// Waiting-room board. Guests may read it; it carries names and status only.
    pub fn queue_display(
        &self,
        hospital: Option<&HospitalId>,
        today: NaiveDate,
    ) -> Result<QueueDisplay, ServiceError> {
        let mut active = self.store.tokens().select(&|token: &QueueToken| {
            token.token_date == today
                && TokenStatus::ON_DISPLAY.contains(&token.status)
                && (hospital.is_none() || token.hospital.as_ref() == hospital)
        })?;
        active.sort_by_key(|token| (token.queue_position, token.token_number));

        let mut current = None;
        let mut queue = Vec::new();
        for token in &active {
            if TokenStatus::CURRENT.contains(&token.status) {
                current = Some(token.display_view());
            } else {
                queue.push(token.display_view());
            }
        }

        let hospital_name = match hospital {
            Some(id) => self
                .store
                .hospitals()
                .fetch(id)?
                .map(|hospital| hospital.business_name)
                .unwrap_or_else(|| id.to_string()),
            None => "Hospital OPD".to_string(),
        };

        Ok(QueueDisplay {
            hospital_name,
            current,
            total_waiting: queue.len(),
            queue,
            date: today,
        })
    }
}
