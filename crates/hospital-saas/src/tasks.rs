//! Periodic housekeeping: appointment reminders, subscription refresh, the
//! pending-payment sweep and the weekly per-hospital summary.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Days, IsoWeek, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::HospitalSettings;
use crate::events::{Channel, Notifier, NotifyError, OutboundMessage};
use crate::ids::HospitalId;
use crate::store::{HospitalStore, RepositoryError};
use crate::tenancy::{Hospital, SubscriptionStatus};
use crate::workflows::appointments::{Appointment, AppointmentService};
use crate::workflows::billing::Invoice;
use crate::workflows::registry::Patient;
use crate::workflows::ServiceError;

const SUMMARY_WINDOW_DAYS: u64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Daily,
    Hourly,
    Weekly,
}

/// Tracks the last period each job ran in. Every job is due on the first tick.
#[derive(Debug, Default, Clone)]
pub struct Schedule {
    last_daily: Option<NaiveDate>,
    last_hourly: Option<(NaiveDate, u32)>,
    last_weekly: Option<IsoWeek>,
}

impl Schedule {
    /// Jobs whose period has rolled over since their last run; marks them run.
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<TaskKind> {
        let mut due = Vec::new();
        let today = now.date();
        if self.last_daily != Some(today) {
            self.last_daily = Some(today);
            due.push(TaskKind::Daily);
        }
        let hour = (today, now.hour());
        if self.last_hourly != Some(hour) {
            self.last_hourly = Some(hour);
            due.push(TaskKind::Hourly);
        }
        let week = today.iso_week();
        if self.last_weekly != Some(week) {
            self.last_weekly = Some(week);
            due.push(TaskKind::Weekly);
        }
        due
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReminderRun {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionChange {
    pub hospital: HospitalId,
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PendingSweep {
    pub count: usize,
    pub outstanding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklySummary {
    pub hospital: HospitalId,
    pub business_name: String,
    pub new_patients: usize,
    pub appointments: usize,
    pub invoices: usize,
    pub revenue: f64,
}

pub struct ScheduledTasks<S> {
    store: Arc<S>,
    appointments: Arc<AppointmentService<S>>,
    notifier: Arc<dyn Notifier>,
    settings: HospitalSettings,
}

impl<S> ScheduledTasks<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        appointments: Arc<AppointmentService<S>>,
        notifier: Arc<dyn Notifier>,
        settings: HospitalSettings,
    ) -> Self {
        Self {
            store,
            appointments,
            notifier,
            settings,
        }
    }

    /// Run the due jobs for one tick. A failing job is logged and the rest
    /// still run.
    pub fn run_due(&self, schedule: &mut Schedule, now: NaiveDateTime) -> Vec<TaskKind> {
        let due = schedule.due(now);
        for kind in &due {
            let outcome = match kind {
                TaskKind::Daily => self.daily(now.date()),
                TaskKind::Hourly => self.pending_payment_sweep().map(|_| ()),
                TaskKind::Weekly => self.weekly_summary(now.date()).map(|_| ()),
            };
            if let Err(err) = outcome {
                error!(task = ?kind, error = %err, "scheduled task failed");
            }
        }
        due
    }

    fn daily(&self, today: NaiveDate) -> Result<(), TaskError> {
        self.send_appointment_reminders(today)?;
        self.refresh_subscriptions(today)?;
        Ok(())
    }

    /// E-mail every patient with a confirmed appointment tomorrow.
    pub fn send_appointment_reminders(&self, today: NaiveDate) -> Result<ReminderRun, TaskError> {
        let mut run = ReminderRun::default();
        let Some(tomorrow) = today.checked_add_days(Days::new(1)) else {
            return Ok(run);
        };
        if !self.settings.enable_email_notifications {
            return Ok(run);
        }

        for appointment in self.appointments.confirmed_on(tomorrow)? {
            let email = self
                .store
                .patients()
                .fetch(&appointment.patient)?
                .and_then(|patient| patient.email)
                .filter(|email| !email.is_empty());
            let Some(email) = email else {
                run.skipped += 1;
                continue;
            };
            match self.notifier.send(reminder(&appointment, email)) {
                Ok(()) => run.sent += 1,
                Err(err) => {
                    warn!(appointment = %appointment.id, error = %err, "reminder not delivered");
                    run.failed += 1;
                }
            }
        }

        info!(
            date = %tomorrow,
            sent = run.sent,
            skipped = run.skipped,
            failed = run.failed,
            "appointment reminders sent"
        );
        Ok(run)
    }

    /// Re-derive each hospital's subscription status and save the ones that
    /// moved.
    pub fn refresh_subscriptions(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<SubscriptionChange>, TaskError> {
        let mut changes = Vec::new();
        for mut hospital in self.store.hospitals().select(&|_: &Hospital| true)? {
            let from = hospital.subscription_status;
            hospital.validate(today);
            if hospital.subscription_status == from {
                continue;
            }
            info!(
                hospital = %hospital.id,
                from = ?from,
                to = ?hospital.subscription_status,
                "subscription status changed"
            );
            changes.push(SubscriptionChange {
                hospital: hospital.id.clone(),
                from,
                to: hospital.subscription_status,
            });
            self.store.hospitals().update(hospital)?;
        }
        Ok(changes)
    }

    /// Submitted invoices still carrying an outstanding amount, across all
    /// hospitals.
    pub fn pending_payment_sweep(&self) -> Result<PendingSweep, TaskError> {
        let pending = self.store.invoices().select(&|invoice: &Invoice| {
            invoice.docstatus.is_submitted() && invoice.outstanding_amount > 0.0
        })?;
        let sweep = PendingSweep {
            count: pending.len(),
            outstanding: pending
                .iter()
                .map(|invoice| invoice.outstanding_amount)
                .sum(),
        };
        info!(
            count = sweep.count,
            outstanding = sweep.outstanding,
            "pending payment sweep"
        );
        Ok(sweep)
    }

    /// Activity over the seven days before `today`, one entry per hospital.
    pub fn weekly_summary(&self, today: NaiveDate) -> Result<Vec<WeeklySummary>, TaskError> {
        let from = today
            .checked_sub_days(Days::new(SUMMARY_WINDOW_DAYS))
            .unwrap_or(today);
        let in_window = |date: NaiveDate| date >= from && date < today;

        let mut summaries: BTreeMap<HospitalId, WeeklySummary> = self
            .store
            .hospitals()
            .select(&|_: &Hospital| true)?
            .into_iter()
            .map(|hospital| {
                let summary = WeeklySummary {
                    hospital: hospital.id.clone(),
                    business_name: hospital.business_name,
                    new_patients: 0,
                    appointments: 0,
                    invoices: 0,
                    revenue: 0.0,
                };
                (hospital.id, summary)
            })
            .collect();

        for patient in self
            .store
            .patients()
            .select(&|patient: &Patient| in_window(patient.created_at.date()))?
        {
            if let Some(entry) = patient.hospital.and_then(|h| summaries.get_mut(&h)) {
                entry.new_patients += 1;
            }
        }
        for appointment in self
            .store
            .appointments()
            .select(&|appointment: &Appointment| in_window(appointment.appointment_date))?
        {
            if let Some(entry) = appointment.hospital.and_then(|h| summaries.get_mut(&h)) {
                entry.appointments += 1;
            }
        }
        for invoice in self.store.invoices().select(&|invoice: &Invoice| {
            invoice.docstatus.is_submitted() && in_window(invoice.posting_date)
        })? {
            if let Some(entry) = invoice.hospital.and_then(|h| summaries.get_mut(&h)) {
                entry.invoices += 1;
                entry.revenue += invoice.grand_total;
            }
        }

        let summaries: Vec<WeeklySummary> = summaries.into_values().collect();
        for summary in &summaries {
            info!(
                hospital = %summary.hospital,
                new_patients = summary.new_patients,
                appointments = summary.appointments,
                invoices = summary.invoices,
                revenue = summary.revenue,
                week_starting = %from,
                "weekly summary"
            );
        }
        Ok(summaries)
    }
}

fn reminder(appointment: &Appointment, email: String) -> OutboundMessage {
    let doctor = appointment
        .practitioner_name
        .clone()
        .unwrap_or_else(|| "your doctor".to_string());
    OutboundMessage {
        channel: Channel::Email,
        recipient: email,
        subject: Some(format!(
            "Appointment Reminder - {}",
            appointment.appointment_date
        )),
        body: format!(
            "Dear {},\n\nThis is a reminder of your appointment tomorrow ({}) at {} with {doctor}.\n\n\
             Appointment ID: {}\n\nPlease arrive 15 minutes before your scheduled time.\n\n\
             Best regards,\nHospital Team",
            appointment.patient_name,
            appointment.appointment_date,
            appointment.appointment_time.format("%H:%M"),
            appointment.id,
        ),
    }
}

/// Drive the jobs off a fixed tick until the task is dropped.
pub async fn run_scheduler<S>(tasks: Arc<ScheduledTasks<S>>, tick: Duration)
where
    S: HospitalStore + 'static,
{
    let mut ticker = interval(tick);
    let mut schedule = Schedule::default();
    info!(tick_secs = tick.as_secs(), "scheduler started");

    loop {
        ticker.tick().await;
        let ran = tasks.run_due(&mut schedule, crate::http::now());
        if !ran.is_empty() {
            info!(tasks = ?ran, "scheduled tasks ran");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventDispatcher, MemoryNotifier};
    use crate::ids::{AppointmentId, CustomerId, InvoiceId, PatientId};
    use crate::store::MemoryStore;
    use crate::workflows::appointments::AppointmentStatus;
    use crate::workflows::billing::ServiceType;
    use crate::workflows::DocStatus;
    use chrono::NaiveTime;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).expect("date")
    }

    fn at(d: u32, hour: u32) -> NaiveDateTime {
        day(d).and_hms_opt(hour, 15, 0).expect("timestamp")
    }

    fn fixture() -> (ScheduledTasks<MemoryStore>, Arc<MemoryStore>, Arc<MemoryNotifier>) {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(MemoryNotifier::default());
        let appointments = Arc::new(AppointmentService::new(
            store.clone(),
            Arc::new(EventDispatcher::new()),
        ));
        let tasks = ScheduledTasks::new(
            store.clone(),
            appointments,
            notifier.clone(),
            HospitalSettings::default(),
        );
        (tasks, store, notifier)
    }

    fn appointment(id: &str, date: NaiveDate, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: AppointmentId::from(id),
            patient: PatientId::from("PAT-00001"),
            patient_name: "Asha Rao".to_string(),
            practitioner: None,
            practitioner_name: Some("Dr. Sen".to_string()),
            department: None,
            appointment_date: date,
            appointment_time: NaiveTime::from_hms_opt(10, 30, 0).expect("time"),
            status,
            docstatus: if status == AppointmentStatus::Open {
                DocStatus::Draft
            } else {
                DocStatus::Submitted
            },
            hospital: Some(HospitalId::from("H1")),
            created_at: at(1, 9),
        }
    }

    fn invoice(id: &str, posted: NaiveDate, total: f64, outstanding: f64) -> Invoice {
        Invoice {
            id: InvoiceId::from(id),
            customer: CustomerId::from("CUST-00001"),
            patient: PatientId::from("PAT-00001"),
            hospital: Some(HospitalId::from("H1")),
            service_type: ServiceType::OpdConsultation,
            reference: None,
            items: Vec::new(),
            grand_total: total,
            outstanding_amount: outstanding,
            docstatus: DocStatus::Submitted,
            posting_date: posted,
            due_date: posted,
            created_at: posted.and_hms_opt(12, 0, 0).expect("timestamp"),
        }
    }

    #[test]
    fn schedule_fires_each_job_once_per_period() {
        let mut schedule = Schedule::default();
        assert_eq!(
            schedule.due(at(6, 8)),
            vec![TaskKind::Daily, TaskKind::Hourly, TaskKind::Weekly]
        );
        assert!(schedule.due(at(6, 8)).is_empty());
        assert_eq!(schedule.due(at(6, 9)), vec![TaskKind::Hourly]);
        assert_eq!(schedule.due(at(7, 9)), vec![TaskKind::Daily, TaskKind::Hourly]);
        // 2024-05-13 is the following Monday.
        assert_eq!(
            schedule.due(at(13, 9)),
            vec![TaskKind::Daily, TaskKind::Hourly, TaskKind::Weekly]
        );
    }

    #[test]
    fn reminders_go_to_tomorrows_confirmed_patients_with_email() {
        let (tasks, store, notifier) = fixture();
        let mut patient = Patient::fixture("PAT-00001", Some("H1"));
        patient.email = Some("asha@example.test".to_string());
        store.patients().insert(patient).expect("patient");
        for record in [
            appointment("APT-1", day(11), AppointmentStatus::Scheduled),
            appointment("APT-2", day(11), AppointmentStatus::Open),
            appointment("APT-3", day(12), AppointmentStatus::Scheduled),
        ] {
            store.appointments().insert(record).expect("appointment");
        }

        let run = tasks.send_appointment_reminders(day(10)).expect("reminders");
        assert_eq!(run.sent, 1);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "asha@example.test");
        assert_eq!(
            sent[0].subject.as_deref(),
            Some("Appointment Reminder - 2024-05-11")
        );
        assert!(sent[0].body.contains("10:30"));
    }

    #[test]
    fn patients_without_email_are_skipped() {
        let (tasks, store, notifier) = fixture();
        store
            .patients()
            .insert(Patient::fixture("PAT-00001", Some("H1")))
            .expect("patient");
        store
            .appointments()
            .insert(appointment("APT-1", day(11), AppointmentStatus::Scheduled))
            .expect("appointment");

        let run = tasks.send_appointment_reminders(day(10)).expect("reminders");
        assert_eq!(run.skipped, 1);
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn lapsed_subscriptions_expire() {
        let (tasks, store, _) = fixture();
        let mut lapsed = Hospital::named(HospitalId::from("H1"), "City Care");
        lapsed.subscription_status = SubscriptionStatus::Active;
        lapsed.subscription_start = Some(day(1) - Days::new(365));
        lapsed.subscription_end = Some(day(1));
        let mut running = Hospital::named(HospitalId::from("H2"), "Lake View");
        running.subscription_status = SubscriptionStatus::Active;
        running.subscription_start = Some(day(1) - Days::new(60));
        running.subscription_end = Some(day(30));
        store.hospitals().insert(lapsed).expect("hospital");
        store.hospitals().insert(running).expect("hospital");

        let changes = tasks.refresh_subscriptions(day(10)).expect("refresh");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].hospital, HospitalId::from("H1"));
        assert_eq!(changes[0].to, SubscriptionStatus::Expired);
        let stored = store
            .hospitals()
            .fetch(&HospitalId::from("H1"))
            .expect("fetch")
            .expect("hospital");
        assert_eq!(stored.subscription_status, SubscriptionStatus::Expired);
    }

    #[test]
    fn sweep_totals_outstanding_on_submitted_invoices() {
        let (tasks, store, _) = fixture();
        store
            .invoices()
            .insert(invoice("SINV-1", day(3), 500.0, 500.0))
            .expect("invoice");
        store
            .invoices()
            .insert(invoice("SINV-2", day(4), 300.0, 0.0))
            .expect("invoice");
        let mut draft = invoice("SINV-3", day(4), 200.0, 200.0);
        draft.docstatus = DocStatus::Draft;
        store.invoices().insert(draft).expect("invoice");

        let sweep = tasks.pending_payment_sweep().expect("sweep");
        assert_eq!(sweep.count, 1);
        assert_eq!(sweep.outstanding, 500.0);
    }

    #[test]
    fn weekly_summary_counts_the_previous_seven_days() {
        let (tasks, store, _) = fixture();
        store
            .hospitals()
            .insert(Hospital::named(HospitalId::from("H1"), "City Care"))
            .expect("hospital");
        store
            .hospitals()
            .insert(Hospital::named(HospitalId::from("H2"), "Lake View"))
            .expect("hospital");
        let mut patient = Patient::fixture("PAT-00001", Some("H1"));
        patient.created_at = at(8, 9);
        store.patients().insert(patient).expect("patient");
        store
            .appointments()
            .insert(appointment("APT-1", day(9), AppointmentStatus::Scheduled))
            .expect("appointment");
        store
            .invoices()
            .insert(invoice("SINV-1", day(9), 500.0, 0.0))
            .expect("invoice");
        store
            .invoices()
            .insert(invoice("SINV-2", day(1), 900.0, 0.0))
            .expect("invoice");

        let summaries = tasks.weekly_summary(day(10)).expect("summary");
        assert_eq!(summaries.len(), 2);
        let city = &summaries[0];
        assert_eq!(city.hospital, HospitalId::from("H1"));
        assert_eq!(city.new_patients, 1);
        assert_eq!(city.appointments, 1);
        assert_eq!(city.invoices, 1);
        assert_eq!(city.revenue, 500.0);
        assert_eq!(summaries[1].invoices, 0);
    }
}
