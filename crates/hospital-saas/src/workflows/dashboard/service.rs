use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};

use super::domain::{
    Activity, ActivityKind, AlertLevel, AppointmentFigures, DashboardStats, HospitalDashboard,
    HospitalHeader, HospitalOverview, IpdFigures, LabFigures, OpdFigures, PatientFigures,
    PlatformSummary, RadiologyFigures, RevenueChart, RevenueFigures, RevenuePeriod, StaffFigures,
    SubscriptionAlert, SuperAdminDashboard, ACTIVITY_PER_SOURCE, RECENT_ACTIVITY_LIMIT,
};
use crate::ids::{HospitalId, PrincipalId};
use crate::store::{require, HospitalStore};
use crate::tenancy::{Hospital, HospitalStatus, Practitioner, Principal, TenantFilter};
use crate::workflows::appointments::{Appointment, AppointmentStatus};
use crate::workflows::billing::Invoice;
use crate::workflows::ipd::{Admission, AdmissionStatus};
use crate::workflows::lab::{LabQueueStatus, LabTest};
use crate::workflows::opd::{QueueToken, TokenStatus};
use crate::workflows::radiology::RadiologyOrder;
use crate::workflows::registry::Patient;
use crate::workflows::{load_principal, read_scope, ServiceError};

const ACTIVE_TOKENS: [TokenStatus; 4] = [
    TokenStatus::Waiting,
    TokenStatus::Called,
    TokenStatus::InQueue,
    TokenStatus::WithDoctor,
];

/// Read-only roll-ups across every workflow.
pub struct DashboardService<S> {
    store: Arc<S>,
    default_total_beds: u32,
}

impl<S> DashboardService<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(store: Arc<S>, default_total_beds: u32) -> Self {
        Self {
            store,
            default_total_beds,
        }
    }

    pub fn principal(&self, user: &PrincipalId) -> Result<Principal, ServiceError> {
        load_principal(&*self.store, user)
    }

    pub fn dashboard_stats(
        &self,
        principal: &Principal,
        today: NaiveDate,
    ) -> Result<DashboardStats, ServiceError> {
        let scope = read_scope(&*self.store, principal, None)?;
        Ok(DashboardStats {
            total_patients: self
                .store
                .patients()
                .count(&|patient: &Patient| scope.allows_record(patient))?,
            todays_appointments: self.store.appointments().count(&|appointment: &Appointment| {
                appointment.appointment_date == today && scope.allows_record(appointment)
            })?,
            active_tokens: self.store.tokens().count(&|token: &QueueToken| {
                token.token_date == today
                    && ACTIVE_TOKENS.contains(&token.status)
                    && scope.allows_record(token)
            })?,
            todays_revenue: self.revenue(&|invoice: &Invoice| {
                invoice.posting_date == today && scope.allows_record(invoice)
            })?,
            active_ipd: self.store.admissions().count(&|admission: &Admission| {
                admission.is_active() && scope.allows_record(admission)
            })?,
        })
    }

    /// Figures for one hospital; only rows stamped with it are counted.
    pub fn hospital_dashboard(
        &self,
        principal: &Principal,
        hospital: &HospitalId,
        today: NaiveDate,
    ) -> Result<HospitalDashboard, ServiceError> {
        read_scope(&*self.store, principal, Some(hospital.clone()))?;
        let record = require(self.store.hospitals(), hospital)?;
        let owned = Some(hospital);
        let month_start = today.with_day(1).unwrap_or(today);

        let admitted = self.store.admissions().count(&|admission: &Admission| {
            admission.hospital.as_ref() == owned && admission.status == AdmissionStatus::Admitted
        })?;
        let total_beds = record.total_beds.unwrap_or(self.default_total_beds);
        let outstanding: f64 = self
            .store
            .invoices()
            .select(&|invoice: &Invoice| {
                invoice.docstatus.is_submitted() && invoice.hospital.as_ref() == owned
            })?
            .iter()
            .map(|invoice| invoice.outstanding_amount)
            .sum();

        Ok(HospitalDashboard {
            patients: PatientFigures {
                total: self
                    .store
                    .patients()
                    .count(&|patient: &Patient| patient.hospital.as_ref() == owned)?,
                new_today: self.store.patients().count(&|patient: &Patient| {
                    patient.hospital.as_ref() == owned && patient.created_at.date() >= today
                })?,
            },
            appointments: AppointmentFigures {
                today: self.store.appointments().count(&|appointment: &Appointment| {
                    appointment.hospital.as_ref() == owned && appointment.appointment_date == today
                })?,
                pending: self.store.appointments().count(&|appointment: &Appointment| {
                    appointment.hospital.as_ref() == owned
                        && appointment.appointment_date == today
                        && appointment.status == AppointmentStatus::Open
                })?,
            },
            opd: OpdFigures {
                waiting: self.store.tokens().count(&|token: &QueueToken| {
                    token.hospital.as_ref() == owned
                        && token.token_date == today
                        && matches!(token.status, TokenStatus::Waiting | TokenStatus::InQueue)
                })?,
                completed: self.store.tokens().count(&|token: &QueueToken| {
                    token.hospital.as_ref() == owned
                        && token.token_date == today
                        && token.status == TokenStatus::Completed
                })?,
            },
            lab: LabFigures {
                pending: self.store.lab_tests().count(&|test: &LabTest| {
                    test.hospital.as_ref() == owned
                        && test.queue_status != LabQueueStatus::Completed
                })?,
                completed_today: self.store.lab_tests().count(&|test: &LabTest| {
                    test.hospital.as_ref() == owned
                        && test.queue_status == LabQueueStatus::Completed
                        && test.modified_at.date() >= today
                })?,
            },
            radiology: RadiologyFigures {
                pending: self.store.radiology_orders().count(&|order: &RadiologyOrder| {
                    order.hospital.as_ref() == owned && order.is_pending()
                })?,
            },
            ipd: IpdFigures {
                admitted,
                available_beds: i64::from(total_beds) - admitted as i64,
            },
            revenue: RevenueFigures {
                today: self.revenue(&|invoice: &Invoice| {
                    invoice.hospital.as_ref() == owned && invoice.posting_date == today
                })?,
                month: self.revenue(&|invoice: &Invoice| {
                    invoice.hospital.as_ref() == owned
                        && invoice.posting_date >= month_start
                        && invoice.posting_date <= today
                })?,
                outstanding,
            },
            staff: StaffFigures {
                total: self
                    .store
                    .practitioners()
                    .count(&|practitioner: &Practitioner| {
                        practitioner.hospital.as_ref() == owned
                    })?,
            },
            hospital: HospitalHeader {
                name: record.id,
                business_name: record.business_name,
                organisation_code: record.organisation_code,
                subscription_status: record.subscription_status,
            },
        })
    }

    /// Platform-wide view for system managers, newest hospital first.
    pub fn super_admin_dashboard(
        &self,
        principal: &Principal,
        today: NaiveDate,
    ) -> Result<SuperAdminDashboard, ServiceError> {
        if !principal.is_unrestricted() {
            return Err(ServiceError::permission("Access denied"));
        }
        let mut hospitals = self.store.hospitals().select(&|_: &Hospital| true)?;
        hospitals.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut overviews = Vec::with_capacity(hospitals.len());
        let mut subscription_alerts = Vec::new();
        for hospital in hospitals {
            let owned = Some(&hospital.id);
            if let Some(days_left) = hospital.subscription_days_left(today) {
                if let Some(status) = AlertLevel::for_days_left(days_left) {
                    subscription_alerts.push(SubscriptionAlert {
                        hospital: hospital.id.clone(),
                        business_name: hospital.business_name.clone(),
                        days_left,
                        status,
                    });
                }
            }
            overviews.push(HospitalOverview {
                patient_count: self
                    .store
                    .patients()
                    .count(&|patient: &Patient| patient.hospital.as_ref() == owned)?,
                staff_count: self
                    .store
                    .practitioners()
                    .count(&|practitioner: &Practitioner| {
                        practitioner.hospital.as_ref() == owned
                    })?,
                today_appointments: self.store.appointments().count(
                    &|appointment: &Appointment| {
                        appointment.hospital.as_ref() == owned
                            && appointment.appointment_date == today
                    },
                )?,
                today_revenue: self.revenue(&|invoice: &Invoice| {
                    invoice.hospital.as_ref() == owned && invoice.posting_date == today
                })?,
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
                total_beds: hospital.total_beds,
            });
        }

        let summary = PlatformSummary {
            total_hospitals: overviews.len(),
            active_hospitals: overviews
                .iter()
                .filter(|overview| overview.status == HospitalStatus::Active)
                .count(),
            total_patients: overviews.iter().map(|overview| overview.patient_count).sum(),
            total_staff: overviews.iter().map(|overview| overview.staff_count).sum(),
            today_revenue: overviews.iter().map(|overview| overview.today_revenue).sum(),
        };
        Ok(SuperAdminDashboard {
            hospitals: overviews,
            summary,
            subscription_alerts,
        })
    }

    /// Submitted revenue bucketed per day, or per month over a year.
    pub fn revenue_chart(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
        period: RevenuePeriod,
        today: NaiveDate,
    ) -> Result<RevenueChart, ServiceError> {
        let scope = read_scope(&*self.store, principal, hospital)?;
        let from_date = today - Duration::days(period.lookback_days());
        let invoices = self.store.invoices().select(&|invoice: &Invoice| {
            invoice.docstatus.is_submitted()
                && invoice.posting_date >= from_date
                && scope.allows_record(invoice)
        })?;

        let mut buckets: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for invoice in &invoices {
            let bucket = buckets
                .entry(period.bucket(invoice.posting_date))
                .or_insert((0.0, 0));
            bucket.0 += invoice.grand_total;
            bucket.1 += 1;
        }

        let mut chart = RevenueChart::default();
        for (label, (revenue, count)) in buckets {
            chart.labels.push(label);
            chart.values.push(revenue);
            chart.counts.push(count);
        }
        Ok(chart)
    }

    /// Newest registrations, open bookings and submitted invoices, merged.
    pub fn recent_activity(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
        limit: Option<usize>,
    ) -> Result<Vec<Activity>, ServiceError> {
        let scope = read_scope(&*self.store, principal, hospital)?;
        let mut activities = Vec::new();

        let mut patients = self
            .store
            .patients()
            .select(&|patient: &Patient| in_scope(&scope, patient.hospital.as_ref()))?;
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        activities.extend(patients.into_iter().take(ACTIVITY_PER_SOURCE).map(|patient| {
            Activity::new(
                ActivityKind::Patient,
                format!("New patient registered: {}", patient.patient_name),
                patient.created_at,
                patient.hospital,
            )
        }));

        let mut appointments = self.store.appointments().select(&|appointment: &Appointment| {
            appointment.status == AppointmentStatus::Open
                && in_scope(&scope, appointment.hospital.as_ref())
        })?;
        appointments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        activities.extend(
            appointments
                .into_iter()
                .take(ACTIVITY_PER_SOURCE)
                .map(|appointment| {
                    Activity::new(
                        ActivityKind::Appointment,
                        format!(
                            "Appointment booked: {} with {}",
                            appointment.patient_name,
                            appointment.practitioner_name.as_deref().unwrap_or_default()
                        ),
                        appointment.created_at,
                        appointment.hospital,
                    )
                }),
        );

        let mut invoices = self.store.invoices().select(&|invoice: &Invoice| {
            invoice.docstatus.is_submitted() && in_scope(&scope, invoice.hospital.as_ref())
        })?;
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        activities.extend(invoices.into_iter().take(ACTIVITY_PER_SOURCE).map(|invoice| {
            Activity::new(
                ActivityKind::Invoice,
                format!("Invoice created: ₹{:.2}", invoice.grand_total),
                invoice.created_at,
                invoice.hospital,
            )
        }));

        activities.sort_by(|a, b| b.time.cmp(&a.time));
        activities.truncate(limit.unwrap_or(RECENT_ACTIVITY_LIMIT));
        Ok(activities)
    }

    fn revenue(&self, predicate: &dyn Fn(&Invoice) -> bool) -> Result<f64, ServiceError> {
        Ok(self
            .store
            .invoices()
            .select(&|invoice: &Invoice| invoice.docstatus.is_submitted() && predicate(invoice))?
            .iter()
            .map(|invoice| invoice.grand_total)
            .sum())
    }
}

/// Activity rows are narrowed to the scoped hospital exactly.
fn in_scope(scope: &TenantFilter, hospital: Option<&HospitalId>) -> bool {
    match scope.scoped_to() {
        Some(scoped) => hospital == Some(scoped),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CustomerId, InvoiceId, PatientId};
    use crate::tenancy::Role;
    use crate::store::MemoryStore;
    use crate::workflows::billing::{InvoiceItem, ServiceType};
    use crate::workflows::DocStatus;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).expect("date")
    }

    fn admin() -> Principal {
        Principal::new(Principal::ADMINISTRATOR, "Administrator")
    }

    fn invoice(id: &str, hospital: &str, posting_date: NaiveDate, docstatus: DocStatus) -> Invoice {
        let mut invoice = Invoice {
            id: InvoiceId::from(id),
            customer: CustomerId::from("CUST-00001"),
            patient: PatientId::from("PAT-00001"),
            hospital: Some(HospitalId::from(hospital)),
            service_type: ServiceType::OpdConsultation,
            reference: None,
            items: vec![InvoiceItem::new(
                "OPD Consultation - Dr. Mehta",
                "Consultation",
                1.0,
                500.0,
            )],
            grand_total: 0.0,
            outstanding_amount: 0.0,
            docstatus,
            posting_date,
            due_date: posting_date,
            created_at: posting_date.and_hms_opt(10, 0, 0).expect("timestamp"),
        };
        invoice.recalculate();
        invoice
    }

    fn dashboard() -> DashboardService<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        let mut city = Hospital::named(HospitalId::from("H1"), "City Care");
        city.subscription_end = Some(today() + Duration::days(3));
        city.total_beds = Some(20);
        store.hospitals().insert(city).expect("hospital");
        let mut lapsed = Hospital::named(HospitalId::from("H2"), "Lakeside");
        lapsed.subscription_end = Some(today() - Duration::days(1));
        lapsed.status = HospitalStatus::Suspended;
        store.hospitals().insert(lapsed).expect("hospital");

        store
            .patients()
            .insert(Patient::fixture("PAT-00001", Some("H1")))
            .expect("patient");
        for (id, date, docstatus) in [
            ("SINV-00001", today(), DocStatus::Submitted),
            ("SINV-00002", today() - Duration::days(2), DocStatus::Submitted),
            ("SINV-00003", today(), DocStatus::Draft),
        ] {
            store
                .invoices()
                .insert(invoice(id, "H1", date, docstatus))
                .expect("invoice");
        }
        DashboardService::new(store, 100)
    }

    #[test]
    fn hospital_dashboard_counts_submitted_revenue_only() {
        let dashboard = dashboard();
        let view = dashboard
            .hospital_dashboard(&admin(), &HospitalId::from("H1"), today())
            .expect("dashboard");
        assert_eq!(view.patients.total, 1);
        assert_eq!(view.revenue.today, 500.0);
        assert_eq!(view.revenue.month, 1000.0);
        assert_eq!(view.ipd.available_beds, 20);
    }

    #[test]
    fn super_admin_view_is_restricted_and_raises_alerts() {
        let dashboard = dashboard();
        let nurse = Principal::new("nurse@h1.test", "Nurse").with_roles([Role::Nurse]);
        assert!(matches!(
            dashboard.super_admin_dashboard(&nurse, today()),
            Err(ServiceError::PermissionDenied(_))
        ));

        let view = dashboard.super_admin_dashboard(&admin(), today()).expect("view");
        assert_eq!(view.summary.total_hospitals, 2);
        assert_eq!(view.summary.active_hospitals, 1);
        assert_eq!(view.summary.today_revenue, 500.0);
        let levels: Vec<_> = view
            .subscription_alerts
            .iter()
            .map(|alert| (alert.hospital.as_str().to_string(), alert.status))
            .collect();
        assert!(levels.contains(&("H1".to_string(), AlertLevel::Warning)));
        assert!(levels.contains(&("H2".to_string(), AlertLevel::Critical)));
    }

    #[test]
    fn revenue_chart_buckets_by_day() {
        let dashboard = dashboard();
        let chart = dashboard
            .revenue_chart(&admin(), None, RevenuePeriod::Week, today())
            .expect("chart");
        assert_eq!(chart.labels, vec!["2024-03-08", "2024-03-10"]);
        assert_eq!(chart.values, vec![500.0, 500.0]);
        assert_eq!(chart.counts, vec![1, 1]);

        let activity = dashboard.recent_activity(&admin(), None, Some(2)).expect("feed");
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].kind, ActivityKind::Invoice);
        assert_eq!(activity[0].message, "Invoice created: ₹500.00");
    }
}
