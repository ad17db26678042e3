use crate::infra::LogNotifier;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use clap::Args;
use hospital_saas::error::AppError;
use hospital_saas::events::{ChannelBroadcaster, MemoryNotifier};
use hospital_saas::ids::PractitionerId;
use hospital_saas::store::{HospitalStore, MemoryStore};
use hospital_saas::tenancy::{HospitalDraft, Practitioner, Principal};
use hospital_saas::workflows::billing::ConsultationInvoiceRequest;
use hospital_saas::workflows::opd::{CallNextOutcome, TokenRequest};
use hospital_saas::workflows::registry::PatientDraft;
use hospital_saas::workflows::HospitalServices;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Visit date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Print outbound notifications captured during the visit.
    #[arg(long)]
    pub(crate) show_notifications: bool,
    /// Send notifications to the log instead of capturing them.
    #[arg(long, conflicts_with = "show_notifications")]
    pub(crate) log_notifications: bool,
}

/// Onboard a hospital, register a patient and walk one OPD visit through
/// queueing, consultation, invoicing and payment.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        show_notifications,
        log_notifications,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let at = |hour: u32, minute: u32| -> NaiveDateTime {
        today.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default())
    };

    let store = Arc::new(MemoryStore::default());
    let outbox = Arc::new(MemoryNotifier::default());
    let services = if log_notifications {
        HospitalServices::new(
            store.clone(),
            Default::default(),
            Arc::new(LogNotifier),
            Arc::new(ChannelBroadcaster::default()),
        )
    } else {
        HospitalServices::new(
            store.clone(),
            Default::default(),
            outbox.clone(),
            Arc::new(ChannelBroadcaster::default()),
        )
    };
    let admin = Principal::new(Principal::ADMINISTRATOR, "Administrator");

    println!("Hospital SaaS demo ({today})");

    let onboarded = services.registry.create_hospital_wizard(
        &admin,
        HospitalDraft {
            business_name: Some("City Care Hospital".to_string()),
            hospital_code: Some("CC".to_string()),
            city: Some("Pune".to_string()),
            total_beds: Some(40),
            ..HospitalDraft::default()
        },
        None,
        at(8, 0),
    )?;
    let hospital = onboarded.hospital.clone();
    println!(
        "- Onboarded {} ({})",
        onboarded.business_name, onboarded.organisation_code
    );

    let practitioner = PractitionerId::from("HLC-PRAC-0001");
    store
        .practitioners()
        .insert(Practitioner {
            id: practitioner.clone(),
            practitioner_name: "Dr. Meera Kulkarni".to_string(),
            user: None,
            hospital: Some(hospital.clone()),
            department: None,
            designation: Some("Consultant Physician".to_string()),
            consulting_charge: 600.0,
        })
        .map_err(hospital_saas::workflows::ServiceError::from)?;

    let patient = services.registry.register_patient(
        &admin,
        PatientDraft {
            patient_name: "Ravi Deshpande".to_string(),
            sex: Some("Male".to_string()),
            dob: None,
            mobile: Some("+91 98220 00000".to_string()),
            email: Some("ravi@example.test".to_string()),
            hospital: Some(hospital.clone()),
        },
        at(8, 30),
    )?;
    println!("- Registered patient {} ({})", patient.patient_name, patient.id);

    let receipt = services.opd.generate_token(
        &admin,
        TokenRequest {
            patient: patient.id.clone(),
            practitioner: Some(practitioner.clone()),
            department: None,
            hospital: Some(hospital.clone()),
            token_date: Some(today),
        },
        at(9, 0),
    )?;
    println!(
        "- Issued token {} (position {} in queue)",
        receipt.display_number, receipt.queue_position
    );

    match services
        .opd
        .call_next_token(&admin, Some(hospital.clone()), at(9, 15))?
    {
        CallNextOutcome::Called {
            token_number,
            patient_name,
            ..
        } => println!("- Called token {token_number} for {patient_name}"),
        CallNextOutcome::Empty { message, .. } => println!("- {message}"),
    }
    let started = services
        .opd
        .start_consultation(&admin, &receipt.token_name, at(9, 20))?;
    println!("- {}", started.message);
    let ended = services
        .opd
        .end_consultation(&admin, &receipt.token_name, at(9, 40))?;
    println!("- {}", ended.message);

    let invoice = services.billing.create_consultation_invoice(
        &admin,
        ConsultationInvoiceRequest {
            patient: patient.id.clone(),
            practitioner,
            hospital: Some(hospital.clone()),
            amount: None,
            encounter: None,
        },
        at(9, 45),
    )?;
    println!(
        "- Raised invoice {} for {:.2}",
        invoice.invoice, invoice.amount
    );
    let payment =
        services
            .billing
            .record_payment(&admin, &invoice.invoice, invoice.amount, "Cash", today)?;
    println!(
        "- Recorded payment {} ({:.2} outstanding)",
        payment.payment, payment.outstanding_amount
    );

    let stats = services.dashboard.dashboard_stats(&admin, today)?;
    println!("\nDashboard");
    println!(
        "  patients {} | active tokens {} | revenue today {:.2}",
        stats.total_patients, stats.active_tokens, stats.todays_revenue
    );

    if show_notifications {
        println!("\nNotifications");
        for message in outbox.sent() {
            println!(
                "  - {:?} to {}: {}",
                message.channel,
                message.recipient,
                message.subject.as_deref().unwrap_or(message.body.as_str())
            );
        }
    }

    Ok(())
}
