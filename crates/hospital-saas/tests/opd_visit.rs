//! Outpatient visits driven through the public service facade: registration,
//! the daily token queue, consultation, invoicing and payment, plus the
//! notifications and realtime updates the visit produces.

mod common {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime};
    use hospital_saas::config::HospitalSettings;
    use hospital_saas::events::{ChannelBroadcaster, MemoryNotifier};
    use hospital_saas::ids::{HospitalId, PractitionerId};
    use hospital_saas::store::{HospitalStore, MemoryStore};
    use hospital_saas::tenancy::{Hospital, Practitioner, Principal, Role};
    use hospital_saas::workflows::HospitalServices;

    pub(super) struct Clinic {
        pub(super) store: Arc<MemoryStore>,
        pub(super) services: HospitalServices<MemoryStore>,
        pub(super) notifier: Arc<MemoryNotifier>,
        pub(super) broadcaster: Arc<ChannelBroadcaster>,
    }

    pub(super) fn visit_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).expect("valid visit date")
    }

    pub(super) fn at(hour: u32, minute: u32) -> NaiveDateTime {
        visit_day()
            .and_hms_opt(hour, minute, 0)
            .expect("valid timestamp")
    }

    pub(super) fn receptionist(hospital: &str) -> Principal {
        Principal::new(format!("reception@{hospital}.test"), "Front Desk")
            .with_roles([Role::Receptionist])
            .with_hospital(HospitalId::from(hospital))
    }

    pub(super) fn clinic() -> Clinic {
        let store = Arc::new(MemoryStore::default());
        for (id, name) in [("H1", "City Care"), ("H2", "Lake View")] {
            let mut hospital = Hospital::named(HospitalId::from(id), name);
            hospital.total_beds = Some(20);
            store.hospitals().insert(hospital).expect("hospital");
        }
        store
            .practitioners()
            .insert(Practitioner {
                id: PractitionerId::from("HLC-PRAC-0001"),
                practitioner_name: "Dr. Mehta".to_string(),
                user: None,
                hospital: Some(HospitalId::from("H1")),
                department: None,
                designation: None,
                consulting_charge: 500.0,
            })
            .expect("practitioner");
        for principal in [receptionist("H1"), receptionist("H2")] {
            store.principals().insert(principal).expect("principal");
        }

        let notifier = Arc::new(MemoryNotifier::default());
        let broadcaster = Arc::new(ChannelBroadcaster::default());
        let services = HospitalServices::new(
            store.clone(),
            HospitalSettings::default(),
            notifier.clone(),
            broadcaster.clone(),
        );
        Clinic {
            store,
            services,
            notifier,
            broadcaster,
        }
    }
}

mod visit {
    use super::common::*;
    use hospital_saas::events::Channel;
    use hospital_saas::ids::{HospitalId, PractitionerId};
    use hospital_saas::tenancy::Principal;
    use hospital_saas::workflows::billing::ConsultationInvoiceRequest;
    use hospital_saas::workflows::opd::{CallNextOutcome, TokenRequest, TokenStatus};
    use hospital_saas::workflows::registry::PatientDraft;

    fn draft(name: &str, mobile: &str) -> PatientDraft {
        PatientDraft {
            patient_name: name.to_string(),
            sex: None,
            dob: None,
            mobile: Some(mobile.to_string()),
            email: None,
            hospital: None,
        }
    }

    #[test]
    fn patient_is_queued_seen_invoiced_and_paid() {
        let clinic = clinic();
        let desk = receptionist("H1");
        let mut updates = clinic.broadcaster.subscribe();

        let first = clinic
            .services
            .registry
            .register_patient(&desk, draft("Asha Rao", "+91 98000 00001"), at(8, 30))
            .expect("first patient");
        let second = clinic
            .services
            .registry
            .register_patient(&desk, draft("Ravi Kumar", "+91 98000 00002"), at(8, 35))
            .expect("second patient");
        assert_eq!(first.hospital, Some(HospitalId::from("H1")));
        assert_eq!(first.mobile.as_deref(), Some("+919800000001"));

        let token_for = |patient| TokenRequest {
            patient,
            practitioner: Some(PractitionerId::from("HLC-PRAC-0001")),
            department: None,
            hospital: None,
            token_date: None,
        };
        let first_token = clinic
            .services
            .opd
            .generate_token(&desk, token_for(first.id.clone()), at(9, 0))
            .expect("first token");
        let second_token = clinic
            .services
            .opd
            .generate_token(&desk, token_for(second.id.clone()), at(9, 5))
            .expect("second token");
        assert_eq!(first_token.token_number, 1);
        assert_eq!(first_token.display_number, "OPD001");
        assert_eq!(second_token.token_number, 2);
        assert_eq!(second_token.queue_position, 2);

        let update = updates.try_recv().expect("queue update published");
        assert_eq!(update.event, "queue_update");
        assert_eq!(update.room.to_string(), "hospital_H1");

        match clinic
            .services
            .opd
            .call_next_token(&desk, None, at(9, 15))
            .expect("call next")
        {
            CallNextOutcome::Called {
                token_number,
                patient_name,
                ..
            } => {
                assert_eq!(token_number, 1);
                assert_eq!(patient_name, "Asha Rao");
            }
            other => panic!("expected a called token, got {other:?}"),
        }
        clinic
            .services
            .opd
            .start_consultation(&desk, &first_token.token_name, at(9, 20))
            .expect("consultation started");
        let ended = clinic
            .services
            .opd
            .end_consultation(&desk, &first_token.token_name, at(9, 40))
            .expect("consultation ended");
        assert_eq!(ended.status, TokenStatus::Completed);

        let board = clinic
            .services
            .opd
            .queue_display(Some(&HospitalId::from("H1")), visit_day())
            .expect("board");
        assert_eq!(board.hospital_name, "City Care");
        assert_eq!(board.total_waiting, 1);

        let admin = Principal::new(Principal::ADMINISTRATOR, "Administrator");
        let invoice = clinic
            .services
            .billing
            .create_consultation_invoice(
                &admin,
                ConsultationInvoiceRequest {
                    patient: first.id.clone(),
                    practitioner: PractitionerId::from("HLC-PRAC-0001"),
                    hospital: None,
                    amount: None,
                    encounter: None,
                },
                at(9, 45),
            )
            .expect("invoice");
        assert_eq!(invoice.amount, 500.0);
        let payment = clinic
            .services
            .billing
            .record_payment(&admin, &invoice.invoice, 500.0, "Cash", visit_day())
            .expect("payment");
        assert_eq!(payment.outstanding_amount, 0.0);

        let stats = clinic
            .services
            .dashboard
            .dashboard_stats(&desk, visit_day())
            .expect("stats");
        assert_eq!(stats.total_patients, 2);
        assert_eq!(stats.active_tokens, 1);
        assert_eq!(stats.todays_revenue, 500.0);

        let texts: Vec<_> = clinic
            .notifier
            .sent()
            .into_iter()
            .filter(|message| message.channel == Channel::Sms)
            .collect();
        assert!(texts
            .iter()
            .any(|message| message.recipient == "+919800000001"
                && message.body.contains("Token: OPD001")));
        assert!(texts
            .iter()
            .any(|message| message.body.contains("Token OPD001 is being called")));
    }

    #[test]
    fn token_numbers_restart_per_hospital() {
        let clinic = clinic();
        let h1 = clinic
            .services
            .registry
            .register_patient(&receptionist("H1"), draft("Asha Rao", "1"), at(8, 0))
            .expect("patient");
        let h2 = clinic
            .services
            .registry
            .register_patient(&receptionist("H2"), draft("Ravi Kumar", "2"), at(8, 0))
            .expect("patient");

        let issue = |principal, patient| {
            clinic
                .services
                .opd
                .generate_token(
                    &principal,
                    TokenRequest {
                        patient,
                        practitioner: None,
                        department: None,
                        hospital: None,
                        token_date: None,
                    },
                    at(9, 0),
                )
                .expect("token")
        };
        assert_eq!(issue(receptionist("H1"), h1.id.clone()).token_number, 1);
        assert_eq!(issue(receptionist("H1"), h1.id).token_number, 2);
        assert_eq!(issue(receptionist("H2"), h2.id).token_number, 1);

        let next = clinic
            .services
            .opd
            .next_token_number(&receptionist("H1"), None, visit_day())
            .expect("next number");
        assert_eq!(next.token_number, 3);
        assert_eq!(next.display_number, "OPD003");
    }
}

mod concurrency {
    use super::common::*;
    use hospital_saas::store::HospitalStore;
    use hospital_saas::workflows::opd::QueueToken;
    use hospital_saas::workflows::opd::TokenRequest;
    use hospital_saas::workflows::registry::PatientDraft;

    #[test]
    fn concurrent_issuers_never_share_a_token_number() {
        let clinic = clinic();
        let desk = receptionist("H1");
        let patient = clinic
            .services
            .registry
            .register_patient(
                &desk,
                PatientDraft {
                    patient_name: "Asha Rao".to_string(),
                    sex: None,
                    dob: None,
                    mobile: None,
                    email: None,
                    hospital: None,
                },
                at(8, 0),
            )
            .expect("patient");

        const DESKS: usize = 8;
        const PER_DESK: usize = 6;
        let mut numbers: Vec<u32> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..DESKS)
                .map(|_| {
                    let opd = clinic.services.opd.clone();
                    let desk = desk.clone();
                    let patient = patient.id.clone();
                    scope.spawn(move || {
                        (0..PER_DESK)
                            .map(|_| {
                                opd.generate_token(
                                    &desk,
                                    TokenRequest {
                                        patient: patient.clone(),
                                        practitioner: None,
                                        department: None,
                                        hospital: None,
                                        token_date: None,
                                    },
                                    at(9, 0),
                                )
                                .expect("token")
                                .token_number
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().expect("issuer thread"))
                .collect()
        });

        numbers.sort_unstable();
        let expected: Vec<u32> = (1..=(DESKS * PER_DESK) as u32).collect();
        assert_eq!(numbers, expected);
        assert_eq!(
            clinic
                .store
                .tokens()
                .count(&|_: &QueueToken| true)
                .expect("count"),
            DESKS * PER_DESK
        );
    }
}
