//! The merged workflow router exercised over HTTP.

mod common {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use hospital_saas::config::HospitalSettings;
    use hospital_saas::events::{ChannelBroadcaster, MemoryNotifier};
    use hospital_saas::http::PRINCIPAL_HEADER;
    use hospital_saas::ids::HospitalId;
    use hospital_saas::store::{HospitalStore, MemoryStore};
    use hospital_saas::tenancy::Hospital;
    use hospital_saas::workflows::{hospital_router, HospitalServices};
    use serde_json::Value;
    use tower::ServiceExt;

    pub(super) struct Api {
        pub(super) store: Arc<MemoryStore>,
        pub(super) services: HospitalServices<MemoryStore>,
    }

    pub(super) fn api() -> Api {
        let store = Arc::new(MemoryStore::default());
        store
            .hospitals()
            .insert(Hospital::named(HospitalId::from("H1"), "City Care"))
            .expect("hospital");
        let services = HospitalServices::new(
            store.clone(),
            HospitalSettings::default(),
            Arc::new(MemoryNotifier::default()),
            Arc::new(ChannelBroadcaster::default()),
        );
        Api { store, services }
    }

    impl Api {
        fn router(&self) -> Router {
            hospital_router(&self.services)
        }

        pub(super) async fn send(
            &self,
            method: Method,
            uri: &str,
            user: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, String, Vec<u8>) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(user) = user {
                request = request.header(PRINCIPAL_HEADER, user);
            }
            let request = match body {
                Some(body) => request
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            }
            .expect("request");

            let response = self.router().oneshot(request).await.expect("response");
            let status = response.status();
            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let bytes = to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("body");
            (status, content_type, bytes.to_vec())
        }

        pub(super) async fn json(
            &self,
            method: Method,
            uri: &str,
            user: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let (status, _, bytes) = self.send(method, uri, user, body).await;
            (status, serde_json::from_slice(&bytes).expect("json body"))
        }
    }
}

mod front_desk {
    use super::common::*;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    const ADMIN: Option<&str> = Some("Administrator");

    #[tokio::test]
    async fn staff_endpoints_need_a_signed_in_user() {
        let api = api();
        let (status, body) = api
            .json(
                Method::POST,
                "/api/v1/patients",
                None,
                Some(json!({ "patient_name": "Asha Rao" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], json!(false));

        let (status, _) = api
            .json(
                Method::POST,
                "/api/v1/patients",
                Some("ghost@nowhere.test"),
                Some(json!({ "patient_name": "Asha Rao" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn registration_and_token_show_up_on_the_guest_board() {
        let api = api();
        let (status, patient) = api
            .json(
                Method::POST,
                "/api/v1/patients",
                ADMIN,
                Some(json!({
                    "patient_name": "Asha Rao",
                    "mobile": "+91 98000 00001",
                    "hospital": "H1"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let patient_id = patient["id"].as_str().expect("patient id").to_string();

        let (status, receipt) = api
            .json(
                Method::POST,
                "/api/v1/opd/tokens",
                ADMIN,
                Some(json!({ "patient": patient_id, "hospital": "H1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt["token_number"], json!(1));
        assert_eq!(receipt["display_number"], json!("OPD001"));
        assert!(receipt["token_name"].is_string());
        assert_eq!(receipt["token_id"], receipt["token_name"]);

        let (status, board) = api
            .json(Method::GET, "/api/v1/opd/queue-display?hospital=H1", None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(board["hospital_name"], json!("City Care"));
        assert_eq!(board["total_waiting"], json!(1));
        assert_eq!(board["queue"][0]["patient_name"], json!("Asha Rao"));
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected_before_reaching_the_service() {
        let api = api();
        let (status, _, _) = api
            .send(
                Method::POST,
                "/api/v1/opd/tokens",
                ADMIN,
                Some(json!({ "practitioner": "HLC-PRAC-0001" })),
            )
            .await;
        assert!(status.is_client_error());
    }
}

mod radiology {
    use super::common::*;
    use axum::http::{Method, StatusCode};
    use chrono::Local;
    use hospital_saas::ids::{ExaminationTypeId, HospitalId, RadiologyOrderId};
    use hospital_saas::store::HospitalStore;
    use hospital_saas::tenancy::Principal;
    use hospital_saas::workflows::radiology::{
        ExaminationTypeDraft, Modality, OrderRequest, OrderStatus, Priority,
    };
    use hospital_saas::workflows::registry::PatientDraft;
    use serde_json::json;

    fn submitted_order(api: &Api) -> RadiologyOrderId {
        let admin = Principal::new(Principal::ADMINISTRATOR, "Administrator");
        let now = Local::now().naive_local();
        let patient = api
            .services
            .registry
            .register_patient(
                &admin,
                PatientDraft {
                    patient_name: "Asha Rao".to_string(),
                    sex: None,
                    dob: None,
                    mobile: None,
                    email: None,
                    hospital: Some(HospitalId::from("H1")),
                },
                now,
            )
            .expect("patient");
        api.services
            .radiology
            .add_examination_type(
                &admin,
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
        let order = api
            .services
            .radiology
            .create_order(
                &admin,
                OrderRequest {
                    patient: patient.id,
                    examination_type: ExaminationTypeId::from("Chest PA"),
                    practitioner: None,
                    priority: Priority::Routine,
                    body_part: Some("Chest".to_string()),
                    clinical_history: None,
                    order_date: None,
                    scheduled_date: None,
                    scheduled_time: None,
                    hospital: None,
                },
                now,
            )
            .expect("order");
        api.services
            .radiology
            .submit_order(&admin, &order.id)
            .expect("submitted");
        order.id
    }

    #[tokio::test]
    async fn skipping_ahead_in_the_order_lifecycle_is_a_bad_request() {
        let api = api();
        let order = submitted_order(&api);

        let (status, body) = api
            .json(
                Method::POST,
                &format!("/api/v1/radiology/orders/{order}/status"),
                Some("Administrator"),
                Some(json!({ "status": "Completed" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));

        let stored = api
            .store
            .radiology_orders()
            .fetch(&order)
            .expect("fetch")
            .expect("order");
        assert_eq!(stored.status, OrderStatus::Ordered);
    }

    #[tokio::test]
    async fn orders_report_downloads_as_csv() {
        let api = api();
        let order = submitted_order(&api);

        let (status, content_type, bytes) = api
            .send(
                Method::GET,
                "/api/v1/radiology/reports/orders.csv",
                Some("Administrator"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/csv; charset=utf-8");

        let csv = String::from_utf8(bytes).expect("utf-8");
        let mut lines = csv.lines();
        assert!(lines.next().expect("header").starts_with("name,order_date,"));
        let row = lines.next().expect("row");
        assert!(row.starts_with(&format!("{order},")));
        assert!(row.contains("Asha Rao"));
        assert!(lines.next().is_none());
    }
}
