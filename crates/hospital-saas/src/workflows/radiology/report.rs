//! Radiology orders report: rows, modality chart and summary tiles, with a
//! CSV rendering of the rows.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{Modality, OrderStatus, Priority, RadiologyOrder, RadiologyResult};
use crate::ids::{
    ExaminationTypeId, HospitalId, PractitionerId, RadiologyOrderId, RadiologyResultId,
};
use crate::workflows::{round_to, ServiceError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilters {
    #[serde(default)]
    pub from_date: Option<NaiveDate>,
    #[serde(default)]
    pub to_date: Option<NaiveDate>,
    #[serde(default)]
    pub modality: Option<Modality>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub practitioner: Option<PractitionerId>,
    #[serde(default)]
    pub examination_type: Option<ExaminationTypeId>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

impl ReportFilters {
    /// Submitted orders passing every filter that is set.
    pub fn matches(&self, order: &RadiologyOrder) -> bool {
        order.docstatus.is_submitted()
            && self.from_date.map_or(true, |from| order.order_date >= from)
            && self.to_date.map_or(true, |to| order.order_date <= to)
            && self.modality.map_or(true, |modality| order.modality == modality)
            && self.status.map_or(true, |status| order.status == status)
            && self.priority.map_or(true, |priority| order.priority == priority)
            && self
                .practitioner
                .as_ref()
                .map_or(true, |practitioner| order.practitioner.as_ref() == Some(practitioner))
            && self
                .examination_type
                .as_ref()
                .map_or(true, |examination| &order.examination_type == examination)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportColumn {
    pub fieldname: &'static str,
    pub label: &'static str,
    pub fieldtype: &'static str,
}

const fn column(
    fieldname: &'static str,
    label: &'static str,
    fieldtype: &'static str,
) -> ReportColumn {
    ReportColumn {
        fieldname,
        label,
        fieldtype,
    }
}

pub const COLUMNS: [ReportColumn; 11] = [
    column("name", "Order ID", "Link"),
    column("order_date", "Order Date", "Date"),
    column("patient_name", "Patient", "Data"),
    column("examination_type", "Examination", "Link"),
    column("modality", "Modality", "Data"),
    column("priority", "Priority", "Data"),
    column("status", "Status", "Data"),
    column("practitioner_name", "Ordering Doctor", "Data"),
    column("rate", "Rate", "Currency"),
    column("invoiced", "Invoiced", "Check"),
    column("turnaround_hours", "TAT (Hours)", "Float"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub name: RadiologyOrderId,
    pub order_date: NaiveDate,
    pub patient_name: String,
    pub examination_type: ExaminationTypeId,
    pub modality: Modality,
    pub priority: Priority,
    pub status: OrderStatus,
    pub practitioner_name: Option<String>,
    pub rate: f64,
    pub invoiced: bool,
    pub result_name: Option<RadiologyResultId>,
    pub turnaround_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportChart {
    pub labels: Vec<String>,
    pub values: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_orders: usize,
    pub completed: usize,
    pub pending: usize,
    pub cancelled: usize,
    pub stat_orders: usize,
    pub urgent_orders: usize,
    pub total_revenue: f64,
    pub invoiced_revenue: f64,
    pub avg_turnaround: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrdersReport {
    pub columns: Vec<ReportColumn>,
    pub data: Vec<ReportRow>,
    pub chart: Option<ReportChart>,
    pub summary: ReportSummary,
}

/// Whole hours from order to examination, truncated.
pub fn turnaround_hours(order: &RadiologyOrder, result: &RadiologyResult) -> f64 {
    result
        .examined_at()
        .signed_duration_since(order.ordered_at())
        .num_hours() as f64
}

/// Build the report from already-filtered orders and the results on file.
pub fn build_report(mut orders: Vec<RadiologyOrder>, results: &[RadiologyResult]) -> OrdersReport {
    orders.sort_by(|a, b| {
        b.order_date
            .cmp(&a.order_date)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    let submitted: HashMap<&RadiologyOrderId, &RadiologyResult> = results
        .iter()
        .filter(|result| result.docstatus.is_submitted())
        .filter_map(|result| result.radiology_order.as_ref().map(|order| (order, result)))
        .collect();

    let mut summary = ReportSummary::default();
    let mut turnarounds = Vec::new();
    let mut by_modality: Vec<(Modality, usize)> = Vec::new();
    let mut data = Vec::with_capacity(orders.len());

    for order in &orders {
        let result = submitted.get(&order.id).copied();
        let turnaround = result.map(|result| turnaround_hours(order, result));
        if let Some(hours) = turnaround {
            turnarounds.push(hours);
        }

        summary.total_orders += 1;
        match order.status {
            OrderStatus::Completed => summary.completed += 1,
            OrderStatus::Cancelled => summary.cancelled += 1,
            status if OrderStatus::PENDING.contains(&status) => summary.pending += 1,
            _ => {}
        }
        match order.priority {
            Priority::Stat => summary.stat_orders += 1,
            Priority::Urgent => summary.urgent_orders += 1,
            Priority::Routine => {}
        }
        summary.total_revenue += order.rate;
        if order.invoiced {
            summary.invoiced_revenue += order.rate;
        }
        match by_modality.iter_mut().find(|(modality, _)| *modality == order.modality) {
            Some((_, count)) => *count += 1,
            None => by_modality.push((order.modality, 1)),
        }

        data.push(ReportRow {
            name: order.id.clone(),
            order_date: order.order_date,
            patient_name: order.patient_name.clone(),
            examination_type: order.examination_type.clone(),
            modality: order.modality,
            priority: order.priority,
            status: order.status,
            practitioner_name: order.practitioner_name.clone(),
            rate: order.rate,
            invoiced: order.invoiced,
            result_name: result.map(|result| result.id.clone()),
            turnaround_hours: turnaround,
        });
    }

    if !turnarounds.is_empty() {
        let average = turnarounds.iter().sum::<f64>() / turnarounds.len() as f64;
        summary.avg_turnaround = round_to(average, 1);
    }
    summary.total_revenue = round_to(summary.total_revenue, 2);
    summary.invoiced_revenue = round_to(summary.invoiced_revenue, 2);

    by_modality.sort_by(|a, b| b.1.cmp(&a.1));
    let chart = (!by_modality.is_empty()).then(|| ReportChart {
        labels: by_modality
            .iter()
            .map(|(modality, _)| modality.label().to_string())
            .collect(),
        values: by_modality.iter().map(|(_, count)| *count).collect(),
    });

    OrdersReport {
        columns: COLUMNS.to_vec(),
        data,
        chart,
        summary,
    }
}

#[derive(Debug)]
pub enum ReportError {
    Csv(csv::Error),
    Io(std::io::Error),
    Utf8(std::string::FromUtf8Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Csv(err) => write!(f, "could not write report row: {}", err),
            ReportError::Io(err) => write!(f, "could not flush report: {}", err),
            ReportError::Utf8(err) => write!(f, "report is not valid UTF-8: {}", err),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Csv(err) => Some(err),
            ReportError::Io(err) => Some(err),
            ReportError::Utf8(err) => Some(err),
        }
    }
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<ReportError> for ServiceError {
    fn from(err: ReportError) -> Self {
        ServiceError::Export(err.to_string())
    }
}

/// Rows as CSV with a header line.
pub fn rows_to_csv(rows: &[ReportRow]) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ReportError::Io(err.into_error()))?;
    String::from_utf8(bytes).map_err(ReportError::Utf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PatientId;
    use crate::workflows::radiology::domain::ResultStatus;
    use crate::workflows::DocStatus;
    use chrono::NaiveTime;

    fn order(id: &str, modality: Modality, status: OrderStatus, day: u32) -> RadiologyOrder {
        let order_date = NaiveDate::from_ymd_opt(2024, 3, day).expect("date");
        let order_time = NaiveTime::from_hms_opt(9, 0, 0).expect("time");
        RadiologyOrder {
            id: RadiologyOrderId::from(id),
            patient: PatientId::from("PAT-00001"),
            patient_name: "Asha Rao".to_string(),
            patient_sex: None,
            examination_type: ExaminationTypeId::from("Chest PA"),
            modality,
            body_part: None,
            practitioner: None,
            practitioner_name: Some("Dr. Sen".to_string()),
            priority: Priority::Routine,
            status,
            docstatus: DocStatus::Submitted,
            order_date,
            order_time,
            scheduled_date: None,
            scheduled_time: None,
            radiology_room: None,
            technician: None,
            clinical_history: None,
            rate: 400.0,
            invoiced: false,
            sales_invoice: None,
            hospital: None,
            created_at: order_date.and_time(order_time),
        }
    }

    fn result_for(order: &RadiologyOrder, hours_later: u32) -> RadiologyResult {
        let examined = order.ordered_at() + chrono::Duration::hours(i64::from(hours_later));
        RadiologyResult {
            id: RadiologyResultId::from("RR-00001"),
            radiology_order: Some(order.id.clone()),
            patient: order.patient.clone(),
            patient_name: order.patient_name.clone(),
            examination_type: order.examination_type.clone(),
            modality: order.modality,
            practitioner: None,
            practitioner_name: None,
            examination_date: examined.date(),
            examination_time: examined.time(),
            findings: None,
            impression: None,
            status: ResultStatus::PendingReview,
            docstatus: DocStatus::Submitted,
            reported_at: None,
            approved_by: None,
            approval_date: None,
            hospital: None,
            created_at: examined,
        }
    }

    #[test]
    fn summary_counts_and_turnaround() {
        let done = order("RO-00001", Modality::XRay, OrderStatus::Completed, 1);
        let waiting = order("RO-00002", Modality::XRay, OrderStatus::Ordered, 2);
        let scan = order("RO-00003", Modality::CtScan, OrderStatus::Cancelled, 3);
        let results = vec![result_for(&done, 5)];

        let report = build_report(vec![done, waiting, scan], &results);
        assert_eq!(report.data[0].name, RadiologyOrderId::from("RO-00003"));
        assert_eq!(report.summary.total_orders, 3);
        assert_eq!(report.summary.completed, 1);
        assert_eq!(report.summary.pending, 1);
        assert_eq!(report.summary.cancelled, 1);
        assert_eq!(report.summary.total_revenue, 1200.0);
        assert_eq!(report.summary.avg_turnaround, 5.0);

        let chart = report.chart.expect("chart");
        assert_eq!(chart.labels, vec!["X-Ray", "CT Scan"]);
        assert_eq!(chart.values, vec![2, 1]);
    }

    #[test]
    fn csv_uses_labels_and_blank_optionals() {
        let pending = order("RO-00002", Modality::XRay, OrderStatus::InProgress, 2);
        let report = build_report(vec![pending], &[]);
        let csv = rows_to_csv(&report.data).expect("csv");
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("name,order_date,patient_name,examination_type,modality,priority,status,practitioner_name,rate,invoiced,result_name,turnaround_hours")
        );
        assert_eq!(
            lines.next(),
            Some("RO-00002,2024-03-02,Asha Rao,Chest PA,X-Ray,Routine,In Progress,Dr. Sen,400.0,false,,")
        );
        assert!(report.chart.is_some());
    }

    #[test]
    fn filters_skip_drafts_and_other_modalities() {
        let mut draft = order("RO-00001", Modality::XRay, OrderStatus::Draft, 1);
        draft.docstatus = DocStatus::Draft;
        let scan = order("RO-00002", Modality::CtScan, OrderStatus::Ordered, 1);
        let filters = ReportFilters {
            modality: Some(Modality::CtScan),
            ..ReportFilters::default()
        };
        assert!(!filters.matches(&draft));
        assert!(filters.matches(&scan));
        assert!(!ReportFilters {
            from_date: NaiveDate::from_ymd_opt(2024, 3, 2),
            ..ReportFilters::default()
        }
        .matches(&scan));
    }
}
