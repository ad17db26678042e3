use chrono::NaiveDate;
use hospital_saas::events::{Notifier, NotifyError, OutboundMessage};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Writes outbound SMS and e-mail to the log instead of a gateway.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, message: OutboundMessage) -> Result<(), NotifyError> {
        info!(
            channel = ?message.channel,
            recipient = %message.recipient,
            subject = message.subject.as_deref().unwrap_or(""),
            "outbound notification"
        );
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_trims_and_reports_bad_input() {
        assert_eq!(
            parse_date(" 2024-03-01 "),
            Ok(NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"))
        );
        let err = parse_date("03/01/2024").expect_err("rejected");
        assert!(err.contains("YYYY-MM-DD"));
    }
}
