// Operator alerts for failures that must not be retried blindly.

use std::sync::Mutex;

use log::error;
use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::core::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    HierarchyCorruption,
    Configuration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    /// Purchase id, wallet or tier the alert is about
    pub subject: String,
    pub message: String,
}

impl Alert {
    /// Alert for a structural error, None for anything retryable or user facing
    pub fn from_error(subject: impl Into<String>, err: &LedgerError) -> Option<Self> {
        let kind = match err {
            LedgerError::HierarchyCorruption { .. } => AlertKind::HierarchyCorruption,
            LedgerError::Configuration(_) => AlertKind::Configuration,
            _ => return None,
        };

        Some(Self {
            kind,
            subject: subject.into(),
            message: err.to_string(),
        })
    }
}

pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: &Alert);
}

/// Default sink, writes alerts to the `alert` log target
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn raise(&self, alert: &Alert) {
        error!(target: "alert", "[{}] {}: {}", alert.kind, alert.subject, alert.message);
    }
}

/// Keeps every alert in memory
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }
}

impl AlertSink for RecordingAlertSink {
    fn raise(&self, alert: &Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeshare_common::crypto::Address;

    #[test]
    fn test_only_structural_errors_alert() {
        let corruption = LedgerError::corruption(&Address::new("w").unwrap(), "loop");
        let alert = Alert::from_error("order-1", &corruption).unwrap();
        assert_eq!(alert.kind, AlertKind::HierarchyCorruption);
        assert_eq!(alert.subject, "order-1");

        assert!(Alert::from_error("x", &LedgerError::InvalidAmount(0)).is_none());
        assert!(
            Alert::from_error("x", &LedgerError::LockTimeout(Default::default())).is_none()
        );
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingAlertSink::new();
        sink.raise(&Alert {
            kind: AlertKind::Configuration,
            subject: "gold".into(),
            message: "unknown tier".into(),
        });
        assert_eq!(sink.alerts().len(), 1);
    }
}
