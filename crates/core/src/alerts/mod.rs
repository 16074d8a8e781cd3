use serde::{Deserialize, Serialize};

use crate::{
    bus::{Subscription, Topic},
    config::AlertConfig,
    sampler::{NetworkClass, SignalSnapshot},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Fps,
    Memory,
    Battery,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

/// One threshold crossing. Not retained by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAlert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub recommendation: String,
    pub snapshot: SignalSnapshot,
}

/// Evaluates every snapshot against the alert thresholds and pushes the
/// resulting alerts to subscribers.
#[derive(Debug)]
pub struct PerformanceAlertBus {
    config: AlertConfig,
    topic: Topic<PerformanceAlert>,
}

impl Default for PerformanceAlertBus {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

impl PerformanceAlertBus {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            topic: Topic::new("performance-alert"),
        }
    }

    pub fn subscribe_to_alerts<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PerformanceAlert) + Send + Sync + 'static,
    {
        self.topic.subscribe(callback)
    }

    /// Checks each rule independently; several alerts may fire for one
    /// snapshot. Returns what was published.
    pub fn evaluate(&self, snapshot: &SignalSnapshot) -> Vec<PerformanceAlert> {
        let alerts = self.alerts_for(snapshot);
        for alert in &alerts {
            tracing::warn!(
                kind = ?alert.kind,
                severity = ?alert.severity,
                message = %alert.message,
                "performance alert"
            );
            self.topic.publish(alert);
        }
        alerts
    }

    /// Pure rule evaluation without publishing.
    pub fn alerts_for(&self, snapshot: &SignalSnapshot) -> Vec<PerformanceAlert> {
        let config = &self.config;
        let mut alerts = Vec::new();
        let alert = |kind, severity, message: String, recommendation: &str| PerformanceAlert {
            kind,
            severity,
            message,
            recommendation: recommendation.to_string(),
            snapshot: *snapshot,
        };

        if snapshot.fps < config.fps_high {
            alerts.push(alert(
                AlertKind::Fps,
                AlertSeverity::High,
                format!("Frame rate critically low: {:.0} fps", snapshot.fps),
                "Disable parallax and complex entrance effects.",
            ));
        } else if snapshot.fps < config.fps_medium {
            alerts.push(alert(
                AlertKind::Fps,
                AlertSeverity::Medium,
                format!("Frame rate below target: {:.0} fps", snapshot.fps),
                "Reduce the number of concurrent animations.",
            ));
        }

        if snapshot.memory_usage_ratio > config.memory_high_ratio {
            alerts.push(alert(
                AlertKind::Memory,
                AlertSeverity::High,
                format!(
                    "Memory usage high: {:.0}% of heap limit",
                    snapshot.memory_usage_ratio * 100.0
                ),
                "Release offscreen effects and cached animation frames.",
            ));
        }

        if snapshot.battery_level < config.battery_high_level {
            alerts.push(alert(
                AlertKind::Battery,
                AlertSeverity::High,
                format!("Battery low: {:.0}%", snapshot.battery_level * 100.0),
                "Switch to simple fallbacks to save power.",
            ));
        }

        if snapshot.network_class == NetworkClass::Slow {
            alerts.push(alert(
                AlertKind::Network,
                AlertSeverity::Medium,
                "Slow network connection detected".to_string(),
                "Serve compressed assets and lazy-load media.",
            ));
        }

        alerts
    }

    pub fn subscriber_count(&self) -> usize {
        self.topic.subscriber_count()
    }

    pub fn clear(&self) {
        self.topic.clear();
    }
}
