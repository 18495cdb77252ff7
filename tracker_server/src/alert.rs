//! Threshold alerts.
//!
//! `evaluate` is the pure rule: given the previous and current price and a
//! threshold in percent it decides whether the move is an alert. The
//! `AlertMonitor` applies it to every fresh `Stock` and performs the side
//! effects in order: store the alert (failures are logged and counted only),
//! publish it to the hub, and offer the message to the bounded notification
//! queue, dropping it with a warning when the queue is full.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, error, info, warn};
use tracker_common::{Alert, AlertType, Stock};

use crate::hub::HubHandle;
use crate::metrics::Metrics;
use crate::store::Repository;

/// Outcome of a threshold crossing, before it becomes an `Alert`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertDecision {
    pub alert_type: AlertType,
    /// Percent move from `previous_price` to `current_price`.
    pub change_percent: f64,
    pub previous_price: f64,
    pub current_price: f64,
    pub threshold: f64,
}

impl AlertDecision {
    /// `"<symbol> changed by <pct>% (from $<previous> to $<current>)"`.
    pub fn message(&self, symbol: &str) -> String {
        format!(
            "{} changed by {:.2}% (from ${:.2} to ${:.2})",
            symbol, self.change_percent, self.previous_price, self.current_price
        )
    }

    pub fn into_alert(self, symbol: &str, triggered_at: DateTime<Utc>) -> Alert {
        Alert {
            symbol: symbol.to_string(),
            alert_type: self.alert_type,
            threshold: self.threshold,
            message: self.message(symbol),
            triggered_at,
        }
    }
}

/// Decide whether a move from `previous_price` to `current_price` crosses
/// `threshold` percent in either direction. A zero previous price means there
/// is no baseline yet and never alerts. Moves of exactly the threshold do not
/// alert.
pub fn evaluate(previous_price: f64, current_price: f64, threshold: f64) -> Option<AlertDecision> {
    if previous_price == 0.0 {
        return None;
    }
    let change_percent = (current_price - previous_price) / previous_price * 100.0;
    let alert_type = if change_percent > threshold {
        AlertType::Increase
    } else if change_percent < -threshold {
        AlertType::Decrease
    } else {
        return None;
    };
    Some(AlertDecision {
        alert_type,
        change_percent,
        previous_price,
        current_price,
        threshold,
    })
}

/// Applies `evaluate` to fresh stock state and fans out triggered alerts.
pub struct AlertMonitor {
    threshold: f64,
    repo: Arc<dyn Repository>,
    hub: HubHandle,
    metrics: Arc<Metrics>,
    notifications: Sender<String>,
}

impl AlertMonitor {
    /// Build a monitor and the receiving end of its notification queue.
    pub fn new(
        threshold: f64,
        notification_capacity: usize,
        repo: Arc<dyn Repository>,
        hub: HubHandle,
        metrics: Arc<Metrics>,
    ) -> (Self, Receiver<String>) {
        let (notifications, inbox) = bounded(notification_capacity.max(1));
        let monitor = Self {
            threshold,
            repo,
            hub,
            metrics,
            notifications,
        };
        (monitor, inbox)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Evaluate `stock` and, on a crossing, persist, publish and notify.
    pub fn check(&self, stock: &Stock) -> Option<Alert> {
        let decision = evaluate(stock.previous_price, stock.current_price, self.threshold)?;
        let alert = decision.into_alert(&stock.symbol, Utc::now());
        self.metrics.record_alert(alert.alert_type);

        if let Err(e) = self.repo.save_alert(&alert) {
            self.metrics.record_persistence_failure();
            error!("Failed to save alert for {}: {}", alert.symbol, e);
        }

        self.hub.publish_alert(&alert);

        match self.notifications.try_send(alert.message.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.record_notification_dropped();
                warn!("Alert channel full, dropping alert for {}", alert.symbol);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Alert notifier stopped, alert for {} not queued", alert.symbol);
            }
        }
        Some(alert)
    }
}

/// Drain the notification queue on a dedicated thread, logging each alert.
/// The thread ends once every `AlertMonitor` holding the sender is dropped.
pub fn spawn_notifier(inbox: Receiver<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        for message in inbox.iter() {
            warn!("Price alert triggered: {}", message);
        }
        info!("Alert notifier stopped");
    })
}
