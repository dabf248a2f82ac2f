// raidwall/src/metrics.rs
//
// Operational counters, rendered in Prometheus text exposition format.
//
//   raidwall_joins_total{outcome}     Counter  joins by handling outcome
//   raidwall_escalations_total        Counter  incidents triggered
//   raidwall_audit_flushes_total      Counter  join logs flushed on expiry
//   raidwall_alerts_delivered_total   Counter  direct raid alerts delivered
//   raidwall_spaces_tracked           Gauge    live guild states
//   raidwall_incidents_live           Gauge    live trigger records
//
// Endpoint: GET /metrics on the port given by --metrics-port.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::info;

use crate::engine::antiraid::{Antiraid, JoinOutcome};

#[derive(Debug, Default)]
pub struct RaidMetrics {
    pub joins:            AtomicU64,
    pub inactive:         AtomicU64,
    pub settings_errors:  AtomicU64,
    pub duplicates:       AtomicU64,
    pub allowed:          AtomicU64,
    pub incident_joins:   AtomicU64,
    pub escalations:      AtomicU64,
    pub audit_flushes:    AtomicU64,
    pub alerts_delivered: AtomicU64,
}

impl RaidMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_outcome(&self, outcome: &JoinOutcome) {
        self.joins.fetch_add(1, Ordering::Relaxed);
        match outcome {
            JoinOutcome::Inactive            => self.inactive.fetch_add(1, Ordering::Relaxed),
            JoinOutcome::SettingsUnavailable => self.settings_errors.fetch_add(1, Ordering::Relaxed),
            JoinOutcome::Duplicate           => self.duplicates.fetch_add(1, Ordering::Relaxed),
            JoinOutcome::Allowed             => self.allowed.fetch_add(1, Ordering::Relaxed),
            JoinOutcome::IncidentJoin { .. } => self.incident_joins.fetch_add(1, Ordering::Relaxed),
            JoinOutcome::Escalated(report)   => {
                self.alerts_delivered.fetch_add(report.delivered as u64, Ordering::Relaxed);
                self.escalations.fetch_add(1, Ordering::Relaxed)
            }
        };
    }

    pub fn record_flush(&self) {
        self.audit_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn prometheus_text(&self, spaces_tracked: usize, incidents_live: usize) -> String {
        let mut out = String::with_capacity(2048);

        macro_rules! counter {
            ($name:expr, $help:expr, $val:expr) => {
                out.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
                    $name, $help, $name, $name, $val
                ));
            };
        }
        macro_rules! gauge {
            ($name:expr, $help:expr, $val:expr) => {
                out.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} gauge\n{} {}\n",
                    $name, $help, $name, $name, $val
                ));
            };
        }

        out.push_str("# HELP raidwall_joins_total Join events by handling outcome\n");
        out.push_str("# TYPE raidwall_joins_total counter\n");
        for (outcome, counter) in [
            ("inactive",        &self.inactive),
            ("settings_error",  &self.settings_errors),
            ("duplicate",       &self.duplicates),
            ("allowed",         &self.allowed),
            ("incident",        &self.incident_joins),
            ("escalated",       &self.escalations),
        ] {
            out.push_str(&format!(
                "raidwall_joins_total{{outcome=\"{}\"}} {}\n",
                outcome, counter.load(Ordering::Relaxed)
            ));
        }

        counter!(
            "raidwall_escalations_total",
            "Raid incidents triggered",
            self.escalations.load(Ordering::Relaxed)
        );
        counter!(
            "raidwall_audit_flushes_total",
            "Join logs flushed at incident end",
            self.audit_flushes.load(Ordering::Relaxed)
        );
        counter!(
            "raidwall_alerts_delivered_total",
            "Direct raid alerts delivered to owners and admins",
            self.alerts_delivered.load(Ordering::Relaxed)
        );
        gauge!("raidwall_spaces_tracked", "Spaces with live burst state", spaces_tracked);
        gauge!("raidwall_incidents_live", "Spaces inside a raid incident window", incidents_live);

        out
    }
}

// ── HTTP /metrics endpoint ────────────────────────────────────────────────────

pub struct MetricsServer {
    antiraid: Arc<Antiraid>,
    addr:     SocketAddr,
}

impl MetricsServer {
    pub fn new(antiraid: Arc<Antiraid>, addr: SocketAddr) -> Self {
        Self { antiraid, addr }
    }

    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("/metrics endpoint listening on {}", self.addr);

        loop {
            let (mut stream, _) = listener.accept().await?;
            let antiraid = Arc::clone(&self.antiraid);

            tokio::spawn(async move {
                let body = antiraid.metrics()
                    .prometheus_text(antiraid.tracked_spaces(), antiraid.live_incidents());
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(), body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    }
}
