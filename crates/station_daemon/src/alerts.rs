use station_core::{
    emit, AlertSeverity, Counters, Event, EventEnvelope, MetricsRow, StationStatus,
};
use std::collections::{BTreeSet, VecDeque};

type RuleFn = fn(&VecDeque<MetricsRow>, &AlertEngine) -> bool;

struct AlertRule {
    id: &'static str,
    severity: AlertSeverity,
    check: RuleFn,
    message: &'static str,
    suggested_action: &'static str,
}

/// Parts a discard rate is measured over.
const DISCARD_WINDOW_PARTS: u64 = 20;

const RULES: &[AlertRule] = &[
    AlertRule {
        id: "PRESSURE_HIGH",
        severity: AlertSeverity::Warning,
        check: |h, engine| latest(h).is_some_and(|s| s.pressure_mbar >= engine.pressure_high_mbar),
        message: "Vessel pressure at or above the high threshold",
        suggested_action: "Open the pressure release valve",
    },
    AlertRule {
        id: "STATION_FAULT",
        severity: AlertSeverity::Critical,
        check: |h, _| latest(h).is_some_and(|s| s.status == StationStatus::Fault),
        message: "Station stopped with a fault",
        suggested_action: "Repair the station, then reset it",
    },
    AlertRule {
        id: "DISCARD_RATE_HIGH",
        severity: AlertSeverity::Warning,
        check: |h, _| {
            let Some(last) = latest(h) else {
                return false;
            };
            // newest sample at least a full window of parts before the latest
            h.iter()
                .rev()
                .find(|s| parts(s) + DISCARD_WINDOW_PARTS <= parts(last))
                .is_some_and(|base| {
                    let made = parts(last) - parts(base);
                    let discarded =
                        last.number_of_discarded_products - base.number_of_discarded_products;
                    discarded * 10 > made
                })
        },
        message: "More than 10% of recent parts were discarded",
        suggested_action: "Inspect the station and lengthen the ideal cycle time",
    },
];

// --- Helpers for querying recent samples ---

fn latest(h: &VecDeque<MetricsRow>) -> Option<&MetricsRow> {
    h.back()
}

fn parts(row: &MetricsRow) -> u64 {
    row.number_of_manufactured_products + row.number_of_discarded_products
}

// --- AlertEngine ---

pub struct AlertEngine {
    active: BTreeSet<String>,
    pressure_high_mbar: f64,
}

impl AlertEngine {
    pub fn new(pressure_high_mbar: f64) -> Self {
        Self {
            active: BTreeSet::new(),
            pressure_high_mbar,
        }
    }

    /// Returns current active alert IDs (for the /api/v1/alerts endpoint).
    pub fn active_alert_ids(&self) -> Vec<String> {
        self.active.iter().cloned().collect()
    }

    /// Evaluate all rules against recent samples. Returns events for state changes.
    pub fn evaluate(
        &mut self,
        history: &VecDeque<MetricsRow>,
        at_ms: u64,
        counters: &mut Counters,
    ) -> Vec<EventEnvelope> {
        let mut events = Vec::new();

        for rule in RULES {
            let fired = (rule.check)(history, self);
            let was_active = self.active.contains(rule.id);

            if fired && !was_active {
                self.active.insert(rule.id.to_string());
                events.push(emit(
                    counters,
                    at_ms,
                    Event::AlertRaised {
                        alert_id: rule.id.to_string(),
                        severity: rule.severity.clone(),
                        message: rule.message.to_string(),
                        suggested_action: rule.suggested_action.to_string(),
                    },
                ));
            } else if !fired && was_active {
                self.active.remove(rule.id);
                events.push(emit(
                    counters,
                    at_ms,
                    Event::AlertCleared {
                        alert_id: rule.id.to_string(),
                    },
                ));
            }
        }

        events
    }
}
