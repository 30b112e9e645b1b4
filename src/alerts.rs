use crate::catalog::{Priority, TaskCatalog};
use crate::config::EngineConfig;
use crate::health::HealthScorer;
use crate::instance::TaskInstance;
use crate::status::days_overdue;
use crate::system::{InspectionOutcome, System, SystemId};
use crate::weather::{RegionWeather, WeatherAssessment};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

const ALERT_NAMESPACE: Uuid = Uuid::from_u128(0x2d7e_91c4_5b0a_4f3e_8c16_a9f2_047d_6b35);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Overdue,
    Weather,
    System,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    High,
    Critical,
}

impl fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertPriority::High => f.write_str("high"),
            AlertPriority::Critical => f.write_str("critical"),
        }
    }
}

/// The rule that produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRule {
    OverdueTask,
    ExtremeCold,
    SystemHealth,
    FailedInspection,
}

impl AlertRule {
    pub fn key_prefix(&self) -> &'static str {
        match self {
            AlertRule::OverdueTask => "overdue",
            AlertRule::ExtremeCold => "weather",
            AlertRule::SystemHealth => "system",
            AlertRule::FailedInspection => "urgent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub source: AlertRule,
    pub dedup_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<SystemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// When the underlying condition began; drives ordering.
    pub triggered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismissed_at: Option<DateTime<Utc>>,
}

struct AlertDraft {
    alert_type: AlertType,
    priority: AlertPriority,
    source: AlertRule,
    dedup_key: String,
    title: String,
    message: String,
    action: Option<String>,
    system_id: Option<SystemId>,
    region: Option<String>,
    triggered_at: DateTime<Utc>,
}

impl AlertDraft {
    fn into_alert(self, created_at: DateTime<Utc>) -> Alert {
        Alert {
            id: Uuid::new_v5(&ALERT_NAMESPACE, self.dedup_key.as_bytes()),
            alert_type: self.alert_type,
            priority: self.priority,
            title: self.title,
            message: self.message,
            action: self.action,
            source: self.source,
            dedup_key: self.dedup_key,
            system_id: self.system_id,
            region: self.region,
            triggered_at: self.triggered_at,
            created_at,
            dismissed_at: None,
        }
    }
}

/// Everything the alert rules read. All of it is resolved data; no rule
/// performs I/O.
pub struct AlertInputs<'a> {
    pub systems: &'a [System],
    pub instances: &'a [TaskInstance],
    pub weather: &'a [RegionWeather],
    pub dismissed: &'a HashSet<String>,
    pub catalog: &'a TaskCatalog,
    pub config: &'a EngineConfig,
    pub as_of: DateTime<Utc>,
}

/// Alerts for one evaluation, plus every dedup key whose condition is
/// still present, dismissed or not.
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluation {
    pub alerts: Vec<Alert>,
    pub live_keys: HashSet<String>,
}

impl AlertEvaluation {
    /// Dismissed keys whose condition has cleared.
    pub fn stale_dismissals(&self, dismissed: &HashSet<String>) -> Vec<String> {
        let mut stale: Vec<String> = dismissed
            .iter()
            .filter(|key| !self.live_keys.contains(*key))
            .cloned()
            .collect();
        stale.sort();
        stale
    }
}

/// Derive the current alerts, minus any whose dedup key was dismissed.
///
/// Output is ordered critical before high, then by most recent triggering
/// condition, then by dedup key.
pub fn derive_alerts(inputs: &AlertInputs<'_>) -> Vec<Alert> {
    evaluate_alerts(inputs).alerts
}

/// Like [`derive_alerts`], also reporting which conditions are live.
///
/// A cold snap stays live while its tracker is open, even when the current
/// reading is unknown, so stale weather never clears a dismissal.
pub fn evaluate_alerts(inputs: &AlertInputs<'_>) -> AlertEvaluation {
    let mut drafts = Vec::new();
    drafts.extend(overdue_rule(inputs));
    drafts.extend(weather_rule(inputs));
    drafts.extend(system_rule(inputs));
    drafts.extend(inspection_rule(inputs));

    let mut live_keys: HashSet<String> =
        drafts.iter().map(|draft| draft.dedup_key.clone()).collect();
    live_keys.extend(inputs.weather.iter().filter_map(|region| region.snap.dedup_key()));

    let mut seen = HashSet::new();
    let mut alerts: Vec<Alert> = drafts
        .into_iter()
        .filter(|draft| {
            if inputs.dismissed.contains(&draft.dedup_key) {
                debug!(target: "frostline", event = "alert_suppressed", dedup_key = %draft.dedup_key);
                return false;
            }
            seen.insert(draft.dedup_key.clone())
        })
        .map(|draft| draft.into_alert(inputs.as_of))
        .collect();

    sort_alerts(&mut alerts);
    AlertEvaluation { alerts, live_keys }
}

pub fn sort_alerts(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.triggered_at.cmp(&a.triggered_at))
            .then_with(|| a.dedup_key.cmp(&b.dedup_key))
    });
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_time(chrono::NaiveTime::MIN), Utc)
}

fn system_name<'a>(systems: &'a [System], system_id: &'a str) -> &'a str {
    systems
        .iter()
        .find(|system| system.id == system_id)
        .map(|system| system.name.as_str())
        .unwrap_or(system_id)
}

fn overdue_rule(inputs: &AlertInputs<'_>) -> Vec<AlertDraft> {
    let as_of = inputs.as_of.date_naive();
    inputs
        .instances
        .iter()
        .filter(|instance| instance.is_open() && instance.priority == Priority::High)
        .filter(|instance| as_of > instance.due_date)
        .map(|instance| {
            let late_by = days_overdue(instance.due_date, as_of);
            let critical_after = inputs.config.critical_window(inputs.catalog, instance);
            let (priority, bucket, entered_on) = if late_by > critical_after {
                (
                    AlertPriority::Critical,
                    "critical",
                    instance.due_date + Duration::days(critical_after + 1),
                )
            } else {
                (
                    AlertPriority::High,
                    "high",
                    instance.due_date + Duration::days(1),
                )
            };
            let name = system_name(inputs.systems, &instance.system_id);
            AlertDraft {
                alert_type: AlertType::Overdue,
                priority,
                source: AlertRule::OverdueTask,
                dedup_key: format!(
                    "{}:{}:{}:{}:{bucket}",
                    AlertRule::OverdueTask.key_prefix(),
                    instance.system_id,
                    instance.definition_id,
                    instance.due_date
                ),
                title: format!("{} is overdue", instance.title),
                message: format!(
                    "{} for {name} was due on {} and is {late_by} day(s) overdue.",
                    instance.title, instance.due_date
                ),
                action: Some(format!("Complete or reschedule {}", instance.title)),
                system_id: Some(instance.system_id.clone()),
                region: None,
                triggered_at: start_of_day(entered_on),
            }
        })
        .collect()
}

fn weather_rule(inputs: &AlertInputs<'_>) -> Vec<AlertDraft> {
    let threshold = inputs.config.extreme_cold_threshold_c;
    inputs
        .weather
        .iter()
        .filter_map(|region| {
            let WeatherAssessment::Known {
                temperature_c,
                feels_like_c,
                ..
            } = &region.assessment
            else {
                debug!(
                    target: "frostline",
                    event = "weather_rule_disabled",
                    region = %region.region
                );
                return None;
            };
            if *temperature_c > threshold {
                return None;
            }
            let dedup_key = region.snap.dedup_key()?;
            let started = region.snap.snap_started_at?;
            let feels = feels_like_c
                .map(|value| format!(" (feels like {value:.0}°C)"))
                .unwrap_or_default();
            Some(AlertDraft {
                alert_type: AlertType::Weather,
                priority: AlertPriority::Critical,
                source: AlertRule::ExtremeCold,
                dedup_key,
                title: format!("Extreme cold in {}", region.region),
                message: format!(
                    "Temperature is {temperature_c:.0}°C{feels}, at or below {threshold:.0}°C. \
                     Check freeze protection: heat trace, pipe insulation and furnace operation."
                ),
                action: Some("Run freeze-protection checks".to_string()),
                system_id: None,
                region: Some(region.region.clone()),
                triggered_at: started,
            })
        })
        .collect()
}

fn system_rule(inputs: &AlertInputs<'_>) -> Vec<AlertDraft> {
    let scorer = HealthScorer::new(inputs.catalog, inputs.config);
    let as_of = inputs.as_of.date_naive();
    inputs
        .systems
        .iter()
        .filter_map(|system| {
            let score = scorer.system_score(system, inputs.instances, as_of).score?;
            let (priority, bucket) = if score < inputs.config.system_alert_critical_below {
                (AlertPriority::Critical, "critical")
            } else if score < inputs.config.system_alert_high_below {
                (AlertPriority::High, "high")
            } else {
                return None;
            };
            Some(AlertDraft {
                alert_type: AlertType::System,
                priority,
                source: AlertRule::SystemHealth,
                dedup_key: format!(
                    "{}:{}:{bucket}",
                    AlertRule::SystemHealth.key_prefix(),
                    system.id
                ),
                title: format!("{} health is low", system.name),
                message: format!(
                    "{} ({}) scores {score:.0}/100.",
                    system.name, system.category
                ),
                action: Some(format!("Schedule service for {}", system.name)),
                system_id: Some(system.id.clone()),
                region: None,
                triggered_at: inputs.as_of,
            })
        })
        .collect()
}

fn inspection_rule(inputs: &AlertInputs<'_>) -> Vec<AlertDraft> {
    inputs
        .systems
        .iter()
        .filter_map(|system| {
            let record = system.latest_inspection()?;
            if record.outcome != InspectionOutcome::Fail {
                return None;
            }
            let notes = record
                .notes
                .as_deref()
                .map(|notes| format!(" Notes: {notes}"))
                .unwrap_or_default();
            Some(AlertDraft {
                alert_type: AlertType::Urgent,
                priority: AlertPriority::Critical,
                source: AlertRule::FailedInspection,
                dedup_key: format!(
                    "{}:{}:{}",
                    AlertRule::FailedInspection.key_prefix(),
                    system.id,
                    record.inspected_on
                ),
                title: format!("{} failed inspection", system.name),
                message: format!(
                    "{} failed its inspection on {}.{notes}",
                    system.name, record.inspected_on
                ),
                action: Some("Book a licensed technician".to_string()),
                system_id: Some(system.id.clone()),
                region: None,
                triggered_at: start_of_day(record.inspected_on),
            })
        })
        .collect()
}
