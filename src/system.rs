use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type HomeId = String;
pub type SystemId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemCategory {
    Heating,
    Water,
    Ventilation,
    Electrical,
    Envelope,
}

impl SystemCategory {
    pub const ALL: [SystemCategory; 5] = [
        SystemCategory::Heating,
        SystemCategory::Water,
        SystemCategory::Ventilation,
        SystemCategory::Electrical,
        SystemCategory::Envelope,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemCategory::Heating => "heating",
            SystemCategory::Water => "water",
            SystemCategory::Ventilation => "ventilation",
            SystemCategory::Electrical => "electrical",
            SystemCategory::Envelope => "envelope",
        }
    }
}

impl fmt::Display for SystemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        SystemCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == needle)
            .ok_or_else(|| format!("unknown system category '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Home {
    pub id: HomeId,
    pub name: String,
    /// Weather region the home reads its temperature from.
    pub region: String,
}

impl Home {
    pub fn new(id: impl Into<HomeId>, name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            region: region.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionOutcome {
    Pass,
    NeedsAttention,
    Fail,
}

impl FromStr for InspectionOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Ok(InspectionOutcome::Pass),
            "needs_attention" | "attention" => Ok(InspectionOutcome::NeedsAttention),
            "fail" => Ok(InspectionOutcome::Fail),
            other => Err(format!("unknown inspection outcome '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub inspected_on: NaiveDate,
    pub outcome: InspectionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl InspectionRecord {
    pub fn new(inspected_on: NaiveDate, outcome: InspectionOutcome) -> Self {
        Self {
            inspected_on,
            outcome,
            notes: None,
        }
    }
}

/// A maintained system within a home. Health is never stored here; it is
/// derived from the system's task instances and inspections on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    pub id: SystemId,
    pub home_id: HomeId,
    pub name: String,
    pub category: SystemCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_service_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inspections: Vec<InspectionRecord>,
}

impl System {
    pub fn new(
        id: impl Into<SystemId>,
        home_id: impl Into<HomeId>,
        name: impl Into<String>,
        category: SystemCategory,
    ) -> Self {
        Self {
            id: id.into(),
            home_id: home_id.into(),
            name: name.into(),
            category,
            install_date: None,
            last_service_date: None,
            inspections: Vec::new(),
        }
    }

    pub fn installed_on(mut self, date: NaiveDate) -> Self {
        self.install_date = Some(date);
        self
    }

    pub fn serviced_on(mut self, date: NaiveDate) -> Self {
        self.last_service_date = Some(date);
        self
    }

    pub fn with_inspection(mut self, record: InspectionRecord) -> Self {
        self.inspections.push(record);
        self
    }

    /// Most recent inspection; ties on date resolve to the later entry.
    pub fn latest_inspection(&self) -> Option<&InspectionRecord> {
        self.inspections
            .iter()
            .enumerate()
            .max_by_key(|(idx, record)| (record.inspected_on, *idx))
            .map(|(_, record)| record)
    }

    /// Most recent date anyone touched the system, if known.
    pub fn service_reference_date(&self) -> Option<NaiveDate> {
        self.last_service_date.or(self.install_date)
    }

    /// Record a service visit without moving the date backwards.
    pub fn record_service(&mut self, date: NaiveDate) {
        match self.last_service_date {
            Some(existing) if existing >= date => {}
            _ => self.last_service_date = Some(date),
        }
    }
}
