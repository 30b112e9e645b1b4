use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feels_like_c: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl WeatherReading {
    pub fn new(temperature_c: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            temperature_c: Some(temperature_c),
            feels_like_c: None,
            observed_at,
        }
    }

    pub fn with_feels_like(mut self, feels_like_c: f64) -> Self {
        self.feels_like_c = Some(feels_like_c);
        self
    }
}

/// Source of current conditions per region. Fetching, retries and timeouts
/// are the provider's concern; the engine only sees resolved readings.
pub trait WeatherProvider: Send + Sync {
    fn current_reading(&self, region: &str) -> Option<WeatherReading>;
}

/// Provider backed by readings pushed in by the caller.
#[derive(Debug, Default)]
pub struct StaticWeather {
    readings: RwLock<HashMap<String, WeatherReading>>,
}

impl StaticWeather {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, region: impl Into<String>, reading: WeatherReading) {
        self.readings.write().insert(region.into(), reading);
    }

    pub fn clear(&self, region: &str) {
        self.readings.write().remove(region);
    }
}

impl WeatherProvider for StaticWeather {
    fn current_reading(&self, region: &str) -> Option<WeatherReading> {
        self.readings.read().get(region).cloned()
    }
}

/// No-op provider for callers without a weather feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWeather;

impl WeatherProvider for NoWeather {
    fn current_reading(&self, _region: &str) -> Option<WeatherReading> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnknownWeather {
    Missing,
    Malformed,
    Stale { age_minutes: i64 },
}

/// A reading after freshness and shape checks. Anything unusable is
/// `Unknown`, never a zero temperature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WeatherAssessment {
    Known {
        temperature_c: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feels_like_c: Option<f64>,
        observed_at: DateTime<Utc>,
    },
    Unknown(UnknownWeather),
}

impl WeatherAssessment {
    pub fn assess(
        reading: Option<&WeatherReading>,
        as_of: DateTime<Utc>,
        freshness: Duration,
    ) -> Self {
        let Some(reading) = reading else {
            return WeatherAssessment::Unknown(UnknownWeather::Missing);
        };
        let temperature_c = match reading.temperature_c {
            Some(value) if value.is_finite() => value,
            _ => return WeatherAssessment::Unknown(UnknownWeather::Malformed),
        };
        let age = as_of - reading.observed_at;
        if age > freshness {
            return WeatherAssessment::Unknown(UnknownWeather::Stale {
                age_minutes: age.num_minutes(),
            });
        }
        WeatherAssessment::Known {
            temperature_c,
            feels_like_c: reading.feels_like_c.filter(|v| v.is_finite()),
            observed_at: reading.observed_at,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, WeatherAssessment::Known { .. })
    }
}

/// Cold-snap state for one region, persisted between evaluations.
///
/// A snap starts when a reading is at or below the threshold and lasts until
/// a reading rises above it. Unknown readings leave the state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdSnapTracker {
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snap_started_at: Option<DateTime<Utc>>,
}

impl ColdSnapTracker {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            snap_started_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.snap_started_at.is_some()
    }

    pub fn observe(&self, assessment: &WeatherAssessment, threshold_c: f64) -> Self {
        let WeatherAssessment::Known {
            temperature_c,
            observed_at,
            ..
        } = assessment
        else {
            return self.clone();
        };

        let snap_started_at = if *temperature_c <= threshold_c {
            Some(self.snap_started_at.unwrap_or(*observed_at))
        } else {
            None
        };
        if snap_started_at != self.snap_started_at {
            debug!(
                target: "frostline",
                event = "cold_snap_transition",
                region = %self.region,
                active = snap_started_at.is_some()
            );
        }
        Self {
            region: self.region.clone(),
            snap_started_at,
        }
    }

    /// Dedup key for the current snap; changes only when a new snap begins.
    pub fn dedup_key(&self) -> Option<String> {
        self.snap_started_at.map(|started| {
            format!(
                "weather:{}:{}",
                self.region,
                started.format("%Y%m%dT%H%M%SZ")
            )
        })
    }
}

/// Everything the alert rules need to know about one region's weather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionWeather {
    pub region: String,
    pub assessment: WeatherAssessment,
    pub snap: ColdSnapTracker,
}

impl RegionWeather {
    /// Assess a raw reading and advance the region's snap tracker.
    pub fn evaluate(
        previous: ColdSnapTracker,
        reading: Option<&WeatherReading>,
        as_of: DateTime<Utc>,
        freshness: Duration,
        threshold_c: f64,
    ) -> Self {
        let assessment = WeatherAssessment::assess(reading, as_of, freshness);
        let snap = previous.observe(&assessment, threshold_c);
        Self {
            region: previous.region,
            assessment,
            snap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, hour, 0, 0).unwrap()
    }

    #[test]
    fn stale_and_malformed_readings_are_unknown() {
        let fresh = Duration::hours(3);
        let stale = WeatherReading::new(-30.0, t(1));
        assert_eq!(
            WeatherAssessment::assess(Some(&stale), t(5), fresh),
            WeatherAssessment::Unknown(UnknownWeather::Stale { age_minutes: 240 })
        );

        let malformed = WeatherReading {
            temperature_c: None,
            feels_like_c: Some(-40.0),
            observed_at: t(5),
        };
        assert_eq!(
            WeatherAssessment::assess(Some(&malformed), t(5), fresh),
            WeatherAssessment::Unknown(UnknownWeather::Malformed)
        );

        let nan = WeatherReading::new(f64::NAN, t(5));
        assert!(!WeatherAssessment::assess(Some(&nan), t(5), fresh).is_known());
        assert_eq!(
            WeatherAssessment::assess(None, t(5), fresh),
            WeatherAssessment::Unknown(UnknownWeather::Missing)
        );
    }

    #[test]
    fn snap_key_survives_continued_cold_and_resets_after_thaw() {
        let fresh = Duration::hours(3);
        let tracker = ColdSnapTracker::new("yellowknife");

        let first = tracker.observe(
            &WeatherAssessment::assess(Some(&WeatherReading::new(-25.0, t(1))), t(1), fresh),
            -20.0,
        );
        let key = first.dedup_key().unwrap();
        assert_eq!(key, "weather:yellowknife:20250110T010000Z");

        let still_cold = first.observe(
            &WeatherAssessment::assess(Some(&WeatherReading::new(-25.0, t(2))), t(2), fresh),
            -20.0,
        );
        assert_eq!(still_cold.dedup_key().as_deref(), Some(key.as_str()));

        let unknown = still_cold.observe(&WeatherAssessment::Unknown(UnknownWeather::Missing), -20.0);
        assert_eq!(unknown, still_cold);

        let thaw = unknown.observe(
            &WeatherAssessment::assess(Some(&WeatherReading::new(-10.0, t(3))), t(3), fresh),
            -20.0,
        );
        assert!(!thaw.is_active());

        let again = thaw.observe(
            &WeatherAssessment::assess(Some(&WeatherReading::new(-22.0, t(4))), t(4), fresh),
            -20.0,
        );
        assert_ne!(again.dedup_key().as_deref(), Some(key.as_str()));
        assert!(again.is_active());
    }

    #[test]
    fn threshold_is_inclusive() {
        let tracker = ColdSnapTracker::new("r");
        let at_threshold = tracker.observe(
            &WeatherAssessment::Known {
                temperature_c: -20.0,
                feels_like_c: None,
                observed_at: t(1),
            },
            -20.0,
        );
        assert!(at_threshold.is_active());
    }
}
