//! Shared serde-able domain types: priority levels, per-level maps, request ids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::AdmissionError;

/// Priority lanes, highest first. Lower numeric value means higher priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    /// Health checks and security-sensitive traffic.
    Critical = 0,
    /// Interactive traffic: protocol upgrades, auth flows.
    High = 1,
    /// Ordinary requests and mutations. The default lane.
    Normal = 2,
    /// Deferrable read traffic such as search and analytics.
    Low = 3,
    /// Maintenance-class work: backups, cleanup jobs.
    Background = 4,
}

impl PriorityLevel {
    /// All levels in ascending numeric order, highest priority first.
    pub const ALL: [Self; 5] = [
        Self::Critical,
        Self::High,
        Self::Normal,
        Self::Low,
        Self::Background,
    ];

    /// Number of priority lanes. Fixed; never extended at runtime.
    pub const COUNT: usize = 5;

    /// Lane index of this level.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Canonical lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for PriorityLevel {
    type Error = AdmissionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Critical),
            1 => Ok(Self::High),
            2 => Ok(Self::Normal),
            3 => Ok(Self::Low),
            4 => Ok(Self::Background),
            other => Err(AdmissionError::InvalidPriority(other.to_string())),
        }
    }
}

impl FromStr for PriorityLevel {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| s.eq_ignore_ascii_case(level.as_str()))
            .ok_or_else(|| AdmissionError::InvalidPriority(s.to_string()))
    }
}

/// One value per priority level, serialized as a named map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerPriority<T> {
    /// Value for [`PriorityLevel::Critical`].
    pub critical: T,
    /// Value for [`PriorityLevel::High`].
    pub high: T,
    /// Value for [`PriorityLevel::Normal`].
    pub normal: T,
    /// Value for [`PriorityLevel::Low`].
    pub low: T,
    /// Value for [`PriorityLevel::Background`].
    pub background: T,
}

impl<T> PerPriority<T> {
    /// Borrow the value for a level.
    pub const fn get(&self, level: PriorityLevel) -> &T {
        match level {
            PriorityLevel::Critical => &self.critical,
            PriorityLevel::High => &self.high,
            PriorityLevel::Normal => &self.normal,
            PriorityLevel::Low => &self.low,
            PriorityLevel::Background => &self.background,
        }
    }

    /// Mutably borrow the value for a level.
    pub fn get_mut(&mut self, level: PriorityLevel) -> &mut T {
        match level {
            PriorityLevel::Critical => &mut self.critical,
            PriorityLevel::High => &mut self.high,
            PriorityLevel::Normal => &mut self.normal,
            PriorityLevel::Low => &mut self.low,
            PriorityLevel::Background => &mut self.background,
        }
    }

    /// Build from a function of the level.
    pub fn from_fn(mut f: impl FnMut(PriorityLevel) -> T) -> Self {
        Self {
            critical: f(PriorityLevel::Critical),
            high: f(PriorityLevel::High),
            normal: f(PriorityLevel::Normal),
            low: f(PriorityLevel::Low),
            background: f(PriorityLevel::Background),
        }
    }

    /// Build with the same value in every slot.
    pub fn uniform(value: T) -> Self
    where
        T: Clone,
    {
        Self::from_fn(|_| value.clone())
    }
}

/// Opaque request identifier, unique within one scheduler's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// View as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
