//! Maintenance report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the machine log (status changes and maintenance reports)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineLog {
    pub log_id: i64,
    pub m_id: String,
    pub m_name: Option<String>,
    pub m_status: Option<String>,
    pub m_pos: Option<String>,
    pub log_sign: String,
    pub log_type: Option<String>,
    pub log_desc: Option<String>,
    pub log_time: DateTime<Utc>,
}

/// Maintenance report as submitted through the report form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub m_id: String,
    pub log_type: String,
    pub log_desc: String,
    #[serde(default)]
    pub checked: Vec<InspectionItem>,
}

impl NewReport {
    /// Description stored with the report, prefixed by the checked items
    pub fn combined_description(&self) -> String {
        if self.checked.is_empty() {
            return self.log_desc.clone();
        }

        let labels: Vec<&str> = self.checked.iter().map(|item| item.label()).collect();
        format!("Checked: {}\n{}", labels.join(", "), self.log_desc)
    }
}

/// Inspection checklist items; the discriminant is the form flag value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum InspectionItem {
    Lubrication = 1,
    Cleaning = 2,
    IndicatorLights = 4,
    Electrical = 8,
    Hydraulics = 16,
    Noise = 32,
    BedClearance = 64,
    ScrewClearance = 128,
    BearingClearance = 256,
}

impl InspectionItem {
    pub const ALL: [InspectionItem; 9] = [
        Self::Lubrication,
        Self::Cleaning,
        Self::IndicatorLights,
        Self::Electrical,
        Self::Hydraulics,
        Self::Noise,
        Self::BedClearance,
        Self::ScrewClearance,
        Self::BearingClearance,
    ];

    pub fn flag(&self) -> u32 {
        *self as u32
    }

    pub fn from_flag(flag: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.flag() == flag)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Lubrication => "lubrication added",
            Self::Cleaning => "machine cleaned",
            Self::IndicatorLights => "indicator lights",
            Self::Electrical => "electrical normal",
            Self::Hydraulics => "hydraulics normal",
            Self::Noise => "noise normal",
            Self::BedClearance => "bed clearance",
            Self::ScrewClearance => "screw clearance",
            Self::BearingClearance => "bearing clearance",
        }
    }

    /// Parse submitted flag values, dropping unknown or malformed ones
    pub fn parse_flags<I, S>(values: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut items = Vec::new();
        for value in values {
            if let Some(item) = value
                .as_ref()
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(Self::from_flag)
            {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
        }
        items
    }
}
