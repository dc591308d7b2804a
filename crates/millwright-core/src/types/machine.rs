//! Machine types

use serde::{Deserialize, Serialize};

/// Machine master record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub m_id: String,
    pub m_name: String,
    pub m_desc: Option<String>,
    pub m_dep: Option<i64>,
}

/// Machine row as shown in the equipment list: master data joined with the
/// latest recorded status/position and the owning department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSummary {
    pub m_id: String,
    pub m_name: String,
    pub m_status: Option<String>,
    pub m_desc: Option<String>,
    pub m_pos: Option<String>,
    pub dep_name: Option<String>,
}

/// New machine with its initial status entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMachine {
    pub m_id: String,
    pub m_name: String,
    pub m_desc: Option<String>,
    pub m_dep: Option<i64>,
    pub m_status: Option<String>,
    pub m_pos: Option<String>,
}

impl NewMachine {
    pub fn new(m_id: impl Into<String>, m_name: impl Into<String>) -> Self {
        Self {
            m_id: m_id.into(),
            m_name: m_name.into(),
            m_desc: None,
            m_dep: None,
            m_status: None,
            m_pos: None,
        }
    }

    pub fn with_department(mut self, dep_id: i64) -> Self {
        self.m_dep = Some(dep_id);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>, position: impl Into<String>) -> Self {
        self.m_status = Some(status.into());
        self.m_pos = Some(position.into());
        self
    }
}

/// Editable machine master fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineUpdate {
    pub m_name: String,
    pub m_desc: Option<String>,
    pub m_dep: Option<i64>,
}

/// Status/position change for a machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub m_id: String,
    pub m_status: String,
    pub m_pos: Option<String>,
}
