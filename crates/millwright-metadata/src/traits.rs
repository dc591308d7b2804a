//! Machine repository trait
//!
//! The web layer only sees this interface; [`crate::MetadataStore`] is the
//! SQLite implementation.

use async_trait::async_trait;
use millwright_core::types::{
    Department, Machine, MachineLog, MachineSummary, MachineUpdate, NewMachine, NewReport,
    StatusUpdate,
};
use millwright_core::Result;

#[async_trait]
pub trait MachineRepository: Send + Sync {
    // ============= Department Operations =============

    async fn list_departments(&self) -> Result<Vec<Department>>;
    async fn create_department(&self, dep_name: &str) -> Result<Department>;

    // ============= Machine Operations =============

    /// Machines with their latest status and position, ordered by id
    async fn list_machines(&self) -> Result<Vec<MachineSummary>>;
    async fn list_machine_ids(&self) -> Result<Vec<String>>;
    async fn get_machine(&self, m_id: &str) -> Result<Option<Machine>>;
    async fn machine_exists(&self, m_id: &str) -> Result<bool>;

    /// Insert the machine and its initial status entry atomically
    async fn create_machine(&self, machine: &NewMachine, signer: &str) -> Result<()>;

    /// Returns false when no machine has this id
    async fn update_machine(&self, m_id: &str, update: &MachineUpdate) -> Result<bool>;

    // ============= Log Operations =============

    async fn record_status(&self, update: &StatusUpdate, signer: &str) -> Result<i64>;
    async fn add_report(&self, report: &NewReport, signer: &str) -> Result<i64>;

    /// Maintenance reports, newest first
    async fn list_reports(&self) -> Result<Vec<MachineLog>>;
}
