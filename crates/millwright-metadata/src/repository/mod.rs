//! Metadata repository

use crate::traits::MachineRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use millwright_core::types::{
    Department, Machine, MachineLog, MachineSummary, MachineUpdate, NewMachine, NewReport,
    StatusUpdate,
};
use millwright_core::{Error, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

type LogRow = (
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn db_err(e: sqlx::Error) -> Error {
    Error::DatabaseError(e.to_string())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DatabaseError(format!("Invalid log_time {:?}: {}", value, e)))
}

fn log_from_row(r: LogRow) -> Result<MachineLog> {
    Ok(MachineLog {
        log_id: r.0,
        m_id: r.1,
        m_name: r.2,
        m_status: r.3,
        m_pos: r.4,
        log_sign: r.5,
        log_type: r.6,
        log_desc: r.7,
        log_time: parse_time(&r.8)?,
    })
}

pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Private in-memory database; a single connection keeps it shared
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:", 1).await
    }

    /// Connection pool, shared with the HTTP session store
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS department (
                dep_id INTEGER PRIMARY KEY AUTOINCREMENT,
                dep_name TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mach_list (
                m_id TEXT PRIMARY KEY,
                m_name TEXT NOT NULL,
                m_desc TEXT,
                m_dep INTEGER REFERENCES department(dep_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        // Status changes and maintenance reports share this table.
        // Status rows carry m_status/m_pos, report rows carry log_type.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mach_tlb (
                log_id INTEGER PRIMARY KEY AUTOINCREMENT,
                m_id TEXT NOT NULL,
                m_status TEXT,
                m_pos TEXT,
                log_sign TEXT NOT NULL,
                log_type TEXT,
                log_desc TEXT,
                log_time TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_mach_tlb_machine ON mach_tlb(m_id, log_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        info!("Metadata store initialized");
        Ok(())
    }

    // Department operations
    pub async fn list_departments(&self) -> Result<Vec<Department>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as(r#"SELECT dep_id, dep_name FROM department ORDER BY dep_id"#)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(dep_id, dep_name)| Department { dep_id, dep_name })
            .collect())
    }

    pub async fn create_department(&self, dep_name: &str) -> Result<Department> {
        let result = sqlx::query(r#"INSERT INTO department (dep_name) VALUES (?)"#)
            .bind(dep_name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let dep_id = result.last_insert_rowid();
        debug!("Created department {}: {}", dep_id, dep_name);

        Ok(Department {
            dep_id,
            dep_name: dep_name.to_string(),
        })
    }

    async fn check_department(&self, dep_id: Option<i64>) -> Result<()> {
        let Some(dep_id) = dep_id else {
            return Ok(());
        };

        let count: (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM department WHERE dep_id = ?"#)
            .bind(dep_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        if count.0 == 0 {
            return Err(Error::NoSuchDepartment(dep_id));
        }
        Ok(())
    }

    // Machine operations
    pub async fn list_machines(&self) -> Result<Vec<MachineSummary>> {
        let rows: Vec<(
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        )> = sqlx::query_as(
            r#"
            SELECT m.m_id, m.m_name, s.m_status, m.m_desc, s.m_pos, d.dep_name
            FROM mach_list m
            LEFT JOIN mach_tlb s ON s.log_id = (
                SELECT MAX(t.log_id) FROM mach_tlb t
                WHERE t.m_id = m.m_id AND t.m_status IS NOT NULL
            )
            LEFT JOIN department d ON d.dep_id = m.m_dep
            ORDER BY m.m_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| MachineSummary {
                m_id: r.0,
                m_name: r.1,
                m_status: r.2,
                m_desc: r.3,
                m_pos: r.4,
                dep_name: r.5,
            })
            .collect())
    }

    pub async fn list_machine_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(r#"SELECT m_id FROM mach_list ORDER BY m_id"#)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn get_machine(&self, m_id: &str) -> Result<Option<Machine>> {
        let row: Option<(String, String, Option<String>, Option<i64>)> = sqlx::query_as(
            r#"SELECT m_id, m_name, m_desc, m_dep FROM mach_list WHERE m_id = ?"#,
        )
        .bind(m_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| Machine {
            m_id: r.0,
            m_name: r.1,
            m_desc: r.2,
            m_dep: r.3,
        }))
    }

    pub async fn machine_exists(&self, m_id: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM mach_list WHERE m_id = ?"#)
            .bind(m_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(count.0 > 0)
    }

    pub async fn create_machine(&self, machine: &NewMachine, signer: &str) -> Result<()> {
        self.check_department(machine.m_dep).await?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO mach_list (m_id, m_name, m_desc, m_dep)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&machine.m_id)
        .bind(&machine.m_name)
        .bind(&machine.m_desc)
        .bind(machine.m_dep)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false);
            if duplicate {
                Error::MachineAlreadyExists(machine.m_id.clone())
            } else {
                db_err(e)
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO mach_tlb (m_id, m_status, m_pos, log_sign, log_time)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&machine.m_id)
        .bind(machine.m_status.as_deref().unwrap_or("idle"))
        .bind(&machine.m_pos)
        .bind(signer)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        debug!("Created machine: {}", machine.m_id);
        Ok(())
    }

    pub async fn update_machine(&self, m_id: &str, update: &MachineUpdate) -> Result<bool> {
        self.check_department(update.m_dep).await?;

        let result = sqlx::query(
            r#"UPDATE mach_list SET m_name = ?, m_desc = ?, m_dep = ? WHERE m_id = ?"#,
        )
        .bind(&update.m_name)
        .bind(&update.m_desc)
        .bind(update.m_dep)
        .bind(m_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let updated = result.rows_affected() > 0;
        debug!("Update machine {}: affected={}", m_id, updated);
        Ok(updated)
    }

    // Log operations
    pub async fn record_status(&self, update: &StatusUpdate, signer: &str) -> Result<i64> {
        if !self.machine_exists(&update.m_id).await? {
            return Err(Error::NoSuchMachine(update.m_id.clone()));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO mach_tlb (m_id, m_status, m_pos, log_sign, log_time)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&update.m_id)
        .bind(&update.m_status)
        .bind(&update.m_pos)
        .bind(signer)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("Recorded status {} for {}", update.m_status, update.m_id);
        Ok(result.last_insert_rowid())
    }

    pub async fn add_report(&self, report: &NewReport, signer: &str) -> Result<i64> {
        if !self.machine_exists(&report.m_id).await? {
            return Err(Error::NoSuchMachine(report.m_id.clone()));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO mach_tlb (m_id, log_sign, log_type, log_desc, log_time)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.m_id)
        .bind(signer)
        .bind(&report.log_type)
        .bind(report.combined_description())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("Added {} report for {}", report.log_type, report.m_id);
        Ok(result.last_insert_rowid())
    }

    pub async fn list_reports(&self) -> Result<Vec<MachineLog>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT t.log_id, t.m_id, m.m_name, t.m_status, t.m_pos,
                   t.log_sign, t.log_type, t.log_desc, t.log_time
            FROM mach_tlb t
            LEFT JOIN mach_list m ON m.m_id = t.m_id
            WHERE t.log_type IS NOT NULL
            ORDER BY t.log_time DESC, t.log_id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(log_from_row).collect()
    }
}

#[async_trait]
impl MachineRepository for MetadataStore {
    async fn list_departments(&self) -> Result<Vec<Department>> {
        MetadataStore::list_departments(self).await
    }

    async fn create_department(&self, dep_name: &str) -> Result<Department> {
        MetadataStore::create_department(self, dep_name).await
    }

    async fn list_machines(&self) -> Result<Vec<MachineSummary>> {
        MetadataStore::list_machines(self).await
    }

    async fn list_machine_ids(&self) -> Result<Vec<String>> {
        MetadataStore::list_machine_ids(self).await
    }

    async fn get_machine(&self, m_id: &str) -> Result<Option<Machine>> {
        MetadataStore::get_machine(self, m_id).await
    }

    async fn machine_exists(&self, m_id: &str) -> Result<bool> {
        MetadataStore::machine_exists(self, m_id).await
    }

    async fn create_machine(&self, machine: &NewMachine, signer: &str) -> Result<()> {
        MetadataStore::create_machine(self, machine, signer).await
    }

    async fn update_machine(&self, m_id: &str, update: &MachineUpdate) -> Result<bool> {
        MetadataStore::update_machine(self, m_id, update).await
    }

    async fn record_status(&self, update: &StatusUpdate, signer: &str) -> Result<i64> {
        MetadataStore::record_status(self, update, signer).await
    }

    async fn add_report(&self, report: &NewReport, signer: &str) -> Result<i64> {
        MetadataStore::add_report(self, report, signer).await
    }

    async fn list_reports(&self) -> Result<Vec<MachineLog>> {
        MetadataStore::list_reports(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millwright_core::types::InspectionItem;

    async fn store() -> MetadataStore {
        MetadataStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_machines() {
        let store = store().await;
        let dep = store.create_department("Milling").await.unwrap();

        store
            .create_machine(
                &NewMachine::new("M-02", "Lathe")
                    .with_department(dep.dep_id)
                    .with_status("running", "Hall B"),
                "Mary Major",
            )
            .await
            .unwrap();
        store
            .create_machine(&NewMachine::new("M-01", "Drill press"), "Mary Major")
            .await
            .unwrap();

        let machines = store.list_machines().await.unwrap();
        assert_eq!(machines.len(), 2);
        assert_eq!(machines[0].m_id, "M-01");
        assert_eq!(machines[0].m_status.as_deref(), Some("idle"));
        assert_eq!(machines[0].dep_name, None);
        assert_eq!(machines[1].m_status.as_deref(), Some("running"));
        assert_eq!(machines[1].m_pos.as_deref(), Some("Hall B"));
        assert_eq!(machines[1].dep_name.as_deref(), Some("Milling"));

        assert_eq!(store.list_machine_ids().await.unwrap(), vec!["M-01", "M-02"]);
    }

    #[tokio::test]
    async fn test_duplicate_machine() {
        let store = store().await;
        store
            .create_machine(&NewMachine::new("M-01", "Lathe"), "chief")
            .await
            .unwrap();

        let err = store
            .create_machine(&NewMachine::new("M-01", "Other"), "chief")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MachineAlreadyExists(_)));

        // the failed insert left no extra status row behind
        let machine = store.get_machine("M-01").await.unwrap().unwrap();
        assert_eq!(machine.m_name, "Lathe");
        assert_eq!(store.list_machines().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_department() {
        let store = store().await;
        let err = store
            .create_machine(&NewMachine::new("M-01", "Lathe").with_department(42), "chief")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchDepartment(42)));
        assert!(!store.machine_exists("M-01").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_machine() {
        let store = store().await;
        store
            .create_machine(&NewMachine::new("M-01", "Lathe"), "chief")
            .await
            .unwrap();

        let update = MachineUpdate {
            m_name: "CNC lathe".to_string(),
            m_desc: Some("5-axis".to_string()),
            m_dep: None,
        };
        assert!(store.update_machine("M-01", &update).await.unwrap());
        assert!(!store.update_machine("M-99", &update).await.unwrap());

        let machine = store.get_machine("M-01").await.unwrap().unwrap();
        assert_eq!(machine.m_name, "CNC lathe");
        assert_eq!(machine.m_desc.as_deref(), Some("5-axis"));
    }

    #[tokio::test]
    async fn test_latest_status_wins_and_reports_do_not_override() {
        let store = store().await;
        store
            .create_machine(&NewMachine::new("M-01", "Lathe"), "chief")
            .await
            .unwrap();

        store
            .record_status(
                &StatusUpdate {
                    m_id: "M-01".to_string(),
                    m_status: "broken".to_string(),
                    m_pos: Some("Workshop".to_string()),
                },
                "chief",
            )
            .await
            .unwrap();
        store
            .add_report(
                &NewReport {
                    m_id: "M-01".to_string(),
                    log_type: "repair".to_string(),
                    log_desc: "spindle replaced".to_string(),
                    checked: vec![],
                },
                "worker",
            )
            .await
            .unwrap();

        let machines = store.list_machines().await.unwrap();
        assert_eq!(machines[0].m_status.as_deref(), Some("broken"));
        assert_eq!(machines[0].m_pos.as_deref(), Some("Workshop"));
    }

    #[tokio::test]
    async fn test_status_for_unknown_machine() {
        let store = store().await;
        let err = store
            .record_status(
                &StatusUpdate {
                    m_id: "nope".to_string(),
                    m_status: "running".to_string(),
                    m_pos: None,
                },
                "chief",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchMachine(_)));
    }

    #[tokio::test]
    async fn test_reports_newest_first() {
        let store = store().await;
        store
            .create_machine(&NewMachine::new("M-01", "Lathe"), "chief")
            .await
            .unwrap();

        for desc in ["first", "second"] {
            store
                .add_report(
                    &NewReport {
                        m_id: "M-01".to_string(),
                        log_type: "maintenance".to_string(),
                        log_desc: desc.to_string(),
                        checked: vec![InspectionItem::Cleaning],
                    },
                    "John Doe",
                )
                .await
                .unwrap();
        }

        let reports = store.list_reports().await.unwrap();
        // the creation status row is not a report
        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports[0].log_desc.as_deref(),
            Some("Checked: machine cleaned\nsecond")
        );
        assert_eq!(reports[0].m_name.as_deref(), Some("Lathe"));
        assert_eq!(reports[0].log_sign, "John Doe");
        assert!(reports[0].log_id > reports[1].log_id);
    }

    #[tokio::test]
    async fn test_report_for_unknown_machine() {
        let store = store().await;
        let err = store
            .add_report(
                &NewReport {
                    m_id: "ghost".to_string(),
                    log_type: "repair".to_string(),
                    log_desc: String::new(),
                    checked: vec![],
                },
                "John Doe",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchMachine(_)));
        assert!(store.list_reports().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_departments() {
        let store = store().await;
        store.create_department("Milling").await.unwrap();
        store.create_department("Assembly").await.unwrap();

        let deps = store.list_departments().await.unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].dep_name, "Milling");
        assert!(deps[0].dep_id < deps[1].dep_id);
    }

    #[tokio::test]
    async fn test_trait_object() {
        let repo: std::sync::Arc<dyn MachineRepository> = std::sync::Arc::new(store().await);
        repo.create_machine(&NewMachine::new("M-01", "Lathe"), "chief")
            .await
            .unwrap();
        assert!(repo.machine_exists("M-01").await.unwrap());
        assert!(!repo.machine_exists("M-02").await.unwrap());
    }
}
