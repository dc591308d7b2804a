//! Machine pages
//!
//! Failures are reported the same way everywhere: log the detail, flash a
//! short message, redirect.

use axum::{
    extract::{rejection::FormRejection, Extension, Form, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use millwright_auth::SessionPrincipal;
use millwright_core::types::{InspectionItem, MachineUpdate, NewMachine, NewReport, StatusUpdate};
use millwright_core::utils::{non_blank, validate_machine_id, validate_text};
use millwright_core::Error;
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::{error, info};

use super::found;
use crate::server::AppState;
use crate::session::{flash_error, flash_success, take_flashes};
use crate::views;

async fn fail(session: &Session, message: &str, err: &Error, location: &str) -> Response {
    if err.is_client_error() {
        info!(code = err.code(), error = %err, "{}", message);
    } else {
        error!(code = err.code(), error = %err, "{}", message);
    }
    flash_error(session, message).await;
    found(location)
}

/// Undecodable form bodies go back to the form like any other invalid input
async fn rejected(session: &Session, rejection: FormRejection, location: &str) -> Response {
    let err = Error::InvalidArgument(rejection.body_text());
    fail(session, "Please fill in all required fields", &err, location).await
}

/// Blank department selection means none
fn parse_department(value: &str) -> Result<Option<i64>, Error> {
    match non_blank(value) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| Error::InvalidArgument(format!("Invalid department: {}", v))),
    }
}

/// GET /dashboard
pub async fn root() -> Response {
    found("/dashboard/list")
}

/// GET /dashboard/list
pub async fn list(
    State(state): State<AppState>,
    session: Session,
    Extension(principal): Extension<SessionPrincipal>,
) -> Response {
    match state.machines.list_machines().await {
        Ok(machines) => {
            let flashes = take_flashes(&session).await;
            views::machine_list(&principal, &flashes, &machines).into_response()
        }
        Err(e) => fail(&session, "Unable to load the machine list", &e, "/").await,
    }
}

// ============================================================================
// Reports
// ============================================================================

/// GET /dashboard/reports/add
pub async fn report_form(
    State(state): State<AppState>,
    session: Session,
    Extension(principal): Extension<SessionPrincipal>,
) -> Response {
    let machine_ids = match state.machines.list_machine_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "Failed to load machine ids");
            Vec::new()
        }
    };
    let flashes = take_flashes(&session).await;
    views::report_form(&principal, &flashes, &machine_ids).into_response()
}

/// Report form fields; `log_flags` may repeat
fn parse_report(fields: Vec<(String, String)>) -> Result<NewReport, Error> {
    let mut m_id = String::new();
    let mut log_type = String::new();
    let mut log_desc = String::new();
    let mut flags = Vec::new();

    for (name, value) in fields {
        match name.as_str() {
            "m_id" => m_id = value,
            "log_type" => log_type = value,
            "log_desc" => log_desc = value,
            "log_flags" => flags.push(value),
            _ => {}
        }
    }

    let m_id = validate_machine_id(&m_id)?;
    let log_type = non_blank(&log_type)
        .ok_or_else(|| Error::InvalidArgument("Report type is required".into()))?;
    validate_text("Description", &log_desc)?;

    Ok(NewReport {
        m_id,
        log_type,
        log_desc: log_desc.trim().to_string(),
        checked: InspectionItem::parse_flags(flags),
    })
}

/// POST /dashboard/reports/add
pub async fn report_submit(
    State(state): State<AppState>,
    session: Session,
    Extension(principal): Extension<SessionPrincipal>,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Response {
    const BACK: &str = "/dashboard/reports/add";

    let fields = match form {
        Ok(Form(fields)) => fields,
        Err(rejection) => return rejected(&session, rejection, BACK).await,
    };
    let report = match parse_report(fields) {
        Ok(report) => report,
        Err(e) => return fail(&session, &e.to_string(), &e, BACK).await,
    };

    match state.machines.add_report(&report, principal.common_name()).await {
        Ok(log_id) => {
            info!(log_id, m_id = %report.m_id, "Report added");
            flash_success(&session, "Report added").await;
            found("/dashboard/maintenance")
        }
        Err(e @ Error::NoSuchMachine(_)) => {
            let message = format!("Machine not found: {}", report.m_id);
            fail(&session, &message, &e, BACK).await
        }
        Err(e) => fail(&session, "Failed to add the report", &e, BACK).await,
    }
}

/// GET /dashboard/maintenance
pub async fn maintenance(
    State(state): State<AppState>,
    session: Session,
    Extension(principal): Extension<SessionPrincipal>,
) -> Response {
    match state.machines.list_reports().await {
        Ok(reports) => {
            let flashes = take_flashes(&session).await;
            views::report_list(&principal, &flashes, &reports).into_response()
        }
        Err(e) => fail(&session, "Unable to load maintenance reports", &e, "/").await,
    }
}

/// GET /dashboard/check-mid/{m_id}
pub async fn check_mid(State(state): State<AppState>, Path(m_id): Path<String>) -> Response {
    match state.machines.machine_exists(m_id.trim()).await {
        Ok(exists) => Json(json!({ "exists": exists })).into_response(),
        Err(e) => {
            error!(error = %e, "Machine id lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Server error" })),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Chief-only pages
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub m_id: String,
    pub m_status: String,
    #[serde(default)]
    pub m_pos: String,
}

/// GET /dashboard/status
pub async fn status_form(
    State(state): State<AppState>,
    session: Session,
    Extension(principal): Extension<SessionPrincipal>,
) -> Response {
    match state.machines.list_machines().await {
        Ok(machines) => {
            let flashes = take_flashes(&session).await;
            views::status_form(&principal, &flashes, &machines).into_response()
        }
        Err(e) => fail(&session, "Unable to load the machine list", &e, "/").await,
    }
}

/// POST /dashboard/status
pub async fn status_submit(
    State(state): State<AppState>,
    session: Session,
    Extension(principal): Extension<SessionPrincipal>,
    form: Result<Form<StatusForm>, FormRejection>,
) -> Response {
    const BACK: &str = "/dashboard/status";

    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => return rejected(&session, rejection, BACK).await,
    };
    let update = match validate_status(form) {
        Ok(update) => update,
        Err(e) => return fail(&session, &e.to_string(), &e, BACK).await,
    };

    match state
        .machines
        .record_status(&update, principal.common_name())
        .await
    {
        Ok(_) => {
            info!(m_id = %update.m_id, status = %update.m_status, "Machine status updated");
            flash_success(&session, "Machine status updated").await;
        }
        Err(e @ Error::NoSuchMachine(_)) => {
            let message = format!("Machine not found: {}", update.m_id);
            return fail(&session, &message, &e, BACK).await;
        }
        Err(e) => return fail(&session, "Failed to update the machine status", &e, BACK).await,
    }

    found(BACK)
}

fn validate_status(form: StatusForm) -> Result<StatusUpdate, Error> {
    let m_id = validate_machine_id(&form.m_id)?;
    let m_status = non_blank(&form.m_status)
        .ok_or_else(|| Error::InvalidArgument("Status is required".into()))?;
    validate_text("Status", &m_status)?;
    validate_text("Position", &form.m_pos)?;

    Ok(StatusUpdate {
        m_id,
        m_status,
        m_pos: non_blank(&form.m_pos),
    })
}

#[derive(Debug, Deserialize)]
pub struct AddMachineForm {
    pub m_id: String,
    pub m_name: String,
    #[serde(default)]
    pub m_desc: String,
    #[serde(default)]
    pub m_dep: String,
    #[serde(default)]
    pub m_status: String,
    #[serde(default)]
    pub m_pos: String,
}

fn validate_new_machine(form: AddMachineForm) -> Result<NewMachine, Error> {
    let m_id = validate_machine_id(&form.m_id)?;
    let m_name = non_blank(&form.m_name)
        .ok_or_else(|| Error::InvalidArgument("Machine name is required".into()))?;
    for (field, value) in [
        ("Name", &m_name),
        ("Description", &form.m_desc),
        ("Status", &form.m_status),
        ("Position", &form.m_pos),
    ] {
        validate_text(field, value)?;
    }

    Ok(NewMachine {
        m_id,
        m_name,
        m_desc: non_blank(&form.m_desc),
        m_dep: parse_department(&form.m_dep)?,
        m_status: non_blank(&form.m_status),
        m_pos: non_blank(&form.m_pos),
    })
}

/// GET /dashboard/add
pub async fn add_form(
    State(state): State<AppState>,
    session: Session,
    Extension(principal): Extension<SessionPrincipal>,
) -> Response {
    match state.machines.list_departments().await {
        Ok(departments) => {
            let flashes = take_flashes(&session).await;
            views::add_machine_form(&principal, &flashes, &departments).into_response()
        }
        Err(e) => fail(&session, "Unable to load departments", &e, "/").await,
    }
}

/// POST /dashboard/add
pub async fn add_submit(
    State(state): State<AppState>,
    session: Session,
    Extension(principal): Extension<SessionPrincipal>,
    form: Result<Form<AddMachineForm>, FormRejection>,
) -> Response {
    const BACK: &str = "/dashboard/add";

    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => return rejected(&session, rejection, BACK).await,
    };
    let machine = match validate_new_machine(form) {
        Ok(machine) => machine,
        Err(e) => return fail(&session, &e.to_string(), &e, BACK).await,
    };

    match state
        .machines
        .create_machine(&machine, principal.common_name())
        .await
    {
        Ok(()) => {
            info!(m_id = %machine.m_id, "Machine added");
            flash_success(&session, "Machine added").await;
            found("/dashboard/list")
        }
        Err(e @ Error::MachineAlreadyExists(_)) => {
            fail(&session, "Machine id already exists, please choose another", &e, BACK).await
        }
        Err(e @ Error::NoSuchDepartment(_)) => fail(&session, &e.to_string(), &e, BACK).await,
        Err(e) => fail(&session, "Failed to add the machine", &e, BACK).await,
    }
}

#[derive(Debug, Deserialize)]
pub struct EditMachineForm {
    pub m_name: String,
    #[serde(default)]
    pub m_desc: String,
    #[serde(default)]
    pub m_dep: String,
}

fn validate_update(form: EditMachineForm) -> Result<MachineUpdate, Error> {
    let m_name = non_blank(&form.m_name)
        .ok_or_else(|| Error::InvalidArgument("Machine name is required".into()))?;
    validate_text("Name", &m_name)?;
    validate_text("Description", &form.m_desc)?;

    Ok(MachineUpdate {
        m_name,
        m_desc: non_blank(&form.m_desc),
        m_dep: parse_department(&form.m_dep)?,
    })
}

/// GET /dashboard/edit/{m_id}
pub async fn edit_form(
    State(state): State<AppState>,
    session: Session,
    Extension(principal): Extension<SessionPrincipal>,
    Path(m_id): Path<String>,
) -> Response {
    const LIST: &str = "/dashboard/list";

    let machine = match state.machines.get_machine(&m_id).await {
        Ok(Some(machine)) => machine,
        Ok(None) => {
            let e = Error::NoSuchMachine(m_id);
            return fail(&session, "Machine not found", &e, LIST).await;
        }
        Err(e) => return fail(&session, "Unable to load the machine", &e, LIST).await,
    };

    match state.machines.list_departments().await {
        Ok(departments) => {
            let flashes = take_flashes(&session).await;
            views::edit_machine_form(&principal, &flashes, &machine, &departments).into_response()
        }
        Err(e) => fail(&session, "Unable to load departments", &e, LIST).await,
    }
}

/// POST /dashboard/edit/{m_id}
pub async fn edit_submit(
    State(state): State<AppState>,
    session: Session,
    Path(m_id): Path<String>,
    form: Result<Form<EditMachineForm>, FormRejection>,
) -> Response {
    const LIST: &str = "/dashboard/list";

    let back = format!("/dashboard/edit/{}", urlencoding::encode(&m_id));
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => return rejected(&session, rejection, &back).await,
    };
    let update = match validate_update(form) {
        Ok(update) => update,
        Err(e) => return fail(&session, &e.to_string(), &e, &back).await,
    };

    match state.machines.update_machine(&m_id, &update).await {
        Ok(true) => {
            info!(m_id = %m_id, "Machine updated");
            flash_success(&session, "Machine updated").await;
        }
        Ok(false) => {
            let e = Error::NoSuchMachine(m_id);
            return fail(&session, "Update failed, machine does not exist", &e, LIST).await;
        }
        Err(e) => return fail(&session, "Failed to update the machine", &e, LIST).await,
    }

    found(LIST)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_report_collects_flags() {
        let report = parse_report(pairs(&[
            ("m_id", " M-01 "),
            ("log_type", "maintenance"),
            ("log_desc", "oil change"),
            ("log_flags", "1"),
            ("log_flags", "512"),
            ("log_flags", "32"),
        ]))
        .unwrap();

        assert_eq!(report.m_id, "M-01");
        assert_eq!(
            report.checked,
            vec![InspectionItem::Lubrication, InspectionItem::Noise]
        );
    }

    #[test]
    fn test_parse_report_requires_machine_and_type() {
        assert!(parse_report(pairs(&[("log_type", "repair")])).is_err());
        assert!(parse_report(pairs(&[("m_id", "M-01"), ("log_type", "  ")])).is_err());
    }

    #[test]
    fn test_parse_department() {
        assert_eq!(parse_department("").unwrap(), None);
        assert_eq!(parse_department(" 3 ").unwrap(), Some(3));
        assert!(parse_department("three").is_err());
    }
}
