//! HTML pages
//!
//! Every interpolated value goes through [`escape`].

use axum::response::Html;
use millwright_auth::SessionPrincipal;
use millwright_core::types::{Department, InspectionItem, Machine, MachineLog, MachineSummary};
use millwright_core::utils::format_log_time;
use std::fmt::Write;

use crate::session::{Flash, FlashLevel};

/// Escape text for use in HTML content and quoted attributes
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn opt(value: &Option<String>) -> String {
    value.as_deref().map(escape).unwrap_or_default()
}

fn layout(
    title: &str,
    principal: Option<&SessionPrincipal>,
    flashes: &[Flash],
    body: &str,
) -> Html<String> {
    let mut nav = String::new();
    if let Some(principal) = principal {
        nav.push_str(r#"<a href="/dashboard/list">Machines</a> "#);
        nav.push_str(r#"<a href="/dashboard/maintenance">Reports</a> "#);
        nav.push_str(r#"<a href="/dashboard/reports/add">New report</a> "#);
        if principal.is_chief() {
            nav.push_str(r#"<a href="/dashboard/status">Update status</a> "#);
            nav.push_str(r#"<a href="/dashboard/add">Add machine</a> "#);
        }
        let _ = write!(
            nav,
            r#"<span class="user">{}</span> <a href="/logout">Log out</a>"#,
            escape(principal.common_name())
        );
    }

    let mut messages = String::new();
    for flash in flashes {
        let class = match flash.level {
            FlashLevel::Success => "flash success",
            FlashLevel::Error => "flash error",
        };
        let _ = write!(
            messages,
            r#"<div class="{}">{}</div>"#,
            class,
            escape(&flash.message)
        );
    }

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title} - Millwright</title>
<script>setInterval(function () {{ fetch("/ping"); }}, 300000);</script>
</head>
<body>
<nav>{nav}</nav>
{messages}
<main>
<h1>{title}</h1>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
        nav = nav,
        messages = messages,
        body = body,
    ))
}

fn department_options(departments: &[Department], selected: Option<i64>) -> String {
    let mut out = String::from(r#"<option value="">(none)</option>"#);
    for dep in departments {
        let _ = write!(
            out,
            r#"<option value="{}"{}>{}</option>"#,
            dep.dep_id,
            if selected == Some(dep.dep_id) { " selected" } else { "" },
            escape(&dep.dep_name)
        );
    }
    out
}

pub fn login_page(flashes: &[Flash]) -> Html<String> {
    layout(
        "Log in",
        None,
        flashes,
        r#"<form method="post" action="/login">
<label>Username <input name="username" autocomplete="username" required></label>
<label>Password <input name="password" type="password" autocomplete="current-password" required></label>
<button type="submit">Log in</button>
</form>"#,
    )
}

pub fn index_page(principal: &SessionPrincipal, flashes: &[Flash]) -> Html<String> {
    let role = if principal.is_chief() { "chief" } else { "staff" };
    let body = format!(
        r#"<p>Signed in as {} ({}).</p>
<p><a href="/dashboard/list">Go to the machine list</a></p>"#,
        escape(principal.common_name()),
        role
    );
    layout("Millwright", Some(principal), flashes, &body)
}

pub fn machine_list(
    principal: &SessionPrincipal,
    flashes: &[Flash],
    machines: &[MachineSummary],
) -> Html<String> {
    let mut rows = String::new();
    for m in machines {
        let edit = if principal.is_chief() {
            format!(
                r#"<a href="/dashboard/edit/{}">Edit</a>"#,
                urlencoding::encode(&m.m_id)
            )
        } else {
            String::new()
        };
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&m.m_id),
            escape(&m.m_name),
            opt(&m.m_status),
            opt(&m.m_desc),
            opt(&m.m_pos),
            opt(&m.dep_name),
            edit
        );
    }

    let body = format!(
        r#"<table>
<thead><tr><th>ID</th><th>Name</th><th>Status</th><th>Description</th><th>Position</th><th>Department</th><th></th></tr></thead>
<tbody>{}</tbody>
</table>"#,
        rows
    );
    layout("Machines", Some(principal), flashes, &body)
}

pub fn report_form(
    principal: &SessionPrincipal,
    flashes: &[Flash],
    machine_ids: &[String],
) -> Html<String> {
    let mut ids = String::new();
    for id in machine_ids {
        let _ = write!(ids, r#"<option value="{}">"#, escape(id));
    }

    let mut checks = String::new();
    for item in InspectionItem::ALL {
        let _ = write!(
            checks,
            r#"<label><input type="checkbox" name="log_flags" value="{}"> {}</label>"#,
            item.flag(),
            escape(item.label())
        );
    }

    let body = format!(
        r#"<form method="post" action="/dashboard/reports/add">
<label>Machine <input name="m_id" list="machine-ids" required></label>
<datalist id="machine-ids">{ids}</datalist>
<label>Type <select name="log_type">
<option value="maintenance">Maintenance</option>
<option value="repair">Repair</option>
<option value="inspection">Inspection</option>
</select></label>
<fieldset><legend>Checked</legend>{checks}</fieldset>
<label>Description <textarea name="log_desc"></textarea></label>
<button type="submit">Save report</button>
</form>"#,
        ids = ids,
        checks = checks
    );
    layout("New report", Some(principal), flashes, &body)
}

pub fn report_list(
    principal: &SessionPrincipal,
    flashes: &[Flash],
    reports: &[MachineLog],
) -> Html<String> {
    let mut rows = String::new();
    for r in reports {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td><pre>{}</pre></td></tr>",
            escape(&format_log_time(&r.log_time)),
            escape(&r.m_id),
            opt(&r.m_name),
            opt(&r.log_type),
            escape(&r.log_sign),
            opt(&r.log_desc)
        );
    }

    let body = format!(
        r#"<table>
<thead><tr><th>Time</th><th>Machine</th><th>Name</th><th>Type</th><th>Signed</th><th>Description</th></tr></thead>
<tbody>{}</tbody>
</table>"#,
        rows
    );
    layout("Maintenance reports", Some(principal), flashes, &body)
}

pub fn status_form(
    principal: &SessionPrincipal,
    flashes: &[Flash],
    machines: &[MachineSummary],
) -> Html<String> {
    let mut options = String::new();
    for m in machines {
        let _ = write!(
            options,
            r#"<option value="{}">{} - {} ({})</option>"#,
            escape(&m.m_id),
            escape(&m.m_id),
            escape(&m.m_name),
            opt(&m.m_status)
        );
    }

    let body = format!(
        r#"<form method="post" action="/dashboard/status">
<label>Machine <select name="m_id" required>{}</select></label>
<label>Status <input name="m_status" required></label>
<label>Position <input name="m_pos"></label>
<button type="submit">Update</button>
</form>"#,
        options
    );
    layout("Update status", Some(principal), flashes, &body)
}

pub fn add_machine_form(
    principal: &SessionPrincipal,
    flashes: &[Flash],
    departments: &[Department],
) -> Html<String> {
    let body = format!(
        r#"<form method="post" action="/dashboard/add">
<label>ID <input name="m_id" id="m_id" required></label>
<span id="m_id_taken" hidden>This id is already in use</span>
<label>Name <input name="m_name" required></label>
<label>Description <textarea name="m_desc"></textarea></label>
<label>Department <select name="m_dep">{}</select></label>
<label>Status <input name="m_status" value="idle"></label>
<label>Position <input name="m_pos"></label>
<button type="submit">Add machine</button>
</form>
<script>
document.getElementById("m_id").addEventListener("change", function (e) {{
  fetch("/dashboard/check-mid/" + encodeURIComponent(e.target.value))
    .then(function (r) {{ return r.json(); }})
    .then(function (r) {{ document.getElementById("m_id_taken").hidden = !r.exists; }});
}});
</script>"#,
        department_options(departments, None)
    );
    layout("Add machine", Some(principal), flashes, &body)
}

pub fn edit_machine_form(
    principal: &SessionPrincipal,
    flashes: &[Flash],
    machine: &Machine,
    departments: &[Department],
) -> Html<String> {
    let body = format!(
        r#"<form method="post" action="/dashboard/edit/{}">
<p>ID: {}</p>
<label>Name <input name="m_name" value="{}" required></label>
<label>Description <textarea name="m_desc">{}</textarea></label>
<label>Department <select name="m_dep">{}</select></label>
<button type="submit">Save</button>
</form>"#,
        urlencoding::encode(&machine.m_id),
        escape(&machine.m_id),
        escape(&machine.m_name),
        opt(&machine.m_desc),
        department_options(departments, machine.m_dep)
    );
    layout("Edit machine", Some(principal), flashes, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chief() -> SessionPrincipal {
        serde_json::from_value(serde_json::json!({
            "common_name": "Jane Chief",
            "uid": "jchief",
            "distinguished_name": "cn=Jane Chief,ou=people,dc=example,dc=org",
            "is_chief": true,
        }))
        .unwrap()
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<script>alert("x")</script> & 'y'"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; &#x27;y&#x27;"
        );
    }

    #[test]
    fn test_edit_form_action_is_percent_encoded() {
        let machine = Machine {
            m_id: "a b?/機".to_string(),
            m_name: "Lathe".to_string(),
            m_desc: None,
            m_dep: None,
        };
        let Html(page) = edit_machine_form(&chief(), &[], &machine, &[]);
        assert!(page.contains(r#"action="/dashboard/edit/a%20b%3F%2F%E6%A9%9F""#));
    }

    #[test]
    fn test_flashes_are_escaped() {
        let flashes = vec![Flash {
            level: FlashLevel::Error,
            message: "<b>bad</b>".to_string(),
        }];
        let Html(page) = login_page(&flashes);
        assert!(page.contains("&lt;b&gt;bad&lt;/b&gt;"));
        assert!(!page.contains("<b>bad</b>"));
    }
}
