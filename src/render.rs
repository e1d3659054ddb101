use std::io::Write;

use chrono::NaiveDateTime;

use crate::listing::{ClientRow, DatabaseRow, GeneralConfigReport, ScheduleRow};
use crate::resolver::DATABASE_EXTENSION;

/// Align rows under their headers with a two-space gutter.
fn render_table(out: &mut dyn Write, headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            if index < widths.len() {
                widths[index] = widths[index].max(cell.len());
            }
        }
    }
    let mut line = String::new();
    for (index, header) in headers.iter().enumerate() {
        if index > 0 {
            line.push_str("  ");
        }
        line.push_str(&format!("{header:<width$}", width = widths[index]));
    }
    let _ = writeln!(out, "{}", line.trim_end());
    for row in rows {
        let mut line = String::new();
        for (index, cell) in row.iter().enumerate() {
            if index > 0 {
                line.push_str("  ");
            }
            line.push_str(&format!("{cell:<width$}", width = widths[index]));
        }
        let _ = writeln!(out, "{}", line.trim_end());
    }
}

/// Reformat a server timestamp into the local display form; the server
/// reports wall-clock time, so no zone shift is applied.
pub fn local_datetime(value: &str, output_format: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    for input_format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, input_format) {
            return parsed.format(output_format).to_string();
        }
    }
    String::new()
}

fn schedule_status(row: &ScheduleRow) -> String {
    if row.status == "IDLE" || row.status == "RUNNING" {
        if row.last_run.is_empty() || row.last_run == "0000-00-00T00:00:00" {
            return String::new();
        }
        return "OK".to_string();
    }
    row.status.clone()
}

fn schedule_next_run(row: &ScheduleRow, format: &str) -> String {
    if !row.enabled {
        return "Disabled".to_string();
    }
    local_datetime(&row.next_run, format)
}

pub fn schedule_table(out: &mut dyn Write, rows: &[&ScheduleRow]) {
    let data: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                row.id.to_string(),
                row.name.clone(),
                row.task_type().to_string(),
                local_datetime(&row.last_run, "%Y/%m/%d %H:%M"),
                schedule_next_run(row, "%Y/%m/%d %H:%M"),
                schedule_status(row),
            ]
        })
        .collect();
    render_table(
        out,
        &["ID", "Name", "Type", "Last Completed", "Next Run", "Status"],
        &data,
    );
}

pub fn backup_time_table(out: &mut dyn Write, rows: &[&ScheduleRow]) {
    let data: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                row.id.to_string(),
                row.name.clone(),
                schedule_next_run(row, "%H:%M"),
            ]
        })
        .collect();
    render_table(out, &["ID", "Name", "Start time"], &data);
}

/// Connected clients, one line each; only NORMAL connections appear.
pub fn client_table(out: &mut dyn Write, clients: &[ClientRow]) {
    let data: Vec<Vec<String>> = clients
        .iter()
        .filter(|client| client.status == "NORMAL")
        .map(|client| {
            vec![
                client.id.to_string(),
                client.user_name.clone(),
                client.computer_name.clone(),
                client.ext_priv.clone(),
            ]
        })
        .collect();
    if data.is_empty() {
        return;
    }
    render_table(
        out,
        &["Client ID", "User Name", "Computer Name", "Ext Privilege"],
        &data,
    );
}

/// Detailed client view for `list clients -s` and `status client <id>`;
/// `id` 0 shows every connection.
pub fn client_detail_table(out: &mut dyn Write, clients: &[ClientRow], id: u64) {
    let data: Vec<Vec<String>> = clients
        .iter()
        .filter(|client| client.status == "NORMAL" && (id == 0 || client.id == id))
        .map(|client| {
            let guest = client.guest_files.first();
            let filename = guest
                .map(|file| {
                    file.filename
                        .strip_suffix(DATABASE_EXTENSION)
                        .unwrap_or(&file.filename)
                        .to_string()
                })
                .unwrap_or_default();
            vec![
                client.id.to_string(),
                client.user_name.clone(),
                client.computer_name.clone(),
                client.ext_priv.clone(),
                client.ip_address.clone(),
                client.mac_address.clone(),
                local_datetime(&client.connect_time, "%Y/%m/%d %H:%M:%S"),
                client.connect_duration.clone(),
                client.app_version.clone(),
                client.app_language.clone(),
                filename,
                guest.map(|file| file.account_name.clone()).unwrap_or_default(),
                guest.map(|file| file.privset_name.clone()).unwrap_or_default(),
            ]
        })
        .collect();
    if data.is_empty() {
        return;
    }
    render_table(
        out,
        &[
            "Client ID",
            "User Name",
            "Computer Name",
            "Ext Privilege",
            "IP Address",
            "MAC Address",
            "Connect Time",
            "Duration",
            "App Version",
            "App Language",
            "File Name",
            "Account Name",
            "Privilege Set",
        ],
        &data,
    );
}

/// One `folder + filename` line per NORMAL database.
pub fn file_lines(out: &mut dyn Write, rows: &[DatabaseRow]) {
    for row in rows {
        if row.status == "NORMAL" {
            let _ = writeln!(out, "{}{}", row.folder, row.filename);
        }
    }
}

fn title_case_status(status: &str) -> String {
    let mut chars = status.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first, chars.as_str().to_lowercase()),
        None => String::new(),
    }
}

/// Detailed database view; `ids` filters the rows, id 0 shows everything.
pub fn file_detail_table(out: &mut dyn Write, rows: &[DatabaseRow], ids: &[u64]) {
    let data: Vec<Vec<String>> = rows
        .iter()
        .filter(|row| ids.contains(&row.id) || ids.contains(&0))
        .map(|row| {
            let ext_priv = if row.status == "CLOSED" {
                "-".to_string()
            } else {
                row.enabled_ext_privileges.join(" ")
            };
            vec![
                row.id.to_string(),
                row.filename.clone(),
                row.clients.to_string(),
                row.size.to_string(),
                title_case_status(&row.status),
                ext_priv,
                if row.is_encrypted { "Yes" } else { "No" }.to_string(),
            ]
        })
        .collect();
    render_table(
        out,
        &[
            "ID",
            "File",
            "Clients",
            "Size",
            "Status",
            "Enabled Extended Privileges",
            "Encrypted",
        ],
        &data,
    );
}

/// `get serverconfig` output lines for the requested option names.
pub fn general_config_lines(
    out: &mut dyn Write,
    report: &GeneralConfigReport,
    require_secure_db: Option<bool>,
    options: &[String],
) {
    for option in options {
        match option.as_str() {
            "cachesize" => {
                let _ = writeln!(
                    out,
                    "CacheSize = {} [default: 512, range: 64-1048576]",
                    report.cache_size
                );
            }
            "maxfiles" | "hostedfiles" => {
                let _ = writeln!(
                    out,
                    "HostedFiles = {} [default: 125, range: 1-125]",
                    report.max_files
                );
            }
            "maxguests" | "proconnections" => {
                let _ = writeln!(
                    out,
                    "ProConnections = {} [default: 250, range: 0-2000]",
                    report.max_pro_connections
                );
            }
            "scriptsessions" | "allowpsos" => {
                let _ = writeln!(
                    out,
                    "ScriptSessions = {} [default: 100, range: 0-500]",
                    report.max_psos
                );
            }
            "securefilesonly" | "requiresecuredb" => {
                if let Some(value) = require_secure_db {
                    let _ = writeln!(out, "SecureFilesOnly = {value} [default: true]");
                }
            }
            "startuprestorationenabled" => {
                if let Some(value) = report.startup_restoration {
                    let _ = writeln!(out, "StartupRestorationEnabled = {value} [default: true]");
                }
            }
            _ => {}
        }
    }
}
