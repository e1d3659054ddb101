use std::io::Write;
use std::time::Duration;

use crate::envelope::{
    CODE_ALREADY_RUNNING, CODE_INVALID_CLIENT_ID, CODE_NO_APPLICABLE_FILES, CODE_OK,
    CODE_SCHEDULE_MISSING,
};
use crate::listing::{self, ScheduleRow};
use crate::render;
use crate::request::{Operation, ServerState};
use crate::resolver;
use crate::session::Session;

/// Fixed delay between convergence-poll probes.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Probes after an open before the encryption key is declared wrong.
pub const OPEN_POLL_ATTEMPTS: u32 = 3;
/// Probes while waiting for closing databases to drain or the server
/// status to flip; the ceiling keeps every wait bounded.
pub const DRAIN_POLL_ATTEMPTS: u32 = 120;

/// Drives multi-step server operations over one authenticated session.
/// Every poll re-fetches the listing it inspects; nothing is cached.
pub struct Orchestrator<'a, 't> {
    session: &'a Session<'t>,
    out: &'a mut dyn Write,
    poll_interval: Duration,
}

impl<'a, 't> Orchestrator<'a, 't> {
    pub fn new(session: &'a Session<'t>, out: &'a mut dyn Write) -> Self {
        Orchestrator {
            session,
            out,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sleep-then-probe up to `max_attempts` times. Terminates at the
    /// ceiling regardless of the condition; never waits unbounded.
    fn converge<F: FnMut() -> bool>(&self, max_attempts: u32, mut reached: F) -> bool {
        let mut attempts = 0;
        while attempts < max_attempts {
            std::thread::sleep(self.poll_interval);
            attempts += 1;
            if reached() {
                tracing::debug!(attempts, "convergence poll satisfied");
                return true;
            }
        }
        tracing::debug!(max_attempts, "convergence poll hit its ceiling");
        false
    }

    pub fn close_databases(&mut self, args: &[String], message: &str, force: bool) -> i32 {
        let rows = match listing::fetch_databases(self.session) {
            Ok(rows) => rows,
            Err(err) => return err.code,
        };
        let resolved = resolver::resolve_databases(&rows, args, "NORMAL", false);
        if resolved.is_empty() {
            return CODE_NO_APPLICABLE_FILES;
        }
        for name in &resolved.names {
            let _ = writeln!(self.out, "File Closing: {name}");
        }

        // Client count is snapshotted before the close requests go out; a
        // graceful close may still be draining clients when it reports
        // success, and a premature "File Closed" would mislead.
        let connected = listing::fetch_clients(self.session)
            .map(|clients| resolver::resolve_clients(&clients, args, ""))
            .unwrap_or_default();

        let mut code = CODE_OK;
        for (id, name) in resolved.ids.iter().zip(&resolved.names) {
            let result = self.session.execute(&Operation::CloseDatabase {
                id: *id,
                message: message.to_string(),
                force,
            });
            code = result.code;
            if result.ok() && connected.is_empty() {
                let _ = writeln!(self.out, "File Closed: {name}");
            }
        }
        code
    }

    pub fn open_databases(&mut self, args: &[String], key: &str, save_key: bool) -> i32 {
        let rows = match listing::fetch_databases(self.session) {
            Ok(rows) => rows,
            Err(err) => return err.code,
        };
        let resolved = resolver::resolve_databases(&rows, args, "CLOSED", false);
        if resolved.is_empty() {
            return CODE_NO_APPLICABLE_FILES;
        }
        for name in &resolved.names {
            let _ = writeln!(self.out, "File Opening: {name}");
        }

        let mut code = CODE_OK;
        for index in 0..resolved.ids.len() {
            let id = resolved.ids[index];
            let name = &resolved.names[index];
            let hint = &resolved.hints[index];
            let result = self.session.execute(&Operation::OpenDatabase {
                id,
                key: key.to_string(),
                save_key,
            });
            code = result.code;
            if !result.ok() {
                continue;
            }
            // The open call reports success before the encryption key is
            // checked; only the listing converging on NORMAL proves the
            // database actually came up.
            let id_arg = [id.to_string()];
            let opened = self.converge(OPEN_POLL_ATTEMPTS, || {
                listing::fetch_databases(self.session)
                    .map(|rows| {
                        !resolver::resolve_databases(&rows, &id_arg, "NORMAL", false).is_empty()
                    })
                    .unwrap_or(false)
            });
            if opened {
                let _ = writeln!(self.out, "File Opened: {name}");
            } else {
                let _ = writeln!(
                    self.out,
                    "Fail to open encrypted database. The correct password must be supplied \
                     with the --key option. (Hint: {hint})"
                );
                let _ = writeln!(self.out, "File Closed: {name}");
            }
        }
        code
    }

    pub fn pause_databases(&mut self, args: &[String]) -> i32 {
        self.transition_databases(args, "NORMAL", "File Pausing", "File Paused", |id| {
            Operation::PauseDatabase { id }
        })
    }

    pub fn resume_databases(&mut self, args: &[String]) -> i32 {
        self.transition_databases(args, "PAUSED", "File Resuming", "File Resumed", |id| {
            Operation::ResumeDatabase { id }
        })
    }

    fn transition_databases(
        &mut self,
        args: &[String],
        status: &str,
        announce: &str,
        confirm: &str,
        operation: impl Fn(u64) -> Operation,
    ) -> i32 {
        let rows = match listing::fetch_databases(self.session) {
            Ok(rows) => rows,
            Err(err) => return err.code,
        };
        let resolved = resolver::resolve_databases(&rows, args, status, false);
        if resolved.is_empty() {
            return CODE_NO_APPLICABLE_FILES;
        }
        for name in &resolved.names {
            let _ = writeln!(self.out, "{announce}: {name}");
        }
        let mut code = CODE_OK;
        for (id, name) in resolved.ids.iter().zip(&resolved.names) {
            let result = self.session.execute(&operation(*id));
            code = result.code;
            if result.ok() {
                let _ = writeln!(self.out, "{confirm}: {name}");
            }
        }
        code
    }

    pub fn remove_databases(&mut self, args: &[String]) -> i32 {
        let rows = match listing::fetch_databases(self.session) {
            Ok(rows) => rows,
            Err(err) => return err.code,
        };
        let resolved = resolver::resolve_databases(&rows, args, "CLOSED", true);
        if resolved.is_empty() {
            // Distinguish "nothing to remove" from an argument that names
            // a folder which still holds hosted files of another status.
            let all = resolver::resolve_databases(&rows, args, "", true);
            if let Some(first) = args.first() {
                for name in &all.names {
                    let parent = parent_directory(name);
                    if !parent.is_empty() && resolver::names_match(first, &parent) {
                        return crate::envelope::CODE_DIRECTORY_NOT_EMPTY;
                    }
                }
            }
            return CODE_NO_APPLICABLE_FILES;
        }
        let mut code = CODE_OK;
        for (id, name) in resolved.ids.iter().zip(&resolved.names) {
            let result = self.session.execute(&Operation::RemoveDatabase { id: *id });
            code = result.code;
            if result.ok() {
                let _ = writeln!(self.out, "File Removed: {name}");
            }
        }
        code
    }

    /// Disconnect one client (after verifying it is actually connected) or
    /// all of them when `id` is `None`.
    pub fn disconnect_client(
        &mut self,
        id: Option<u64>,
        message: &str,
        grace_time: u32,
    ) -> i32 {
        let code = match id {
            None => self.disconnect_all(message, grace_time),
            Some(0) => return CODE_INVALID_CLIENT_ID,
            Some(id) => {
                let connected = listing::fetch_clients(self.session)
                    .map(|clients| resolver::resolve_clients(&clients, &[], "NORMAL"))
                    .unwrap_or_default();
                if !connected.contains(&id) {
                    return CODE_INVALID_CLIENT_ID;
                }
                self.session
                    .execute(&Operation::DisconnectClient {
                        id,
                        message: message.to_string(),
                        grace_time,
                    })
                    .code
            }
        };
        if code == CODE_OK {
            let _ = writeln!(self.out, "Client(s) being disconnected.");
        }
        code
    }

    fn disconnect_all(&mut self, message: &str, grace_time: u32) -> i32 {
        let ids = match listing::fetch_clients(self.session) {
            Ok(clients) => resolver::resolve_clients(&clients, &[], "NORMAL"),
            Err(err) => return err.code,
        };
        let mut code = CODE_OK;
        for id in ids {
            let result = self.session.execute(&Operation::DisconnectClient {
                id,
                message: message.to_string(),
                grace_time,
            });
            code = result.code;
        }
        code
    }

    /// Send a message to every matching connected client, or only to
    /// `client_id` when one is given.
    pub fn send_message(
        &mut self,
        args: &[String],
        message: &str,
        client_id: Option<u64>,
    ) -> i32 {
        let ids = match listing::fetch_clients(self.session) {
            Ok(clients) => resolver::resolve_clients(&clients, args, "NORMAL"),
            Err(err) => return err.code,
        };
        if ids.is_empty() {
            return CODE_NO_APPLICABLE_FILES;
        }
        let mut code = CODE_OK;
        for id in ids {
            if client_id.is_none_or(|wanted| wanted == id) {
                code = self
                    .session
                    .execute(&Operation::SendClientMessage {
                        id,
                        message: message.to_string(),
                    })
                    .code;
            }
        }
        code
    }

    pub fn enable_schedule(&mut self, id: u64) -> i32 {
        self.toggle_schedule(id, true)
    }

    pub fn disable_schedule(&mut self, id: u64) -> i32 {
        self.toggle_schedule(id, false)
    }

    fn toggle_schedule(&mut self, id: u64, enabled: bool) -> i32 {
        if id == 0 {
            return CODE_SCHEDULE_MISSING;
        }
        let operation = if enabled {
            Operation::EnableSchedule { id }
        } else {
            Operation::DisableSchedule { id }
        };
        let result = self.session.execute(&operation);
        if !result.ok() {
            return result.code;
        }
        // Re-fetch and show the row so the operator sees the
        // post-condition, not just an acknowledgement.
        self.show_schedules(id)
    }

    pub fn run_schedule(&mut self, id: u64) -> i32 {
        if id == 0 {
            return CODE_SCHEDULE_MISSING;
        }
        let result = self.session.execute(&Operation::RunSchedule { id });
        if !result.ok() {
            return CODE_SCHEDULE_MISSING;
        }
        match listing::fetch_schedule(self.session, id) {
            Some(row) if !row.name.is_empty() => {
                let _ = writeln!(self.out, "Schedule '{}' will run now.", row.name);
                CODE_OK
            }
            _ => CODE_SCHEDULE_MISSING,
        }
    }

    pub fn delete_schedule(&mut self, id: u64) -> i32 {
        if id == 0 {
            return CODE_SCHEDULE_MISSING;
        }
        // Name is only readable before the delete.
        let name = listing::fetch_schedule(self.session, id)
            .map(|row| row.name)
            .unwrap_or_default();
        let result = self.session.execute(&Operation::DeleteSchedule { id });
        if !result.ok() {
            return result.code;
        }
        if name.is_empty() {
            return CODE_SCHEDULE_MISSING;
        }
        let _ = writeln!(self.out, "Schedule Deleted: {name}");
        CODE_OK
    }

    /// List schedules, filtered to `id` when nonzero; 10600 when the
    /// listing has rows but none match.
    pub fn show_schedules(&mut self, id: u64) -> i32 {
        let rows = match listing::fetch_schedules(self.session) {
            Ok(rows) => rows,
            Err(err) => return err.code,
        };
        if rows.is_empty() {
            return CODE_OK;
        }
        let matched: Vec<&ScheduleRow> = rows
            .iter()
            .filter(|row| id == 0 || row.id == id)
            .collect();
        if matched.is_empty() {
            return CODE_SCHEDULE_MISSING;
        }
        render::schedule_table(self.out, &matched);
        CODE_OK
    }

    /// Backup-type schedules only, with their next start time; used by
    /// `get backuptime`.
    pub fn show_backup_times(&mut self, id: u64) -> i32 {
        let rows = match listing::fetch_schedules(self.session) {
            Ok(rows) => rows,
            Err(err) => return err.code,
        };
        if rows.is_empty() {
            return CODE_OK;
        }
        let matched: Vec<&ScheduleRow> = rows
            .iter()
            .filter(|row| (id == 0 || row.id == id) && row.task_type() == "Backup")
            .collect();
        if matched.is_empty() {
            return CODE_SCHEDULE_MISSING;
        }
        render::backup_time_table(self.out, &matched);
        CODE_OK
    }

    /// The composite stop sequence: disconnect every client (failures do
    /// not abort), close every NORMAL database (a failed close aborts the
    /// sequence before the status flip), wait for CLOSING databases to
    /// drain, then flip the server status to STOPPED.
    pub fn stop_server(&mut self, message: &str, grace_time: u32) -> i32 {
        let _ = self.disconnect_all(message, grace_time);

        let rows = match listing::fetch_databases(self.session) {
            Ok(rows) => rows,
            Err(err) => return err.code,
        };
        let resolved = resolver::resolve_databases(&rows, &[], "NORMAL", false);
        let force = grace_time == 0;
        for id in &resolved.ids {
            let result = self.session.execute(&Operation::CloseDatabase {
                id: *id,
                message: message.to_string(),
                force,
            });
            if !result.ok() {
                return result.code;
            }
        }

        self.converge(DRAIN_POLL_ATTEMPTS, || {
            listing::fetch_databases(self.session)
                .map(|rows| resolver::resolve_databases(&rows, &[], "CLOSING", false).is_empty())
                .unwrap_or(true)
        });

        self.session
            .execute(&Operation::SetServerStatus {
                state: ServerState::Stopped,
            })
            .code
    }

    /// Poll the server status until it reports STOPPED, bounded like the
    /// drain poll. Returns the code of the last status fetch.
    pub fn wait_until_stopped(&mut self) -> i32 {
        let mut code = CODE_OK;
        self.converge(DRAIN_POLL_ATTEMPTS, || {
            let result = self.session.execute(&Operation::GetServerStatus);
            code = result.code;
            result.status == "STOPPED"
        });
        code
    }

    pub fn start_server(&mut self) -> i32 {
        let status = self.session.execute(&Operation::GetServerStatus);
        if status.status == "RUNNING" {
            return CODE_ALREADY_RUNNING;
        }
        self.session
            .execute(&Operation::SetServerStatus {
                state: ServerState::Running,
            })
            .code
    }

    pub fn restart_server(&mut self, message: &str, grace_time: u32) -> i32 {
        let code = self.stop_server(message, grace_time);
        if code != CODE_OK {
            return code;
        }
        let _ = self.wait_until_stopped();
        self.session
            .execute(&Operation::SetServerStatus {
                state: ServerState::Running,
            })
            .code
    }

    pub fn cancel_backup(&mut self) -> i32 {
        let result = self.session.execute(&Operation::CancelBackup);
        if result.ok() {
            let _ = writeln!(self.out, "Command finished");
        }
        result.code
    }
}

fn parent_directory(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    match normalized.rfind('/') {
        Some(index) => format!("{}/", &normalized[..index]),
        None => String::new(),
    }
}
