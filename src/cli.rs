use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::admin_log;
use crate::config;
use crate::envelope::{
    self, CODE_HOST_UNREACHABLE, CODE_OK, EXIT_INVALID_COMMAND, EXIT_INVALID_COMMAND_PARAMETER,
    EXIT_INVALID_OPTION,
};
use crate::listing;
use crate::orchestrator::Orchestrator;
use crate::render;
use crate::request::Operation;
use crate::resolver;
use crate::session::{self, DEFAULT_ENDPOINT, LoginOptions, Prompt, Session, TerminalPrompt};
use crate::settings;
use crate::transport::{Transport, UreqTransport};

/// Message shown to clients while the engine shuts down; `stop server`
/// always uses it, regardless of `-m`.
const STOP_MESSAGE: &str = "Stopping the database engine...";

#[derive(Parser)]
#[command(name = "dbsadmin", about = "Administer a database server over its admin API.", version)]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Clone, Default)]
pub struct GlobalArgs {
    #[arg(long, global = true, help = "Fully qualified domain name of the server.")]
    pub fqdn: Option<String>,
    #[arg(short = 'u', long, global = true, help = "Account name to authenticate with.")]
    pub username: Option<String>,
    #[arg(short = 'p', long, global = true, help = "Password to authenticate with.")]
    pub password: Option<String>,
    #[arg(
        short = 'i',
        long = "identityfile",
        global = true,
        help = "Private key file for PKI authentication."
    )]
    pub identity_file: Option<PathBuf>,
    #[arg(short = 'y', long, global = true, help = "Answer yes to every prompt.")]
    pub yes: bool,
    #[arg(short = 'm', long, global = true, help = "Text message to send to clients.")]
    pub message: Option<String>,
    #[arg(short = 'f', long, global = true, help = "Force the operation; skip the grace period.")]
    pub force: bool,
    #[arg(long, global = true, help = "Encryption key for opening a database.")]
    pub key: Option<String>,
    #[arg(long = "savekey", global = true, help = "Save the encryption key on the server.")]
    pub save_key: bool,
    #[arg(short = 'c', long, global = true, help = "Restrict the operation to one client id.")]
    pub client: Option<u64>,
    #[arg(
        short = 't',
        long = "gracetime",
        global = true,
        default_value_t = 90,
        help = "Seconds clients get before being disconnected."
    )]
    pub grace_time: u32,
    #[arg(short = 's', long, global = true, help = "Show the detailed statistics columns.")]
    pub stats: bool,
    #[arg(long, global = true, help = "Verbose logging to stderr.")]
    pub verbose: bool,
    #[arg(short = 'q', long, global = true, help = "Only log warnings.")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(about = "List clients, files, or schedules.")]
    List {
        #[command(subcommand)]
        target: ListTarget,
    },
    #[command(about = "Report the status of a client or a file.")]
    Status {
        #[command(subcommand)]
        target: StatusTarget,
    },
    #[command(about = "Open closed databases.")]
    Open { files: Vec<String> },
    #[command(about = "Close open databases.")]
    Close { files: Vec<String> },
    #[command(about = "Pause open databases.")]
    Pause { files: Vec<String> },
    #[command(about = "Resume paused databases.")]
    Resume { files: Vec<String> },
    #[command(about = "Remove closed databases from hosting.")]
    Remove { files: Vec<String> },
    #[command(about = "Disconnect one client or all of them.")]
    Disconnect {
        #[command(subcommand)]
        target: DisconnectTarget,
    },
    #[command(about = "Send a text message to connected clients.")]
    Send { files: Vec<String> },
    #[command(about = "Enable a schedule.")]
    Enable {
        #[command(subcommand)]
        target: ScheduleTarget,
    },
    #[command(about = "Disable a schedule.")]
    Disable {
        #[command(subcommand)]
        target: ScheduleTarget,
    },
    #[command(about = "Run a schedule now.")]
    Run {
        #[command(subcommand)]
        target: ScheduleTarget,
    },
    #[command(about = "Delete a schedule.")]
    Delete {
        #[command(subcommand)]
        target: ScheduleTarget,
    },
    #[command(about = "Read backup times or server configuration.")]
    Get {
        #[command(subcommand)]
        target: GetTarget,
    },
    #[command(about = "Change server configuration.")]
    Set {
        #[command(subcommand)]
        target: SetTarget,
    },
    #[command(about = "Cancel a running backup.")]
    Cancel {
        #[command(subcommand)]
        target: CancelTarget,
    },
    #[command(about = "Start the database server.")]
    Start {
        #[command(subcommand)]
        target: ServerTarget,
    },
    #[command(about = "Stop the database server.")]
    Stop {
        #[command(subcommand)]
        target: ServerTarget,
    },
    #[command(about = "Restart the database server.")]
    Restart {
        #[command(subcommand)]
        target: ServerTarget,
    },
}

#[derive(Subcommand)]
pub enum ListTarget {
    Clients,
    Files,
    Schedules,
}

#[derive(Subcommand)]
pub enum StatusTarget {
    Client { id: u64 },
    File {
        #[arg(required = true)]
        files: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum DisconnectTarget {
    Client { id: Option<u64> },
}

#[derive(Subcommand)]
pub enum ScheduleTarget {
    Schedule { id: u64 },
}

#[derive(Subcommand)]
pub enum ServerTarget {
    Server,
}

#[derive(Subcommand)]
pub enum GetTarget {
    #[command(name = "backuptime")]
    BackupTime { id: Option<u64> },
    #[command(name = "serverconfig")]
    ServerConfig { names: Vec<String> },
}

#[derive(Subcommand)]
pub enum SetTarget {
    #[command(name = "serverconfig")]
    ServerConfig {
        #[arg(required = true)]
        settings: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum CancelTarget {
    Backup,
}

/// `--fqdn` switches to HTTPS against the named host; otherwise the local
/// admin endpoint is used.
pub fn endpoint_for(fqdn: Option<&str>) -> String {
    match fqdn.map(str::trim).filter(|value| !value.is_empty()) {
        Some(host) => format!("https://{host}"),
        None => DEFAULT_ENDPOINT.to_string(),
    }
}

impl Cli {
    pub fn run(self) -> i32 {
        let level = if self.globals.quiet {
            admin_log::Level::Warn
        } else if self.globals.verbose {
            admin_log::Level::Debug
        } else {
            admin_log::Level::Info
        };
        admin_log::init(level);

        let fqdn = self
            .globals
            .fqdn
            .clone()
            .or_else(|| settings::load_settings().ok().and_then(|s| s.fqdn));
        let endpoint = endpoint_for(fqdn.as_deref());

        let transport = UreqTransport::new();
        let mut prompt = TerminalPrompt;
        let mut out = io::stdout();
        let code = run_command(
            self.command,
            &self.globals,
            &transport,
            &endpoint,
            &mut prompt,
            &mut out,
        );
        if code != CODE_OK
            && code != EXIT_INVALID_COMMAND_PARAMETER
            && code != EXIT_INVALID_COMMAND
            && code != EXIT_INVALID_OPTION
        {
            println!("{}", envelope::error_line(code));
        }
        code
    }
}

fn confirm(prompt: &mut dyn Prompt, yes: bool, question: &str) -> bool {
    if yes {
        return true;
    }
    let answer = prompt
        .read_line(&format!("dbsadmin: really {question}? (y, n) "))
        .unwrap_or_default();
    answer.trim().eq_ignore_ascii_case("y")
}

fn with_session<'t>(
    transport: &'t dyn Transport,
    endpoint: &str,
    globals: &GlobalArgs,
    prompt: &mut dyn Prompt,
    body: impl FnOnce(&Session<'t>) -> i32,
) -> i32 {
    let options = LoginOptions::new(
        globals.username.clone(),
        globals.password.clone(),
        globals.identity_file.clone(),
    );
    match session::login(transport, endpoint, prompt, &options) {
        Ok(session) => body(&session),
        Err(err) => {
            if envelope::indicates_unreachable(err.code) {
                CODE_HOST_UNREACHABLE
            } else {
                err.code
            }
        }
    }
}

/// Execute one parsed command against `endpoint` and return the exit
/// code. Everything the command prints goes through `out`.
pub fn run_command<'t>(
    command: Command,
    globals: &GlobalArgs,
    transport: &'t dyn Transport,
    endpoint: &str,
    prompt: &mut dyn Prompt,
    out: &mut dyn Write,
) -> i32 {
    let message = globals.message.clone().unwrap_or_default();
    match command {
        Command::List { target } => match target {
            ListTarget::Clients => with_session(transport, endpoint, globals, prompt, |session| {
                match listing::fetch_clients(session) {
                    Err(err) => err.code,
                    Ok(clients) => {
                        if globals.stats {
                            render::client_detail_table(out, &clients, 0);
                        } else {
                            render::client_table(out, &clients);
                        }
                        CODE_OK
                    }
                }
            }),
            ListTarget::Files => with_session(transport, endpoint, globals, prompt, |session| {
                match listing::fetch_databases(session) {
                    Err(err) => err.code,
                    Ok(rows) => {
                        if globals.stats {
                            render::file_detail_table(out, &rows, &[0]);
                        } else {
                            render::file_lines(out, &rows);
                        }
                        CODE_OK
                    }
                }
            }),
            ListTarget::Schedules => {
                with_session(transport, endpoint, globals, prompt, |session| {
                    Orchestrator::new(session, out).show_schedules(0)
                })
            }
        },
        Command::Status { target } => match target {
            StatusTarget::Client { id } => {
                with_session(transport, endpoint, globals, prompt, |session| {
                    match listing::fetch_clients(session) {
                        Err(err) => err.code,
                        Ok(clients) => {
                            if id > 0 {
                                render::client_detail_table(out, &clients, id);
                            }
                            CODE_OK
                        }
                    }
                })
            }
            StatusTarget::File { files } => {
                with_session(transport, endpoint, globals, prompt, |session| {
                    match listing::fetch_databases(session) {
                        Err(err) => err.code,
                        Ok(rows) => {
                            let resolved = resolver::resolve_databases(&rows, &files, "", false);
                            if !resolved.is_empty() {
                                render::file_detail_table(out, &rows, &resolved.ids);
                            }
                            CODE_OK
                        }
                    }
                })
            }
        },
        Command::Open { files } => with_session(transport, endpoint, globals, prompt, |session| {
            Orchestrator::new(session, out).open_databases(
                &files,
                globals.key.as_deref().unwrap_or_default(),
                globals.save_key,
            )
        }),
        Command::Close { files } => {
            if !confirm(prompt, globals.yes, "close database(s)") {
                return CODE_OK;
            }
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).close_databases(&files, &message, globals.force)
            })
        }
        Command::Pause { files } => with_session(transport, endpoint, globals, prompt, |session| {
            Orchestrator::new(session, out).pause_databases(&files)
        }),
        Command::Resume { files } => {
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).resume_databases(&files)
            })
        }
        Command::Remove { files } => {
            if !confirm(prompt, globals.yes, "remove database(s)") {
                return CODE_OK;
            }
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).remove_databases(&files)
            })
        }
        Command::Disconnect { target } => {
            let DisconnectTarget::Client { id } = target;
            if !confirm(prompt, globals.yes, "disconnect client(s)") {
                return CODE_OK;
            }
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).disconnect_client(id, &message, globals.grace_time)
            })
        }
        Command::Send { files } => with_session(transport, endpoint, globals, prompt, |session| {
            Orchestrator::new(session, out).send_message(&files, &message, globals.client)
        }),
        Command::Enable { target } => {
            let ScheduleTarget::Schedule { id } = target;
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).enable_schedule(id)
            })
        }
        Command::Disable { target } => {
            let ScheduleTarget::Schedule { id } = target;
            if !confirm(prompt, globals.yes, "disable schedule(s)") {
                return CODE_OK;
            }
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).disable_schedule(id)
            })
        }
        Command::Run { target } => {
            let ScheduleTarget::Schedule { id } = target;
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).run_schedule(id)
            })
        }
        Command::Delete { target } => {
            let ScheduleTarget::Schedule { id } = target;
            if !confirm(prompt, globals.yes, "delete a schedule") {
                return CODE_OK;
            }
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).delete_schedule(id)
            })
        }
        Command::Get { target } => match target {
            GetTarget::BackupTime { id } => {
                with_session(transport, endpoint, globals, prompt, |session| {
                    Orchestrator::new(session, out).show_backup_times(id.unwrap_or(0))
                })
            }
            GetTarget::ServerConfig { names } => {
                let names = match config::validate_config_names(&names) {
                    Ok(names) => names,
                    Err(code) => return code,
                };
                with_session(transport, endpoint, globals, prompt, |session| {
                    show_server_config(session, out, &names)
                })
            }
        },
        Command::Set { target } => {
            let SetTarget::ServerConfig { settings } = target;
            let changes = match config::parse_server_config_args(&settings) {
                Ok(changes) => changes,
                Err(code) => return code,
            };
            // Range violations never reach the network.
            if let Err(code) = changes.validate_ranges() {
                return code;
            }
            with_session(transport, endpoint, globals, prompt, |session| {
                apply_server_config(session, out, &changes)
            })
        }
        Command::Cancel { target } => {
            let CancelTarget::Backup = target;
            if !session::probe(transport, endpoint) {
                return CODE_HOST_UNREACHABLE;
            }
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).cancel_backup()
            })
        }
        Command::Start { target } => {
            let ServerTarget::Server = target;
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).start_server()
            })
        }
        Command::Stop { target } => {
            let ServerTarget::Server = target;
            if !confirm(prompt, globals.yes, "stop server") {
                return CODE_OK;
            }
            let grace_time = if globals.force { 0 } else { globals.grace_time };
            with_session(transport, endpoint, globals, prompt, |session| {
                let mut orchestrator = Orchestrator::new(session, out);
                let code = orchestrator.stop_server(STOP_MESSAGE, grace_time);
                if code != CODE_OK {
                    return code;
                }
                orchestrator.wait_until_stopped()
            })
        }
        Command::Restart { target } => {
            let ServerTarget::Server = target;
            if !confirm(prompt, globals.yes, "restart server") {
                return CODE_OK;
            }
            let grace_time = if globals.force { 0 } else { globals.grace_time };
            with_session(transport, endpoint, globals, prompt, |session| {
                Orchestrator::new(session, out).restart_server(&message, grace_time)
            })
        }
    }
}

fn show_server_config(session: &Session, out: &mut dyn Write, names: &[String]) -> i32 {
    let report = match listing::fetch_general_config(session) {
        Ok(report) => report,
        Err(err) => return err.code,
    };
    let secure = if names.iter().any(|name| name == "securefilesonly") {
        listing::fetch_security_config(session).ok()
    } else {
        None
    };
    render::general_config_lines(out, &report, secure, names);
    CODE_OK
}

fn apply_server_config(
    session: &Session,
    out: &mut dyn Write,
    changes: &config::ServerConfigChanges,
) -> i32 {
    let report = match listing::fetch_general_config(session) {
        Ok(report) => report,
        Err(err) => return err.code,
    };
    if changes.touches_general() {
        let result = session.execute(&Operation::SetGeneralConfig {
            config: changes.merged_with(&report),
            legacy_startup_restoration: report.startup_restoration.is_some(),
        });
        if !result.ok() {
            return result.code;
        }
    }
    if let Some(secure) = changes.secure_files_only {
        let result = session.execute(&Operation::SetSecurityConfig {
            require_secure_db: secure,
        });
        if !result.ok() {
            return result.code;
        }
    }
    // Show the post-condition, not just an acknowledgement.
    show_server_config(session, out, &changes.touched_names())
}
