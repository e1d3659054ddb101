use crate::listing::{ClientRow, DatabaseRow};

/// Optional suffix on hosted database names; present-or-absent on either
/// side of a comparison.
pub const DATABASE_EXTENSION: &str = ".fmp12";

/// Storage-volume tag the server prepends to database folders. Tags are
/// interchangeable with each other and with a plain OS path once the
/// volume segment is accounted for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageTag {
    Linux,
    Mac,
    Windows,
}

impl StorageTag {
    pub const ALL: [StorageTag; 3] = [StorageTag::Linux, StorageTag::Mac, StorageTag::Windows];

    pub fn prefix(self) -> &'static str {
        match self {
            StorageTag::Linux => "filelinux:",
            StorageTag::Mac => "filemac:",
            StorageTag::Windows => "filewin:",
        }
    }
}

/// Databases resolved from a listing snapshot, parallel by index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedDatabases {
    pub ids: Vec<u64>,
    pub names: Vec<String>,
    pub hints: Vec<String>,
}

impl ResolvedDatabases {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Name of the volume the root filesystem lives on; only meaningful on
/// macOS, where `filemac:` paths embed it.
#[cfg(target_os = "macos")]
pub fn volume_name() -> Option<String> {
    let entries = std::fs::read_dir("/Volumes").ok()?;
    for entry in entries.flatten() {
        if let Ok(target) = std::fs::canonicalize(entry.path())
            && target == std::path::Path::new("/")
        {
            return entry.file_name().into_string().ok();
        }
    }
    None
}

#[cfg(not(target_os = "macos"))]
pub fn volume_name() -> Option<String> {
    None
}

fn has_separator(value: &str) -> bool {
    value.contains('/') || value.contains('\\')
}

fn is_id_token(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Equality modulo the optional database extension.
fn stem_equal(a: &str, b: &str) -> bool {
    a == b
        || a.strip_suffix(DATABASE_EXTENSION) == Some(b)
        || b.strip_suffix(DATABASE_EXTENSION) == Some(a)
}

/// Compare a user-supplied name or path against a server-reported one.
/// Holds in either direction for every storage tag and for the macOS
/// volume-name expansion of `filemac:`.
pub fn names_match(name1: &str, name2: &str) -> bool {
    names_match_with(name1, name2, volume_name().as_deref())
}

pub fn names_match_with(name1: &str, name2: &str, volume: Option<&str>) -> bool {
    if stem_equal(name1, name2) {
        return true;
    }
    if !has_separator(name1) && !has_separator(name2) {
        return false;
    }

    let mut n1 = name1.to_string();
    let mut n2 = name2.to_string();
    for tag in StorageTag::ALL {
        let prefix = tag.prefix();
        if tag == StorageTag::Mac && (n1.contains(prefix) || n2.contains(prefix)) {
            n1 = n1.replacen("/Volumes", prefix, 1);
            n2 = n2.replacen("/Volumes", prefix, 1);
        }
        if stem_equal(&n1, &n2)
            || stem_equal(&format!("{prefix}{n1}"), &n2)
            || stem_equal(&n1, &format!("{prefix}{n2}"))
        {
            return true;
        }
        if let Some(volume) = volume
            && (stem_equal(&format!("{prefix}/{volume}{n1}"), &n2)
                || stem_equal(&n1, &format!("{prefix}/{volume}{n2}")))
        {
            return true;
        }
    }
    false
}

fn status_passes(filter: &str, status: &str) -> bool {
    filter.is_empty() || filter == status
}

/// Resolve database arguments against a listing snapshot. Pure function:
/// the caller supplies a fresh snapshot whenever staleness matters.
///
/// Each argument is an ID (all digits), a name (optional extension), or a
/// folder filter (contains a path separator). Empty `args` resolves every
/// row passing the status filter; an empty status filter passes all.
/// `full_path` switches the reported names to folder+filename with the
/// storage tag rewritten to a plain OS path.
pub fn resolve_databases(
    rows: &[DatabaseRow],
    args: &[String],
    status: &str,
    full_path: bool,
) -> ResolvedDatabases {
    let empty = [String::new()];
    let args: &[String] = if args.is_empty() { &empty } else { args };
    let mut resolved = ResolvedDatabases::default();

    for row in rows {
        for arg in args {
            let matched = if is_id_token(arg) {
                row.id.to_string() == *arg && status_passes(status, &row.status)
            } else if has_separator(arg) {
                status_passes(status, &row.status)
                    && (names_match(&row.folder, arg)
                        || names_match(&format!("{}{}", row.folder, row.filename), arg))
            } else {
                (arg.is_empty() || names_match(arg, &row.filename))
                    && status_passes(status, &row.status)
            };
            if matched {
                resolved.ids.push(row.id);
                resolved.names.push(if full_path {
                    strip_storage_prefix(&format!("{}{}", row.folder, row.filename))
                } else {
                    row.filename.clone()
                });
                resolved.hints.push(row.decrypt_hint.clone());
            }
        }
    }
    resolved
}

/// Rewrite a tagged server path to the matching plain OS form for display.
pub fn strip_storage_prefix(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("filelinux:/") {
        format!("/{rest}")
    } else if let Some(rest) = path.strip_prefix("filemac:/") {
        format!("/Volumes/{rest}")
    } else if let Some(rest) = path.strip_prefix("filewin:/") {
        rest.replace('/', "\\")
    } else {
        path.to_string()
    }
}

/// Resolve connected-client ids whose guest files match the arguments.
/// Empty args (or a single empty string) match every client passing the
/// status filter.
pub fn resolve_clients(rows: &[ClientRow], args: &[String], status: &str) -> Vec<u64> {
    let empty = [String::new()];
    let args: &[String] = if args.is_empty() { &empty } else { args };
    let mut ids = Vec::new();

    for arg in args {
        for client in rows {
            if !status_passes(status, &client.status) {
                continue;
            }
            let matched = client
                .guest_files
                .iter()
                .any(|file| arg.is_empty() || names_match(arg, &file.filename));
            if matched && !ids.contains(&client.id) {
                ids.push(client.id);
            }
        }
    }
    ids
}
