use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Shell metacharacters that must never appear in a value destined for
/// unescaped interpolation into an identifier (hostname, database name, etc).
/// Stricter than `COMMAND_INJECTION_MARKERS` below since identifiers never
/// legitimately need parens or shell syntax of any kind.
const DANGEROUS_SHELL_CHARS: &[char] = &[';', '&', '|', '`', '$', '(', ')', '<', '>', '\n', '\\'];

/// Substrings that indicate command chaining or substitution in a full
/// command line. A single `|` is allowed on its own (checked separately in
/// `validate_command`, since piping into a compression tool is legitimate);
/// everything else here is an unconditional reject.
const COMMAND_INJECTION_MARKERS: &[&str] = &[";", "&&", "||", "&", "`", "$(", "\n", "\r"];

/// Command prefixes the executor is allowed to run at all. Anything else is
/// rejected before a transport is ever opened. Exact set per the external
/// interface's command allow-list; `sh`/`bash` are accepted too since the
/// container/pod transports route their exec entry point through them.
const ALLOWED_COMMAND_PREFIXES: &[&str] = &[
    "pg_dump", "pg_restore", "pg_basebackup", "psql",
    "mysqldump", "mysql",
    "mongodump", "mongorestore",
    "redis-cli", "redis-server",
    "tar", "gzip", "gunzip", "zstd", "lz4",
    "cat", "ls", "mkdir", "rm", "cp", "mv", "du", "df", "which", "echo", "test",
    "sh", "bash",
];

/// Head tokens a `|` may pipe into. Anywhere else a pipe is rejected as a
/// chaining attempt.
const PIPE_ALLOWED_TARGETS: &[&str] = &["gzip", "gunzip", "zstd", "lz4"];

/// A leading `KEY=value` shell environment assignment, e.g. `PGPASSWORD=...`
/// prefixed onto a command so a credential never appears in argv.
static ENV_ASSIGNMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*=").unwrap());

static HOSTNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-\.]{0,251}[a-zA-Z0-9])?$").unwrap()
});

static DATABASE_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]{0,62}$").unwrap());

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_\-]{0,31}$").unwrap());

static CONTAINER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.\-]{0,127}$").unwrap());

static NAMESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?$").unwrap());

/// SQL keywords that must never be accepted as a bare database/table identifier.
const SQL_KEYWORD_BLOCKLIST: &[&str] = &[
    "select", "insert", "update", "delete", "drop", "union", "exec", "execute",
];

pub fn validate_hostname(value: &str) -> Result<()> {
    if !HOSTNAME_RE.is_match(value) || value.contains("..") {
        return Err(Error::ValidationFailed(format!("invalid hostname: {value}")));
    }
    reject_dangerous_chars(value)
}

pub fn validate_port(port: i32) -> Result<()> {
    if !(1..=65535).contains(&port) {
        return Err(Error::ValidationFailed(format!("invalid port: {port}")));
    }
    Ok(())
}

pub fn validate_database_name(value: &str) -> Result<()> {
    if !DATABASE_NAME_RE.is_match(value) {
        return Err(Error::ValidationFailed(format!("invalid database name: {value}")));
    }
    if SQL_KEYWORD_BLOCKLIST.contains(&value.to_lowercase().as_str()) {
        return Err(Error::ValidationFailed(format!(
            "database name collides with a SQL keyword: {value}"
        )));
    }
    Ok(())
}

pub fn validate_username(value: &str) -> Result<()> {
    if !USERNAME_RE.is_match(value) {
        return Err(Error::ValidationFailed(format!("invalid username: {value}")));
    }
    Ok(())
}

pub fn validate_container_name(value: &str) -> Result<()> {
    if !CONTAINER_NAME_RE.is_match(value) {
        return Err(Error::ValidationFailed(format!("invalid container name: {value}")));
    }
    Ok(())
}

pub fn validate_namespace(value: &str) -> Result<()> {
    if !NAMESPACE_RE.is_match(value) {
        return Err(Error::ValidationFailed(format!("invalid namespace: {value}")));
    }
    Ok(())
}

pub fn validate_file_path(value: &str) -> Result<()> {
    if value.contains("..") || value.contains('\0') {
        return Err(Error::ValidationFailed(format!(
            "path traversal attempt rejected: {value}"
        )));
    }
    Ok(())
}

pub fn validate_cron_expression(value: &str) -> Result<()> {
    value
        .parse::<cron::Schedule>()
        .map(|_| ())
        .map_err(|e| Error::Cron(format!("invalid cron expression '{value}': {e}")))
}

fn reject_dangerous_chars(value: &str) -> Result<()> {
    if value.chars().any(|c| DANGEROUS_SHELL_CHARS.contains(&c)) {
        return Err(Error::ValidationFailed(format!(
            "value contains disallowed shell metacharacters: {value}"
        )));
    }
    Ok(())
}

/// Validates that a full command line begins with an allow-listed binary and
/// carries no shell metacharacters anywhere in its arguments. This is the
/// single gate every `Executor::execute` call passes through.
pub fn validate_command(command: &str) -> Result<()> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(Error::ValidationFailed("empty command".to_string()));
    }

    if COMMAND_INJECTION_MARKERS.iter().any(|marker| trimmed.contains(marker)) {
        return Err(Error::ValidationFailed(format!(
            "command contains a chaining or substitution marker: {trimmed}"
        )));
    }

    // a single `|` is only legal when piping into an allow-listed compression tool
    if let Some((_, right)) = trimmed.split_once('|') {
        if trimmed.matches('|').count() > 1 {
            return Err(Error::ValidationFailed(format!(
                "command contains more than one pipe: {trimmed}"
            )));
        }
        let target = right.trim().split_whitespace().next().unwrap_or("");
        let target_name = target.rsplit('/').next().unwrap_or(target);
        if !PIPE_ALLOWED_TARGETS.contains(&target_name) {
            return Err(Error::ValidationFailed(format!(
                "piped command '{target_name}' is not an allowed pipe target"
            )));
        }
    }

    let head = trimmed.split('|').next().unwrap_or(trimmed);
    let mut tokens = head.split_whitespace();
    let mut program = tokens.next().unwrap_or("");
    while ENV_ASSIGNMENT_RE.is_match(program) {
        program = tokens.next().unwrap_or("");
    }
    let program_name = program.rsplit('/').next().unwrap_or(program);
    if !ALLOWED_COMMAND_PREFIXES.contains(&program_name) {
        return Err(Error::ValidationFailed(format!(
            "command '{program_name}' is not in the allow-list"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_binary() {
        assert!(validate_command("pg_dump --host db -U app mydb").is_ok());
    }

    #[test]
    fn rejects_unknown_binary() {
        assert!(validate_command("rm -rf /").is_err());
    }

    #[test]
    fn rejects_command_chaining() {
        assert!(validate_command("pg_dump mydb; rm -rf /").is_err());
    }

    #[test]
    fn rejects_subshell_injection() {
        assert!(validate_command("pg_dump $(cat /etc/passwd)").is_err());
    }

    #[test]
    fn hostname_accepts_fqdn() {
        assert!(validate_hostname("db-1.prod.internal").is_ok());
    }

    #[test]
    fn hostname_rejects_double_dot() {
        assert!(validate_hostname("db..internal").is_err());
    }

    #[test]
    fn database_name_rejects_sql_keyword() {
        assert!(validate_database_name("select").is_err());
    }

    #[test]
    fn database_name_accepts_normal_identifier() {
        assert!(validate_database_name("orders_prod").is_ok());
    }

    #[test]
    fn cron_expression_validated_via_cron_crate() {
        assert!(validate_cron_expression("0 0 3 * * *").is_ok());
        assert!(validate_cron_expression("not a cron").is_err());
    }
}
