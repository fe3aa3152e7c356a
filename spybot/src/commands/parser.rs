//! Chat text to [`Command`].

use super::types::{AccountRef, Command};
use crate::domain::SourceKind;

/// Whether a message is addressed to the bot as a command.
pub fn is_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

/// Parse a `/command[@bot] args...` message.
pub fn parse_command(text: &str, default_source: SourceKind) -> Command {
    let mut parts = text.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let name = head
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    match name.as_str() {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "status" => Command::Status,
        "clear_all" => Command::ClearAll,
        "add_user" | "add_entity" => match parse_accounts(&args, default_source) {
            Ok(accounts) => Command::AddEntities(accounts),
            Err(reason) => Command::Invalid { reason },
        },
        "del_user" | "remove_entity" => match parse_accounts(&args, default_source) {
            Ok(accounts) => Command::RemoveEntities(accounts),
            Err(reason) => Command::Invalid { reason },
        },
        _ => Command::Unknown(name),
    }
}

fn parse_accounts(args: &[&str], default_source: SourceKind) -> Result<Vec<AccountRef>, String> {
    if args.is_empty() {
        return Err("No accounts given".to_string());
    }
    let mut accounts: Vec<AccountRef> = Vec::with_capacity(args.len());
    for arg in args {
        let account = AccountRef::parse(arg, default_source)?;
        if !accounts.contains(&account) {
            accounts.push(account);
        }
    }
    Ok(accounts)
}
