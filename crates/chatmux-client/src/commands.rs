//! Slash commands typed into the terminal client.

use std::path::PathBuf;

use thiserror::Error;

use chatmux_shared::{Identity, RoomId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Select the broadcast channel.
    All,
    Dm(Identity),
    Room(RoomId),
    Rooms,
    Users,
    Online,
    Create { name: String, members: Vec<Identity> },
    Upload(PathBuf),
    Delete,
    /// Delete the signed-in account. Only parsed with an explicit `confirm`.
    DeleteAccount,
    Refresh,
    Help,
    Quit,
    /// Plain text for the active conversation.
    Say(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command /{0}, try /help")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
/all                      broadcast channel
/dm <user>                direct messages with <user>
/room <id>                open a room
/rooms                    list your rooms
/users                    list registered users
/online                   list online users
/create <name> <a,b,...>  create a room and open it
/upload <path>            send a file
/delete                   delete the open DM or room
/delete-account confirm   delete your account and exit
/refresh                  fetch the open conversation again
/quit                     exit";

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Command::Say(line.to_string())));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "all" => Command::All,
            "dm" => Command::Dm(Identity::new(single_arg(args, "/dm <user>")?)),
            "room" => Command::Room(RoomId::new(single_arg(args, "/room <id>")?)),
            "rooms" => Command::Rooms,
            "users" => Command::Users,
            "online" => Command::Online,
            "create" => parse_create(args)?,
            "upload" => {
                if args.is_empty() {
                    return Err(CommandError::Usage("/upload <path>"));
                }
                Command::Upload(PathBuf::from(args))
            }
            "delete" => Command::Delete,
            "delete-account" => {
                if !args.eq_ignore_ascii_case("confirm") {
                    return Err(CommandError::Usage("/delete-account confirm"));
                }
                Command::DeleteAccount
            }
            "refresh" => Command::Refresh,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }
}

fn single_arg(args: &str, usage: &'static str) -> Result<String, CommandError> {
    let mut parts = args.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(arg), None) => Ok(arg.to_string()),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn parse_create(args: &str) -> Result<Command, CommandError> {
    const USAGE: &str = "/create <name> <member1,member2,...>";

    let (name, members) = args.rsplit_once(char::is_whitespace).ok_or(CommandError::Usage(USAGE))?;
    let name = name.trim();
    let members: Vec<Identity> = members
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(Identity::new)
        .collect();

    if name.is_empty() || members.is_empty() {
        return Err(CommandError::Usage(USAGE));
    }

    Ok(Command::Create {
        name: name.to_string(),
        members,
    })
}
