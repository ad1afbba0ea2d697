//! # chatmux
//!
//! Terminal chat client. Connects as `--user`, prints the open conversation
//! as messages arrive and reads slash commands or plain text from stdin.
//! Logs go to stderr (`RUST_LOG`), chat output to stdout.

use std::collections::HashMap;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use chatmux_client_lib::commands::{Command, HELP};
use chatmux_client_lib::{ClientConfig, ClientError, ClientEvent, FileUpload, Multiplexer};
use chatmux_shared::constants::APP_NAME;
use chatmux_shared::{ChatMessage, ConnectionState, ConversationDescriptor, Identity, Room, RoomId};

#[derive(Parser, Debug)]
#[command(name = "chatmux", version, about = "Terminal chat client")]
struct Args {
    /// Username to sign in as
    #[arg(short, long)]
    user: String,

    /// REST base URL (overrides CHATMUX_API_BASE)
    #[arg(long)]
    api_base: Option<String>,

    /// Websocket base URL (overrides CHATMUX_WS_BASE)
    #[arg(long)]
    ws_base: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatmux_client_lib::init_tracing();

    let args = Args::parse();
    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::from_env();
    if let Some(base) = args.api_base {
        config = config.with_api_base(base);
    }
    if let Some(base) = args.ws_base {
        config.ws_base = base;
    }
    info!(?config, "Loaded configuration");

    let me = Identity::new(args.user.trim());
    anyhow::ensure!(!me.as_str().is_empty(), "--user must not be blank");

    let mut mux = Multiplexer::from_config(me, &config)?;
    mux.connect();

    let mut rooms: HashMap<RoomId, Room> = HashMap::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Signed in as {}. Type /help for commands.", mux.me());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::DeleteAccount)) => match mux.delete_account().await {
                        Ok(()) => {
                            println!("Account {} deleted.", mux.me());
                            break;
                        }
                        Err(e) => println!("! {e}"),
                    },
                    Ok(Some(command)) => {
                        if let Err(e) = run_command(&mut mux, &mut rooms, command).await {
                            println!("! {e}");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("! {e}"),
                }
            }

            event = mux.next_event() => match event {
                Some(event) => render_event(&mux, &event),
                None => break,
            },
        }
    }

    mux.shutdown();
    info!("Client stopped");
    Ok(())
}

async fn run_command(
    mux: &mut Multiplexer,
    rooms: &mut HashMap<RoomId, Room>,
    command: Command,
) -> Result<(), ClientError> {
    match command {
        Command::All => open(mux, ConversationDescriptor::Broadcast),
        Command::Dm(peer) => open(mux, ConversationDescriptor::DirectMessage { peer }),
        Command::Room(room_id) => {
            if !rooms.contains_key(&room_id) {
                remember_rooms(rooms, mux.list_rooms().await?);
            }
            let descriptor = match rooms.get(&room_id) {
                Some(room) => room.descriptor(),
                None => ConversationDescriptor::Room {
                    display_name: room_id.to_string(),
                    room_id,
                },
            };
            open(mux, descriptor);
        }
        Command::Rooms => {
            let list = mux.list_rooms().await?;
            if list.is_empty() {
                println!("No rooms.");
            }
            for room in &list {
                println!("  {}  {} ({} members)", room.id, room.name, room.members.len());
            }
            remember_rooms(rooms, list);
        }
        Command::Users => {
            for user in mux.list_users().await? {
                let marker = if mux.is_online(&user) { "*" } else { " " };
                println!(" {marker} {user}");
            }
        }
        Command::Online => {
            if mux.online().is_empty() {
                println!("Nobody else is online.");
            }
            for user in mux.online() {
                println!("  * {user}");
            }
        }
        Command::Create { name, members } => {
            let room = mux.create_room(&name, members).await?;
            println!("Created room {} ({}).", room.name, room.id);
            rooms.insert(room.id.clone(), room);
            print_conversation(mux);
        }
        Command::Upload(path) => {
            let file = FileUpload::from_path(&path).await?;
            let uploaded = mux.upload_and_send(file).await?;
            info!(url = %uploaded.file_url, "Attachment delivered");
        }
        Command::Delete => {
            mux.delete_active_conversation().await?;
            println!("Deleted {}.", mux.active().title());
        }
        Command::Refresh => mux.refresh_active(),
        Command::Help => println!("{HELP}"),
        Command::Say(text) => {
            mux.send(&text).await?;
        }
        Command::Quit | Command::DeleteAccount => {}
    }
    Ok(())
}

fn remember_rooms(cache: &mut HashMap<RoomId, Room>, rooms: Vec<Room>) {
    for room in rooms {
        cache.insert(room.id.clone(), room);
    }
}

fn open(mux: &mut Multiplexer, descriptor: ConversationDescriptor) {
    if mux.select_conversation(descriptor) {
        print_conversation(mux);
    }
}

fn print_conversation(mux: &Multiplexer) {
    println!("--- {} ---", mux.active().title());
    for message in mux.messages() {
        println!("{}", format_message(message));
    }
}

fn render_event(mux: &Multiplexer, event: &ClientEvent) {
    match event {
        ClientEvent::ConnectionChanged { state } => match state {
            ConnectionState::Open => println!("* connected"),
            ConnectionState::Connecting => println!("* connecting..."),
            ConnectionState::Closed => println!("* disconnected, restart to reconnect"),
        },
        ClientEvent::ConversationUpdated { active: true, .. } => {
            if let Some(message) = mux.messages().last() {
                println!("{}", format_message(message));
            }
        }
        ClientEvent::ConversationUpdated { key, active: false } => {
            println!("* new message in {key}");
        }
        ClientEvent::HistoryLoaded { active: true, error, .. } => {
            print_conversation(mux);
            if let Some(error) = error {
                println!("! history unavailable ({error}), /refresh to retry");
            }
        }
        ClientEvent::HistoryLoaded { .. } => {}
        ClientEvent::PresenceChanged { online } => println!("* {online} other user(s) online"),
        ClientEvent::TransportError { message } => println!("! {message}"),
    }
}

fn format_message(message: &ChatMessage) -> String {
    let time = message
        .timestamp
        .map(|t| t.format("%H:%M ").to_string())
        .unwrap_or_default();

    match &message.attachment {
        Some(file) => format!(
            "{time}{}: [{:?}] {} <{}>",
            message.sender, file.kind, file.name, file.url
        ),
        None => format!("{time}{}: {}", message.sender, message.content),
    }
}
