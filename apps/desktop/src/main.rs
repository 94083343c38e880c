use anyhow::Result;
use chat_core::{ChatSession, DeliveryState, RoomDirectory, SessionEvent, Settings};
use clap::Parser;
use shared::domain::{RoomId, UserId};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
struct Args {
    /// Backend base URL; falls back to chat.toml / CHAT_SERVER_URL.
    #[arg(long)]
    server_url: Option<String>,
    /// Session credential (JWT) for the websocket handshake and REST calls.
    #[arg(long)]
    token: String,
    #[arg(long)]
    user_id: i64,
    /// Room to open; defaults to the first room in the directory.
    #[arg(long)]
    room: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = Settings::load();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }

    let me = UserId(args.user_id);
    let directory = RoomDirectory::new(&settings, &args.token);

    let room = match args.room {
        Some(id) => RoomId(id),
        None => {
            let rooms = directory.list_rooms(me).await?;
            for room in &rooms {
                println!(
                    "room {} (post {}): {} unread, last: {}",
                    room.id.0,
                    room.post_id.0,
                    room.unread_count,
                    room.last_message.as_deref().unwrap_or("-"),
                );
            }
            let Some(first) = rooms.first() else {
                println!("no chat rooms yet");
                return Ok(());
            };
            first.id
        }
    };

    println!("opening room {} (type to send, ctrl-d to quit)", room.0);
    let session = ChatSession::open(settings, room, me, &args.token).await;
    session.load_recent().await?;
    render(&session).await;

    let mut events = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::TimelineChanged) => render(&session).await,
                Ok(SessionEvent::Status(status)) => println!("* {status:?}"),
                Err(broadcast::error::RecvError::Lagged(_)) => render(&session).await,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Err(err) = session.send(&line).await {
                        println!("send failed: {err}");
                    }
                }
                None => break,
            },
        }
    }

    session.close().await;
    Ok(())
}

async fn render(session: &Arc<ChatSession>) {
    for entry in session.timeline().await {
        let marker = match entry.state {
            DeliveryState::Pending => "…",
            DeliveryState::Confirmed => " ",
            DeliveryState::Failed => "!",
        };
        let who = entry
            .sender_nickname
            .clone()
            .unwrap_or_else(|| format!("user {}", entry.sender_id.0));
        println!(
            "{marker} [{}] {who}: {}",
            entry.sent_at.format("%H:%M:%S"),
            entry.content
        );
    }
    println!("---");
}
