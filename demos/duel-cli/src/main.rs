use std::str::FromStr;

use duel::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Host,
    Join(PeerId),
    Start,
    Choose(Choice),
    Again,
    Status,
    Quit,
}

impl FromStr for Input {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Err("empty command".into());
        };
        let input = match word {
            "host" => Input::Host,
            "join" => match words.next() {
                Some(id) => Input::Join(PeerId::new(id)),
                None => return Err("usage: join <peer-address>".into()),
            },
            "start" => Input::Start,
            "again" => Input::Again,
            "status" => Input::Status,
            "quit" | "exit" => Input::Quit,
            other => Input::Choose(other.parse().map_err(|_| format!("unknown command: {other}"))?),
        };
        Ok(input)
    }
}

const HELP: &str = "commands: host | join <addr> | start | rock | paper | scissors | again | status | quit";

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(s: &Snapshot) -> String {
    let mut line = format!("[{}] {} peer={}", s.phase, s.status, s.peer);
    if let Some(remote) = &s.remote_id {
        line.push_str(&format!(" remote={remote}"));
    }
    match s.phase {
        Phase::Countdown => line.push_str(&format!(" countdown={}", s.countdown)),
        Phase::Playing => {
            if let Some(choice) = s.local_choice {
                line.push_str(&format!(" you={choice} waiting for peer"));
            }
        }
        Phase::Result => {
            if let (Some(you), Some(them), Some(winner)) = (s.local_choice, s.remote_choice, s.winner) {
                line.push_str(&format!(" you={you} peer={them} -> {winner}"));
            }
        }
        _ => {}
    }
    if let Some(attempt) = s.reconnect_attempt {
        line.push_str(&format!(" reconnecting (attempt {attempt})"));
    }
    if let Some(err) = &s.last_error {
        line.push_str(&format!(" error: {err}"));
    }
    line
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9000".to_string());
    let handle = duel::spawn(WebSocketTransport::new(addr), SupervisorConfig::default());

    let id = handle.local_id().await?;
    info!(%id, "listening");
    println!("your id: {id}");
    println!("{HELP}");

    let mut updates = handle.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let line = render(&updates.borrow_and_update());
            println!("{line}");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let input = match line.parse::<Input>() {
            Ok(input) => input,
            Err(e) => {
                println!("{e}\n{HELP}");
                continue;
            }
        };
        let result = match input {
            Input::Host => handle.host_room().await,
            Input::Join(remote) => handle.join_room(remote).await,
            Input::Start => handle.start_round().await,
            Input::Choose(choice) => handle.select_choice(choice).await,
            Input::Again => handle.request_reset().await,
            Input::Status => {
                println!("{}", render(&handle.snapshot()));
                Ok(())
            }
            Input::Quit => break,
        };
        if let Err(e) = result {
            println!("refused: {e}");
        }
    }

    handle.shutdown().await?;
    Ok(())
}
