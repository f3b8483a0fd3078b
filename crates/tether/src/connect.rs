//! `tether connect`: an interactive client.
//!
//! Lines typed on stdin go out as text messages; inbound messages are
//! printed. Stdin is read on a plain thread because a blocking terminal read
//! would otherwise hold up runtime shutdown.

use std::io::BufRead;

use anyhow::Context;
use tether_ws::{Client, ClientConfig, CloseCode, ConnectionHandle, Message, ShutdownSignal};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::serve::to_hex;

const HELP: &str = "\
Commands:
  help         show this list
  quit, exit   close the connection
  <text>       send <text> as a text message";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Send the line as a text message.
    Send(String),
    /// Print the command list.
    Help,
    /// Close the connection.
    Quit,
    /// Blank line; ignored.
    Empty,
}

/// Interpret one line of input. Commands are matched after trimming; text is
/// sent as typed.
pub fn parse_input(line: &str) -> Input {
    match line.trim() {
        "" => Input::Empty,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => Input::Send(line.to_string()),
    }
}

/// Connect, then relay between the terminal and the server until either
/// side closes.
///
/// # Errors
///
/// Returns an error if no connection can be established within the retry
/// policy.
pub async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let shutdown = ShutdownSignal::new();
    shutdown.trigger_on_os_signals();

    let target = format!("{}:{}{}", config.host, config.port, config.path);
    let client = Client::new(config).with_shutdown(shutdown);
    let mut conn = client
        .connect_with_retry()
        .await
        .with_context(|| format!("failed to connect to {target}"))?;

    println!("Connected to {target}. Type 'help' for commands.");

    let lines = spawn_stdin_reader();
    tokio::spawn(relay_input(lines, conn.handle()));

    while let Some(result) = conn.recv().await {
        match result {
            Ok(message) => print_message(&message),
            Err(e) => warn!(error = %e, "connection error"),
        }
    }

    println!("Disconnected.");
    Ok(())
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn relay_input(mut lines: mpsc::UnboundedReceiver<String>, handle: ConnectionHandle) {
    while let Some(line) = lines.recv().await {
        match parse_input(&line) {
            Input::Send(text) => {
                if let Err(e) = handle.send_text(text) {
                    debug!(error = %e, "send failed");
                    return;
                }
            }
            Input::Help => println!("{HELP}"),
            Input::Quit => break,
            Input::Empty => {}
        }
    }

    // Quit or end of input.
    let _ = handle.disconnect(CloseCode::Normal, "client closed");
}

fn print_message(message: &Message) {
    match message {
        Message::Text(text) => println!("< {text}"),
        Message::Binary(data) => println!("< [{} bytes] {}", data.len(), to_hex(data)),
        Message::Close(Some(frame)) => {
            println!("< close {} {}", frame.code, frame.reason);
        }
        Message::Close(None) => println!("< close"),
        Message::Ping(_) | Message::Pong(_) => {}
    }
}
