//! Terminal surface for a single local user.

use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::assistant_api::AssistantBackend;
use crate::config::Config;
use crate::models::{Role, Speaker, StatusLevel, StatusLine, Turn};
use crate::session::ChatSession;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Quit,
    Transcript,
    Role(String),
    Message(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.split_once(char::is_whitespace) {
            Some(("/role", rest)) => Command::Role(rest.trim().to_string()),
            _ => match trimmed {
                "/quit" | "/exit" => Command::Quit,
                "/transcript" => Command::Transcript,
                "/role" => Command::Role(String::new()),
                // messages go through untouched, blank ones included
                _ => Command::Message(line.to_string()),
            },
        }
    }
}

fn print_turn(turn: &Turn) {
    let label = match turn.speaker {
        Speaker::User => "you".cyan().bold(),
        Speaker::Assistant => "assistant".green().bold(),
    };
    println!("{} {}", label, turn.content);
}

fn print_status(lines: &[StatusLine]) {
    for line in lines {
        match line.level {
            StatusLevel::Info => println!("{}", line.text.dimmed()),
            StatusLevel::Warn => println!("{}", line.text.yellow()),
        }
    }
}

fn print_error(context: &str, e: impl std::fmt::Display) {
    println!("{} {}: {}", "error".red().bold(), context, e);
}

/// Chat on stdin/stdout until `/quit`, end of input or shutdown.
pub async fn run(
    backend: Arc<dyn AssistantBackend>,
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut session =
        ChatSession::start(backend, config, Role::default(), shutdown.child_token()).await?;
    let mut role = session.role();

    println!("{}", "ADU Permit Chatbot".bold());
    println!(
        "{}",
        "Commands: /role applicant|planner, /transcript, /quit".dimmed()
    );

    if let Err(e) = session.interact(role, None).await {
        print_error("setup failed", e);
    }
    print_status(session.status());
    let mut shown_status = session.status().len();
    for turn in session.transcript().turns() {
        print_turn(turn);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", format!("[{role}]>").bold());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        match Command::parse(&line) {
            Command::Quit => break,
            Command::Transcript => {
                for turn in session.transcript().turns() {
                    print_turn(turn);
                }
            }
            Command::Role(name) => match name.parse::<Role>() {
                Ok(selected) => {
                    role = selected;
                    if let Err(e) = session.interact(role, None).await {
                        print_error("role switch failed", e);
                    } else {
                        println!("{}", format!("Responding as {role}").dimmed());
                    }
                }
                Err(e) => print_error("invalid role", e),
            },
            Command::Message(text) => {
                let before = session.transcript().len();
                if let Err(e) = session.interact(role, Some(text)).await {
                    print_error("setup failed", e);
                }
                // skip the echoed user turn
                for turn in session.transcript().turns().iter().skip(before + 1) {
                    print_turn(turn);
                }
            }
        }

        if session.status().len() > shown_status {
            print_status(&session.status()[shown_status..]);
            shown_status = session.status().len();
        }
    }

    session.end();
    Ok(())
}
