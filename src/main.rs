#![deny(dead_code)]
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

mod utils;

use smsdeck::{
    settings::{self, Settings},
    Conversation, Direction, HttpTransport, Inbox, Message, Poller,
};

const WRAP_WIDTH: usize = 72;

/// Command line arguments for smsdeck
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "smsdeck: poll an SMS gateway and browse conversations from the terminal."
)]
struct Args {
    /// Settings file to use instead of the default location
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Write log output to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll continuously and print new messages (default)
    Watch,

    /// Fetch once and list conversations, newest first
    List,

    /// Fetch once and print one conversation
    Thread {
        /// Conversation key (the counterparty's number)
        key: String,
    },

    /// Send a message
    Send {
        /// Recipient number
        to: String,
        /// Message text
        body: String,
    },

    /// Show or change the stored settings
    Config {
        #[arg(long)]
        read_url: Option<String>,
        #[arg(long)]
        write_url: Option<String>,
        /// Polling interval in seconds (10-300)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else if args.log_file.is_some() {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    utils::setup_logging(args.log_file.as_deref().and_then(|p| p.to_str()), level)?;

    if let Some(path) = &args.config {
        settings::set_settings_path_override(path.clone());
        info!("Settings path overridden to: {}", path.display());
    }

    let stored = settings::load_settings()?;

    match args.command.unwrap_or(Command::Watch) {
        Command::Config {
            read_url,
            write_url,
            interval,
        } => update_config(stored, read_url, write_url, interval),
        command => {
            let settings = stored.with_env_overrides();
            let transport = HttpTransport::new(settings.endpoints())?;
            let inbox = Arc::new(Inbox::new(Arc::new(transport)));

            match command {
                Command::List => {
                    inbox.refresh().await?;
                    print_conversations(&inbox.conversations());
                    Ok(())
                }
                Command::Thread { key } => {
                    inbox.refresh().await?;
                    print_thread(&key, &inbox.thread(&key));
                    Ok(())
                }
                Command::Send { to, body } => {
                    let sent = inbox.send(&to, &body).await?;
                    println!("Sent to {} at {}", to, sent.canonical_timestamp());
                    Ok(())
                }
                _ => watch(inbox, &settings).await,
            }
        }
    }
}

fn update_config(
    mut settings: Settings,
    read_url: Option<String>,
    write_url: Option<String>,
    interval: Option<u64>,
) -> Result<()> {
    let changed = read_url.is_some() || write_url.is_some() || interval.is_some();
    if let Some(url) = read_url {
        settings.read_url = url;
    }
    if let Some(url) = write_url {
        settings.write_url = url;
    }
    if let Some(secs) = interval {
        if !(settings::MIN_POLL_INTERVAL_SECS..=settings::MAX_POLL_INTERVAL_SECS).contains(&secs) {
            return Err(anyhow!(
                "Interval must be between {} and {} seconds",
                settings::MIN_POLL_INTERVAL_SECS,
                settings::MAX_POLL_INTERVAL_SECS
            ));
        }
        settings.poll_interval_secs = secs;
    }
    if changed {
        settings::save_settings(&settings)?;
    }

    println!("read_url:  {}", display_or_unset(&settings.read_url));
    println!("write_url: {}", display_or_unset(&settings.write_url));
    println!("interval:  {}s", settings.poll_interval().as_secs());
    Ok(())
}

fn display_or_unset(value: &str) -> &str {
    if value.trim().is_empty() {
        "(not set)"
    } else {
        value
    }
}

async fn watch(inbox: Arc<Inbox>, settings: &Settings) -> Result<()> {
    let mut new_messages = inbox.dispatcher().subscribe_new_messages();
    let mut errors = inbox.dispatcher().subscribe_errors();

    let poller = Poller::new(inbox.clone(), settings.poll_interval());
    poller.start();
    println!(
        "Polling every {}s. Commands: /refresh /list /thread <key> /send <to> <text> /reset /quit",
        poller.interval().as_secs()
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(batch) = new_messages.recv() => print_new_messages(&batch),
            Some(error) = errors.recv() => eprintln!("! {}", error),
            line = stdin.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                if !handle_command(line.trim(), &inbox, &poller).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.stop();
    info!("smsdeck shutting down");
    Ok(())
}

/// Handle one stdin command; returns false when the user asked to quit
async fn handle_command(line: &str, inbox: &Inbox, poller: &Poller) -> bool {
    let mut parts = line.splitn(3, ' ');
    match parts.next().unwrap_or("") {
        "" => {}
        "/quit" | "/exit" => return false,
        "/refresh" => poller.poll_now().await,
        "/list" => print_conversations(&inbox.conversations()),
        "/thread" => match parts.next() {
            Some(key) => print_thread(key, &inbox.thread(key)),
            None => eprintln!("Usage: /thread <key>"),
        },
        "/send" => match (parts.next(), parts.next()) {
            (Some(to), Some(body)) => {
                // Failures already reach the error channel
                if let Ok(sent) = inbox.send(to, body).await {
                    println!("Sent to {} at {}", to, sent.canonical_timestamp());
                }
            }
            _ => eprintln!("Usage: /send <to> <text>"),
        },
        "/reset" => {
            inbox.reset();
            println!("History cleared; the next fetch shows everything as new.");
        }
        other => eprintln!("Unknown command: {}", other),
    }
    true
}

fn print_new_messages(batch: &[Message]) {
    for message in batch {
        println!(
            "[{}] {} {}",
            message.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            arrow(message.direction),
            message.conversation_key
        );
        println!("{}", utils::wrap_body(&message.body, WRAP_WIDTH, "    "));
    }
}

fn print_conversations(conversations: &[Conversation]) {
    if conversations.is_empty() {
        println!("No conversations.");
        return;
    }
    for conversation in conversations {
        println!(
            "{} {:<16} {}  {}",
            if conversation.unread { "*" } else { " " },
            conversation.display_name,
            conversation.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            conversation.last_message.lines().next().unwrap_or("")
        );
    }
}

fn print_thread(key: &str, messages: &[Message]) {
    if messages.is_empty() {
        println!("No messages for {}.", key);
        return;
    }
    for message in messages {
        let status = message
            .status
            .map(|s| format!(" ({})", s.as_str()))
            .unwrap_or_default();
        println!(
            "[{}] {}{}",
            message.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            arrow(message.direction),
            status
        );
        println!("{}", utils::wrap_body(&message.body, WRAP_WIDTH, "    "));
    }
}

fn arrow(direction: Direction) -> &'static str {
    match direction {
        Direction::Incoming => "<-",
        Direction::Outgoing => "->",
    }
}
