use anyhow::Result;
use clap::Parser;
use log::{error, info, LevelFilter};
use std::env;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;

mod identity;
mod utils;

use crate::identity::{load_profile, save_profile, StoredProfile};
use cruitchat::directory::ContactDirectory;
use cruitchat::models::Contact;
use cruitchat::relay::{RelayClient, RelayConfig, DEFAULT_WS_URL};
use cruitchat::rest::{RestClient, DEFAULT_API_URL};
use cruitchat::session::ChatSession;

/// Command line arguments for the SmartCruit chat console
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Console client for the SmartCruit real-time chat.",
    long_about = "Connects to the SmartCruit message relay, loads your prior \
    conversations, and lets you exchange messages from the terminal.\n\n\
    Identity comes from SMARTCRUIT_USER_ID / SMARTCRUIT_USER_NAME / \
    SMARTCRUIT_TOKEN, or from the cached profile."
)]
struct Args {
    /// Open the conversation with this user id directly (deep link)
    #[arg(long, value_name = "USER_ID")]
    to: Option<String>,

    /// Override the relay WebSocket URL
    #[arg(long, value_name = "URL")]
    relay_url: Option<String>,

    /// Override the REST base URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Log file path (defaults to cruitchat.log in the working directory)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

/// Prompts for the user identity or uses environment variables
fn resolve_identity() -> Result<StoredProfile> {
    if let (Ok(user_id), Ok(display_name)) = (
        env::var("SMARTCRUIT_USER_ID"),
        env::var("SMARTCRUIT_USER_NAME"),
    ) {
        let token = env::var("SMARTCRUIT_TOKEN").ok();
        return Ok(StoredProfile::new(
            &user_id,
            &display_name,
            env::var("SMARTCRUIT_AVATAR_URL").ok(),
            token.as_deref(),
        ));
    }

    if let Some(profile) = load_profile()? {
        info!("Using cached profile for {}", profile.user_id);
        return Ok(profile);
    }

    eprintln!("Enter your user id:");
    let user_id = utils::read_line()?;
    eprintln!("Enter your display name:");
    let display_name = utils::read_line()?;
    eprintln!("Enter your access token (leave empty for none):");
    let token_input = utils::read_line()?;
    let token = if token_input.is_empty() {
        None
    } else {
        Some(token_input.as_str())
    };

    let profile = StoredProfile::new(&user_id, &display_name, None, token);
    if let Err(e) = save_profile(&profile) {
        error!("Could not cache profile: {}", e);
    }
    Ok(profile)
}

fn print_message(message: &cruitchat::models::Message) {
    println!(
        "[{}] {}: {}",
        message.timestamp, message.sender_name, message.content
    );
}

fn print_contacts(contacts: &[Contact]) {
    if contacts.is_empty() {
        println!("No prior conversations.");
        return;
    }
    for (index, contact) in contacts.iter().enumerate() {
        let preview = contact.last_message.as_deref().unwrap_or("");
        println!("  {}. {} ({}) {}", index + 1, contact.name, contact.user_id, preview);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_path = args
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from("cruitchat.log"));
    utils::setup_logging(Some(&log_path), LevelFilter::Debug)?;
    info!("Logging to file: {}", log_path.display());

    let profile = resolve_identity()?;
    let me = profile.current_user();
    let token = profile.token();

    let ws_url = args
        .relay_url
        .or_else(|| env::var("SMARTCRUIT_WS_URL").ok())
        .unwrap_or_else(|| DEFAULT_WS_URL.to_string());
    let api_url = args
        .api_url
        .or_else(|| env::var("SMARTCRUIT_API_URL").ok())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let relay = RelayClient::new(
        RelayConfig {
            ws_url,
            ..RelayConfig::default()
        },
        token.clone(),
    );
    relay.activate();

    let rest = RestClient::new(&api_url, token)?;
    let mut directory = ContactDirectory::new(rest.clone(), me.clone());
    directory.load().await;

    let contact = match &args.to {
        Some(user_id) => directory.contact_or_placeholder(user_id),
        None => {
            print_contacts(directory.contacts());
            eprintln!("Open conversation with (number or user id):");
            let choice = utils::read_line()?;
            match choice.parse::<usize>() {
                Ok(n) if n >= 1 && n <= directory.contacts().len() => {
                    directory.contacts()[n - 1].clone()
                }
                _ => directory.contact_or_placeholder(&choice),
            }
        }
    };

    println!("-- Conversation with {} --", contact.name);
    let mut session = ChatSession::open(me, &relay, rest, contact).await;
    for message in session.messages() {
        print_message(message);
    }
    println!("Type a message, /attach <path>, /send, /open <user id>, or /quit.");

    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin).lines();

    loop {
        tokio::select! {
            incoming = session.next_incoming() => {
                match incoming {
                    Some(message) => print_message(&message),
                    None => {
                        error!("Inbound stream ended");
                        break;
                    }
                }
            }
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };
                if let Some(path) = line.strip_prefix("/attach ") {
                    let path = path.trim();
                    match tokio::fs::read(path).await {
                        Ok(bytes) => {
                            let filename = std::path::Path::new(path)
                                .file_name()
                                .map(|n| n.to_string_lossy().to_string())
                                .unwrap_or_else(|| path.to_string());
                            match session.arm_attachment(&filename, bytes).await {
                                Ok(()) => println!("Attachment armed. /send to deliver it."),
                                Err(e) => println!("Upload failed: {}", e),
                            }
                        }
                        Err(e) => println!("Could not read {}: {}", path, e),
                    }
                } else if line.trim() == "/send" {
                    if session.send_armed().await {
                        println!("Attachment sent.");
                    } else {
                        println!("Nothing armed; use /attach first.");
                    }
                } else if let Some(user_id) = line.strip_prefix("/open ") {
                    let contact = directory.contact_or_placeholder(user_id.trim());
                    println!("-- Conversation with {} --", contact.name);
                    session.select_contact(contact).await;
                    for message in session.messages() {
                        print_message(message);
                    }
                } else if line.trim() == "/quit" {
                    break;
                } else {
                    session.send_text(&line).await;
                }
            }
        }
    }

    session.close();
    info!("Chat console exiting");
    Ok(())
}
