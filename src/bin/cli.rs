// Coderoom CLI
// Joins collaboration rooms, mirrors the shared buffer, and triggers remote
// execution against a running coderoom server.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;

use coderoom::client::connection::ConnectionSender;
use coderoom::client::{
    verify_room, websocket_url, Connection, PresenceTracker, RunState, RunTracker, Workspace,
};
use coderoom::collab::document::LANGUAGES;
use coderoom::collab::protocol::CollabMessage;

#[derive(Parser)]
#[command(name = "coderoom-cli")]
#[command(about = "Coderoom client for shared editing and remote execution", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:8080)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Get server configuration
    Config,

    /// Test WebSocket connection
    Connect,

    /// Verify a room id without joining
    Verify {
        /// Room id to verify
        #[arg(short, long)]
        room_id: String,
    },

    /// Join a room and collaborate interactively
    Join {
        /// Room id to join
        #[arg(short, long)]
        room_id: String,

        /// Display name shown to other members
        #[arg(short, long, default_value = "cli")]
        name: String,
    },

    /// One-shot: join a room, publish a source file and execute it
    Run {
        /// Room id (a fresh one is generated when omitted)
        #[arg(short, long)]
        room_id: Option<String>,

        /// Display name shown to other members
        #[arg(short, long, default_value = "cli")]
        name: String,

        /// Source file to publish and execute
        #[arg(short, long)]
        file: PathBuf,

        /// Language tag (C, C++, Java, Python, Javascript)
        #[arg(short, long)]
        language: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => {
            check_health(&cli.server).await;
        }
        Commands::Config => {
            check_config(&cli.server).await;
        }
        Commands::Connect => {
            test_connection(&cli.server).await;
        }
        Commands::Verify { room_id } => {
            verify(&cli.server, room_id).await;
        }
        Commands::Join { room_id, name } => {
            join_session(&cli.server, room_id, name).await;
        }
        Commands::Run {
            room_id,
            name,
            file,
            language,
        } => {
            run_file(&cli.server, room_id.as_deref(), name, file, language).await;
        }
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/collab/health", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                println!("{} Health check passed", "✓".green());

                if let Ok(body) = resp.json::<serde_json::Value>().await {
                    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                    println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                    println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                }
            } else {
                println!("{} Health check failed: {}", "✗".red(), status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn check_config(server: &str) {
    println!("{}", "Fetching server configuration...".cyan());

    let url = format!("http://{}/collab/config", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            if resp.status().is_success() {
                println!("{} Config endpoint accessible", "✓".green());

                if let Ok(body) = resp.json::<serde_json::Value>().await {
                    println!("\nConfiguration:");
                    println!("{}", serde_json::to_string_pretty(&body).unwrap());
                }
            } else {
                println!("{} Config fetch failed: {}", "✗".red(), resp.status());
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
        }
    }
}

async fn test_connection(server: &str) {
    println!("{}", "Testing WebSocket connection...".cyan());

    let url = websocket_url(server);

    match connect_async(&url).await {
        Ok((ws_stream, _)) => {
            println!("{} WebSocket connection established", "✓".green());
            println!("  URL: {}", url);
            drop(ws_stream);
            println!("{} Connection closed cleanly", "✓".green());
        }
        Err(e) => {
            println!("{} WebSocket connection failed: {}", "✗".red(), e);
        }
    }
}

async fn verify(server: &str, room_id: &str) {
    println!("{}", "Verifying room...".cyan());

    match verify_room(server, room_id).await {
        Ok(true) => println!("{} Room {} exists", "✓".green(), room_id.bold()),
        Ok(false) => println!(
            "{} Room {} does not exist yet (joinable, first join creates it)",
            "✓".green(),
            room_id.bold()
        ),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
}

fn generate_room_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

async fn join_session(server: &str, room_id: &str, name: &str) {
    // Room verification gates room entry; surface the message and abort
    if let Err(e) = verify_room(server, room_id).await {
        println!("{} {}", "✗".red(), e);
        return;
    }

    let mut connection = match Connection::connect(&websocket_url(server)).await {
        Ok(connection) => connection,
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            return;
        }
    };

    let sender = connection.sender();
    let mut presence = PresenceTracker::new();
    let mut workspace = Workspace::new();
    let mut run = RunTracker::new();

    presence.begin_join();
    if let Err(e) = sender.send(&CollabMessage::Join {
        room_id: room_id.to_string(),
        display_name: name.to_string(),
    }) {
        println!("{} {}", "✗".red(), e);
        return;
    }

    println!("{}", "Joining room...".cyan());
    println!(
        "  Commands: {}",
        ":lang <tag>  :run  :show  :who  :quit  (anything else appends to the buffer)".dimmed()
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            event = connection.next_event() => {
                let Some(event) = event else {
                    println!("{} Disconnected from server", "✗".red());
                    break;
                };
                handle_event(event, &mut presence, &mut workspace, &mut run);
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_command(line.trim(), room_id, &sender, &presence, &mut workspace, &mut run) {
                            break;
                        }
                    }
                    _ => break,
                }
            }

            _ = tokio::time::sleep(Duration::from_secs(1)), if run.state() == RunState::Running => {
                if run.expired() {
                    run.fail_timeout();
                    println!("{} {}", "✗".red(), run.output());
                }
            }
        }
    }
}

fn handle_event(
    event: CollabMessage,
    presence: &mut PresenceTracker,
    workspace: &mut Workspace,
    run: &mut RunTracker,
) {
    match event {
        CollabMessage::RoomJoined {
            room_id,
            members,
            document,
            ..
        } => {
            presence.joined(members);
            workspace.sync_snapshot(document);
            println!("{} Joined room {}", "✓".green(), room_id.bold());
            print_roster(presence);
        }

        CollabMessage::MemberJoined { member } => {
            let name = member.name.clone();
            if presence.member_joined(member) {
                println!("{} {} joined the room", "+".green(), name.bold());
            }
        }

        CollabMessage::MemberLeft { client_id } => {
            let name = presence
                .roster()
                .iter()
                .find(|m| m.id == client_id)
                .map(|m| m.name.clone());
            if presence.member_left(&client_id) {
                println!(
                    "{} {} left the room",
                    "-".yellow(),
                    name.unwrap_or(client_id).bold()
                );
            }
        }

        CollabMessage::CodeChange {
            code, language_tag, ..
        } => {
            workspace.apply_remote(code, language_tag);
            println!(
                "{} Buffer updated by a peer ({} chars, {})",
                "~".cyan(),
                workspace.code().len(),
                workspace.language_tag()
            );
        }

        CollabMessage::RunResult {
            request_id,
            success,
            output,
            started_at,
            ended_at,
        } => {
            if run.apply_result(request_id, success, output, started_at, ended_at) {
                print_run_outcome(run);
            }
        }

        CollabMessage::Error { message } => {
            println!("{} {}", "✗".red(), message);
        }

        _ => {}
    }
}

/// Returns false when the session should end
fn handle_command(
    line: &str,
    room_id: &str,
    sender: &ConnectionSender,
    presence: &PresenceTracker,
    workspace: &mut Workspace,
    run: &mut RunTracker,
) -> bool {
    match line {
        "" => {}
        ":quit" => return false,
        ":who" => print_roster(presence),
        ":show" => {
            println!("{} [{}]", "Buffer".bold(), workspace.language_tag());
            println!("{}", workspace.code());
        }
        ":run" => match run.start(workspace.code(), workspace.language_tag()) {
            Ok(request) => {
                if sender.send(&request).is_err() {
                    println!("{} Connection lost", "✗".red());
                    return false;
                }
                println!("{}", "Running...".cyan());
            }
            Err(e) => println!("{} {}", "✗".red(), e),
        },
        _ if line.starts_with(":lang ") => {
            let tag = line.trim_start_matches(":lang ").trim();
            match workspace.select_language(tag) {
                Ok(_) => {
                    // The template reset itself is published as a change
                    if sender.send(&workspace.change_message(room_id)).is_err() {
                        println!("{} Connection lost", "✗".red());
                        return false;
                    }
                    println!(
                        "{} Language set to {}, buffer reset to template",
                        "✓".green(),
                        tag.bold()
                    );
                }
                Err(e) => {
                    let tags: Vec<&str> = LANGUAGES.iter().map(|l| l.tag).collect();
                    println!("{} {} (available: {})", "✗".red(), e, tags.join(", "));
                }
            }
        }
        _ => {
            let code = if workspace.code().is_empty() {
                line.to_string()
            } else {
                format!("{}\n{}", workspace.code(), line)
            };
            workspace.set_code(code);
            if sender.send(&workspace.change_message(room_id)).is_err() {
                println!("{} Connection lost", "✗".red());
                return false;
            }
        }
    }
    true
}

fn print_roster(presence: &PresenceTracker) {
    let names: Vec<String> = presence
        .roster()
        .iter()
        .map(|m| m.name.clone())
        .collect();
    println!(
        "  {} {}",
        "Members:".bold(),
        if names.is_empty() {
            "(not joined yet)".to_string()
        } else {
            names.join(", ")
        }
    );
}

fn print_run_outcome(run: &RunTracker) {
    match run.state() {
        RunState::Succeeded => {
            println!("{}", run.output());
            if let Some(elapsed) = run.elapsed_ms() {
                println!("{} Finished in {} ms", "✓".green(), elapsed);
            }
        }
        RunState::Failed => {
            println!("{}", run.output().red());
        }
        _ => {}
    }
}

async fn run_file(
    server: &str,
    room_id: Option<&str>,
    name: &str,
    file: &PathBuf,
    language: &str,
) {
    let code = match std::fs::read_to_string(file) {
        Ok(code) => code,
        Err(e) => {
            println!("{} Cannot read {}: {}", "✗".red(), file.display(), e);
            return;
        }
    };

    let room_id = room_id
        .map(str::to_string)
        .unwrap_or_else(generate_room_token);

    if let Err(e) = verify_room(server, &room_id).await {
        println!("{} {}", "✗".red(), e);
        return;
    }

    let mut connection = match Connection::connect(&websocket_url(server)).await {
        Ok(connection) => connection,
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            return;
        }
    };

    if let Err(e) = connection.send(&CollabMessage::Join {
        room_id: room_id.clone(),
        display_name: name.to_string(),
    }) {
        println!("{} {}", "✗".red(), e);
        return;
    }

    // Wait for the join ack before publishing
    let joined = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = connection.next_event().await {
            if matches!(event, CollabMessage::RoomJoined { .. }) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);

    if !joined {
        println!("{} No join ack from server", "✗".red());
        return;
    }
    println!("{} Joined room {}", "✓".green(), room_id.bold());

    let mut workspace = match Workspace::with_language(language) {
        Ok(workspace) => workspace,
        Err(e) => {
            let tags: Vec<&str> = LANGUAGES.iter().map(|l| l.tag).collect();
            println!("{} {} (available: {})", "✗".red(), e, tags.join(", "));
            return;
        }
    };
    workspace.set_code(code);
    if connection.send(&workspace.change_message(&room_id)).is_err() {
        println!("{} Connection lost", "✗".red());
        return;
    }

    let mut run = RunTracker::new();
    let request = match run.start(workspace.code(), workspace.language_tag()) {
        Ok(request) => request,
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            return;
        }
    };
    if connection.send(&request).is_err() {
        println!("{} Connection lost", "✗".red());
        return;
    }
    println!("{}", "Running...".cyan());

    let deadline = tokio::time::Instant::now() + run.deadline();
    loop {
        let event = tokio::select! {
            event = connection.next_event() => event,
            _ = tokio::time::sleep_until(deadline) => {
                run.fail_timeout();
                println!("{} {}", "✗".red(), run.output());
                return;
            }
        };

        let Some(event) = event else {
            println!("{} Disconnected before the run finished", "✗".red());
            return;
        };

        if let CollabMessage::RunResult {
            request_id,
            success,
            output,
            started_at,
            ended_at,
        } = event
        {
            if run.apply_result(request_id, success, output, started_at, ended_at) {
                print_run_outcome(&run);
                return;
            }
        }
    }
}
