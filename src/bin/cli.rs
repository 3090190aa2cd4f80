// Polling relay CLI
// Terminal client for checking a running relay and taking part in polls as a teacher or student

use clap::{Parser, Subcommand};
use colored::*;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Parser)]
#[command(name = "poll-cli")]
#[command(about = "Classroom polling relay CLI", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:4000)
    #[arg(short, long, default_value = "127.0.0.1:4000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the liveness endpoint
    Health,

    /// Join as teacher, ask a question and wait for the results
    Teacher {
        /// Question text
        #[arg(short, long)]
        question: String,

        /// Answer option, repeat for several
        #[arg(short, long = "option")]
        options: Vec<String>,

        /// Seconds before results are shown regardless of answers
        #[arg(short, long)]
        timer: Option<u64>,
    },

    /// Join as student and answer the next question
    Student {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Answer to submit without prompting
        #[arg(short, long)]
        answer: Option<String>,
    },

    /// Remove a student from the session
    Kick {
        /// Display name of the student
        #[arg(short, long)]
        name: String,
    },

    /// Join as teacher and print every event
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => check_health(&cli.server).await,
        Commands::Teacher {
            question,
            options,
            timer,
        } => ask_question(&cli.server, question, options, *timer).await,
        Commands::Student { name, answer } => {
            answer_as_student(&cli.server, name, answer.as_deref()).await
        }
        Commands::Kick { name } => kick_student(&cli.server, name).await,
        Commands::Watch => watch(&cli.server).await,
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            println!("{} Health check passed", "✓".green());
            if let Ok(body) = resp.text().await {
                println!("  {}", body);
            }
        }
        Ok(resp) => {
            println!("{} Health check failed: {}", "✗".red(), resp.status());
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn open_socket(server: &str) -> Option<Socket> {
    let url = format!("ws://{}/ws", server);
    match connect_async(&url).await {
        Ok((ws_stream, _)) => Some(ws_stream),
        Err(e) => {
            println!("{} WebSocket connection failed: {}", "✗".red(), e);
            None
        }
    }
}

async fn emit(socket: &mut Socket, event: &str, data: Option<Value>) -> bool {
    let frame = match data {
        Some(data) => json!({ "event": event, "data": data }),
        None => json!({ "event": event }),
    };

    if let Err(e) = socket.send(Message::Text(frame.to_string())).await {
        println!("{} Failed to send {}: {}", "✗".red(), event, e);
        return false;
    }
    true
}

/// Next event as (name, data); `None` once the server closes the socket
async fn next_event(socket: &mut Socket) -> Option<(String, Value)> {
    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                    println!("{} Unreadable frame: {}", "?".yellow(), text);
                    continue;
                };
                let name = value["event"].as_str().unwrap_or_default().to_string();
                let data = value.get("data").cloned().unwrap_or(Value::Null);
                return Some((name, data));
            }
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                println!("{} Error receiving message: {}", "✗".red(), e);
                return None;
            }
        }
    }
    None
}

fn print_answers(title: &str, answers: &Value) {
    println!("{}", title.bold());
    match answers.as_object() {
        Some(map) if !map.is_empty() => {
            for (name, answer) in map {
                println!("  {} {}", format!("{}:", name).cyan(), answer);
            }
        }
        _ => println!("  {}", "(no answers)".dimmed()),
    }
}

async fn ask_question(server: &str, question: &str, options: &[String], timer: Option<u64>) {
    let Some(mut socket) = open_socket(server).await else {
        return;
    };

    if !emit(&mut socket, "teacher-join", None).await {
        return;
    }

    let mut payload = json!({ "question": question, "options": options });
    if let Some(secs) = timer {
        payload["timer"] = json!(secs);
    }

    if !emit(&mut socket, "create-question", Some(payload)).await {
        return;
    }
    println!("{} Question sent, waiting for answers...", "✓".green());

    while let Some((event, data)) = next_event(&mut socket).await {
        match event.as_str() {
            "new-question" => println!("{} Question is live", "→".cyan()),
            "student-list" => println!("{} Students: {}", "→".cyan(), data),
            "live-update" => println!("{} Answers so far: {}", "→".cyan(), data),
            "show-results" => {
                println!("\n{}", "═".repeat(50).green());
                print_answers("Results", &data);
                println!("{}", "═".repeat(50).green());
                return;
            }
            other => println!("{} {} {}", "?".yellow(), other, data),
        }
    }

    println!("{} Connection closed before results arrived", "✗".red());
}

async fn answer_as_student(server: &str, name: &str, answer: Option<&str>) {
    let Some(mut socket) = open_socket(server).await else {
        return;
    };

    if !emit(&mut socket, "student-join", Some(json!(name))).await {
        return;
    }
    println!("{} Joined as {}, waiting for a question...", "✓".green(), name.bold());

    let mut answered = false;

    while let Some((event, data)) = next_event(&mut socket).await {
        match event.as_str() {
            "student-list" => println!("{} Classmates: {}", "→".cyan(), data),
            "new-question" if !answered => {
                println!("\n{} {}", "Question:".bold(), data["question"]);
                if let Some(options) = data["options"].as_array() {
                    for (i, option) in options.iter().enumerate() {
                        println!("  {}. {}", i + 1, option);
                    }
                }

                let reply = match answer {
                    Some(a) => a.to_string(),
                    None => match prompt("Your answer: ") {
                        Some(a) => a,
                        None => return,
                    },
                };

                if !emit(&mut socket, "submit-answer", Some(json!(reply))).await {
                    return;
                }
                answered = true;
                println!("{} Answer submitted", "✓".green());
            }
            "live-update" => println!("{} {} answered", "→".cyan(), data.as_object().map_or(0, |m| m.len())),
            "show-results" => {
                print_answers("Results", &data);
                return;
            }
            "kicked" => {
                println!("{} You were removed by the teacher", "✗".red());
                return;
            }
            _ => {}
        }
    }

    println!("{} Connection closed", "✗".yellow());
}

async fn kick_student(server: &str, name: &str) {
    let Some(mut socket) = open_socket(server).await else {
        return;
    };

    if !emit(&mut socket, "teacher-join", None).await
        || !emit(&mut socket, "kick-student", Some(json!(name))).await
    {
        return;
    }

    match timeout(Duration::from_secs(5), next_event(&mut socket)).await {
        Ok(Some((event, data))) if event == "student-list" => {
            println!("{} Kicked {}", "✓".green(), name.bold());
            println!("  Remaining students: {}", data);
        }
        Ok(Some((event, _))) => println!("{} Unexpected event: {}", "✗".yellow(), event),
        Ok(None) => println!("{} Connection closed by server", "✗".red()),
        Err(_) => println!("{} Timeout waiting for updated student list", "✗".red()),
    }
}

async fn watch(server: &str) {
    let Some(mut socket) = open_socket(server).await else {
        return;
    };

    if !emit(&mut socket, "teacher-join", None).await {
        return;
    }
    println!("{} Watching session (Ctrl+C to exit)", "✓".green());

    while let Some((event, data)) = next_event(&mut socket).await {
        println!("{} {}", format!("[{}]", event).cyan(), data);
    }

    println!("{} Connection closed", "✗".yellow());
}

fn prompt(label: &str) -> Option<String> {
    print!("{}", label);
    io::stdout().flush().ok()?;

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}
