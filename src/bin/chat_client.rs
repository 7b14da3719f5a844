//! Chat client - Entry Point
//!
//! Connects to the server, runs the client session on the tokio runtime
//! and reads console input on a dedicated thread.

use std::env;
use std::io::{self, BufRead, Write};
use std::process;
use std::thread;

use tokio::net::TcpStream;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use multicast_chat::{
    spawn_session, ClientEvent, ClientHandle, SessionConfig, MAX_BODY_LENGTH, MAX_NICK_LENGTH,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never mix with the chat on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("multicast_chat=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let target = match args.as_slice() {
        [_, host, port] => port.parse::<u16>().ok().map(|port| (host.clone(), port)),
        _ => None,
    };
    let Some((host, port)) = target else {
        eprintln!("Usage: chat_client <host> <port>");
        process::exit(1);
    };

    let stream = TcpStream::connect((host.as_str(), port)).await?;
    info!("Connected to {}:{}", host, port);

    let (handle, mut events, session) = spawn_session(stream, SessionConfig::default());

    prompt_nickname("Please choose nickname")?;
    spawn_console_reader(handle);

    while let Some(event) = events.recv().await {
        render(event)?;
    }

    session.await??;
    Ok(())
}

/// Read stdin lines on a blocking thread and post them to the session
fn spawn_console_reader(handle: ClientHandle) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if handle.submit_line(line).is_err() {
                return;
            }
        }
        debug!("Console input ended");
        let _ = handle.close();
    });
}

fn render(event: ClientEvent) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    match event {
        ClientEvent::NicknameAccepted(_) => {
            writeln!(
                stdout,
                "Welcome to the chat =) Maximum message characters is {}",
                MAX_BODY_LENGTH
            )?;
        }
        ClientEvent::NicknameRejected => {
            drop(stdout);
            prompt_nickname("Sorry this nickname is unavailable,\nPlease choose nickname")?;
            return Ok(());
        }
        ClientEvent::Message { nickname, body } => {
            stdout.write_all(&nickname)?;
            stdout.write_all(b": ")?;
            stdout.write_all(&body)?;
            stdout.write_all(b"\n")?;
        }
        ClientEvent::Disconnected => {
            eprintln!("*** server closed the connection");
        }
    }
    stdout.flush()
}

fn prompt_nickname(lead: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    write!(stdout, "{}[max {} characters]: ", lead, MAX_NICK_LENGTH)?;
    stdout.flush()
}
