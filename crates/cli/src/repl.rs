use std::io::{self, Write};

use battsync_core::{BatteryLevel, SyncController, SyncError, SyncSnapshot};
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

const HELP: &str = "\
commands:
  sync <host>   poll <host> every few seconds, replacing any current peer
  stop          stop polling
  status        show the current state
  json          dump the current state as JSON
  help          show this text
  quit          exit (also /q, Ctrl+C, Ctrl+D)";

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Sync(&'a str),
    Stop,
    Status,
    Json,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse(line: &str) -> Option<Command<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    Some(match head {
        "sync" | "connect" => Command::Sync(rest),
        "stop" | "disconnect" => Command::Stop,
        "status" | "s" => Command::Status,
        "json" => Command::Json,
        "help" | "?" => Command::Help,
        "/q" | "/quit" | "/exit" | "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(head),
    })
}

fn fmt_level(level: BatteryLevel) -> String {
    match level.percent() {
        Some(pct) => format!("{pct}%"),
        None => "--".to_string(),
    }
}

/// One line summary; only printed when it differs from the previous one.
fn render(snapshot: &SyncSnapshot) -> String {
    let peer = snapshot
        .peer
        .as_ref()
        .map(|p| format!(" ({p})"))
        .unwrap_or_default();
    format!(
        "local {} | remote {} | {}{}",
        fmt_level(snapshot.local_level),
        fmt_level(snapshot.remote_level),
        snapshot.status,
        peer
    )
}

fn render_full(snapshot: &SyncSnapshot) -> String {
    let updated = snapshot
        .remote_updated_at
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "address   {}\nserver    {}\nlocal     {}\nremote    {} (updated {})\nstatus    {}\npeer      {}",
        snapshot.local_address_label(),
        snapshot.server,
        fmt_level(snapshot.local_level),
        fmt_level(snapshot.remote_level),
        updated,
        snapshot.status,
        snapshot
            .peer
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string()),
    )
}

/// Prompt naming the peer being polled, so the current target is always visible.
fn prompt_for(snapshot: &SyncSnapshot) -> String {
    match &snapshot.peer {
        Some(peer) => format!("battsync[{peer}]> "),
        None => "battsync> ".to_string(),
    }
}

pub async fn run(controller: &SyncController) -> anyhow::Result<()> {
    let token = controller.token();
    let mut status_rx = controller.subscribe();
    let (mut last_line, mut prompt) = {
        let snapshot = status_rx.borrow_and_update();
        println!("{}", render_full(&snapshot));
        println!("type `help` for commands");
        (render(&snapshot), prompt_for(&snapshot))
    };

    let mut reader = LineReader::spawn();
    reader.read_line(&prompt);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = render(&status_rx.borrow_and_update());
                if line != last_line {
                    print_above_prompt(&line, &prompt)?;
                    last_line = line;
                }
            }
            input = reader.next() => {
                let line = match input {
                    Input::Line(line) => line,
                    Input::Closed(None) => break,
                    Input::Closed(Some(err)) => {
                        eprintln!("input error: {err}");
                        break;
                    }
                };
                if let Some(command) = parse(&line) {
                    if command == Command::Quit || !execute(controller, command).await? {
                        break;
                    }
                }
                // Avoid reprinting what `execute` just showed.
                let snapshot = controller.snapshot();
                last_line = render(&snapshot);
                prompt = prompt_for(&snapshot);
                reader.read_line(&prompt);
            }
        }
    }
    println!();
    Ok(())
}

/// Returns `false` once the controller is gone.
async fn execute(controller: &SyncController, command: Command<'_>) -> anyhow::Result<bool> {
    let outcome = match command {
        Command::Sync(peer) => controller.start_sync(peer).await,
        Command::Stop => controller.stop_sync().await,
        Command::Status => {
            println!("{}", render_full(&controller.snapshot()));
            return Ok(true);
        }
        Command::Json => {
            println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
            return Ok(true);
        }
        Command::Help => {
            println!("{HELP}");
            return Ok(true);
        }
        Command::Unknown(word) => {
            println!("unknown command `{word}`, try `help`");
            return Ok(true);
        }
        Command::Quit => return Ok(false),
    };

    match outcome {
        Ok(()) => {
            println!("{}", render(&controller.snapshot()));
            Ok(true)
        }
        Err(SyncError::Validation(e)) => {
            println!("{e}");
            Ok(true)
        }
        Err(SyncError::Closed) => Ok(false),
    }
}

fn print_above_prompt(line: &str, prompt: &str) -> anyhow::Result<()> {
    print!("\r\x1b[2K{line}\n{prompt}");
    io::stdout().flush()?;
    Ok(())
}

enum Input {
    Line(String),
    /// Ctrl+C, Ctrl+D, or an editor error.
    Closed(Option<String>),
}

/// rustyline on its own thread. It only shows a prompt when asked, so
/// command output never lands in the middle of an edit.
struct LineReader {
    prompts: std::sync::mpsc::Sender<String>,
    lines: mpsc::UnboundedReceiver<Input>,
}

impl LineReader {
    fn spawn() -> Self {
        let (prompts, prompt_rx) = std::sync::mpsc::channel::<String>();
        let (line_tx, lines) = mpsc::unbounded_channel();
        std::thread::spawn(move || edit_loop(&prompt_rx, &line_tx));
        Self { prompts, lines }
    }

    fn read_line(&self, prompt: &str) {
        let _ = self.prompts.send(prompt.to_owned());
    }

    async fn next(&mut self) -> Input {
        self.lines.recv().await.unwrap_or(Input::Closed(None))
    }
}

fn edit_loop(prompts: &std::sync::mpsc::Receiver<String>, lines: &mpsc::UnboundedSender<Input>) {
    let mut editor = match rustyline::DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            let _ = lines.send(Input::Closed(Some(e.to_string())));
            return;
        }
    };

    while let Ok(prompt) = prompts.recv() {
        let input = match editor.readline(&prompt) {
            Ok(line) => {
                // Only recognised commands are worth recalling.
                if matches!(parse(&line), Some(c) if !matches!(c, Command::Unknown(_))) {
                    let _ = editor.add_history_entry(line.trim());
                }
                Input::Line(line)
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Input::Closed(None),
            Err(e) => Input::Closed(Some(e.to_string())),
        };
        let closed = matches!(input, Input::Closed(_));
        if lines.send(input).is_err() || closed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use battsync_core::{ConnectionStatus, PeerAddress};

    #[test]
    fn parses_commands() {
        assert_eq!(parse("  sync 192.168.1.20 "), Some(Command::Sync("192.168.1.20")));
        assert_eq!(parse("sync"), Some(Command::Sync("")));
        assert_eq!(parse("stop"), Some(Command::Stop));
        assert_eq!(parse("json"), Some(Command::Json));
        assert_eq!(parse("/q"), Some(Command::Quit));
        assert_eq!(parse("frobnicate x"), Some(Command::Unknown("frobnicate")));
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn prompt_names_current_peer() {
        assert_eq!(prompt_for(&SyncSnapshot::default()), "battsync> ");
        let snapshot = SyncSnapshot {
            peer: Some(PeerAddress::parse("phone.local").unwrap()),
            ..SyncSnapshot::default()
        };
        assert_eq!(prompt_for(&snapshot), "battsync[phone.local]> ");
    }

    #[test]
    fn renders_sentinels_as_dashes() {
        let snapshot = SyncSnapshot::default();
        assert_eq!(render(&snapshot), "local -- | remote -- | idle");
    }

    #[test]
    fn renders_peer_and_levels() {
        let snapshot = SyncSnapshot {
            local_level: BatteryLevel::new(37).unwrap(),
            remote_level: BatteryLevel::new(42).unwrap(),
            status: ConnectionStatus::Connected,
            peer: Some(PeerAddress::parse("10.0.0.2").unwrap()),
            ..SyncSnapshot::default()
        };
        assert_eq!(render(&snapshot), "local 37% | remote 42% | connected (10.0.0.2)");
    }
}
