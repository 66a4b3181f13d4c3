//! Line-oriented rendering shell.
//!
//! Commands arrive on stdin, one per line. Every view change is written to
//! stdout as a single JSON line.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use dapp_wallet::{App, ViewSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    Balance,
    Deploy {
        artifact: Option<String>,
        args: Option<Vec<String>>,
    },
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "balance" => Self::Balance,
            "deploy" => match words.next() {
                Some(artifact) => Self::Deploy {
                    artifact: Some(artifact.to_string()),
                    args: Some(words.map(str::to_string).collect()),
                },
                None => Self::Deploy {
                    artifact: None,
                    args: None,
                },
            },
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command: {}", other)),
        };
        Ok(Some(command))
    }
}

#[derive(Debug)]
enum ShellEvent {
    Command(Command),
    Invalid(String),
    Eof,
}

/// Reads stdin on its own task and forwards parsed commands.
struct EventHandler {
    rx: mpsc::UnboundedReceiver<ShellEvent>,
}

impl EventHandler {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let event = match lines.next_line().await {
                    Ok(Some(line)) => match Command::parse(&line) {
                        Ok(Some(command)) => ShellEvent::Command(command),
                        Ok(None) => continue,
                        Err(e) => ShellEvent::Invalid(e),
                    },
                    Ok(None) => ShellEvent::Eof,
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        ShellEvent::Eof
                    }
                };
                let eof = matches!(event, ShellEvent::Eof);
                if tx.send(event).is_err() || eof {
                    break;
                }
            }
        });

        Self { rx }
    }

    async fn next(&mut self) -> Option<ShellEvent> {
        self.rx.recv().await
    }
}

fn render(snapshot: &ViewSnapshot) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(snapshot)?);
    Ok(())
}

fn dispatch(app: &Arc<App>, tasks: &mut JoinSet<()>, command: Command) {
    let app = app.clone();
    // Failures are already on the error channel and show up in the view.
    tasks.spawn(async move {
        match command {
            Command::Connect => {
                let _ = app.connect().await;
            }
            Command::Disconnect => {
                let _ = app.disconnect().await;
            }
            Command::Balance => {
                let _ = app.refresh_balance().await;
            }
            Command::Deploy { artifact, args } => {
                let _ = app.deploy_artifact(artifact.as_deref(), args).await;
            }
            Command::Quit => {}
        }
    });
}

/// Render the initial view, then serve commands until `quit` or end of
/// input. After end of input the shell keeps rendering until in-flight
/// actions finish.
pub async fn run(app: Arc<App>, once: bool) -> anyhow::Result<()> {
    let mut view = app.view();
    render(&view.snapshot())?;
    if once {
        return Ok(());
    }

    let mut events = EventHandler::new();
    let mut tasks = JoinSet::new();
    let mut input_open = true;

    loop {
        if !input_open && tasks.is_empty() {
            // The last action may have finished before its change was rendered.
            render(&view.snapshot())?;
            break;
        }

        tokio::select! {
            event = events.next(), if input_open => match event {
                Some(ShellEvent::Command(Command::Quit)) => {
                    info!("Quit requested");
                    break;
                }
                Some(ShellEvent::Command(command)) => {
                    debug!("Dispatching {:?}", command);
                    dispatch(&app, &mut tasks, command);
                }
                Some(ShellEvent::Invalid(e)) => warn!("{}", e),
                Some(ShellEvent::Eof) | None => input_open = false,
            },
            snapshot = view.next() => match snapshot {
                Some(snapshot) => render(&snapshot)?,
                None => break,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    warn!("Action task failed: {}", e);
                }
            }
        }
    }

    tasks.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(Command::parse("connect"), Ok(Some(Command::Connect)));
        assert_eq!(Command::parse("  Disconnect "), Ok(Some(Command::Disconnect)));
        assert_eq!(Command::parse("balance"), Ok(Some(Command::Balance)));
        assert_eq!(Command::parse("exit"), Ok(Some(Command::Quit)));
        assert_eq!(Command::parse("   "), Ok(None));
    }

    #[test]
    fn bare_deploy_uses_configured_defaults() {
        assert_eq!(
            Command::parse("deploy"),
            Ok(Some(Command::Deploy {
                artifact: None,
                args: None
            }))
        );
    }

    #[test]
    fn deploy_with_artifact_takes_remaining_words_as_args() {
        assert_eq!(
            Command::parse("deploy out/Store.json 0xaa 7"),
            Ok(Some(Command::Deploy {
                artifact: Some("out/Store.json".to_string()),
                args: Some(vec!["0xaa".to_string(), "7".to_string()]),
            }))
        );
        assert_eq!(
            Command::parse("deploy contracts/Greeter.json"),
            Ok(Some(Command::Deploy {
                artifact: Some("contracts/Greeter.json".to_string()),
                args: Some(vec![]),
            }))
        );
    }

    #[test]
    fn unknown_command_is_reported() {
        assert!(Command::parse("transfer 1").unwrap_err().contains("transfer"));
    }
}
