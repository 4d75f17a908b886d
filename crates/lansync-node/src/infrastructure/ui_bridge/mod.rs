//! Console bridge: the headless presentation layer.
//!
//! Exposes the command contract in `application::commands` over stdin/stdout
//! as JSON lines, so a terminal user or a separate UI process can drive the
//! node.
//!
//! # Output
//!
//! Every line written to stdout is one JSON object:
//!
//! ```text
//! {"type":"state","snapshot":{...}}                           <- pushed on every change
//! {"type":"result","command":"share","success":true,"data":["a.txt"],"error":null}
//! ```
//!
//! Logs go to stderr through `tracing`, so stdout stays machine-readable.
//!
//! # Input
//!
//! One command per line.  Arguments are split on whitespace; wrap paths that
//! contain spaces in double quotes.
//!
//! ```text
//! share "/home/u/My Report.pdf" /home/u/photo.jpg
//! remove photo.jpg
//! save 1718000000123 /home/u/Downloads
//! init
//! rotate
//! help
//! quit
//! ```
//!
//! # `CommandResult<T>` wrapper
//!
//! Every command answers with the same shape,
//! `{ success: bool, data: T | null, error: string | null }`, so a consumer
//! can check `success` without knowing which command it sent.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use lansync_core::StateSnapshot;

use crate::application::commands::{
    remove_file, request_init, rotate_passcode, save_received_file, select_files, FilePicker,
    SaveDialog,
};
use crate::application::context::ServerContext;

const HELP: &str = "commands: share <path>..., remove <name>, save <id> <destination>, \
                    init, rotate, help, quit";

// ── Command result wrapper ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Share(Vec<PathBuf>),
    Remove(String),
    Save { id: u64, destination: PathBuf },
    Init,
    Rotate,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parses one input line.  `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let words = split_words(line)?;
        let (verb, args) = match words.split_first() {
            Some((verb, args)) => (verb.to_ascii_lowercase(), args),
            None => return Ok(None),
        };

        let command = match (verb.as_str(), args) {
            ("share", []) => return Err("share needs at least one path".into()),
            ("share", paths) => Self::Share(paths.iter().map(PathBuf::from).collect()),
            ("remove", [name]) => Self::Remove(name.clone()),
            ("save", [id, destination]) => Self::Save {
                id: id
                    .parse()
                    .map_err(|_| format!("not a received-file id: {id}"))?,
                destination: PathBuf::from(destination),
            },
            ("init", []) => Self::Init,
            ("rotate", []) => Self::Rotate,
            ("help", _) => Self::Help,
            ("quit", []) | ("exit", []) => Self::Quit,
            ("remove" | "save" | "init" | "rotate" | "quit" | "exit", _) => {
                return Err(format!("wrong arguments for {verb}; {HELP}"))
            }
            _ => return Err(format!("unknown command {verb:?}; {HELP}")),
        };
        Ok(Some(command))
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::Share(_) => "share",
            Self::Remove(_) => "remove",
            Self::Save { .. } => "save",
            Self::Init => "init",
            Self::Rotate => "rotate",
            Self::Help => "help",
            Self::Quit => "quit",
        }
    }
}

/// Whitespace split with double-quote grouping.
fn split_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_word = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }
    if in_quotes {
        return Err("unterminated quote".into());
    }
    if has_word {
        words.push(current);
    }
    Ok(words)
}

// ── Dialog stand-ins ──────────────────────────────────────────────────────────

/// "Picks" the paths typed on the command line.
#[derive(Debug, Clone)]
pub struct ArgsPicker {
    paths: Vec<PathBuf>,
}

impl ArgsPicker {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl FilePicker for ArgsPicker {
    fn pick_files(&self) -> Vec<PathBuf> {
        self.paths.clone()
    }
}

/// Saves to a typed destination; an existing directory receives the file
/// under its original name.
#[derive(Debug, Clone)]
pub struct FixedDestination {
    path: PathBuf,
}

impl FixedDestination {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SaveDialog for FixedDestination {
    fn choose_destination(&self, suggested_name: &str) -> Option<PathBuf> {
        if self.path.is_dir() {
            Some(self.path.join(suggested_name))
        } else {
            Some(self.path.clone())
        }
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Runs one command.  `Quit` clears `running`.
pub async fn dispatch(
    ctx: &Arc<ServerContext>,
    command: ConsoleCommand,
    running: &AtomicBool,
) -> CommandResult<Value> {
    match command {
        ConsoleCommand::Share(paths) => {
            let added = select_files(ctx, &ArgsPicker::new(paths)).await;
            CommandResult::ok(json!(added))
        }
        ConsoleCommand::Remove(name) => {
            if remove_file(ctx, &name).await {
                CommandResult::ok(json!(name))
            } else {
                CommandResult::err(format!("{name} is not shared"))
            }
        }
        ConsoleCommand::Save { id, destination } => {
            match save_received_file(ctx, id, &FixedDestination::new(destination)).await {
                Ok(Some(path)) => CommandResult::ok(json!(path.display().to_string())),
                Ok(None) => CommandResult::err("save cancelled"),
                Err(e) => CommandResult::err(e.to_string()),
            }
        }
        ConsoleCommand::Init => match serde_json::to_value(request_init(ctx).await) {
            Ok(snapshot) => CommandResult::ok(snapshot),
            Err(e) => CommandResult::err(e.to_string()),
        },
        ConsoleCommand::Rotate => CommandResult::ok(json!(rotate_passcode(ctx).await)),
        ConsoleCommand::Help => CommandResult::ok(json!(HELP)),
        ConsoleCommand::Quit => {
            info!("quit requested from console");
            running.store(false, Ordering::Relaxed);
            CommandResult::ok(Value::Null)
        }
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

pub fn render_snapshot(snapshot: &StateSnapshot) -> String {
    json!({ "type": "state", "snapshot": snapshot }).to_string()
}

pub fn render_result(command: &str, result: &CommandResult<Value>) -> String {
    json!({
        "type": "result",
        "command": command,
        "success": result.success,
        "data": result.data,
        "error": result.error,
    })
    .to_string()
}

async fn emit(line: String) {
    let mut stdout = tokio::io::stdout();
    let write = async {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await
    };
    if let Err(e) = write.await {
        warn!("failed to write to stdout: {e}");
    }
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

/// Prints the current snapshot, then every change, until `running` clears.
pub async fn run_snapshot_printer(ctx: Arc<ServerContext>, running: Arc<AtomicBool>) {
    let mut snapshots = ctx.subscribe();
    let first = render_snapshot(&snapshots.borrow_and_update());
    emit(first).await;

    let mut tick = interval(Duration::from_millis(200));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = render_snapshot(&snapshots.borrow_and_update());
                emit(line).await;
            },
            _ = tick.tick() => {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
            },
        }
    }
    debug!("snapshot printer stopped");
}

/// Capacity of the stdin line channel; the reader thread blocks when full.
const STDIN_QUEUE: usize = 16;

/// Reads stdin on a dedicated OS thread and forwards each line.
///
/// A blocking stdin read cannot be cancelled, so it must not live on the
/// runtime: the thread is detached and dies with the process.  It stops on
/// EOF, on a read error, or once the receiver is dropped.
pub fn spawn_stdin_lines() -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(STDIN_QUEUE);
    let spawned = std::thread::Builder::new()
        .name("console-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("failed to start stdin reader: {e}");
    }
    rx
}

/// Reads commands from stdin until EOF, `quit`, or shutdown.
pub async fn run_command_reader(ctx: Arc<ServerContext>, running: Arc<AtomicBool>) {
    run_command_loop(ctx, spawn_stdin_lines(), running).await;
}

/// Dispatches each incoming line until the source closes or `running` clears.
pub async fn run_command_loop(
    ctx: Arc<ServerContext>,
    mut lines: mpsc::Receiver<io::Result<String>>,
    running: Arc<AtomicBool>,
) {
    emit(render_result("help", &CommandResult::ok(json!(HELP)))).await;

    let mut tick = interval(Duration::from_millis(200));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    while running.load(Ordering::Relaxed) {
        let line = tokio::select! {
            next = lines.recv() => match next {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!("failed to read stdin: {e}");
                    break;
                }
                None => {
                    debug!("stdin closed; console input stopped");
                    break;
                }
            },
            _ = tick.tick() => continue,
        };

        match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => {
                let verb = command.verb();
                let result = dispatch(&ctx, command, &running).await;
                emit(render_result(verb, &result)).await;
            }
            Ok(None) => {}
            Err(message) => {
                emit(render_result("invalid", &CommandResult::err(message))).await;
            }
        }
    }
    debug!("command reader stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::ContextSettings;
    use lansync_core::{AuthState, Passcode};

    fn context() -> Arc<ServerContext> {
        let auth = AuthState::with_passcode(Passcode::parse("4821").unwrap());
        ServerContext::new(ContextSettings::default(), auth, "192.168.1.20".into())
    }

    #[test]
    fn test_parse_share_with_quoted_path() {
        let cmd = ConsoleCommand::parse(r#"share "/home/u/My Report.pdf" /tmp/a.txt"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            cmd,
            ConsoleCommand::Share(vec![
                PathBuf::from("/home/u/My Report.pdf"),
                PathBuf::from("/tmp/a.txt"),
            ])
        );
    }

    #[test]
    fn test_parse_save_and_simple_verbs() {
        assert_eq!(
            ConsoleCommand::parse("save 17 /tmp/out").unwrap(),
            Some(ConsoleCommand::Save {
                id: 17,
                destination: PathBuf::from("/tmp/out"),
            })
        );
        assert_eq!(ConsoleCommand::parse("INIT").unwrap(), Some(ConsoleCommand::Init));
        assert_eq!(ConsoleCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ConsoleCommand::parse("share").is_err());
        assert!(ConsoleCommand::parse("save abc /tmp").is_err());
        assert!(ConsoleCommand::parse("remove").is_err());
        assert!(ConsoleCommand::parse("launch").is_err());
        assert!(ConsoleCommand::parse(r#"share "/unterminated"#).is_err());
    }

    #[test]
    fn test_fixed_destination_joins_directory() {
        let dir = std::env::temp_dir();
        let dialog = FixedDestination::new(dir.clone());
        assert_eq!(
            dialog.choose_destination("photo.jpg"),
            Some(dir.join("photo.jpg"))
        );
    }

    #[tokio::test]
    async fn test_dispatch_remove_unknown_reports_error() {
        let ctx = context();
        let running = AtomicBool::new(true);

        let result = dispatch(&ctx, ConsoleCommand::Remove("ghost.txt".into()), &running).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("ghost.txt"));
    }

    #[tokio::test]
    async fn test_dispatch_init_returns_snapshot_json() {
        let ctx = context();
        let running = AtomicBool::new(true);

        let result = dispatch(&ctx, ConsoleCommand::Init, &running).await;

        let data = result.data.unwrap();
        assert_eq!(data["localAddress"], "192.168.1.20");
        assert_eq!(data["passcode"], "4821");
    }

    #[tokio::test]
    async fn test_dispatch_quit_clears_running() {
        let ctx = context();
        let running = AtomicBool::new(true);

        let result = dispatch(&ctx, ConsoleCommand::Quit, &running).await;

        assert!(result.success);
        assert!(!running.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_command_loop_stops_on_shutdown_with_input_open() {
        // Arrange: the sender stays alive, as a blocked stdin read would.
        let ctx = context();
        let (_tx, rx) = mpsc::channel(1);
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_command_loop(Arc::clone(&ctx), rx, Arc::clone(&running)));

        // Act
        running.store(false, Ordering::Relaxed);

        // Assert
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop exits without further input")
            .unwrap();
    }

    #[tokio::test]
    async fn test_command_loop_dispatches_lines_until_quit() {
        // Arrange
        let ctx = context();
        let (tx, rx) = mpsc::channel(4);
        let running = Arc::new(AtomicBool::new(true));
        tx.send(Ok("rotate".to_string())).await.unwrap();
        tx.send(Ok("quit".to_string())).await.unwrap();

        // Act
        tokio::time::timeout(
            Duration::from_secs(2),
            run_command_loop(Arc::clone(&ctx), rx, Arc::clone(&running)),
        )
        .await
        .expect("quit ends the loop");

        // Assert
        assert_ne!(ctx.snapshot().await.passcode, "4821");
        assert!(!running.load(Ordering::Relaxed));
        drop(tx);
    }

    #[test]
    fn test_render_result_shape() {
        let line = render_result("rotate", &CommandResult::ok(json!("1234")));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "result");
        assert_eq!(value["command"], "rotate");
        assert_eq!(value["data"], "1234");
        assert_eq!(value["error"], Value::Null);
    }
}
