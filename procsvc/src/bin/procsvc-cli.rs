//! procsvc CLI - Binary crate entry-point
//! ======================================
//!
//! Command host around [`procsvc::Interp`]. Every line is one command
//! (`kill`, `wait`, `serve`, …, see `help`); results go to stdout, raised
//! errors to stderr as `error: <message>`.
//!
//! ## Typical usage
//! ```text
//! # One command, then exit
//! $ procsvc-cli eval kill notepad.exe 2
//!
//! # Interactive
//! $ procsvc-cli
//! execsuspended {sleep 5}
//! 4 8
//! resume 8
//!
//! # Run a script; keeps running while it serves
//! $ procsvc-cli --script ./service.tcl
//!
//! # Serve with defaults from the config file
//! $ procsvc-cli serve --name demo --mask 5 --template on-control
//! ```
//!
//! Control events of a running service are queued on the same event loop as
//! input lines, so their commands always run on the interpreter thread.

use std::{
    io::BufRead,
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, mpsc},
    thread,
};

use clap::{Parser, Subcommand};
use procsvc::*;

#[derive(Debug, Parser)]
#[command(name = "procsvc-cli", version)]
struct Cli {
    /// Config file (default: the per-user procsvc config)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, short = 'v', value_name = "LEVEL")]
    log_level: Option<String>,

    /// Evaluate the commands in FILE, one per line
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Evaluate one command and print its result
    Eval {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },

    /// Run as a service until it is stopped
    Serve {
        #[arg(long)]
        name: Option<String>,
        /// Accepted controls (1 stop, 2 pause/continue, 4 shutdown, 0x100 pre-shutdown)
        #[arg(long)]
        mask: Option<String>,
        /// Command the control code is appended to
        #[arg(long)]
        template: Option<String>,
    },
}

enum Event {
    Line(String),
    Control(ControlRequest),
    InputClosed,
    SessionEnded,
}

struct EventSink(mpsc::Sender<Event>);

impl ControlSink for EventSink {
    fn mark(&self, request: ControlRequest) -> bool {
        self.0.send(Event::Control(request)).is_ok()
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ProcsvcResult<ExitCode> {
    let mut config = ProcsvcConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config.logging()?.logger_name("procsvc-cli").load_logger()?;

    let (tx, events) = mpsc::channel();
    let mut interp = Interp::new()
        .with_registry(config.registry())
        .with_control_sink(Arc::new(EventSink(tx.clone())));

    match cli.cmd {
        Some(Cmd::Eval { words }) => {
            let result = interp.eval_words(&words);
            let failed = result.is_err();
            report(result);
            if failed {
                return Ok(ExitCode::FAILURE);
            }
            return Ok(exit_code(event_loop(&mut interp, &events, &tx, false)));
        }
        Some(Cmd::Serve {
            name,
            mask,
            template,
        }) => {
            let name = name.or(config.service_name.clone()).ok_or_else(|| {
                ProcsvcError::InvalidConfig {
                    field: "service_name",
                    reason: "no --name given and none configured".into(),
                }
            })?;
            let template = template.or(config.command_template.clone()).ok_or_else(|| {
                ProcsvcError::InvalidConfig {
                    field: "command_template",
                    reason: "no --template given and none configured".into(),
                }
            })?;
            let mask = mask.unwrap_or_else(|| config.control_mask.to_string());

            let words = vec!["serve".to_owned(), name, mask, template];
            let value = interp.eval_words(&words)?;
            if value.as_int() != Some(0) {
                eprintln!("error: serve returned {value}");
                return Ok(ExitCode::FAILURE);
            }
            return Ok(exit_code(event_loop(&mut interp, &events, &tx, false)));
        }
        None => (),
    }

    if let Some(script) = &cli.script {
        let text = std::fs::read_to_string(script)
            .map_err(|e| ProcsvcError::file_system("read script", script, e))?;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let result = interp.eval(line);
            let failed = result.is_err();
            report(result);
            if failed {
                return Ok(ExitCode::FAILURE);
            }
            if let Some(code) = interp.exit_requested() {
                return Ok(exit_code(code));
            }
        }
        return Ok(exit_code(event_loop(&mut interp, &events, &tx, false)));
    }

    spawn_stdin_reader(tx.clone());
    Ok(exit_code(event_loop(&mut interp, &events, &tx, true)))
}

fn event_loop(
    interp: &mut Interp,
    events: &mpsc::Receiver<Event>,
    tx: &mpsc::Sender<Event>,
    mut input_open: bool,
) -> i32 {
    watch_sessions(interp, tx);
    if let Some(code) = interp.exit_requested() {
        return code;
    }
    if !input_open && !interp.service_active() {
        return 0;
    }

    for event in events.iter() {
        match event {
            Event::Line(line) => report(interp.eval(&line)),
            Event::Control(request) => report(request.complete(interp)),
            Event::InputClosed => input_open = false,
            Event::SessionEnded => (),
        }

        if let Some(code) = interp.exit_requested() {
            return code;
        }
        watch_sessions(interp, tx);
        if !input_open && !interp.service_active() {
            break;
        }
    }
    0
}

/// Wakes the loop when a newly started session tears down.
fn watch_sessions(interp: &mut Interp, tx: &mpsc::Sender<Event>) {
    for session in interp.take_started_sessions() {
        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name("session-watch".to_owned())
            .spawn(move || {
                if let Err(e) = session.wait() {
                    eprintln!("error: service '{}': {e}", session.name());
                }
                let _ = tx.send(Event::SessionEnded);
            });
        if let Err(e) = spawned {
            eprintln!("error: cannot watch service session: {e}");
        }
    }
}

fn spawn_stdin_reader(tx: mpsc::Sender<Event>) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(Event::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(Event::InputClosed);
    });
}

fn report(result: Result<Value, CommandError>) {
    match result {
        Ok(value) if value.is_empty() => (),
        Ok(value) => println!("{value}"),
        Err(e) => eprintln!("error: {e}"),
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}
