//! Quill CLI - line-oriented front end for the interaction engine.
//!
//! # Event Loop
//!
//! One task owns the [`quill_engine::Engine`]. It waits on two sources:
//!
//! 1. A line from stdin, parsed into a command and applied immediately
//! 2. A fixed 100ms tick that drains finished requests
//!
//! Requests run in the background, so typing `/history` or `/usage` while a
//! request is outstanding answers right away.

mod commands;
mod session;

use std::{
    env,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::PathBuf,
    sync::Mutex,
};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use quill_config::{QuillConfig, ResolvedConfig, config_path};
use quill_engine::{Engine, POLL_INTERVAL};

use crate::commands::Command;
use crate::session::{Flow, Session, dispatch_settings, openai_client};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Stdout belongs to the REPL; no log file means no logs.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.quill/logs/quill.log
    if let Some(config_path) = config_path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("quill.log"));
    }

    // Fallback: ./.quill/logs/quill.log
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join(".quill").join("logs").join("quill.log"));
    }

    candidates
}

fn load_config() -> ResolvedConfig {
    match ResolvedConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {e}. Using defaults.");
            QuillConfig::default().resolve()
        }
    }
}

fn prompt(out: &mut impl Write) -> io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = load_config();
    tracing::info!(
        model = %config.model,
        temperature = %config.temperature,
        memory_limit = config.memory_limit,
        has_api_key = config.api_key.is_some(),
        "Starting quill"
    );

    let mut out = io::stdout();
    if config.api_key.is_none() {
        writeln!(
            out,
            "No OpenAI API key found. Set {} or use /key <api-key>.",
            quill_config::API_KEY_ENV
        )?;
    }

    let engine = Engine::new(
        openai_client(&config),
        dispatch_settings(&config),
        config.memory_limit,
    );
    let mut session = Session::new(engine, config, config_path());

    if let Some(path) = env::args_os().nth(1) {
        session.handle(Command::Open(PathBuf::from(path)), &mut out)?;
    }
    writeln!(out, "Type /help for commands.")?;
    prompt(&mut out)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticks = tokio::time::interval(POLL_INTERVAL);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match commands::parse(&line) {
                    Ok(Some(command)) => {
                        if session.handle(command, &mut out)? == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => writeln!(out, "{e}")?,
                }
                prompt(&mut out)?;
            }
            _ = ticks.tick() => {
                if session.poll(&mut out)? > 0 {
                    prompt(&mut out)?;
                }
            }
        }
    }

    let pending = session.in_flight();
    if pending > 0 {
        tracing::info!(pending, "Exiting with requests still running");
        writeln!(out, "Discarding {pending} unfinished request(s).")?;
    }
    Ok(())
}
