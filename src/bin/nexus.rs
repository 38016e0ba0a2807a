//!
//! nexus terminal client
//! ---------------------
//! Interactive interpreter over a study portal. Talks to a Firebase-compatible
//! backend when `--db-url` / `NEXUS_DB_URL` is set (for example a running
//! `nexus_emulator`), otherwise to a local store under the state directory.

use std::env;

use anyhow::{anyhow, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use nexus::cli::outputformatter::terminal_width;
use nexus::cli::{Reply, Shell};
use nexus::config::Config;
use nexus::portal::Portal;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [flags]                 start the interactive client\n  {program} [flags] -c \"<commands>\"  run ';'-separated commands and exit\n\nFlags:\n  --db-url <url>        backend base URL (env: NEXUS_DB_URL); omit for a local store\n  --auth-url <url>      anonymous sign-up base URL (env: NEXUS_AUTH_URL, default: --db-url)\n  --api-key <key>       backend web key (env: NEXUS_API_KEY)\n  --ai-key <key>        study assistant key (env: NEXUS_AI_API_KEY or API_KEY)\n  --ai-model <name>     study assistant model (env: NEXUS_AI_MODEL)\n  --ai-url <url>        study assistant endpoint (env: NEXUS_AI_URL)\n  --ip-lookup-url <url> public IP lookup (env: NEXUS_IP_LOOKUP_URL)\n  --state-dir <path>    device storage (env: NEXUS_STATE_DIR, default ~/.nexus)\n  --seed-file <path>    privileged seed accounts (env: NEXUS_SEED_FILE)\n  -c, --command <text>  commands to run instead of the interpreter\n  -h, --help            show this help\n\nType 'help' inside the interpreter for its commands."
    );
}

fn print_reply(reply: &Reply) {
    if let Reply::Lines(lines) = reply {
        for l in lines {
            println!("{l}");
        }
    }
}

/// Run one line; errors are shown as alerts. Returns false on quit.
async fn step(shell: &mut Shell, line: &str) -> bool {
    match shell.run_line(line).await {
        Ok(Reply::Quit) => false,
        Ok(reply) => {
            print_reply(&reply);
            true
        }
        Err(e) => {
            eprintln!("! {}", e.message());
            true
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?)
        .with_writer(std::io::stderr)
        .try_init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage(&program);
        return Ok(());
    }

    let mut cfg = Config::from_env();
    let rest = cfg.apply_args(&args)?;
    let mut script: Option<String> = None;
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "-c" | "--command" => {
                script = Some(rest.get(i + 1).cloned().ok_or_else(|| anyhow!("{} requires a value", rest[i]))?);
                i += 2;
            }
            other => {
                print_usage(&program);
                return Err(anyhow!("unknown argument '{other}'"));
            }
        }
    }

    let portal = Portal::from_config(&cfg)?;
    let mut shell = Shell::new(portal).with_terminal(terminal_width(), script.is_none());

    shell.portal().restore();

    if let Some(script) = script {
        for line in script.split(';') {
            if !step(&mut shell, line).await {
                break;
            }
        }
        shell.portal().activity().flush().await;
        return Ok(());
    }

    match shell.portal().session().current() {
        Some(s) => println!("nexus: welcome back, {} ({}). Type 'help' for commands.", s.identifier, s.role),
        None => println!("nexus: not signed in. Type 'help' for commands."),
    }
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline(&shell.prompt()) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                if !step(&mut shell, &line).await {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    shell.portal().activity().flush().await;
    Ok(())
}
