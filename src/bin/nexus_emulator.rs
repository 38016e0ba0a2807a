//!
//! nexus emulator binary
//! ---------------------
//! Local development backend: serves the Firebase-compatible REST + SSE surface
//! and anonymous sign-up over an in-process store.

use anyhow::Result;
use std::env;
use tracing_subscriber::EnvFilter;

use nexus::config::Config;

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?)
        .try_init();

    let args: Vec<String> = env::args().skip(1).collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("nexus emulator\n\nUSAGE:\n  nexus_emulator [--port N] [--snapshot PATH] [--rules PATH]\n\nOPTIONS:\n  --port N         listen port on 127.0.0.1 (env: NEXUS_EMULATOR_PORT, default 9000)\n  --snapshot PATH  JSON file the data is loaded from and saved to (env: NEXUS_EMULATOR_SNAPSHOT)\n  --rules PATH     JSON access rules (env: NEXUS_EMULATOR_RULES); default: signed-in read/write\n\nPoint the client at it with: nexus --db-url http://127.0.0.1:<port>\n");
        return Ok(());
    }

    let mut cfg = Config::from_env();
    let unknown = cfg.apply_args(&args)?;
    for a in &unknown {
        tracing::warn!(target: "startup", "ignoring unknown argument '{a}'");
    }
    println!("nexus emulator starting on port {}", cfg.emulator_port);
    nexus::server::run(&cfg).await
}
