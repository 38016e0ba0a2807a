//! Runtime configuration from `NEXUS_*` environment variables. Binaries apply their
//! command-line flags on top via [`Config::apply_args`].

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::identity::Role;

pub const DEFAULT_AI_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_AI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IP_LOOKUP_URL: &str = "https://api.ipify.org?format=json";
pub const DEFAULT_EMULATOR_PORT: u16 = 9000;

/// Deploy-time privileged account, loaded from the seed file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedAccount {
    pub identifier: String,
    pub secret: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the document store; `None` runs against an in-process store.
    pub db_url: Option<String>,
    pub auth_url: Option<String>,
    pub api_key: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
    pub ai_url: String,
    pub ip_lookup_url: String,
    pub state_dir: PathBuf,
    pub seed_file: Option<PathBuf>,
    pub emulator_port: u16,
    pub emulator_snapshot: Option<PathBuf>,
    pub emulator_rules: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: None,
            auth_url: None,
            api_key: None,
            ai_api_key: None,
            ai_model: DEFAULT_AI_MODEL.to_string(),
            ai_url: DEFAULT_AI_URL.to_string(),
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
            state_dir: default_state_dir(),
            seed_file: None,
            emulator_port: DEFAULT_EMULATOR_PORT,
            emulator_snapshot: None,
            emulator_rules: None,
        }
    }
}

fn default_state_dir() -> PathBuf {
    let home = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE"));
    match home {
        Some(h) => PathBuf::from(h).join(".nexus"),
        None => PathBuf::from(".nexus"),
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        cfg.db_url = env_nonempty("NEXUS_DB_URL");
        cfg.auth_url = env_nonempty("NEXUS_AUTH_URL");
        cfg.api_key = env_nonempty("NEXUS_API_KEY");
        cfg.ai_api_key = env_nonempty("NEXUS_AI_API_KEY").or_else(|| env_nonempty("API_KEY"));
        if let Some(m) = env_nonempty("NEXUS_AI_MODEL") { cfg.ai_model = m; }
        if let Some(u) = env_nonempty("NEXUS_AI_URL") { cfg.ai_url = u; }
        if let Some(u) = env_nonempty("NEXUS_IP_LOOKUP_URL") { cfg.ip_lookup_url = u; }
        if let Some(d) = env_nonempty("NEXUS_STATE_DIR") { cfg.state_dir = PathBuf::from(d); }
        cfg.seed_file = env_nonempty("NEXUS_SEED_FILE").map(PathBuf::from);
        if let Some(p) = env_nonempty("NEXUS_EMULATOR_PORT") {
            match p.parse::<u16>() {
                Ok(port) => cfg.emulator_port = port,
                Err(_) => warn!(target: "startup", "ignoring NEXUS_EMULATOR_PORT={p}: not a port number"),
            }
        }
        cfg.emulator_snapshot = env_nonempty("NEXUS_EMULATOR_SNAPSHOT").map(PathBuf::from);
        cfg.emulator_rules = env_nonempty("NEXUS_EMULATOR_RULES").map(PathBuf::from);
        cfg
    }

    /// Override fields from `--flag value` pairs. Unknown flags are returned so the
    /// caller can report them.
    pub fn apply_args(&mut self, args: &[String]) -> AppResult<Vec<String>> {
        let mut unknown = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let takes_value = matches!(
                flag,
                "--db-url" | "--auth-url" | "--api-key" | "--ai-key" | "--ai-model" | "--ai-url"
                    | "--ip-lookup-url" | "--state-dir" | "--seed-file" | "--port" | "--snapshot" | "--rules"
            );
            if !takes_value {
                unknown.push(args[i].clone());
                i += 1;
                continue;
            }
            let Some(val) = args.get(i + 1).cloned() else {
                return Err(AppError::user("missing_value", format!("{flag} requires a value")));
            };
            match flag {
                "--db-url" => self.db_url = Some(val),
                "--auth-url" => self.auth_url = Some(val),
                "--api-key" => self.api_key = Some(val),
                "--ai-key" => self.ai_api_key = Some(val),
                "--ai-model" => self.ai_model = val,
                "--ai-url" => self.ai_url = val,
                "--ip-lookup-url" => self.ip_lookup_url = val,
                "--state-dir" => self.state_dir = PathBuf::from(val),
                "--seed-file" => self.seed_file = Some(PathBuf::from(val)),
                "--port" => {
                    self.emulator_port = val
                        .parse()
                        .map_err(|_| AppError::user("bad_port", format!("invalid port '{val}'")))?;
                }
                "--snapshot" => self.emulator_snapshot = Some(PathBuf::from(val)),
                "--rules" => self.emulator_rules = Some(PathBuf::from(val)),
                _ => {}
            }
            i += 2;
        }
        Ok(unknown)
    }

    /// Auth endpoint base; defaults to the store base so the emulator serves both.
    pub fn auth_base(&self) -> Option<String> {
        self.auth_url.clone().or_else(|| self.db_url.clone())
    }

    pub fn load_seeds(&self) -> AppResult<Vec<SeedAccount>> {
        match &self.seed_file {
            Some(p) => load_seed_file(p),
            None => Ok(Vec::new()),
        }
    }
}

pub fn load_seed_file(path: &Path) -> AppResult<Vec<SeedAccount>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::io("seed_file", format!("{}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| AppError::user("seed_file", format!("{}: {e}", path.display())))
}
