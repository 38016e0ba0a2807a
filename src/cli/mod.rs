//! Interactive command surface of the `nexus` terminal client.
//!
//! [`parse_command`] turns one input line into a [`Command`]; [`Shell`] executes
//! commands against a [`Portal`] and returns the lines to print.

pub mod outputformatter;

use std::path::PathBuf;

use tracing::debug;

use crate::content::{ContentPath, Shelf};
use crate::developer::mime_for;
use crate::error::{AppError, AppResult};
use crate::identity::Action;
use crate::model::{AccountKind, Chapter, Resource, Subject};
use crate::portal::Portal;
use outputformatter::Table;

pub const HELP: &str = "\
Commands:
  login <identifier> <secret>          sign in
  logout                               sign out
  whoami                               show the signed-in user
  subjects                             list subjects
  use <subject>                        browse a subject (e.g. use p1)
  archive                              switch between a subject and its archive
  chapters [filter]                    list chapters, optionally filtered by name
  show <n>                             list the items of chapter n
  watch <n> <m>                        video link of item m in chapter n
  open <n> <m>                         document link of item m in chapter n
  add <name>                           add a chapter                    (admin)
  rename <n> <name>                    rename chapter n                 (admin)
  addres <n> <label> [video] [pdf]     add an item to chapter n; '-' skips a link (admin)
  delete <n>                           delete chapter n                 (admin)
  stash <n>                            move chapter n to the archive    (admin)
  accounts                             list login accounts              (owner)
  adduser <student|admin> <id> <secret>                                 (owner)
  deluser <student|admin> <key>                                         (owner)
  logs [limit]                         recent activity                  (owner)
  clearlogs                            delete all activity              (owner)
  dev [<name> <subtitle>]              show or set the developer profile
  devphoto <file>                      set the developer photo          (owner)
  ask <question>                       ask the study assistant
  help                                 show this help
  quit | exit                          leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { identifier: String, secret: String },
    Logout,
    WhoAmI,
    Subjects,
    Use(Subject),
    Archive,
    Chapters(Option<String>),
    Show(usize),
    Watch { chapter: usize, item: usize },
    Open { chapter: usize, item: usize },
    Add(String),
    Rename { chapter: usize, name: String },
    AddResource { chapter: usize, label: String, vid: Option<String>, pdf: Option<String> },
    Delete(usize),
    Stash(usize),
    Accounts,
    AddUser { kind: AccountKind, identifier: String, secret: String },
    DelUser { kind: AccountKind, key: String },
    Logs(usize),
    ClearLogs,
    Dev(Option<(String, String)>),
    DevPhoto(PathBuf),
    Ask(String),
    Help,
    Quit,
}

/// Whitespace-separated words; `"..."` groups words.
pub fn split_args(line: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quote = false;
    let mut started = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                in_quote = !in_quote;
                started = true;
            }
            c if c.is_whitespace() && !in_quote => {
                if started {
                    out.push(std::mem::take(&mut cur));
                    started = false;
                }
            }
            c => {
                cur.push(c);
                started = true;
            }
        }
    }
    if in_quote {
        return Err("unterminated quote".into());
    }
    if started {
        out.push(cur);
    }
    Ok(out)
}

/// 1-based position typed by the user -> 0-based index.
fn position(word: Option<&String>, what: &str) -> Result<usize, String> {
    let word = word.ok_or_else(|| format!("missing {what} number"))?;
    match word.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("'{word}' is not a valid {what} number")),
    }
}

fn link(word: Option<&String>) -> Option<String> {
    word.filter(|w| w.as_str() != "-").cloned()
}

fn rest(words: &[String], from: usize) -> String { words.get(from..).unwrap_or_default().join(" ") }

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let words = split_args(trimmed)?;
    let Some(verb) = words.first() else { return Ok(None) };
    let arg = |i: usize| words.get(i);
    let required = |i: usize, what: &str| arg(i).cloned().ok_or_else(|| format!("missing {what}"));

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "login" => Command::Login { identifier: required(1, "identifier")?, secret: required(2, "secret")? },
        "logout" => Command::Logout,
        "whoami" => Command::WhoAmI,
        "subjects" => Command::Subjects,
        "use" => Command::Use(required(1, "subject")?.parse()?),
        "archive" => Command::Archive,
        "chapters" | "ls" => Command::Chapters(Some(rest(&words, 1)).filter(|f| !f.is_empty())),
        "show" => Command::Show(position(arg(1), "chapter")?),
        "watch" => Command::Watch { chapter: position(arg(1), "chapter")?, item: position(arg(2), "item")? },
        "open" => Command::Open { chapter: position(arg(1), "chapter")?, item: position(arg(2), "item")? },
        "add" => Command::Add(rest(&words, 1)),
        "rename" => Command::Rename { chapter: position(arg(1), "chapter")?, name: rest(&words, 2) },
        "addres" => Command::AddResource {
            chapter: position(arg(1), "chapter")?,
            label: required(2, "label")?,
            vid: link(arg(3)),
            pdf: link(arg(4)),
        },
        "delete" => Command::Delete(position(arg(1), "chapter")?),
        "stash" => Command::Stash(position(arg(1), "chapter")?),
        "accounts" => Command::Accounts,
        "adduser" => Command::AddUser {
            kind: required(1, "account kind")?.parse()?,
            identifier: required(2, "identifier")?,
            secret: required(3, "secret")?,
        },
        "deluser" => Command::DelUser { kind: required(1, "account kind")?.parse()?, key: required(2, "key")? },
        "logs" => Command::Logs(match arg(1) {
            Some(n) => n.parse().map_err(|_| format!("'{n}' is not a number"))?,
            None => 50,
        }),
        "clearlogs" => Command::ClearLogs,
        "dev" => match (arg(1), arg(2)) {
            (None, _) => Command::Dev(None),
            (Some(name), subtitle) => Command::Dev(Some((name.clone(), subtitle.cloned().unwrap_or_default()))),
        },
        "devphoto" => Command::DevPhoto(PathBuf::from(required(1, "file")?)),
        // free text; quotes are kept as typed
        "ask" => Command::Ask(trimmed[verb.len()..].trim().to_string()),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(cmd))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Quit,
}

impl Reply {
    fn line(s: impl Into<String>) -> Self { Reply::Lines(vec![s.into()]) }
}

/// REPL state: the portal plus the subject being browsed.
pub struct Shell {
    portal: Portal,
    current: Option<ContentPath>,
    width: usize,
    color: bool,
}

impl Shell {
    pub fn new(portal: Portal) -> Self {
        Self { portal, current: None, width: 80, color: false }
    }

    pub fn with_terminal(mut self, width: usize, color: bool) -> Self {
        self.width = width;
        self.color = color;
        self
    }

    pub fn portal(&self) -> &Portal { &self.portal }

    pub fn current(&self) -> Option<ContentPath> { self.current }

    /// Text shown before each input line.
    pub fn prompt(&self) -> String {
        let who = self.portal.session().identifier().unwrap_or_else(|| "guest".into());
        match self.current {
            Some(p) => format!("{who}@{p}> "),
            None => format!("{who}> "),
        }
    }

    pub async fn run_line(&mut self, line: &str) -> AppResult<Reply> {
        match parse_command(line).map_err(|m| AppError::user("bad_command", m))? {
            Some(cmd) => self.execute(cmd).await,
            None => Ok(Reply::Lines(Vec::new())),
        }
    }

    fn path(&self) -> AppResult<ContentPath> {
        self.current
            .ok_or_else(|| AppError::user("no_subject", "No subject selected. Try 'use p1'."))
    }

    fn chapter_at(&self, index: usize) -> AppResult<(ContentPath, Chapter)> {
        let path = self.path()?;
        let ch = self
            .portal
            .content()
            .read(path)
            .get(index)
            .cloned()
            .ok_or_else(|| AppError::not_found("no_chapter", format!("No chapter #{} in {path}", index + 1)))?;
        Ok((path, ch))
    }

    async fn switch_to(&mut self, path: ContentPath) -> AppResult<Reply> {
        let chapters = self.portal.content().open(path).await?;
        if let Some(prev) = self.current.replace(path) {
            if prev != path {
                self.portal.content().close(prev);
            }
        }
        let label = match path.shelf {
            Shelf::Academy => path.subject.display_name().to_string(),
            Shelf::Archive => format!("{} (archive)", path.subject.display_name()),
        };
        Ok(Reply::line(format!("{label}: {} chapter(s)", chapters.len())))
    }

    fn table(&self, t: &Table) -> Vec<String> { t.render(self.width, self.color) }

    pub async fn execute(&mut self, cmd: Command) -> AppResult<Reply> {
        if !matches!(cmd, Command::Login { .. } | Command::AddUser { .. }) {
            debug!(?cmd, "cli command");
        }
        match cmd {
            Command::Login { identifier, secret } => {
                let s = self.portal.login(&identifier, &secret).await?;
                Ok(Reply::line(format!("Signed in as {} ({})", s.identifier, s.role)))
            }
            Command::Logout => {
                self.portal.logout().await?;
                self.current = None;
                Ok(Reply::line("Signed out."))
            }
            Command::WhoAmI => Ok(Reply::line(match self.portal.session().current() {
                Some(s) => format!("{} ({})", s.identifier, s.role),
                None => "Not signed in.".to_string(),
            })),
            Command::Subjects => {
                let mut t = Table::new(["Key", "Subject"]);
                for s in Subject::ALL.iter().filter(|s| !s.is_archive()) {
                    t.row([s.key(), s.display_name()]);
                }
                Ok(Reply::Lines(self.table(&t)))
            }
            Command::Use(subject) => {
                if subject.is_archive() {
                    return Err(AppError::user("no_subject", "Pick a subject first, then 'archive' to see its archive."));
                }
                self.switch_to(ContentPath::live(subject)?).await
            }
            Command::Archive => {
                let path = self.path()?;
                self.switch_to(path.counterpart()).await
            }
            Command::Chapters(filter) => {
                let path = self.path()?;
                let found = self.portal.content().search(path, filter.as_deref().unwrap_or(""));
                if found.is_empty() {
                    return Ok(Reply::line("No chapters."));
                }
                let mut t = Table::new(["#", "Chapter", "Items"]);
                for (i, ch) in found {
                    t.row([(i + 1).to_string(), ch.name, ch.resources.len().to_string()]);
                }
                Ok(Reply::Lines(self.table(&t)))
            }
            Command::Show(index) => {
                let (_, ch) = self.chapter_at(index)?;
                let mut lines = vec![ch.name.clone()];
                if ch.resources.is_empty() {
                    lines.push("No items.".into());
                    return Ok(Reply::Lines(lines));
                }
                let mut t = Table::new(["#", "Item", "Video", "Document"]);
                for (i, r) in ch.resources.iter().enumerate() {
                    let mark = |has: bool| if has { "yes" } else { "-" };
                    t.row([(i + 1).to_string(), r.label.clone(), mark(r.vid.is_some()).into(), mark(r.pdf.is_some()).into()]);
                }
                lines.extend(self.table(&t));
                Ok(Reply::Lines(lines))
            }
            Command::Watch { chapter, item } => Ok(Reply::line(self.portal.play(self.path()?, chapter, item)?)),
            Command::Open { chapter, item } => Ok(Reply::line(self.portal.document(self.path()?, chapter, item)?)),
            Command::Add(name) => {
                let ch = self.portal.content().add_chapter(self.path()?, &name, Vec::new()).await?;
                Ok(Reply::line(format!("Added '{}'.", ch.name)))
            }
            Command::Rename { chapter, name } => {
                let (path, ch) = self.chapter_at(chapter)?;
                let ch = self.portal.content().edit_chapter(path, chapter, &name, ch.resources).await?;
                Ok(Reply::line(format!("Renamed to '{}'.", ch.name)))
            }
            Command::AddResource { chapter, label, vid, pdf } => {
                let (path, ch) = self.chapter_at(chapter)?;
                let mut resources = ch.resources;
                resources.push(Resource::new(label.trim(), vid, pdf));
                let ch = self.portal.content().edit_chapter(path, chapter, &ch.name, resources).await?;
                Ok(Reply::line(format!("'{}' now has {} item(s).", ch.name, ch.resources.len())))
            }
            Command::Delete(index) => {
                let ch = self.portal.content().delete_chapter(self.path()?, index).await?;
                Ok(Reply::line(format!("Deleted '{}'.", ch.name)))
            }
            Command::Stash(index) => {
                let ch = self.portal.content().archive_chapter(self.path()?, index).await?;
                Ok(Reply::line(format!("Moved '{}' to the archive.", ch.name)))
            }
            Command::Accounts => {
                let acl = self.portal.accounts().list().await?;
                let mut t = Table::new(["Kind", "Key", "Identifier", "Secret"]);
                for (key, a) in &acl.admins {
                    t.row(["admin", key.as_str(), a.identifier.as_str(), a.secret.as_str()]);
                }
                for (key, a) in &acl.students {
                    t.row(["student", key.as_str(), a.identifier.as_str(), a.secret.as_str()]);
                }
                if t.is_empty() {
                    return Ok(Reply::line("No accounts."));
                }
                Ok(Reply::Lines(self.table(&t)))
            }
            Command::AddUser { kind, identifier, secret } => {
                let key = self.portal.accounts().add(kind, &identifier, &secret).await?;
                Ok(Reply::line(format!("Added {} '{identifier}' ({key}).", kind.collection().trim_end_matches('s'))))
            }
            Command::DelUser { kind, key } => {
                self.portal.accounts().remove(kind, &key).await?;
                Ok(Reply::line(format!("Removed {key}.")))
            }
            Command::Logs(limit) => {
                let records = self.portal.activity().recent(limit).await?;
                if records.is_empty() {
                    return Ok(Reply::line("No activity."));
                }
                let mut t = Table::new(["Time", "User", "Action", "Details", "IP"]);
                for (_, r) in records {
                    t.row([r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(), r.user, r.action, r.details, r.ip]);
                }
                Ok(Reply::Lines(self.table(&t)))
            }
            Command::ClearLogs => {
                self.portal.activity().clear().await?;
                Ok(Reply::line("Activity log cleared."))
            }
            Command::Dev(None) => {
                let info = self.portal.developer().get().await?.unwrap_or_default();
                Ok(Reply::Lines(vec![
                    info.name.unwrap_or_else(|| "(no name)".into()),
                    info.subtitle.unwrap_or_default(),
                    match info.photo_url {
                        Some(p) => format!("photo: {} bytes as data URL", p.len()),
                        None => "photo: none".into(),
                    },
                ]))
            }
            Command::Dev(Some((name, subtitle))) => {
                self.portal.developer().set_profile(&name, &subtitle).await?;
                Ok(Reply::line("Profile updated."))
            }
            Command::DevPhoto(file) => {
                let bytes = std::fs::read(&file)
                    .map_err(|e| AppError::io("photo_read", format!("{}: {e}", file.display())))?;
                self.portal.developer().set_photo(&bytes, mime_for(&file)).await?;
                Ok(Reply::line("Photo updated."))
            }
            Command::Ask(question) => {
                self.portal.session().require(Action::ViewContent)?;
                let help = self.portal.assistant().ask_about(&question, self.current.map(|p| p.subject)).await;
                let mut lines: Vec<String> = help.text.lines().map(str::to_string).collect();
                if !help.citations.is_empty() {
                    lines.push(String::new());
                    lines.push("Sources:".into());
                    lines.extend(help.citations.iter().map(|c| format!("  {} <{}>", c.title, c.uri)));
                }
                Ok(Reply::Lines(lines))
            }
            Command::Help => Ok(Reply::Lines(HELP.lines().map(str::to_string).collect())),
            Command::Quit => Ok(Reply::Quit),
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
