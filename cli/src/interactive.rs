use crate::commands::AppContext;
use crate::fetch_ui::{truncate_url, with_spinner};
use crate::format::OutputFormat;
use bukusync::error::{BukusyncError, Result};
use bukusync::fetch::{HttpTitleFetcher, OfflineFetcher, TitleFetcher};
use bukusync::models::{Bookmark, BookmarkPatch, NewBookmark, OwnerId};
use bukusync::store::MemoryStore;
use bukusync::{AuthState, Controller, SyncStatus};
use owo_colors::OwoColorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use tokio::runtime::Runtime;

pub struct ShellOptions {
    pub user: Option<String>,
    pub sessions: usize,
    pub offline: bool,
}

/// One shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Login(String),
    Logout,
    Add { url: String, title: String },
    Update { index: usize, patch: BookmarkPatch },
    Delete(usize),
    List,
    Status,
    Help,
    Quit,
}

/// A command and the session it targets (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub session: usize,
    pub input: Input,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command '{0}', type '?' for help")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid session '{0}'")]
    Session(String),

    #[error("Invalid index '{0}'")]
    Index(String),
}

const UPDATE_USAGE: &str = "u <n> [--url <url>] [--favicon <url>] [--title <title>]";

fn parse_position(token: &str) -> Option<usize> {
    token.parse::<usize>().ok().filter(|n| *n > 0)
}

fn parse_update(args: &[&str]) -> std::result::Result<Input, ParseError> {
    let (first, rest) = args.split_first().ok_or(ParseError::Usage(UPDATE_USAGE))?;
    let index = parse_position(first).ok_or_else(|| ParseError::Index(first.to_string()))?;

    let mut patch = BookmarkPatch::default();
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            "--url" => {
                let url = rest.get(i + 1).ok_or(ParseError::Usage(UPDATE_USAGE))?;
                patch = patch.with_url(*url);
                i += 2;
            }
            "--favicon" => {
                let favicon = rest.get(i + 1).ok_or(ParseError::Usage(UPDATE_USAGE))?;
                patch = patch.with_favicon_url(*favicon);
                i += 2;
            }
            "--title" => {
                let words: Vec<&str> = rest[i + 1..]
                    .iter()
                    .take_while(|w| !w.starts_with("--"))
                    .copied()
                    .collect();
                i += 1 + words.len();
                patch = patch.with_title(words.join(" "));
            }
            _ => return Err(ParseError::Usage(UPDATE_USAGE)),
        }
    }

    if patch.is_empty() {
        return Err(ParseError::Usage(UPDATE_USAGE));
    }
    Ok(Input::Update { index, patch })
}

/// Parse one line of input. Blank lines yield `None`.
pub fn parse_line(line: &str) -> std::result::Result<Option<Line>, ParseError> {
    let mut parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(None);
    }

    let mut session = 1;
    if let Some(target) = parts[0].strip_prefix('@') {
        session = parse_position(target).ok_or_else(|| ParseError::Session(target.to_string()))?;
        parts.remove(0);
        if parts.is_empty() {
            return Err(ParseError::Usage("@<session> <command>"));
        }
    }

    let cmd = parts[0];
    let args = &parts[1..];

    let input = match cmd {
        "login" => match args {
            [user] => Input::Login(user.to_string()),
            _ => return Err(ParseError::Usage("login <user>")),
        },
        "logout" => Input::Logout,
        "a" | "add" => match args.split_first() {
            Some((url, title)) => Input::Add {
                url: url.to_string(),
                title: title.join(" "),
            },
            None => return Err(ParseError::Usage("a <url> [title...]")),
        },
        "u" | "update" => parse_update(args)?,
        "d" | "delete" => match args {
            [n] => Input::Delete(parse_position(n).ok_or_else(|| ParseError::Index(n.to_string()))?),
            _ => return Err(ParseError::Usage("d <n>")),
        },
        "ls" | "p" => Input::List,
        "status" => Input::Status,
        "?" | "help" => Input::Help,
        "q" | "quit" | "exit" => Input::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };

    Ok(Some(Line { session, input }))
}

type SessionController<F> = Controller<Arc<MemoryStore>, Arc<F>>;

/// Several controllers bound to one auth signal and one store, the way
/// several open tabs of the same user would be.
struct Shell<F: TitleFetcher + 'static> {
    runtime: Runtime,
    auth: AuthState,
    sessions: Vec<Arc<SessionController<F>>>,
    format: OutputFormat,
    nc: bool,
    fetches_titles: bool,
}

impl<F: TitleFetcher + 'static> Shell<F> {
    fn new(ctx: &AppContext, runtime: Runtime, fetcher: F, count: usize, fetches_titles: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(fetcher);
        let auth = AuthState::new();

        let sessions = (0..count)
            .map(|_| {
                let controller = Arc::new(Controller::from_config(
                    Arc::clone(&store),
                    Arc::clone(&fetcher),
                    ctx.config,
                ));
                let bound = Arc::clone(&controller);
                let rx = auth.watch();
                runtime.spawn(async move { bound.bind(rx).await });
                controller
            })
            .collect();

        Self {
            runtime,
            auth,
            sessions,
            format: ctx.format,
            nc: ctx.nc,
            fetches_titles,
        }
    }

    fn session(&self, n: usize) -> Result<&SessionController<F>> {
        n.checked_sub(1)
            .and_then(|i| self.sessions.get(i))
            .map(|c| c.as_ref())
            .ok_or_else(|| BukusyncError::InvalidInput(format!("No session {}", n)))
    }

    fn bookmark_at(&self, session: usize, index: usize) -> Result<Bookmark> {
        let bookmarks = self.session(session)?.bookmarks();
        index
            .checked_sub(1)
            .and_then(|i| bookmarks.get(i))
            .cloned()
            .ok_or_else(|| BukusyncError::InvalidInput(format!("No bookmark at index {}", index)))
    }

    /// Block until every session has caught up with `owner`.
    fn settle(&self, owner: Option<&OwnerId>) {
        self.runtime.block_on(async {
            for session in &self.sessions {
                session.settled(owner).await;
            }
        });
    }

    fn prompt(&self) -> String {
        match self.auth.current_owner() {
            Some(owner) => format!("bukusync({})> ", owner),
            None => "bukusync> ".to_string(),
        }
    }

    /// Run one command. Returns `false` when the shell should exit.
    fn execute(&self, line: Line) -> Result<bool> {
        match line.input {
            Input::Login(user) => {
                let owner = OwnerId::new(user);
                self.auth.login(owner.clone());
                self.settle(Some(&owner));
                self.print_status();
            }
            Input::Logout => {
                self.auth.logout();
                self.settle(None);
                eprintln!("Signed out.");
            }
            Input::Add { url, title } => {
                let controller = self.session(line.session)?;
                let input = NewBookmark::new(url, title);
                let result = if self.fetches_titles && input.title.trim().is_empty() {
                    let shown = truncate_url(&input.url, 60);
                    with_spinner(
                        &self.runtime,
                        &format!("Fetching: {}", shown),
                        controller.add(input),
                        |_| None,
                    )
                } else {
                    self.runtime.block_on(controller.add(input))
                };
                result?;
                if let Some(added) = controller.bookmarks().first() {
                    eprintln!("Added: {}", added.title);
                }
            }
            Input::Update { index, patch } => {
                let target = self.bookmark_at(line.session, index)?;
                let controller = self.session(line.session)?;
                self.runtime.block_on(controller.update(&target.id, patch))?;
                eprintln!("Updated {}.", index);
            }
            Input::Delete(index) => {
                let target = self.bookmark_at(line.session, index)?;
                let controller = self.session(line.session)?;
                self.runtime.block_on(controller.remove(&target.id))?;
                eprintln!("Deleted: {}", target.title);
            }
            Input::List => {
                let controller = self.session(line.session)?;
                if let SyncStatus::Error(message) = controller.status() {
                    eprintln!("Warning: last load failed: {}", message);
                }
                self.format
                    .print_bookmarks(&controller.bookmarks(), self.nc)?;
            }
            Input::Status => self.print_status(),
            Input::Help => print_help(),
            Input::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn print_status(&self) {
        for (i, session) in self.sessions.iter().enumerate() {
            let snapshot = session.snapshot();
            let owner = snapshot
                .owner
                .map(|o| o.to_string())
                .unwrap_or_else(|| "-".to_string());
            let line = format!(
                "@{} {} {} ({} bookmarks)",
                i + 1,
                owner,
                describe_status(&snapshot.status),
                snapshot.bookmarks.len()
            );
            if self.nc {
                println!("{}", line);
            } else {
                println!("{}", line.cyan());
            }
        }
    }

    fn run(&self, options: &ShellOptions) -> Result<()> {
        let mut rl = DefaultEditor::new().map_err(|e| BukusyncError::Other(e.to_string()))?;

        println!(
            "bukusync interactive mode - {} session(s), type '?' for help",
            self.sessions.len()
        );
        if let Some(user) = &options.user {
            self.execute(Line {
                session: 1,
                input: Input::Login(user.clone()),
            })?;
        }

        loop {
            let readline = rl.readline(&self.prompt());
            match readline {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line)
                        .map_err(|e| BukusyncError::Other(e.to_string()))?;

                    match parse_line(line) {
                        Ok(Some(parsed)) => match self.execute(parsed) {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => eprintln!("Error: {}", e),
                        },
                        Ok(None) => {}
                        Err(e) => eprintln!("{}", e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("^D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }
        Ok(())
    }
}

fn describe_status(status: &SyncStatus) -> String {
    match status {
        SyncStatus::Idle => "idle".to_string(),
        SyncStatus::Loading => "loading".to_string(),
        SyncStatus::Error(message) => format!("error: {}", message),
    }
}

pub fn run(ctx: &AppContext, options: &ShellOptions) -> Result<()> {
    let runtime = Runtime::new()?;
    if options.offline {
        Shell::new(ctx, runtime, OfflineFetcher, options.sessions, false).run(options)
    } else {
        let fetcher = HttpTitleFetcher::from_config(ctx.config)?;
        Shell::new(ctx, runtime, fetcher, options.sessions, true).run(options)
    }
}

fn print_help() {
    println!(
        "
INTERACTIVE MODE COMMANDS:

SESSIONS:
    login <user>           Sign in every session as <user>
    logout                 Sign out every session
    status                 Show owner, load state and size of each session
    @<k> <command>         Run <command> in session k (default: 1)

ADD & MODIFY:
    a <url> [title...]     Add a bookmark; without a title the page title is fetched
    u <n> [options]        Update bookmark n of the listing
                           Options: --url <url> --favicon <url> --title <title...>
    d <n>                  Delete bookmark n of the listing

LIST:
    ls  or p               List bookmarks of the session

HELP & EXIT:
    ?  or help             Show this help
    q  or quit or exit     Exit interactive mode
    ^D or ^C               Exit interactive mode

EXAMPLES:
    login alice
    a rust-lang.org The Rust Language
    @2 ls                  # the second session sees the new bookmark
    u 1 --title Rust
    @2 d 1
"
    );
}
