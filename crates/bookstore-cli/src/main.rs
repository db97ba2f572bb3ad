//! Book Store client - command line front end.
//!
//! Signs customers and admins in against the bookstore backend, keeps the
//! session across runs, and drops it automatically when the token expires.

mod app;
mod credentials;
mod forms;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

/// Directory for a rolling log file, in addition to stderr
const ENV_LOG_DIR: &str = "BOOKSTORE_LOG_DIR";

/// Log file name prefix inside `BOOKSTORE_LOG_DIR`
const LOG_FILE_PREFIX: &str = "bookstore.log";

const USAGE: &str = "\
Usage: bookstore <command> [args] [--remember]

Commands:
  login [email]          Sign in with email and password
  register [email]       Create an account and sign in
  admin-login [username] Sign in to the admin dashboard
  logout                 Sign out and forget remembered passwords
  whoami                 Show the current session (default)
  watch                  Wait in the foreground until the session expires
  help                   Show this message

Options:
  --remember             Store the password in the OS keychain";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Login { email: Option<String>, remember: bool },
    Register { email: Option<String>, remember: bool },
    AdminLogin { username: Option<String>, remember: bool },
    Logout,
    WhoAmI,
    Watch,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut remember = false;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--remember" => remember = true,
            "-h" | "--help" => return Ok(Command::Help),
            flag if flag.starts_with('-') => return Err(format!("Unknown option: {}", flag)),
            value => positional.push(value.to_string()),
        }
    }

    let mut positional = positional.into_iter();
    let command = positional.next();
    let operand = positional.next();
    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {}", extra));
    }

    match command.as_deref() {
        None | Some("whoami") => Ok(Command::WhoAmI),
        Some("login") => Ok(Command::Login { email: operand, remember }),
        Some("register") => Ok(Command::Register { email: operand, remember }),
        Some("admin-login") => Ok(Command::AdminLogin { username: operand, remember }),
        Some("logout") => Ok(Command::Logout),
        Some("watch") => Ok(Command::Watch),
        Some("help") => Ok(Command::Help),
        Some(other) => Err(format!("Unknown command: {}", other)),
    }
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must outlive `main`'s work.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR).ok().filter(|d| !d.is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}\n\n{}", message, USAGE);
            drop(log_guard);
            std::process::exit(2);
        }
    };

    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    info!(?command, "Book Store client starting");
    let mut app = App::new()?;

    let result = match command {
        Command::Login { email, remember } => app.login(email, remember).await,
        Command::Register { email, remember } => app.register(email, remember).await,
        Command::AdminLogin { username, remember } => app.admin_login(username, remember).await,
        Command::Logout => app.logout(),
        Command::WhoAmI => app.whoami(),
        Command::Watch => app.watch().await,
        Command::Help => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_default_is_whoami() {
        assert_eq!(parse_args(&[]), Ok(Command::WhoAmI));
    }

    #[test]
    fn test_parse_login_with_email_and_remember() {
        assert_eq!(
            parse_args(&args(&["login", "a@b.com", "--remember"])),
            Ok(Command::Login {
                email: Some("a@b.com".to_string()),
                remember: true
            })
        );
        assert_eq!(
            parse_args(&args(&["admin-login"])),
            Ok(Command::AdminLogin {
                username: None,
                remember: false
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["checkout"])).is_err());
        assert!(parse_args(&args(&["login", "a", "b"])).is_err());
        assert!(parse_args(&args(&["logout", "--force"])).is_err());
        assert_eq!(parse_args(&args(&["watch", "-h"])), Ok(Command::Help));
    }
}
