//! Tollgate CLI - Session client for a running Tollgate server
//!
//! Usage:
//!   tollgate login <email>
//!   tollgate status
//!   tollgate watch
//!   tollgate logout
//!   tollgate register <email> [--name <name>]

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tollgate_client::{
    AuthSessionMachine, FileStorage, HttpAuthApi, SessionEvent, SignOutReason,
};
use tollgate_core::{AppConfig, AuthResult};

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Sign in to a Tollgate server and manage the session")]
#[command(version)]
struct Cli {
    /// Server base URL
    #[arg(long, env = "TOLLGATE_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Where the session token is kept between runs
    #[arg(long, env = "TOLLGATE_STATE_FILE", default_value = ".tollgate-session.json")]
    state_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in; asks for a verification code when the account has a second factor
    Login {
        email: String,
        /// Read from the prompt when omitted
        #[arg(long, env = "TOLLGATE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Answer the second-factor prompt with a backup code
        #[arg(long)]
        backup_code: bool,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Status,
    /// Create an account; the email must be verified before signing in
    Register {
        email: String,
        #[arg(long, env = "TOLLGATE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Ask the server to send the verification email again instead
        #[arg(long)]
        resend: bool,
    },
    /// Keep the session alive and print session events until it ends
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tollgate_client=warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(server = %cli.server, state_file = %cli.state_file.display(), "Starting");

    let api = HttpAuthApi::new(&cli.server)?;
    let machine = AuthSessionMachine::new(
        Arc::new(api),
        Arc::new(FileStorage::new(&cli.state_file)),
        AppConfig::from_env()?.session,
    );

    match cli.command {
        Commands::Login {
            email,
            password,
            backup_code,
        } => {
            let password = match password {
                Some(password) => password,
                None => prompt("Password: ").await?,
            };
            login(&machine, &email, &password, backup_code).await?;
        }
        Commands::Logout => {
            if machine.start().await {
                machine.logout().await;
                println!("Signed out");
            } else {
                println!("Not signed in");
            }
        }
        Commands::Status => {
            if machine.start().await {
                print_session(&machine);
                machine.stop();
            } else {
                println!("Not signed in");
            }
        }
        Commands::Register {
            email,
            password,
            name,
            resend,
        } => {
            if resend {
                machine.resend_verification(&email).await?;
                println!("If {email} is awaiting verification, a new email is on its way");
                return Ok(());
            }
            let password = match password {
                Some(password) => password,
                None => prompt("Password: ").await?,
            };
            let response = machine.register(&email, &password, name).await?;
            println!("{}", response.message);
        }
        Commands::Watch => watch(&machine).await?,
    }

    Ok(())
}

async fn login(
    machine: &AuthSessionMachine,
    email: &str,
    password: &str,
    backup_code: bool,
) -> anyhow::Result<()> {
    let mut result = machine.login(email, password).await;

    if result.requires_mfa() {
        let label = if backup_code { "Backup code" } else { "Verification code" };
        result = loop {
            if let Some((method, expires_at)) = machine.pending_mfa() {
                println!("{method} verification required, expires {expires_at}");
            }
            let code = prompt(&format!("{label}: ")).await?;
            let attempt = machine.verify_mfa(&code, backup_code).await;
            match attempt {
                // Wrong code; the challenge is still open
                AuthResult::Failure(_) if machine.pending_mfa().is_some() => report(&attempt),
                other => break other,
            }
        };
    }

    match result {
        AuthResult::Success { .. } => {
            print_session(machine);
            machine.stop();
            Ok(())
        }
        failure => {
            report(&failure);
            bail!("Sign-in failed")
        }
    }
}

async fn watch(machine: &AuthSessionMachine) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = machine.subscribe(move |event: &SessionEvent| {
        let _ = tx.send(event.clone());
    });

    if !machine.start().await {
        bail!("Not signed in");
    }
    print_session(machine);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(SessionEvent::SignedOut { reason }) => {
                    println!("Session ended: {}", describe(reason));
                    return Ok(());
                }
                Some(SessionEvent::Refreshed { expires_at }) => {
                    println!("Token refreshed, expires {expires_at}");
                }
                Some(SessionEvent::AuthFailed(failure)) => println!("Error: {failure}"),
                Some(other) => println!("{other:?}"),
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                machine.stop();
                println!("Stopped; the session is kept");
                return Ok(());
            }
        }
    }
}

fn describe(reason: SignOutReason) -> &'static str {
    match reason {
        SignOutReason::UserInitiated => "signed out",
        SignOutReason::IdleTimeout => "idle timeout",
        SignOutReason::SessionExpired => "session expired",
        SignOutReason::Replaced => "replaced by a new sign-in",
    }
}

fn print_session(machine: &AuthSessionMachine) {
    if let Some(user) = machine.user() {
        println!("Signed in as {} ({})", user.email, user.id);
        if !user.roles.is_empty() {
            let roles: Vec<&str> = user.roles.iter().map(|r| r.as_str()).collect();
            println!("Roles: {}", roles.join(", "));
        }
        if !user.permissions.is_empty() {
            let permissions: Vec<&str> = user.permissions.iter().map(|p| p.as_str()).collect();
            println!("Permissions: {}", permissions.join(", "));
        }
    }
    if let Some(session) = machine.session() {
        println!("Token expires {}", session.expires_at());
    }
}

fn report(result: &AuthResult) {
    if let AuthResult::Failure(failure) = result {
        eprintln!("Error: {failure}");
        if let Some(remaining) = failure.remaining_attempts {
            eprintln!("Attempts remaining: {remaining}");
        }
        if let Some(retry_after) = failure.retry_after {
            eprintln!("Retry in {}s", retry_after.as_secs());
        }
    }
}

async fn prompt(label: &str) -> anyhow::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}
