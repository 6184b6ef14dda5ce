use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Args;
use rpassword::prompt_password;

use super::context::{AppContext, explain};

#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Email to sign in with; prompted for when omitted
    #[arg(long)]
    pub email: Option<String>,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

pub async fn login(args: LoginArgs) -> Result<()> {
    let context = AppContext::load(args.config)?;

    let email = match args.email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = prompt_password("Password: ")?;
    if password.trim().is_empty() {
        bail!("password must not be empty");
    }

    let response = context.api.login(&email, &password).await.map_err(explain)?;

    match response.user {
        Some(user) => println!("Logged in as {}", user.email),
        None => println!("Logged in as {email}"),
    }
    if !context.session().credential().email_verified {
        println!("note: your email address is not verified yet");
    }
    println!("session stored at {}", context.session_path.display());
    Ok(())
}

pub async fn logout(args: LogoutArgs) -> Result<()> {
    let context = AppContext::load(args.config)?;
    if context.session().credential().is_empty() {
        println!("No session found at {}", context.session_path.display());
        return Ok(());
    }

    context.api.logout().await;
    println!("Removed session at {}", context.session_path.display());
    Ok(())
}

pub fn status(args: &StatusArgs) -> Result<()> {
    let context = AppContext::load(args.config.clone())?;
    let session = context.session();
    let credential = session.credential();

    if credential.is_empty() {
        println!("Not signed in (no session at {})", context.session_path.display());
        return Ok(());
    }

    println!("Signed in");
    if let Some(user_id) = session.user_id() {
        println!("user id: {user_id}");
    }
    match credential.expires_at {
        Some(expires_at) => {
            let state = if session.is_expired() { "expired" } else { "valid" };
            let remaining = (expires_at - Utc::now()).num_seconds().max(0);
            println!("access token: {state} (expires at {expires_at}, {remaining}s left)");
        }
        None => println!("access token: expired (no expiry recorded)"),
    }
    println!("email verified: {}", credential.email_verified);
    println!("session file: {}", context.session_path.display());
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush().ok();
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let trimmed = input.trim().to_string();
    if trimmed.is_empty() {
        bail!("input must not be empty");
    }
    Ok(trimmed)
}
