//! Echo Bot
//!
//! A small bot showing the main pieces of Cobalt:
//!
//! - `ping` (when addressed): replies `pong`
//! - `/echo <text>`: repeats the text
//! - `/name`: asks for your name and waits for the answer
//! - `/guess`: a number guessing game that keeps listening to you until you
//!   get it right
//! - `/info`: shows what the bot knows about the message
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --config cobalt.toml
//! ```

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Parser;
use cobalt::prelude::*;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Cobalt echo bot")]
struct Args {
    /// Configuration file (searched in the current directory if omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`.
    #[arg(short, long)]
    profile: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn ping(ctx: MatcherContext) -> Result<(), ApiError> {
    ctx.send("pong").await?;
    Ok(())
}

async fn echo(ctx: MatcherContext) -> Result<(), ApiError> {
    let text = ctx.arg();
    if !text.is_empty() {
        ctx.send(text).await?;
    }
    Ok(())
}

async fn ask_name(ctx: MatcherContext) -> Result<(), FrameworkError> {
    let name = ctx.get("What should I call you?").await?;
    ctx.send(format!("Nice to meet you, {}!", name.trim())).await?;
    Ok(())
}

#[derive(FromState)]
struct Game {
    #[state(default)]
    secret: u32,
    #[state(default)]
    attempts: u32,
}

/// Stays attached to the player through `Response::Reject` until the guess
/// is right; the game lives in the matcher state carried between attempts.
async fn guess(ctx: MatcherContext) -> Result<Response, FrameworkError> {
    let game: Game = ctx.parse()?;

    if game.secret == 0 {
        let secret = random_secret();
        ctx.set("secret", secret);
        ctx.send("I picked a number from 1 to 100. Your guess?").await?;
        return Ok(Response::Reject);
    }

    let text = ctx.event().plain_text();
    let Ok(number) = text.trim().parse::<u32>() else {
        ctx.send("That is not a number, try again.").await?;
        return Ok(Response::Reject);
    };

    let attempts = game.attempts + 1;
    ctx.set("attempts", attempts);
    let hint = match number.cmp(&game.secret) {
        std::cmp::Ordering::Less => "higher",
        std::cmp::Ordering::Greater => "lower",
        std::cmp::Ordering::Equal => {
            ctx.send(format!("Correct! {attempts} attempt(s).")).await?;
            return Ok(Response::Finish);
        }
    };
    ctx.send(format!("Go {hint}.")).await?;
    Ok(Response::Reject)
}

async fn message_info(ctx: MatcherContext) -> Result<(), ApiError> {
    let event = ctx.event();
    let sender = event.sender.as_ref().map(|s| s.name()).unwrap_or_default();
    let mut text = format!(
        "Message info\n- type: {}\n- from: {} ({})\n- message id: {}\n- to me: {}",
        event.detail_type, sender, event.user_id, event.message_id, event.is_to_me
    );
    if event.is_group() {
        text.push_str(&format!("\n- group: {}", event.group_id));
    }
    ctx.send(text).await?;
    Ok(())
}

fn random_secret() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    nanos % 100 + 1
}

// ============================================================================
// Plugin
// ============================================================================

struct Demo;

impl Plugin for Demo {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(
            "demo",
            "Cobalt Contributors",
            env!("CARGO_PKG_VERSION"),
            "ping, echo, name, guess and info commands",
        )
    }

    fn start(&self, engine: &Engine) -> anyhow::Result<()> {
        engine
            .on_full_match("ping")
            .name("ping")
            .rule(only_to_me())
            .block(true)
            .handle(ping);
        engine.on_command("echo").name("echo").block(true).handle(echo);
        engine.on_command("name").name("name").block(true).handle(ask_name);
        engine.on_command("guess").name("guess").block(true).handle(guess);
        engine
            .on_command("info")
            .name("info")
            .priority(10)
            .handle(message_info);
        Ok(())
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = CobaltRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build()?.plugin(Demo);

    info!(url = %runtime.config().connection.url, "Starting echo bot");
    runtime.run().await?;
    Ok(())
}
