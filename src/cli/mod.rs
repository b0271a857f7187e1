//! Prediction service CLI
//!
//! `serve` (the default) starts the HTTP server. Flags override the
//! environment-derived [`ServerConfig`].

use clap::{Args, Parser, Subcommand};
use colored::*;

use crate::model::ExecutionMode;
use crate::server::{run_server, ServerConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "predict-service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve predictions from a pretrained ONNX regression model")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the prediction server
    Serve(ServeArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Host to bind to [env: API_HOST]
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on [env: PORT]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Model version label [env: MODEL_VERSION]
    #[arg(long)]
    pub model_version: Option<String>,

    /// Base address to fetch the model artifact from [env: MODEL_BASE_URL]
    #[arg(long)]
    pub model_base_url: Option<String>,

    /// Directory served under /model [env: MODEL_DIR]
    #[arg(long)]
    pub model_dir: Option<String>,

    /// Persistence URL: sqlite:, file://, jsonl:, memory: or none [env: PERSIST_URL]
    #[arg(long)]
    pub persist_url: Option<String>,

    /// Forward pass execution: inline or blocking [env: EXECUTION_MODE]
    #[arg(long)]
    pub execution_mode: Option<ExecutionMode>,
}

impl ServeArgs {
    /// Layer the flags over the environment defaults
    pub fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            model_version: self.model_version.unwrap_or(defaults.model_version),
            model_base_url: self.model_base_url.or(defaults.model_base_url),
            model_dir: self.model_dir.or(defaults.model_dir),
            persist_url: self.persist_url.or(defaults.persist_url),
            execution_mode: self.execution_mode.unwrap_or(defaults.execution_mode),
            ..defaults
        }
    }
}

pub async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.into_config();

    println!();
    line_box_top();
    line_box_center(&format!("{}", "Prediction Service".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_sep();
    line_box(&kv("Health  ", &format!("http://{}:{}/health", config.host, config.port)));
    line_box(&kv("Ready   ", &format!("http://{}:{}/ready", config.host, config.port)));
    line_box(&kv("Predict ", &format!("http://{}:{}/predict", config.host, config.port)));
    line_box(&kv("Model   ", &config.model_version));
    line_box_sep();
    line_box_center(&format!("{}", dim("ctrl+c to stop")));
    line_box_bottom();
    println!();

    run_server(config).await
}
