//! Stream one reply from a running backend and print it as it arrives.
//!
//! Run with:
//! ```bash
//! export LORECHAT_CONFIG="$HOME/.config/lorechat/config.toml"   # optional
//! export LORECHAT_SESSION="session=..."                         # optional
//! cargo run --example chat_stream -- "Write a haiku about the sea."
//! ```
//!
//! Press Ctrl-C to cancel mid-stream.

use lorechat::callbacks::StreamCallbacks;
use lorechat::client::StreamClient;
use lorechat::config::ClientConfig;
use lorechat::model::ChatDone;
use serde_json::Value;
use std::io::Write;

struct Terminal;

impl StreamCallbacks for Terminal {
    fn on_chunk(&mut self, delta: &str) {
        print!("{delta}");
        std::io::stdout().flush().ok();
    }

    fn on_reasoning(&mut self, delta: &str) {
        eprint!("{delta}");
    }

    fn on_context(&mut self, context: &Value) {
        eprintln!("[context] {context}");
    }

    fn on_done(&mut self, done: &ChatDone) {
        println!("\n\n=== Done: chat {:?}, message {:?} ===", done.chat_id, done.message_id);
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("\nError: {message}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = match std::env::var_os("LORECHAT_CONFIG") {
        Some(path) => ClientConfig::load_optional(path)?.unwrap_or_default(),
        None => ClientConfig::default(),
    };
    if let Ok(cookie) = std::env::var("LORECHAT_SESSION") {
        config.session_cookie = Some(cookie);
    }

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let model = config
        .default_model
        .clone()
        .unwrap_or_else(|| "gpt-4o".to_string());

    let client = StreamClient::new(config.into_transport_options())?;
    let request = lorechat::StreamRequest::new(model, prompt);
    let mut handle = client.stream(request, Terminal)?;

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        _ = handle.join() => false,
    };

    if interrupted {
        handle.cancel();
        handle.join().await;
        eprintln!("\n(cancelled)");
    }

    Ok(())
}
