//! Streaming chat example.
//!
//! Sends one message and prints the reply as it streams in. Press Ctrl-C
//! to stop the reply early; the partial text is kept.
//!
//! Run with:
//! ```bash
//! OPENAI_API_KEY=your-key RUST_LOG=chatline_client=debug cargo run --example streaming_chat
//! ```

use chatline::prelude::*;
use chatline::HealthStatus;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env()?
        .with_system_prompt("You are a concise assistant.")
        .with_stream(true);
    let client = ChatClient::new(config)?;

    let health = client.health_check().await;
    if health.status != HealthStatus::Healthy {
        anyhow::bail!("API is not reachable: {:?}", health);
    }

    let session = Arc::new(ChatSession::new(client, Arc::new(InMemoryStore::new())));
    let conversation = session.create_conversation().await?;

    let stopper = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.cancel_streaming();
        }
    });

    let print = |_: &str, delta: &str, _: &str| {
        print!("{delta}");
        let _ = io::stdout().flush();
    };

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Explain server-sent events in three sentences.".to_string());
    let outcome = session
        .send_message(&conversation.id, &prompt, vec![], &print)
        .await?;

    println!();
    if outcome.stopped_by_user {
        println!("(stopped)");
    }
    println!(
        "tokens: {}, rate limit: {} requests left",
        outcome.message.tokens.unwrap_or_default(),
        session.client().rate_limit_snapshot().remaining_requests
    );

    Ok(())
}
