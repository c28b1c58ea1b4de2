//! Scripted conversation showing broadcast, unicast and silent-drop routing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parley_core::broker::{Broker, envelope};
use parley_types::message::Message;

use crate::state::AppState;

/// How long a subscriber waits for more deliveries before the demo moves on.
const SETTLE: Duration = Duration::from_millis(200);

#[derive(Serialize)]
struct Delivery<'a> {
    subscriber: &'a str,
    message: &'a Message,
}

/// Run the alice/bob/carol scenario on a fresh broker.
pub async fn demo(state: &AppState, json: bool) -> Result<()> {
    let token = CancellationToken::new();
    let broker = Arc::new(Broker::with_config(token.clone(), &state.config));
    let routing = broker.spawn();

    let mut alice = broker.subscribe("alice", 16).await;
    let mut bob = broker.subscribe("bob", 16).await;

    let script = [
        envelope::broadcast("system", "hi"),
        envelope::unicast("bob", "alice", "psst"),
        envelope::unicast("alice", "carol", "anyone home?"),
        envelope::unicast("alice", "bob", "see you at noon"),
    ];
    for message in script {
        if !json {
            println!("  {} {}", style("→").dim(), describe(&message));
        }
        broker
            .send_message(message)
            .await
            .context("broker rejected message")?;
    }

    let alice_got = collect(&mut alice).await;
    let bob_got = collect(&mut bob).await;

    broker.shutdown();
    routing.await.context("routing loop panicked")??;
    let stats = broker.stats();

    if json {
        for (subscriber, messages) in [("alice", &alice_got), ("bob", &bob_got)] {
            for message in messages {
                let line = serde_json::to_string(&Delivery { subscriber, message })?;
                println!("{line}");
            }
        }
        println!("{}", serde_json::to_string(&stats)?);
        return Ok(());
    }

    println!();
    for (subscriber, messages) in [("alice", &alice_got), ("bob", &bob_got)] {
        println!("  {}", style(subscriber).cyan().bold());
        if messages.is_empty() {
            println!("    {}", style("(nothing)").dim());
        }
        for message in messages {
            println!("    {} {}", style("←").green(), describe(message));
        }
    }
    println!();
    println!(
        "  {} delivered, {} unroutable (carol was never registered)",
        style(stats.delivered).bold(),
        style(stats.unroutable).yellow()
    );
    println!();

    Ok(())
}

async fn collect(rx: &mut mpsc::Receiver<Message>) -> Vec<Message> {
    let mut received = Vec::new();
    while let Ok(Some(message)) = tokio::time::timeout(SETTLE, rx.recv()).await {
        received.push(message);
    }
    received
}

fn describe(message: &Message) -> String {
    match message.target() {
        Some(recipient) => format!(
            "{} to {}: {}",
            message.sender, recipient, message.content
        ),
        None => format!("{} to everyone: {}", message.sender, message.content),
    }
}
