//! Load generator exercising backpressure and delivery policies.
//!
//! Spawns producer tasks that push messages through one broker into a set of
//! subscriber tasks, then reports throughput and the broker's counters.
//! Ctrl+C cancels the broker; producers still waiting on a full queue then
//! fail with "broker is closed" and are counted as rejected.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, ContentArrangement, Table, presets};
use console::style;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use parley_core::broker::{Broker, BrokerError, BrokerStatsSnapshot, envelope};

use crate::state::AppState;

/// Parameters of one flood run.
#[derive(Debug, Clone)]
pub struct FloodOptions {
    pub producers: usize,
    pub messages: usize,
    pub subscribers: usize,
    pub slow_ms: u64,
    pub broadcast_every: usize,
    pub endpoint_capacity: usize,
}

#[derive(Debug, Serialize)]
struct FloodReport {
    accepted: u64,
    rejected: u64,
    received: u64,
    elapsed_ms: u64,
    throughput_per_sec: f64,
    interrupted: bool,
    stats: BrokerStatsSnapshot,
}

/// Run a flood against a broker built from the loaded configuration.
pub async fn flood(state: &AppState, options: FloodOptions, json: bool) -> Result<()> {
    if options.subscribers == 0 {
        bail!("--subscribers must be at least 1");
    }

    let token = CancellationToken::new();
    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = crate::shutdown_signal() => {
                    tracing::info!("interrupt received, cancelling broker");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        })
    };

    let report = run_flood(&token, state, &options).await?;
    token.cancel();
    let _ = interrupt.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &options);
    }
    Ok(())
}

async fn run_flood(
    token: &CancellationToken,
    state: &AppState,
    options: &FloodOptions,
) -> Result<FloodReport> {
    let broker = Arc::new(Broker::with_config(token.clone(), &state.config));
    let routing = broker.spawn();

    let received = Arc::new(AtomicU64::new(0));
    let mut consumers = Vec::with_capacity(options.subscribers);
    for i in 0..options.subscribers {
        let mut rx = broker
            .subscribe(subscriber_id(i), options.endpoint_capacity)
            .await;
        let received = Arc::clone(&received);
        let delay = Duration::from_millis(options.slow_ms);
        consumers.push(tokio::spawn(async move {
            while rx.recv().await.is_some() {
                received.fetch_add(1, Ordering::Relaxed);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }));
    }

    let accepted = Arc::new(AtomicU64::new(0));
    let rejected = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    let producers: Vec<_> = (0..options.producers)
        .map(|p| {
            let broker = Arc::clone(&broker);
            let accepted = Arc::clone(&accepted);
            let rejected = Arc::clone(&rejected);
            let options = options.clone();
            tokio::spawn(async move {
                for n in 0..options.messages {
                    let sender = format!("producer-{p}");
                    let is_broadcast =
                        options.broadcast_every > 0 && n % options.broadcast_every == 0;
                    let message = if is_broadcast {
                        envelope::broadcast(sender, format!("#{n}"))
                    } else {
                        let target = subscriber_id((p + n) % options.subscribers);
                        envelope::unicast(sender, target, format!("#{n}"))
                    };
                    match broker.send_message(message).await {
                        Ok(()) => {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(BrokerError::Closed) => {
                            rejected.fetch_add((options.messages - n) as u64, Ordering::Relaxed);
                            break;
                        }
                        Err(other) => {
                            tracing::warn!(error = %other, "unexpected send failure");
                            rejected.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for producer in producers {
        producer.await.context("producer task panicked")?;
    }

    // Let the routing loop work through what was accepted before stopping.
    while broker.queued() > 0 && !token.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let interrupted = token.is_cancelled();

    broker.shutdown();
    routing.await.context("routing loop panicked")??;
    let elapsed = started.elapsed();

    for id in broker.subscriber_ids().await {
        broker.unregister_user(&id).await;
    }
    for consumer in consumers {
        consumer.await.context("subscriber task panicked")?;
    }

    let stats = broker.stats();
    let secs = elapsed.as_secs_f64();
    Ok(FloodReport {
        accepted: accepted.load(Ordering::Relaxed),
        rejected: rejected.load(Ordering::Relaxed),
        received: received.load(Ordering::Relaxed),
        elapsed_ms: elapsed.as_millis() as u64,
        throughput_per_sec: if secs > 0.0 {
            stats.delivered as f64 / secs
        } else {
            0.0
        },
        interrupted,
        stats,
    })
}

fn subscriber_id(index: usize) -> String {
    format!("user-{index}")
}

fn print_report(report: &FloodReport, options: &FloodOptions) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Metric", "Value"]);

    let stats = &report.stats;
    let rows: [(&str, String); 11] = [
        ("accepted", report.accepted.to_string()),
        ("rejected (closed)", report.rejected.to_string()),
        ("delivered", stats.delivered.to_string()),
        ("received by subscribers", report.received.to_string()),
        ("unroutable", stats.unroutable.to_string()),
        ("dropped (endpoint closed)", stats.dropped_closed.to_string()),
        ("dropped (endpoint full)", stats.dropped_slow.to_string()),
        ("abandoned at shutdown", stats.abandoned.to_string()),
        ("drained at shutdown", stats.drained.to_string()),
        ("elapsed", format!("{} ms", report.elapsed_ms)),
        ("deliveries / s", format!("{:.0}", report.throughput_per_sec)),
    ];
    for (metric, value) in rows {
        table.add_row(vec![Cell::new(metric), Cell::new(value)]);
    }

    println!();
    println!(
        "  {} {} producers x {} messages -> {} subscribers",
        style("⚡").bold(),
        options.producers,
        options.messages,
        options.subscribers
    );
    if report.interrupted {
        println!("  {}", style("Interrupted: broker cancelled early").yellow());
    }
    println!("{table}");
    println!();
}
