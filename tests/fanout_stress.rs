//! Concurrency stress test for the broadcast hub.
//!
//! 50 connections each send 100 messages concurrently; every connection must
//! receive exactly the 4 900 messages sent by the others and none of its own,
//! with the default queue capacity.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use tokio::time::timeout;
use ws_relay::transport::channel;
use ws_relay::{BroadcastHub, Message, RelayConfig};

const CONNECTIONS: usize = 50;
const MESSAGES_PER_CONNECTION: usize = 100;
const EXPECTED_PER_CONNECTION: usize = MESSAGES_PER_CONNECTION * (CONNECTIONS - 1);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fifty_connections_hundred_messages_each() -> Result<()> {
    // Shipped defaults: each queue holds far fewer than 4 900 messages.
    let config = RelayConfig::local();
    ensure!(config.outbound_capacity < EXPECTED_PER_CONNECTION);
    let hub = Arc::new(BroadcastHub::new(&config));

    let mut clients = Vec::with_capacity(CONNECTIONS);
    let mut loops = Vec::with_capacity(CONNECTIONS);
    let mut close_counters = Vec::with_capacity(CONNECTIONS);

    for _ in 0..CONNECTIONS {
        let (client, sink, source) = channel::pair();
        close_counters.push(client.close_counter());
        let (_id, task) = hub.spawn(None, sink, source);
        clients.push(client);
        loops.push(task);
    }
    ensure!(hub.connection_count() == CONNECTIONS);

    let workers: Vec<_> = clients
        .into_iter()
        .enumerate()
        .map(|(index, mut client)| {
            tokio::spawn(async move {
                for seq in 0..MESSAGES_PER_CONNECTION {
                    client.send(Message::text(format!("{index}:{seq}")))?;
                }

                let mut seen = HashSet::with_capacity(EXPECTED_PER_CONNECTION);
                while seen.len() < EXPECTED_PER_CONNECTION {
                    let message = client.recv().await.context("relay closed early")?;
                    let text = message.as_text().context("text payload")?.to_string();
                    let sender: usize = text
                        .split(':')
                        .next()
                        .and_then(|s| s.parse().ok())
                        .context("sender prefix")?;
                    ensure!(sender != index, "connection {index} received its own message");
                    ensure!(seen.insert(text.clone()), "duplicate delivery of {text}");
                }

                // Every peer has finished sending by now; leave cleanly.
                client.disconnect();
                anyhow::Ok(seen.len())
            })
        })
        .collect();

    for worker in workers {
        let received = timeout(Duration::from_secs(30), worker)
            .await
            .context("worker timed out")???;
        ensure!(received == EXPECTED_PER_CONNECTION);
    }

    for task in loops {
        timeout(Duration::from_secs(5), task)
            .await
            .context("receive loop leaked")??;
    }

    ensure!(hub.registry().is_empty());
    for counter in close_counters {
        ensure!(counter.load(Ordering::SeqCst) == 1, "transport not closed exactly once");
    }

    let stats = hub.stats();
    ensure!(stats.received == (CONNECTIONS * MESSAGES_PER_CONNECTION) as u64);
    ensure!(stats.dispatched == (CONNECTIONS * EXPECTED_PER_CONNECTION) as u64);
    ensure!(stats.dropped == 0, "fan-out dropped {} messages", stats.dropped);
    ensure!(stats.evicted == 0);

    Ok(())
}
