use alloy::primitives::{Address, U256};
use eyre::Result;
use futures::StreamExt;
use tracing::{error, info};

use rpc_poller::client::Client;
use rpc_poller::config::Config;
use rpc_poller::logging;
use rpc_poller::poll::{self, PollHandle, Poller, Publisher, Target};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init(config.log_json);

    let client = Client::new(&config.rpc_url)?;
    info!(
        rpc_url = %config.rpc_url,
        interval = ?config.poll_interval,
        "watching chain head"
    );

    let heads = Poller::new(
        |publisher: Publisher<u64>| {
            Target::new(client.block_number(), move |n| publisher.publish(n))
        },
        config.poll_interval,
    );
    let (publisher, channel) = poll::channel::<u64>(config.channel_size);
    let mut sessions = vec![("block_number", heads.start(publisher))];

    if let Some(address) = config.watch_address {
        let balances = Poller::new(
            |address: Address| {
                Target::new(client.balance(address), move |wei: U256| {
                    info!(%address, balance = %wei, "balance")
                })
            },
            config.poll_interval,
        );
        sessions.push(("balance", balances.start(address)));
    }

    // consume stream
    let mut stream = channel.into_stream();
    let mut last = None;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            head = stream.next() => match head {
                Some(n) if last != Some(n) => {
                    info!(block = n, "new head");
                    last = Some(n);
                }
                Some(_) => {}
                // Every publisher is gone: the block number session ended.
                None => break,
            },
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    shutdown_sessions(sessions).await;
    Ok(())
}

async fn shutdown_sessions(sessions: Vec<(&'static str, PollHandle)>) {
    for (name, handle) in sessions {
        handle.stop();
        match handle.join().await {
            Ok(exit) => info!(session = name, ?exit, "poll session ended"),
            Err(err) => error!(session = name, error = %err, "poll session failed"),
        }
    }
}
