use tokio::io::{AsyncBufReadExt, BufReader};

use order_relay::commands::{self, SubmitRequest};
use order_relay::{init_logging, OrderQueue, RelayConfig};

/// One line of input: either an order form or a connectivity change
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum InputLine {
    Online { online: bool },
    Order(SubmitRequest),
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::error!(error = %e, "Failed to serialize response"),
    }
}

fn handle_line(queue: &OrderQueue, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<InputLine>(line) {
        Ok(InputLine::Online { online }) => {
            commands::set_online(queue, online);
        }
        Ok(InputLine::Order(request)) => {
            print_json(&commands::submit_order(queue, &request));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed input line");
            return;
        }
    }
    print_json(&commands::get_queue_status(queue));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, warnings) = RelayConfig::from_env_deferred();
    let _guard = init_logging(&config.log_dir)?;
    for warning in &warnings {
        warning.log();
    }

    tracing::info!("Order relay starting up");

    let queue = OrderQueue::new_production(&config)?;
    let restored = queue.queue_length();
    if restored > 0 {
        tracing::warn!(count = restored, "Resuming delivery of orders from previous session");
    }
    queue.start();
    commands::page_viewed(&queue, "order-relay");
    print_json(&commands::get_queue_status(&queue));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&queue, &line),
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read input");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    queue.shutdown().await;
    let status = queue.status();
    if status.queue_length > 0 || status.has_permanent_errors {
        tracing::warn!(
            pending = status.queue_length,
            failed = queue.failed_entries().len(),
            "Exiting with undelivered orders, they are kept for the next run"
        );
    }
    tracing::info!("Order relay stopped");
    Ok(())
}
