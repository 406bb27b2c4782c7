mod ledger;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ledger::{Order, OrderLedger, PlaceOptions};
use llm_event_producer::{
    metrics::{gather_text, init_producer_metrics},
    oneshot_callback,
    transport::{BrokerTarget, InMemoryBroker, StaticRouteTable},
    Destination, Message, Producer, ProducerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ORDERS_GROUP: &str = "orders-tx";

#[derive(Parser)]
#[command(name = "event-producer")]
#[command(about = "Message producer client demo", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "PRODUCER_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every send mode against an in-process broker
    Demo {
        /// Directory of the order ledger
        #[arg(short, long, default_value = "data/ledger")]
        data_dir: PathBuf,

        /// Messages per send mode
        #[arg(short = 'n', long, default_value = "3")]
        count: usize,

        /// Print metrics when done
        #[arg(short, long)]
        metrics: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = ProducerConfig::load(cli.config.as_deref()).context("invalid configuration")?;

    match cli.command {
        Commands::Demo {
            data_dir,
            count,
            metrics,
        } => {
            run_demo(config, data_dir, count).await?;
            if metrics {
                println!("{}", gather_text());
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "llm_event_producer=info,event_producer=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_demo(config: ProducerConfig, data_dir: PathBuf, count: usize) -> anyhow::Result<()> {
    init_producer_metrics();
    tracing::info!("Starting event producer demo v{}", env!("CARGO_PKG_VERSION"));

    let broker = Arc::new(InMemoryBroker::new());
    let routes = StaticRouteTable::new().with_default_brokers(vec![
        BrokerTarget::new("broker-a", "127.0.0.1:10911"),
        BrokerTarget::new("broker-b", "127.0.0.1:10921"),
    ]);
    let ledger = Arc::new(OrderLedger::open(&data_dir)?);

    let producer = Producer::builder(config)
        .transport(broker.clone())
        .routes(Arc::new(routes))
        .register_executor(ORDERS_GROUP, ledger.clone())?
        .build()?;

    let notifications = Destination::with_tag("notifications", "critical")?;
    for i in 0..count {
        let result = producer
            .send_sync(&notifications, &Message::new(format!("notification {}", i)))
            .await?;
        println!("sync     {} -> {} ({})", result.msg_id, result.broker, result.status);
    }

    let events = Destination::new("events")?;
    let mut pending = Vec::new();
    for i in 0..count {
        let (callback, rx) = oneshot_callback();
        producer.send_async(events.clone(), Message::new(format!("event {}", i)), callback);
        pending.push(rx);
    }
    for rx in pending {
        match rx.await? {
            Ok(result) => println!("async    {} -> {}", result.msg_id, result.broker),
            Err(e) => println!("async    failed: {}", e),
        }
    }

    let telemetry = Destination::new("telemetry")?;
    for i in 0..count {
        producer.send_one_way(telemetry.clone(), Message::new(format!("tick {}", i)));
    }

    let orders = Destination::new("orders")?;
    let placed = Order {
        order_id: format!("order-{}", uuid::Uuid::now_v7()),
        customer: "acme".to_string(),
        amount_cents: 12_500,
    };
    let failed = Order {
        order_id: format!("order-{}", uuid::Uuid::now_v7()),
        customer: "globex".to_string(),
        amount_cents: 990,
    };

    for (order, options) in [
        (&placed, PlaceOptions::default()),
        (&failed, PlaceOptions { fail: true }),
    ] {
        let message = Message::builder()
            .key(order.order_id.clone())
            .payload(serde_json::to_vec(order)?)
            .build();
        let outcome = producer
            .send_in_transaction(ORDERS_GROUP, &orders, &message, Some(&options))
            .await?;
        println!(
            "tx       {} local={} phase={}",
            outcome.transaction_id, outcome.local_state, outcome.phase
        );
    }

    let listener = producer.start_check_listener();
    let dispatched = broker.dispatch_checks(&listener.sender).await;
    drop(listener.sender);
    listener.handle.await?;
    println!("checks   {} dispatched", dispatched);

    for order in [&placed, &failed] {
        println!(
            "ledger   {} status={:?} broker={:?}",
            order.order_id,
            ledger.status(&order.order_id)?,
            broker.resolution(&order.order_id)
        );
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!(
        "visible  orders={} events={} telemetry={} notifications={}",
        broker.visible_messages("orders").len(),
        broker.visible_messages("events").len(),
        broker.visible_messages("telemetry").len(),
        broker.visible_messages("notifications").len()
    );

    producer.shutdown().await;
    Ok(())
}
