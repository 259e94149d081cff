mod init;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stride_core::{OrderRequest, Phase, TurnRequest, TurnResult};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stride",
    version,
    about = "Conversational product discovery and ordering over a catalog store"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "stride.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single turn and print the reply.
    Ask {
        message: String,
        /// 1 = direct, 2 = mediated, 3 = agentic.
        #[arg(long, default_value_t = 3)]
        phase: u8,
        /// Print the activity trace as it streams.
        #[arg(long)]
        trace: bool,
        #[arg(long)]
        customer: Option<String>,
        /// Image file for visual search (phase 3).
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Interactive chat loop on stdin.
    Chat {
        #[arg(long, default_value_t = 3)]
        phase: u8,
        #[arg(long)]
        trace: bool,
    },
    /// Place an order directly.
    Order {
        #[arg(long)]
        product_id: String,
        #[arg(long)]
        size: Option<String>,
        #[arg(long, default_value_t = 1)]
        quantity: i32,
        #[arg(long, default_value_t = 1)]
        phase: u8,
        #[arg(long)]
        customer: Option<String>,
    },
    /// Apply the catalog schema to the configured database.
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stride=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = stride_core::Config::load(&cli.config)?;

    match cli.command {
        Command::Ask {
            message,
            phase,
            trace,
            customer,
            image,
        } => {
            let orchestrator = init::build_orchestrator(config).await?;
            let image_base64 = match image {
                Some(path) => Some(init::read_image_base64(&path)?),
                None => None,
            };
            let request = TurnRequest {
                phase: parse_phase(phase)?,
                message: Some(message),
                image_base64,
                customer_id: customer,
                conversation_id: None,
            };
            let result = run_turn(&orchestrator, request, trace).await;
            print_result(&result);
        }
        Command::Chat { phase, trace } => {
            let orchestrator = init::build_orchestrator(config).await?;
            let phase = parse_phase(phase)?;
            chat_loop(&orchestrator, phase, trace).await?;
        }
        Command::Order {
            product_id,
            size,
            quantity,
            phase,
            customer,
        } => {
            let orchestrator = init::build_orchestrator(config).await?;
            let result = orchestrator
                .place_order(OrderRequest {
                    product_id,
                    size,
                    quantity,
                    phase: parse_phase(phase)?,
                    customer_id: customer,
                })
                .await;
            print_result(&result);
        }
        Command::InitDb => {
            init::init_db(&config).await?;
            println!("schema applied to {}", config.database.url);
        }
    }

    Ok(())
}

fn parse_phase(phase: u8) -> anyhow::Result<Phase> {
    Phase::try_from(phase).map_err(|e| anyhow::anyhow!(e))
}

async fn run_turn(
    orchestrator: &init::AppOrchestrator,
    request: TurnRequest,
    trace: bool,
) -> TurnResult {
    if !trace {
        return orchestrator.handle_turn(request).await;
    }

    let (tx, mut rx) = stride_trace::activity_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("  [{:>4}] {:<10} {}", event.id, event.kind.as_str(), event.title);
        }
    });
    let result = orchestrator.handle_turn_streaming(request, Some(tx)).await;
    let _ = printer.await;
    result
}

async fn chat_loop(
    orchestrator: &init::AppOrchestrator,
    phase: Phase,
    trace: bool,
) -> anyhow::Result<()> {
    use std::io::Write as _;
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("stride chat (phase {}). Type 'exit' to quit.", phase.number());

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "exit" || message == "quit" {
            break;
        }

        let request = TurnRequest {
            phase,
            message: Some(message.to_string()),
            image_base64: None,
            customer_id: None,
            conversation_id: None,
        };
        let result = run_turn(orchestrator, request, trace).await;
        print_result(&result);
    }

    Ok(())
}

fn print_result(result: &TurnResult) {
    println!("{}", result.reply_text);

    if let Some(products) = &result.products {
        for hit in products {
            let similarity = hit
                .similarity
                .map(|s| format!("  ({:.0}% match)", s * 100.0))
                .unwrap_or_default();
            println!(
                "  {}  {} by {}  ${}{}",
                hit.product.product_id,
                hit.product.name,
                hit.product.brand,
                hit.product.price,
                similarity
            );
        }
    }

    if let Some(order) = &result.order {
        println!(
            "  order {}: subtotal ${} + tax ${} + shipping ${} = ${}",
            order.order_id, order.subtotal, order.tax, order.shipping, order.total
        );
    }

    if !result.follow_up_suggestions.is_empty() {
        println!("  try: {}", result.follow_up_suggestions.join(" | "));
    }
}
