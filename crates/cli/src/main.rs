use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cli::{MetricArg, parse_embedding_map, parse_vector, relation};
use console::style;
use core_types::{EntityKey, InferenceRequest};
use ipc::{RequestKind, Response, ResponseBody, TcpClient};

/// Debug / scripting CLI for the embserve protocol.
#[derive(Parser, Debug)]
#[command(name = "embserve-cli", version = cli::VERSION, about = "embserve debug/diagnostic client")]
struct Cli {
    /// Service address.
    #[arg(long, env = "EMBSERVE_ADDR", default_value = "127.0.0.1:7878", global = true)]
    addr: String,

    /// Per-attempt timeout in milliseconds.
    #[arg(long, default_value_t = 2000, global = true)]
    timeout_ms: u64,

    /// Print the raw response as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch concatenated embeddings for one or more curies.
    Embedding {
        #[arg(required = true)]
        curies: Vec<String>,
    },
    /// Nearest stored entities to a curie.
    Neighbors {
        curie: String,
        #[arg(short, long)]
        threshold: Option<f64>,
        /// 0 means the service default.
        #[arg(short, long)]
        limit: Option<u32>,
        #[arg(short, long, value_enum, default_value_t = MetricArg::Euclidean)]
        metric: MetricArg,
    },
    /// Nearest stored entities to a raw embedding.
    Curies {
        /// JSON array or comma-separated numbers.
        #[arg(short, long)]
        embedding: String,
        #[arg(short, long)]
        threshold: Option<f64>,
        #[arg(short, long)]
        limit: Option<u32>,
        #[arg(short, long, value_enum, default_value_t = MetricArg::Euclidean)]
        metric: MetricArg,
    },
    /// Euclidean distance between two stored entities.
    Distance { a: String, b: String },
    /// Euclidean distance from a stored entity to a raw embedding.
    DistanceFrom {
        curie: String,
        #[arg(short, long)]
        embedding: String,
    },
    /// Predict the embedding reached through a relation.
    Predict {
        /// Source curies (looked up in the store).
        curies: Vec<String>,
        /// Inline sources as a JSON object `{"curie": [..]}`.
        #[arg(long, conflicts_with = "curies")]
        embeddings: Option<String>,
        #[arg(short, long)]
        predicate: String,
        #[arg(long)]
        object_aspect: Option<String>,
        #[arg(long)]
        object_direction: Option<String>,
        #[arg(long)]
        subject_aspect: Option<String>,
        #[arg(long)]
        subject_direction: Option<String>,
    },
    /// Request service status.
    Status {},
    /// Dump the service counters in Prometheus text format.
    Metrics {},
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let kind = build_request(cli.command)?;
    let client = TcpClient::new(cli.addr.clone())
        .with_request_timeout(Duration::from_millis(cli.timeout_ms));

    let resp = client
        .send(kind)
        .await
        .with_context(|| format!("request to {} failed", cli.addr))?;
    print_response(&resp, cli.json)
}

fn build_request(command: Commands) -> Result<RequestKind> {
    Ok(match command {
        Commands::Embedding { curies } => RequestKind::GetEmbedding {
            curies: curies.into_iter().map(EntityKey::from).collect(),
        },
        Commands::Neighbors {
            curie,
            threshold,
            limit,
            metric,
        } => RequestKind::FindNeighbors {
            curie: curie.into(),
            distance_threshold: threshold,
            curie_limit: limit,
            metric: metric.into(),
        },
        Commands::Curies {
            embedding,
            threshold,
            limit,
            metric,
        } => RequestKind::FindCuries {
            embedding: parse_vector(&embedding)?,
            distance_threshold: threshold,
            curie_limit: limit,
            metric: metric.into(),
        },
        Commands::Distance { a, b } => RequestKind::DistanceBetween {
            a: a.into(),
            b: b.into(),
        },
        Commands::DistanceFrom { curie, embedding } => RequestKind::DistanceFrom {
            curie: curie.into(),
            embedding: parse_vector(&embedding)?,
        },
        Commands::Predict {
            curies,
            embeddings,
            predicate,
            object_aspect,
            object_direction,
            subject_aspect,
            subject_direction,
        } => {
            let source = match embeddings {
                Some(raw) => InferenceRequest::ByEmbeddings(parse_embedding_map(&raw)?),
                None if curies.is_empty() => bail!("give source curies or --embeddings"),
                None => InferenceRequest::ByKeys(curies.into_iter().map(EntityKey::from).collect()),
            };
            RequestKind::PredictNode {
                source,
                relation: Some(relation(
                    &predicate,
                    object_aspect,
                    object_direction,
                    subject_aspect,
                    subject_direction,
                )),
            }
        }
        Commands::Status {} => RequestKind::Status,
        Commands::Metrics {} => RequestKind::Metrics,
    })
}

fn print_response(resp: &Response, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(resp)?);
        return Ok(());
    }
    for line in &resp.logs {
        eprintln!("{} {line}", style("log:").yellow());
    }
    if resp.is_empty() {
        println!("{}", style("(empty result)").dim());
    } else if let ResponseBody::Metrics(text) = &resp.body {
        print!("{text}");
    } else {
        println!("{}", serde_json::to_string_pretty(&resp.body)?);
    }
    eprintln!(
        "{}",
        style(format!(
            "took {} ms, served by {}",
            resp.took_ms,
            resp.served_by.as_deref().unwrap_or("unknown")
        ))
        .cyan()
    );
    Ok(())
}
