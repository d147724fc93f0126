use clap::{Args, Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "upstream-cli")]
#[command(about = "Management CLI for dynamic upstream pools", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Bearer key, if the server requires one.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Upstream name
    upstream: String,

    /// Target a stream upstream instead of an http one
    #[arg(long)]
    stream: bool,
}

#[derive(Args, Default)]
struct PeerFields {
    #[arg(long)]
    weight: Option<u32>,
    #[arg(long)]
    max_fails: Option<u32>,
    /// Seconds
    #[arg(long)]
    fail_timeout: Option<u32>,
    #[arg(long)]
    max_conns: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check process status
    Status,
    /// Summarise every upstream
    Upstreams,
    /// List the peers of an upstream
    List {
        #[command(flatten)]
        target: Target,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Add a server
    Add {
        #[command(flatten)]
        target: Target,
        server: String,
        #[arg(long)]
        backup: bool,
        #[arg(long)]
        down: bool,
        #[command(flatten)]
        fields: PeerFields,
    },
    /// Remove a server (and optionally one endpoint of it)
    Remove {
        #[command(flatten)]
        target: Target,
        server: String,
        #[arg(long)]
        peer: Option<String>,
    },
    /// Change attributes of a server
    Update {
        #[command(flatten)]
        target: Target,
        server: String,
        #[arg(long)]
        peer: Option<String>,
        #[arg(long, conflicts_with = "down")]
        up: bool,
        #[arg(long)]
        down: bool,
        #[command(flatten)]
        fields: PeerFields,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/status", cli.url)).headers(headers).send().await?;
            print_json(res).await?;
        }
        Commands::Upstreams => {
            let res = client.get(format!("{}/upstreams", cli.url)).headers(headers).send().await?;
            print_json(res).await?;
        }
        command => {
            let query = dynamic_query(command);
            let res = client
                .get(format!("{}/dynamic", cli.url))
                .headers(headers)
                .query(&query)
                .send()
                .await?;
            print_text(res).await?;
        }
    }

    Ok(())
}

/// Translate a pool command into `/dynamic` query pairs. Flags carry an
/// empty value.
fn dynamic_query(command: Commands) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    let flag = |query: &mut Vec<(&'static str, String)>, name: &'static str, on: bool| {
        if on {
            query.push((name, String::new()));
        }
    };

    let (target, fields) = match command {
        Commands::List { target, verbose } => {
            flag(&mut query, "verbose", verbose);
            (target, PeerFields::default())
        }
        Commands::Add { target, server, backup, down, fields } => {
            flag(&mut query, "add", true);
            query.push(("server", server));
            flag(&mut query, "backup", backup);
            flag(&mut query, "down", down);
            (target, fields)
        }
        Commands::Remove { target, server, peer } => {
            flag(&mut query, "remove", true);
            query.push(("server", server));
            if let Some(peer) = peer {
                query.push(("peer", peer));
            }
            (target, PeerFields::default())
        }
        Commands::Update { target, server, peer, up, down, fields } => {
            query.push(("server", server));
            if let Some(peer) = peer {
                query.push(("peer", peer));
            }
            flag(&mut query, "up", up);
            flag(&mut query, "down", down);
            (target, fields)
        }
        Commands::Status | Commands::Upstreams => return query,
    };

    query.push(("upstream", target.upstream));
    flag(&mut query, "stream", target.stream);
    for (name, value) in [
        ("weight", fields.weight),
        ("max_fails", fields.max_fails),
        ("fail_timeout", fields.fail_timeout),
        ("max_conns", fields.max_conns),
    ] {
        if let Some(value) = value {
            query.push((name, value.to_string()));
        }
    }
    query
}

async fn print_text(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let body = res.text().await?;
    if status == reqwest::StatusCode::NOT_MODIFIED {
        println!("Not modified");
    } else if status.is_success() {
        print!("{}", body);
    } else {
        eprintln!("Error: server returned status {}", status);
        eprintln!("Response: {}", body);
    }
    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
