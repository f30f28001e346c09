use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "portmux-cli")]
#[command(about = "Management CLI for portmux", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9900", env = "PORTMUX_ADMIN_URL")]
    url: String,

    #[arg(short, long, env = "PORTMUX_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show proxy status and listener states
    Status,
    /// List every port with its groups
    Ports,
    /// Register a port (started on the next reconcile)
    AddPort { port: u16 },
    /// Unregister a port (drained on the next reconcile)
    RemovePort { port: u16 },
    /// Add a group to a port
    AddGroup {
        port: u16,
        path: String,
        /// Backend URLs, in order
        #[arg(short, long = "backend")]
        backends: Vec<String>,
        #[arg(long)]
        alias: Option<String>,
        #[arg(long)]
        health_check_path: Option<String>,
    },
    /// Remove a group from a port
    RemoveGroup { port: u16, path: String },
    /// Replace a group's backend list
    SetBackends {
        port: u16,
        path: String,
        /// Backend URLs, in order
        urls: Vec<String>,
    },
    /// Health-check a backend, then make it active
    Activate { port: u16, path: String, index: usize },
    /// Clear a group's active backend
    Deactivate { port: u16, path: String },
    /// Activate the first healthy backend of a group
    Select { port: u16, path: String },
    /// Probe every backend of a group
    CheckGroup { port: u16, path: String },
    /// Probe one URL
    Check {
        url: String,
        /// Require a 200 from this path
        #[arg(long)]
        path: Option<String>,
    },
    /// Start and stop listeners to match the registered ports
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path, body) = match cli.command {
        Commands::Status => (Method::GET, "/admin/status".to_string(), None),
        Commands::Ports => (Method::GET, "/admin/ports".to_string(), None),
        Commands::AddPort { port } => (Method::POST, format!("/admin/ports/{port}"), None),
        Commands::RemovePort { port } => (Method::DELETE, format!("/admin/ports/{port}"), None),
        Commands::AddGroup {
            port,
            path,
            backends,
            alias,
            health_check_path,
        } => (
            Method::POST,
            format!("/admin/ports/{port}/groups"),
            Some(json!({
                "path": path,
                "alias": alias,
                "backends": backend_list(&backends),
                "health_check_path": health_check_path,
            })),
        ),
        Commands::RemoveGroup { port, path } => (
            Method::DELETE,
            format!("/admin/ports/{port}/groups?path={}", encode(&path)),
            None,
        ),
        Commands::SetBackends { port, path, urls } => (
            Method::PUT,
            format!("/admin/ports/{port}/backends?path={}", encode(&path)),
            Some(backend_list(&urls)),
        ),
        Commands::Activate { port, path, index } => (
            Method::POST,
            format!("/admin/ports/{port}/activate?path={}&index={index}", encode(&path)),
            None,
        ),
        Commands::Deactivate { port, path } => (
            Method::POST,
            format!("/admin/ports/{port}/deactivate?path={}", encode(&path)),
            None,
        ),
        Commands::Select { port, path } => (
            Method::POST,
            format!("/admin/ports/{port}/select?path={}", encode(&path)),
            None,
        ),
        Commands::CheckGroup { port, path } => (
            Method::GET,
            format!("/admin/ports/{port}/check?path={}", encode(&path)),
            None,
        ),
        Commands::Check { url, path } => (
            Method::POST,
            "/admin/check".to_string(),
            Some(json!({ "url": url, "health_check_path": path })),
        ),
        Commands::Reconcile => (Method::POST, "/admin/reconcile".to_string(), None),
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }
    print_response(request.send().await?).await
}

fn backend_list(urls: &[String]) -> Value {
    Value::Array(urls.iter().map(|url| json!({ "url": url })).collect())
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
