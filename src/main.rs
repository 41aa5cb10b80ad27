//! CLI for livefeed
//!
//! Subcommands:
//! - `server`: run the comment feed server
//! - `watch`: connect to a feed and print every snapshot (useful for smoke tests)
//! - `issue-token`: mint a subscriber token signed with the configured secret

use clap::Parser;
use livefeed::auth::JwtAuthenticator;
use livefeed::config::load_config;
use livefeed::context::AppContext;
use livefeed::transport::start_websocket_server;
use livefeed::utils::logging;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "livefeed")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Watch one template's comment feed
    Watch {
        /// Server URL (default: ws://127.0.0.1:8080)
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        #[arg(long)]
        template_id: i64,
        /// Optional subscriber token
        #[arg(long)]
        token: Option<String>,
    },
    /// Print a signed subscriber token
    IssueToken {
        #[arg(long)]
        sub: String,
        #[arg(long)]
        admin: bool,
        /// Validity in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cmd = Command::parse();

    let result = match cmd {
        Command::Server => run_server().await,
        Command::Watch {
            url,
            template_id,
            token,
        } => {
            logging::init("info");
            run_watch(&url, template_id, token.as_deref()).await
        }
        Command::IssueToken { sub, admin, hours } => issue_token(&sub, admin, hours),
    };

    if let Err(e) = result {
        error!("livefeed failed: {}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init(&config.log.level);

    let addr = config.bind_addr();
    let ctx = Arc::new(AppContext::from_settings(config)?);
    ctx.start();

    tokio::select! {
        res = start_websocket_server(&addr, ctx.clone()) => {
            if let Err(e) = res {
                error!("WebSocket server exited: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    ctx.shutdown().await;
    Ok(())
}

async fn run_watch(
    url: &str,
    template_id: i64,
    token: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::StreamExt;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let mut endpoint = url::Url::parse(url)?.join("/comments")?;
    endpoint
        .query_pairs_mut()
        .append_pair("templateId", &template_id.to_string());
    if let Some(token) = token {
        endpoint.query_pairs_mut().append_pair("token", token);
    }

    let (mut ws_stream, _response) = connect_async(endpoint.as_str()).await?;
    info!("Watching template {} on {}", template_id, url);

    while let Some(msg) = ws_stream.next().await {
        match msg? {
            WsMessage::Text(text) => println!("{text}"),
            WsMessage::Close(frame) => {
                if let Some(frame) = frame {
                    println!("closed: {} {}", u16::from(frame.code), frame.reason);
                }
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

fn issue_token(sub: &str, admin: bool, hours: i64) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let token = JwtAuthenticator::new(&config.server.jwt_secret).issue(
        sub,
        admin,
        chrono::Duration::hours(hours),
    )?;
    println!("{token}");
    Ok(())
}
