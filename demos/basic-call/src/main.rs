//! Demo CLI driving `cm-client`'s command surface against a live CM
//! WebSocket endpoint — exactly the "CLI wrapper" spec.md §1 lists as out of
//! scope for the core itself.

mod handler;
mod transport;

use clap::{Parser, Subcommand};
use cm_client::{Client, ClientConfig, DialParams, MULTI_APPID};
use tokio_util::sync::CancellationToken;
use tracing::info;

use handler::{AutoAccept, DemoHandler};
use transport::WsTransport;

#[derive(Parser)]
#[command(name = "basic-call", about = "Demo CM WebSocket call-control client")]
struct Cli {
    /// CM WebSocket URL, e.g. wss://cm.example.com/v1/ws/events.
    #[arg(long, env = "CM_WS_URL")]
    ws_url: String,
    /// Bearer auth token presented in the registration frame.
    #[arg(long, env = "CM_AUTH_TOKEN")]
    auth_token: String,
    /// Stable identifier for this client.
    #[arg(long, env = "CM_CLIENT_ID")]
    client_id: String,
    /// Application id, or the literal "MULTI" for multi-tenant mode.
    #[arg(long, env = "CM_APPID")]
    appid: String,
    /// DIDs to subscribe to at handshake.
    #[arg(long, env = "CM_SUBSCRIBE_NUMBERS", value_delimiter = ',')]
    subscribe_numbers: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dial out and follow the call until hangup.
    Dial {
        #[arg(long, env = "CM_REGION")]
        region: Option<String>,
        #[arg(long, env = "CM_CALLER_NUMBER")]
        from: String,
        #[arg(long, env = "CM_TARGET_NUMBER")]
        to: String,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        uid: String,
        #[arg(long)]
        token: String,
    },
    /// Listen on the subscribed DIDs and auto-accept inbound calls.
    Listen {
        #[arg(long)]
        channel: String,
        #[arg(long)]
        uid: String,
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::new(&cli.ws_url, &cli.auth_token, &cli.client_id, &cli.appid)
        .with_subscribe_numbers(cli.subscribe_numbers.clone());
    let transport = WsTransport::new(&cli.ws_url);

    let auto_accept = match &cli.command {
        Command::Listen { channel, uid, token } => {
            Some(AutoAccept { channel: channel.clone(), uid: uid.clone(), token: token.clone() })
        }
        Command::Dial { .. } => None,
    };
    let handler = DemoHandler::new(auto_accept);

    let client = Client::connect(config, transport, handler).await?;
    client.handler().bind(&client);

    if cli.appid == MULTI_APPID {
        info!("running in MULTI-tenant mode; every command will carry an explicit appid");
    }

    match cli.command {
        Command::Dial { region, from, to, channel, uid, token } => {
            let params = DialParams {
                from,
                to,
                channel,
                uid,
                token,
                region,
                appid: Some(cli.appid.clone()),
            };
            let result = client.dial(params, &CancellationToken::new()).await?;
            info!(success = result.success, call_id = ?result.call_id, "dial result");
            if !result.success {
                client.close().await;
                return Ok(());
            }
        }
        Command::Listen { .. } => {
            info!(numbers = ?cli.subscribe_numbers, "listening for inbound calls");
        }
    }

    tokio::select! {
        _ = client.handler().done.cancelled() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, closing");
        }
    }

    client.close().await;
    Ok(())
}
