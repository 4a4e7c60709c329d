//! plumb node entry point.
//!
//! Usage:
//!   plumb serve [--listen=ADDR] [--node=NAME]   # Host pipes for the cluster
//!   plumb attach <node|addr> <pipe>             # Bridge stdin/stdout to a pipe
//!   plumb help [command]                        # Command reference

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use plumb_client::{PipeAccess, RemoteClient};
use plumb_kernel::{CommandRegistry, PlumbConfig, Registry, RemoteServer, TcpTransport, TracingLogSink};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None | Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!(
                "plumb {} ({} {})",
                env!("CARGO_PKG_VERSION"),
                env!("PLUMB_GIT_HASH"),
                env!("PLUMB_BUILD_DATE")
            );
            Ok(ExitCode::SUCCESS)
        }

        Some("serve") => run_serve(&args[2..]),

        Some("attach") => run_attach(&args[2..]),

        Some("help") => run_help(args.get(2).map(String::as_str)),

        Some(unknown) => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run 'plumb --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"plumb v{}

Usage:
  plumb serve [OPTIONS]        Host pipes and accept remote attachments
  plumb attach <node> <pipe>   Send stdin lines to a pipe, print its messages
  plumb help [command]         Show help for plumb, pipe or clear

Options:
  -h, --help                   Show this help
  -V, --version                Show version

Serve Options:
  --listen=<addr>              Listen address (default: from config, 127.0.0.1:9331)
  --node=<name>                Node name (default: from config, "local")
  --config=<path>              Config file (default: ~/.config/plumb/node.toml)

<node> is a peer name from the config's [peers] table or a host:port.
Bare pipe names are qualified into the configured namespace ("default").

Examples:
  plumb serve --listen=0.0.0.0:9331
  plumb attach 10.0.0.2:9331 foo
  tail -f app.log | plumb attach 127.0.0.1:9331 lab//logs
"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn run_help(command: Option<&str>) -> Result<ExitCode> {
    let registry = CommandRegistry::with_builtins();

    let Some(name) = command else {
        for schema in registry.schemas() {
            println!("{:<8}{}", schema.name, schema.help_short);
        }
        return Ok(ExitCode::SUCCESS);
    };

    match registry.help(name) {
        Some(help) => {
            print!("{help}");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("No such command: {name}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_serve(args: &[String]) -> Result<ExitCode> {
    let mut listen: Option<String> = None;
    let mut node: Option<String> = None;
    let mut config_path: Option<PathBuf> = None;

    for arg in args {
        if let Some(addr) = arg.strip_prefix("--listen=") {
            listen = Some(addr.to_string());
        } else if let Some(name) = arg.strip_prefix("--node=") {
            node = Some(name.to_string());
        } else if let Some(path) = arg.strip_prefix("--config=") {
            config_path = Some(PathBuf::from(path));
        } else if arg == "--help" || arg == "-h" {
            println!("plumb serve - Host pipes and accept remote attachments\n");
            println!("Options:");
            println!("  --listen=<addr>  Listen address");
            println!("  --node=<name>    Node name");
            println!("  --config=<path>  Config file");
            return Ok(ExitCode::SUCCESS);
        } else {
            eprintln!("Unknown serve option: {arg}");
            return Ok(ExitCode::FAILURE);
        }
    }

    let mut config = match config_path {
        Some(path) => PlumbConfig::load_from(&path)?,
        None => PlumbConfig::load()?,
    };
    if let Some(listen) = listen {
        config.listen = listen;
    }
    if let Some(node) = node {
        config.node = node;
    }

    let registry = Registry::with_settings(config.settings(), Arc::new(TracingLogSink));
    let server = RemoteServer::new(registry.clone());

    let rt = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    rt.block_on(async {
        tracing::info!(
            node = %config.node,
            namespace = %config.namespace,
            peers = config.peers.len(),
            "plumb node starting"
        );

        tokio::select! {
            served = server.serve(&config.listen) => served,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(pipes = registry.len(), "shutting down");
                registry.delete_all();
                Ok(())
            }
        }
    })?;

    Ok(ExitCode::SUCCESS)
}

fn run_attach(args: &[String]) -> Result<ExitCode> {
    let [addr, pipe] = args else {
        eprintln!("Usage: plumb attach <node|addr> <pipe>");
        return Ok(ExitCode::FAILURE);
    };

    let config = PlumbConfig::load()?;
    let rt = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    rt.block_on(attach(addr, pipe, &config))?;
    Ok(ExitCode::SUCCESS)
}

/// Bridge stdin and stdout to a pipe.
///
/// Runs until the pipe goes away or Ctrl-C. After stdin ends the writer is
/// closed and messages keep printing.
async fn attach(target: &str, pipe: &str, config: &PlumbConfig) -> Result<()> {
    let client = if config.peers.contains_key(target) {
        let transport = TcpTransport::new(&config.node)
            .with_peers(config.peers.clone())
            .with_max_line(config.max_line);
        RemoteClient::on_node(Arc::new(transport), target)
    } else {
        RemoteClient::at(target)
    };
    let client = client
        .with_namespace(&config.namespace)
        .with_max_line(config.max_line);
    let (mut reader, mut writer) = client
        .attach(pipe)
        .await
        .with_context(|| format!("Failed to attach to {pipe} at {target}"))?;
    tracing::debug!(pipe, target, "attached");

    let max_line = config.max_line;
    let input = async move {
        let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new_with_max_length(max_line));
        while let Some(line) = lines.next().await {
            let line = line.context("Failed to read stdin")?;
            tracing::debug!("writing: {line}");
            writer.send(&line).await?;
        }
        writer.close().await?;
        anyhow::Ok(())
    };

    let output = async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = reader.recv().await? {
            stdout.write_all(message.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        anyhow::Ok(())
    };

    tokio::select! {
        bridged = async { tokio::try_join!(input, output).map(|_| ()) } => bridged,
        _ = tokio::signal::ctrl_c() => Ok(()),
    }
}
