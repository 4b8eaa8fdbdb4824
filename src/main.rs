mod cli;

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use sg_core::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    // Logs go to stderr so command output on stdout stays machine-readable.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "streamgauge=trace,sg_av=debug,sg_server=debug,sg_core=debug,tower_http=debug"
                .to_string()
        } else {
            "streamgauge=info,sg_av=info,sg_server=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            tracing::info!("Starting streamgauge");
            tracing::info!(
                "Stream program: {} (output {})",
                config.stream.program,
                config.stream.output_dir.display()
            );

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(sg_server::start(config))?;
            Ok(())
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Presets => list_presets(),
        Commands::ParseLine { all } => parse_stdin(all),
        Commands::Version => {
            println!("streamgauge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Load the config file (or defaults) and layer environment overrides on top.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = Config::load_or_default(path)?;
    config.apply_env();
    Ok(config)
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Checking external tools...\n");

    let registry = sg_av::ToolRegistry::discover(&config.stream);
    let tools = registry.check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All tools are available!");
    } else if registry.require(&config.stream.program).is_err() {
        println!(
            "Stream program '{}' is missing; starting a stream will fail.",
            config.stream.program
        );
    } else {
        println!("Some companion tools are missing.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => println!("Validating config: {}", p.display()),
        None => println!("No config file specified, searching default locations"),
    }

    let config = load_config(path)?;
    let mut warnings = config.validate();
    warnings.extend(sg_av::validate_defaults(&config.stream));

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Program: {}", config.stream.program);
    println!("  Arguments: {}", config.stream.args.len());
    println!("  Output dir: {}", config.stream.output_dir.display());
    println!(
        "  Default source: {}",
        config
            .stream
            .default_source
            .as_deref()
            .unwrap_or(sg_av::params::DEFAULT_SOURCE)
    );
    println!(
        "  Default resolution: {}",
        config
            .stream
            .default_resolution
            .as_deref()
            .unwrap_or(sg_av::params::DEFAULT_RESOLUTION)
    );
    println!("  Graceful timeout: {}s", config.stream.graceful_timeout_secs);

    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

fn list_presets() -> Result<()> {
    for (key, resolution) in sg_av::RESOLUTION_PRESETS {
        println!("{key:<6} {resolution}");
    }
    Ok(())
}

/// Read stdin, split on `\n` and `\r`, and print each parsed line as JSON.
fn parse_stdin(all: bool) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for chunk in stdin.lock().split(b'\n') {
        let chunk = chunk?;
        let text = String::from_utf8_lossy(&chunk);

        for line in text.split('\r').map(str::trim).filter(|l| !l.is_empty()) {
            if !all && !sg_av::is_progress_line(line) {
                continue;
            }

            let metrics = sg_av::parse_line(line);
            if metrics.is_empty() {
                continue;
            }

            writeln!(out, "{}", serde_json::to_string(&metrics)?)?;
        }
    }

    Ok(())
}
