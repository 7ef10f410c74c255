// Copyright 2026 Fuzzscout Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use fuzzscout_runtime::cli::{self, DiscoverArgs, GateArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fuzzscout",
    about = "Fuzzscout - input discovery and gated payload execution for authorized testing",
    version,
    after_help = "Run 'fuzzscout <command> --help' for details on each command.\nTargets are restricted to loopback hosts unless --allow-non-local is given."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Pipeline config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover forms and endpoints on one page
    Discover {
        #[command(flatten)]
        target: DiscoverArgs,
        /// Write the report to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Discover, classify, generate payloads and execute (dry run by default)
    Run {
        #[command(flatten)]
        target: DiscoverArgs,
        #[command(flatten)]
        gate: GateArgs,
    },
    /// Run a command list through the execution harness (dry run by default)
    Execute {
        /// File with one shell command per line
        command_list: PathBuf,
        #[command(flatten)]
        gate: GateArgs,
        /// Directory in which responses_* directories are created
        #[arg(long)]
        output_root: Option<PathBuf>,
        /// Show the last output lines of running tasks
        #[arg(long)]
        tail_preview: bool,
        /// Terminate tasks running longer than this many seconds
        #[arg(long)]
        task_timeout: Option<u64>,
    },
    /// Label parameter types in a discovery artifact
    Classify {
        input: PathBuf,
        output: PathBuf,
    },
    /// Flag interesting responses in an execution output directory
    Triage {
        /// Defaults to the latest responses_* directory
        dir: Option<PathBuf>,
    },
    /// Serve the REST API on 127.0.0.1
    Serve {
        #[arg(long, default_value = "5001")]
        port: u16,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
    /// Submit one JSON request to a running server
    Submit {
        #[arg(long, default_value = "http://127.0.0.1:5001/crawl")]
        url: String,
        /// Request body file
        #[arg(long, conflicts_with = "data", required_unless_present = "data")]
        input: Option<PathBuf>,
        /// Inline request body
        #[arg(long)]
        data: Option<String>,
        /// Save the response body here
        #[arg(long)]
        out: Option<PathBuf>,
        /// Request timeout in seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
        #[arg(long)]
        proxy: Option<String>,
        /// Bearer token
        #[arg(long)]
        token: Option<String>,
        /// Indent JSON responses
        #[arg(long)]
        pretty: bool,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("FUZZSCOUT_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("FUZZSCOUT_QUIET", "1");
    }
    if cli.no_color {
        std::env::set_var("FUZZSCOUT_NO_COLOR", "1");
    }
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        cli.log_level.as_str()
    };
    cli::init_logging(level, cli::output::no_color());

    if let Err(e) = dispatch(cli.command, cli.config.as_deref()).await {
        let code = cli::exit_code(&e);
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({ "error": format!("{e:#}") }));
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(code);
    }
}

async fn dispatch(command: Commands, config: Option<&std::path::Path>) -> Result<()> {
    match command {
        Commands::Discover { target, out } => cli::discover_cmd::run(&target, out.as_deref()).await,
        Commands::Run { target, gate } => cli::run_cmd::run(&target, gate, config).await,
        Commands::Execute {
            command_list,
            gate,
            output_root,
            tail_preview,
            task_timeout,
        } => {
            let opts = cli::execute_cmd::ExecuteOptions {
                command_list,
                gate,
                output_root,
                tail_preview,
                task_timeout,
            };
            cli::execute_cmd::run(opts, config).await
        }
        Commands::Classify { input, output } => cli::classify_cmd::run(&input, &output).await,
        Commands::Triage { dir } => cli::triage_cmd::run(dir, config).await,
        Commands::Serve { port, headed } => cli::serve::run(port, headed, config).await,
        Commands::Submit {
            url,
            input,
            data,
            out,
            timeout,
            proxy,
            token,
            pretty,
        } => {
            cli::submit_cmd::run(cli::submit_cmd::SubmitArgs {
                url,
                input,
                data,
                out,
                timeout_secs: timeout,
                proxy,
                token,
                pretty,
            })
            .await
        }
        Commands::Doctor => cli::doctor::run(config).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "fuzzscout", &mut std::io::stdout());
            Ok(())
        }
    }
}
