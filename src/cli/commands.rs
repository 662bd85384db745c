//! CLI commands

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::normalize::{SequenceCounter, UnifiedEvent};
use crate::output::{render_event_line, render_summary, AuditRecord};
use crate::provider::ProviderRegistry;
use crate::session::{AgentCommand, SessionPipeline, SessionRequest, Supervisor, TerminationReason};
use crate::stream::{ChunkOrder, StreamSource};

#[derive(Parser)]
#[command(name = "agentrun")]
#[command(about = "Run coding-agent CLIs and normalize their output into one event timeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $AGENTRUN_CONFIG or ~/.agentrun/config.yml)
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an agent command under supervision
    Run {
        /// Provider id used to interpret the output (see `providers`)
        #[arg(long, short)]
        provider: String,

        /// Absolute timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Seconds of silence tolerated without file activity
        #[arg(long)]
        activity_grace: Option<u64>,

        /// Override the provider's state directory
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Working directory for the agent
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Print events as JSON lines instead of text
        #[arg(long)]
        json: bool,

        /// Write an audit record to this path
        #[arg(long)]
        audit: Option<PathBuf>,

        /// Write the audit record as JSON lines
        #[arg(long, requires = "audit")]
        audit_lines: bool,

        /// The agent command and its arguments
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// Feed captured agent output through the normalizer
    Replay {
        #[arg(long, short)]
        provider: String,

        /// File holding the captured stdout
        file: PathBuf,

        /// Read size used to split the file into chunks
        #[arg(long, default_value = "4096")]
        chunk_size: usize,

        /// Print events as JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// List the registered providers
    Providers,
}

fn print_event(event: &UnifiedEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!("{}", render_event_line(event));
    }
    Ok(())
}

/// Run the CLI and return the process exit code
pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let mut registry = ProviderRegistry::with_builtins()?;
    config.apply_overrides(&mut registry)?;

    match cli.command {
        Commands::Providers => {
            for mapping in registry.mappings() {
                let framing = mapping
                    .framing_hint
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "detect".to_string());
                let state = mapping
                    .state_dir
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<10} framing={:<16} state={}", mapping.id, framing, state);
            }
            Ok(0)
        }

        Commands::Replay {
            provider,
            file,
            chunk_size,
            json,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let limits = config.limits.to_limits();
            let mut pipeline = SessionPipeline::new(
                registry.resolve(&provider),
                registry.ansi(),
                limits.decoder,
                SequenceCounter::new(),
            );
            let order = ChunkOrder::new();
            let mut outputs = Vec::new();
            for piece in bytes.chunks(chunk_size.max(1)) {
                outputs.push(pipeline.ingest(order.tag(StreamSource::Stdout, piece.to_vec())));
            }
            outputs.push(pipeline.finish());

            for output in outputs {
                if let Some(mode) = output.decided {
                    info!(%mode, "framing decided");
                }
                for event in &output.events {
                    print_event(event, json)?;
                }
            }
            Ok(0)
        }

        Commands::Run {
            provider,
            timeout,
            activity_grace,
            state_dir,
            cwd,
            json,
            audit,
            audit_lines,
            command,
        } => {
            let mut limits = config.limits.to_limits();
            if let Some(secs) = timeout {
                limits.timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = activity_grace {
                limits.activity_grace = Duration::from_secs(secs);
            }

            let mut agent = AgentCommand::from_argv(command)?;
            if let Some(dir) = cwd {
                agent = agent.cwd(dir);
            }
            let mut request = SessionRequest::new(provider, agent.clone());
            if let Some(dir) = state_dir {
                request = request.with_state_dir(dir);
            }

            let supervisor = Supervisor::new(Arc::new(registry), limits);

            // Create a multi-threaded runtime for the session
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            let record = rt.block_on(async {
                let cancel = CancellationToken::new();
                let on_signal = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupted, stopping agent");
                        on_signal.cancel();
                    }
                });

                let (tx, mut rx) = mpsc::unbounded_channel();
                let printer = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        if let Err(e) = print_event(&event, json) {
                            warn!(error = %e, "failed to print event");
                        }
                    }
                });

                let record = supervisor.run(request, cancel, Some(tx)).await;
                let _ = printer.await;
                record
            })?;

            if !json {
                print!("{}", render_summary(&record));
            }

            if let Some(path) = audit {
                let audit_record = AuditRecord::from_record(&record, Some(&agent));
                let content = if audit_lines {
                    audit_record.to_json_lines()?
                } else {
                    audit_record.to_json()?
                };
                std::fs::write(&path, content)
                    .with_context(|| format!("Failed to write audit record to {}", path.display()))?;
                info!("Wrote audit record to {:?}", path);
            }

            Ok(match record.termination_reason {
                Some(TerminationReason::Exited) => record.exit_code.unwrap_or(1),
                Some(TerminationReason::Cancelled) => 130,
                Some(TerminationReason::TimedOut) | Some(TerminationReason::ActivityTimeout) => 124,
                _ => 1,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_collects_trailing_command() {
        let cli = Cli::try_parse_from([
            "agentrun", "run", "--provider", "codex", "--timeout", "60", "--", "codex", "exec", "--json", "fix it",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { provider, timeout, command, .. } => {
                assert_eq!(provider, "codex");
                assert_eq!(timeout, Some(60));
                assert_eq!(command, vec!["codex", "exec", "--json", "fix it"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn audit_lines_requires_audit() {
        let parsed = Cli::try_parse_from(["agentrun", "run", "-p", "generic", "--audit-lines", "--", "true"]);
        assert!(parsed.is_err());
    }
}
