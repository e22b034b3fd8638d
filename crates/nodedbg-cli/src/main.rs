use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use nodedbg_config::DebuggerConfig;
use nodedbg_protocol::{
    ChannelConfig, CommandChannel, ContinueCommand, DefaultEvaluationResultFactory,
    EvaluateCommand, EvaluationResult, EvaluationResultFactory, Handle, LookupCommand,
    NewValue, ResolvedGraph, SetVariableValueCommand, StepAction,
};
use nodedbg_watch::{FileChangeReason, TestFilesWatcher};

/// Inspect a Node.js process through the V8 debugger protocol.
#[derive(Debug, Parser)]
#[command(name = "nodedbg", version, about)]
struct Cli {
    /// Debugger address of the target process (`node --debug` listens on 5858).
    #[arg(long, default_value = "127.0.0.1:5858")]
    addr: SocketAddr,

    /// Path to a TOML config file.
    ///
    /// If unset, `NODEDBG_CONFIG` is used as a fallback. When neither are provided the
    /// defaults are used.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print the values behind one or more handles.
    Lookup {
        #[arg(required = true)]
        handles: Vec<Handle>,
        /// How many levels of children to print.
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// Evaluate an expression in the paused debuggee.
    Evaluate {
        expression: String,
        /// Evaluate in this stack frame instead of the top one.
        #[arg(long, conflicts_with = "global")]
        frame: Option<u32>,
        #[arg(long)]
        global: bool,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// Assign a new value to a variable in a scope.
    Set {
        name: String,
        /// JSON primitive (`42`, `"text"`, `true`, `null`) or `undefined`.
        value: String,
        #[arg(long, default_value_t = 0)]
        scope: u32,
        #[arg(long, default_value_t = 0)]
        frame: u32,
    },
    /// Resume execution, optionally stepping.
    Continue {
        #[arg(long, value_enum)]
        step: Option<Step>,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Print file changes below a directory until interrupted.
    Watch { path: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Step {
    In,
    Next,
    Out,
}

impl From<Step> for StepAction {
    fn from(step: Step) -> Self {
        match step {
            Step::In => StepAction::In,
            Step::Next => StepAction::Next,
            Step::Out => StepAction::Out,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DebuggerConfig::load_or_default(cli.config);
    nodedbg_config::init_tracing(&config.logging);

    match cli.command {
        Cmd::Lookup { handles, depth } => {
            let (channel, factory) = attach(cli.addr, &config).await?;
            let results = channel
                .execute(LookupCommand::new(factory, handles.iter().copied())?)
                .await?;
            for handle in &handles {
                match results.get(*handle) {
                    Some(result) => print_tree(result, results.graph(), depth),
                    None => println!("{handle}: <not available>"),
                }
            }
            channel.close();
        }
        Cmd::Evaluate {
            expression,
            frame,
            global,
            depth,
        } => {
            let (channel, factory) = attach(cli.addr, &config).await?;
            let mut command = EvaluateCommand::new(factory, expression)?;
            if let Some(frame) = frame {
                command = command.in_frame(frame);
            }
            if global {
                command = command.global();
            }
            let outcome = channel.execute(command).await?;
            print_tree(&outcome.result, &outcome.graph, depth);
            channel.close();
        }
        Cmd::Set {
            name,
            value,
            scope,
            frame,
        } => {
            let new_value = parse_new_value(&value)?;
            let (channel, factory) = attach(cli.addr, &config).await?;
            let command = SetVariableValueCommand::new(factory, name, new_value, scope, frame)?;
            let outcome = channel.execute(command).await?;
            print_tree(&outcome.result, &outcome.graph, 0);
            channel.close();
        }
        Cmd::Continue { step, count } => {
            let command = match step {
                Some(step) => ContinueCommand::step(step.into(), count)?,
                None => ContinueCommand::new(),
            };
            let (channel, _) = attach(cli.addr, &config).await?;
            let running = channel.execute(command).await?;
            println!("{}", if running { "running" } else { "paused" });
            channel.close();
        }
        Cmd::Watch { path } => watch(path).await?,
    }
    Ok(())
}

async fn attach(
    addr: SocketAddr,
    config: &DebuggerConfig,
) -> anyhow::Result<(CommandChannel, Arc<dyn EvaluationResultFactory>)> {
    let (channel, info) =
        CommandChannel::connect_with_config(addr, ChannelConfig::from(&config.channel))
            .await
            .with_context(|| format!("failed to attach to debuggee at {addr}"))?;
    tracing::info!(
        v8_version = info.v8_version.as_deref().unwrap_or("unknown"),
        embedding_host = info.embedding_host.as_deref().unwrap_or("unknown"),
        "attached"
    );
    let factory: Arc<dyn EvaluationResultFactory> = Arc::new(
        DefaultEvaluationResultFactory::new(config.evaluation.max_string_length),
    );
    Ok((channel, factory))
}

fn parse_new_value(text: &str) -> anyhow::Result<NewValue> {
    if text == "undefined" {
        return Ok(NewValue::Undefined);
    }
    let value: serde_json::Value = serde_json::from_str(text)
        .with_context(|| format!("`{text}` is not a JSON primitive or `undefined`"))?;
    Ok(NewValue::Primitive(value))
}

fn print_tree(root: &EvaluationResult, graph: &ResolvedGraph, depth: usize) {
    let label = root
        .name
        .clone()
        .unwrap_or_else(|| root.handle.to_string());
    print_node(root, &label, graph, depth, 0, &mut HashSet::new());
}

fn print_node(
    node: &EvaluationResult,
    label: &str,
    graph: &ResolvedGraph,
    depth: usize,
    level: usize,
    expanded: &mut HashSet<Handle>,
) {
    let indent = "  ".repeat(level);
    println!("{indent}{label}: {} = {}", node.type_name, node.display_value);
    // Cycles are expanded once.
    if level >= depth || !expanded.insert(node.handle) {
        return;
    }
    for child in &node.children {
        match graph.resolve(child) {
            Some(value) => print_node(value, &child.name, graph, depth, level + 1, expanded),
            None => println!("{indent}  {}: <unresolved @{}>", child.name, child.handle),
        }
    }
}

async fn watch(path: PathBuf) -> anyhow::Result<()> {
    let mut watcher = TestFilesWatcher::new();
    anyhow::ensure!(
        watcher.watch_tree(&path),
        "cannot watch {}: not a directory",
        path.display()
    );
    let receiver = watcher.receiver().clone();

    tokio::task::spawn_blocking(move || {
        // Keep the registration alive for as long as changes are printed.
        let _watcher = watcher;
        for change in receiver.iter() {
            let reason = match change.reason {
                FileChangeReason::Changed => "changed",
                FileChangeReason::Renamed => "renamed",
            };
            println!("{reason}\t{}", change.path.display());
        }
    })
    .await
    .context("watch task failed")
}
