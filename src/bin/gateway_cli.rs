//! AI Gateway CLI — 供应商列表、Token 估算、费用计算与流式对话的命令行工具
//!
//! Usage:
//!   ai-gateway-cli providers                                  List registered providers and models
//!   ai-gateway-cli estimate <text>                            Estimate tokens for a text
//!   ai-gateway-cli cost <provider> <model> <prompt> <output>  Cost for a token pair
//!   ai-gateway-cli chat <provider> <model> <prompt>           Stream a completion to stdout

use ai_stream_gateway::tokens::estimate_tokens;
use ai_stream_gateway::{Dispatcher, GatewayConfig, Message, Registry, Settings, UnifiedEvent};
use anyhow::{anyhow, bail, Context};
use std::io::Write;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "providers" | "list" => cmd_providers(),
        "estimate" => cmd_estimate(&args[2..]),
        "cost" => cmd_cost(&args[2..]),
        "chat" => cmd_chat(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("ai-gateway-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"ai-gateway-cli — 多厂商流式网关命令行工具

USAGE:
    ai-gateway-cli <COMMAND> [ARGS]

COMMANDS:
    providers                                   List providers, models and rates
    estimate <text>                             Estimate the token count of a text
    cost <provider> <model> <prompt> <output>   Cost of a prompt/output token pair
    chat <provider> <model> <prompt> [--temperature <t>] [--max-tokens <n>] [--buffered]
                                                Stream a completion to stdout
    version                                     Show version information
    help                                        Show this help message

ENVIRONMENT:
    AI_GATEWAY_REGISTRY         Provider registry YAML (default: built-in table)
    AI_GATEWAY_*                Timeout / retry overrides, see GatewayConfig
    RUST_LOG                    Log filter (default: warn)"#
    );
}

fn load_registry() -> anyhow::Result<Registry> {
    match GatewayConfig::from_env().registry_path {
        Some(path) => Registry::from_path(&path)
            .with_context(|| format!("loading registry from {}", path.display())),
        None => Ok(Registry::builtin()),
    }
}

fn cmd_providers() -> anyhow::Result<()> {
    let registry = load_registry()?;
    for p in registry.providers() {
        let key = p.api_key_env.as_deref().unwrap_or("-");
        println!("{} ({:?}) {} [key: {}]", p.id, p.api_style, p.base_url, key);
        for m in &p.models {
            let window = m
                .context_window
                .map(|w| w.to_string())
                .unwrap_or_else(|| "?".into());
            println!(
                "    {:<32} in {:>9.6}/1k  out {:>9.6}/1k  ctx {}",
                m.id, m.input_cost_per_1k, m.output_cost_per_1k, window
            );
        }
    }
    Ok(())
}

fn cmd_estimate(args: &[String]) -> anyhow::Result<()> {
    if args.is_empty() {
        bail!("usage: ai-gateway-cli estimate <text>");
    }
    let text = args.join(" ");
    println!("{}", estimate_tokens(&text));
    Ok(())
}

fn cmd_cost(args: &[String]) -> anyhow::Result<()> {
    let [provider, model, prompt, output] = args else {
        bail!("usage: ai-gateway-cli cost <provider> <model> <prompt_tokens> <completion_tokens>");
    };
    let prompt: u64 = prompt.parse().context("prompt_tokens must be an integer")?;
    let output: u64 = output.parse().context("completion_tokens must be an integer")?;
    let registry = load_registry()?;
    let pricing = registry
        .rates(provider, model)
        .ok_or_else(|| anyhow!("unknown provider/model: {}/{}", provider, model))?;
    let estimate = pricing.calculate_cost(prompt, output);
    println!("{}", estimate.format_detailed());
    Ok(())
}

async fn cmd_chat(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 3 {
        bail!("usage: ai-gateway-cli chat <provider> <model> <prompt> [options]");
    }
    let mut settings = Settings::new(args[0].clone(), args[1].clone());
    let mut prompt_parts = Vec::new();
    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--temperature" => {
                let v = rest.next().ok_or_else(|| anyhow!("--temperature needs a value"))?;
                settings = settings.temperature(v.parse().context("invalid temperature")?);
            }
            "--max-tokens" => {
                let v = rest.next().ok_or_else(|| anyhow!("--max-tokens needs a value"))?;
                settings = settings.max_tokens(v.parse().context("invalid max tokens")?);
            }
            "--buffered" => settings = settings.buffered(),
            other => prompt_parts.push(other.to_string()),
        }
    }

    let dispatcher = Dispatcher::builder().build()?;
    let conversation = vec![Message::user(prompt_parts.join(" "))];
    let mut events = dispatcher.stream(&conversation, &settings);

    let mut stdout = std::io::stdout();
    let mut failed = false;
    loop {
        tokio::select! {
            ev = events.recv() => {
                let Some(ev) = ev else { break };
                match ev {
                    UnifiedEvent::ContentDelta { text } => {
                        write!(stdout, "{}", text)?;
                        stdout.flush()?;
                    }
                    UnifiedEvent::Usage { .. } => {}
                    UnifiedEvent::Done { finish_reason, usage } => {
                        println!();
                        eprintln!(
                            "[{}] prompt {} + completion {} = {} tokens, cost {:.6}{}",
                            finish_reason,
                            usage.prompt_tokens,
                            usage.completion_tokens,
                            usage.total_tokens,
                            usage.cost,
                            if usage.estimated { " (estimated)" } else { "" }
                        );
                    }
                    UnifiedEvent::Failed { kind, message, retryable, retry_after_ms } => {
                        println!();
                        eprintln!("error [{}]: {}", kind, message);
                        if retryable {
                            eprintln!("retryable after {} ms", retry_after_ms.unwrap_or(0));
                        }
                        failed = true;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => events.cancel(),
        }
    }

    if failed {
        std::process::exit(2);
    }
    Ok(())
}
