//! Gensee - Rust 智能体执行核心
//!
//! 入口：加载配置、初始化日志、连接外部工具进程，执行一次任务并把事件以 SSE 行输出到 stdout。
//!
//! 用法：`gensee-agent [--config <path>] [--session <id>] [--title <t>] [--model <m>] [--interactive] <task...>`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use futures_util::{FutureExt, StreamExt};
use gensee_agent::{
    config::load_config,
    core::{AgentBuilder, TaskOptions},
    hub::ToolHub,
    observability,
    tools::AskCallback,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    session: Option<String>,
    title: Option<String>,
    model: Option<String>,
    interactive: bool,
    task: Vec<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut cli = CliArgs::default();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().with_context(|| format!("{} requires a value", flag));
        match arg.as_str() {
            "--config" => cli.config = Some(PathBuf::from(value("--config")?)),
            "--session" => cli.session = Some(value("--session")?),
            "--title" => cli.title = Some(value("--title")?),
            "--model" => cli.model = Some(value("--model")?),
            "--interactive" => cli.interactive = true,
            flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
            word => cli.task.push(word.to_string()),
        }
    }
    if cli.task.is_empty() {
        bail!("usage: gensee-agent [--config <path>] [--session <id>] [--title <t>] [--model <m>] [--interactive] <task...>");
    }
    Ok(cli)
}

/// 终端交互回调：问题写到 stderr，从 stdin 读一行作为回答
fn stdin_ask() -> AskCallback {
    Arc::new(|question: String| {
        async move {
            let mut err = tokio::io::stderr();
            err.write_all(format!("\n{}\n> ", question).as_bytes())
                .await
                .map_err(|e| e.to_string())?;
            err.flush().await.map_err(|e| e.to_string())?;
            let mut line = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await
                .map_err(|e| e.to_string())?;
            Ok::<String, String>(line.trim().to_string())
        }
        .boxed()
    })
}

async fn run(cli: CliArgs, hub: &mut ToolHub) -> anyhow::Result<bool> {
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let mut builder = AgentBuilder::new(cfg);
    if cli.interactive {
        builder = builder.with_ask_callback(stdin_ask());
    }
    let runtime = builder.build(hub).await.context("Failed to build agent")?;

    let prompt = cli.task.join(" ");
    let title = cli.title.clone().unwrap_or_else(|| prompt.clone());
    let options = TaskOptions {
        model: cli.model.clone(),
        ..TaskOptions::default()
    };

    let mut events = runtime
        .submit(cli.session.clone(), &title, &prompt, options)
        .await
        .context("Failed to create task")?;
    let mut ok = true;
    let mut out = tokio::io::stdout();
    while let Some(event) = events.next().await {
        ok &= event.kind != gensee_agent::core::EventKind::Error;
        out.write_all(event.to_sse().as_bytes()).await?;
        out.flush().await?;
    }
    Ok(ok)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = parse_args(std::env::args().skip(1))?;

    let mut hub = ToolHub::new();
    let result = run(cli, &mut hub).await;
    hub.shutdown().await;

    if !result? {
        std::process::exit(1);
    }
    Ok(())
}
