//! Main entry point for the shellmux CLI.
//!
//! Opens one shell, runs the given commands in it (or reads commands from
//! stdin), and exits with the last command's exit code.

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Stylize;
use tokio::io::{AsyncBufReadExt, BufReader};

use shellmux::cli::Cli;
use shellmux::config::Settings;
use shellmux::shell::{CommandConfig, CommandResult, ResultHistory, Shell, ShellLauncher, ShellPool};
use shellmux::utils::guard::CleanupGuard;
use shellmux::utils::logger;

const HISTORY_COMMAND: &str = ":history";
const QUIT_COMMAND: &str = ":quit";
const HISTORY_SHOWN: usize = 10;

fn main() -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the tokio runtime")?;
    let code = runtime.block_on(run());
    // The stdin reader blocks in a read that cannot be cancelled
    runtime.shutdown_background();
    code
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::from_env();
    let _log_guard = logger::init_logging(&settings.log_dir);

    let pool = Arc::new(ShellPool::with_env(cli.environment()));
    // Shells are shut down on normal exit and on panic
    let _shells = {
        let pool = pool.clone();
        CleanupGuard::new(move || pool.shutdown_all())
    };

    let shell = open_shell(&cli, &settings, &pool)?;
    tracing::info!(shell = %shell.path(), pid = shell.pid(), "session ready");

    let history = Arc::new(Mutex::new(ResultHistory::default()));
    shell.add_result_listener(ResultHistory::listener(history.clone()));

    let mut last_code = 0;
    if cli.commands.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            // Ctrl-C at the prompt quits; during a command it interrupts
            let line = tokio::select! {
                line = lines.next_line() => line.context("failed to read stdin")?,
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for ctrl-c")?;
                    tracing::debug!("ctrl-c at prompt, exiting");
                    break;
                }
            };
            let Some(line) = line else { break };
            match line.trim() {
                "" => continue,
                QUIT_COMMAND => break,
                HISTORY_COMMAND => print_history(&history),
                _ => last_code = run_command(&cli, &settings, &shell, line).await?,
            }
        }
    } else {
        for command in &cli.commands {
            last_code = run_command(&cli, &settings, &shell, command.clone()).await?;
        }
    }

    Ok(ExitCode::from(last_code.clamp(0, 255) as u8))
}

fn open_shell(cli: &Cli, settings: &Settings, pool: &ShellPool) -> Result<Shell> {
    if cli.root {
        let launcher = ShellLauncher::root(cli.global_mount).probe_timeout(settings.probe_timeout);
        return pool
            .launch("root", &launcher)
            .context("failed to open a root shell");
    }
    let command_line = cli.shell_command_line(settings);
    pool.get(command_line)
        .with_context(|| format!("failed to open shell '{command_line}'"))
}

async fn run_command(cli: &Cli, settings: &Settings, shell: &Shell, command: String) -> Result<i32> {
    let mut config = CommandConfig::default()
        .merge_stderr(cli.merge_stderr)
        .timeout(cli.timeout(settings))
        .on_timeout(|| eprintln!("{}", "command timed out".yellow()))
        .on_cancelled(|| eprintln!("{}", "command interrupted".yellow()));
    if !cli.json {
        config = config
            .on_stdout_line(|line| println!("{line}"))
            .on_stderr_line(|line| eprintln!("{}", line.red()));
    }

    let run = shell.run_async(command, config);
    tokio::pin!(run);
    let result = loop {
        tokio::select! {
            result = &mut run => break result.context("failed to run command")?,
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                tracing::debug!("ctrl-c received");
                shell.interrupt();
            }
        }
    };
    if cli.json {
        print_json(&result)?;
    }
    Ok(result.exit_code)
}

fn print_json(result: &CommandResult) -> Result<()> {
    let json = serde_json::to_string(result).context("failed to serialize result")?;
    println!("{json}");
    Ok(())
}

fn print_history(history: &Mutex<ResultHistory>) {
    let history = history.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    for entry in history.recent(HISTORY_SHOWN) {
        let code = if entry.exit_code == 0 {
            entry.exit_code.to_string().green()
        } else {
            entry.exit_code.to_string().red()
        };
        println!("[{code}] {}", entry.command);
    }
}
