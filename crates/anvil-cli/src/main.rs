//! `anvil` – boots the kernel with the bundled modules.
//!
//! 1. Loads the declared modules and resolves their settings from
//!    `~/.anvil/config.toml`, asking the operator to fix mistyped values.
//! 2. Feeds stdin lines to the `console` module as `line` events.
//! 3. Once booted, turns **Ctrl-C** into a `terminate` event for a clean
//!    stop.  During boot Ctrl-C keeps its default action, so it can abort a
//!    repair prompt.
//! 4. On a task failure, writes `~/.anvil/crash.txt` and exits with status 1.

mod modules;
mod paths;
mod prompt;
mod telemetry;

use std::io::{self, BufRead};
use std::process::ExitCode;
use std::thread;

use anvil_kernel::{ChannelHost, CrashReporter, Exit, HostSender, Kernel};
use anvil_types::Event;
use colored::Colorize;
use tracing::{debug, error, info, warn};

use crate::modules::console::LINE_EVENT;
use crate::modules::heartbeat::{self, Pulse};
use crate::paths::KernelPaths;
use crate::prompt::RepairPrompt;

fn main() -> ExitCode {
    let _telemetry = telemetry::init("anvil");
    print_banner();

    let paths = KernelPaths::from_env();
    let mut host = ChannelHost::new();

    // ── Boot ──────────────────────────────────────────────────────────────
    // No Ctrl-C handler yet: the default signal action must still be able
    // to abort a blocking repair prompt.
    let booted = {
        let mut prompt = RepairPrompt::new(io::stdin().lock(), io::stdout());
        let booted = Kernel::boot(
            modules::declared(),
            Some(paths.config_path.clone()),
            &mut prompt,
        );
        if prompt.asked() > 0 {
            println!("  {} settings repaired", "✓".green().bold());
        }
        booted
    };
    let mut kernel = match booted {
        Ok(kernel) => kernel,
        Err(e) => {
            error!(error = %e, "boot failed");
            println!("{}: {e}", "Boot failed".red().bold());
            return ExitCode::FAILURE;
        }
    };
    print_boot_summary(&kernel, &paths);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    if let Err(e) = ctrlc::set_handler(terminate_on_signal(host.sender())) {
        warn!(error = %e, "failed to install Ctrl-C handler; Ctrl-C will exit without cleanup");
    }

    spawn_stdin_reader(host.sender());

    // ── Run ───────────────────────────────────────────────────────────────
    match kernel.run(&mut host) {
        Ok(Exit::Terminated) => {
            if let Some(pulse) = kernel.context().interface::<Pulse>(heartbeat::ID) {
                info!(ticks = pulse.ticks(), beats = pulse.beats(), "kernel stopped");
            }
            println!("{}", "  ✓ Anvil stopped.".green());
            ExitCode::SUCCESS
        }
        Ok(Exit::Crashed(failure)) => {
            println!();
            println!(
                "{} module '{}' failed: {}",
                "✗ CRASH".red().bold(),
                failure.module_id.bold(),
                failure.error
            );
            let report = kernel.crash_report(&failure);
            match CrashReporter::new(&paths.crash_path).write(&report) {
                Ok(path) => println!("  Crash report written to {}", path.display().to_string().bold()),
                Err(e) => {
                    error!(error = %e, "crash report could not be written");
                    println!("  {} {e}", "Crash report could not be written:".red());
                }
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "event host failed");
            println!("{}: {e}", "Event host failed".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Ctrl-C handler body: ask the scheduler to stop at its next pull.
fn terminate_on_signal(signals: HostSender) -> impl FnMut() + Send + 'static {
    move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the kernel …".yellow().bold());
        signals.send(Event::terminate());
    }
}

/// Forward stdin lines as `line` events until EOF or the host goes away.
fn spawn_stdin_reader(sender: HostSender) {
    let spawned = thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if !sender.send(Event::new(LINE_EVENT).with(line)) {
                    return;
                }
            }
            debug!("stdin closed");
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not start stdin reader; console input disabled");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___            _ __"#.bold().cyan());
    println!("{}", r#"  / _ |  ___  __ (_) /"#.bold().cyan());
    println!("{}", r#" / __ | / _ \/ |/ / / / "#.bold().cyan());
    println!("{}", r#"/_/ |_|/_//_/|___/_/_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Anvil".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Cooperative module kernel");
    println!();
}

fn print_boot_summary(kernel: &Kernel, paths: &KernelPaths) {
    let registry = kernel.registry();
    for info in kernel.context().modules() {
        println!("  {} {} {}", "✓".green(), info.id.bold(), info.version.dimmed());
    }
    for skipped in registry.skipped() {
        println!(
            "  {} {} {}",
            "✗".red(),
            skipped.source.bold(),
            skipped.reason.dimmed()
        );
    }
    println!(
        "  Settings in {}",
        paths.config_path.display().to_string().bold()
    );
    println!(
        "  {} module(s) loaded, {} task(s) scheduled. Type {} for commands.\n",
        registry.len(),
        kernel.scheduler().len(),
        "/help".bold().cyan()
    );
}
