//! `console` – operator control surface.
//!
//! Reads `line` events posted by the stdin reader thread and answers
//! slash-commands:
//!
//!   /modules                        – loaded modules and their versions
//!   /get <module> <option>          – current value of a setting
//!   /set <module> <option> <value>  – change a setting (persisted)
//!   /help                           – show this list
//!   /quit | /exit                   – stop the kernel

use anvil_kernel::{
    ConfigSpec, Configurable, Identifiable, Initializable, KernelContext, ModuleInterface,
    OptionSpec, Resume, Task, TaskError,
};
use anvil_types::{Event, KernelError, OptionType, Value};
use colored::Colorize;
use tracing::debug;

pub const ID: &str = "console";

/// Event kind carrying one line of operator input as its first argument.
pub const LINE_EVENT: &str = "line";

const DEFAULT_PROMPT: &str = "anvil> ";

pub struct Console;

impl Identifiable for Console {
    fn id(&self) -> &str {
        ID
    }

    fn version(&self) -> &str {
        "0.1.0"
    }
}

impl Configurable for Console {
    fn config_spec(&self) -> ConfigSpec {
        ConfigSpec::from([(
            "prompt".to_string(),
            OptionSpec::new(OptionType::String, DEFAULT_PROMPT, "Text shown before each command"),
        )])
    }
}

impl Initializable for Console {
    fn init(&self, _ctx: &KernelContext) -> Result<ModuleInterface, KernelError> {
        Ok(ModuleInterface::new().with_start(ConsoleTask))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Task
// ────────────────────────────────────────────────────────────────────────────

struct ConsoleTask;

impl Task for ConsoleTask {
    fn resume(&mut self, ctx: &mut KernelContext, event: &Event) -> Result<Resume, TaskError> {
        if event.kind == LINE_EVENT {
            let line = event.arg(0).and_then(Value::as_str).unwrap_or_default();
            let reply = execute(ctx, line);
            if !reply.text.is_empty() {
                println!("{}", reply.text);
            }
            if reply.quit {
                return Ok(Resume::Finished);
            }
        }
        show_prompt(ctx);
        Ok(Resume::wait_for(LINE_EVENT))
    }
}

fn show_prompt(ctx: &KernelContext) {
    use std::io::Write;
    let prompt = ctx.config().string(ID, "prompt").unwrap_or(DEFAULT_PROMPT);
    print!("{}", prompt.bold().cyan());
    std::io::stdout().flush().ok();
}

// ────────────────────────────────────────────────────────────────────────────
// Command handlers
// ────────────────────────────────────────────────────────────────────────────

/// What a command printed and whether the console should stop.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Reply {
    pub text: String,
    pub quit: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quit: false,
        }
    }
}

pub(crate) fn execute(ctx: &mut KernelContext, line: &str) -> Reply {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Reply::default();
    };
    debug!(%command, "console command");

    match command {
        "/help" => Reply::text(help()),
        "/modules" => Reply::text(cmd_modules(ctx)),
        "/get" => match (words.next(), words.next()) {
            (Some(module), Some(option)) => Reply::text(cmd_get(ctx, module, option)),
            _ => Reply::text(usage("/get <module> <option>")),
        },
        "/set" => {
            let module = words.next();
            let option = words.next();
            let value = words.collect::<Vec<_>>().join(" ");
            match (module, option) {
                (Some(module), Some(option)) if !value.is_empty() => {
                    Reply::text(cmd_set(ctx, module, option, value))
                }
                _ => Reply::text(usage("/set <module> <option> <value>")),
            }
        }
        "/quit" | "/exit" => {
            ctx.queue_event(Event::terminate());
            Reply {
                text: "Goodbye.".green().to_string(),
                quit: true,
            }
        }
        other => Reply::text(format!(
            "{} '{}'. Type {} for available commands.",
            "Unknown command:".red(),
            other.yellow(),
            "/help".bold()
        )),
    }
}

fn help() -> String {
    [
        format!("{}", "Anvil Commands".bold().underline()),
        format!("  {}                        – loaded modules", "/modules".bold().cyan()),
        format!("  {}          – show a setting", "/get <module> <option>".bold().cyan()),
        format!("  {}  – change a setting", "/set <module> <option> <value>".bold().cyan()),
        format!("  {}                   – stop the kernel", "/quit  /exit".bold().cyan()),
    ]
    .join("\n")
}

fn cmd_modules(ctx: &KernelContext) -> String {
    let mut lines = vec![format!("{}", "Loaded modules".bold().underline())];
    for info in ctx.modules() {
        let marker = if ctx.has_interface(&info.id) { "▶" } else { " " };
        lines.push(format!("  {} {} {}", marker.green(), info.id.bold(), info.version.dimmed()));
    }
    lines.join("\n")
}

fn cmd_get(ctx: &KernelContext, module: &str, option: &str) -> String {
    match ctx.config().option(module, option) {
        Some(setting) => format!(
            "  {module}.{option} = {} ({})",
            setting.value.literal().yellow(),
            setting.ty()
        ),
        None => format!("{} {module}.{option}", "Unknown setting:".red()),
    }
}

fn cmd_set(ctx: &mut KernelContext, module: &str, option: &str, raw: String) -> String {
    let Some(ty) = ctx.config().option(module, option).map(|o| o.ty()) else {
        return format!("{} {module}.{option}", "Unknown setting:".red());
    };
    if ctx.config_mut().set(module, option, Value::String(raw.clone())) {
        let value = ctx.config().get(module, option).map(Value::literal).unwrap_or_default();
        format!("{} {module}.{option} = {}", "✓".green().bold(), value.bold())
    } else {
        format!("{} '{raw}' is not a valid {ty}", "Rejected:".red())
    }
}

fn usage(text: &str) -> String {
    format!("{} {text}", "Usage:".yellow())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_kernel::{ConfigStore, Kernel, LinePrompt, ModuleSource};
    use std::io::Cursor;

    fn kernel() -> Kernel {
        colored::control::set_override(false);
        let mut input = LinePrompt::new(Cursor::new(""), Vec::new());
        Kernel::boot(
            [
                ModuleSource::from_module(Console),
                ModuleSource::from_module(crate::modules::heartbeat::Heartbeat),
            ],
            None,
            &mut input,
        )
        .expect("boot")
    }

    #[test]
    fn modules_lists_every_loaded_module() {
        let mut kernel = kernel();
        let reply = execute(kernel.context_mut(), "/modules");
        assert!(reply.text.contains("console 0.1.0"));
        assert!(reply.text.contains("heartbeat 0.1.0"));
        assert!(!reply.quit);
    }

    #[test]
    fn get_and_set_round_through_the_config_store() {
        let mut kernel = kernel();
        let ctx = kernel.context_mut();

        assert!(execute(ctx, "/get heartbeat every").text.contains("= 20 (number)"));
        assert!(execute(ctx, "/set heartbeat every 5").text.contains("heartbeat.every = 5"));
        assert_eq!(ctx.config().number("heartbeat", "every"), Some(5.0));

        let rejected = execute(ctx, "/set heartbeat every often");
        assert!(rejected.text.contains("not a valid number"));
        assert_eq!(ctx.config().number("heartbeat", "every"), Some(5.0));
    }

    #[test]
    fn set_joins_multi_word_values() {
        let mut kernel = kernel();
        let ctx = kernel.context_mut();
        execute(ctx, "/set console prompt  ore  > ");
        assert_eq!(ctx.config().string(ID, "prompt"), Some("ore >"));
    }

    #[test]
    fn unknown_setting_and_usage() {
        colored::control::set_override(false);
        let mut ctx = KernelContext::new(ConfigStore::new(), Vec::new());
        assert!(execute(&mut ctx, "/get nope x").text.contains("Unknown setting"));
        assert!(execute(&mut ctx, "/set nope").text.contains("Usage"));
        assert!(execute(&mut ctx, "/dance").text.contains("Unknown command"));
        assert_eq!(execute(&mut ctx, "   "), Reply::default());
    }

    #[test]
    fn quit_queues_terminate() {
        let mut kernel = kernel();
        let mut task = ConsoleTask;
        let line = Event::new(LINE_EVENT).with("/quit");
        let resume = task.resume(kernel.context_mut(), &line).unwrap();
        assert_eq!(resume, Resume::Finished);
        // The outbox is forwarded by the scheduler; run one cycle to see it.
        let mut host = anvil_kernel::ChannelHost::new();
        let sender = host.sender();
        sender.send(Event::new(LINE_EVENT).with("/quit"));
        let exit = kernel.run(&mut host).unwrap();
        assert!(matches!(exit, anvil_kernel::Exit::Terminated));
    }
}
