//! Interactive session over one MCP connection.

use anyhow::Result;
use clap::Args;
use console::{Style, Term, style};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use nexus_mcp::protocol::result_is_error;
use nexus_mcp::{ConnectionManager, McpError, SessionState, Surface};

use super::call::parse_arguments;
use super::connect::{ConnectionArgs, resolve_connection};
use super::render::{
    filter_catalog, print_catalog, print_diagnostics, print_section, print_summary, truncate,
};
use super::{Context, session_failure};

/// Arguments for `nexus shell`.
#[derive(Args, Debug)]
pub struct ShellArgs {
    /// Saved target name or server URL
    pub target: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Run `nexus shell`.
pub async fn run(args: ShellArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = resolve_connection(&args.target, &args.connection, &loaded.config)?;
    let mut shell = Shell::new(ConnectionManager::new(config), ctx.verbose)?;
    shell.run().await
}

enum ControlFlow {
    Continue,
    Exit,
}

/// Shell state.
pub struct Shell {
    manager: ConnectionManager,
    editor: Editor<(), DefaultHistory>,
    term: Term,
    verbose: bool,
}

impl Shell {
    pub fn new(manager: ConnectionManager, verbose: bool) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        Ok(Self {
            manager,
            editor: Editor::with_config(config)?,
            term: Term::stdout(),
            verbose,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();
        self.connect().await;

        loop {
            let prompt = self.format_prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    match self.handle_command(line).await {
                        Ok(ControlFlow::Continue) => {}
                        Ok(ControlFlow::Exit) => break,
                        Err(e) => self.print_error(&format!("{:#}", e)),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    self.print_dim("(Interrupted - type /quit to exit)");
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.manager.disconnect();
        self.print_dim("Goodbye!");
        Ok(())
    }

    async fn connect(&self) {
        self.print_dim(&format!("Connecting to {}...", self.manager.config().target));
        match self.manager.connect().await {
            Ok(summary) => {
                println!();
                print_summary(&summary);
                let catalog = &summary.catalog;
                self.print_dim(&format!(
                    "{} tools, {} resources, {} prompts. Type /help for commands.",
                    catalog.tools.len(),
                    catalog.resources.len(),
                    catalog.prompts.len()
                ));
            }
            Err(e) => {
                self.print_error(&format!("{:#}", session_failure(e)));
                self.print_dim("Use /log to see what happened, /reconnect to try again.");
            }
        }
    }

    async fn handle_command(&mut self, input: &str) -> Result<ControlFlow> {
        let Some(body) = input.strip_prefix('/') else {
            self.print_dim("Commands start with '/'. Type /help for available commands");
            return Ok(ControlFlow::Continue);
        };

        let (cmd, rest) = match body.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (body, ""),
        };
        let filter = (!rest.is_empty()).then_some(rest);

        match cmd {
            "quit" | "q" | "exit" => return Ok(ControlFlow::Exit),
            "help" | "h" | "?" => self.print_help(),
            "tools" => self.print_surface(Surface::Tools, filter),
            "resources" => self.print_surface(Surface::Resources, filter),
            "prompts" => self.print_surface(Surface::Prompts, filter),
            "call" => self.call_tool(rest).await?,
            "refresh" => {
                let catalog = self.manager.refresh_catalog().await.map_err(session_failure)?;
                print_catalog(&catalog, self.verbose);
            }
            "log" => {
                let limit = match filter {
                    Some(n) => Some(n.parse::<usize>().map_err(|_| {
                        anyhow::anyhow!("/log takes an optional entry count, got '{}'", n)
                    })?),
                    None => None,
                };
                print_diagnostics(&self.manager.diagnostic_events(), limit);
            }
            "clear-log" => {
                self.manager.clear_diagnostics();
                self.print_dim("Diagnostic log cleared");
            }
            "clear" | "cls" => self.term.clear_screen()?,
            "status" => self.print_status(),
            "reconnect" => {
                self.manager.disconnect();
                self.connect().await;
            }
            "disconnect" => {
                self.manager.disconnect();
                self.print_dim("Disconnected");
            }
            "" => self.print_dim("Type /help for available commands"),
            _ => {
                self.print_error(&format!("Unknown command: /{}", cmd));
                self.print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    async fn call_tool(&self, rest: &str) -> Result<()> {
        let (name, raw_args) = match rest.split_once(char::is_whitespace) {
            Some((name, raw)) => (name, raw.trim()),
            None => (rest, ""),
        };
        if name.is_empty() {
            anyhow::bail!("usage: /call <tool> [json arguments]");
        }
        let arguments = parse_arguments(if raw_args.is_empty() { "{}" } else { raw_args })?;

        match self.manager.call_tool(name, arguments).await {
            Ok(result) => {
                let pretty = serde_json::to_string_pretty(&result)?;
                if result_is_error(&result) {
                    println!("{}", style("Tool reported an error:").red());
                }
                println!("{}", pretty);
            }
            Err(McpError::Protocol { code, message, .. }) => {
                self.print_error(&format!("Error {}: {}", code, message));
            }
            Err(e) => return Err(session_failure(e)),
        }
        Ok(())
    }

    fn print_surface(&self, surface: Surface, filter: Option<&str>) {
        if self.manager.state() != SessionState::Ready {
            self.print_dim("Not connected. Use /reconnect.");
            return;
        }
        let catalog = filter_catalog(&self.manager.catalog(), filter);
        print_section(&catalog, surface, self.verbose);
    }

    fn print_status(&self) {
        let dim = Style::new().dim();
        println!("{}", style("Status").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  State:       {}", style(self.manager.state()).cyan());
        println!("  Target:      {}", self.manager.config().target);
        println!("  Transport:   {}", self.manager.config().transport);
        match self.manager.endpoint() {
            Some(endpoint) => println!("  Endpoint:    {}", endpoint),
            None => println!("  Endpoint:    {}", dim.apply_to("(unresolved)")),
        }
        if let Some(info) = self.manager.server_info() {
            println!("  Server:      {} {}", info.name, dim.apply_to(&info.version));
        }
        println!(
            "  Channel:     {}",
            if self.manager.is_channel_open() { "open" } else { "closed" }
        );

        let pending = self.manager.pending_calls();
        println!("  Pending:     {}", pending.len());
        for call in pending {
            println!(
                "    {} {} {}",
                call.id,
                call.method,
                dim.apply_to(call.submitted_at.format("%H:%M:%S"))
            );
        }
        println!(
            "  Log entries: {}",
            self.manager.diagnostics().len()
        );
    }

    fn format_prompt(&self) -> String {
        let marker = match self.manager.state() {
            SessionState::Ready => style("●").green(),
            SessionState::Disconnected => style("○").red(),
            _ => style("◐").yellow(),
        };
        let host = truncate(&self.manager.config().target, 30);
        format!("{} {}> ", marker, host)
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Nexus Shell").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("{}", dim.apply_to("Use /help for commands, Ctrl+D to exit."));
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - List tools", style("/tools [filter]").cyan());
        println!("  {}  - List resources", style("/resources [filter]").cyan());
        println!("  {}  - List prompts", style("/prompts [filter]").cyan());
        println!("  {}  - Call a tool", style("/call <tool> [json]").cyan());
        println!("  {}  - Re-run capability discovery", style("/refresh").cyan());
        println!("  {}  - Show the diagnostic log", style("/log [n]").cyan());
        println!("  {}  - Clear the diagnostic log", style("/clear-log").cyan());
        println!("  {}  - Show session state", style("/status").cyan());
        println!("  {}  - Drop and re-establish the session", style("/reconnect").cyan());
        println!("  {}  - Close the session", style("/disconnect").cyan());
        println!("  {}  - Clear the screen", style("/clear").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - Exit", style("/quit, /q").cyan());
        println!();
    }

    fn print_error(&self, msg: &str) {
        eprintln!("{}", style(msg).red());
    }

    fn print_dim(&self, msg: &str) {
        println!("{}", style(msg).dim());
    }
}
