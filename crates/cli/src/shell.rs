//! Line shell for `cdp inspect`
//!
//! `Domain.command {json}` sends a command, `Domain.event` toggles printing of
//! an event, `.target` / `.help [name]` / `.exit` are shell commands.
//! Command replies are printed as they arrive, so slow commands never block
//! the prompt.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use cdp_client::schema::{Category, Item, Parameter};
use cdp_client::{Client, Subscription};

const PROMPT: &str = ">>> ";

#[derive(Debug, PartialEq)]
enum Line {
    Empty,
    Exit,
    Target,
    Help(Option<String>),
    Call {
        method: String,
        params: Option<Value>,
    },
}

fn parse_line(line: &str) -> std::result::Result<Line, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Line::Empty);
    }

    if let Some(rest) = line.strip_prefix('.') {
        let (command, arg) = match rest.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, Some(arg.trim())),
            None => (rest, None),
        };
        return match command {
            "exit" | "quit" => Ok(Line::Exit),
            "target" => Ok(Line::Target),
            "help" => Ok(Line::Help(
                arg.filter(|a| !a.is_empty()).map(str::to_string),
            )),
            other => Err(format!("Unknown shell command .{}", other)),
        };
    }

    let (method, rest) = match line.split_once(char::is_whitespace) {
        Some((method, rest)) => (method, rest.trim()),
        None => (line, ""),
    };
    if !method.contains('.') {
        return Err(format!("Expected Domain.name, got '{}'", method));
    }
    let params = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str(rest).map_err(|e| format!("Invalid params: {}", e))?)
    };
    Ok(Line::Call {
        method: method.to_string(),
        params,
    })
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn describe_parameter(prefix: &str, parameter: &Parameter) -> String {
    let mut out = format!(
        "\n  {}{}: {}",
        prefix,
        parameter.name,
        parameter.type_name().unwrap_or("any")
    );
    if parameter.optional {
        out.push_str(" (optional)");
    }
    out
}

fn describe(item: &Item) -> String {
    let mut out = format!("{} {}", item.category, item.qualified_name());
    if item.experimental {
        out.push_str(" [experimental]");
    }
    if item.deprecated {
        out.push_str(" [deprecated]");
    }
    if let Some(kind) = &item.kind {
        out.push_str(&format!(" : {}", kind));
    }
    if let Some(description) = &item.description {
        out.push_str("\n  ");
        out.push_str(description);
    }

    let mut parameters: Vec<&Parameter> = item.parameters.values().collect();
    parameters.sort_by(|a, b| a.name.cmp(&b.name));
    for parameter in parameters {
        out.push_str(&describe_parameter("", parameter));
    }
    let mut returns: Vec<&Parameter> = item.returns.values().collect();
    returns.sort_by(|a, b| a.name.cmp(&b.name));
    for parameter in returns {
        out.push_str(&describe_parameter("-> ", parameter));
    }
    out
}

struct Shell {
    client: Arc<Client>,
    /// Events currently printed, by qualified name
    printing: HashMap<String, Subscription>,
}

impl Shell {
    fn new(client: Arc<Client>) -> Self {
        Self {
            client,
            printing: HashMap::new(),
        }
    }

    fn execute(&mut self, line: Line) {
        match line {
            Line::Empty | Line::Exit => {}
            Line::Target => println!("{}", self.client.url()),
            Line::Help(name) => self.help(name.as_deref()),
            Line::Call { method, params } => self.call(method, params),
        }
    }

    fn help(&self, name: Option<&str>) {
        let schema = self.client.schema();
        match name {
            None => {
                for domain in schema.domains() {
                    println!(
                        "{} ({} commands, {} events)",
                        domain.name,
                        domain.commands.len(),
                        domain.events.len()
                    );
                }
            }
            Some(name) => {
                if let Some(domain) = schema.domain(name) {
                    if let Some(description) = &domain.description {
                        println!("{}", description);
                    }
                    for command in domain.command_names() {
                        println!("  command {}.{}", domain.name, command);
                    }
                    for event in domain.event_names() {
                        println!("  event   {}.{}", domain.name, event);
                    }
                    return;
                }
                match self.client.help(name) {
                    Ok(item) => println!("{}", describe(item)),
                    Err(e) => eprintln!("{}", e),
                }
            }
        }
    }

    fn call(&mut self, method: String, params: Option<Value>) {
        let category = self.client.schema().lookup(&method).map(|item| item.category);
        match category {
            Some(Category::Command) => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    match client.send(&method, params, None).await {
                        Ok(result) => println!("{}", pretty(&result)),
                        Err(e) => eprintln!("{}", e),
                    }
                });
            }
            Some(Category::Event) if params.is_none() => self.toggle(&method),
            Some(Category::Event) => eprintln!("{} is an event and takes no params", method),
            Some(Category::Type) => self.help(Some(&method)),
            None => eprintln!("Unknown command or event '{}'", method),
        }
    }

    fn toggle(&mut self, method: &str) {
        if let Some(subscription) = self.printing.remove(method) {
            subscription.unsubscribe();
            println!("{}", pretty(&json!({ method: false })));
            return;
        }

        let name = method.to_string();
        let subscription = self.client.on(method, move |params| {
            println!("{}", pretty(&json!({ name.as_str(): params })));
        });
        self.printing.insert(method.to_string(), subscription);
        println!("{}", pretty(&json!({ method: true })));
    }
}

async fn prompt() -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(PROMPT.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// Run until `.exit` / EOF (`Ok(true)`) or an unexpected disconnect
/// (`Ok(false)`)
pub async fn run(client: Arc<Client>) -> Result<bool> {
    let mut notifications = client.notifications();
    if !client.is_open() {
        eprintln!("Disconnected.");
        return Ok(false);
    }

    let mut shell = Shell::new(client.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt().await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!();
                    break;
                };
                match parse_line(&line) {
                    Ok(Line::Exit) => break,
                    Ok(line) => shell.execute(line),
                    Err(e) => eprintln!("{}", e),
                }
                prompt().await?;
            }
            event = notifications.recv() => match event {
                Ok(event) if event.is_terminal() => {
                    eprintln!("Disconnected.");
                    return Ok(false);
                }
                Err(RecvError::Closed) => {
                    eprintln!("Disconnected.");
                    return Ok(false);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
    }

    client.close().await?;
    Ok(true)
}
