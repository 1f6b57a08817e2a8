// ABOUTME: Parses the chat REPL's slash commands and formats prompt/resource listings for display.
// ABOUTME: Prompt arguments use shell-style quoting so values may contain spaces.

use std::collections::HashMap;

use crate::protocol::{PromptInfo, ResourceInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    Empty,
    ListPrompts,
    ListResources,
    Prompt {
        server: Option<String>,
        name: String,
        args: Vec<String>,
    },
    Resource {
        server: String,
        uri: String,
    },
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(String),

    #[error("could not parse command: {0}")]
    Quote(String),

    #[error("{0}")]
    Arguments(String),
}

const PROMPT_USAGE_SINGLE: &str = "/prompt <prompt_name> \"arg1\" \"arg2\" ...";
const PROMPT_USAGE_MULTI: &str = "/prompt <server_name> <prompt_name> \"arg1\" \"arg2\" ...";
const RESOURCE_USAGE: &str = "/resource <server_name> <resource_uri>";

pub fn prompt_usage(multi_server: bool) -> &'static str {
    if multi_server {
        PROMPT_USAGE_MULTI
    } else {
        PROMPT_USAGE_SINGLE
    }
}

pub fn help_text(multi_server: bool) -> String {
    let mut lines = vec![
        "Type a question, or use one of the following commands:".to_string(),
        "  /prompts                  list available prompts".to_string(),
        format!("  {:<25} run a specific prompt", prompt_usage(multi_server)),
    ];
    if multi_server {
        lines.push("  /resources                list available resources".to_string());
        lines.push(format!("  {:<25} load a resource for the agent", RESOURCE_USAGE));
    }
    lines.push("  exit | quit | q           leave".to_string());
    lines.join("\n")
}

pub fn parse_command(input: &str, multi_server: bool) -> Result<ReplCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if trimmed.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    if matches!(lower.as_str(), "exit" | "quit" | "q") {
        return Ok(ReplCommand::Exit);
    }
    if lower == "/prompts" {
        return Ok(ReplCommand::ListPrompts);
    }
    if lower == "/resources" {
        return Ok(ReplCommand::ListResources);
    }

    if trimmed == "/prompt" || trimmed.starts_with("/prompt ") {
        let mut parts = shell_split(trimmed)?.into_iter().skip(1);
        let server = if multi_server { parts.next() } else { None };
        if multi_server && server.is_none() {
            return Err(CommandError::Usage(PROMPT_USAGE_MULTI.to_string()));
        }
        let name = parts
            .next()
            .ok_or_else(|| CommandError::Usage(prompt_usage(multi_server).to_string()))?;
        return Ok(ReplCommand::Prompt {
            server,
            name,
            args: parts.collect(),
        });
    }

    if trimmed == "/resource" || trimmed.starts_with("/resource ") {
        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(CommandError::Usage(RESOURCE_USAGE.to_string()));
        }
        return Ok(ReplCommand::Resource {
            server: parts[1].to_string(),
            uri: parts[2].to_string(),
        });
    }

    Ok(ReplCommand::Message(trimmed.to_string()))
}

/// Split like a POSIX shell: whitespace separates words, single quotes are
/// literal, double quotes allow `\"` and `\\`, and a bare backslash escapes
/// the next character.
pub fn shell_split(input: &str) -> Result<Vec<String>, CommandError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(CommandError::Quote("No closing quotation".to_string())),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(esc @ ('"' | '\\')) => current.push(esc),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => {
                                return Err(CommandError::Quote("No closing quotation".to_string()));
                            }
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(CommandError::Quote("No closing quotation".to_string())),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err(CommandError::Quote("No escaped character".to_string())),
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Pair positional values with the prompt's declared argument names.
pub fn bind_prompt_arguments(
    prompt: &PromptInfo,
    args: &[String],
) -> Result<HashMap<String, String>, CommandError> {
    if args.len() != prompt.arguments.len() {
        let names: Vec<&str> = prompt.arguments.iter().map(|a| a.name.as_str()).collect();
        return Err(CommandError::Arguments(format!(
            "Invalid number of arguments for prompt '{}'. Expected {} arguments: {}",
            prompt.name,
            names.len(),
            names.join(", ")
        )));
    }
    Ok(prompt
        .arguments
        .iter()
        .zip(args)
        .map(|(a, v)| (a.name.clone(), v.clone()))
        .collect())
}

/// Turn loaded resource text into the message sent to the agent. With an
/// action the content becomes context for that task; without one the agent
/// is asked to remember it.
pub fn resource_message(content: &str, action: Option<&str>) -> String {
    match action.map(str::trim).filter(|a| !a.is_empty()) {
        Some(action) => format!(
            "CONTEXT from a loaded resource:\n-----\n{}\n-----\nTASK: {}",
            content, action
        ),
        None => format!(
            "Please remember the following context for our conversation. \
             Just acknowledge that you have received it.\n-----\nCONTEXT:\n{}\n-----",
            content
        ),
    }
}

pub fn format_prompt_listing(listings: &[(String, Vec<PromptInfo>)], multi_server: bool) -> String {
    let mut out = vec!["Available prompts:".to_string()];
    let mut any = false;

    for (server, prompts) in listings {
        if prompts.is_empty() {
            continue;
        }
        any = true;
        if multi_server {
            out.push(format!("--- Server: '{}' ---", server));
        }
        for p in prompts {
            out.push(format!("  Prompt: {}", p.name));
            if p.arguments.is_empty() {
                out.push("    Arguments: None".to_string());
            } else {
                let names: Vec<String> = p.arguments.iter().map(|a| format!("<{}>", a.name)).collect();
                out.push(format!("    Arguments: {}", names.join(" ")));
            }
        }
    }

    if !any {
        return "No prompts were found on any connected servers.".to_string();
    }
    out.push(format!("Usage: {}", prompt_usage(multi_server)));
    out.join("\n")
}

pub fn format_resource_listing(listings: &[(String, Vec<ResourceInfo>)]) -> String {
    let mut out = vec!["Available resources:".to_string()];
    let mut any = false;

    for (server, resources) in listings {
        if resources.is_empty() {
            continue;
        }
        any = true;
        out.push(format!("--- Server: '{}' ---", server));
        for r in resources {
            out.push(format!("  Resource: {}", r.uri));
            if let Some(description) = &r.description {
                out.push(format!("    Description: {}", description));
            }
        }
    }

    if !any {
        return "No resources were found on any connected servers.".to_string();
    }
    out.push(format!("Usage: {}", RESOURCE_USAGE));
    out.join("\n")
}
