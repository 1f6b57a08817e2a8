// ABOUTME: Library half of the agentflow binary: ready-made crews and the MCP chat session.
// ABOUTME: main.rs only parses arguments and does terminal I/O around these.

pub mod demos;
pub mod repl;
