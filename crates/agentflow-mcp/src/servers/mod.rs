// ABOUTME: Example MCP servers the CLI can serve over stdio or HTTP.
// ABOUTME: Weather lookups, image loading and description, and an in-memory task list.

pub mod tasks;
pub mod vision;
pub mod weather;

pub use tasks::{TaskStore, tasks_server};
pub use vision::vision_server;
pub use weather::{GetWeatherTool, weather_server};
