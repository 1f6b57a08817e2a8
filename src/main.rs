// ABOUTME: Entry point for the agentflow binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and runs one pattern, crew, MCP server or chat session.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::BufReader;

use agentflow::demos::{
    RunMode, StdinFeedback, ages_crew, ages_datasets, articles_crew, events_crew, run_for_each,
};
use agentflow::repl::{ChatSession, run_chat};
use agentflow_core::{ChatMessage, ChatRequest, FlowConfig, LlmClient, create_llm_client};
use agentflow_mcp::servers::{GetWeatherTool, TaskStore, tasks_server, vision_server, weather_server};
use agentflow_mcp::{McpServer, MultiServerClient, ServerConfig, ServersConfig, serve_http, serve_stdio};
use agentflow_patterns::chaining::{ChainOutcome, DocumentChain};
use agentflow_patterns::crew::CrewInputs;
use agentflow_patterns::evaluator::{TranslationLoop, TranslationSettings};
use agentflow_patterns::extract::{CourseFeedback, FEEDBACK_PROMPT, KnowledgeBaseAnswer, extract};
use agentflow_patterns::orchestrator::{MarketResearchOrchestrator, ResearchBrief};
use agentflow_patterns::parallel::RequestValidator;
use agentflow_patterns::routing::AgenticRouter;
use agentflow_patterns::tools::SerperSearchTool;

const DEFAULT_QUESTION: &str = "Which NFL organization can be called the greatest of all time?";

#[derive(Parser)]
#[command(name = "agentflow")]
#[command(about = "LLM orchestration patterns, crews and MCP tool agents", long_about = None)]
#[command(version)]
struct Cli {
    /// LLM provider: openai, anthropic or gemini (default: AGENTFLOW_DEFAULT_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model name (default: AGENTFLOW_DEFAULT_MODEL or the provider default)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the model a single question
    Ask { question: Option<String> },
    /// Outline, validate and write a document about a topic
    Chain { topic: String },
    /// Let the model pick a tool (temperature or knowledge base) to answer
    Route { query: String },
    /// Check a request for support relevance and prompt injection in parallel
    Validate { input: String },
    /// Translate text and refine it until an evaluator is satisfied
    Translate {
        text: String,
        /// Target language
        #[arg(long)]
        to: String,
        /// Source language
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Overall score (0-10) that ends the loop
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Plan, research and review a market research report
    Research {
        market: String,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        timeline: Option<String>,
    },
    /// Extract structured course feedback from free text
    Feedback { text: String },
    /// Answer a question from the knowledge base with its record id
    Kb { question: String },
    /// Run one of the bundled crews
    Crew {
        #[arg(value_enum)]
        which: CrewKind,
        /// Topic for the articles crew
        #[arg(long, default_value = "AI agents in software engineering")]
        topic: String,
        /// City for the events crew
        #[arg(long, default_value = "San Francisco")]
        city: String,
        /// How the ages crew works through its datasets
        #[arg(long, value_enum, default_value_t = RunMode::Sequential)]
        mode: RunMode,
    },
    /// Serve one of the example MCP servers
    Serve {
        #[arg(value_enum)]
        which: ServerKind,
        /// Listen for JSON-RPC over HTTP instead of stdio
        #[arg(long)]
        http: Option<SocketAddr>,
    },
    /// Chat with an agent that uses tools from MCP servers
    Chat {
        /// YAML file describing the servers
        #[arg(long, conflicts_with = "server", required_unless_present = "server")]
        config: Option<PathBuf>,
        /// Command (and arguments) of a single stdio server
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        server: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CrewKind {
    Articles,
    Events,
    Ages,
}

#[derive(Clone, Copy, ValueEnum)]
enum ServerKind {
    Weather,
    Vision,
    Tasks,
}

struct App {
    cli_provider: Option<String>,
    cli_model: Option<String>,
    config: FlowConfig,
}

impl App {
    fn llm(&self) -> Result<Arc<dyn LlmClient>> {
        let provider = self
            .cli_provider
            .clone()
            .unwrap_or_else(|| self.config.default_provider.clone());
        let model = self.cli_model.clone().or_else(|| self.config.default_model.clone());
        let (client, model) = create_llm_client(&provider, model.as_deref())?;
        tracing::info!(provider = %provider, model = %model, "using model");
        Ok(client)
    }

    fn serper(&self) -> Option<Arc<SerperSearchTool>> {
        let tool = self.config.serper_api_key.clone().map(|key| Arc::new(SerperSearchTool::new(key)));
        if tool.is_none() {
            tracing::warn!("SERPER_API_KEY not set, crews run without web search");
        }
        tool
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stderr keeps stdout free for the stdio MCP transport.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("agentflow=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = App {
        cli_provider: cli.provider,
        cli_model: cli.model,
        config: FlowConfig::from_env()?,
    };

    match cli.command {
        Commands::Ask { question } => {
            let question = question.unwrap_or_else(|| DEFAULT_QUESTION.to_string());
            let request = ChatRequest::new(vec![
                ChatMessage::system("You are a helpful assistant"),
                ChatMessage::user(question),
            ]);
            let response = app.llm()?.complete(&request).await?;
            println!("{}", response.text());
        }
        Commands::Chain { topic } => match DocumentChain::new(app.llm()?).run(&topic).await? {
            ChainOutcome::Completed { outline, document, .. } => {
                println!("Outline: {}", outline.sections.join(" | "));
                println!("\n# {}\n\n{}", document.title, document.full_content);
            }
            ChainOutcome::Rejected { validation, .. } => {
                println!(
                    "Outline rejected (confidence {:.2}): {}",
                    validation.confidence_score, validation.reasoning
                );
            }
        },
        Commands::Route { query } => {
            let router = AgenticRouter::with_default_tools(app.llm()?, &app.config.kb_path);
            let outcome = router.route(&query).await?;
            if let Some(tool) = &outcome.tool_used {
                println!("Tool: {} {}", tool, outcome.arguments.clone().unwrap_or_default());
            }
            println!("{}", outcome.answer);
        }
        Commands::Validate { input } => {
            let verdict = RequestValidator::new(app.llm()?).validate(&input).await?;
            println!(
                "support request: {} (confidence {:.2})",
                verdict.support.is_support_request, verdict.support.confidence_score
            );
            println!("safe: {} {:?}", verdict.security.is_safe, verdict.security.risk_flags);
            println!("valid: {}", verdict.valid);
        }
        Commands::Translate {
            text,
            to,
            from,
            max_iterations,
            threshold,
        } => {
            let mut settings = TranslationSettings::new(&to);
            if let Some(from) = &from {
                settings = settings.from_language(from);
            }
            if let Some(n) = max_iterations {
                settings = settings.with_max_iterations(n);
            }
            if let Some(t) = threshold {
                settings = settings.with_quality_threshold(t);
            }
            let report = TranslationLoop::new(app.llm()?, settings).run(&text).await?;
            for record in &report.iterations {
                println!(
                    "iteration {}: score {:.1}",
                    record.iteration, record.evaluation.overall_score
                );
            }
            println!(
                "\n{}\n\nfinal score {:.1} after {} iteration(s), threshold met: {}",
                report.final_translation, report.final_score, report.total_iterations, report.threshold_met
            );
        }
        Commands::Research {
            market,
            scope,
            context,
            timeline,
        } => {
            let mut brief = ResearchBrief::new(&market);
            if let Some(scope) = &scope {
                brief = brief.with_scope(scope);
            }
            if let Some(context) = &context {
                brief = brief.with_context(context);
            }
            if let Some(timeline) = &timeline {
                brief = brief.with_timeline(timeline);
            }
            let report = MarketResearchOrchestrator::new(app.llm()?).generate(&brief).await?;
            println!("## Executive summary\n\n{}\n", report.review.executive_summary);
            println!("{}", report.review.final_report);
        }
        Commands::Feedback { text } => {
            let feedback: CourseFeedback = extract(app.llm()?.as_ref(), FEEDBACK_PROMPT, &text).await?;
            println!("{}", serde_json::to_string_pretty(&feedback)?);
        }
        Commands::Kb { question } => {
            let kb = std::fs::read_to_string(&app.config.kb_path)
                .with_context(|| format!("reading {}", app.config.kb_path.display()))?;
            let system = format!(
                "You are a helpful assistant that answers questions from the knowledge base below.\n{}",
                kb
            );
            let answer: KnowledgeBaseAnswer = extract(app.llm()?.as_ref(), &system, &question).await?;
            println!("{} (record {})", answer.answer, answer.source);
        }
        Commands::Crew {
            which,
            topic,
            city,
            mode,
        } => run_crew(&app, which, &topic, &city, mode).await?,
        Commands::Serve { which, http } => {
            let server = Arc::new(match which {
                ServerKind::Weather => {
                    weather_server(GetWeatherTool::new(app.config.openweather_api_key.clone()))
                }
                ServerKind::Vision => vision_server(app.llm()?),
                ServerKind::Tasks => tasks_server(Arc::new(TaskStore::new())),
            });
            serve(server, http).await?;
        }
        Commands::Chat { config, server } => {
            let servers = match config {
                Some(path) => ServersConfig::load(&path)?,
                None => {
                    let Some((command, args)) = server.split_first() else {
                        bail!("either --config or --server is required");
                    };
                    ServersConfig::default().with_server(
                        "server",
                        ServerConfig::Stdio {
                            command: command.clone(),
                            args: args.to_vec(),
                            env: Default::default(),
                        },
                    )
                }
            };
            let servers = MultiServerClient::connect(&servers).await;
            let session = ChatSession::new(servers, app.llm()?, app.config.max_tool_steps).await?;
            run_chat(&session, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
        }
    }

    Ok(())
}

async fn serve(server: Arc<McpServer>, http: Option<SocketAddr>) -> Result<()> {
    tracing::info!(server = server.name(), "starting MCP server");
    match http {
        Some(addr) => serve_http(server, addr).await?,
        None => serve_stdio(server).await?,
    }
    Ok(())
}

async fn run_crew(app: &App, which: CrewKind, topic: &str, city: &str, mode: RunMode) -> Result<()> {
    let llm = app.llm()?;
    match which {
        CrewKind::Articles => {
            let crew = articles_crew(llm, app.serper(), Arc::new(StdinFeedback))?;
            let inputs = CrewInputs::from([("topic".to_string(), topic.into())]);
            println!("{}", crew.kickoff(&inputs).await?.raw);
        }
        CrewKind::Events => {
            let crew = events_crew(llm, app.serper())?;
            let inputs = CrewInputs::from([("city".to_string(), city.into())]);
            let output = crew.kickoff(&inputs).await?;
            for task in output.tasks_output.iter().filter(|t| t.skipped) {
                println!("(skipped: {})", task.description);
            }
            println!("{}", output.raw);
        }
        CrewKind::Ages => {
            let crew = Arc::new(ages_crew(llm)?);
            let outputs = run_for_each(crew, &ages_datasets(), mode).await?;
            for (i, output) in outputs.iter().enumerate() {
                println!("--- dataset {} ---\n{}\n", i + 1, output.raw);
            }
        }
    }
    Ok(())
}
