use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use querylens_agents::{RouterConfig, RoutingOrchestrator};
use querylens_core::{
    display_name, GenerationResult, IntentCatalog, ModelState, RequestEvent, RequestId,
    RequestState, RoutingDecision,
};
use querylens_ml::{
    default_embedder, generation_provider, GenerativeFallbackEngine, ModelHandle,
    SimilarityMatcher,
};
use querylens_observability::{init_tracing, RouterMetrics};
use querylens_storage::{DataSource, QueryExecutor, TabularResult};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DIGEST_ROWS: usize = 5;

#[derive(Debug, Parser)]
#[command(name = "querylens")]
#[command(about = "Routes analyst questions to report templates or a generative fallback")]
struct Cli {
    /// JSON intent catalog; the builtin fraud catalog is used when absent.
    #[arg(long, env = "QUERYLENS_CATALOG")]
    catalog: Option<PathBuf>,

    #[arg(long, env = "QUERYLENS_DATABASE_URL")]
    database_url: Option<String>,

    /// Base URL of an Ollama-compatible generation server.
    #[arg(long, env = "QUERYLENS_GENERATION_URL")]
    generation_url: Option<String>,

    /// Load the model on the first fallback request instead of at startup.
    #[arg(long)]
    lazy_model: bool,

    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat,
    Ask { question: String },
    Intents,
    Prompt { question: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("querylens_cli");
    let cli = Cli::parse();

    let catalog = match &cli.catalog {
        Some(path) => IntentCatalog::from_json_file(path)?,
        None => IntentCatalog::builtin()?,
    };

    if let Command::Intents = cli.command {
        return print_intents(&catalog, cli.json);
    }

    let mut session = Session::build(&cli, catalog).await?;

    match &cli.command {
        Command::Chat => session.run_chat().await?,
        Command::Ask { question } => {
            session.finish_warm_up().await?;
            let outcome = session.ask(question).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
            } else {
                println!("{}", outcome.render());
            }
        }
        Command::Prompt { question } => match session
            .orchestrator
            .fallback_prompt(question, session.last_digest.as_deref())
        {
            Some(prompt) => println!("{prompt}"),
            None => println!("no fallback engine configured"),
        },
        Command::Intents => {}
    }

    session.orchestrator.shutdown().await;
    Ok(())
}

fn print_intents(catalog: &IntentCatalog, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(catalog.list_intents())?);
        return Ok(());
    }
    for intent in catalog.list_intents() {
        println!("{} ({})", display_name(&intent.id), intent.id);
        for example in &intent.examples {
            println!("  - {example}");
        }
    }
    Ok(())
}

struct Session {
    orchestrator: RoutingOrchestrator,
    events: mpsc::UnboundedReceiver<RequestEvent>,
    data_source: Option<DataSource>,
    last_digest: Option<String>,
    warm_up: Option<JoinHandle<ModelState>>,
}

enum Outcome {
    Report {
        intent_id: String,
        score: f32,
        table: Option<TabularResult>,
        error: Option<String>,
    },
    Generated(GenerationResult),
    Unavailable,
    Ignored,
    EndSession,
}

impl Outcome {
    fn render(&self) -> String {
        match self {
            Outcome::Report {
                intent_id,
                table,
                error,
                ..
            } => {
                let title = display_name(intent_id);
                match (table, error) {
                    (Some(table), _) if table.is_empty() => format!("{title}: no rows"),
                    (Some(table), _) => format!("{title}\n{}", table.render()),
                    (None, Some(error)) => format!("{title}: {error}"),
                    (None, None) => format!("{title}: no data source configured"),
                }
            }
            Outcome::Generated(GenerationResult::Text(text)) => text.clone(),
            Outcome::Generated(GenerationResult::Error(message)) => {
                format!("could not answer: {message}")
            }
            Outcome::Unavailable => {
                "I couldn't match that to a report. Please try rephrasing your question."
                    .to_string()
            }
            Outcome::Ignored => String::new(),
            Outcome::EndSession => "bye".to_string(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Outcome::Report {
                intent_id,
                score,
                table,
                error,
            } => json!({
                "kind": "report",
                "intent_id": intent_id,
                "score": score,
                "table": table,
                "error": error,
            }),
            Outcome::Generated(result) => json!({ "kind": "generated", "result": result }),
            Outcome::Unavailable => json!({ "kind": "unavailable" }),
            Outcome::Ignored => json!({ "kind": "ignored" }),
            Outcome::EndSession => json!({ "kind": "end_session" }),
        }
    }
}

impl Session {
    async fn build(cli: &Cli, catalog: IntentCatalog) -> Result<Self> {
        let config = RouterConfig::from_env();
        let metrics = RouterMetrics::shared();
        let catalog = Arc::new(catalog);

        let matcher = SimilarityMatcher::new(catalog.clone(), default_embedder())
            .context("similarity matcher could not be built")?;
        let model = ModelHandle::shared(
            config.model_name.clone(),
            generation_provider(cli.generation_url.as_deref()),
        );
        let engine = GenerativeFallbackEngine::new(catalog, model);

        let data_source = match &cli.database_url {
            Some(url) => Some(DataSource::sqlite(url).await?),
            None => None,
        };

        let (orchestrator, events) =
            RoutingOrchestrator::start(matcher, Some(engine), config, metrics);
        let warm_up = if cli.lazy_model {
            None
        } else {
            orchestrator.warm_up()
        };

        Ok(Self {
            orchestrator,
            events,
            data_source,
            last_digest: None,
            warm_up,
        })
    }

    async fn finish_warm_up(&mut self) -> Result<Option<ModelState>> {
        match self.warm_up.take() {
            Some(warm_up) => Ok(Some(warm_up.await.context("model warm-up task failed")?)),
            None => Ok(None),
        }
    }

    async fn ask(&mut self, question: &str) -> Result<Outcome> {
        let decision = self
            .orchestrator
            .route(question, self.last_digest.as_deref())?;

        let outcome = match decision {
            None => Outcome::Ignored,
            Some(RoutingDecision::EndSession) => Outcome::EndSession,
            Some(RoutingDecision::Unavailable) => Outcome::Unavailable,
            Some(RoutingDecision::UseTemplate {
                intent_id,
                template,
                score,
            }) => {
                let (table, error) = match &self.data_source {
                    Some(source) => match source.execute(&template).await {
                        Ok(table) => (Some(table), None),
                        Err(err) => (None, Some(format!("{err:#}"))),
                    },
                    None => (None, None),
                };
                if let Some(table) = &table {
                    self.last_digest = table.digest(DIGEST_ROWS);
                }
                Outcome::Report {
                    intent_id,
                    score,
                    table,
                    error,
                }
            }
            Some(RoutingDecision::Delegate(handle)) => {
                eprintln!("thinking...");
                Outcome::Generated(self.wait_for(handle.id).await)
            }
        };
        Ok(outcome)
    }

    async fn wait_for(&mut self, id: RequestId) -> GenerationResult {
        while let Some(event) = self.events.recv().await {
            if event.id != id {
                continue;
            }
            if let RequestState::Completed(result) = event.state {
                return result;
            }
        }
        GenerationResult::Error("fallback worker stopped".to_string())
    }

    async fn run_chat(&mut self) -> Result<()> {
        println!("Querylens chat mode. type 'exit' to quit.");

        loop {
            print!("> ");
            io::stdout().flush()?;

            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                break;
            }

            let outcome = self.ask(&line).await?;
            match outcome {
                Outcome::Ignored => continue,
                Outcome::EndSession => break,
                other => println!("\n{}\n", other.render()),
            }
        }

        Ok(())
    }
}
