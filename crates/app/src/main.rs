use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_chat_core::config::{API_KEY_ENV, BASE_URL_ENV, MODEL_ENV};
use pdf_chat_core::{
    normalize_whitespace, CharacterNgramEmbedder, ChatConfig, ChatOrchestrator, ConfigError,
    DistanceMetric, DocumentIndexer, DocumentLoader, EmbeddingEndpoint, EmbeddingProvider,
    GroqChatModel, IndexOptions, IngestionOptions, LanguageModel, ProviderConfig, ProviderError,
    ProviderSettings, Role, SecretsFile, Session, UploadedDocument,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Groq API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Chat model identifier
    #[arg(long, env = MODEL_ENV)]
    model: Option<String>,

    /// OpenAI-compatible chat API base URL
    #[arg(long, env = BASE_URL_ENV)]
    base_url: Option<String>,

    /// TOML secrets file with a [GROQ] table; its values win over flags and env
    #[arg(long)]
    secrets: Option<PathBuf>,

    /// Timeout for every provider call, in seconds
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    /// Number of candidates requested per completion; the last one is shown
    #[arg(long, default_value = "1")]
    candidates: u8,

    /// Chunks retrieved per question
    #[arg(long, default_value = "3")]
    top_k: usize,

    /// Rephrase follow-up questions before retrieval
    #[arg(long, default_value_t = false)]
    condense_question: bool,

    /// Maximum chunk size in characters
    #[arg(long, default_value = "4000")]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,

    /// OpenAI-compatible embeddings base URL; the offline trigram embedder is used when unset
    #[arg(long, env = "EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Embedding model identifier
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "sentence-transformers/all-MiniLM-L6-v2")]
    embedding_model: String,

    /// Embedding endpoint API key
    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Vector length produced by the embedding model
    #[arg(long, default_value = "384")]
    embedding_dimensions: usize,

    /// Distance used to rank chunks
    #[arg(long, value_enum, default_value_t = Metric::L2)]
    metric: Metric,
}

#[derive(Clone, Copy, ValueEnum)]
enum Metric {
    L2,
    Cosine,
}

impl From<Metric> for DistanceMetric {
    fn from(value: Metric) -> Self {
        match value {
            Metric::L2 => DistanceMetric::L2,
            Metric::Cosine => DistanceMetric::Cosine,
        }
    }
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Interactive chat; optionally start with a PDF loaded.
    Chat {
        /// PDF to upload before the first question.
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    /// Ask a single question and print the answer.
    Ask {
        /// Question text
        #[arg(long)]
        question: String,
        /// PDF to ground the answer on.
        #[arg(long)]
        pdf: Option<PathBuf>,
        /// Print the retrieved chunks after the answer.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Load a PDF and print its chunks without contacting any provider.
    Inspect {
        #[arg(long)]
        pdf: PathBuf,
        /// Characters of each chunk to print.
        #[arg(long, default_value = "160")]
        preview_chars: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-chat boot"
    );

    let ingestion = IngestionOptions {
        chunk_max_chars: cli.chunk_size,
        chunk_overlap_chars: cli.chunk_overlap,
    };

    match cli.command.clone() {
        Command::Inspect { pdf, preview_chars } => {
            let loader = DocumentLoader::new(&ingestion).context("invalid chunking options")?;
            let upload = read_upload(&pdf).await?;
            let loaded = loader
                .load(&upload)
                .map_err(|error| anyhow::anyhow!(error.user_message()))?;

            println!(
                "{} page(s), {} chunk(s), document_id={}",
                loaded.fingerprint.page_count,
                loaded.chunks.len(),
                loaded.fingerprint.document_id
            );
            for chunk in &loaded.chunks {
                let preview = normalize_whitespace(&chunk.text)
                    .chars()
                    .take(preview_chars)
                    .collect::<String>();
                println!(
                    "[{}] page={} chars={} {}",
                    chunk.sequence_index,
                    chunk.page_number,
                    chunk.text.chars().count(),
                    preview
                );
            }
        }
        Command::Ask {
            question,
            pdf,
            show_sources,
        } => {
            let model = connect(&cli).await?;
            let orchestrator = ChatOrchestrator::new(model, chat_config(&cli)?);
            let indexer = build_indexer(&cli, &ingestion)?;
            let mut session = Session::new();

            if let Some(pdf) = pdf {
                upload(&mut session, &indexer, &pdf).await?;
            }

            let answer = session
                .ask(&question, &orchestrator)
                .await
                .map_err(|error| {
                    warn!(error = %error, "question failed");
                    anyhow::anyhow!(error.user_message())
                })?;

            println!("{}", answer.text);
            if show_sources {
                for hit in &answer.context.hits {
                    println!("--- source distance={:.4}\n{}", hit.score, hit.chunk_text);
                }
            }
        }
        Command::Chat { pdf } => {
            let model = connect(&cli).await?;
            let orchestrator = ChatOrchestrator::new(model, chat_config(&cli)?);
            let indexer = build_indexer(&cli, &ingestion)?;
            let mut session = Session::new();

            if let Some(pdf) = pdf {
                if let Err(error) = upload(&mut session, &indexer, &pdf).await {
                    eprintln!("{error}");
                }
            }

            run_repl(&mut session, &orchestrator, &indexer).await?;
        }
    }

    Ok(())
}

/// Resolves the credential and checks it against the provider. Any failure
/// here stops the process before a question can be asked.
async fn connect(cli: &Cli) -> anyhow::Result<Arc<GroqChatModel>> {
    let secrets = match &cli.secrets {
        Some(path) => Some(SecretsFile::load(path)?),
        None => None,
    };

    let settings = ProviderSettings {
        api_key: cli.api_key.clone(),
        model: cli.model.clone(),
        base_url: cli.base_url.clone(),
        timeout: Some(Duration::from_secs(cli.timeout_secs)),
        candidate_count: Some(cli.candidates),
    };

    let config = resolve_provider(settings, secrets.as_ref())?;
    let model = GroqChatModel::new(&config)?;
    verify_credential(&model).await?;

    info!(model = model.model(), "credential verified");
    Ok(Arc::new(model))
}

fn resolve_provider(
    settings: ProviderSettings,
    secrets: Option<&SecretsFile>,
) -> anyhow::Result<ProviderConfig> {
    ProviderConfig::resolve(settings, secrets).map_err(|error| match error {
        ConfigError::MissingCredential(variable) => anyhow::anyhow!(
            "{variable} missing: export it, add it to a .env file, or pass --secrets <file>"
        ),
        other => anyhow::Error::new(other),
    })
}

async fn verify_credential<M: LanguageModel>(model: &M) -> anyhow::Result<()> {
    model.verify().await.map_err(|error| match error {
        ProviderError::Authentication { provider, status } => {
            anyhow::Error::new(ConfigError::Authentication {
                provider,
                details: format!("status {status}"),
            })
        }
        other => anyhow::Error::new(other).context("could not validate the API credential"),
    })
}

fn chat_config(cli: &Cli) -> anyhow::Result<ChatConfig> {
    let config = ChatConfig {
        top_k: cli.top_k,
        condense_question: cli.condense_question,
        ..ChatConfig::default()
    };
    Ok(config.validate()?)
}

fn build_indexer(cli: &Cli, ingestion: &IngestionOptions) -> anyhow::Result<DocumentIndexer> {
    let loader = DocumentLoader::new(ingestion).context("invalid chunking options")?;

    let embedder: Arc<dyn EmbeddingProvider> = match &cli.embedding_url {
        Some(url) => {
            let endpoint = EmbeddingEndpoint {
                base_url: url.parse::<Url>().context("invalid --embedding-url")?,
                model: cli.embedding_model.clone(),
                api_key: cli.embedding_api_key.clone(),
                dimensions: cli.embedding_dimensions,
                timeout: Duration::from_secs(cli.timeout_secs),
            };
            Arc::new(pdf_chat_core::HttpEmbeddingProvider::new(endpoint)?)
        }
        None => {
            warn!("no embedding endpoint configured, using the offline trigram embedder");
            Arc::new(CharacterNgramEmbedder::default())
        }
    };

    Ok(DocumentIndexer::new(
        loader,
        embedder,
        IndexOptions {
            metric: cli.metric.into(),
            ..IndexOptions::default()
        },
    ))
}

async fn read_upload(path: &Path) -> anyhow::Result<UploadedDocument> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.pdf")
        .to_string();

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    let content_type = if is_pdf {
        "application/pdf"
    } else {
        "application/octet-stream"
    };

    Ok(UploadedDocument::new(file_name, bytes).with_content_type(content_type))
}

async fn upload(session: &mut Session, indexer: &DocumentIndexer, path: &Path) -> anyhow::Result<()> {
    let document = read_upload(path).await?;
    let summary = session.upload(&document, indexer).await.map_err(|error| {
        warn!(error = %error, path = %path.display(), "upload rejected");
        anyhow::anyhow!(error.user_message())
    })?;

    if summary.indexed_chunks == 0 {
        println!(
            "{} has no extractable text; questions will be answered without document context.",
            summary.document.file_name
        );
    } else {
        println!(
            "PDF indexed! {} chunk(s) from {}. Now ask questions about its content.",
            summary.indexed_chunks, summary.document.file_name
        );
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Quit,
    Reset,
    History,
    Upload(&'a str),
    Question(&'a str),
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if !line.starts_with('/') {
        return Input::Question(line);
    }

    let (command, argument) = match line.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" | "/exit" => Input::Quit,
        "/reset" => Input::Reset,
        "/history" => Input::History,
        "/upload" if !argument.is_empty() => Input::Upload(argument),
        _ => Input::Unknown(command),
    }
}

async fn run_repl<M: LanguageModel>(
    session: &mut Session,
    orchestrator: &ChatOrchestrator<M>,
    indexer: &DocumentIndexer,
) -> anyhow::Result<()> {
    println!("Ask a question, or use /upload <path>, /history, /reset, /quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Reset => {
                session.reset();
                println!("Conversation cleared.");
            }
            Input::History => print_history(session),
            Input::Upload(path) => {
                if let Err(error) = upload(session, indexer, Path::new(path)).await {
                    eprintln!("{error}");
                }
            }
            Input::Question(question) => match session.ask(question, orchestrator).await {
                Ok(answer) => println!("Bot: {}", answer.text),
                Err(error) => {
                    warn!(error = %error, retryable = error.is_retryable(), "question failed");
                    eprintln!("{}", error.user_message());
                }
            },
            Input::Unknown(command) => eprintln!("unknown command {command}"),
        }
    }

    Ok(())
}

fn print_history(session: &Session) {
    for turn in session.history() {
        match turn.role {
            Role::User => println!("You: {}", turn.content),
            Role::Assistant => println!("Bot: {}", turn.content),
            Role::System => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_input, resolve_provider, verify_credential, Input};
    use pdf_chat_core::{ConfigError, GroqChatModel, ProviderError, ProviderSettings, SecretsFile};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> ProviderSettings {
        ProviderSettings {
            api_key: Some("gsk-test".to_string()),
            base_url: Some(format!("{}/openai/v1", server.uri())),
            timeout: Some(Duration::from_millis(500)),
            ..ProviderSettings::default()
        }
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let error = resolve_provider(ProviderSettings::default(), None)
            .expect_err("no key configured");
        assert!(error.to_string().starts_with("GROQ_API_KEY missing"), "{error}");
    }

    #[test]
    fn secrets_file_supplies_the_credential() -> anyhow::Result<()> {
        let secrets = SecretsFile::parse("[GROQ]\napi_key = \"gsk-file\"\n")?;
        let config = resolve_provider(ProviderSettings::default(), Some(&secrets))?;
        assert_eq!(config.api_key, "gsk-file");
        Ok(())
    }

    #[tokio::test]
    async fn rejected_credential_stops_startup() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openai/v1/models"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let model = GroqChatModel::new(&resolve_provider(settings_for(&server), None)?)?;
        let error = verify_credential(&model).await.expect_err("403 must fail");

        assert!(matches!(
            error.downcast_ref::<ConfigError>(),
            Some(ConfigError::Authentication { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_provider_is_not_an_authentication_error() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openai/v1/models"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let model = GroqChatModel::new(&resolve_provider(settings_for(&server), None)?)?;
        let error = verify_credential(&model).await.expect_err("503 must fail");

        assert!(error.downcast_ref::<ConfigError>().is_none());
        assert!(matches!(
            error.downcast_ref::<ProviderError>(),
            Some(ProviderError::BackendResponse { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn accepted_credential_passes() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openai/v1/models"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let model = GroqChatModel::new(&resolve_provider(settings_for(&server), None)?)?;
        verify_credential(&model).await
    }

    #[test]
    fn plain_lines_are_questions() {
        assert_eq!(parse_input("  What is the total? "), Input::Question("What is the total?"));
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn slash_commands_are_recognised() {
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/reset"), Input::Reset);
        assert_eq!(parse_input("/history"), Input::History);
        assert_eq!(parse_input("/upload  docs/invoice.pdf "), Input::Upload("docs/invoice.pdf"));
        assert_eq!(parse_input("/upload"), Input::Unknown("/upload"));
        assert_eq!(parse_input("/nope"), Input::Unknown("/nope"));
    }
}
