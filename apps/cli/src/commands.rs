//! CLI command definitions, routing, and tracing setup.

use std::io::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use storyloom_core::{ChapterChoice, GenerationRequest, SessionController, assemble};
use storyloom_provider::OpenRouterClient;
use storyloom_shared::{
    AppConfig, BookId, config_file_path, expand_home, init_config, load_config, validate_api_key,
};
use storyloom_storage::Storage;

use crate::reader;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Storyloom — grow books with streamed AI generation sessions.
#[derive(Parser)]
#[command(
    name = "storyloom",
    version,
    about = "Write books segment by segment with streamed AI generation, and read them back page by page.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create a new book.
    New {
        /// Title of the book.
        title: String,
    },

    /// List all books in the library.
    List,

    /// Show a book's chapters.
    Chapters {
        /// Book ID.
        #[arg(long)]
        book: String,
    },

    /// Run one streamed generation session and commit the result.
    Write {
        /// Book ID.
        #[arg(long)]
        book: String,

        /// The prompt to continue the book with.
        #[arg(short, long)]
        prompt: String,

        /// System prompt (defaults to none).
        #[arg(long)]
        system: Option<String>,

        /// Open a new chapter for this segment.
        #[arg(long, conflicts_with = "chapter")]
        new_chapter: bool,

        /// Continue a specific chapter (1-based). Defaults to chapter 1.
        #[arg(long)]
        chapter: Option<u32>,

        /// Model override (defaults to the configured model).
        #[arg(long)]
        model: Option<String>,

        /// Sampling temperature override, 0 to 2.
        #[arg(long)]
        temperature: Option<f64>,

        /// Nucleus sampling override, 0 to 1.
        #[arg(long)]
        top_p: Option<f64>,

        /// Top-K mass override, 0 to 1.
        #[arg(long)]
        top_k: Option<f64>,

        /// Minimum probability override, 0 to 1.
        #[arg(long)]
        min_p: Option<f64>,

        /// Repeat penalty override, 0 to 10.
        #[arg(long)]
        repeat_penalty: Option<f64>,
    },

    /// Read a book in a paged terminal view.
    Read {
        /// Book ID.
        #[arg(long)]
        book: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "storyloom=info",
        1 => "storyloom=debug",
        _ => "storyloom=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::New { title } => cmd_new(&title).await,
        Command::List => cmd_list().await,
        Command::Chapters { book } => cmd_chapters(&book).await,
        Command::Write {
            book,
            prompt,
            system,
            new_chapter,
            chapter,
            model,
            temperature,
            top_p,
            top_k,
            min_p,
            repeat_penalty,
        } => {
            let overrides = SamplingOverrides {
                temperature,
                top_p,
                top_k,
                min_p,
                repeat_penalty,
            };
            cmd_write(
                &book,
                &prompt,
                system.as_deref(),
                new_chapter,
                chapter,
                model.as_deref(),
                overrides,
            )
            .await
        }
        Command::Read { book } => cmd_read(&book).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Resolve the library database path from config.
fn library_db_path(config: &AppConfig) -> Result<PathBuf> {
    let dir = expand_home(&config.defaults.data_dir)?;
    Ok(dir.join("library.db"))
}

/// Open storage at the configured library location.
async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = library_db_path(config)?;
    Ok(Storage::open(&path).await?)
}

/// Parse a book ID argument and check the book exists.
async fn resolve_book(storage: &Storage, book: &str) -> Result<storyloom_shared::Book> {
    let id = BookId::from_str(book).map_err(|e| eyre!("invalid book ID '{book}': {e}"))?;
    storage
        .get_book(&id)
        .await?
        .ok_or_else(|| eyre!("no book with ID '{book}' — see `storyloom list`"))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_new(title: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    let book = storage
        .create_book(title, &config.defaults.author_id)
        .await?;

    info!(book_id = %book.id, title, "book created");
    println!();
    println!("  Created \"{}\"", book.title);
    println!("  ID: {}", book.id);
    println!();
    println!("  Start writing with:");
    println!("    storyloom write --book {} --prompt \"...\"", book.id);
    println!();
    Ok(())
}

async fn cmd_list() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    let books = storage.list_books().await?;
    if books.is_empty() {
        println!("No books yet. Create one with `storyloom new <title>`.");
        return Ok(());
    }

    println!();
    for book in &books {
        let segments = storage.list_segments(&book.id).await?;
        let chapters = assemble(&segments);
        println!(
            "  {}  {:<40}  {} chapters, {} segments",
            book.id,
            book.title,
            chapters.len(),
            segments.len()
        );
    }
    println!();
    Ok(())
}

async fn cmd_chapters(book: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let book = resolve_book(&storage, book).await?;

    let segments = storage.list_segments(&book.id).await?;
    let chapters = assemble(&segments);

    println!();
    println!("  {}", book.title);
    if chapters.is_empty() {
        println!("  (no chapters yet)");
    }
    for chapter in &chapters {
        let words: usize = chapter
            .segments
            .iter()
            .map(|s| s.text.split_whitespace().count())
            .sum();
        println!(
            "  {:>3}. {:<40}  {} segments, {} words",
            chapter.chapter_no,
            chapter.title,
            chapter.segments.len(),
            words
        );
    }
    println!();
    Ok(())
}

/// CLI-side sampling overrides layered over the configured defaults.
struct SamplingOverrides {
    temperature: Option<f64>,
    top_p: Option<f64>,
    top_k: Option<f64>,
    min_p: Option<f64>,
    repeat_penalty: Option<f64>,
}

async fn cmd_write(
    book: &str,
    prompt: &str,
    system: Option<&str>,
    new_chapter: bool,
    chapter: Option<u32>,
    model: Option<&str>,
    overrides: SamplingOverrides,
) -> Result<()> {
    // Validate API key before doing anything
    let config = load_config()?;
    validate_api_key(&config)?;

    let storage = open_storage(&config).await?;
    let book = resolve_book(&storage, book).await?;

    let mut params = config.sampling;
    if let Some(v) = overrides.temperature {
        params.temperature = v;
    }
    if let Some(v) = overrides.top_p {
        params.top_p = v;
    }
    if let Some(v) = overrides.top_k {
        params.top_k = v;
    }
    if let Some(v) = overrides.min_p {
        params.min_p = v;
    }
    if let Some(v) = overrides.repeat_penalty {
        params.repeat_penalty = v;
    }

    let request = GenerationRequest {
        prompt: prompt.to_string(),
        system_prompt: system.unwrap_or_default().to_string(),
        model: model
            .map(String::from)
            .unwrap_or_else(|| config.openrouter.default_model.clone()),
        params,
    };
    let choice = ChapterChoice {
        new_chapter,
        current_chapter: chapter,
    };

    let api_key = std::env::var(&config.openrouter.api_key_env).unwrap_or_default();
    let generator = OpenRouterClient::new(&api_key)?;
    let controller = SessionController::new(
        &storage,
        &storage,
        book.id.clone(),
        config.defaults.author_id.clone(),
    );

    info!(book_id = %book.id, model = %request.model, new_chapter, "starting generation session");

    // A session runs for the lifetime of this command; this process is the
    // "generation in progress" guard — no second session can start under it.
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("static template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message("Waiting for the first words...");

    let mut streaming = false;
    let outcome = controller
        .run(&generator, &request, choice, |delta| {
            if !streaming {
                spinner.finish_and_clear();
                streaming = true;
            }
            print!("{delta}");
            let _ = std::io::stdout().flush();
        })
        .await;
    if !streaming {
        spinner.finish_and_clear();
    }
    let outcome = outcome?;

    println!();
    println!();
    println!("  Committed to \"{}\"", book.title);
    println!("  Chapter:  {} ({})", outcome.segment.chapter_no, outcome.segment.title);
    println!("  Segment:  #{}", outcome.segment.sequence_no);
    println!(
        "  Length:   {} words",
        outcome.segment.text.split_whitespace().count()
    );
    if !outcome.record_persisted {
        println!("  Note: the generation audit record could not be written.");
    }
    println!();
    Ok(())
}

async fn cmd_read(book: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let book = resolve_book(&storage, book).await?;

    let segments = storage.list_segments(&book.id).await?;
    let chapters = assemble(&segments);
    if chapters.is_empty() {
        println!("\"{}\" has no text yet. Write some with `storyloom write`.", book.title);
        return Ok(());
    }

    reader::read_book(&book.title, &chapters, config.defaults.page_turn_ms).await
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Created config file at {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let path = config_file_path()?;

    println!("# resolved config ({})", path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
