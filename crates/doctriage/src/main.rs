use crate::prelude::*;
use clap::Parser;
use std::path::PathBuf;

mod analyze;
mod dispatch;
mod error;
mod loader;
mod mcp;
mod ocr;
mod prelude;
mod session;
mod text;
mod validate;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Pre-screen scanned PDF documents with fast heuristics before sending them to a vision model"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// TOML file with heuristic thresholds
    #[clap(long, env = "DOCTRIAGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Rasterization resolution (overrides the config file)
    #[clap(long, env = "DOCTRIAGE_DPI", global = true)]
    dpi: Option<u32>,

    /// Deadline for one analysis request, in milliseconds
    #[clap(long, env = "DOCTRIAGE_TIMEOUT_MS", global = true)]
    timeout_ms: Option<u64>,

    /// Tesseract executable
    #[clap(long, env = "TESSERACT_CMD", global = true, default_value = "tesseract")]
    tesseract: String,

    /// Tesseract language list
    #[clap(long, env = "TESSERACT_LANG", global = true, default_value = "eng+fra")]
    ocr_lang: String,

    /// Never run OCR; pages without a text layer read as empty.
    #[clap(long, env = "DOCTRIAGE_NO_OCR", global = true, default_value = "false")]
    no_ocr: bool,

    /// Whether to display additional information.
    #[clap(long, env = "DOCTRIAGE_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Run triage heuristics on a PDF
    Analyze(crate::analyze::AnalyzeOptions),

    /// List the available heuristic tools
    Tools,

    /// Print the text of each page
    Text(crate::text::TextOptions),

    /// Search page text with a regular expression
    Search(crate::text::SearchOptions),

    /// Validate Canadian identifiers
    Validate(crate::validate::App),

    /// Model Context Protocol server
    MCP(crate::mcp::App),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Analyze(options) => crate::analyze::run(options, app.global).await,
        SubCommands::Tools => crate::analyze::list_tools(),
        SubCommands::Text(options) => crate::text::run_text(options, app.global).await,
        SubCommands::Search(options) => crate::text::run_search(options, app.global).await,
        SubCommands::Validate(sub_app) => crate::validate::run(sub_app),
        SubCommands::MCP(sub_app) => crate::mcp::run(sub_app, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
