//! Spindle CLI
//!
//! Usage:
//!   spindle [OPTIONS] <ROOT> <VIEW>
//!
//! Options:
//!   -s, --settings <FILE>  Settings file (TOML format)
//!   -e, --emit <KIND>      What to print: nodes, chunks or render [default: chunks]
//!   -v, --verbose          Log compilation steps to stderr
//!   -d, --debug            Log everything, including render traces
//!   -h, --help             Print help

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use spindle::folder::ViewFolder;
use spindle::{dump_chunks, BasicEvaluator, Engine, Error, FileSystemViewFolder, Settings};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Emit {
    /// The parsed markup nodes
    Nodes,
    /// The compiled chunk tree
    Chunks,
    /// A reference rendering with an empty view data set
    Render,
}

#[derive(Parser)]
#[command(name = "spindle")]
#[command(about = "Compile Spark-style markup views")]
struct Cli {
    /// Root folder of the views
    root: PathBuf,

    /// View to compile, relative to the root
    view: String,

    /// Settings file (TOML format)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// What to print
    #[arg(short, long, value_enum, default_value = "chunks")]
    emit: Emit,

    /// Log compilation steps to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log everything, including render traces
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug {
        LevelFilter::TRACE
    } else if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.settings {
        Some(path) => match Settings::from_file(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error loading settings '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Settings::default(),
    };

    let folder: Arc<dyn ViewFolder> = Arc::new(FileSystemViewFolder::new(&cli.root));
    let engine = Engine::new(folder.clone(), settings);

    let output = match cli.emit {
        Emit::Nodes => emit_nodes(folder.as_ref(), &cli.view),
        Emit::Chunks => engine
            .compile(&cli.view)
            .map(|view| dump_chunks(view.chunks())),
        Emit::Render => engine.render_to_string(&cli.view, &BasicEvaluator::new()),
    };

    match output {
        Ok(text) => print!("{}", text),
        Err(Error::Grammar(e)) => {
            // the failing file may be a partial rather than the view itself
            let source = e.position().source();
            let file = source.file_name().unwrap_or(cli.view.as_str());
            eprintln!("{}", e.format(source.content(), file));
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn emit_nodes(folder: &dyn ViewFolder, view: &str) -> Result<String, Error> {
    let text = folder.open_view(view)?.read_to_string(view)?;
    let nodes = spindle::parse(&text)?;
    Ok(nodes.iter().map(|node| format!("{:?}\n", node)).collect())
}
