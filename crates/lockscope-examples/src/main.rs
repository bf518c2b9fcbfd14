use facet::Facet;
use figue as args;
use lockscope::{DotFile, GraphvizCommand, Renderer};
use std::path::PathBuf;

mod scenarios;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Directory the diagrams are written to.
    #[facet(args::named, default)]
    out_dir: Option<String>,
    /// Output format handed to Graphviz (`svg`, `png`, ...).
    #[facet(args::named, default)]
    format: Option<String>,
    /// Only write the DOT description; do not run Graphviz.
    #[facet(args::named, default)]
    dot_only: bool,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    Handoff,
    Contention,
    Timeout,
}

struct Config {
    out_dir: PathBuf,
    format: String,
    dot_only: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> AnyResult<()> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| h.description("Run a lockscope scenario and draw its lane diagram"))
        .build();
    let cli = args::Driver::new(figue_config)
        .run()
        .into_result()
        .map_err(|e| e.to_string())?
        .value;
    let cfg = config_from_cli(&cli);

    let mutex = match cli.command {
        CommandKind::Handoff => scenarios::handoff::run()?,
        CommandKind::Contention => scenarios::contention::run().await?,
        CommandKind::Timeout => scenarios::timeout::run()?,
    };

    std::fs::create_dir_all(&cfg.out_dir)
        .map_err(|e| format!("failed to create {}: {e}", cfg.out_dir.display()))?;

    let (renderer, extension): (Box<dyn Renderer>, &str) = if cfg.dot_only {
        (Box::new(DotFile), "dot")
    } else {
        (
            Box::new(GraphvizCommand::new().format(cfg.format.clone())),
            cfg.format.as_str(),
        )
    };
    let output = cfg.out_dir.join(format!("{}.{extension}", mutex.name()));
    mutex
        .render(renderer.as_ref(), &output)
        .map_err(|e| e.to_string())?;

    println!(
        "{} actions on {} written to {}",
        mutex.log().len(),
        mutex.name(),
        output.display()
    );
    Ok(())
}

fn config_from_cli(cli: &Cli) -> Config {
    let out_dir = cli
        .out_dir
        .clone()
        .or_else(|| std::env::var("LOCKSCOPE_OUT_DIR").ok())
        .unwrap_or_else(|| ".".to_owned());

    Config {
        out_dir: PathBuf::from(out_dir),
        format: cli.format.clone().unwrap_or_else(|| "svg".to_owned()),
        dot_only: cli.dot_only,
    }
}
