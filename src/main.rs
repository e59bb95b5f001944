use clap::Parser;
use lina::config::Config;
use lina::{cli, create, error, keygen, unpack};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "lina=warn";

fn main() {
    let cli = cli::Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{}: {err}", err.title());
        std::process::exit(1);
    }
}

fn run(cli: cli::Cli) -> error::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&cli, &config);

    match cli.command {
        cli::Command::Create(mut args) => {
            config.fill_output(&mut args.output);
            create::create(args).map(|_| ())
        }
        cli::Command::CreateAea(mut args) => {
            config.fill_create_aea(&mut args);
            create::create_aea(args).map(|_| ())
        }
        cli::Command::Extract(args) => unpack::extract(args).map(|_| ()),
        cli::Command::List(args) => unpack::list(args).map(|_| ()),
        cli::Command::Verify(args) => unpack::verify(args),
        cli::Command::Inspect(args) => unpack::inspect(args).map(|_| ()),
        cli::Command::Keygen(args) => keygen::keygen(args),
    }
}

fn init_tracing(cli: &cli::Cli, config: &Config) {
    let fallback = if cli.verbose {
        "lina=debug".to_string()
    } else {
        cli.log_level
            .clone()
            .or_else(|| config.log_level.clone())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string())
    };
    let filter = EnvFilter::try_from_env("LINA_LOG")
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
