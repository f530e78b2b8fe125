use clap::Parser;
use std::path::PathBuf;

/// qurl - run trigger events read from stdin through a configured HTTP request node
#[derive(Parser, Debug)]
#[command(name = "qurl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node id to run; optional when the config defines exactly one node
    #[arg(long)]
    node: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let app = match qurl::app::App::initialize(args.config, args.node.as_deref()) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("qurl: {}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = app.run_stdio().await {
        eprintln!("qurl: {}", err);
        std::process::exit(1);
    }
}
