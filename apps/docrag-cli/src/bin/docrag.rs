use clap::Parser;

use docrag_cli::{logging, App, Cli};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let app = App::load()?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    app.run(cli.command, &mut out)
}
