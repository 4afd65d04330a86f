use crate::client::terminal::run;
use crate::terminal::cli::{Cli, Command};
use crate::terminal::error::CliError;

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let server = cli.server;

    match cli.command {
        Command::Run(args) => run::run(&server, args).await,
    }
}
