use std::fs;
use std::io::{self, IsTerminal};
use tracing::info;

use super::{InputMode, TerminalClient, spawn_keyboard_reader, spawn_piped_reader};
use crate::client::adapter::{SystemClipboard, TerminalAdapter};
use crate::client::display::TerminalDisplay;
use crate::session::terminal::tty::RawModeGuard;
use crate::session::{SessionRegistry, TerminalId};
use crate::terminal::cli::RunArgs;
use crate::terminal::error::CliError;
use crate::transport::websocket::WebSocketConnector;

pub async fn run(server: &str, args: RunArgs) -> Result<(), CliError> {
    let config = args.to_config(server)?;
    let endpoint = config.endpoint()?;
    let source = fs::read_to_string(&args.file).map_err(|source| CliError::ReadSource {
        path: args.file.clone(),
        source,
    })?;

    let interactive = io::stdin().is_terminal() && io::stdout().is_terminal();
    info!(
        target: "workbook::client",
        %endpoint,
        file = %args.file.display(),
        terminal = %config.terminal_id,
        interactive,
        "starting run"
    );

    let connector = WebSocketConnector::new(config.websocket_options());
    let (mut registry, transport_rx) =
        SessionRegistry::new(connector, endpoint, config.chunk_limit);
    let terminal = TerminalId::new(config.terminal_id.clone());

    let _raw_guard = RawModeGuard::new(interactive);
    registry.register(terminal.clone(), TerminalDisplay::stdout());
    registry.run(&terminal, source)?;

    let (input, mode) = if interactive {
        (spawn_keyboard_reader()?, InputMode::Keyboard)
    } else {
        (spawn_piped_reader(io::stdin())?, InputMode::Piped)
    };

    let mut client = TerminalClient::new(
        registry,
        transport_rx,
        terminal,
        TerminalAdapter::new(SystemClipboard),
        mode,
    );
    client.run(input).await;
    Ok(())
}
