use coinboard::config::Settings;
use coinboard::console::Command;
use coinboard::dashboard::{Dashboard, Sinks};
use coinboard::logging::*;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log = DEFAULT.new(o!("function" => "main"));
    info!(log, "Starting up");

    let settings = Settings::load();
    debug!(log, "settings loaded"; "settings" => ?settings);

    let dashboard = Dashboard::connect(settings, Sinks::console())?;
    dashboard.start();
    dashboard.load_overview().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(log, "interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(Command::Select(asset)) => dashboard.select(asset),
                    Ok(Command::Expand(key)) => {
                        let outcome = dashboard.expand(key).await;
                        info!(log, "expand"; "key" => %key, "outcome" => ?outcome);
                    }
                    Err(e) => warn!(log, "invalid command"; "line" => &line, "error" => %e),
                }
            }
        }
    }

    dashboard.stop();
    info!(log, "Shutting down");
    Ok(())
}
