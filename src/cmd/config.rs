//! Configuration view and validation commands: `trellis config`.

use anyhow::Result;
use console::style;

use trellis::config::{TrellisConfig, TrellisToml};

use crate::ConfigCommands;

pub fn cmd_config(config: &TrellisConfig, command: Option<ConfigCommands>) -> Result<()> {
    let path = &config.config_path;

    match command.unwrap_or(ConfigCommands::Show) {
        ConfigCommands::Show => {
            println!();
            println!("Trellis Configuration");
            println!("=====================");
            println!();
            if path.exists() {
                println!("Config file: {}", path.display());
            } else {
                println!("Config file: {} {}", path.display(), style("(not found, using defaults)").dim());
            }
            println!();

            println!("[server]");
            println!("  api_url = \"{}\"", config.api_url());
            match config.ws_url() {
                Ok(ws) => println!("  ws_url = \"{}\"", ws),
                Err(e) => println!("  ws_url = {}", style(format!("<{}>", e)).red()),
            }
            println!();
            println!("[credentials]");
            println!("  path = \"{}\"", config.token_path().display());
            println!();
            println!("[http]");
            println!("  read_retries = {}", config.toml.http.read_retries);
            if let Some(agent) = &config.toml.http.user_agent {
                println!("  user_agent = \"{}\"", agent);
            }
            println!();
            let realtime = &config.toml.realtime;
            println!("[realtime]");
            println!("  initial_delay_ms = {}", realtime.initial_delay_ms);
            println!("  max_delay_ms = {}", realtime.max_delay_ms);
            println!("  multiplier = {}", realtime.multiplier);
            println!("  max_attempts = {}", realtime.max_attempts);
            println!();
            println!("[logging]");
            println!("  level = \"{}\"", config.log_filter());
            println!("  format = \"{}\"", config.toml.logging.format);
            if let Some(file) = &config.toml.logging.file {
                println!("  file = \"{}\"", file.display());
            }
            println!();
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }
            TrellisToml::default().save(path)?;
            println!("{} {}", style("Wrote").green(), path.display());
        }
        ConfigCommands::Validate => {
            if path.exists() {
                println!("Validating {}", path.display());
            } else {
                println!("No config file at {}, checking defaults", path.display());
            }
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("{}", style("Configuration is valid").green());
            } else {
                for warning in &warnings {
                    println!("{} {}", style("warning:").yellow(), warning);
                }
                anyhow::bail!("{} configuration problem(s) found", warnings.len());
            }
        }
    }
    Ok(())
}
