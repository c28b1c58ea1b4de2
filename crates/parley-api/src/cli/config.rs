//! Show the broker configuration the other commands will use.

use anyhow::Result;
use console::style;

use crate::state::AppState;

/// Print the effective configuration as TOML, or JSON with `--json`.
pub fn show_config(state: &AppState, json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "data_dir": state.data_dir.display().to_string(),
            "config": state.config,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Config from").dim(),
        style(state.data_dir.join("config.toml").display()).cyan()
    );
    println!();
    print!("{}", toml::to_string_pretty(&state.config)?);
    println!();
    Ok(())
}
