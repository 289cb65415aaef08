//! Init command - first-run setup.

use crate::cli::Output;
use crate::config::Settings;
use console::style;

/// Run the init command for first-time setup.
pub fn run_init(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Kapitel Setup");
    println!();

    // Step 1: external tools
    println!("{}", style("Step 1: Checking prerequisites").bold().cyan());
    println!();

    let missing = missing_tools();
    if missing.is_empty() {
        Output::success("All required tools are installed!");
    } else {
        Output::warning("Some tools are missing. Please install them:");
        println!();
        for (name, hint) in &missing {
            println!("  {} {} - not found", style("x").red(), style(name).bold());
            println!("    {}", style(hint).dim());
        }
    }
    println!();

    // Step 2: API key
    println!(
        "{}",
        style("Step 2: Checking API configuration").bold().cyan()
    );
    println!();

    if std::env::var("OPENAI_API_KEY").is_err() {
        Output::warning("OPENAI_API_KEY environment variable is not set.");
        println!();
        println!("  Kapitel requires an OpenAI API key for transcription and embeddings.");
        println!("  Set it in your shell configuration (~/.bashrc, ~/.zshrc, etc.):");
        println!("  {}", style("export OPENAI_API_KEY='sk-...'").green());
    } else {
        Output::success("OpenAI API key is configured!");
    }
    println!();

    // Step 3: directories
    println!("{}", style("Step 3: Setting up directories").bold().cyan());
    println!();

    for dir in [settings.data_dir(), settings.temp_dir()] {
        if dir.exists() {
            Output::info(&format!("Directory exists: {}", dir.display()));
        } else {
            std::fs::create_dir_all(&dir)?;
            Output::success(&format!("Created directory: {}", dir.display()));
        }
    }
    println!();

    // Step 4: config file
    println!("{}", style("Step 4: Configuration file").bold().cyan());
    println!();

    let config_path = Settings::default_config_path();
    if config_path.exists() {
        Output::info(&format!("Config file exists: {}", config_path.display()));
    } else {
        settings.save_to(&config_path)?;
        Output::success(&format!("Created config file: {}", config_path.display()));
    }
    println!();

    println!("{}", style("Setup Complete!").bold().green());
    println!();
    println!("Next steps:");
    println!(
        "  {} Process your first video",
        style("kapitel process <file>").cyan()
    );
    println!(
        "  {} Search your library",
        style("kapitel search \"<query>\"").cyan()
    );

    Ok(())
}

/// Check for required external tools.
fn missing_tools() -> Vec<(&'static str, &'static str)> {
    use std::process::Command;

    let mut missing = Vec::new();

    if Command::new("ffmpeg").arg("-version").output().is_err() {
        missing.push(("ffmpeg", install_hint()));
    }
    if Command::new("ffprobe").arg("-version").output().is_err() {
        missing.push(("ffprobe", install_hint()));
    }

    missing
}

fn install_hint() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}
