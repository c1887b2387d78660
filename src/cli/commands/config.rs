//! Config Command
//!
//! Manage sqlquorum configuration.
//!
//! Usage:
//!   sqlquorum config show [-g] [-f json|yaml|toml]
//!   sqlquorum config path
//!   sqlquorum config init [--force]

use crate::config::ConfigLoader;
use crate::types::Result;

/// Show configuration
pub fn show(global: bool, format: &str) -> Result<()> {
    if global {
        match ConfigLoader::global_config_path() {
            Some(global_path) if global_path.exists() => {
                let content = std::fs::read_to_string(&global_path)?;
                println!("# Global Config: {}\n", global_path.display());
                println!("{}", content);
            }
            Some(_) => {
                println!("No global config found.");
                println!("Project config is created with 'sqlquorum config init'.");
            }
            None => println!("Cannot determine global config directory."),
        }
    } else {
        // Merged effective config
        let config = ConfigLoader::load()?;
        println!("{}", ConfigLoader::render(&config, format)?);
    }
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Initialize project configuration
pub fn init_project(force: bool) -> Result<()> {
    let config_path = ConfigLoader::init_project(force)?;
    println!("✓ Initialized project configuration");
    println!("  Config:    {}", config_path.display());
    Ok(())
}
