//! `streamgate onboard` — First-time setup.

use streamgate_config::AppConfig;

pub async fn run() -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("StreamGate — First-Time Setup");
    println!("=============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let memory_dir = config_dir.join("memory");
    if !memory_dir.exists() {
        std::fs::create_dir_all(&memory_dir)?;
        println!("✅ Created memory directory: {}", memory_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        let default_toml = AppConfig::default_toml();
        std::fs::write(&config_path, &default_toml)?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Edit {} and point it at your inference server", config_path.display());
        println!("   2. Run: streamgate serve");
        println!("   3. Point your chat client at the gateway port\n");
    }

    println!("🎉 Setup complete! Run `streamgate serve` to start the gateway.\n");

    Ok(())
}
