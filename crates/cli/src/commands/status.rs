//! `streamgate status` — Show configuration summary.

use streamgate_config::AppConfig;

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;

    println!("StreamGate Status");
    println!("=================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Upstream:     {} ({})", config.upstream.endpoint, config.upstream.mode);
    println!("  Model:        {}", config.upstream.default_model);
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Memory:       {}", if config.memory.enabled { "enabled" } else { "disabled" });
    println!("  Memory dir:   {}", config.memory_dir().display());
    println!("  MCP:          {}", if config.mcp.enabled { "enabled" } else { "disabled" });
    println!("  Integration:  {}", config.mcp.integration_id);
    println!("  Patterns:     {}", config.patterns_path().display());
    println!("  Users:        {}", config.users.len());

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `streamgate onboard` first");
    }

    Ok(())
}
