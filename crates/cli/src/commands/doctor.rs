//! `streamgate doctor` — Diagnose gateway health.

use streamgate_config::AppConfig;
use streamgate_upstream::UpstreamClient;

pub async fn run() -> anyhow::Result<()> {
    println!("🩺 StreamGate Doctor — Diagnostics");
    println!("==================================\n");

    let mut issues = 0;

    // Check config
    let config_path = AppConfig::config_dir().join("config.toml");
    let config = if config_path.exists() {
        match AppConfig::load() {
            Ok(config) => {
                println!("  ✅ Config file valid");
                Some(config)
            }
            Err(e) => {
                println!("  ❌ Config file invalid: {e}");
                issues += 1;
                None
            }
        }
    } else {
        println!("  ⚠️  No config file — run `streamgate onboard` (using defaults)");
        Some(AppConfig::default())
    };

    if let Some(config) = config {
        // Check the upstream server
        let upstream = UpstreamClient::new(
            config.upstream.normalized_endpoint(),
            config.upstream.effective_token(),
        );
        if upstream.reachable().await {
            println!("  ✅ Upstream reachable at {}", upstream.endpoint());
        } else {
            println!(
                "  ❌ Upstream not reachable at {} — is the inference server running?",
                upstream.endpoint()
            );
            issues += 1;
        }

        // Check the memory directory
        let memory_dir = config.memory_dir();
        if memory_dir.exists() {
            println!("  ✅ Memory directory exists");
        } else if config.memory.enabled {
            match std::fs::create_dir_all(&memory_dir) {
                Ok(()) => println!("  ✅ Memory directory created"),
                Err(e) => {
                    println!("  ❌ Cannot create memory directory: {e}");
                    issues += 1;
                }
            }
        } else {
            println!("  ℹ️  Memory disabled, directory check skipped");
        }

        // Check the learned-pattern store
        let patterns_path = config.patterns_path();
        if patterns_path.exists() {
            println!("  ✅ Learned patterns file present");
        } else {
            println!("  ℹ️  No learned patterns yet (created on first detection miss)");
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
