use cg_domain::config::{Config, ConfigSeverity};

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config) -> anyhow::Result<bool> {
    println!("cg-gateway doctor");
    println!("=================\n");

    let mut all_passed = true;

    check_config_validation(config, &mut all_passed);
    check_pool(config, &mut all_passed).await;
    check_tier_catalog(config, &mut all_passed);
    check_secret_key(config, &mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

async fn check_pool(config: &Config, all_passed: &mut bool) {
    let reachable = cg_store::ArtifactStore::connect(config.pool.clone()).await.is_ok();
    print_check(
        "Artifact store reachable",
        reachable,
        if reachable {
            config.pool.database_url.clone()
        } else {
            format!("{} (unreachable)", config.pool.database_url)
        },
    );
    if !reachable {
        *all_passed = false;
    }
}

fn check_tier_catalog(config: &Config, all_passed: &mut bool) {
    let catalog = config.load_tier_catalog();
    let ok = !catalog.tiers.is_empty();
    print_check(
        "Tier catalog loads",
        ok,
        format!("{} tier(s)", catalog.tiers.len()),
    );
    if !ok {
        *all_passed = false;
    }
}

fn check_secret_key(config: &Config, all_passed: &mut bool) {
    let present = std::env::var(&config.auth.secret_key_env)
        .map(|v| !v.is_empty())
        .unwrap_or(false);
    print_check(
        "Signing key present",
        present,
        if present {
            config.auth.secret_key_env.clone()
        } else {
            format!("{} not set", config.auth.secret_key_env)
        },
    );
    if !present {
        *all_passed = false;
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
