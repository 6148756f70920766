use rf_domain::config::{Config, ConfigSeverity};

/// Validate the config, printing any issues.
///
/// Returns false when at least one error was found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");

    error_count == 0
}

/// Render the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serializing config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate(&Config::default(), "config.toml"));
    }

    #[test]
    fn errors_fail_validation() {
        let mut cfg = Config::default();
        cfg.delivery.max_attempts = 0;
        assert!(!validate(&cfg, "config.toml"));
    }

    #[test]
    fn shown_config_parses_back() {
        let rendered = show(&Config::default()).unwrap();
        assert!(rendered.contains("[dispatch]"));
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.dispatch.default_agent_name, "assistant");
    }
}
