use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub json_logs: bool,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str) -> Self {
        Self::from_lookup(default_service_name, |name| env::var(name).ok())
    }

    pub fn from_lookup(
        default_service_name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let service_name = lookup("OTEL_SERVICE_NAME")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_service_name.to_string());
        let json_logs = lookup("LOG_FORMAT")
            .map(|v| !matches!(v.to_lowercase().as_str(), "text" | "pretty" | "plain"))
            .unwrap_or(true);

        Self {
            service_name,
            json_logs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_the_default_format() {
        let cfg = TelemetryConfig::from_lookup("tnb-registry", |_| None);
        assert_eq!(cfg.service_name, "tnb-registry");
        assert!(cfg.json_logs);
    }

    #[test]
    fn plain_formats_and_service_override() {
        let cfg = TelemetryConfig::from_lookup("tnb-registry", |name| match name {
            "LOG_FORMAT" => Some("Pretty".into()),
            "OTEL_SERVICE_NAME" => Some("notifier".into()),
            _ => None,
        });
        assert_eq!(cfg.service_name, "notifier");
        assert!(!cfg.json_logs);
    }
}
