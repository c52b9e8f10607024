use serde_with::{serde_as, DurationMilliSeconds};
use tokio::time::Duration;

pub(crate) const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(500);
pub(crate) const DEFAULT_SUBSCRIPTION_MARKER: &str = "_subscription";

#[serde_as]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProviderOptions {
    /// Period of the `create` re-send loop while disconnected.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reconnect_interval: Duration,
    /// Substring of a method name that marks a subscription push.
    pub subscription_marker: String,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            subscription_marker: DEFAULT_SUBSCRIPTION_MARKER.to_string(),
        }
    }
}

impl ProviderOptions {
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn subscription_marker<S: Into<String>>(mut self, marker: S) -> Self {
        self.subscription_marker = marker.into();
        self
    }
}

/// Where the WebSocket bridge finds the host, and the origin the page
/// reports for itself.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ConnectionMeta {
    pub url: String,
    pub origin: Option<String>,
}

impl ConnectionMeta {
    pub fn new(url: &str, origin: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            origin: origin.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_the_host_contract() {
        let options = ProviderOptions::default();
        assert_eq!(options.reconnect_interval, Duration::from_millis(500));
        assert_eq!(options.subscription_marker, "_subscription");
    }

    #[test]
    fn reads_kebab_case_config_with_defaults() {
        let options: ProviderOptions =
            serde_json::from_value(json!({"reconnect-interval": 250})).unwrap();
        assert_eq!(options.reconnect_interval, Duration::from_millis(250));
        assert_eq!(options.subscription_marker, "_subscription");

        let back = serde_json::to_value(&options).unwrap();
        assert_eq!(back["reconnect-interval"], json!(250));
    }
}
