//! Ignore lists: exact URLs and hostnames that are never deduplicated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tabwarden_core::keys;
use tabwarden_store::Snapshot;

/// Which ignore list a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreKind {
    Url,
    Host,
}

impl IgnoreKind {
    /// Message `type` field: `url` or `host`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "url" => Some(Self::Url),
            "host" => Some(Self::Host),
            _ => None,
        }
    }

    /// Local store key of the list (`{type}s`).
    pub fn store_key(&self) -> &'static str {
        match self {
            Self::Url => keys::URLS,
            Self::Host => keys::HOSTS,
        }
    }
}

/// Both ignore lists. Neither ever holds a duplicate entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreLists {
    pub urls: Vec<String>,
    pub hosts: Vec<String>,
}

impl IgnoreLists {
    /// Load from a store snapshot. Missing keys give empty lists; non-string
    /// entries and repeats are dropped.
    pub fn from_store(stored: &Snapshot) -> Self {
        Self {
            urls: read_list(stored, keys::URLS),
            hosts: read_list(stored, keys::HOSTS),
        }
    }

    pub fn list(&self, kind: IgnoreKind) -> &[String] {
        match kind {
            IgnoreKind::Url => &self.urls,
            IgnoreKind::Host => &self.hosts,
        }
    }

    pub fn set_list(&mut self, kind: IgnoreKind, list: Vec<String>) {
        match kind {
            IgnoreKind::Url => self.urls = list,
            IgnoreKind::Host => self.hosts = list,
        }
    }

    /// Whether `url` itself or its host is ignored.
    pub fn is_ignored(&self, url: &str) -> bool {
        if self.urls.iter().any(|u| u == url) {
            return true;
        }
        match host_of(url) {
            Some(host) => self.hosts.iter().any(|h| *h == host),
            None => false,
        }
    }
}

fn read_list(stored: &Snapshot, key: &str) -> Vec<String> {
    let mut list: Vec<String> = Vec::new();
    if let Some(Value::Array(items)) = stored.get(key) {
        for item in items.iter().filter_map(Value::as_str) {
            if !list.iter().any(|existing| existing == item) {
                list.push(item.to_string());
            }
        }
    }
    list
}

/// The list after adding (`present = true`) or removing `value`, or `None`
/// when that would change nothing.
pub fn toggled(list: &[String], value: &str, present: bool) -> Option<Vec<String>> {
    let position = list.iter().position(|v| v == value);
    match (present, position) {
        (true, None) => {
            let mut next = list.to_vec();
            next.push(value.to_string());
            Some(next)
        }
        (false, Some(idx)) => {
            let mut next = list.to_vec();
            next.remove(idx);
            Some(next)
        }
        _ => None,
    }
}

/// Authority host of a URL, with the port when it is not the scheme default.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_toggled_add_and_remove() {
        let list = strings(&["a.com"]);
        assert_eq!(toggled(&list, "b.com", true), Some(strings(&["a.com", "b.com"])));
        assert_eq!(toggled(&list, "a.com", true), None);
        assert_eq!(toggled(&list, "a.com", false), Some(Vec::new()));
        assert_eq!(toggled(&list, "b.com", false), None);
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://example.com/a?b#c").as_deref(), Some("example.com"));
        assert_eq!(host_of("http://example.com:8080/").as_deref(), Some("example.com:8080"));
        assert_eq!(host_of("https://example.com:443/").as_deref(), Some("example.com"));
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn test_is_ignored() {
        let lists = IgnoreLists {
            urls: strings(&["https://news.example/today"]),
            hosts: strings(&["mail.example"]),
        };
        assert!(lists.is_ignored("https://news.example/today"));
        assert!(!lists.is_ignored("https://news.example/today?x=1"));
        assert!(lists.is_ignored("https://mail.example/inbox/1"));
        assert!(!lists.is_ignored("https://other.example/"));
        assert!(!lists.is_ignored("garbage"));
    }

    #[test]
    fn test_from_store_drops_repeats() {
        let mut stored = Snapshot::new();
        stored.insert("urls".into(), json!(["https://a/", "https://a/", 3]));
        let lists = IgnoreLists::from_store(&stored);
        assert_eq!(lists.urls, strings(&["https://a/"]));
        assert!(lists.hosts.is_empty());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(IgnoreKind::from_name("url").unwrap().store_key(), "urls");
        assert_eq!(IgnoreKind::from_name("host").unwrap().store_key(), "hosts");
        assert_eq!(IgnoreKind::from_name("domain"), None);
    }
}
