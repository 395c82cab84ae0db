//! The option record: every boolean the engine reads, with hard-coded defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of a configuration option as stored in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKey {
    Turnoff,
    Old,
    Active,
    Start,
    Replace,
    Update,
    Create,
    Attach,
    Datachange,
    Http,
    Query,
    Hash,
    Incognito,
    Windows,
    Containers,
}

impl OptionKey {
    pub fn all() -> &'static [OptionKey] {
        &[
            Self::Turnoff,
            Self::Old,
            Self::Active,
            Self::Start,
            Self::Replace,
            Self::Update,
            Self::Create,
            Self::Attach,
            Self::Datachange,
            Self::Http,
            Self::Query,
            Self::Hash,
            Self::Incognito,
            Self::Windows,
            Self::Containers,
        ]
    }

    /// Flags whose combined falsity disables the engine.
    pub fn triggers() -> &'static [OptionKey] {
        &[
            Self::Start,
            Self::Replace,
            Self::Update,
            Self::Create,
            Self::Attach,
            Self::Datachange,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Turnoff => "turnoff",
            Self::Old => "old",
            Self::Active => "active",
            Self::Start => "start",
            Self::Replace => "replace",
            Self::Update => "update",
            Self::Create => "create",
            Self::Attach => "attach",
            Self::Datachange => "datachange",
            Self::Http => "http",
            Self::Query => "query",
            Self::Hash => "hash",
            Self::Incognito => "incognito",
            Self::Windows => "windows",
            Self::Containers => "containers",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for OptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Engine configuration. Always carries every known key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub turnoff: bool,
    pub old: bool,
    pub active: bool,
    pub start: bool,
    pub replace: bool,
    pub update: bool,
    pub create: bool,
    pub attach: bool,
    pub datachange: bool,
    pub http: bool,
    pub query: bool,
    pub hash: bool,
    pub incognito: bool,
    pub windows: bool,
    pub containers: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            turnoff: false,
            old: true,
            active: true,
            start: true,
            replace: true,
            update: true,
            create: true,
            attach: true,
            datachange: true,
            http: true,
            query: true,
            hash: false,
            incognito: false,
            windows: true,
            containers: true,
        }
    }
}

impl Options {
    /// Build from a raw store snapshot. Missing or non-boolean values keep
    /// their default.
    pub fn from_store(stored: &BTreeMap<String, Value>) -> Self {
        let mut options = Self::default();
        for key in OptionKey::all() {
            if let Some(value) = stored.get(key.name()).and_then(Value::as_bool) {
                options.set(*key, value);
            }
        }
        options
    }

    pub fn get(&self, key: OptionKey) -> bool {
        match key {
            OptionKey::Turnoff => self.turnoff,
            OptionKey::Old => self.old,
            OptionKey::Active => self.active,
            OptionKey::Start => self.start,
            OptionKey::Replace => self.replace,
            OptionKey::Update => self.update,
            OptionKey::Create => self.create,
            OptionKey::Attach => self.attach,
            OptionKey::Datachange => self.datachange,
            OptionKey::Http => self.http,
            OptionKey::Query => self.query,
            OptionKey::Hash => self.hash,
            OptionKey::Incognito => self.incognito,
            OptionKey::Windows => self.windows,
            OptionKey::Containers => self.containers,
        }
    }

    pub fn set(&mut self, key: OptionKey, value: bool) {
        let slot = match key {
            OptionKey::Turnoff => &mut self.turnoff,
            OptionKey::Old => &mut self.old,
            OptionKey::Active => &mut self.active,
            OptionKey::Start => &mut self.start,
            OptionKey::Replace => &mut self.replace,
            OptionKey::Update => &mut self.update,
            OptionKey::Create => &mut self.create,
            OptionKey::Attach => &mut self.attach,
            OptionKey::Datachange => &mut self.datachange,
            OptionKey::Http => &mut self.http,
            OptionKey::Query => &mut self.query,
            OptionKey::Hash => &mut self.hash,
            OptionKey::Incognito => &mut self.incognito,
            OptionKey::Windows => &mut self.windows,
            OptionKey::Containers => &mut self.containers,
        };
        *slot = value;
    }

    /// Flat key-value form, as written on first run.
    pub fn to_entries(&self) -> BTreeMap<String, Value> {
        OptionKey::all()
            .iter()
            .map(|k| (k.name().to_string(), Value::Bool(self.get(*k))))
            .collect()
    }

    /// Fully off: explicit turnoff, or no trigger left enabled.
    pub fn is_disabled(&self) -> bool {
        self.turnoff || OptionKey::triggers().iter().all(|k| !self.get(*k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert!(!options.turnoff);
        assert!(options.old);
        assert!(!options.hash);
        assert!(!options.incognito);
        assert!(!options.is_disabled());
        assert_eq!(options.to_entries().len(), OptionKey::all().len());
    }

    #[test]
    fn test_from_store_falls_back_to_defaults() {
        let mut stored = BTreeMap::new();
        stored.insert("hash".to_string(), json!(true));
        stored.insert("old".to_string(), json!("yes"));
        stored.insert("urls".to_string(), json!(["https://a.com/"]));

        let options = Options::from_store(&stored);
        assert!(options.hash);
        // Non-boolean value keeps the default
        assert!(options.old);
        assert!(options.windows);
    }

    #[test]
    fn test_disabled_when_all_triggers_off() {
        let mut options = Options::default();
        for key in OptionKey::triggers() {
            options.set(*key, false);
        }
        assert!(options.is_disabled());

        options.set(OptionKey::Attach, true);
        assert!(!options.is_disabled());

        options.set(OptionKey::Turnoff, true);
        assert!(options.is_disabled());
    }

    #[test]
    fn test_key_names() {
        for key in OptionKey::all() {
            assert_eq!(OptionKey::from_name(key.name()), Some(*key));
        }
        assert_eq!(OptionKey::from_name("syncEnabled"), None);
        assert_eq!(
            serde_json::to_value(OptionKey::Datachange).unwrap(),
            json!("datachange")
        );
    }
}
