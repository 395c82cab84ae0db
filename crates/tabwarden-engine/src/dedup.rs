//! Filtering, URL normalization, grouping and survivor selection.
//!
//! Everything here is pure: given a tab set, the options and the ignore
//! lists, [`plan_closures`] decides which tabs to close.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use tabwarden_core::{Options, Tab, TabId, WindowId};

use crate::ignore::IgnoreLists;

static HTTP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://(?-u:\w)").unwrap());
static NEW_TAB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(about:blank|chrome:/+?(newtab|startpageshared)/?)$").unwrap()
});
static HASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#[\s\S]+?$").unwrap());
static QUERY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?[\s\S]+?$").unwrap());

/// Composite identity of a duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    /// `incognito`, a container id, or `normal`.
    pub partition: String,
    /// Present only when windows are differentiated.
    pub window: Option<WindowId>,
    pub url: String,
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.window {
            Some(window) => write!(f, "{}::{}::{}", self.partition, window, self.url),
            None => write!(f, "{}::{}", self.partition, self.url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMember {
    pub id: TabId,
    pub active: bool,
}

/// Closure decisions for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPlan {
    /// Number of groups (including singletons).
    pub groups: usize,
    /// One kept tab per group with at least two members.
    pub survivors: Vec<TabId>,
    pub closures: Vec<TabId>,
}

/// Returns the URL to group on, or `None` when the tab is excluded.
pub fn candidate_url<'a>(tab: &'a Tab, options: &Options, ignored: &IgnoreLists) -> Option<&'a str> {
    let url = tab.url.as_deref().unwrap_or("");
    let excluded = tab.pinned
        || url.is_empty()
        || NEW_TAB_RE.is_match(url)
        || (!options.incognito && tab.incognito)
        || (options.http && !HTTP_RE.is_match(url))
        || ignored.is_ignored(url);
    if excluded {
        None
    } else {
        Some(url)
    }
}

/// Drop the fragment and/or query when the options deem them insignificant.
pub fn normalize_url(url: &str, options: &Options) -> String {
    let mut url = url.to_string();
    if !options.hash {
        url = HASH_RE.replace(&url, "").into_owned();
    }
    if !options.query {
        url = QUERY_RE.replace(&url, "").into_owned();
    }
    url
}

pub fn group_key(tab: &Tab, normalized_url: String, options: &Options) -> GroupKey {
    let partition = if tab.incognito {
        "incognito".to_string()
    } else {
        match tab.cookie_store_id.as_deref() {
            Some(container) if options.containers && !container.is_empty() => container.to_string(),
            _ => "normal".to_string(),
        }
    };
    GroupKey {
        partition,
        window: options.windows.then_some(tab.window_id),
        url: normalized_url,
    }
}

/// Partition the candidate tabs by group key, keeping query order.
pub fn group_tabs(tabs: &[Tab], options: &Options, ignored: &IgnoreLists) -> BTreeMap<GroupKey, Vec<GroupMember>> {
    let mut groups: BTreeMap<GroupKey, Vec<GroupMember>> = BTreeMap::new();
    for tab in tabs {
        let Some(url) = candidate_url(tab, options, ignored) else {
            continue;
        };
        let key = group_key(tab, normalize_url(url, options), options);
        groups.entry(key).or_default().push(GroupMember {
            id: tab.id,
            active: tab.active,
        });
    }
    groups
}

/// Keep-order: the first member survives.
///
/// An active tab outranks every inactive one when `active` is set. Otherwise
/// `old` keeps the smallest id and its absence keeps the largest.
pub fn keep_order(a: &GroupMember, b: &GroupMember, options: &Options) -> Ordering {
    if options.active && a.active != b.active {
        return if a.active { Ordering::Less } else { Ordering::Greater };
    }
    if options.old {
        a.id.cmp(&b.id)
    } else {
        b.id.cmp(&a.id)
    }
}

pub fn plan_closures(tabs: &[Tab], options: &Options, ignored: &IgnoreLists) -> ScanPlan {
    let groups = group_tabs(tabs, options, ignored);
    let mut plan = ScanPlan {
        groups: groups.len(),
        ..Default::default()
    };

    for (_, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort_by(|a, b| keep_order(a, b, options));
        plan.survivors.push(members[0].id);
        plan.closures.extend(members[1..].iter().map(|m| m.id));
    }
    plan
}
