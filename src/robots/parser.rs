//! Robots.txt parser implementation
//!
//! Turns a robots.txt document into per-agent rule lists and resolves paths
//! against them with longest-match precedence.

use std::collections::HashMap;
use std::time::Duration;

/// Agent token that applies to every crawler without its own section
pub const WILDCARD_AGENT: &str = "*";

/// A single allow or deny rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Path pattern, optionally ending in `*`
    pub path: String,

    /// Whether a match permits the fetch
    pub allow: bool,
}

impl Rule {
    pub fn allow(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            allow: true,
        }
    }

    pub fn disallow(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            allow: false,
        }
    }

    /// Returns the matched length if this rule applies to `path`
    ///
    /// `/foo*` matches by prefix. Other rules match the exact path or any path
    /// below it as a directory (`/foo` matches `/foo/bar` but not `/foobar`).
    /// A trailing `/` gets no special treatment: `/foo/` matches `/foo/` and
    /// `/foo//bar`, not `/foo/bar`. Use `/foo/*` for a directory prefix.
    fn match_len(&self, path: &str) -> Option<usize> {
        if let Some(prefix) = self.path.strip_suffix('*') {
            return path.starts_with(prefix).then_some(prefix.len());
        }

        let rule = self.path.as_str();
        let matches = path == rule
            || path
                .strip_prefix(rule)
                .is_some_and(|rest| rest.starts_with('/'));

        matches.then_some(rule.len())
    }
}

/// Parsed robots.txt rules for one host
///
/// Built once per fetch and never mutated afterwards; a refresh replaces the
/// whole rule set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsRuleSet {
    /// Rules per lower-cased agent token, in document order
    rules: HashMap<String, Vec<Rule>>,

    /// Sitemap URLs, in document order
    sitemaps: Vec<String>,

    /// Crawl delay per lower-cased agent token
    crawl_delays: HashMap<String, Duration>,
}

impl RobotsRuleSet {
    /// Creates an empty rule set that allows everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parses raw robots.txt content
    ///
    /// Unknown fields, lines without a colon and rules that appear before any
    /// `User-agent` line are ignored. Every `User-agent` line opens a new
    /// section: rules and crawl-delay apply only to the most recent agent.
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    ///
    /// # Returns
    ///
    /// The parsed rule set; malformed input degrades to fewer rules, never an error
    pub fn parse(content: &str) -> Self {
        let mut set = Self::default();
        let mut current: Option<String> = None;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            }
            .trim();

            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    current = (!value.is_empty()).then(|| value.to_ascii_lowercase());
                    if let Some(agent) = &current {
                        set.rules.entry(agent.clone()).or_default();
                    }
                }
                "disallow" | "allow" if !value.is_empty() => {
                    if let Some(agent) = &current {
                        set.rules.entry(agent.clone()).or_default().push(Rule {
                            path: value.to_string(),
                            allow: field == "allow",
                        });
                    }
                }
                "sitemap" if !value.is_empty() => {
                    set.sitemaps.push(value.to_string());
                }
                "crawl-delay" => {
                    if let Ok(seconds) = value.parse::<u64>() {
                        if seconds > 0 {
                            if let Some(agent) = &current {
                                set.crawl_delays
                                    .insert(agent.clone(), Duration::from_secs(seconds));
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        set
    }

    /// Returns the rules that govern `agent`
    ///
    /// The agent's own rules win; the wildcard section applies only when the
    /// agent has none.
    pub fn rules_for(&self, agent: &str) -> &[Rule] {
        let agent = agent.to_ascii_lowercase();
        match self.rules.get(&agent) {
            Some(rules) if !rules.is_empty() => rules,
            _ => self
                .rules
                .get(WILDCARD_AGENT)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    /// Checks whether `path` (including any query string) may be fetched by `agent`
    ///
    /// The rule with the longest matched path decides. Allow and deny carry
    /// no extra weight; on a tie the earlier rule wins. No match means allow.
    pub fn is_allowed(&self, path: &str, agent: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };

        let mut best: Option<(usize, &Rule)> = None;
        for rule in self.rules_for(agent) {
            if let Some(len) = rule.match_len(path) {
                if best.map_or(true, |(best_len, _)| len > best_len) {
                    best = Some((len, rule));
                }
            }
        }

        best.map_or(true, |(_, rule)| rule.allow)
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Gets the crawl delay for `agent`, falling back to the wildcard section
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        self.crawl_delays
            .get(&agent.to_ascii_lowercase())
            .or_else(|| self.crawl_delays.get(WILDCARD_AGENT))
            .copied()
    }

    /// True when no agent has any rule
    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }
}
