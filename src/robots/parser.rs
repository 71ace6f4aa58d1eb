//! Robots.txt rules backed by the robotstxt crate

use robotstxt::DefaultMatcher;

/// Parsed robots.txt for one origin
///
/// An origin without a usable robots.txt gets permissive rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    /// Raw body; `None` allows everything
    body: Option<String>,
}

impl RobotsRules {
    pub fn parse(body: &str) -> Self {
        if body.trim().is_empty() {
            return Self::permissive();
        }
        Self {
            body: Some(body.to_string()),
        }
    }

    pub fn permissive() -> Self {
        Self { body: None }
    }

    pub fn is_permissive(&self) -> bool {
        self.body.is_none()
    }

    /// Whether `user_agent` may fetch `url` (a full URL)
    pub fn allows(&self, url: &str, user_agent: &str) -> bool {
        match &self.body {
            None => true,
            Some(body) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(body, product_token(user_agent), url)
            }
        }
    }
}

/// `Mozilla/5.0 (X11; ...)` -> `Mozilla`
fn product_token(user_agent: &str) -> &str {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .filter(|token| !token.is_empty())
        .unwrap_or("*")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "\
User-agent: *
Disallow: /private/

User-agent: veilbot
Disallow: /
";

    #[test]
    fn test_permissive_allows_everything() {
        let rules = RobotsRules::parse("   ");
        assert!(rules.is_permissive());
        assert!(rules.allows("https://example.test/private/x", "veilbot"));
    }

    #[test]
    fn test_wildcard_group() {
        let rules = RobotsRules::parse(ROBOTS);
        assert!(rules.allows("https://example.test/public", "Mozilla/5.0"));
        assert!(!rules.allows("https://example.test/private/page", "Mozilla/5.0"));
    }

    #[test]
    fn test_specific_group_wins() {
        let rules = RobotsRules::parse(ROBOTS);
        assert!(!rules.allows("https://example.test/public", "veilbot/1.0"));
    }

    #[test]
    fn test_product_token() {
        assert_eq!(product_token("Mozilla/5.0 (X11; Linux)"), "Mozilla");
        assert_eq!(product_token(""), "*");
    }
}
