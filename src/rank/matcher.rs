//! Matching organic search results against a target domain

use serde::{Deserialize, Serialize};
use url::Url;

/// One entry of `organic_results`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub displayed_link: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl OrganicResult {
    /// `link`, falling back to `displayed_link`
    pub fn candidate_link(&self) -> Option<&str> {
        self.link
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .or_else(|| self.displayed_link.as_deref().filter(|l| !l.trim().is_empty()))
    }
}

/// A hit inside one page of results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMatch {
    /// 1-based rank within the page
    pub rank: u32,
    pub url: String,
    pub title: Option<String>,
}

/// Lowercase, then strip the scheme, a leading `www.` and one trailing `/`
pub fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    without_www
        .strip_suffix('/')
        .unwrap_or(without_www)
        .to_string()
}

/// Host part of a normalized domain or URL
fn host_part(normalized: &str) -> &str {
    normalized
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
}

/// Two normalized hosts match when equal or when one is a subdomain of the
/// other. The shorter side must still look like a domain.
pub fn hosts_match(candidate: &str, target: &str) -> bool {
    if candidate.is_empty() || target.is_empty() {
        return false;
    }
    if candidate == target {
        return true;
    }

    let (longer, shorter) = if candidate.len() > target.len() {
        (candidate, target)
    } else {
        (target, candidate)
    };

    shorter.contains('.')
        && longer
            .strip_suffix(shorter)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Whether a single result link points at the target
pub fn link_matches(link: &str, target_domain: &str, target_url: Option<&str>) -> bool {
    let target = normalize(target_domain);
    let target_host = host_part(&target);
    if target_host.is_empty() {
        return false;
    }

    let absolute = if link.starts_with("http") {
        link.to_string()
    } else {
        format!("https://{}", link)
    };

    let host = match Url::parse(&absolute) {
        Ok(url) => match url.host_str() {
            Some(host) => normalize(host),
            None => return false,
        },
        Err(_) => return normalize(link).contains(target_host),
    };

    if !hosts_match(&host, target_host) {
        return false;
    }

    match target_url.map(normalize).filter(|u| !u.is_empty()) {
        Some(wanted) => {
            let link = normalize(link);
            link.contains(&wanted) || wanted.contains(&link)
        }
        None => true,
    }
}

/// First result pointing at the target, by page order
pub fn find_position(
    results: &[OrganicResult],
    target_domain: &str,
    target_url: Option<&str>,
) -> Option<ResultMatch> {
    results.iter().enumerate().find_map(|(idx, result)| {
        let link = result.candidate_link()?;
        link_matches(link, target_domain, target_url).then(|| ResultMatch {
            rank: idx as u32 + 1,
            url: link.to_string(),
            title: result.title.clone(),
        })
    })
}
