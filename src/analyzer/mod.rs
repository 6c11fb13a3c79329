//! Content analysis: findings extraction and link discovery
//!
//! The analyzer is a pure function of its input: the same body, headers
//! and source address always produce the same `Analysis`. It holds no
//! connection to storage or the network, which keeps it trivially
//! testable and safe to run inside worker tasks.

mod matchers;

pub use matchers::{Matcher, RawMatch};

use crate::addr::normalize_addr;
use crate::storage::FindingKind;
use matchers::{CryptoMatcher, EmailMatcher, LeakedIpMatcher, SecretMatcher, SocialMatcher};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// One extracted fact from a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: FindingKind,
    pub matched_text: String,
    pub byte_offset: u64,
}

/// Everything extracted from one page
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub findings: Vec<Finding>,
    /// Same-network links, normalized, deduplicated, in document order
    pub links: Vec<String>,
    pub title: Option<String>,
}

/// Header names inspected for technology fingerprints, with the label
/// prefix they produce
const TECH_HEADERS: &[(&str, &str)] = &[
    ("server", "Server"),
    ("x-powered-by", "PoweredBy"),
    ("x-aspnet-version", "ASP.NET"),
    ("x-generator", "Generator"),
];

/// Session-cookie names that betray a backend framework
const COOKIE_INDICATORS: &[(&str, &str)] = &[
    ("PHPSESSID", "PHP"),
    ("JSESSIONID", "Java"),
    ("csrftoken", "Django"),
    ("laravel_session", "Laravel"),
    ("rack.session", "Ruby"),
    ("connect.sid", "Node.js"),
    ("ASP.NET_SessionId", "ASP.NET"),
];

const MAX_TITLE_LEN: usize = 200;

/// Extracts findings and links from fetched pages.
///
/// Construction compiles every pattern once; one instance is shared by
/// all workers for the lifetime of a run.
pub struct Analyzer {
    text_matchers: Vec<Box<dyn Matcher>>,
    link_selector: Selector,
    title_selector: Selector,
}

impl Analyzer {
    pub fn new() -> Result<Self, regex::Error> {
        let text_matchers: Vec<Box<dyn Matcher>> = vec![
            Box::new(SecretMatcher::new()?),
            Box::new(CryptoMatcher::new()?),
            Box::new(SocialMatcher::new()?),
            Box::new(EmailMatcher::new()?),
            Box::new(LeakedIpMatcher::new()?),
        ];

        // Static selectors; parse failure here is a programming error, and
        // the expressions are exercised by the unit tests below
        let link_selector = Selector::parse("a[href], link[href]")
            .map_err(|_| regex::Error::Syntax("link selector".to_string()))?;
        let title_selector = Selector::parse("title")
            .map_err(|_| regex::Error::Syntax("title selector".to_string()))?;

        Ok(Self {
            text_matchers,
            link_selector,
            title_selector,
        })
    }

    /// Analyzes one fetched page.
    ///
    /// `source` is the normalized address the body was fetched from;
    /// relative hrefs resolve against it. Matchers scan the raw bytes, so
    /// finding offsets index into the body as fetched; lossy decoding
    /// applies only to the HTML link/title pass.
    pub fn analyze(&self, body: &[u8], headers: &[(String, String)], source: &str) -> Analysis {
        let mut findings = Vec::new();
        let mut seen: HashSet<(FindingKind, String)> = HashSet::new();

        for matcher in &self.text_matchers {
            let kind = matcher.kind();
            let mut kept = 0usize;
            for m in matcher.scan(body) {
                if kept >= matcher.cap() {
                    break;
                }
                if seen.insert((kind, m.text.clone())) {
                    findings.push(Finding {
                        kind,
                        matched_text: m.text,
                        byte_offset: m.byte_offset,
                    });
                    kept += 1;
                }
            }
        }

        for label in tech_fingerprints(headers) {
            if seen.insert((FindingKind::TechFingerprint, label.clone())) {
                findings.push(Finding {
                    kind: FindingKind::TechFingerprint,
                    matched_text: label,
                    byte_offset: 0,
                });
            }
        }

        let text = String::from_utf8_lossy(body);
        let document = Html::parse_document(&text);

        let title = document
            .select(&self.title_selector)
            .next()
            .map(|el| el.text().collect::<String>())
            .map(|t| t.trim().chars().take(MAX_TITLE_LEN).collect::<String>())
            .filter(|t| !t.is_empty());

        let mut links = Vec::new();
        let mut seen_links = HashSet::new();
        if let Ok(base) = Url::parse(source) {
            for element in document.select(&self.link_selector) {
                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                let Ok(resolved) = base.join(href) else {
                    continue;
                };
                let Ok(normalized) = normalize_addr(resolved.as_str()) else {
                    continue;
                };
                let normalized = normalized.to_string();
                if seen_links.insert(normalized.clone()) {
                    links.push(normalized);
                }
            }
        }

        Analysis {
            findings,
            links,
            title,
        }
    }
}

/// Technology labels derived from response headers and session cookies
fn tech_fingerprints(headers: &[(String, String)]) -> Vec<String> {
    let mut labels = Vec::new();

    for (name, prefix) in TECH_HEADERS {
        for (header, value) in headers {
            if header.eq_ignore_ascii_case(name) && !value.is_empty() {
                labels.push(format!("{}:{}", prefix, value));
            }
        }
    }

    for (header, value) in headers {
        if !header.eq_ignore_ascii_case("set-cookie") {
            continue;
        }
        for (indicator, tech) in COOKIE_INDICATORS {
            if value.contains(indicator) && !labels.iter().any(|l| l == tech) {
                labels.push(tech.to_string());
            }
        }
    }

    labels
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("text_matchers", &self.text_matchers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "http://source777arbitraryhostnamepaddedto56characterslong.onion/";

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let analyzer = Analyzer::new().unwrap();
        let body = br#"<html><head><title>Market</title></head><body>
            contact admin@market.example or t.me/market_support
            wallet 1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa
            <a href="/listings">listings</a>
        </body></html>"#;
        let hdrs = headers(&[("Server", "nginx/1.18.0")]);

        let first = analyzer.analyze(body, &hdrs, SOURCE);
        let second = analyzer.analyze(body, &hdrs, SOURCE);

        assert_eq!(first.findings, second.findings);
        assert_eq!(first.links, second.links);
        assert_eq!(first.title, second.title);
    }

    #[test]
    fn test_findings_deduplicated_within_page() {
        let analyzer = Analyzer::new().unwrap();
        let body = b"admin@example.com then again admin@example.com";
        let analysis = analyzer.analyze(body, &[], SOURCE);

        let emails: Vec<_> = analysis
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::Email)
            .collect();
        assert_eq!(emails.len(), 1);
        // First occurrence wins the offset
        assert_eq!(emails[0].byte_offset, 0);
    }

    #[test]
    fn test_email_cap_applies() {
        let analyzer = Analyzer::new().unwrap();
        let body: String = (0..80)
            .map(|i| format!("user{}@example.com ", i))
            .collect();
        let analysis = analyzer.analyze(body.as_bytes(), &[], SOURCE);

        let emails = analysis
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::Email)
            .count();
        assert_eq!(emails, matchers::EMAIL_CAP);
    }

    #[test]
    fn test_tech_fingerprints_from_headers_and_cookies() {
        let analyzer = Analyzer::new().unwrap();
        let hdrs = headers(&[
            ("Server", "Apache/2.4.41"),
            ("X-Powered-By", "PHP/7.4.3"),
            ("Set-Cookie", "PHPSESSID=abc123; path=/"),
        ]);
        let analysis = analyzer.analyze(b"<html></html>", &hdrs, SOURCE);

        let labels: Vec<_> = analysis
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::TechFingerprint)
            .map(|f| f.matched_text.as_str())
            .collect();
        assert!(labels.contains(&"Server:Apache/2.4.41"));
        assert!(labels.contains(&"PoweredBy:PHP/7.4.3"));
        assert!(labels.contains(&"PHP"));
    }

    #[test]
    fn test_links_resolved_and_filtered_to_network() {
        let analyzer = Analyzer::new().unwrap();
        let body = br#"<html><body>
            <a href="/forum">forum</a>
            <a href="http://otherhost2arbitrarypaddedname3to56characterslongg.onion/shop">shop</a>
            <a href="https://clearnet.example.com/out">out</a>
            <a href="mailto:x@y.example">mail</a>
        </body></html>"#;
        let analysis = analyzer.analyze(body, &[], SOURCE);

        assert_eq!(analysis.links.len(), 2);
        assert!(analysis.links[0].ends_with(".onion/forum/"));
        assert!(analysis.links[1].contains("otherhost"));
    }

    #[test]
    fn test_duplicate_links_collapsed() {
        let analyzer = Analyzer::new().unwrap();
        let body = br#"<a href="/a">one</a><a href="/a">two</a><a href="/a#frag">three</a>"#;
        let analysis = analyzer.analyze(body, &[], SOURCE);
        assert_eq!(analysis.links.len(), 1);
    }

    #[test]
    fn test_title_extracted_and_trimmed() {
        let analyzer = Analyzer::new().unwrap();
        let body = b"<html><head><title>  Hidden Service  </title></head></html>";
        let analysis = analyzer.analyze(body, &[], SOURCE);
        assert_eq!(analysis.title.as_deref(), Some("Hidden Service"));
    }

    #[test]
    fn test_missing_title_is_none() {
        let analyzer = Analyzer::new().unwrap();
        let analysis = analyzer.analyze(b"<html><body>no head</body></html>", &[], SOURCE);
        assert_eq!(analysis.title, None);
    }

    #[test]
    fn test_non_utf8_body_still_analyzed() {
        let analyzer = Analyzer::new().unwrap();
        let mut body = b"contact admin@example.com ".to_vec();
        body.extend_from_slice(&[0xff, 0xfe, 0xfd]);
        let analysis = analyzer.analyze(&body, &[], SOURCE);
        assert!(analysis
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::Email));
    }

    #[test]
    fn test_offsets_index_raw_bytes_past_invalid_sequences() {
        let analyzer = Analyzer::new().unwrap();
        // Three invalid bytes before the match. A lossy decode would
        // widen each to a three-byte replacement character and shift
        // the reported offset.
        let mut body = vec![0xff, 0xfe, 0xfd, b' '];
        body.extend_from_slice(b"admin@example.com");
        let analysis = analyzer.analyze(&body, &[], SOURCE);

        let email = analysis
            .findings
            .iter()
            .find(|f| f.kind == FindingKind::Email)
            .unwrap();
        assert_eq!(email.matched_text, "admin@example.com");
        assert_eq!(email.byte_offset, 4);
        assert_eq!(&body[email.byte_offset as usize..], b"admin@example.com");
    }

    #[test]
    fn test_empty_body_yields_empty_analysis() {
        let analyzer = Analyzer::new().unwrap();
        let analysis = analyzer.analyze(b"", &[], SOURCE);
        assert!(analysis.findings.is_empty());
        assert!(analysis.links.is_empty());
        assert_eq!(analysis.title, None);
    }
}
