//! Content-Security-Policy model for style sources.
//!
//! Only the parts of a policy that decide whether inline style text may reach
//! the style system are modeled. CSSOM rule insertion is outside the policy's
//! reach and is never checked here.

/// A parsed `Content-Security-Policy` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    directives: Vec<(String, Vec<String>)>,
}

/// A report of content the policy blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspViolation {
    /// The directive that blocked the content.
    pub directive: String,
    /// The start of the blocked content.
    pub sample: String,
}

const SAMPLE_LEN: usize = 40;

impl CspViolation {
    pub(crate) fn new(directive: impl Into<String>, content: &str) -> Self {
        Self {
            directive: directive.into(),
            sample: content.chars().take(SAMPLE_LEN).collect(),
        }
    }
}

impl ContentSecurityPolicy {
    /// A policy with no directives; everything is allowed.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Parse a policy header such as `default-src 'self'; style-src 'self'`.
    ///
    /// Directive names are case-insensitive. When a directive repeats, the
    /// first occurrence wins.
    pub fn parse(header: &str) -> Self {
        let mut directives: Vec<(String, Vec<String>)> = Vec::new();
        for directive in header.split(';') {
            let mut tokens = directive.split_ascii_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            let name = name.to_ascii_lowercase();
            if directives.iter().any(|(existing, _)| *existing == name) {
                continue;
            }
            directives.push((name, tokens.map(str::to_string).collect()));
        }
        Self { directives }
    }

    /// The source list for a directive, if present.
    pub fn source_list(&self, directive: &str) -> Option<&[String]> {
        self.directives
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(directive))
            .map(|(_, sources)| sources.as_slice())
    }

    /// The directive that governs `<style>` elements and `style` attributes,
    /// with its source list.
    pub fn style_directive(&self) -> Option<(&'static str, &[String])> {
        ["style-src-elem", "style-src", "default-src"]
            .into_iter()
            .find_map(|name| self.source_list(name).map(|sources| (name, sources)))
    }

    /// Whether inline style text is allowed.
    ///
    /// `'unsafe-inline'` is ignored when the same list carries a nonce or a
    /// hash source.
    pub fn allows_inline_styles(&self) -> bool {
        let Some((_, sources)) = self.style_directive() else {
            return true;
        };
        let has_nonce_or_hash = sources.iter().any(|source| {
            let source = source.to_ascii_lowercase();
            ["'nonce-", "'sha256-", "'sha384-", "'sha512-"]
                .iter()
                .any(|prefix| source.starts_with(prefix))
        });
        !has_nonce_or_hash
            && sources
                .iter()
                .any(|source| source.eq_ignore_ascii_case("'unsafe-inline'"))
    }

    /// Whether the policy restricts styles at all.
    pub fn restricts_styles(&self) -> bool {
        self.style_directive().is_some()
    }
}
