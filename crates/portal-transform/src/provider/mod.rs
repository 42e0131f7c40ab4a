//! Concrete Inbound/Outbound implementations, one module per wire format
//!
//! `openai`, `anthropic`, and `google` implement both `Inbound` and
//! `Outbound` against their native wire formats. The remaining modules are
//! `OpenAI`-compatible quirk wrappers: each holds an [`openai::OpenAiOutbound`]
//! and overrides only the behavior its upstream diverges on.

use http::header::{HeaderName, HeaderValue};
use portal_config::HeaderRuleConfig;
use portal_core::headers::{
    HeaderForward, HeaderInsert, HeaderPattern, HeaderRemove, HeaderRenameDuplicate, HeaderRule, NameOrPattern,
    ValidHeaderName, ValidHeaderValue,
};

pub mod anthropic;
pub mod bailian;
pub mod deepseek;
pub mod doubao;
pub mod google;
pub mod longcat;
pub mod openai;
pub mod openrouter;

/// Resolve a provider's string-typed config header rules into the compiled
/// [`HeaderRule`]s `apply_header_rules` expects
///
/// A name containing `*` is treated as a glob and compiled into a regex
/// pattern; anything else must be a valid header name. A rule referencing
/// an invalid header name or pattern is skipped rather than failing
/// startup outright.
#[must_use]
pub fn parse_header_rules(configs: &[HeaderRuleConfig]) -> Vec<HeaderRule> {
    configs.iter().filter_map(resolve_one).collect()
}

fn resolve_one(config: &HeaderRuleConfig) -> Option<HeaderRule> {
    match config {
        HeaderRuleConfig::Forward(f) => Some(HeaderRule::Forward(HeaderForward {
            name: resolve_name_or_pattern(&f.name)?,
            rename: f.rename.as_deref().and_then(resolve_name),
            default: f.default.as_deref().and_then(resolve_value),
        })),
        HeaderRuleConfig::Insert(i) => Some(HeaderRule::Insert(HeaderInsert {
            name: resolve_name(&i.name)?,
            value: resolve_value(&i.value)?,
        })),
        HeaderRuleConfig::Remove(r) => Some(HeaderRule::Remove(HeaderRemove {
            name: resolve_name_or_pattern(&r.name)?,
        })),
        HeaderRuleConfig::RenameDuplicate(d) => Some(HeaderRule::RenameDuplicate(HeaderRenameDuplicate {
            name: resolve_name(&d.name)?,
            rename: resolve_name(&d.rename)?,
            default: d.default.as_deref().and_then(resolve_value),
        })),
    }
}

fn resolve_name(name: &str) -> Option<ValidHeaderName> {
    HeaderName::try_from(name).ok().map(ValidHeaderName::new)
}

fn resolve_value(value: &str) -> Option<ValidHeaderValue> {
    HeaderValue::try_from(value).ok().map(ValidHeaderValue::new)
}

fn resolve_name_or_pattern(name: &str) -> Option<NameOrPattern> {
    if name.contains('*') {
        let escaped = regex::escape(name).replace(r"\*", ".*");
        let pattern = format!("(?i)^{escaped}$");
        regex::Regex::new(&pattern).ok().map(|re| NameOrPattern::Pattern(HeaderPattern(re)))
    } else {
        resolve_name(name).map(NameOrPattern::Name)
    }
}
