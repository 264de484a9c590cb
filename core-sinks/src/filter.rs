//! Per-sink regular-expression filter chains.

use crate::error::{Result, SinkError};
use core_events::TraceEvent;
use regex::{Regex, RegexBuilder};

/// An ordered set of case-insensitive, unanchored patterns.
///
/// An event passes when at least one pattern matches the probed text; an
/// empty chain passes everything. Duplicate patterns are a configuration
/// error.
#[derive(Debug, Default)]
pub struct FilterChain {
    patterns: Vec<Regex>,
}

impl FilterChain {
    /// Compiles a chain from raw pattern strings.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty or duplicated pattern,
    /// `InvalidConfiguration` for a pattern that fails to compile.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut seen: Vec<String> = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let raw = pattern.as_ref();
            if raw.is_empty() {
                return Err(SinkError::InvalidArgument(
                    "filter patterns cannot be empty".to_string(),
                ));
            }
            let folded = raw.to_lowercase();
            if seen.contains(&folded) {
                return Err(SinkError::InvalidArgument(format!(
                    "duplicate filter pattern '{}'",
                    raw
                )));
            }
            let regex = RegexBuilder::new(raw)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    SinkError::InvalidConfiguration(format!(
                        "filter pattern '{}' does not compile: {}",
                        raw, e
                    ))
                })?;
            seen.push(folded);
            compiled.push(regex);
        }

        Ok(Self { patterns: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Probe for text-formatted sinks: the fully formatted line.
    pub fn matches_line(&self, line: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(line))
    }

    /// Probe for serialized sinks: any string-valued parameter.
    pub fn matches_parameters(&self, event: &TraceEvent) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        event.parameters().any(|(_, value)| match value.as_str() {
            Ok(text) => self.patterns.iter().any(|p| p.is_match(text)),
            Err(_) => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::{Level, ProviderDescriptor, TraceEvent};

    fn event_with(text: &str) -> TraceEvent {
        let provider = ProviderDescriptor::from_name("FilterTests").unwrap();
        TraceEvent::builder(&provider, 1, "E")
            .level(Level::Informational)
            .param("payload", text)
            .param("count", 3u32)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_chain_passes_all() {
        let chain = FilterChain::new::<&str>(&[]).unwrap();
        assert!(chain.matches_line("anything"));
        assert!(chain.matches_parameters(&event_with("anything")));
    }

    #[test]
    fn test_any_pattern_admits() {
        let chain = FilterChain::new(&["alpha", "beta"]).unwrap();
        assert!(chain.matches_line("only beta here"));
        assert!(!chain.matches_line("gamma"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let chain = FilterChain::new(&["Oddball"]).unwrap();
        assert!(chain.matches_line("an ODDBALL appears"));
    }

    #[test]
    fn test_duplicates_rejected() {
        assert!(FilterChain::new(&["x", "X"]).is_err());
        assert!(FilterChain::new(&["x", "y", "x"]).is_err());
    }

    #[test]
    fn test_bad_pattern_rejected() {
        assert!(matches!(
            FilterChain::new(&["("]),
            Err(SinkError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_parameter_probe_only_sees_strings() {
        let chain = FilterChain::new(&["3"]).unwrap();
        // "count" is numeric and must not be probed.
        assert!(!chain.matches_parameters(&event_with("nothing")));
        assert!(chain.matches_parameters(&event_with("got 3 of them")));
    }
}
