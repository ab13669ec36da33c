//! Analysis configuration.

use std::collections::BTreeMap;
use std::str::FromStr;

/// A function whose integer arguments are tracked back to the functions that produced them.
///
/// Each entry of `sources` maps an argument position to the name of its taint source:
/// whenever the sink is called, the argument's range is joined into the range recorded
/// for that source (see [`RangeAnalysis::taint_source_range`]).
///
/// [`RangeAnalysis::taint_source_range`]: crate::analysis::RangeAnalysis::taint_source_range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkFunction {
    pub name: String,
    pub sources: BTreeMap<usize, String>,
}

impl SinkFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: BTreeMap::new(),
        }
    }

    pub fn with_source(mut self, arg: usize, source: impl Into<String>) -> Self {
        self.sources.insert(arg, source.into());
        self
    }
}

/// Parses `name` or `name:ARG=SOURCE,ARG=SOURCE`, e.g. `copy:2=read_len`.
impl FromStr for SinkFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = match s.split_once(':') {
            Some((name, rest)) => (name, Some(rest)),
            None => (s, None),
        };
        if name.is_empty() {
            return Err(format!("missing sink name in '{}'", s));
        }
        let mut sink = SinkFunction::new(name);
        for pair in rest.into_iter().flat_map(|r| r.split(',')).filter(|p| !p.is_empty()) {
            let Some((arg, source)) = pair.split_once('=') else {
                return Err(format!("expected ARG=SOURCE, got '{}'", pair));
            };
            let arg = arg
                .trim()
                .parse::<usize>()
                .map_err(|e| format!("bad argument index '{}': {}", arg, e))?;
            sink = sink.with_source(arg, source.trim());
        }
        Ok(sink)
    }
}

/// Configuration for [`RangeAnalysis`](crate::analysis::RangeAnalysis).
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Sink functions and their argument sources (default: none)
    pub sinks: Vec<SinkFunction>,
    /// Upper bound on whole-module rounds in `analyze_module` (default: 8)
    pub max_passes: usize,
    /// Whether parameters of internal functions take the join of their call-site
    /// arguments; when false every parameter is unconstrained (default: true)
    pub trust_internal_arguments: bool,
    /// Arrays longer than this keep one summary range instead of one per element (default: 1024)
    pub max_tracked_elements: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sinks: Vec::new(),
            max_passes: 8,
            trust_internal_arguments: true,
            max_tracked_elements: 1024,
        }
    }
}

impl AnalysisConfig {
    pub fn sink(&self, name: &str) -> Option<&SinkFunction> {
        self.sinks.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sink() {
        let sink: SinkFunction = "copy:2=read_len, 0=get_dst".parse().unwrap();
        assert_eq!(sink.name, "copy");
        assert_eq!(sink.sources.get(&2).map(String::as_str), Some("read_len"));
        assert_eq!(sink.sources.get(&0).map(String::as_str), Some("get_dst"));

        let bare: SinkFunction = "free".parse().unwrap();
        assert_eq!(bare, SinkFunction::new("free"));

        assert!("copy:x=y".parse::<SinkFunction>().is_err());
        assert!("copy:2".parse::<SinkFunction>().is_err());
        assert!(":1=a".parse::<SinkFunction>().is_err());
    }

    #[test]
    fn test_default_config() {
        let mut config = AnalysisConfig::default();
        assert_eq!(config.max_passes, 8);
        assert!(config.trust_internal_arguments);
        config.sinks.push(SinkFunction::new("copy").with_source(1, "read_len"));
        assert!(config.sink("copy").is_some());
        assert!(config.sink("read_len").is_none());
    }
}
