//! Merges per-upstream tool catalogues into one exposed catalogue,
//! namespacing only the tools that actually collide.
//!
//! The routing-map shape (`exposed name -> (upstream, original name)`) and
//! the `route_for`/`strip prefix` helpers are grounded on
//! `MCPToolAggregator`/`MCPToolRoute` in the roci aggregate example; the
//! collision rule itself (count-based, `<upstream>:<original>` separator)
//! follows this crate's own two-pass collision rule rather than that
//! example's always-namespace-with-server-id policy.

use std::collections::HashMap;

use mcpfuse_protocol::ToolInfo;

/// Where an exposed tool name actually routes to.
#[derive(Debug, Clone)]
pub struct ToolRoute {
    pub upstream: String,
    pub original_name: String,
}

/// One entry in the merged catalogue handed back to callers of
/// `tools/list`.
#[derive(Debug, Clone)]
pub struct AggregatedTool {
    pub exposed_name: String,
    pub upstream: String,
    pub original_name: String,
    pub info: ToolInfo,
}

/// The merged view over every connected upstream's tool catalogue.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    routes: HashMap<String, ToolRoute>,
    tools: Vec<AggregatedTool>,
}

impl Aggregator {
    /// Builds the merged catalogue from each upstream's already-filtered
    /// tool list. `catalogues` order does not matter: per §5's ordering
    /// guarantees, connection setup across upstreams is unordered and this
    /// must not assume otherwise.
    pub fn build(catalogues: &[(String, Vec<ToolInfo>)]) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (_, tools) in catalogues {
            for tool in tools {
                *counts.entry(tool.name.as_str()).or_default() += 1;
            }
        }

        let needs_namespace_always = catalogues.len() > 1;

        let mut routes = HashMap::new();
        let mut tools = Vec::new();
        for (upstream, upstream_tools) in catalogues {
            for tool in upstream_tools {
                let collides = counts.get(tool.name.as_str()).copied().unwrap_or(0) > 1;
                let exposed_name = if collides || needs_namespace_always {
                    format!("{upstream}:{}", tool.name)
                } else {
                    tool.name.clone()
                };

                routes.insert(
                    exposed_name.clone(),
                    ToolRoute {
                        upstream: upstream.clone(),
                        original_name: tool.name.clone(),
                    },
                );

                tools.push(AggregatedTool {
                    exposed_name,
                    upstream: upstream.clone(),
                    original_name: tool.name.clone(),
                    info: tool.clone(),
                });
            }
        }

        Self { routes, tools }
    }

    pub fn tools(&self) -> &[AggregatedTool] {
        &self.tools
    }

    /// Looks up the route for an exposed name as returned by `tools/list`.
    pub fn route(&self, exposed_name: &str) -> Option<&ToolRoute> {
        self.routes.get(exposed_name)
    }

    /// Strips a leading `{upstream}:` prefix iff `upstream` names one of the
    /// configured upstreams; otherwise returns the name unchanged.
    pub fn original_tool_name<'a>(&self, exposed_name: &'a str, known_upstreams: &[String]) -> (Option<&'a str>, &'a str) {
        if let Some((prefix, rest)) = exposed_name.split_once(':') {
            if known_upstreams.iter().any(|u| u == prefix) {
                return (Some(prefix), rest);
            }
        }
        (None, exposed_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> ToolInfo {
        ToolInfo {
            name: name.to_string(),
            description: None,
            input_schema: None,
        }
    }

    #[test]
    fn single_upstream_no_collision_is_unprefixed() {
        let catalogues = vec![("alpha".to_string(), vec![tool("read")])];
        let agg = Aggregator::build(&catalogues);
        assert_eq!(agg.tools()[0].exposed_name, "read");
        assert!(agg.route("read").is_some());
    }

    #[test]
    fn multiple_upstreams_always_namespace_even_without_collision() {
        let catalogues = vec![
            ("alpha".to_string(), vec![tool("read")]),
            ("beta".to_string(), vec![tool("write")]),
        ];
        let agg = Aggregator::build(&catalogues);
        let names: Vec<_> = agg.tools().iter().map(|t| t.exposed_name.clone()).collect();
        assert!(names.contains(&"alpha:read".to_string()));
        assert!(names.contains(&"beta:write".to_string()));
    }

    #[test]
    fn colliding_tool_names_are_both_namespaced() {
        let catalogues = vec![
            ("alpha".to_string(), vec![tool("search")]),
            ("beta".to_string(), vec![tool("search")]),
        ];
        let agg = Aggregator::build(&catalogues);
        assert!(agg.route("alpha:search").is_some());
        assert!(agg.route("beta:search").is_some());
        assert!(agg.route("search").is_none());
    }

    #[test]
    fn original_tool_name_strips_known_upstream_prefix() {
        let catalogues = vec![
            ("alpha".to_string(), vec![tool("search")]),
            ("beta".to_string(), vec![tool("search")]),
        ];
        let agg = Aggregator::build(&catalogues);
        let known = vec!["alpha".to_string(), "beta".to_string()];
        let (upstream, name) = agg.original_tool_name("alpha:search", &known);
        assert_eq!(upstream, Some("alpha"));
        assert_eq!(name, "search");
    }

    #[test]
    fn original_tool_name_leaves_unknown_prefix_alone() {
        let catalogues = vec![("alpha".to_string(), vec![tool("weird:name")])];
        let agg = Aggregator::build(&catalogues);
        let known = vec!["alpha".to_string()];
        let (upstream, name) = agg.original_tool_name("weird:name", &known);
        assert_eq!(upstream, None);
        assert_eq!(name, "weird:name");
    }
}
