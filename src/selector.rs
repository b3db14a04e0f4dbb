use select::node::Node;
use select::predicate::Predicate;

/// A structured CSS selector, evaluated directly as a `select` predicate.
/// `to_css_string` renders it for log messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssSelector {
    /// Matches an HTML tag name (e.g., "main", "section")
    Tag(String),

    /// Matches a CSS class exactly (e.g., "billing-overview")
    Class(String),

    /// Matches when any class contains the fragment, `[class*=...]`.
    /// Hashed CSS-module names like `Card-module__cardValue--x1` need this.
    ClassContains(String),

    /// Matches an attribute existence or specific value
    Attribute { key: String, value: Option<String> },

    /// AND Logic: Matches if ALL sub-selectors match
    And(Vec<CssSelector>),

    /// OR Logic: Matches if ANY sub-selector matches
    Or(Vec<CssSelector>),

    /// Descendant Logic: .ancestor .descendant
    Descendant {
        ancestor: Box<CssSelector>,
        descendant: Box<CssSelector>,
    },
}

impl CssSelector {
    pub fn tag(name: &str) -> Self {
        CssSelector::Tag(name.to_string())
    }

    pub fn class(name: &str) -> Self {
        CssSelector::Class(name.to_string())
    }

    pub fn class_contains(fragment: &str) -> Self {
        CssSelector::ClassContains(fragment.to_string())
    }

    pub fn has_attr(key: &str) -> Self {
        CssSelector::Attribute {
            key: key.to_string(),
            value: None,
        }
    }

    pub fn attr(key: &str, value: &str) -> Self {
        CssSelector::Attribute {
            key: key.to_string(),
            value: Some(value.to_string()),
        }
    }

    /// Shorthand for `[data-testid='...']`.
    pub fn test_id(value: &str) -> Self {
        Self::attr("data-testid", value)
    }

    pub fn within(self, ancestor: CssSelector) -> Self {
        CssSelector::Descendant {
            ancestor: Box::new(ancestor),
            descendant: Box::new(self),
        }
    }

    /// Converts the structured selector into a standard CSS selector string.
    pub fn to_css_string(&self) -> String {
        match self {
            CssSelector::Tag(tag) => tag.clone(),
            CssSelector::Class(cls) => format!(".{}", cls),
            CssSelector::ClassContains(fragment) => format!("[class*='{}']", fragment),
            CssSelector::Attribute { key, value } => match value {
                Some(v) => format!("[{}='{}']", key, v),
                None => format!("[{}]", key),
            },
            CssSelector::And(selectors) => selectors
                .iter()
                .map(|s| s.to_css_string())
                .collect::<Vec<_>>()
                .join(""),
            CssSelector::Or(selectors) => selectors
                .iter()
                .map(|s| s.to_css_string())
                .collect::<Vec<_>>()
                .join(", "),
            CssSelector::Descendant {
                ancestor,
                descendant,
            } => {
                format!(
                    "{} {}",
                    ancestor.to_css_string(),
                    descendant.to_css_string()
                )
            }
        }
    }
}

impl Predicate for CssSelector {
    fn matches(&self, node: &Node) -> bool {
        match self {
            CssSelector::Tag(tag) => node.name() == Some(tag.as_str()),
            CssSelector::Class(cls) => node
                .attr("class")
                .map(|classes| classes.split_whitespace().any(|c| c == cls.as_str()))
                .unwrap_or(false),
            CssSelector::ClassContains(fragment) => node
                .attr("class")
                .map(|classes| classes.contains(fragment.as_str()))
                .unwrap_or(false),
            CssSelector::Attribute { key, value } => match value {
                Some(v) => node.attr(key.as_str()) == Some(v.as_str()),
                None => node.attr(key.as_str()).is_some(),
            },
            CssSelector::And(selectors) => selectors.iter().all(|s| s.matches(node)),
            CssSelector::Or(selectors) => selectors.iter().any(|s| s.matches(node)),
            CssSelector::Descendant {
                ancestor,
                descendant,
            } => {
                if !descendant.matches(node) {
                    return false;
                }
                let mut current = node.parent();
                while let Some(parent) = current {
                    if ancestor.matches(&parent) {
                        return true;
                    }
                    current = parent.parent();
                }
                false
            }
        }
    }
}

impl<'a> Predicate for &'a CssSelector {
    fn matches(&self, node: &Node) -> bool {
        (*self).matches(node)
    }
}
