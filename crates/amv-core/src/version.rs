//! Ordering for runtime ("game") version strings.

use std::fmt;
use std::str::FromStr;

/// A runtime version split on dots.
///
/// Numeric components compare numerically. A numeric component with a
/// separated suffix (`21-pre1`, `21 rc1`) is a pre-release and sorts below
/// the plain number. Anything else is text, compares lexicographically and
/// sorts below every number, so weekly snapshots rank under releases. A
/// version that is a prefix of another is the smaller one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeVersion {
    components: Vec<Component>,
    raw: String,
}

// Variant order is the sort order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Component {
    Text(String),
    Pre(String),
    End,
    Number(u64),
}

const PRE_SEPARATORS: &[char] = &['-', '+', '_', ' '];

impl RuntimeVersion {
    pub fn parse(raw: &str) -> Self {
        let mut components = Vec::new();
        for part in raw.trim().split('.') {
            if let Ok(n) = part.parse::<u64>() {
                components.push(Component::Number(n));
                continue;
            }
            match part.split_once(PRE_SEPARATORS) {
                Some((head, tail)) if !head.is_empty() => match head.parse::<u64>() {
                    Ok(n) => {
                        components.push(Component::Number(n));
                        components.push(Component::Pre(tail.trim().to_ascii_lowercase()));
                    }
                    Err(_) => components.push(Component::Text(part.to_string())),
                },
                _ => components.push(Component::Text(part.to_string())),
            }
        }
        components.push(Component::End);
        Self {
            components,
            raw: raw.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for RuntimeVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
