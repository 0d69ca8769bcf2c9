use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalised runtime tag.
///
/// Normalisation itself (aliasing `js`/`javascript` to `node`, folding
/// `golang` to `go`, and so on) is the Paths & Environment Resolver's
/// job in `agent-core`; this type is just the closed set of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Node,
    Go,
    Deno,
    Ruby,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Node => "node",
            Language::Go => "go",
            Language::Deno => "deno",
            Language::Ruby => "ruby",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
