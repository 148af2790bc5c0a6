use std::fmt;
use std::hash::Hash;

use crate::program::CodeLocation;

/// Abstraction of the call stack separating the results of one CFG by calling context.
///
/// The set of tokens reachable from [`empty`](ContextToken::empty) through
/// [`push_call`](ContextToken::push_call) must be finite, otherwise the interprocedural
/// cache may grow without bound.
pub trait ContextToken: Clone + fmt::Debug + fmt::Display + Eq + Hash + Ord {
    /// Token of the program entry points.
    fn empty(&self) -> Self;

    /// Token of a callee invoked at `site` from the context `self`.
    fn push_call(&self, site: &CodeLocation) -> Self;
}

/// Single context: all calls to a CFG share one result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextInsensitiveToken;

impl ContextToken for ContextInsensitiveToken {
    fn empty(&self) -> Self {
        ContextInsensitiveToken
    }

    fn push_call(&self, _site: &CodeLocation) -> Self {
        ContextInsensitiveToken
    }
}

impl fmt::Display for ContextInsensitiveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<>")
    }
}

/// Last `k` call sites of the call stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallStringToken {
    k: usize,
    sites: Vec<CodeLocation>,
}

impl CallStringToken {
    pub fn new(k: usize) -> Self {
        Self { k, sites: Vec::new() }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Call sites, outermost first.
    pub fn sites(&self) -> &[CodeLocation] {
        &self.sites
    }
}

impl ContextToken for CallStringToken {
    fn empty(&self) -> Self {
        Self::new(self.k)
    }

    fn push_call(&self, site: &CodeLocation) -> Self {
        let mut sites = self.sites.clone();
        sites.push(site.clone());
        if sites.len() > self.k {
            sites.drain(..sites.len() - self.k);
        }
        Self { k: self.k, sites }
    }
}

impl fmt::Display for CallStringToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sites: Vec<String> = self.sites.iter().map(|s| s.to_string()).collect();
        write!(f, "<{}>", sites.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn site(statement: usize) -> CodeLocation {
        CodeLocation::new("main", statement, 0)
    }

    #[test]
    fn test_call_string_keeps_last_k_sites() {
        let t = CallStringToken::new(2).push_call(&site(1)).push_call(&site(2)).push_call(&site(3));
        assert_eq!(t.sites(), &[site(2), site(3)]);
        assert_eq!(t.to_string(), "<main:2, main:3>");
        assert_eq!(t.empty(), CallStringToken::new(2));
    }

    #[test]
    fn test_zero_length_call_string_is_insensitive() {
        let t = CallStringToken::new(0);
        assert_eq!(t.push_call(&site(1)), t);
        assert_eq!(ContextInsensitiveToken.push_call(&site(1)), ContextInsensitiveToken);
    }
}
