use std::collections::BTreeSet;
use std::fmt;

use crate::error::Result;
use crate::lattice::Lattice;
use crate::symbolic::AllocationSite;

/// Set of allocation sites a pointer may refer to.
///
/// The empty set is bottom (a pointer to nothing, e.g. `null`), [`AllocationSites::Top`]
/// is an unknown pointer. A weak site absorbs the strong site of the same name: the set
/// never holds both variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationSites {
    Sites(BTreeSet<AllocationSite>),
    Top,
}

impl AllocationSites {
    pub fn empty() -> Self {
        AllocationSites::Sites(BTreeSet::new())
    }

    pub fn singleton(site: AllocationSite) -> Self {
        AllocationSites::Sites(BTreeSet::from([site]))
    }

    pub fn from_sites(sites: impl IntoIterator<Item = AllocationSite>) -> Self {
        AllocationSites::Sites(normalize(sites.into_iter().collect()))
    }

    pub fn sites(&self) -> Option<&BTreeSet<AllocationSite>> {
        match self {
            AllocationSites::Sites(sites) => Some(sites),
            AllocationSites::Top => None,
        }
    }

    /// Turns the strong sites located at one of `locations` into weak ones.
    pub fn weaken(&self, locations: &BTreeSet<String>) -> Self {
        match self {
            AllocationSites::Top => AllocationSites::Top,
            AllocationSites::Sites(sites) => AllocationSites::from_sites(sites.iter().map(|s| {
                if !s.is_weak() && locations.contains(s.location()) {
                    s.with_weak(true)
                } else {
                    s.clone()
                }
            })),
        }
    }

    /// Whether the two sets share no object.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        match (self, other) {
            (AllocationSites::Sites(a), AllocationSites::Sites(b)) => {
                a.iter().all(|x| b.iter().all(|y| x.name() != y.name()))
            }
            _ => false,
        }
    }
}

fn normalize(sites: BTreeSet<AllocationSite>) -> BTreeSet<AllocationSite> {
    let weak: BTreeSet<String> = sites.iter().filter(|s| s.is_weak()).map(|s| s.name()).collect();
    sites.into_iter().filter(|s| s.is_weak() || !weak.contains(&s.name())).collect()
}

impl Lattice for AllocationSites {
    fn top(&self) -> Self {
        AllocationSites::Top
    }

    fn bottom(&self) -> Self {
        AllocationSites::empty()
    }

    fn is_top(&self) -> bool {
        matches!(self, AllocationSites::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, AllocationSites::Sites(s) if s.is_empty())
    }

    fn lub_aux(&self, other: &Self) -> Result<Self> {
        match (self, other) {
            (AllocationSites::Sites(a), AllocationSites::Sites(b)) => {
                Ok(AllocationSites::from_sites(a.iter().chain(b.iter()).cloned()))
            }
            _ => Ok(AllocationSites::Top),
        }
    }

    fn less_or_equal_aux(&self, other: &Self) -> Result<bool> {
        match (self, other) {
            (AllocationSites::Sites(a), AllocationSites::Sites(b)) => Ok(a
                .iter()
                .all(|x| b.iter().any(|y| x.name() == y.name() && (y.is_weak() || !x.is_weak())))),
            _ => Ok(false),
        }
    }

    fn glb_aux(&self, other: &Self) -> Result<Self> {
        match (self, other) {
            (AllocationSites::Sites(a), AllocationSites::Sites(b)) => {
                let sites = a.iter().filter_map(|x| {
                    b.iter()
                        .find(|y| x.name() == y.name())
                        .map(|y| x.with_weak(x.is_weak() && y.is_weak()))
                });
                Ok(AllocationSites::from_sites(sites))
            }
            _ => Ok(self.bottom()),
        }
    }
}

impl fmt::Display for AllocationSites {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationSites::Top => write!(f, "⊤"),
            AllocationSites::Sites(sites) => {
                let names: Vec<String> = sites.iter().map(|s| s.to_string()).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
        }
    }
}
